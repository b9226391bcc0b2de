//! Cooperative scheduler loop.
//!
//! The manager pops the next phase, makes it current, and starts it. A phase
//! that suspends keeps the current slot until its token comes back through
//! [`PhaseManager::resume`]. Any non-precondition error raised while a phase is
//! current stalls the manager for good.

use super::handlers::{self, PhaseContext};
use super::{
    Phase, PhaseId, PhaseKind, PhaseName, PhaseQueue, PhaseStep, ResumeEvent, ResumeSignal,
    ResumeToken,
};
use crate::battle::{BattleState, BattlerIndex, Command, RunEnd};
use crate::{Collaborators, CombatRules};
use crate::config::EngineConfig;
use crate::constants::{LOG_PHASE_END, LOG_PHASE_START};
use crate::encounter::{ActiveEncounter, Encounter};
use crate::error::{ConfigError, EngineError};
use crate::rewards::RewardPools;
use crate::rng::RngBundle;

/// Where a `run` or `resume` call left the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// A phase is waiting on `token`.
    Suspended { phase: PhaseName, token: ResumeToken },
    /// Nothing is queued and no turn should start on its own.
    Idle,
    Finished(RunEnd),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ManagerState {
    Ready,
    Suspended(ResumeToken),
    Stalled { phase: PhaseName, reason: String },
}

#[derive(Debug)]
pub struct PhaseManager {
    cfg: EngineConfig,
    queue: PhaseQueue,
    current: Option<Phase>,
    state: ManagerState,
    /// Phase parked by `override_phase`, with the token it is waiting on and
    /// whether a cancel was pending for it.
    standby: Option<(Phase, ResumeToken, bool)>,
    encounter: Option<ActiveEncounter>,
    rng: RngBundle,
    pools: Option<RewardPools>,
    next_token: u64,
    cancel_requested: bool,
    history: Vec<PhaseName>,
}

impl PhaseManager {
    /// Build a manager from a validated configuration and a user seed.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when the configuration violates its bounds.
    pub fn new(cfg: EngineConfig, seed: u64) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            queue: PhaseQueue::new(),
            current: None,
            state: ManagerState::Ready,
            standby: None,
            encounter: None,
            rng: RngBundle::from_user_seed(seed),
            pools: None,
            next_token: 0,
            cancel_requested: false,
            history: Vec::new(),
        })
    }

    /// Draw rewards from `pools` instead of the standard pools.
    #[must_use]
    pub fn with_pools(mut self, pools: RewardPools) -> Self {
        self.pools = Some(pools);
        self
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    #[must_use]
    pub const fn queue(&self) -> &PhaseQueue {
        &self.queue
    }

    pub const fn queue_mut(&mut self) -> &mut PhaseQueue {
        &mut self.queue
    }

    #[must_use]
    pub const fn rng(&self) -> &RngBundle {
        &self.rng
    }

    #[must_use]
    pub const fn encounter(&self) -> Option<&ActiveEncounter> {
        self.encounter.as_ref()
    }

    #[must_use]
    pub const fn current_phase(&self) -> Option<&Phase> {
        self.current.as_ref()
    }

    /// Names of phases that have ended, oldest first.
    #[must_use]
    pub fn history(&self) -> &[PhaseName] {
        &self.history
    }

    #[must_use]
    pub const fn is_stalled(&self) -> bool {
        matches!(self.state, ManagerState::Stalled { .. })
    }

    /// Phase and token the manager is waiting on, if any.
    #[must_use]
    pub fn suspended_on(&self) -> Option<(PhaseName, ResumeToken)> {
        match (&self.state, &self.current) {
            (ManagerState::Suspended(token), Some(phase)) => Some((phase.name(), *token)),
            _ => None,
        }
    }

    /// Schedule an encounter after everything already queued.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidTransition` while another encounter is
    /// active.
    pub fn begin_encounter(&mut self, encounter: Encounter) -> Result<(), EngineError> {
        if let Some(active) = &self.encounter {
            return Err(EngineError::InvalidTransition {
                state: format!("encounter {} in progress", active.encounter.id),
                action: "begin an encounter",
            });
        }
        self.encounter = Some(ActiveEncounter::new(encounter));
        self.queue.enqueue_append(PhaseKind::EncounterStart);
        Ok(())
    }

    /// Queue a move for `battler` ahead of slower pending moves.
    ///
    /// `priority` replaces the bracket `rules` would give the command. Returns
    /// `None` when `battler` is not on the field.
    pub fn push_move(
        &mut self,
        battle: &BattleState,
        rules: &dyn CombatRules,
        battler: BattlerIndex,
        command: Command,
        priority: Option<i8>,
    ) -> Option<PhaseId> {
        let party_slot = battle.party_index(battler)?;
        let priority =
            priority.unwrap_or_else(|| rules.command_priority(battle, battler, &command));
        let kind = PhaseKind::Move {
            battler,
            party_slot,
            command,
        };
        Some(self.queue.enqueue_move(kind, priority, |pending, queued| {
            rules.command_priority(battle, pending, queued)
        }))
    }

    /// Drop the pending queue, splice marks, deferred phases and standby slot.
    pub fn clear_all(&mut self) {
        self.queue.clear_all();
        self.standby = None;
    }

    /// Ask the suspended phase to end on its next resume. Returns whether a
    /// phase was suspended.
    pub fn request_cancel(&mut self) -> bool {
        let suspended = matches!(self.state, ManagerState::Suspended(_));
        self.cancel_requested |= suspended;
        suspended
    }

    /// Advance until a phase suspends, the queue runs dry, or the run ends.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Stalled` once the manager has stalled, or the
    /// error that stalls it.
    pub fn run(
        &mut self,
        battle: &mut BattleState,
        collab: &mut Collaborators<'_>,
    ) -> Result<RunStatus, EngineError> {
        self.ensure_live()?;
        if let Some((phase, token)) = self.suspended_on() {
            return Ok(RunStatus::Suspended { phase, token });
        }
        self.advance(battle, collab)
    }

    /// Hand a completion event to the suspended phase.
    ///
    /// # Errors
    ///
    /// Precondition errors (`ResumeMismatch`, `NotSuspended`,
    /// `UnexpectedEvent`, invalid selections) leave the manager untouched.
    /// Anything else stalls it.
    pub fn resume(
        &mut self,
        event: ResumeEvent,
        battle: &mut BattleState,
        collab: &mut Collaborators<'_>,
    ) -> Result<RunStatus, EngineError> {
        self.ensure_live()?;
        let ManagerState::Suspended(expected) = self.state else {
            return Err(EngineError::NotSuspended);
        };
        if event.token != expected {
            return Err(EngineError::ResumeMismatch {
                expected: Some(expected),
                got: event.token,
            });
        }
        let Some(name) = self.current.as_ref().map(Phase::name) else {
            return Err(EngineError::NotSuspended);
        };

        let step = if self.cancel_requested {
            log::debug!("{name} cancelled while suspended on {expected}");
            PhaseStep::Done
        } else {
            match self.dispatch(battle, collab, Some(event.signal)) {
                Ok(step) => step,
                Err(err) if err.is_precondition() => return Err(err),
                Err(err) => return Err(self.stall(name, err)),
            }
        };
        match step {
            PhaseStep::Suspended(token) => {
                self.state = ManagerState::Suspended(token);
                Ok(RunStatus::Suspended { phase: name, token })
            }
            PhaseStep::Done => match self.end_current() {
                Some(status) => Ok(status),
                None => self.advance(battle, collab),
            },
        }
    }

    /// Park the suspended phase and run `kind` immediately. When `kind` ends,
    /// the parked phase becomes current again without being restarted.
    ///
    /// Returns `Ok(false)` if the standby slot is already taken.
    ///
    /// # Errors
    ///
    /// Returns the error that stalls the manager if the override fails.
    pub fn override_phase(
        &mut self,
        kind: PhaseKind,
        battle: &mut BattleState,
        collab: &mut Collaborators<'_>,
    ) -> Result<bool, EngineError> {
        self.ensure_live()?;
        if self.standby.is_some() {
            return Ok(false);
        }
        if let Some(parked) = self.current.take()
            && let ManagerState::Suspended(token) = self.state
        {
            self.standby = Some((parked, token, self.cancel_requested));
        }
        let phase = self.queue.detached(kind);
        let name = phase.name();
        self.queue.reset_fresh();
        self.current = Some(phase);
        self.state = ManagerState::Ready;
        self.cancel_requested = false;
        log::debug!(target: LOG_PHASE_START, "{name} overrides the current phase");
        match self.dispatch(battle, collab, None) {
            Ok(PhaseStep::Suspended(token)) => self.state = ManagerState::Suspended(token),
            Ok(PhaseStep::Done) => {
                self.end_current();
            }
            Err(err) => return Err(self.stall(name, err)),
        }
        Ok(true)
    }

    fn advance(
        &mut self,
        battle: &mut BattleState,
        collab: &mut Collaborators<'_>,
    ) -> Result<RunStatus, EngineError> {
        let limit = self.cfg.scheduler.max_steps_per_run;
        let mut steps = 0_u32;
        loop {
            if let Some(end) = battle.run_end {
                return Ok(RunStatus::Finished(end));
            }
            let phase = match self.queue.pop_next() {
                Some(phase) => phase,
                None if self.cfg.scheduler.auto_turn_init && battle.battle_in_progress() => {
                    self.queue.populate_turn();
                    continue;
                }
                None => return Ok(RunStatus::Idle),
            };
            let name = phase.name();
            steps += 1;
            if steps > limit {
                self.current = Some(phase);
                return Err(self.stall(name, EngineError::StepBudgetExceeded { limit }));
            }

            log::debug!(target: LOG_PHASE_START, "{name} ({:?})", phase.id);
            self.current = Some(phase);
            match self.dispatch(battle, collab, None) {
                Ok(PhaseStep::Suspended(token)) => {
                    self.state = ManagerState::Suspended(token);
                    return Ok(RunStatus::Suspended { phase: name, token });
                }
                Ok(PhaseStep::Done) => {
                    if let Some(status) = self.end_current() {
                        return Ok(status);
                    }
                }
                Err(err) => return Err(self.stall(name, err)),
            }
        }
    }

    fn dispatch(
        &mut self,
        battle: &mut BattleState,
        collab: &mut Collaborators<'_>,
        signal: Option<ResumeSignal>,
    ) -> Result<PhaseStep, EngineError> {
        let Some(current) = self.current.as_mut() else {
            return Err(EngineError::NotSuspended);
        };
        let mut ctx = PhaseContext {
            battle,
            queue: &mut self.queue,
            encounter: &mut self.encounter,
            collab,
            rng: &self.rng,
            pools: self.pools.as_ref(),
            cfg: &self.cfg,
            next_token: &mut self.next_token,
        };
        match signal {
            None => handlers::start(&mut current.kind, &mut ctx),
            Some(signal) => handlers::resume(&mut current.kind, signal, &mut ctx),
        }
    }

    /// Discard the current phase. Returns the standby phase's status when one
    /// is restored.
    fn end_current(&mut self) -> Option<RunStatus> {
        if let Some(phase) = self.current.take() {
            log::debug!(target: LOG_PHASE_END, "{} ({:?})", phase.name(), phase.id);
            self.history.push(phase.name());
        }
        self.cancel_requested = false;
        if let Some((phase, token, cancel)) = self.standby.take() {
            let name = phase.name();
            self.cancel_requested = cancel;
            self.current = Some(phase);
            self.state = ManagerState::Suspended(token);
            return Some(RunStatus::Suspended { phase: name, token });
        }
        self.state = ManagerState::Ready;
        None
    }

    fn stall(&mut self, phase: PhaseName, err: EngineError) -> EngineError {
        log::error!("scheduler stalled in {phase}: {err}");
        self.state = ManagerState::Stalled {
            phase,
            reason: err.to_string(),
        };
        err
    }

    fn ensure_live(&self) -> Result<(), EngineError> {
        match &self.state {
            ManagerState::Stalled { phase, reason } => Err(EngineError::Stalled {
                phase: *phase,
                reason: reason.clone(),
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::{BattleSetup, Combatant};
    use crate::config::SchedulerCfg;
    use crate::test_support::{FlatRules, MemoryStore, RecordingPresenter};

    struct Rig {
        battle: BattleState,
        presenter: RecordingPresenter,
        rules: FlatRules,
        store: MemoryStore,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                battle: BattleState::new(vec![Combatant::new("Ember", 40, 50)]),
                presenter: RecordingPresenter::default(),
                rules: FlatRules::new(10),
                store: MemoryStore::with_money(0),
            }
        }

        fn run(&mut self, manager: &mut PhaseManager) -> Result<RunStatus, EngineError> {
            let mut collab = Collaborators::new(&mut self.presenter, &self.rules, &mut self.store);
            manager.run(&mut self.battle, &mut collab)
        }

        fn resume(
            &mut self,
            manager: &mut PhaseManager,
            token: ResumeToken,
            signal: ResumeSignal,
        ) -> Result<RunStatus, EngineError> {
            let mut collab = Collaborators::new(&mut self.presenter, &self.rules, &mut self.store);
            manager.resume(ResumeEvent::new(token, signal), &mut self.battle, &mut collab)
        }

        fn override_phase(
            &mut self,
            manager: &mut PhaseManager,
            kind: PhaseKind,
        ) -> Result<bool, EngineError> {
            let mut collab = Collaborators::new(&mut self.presenter, &self.rules, &mut self.store);
            manager.override_phase(kind, &mut self.battle, &mut collab)
        }
    }

    fn manager() -> PhaseManager {
        PhaseManager::new(EngineConfig::default(), 3).unwrap()
    }

    fn suspended_token(status: RunStatus) -> ResumeToken {
        match status {
            RunStatus::Suspended { token, .. } => token,
            other => panic!("expected suspension, got {other:?}"),
        }
    }

    #[test]
    fn idle_without_battle_or_work() {
        let mut rig = Rig::new();
        let mut manager = manager();
        assert_eq!(rig.run(&mut manager).unwrap(), RunStatus::Idle);
    }

    #[test]
    fn mismatched_token_leaves_phase_suspended() {
        let mut rig = Rig::new();
        let mut manager = manager();
        manager.queue_mut().queue_message("hello", true);
        let token = suspended_token(rig.run(&mut manager).unwrap());

        let err = rig
            .resume(&mut manager, ResumeToken(token.0 + 7), ResumeSignal::Completed)
            .unwrap_err();
        assert!(matches!(err, EngineError::ResumeMismatch { .. }));
        assert_eq!(manager.suspended_on(), Some((PhaseName::Message, token)));

        assert_eq!(
            rig.resume(&mut manager, token, ResumeSignal::Completed)
                .unwrap(),
            RunStatus::Idle
        );
        assert_eq!(manager.history(), &[PhaseName::Message]);
        assert!(matches!(
            rig.resume(&mut manager, token, ResumeSignal::Completed),
            Err(EngineError::NotSuspended)
        ));
    }

    #[test]
    fn override_restores_standby_without_restarting_it() {
        let mut rig = Rig::new();
        let mut manager = manager();
        manager.queue_mut().queue_message("parked", true);
        let parked = suspended_token(rig.run(&mut manager).unwrap());

        assert!(rig
            .override_phase(&mut manager, PhaseKind::message("urgent"))
            .unwrap());
        let (name, urgent) = manager.suspended_on().unwrap();
        assert_eq!(name, PhaseName::Message);
        assert_ne!(urgent, parked);
        assert!(!rig
            .override_phase(&mut manager, PhaseKind::message("third"))
            .unwrap());

        let status = rig
            .resume(&mut manager, urgent, ResumeSignal::Completed)
            .unwrap();
        assert_eq!(
            status,
            RunStatus::Suspended {
                phase: PhaseName::Message,
                token: parked
            }
        );
        assert_eq!(
            rig.resume(&mut manager, parked, ResumeSignal::Completed)
                .unwrap(),
            RunStatus::Idle
        );
        assert_eq!(rig.presenter.texts(), vec!["parked", "urgent"]);
    }

    #[test]
    fn cancel_ends_the_suspended_phase() {
        let mut rig = Rig::new();
        let mut manager = manager();
        manager.queue_mut().queue_message("long text", true);
        let token = suspended_token(rig.run(&mut manager).unwrap());
        assert!(manager.request_cancel());
        assert_eq!(
            rig.resume(&mut manager, token, ResumeSignal::Reroll).unwrap(),
            RunStatus::Idle
        );
    }

    #[test]
    fn cancel_survives_an_override_of_its_phase() {
        let mut rig = Rig::new();
        let mut manager = manager();
        manager.queue_mut().queue_message("parked", true);
        let parked = suspended_token(rig.run(&mut manager).unwrap());
        assert!(manager.request_cancel());

        assert!(rig
            .override_phase(&mut manager, PhaseKind::message("urgent"))
            .unwrap());
        let (_, urgent) = manager.suspended_on().unwrap();
        assert_eq!(
            rig.resume(&mut manager, urgent, ResumeSignal::Completed)
                .unwrap(),
            RunStatus::Suspended {
                phase: PhaseName::Message,
                token: parked
            }
        );
        assert_eq!(
            rig.resume(&mut manager, parked, ResumeSignal::Reroll).unwrap(),
            RunStatus::Idle
        );
        assert_eq!(manager.history(), &[PhaseName::Message, PhaseName::Message]);
    }

    #[test]
    fn phase_failure_stalls_for_good() {
        let mut rig = Rig::new();
        let mut manager = manager();
        manager.queue_mut().enqueue_append(PhaseKind::EncounterStart);
        let err = rig.run(&mut manager).unwrap_err();
        assert!(matches!(err, EngineError::NoActiveEncounter { .. }));
        assert!(manager.is_stalled());
        for _ in 0..2 {
            assert!(matches!(
                rig.run(&mut manager),
                Err(EngineError::Stalled {
                    phase: PhaseName::EncounterStart,
                    ..
                })
            ));
        }
    }

    #[test]
    fn step_budget_is_fatal() {
        let mut rig = Rig::new();
        let cfg = EngineConfig {
            scheduler: SchedulerCfg {
                auto_turn_init: false,
                max_steps_per_run: 3,
            },
            ..EngineConfig::default()
        };
        let mut manager = PhaseManager::new(cfg, 1).unwrap();
        for _ in 0..5 {
            manager
                .queue_mut()
                .enqueue_append(PhaseKind::TurnEnd { interlude: false });
        }
        assert_eq!(
            rig.run(&mut manager),
            Err(EngineError::StepBudgetExceeded { limit: 3 })
        );
    }

    #[test]
    fn auto_turn_init_prompts_the_player() {
        let mut rig = Rig::new();
        rig.battle.load_battle(&BattleSetup {
            trainer: None,
            enemies: vec![Combatant::new("Gnat", 30, 10)],
            double: false,
            intro: None,
        });
        let mut manager = manager();
        let status = rig.run(&mut manager).unwrap();
        assert!(matches!(
            status,
            RunStatus::Suspended {
                phase: PhaseName::Command,
                ..
            }
        ));
        assert_eq!(rig.battle.turn, 1);
        assert_eq!(
            manager.queue().names(),
            vec![PhaseName::Command, PhaseName::TurnStart]
        );
    }

    fn single_battle(rig: &mut Rig) {
        rig.battle.load_battle(&BattleSetup {
            trainer: None,
            enemies: vec![Combatant::new("Gnat", 30, 10)],
            double: false,
            intro: None,
        });
    }

    #[test]
    fn deferred_phases_run_before_the_next_turn_init() {
        let mut rig = Rig::new();
        single_battle(&mut rig);
        let mut manager = manager();
        manager.queue_mut().enqueue_deferred(PhaseKind::message("hail"));
        manager.queue_mut().queue_message("now", false);

        let now = suspended_token(rig.run(&mut manager).unwrap());
        assert_eq!(rig.battle.turn, 0);
        let hail = suspended_token(
            rig.resume(&mut manager, now, ResumeSignal::Completed)
                .unwrap(),
        );
        assert_eq!(rig.battle.turn, 0);
        let status = rig
            .resume(&mut manager, hail, ResumeSignal::Completed)
            .unwrap();
        assert!(matches!(
            status,
            RunStatus::Suspended {
                phase: PhaseName::Command,
                ..
            }
        ));
        assert_eq!(rig.battle.turn, 1);
        assert_eq!(rig.presenter.texts(), vec!["now", "hail"]);
        assert_eq!(
            manager.history(),
            &[PhaseName::Message, PhaseName::Message, PhaseName::TurnInit]
        );
    }

    #[test]
    fn pushed_moves_are_priced_by_the_rules() {
        let mut rig = Rig::new();
        single_battle(&mut rig);
        let mut manager = manager();
        manager.queue_mut().enqueue_append(PhaseKind::Move {
            battler: BattlerIndex::Enemy,
            party_slot: 0,
            command: Command::Fight {
                move_id: "bite".into(),
                target: BattlerIndex::Player,
            },
        });
        manager.queue_mut().queue_turn_end_phases();

        let switch = manager.push_move(
            &rig.battle,
            &rig.rules,
            BattlerIndex::Player,
            Command::Switch { party_slot: 1 },
            None,
        );
        assert!(switch.is_some());
        assert_eq!(manager.queue().iter().next().map(|p| p.id), switch);

        let slow = manager.push_move(
            &rig.battle,
            &rig.rules,
            BattlerIndex::Player,
            Command::Pass,
            Some(-1),
        );
        assert_eq!(manager.queue().iter().last().map(|p| p.id), slow);
        assert_eq!(
            manager.push_move(
                &rig.battle,
                &rig.rules,
                BattlerIndex::PlayerTwo,
                Command::Pass,
                None
            ),
            None
        );
    }
}
