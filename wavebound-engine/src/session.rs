//! Session facade owning the battle state and its scheduler.
//!
//! Embedding applications talk to a [`BattleSession`]; the manager and state
//! are only reachable through it, so a run cannot be advanced from two places.

use crate::battle::{BattleSetup, BattleState, BattlerIndex, Combatant};
use crate::config::EngineConfig;
use crate::encounter::Encounter;
use crate::error::{ConfigError, EngineError};
use crate::phase::{
    PhaseKind, PhaseManager, PhaseName, ResumeEvent, ResumeSignal, ResumeToken, RunStatus,
};
use crate::rewards::RewardPools;
use crate::turn_order::TurnOrderError;
use crate::Collaborators;
use anyhow::Context;

/// High-level session wrapper binding a phase manager to a mutable battle state.
#[derive(Debug)]
pub struct BattleSession {
    manager: PhaseManager,
    state: BattleState,
}

impl BattleSession {
    /// Construct a fresh run at wave 1 for `party`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `cfg` fails validation.
    pub fn new(cfg: EngineConfig, seed: u64, party: Vec<Combatant>) -> Result<Self, ConfigError> {
        Self::from_state(cfg, seed, BattleState::new(party))
    }

    /// Build a session around an existing battle state.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `cfg` fails validation.
    pub fn from_state(cfg: EngineConfig, seed: u64, state: BattleState) -> Result<Self, ConfigError> {
        Ok(Self {
            manager: PhaseManager::new(cfg, seed)?,
            state,
        })
    }

    /// Parse a JSON configuration document and construct a fresh run.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be parsed or validated.
    pub fn from_config_json(json: &str, seed: u64, party: Vec<Combatant>) -> anyhow::Result<Self> {
        let cfg = EngineConfig::from_json(json).context("loading engine configuration")?;
        Ok(Self::new(cfg, seed, party)?)
    }

    #[must_use]
    pub fn with_pools(mut self, pools: RewardPools) -> Self {
        self.manager = self.manager.with_pools(pools);
        self
    }

    /// Load an enemy roster; the next `run` starts its first turn.
    pub fn start_battle(&mut self, setup: &BattleSetup) {
        self.state.load_battle(setup);
    }

    /// Force the action order of the upcoming turn.
    ///
    /// # Errors
    ///
    /// See [`BattleState::set_turn_order_override`].
    pub fn set_turn_order_override(
        &mut self,
        order: Vec<BattlerIndex>,
    ) -> Result<(), TurnOrderError> {
        self.state.set_turn_order_override(order)
    }

    /// Queue an encounter behind any pending work.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidTransition` while another encounter is active.
    pub fn begin_encounter(&mut self, encounter: Encounter) -> Result<(), EngineError> {
        self.manager.begin_encounter(encounter)
    }

    /// # Errors
    ///
    /// See [`PhaseManager::run`].
    pub fn run(&mut self, collab: &mut Collaborators<'_>) -> Result<RunStatus, EngineError> {
        self.manager.run(&mut self.state, collab)
    }

    /// # Errors
    ///
    /// See [`PhaseManager::resume`].
    pub fn resume(
        &mut self,
        event: ResumeEvent,
        collab: &mut Collaborators<'_>,
    ) -> Result<RunStatus, EngineError> {
        self.manager.resume(event, &mut self.state, collab)
    }

    /// # Errors
    ///
    /// See [`PhaseManager::override_phase`].
    pub fn override_phase(
        &mut self,
        kind: PhaseKind,
        collab: &mut Collaborators<'_>,
    ) -> Result<bool, EngineError> {
        self.manager.override_phase(kind, &mut self.state, collab)
    }

    /// Run, answering each suspension with `answer`, until the scheduler goes
    /// idle, the run ends, or `max_resumes` events have been delivered.
    ///
    /// # Errors
    ///
    /// Returns the first engine error with the phase and signal that caused
    /// it, or an error if the scheduler is still suspended at the limit.
    pub fn drive<F>(
        &mut self,
        collab: &mut Collaborators<'_>,
        max_resumes: usize,
        mut answer: F,
    ) -> anyhow::Result<RunStatus>
    where
        F: FnMut(&BattleState, PhaseName, ResumeToken) -> ResumeSignal,
    {
        let mut status = self.run(collab).context("starting the scheduler")?;
        for _ in 0..max_resumes {
            let RunStatus::Suspended { phase, token } = status else {
                return Ok(status);
            };
            let signal = answer(&self.state, phase, token);
            let label = signal.label();
            status = self
                .resume(ResumeEvent::new(token, signal), collab)
                .with_context(|| format!("resuming {phase} on {token} with {label}"))?;
        }
        match status {
            RunStatus::Suspended { phase, token } => {
                anyhow::bail!("{phase} still suspended on {token} after {max_resumes} resumes")
            }
            other => Ok(other),
        }
    }

    #[must_use]
    pub const fn manager(&self) -> &PhaseManager {
        &self.manager
    }

    pub const fn manager_mut(&mut self) -> &mut PhaseManager {
        &mut self.manager
    }

    /// Borrow the underlying immutable battle state.
    #[must_use]
    pub const fn state(&self) -> &BattleState {
        &self.state
    }

    /// Borrow the underlying mutable battle state.
    pub const fn state_mut(&mut self) -> &mut BattleState {
        &mut self.state
    }

    /// Apply a closure to the mutable battle state.
    pub fn with_state_mut<R>(&mut self, f: impl FnOnce(&mut BattleState) -> R) -> R {
        f(&mut self.state)
    }

    /// Consume the session, returning the underlying battle state.
    #[must_use]
    pub fn into_state(self) -> BattleState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::{Command, RunEnd};
    use crate::test_support::{FlatRules, MemoryStore, RecordingPresenter};

    #[test]
    fn drives_a_single_battle_to_a_cleared_run() {
        let mut session = BattleSession::new(
            EngineConfig::default(),
            42,
            vec![Combatant::new("Ember", 40, 50)],
        )
        .unwrap();
        session.start_battle(&BattleSetup {
            trainer: None,
            enemies: vec![Combatant::new("Gnat", 10, 20)],
            double: false,
            intro: None,
        });
        let mut presenter = RecordingPresenter::default();
        let rules = FlatRules::new(15);
        let mut store = MemoryStore::with_money(0);
        let mut collab = Collaborators::new(&mut presenter, &rules, &mut store);

        let status = session
            .drive(&mut collab, 32, |_, phase, _| match phase {
                PhaseName::Command => ResumeSignal::CommandChosen {
                    command: Command::Fight {
                        move_id: "ember".into(),
                        target: BattlerIndex::Enemy,
                    },
                },
                PhaseName::SelectReward => ResumeSignal::SkipRewards,
                _ => ResumeSignal::Completed,
            })
            .unwrap();

        assert_eq!(status, RunStatus::Finished(RunEnd::Cleared));
        assert_eq!(session.state().wave, 2);
        assert_eq!(
            presenter.texts(),
            vec!["Ember used ember!", "Gnat fainted!"]
        );
        assert!(store.granted.is_empty());
    }

    #[test]
    fn config_errors_carry_context() {
        let err = BattleSession::from_config_json(
            r#"{"rewards": {"offer_count": 0}}"#,
            1,
            Vec::new(),
        )
        .unwrap_err();
        assert!(format!("{err:#}").starts_with("loading engine configuration"));
    }

    #[test]
    fn state_accessors_follow_the_session() {
        let mut session =
            BattleSession::new(EngineConfig::default(), 7, vec![Combatant::new("a", 10, 1)])
                .unwrap();
        session.with_state_mut(|state| state.wave = 9);
        assert_eq!(session.state().wave, 9);
        assert_eq!(session.into_state().player_party.len(), 1);
    }
}
