//! Per-kind phase behaviour.
//!
//! [`start`] runs when a phase becomes current; [`resume`] handles the event a
//! suspended phase was waiting for. Both may mutate the phase's own payload,
//! the shared battle state, and the pending queue.

use super::{PhaseKind, PhaseName, PhaseQueue, PhaseStep, ResumeSignal, ResumeToken};
use crate::Collaborators;
use crate::battle::{BattleOutcome, BattleSetup, BattleState, BattlerIndex, Command, RunEnd, SeenEncounter, Side};
use crate::config::EngineConfig;
use crate::constants::{LOG_OPTION_REJECTED, LOG_TURN_ORDER};
use crate::encounter::{
    ActiveEncounter, ContinueOutcome, HookContext, HookOutcome, RequirementView, ResolutionState,
};
use crate::error::EngineError;
use crate::rewards::{
    OfferContext, RewardOffer, RewardPools, RewardRequest, RewardTier, generate_offer,
    standard_pools,
};
use crate::rng::RngBundle;
use crate::rules::{EndOfTurnEffect, HpDelta, NextWave};
use crate::turn_order::{TurnCandidate, TurnOrderRequest, resolve_turn_order};
use smallvec::SmallVec;

/// Phase kinds whose work belongs to a turn that a victory cuts short.
const TURN_PHASES: [PhaseName; 11] = [
    PhaseName::TurnInit,
    PhaseName::Command,
    PhaseName::TurnStart,
    PhaseName::Move,
    PhaseName::SwitchSummon,
    PhaseName::Faint,
    PhaseName::WeatherEffect,
    PhaseName::Berry,
    PhaseName::CheckStatusEffect,
    PhaseName::PostTurnStatusEffect,
    PhaseName::TurnEnd,
];

/// Everything a phase may touch while it is current.
pub(crate) struct PhaseContext<'a, 'c> {
    pub(crate) battle: &'a mut BattleState,
    pub(crate) queue: &'a mut PhaseQueue,
    pub(crate) encounter: &'a mut Option<ActiveEncounter>,
    pub(crate) collab: &'a mut Collaborators<'c>,
    pub(crate) rng: &'a RngBundle,
    pub(crate) pools: Option<&'a RewardPools>,
    pub(crate) cfg: &'a EngineConfig,
    pub(crate) next_token: &'a mut u64,
}

impl PhaseContext<'_, '_> {
    fn mint_token(&mut self) -> ResumeToken {
        *self.next_token = self.next_token.wrapping_add(1);
        ResumeToken(*self.next_token)
    }

    fn show_line(&mut self, text: &str, speaker: Option<&str>) -> PhaseStep {
        let token = self.mint_token();
        match speaker {
            Some(speaker) => self.collab.presenter.show_dialogue(token, text, speaker),
            None => self.collab.presenter.show_text(token, text),
        }
        PhaseStep::Suspended(token)
    }

    fn active_encounter(&mut self, phase: PhaseName) -> Result<&mut ActiveEncounter, EngineError> {
        self.encounter
            .as_mut()
            .ok_or(EngineError::NoActiveEncounter { phase })
    }
}

pub(crate) fn start(
    kind: &mut PhaseKind,
    ctx: &mut PhaseContext<'_, '_>,
) -> Result<PhaseStep, EngineError> {
    match kind {
        PhaseKind::TurnInit => Ok(turn_init(ctx)),
        PhaseKind::Command { battler } => Ok(command_start(*battler, ctx)),
        PhaseKind::TurnStart => turn_start(ctx),
        PhaseKind::Move {
            battler,
            party_slot,
            command,
        } => Ok(move_start(*battler, *party_slot, command, ctx)),
        PhaseKind::Faint { battler } => Ok(faint(*battler, ctx)),
        PhaseKind::SwitchSummon {
            battler,
            party_slot,
        } => Ok(switch_summon(*battler, *party_slot, ctx)),
        PhaseKind::Message { text, speaker } => Ok(ctx.show_line(text, speaker.as_deref())),
        PhaseKind::WeatherEffect => Ok(end_of_turn(EndOfTurnEffect::Weather, ctx)),
        PhaseKind::Berry => Ok(end_of_turn(EndOfTurnEffect::Berry, ctx)),
        PhaseKind::CheckStatusEffect => Ok(end_of_turn(EndOfTurnEffect::StatusCheck, ctx)),
        PhaseKind::PostTurnStatusEffect { battler } => {
            if ctx.battle.battler(*battler).is_none_or(|c| c.is_fainted()) {
                return Ok(PhaseStep::Done);
            }
            Ok(end_of_turn(EndOfTurnEffect::PostTurnStatus(*battler), ctx))
        }
        PhaseKind::TurnEnd { interlude } => Ok(turn_end(*interlude, ctx)),
        PhaseKind::Victory => Ok(victory(ctx)),
        PhaseKind::GameOver => Ok(game_over(ctx)),
        PhaseKind::EncounterStart => encounter_start(ctx),
        PhaseKind::EncounterOptionSelected => encounter_option_selected(ctx),
        PhaseKind::EncounterBattle { setup } => encounter_battle(setup, ctx),
        PhaseKind::EncounterBattleCleanup => Ok(encounter_battle_cleanup(ctx)),
        PhaseKind::EncounterRewards => encounter_rewards(ctx),
        PhaseKind::PostEncounter { outro_line } => post_encounter(outro_line, ctx),
        PhaseKind::SelectReward {
            request,
            offer,
            rerolls,
        } => {
            let fresh = build_offer(ctx, request, *rerolls, &[]);
            Ok(present_offer(offer.insert(fresh), ctx))
        }
        PhaseKind::NewBattle => Ok(new_battle(ctx)),
    }
}

pub(crate) fn resume(
    kind: &mut PhaseKind,
    signal: ResumeSignal,
    ctx: &mut PhaseContext<'_, '_>,
) -> Result<PhaseStep, EngineError> {
    let phase = kind.name();
    match (kind, signal) {
        (PhaseKind::Command { battler }, ResumeSignal::CommandChosen { command }) => {
            command_chosen(*battler, command, ctx)
        }
        (PhaseKind::EncounterStart, ResumeSignal::OptionChosen { index }) => {
            option_chosen(index, ctx)
        }
        (PhaseKind::EncounterStart, ResumeSignal::Completed) => encounter_start_next(ctx),
        (PhaseKind::PostEncounter { outro_line }, ResumeSignal::Completed) => {
            post_encounter(outro_line, ctx)
        }
        (
            PhaseKind::SelectReward {
                request,
                offer,
                rerolls,
            },
            signal @ (ResumeSignal::RewardChosen { .. }
            | ResumeSignal::Reroll
            | ResumeSignal::SkipRewards),
        ) => select_reward_resume(request, offer, rerolls, signal, ctx),
        (
            PhaseKind::Message { .. }
            | PhaseKind::Move { .. }
            | PhaseKind::GameOver
            | PhaseKind::NewBattle,
            ResumeSignal::Completed,
        ) => Ok(PhaseStep::Done),
        (_, signal) => Err(EngineError::UnexpectedEvent {
            phase,
            event: signal.label(),
        }),
    }
}

fn turn_init(ctx: &mut PhaseContext<'_, '_>) -> PhaseStep {
    ctx.battle.turn += 1;
    ctx.battle.commands.clear();
    for battler in ctx.battle.active_battlers() {
        ctx.queue.enqueue_append(PhaseKind::Command { battler });
    }
    ctx.queue.enqueue_append(PhaseKind::TurnStart);
    PhaseStep::Done
}

fn command_start(battler: BattlerIndex, ctx: &mut PhaseContext<'_, '_>) -> PhaseStep {
    if ctx.battle.battler(battler).is_none_or(|c| c.is_fainted()) {
        return PhaseStep::Done;
    }
    match battler.side() {
        Side::Enemy => {
            let command = ctx.collab.rules.enemy_command(ctx.battle, battler);
            ctx.battle.commands.insert(battler, command);
            PhaseStep::Done
        }
        Side::Player => {
            let token = ctx.mint_token();
            ctx.collab
                .presenter
                .prompt_command(token, battler, ctx.battle);
            PhaseStep::Suspended(token)
        }
    }
}

fn command_chosen(
    battler: BattlerIndex,
    command: Command,
    ctx: &mut PhaseContext<'_, '_>,
) -> Result<PhaseStep, EngineError> {
    let invalid = |reason| EngineError::InvalidCommand { battler, reason };
    match &command {
        Command::Switch { party_slot } => {
            let side = battler.side();
            let member = ctx
                .battle
                .party(side)
                .get(*party_slot)
                .ok_or_else(|| invalid("no such party member"))?;
            if member.is_fainted() {
                return Err(invalid("party member has fainted"));
            }
            let fielded = BattlerIndex::ALL
                .into_iter()
                .any(|idx| idx.side() == side && ctx.battle.party_index(idx) == Some(*party_slot));
            if fielded {
                return Err(invalid("party member is already on the field"));
            }
            let claimed = ctx.battle.commands.iter().any(|(other, chosen)| {
                other.side() == side && *chosen == Command::Switch { party_slot: *party_slot }
            });
            if claimed {
                return Err(invalid("party member is already switching in"));
            }
        }
        Command::Fight { target, .. } => {
            if ctx.battle.battler(*target).is_none() {
                return Err(invalid("target slot is empty"));
            }
        }
        Command::Pass => {}
    }
    ctx.battle.commands.insert(battler, command);
    Ok(PhaseStep::Done)
}

fn turn_start(ctx: &mut PhaseContext<'_, '_>) -> Result<PhaseStep, EngineError> {
    let active = ctx.battle.active_battlers();
    let rules = ctx.collab.rules;
    let candidates: SmallVec<[TurnCandidate; 4]> = active
        .iter()
        .map(|battler| {
            let command = ctx
                .battle
                .commands
                .get(battler)
                .cloned()
                .unwrap_or(Command::Pass);
            TurnCandidate::new(
                *battler,
                rules.command_priority(ctx.battle, *battler, &command),
                rules.effective_speed(ctx.battle, *battler),
            )
        })
        .collect();
    let override_order = ctx.battle.turn_order_override.take();
    let request = TurnOrderRequest {
        active: &active,
        candidates: &candidates,
        tie_break_seed: ctx.rng.turn_order_seed(ctx.battle.wave, ctx.battle.turn),
        override_order: override_order.as_deref(),
    };
    let order = match resolve_turn_order(&request) {
        Ok(order) => order,
        // The field changed since the override was accepted.
        Err(err) if override_order.is_some() => {
            log::warn!(
                target: LOG_TURN_ORDER,
                "turn {} ignores its override: {err}",
                ctx.battle.turn
            );
            resolve_turn_order(&TurnOrderRequest {
                override_order: None,
                ..request
            })?
        }
        Err(err) => return Err(err.into()),
    };
    ctx.battle.last_turn_order = order.to_vec();

    for battler in &order {
        let Some(party_slot) = ctx.battle.party_index(*battler) else {
            continue;
        };
        match ctx.battle.commands.get(battler).cloned() {
            Some(Command::Switch { party_slot: incoming }) => {
                ctx.queue.enqueue_append(PhaseKind::SwitchSummon {
                    battler: *battler,
                    party_slot: incoming,
                });
            }
            Some(command @ Command::Fight { .. }) => {
                ctx.queue.enqueue_append(PhaseKind::Move {
                    battler: *battler,
                    party_slot,
                    command,
                });
            }
            Some(Command::Pass) | None => {}
        }
    }
    for battler in &order {
        ctx.queue
            .enqueue_append(PhaseKind::PostTurnStatusEffect { battler: *battler });
    }
    ctx.queue.queue_turn_end_phases();
    Ok(PhaseStep::Done)
}

fn move_start(
    battler: BattlerIndex,
    party_slot: usize,
    command: &Command,
    ctx: &mut PhaseContext<'_, '_>,
) -> PhaseStep {
    let stale = ctx.battle.outcome.is_some()
        || ctx.battle.party_index(battler) != Some(party_slot)
        || ctx.battle.battler(battler).is_none_or(|c| c.is_fainted());
    if stale {
        return PhaseStep::Done;
    }
    let resolution = ctx.collab.rules.resolve_move(ctx.battle, battler, command);
    let fainted = apply_hp_changes(ctx.battle, &resolution.hp_changes);
    queue_outcome(ctx, &resolution.messages, &fainted);
    match resolution.cue {
        Some(cue) => {
            let token = ctx.mint_token();
            ctx.collab.presenter.play_cue(token, &cue);
            PhaseStep::Suspended(token)
        }
        None => PhaseStep::Done,
    }
}

/// Apply HP deltas; returns battlers that fainted as a result.
fn apply_hp_changes(battle: &mut BattleState, changes: &[HpDelta]) -> SmallVec<[BattlerIndex; 4]> {
    let mut fainted = SmallVec::new();
    for change in changes {
        let Some(member) = battle.battler_mut(change.target) else {
            continue;
        };
        if member.is_fainted() {
            continue;
        }
        let amount = change.delta.unsigned_abs();
        member.hp = if change.delta < 0 {
            member.hp.saturating_sub(amount)
        } else {
            member.hp.saturating_add(amount).min(member.max_hp)
        };
        if member.is_fainted() && !fainted.contains(&change.target) {
            fainted.push(change.target);
        }
    }
    fainted
}

/// Messages run first, then faints, all ahead of the existing continuation.
fn queue_outcome(ctx: &mut PhaseContext<'_, '_>, messages: &[String], fainted: &[BattlerIndex]) {
    for battler in fainted.iter().rev() {
        ctx.queue
            .enqueue_prepend(PhaseKind::Faint { battler: *battler });
    }
    for text in messages.iter().rev() {
        ctx.queue.queue_message(text.clone(), false);
    }
    ctx.battle.log.extend(messages.iter().cloned());
}

fn faint(battler: BattlerIndex, ctx: &mut PhaseContext<'_, '_>) -> PhaseStep {
    let decided = ctx.battle.outcome.is_some()
        || ctx.queue.has_kind(PhaseName::Victory)
        || ctx.queue.has_kind(PhaseName::GameOver);
    if decided {
        return PhaseStep::Done;
    }
    let name = ctx
        .battle
        .battler(battler)
        .map_or_else(|| battler.to_string(), |c| c.name.clone());
    let side = battler.side();
    // Prepended in reverse: the faint message runs before what follows it.
    if ctx.battle.side_defeated(side) {
        ctx.queue.enqueue_prepend(match side {
            Side::Player => PhaseKind::GameOver,
            Side::Enemy => PhaseKind::Victory,
        });
    } else if let Some(party_slot) = ctx.battle.next_replacement(side) {
        ctx.queue.enqueue_prepend(PhaseKind::SwitchSummon {
            battler,
            party_slot,
        });
    } else {
        ctx.battle.vacate(battler);
    }
    ctx.queue.queue_message(format!("{name} fainted!"), false);
    PhaseStep::Done
}

fn switch_summon(battler: BattlerIndex, party_slot: usize, ctx: &mut PhaseContext<'_, '_>) -> PhaseStep {
    if ctx.battle.outcome.is_some() {
        return PhaseStep::Done;
    }
    let Some(member) = ctx.battle.party(battler.side()).get(party_slot) else {
        log::warn!("{battler} cannot switch to missing party slot {party_slot}");
        return PhaseStep::Done;
    };
    if member.is_fainted() {
        return PhaseStep::Done;
    }
    let text = match battler.side() {
        Side::Player => format!("Go! {}!", member.name),
        Side::Enemy => format!(
            "{} sent out {}!",
            ctx.battle.trainer.as_deref().unwrap_or("The foe"),
            member.name
        ),
    };
    ctx.battle.place(battler, party_slot);
    ctx.queue.queue_message(text, false);
    PhaseStep::Done
}

fn end_of_turn(effect: EndOfTurnEffect, ctx: &mut PhaseContext<'_, '_>) -> PhaseStep {
    if ctx.battle.outcome.is_some() {
        return PhaseStep::Done;
    }
    let resolution = ctx.collab.rules.end_of_turn(ctx.battle, effect);
    let fainted = apply_hp_changes(ctx.battle, &resolution.hp_changes);
    queue_outcome(ctx, &resolution.messages, &fainted);
    PhaseStep::Done
}

fn turn_end(interlude: bool, ctx: &mut PhaseContext<'_, '_>) -> PhaseStep {
    ctx.battle.commands.clear();
    ctx.battle.clear_turn_order_override();
    if interlude {
        log::debug!("turn {} closed as an interlude", ctx.battle.turn);
    }
    PhaseStep::Done
}

fn victory(ctx: &mut PhaseContext<'_, '_>) -> PhaseStep {
    ctx.battle.outcome = Some(BattleOutcome::Victory);
    for name in TURN_PHASES {
        ctx.queue.remove_all_of(name);
    }
    if let Some(trainer) = ctx.battle.trainer.clone() {
        ctx.queue.queue_message(format!("You defeated {trainer}!"), true);
    }
    if ctx.encounter.is_some() {
        ctx.queue.enqueue_append(PhaseKind::EncounterRewards);
    } else {
        ctx.queue.enqueue_append(PhaseKind::SelectReward {
            request: RewardRequest::standard(),
            offer: None,
            rerolls: 0,
        });
        ctx.queue.enqueue_append(PhaseKind::NewBattle);
    }
    PhaseStep::Done
}

fn game_over(ctx: &mut PhaseContext<'_, '_>) -> PhaseStep {
    ctx.battle.outcome = Some(BattleOutcome::Defeat);
    ctx.battle.run_end = Some(RunEnd::Defeat);
    ctx.queue.clear_all();
    *ctx.encounter = None;
    ctx.show_line("Your party has no one left to fight.", None)
}

fn new_battle(ctx: &mut PhaseContext<'_, '_>) -> PhaseStep {
    ctx.battle.wave += 1;
    match ctx.collab.rules.next_wave(ctx.battle) {
        NextWave::Battle(setup) => {
            ctx.battle.load_battle(&setup);
            match setup.intro {
                Some(intro) => ctx.show_line(&intro, None),
                None => PhaseStep::Done,
            }
        }
        NextWave::Encounter(encounter) => {
            *ctx.encounter = Some(ActiveEncounter::new(encounter));
            ctx.queue.enqueue_append(PhaseKind::EncounterStart);
            PhaseStep::Done
        }
        NextWave::Cleared => {
            log::debug!("no wave follows wave {}; run cleared", ctx.battle.wave - 1);
            ctx.battle.run_end = Some(RunEnd::Cleared);
            PhaseStep::Done
        }
    }
}

fn encounter_start(ctx: &mut PhaseContext<'_, '_>) -> Result<PhaseStep, EngineError> {
    let wave = ctx.battle.wave;
    let active = ctx.active_encounter(PhaseName::EncounterStart)?;
    active.intro_line = 0;
    let seen = SeenEncounter {
        encounter_id: active.encounter.id.clone(),
        wave,
        selected_option: None,
    };
    ctx.queue.clear_all();
    ctx.battle.seen_encounters.push(seen);
    encounter_start_next(ctx)
}

/// Next intro line, the option prompt, or the next selected-dialogue line.
fn encounter_start_next(ctx: &mut PhaseContext<'_, '_>) -> Result<PhaseStep, EngineError> {
    let active = ctx.active_encounter(PhaseName::EncounterStart)?;
    match active.resolution.state() {
        ResolutionState::AwaitingSelection => {
            if let Some(line) = active.encounter.intro.get(active.intro_line).cloned() {
                active.intro_line += 1;
                return Ok(ctx.show_line(&line.text, line.speaker.as_deref()));
            }
            prompt_options(ctx)
        }
        ResolutionState::DialogueSelected { .. } => play_selected_dialogue(ctx),
        other => Err(EngineError::InvalidTransition {
            state: other.to_string(),
            action: "continue encounter start",
        }),
    }
}

fn prompt_options(ctx: &mut PhaseContext<'_, '_>) -> Result<PhaseStep, EngineError> {
    let active = ctx
        .encounter
        .as_ref()
        .ok_or(EngineError::NoActiveEncounter {
            phase: PhaseName::EncounterStart,
        })?;
    let view = RequirementView {
        battle: ctx.battle,
        store: &*ctx.collab.store,
    };
    let options = active.encounter.visible_options(&view);
    let title = active.encounter.title.clone();
    let token = ctx.mint_token();
    ctx.collab.presenter.prompt_options(token, &title, &options);
    Ok(PhaseStep::Suspended(token))
}

fn option_chosen(index: usize, ctx: &mut PhaseContext<'_, '_>) -> Result<PhaseStep, EngineError> {
    let active = ctx
        .encounter
        .as_mut()
        .ok_or(EngineError::NoActiveEncounter {
            phase: PhaseName::EncounterStart,
        })?;
    let view = RequirementView {
        battle: ctx.battle,
        store: &*ctx.collab.store,
    };
    if let Err(rejected) = active.resolution.select(&active.encounter, index, &view) {
        log::warn!(target: LOG_OPTION_REJECTED, "{}: {rejected}", active.encounter.id);
        return prompt_options(ctx);
    }
    let option = active.resolution.enter_pre_hook()?;

    let outcome = with_hook_context(ctx, PhaseName::EncounterStart, |active, hooks| {
        match active
            .encounter
            .options
            .get_mut(option)
            .and_then(|opt| opt.pre.as_mut())
        {
            Some(hook) => hook(hooks),
            None => Ok(HookOutcome::Continue),
        }
    })?;
    let proceed = outcome == HookOutcome::Continue;
    ctx.active_encounter(PhaseName::EncounterStart)?
        .resolution
        .finish_pre_hook(proceed)?;
    if !proceed {
        return prompt_options(ctx);
    }
    if let Some(seen) = ctx.battle.seen_encounters.last_mut() {
        seen.selected_option = Some(option);
    }
    play_selected_dialogue(ctx)
}

fn play_selected_dialogue(ctx: &mut PhaseContext<'_, '_>) -> Result<PhaseStep, EngineError> {
    let active = ctx.active_encounter(PhaseName::EncounterStart)?;
    let lines = active
        .resolution
        .selected()
        .and_then(|option| active.encounter.options.get(option))
        .map_or(&[][..], |opt| opt.selected_dialogue.as_slice());
    let next = active.resolution.advance_dialogue(lines.len())?;
    match next.and_then(|line| lines.get(line).cloned()) {
        Some(line) => Ok(ctx.show_line(&line.text, line.speaker.as_deref())),
        None => {
            ctx.queue.enqueue_append(PhaseKind::EncounterOptionSelected);
            Ok(PhaseStep::Done)
        }
    }
}

/// Run a hook against the encounter with a fresh hook context, then fold the
/// effects it requested back into the encounter.
fn with_hook_context<T>(
    ctx: &mut PhaseContext<'_, '_>,
    phase: PhaseName,
    call: impl FnOnce(&mut ActiveEncounter, &mut HookContext<'_>) -> Result<T, EngineError>,
) -> Result<T, EngineError> {
    let active = ctx
        .encounter
        .as_mut()
        .ok_or(EngineError::NoActiveEncounter { phase })?;
    let mut hooks = HookContext::new(ctx.battle, ctx.queue, &mut *ctx.collab.store, ctx.rng);
    let value = call(active, &mut hooks)?;
    active.absorb(hooks.into_effects());
    Ok(value)
}

fn encounter_option_selected(ctx: &mut PhaseContext<'_, '_>) -> Result<PhaseStep, EngineError> {
    let phase = PhaseName::EncounterOptionSelected;
    let option = match ctx.active_encounter(phase)?.resolution.state() {
        ResolutionState::MainHook { option } => option,
        other => {
            return Err(EngineError::InvalidTransition {
                state: other.to_string(),
                action: "run the main hook",
            });
        }
    };
    with_hook_context(ctx, phase, |active, hooks| {
        match active
            .encounter
            .options
            .get_mut(option)
            .and_then(|opt| opt.main.as_mut())
        {
            Some(hook) => hook(hooks),
            None => Ok(()),
        }
    })?;
    let active = ctx.active_encounter(phase)?;
    active.resolution.finish_main_hook()?;
    match active.take_pending_battle() {
        Some(setup) => ctx.queue.enqueue_append(PhaseKind::EncounterBattle { setup }),
        None => ctx.queue.enqueue_append(PhaseKind::EncounterRewards),
    };
    Ok(PhaseStep::Done)
}

fn encounter_battle(
    setup: &BattleSetup,
    ctx: &mut PhaseContext<'_, '_>,
) -> Result<PhaseStep, EngineError> {
    ctx.active_encounter(PhaseName::EncounterBattle)?
        .note_battle_started();
    ctx.battle.load_battle(setup);
    if let Some(intro) = &setup.intro {
        ctx.queue.queue_message(intro.clone(), true);
    }
    ctx.queue.enqueue_append(PhaseKind::EncounterBattleCleanup);
    Ok(PhaseStep::Done)
}

fn encounter_battle_cleanup(ctx: &mut PhaseContext<'_, '_>) -> PhaseStep {
    ctx.queue.remove_all_of(PhaseName::PostTurnStatusEffect);
    if ctx.battle.side_defeated(Side::Player) {
        ctx.queue.enqueue_append(PhaseKind::GameOver);
        return PhaseStep::Done;
    }
    let slots = if ctx.battle.double { 2 } else { 1 };
    for slot in 0..slots {
        let battler = BattlerIndex::from_side_slot(Side::Player, slot);
        if ctx.battle.battler(battler).is_some_and(|c| !c.is_fainted()) {
            continue;
        }
        match ctx.battle.next_replacement(Side::Player) {
            Some(party_slot) => ctx.battle.place(battler, party_slot),
            None => ctx.battle.vacate(battler),
        }
    }
    PhaseStep::Done
}

fn encounter_rewards(ctx: &mut PhaseContext<'_, '_>) -> Result<PhaseStep, EngineError> {
    let phase = PhaseName::EncounterRewards;
    if ctx.active_encounter(phase)?.has_continue_hook() {
        let outcome = with_hook_context(ctx, phase, |active, hooks| {
            match active.continue_hook.as_mut() {
                Some(hook) => hook(hooks),
                None => Ok(ContinueOutcome::Exhausted),
            }
        })?;
        let active = ctx.active_encounter(phase)?;
        match outcome {
            ContinueOutcome::Continue => {
                let setup = active
                    .take_pending_battle()
                    .ok_or_else(|| EngineError::PhaseFailed {
                        phase,
                        message: "continue hook reported another battle but started none".into(),
                    })?;
                ctx.queue.enqueue_append(PhaseKind::EncounterBattle { setup });
                return Ok(PhaseStep::Done);
            }
            ContinueOutcome::Exhausted => active.continue_hook = None,
        }
    }

    let active = ctx.active_encounter(phase)?;
    let grant = active.rewards.take().unwrap_or_default();
    active.note_rewards_granted();
    if grant.money > 0 {
        ctx.collab.store.add_money(grant.money)?;
    }
    if grant.vouchers > 0 {
        ctx.collab.store.add_vouchers(grant.vouchers)?;
    }
    if let Some(request) = grant.request {
        ctx.queue.enqueue_append(PhaseKind::SelectReward {
            request,
            offer: None,
            rerolls: 0,
        });
    }
    ctx.queue
        .enqueue_append(PhaseKind::PostEncounter { outro_line: 0 });
    Ok(PhaseStep::Done)
}

fn post_encounter(
    outro_line: &mut usize,
    ctx: &mut PhaseContext<'_, '_>,
) -> Result<PhaseStep, EngineError> {
    let phase = PhaseName::PostEncounter;
    let post_option = match ctx.active_encounter(phase)?.resolution.state() {
        ResolutionState::PostHook { option } if *outro_line == 0 => Some(option),
        _ => None,
    };
    if let Some(option) = post_option {
        with_hook_context(ctx, phase, |active, hooks| {
            match active
                .encounter
                .options
                .get_mut(option)
                .and_then(|opt| opt.post.as_mut())
            {
                Some(hook) => hook(hooks),
                None => Ok(()),
            }
        })?;
        ctx.active_encounter(phase)?.resolution.finish_post_hook()?;
    }
    let active = ctx.active_encounter(phase)?;
    if let Some(line) = active.encounter.outro.get(*outro_line).cloned() {
        *outro_line += 1;
        return Ok(ctx.show_line(&line.text, line.speaker.as_deref()));
    }
    *ctx.encounter = None;
    ctx.queue.enqueue_append(PhaseKind::NewBattle);
    Ok(PhaseStep::Done)
}

fn build_offer(
    ctx: &PhaseContext<'_, '_>,
    request: &RewardRequest,
    rerolls: u32,
    locked_tiers: &[Option<RewardTier>],
) -> RewardOffer {
    let unlocks = ctx.collab.store.unlock_snapshot();
    let party = ctx.battle.party_snapshot(unlocks.clone());
    let standard;
    let pools = match ctx.pools {
        Some(pools) => pools,
        None => {
            standard = standard_pools(&unlocks, &ctx.cfg.rewards.default_reward);
            &standard
        }
    };
    let offer_ctx = OfferContext {
        pools,
        party: &party,
        cfg: &ctx.cfg.rewards,
        wave: ctx.battle.wave,
        reroll: rerolls,
    };
    generate_offer(&offer_ctx, request, locked_tiers, &mut *ctx.rng.reward())
}

fn present_offer(offer: &RewardOffer, ctx: &mut PhaseContext<'_, '_>) -> PhaseStep {
    let token = ctx.mint_token();
    ctx.collab.presenter.offer_rewards(token, offer);
    PhaseStep::Suspended(token)
}

fn select_reward_resume(
    request: &RewardRequest,
    offer: &mut Option<RewardOffer>,
    rerolls: &mut u32,
    signal: ResumeSignal,
    ctx: &mut PhaseContext<'_, '_>,
) -> Result<PhaseStep, EngineError> {
    let current = offer.as_ref().ok_or_else(|| EngineError::InvalidTransition {
        state: "no offer presented".into(),
        action: "resolve a reward choice",
    })?;
    match signal {
        ResumeSignal::RewardChosen { index } => {
            let option = current
                .options
                .get(index)
                .ok_or(EngineError::InvalidSelection {
                    index,
                    available: current.options.len(),
                })?;
            ctx.collab.store.grant_reward(&option.id)?;
            log::debug!("granted reward {} (tier {:?})", option.id, option.tier);
            Ok(PhaseStep::Done)
        }
        ResumeSignal::Reroll => {
            let cost = current
                .reroll_cost
                .filter(|_| request.allow_reroll)
                .ok_or(EngineError::RerollUnavailable)?;
            let available = ctx.collab.store.money();
            if available < cost {
                return Err(EngineError::RerollUnaffordable { cost, available });
            }
            let locked: Vec<Option<RewardTier>> = if request.lock_tiers {
                current
                    .options
                    .iter()
                    .skip(request.guaranteed.len())
                    .map(|option| option.tier)
                    .collect()
            } else {
                Vec::new()
            };
            ctx.collab.store.spend_money(cost)?;
            *rerolls += 1;
            let fresh = build_offer(ctx, request, *rerolls, &locked);
            Ok(present_offer(offer.insert(fresh), ctx))
        }
        _ => Ok(PhaseStep::Done),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::Combatant;
    use crate::rewards::{RewardId, RewardOption};
    use crate::test_support::{FlatRules, MemoryStore, RecordingPresenter};

    struct Fixture {
        battle: BattleState,
        queue: PhaseQueue,
        encounter: Option<ActiveEncounter>,
        presenter: RecordingPresenter,
        rules: FlatRules,
        store: MemoryStore,
        rng: RngBundle,
        cfg: EngineConfig,
        next_token: u64,
    }

    impl Fixture {
        fn new() -> Self {
            let mut battle = BattleState::new(vec![
                Combatant::new("Ember", 40, 50),
                Combatant::new("Drift", 40, 30),
            ]);
            battle.load_battle(&BattleSetup {
                trainer: None,
                enemies: vec![Combatant::new("Gnat", 10, 20)],
                double: false,
                intro: None,
            });
            Self {
                battle,
                queue: PhaseQueue::new(),
                encounter: None,
                presenter: RecordingPresenter::default(),
                rules: FlatRules::new(15),
                store: MemoryStore::with_money(1_000),
                rng: RngBundle::from_user_seed(11),
                cfg: EngineConfig::default(),
                next_token: 0,
            }
        }

        fn start(&mut self, mut kind: PhaseKind) -> Result<PhaseStep, EngineError> {
            let mut collab =
                Collaborators::new(&mut self.presenter, &self.rules, &mut self.store);
            let mut ctx = PhaseContext {
                battle: &mut self.battle,
                queue: &mut self.queue,
                encounter: &mut self.encounter,
                collab: &mut collab,
                rng: &self.rng,
                pools: None,
                cfg: &self.cfg,
                next_token: &mut self.next_token,
            };
            start(&mut kind, &mut ctx)
        }
    }

    #[test]
    fn move_queues_messages_before_faints() {
        let mut fx = Fixture::new();
        let step = fx
            .start(PhaseKind::Move {
                battler: BattlerIndex::Player,
                party_slot: 0,
                command: Command::Fight {
                    move_id: "ember".into(),
                    target: BattlerIndex::Enemy,
                },
            })
            .unwrap();
        assert_eq!(step, PhaseStep::Done);
        assert_eq!(fx.queue.names(), vec![PhaseName::Message, PhaseName::Faint]);
        assert_eq!(fx.battle.log, vec!["Ember used ember!".to_string()]);
    }

    #[test]
    fn move_from_a_replaced_member_is_skipped() {
        let mut fx = Fixture::new();
        fx.battle.place(BattlerIndex::Player, 1);
        let step = fx
            .start(PhaseKind::Move {
                battler: BattlerIndex::Player,
                party_slot: 0,
                command: Command::Fight {
                    move_id: "ember".into(),
                    target: BattlerIndex::Enemy,
                },
            })
            .unwrap();
        assert_eq!(step, PhaseStep::Done);
        assert!(fx.queue.is_empty());
        assert_eq!(fx.battle.enemy_party[0].hp, 10);
    }

    #[test]
    fn wiped_side_faint_leads_to_victory() {
        let mut fx = Fixture::new();
        fx.battle.enemy_party[0].hp = 0;
        fx.start(PhaseKind::Faint {
            battler: BattlerIndex::Enemy,
        })
        .unwrap();
        assert_eq!(fx.queue.names(), vec![PhaseName::Message, PhaseName::Victory]);
    }

    #[test]
    fn fainted_player_is_replaced() {
        let mut fx = Fixture::new();
        fx.battle.player_party[0].hp = 0;
        fx.start(PhaseKind::Faint {
            battler: BattlerIndex::Player,
        })
        .unwrap();
        assert_eq!(
            fx.queue.names(),
            vec![PhaseName::Message, PhaseName::SwitchSummon]
        );
    }

    #[test]
    fn turn_start_orders_switches_first() {
        let mut fx = Fixture::new();
        fx.battle.turn = 1;
        fx.battle.commands.insert(
            BattlerIndex::Player,
            Command::Switch { party_slot: 1 },
        );
        fx.battle.commands.insert(
            BattlerIndex::Enemy,
            Command::Fight {
                move_id: "bite".into(),
                target: BattlerIndex::Player,
            },
        );
        fx.start(PhaseKind::TurnStart).unwrap();
        assert_eq!(
            fx.battle.last_turn_order,
            vec![BattlerIndex::Player, BattlerIndex::Enemy]
        );
        assert_eq!(
            fx.queue.names(),
            vec![
                PhaseName::SwitchSummon,
                PhaseName::Move,
                PhaseName::PostTurnStatusEffect,
                PhaseName::PostTurnStatusEffect,
                PhaseName::WeatherEffect,
                PhaseName::Berry,
                PhaseName::CheckStatusEffect,
                PhaseName::TurnEnd,
            ]
        );
    }

    #[test]
    fn stale_override_falls_back_to_speed_order() {
        let mut fx = Fixture::new();
        fx.battle.turn = 1;
        fx.battle
            .set_turn_order_override(vec![BattlerIndex::Enemy, BattlerIndex::Player])
            .unwrap();
        fx.battle.enemy_party[0].hp = 0;
        assert_eq!(fx.start(PhaseKind::TurnStart).unwrap(), PhaseStep::Done);
        assert_eq!(fx.battle.last_turn_order, vec![BattlerIndex::Player]);
        assert_eq!(fx.battle.turn_order_override(), None);
    }

    #[test]
    fn victory_drops_turn_work_and_schedules_rewards() {
        let mut fx = Fixture::new();
        fx.queue.enqueue_append(PhaseKind::Move {
            battler: BattlerIndex::Enemy,
            party_slot: 0,
            command: Command::Pass,
        });
        fx.queue.queue_turn_end_phases();
        fx.queue.queue_message("kept", true);
        fx.start(PhaseKind::Victory).unwrap();
        assert_eq!(fx.battle.outcome, Some(BattleOutcome::Victory));
        assert_eq!(
            fx.queue.names(),
            vec![
                PhaseName::Message,
                PhaseName::SelectReward,
                PhaseName::NewBattle
            ]
        );
    }

    #[test]
    fn locked_reroll_keeps_tiers_in_their_slots() {
        let mut fx = Fixture::new();
        let option = |id: &str, tier| RewardOption {
            id: RewardId::new(id),
            tier,
        };
        let mut kind = PhaseKind::SelectReward {
            request: RewardRequest {
                lock_tiers: true,
                ..RewardRequest::standard()
            },
            offer: Some(RewardOffer {
                options: vec![
                    option("HYPER_POTION", Some(RewardTier::Ultra)),
                    option("POKEBALL", None),
                    option("POTION", Some(RewardTier::Common)),
                ],
                reroll_cost: Some(100),
                tier_rolls: Vec::new(),
                attempts: 3,
                traces: Vec::new(),
            }),
            rerolls: 0,
        };
        let mut collab = Collaborators::new(&mut fx.presenter, &fx.rules, &mut fx.store);
        let mut ctx = PhaseContext {
            battle: &mut fx.battle,
            queue: &mut fx.queue,
            encounter: &mut fx.encounter,
            collab: &mut collab,
            rng: &fx.rng,
            pools: None,
            cfg: &fx.cfg,
            next_token: &mut fx.next_token,
        };
        let step = resume(&mut kind, ResumeSignal::Reroll, &mut ctx).unwrap();
        assert!(matches!(step, PhaseStep::Suspended(_)));
        let PhaseKind::SelectReward {
            offer: Some(offer),
            rerolls,
            ..
        } = kind
        else {
            panic!("reroll dropped the offer");
        };
        assert_eq!(rerolls, 1);
        assert_eq!(offer.options[0].tier, Some(RewardTier::Ultra));
        assert_eq!(offer.options[2].tier, Some(RewardTier::Common));
        assert_eq!(offer.tier_rolls.len(), 1);
    }

    #[test]
    fn unexpected_signal_is_a_precondition_error() {
        let mut fx = Fixture::new();
        let mut kind = PhaseKind::TurnInit;
        let mut collab = Collaborators::new(&mut fx.presenter, &fx.rules, &mut fx.store);
        let mut ctx = PhaseContext {
            battle: &mut fx.battle,
            queue: &mut fx.queue,
            encounter: &mut fx.encounter,
            collab: &mut collab,
            rng: &fx.rng,
            pools: None,
            cfg: &fx.cfg,
            next_token: &mut fx.next_token,
        };
        let err = resume(&mut kind, ResumeSignal::Reroll, &mut ctx).unwrap_err();
        assert!(err.is_precondition());
    }
}
