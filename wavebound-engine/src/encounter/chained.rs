//! Encounters that fight several opponents before paying out once.

use super::{ContinueOutcome, DialogueLine, Encounter, EncounterOption, EncounterRewardSpec};
use crate::battle::BattleSetup;
use std::collections::VecDeque;

/// A gauntlet of trainer battles. Accepting fights every roster in order;
/// rewards are granted once after the last one.
#[must_use]
pub fn chained_trainer_challenge(
    id: impl Into<String>,
    title: impl Into<String>,
    trainers: Vec<BattleSetup>,
    rewards: EncounterRewardSpec,
) -> Encounter {
    let mut roster = Some(trainers);
    let accept = EncounterOption::new("Accept the challenge").on_main(move |ctx| {
        let mut remaining: VecDeque<BattleSetup> = roster.take().unwrap_or_default().into();
        let Some(first) = remaining.pop_front() else {
            ctx.set_rewards(rewards.clone());
            ctx.leave_without_battle();
            return Ok(());
        };
        log::debug!("gauntlet starts, {} opponents queued", remaining.len());
        ctx.start_battle(first);
        let payout = rewards.clone();
        ctx.set_continue(Box::new(move |ctx| match remaining.pop_front() {
            Some(next) => {
                ctx.start_battle(next);
                Ok(ContinueOutcome::Continue)
            }
            None => {
                ctx.set_rewards(payout.clone());
                Ok(ContinueOutcome::Exhausted)
            }
        }));
        Ok(())
    });
    let decline = EncounterOption::new("Walk away").on_main(|ctx| {
        ctx.leave_without_battle();
        Ok(())
    });

    Encounter::new(id, title)
        .with_intro(DialogueLine::text("A line of trainers blocks the road."))
        .with_option(accept)
        .with_option(decline)
}
