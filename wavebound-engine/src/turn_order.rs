//! Per-turn action ordering.
//!
//! Order is priority first, then speed, with exact ties broken by a seeded
//! shuffle that runs before a stable sort. Scripted encounters can bypass
//! the comparison entirely with an override, which is still validated
//! against the active battlers.

use crate::battle::BattlerIndex;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::cmp::Reverse;
use thiserror::Error;

pub type TurnOrder = SmallVec<[BattlerIndex; 4]>;

/// Ordering inputs for one battler this turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnCandidate {
    pub battler: BattlerIndex,
    pub priority: i8,
    pub speed: u32,
}

impl TurnCandidate {
    #[must_use]
    pub const fn new(battler: BattlerIndex, priority: i8, speed: u32) -> Self {
        Self {
            battler,
            priority,
            speed,
        }
    }
}

/// Everything `resolve_turn_order` needs for one turn.
#[derive(Debug, Clone, Copy)]
pub struct TurnOrderRequest<'a> {
    /// Battlers expected to act; every one must have exactly one candidate.
    pub active: &'a [BattlerIndex],
    pub candidates: &'a [TurnCandidate],
    pub tie_break_seed: u64,
    /// A fully custom order that replaces priority/speed comparison.
    pub override_order: Option<&'a [BattlerIndex]>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TurnOrderError {
    #[error("battler {0} appears more than once")]
    DuplicateBattler(BattlerIndex),
    #[error("battler {0} is active but has no turn candidate")]
    MissingBattler(BattlerIndex),
    #[error("battler {0} is not active this turn")]
    UnknownBattler(BattlerIndex),
}

/// Compute the action order for a turn.
///
/// # Errors
///
/// Returns `TurnOrderError` for duplicate candidates, active battlers without
/// a candidate, candidates that are not active, or an override that is not a
/// permutation of the active battlers.
pub fn resolve_turn_order(request: &TurnOrderRequest<'_>) -> Result<TurnOrder, TurnOrderError> {
    if let Some(custom) = request.override_order {
        return validate_override(request.active, custom);
    }

    ensure_unique(request.candidates.iter().map(|c| c.battler))?;
    for candidate in request.candidates {
        if !request.active.contains(&candidate.battler) {
            return Err(TurnOrderError::UnknownBattler(candidate.battler));
        }
    }
    for battler in request.active {
        if !request.candidates.iter().any(|c| c.battler == *battler) {
            return Err(TurnOrderError::MissingBattler(*battler));
        }
    }

    Ok(order_by_priority_speed(
        request.candidates,
        request.tie_break_seed,
    ))
}

/// Priority-then-speed ordering with a seeded shuffle for exact ties.
///
/// Candidates are assumed unique; use [`resolve_turn_order`] for validation.
#[must_use]
pub fn order_by_priority_speed(candidates: &[TurnCandidate], seed: u64) -> TurnOrder {
    let mut shuffled: SmallVec<[TurnCandidate; 4]> = candidates.iter().copied().collect();
    // Canonical order before shuffling; the result depends only on the seed.
    shuffled.sort_by_key(|c| c.battler);
    let mut rng = SmallRng::seed_from_u64(seed);
    shuffled.shuffle(&mut rng);
    shuffled.sort_by_key(|c| (Reverse(c.priority), Reverse(c.speed)));
    shuffled.into_iter().map(|c| c.battler).collect()
}

/// Check that `custom` is a permutation of `active`.
pub(crate) fn validate_override(
    active: &[BattlerIndex],
    custom: &[BattlerIndex],
) -> Result<TurnOrder, TurnOrderError> {
    ensure_unique(custom.iter().copied())?;
    for battler in custom {
        if !active.contains(battler) {
            return Err(TurnOrderError::UnknownBattler(*battler));
        }
    }
    for battler in active {
        if !custom.contains(battler) {
            return Err(TurnOrderError::MissingBattler(*battler));
        }
    }
    Ok(custom.iter().copied().collect())
}

fn ensure_unique<I>(battlers: I) -> Result<(), TurnOrderError>
where
    I: IntoIterator<Item = BattlerIndex>,
{
    let mut seen: SmallVec<[BattlerIndex; 4]> = SmallVec::new();
    for battler in battlers {
        if seen.contains(&battler) {
            return Err(TurnOrderError::DuplicateBattler(battler));
        }
        seen.push(battler);
    }
    Ok(())
}
