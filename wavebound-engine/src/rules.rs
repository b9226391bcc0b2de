//! Values exchanged with the combat-rules collaborator.

use crate::battle::{BattleSetup, BattlerIndex};
use crate::encounter::Encounter;
use serde::{Deserialize, Serialize};

/// HP change for one battler. Negative deltas are damage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HpDelta {
    pub target: BattlerIndex,
    pub delta: i32,
}

impl HpDelta {
    #[must_use]
    pub const fn damage(target: BattlerIndex, amount: u32) -> Self {
        Self {
            target,
            delta: 0_i32.saturating_sub_unsigned(amount),
        }
    }

    #[must_use]
    pub const fn heal(target: BattlerIndex, amount: u32) -> Self {
        Self {
            target,
            delta: 0_i32.saturating_add_unsigned(amount),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveResolution {
    #[serde(default)]
    pub hp_changes: Vec<HpDelta>,
    #[serde(default)]
    pub messages: Vec<String>,
    /// Animation to play before the move phase ends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cue: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "battler", rename_all = "snake_case")]
pub enum EndOfTurnEffect {
    Weather,
    Berry,
    StatusCheck,
    PostTurnStatus(BattlerIndex),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectResolution {
    #[serde(default)]
    pub hp_changes: Vec<HpDelta>,
    #[serde(default)]
    pub messages: Vec<String>,
}

/// What follows a cleared wave.
#[derive(Debug)]
pub enum NextWave {
    Battle(BattleSetup),
    Encounter(Encounter),
    /// No further waves; the run is over.
    Cleared,
}
