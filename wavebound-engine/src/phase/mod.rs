//! Phase model for the battle scheduler.
//!
//! A phase is one discrete, possibly suspending step of turn or encounter
//! logic. The set of kinds is closed: dispatch in [`handlers`] is an
//! exhaustive match, so adding a kind is a compile-checked change.

pub(crate) mod handlers;
pub mod manager;
pub mod queue;

use crate::battle::{BattleSetup, BattlerIndex, Command};
use crate::rewards::{RewardOffer, RewardRequest};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use manager::{PhaseManager, RunStatus};
pub use queue::PhaseQueue;

/// Identifier assigned to a phase when it enters the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PhaseId(pub u64);

/// Handle a suspended phase waits on; collaborators hand it back on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResumeToken(pub u64);

impl fmt::Display for ResumeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Result of starting or resuming a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseStep {
    /// The phase has ended; the manager may advance.
    Done,
    /// The phase holds the current slot until this token is resumed.
    Suspended(ResumeToken),
}

/// Completion event delivered by the embedding application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeEvent {
    pub token: ResumeToken,
    pub signal: ResumeSignal,
}

impl ResumeEvent {
    #[must_use]
    pub const fn new(token: ResumeToken, signal: ResumeSignal) -> Self {
        Self { token, signal }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResumeSignal {
    /// Text, dialogue, or animation playback finished.
    Completed,
    CommandChosen { command: Command },
    OptionChosen { index: usize },
    RewardChosen { index: usize },
    Reroll,
    SkipRewards,
}

impl ResumeSignal {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::CommandChosen { .. } => "command-chosen",
            Self::OptionChosen { .. } => "option-chosen",
            Self::RewardChosen { .. } => "reward-chosen",
            Self::Reroll => "reroll",
            Self::SkipRewards => "skip-rewards",
        }
    }
}

/// Every step kind the scheduler knows how to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PhaseKind {
    TurnInit,
    Command {
        battler: BattlerIndex,
    },
    TurnStart,
    Move {
        battler: BattlerIndex,
        /// Party member that chose the move; a replacement never inherits it.
        party_slot: usize,
        command: Command,
    },
    Faint {
        battler: BattlerIndex,
    },
    SwitchSummon {
        battler: BattlerIndex,
        party_slot: usize,
    },
    Message {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        speaker: Option<String>,
    },
    WeatherEffect,
    Berry,
    CheckStatusEffect,
    PostTurnStatusEffect {
        battler: BattlerIndex,
    },
    TurnEnd {
        #[serde(default)]
        interlude: bool,
    },
    Victory,
    GameOver,
    EncounterStart,
    EncounterOptionSelected,
    EncounterBattle {
        setup: BattleSetup,
    },
    EncounterBattleCleanup,
    EncounterRewards,
    PostEncounter {
        #[serde(default)]
        outro_line: usize,
    },
    SelectReward {
        request: RewardRequest,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        offer: Option<RewardOffer>,
        #[serde(default)]
        rerolls: u32,
    },
    NewBattle,
}

impl PhaseKind {
    #[must_use]
    pub const fn name(&self) -> PhaseName {
        match self {
            Self::TurnInit => PhaseName::TurnInit,
            Self::Command { .. } => PhaseName::Command,
            Self::TurnStart => PhaseName::TurnStart,
            Self::Move { .. } => PhaseName::Move,
            Self::Faint { .. } => PhaseName::Faint,
            Self::SwitchSummon { .. } => PhaseName::SwitchSummon,
            Self::Message { .. } => PhaseName::Message,
            Self::WeatherEffect => PhaseName::WeatherEffect,
            Self::Berry => PhaseName::Berry,
            Self::CheckStatusEffect => PhaseName::CheckStatusEffect,
            Self::PostTurnStatusEffect { .. } => PhaseName::PostTurnStatusEffect,
            Self::TurnEnd { .. } => PhaseName::TurnEnd,
            Self::Victory => PhaseName::Victory,
            Self::GameOver => PhaseName::GameOver,
            Self::EncounterStart => PhaseName::EncounterStart,
            Self::EncounterOptionSelected => PhaseName::EncounterOptionSelected,
            Self::EncounterBattle { .. } => PhaseName::EncounterBattle,
            Self::EncounterBattleCleanup => PhaseName::EncounterBattleCleanup,
            Self::EncounterRewards => PhaseName::EncounterRewards,
            Self::PostEncounter { .. } => PhaseName::PostEncounter,
            Self::SelectReward { .. } => PhaseName::SelectReward,
            Self::NewBattle => PhaseName::NewBattle,
        }
    }

    /// Battler this phase acts for, if any.
    #[must_use]
    pub const fn battler(&self) -> Option<BattlerIndex> {
        match self {
            Self::Command { battler }
            | Self::Move { battler, .. }
            | Self::Faint { battler }
            | Self::SwitchSummon { battler, .. }
            | Self::PostTurnStatusEffect { battler } => Some(*battler),
            _ => None,
        }
    }

    #[must_use]
    pub fn message(text: impl Into<String>) -> Self {
        Self::Message {
            text: text.into(),
            speaker: None,
        }
    }

    #[must_use]
    pub fn dialogue(text: impl Into<String>, speaker: impl Into<String>) -> Self {
        Self::Message {
            text: text.into(),
            speaker: Some(speaker.into()),
        }
    }
}

/// Payload-free tag of a [`PhaseKind`], used for logging and predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseName {
    TurnInit,
    Command,
    TurnStart,
    Move,
    Faint,
    SwitchSummon,
    Message,
    WeatherEffect,
    Berry,
    CheckStatusEffect,
    PostTurnStatusEffect,
    TurnEnd,
    Victory,
    GameOver,
    EncounterStart,
    EncounterOptionSelected,
    EncounterBattle,
    EncounterBattleCleanup,
    EncounterRewards,
    PostEncounter,
    SelectReward,
    NewBattle,
}

impl fmt::Display for PhaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A queued unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub id: PhaseId,
    pub kind: PhaseKind,
}

impl Phase {
    #[must_use]
    pub const fn name(&self) -> PhaseName {
        self.kind.name()
    }

    #[must_use]
    pub fn is(&self, name: PhaseName) -> bool {
        self.name() == name
    }
}
