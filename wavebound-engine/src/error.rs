//! Error taxonomy for the battle core.
//!
//! Precondition violations are rejected without touching engine state. Every
//! other variant raised while a phase is current stalls the manager for good.

use crate::battle::BattlerIndex;
use crate::phase::{PhaseName, ResumeToken};
use crate::turn_order::TurnOrderError;
use thiserror::Error;

/// Errors surfaced by the scheduler and the phases it runs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("resume token {got} does not match the suspended phase (expected {expected:?})")]
    ResumeMismatch {
        expected: Option<ResumeToken>,
        got: ResumeToken,
    },
    #[error("no phase is suspended; nothing to resume")]
    NotSuspended,
    #[error("{phase} cannot handle a {event} event")]
    UnexpectedEvent {
        phase: PhaseName,
        event: &'static str,
    },
    #[error("scheduler stalled after {phase} failed: {reason}")]
    Stalled { phase: PhaseName, reason: String },
    #[error("{phase} failed: {message}")]
    PhaseFailed { phase: PhaseName, message: String },
    #[error("run exceeded the step budget of {limit} phases")]
    StepBudgetExceeded { limit: u32 },
    #[error("{phase} requires an active encounter")]
    NoActiveEncounter { phase: PhaseName },
    #[error("encounter hook failed: {0}")]
    Hook(String),
    #[error("selection {index} is out of range ({available} available)")]
    InvalidSelection { index: usize, available: usize },
    #[error("rerolling is not available for this offer")]
    RerollUnavailable,
    #[error("reroll costs {cost} but only {available} is available")]
    RerollUnaffordable { cost: u64, available: u64 },
    #[error("invalid command for {battler}: {reason}")]
    InvalidCommand {
        battler: BattlerIndex,
        reason: &'static str,
    },
    #[error("cannot {action} while {state}")]
    InvalidTransition { state: String, action: &'static str },
    #[error(transparent)]
    TurnOrder(#[from] TurnOrderError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl EngineError {
    /// Whether the error is a caller mistake that leaves engine state intact.
    #[must_use]
    pub const fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::ResumeMismatch { .. }
                | Self::NotSuspended
                | Self::UnexpectedEvent { .. }
                | Self::InvalidSelection { .. }
                | Self::RerollUnavailable
                | Self::RerollUnaffordable { .. }
                | Self::InvalidCommand { .. }
        )
    }
}

/// Failures reported by a [`crate::ProgressStore`] implementation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("progress store unavailable: {0}")]
    Unavailable(String),
    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: u64, available: u64 },
    #[error("progress store rejected write to {key}")]
    Rejected { key: String },
}

/// Errors raised when engine configuration invariants are violated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be at least {min} (got {value})")]
    MinViolation {
        field: &'static str,
        min: u64,
        value: u64,
    },
    #[error("tier thresholds must strictly decrease (common {common}, great {great}, ultra {ultra})")]
    TierThresholdOrder { common: u32, great: u32, ultra: u32 },
    #[error("tier threshold {value} must be below the roll denominator {denominator}")]
    TierThresholdRange { value: u32, denominator: u32 },
    #[error("default reward id must not be empty")]
    EmptyDefaultReward,
    #[error("configuration could not be parsed: {0}")]
    Parse(String),
}
