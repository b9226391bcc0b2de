//! Option-selection state machine for an active encounter.
//!
//! ```text
//! AwaitingSelection -> Validating -> PreHook -> DialogueSelected* -> MainHook
//!        ^                 |            |                              |
//!        +-----------------+------------+ (rejected / retry)       PostHook
//!                                                                      |
//!                                                                Continuation
//! ```

use super::{Encounter, OptionMode, RequirementView};
use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ResolutionState {
    AwaitingSelection,
    Validating { option: usize },
    PreHook { option: usize },
    DialogueSelected { option: usize, line: usize },
    MainHook { option: usize },
    PostHook { option: usize },
    Continuation { option: usize },
}

impl fmt::Display for ResolutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingSelection => f.write_str("awaiting selection"),
            Self::Validating { option } => write!(f, "validating option {option}"),
            Self::PreHook { option } => write!(f, "running pre hook of option {option}"),
            Self::DialogueSelected { option, line } => {
                write!(f, "playing line {line} of option {option}")
            }
            Self::MainHook { option } => write!(f, "running main hook of option {option}"),
            Self::PostHook { option } => write!(f, "running post hook of option {option}"),
            Self::Continuation { option } => write!(f, "continuing after option {option}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    OutOfRange,
    Hidden,
    RequirementsUnmet,
    NotAwaiting,
}

/// A selection the state machine refused; state is unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionRejected {
    pub index: usize,
    pub reason: RejectReason,
}

impl fmt::Display for SelectionRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self.reason {
            RejectReason::OutOfRange => "out of range",
            RejectReason::Hidden => "hidden",
            RejectReason::RequirementsUnmet => "requirements unmet",
            RejectReason::NotAwaiting => "not awaiting a selection",
        };
        write!(f, "option {} rejected: {reason}", self.index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionResolution {
    state: ResolutionState,
    selected: Option<usize>,
}

impl Default for OptionResolution {
    fn default() -> Self {
        Self::new()
    }
}

impl OptionResolution {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: ResolutionState::AwaitingSelection,
            selected: None,
        }
    }

    #[must_use]
    pub const fn state(&self) -> ResolutionState {
        self.state
    }

    /// Option that passed its pre hook, if any.
    #[must_use]
    pub const fn selected(&self) -> Option<usize> {
        self.selected
    }

    /// Validate a selection. Requirements gate selection in every mode.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionRejected`] and stays in `AwaitingSelection` when the
    /// index is out of range, hidden, or its requirements are unmet.
    pub fn select(
        &mut self,
        encounter: &Encounter,
        index: usize,
        view: &RequirementView<'_>,
    ) -> Result<(), SelectionRejected> {
        if self.state != ResolutionState::AwaitingSelection {
            return Err(SelectionRejected {
                index,
                reason: RejectReason::NotAwaiting,
            });
        }
        let Some(option) = encounter.options.get(index) else {
            return Err(SelectionRejected {
                index,
                reason: RejectReason::OutOfRange,
            });
        };
        self.state = ResolutionState::Validating { option: index };
        if option.requirements_met(view) {
            return Ok(());
        }
        self.state = ResolutionState::AwaitingSelection;
        let reason = if option.mode == OptionMode::HiddenUnlessMet {
            RejectReason::Hidden
        } else {
            RejectReason::RequirementsUnmet
        };
        Err(SelectionRejected { index, reason })
    }

    /// Validating -> PreHook.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidTransition`] from any other state.
    pub fn enter_pre_hook(&mut self) -> Result<usize, EngineError> {
        match self.state {
            ResolutionState::Validating { option } => {
                self.state = ResolutionState::PreHook { option };
                Ok(option)
            }
            other => Err(invalid(other, "enter the pre hook")),
        }
    }

    /// Retry returns to `AwaitingSelection`; continue starts the dialogue.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidTransition`] outside `PreHook`.
    pub fn finish_pre_hook(&mut self, proceed: bool) -> Result<(), EngineError> {
        let ResolutionState::PreHook { option } = self.state else {
            return Err(invalid(self.state, "finish the pre hook"));
        };
        if proceed {
            self.selected = Some(option);
            self.state = ResolutionState::DialogueSelected { option, line: 0 };
        } else {
            self.state = ResolutionState::AwaitingSelection;
        }
        Ok(())
    }

    /// Next selected-dialogue line to show, advancing past it. Moves to
    /// `MainHook` once `len` lines have been shown.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidTransition`] outside `DialogueSelected`.
    pub fn advance_dialogue(&mut self, len: usize) -> Result<Option<usize>, EngineError> {
        let ResolutionState::DialogueSelected { option, line } = self.state else {
            return Err(invalid(self.state, "advance dialogue"));
        };
        if line < len {
            self.state = ResolutionState::DialogueSelected {
                option,
                line: line + 1,
            };
            Ok(Some(line))
        } else {
            self.state = ResolutionState::MainHook { option };
            Ok(None)
        }
    }

    /// # Errors
    ///
    /// Returns [`EngineError::InvalidTransition`] outside `MainHook`.
    pub fn finish_main_hook(&mut self) -> Result<usize, EngineError> {
        match self.state {
            ResolutionState::MainHook { option } => {
                self.state = ResolutionState::PostHook { option };
                Ok(option)
            }
            other => Err(invalid(other, "finish the main hook")),
        }
    }

    /// # Errors
    ///
    /// Returns [`EngineError::InvalidTransition`] outside `PostHook`.
    pub fn finish_post_hook(&mut self) -> Result<usize, EngineError> {
        match self.state {
            ResolutionState::PostHook { option } => {
                self.state = ResolutionState::Continuation { option };
                Ok(option)
            }
            other => Err(invalid(other, "finish the post hook")),
        }
    }
}

fn invalid(state: ResolutionState, action: &'static str) -> EngineError {
    EngineError::InvalidTransition {
        state: state.to_string(),
        action,
    }
}
