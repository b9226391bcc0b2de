//! Narrative encounters: options, requirements, and lifecycle hooks.
//!
//! An [`Encounter`] is inert data plus boxed hooks. Once scheduled it lives in
//! the manager's encounter slot as an [`ActiveEncounter`], which carries the
//! option state machine and any continuation registered by a hook.

pub mod chained;
pub mod resolution;

use crate::ProgressStore;
use crate::battle::{BattleSetup, BattleState};
use crate::error::EngineError;
use crate::phase::PhaseQueue;
use crate::rewards::RewardRequest;
use crate::rng::{CountingRng, RngBundle};
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use std::cell::RefMut;
use std::fmt;

pub use chained::chained_trainer_challenge;
pub use resolution::{OptionResolution, RejectReason, ResolutionState, SelectionRejected};

/// How an option is presented when its requirements are unmet.
///
/// Requirements gate selection in every mode; the mode only changes what the
/// presenter is told.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionMode {
    #[default]
    AlwaysEnabled,
    DisabledUnlessMet,
    HiddenUnlessMet,
}

/// Facts a requirement may inspect at selection time.
pub struct RequirementView<'a> {
    pub battle: &'a BattleState,
    pub store: &'a dyn ProgressStore,
}

pub type RequirementFn = fn(&RequirementView<'_>) -> bool;

#[derive(Debug, Clone)]
pub enum Requirement {
    MoneyAtLeast(u64),
    PartySizeAtLeast(usize),
    /// Members standing and not hurt.
    HealthyMembersAtLeast(usize),
    FlagSet(String),
    Custom {
        label: &'static str,
        check: RequirementFn,
    },
}

impl Requirement {
    #[must_use]
    pub fn is_met(&self, view: &RequirementView<'_>) -> bool {
        match self {
            Self::MoneyAtLeast(amount) => view.store.money() >= *amount,
            Self::PartySizeAtLeast(size) => view.battle.player_party.len() >= *size,
            Self::HealthyMembersAtLeast(count) => {
                view.battle
                    .player_party
                    .iter()
                    .filter(|member| !member.is_fainted() && !member.is_hurt())
                    .count()
                    >= *count
            }
            Self::FlagSet(flag) => view.store.is_unlocked(flag),
            Self::Custom { check, .. } => check(view),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MoneyAtLeast(amount) => write!(f, "money >= {amount}"),
            Self::PartySizeAtLeast(size) => write!(f, "party size >= {size}"),
            Self::HealthyMembersAtLeast(count) => write!(f, "healthy members >= {count}"),
            Self::FlagSet(flag) => write!(f, "flag {flag}"),
            Self::Custom { label, .. } => f.write_str(label),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueLine {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

impl DialogueLine {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            speaker: None,
        }
    }

    #[must_use]
    pub fn spoken(text: impl Into<String>, speaker: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            speaker: Some(speaker.into()),
        }
    }
}

/// Pre-hook verdict. `Retry` re-enters option selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    Continue,
    Retry,
}

impl From<Option<bool>> for HookOutcome {
    fn from(value: Option<bool>) -> Self {
        match value {
            None | Some(true) => Self::Continue,
            Some(false) => Self::Retry,
        }
    }
}

/// Continue-hook verdict for chained encounters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinueOutcome {
    /// Another battle was started; skip rewards this cycle.
    Continue,
    /// No opponents remain; run the standard reward path once.
    Exhausted,
}

pub type PreHook = Box<dyn FnMut(&mut HookContext<'_>) -> Result<HookOutcome, EngineError>>;
pub type OptionHook = Box<dyn FnMut(&mut HookContext<'_>) -> Result<(), EngineError>>;
pub type ContinueHook =
    Box<dyn FnMut(&mut HookContext<'_>) -> Result<ContinueOutcome, EngineError>>;

/// Money, vouchers, and an optional reward offer granted when an encounter
/// reaches its reward step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncounterRewardSpec {
    #[serde(default)]
    pub money: u64,
    #[serde(default)]
    pub vouchers: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RewardRequest>,
}

impl EncounterRewardSpec {
    #[must_use]
    pub const fn offer(request: RewardRequest) -> Self {
        Self {
            money: 0,
            vouchers: 0,
            request: Some(request),
        }
    }

    #[must_use]
    pub const fn with_money(mut self, money: u64) -> Self {
        self.money = money;
        self
    }

    #[must_use]
    pub const fn with_vouchers(mut self, vouchers: u32) -> Self {
        self.vouchers = vouchers;
        self
    }
}

/// State and collaborators a hook may touch, plus the effects it requests.
pub struct HookContext<'a> {
    pub battle: &'a mut BattleState,
    pub queue: &'a mut PhaseQueue,
    pub store: &'a mut dyn ProgressStore,
    rng: &'a RngBundle,
    effects: HookEffects,
}

#[derive(Default)]
pub(crate) struct HookEffects {
    pub(crate) battle: Option<BattleSetup>,
    pub(crate) left_without_battle: bool,
    pub(crate) continue_hook: Option<Option<ContinueHook>>,
    pub(crate) rewards: Option<EncounterRewardSpec>,
}

impl<'a> HookContext<'a> {
    pub(crate) fn new(
        battle: &'a mut BattleState,
        queue: &'a mut PhaseQueue,
        store: &'a mut dyn ProgressStore,
        rng: &'a RngBundle,
    ) -> Self {
        Self {
            battle,
            queue,
            store,
            rng,
            effects: HookEffects::default(),
        }
    }

    /// Encounter RNG stream; hooks never draw from the reward stream.
    #[must_use]
    pub fn rng(&self) -> RefMut<'_, CountingRng<SmallRng>> {
        self.rng.encounter()
    }

    /// Fight `setup` once the current hook step finishes.
    pub fn start_battle(&mut self, setup: BattleSetup) {
        self.effects.left_without_battle = false;
        self.effects.battle = Some(setup);
    }

    /// Skip straight to the reward step.
    pub fn leave_without_battle(&mut self) {
        self.effects.battle = None;
        self.effects.left_without_battle = true;
    }

    /// Register a hook that replaces the reward step until it is exhausted.
    pub fn set_continue(&mut self, hook: ContinueHook) {
        self.effects.continue_hook = Some(Some(hook));
    }

    pub fn clear_continue(&mut self) {
        self.effects.continue_hook = Some(None);
    }

    pub fn set_rewards(&mut self, rewards: EncounterRewardSpec) {
        self.effects.rewards = Some(rewards);
    }

    pub(crate) fn into_effects(self) -> HookEffects {
        self.effects
    }
}

/// One selectable branch of an encounter.
pub struct EncounterOption {
    pub label: String,
    pub mode: OptionMode,
    pub requirements: Vec<Requirement>,
    pub selected_dialogue: Vec<DialogueLine>,
    pub pre: Option<PreHook>,
    pub main: Option<OptionHook>,
    pub post: Option<OptionHook>,
}

impl EncounterOption {
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            mode: OptionMode::default(),
            requirements: Vec::new(),
            selected_dialogue: Vec::new(),
            pre: None,
            main: None,
            post: None,
        }
    }

    #[must_use]
    pub const fn with_mode(mut self, mode: OptionMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_requirement(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    #[must_use]
    pub fn with_dialogue(mut self, line: DialogueLine) -> Self {
        self.selected_dialogue.push(line);
        self
    }

    #[must_use]
    pub fn on_pre<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&mut HookContext<'_>) -> Result<HookOutcome, EngineError> + 'static,
    {
        self.pre = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn on_main<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&mut HookContext<'_>) -> Result<(), EngineError> + 'static,
    {
        self.main = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn on_post<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&mut HookContext<'_>) -> Result<(), EngineError> + 'static,
    {
        self.post = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn requirements_met(&self, view: &RequirementView<'_>) -> bool {
        self.requirements.iter().all(|req| req.is_met(view))
    }

    /// Presentation of this option right now, or `None` when hidden.
    #[must_use]
    pub fn view(&self, index: usize, view: &RequirementView<'_>) -> Option<OptionView> {
        let met = self.requirements_met(view);
        let enabled = match self.mode {
            OptionMode::AlwaysEnabled => true,
            OptionMode::DisabledUnlessMet => met,
            OptionMode::HiddenUnlessMet if !met => return None,
            OptionMode::HiddenUnlessMet => true,
        };
        Some(OptionView {
            index,
            label: self.label.clone(),
            enabled,
        })
    }
}

impl fmt::Debug for EncounterOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncounterOption")
            .field("label", &self.label)
            .field("mode", &self.mode)
            .field("requirements", &self.requirements)
            .field("selected_dialogue", &self.selected_dialogue.len())
            .field("pre", &self.pre.is_some())
            .field("main", &self.main.is_some())
            .field("post", &self.post.is_some())
            .finish()
    }
}

/// What the presenter shows for one option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionView {
    pub index: usize,
    pub label: String,
    pub enabled: bool,
}

#[derive(Debug)]
pub struct Encounter {
    pub id: String,
    pub title: String,
    pub intro: Vec<DialogueLine>,
    pub options: Vec<EncounterOption>,
    pub outro: Vec<DialogueLine>,
}

impl Encounter {
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            intro: Vec::new(),
            options: Vec::new(),
            outro: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_intro(mut self, line: DialogueLine) -> Self {
        self.intro.push(line);
        self
    }

    #[must_use]
    pub fn with_option(mut self, option: EncounterOption) -> Self {
        self.options.push(option);
        self
    }

    #[must_use]
    pub fn with_outro(mut self, line: DialogueLine) -> Self {
        self.outro.push(line);
        self
    }

    /// Options the presenter should show, hidden ones omitted.
    #[must_use]
    pub fn visible_options(&self, view: &RequirementView<'_>) -> Vec<OptionView> {
        self.options
            .iter()
            .enumerate()
            .filter_map(|(idx, option)| option.view(idx, view))
            .collect()
    }
}

/// An encounter in progress, owned by the manager's encounter slot.
pub struct ActiveEncounter {
    pub encounter: Encounter,
    pub resolution: OptionResolution,
    pub(crate) continue_hook: Option<ContinueHook>,
    pub(crate) rewards: Option<EncounterRewardSpec>,
    pub(crate) intro_line: usize,
    pending_battle: Option<BattleSetup>,
    battles_started: u32,
    rewards_granted: u32,
}

impl ActiveEncounter {
    #[must_use]
    pub fn new(encounter: Encounter) -> Self {
        Self {
            encounter,
            resolution: OptionResolution::new(),
            continue_hook: None,
            rewards: None,
            intro_line: 0,
            pending_battle: None,
            battles_started: 0,
            rewards_granted: 0,
        }
    }

    #[must_use]
    pub const fn has_continue_hook(&self) -> bool {
        self.continue_hook.is_some()
    }

    #[must_use]
    pub const fn pending_rewards(&self) -> Option<&EncounterRewardSpec> {
        self.rewards.as_ref()
    }

    /// Sub-battles loaded for this encounter so far.
    #[must_use]
    pub const fn battles_started(&self) -> u32 {
        self.battles_started
    }

    /// Times the standard reward path has run; at most once per encounter.
    #[must_use]
    pub const fn rewards_granted(&self) -> u32 {
        self.rewards_granted
    }

    pub(crate) const fn note_battle_started(&mut self) {
        self.battles_started += 1;
    }

    pub(crate) const fn note_rewards_granted(&mut self) {
        self.rewards_granted += 1;
    }

    /// Fold hook effects into the encounter.
    pub(crate) fn absorb(&mut self, effects: HookEffects) {
        if let Some(hook) = effects.continue_hook {
            self.continue_hook = hook;
        }
        if let Some(rewards) = effects.rewards {
            self.rewards = Some(rewards);
        }
        if effects.left_without_battle {
            self.pending_battle = None;
        }
        if let Some(setup) = effects.battle {
            self.pending_battle = Some(setup);
        }
    }

    /// Battle requested by the last hook, if any.
    pub(crate) fn take_pending_battle(&mut self) -> Option<BattleSetup> {
        self.pending_battle.take()
    }
}

impl fmt::Debug for ActiveEncounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveEncounter")
            .field("encounter", &self.encounter.id)
            .field("resolution", &self.resolution)
            .field("continue_hook", &self.continue_hook.is_some())
            .field("rewards", &self.rewards)
            .field("battles_started", &self.battles_started)
            .field("rewards_granted", &self.rewards_granted)
            .finish_non_exhaustive()
    }
}
