//! Wavebound Battle Engine
//!
//! Platform-agnostic phase scheduler and weighted reward engine for the
//! Wavebound turn-based battler. Rendering, input, combat math, and
//! persistence are reached through the [`Presenter`], [`CombatRules`], and
//! [`ProgressStore`] traits; this crate performs no I/O.

pub mod battle;
pub mod config;
pub mod constants;
pub mod encounter;
pub mod error;
pub mod numbers;
pub mod phase;
pub mod rewards;
pub mod rng;
pub mod rules;
pub mod session;
pub mod trace;
pub mod turn_order;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use battle::{
    BattleOutcome, BattleSetup, BattleState, BattlerIndex, Combatant, Command, PartySnapshot,
    RunEnd, SeenEncounter, Side, UnlockSnapshot,
};
pub use config::{EngineConfig, RewardCfg, SchedulerCfg};
pub use encounter::{
    ActiveEncounter, ContinueOutcome, DialogueLine, Encounter, EncounterOption,
    EncounterRewardSpec, HookContext, HookOutcome, OptionMode, OptionView, Requirement,
    RequirementView, ResolutionState, chained_trainer_challenge,
};
pub use error::{ConfigError, EngineError, StoreError};
pub use phase::{
    Phase, PhaseId, PhaseKind, PhaseManager, PhaseName, PhaseQueue, PhaseStep, ResumeEvent,
    ResumeSignal, ResumeToken, RunStatus,
};
pub use rewards::{
    PoolEntry, RewardDraw, RewardId, RewardOffer, RewardOption, RewardPool, RewardPools,
    RewardRequest, RewardTier, generate_offer, reroll_cost, select_rewards, standard_pools,
};
pub use rng::RngBundle;
pub use rules::{EffectResolution, EndOfTurnEffect, HpDelta, MoveResolution, NextWave};
pub use session::BattleSession;
pub use trace::{DecisionTrace, RollValue, WeightedCandidate};
pub use turn_order::{TurnCandidate, TurnOrder, TurnOrderError, TurnOrderRequest, resolve_turn_order};

/// Output side of the embedding application.
///
/// Every call hands over a [`ResumeToken`]; the phase that made the call stays
/// current until the application returns that token in a [`ResumeEvent`].
pub trait Presenter {
    fn show_text(&mut self, token: ResumeToken, text: &str);

    fn show_dialogue(&mut self, token: ResumeToken, text: &str, speaker: &str);

    /// Play a named animation or sound cue.
    fn play_cue(&mut self, token: ResumeToken, cue: &str);

    /// Ask the player to choose a command for `battler`.
    fn prompt_command(&mut self, token: ResumeToken, battler: BattlerIndex, battle: &BattleState);

    /// Present encounter options. Hidden options are already filtered out.
    fn prompt_options(&mut self, token: ResumeToken, title: &str, options: &[OptionView]);

    fn offer_rewards(&mut self, token: ResumeToken, offer: &RewardOffer);
}

/// Combat math. Implementations must be pure with respect to the battle state
/// they are given; the engine applies the returned changes itself.
pub trait CombatRules {
    /// Move priority bracket; higher acts first.
    fn command_priority(&self, battle: &BattleState, battler: BattlerIndex, command: &Command)
    -> i8;

    /// Speed after stat stages and field effects.
    fn effective_speed(&self, battle: &BattleState, battler: BattlerIndex) -> u32;

    fn enemy_command(&self, battle: &BattleState, battler: BattlerIndex) -> Command;

    fn resolve_move(
        &self,
        battle: &BattleState,
        battler: BattlerIndex,
        command: &Command,
    ) -> MoveResolution;

    fn end_of_turn(&self, battle: &BattleState, effect: EndOfTurnEffect) -> EffectResolution;

    /// Decide what follows a won battle or finished encounter.
    fn next_wave(&self, battle: &BattleState) -> NextWave;
}

/// Persistent run and account progress.
pub trait ProgressStore {
    fn money(&self) -> u64;

    /// # Errors
    ///
    /// Returns `StoreError::InsufficientFunds` when `amount` exceeds the
    /// balance, or another `StoreError` if the store cannot be written.
    fn spend_money(&mut self, amount: u64) -> Result<(), StoreError>;

    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn add_money(&mut self, amount: u64) -> Result<(), StoreError>;

    fn vouchers(&self) -> u32;

    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn add_vouchers(&mut self, count: u32) -> Result<(), StoreError>;

    fn is_unlocked(&self, flag: &str) -> bool;

    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn unlock(&mut self, flag: &str) -> Result<(), StoreError>;

    /// Flags visible to reward weights for the next draw.
    fn unlock_snapshot(&self) -> UnlockSnapshot;

    /// Hand a chosen reward to the player.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the grant.
    fn grant_reward(&mut self, id: &RewardId) -> Result<(), StoreError>;
}

/// Collaborators borrowed for the duration of one `run` or `resume` call.
pub struct Collaborators<'c> {
    pub presenter: &'c mut dyn Presenter,
    pub rules: &'c dyn CombatRules,
    pub store: &'c mut dyn ProgressStore,
}

impl<'c> Collaborators<'c> {
    pub fn new(
        presenter: &'c mut dyn Presenter,
        rules: &'c dyn CombatRules,
        store: &'c mut dyn ProgressStore,
    ) -> Self {
        Self {
            presenter,
            rules,
            store,
        }
    }
}
