//! Engine configuration with serde defaults and validation.

use crate::constants::{
    DEFAULT_MAX_STEPS_PER_RUN, DEFAULT_OFFER_COUNT, DEFAULT_REWARD_ID, LOCKED_TIER_COSTS,
    MAX_PARTY_LUCK, OFFER_RETRY_CAP, REROLL_BASE_COST, TIER_COMMON_ABOVE, TIER_GREAT_ABOVE,
    TIER_ROLL_DENOMINATOR, TIER_ULTRA_ABOVE,
};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Top-level configuration for a battle session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub scheduler: SchedulerCfg,
    #[serde(default)]
    pub rewards: RewardCfg,
}

impl EngineConfig {
    /// Parse a configuration document and validate it.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed JSON, or the first violated
    /// invariant reported by [`EngineConfig::validate`].
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let cfg: Self =
            serde_json::from_str(json).map_err(|err| ConfigError::Parse(err.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when any field violates the documented bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler.validate()?;
        self.rewards.validate()?;
        Ok(())
    }
}

/// Scheduler loop behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerCfg {
    /// Synthesize a `TurnInit` phase whenever the queue runs dry.
    #[serde(default = "SchedulerCfg::default_auto_turn_init")]
    pub auto_turn_init: bool,
    /// Upper bound on phases started by a single `run` call.
    #[serde(default = "SchedulerCfg::default_max_steps_per_run")]
    pub max_steps_per_run: u32,
}

impl SchedulerCfg {
    #[must_use]
    pub const fn default_auto_turn_init() -> bool {
        true
    }

    #[must_use]
    pub const fn default_max_steps_per_run() -> u32 {
        DEFAULT_MAX_STEPS_PER_RUN
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_steps_per_run == 0 {
            return Err(ConfigError::MinViolation {
                field: "scheduler.max_steps_per_run",
                min: 1,
                value: 0,
            });
        }
        Ok(())
    }
}

impl Default for SchedulerCfg {
    fn default() -> Self {
        Self {
            auto_turn_init: Self::default_auto_turn_init(),
            max_steps_per_run: Self::default_max_steps_per_run(),
        }
    }
}

/// Tier roll, offer, and reroll tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardCfg {
    #[serde(default = "RewardCfg::default_tier_roll_denominator")]
    pub tier_roll_denominator: u32,
    #[serde(default = "RewardCfg::default_common_above")]
    pub common_above: u32,
    #[serde(default = "RewardCfg::default_great_above")]
    pub great_above: u32,
    #[serde(default = "RewardCfg::default_ultra_above")]
    pub ultra_above: u32,
    #[serde(default = "RewardCfg::default_max_party_luck")]
    pub max_party_luck: u32,
    #[serde(default = "RewardCfg::default_offer_count")]
    pub offer_count: usize,
    #[serde(default = "RewardCfg::default_offer_retry_cap")]
    pub offer_retry_cap: usize,
    #[serde(default = "RewardCfg::default_reroll_base_cost")]
    pub reroll_base_cost: u64,
    #[serde(default = "RewardCfg::default_locked_tier_costs")]
    pub locked_tier_costs: [u64; 5],
    /// Scales reroll cost; a negative value disables rerolls entirely.
    #[serde(default = "RewardCfg::default_reroll_multiplier")]
    pub reroll_multiplier: f64,
    #[serde(default = "RewardCfg::default_reward")]
    pub default_reward: String,
}

impl RewardCfg {
    #[must_use]
    pub const fn default_tier_roll_denominator() -> u32 {
        TIER_ROLL_DENOMINATOR
    }

    #[must_use]
    pub const fn default_common_above() -> u32 {
        TIER_COMMON_ABOVE
    }

    #[must_use]
    pub const fn default_great_above() -> u32 {
        TIER_GREAT_ABOVE
    }

    #[must_use]
    pub const fn default_ultra_above() -> u32 {
        TIER_ULTRA_ABOVE
    }

    #[must_use]
    pub const fn default_max_party_luck() -> u32 {
        MAX_PARTY_LUCK
    }

    #[must_use]
    pub const fn default_offer_count() -> usize {
        DEFAULT_OFFER_COUNT
    }

    #[must_use]
    pub const fn default_offer_retry_cap() -> usize {
        OFFER_RETRY_CAP
    }

    #[must_use]
    pub const fn default_reroll_base_cost() -> u64 {
        REROLL_BASE_COST
    }

    #[must_use]
    pub const fn default_locked_tier_costs() -> [u64; 5] {
        LOCKED_TIER_COSTS
    }

    #[must_use]
    pub const fn default_reroll_multiplier() -> f64 {
        1.0
    }

    #[must_use]
    pub fn default_reward() -> String {
        DEFAULT_REWARD_ID.to_string()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.tier_roll_denominator < 2 {
            return Err(ConfigError::MinViolation {
                field: "rewards.tier_roll_denominator",
                min: 2,
                value: u64::from(self.tier_roll_denominator),
            });
        }
        if self.common_above >= self.tier_roll_denominator {
            return Err(ConfigError::TierThresholdRange {
                value: self.common_above,
                denominator: self.tier_roll_denominator,
            });
        }
        if !(self.common_above > self.great_above && self.great_above > self.ultra_above) {
            return Err(ConfigError::TierThresholdOrder {
                common: self.common_above,
                great: self.great_above,
                ultra: self.ultra_above,
            });
        }
        if self.offer_count == 0 {
            return Err(ConfigError::MinViolation {
                field: "rewards.offer_count",
                min: 1,
                value: 0,
            });
        }
        if self.offer_retry_cap == 0 {
            return Err(ConfigError::MinViolation {
                field: "rewards.offer_retry_cap",
                min: 1,
                value: 0,
            });
        }
        if self.default_reward.trim().is_empty() {
            return Err(ConfigError::EmptyDefaultReward);
        }
        Ok(())
    }
}

impl Default for RewardCfg {
    fn default() -> Self {
        Self {
            tier_roll_denominator: Self::default_tier_roll_denominator(),
            common_above: Self::default_common_above(),
            great_above: Self::default_great_above(),
            ultra_above: Self::default_ultra_above(),
            max_party_luck: Self::default_max_party_luck(),
            offer_count: Self::default_offer_count(),
            offer_retry_cap: Self::default_offer_retry_cap(),
            reroll_base_cost: Self::default_reroll_base_cost(),
            locked_tier_costs: Self::default_locked_tier_costs(),
            reroll_multiplier: Self::default_reroll_multiplier(),
            default_reward: Self::default_reward(),
        }
    }
}
