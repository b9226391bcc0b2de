//! Centralized scheduling and reward tuning constants for Wavebound.
//!
//! These values pin the deterministic math of the reward engine. Keeping them
//! together means drop rates only change through reviewed code, not through
//! runtime data.

// Logging keys -------------------------------------------------------------
pub(crate) const DEBUG_ENV_VAR: &str = "WAVEBOUND_DEBUG_LOGS";
pub(crate) const LOG_PHASE_START: &str = "phase.start";
pub(crate) const LOG_PHASE_END: &str = "phase.end";
pub(crate) const LOG_OPTION_REJECTED: &str = "encounter.option.rejected";
pub(crate) const LOG_TIER_FALLBACK: &str = "reward.tier.fallback";
pub(crate) const LOG_TURN_ORDER: &str = "turn.order";

// Scheduler ----------------------------------------------------------------
pub(crate) const DEFAULT_MAX_STEPS_PER_RUN: u32 = 4_096;

// Tier roll ----------------------------------------------------------------
pub(crate) const TIER_ROLL_DENOMINATOR: u32 = 1_024;
pub(crate) const TIER_COMMON_ABOVE: u32 = 255;
pub(crate) const TIER_GREAT_ABOVE: u32 = 60;
pub(crate) const TIER_ULTRA_ABOVE: u32 = 12;
pub(crate) const LUCK_UPGRADE_NUMERATOR: u32 = 128;
pub(crate) const LUCK_UPGRADE_HIT_BELOW: u32 = 4;
pub(crate) const MAX_PARTY_LUCK: u32 = 14;

// Offers and rerolls -------------------------------------------------------
pub(crate) const DEFAULT_OFFER_COUNT: usize = 3;
pub(crate) const OFFER_RETRY_PER_SLOT: usize = 5;
pub(crate) const OFFER_RETRY_CAP: usize = 50;
pub(crate) const REROLL_BASE_COST: u64 = 250;
pub(crate) const LOCKED_TIER_COSTS: [u64; 5] = [50, 125, 300, 750, 2_000];
pub(crate) const DEFAULT_REWARD_ID: &str = "POKEBALL";

// Party thresholds ---------------------------------------------------------
/// A member is "hurt" when missing at least this much HP.
pub(crate) const HURT_MIN_MISSING_HP: u32 = 10;
/// ...and sitting at or below this share of max HP, in thousandths.
pub(crate) const HURT_MAX_RATIO_PERMILLE: u32 = 875;
