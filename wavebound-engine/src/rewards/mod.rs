//! Weighted reward selection.
//!
//! Pools are built once per run from an unlock snapshot and are read-only
//! afterwards. Every draw re-evaluates weights against an explicit
//! [`PartySnapshot`] and reroll count, so selection is reproducible from the
//! RNG stream alone.

pub mod offer;
pub mod pools;

use crate::battle::PartySnapshot;
#[cfg(debug_assertions)]
use crate::constants::DEBUG_ENV_VAR;
use crate::constants::LOG_TIER_FALLBACK;
use crate::trace::{DecisionTrace, RollValue, WeightedCandidate};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub use offer::{
    OfferContext, RewardOffer, RewardOption, RewardRequest, TierRoll, generate_offer, reroll_cost,
    roll_tier,
};
pub use pools::standard_pools;

#[cfg(debug_assertions)]
fn debug_log_enabled() -> bool {
    matches!(std::env::var(DEBUG_ENV_VAR), Ok(val) if val != "0")
}

#[cfg(not(debug_assertions))]
const fn debug_log_enabled() -> bool {
    false
}

/// Reward rarity buckets, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardTier {
    Common,
    Great,
    Ultra,
    Rogue,
    Master,
}

impl RewardTier {
    pub const ALL: [Self; 5] = [
        Self::Common,
        Self::Great,
        Self::Ultra,
        Self::Rogue,
        Self::Master,
    ];

    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Next tier toward `Common`, if any.
    #[must_use]
    pub const fn lower(self) -> Option<Self> {
        match self {
            Self::Common => None,
            Self::Great => Some(Self::Common),
            Self::Ultra => Some(Self::Great),
            Self::Rogue => Some(Self::Ultra),
            Self::Master => Some(Self::Rogue),
        }
    }

    /// Next tier toward `Master`, saturating.
    #[must_use]
    pub const fn upgrade(self) -> Self {
        match self {
            Self::Common => Self::Great,
            Self::Great => Self::Ultra,
            Self::Ultra => Self::Rogue,
            Self::Rogue | Self::Master => Self::Master,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Common => "common",
            Self::Great => "great",
            Self::Ultra => "ultra",
            Self::Rogue => "rogue",
            Self::Master => "master",
        }
    }
}

impl fmt::Display for RewardTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Stable identifier of a grantable reward.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RewardId(pub String);

impl RewardId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RewardId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for RewardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pure weight function over the party snapshot and the reroll count.
pub type WeightFn = fn(&PartySnapshot, u32) -> u32;

#[derive(Debug, Clone, Copy)]
pub enum Weight {
    Fixed(u32),
    Dynamic(WeightFn),
}

impl Weight {
    #[must_use]
    pub fn evaluate(&self, party: &PartySnapshot, reroll: u32) -> u32 {
        match self {
            Self::Fixed(weight) => *weight,
            Self::Dynamic(weight_fn) => weight_fn(party, reroll),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PoolEntry {
    pub id: RewardId,
    pub weight: Weight,
    pub max_weight: Option<u32>,
    /// Copies one selection call may hand out.
    pub max_stack: Option<u32>,
}

impl PoolEntry {
    #[must_use]
    pub fn fixed(id: impl Into<String>, weight: u32) -> Self {
        Self {
            id: RewardId::new(id),
            weight: Weight::Fixed(weight),
            max_weight: None,
            max_stack: None,
        }
    }

    #[must_use]
    pub fn dynamic(id: impl Into<String>, weight: WeightFn, max_weight: u32) -> Self {
        Self {
            id: RewardId::new(id),
            weight: Weight::Dynamic(weight),
            max_weight: Some(max_weight),
            max_stack: None,
        }
    }

    #[must_use]
    pub const fn with_max_stack(mut self, max_stack: u32) -> Self {
        self.max_stack = Some(max_stack);
        self
    }

    /// Raw weight and the clamped weight actually used for sampling.
    #[must_use]
    pub fn evaluate(&self, party: &PartySnapshot, reroll: u32) -> (u32, u32) {
        let base = self.weight.evaluate(party, reroll);
        let clamped = self.max_weight.map_or(base, |cap| base.min(cap));
        (base, clamped)
    }
}

#[derive(Debug, Clone)]
pub struct RewardPool {
    pub tier: RewardTier,
    pub entries: Vec<PoolEntry>,
}

impl RewardPool {
    #[must_use]
    pub const fn empty(tier: RewardTier) -> Self {
        Self {
            tier,
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, entry: PoolEntry) -> Self {
        self.entries.push(entry);
        self
    }

    #[must_use]
    pub fn contains(&self, id: &RewardId) -> bool {
        self.entries.iter().any(|entry| &entry.id == id)
    }
}

/// Per-tier pools plus the reward granted when every tier is exhausted.
#[derive(Debug, Clone)]
pub struct RewardPools {
    tiers: [RewardPool; 5],
    default_reward: RewardId,
}

impl RewardPools {
    #[must_use]
    pub fn new(default_reward: impl Into<String>) -> Self {
        Self {
            tiers: RewardTier::ALL.map(RewardPool::empty),
            default_reward: RewardId::new(default_reward),
        }
    }

    /// Replace the pool for `pool.tier`.
    #[must_use]
    pub fn with_pool(mut self, pool: RewardPool) -> Self {
        let idx = pool.tier.index();
        self.tiers[idx] = pool;
        self
    }

    #[must_use]
    pub fn pool(&self, tier: RewardTier) -> &RewardPool {
        &self.tiers[tier.index()]
    }

    #[must_use]
    pub const fn default_reward(&self) -> &RewardId {
        &self.default_reward
    }

    /// Lowest tier whose pool lists `id`.
    #[must_use]
    pub fn tier_of(&self, id: &RewardId) -> Option<RewardTier> {
        self.tiers
            .iter()
            .find(|pool| pool.contains(id))
            .map(|pool| pool.tier)
    }
}

/// Copies handed out so far within one selection, for bounded entries.
#[derive(Debug, Clone, Default)]
pub struct StackLedger {
    taken: BTreeMap<RewardId, u32>,
}

impl StackLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies of `entry` still available, or `None` when unbounded.
    #[must_use]
    pub fn remaining(&self, entry: &PoolEntry) -> Option<u32> {
        let cap = entry.max_stack?;
        let taken = self.taken.get(&entry.id).copied().unwrap_or(0);
        Some(cap.saturating_sub(taken))
    }

    pub fn take(&mut self, id: &RewardId) {
        *self.taken.entry(id.clone()).or_insert(0) += 1;
    }
}

/// Cumulative weight table over the eligible entries of one pool.
#[derive(Debug, Clone)]
pub struct WeightTable<'p> {
    entries: Vec<&'p PoolEntry>,
    cumulative: Vec<u32>,
    candidates: Vec<WeightedCandidate>,
    total: u32,
}

impl<'p> WeightTable<'p> {
    /// Evaluate every entry; zero weights and exhausted stacks are skipped.
    #[must_use]
    pub fn build(
        pool: &'p RewardPool,
        party: &PartySnapshot,
        reroll: u32,
        ledger: &StackLedger,
    ) -> Self {
        let mut table = Self {
            entries: Vec::with_capacity(pool.entries.len()),
            cumulative: Vec::with_capacity(pool.entries.len()),
            candidates: Vec::with_capacity(pool.entries.len()),
            total: 0,
        };
        for entry in &pool.entries {
            let (base, weight) = entry.evaluate(party, reroll);
            table.candidates.push(WeightedCandidate {
                id: entry.id.0.clone(),
                base_weight: base,
                max_weight: entry.max_weight,
                final_weight: weight,
            });
            if weight == 0 || ledger.remaining(entry) == Some(0) {
                continue;
            }
            table.total = table.total.saturating_add(weight);
            table.entries.push(entry);
            table.cumulative.push(table.total);
        }
        table
    }

    #[must_use]
    pub const fn total(&self) -> u32 {
        self.total
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.total == 0
    }

    #[must_use]
    pub fn cumulative(&self) -> &[u32] {
        &self.cumulative
    }

    /// First entry whose cumulative weight exceeds `roll`.
    #[must_use]
    pub fn entry_for_roll(&self, roll: u32) -> Option<&'p PoolEntry> {
        let idx = self.cumulative.iter().position(|sum| roll < *sum)?;
        self.entries.get(idx).copied()
    }

    fn into_candidates(self) -> Vec<WeightedCandidate> {
        self.candidates
    }
}

/// One selected reward with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardDraw {
    pub id: RewardId,
    /// Tier the reward was drawn from; `None` for the pools' default reward.
    pub tier: Option<RewardTier>,
    pub trace: DecisionTrace,
}

/// Draw `count` rewards starting at `tier`.
///
/// Exhausted tiers fall back one tier at a time toward `Common`, then to the
/// pools' default reward; selection never fails.
pub fn select_rewards<R: Rng>(
    pools: &RewardPools,
    tier: RewardTier,
    party: &PartySnapshot,
    reroll: u32,
    count: usize,
    rng: &mut R,
) -> Vec<RewardDraw> {
    let mut ledger = StackLedger::new();
    (0..count)
        .map(|_| draw_one(pools, tier, party, reroll, &mut ledger, rng))
        .collect()
}

pub(crate) fn draw_one<R: Rng>(
    pools: &RewardPools,
    tier: RewardTier,
    party: &PartySnapshot,
    reroll: u32,
    ledger: &mut StackLedger,
    rng: &mut R,
) -> RewardDraw {
    let mut cursor = Some(tier);
    while let Some(current) = cursor {
        let table = WeightTable::build(pools.pool(current), party, reroll, ledger);
        if table.is_exhausted() {
            log::warn!(
                target: LOG_TIER_FALLBACK,
                "tier {current} exhausted at reroll {reroll}; falling back"
            );
            cursor = current.lower();
            continue;
        }
        let roll = rng.gen_range(0..table.total());
        let Some(entry) = table.entry_for_roll(roll) else {
            cursor = current.lower();
            continue;
        };
        ledger.take(&entry.id);
        let id = entry.id.clone();
        if debug_log_enabled() {
            println!(
                "Reward draw | tier {} roll {}/{} -> {}",
                current,
                roll,
                table.total(),
                id
            );
        }
        log::trace!("reward draw tier={current} roll={roll} total={} id={id}", table.total());
        return RewardDraw {
            trace: DecisionTrace {
                pool_id: format!("rewards.{current}"),
                roll: RollValue::U32(roll),
                candidates: table.into_candidates(),
                chosen_id: id.0.clone(),
            },
            id,
            tier: Some(current),
        };
    }

    let id = pools.default_reward().clone();
    log::warn!(target: LOG_TIER_FALLBACK, "all tiers exhausted; granting {id}");
    RewardDraw {
        trace: DecisionTrace {
            pool_id: String::from("rewards.default"),
            roll: RollValue::Fallback,
            candidates: Vec::new(),
            chosen_id: id.0.clone(),
        },
        id,
        tier: None,
    }
}
