//! Reward offers: tier rolls, duplicate retries, and reroll pricing.

use super::{RewardId, RewardPools, RewardTier, StackLedger, draw_one};
use crate::battle::PartySnapshot;
use crate::config::RewardCfg;
use crate::constants::{LUCK_UPGRADE_HIT_BELOW, LUCK_UPGRADE_NUMERATOR, OFFER_RETRY_PER_SLOT};
use crate::numbers::scale_u64;
use crate::trace::DecisionTrace;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// What a reward step should offer. Hooks and phases build these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardRequest {
    /// Tier for every rolled slot; `None` rolls a tier per slot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<RewardTier>,
    /// Total options; `None` uses the configured offer count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    /// Rewards offered first, ahead of rolled slots.
    #[serde(default)]
    pub guaranteed: Vec<RewardId>,
    #[serde(default = "RewardRequest::default_flag")]
    pub allow_luck_upgrades: bool,
    #[serde(default = "RewardRequest::default_flag")]
    pub allow_reroll: bool,
    /// Rerolls keep each slot's tier and are priced per locked tier.
    #[serde(default)]
    pub lock_tiers: bool,
}

impl RewardRequest {
    #[must_use]
    pub const fn default_flag() -> bool {
        true
    }

    /// Post-battle shop: rolled tiers, configured count, rerolls allowed.
    #[must_use]
    pub const fn standard() -> Self {
        Self {
            tier: None,
            count: None,
            guaranteed: Vec::new(),
            allow_luck_upgrades: true,
            allow_reroll: true,
            lock_tiers: false,
        }
    }

    #[must_use]
    pub const fn with_tier(mut self, tier: RewardTier) -> Self {
        self.tier = Some(tier);
        self
    }

    #[must_use]
    pub const fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    #[must_use]
    pub fn with_guaranteed<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.guaranteed
            .extend(ids.into_iter().map(RewardId::new));
        self
    }
}

impl Default for RewardRequest {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardOption {
    pub id: RewardId,
    /// `None` for guaranteed or default rewards outside every pool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<RewardTier>,
}

/// Options presented to the player for one reward step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardOffer {
    pub options: Vec<RewardOption>,
    /// `None` when rerolling is disabled for this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reroll_cost: Option<u64>,
    #[serde(default)]
    pub tier_rolls: Vec<TierRoll>,
    /// Weighted draws performed, duplicate retries included.
    pub attempts: usize,
    #[serde(default)]
    pub traces: Vec<DecisionTrace>,
}

impl RewardOffer {
    #[must_use]
    pub fn tiers(&self) -> Vec<RewardTier> {
        self.options.iter().filter_map(|option| option.tier).collect()
    }
}

/// Outcome of one tier roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierRoll {
    pub tier: RewardTier,
    pub roll: u32,
    pub upgrades: u32,
}

/// Inputs shared by every slot of an offer.
#[derive(Debug, Clone, Copy)]
pub struct OfferContext<'a> {
    pub pools: &'a RewardPools,
    pub party: &'a PartySnapshot,
    pub cfg: &'a RewardCfg,
    pub wave: u32,
    pub reroll: u32,
}

/// Base tier for a roll out of `cfg.tier_roll_denominator`.
#[must_use]
pub const fn tier_for_roll(cfg: &RewardCfg, roll: u32) -> RewardTier {
    if roll > cfg.common_above {
        RewardTier::Common
    } else if roll > cfg.great_above {
        RewardTier::Great
    } else if roll > cfg.ultra_above {
        RewardTier::Ultra
    } else if roll > 0 {
        RewardTier::Rogue
    } else {
        RewardTier::Master
    }
}

/// Denominator of one luck upgrade check; four outcomes in it upgrade.
#[must_use]
pub const fn luck_upgrade_odds(luck: u32) -> u32 {
    let odds = (LUCK_UPGRADE_NUMERATOR * 4) / (luck.saturating_add(4));
    if odds == 0 { 1 } else { odds }
}

/// Roll a tier, then apply chained luck upgrades capped at `Master`.
pub fn roll_tier<R: Rng>(
    cfg: &RewardCfg,
    luck: u32,
    allow_luck_upgrades: bool,
    rng: &mut R,
) -> TierRoll {
    let roll = rng.gen_range(0..cfg.tier_roll_denominator);
    let mut tier = tier_for_roll(cfg, roll);
    let mut upgrades = 0;
    if roll > 0 && allow_luck_upgrades {
        let odds = luck_upgrade_odds(luck.min(cfg.max_party_luck));
        while tier < RewardTier::Master && rng.gen_range(0..odds) < LUCK_UPGRADE_HIT_BELOW {
            tier = tier.upgrade();
            upgrades += 1;
        }
    }
    TierRoll {
        tier,
        roll,
        upgrades,
    }
}

/// Money needed to reroll an offer, or `None` when rerolls are disabled.
///
/// `ceil(wave / 10) * base * 2^rerolls * multiplier`, where `base` is the
/// configured base cost, or the summed locked-tier costs when tiers are locked.
#[must_use]
pub fn reroll_cost(
    cfg: &RewardCfg,
    wave: u32,
    rerolls: u32,
    locked_tiers: Option<&[RewardTier]>,
) -> Option<u64> {
    if cfg.reroll_multiplier < 0.0 || cfg.reroll_multiplier.is_nan() {
        return None;
    }
    let base = locked_tiers.map_or(cfg.reroll_base_cost, |tiers| {
        tiers
            .iter()
            .map(|tier| cfg.locked_tier_costs[tier.index()])
            .fold(0, u64::saturating_add)
    });
    let raw = u64::from(wave.div_ceil(10))
        .saturating_mul(base)
        .saturating_mul(2_u64.saturating_pow(rerolls));
    Some(scale_u64(raw, cfg.reroll_multiplier))
}

/// Build an offer: guaranteed rewards first, then rolled slots.
///
/// A rolled slot that duplicates an earlier option is redrawn at the same tier
/// up to `min(count * 5, offer_retry_cap)` times before the duplicate is kept.
/// `locked_tiers` pins each rolled slot to the tier it had before a reroll,
/// indexed by slot; a `None` entry leaves that slot free to roll.
pub fn generate_offer<R: Rng>(
    ctx: &OfferContext<'_>,
    request: &RewardRequest,
    locked_tiers: &[Option<RewardTier>],
    rng: &mut R,
) -> RewardOffer {
    let count = request
        .count
        .unwrap_or(ctx.cfg.offer_count)
        .max(request.guaranteed.len());
    let budget = count
        .saturating_mul(OFFER_RETRY_PER_SLOT)
        .min(ctx.cfg.offer_retry_cap)
        .max(1);
    let luck = ctx.party.luck(ctx.cfg.max_party_luck);

    let mut options: Vec<RewardOption> = request
        .guaranteed
        .iter()
        .map(|id| RewardOption {
            id: id.clone(),
            tier: ctx.pools.tier_of(id),
        })
        .collect();
    let mut tier_rolls = Vec::new();
    let mut traces = Vec::new();
    let mut attempts = 0;
    let mut ledger = StackLedger::new();

    for slot in 0..count - options.len() {
        let tier = match locked_tiers.get(slot).copied().flatten().or(request.tier) {
            Some(tier) => tier,
            None => {
                let rolled = roll_tier(ctx.cfg, luck, request.allow_luck_upgrades, rng);
                tier_rolls.push(rolled);
                rolled.tier
            }
        };
        let mut tries = 0;
        let (draw, committed) = loop {
            let mut scratch = ledger.clone();
            let draw = draw_one(ctx.pools, tier, ctx.party, ctx.reroll, &mut scratch, rng);
            tries += 1;
            attempts += 1;
            let duplicate = options.iter().any(|option| option.id == draw.id);
            if !duplicate || tries >= budget {
                break (draw, scratch);
            }
        };
        ledger = committed;
        options.push(RewardOption {
            id: draw.id,
            tier: draw.tier,
        });
        traces.push(draw.trace);
    }

    let cost = if request.allow_reroll {
        let locked: Vec<RewardTier>;
        let locked_ref = if request.lock_tiers {
            locked = options.iter().filter_map(|option| option.tier).collect();
            Some(locked.as_slice())
        } else {
            None
        };
        reroll_cost(ctx.cfg, ctx.wave, ctx.reroll, locked_ref)
    } else {
        None
    };

    RewardOffer {
        options,
        reroll_cost: cost,
        tier_rolls,
        attempts,
        traces,
    }
}
