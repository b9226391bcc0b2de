//! Standard player reward pools.

use super::{PoolEntry, RewardPool, RewardPools, RewardTier};
use crate::battle::{PartySnapshot, UnlockSnapshot};

pub const POKEBALL: &str = "POKEBALL";
pub const RARE_CANDY: &str = "RARE_CANDY";
pub const POTION: &str = "POTION";
pub const SUPER_POTION: &str = "SUPER_POTION";
pub const REVIVE: &str = "REVIVE";
pub const MAX_REVIVE: &str = "MAX_REVIVE";
pub const GREAT_BALL: &str = "GREAT_BALL";
pub const NUGGET: &str = "NUGGET";
pub const VOUCHER: &str = "VOUCHER";
pub const ULTRA_BALL: &str = "ULTRA_BALL";
pub const BIG_NUGGET: &str = "BIG_NUGGET";
pub const AMULET_COIN: &str = "AMULET_COIN";
pub const EVIOLITE: &str = "EVIOLITE";
pub const LUCKY_EGG: &str = "LUCKY_EGG";
pub const QUICK_CLAW: &str = "QUICK_CLAW";
pub const VOUCHER_PLUS: &str = "VOUCHER_PLUS";
pub const MASTER_BALL: &str = "MASTER_BALL";
pub const SHINY_CHARM: &str = "SHINY_CHARM";
pub const HEALING_CHARM: &str = "HEALING_CHARM";
pub const VOUCHER_PREMIUM: &str = "VOUCHER_PREMIUM";
pub const MINI_BLACK_HOLE: &str = "MINI_BLACK_HOLE";

/// Unlock flag gating the Eviolite entry.
pub const UNLOCK_EVIOLITE: &str = "eviolite";
/// Unlock flag gating the Mini Black Hole entry.
pub const UNLOCK_MINI_BLACK_HOLE: &str = "mini_black_hole";

fn potion_weight(party: &PartySnapshot, _reroll: u32) -> u32 {
    party.hurt_members().min(3) * 3
}

fn super_potion_weight(party: &PartySnapshot, _reroll: u32) -> u32 {
    party.hurt_members().min(3)
}

fn revive_weight(party: &PartySnapshot, _reroll: u32) -> u32 {
    party.fainted_members().min(3) * 9
}

fn max_revive_weight(party: &PartySnapshot, _reroll: u32) -> u32 {
    party.fainted_members().min(3) * 3
}

fn voucher_weight(_party: &PartySnapshot, reroll: u32) -> u32 {
    1_u32.saturating_sub(reroll)
}

fn voucher_plus_weight(_party: &PartySnapshot, reroll: u32) -> u32 {
    3_u32.saturating_sub(reroll)
}

fn voucher_premium_weight(_party: &PartySnapshot, reroll: u32) -> u32 {
    5_u32.saturating_sub(reroll.saturating_mul(2))
}

/// Build the standard pools for a run. Unlock-gated entries are included only
/// when their flag is set in `unlocks`.
#[must_use]
pub fn standard_pools(unlocks: &UnlockSnapshot, default_reward: &str) -> RewardPools {
    let common = RewardPool::empty(RewardTier::Common)
        .with(PoolEntry::fixed(POKEBALL, 6))
        .with(PoolEntry::fixed(RARE_CANDY, 2))
        .with(PoolEntry::dynamic(POTION, potion_weight, 9))
        .with(PoolEntry::dynamic(SUPER_POTION, super_potion_weight, 3));

    let great = RewardPool::empty(RewardTier::Great)
        .with(PoolEntry::fixed(GREAT_BALL, 6))
        .with(PoolEntry::dynamic(REVIVE, revive_weight, 27))
        .with(PoolEntry::dynamic(MAX_REVIVE, max_revive_weight, 9))
        .with(PoolEntry::fixed(NUGGET, 5))
        .with(PoolEntry::dynamic(VOUCHER, voucher_weight, 1));

    let mut ultra = RewardPool::empty(RewardTier::Ultra)
        .with(PoolEntry::fixed(ULTRA_BALL, 15))
        .with(PoolEntry::fixed(BIG_NUGGET, 12))
        .with(PoolEntry::fixed(AMULET_COIN, 3).with_max_stack(1));
    if unlocks.is_unlocked(UNLOCK_EVIOLITE) {
        ultra = ultra.with(PoolEntry::fixed(EVIOLITE, 10));
    }

    let rogue = RewardPool::empty(RewardTier::Rogue)
        .with(PoolEntry::fixed(LUCKY_EGG, 4))
        .with(PoolEntry::fixed(QUICK_CLAW, 3))
        .with(PoolEntry::dynamic(VOUCHER_PLUS, voucher_plus_weight, 3));

    let mut master = RewardPool::empty(RewardTier::Master)
        .with(PoolEntry::fixed(MASTER_BALL, 24))
        .with(PoolEntry::fixed(SHINY_CHARM, 14).with_max_stack(1))
        .with(PoolEntry::fixed(HEALING_CHARM, 18))
        .with(PoolEntry::dynamic(VOUCHER_PREMIUM, voucher_premium_weight, 5));
    if unlocks.is_unlocked(UNLOCK_MINI_BLACK_HOLE) {
        master = master.with(PoolEntry::fixed(MINI_BLACK_HOLE, 1));
    }

    RewardPools::new(default_reward)
        .with_pool(common)
        .with_pool(great)
        .with_pool(ultra)
        .with_pool(rogue)
        .with_pool(master)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewards::RewardId;

    fn weight_of(pools: &RewardPools, tier: RewardTier, id: &str, reroll: u32) -> u32 {
        let party = PartySnapshot::default();
        pools
            .pool(tier)
            .entries
            .iter()
            .find(|entry| entry.id.as_str() == id)
            .map_or(0, |entry| entry.evaluate(&party, reroll).1)
    }

    #[test]
    fn vouchers_hit_zero_at_their_cutoff() {
        let pools = standard_pools(&UnlockSnapshot::default(), POKEBALL);
        assert_eq!(weight_of(&pools, RewardTier::Great, VOUCHER, 0), 1);
        assert_eq!(weight_of(&pools, RewardTier::Great, VOUCHER, 1), 0);
        assert_eq!(weight_of(&pools, RewardTier::Rogue, VOUCHER_PLUS, 2), 1);
        assert_eq!(weight_of(&pools, RewardTier::Rogue, VOUCHER_PLUS, 3), 0);
        assert_eq!(weight_of(&pools, RewardTier::Master, VOUCHER_PREMIUM, 2), 1);
        assert_eq!(weight_of(&pools, RewardTier::Master, VOUCHER_PREMIUM, 3), 0);
        assert_eq!(weight_of(&pools, RewardTier::Master, VOUCHER_PREMIUM, 40), 0);
    }

    #[test]
    fn unlock_flags_gate_entries() {
        let locked = standard_pools(&UnlockSnapshot::default(), POKEBALL);
        assert_eq!(locked.tier_of(&RewardId::from(EVIOLITE)), None);

        let unlocked = standard_pools(
            &UnlockSnapshot::new([UNLOCK_EVIOLITE, UNLOCK_MINI_BLACK_HOLE]),
            POKEBALL,
        );
        assert_eq!(
            unlocked.tier_of(&RewardId::from(EVIOLITE)),
            Some(RewardTier::Ultra)
        );
        assert_eq!(
            unlocked.tier_of(&RewardId::from(MINI_BLACK_HOLE)),
            Some(RewardTier::Master)
        );
    }

    #[test]
    fn healing_items_need_hurt_members() {
        let pools = standard_pools(&UnlockSnapshot::default(), POKEBALL);
        assert_eq!(weight_of(&pools, RewardTier::Common, POTION, 0), 0);
        assert_eq!(weight_of(&pools, RewardTier::Great, REVIVE, 0), 0);
    }
}
