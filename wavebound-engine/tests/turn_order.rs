use std::collections::BTreeSet;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use wavebound_engine::{
    BattlerIndex, RngBundle, TurnCandidate, TurnOrderError, TurnOrderRequest, resolve_turn_order,
};

const ALL: [BattlerIndex; 4] = [
    BattlerIndex::Player,
    BattlerIndex::PlayerTwo,
    BattlerIndex::Enemy,
    BattlerIndex::EnemyTwo,
];

fn resolve(candidates: &[TurnCandidate], seed: u64) -> Vec<BattlerIndex> {
    let active: Vec<BattlerIndex> = candidates.iter().map(|c| c.battler).collect();
    resolve_turn_order(&TurnOrderRequest {
        active: &active,
        candidates,
        tie_break_seed: seed,
        override_order: None,
    })
    .unwrap()
    .to_vec()
}

#[test]
fn random_fields_order_by_priority_then_speed() {
    let mut rng = ChaCha20Rng::seed_from_u64(0x7E57);
    for _ in 0..1_000 {
        let candidates: Vec<TurnCandidate> = ALL
            .iter()
            .map(|battler| TurnCandidate::new(*battler, rng.gen_range(-1..=2), rng.gen_range(1..6)))
            .collect();
        let seed = rng.r#gen::<u64>();
        let order = resolve(&candidates, seed);

        assert_eq!(order.len(), candidates.len());
        let keys: Vec<(i8, u32)> = order
            .iter()
            .map(|battler| {
                let c = candidates.iter().find(|c| c.battler == *battler).unwrap();
                (c.priority, c.speed)
            })
            .collect();
        for pair in keys.windows(2) {
            assert!(pair[0] >= pair[1], "out of order: {keys:?}");
        }
        assert_eq!(order, resolve(&candidates, seed), "seed {seed} is not deterministic");
    }
}

#[test]
fn listing_order_never_changes_the_result() {
    let candidates = [
        TurnCandidate::new(BattlerIndex::Player, 0, 40),
        TurnCandidate::new(BattlerIndex::PlayerTwo, 0, 40),
        TurnCandidate::new(BattlerIndex::Enemy, 0, 40),
        TurnCandidate::new(BattlerIndex::EnemyTwo, 1, 5),
    ];
    let mut reversed = candidates;
    reversed.reverse();
    for seed in 0..32 {
        assert_eq!(resolve(&candidates, seed), resolve(&reversed, seed));
    }
}

#[test]
fn exact_ties_may_break_differently_across_seeds() {
    let candidates: Vec<TurnCandidate> = ALL
        .iter()
        .map(|battler| TurnCandidate::new(*battler, 0, 30))
        .collect();
    let orders: BTreeSet<Vec<BattlerIndex>> =
        (0..64).map(|seed| resolve(&candidates, seed)).collect();
    assert!(orders.len() > 1);
    for order in &orders {
        let unique: BTreeSet<_> = order.iter().collect();
        assert_eq!(unique.len(), ALL.len());
    }
}

#[test]
fn derived_tie_break_seeds_are_reproducible_per_turn() {
    let first = RngBundle::from_user_seed(2024);
    let second = RngBundle::from_user_seed(2024);
    assert_eq!(first.turn_order_seed(3, 1), second.turn_order_seed(3, 1));
    assert_ne!(first.turn_order_seed(3, 1), first.turn_order_seed(3, 2));
    assert_ne!(
        first.turn_order_seed(3, 1),
        RngBundle::from_user_seed(2025).turn_order_seed(3, 1)
    );
}

#[test]
fn malformed_requests_are_rejected() {
    let candidates = [
        TurnCandidate::new(BattlerIndex::Player, 0, 10),
        TurnCandidate::new(BattlerIndex::Enemy, 0, 10),
    ];
    let err = resolve_turn_order(&TurnOrderRequest {
        active: &[BattlerIndex::Player],
        candidates: &candidates,
        tie_break_seed: 0,
        override_order: None,
    })
    .unwrap_err();
    assert_eq!(err, TurnOrderError::UnknownBattler(BattlerIndex::Enemy));

    let err = resolve_turn_order(&TurnOrderRequest {
        active: &[BattlerIndex::Player, BattlerIndex::Enemy],
        candidates: &candidates,
        tie_break_seed: 0,
        override_order: Some(&[BattlerIndex::Enemy, BattlerIndex::PlayerTwo]),
    })
    .unwrap_err();
    assert_eq!(err, TurnOrderError::UnknownBattler(BattlerIndex::PlayerTwo));
}
