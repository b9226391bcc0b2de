//! Deterministic random streams for a battle session.
//!
//! Each concern draws from its own stream so that, for example, an extra
//! reward reroll never shifts the tie-break order of a later turn.

use hmac::{Hmac, Mac};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use sha2::Sha256;
use std::cell::{RefCell, RefMut};

type HmacSha256 = Hmac<Sha256>;

/// Bundle of domain-separated RNG streams derived from one user seed.
#[derive(Debug)]
pub struct RngBundle {
    seed: u64,
    reward: RefCell<CountingRng<SmallRng>>,
    encounter: RefCell<CountingRng<SmallRng>>,
}

impl RngBundle {
    /// Construct the bundle from a user-visible seed.
    #[must_use]
    pub fn from_user_seed(seed: u64) -> Self {
        let reward = CountingRng::new(derive_stream_seed(seed, b"reward"));
        let encounter = CountingRng::new(derive_stream_seed(seed, b"encounter"));
        Self {
            seed,
            reward: RefCell::new(reward),
            encounter: RefCell::new(encounter),
        }
    }

    #[must_use]
    pub const fn user_seed(&self) -> u64 {
        self.seed
    }

    /// Access the reward RNG stream.
    #[must_use]
    pub fn reward(&self) -> RefMut<'_, CountingRng<SmallRng>> {
        self.reward.borrow_mut()
    }

    /// Access the encounter RNG stream.
    #[must_use]
    pub fn encounter(&self) -> RefMut<'_, CountingRng<SmallRng>> {
        self.encounter.borrow_mut()
    }

    /// Tie-break seed for one turn. Stable for the whole turn, so recomputing
    /// the order mid-turn reproduces it.
    #[must_use]
    pub fn turn_order_seed(&self, wave: u32, turn: u32) -> u64 {
        let mut tag = Vec::with_capacity(19);
        tag.extend_from_slice(b"turn-order");
        tag.extend_from_slice(&wave.to_le_bytes());
        tag.push(b':');
        tag.extend_from_slice(&turn.to_le_bytes());
        derive_stream_seed(self.seed, &tag)
    }
}

/// Counting wrapper for RNG streams providing instrumentation.
#[derive(Debug, Clone)]
pub struct CountingRng<R> {
    rng: R,
    draws: u64,
}

impl CountingRng<SmallRng> {
    fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            draws: 0,
        }
    }
}

impl<R: rand::RngCore> CountingRng<R> {
    /// Number of draw calls performed against this stream.
    #[must_use]
    pub const fn draws(&self) -> u64 {
        self.draws
    }
}

impl<R: rand::RngCore> rand::RngCore for CountingRng<R> {
    fn next_u32(&mut self) -> u32 {
        self.draws = self.draws.saturating_add(1);
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.draws = self.draws.saturating_add(1);
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.draws = self.draws.saturating_add(1);
        self.rng.fill_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.draws = self.draws.saturating_add(1);
        self.rng.try_fill_bytes(dest)
    }
}

pub(crate) fn derive_stream_seed(user_seed: u64, domain_tag: &[u8]) -> u64 {
    let mut mac =
        HmacSha256::new_from_slice(&user_seed.to_le_bytes()).expect("HMAC accepts any key size");
    mac.update(domain_tag);
    let digest = mac.finalize().into_bytes();
    let mut seed_bytes = [0_u8; 8];
    seed_bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(seed_bytes)
}
