//! Deterministic random number generation
//!
//! Seeds are derived from (stream, entity, tick) so the draw for one ship never
//! depends on how many draws other ships made before it.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Named random streams. The discriminant feeds the seed derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Exploration = 1,
}

#[derive(Debug, Clone)]
pub struct RngManager {
    master_seed: u64,
}

impl RngManager {
    pub fn new(seed: u64) -> Self {
        Self { master_seed: seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Create a deterministic RNG for a specific (stream, entity, tick)
    pub fn entity_rng(&self, stream: Stream, entity_id: u64, tick: u64) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.derive_seed(stream as u64, entity_id, tick))
    }

    fn derive_seed(&self, stream: u64, entity_id: u64, tick: u64) -> u64 {
        let mut seed = self.master_seed;
        seed = seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        seed ^= stream.wrapping_mul(1103515245);
        seed = seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        seed ^= entity_id.wrapping_mul(48271);
        seed = seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        seed ^= tick.wrapping_mul(69069);
        seed
    }
}

impl Default for RngManager {
    fn default() -> Self {
        Self::new(42)
    }
}
