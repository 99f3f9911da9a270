//! Seeded pseudo-random generators owned by randomized stages

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Generator type used by every randomized stage
pub type SeededRng = ChaCha8Rng;

/// Seed for a randomized stage in a given epoch
pub fn effective_seed(base_seed: u64, epoch: u64) -> u64 {
    base_seed.wrapping_add(epoch)
}

/// Create a generator from a seed
pub fn seeded_rng(seed: u64) -> SeededRng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// A uniformly random permutation of `0..len`
pub fn permutation(len: usize, rng: &mut SeededRng) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..len).collect();
    indices.shuffle(rng);
    indices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permutation_is_deterministic() {
        let a = permutation(16, &mut seeded_rng(effective_seed(42, 1)));
        let b = permutation(16, &mut seeded_rng(43));
        assert_eq!(a, b);

        let mut sorted = a.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn test_effective_seed_wraps() {
        assert_eq!(effective_seed(u64::MAX, 2), 1);
    }
}
