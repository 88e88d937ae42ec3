//! Seeded randomness for reproducible runs.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// The random source threaded through every component.
pub type SimRng = ChaCha8Rng;

/// Stream id of the kernel loop's own generator.
pub const KERNEL_STREAM: u64 = 0;

/// Creates the generator of stream `stream` for a run seeded with `seed`.
///
/// Each concurrent task draws from its own stream, so its random choices do
/// not depend on how tasks interleave.
pub fn derive_rng(seed: u64, stream: u64) -> SimRng {
    let combined = seed.wrapping_mul(0x517cc1b727220a95) ^ stream.wrapping_mul(0x9e3779b97f4a7c15);
    ChaCha8Rng::seed_from_u64(combined)
}
