//! Process-wide random stream. Each random op draws its own seed from this
//! stream at construction time, so realizing the same node twice is
//! deterministic.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

static STREAM: Mutex<Option<StdRng>> = Mutex::new(None);

/// Reseed the process stream. Arrays constructed afterwards draw their op
/// seeds from the new stream.
pub fn seed_rng(seed: u64) {
    *STREAM.lock().unwrap() = Some(StdRng::seed_from_u64(seed));
}

pub(crate) fn next_seed() -> u64 {
    let mut guard = STREAM.lock().unwrap();
    let rng = guard.get_or_insert_with(StdRng::from_entropy);
    rng.gen()
}
