//! Stratified sub-pixel offsets for progressive sampling.
//!
//! The pixel is split into a 4x4 grid of cells. Sample `s` lands in cell
//! `(s mod 4, (s / 4) mod 4)`, jittered within it, so every 16 samples cover
//! the whole pixel once. The first sample goes through the pixel center.

use std::cell::RefCell;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Cells per side of the stratification grid.
pub const STRATA: u32 = 4;

/// Half the width of one cell's jitter window.
pub const MAX_JITTER: f64 = 0.5 / STRATA as f64;

thread_local! {
    /// Per-thread generator, so workers never contend on a shared RNG.
    static RNG: RefCell<StdRng> = RefCell::new(StdRng::from_entropy());
}

/// Uniform jitter in `[-MAX_JITTER, MAX_JITTER)` for each axis.
pub fn random_jitter() -> (f64, f64) {
    RNG.with(|rng| {
        let mut rng = rng.borrow_mut();
        (
            rng.gen_range(-MAX_JITTER..MAX_JITTER),
            rng.gen_range(-MAX_JITTER..MAX_JITTER),
        )
    })
}

/// Stratification cell for the sample with index `samples`.
pub fn cell(samples: u32) -> (u32, u32) {
    (samples % STRATA, (samples / STRATA) % STRATA)
}

/// Offset inside the pixel for the next sample, given how many samples the
/// pixel already has.
pub fn sample_offset(samples: u32, jitter: (f64, f64)) -> (f64, f64) {
    if samples == 0 {
        return (0.5, 0.5);
    }
    let (cx, cy) = cell(samples);
    let size = 1.0 / f64::from(STRATA);
    (
        (f64::from(cx) + 0.5) * size + jitter.0,
        (f64::from(cy) + 0.5) * size + jitter.1,
    )
}

/// [`sample_offset`] with jitter from the thread-local generator.
pub fn next_offset(samples: u32) -> (f64, f64) {
    if samples == 0 {
        return (0.5, 0.5);
    }
    sample_offset(samples, random_jitter())
}
