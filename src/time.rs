//! Time and randomness as injected capabilities.
//!
//! The crate never reads a real clock or RNG itself: every `execute(now,
//! rand)` boundary (spec §4.12) receives both by reference so tests can
//! supply deterministic doubles and the embedding firmware can supply real
//! hardware-backed ones.

pub use embassy_time::{Duration, Instant};

/// A uniform random-number source with the bounded-draw shape the platform
/// is assumed to provide (spec §1: "a uniform RNG (uint8/16/32 with
/// bounds)"). `min`/`max` are inclusive.
pub trait Rand {
    fn gen_u8(&mut self, min: u8, max: u8) -> u8;
    fn gen_u16(&mut self, min: u16, max: u16) -> u16;
    fn gen_u32(&mut self, min: u32, max: u32) -> u32;
}

#[cfg(test)]
pub mod test_support {
    use super::Rand;
    use rand::{Rng, SeedableRng, rngs::SmallRng};

    /// Deterministic `Rand` double backed by a seeded `SmallRng`, for tests
    /// that need reproducible draws (frame-id generation, UHF backoff).
    pub struct DeterministicRand(SmallRng);

    impl DeterministicRand {
        pub fn new(seed: u64) -> Self {
            Self(SmallRng::seed_from_u64(seed))
        }
    }

    impl Rand for DeterministicRand {
        fn gen_u8(&mut self, min: u8, max: u8) -> u8 {
            self.0.gen_range(min..=max)
        }

        fn gen_u16(&mut self, min: u16, max: u16) -> u16 {
            self.0.gen_range(min..=max)
        }

        fn gen_u32(&mut self, min: u32, max: u32) -> u32 {
            self.0.gen_range(min..=max)
        }
    }
}
