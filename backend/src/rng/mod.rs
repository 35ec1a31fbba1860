//! Deterministic random number generation
//!
//! A single federation-wide generator, seeded from configuration, samples
//! every `RandomDuration` node. Same seed and same scenario give the same
//! sampled durations.

mod xorshift;

pub use xorshift::RngManager;
