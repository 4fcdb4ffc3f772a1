//! Core primitives.
//!
//! Seeded randomness shared by every room.

pub mod rng;

pub use rng::{derive_room_seed, DeterministicRng};
