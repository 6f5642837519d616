//! Challenge lifecycle: issue, render, verify, rotate.
//!
//! Challenges are numeric answers rendered as PNG images. The store keeps
//! one live answer per id; every verification attempt rotates it so a solved
//! answer is good exactly once.

mod engine;
mod generator;
mod store;

pub use engine::ChallengeEngine;
pub use generator::{generate_answer, generate_challenge_id, normalize_answer, render_png};
pub use store::{ChallengeStore, MemoryStore, RedisStore, Rotation};
