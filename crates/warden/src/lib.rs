//! # Warden - Adaptive CAPTCHA Gate
//!
//! Protects selected API actions from automated abuse by demanding a solved
//! challenge, either on every request or only after a caller has failed too
//! many times in a row.
//!
//! ## Architecture
//! ```text
//! Client → captcha_gate ─┬─► GetCaptcha / ShowCaptcha (served directly)
//!                        └─► admit → downstream → report
//!                              ↓                     ↓
//!                      ChallengeEngine        FailureTracker
//!                      (memory | Redis)       (TTL counters)
//! ```

pub mod captcha;
pub mod config;
pub mod error;
pub mod gate;
pub mod routes;
pub mod state;
pub mod sweeper;
