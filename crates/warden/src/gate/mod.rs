//! Adaptive gating: which actions need a solved challenge, and when.
//!
//! - `matcher` - opt-in whitelist of gated actions
//! - `policy` - per-action identifier field and failure threshold
//! - `tracker` - consecutive-failure counters with TTL
//! - `controller` - the before/after hooks
//! - `middleware` - axum adapter wiring the hooks around a service

mod controller;
mod form;
mod matcher;
mod middleware;
mod policy;
mod tracker;

pub use controller::{Admission, Gate, GateSettings, GateStats, Route, Ticket, clamp_dimension};
pub use form::FormFields;
pub use matcher::ActionMatcher;
pub use middleware::{IssueResponse, captcha_gate, outcome_of};
pub use policy::GatePolicies;
pub use tracker::FailureTracker;
