//! Gate controller: the per-request decision.
//!
//! ```text
//! resolve ─┬─ issue action ──► new challenge id
//!          ├─ show action  ──► rendered image | not found
//!          └─ other ─► admit ─┬─ not gated ───────────────► downstream
//!                             └─ gated ─► threshold check ─► [verify + rotate] ─► downstream ─► report
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use warden_common::constants::{MAX_IMAGE_DIMENSION, fields as field};
use warden_common::{ActionOutcome, FailureKey, GateStatsSnapshot, Verdict, WardenError};

use super::form::FormFields;
use super::policy::GatePolicies;
use super::tracker::FailureTracker;
use crate::captcha::ChallengeEngine;
use crate::config::CaptchaConfig;

/// Immutable gate settings
#[derive(Debug, Clone)]
pub struct GateSettings {
    pub disabled: bool,
    pub get_action: String,
    pub show_action: String,
    pub captcha_length: usize,
    pub image_width: u32,
    pub image_height: u32,
    pub max_form_bytes: usize,
}

impl GateSettings {
    pub fn from_config(config: &CaptchaConfig) -> Result<Self, WardenError> {
        if config.captcha_length == 0 {
            return Err(WardenError::Config("captcha_length must be positive".to_string()));
        }
        if config.image_width == 0 || config.image_height == 0 {
            return Err(WardenError::Config("image dimensions must be positive".to_string()));
        }
        if config.get_action.is_empty() || config.show_action.is_empty() {
            return Err(WardenError::Config("get_action and show_action must be set".to_string()));
        }
        if config.get_action == config.show_action {
            return Err(WardenError::Config(
                "get_action and show_action must differ".to_string(),
            ));
        }

        Ok(Self {
            disabled: config.disabled,
            get_action: config.get_action.clone(),
            show_action: config.show_action.clone(),
            captcha_length: config.captcha_length,
            image_width: config.image_width,
            image_height: config.image_height,
            max_form_bytes: config.max_form_bytes,
        })
    }
}

/// How a request's action is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Issue a new challenge id
    Issue,
    /// Render a challenge image
    Show,
    /// Any other action: admit, run downstream, report
    Action,
}

/// A failure counter the downstream outcome must be reported against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub key: FailureKey,
    pub max_fail_count: u32,
}

/// Result of the before hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Action is not gated; no bookkeeping
    Open,
    /// Action is gated and the request may proceed
    Guarded {
        /// Present for threshold policies
        ticket: Option<Ticket>,
        /// Whether a challenge was solved for this request
        verified: bool,
    },
}

impl Admission {
    pub fn ticket(&self) -> Option<&Ticket> {
        match self {
            Self::Guarded { ticket, .. } => ticket.as_ref(),
            Self::Open => None,
        }
    }

    pub fn verified(&self) -> bool {
        matches!(self, Self::Guarded { verified: true, .. })
    }
}

/// Runtime statistics
#[derive(Default)]
pub struct GateStats {
    pub issued: AtomicU64,
    pub rendered: AtomicU64,
    pub verified: AtomicU64,
    pub rejected_missing: AtomicU64,
    pub rejected_wrong: AtomicU64,
    pub failures_recorded: AtomicU64,
}

/// The adaptive CAPTCHA gate
pub struct Gate {
    settings: GateSettings,
    policies: GatePolicies,
    tracker: FailureTracker,
    engine: ChallengeEngine,
    stats: GateStats,
}

impl Gate {
    pub fn new(
        settings: GateSettings,
        policies: GatePolicies,
        tracker: FailureTracker,
        engine: ChallengeEngine,
    ) -> Self {
        Self {
            settings,
            policies,
            tracker,
            engine,
            stats: GateStats::default(),
        }
    }

    /// Build a gate from configuration. Invalid settings or policies are fatal.
    pub fn from_config(config: &CaptchaConfig, engine: ChallengeEngine) -> Result<Self, WardenError> {
        let settings = GateSettings::from_config(config)?;
        let policies = GatePolicies::build(&config.actions)?;
        if policies.is_empty() && !settings.disabled {
            return Err(WardenError::Config(
                "no gated actions configured; set disabled = true to run without protection"
                    .to_string(),
            ));
        }
        for reserved in [&settings.get_action, &settings.show_action] {
            if policies.matcher().matches(reserved) {
                tracing::warn!(action = %reserved, "Issuance/render action is also gated; it will not be verified");
            }
        }
        let tracker = FailureTracker::new(Duration::from_secs(config.failure_ttl_secs));

        tracing::info!(
            disabled = settings.disabled,
            gated_actions = policies.len(),
            "CAPTCHA gate configured"
        );

        Ok(Self::new(settings, policies, tracker, engine))
    }

    pub fn settings(&self) -> &GateSettings {
        &self.settings
    }

    pub fn is_disabled(&self) -> bool {
        self.settings.disabled
    }

    pub fn policies(&self) -> &GatePolicies {
        &self.policies
    }

    pub fn tracker(&self) -> &FailureTracker {
        &self.tracker
    }

    pub fn engine(&self) -> &ChallengeEngine {
        &self.engine
    }

    /// Resolve how an action is handled
    pub fn route(&self, action: &str) -> Route {
        if action == self.settings.get_action {
            Route::Issue
        } else if action == self.settings.show_action {
            Route::Show
        } else {
            Route::Action
        }
    }

    /// Issue a new challenge
    pub async fn issue(&self) -> Result<String, WardenError> {
        let id = self
            .engine
            .issue(self.settings.captcha_length)
            .await
            .map_err(store_error)?;
        self.stats.issued.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }

    /// Render the challenge named in the request
    pub async fn render(&self, fields: &FormFields) -> Result<Vec<u8>, WardenError> {
        let id = fields
            .non_empty(field::CHALLENGE_ID)
            .or_else(|| fields.non_empty(field::CAPTCHA_ID))
            .ok_or_else(|| WardenError::NotFound("challenge".to_string()))?;

        let width = clamp_dimension(fields.get(field::WIDTH), self.settings.image_width);
        let height = clamp_dimension(fields.get(field::HEIGHT), self.settings.image_height);

        if fields.non_empty(field::RELOAD).is_some() {
            self.engine.reload(id).await.map_err(store_error)?;
        }

        let image = self
            .engine
            .render(id, width, height)
            .await
            .map_err(store_error)?
            .ok_or_else(|| WardenError::NotFound("challenge".to_string()))?;

        self.stats.rendered.fetch_add(1, Ordering::Relaxed);
        Ok(image)
    }

    /// Before hook: decide whether the request may reach the downstream
    /// operation, verifying a challenge when the policy demands one.
    pub async fn admit(&self, action: &str, fields: &FormFields) -> Result<Admission, WardenError> {
        if self.settings.disabled {
            return Ok(Admission::Open);
        }
        let Some(policy) = self.policies.lookup(action) else {
            return Ok(Admission::Open);
        };

        let ticket = self.ticket_for(action, fields);
        let required = match &ticket {
            None => true,
            Some(ticket) => self
                .tracker
                .get(&ticket.key)
                .is_some_and(|count| policy.is_exceeded_by(count)),
        };

        if required {
            self.verify(action, fields).await?;
        }

        Ok(Admission::Guarded {
            ticket,
            verified: required,
        })
    }

    /// Failure-tracking ticket for a request, if its action uses a threshold policy
    pub fn ticket_for(&self, action: &str, fields: &FormFields) -> Option<Ticket> {
        if self.settings.disabled {
            return None;
        }
        let policy = self.policies.lookup(action)?;
        policy.tracks_failures().then(|| Ticket {
            key: FailureKey::new(action, fields.get(&policy.identifier_field).unwrap_or_default()),
            max_fail_count: policy.max_fail_count,
        })
    }

    /// After hook: feed the downstream outcome into the failure tracker
    pub fn report(&self, ticket: &Ticket, outcome: ActionOutcome) {
        match outcome {
            ActionOutcome::Failure => {
                let count = self.tracker.increment(ticket.key.clone());
                self.stats.failures_recorded.fetch_add(1, Ordering::Relaxed);
                if count == u64::from(ticket.max_fail_count) + 1 {
                    tracing::info!(key = %ticket.key, count, "Failure threshold exceeded, CAPTCHA now required");
                } else {
                    tracing::debug!(key = %ticket.key, count, "Recorded failure");
                }
            }
            ActionOutcome::Success => {
                if self.tracker.reset(&ticket.key) {
                    tracing::debug!(key = %ticket.key, "Failure count reset");
                }
            }
        }
    }

    /// Verify the submitted challenge, rotating it whatever the outcome
    async fn verify(&self, action: &str, fields: &FormFields) -> Result<(), WardenError> {
        let (Some(id), Some(code)) = (
            fields.non_empty(field::CAPTCHA_ID),
            fields.non_empty(field::CAPTCHA_CODE),
        ) else {
            self.stats.rejected_missing.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(action = %action, "Rejected: missing captcha");
            return Err(WardenError::MissingCaptcha);
        };

        match self.engine.verify_and_reload(id, code).await.map_err(store_error)? {
            Verdict::Correct => {
                self.stats.verified.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            verdict @ (Verdict::Wrong | Verdict::Unknown) => {
                self.stats.rejected_wrong.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(action = %action, challenge_id = %id, ?verdict, "Rejected: wrong captcha");
                Err(WardenError::WrongCaptcha)
            }
        }
    }

    /// Reclaim expired counters and challenges: (counters, challenges)
    pub fn sweep(&self) -> (usize, usize) {
        (self.tracker.sweep(), self.engine.sweep())
    }

    /// Get statistics snapshot
    pub fn stats(&self) -> GateStatsSnapshot {
        GateStatsSnapshot {
            issued: self.stats.issued.load(Ordering::Relaxed),
            rendered: self.stats.rendered.load(Ordering::Relaxed),
            verified: self.stats.verified.load(Ordering::Relaxed),
            rejected_missing: self.stats.rejected_missing.load(Ordering::Relaxed),
            rejected_wrong: self.stats.rejected_wrong.load(Ordering::Relaxed),
            failures_recorded: self.stats.failures_recorded.load(Ordering::Relaxed),
            tracked_keys: self.tracker.len() as u64,
            live_challenges: self.engine.store().live_count().unwrap_or_default() as u64,
        }
    }
}

/// Caller-supplied dimension if it parses and stays below the bound,
/// otherwise the configured default
pub fn clamp_dimension(raw: Option<&str>, default: u32) -> u32 {
    raw.and_then(|v| v.trim().parse::<u32>().ok())
        .filter(|&v| v > 0 && v < MAX_IMAGE_DIMENSION)
        .unwrap_or(default)
}

fn store_error(err: anyhow::Error) -> WardenError {
    tracing::error!(error = %err, "Challenge store failure");
    WardenError::ChallengeStore(err.to_string())
}
