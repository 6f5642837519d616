//! Application state and shared resources.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::captcha::{ChallengeEngine, ChallengeStore, MemoryStore, RedisStore};
use crate::config::{AppConfig, StoreKind};
use crate::gate::Gate;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,

    /// The CAPTCHA gate
    pub gate: Arc<Gate>,

    /// Process start, for uptime reporting
    pub started_at: Instant,
}

impl AppState {
    /// Create application state, connecting to Redis if configured
    pub async fn new(config: AppConfig) -> Result<Self> {
        let ttl = Duration::from_secs(config.captcha.challenge_ttl_secs);

        // A disabled gate never touches the store
        let kind = if config.captcha.disabled {
            StoreKind::Memory
        } else {
            config.captcha.store
        };
        let store = match kind {
            StoreKind::Memory => ChallengeStore::Memory(MemoryStore::new(ttl)),
            StoreKind::Redis => {
                let store = RedisStore::connect(&config.redis_url, ttl).await?;
                tracing::info!(redis_url = %config.redis_url, "Redis challenge store connected");
                ChallengeStore::Redis(store)
            }
        };

        let engine = ChallengeEngine::new(store, config.captcha.captcha_length);
        let gate = Gate::from_config(&config.captcha, engine).context("Invalid captcha configuration")?;

        Ok(Self::with_gate(config, Arc::new(gate)))
    }

    pub fn with_gate(config: AppConfig, gate: Arc<Gate>) -> Self {
        Self {
            config,
            gate,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
