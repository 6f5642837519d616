//! Challenge storage backends.

use anyhow::{Context, Result};
use dashmap::DashMap;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tokio::time::Instant;

use warden_common::Verdict;
use warden_common::constants::redis_keys::CAPTCHA_PREFIX;

/// Atomically compare the stored answer and rotate it.
/// ARGV: candidate, primary, fallback, ttl.
/// Returns -1 for an unknown id, 1 for a match, 0 otherwise.
const VERIFY_AND_ROTATE_LUA: &str = r"
local current = redis.call('HGET', KEYS[1], 'answer')
if not current then return -1 end
local next = ARGV[2]
if next == current then next = ARGV[3] end
redis.call('HSET', KEYS[1], 'answer', next)
redis.call('EXPIRE', KEYS[1], ARGV[4])
if current == ARGV[1] then return 1 end
return 0
";

/// Replace the answer of a live challenge. ARGV: primary, fallback, ttl.
/// Returns 1 if it existed.
const ROTATE_LUA: &str = r"
local current = redis.call('HGET', KEYS[1], 'answer')
if not current then return 0 end
local next = ARGV[1]
if next == current then next = ARGV[2] end
redis.call('HSET', KEYS[1], 'answer', next)
redis.call('EXPIRE', KEYS[1], ARGV[3])
return 1
";

/// Two distinct replacement answers. The store keeps whichever differs from
/// the current answer, so a rotated challenge never accepts its old answer.
#[derive(Debug, Clone)]
pub struct Rotation {
    primary: String,
    fallback: String,
}

impl Rotation {
    pub fn new(primary: String, fallback: String) -> Self {
        debug_assert_ne!(primary, fallback);
        Self { primary, fallback }
    }

    fn pick(self, current: &str) -> String {
        if self.primary == current {
            self.fallback
        } else {
            self.primary
        }
    }
}

/// A stored challenge
#[derive(Debug, Clone)]
struct StoredChallenge {
    answer: String,
    expires_at: Instant,
}

impl StoredChallenge {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Process-local challenge store
pub struct MemoryStore {
    entries: DashMap<String, StoredChallenge>,
    ttl: Duration,
}

impl MemoryStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn insert(&self, id: &str, answer: String) {
        let expires_at = Instant::now() + self.ttl;
        self.entries
            .insert(id.to_string(), StoredChallenge { answer, expires_at });
    }

    /// Current answer of a live challenge
    pub fn answer(&self, id: &str) -> Option<String> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(id) {
            if !entry.is_expired(now) {
                return Some(entry.answer.clone());
            }
        }
        self.entries.remove_if(id, |_, c| c.is_expired(now));
        None
    }

    /// Replace the answer of a live challenge and restart its TTL
    pub fn replace(&self, id: &str, rotation: Rotation) -> bool {
        let now = Instant::now();
        let replaced = match self.entries.get_mut(id) {
            Some(mut entry) if !entry.is_expired(now) => {
                entry.answer = rotation.pick(&entry.answer);
                entry.expires_at = now + self.ttl;
                true
            }
            _ => false,
        };
        if !replaced {
            self.entries.remove_if(id, |_, c| c.is_expired(now));
        }
        replaced
    }

    /// Compare and rotate under the entry lock
    pub fn verify_and_replace(&self, id: &str, candidate: &str, rotation: Rotation) -> Verdict {
        let now = Instant::now();
        let verdict = match self.entries.get_mut(id) {
            Some(mut entry) if !entry.is_expired(now) => {
                let matched = entry.answer == candidate;
                entry.answer = rotation.pick(&entry.answer);
                entry.expires_at = now + self.ttl;
                if matched { Verdict::Correct } else { Verdict::Wrong }
            }
            _ => Verdict::Unknown,
        };
        if verdict == Verdict::Unknown {
            self.entries.remove_if(id, |_, c| c.is_expired(now));
        }
        verdict
    }

    /// Drop expired challenges, returning how many were removed
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, c| !c.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Redis-backed challenge store, shared between nodes
pub struct RedisStore {
    conn: ConnectionManager,
    ttl_secs: u64,
    verify_script: redis::Script,
    rotate_script: redis::Script,
}

impl RedisStore {
    /// Connect to Redis with connection manager (handles reconnection)
    pub async fn connect(redis_url: &str, ttl: Duration) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        Ok(Self {
            conn,
            ttl_secs: ttl.as_secs().max(1),
            verify_script: redis::Script::new(VERIFY_AND_ROTATE_LUA),
            rotate_script: redis::Script::new(ROTATE_LUA),
        })
    }

    fn key(id: &str) -> String {
        format!("{}{}", CAPTCHA_PREFIX, id)
    }

    pub async fn insert(&self, id: &str, answer: &str) -> Result<()> {
        let key = Self::key(id);
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .hset(&key, "answer", answer)
            .ignore()
            .hset(&key, "issued_at", chrono::Utc::now().timestamp())
            .ignore()
            .expire(&key, self.ttl_secs as i64)
            .ignore()
            .query_async(&mut conn)
            .await
            .context("Failed to store challenge")?;
        Ok(())
    }

    pub async fn answer(&self, id: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let answer: Option<String> = conn
            .hget(Self::key(id), "answer")
            .await
            .context("Failed to load challenge")?;
        Ok(answer)
    }

    pub async fn replace(&self, id: &str, rotation: &Rotation) -> Result<bool> {
        let mut conn = self.conn.clone();
        let replaced: i64 = self
            .rotate_script
            .key(Self::key(id))
            .arg(&rotation.primary)
            .arg(&rotation.fallback)
            .arg(self.ttl_secs)
            .invoke_async(&mut conn)
            .await
            .context("Failed to rotate challenge")?;
        Ok(replaced == 1)
    }

    pub async fn verify_and_replace(
        &self,
        id: &str,
        candidate: &str,
        rotation: &Rotation,
    ) -> Result<Verdict> {
        let mut conn = self.conn.clone();
        let outcome: i64 = self
            .verify_script
            .key(Self::key(id))
            .arg(candidate)
            .arg(&rotation.primary)
            .arg(&rotation.fallback)
            .arg(self.ttl_secs)
            .invoke_async(&mut conn)
            .await
            .context("Failed to verify challenge")?;

        Ok(match outcome {
            1 => Verdict::Correct,
            0 => Verdict::Wrong,
            _ => Verdict::Unknown,
        })
    }

    pub async fn ping(&self) -> bool {
        let mut conn = self.conn.clone();
        let result: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
        result.is_ok()
    }
}

/// Challenge store backend
pub enum ChallengeStore {
    Memory(MemoryStore),
    Redis(RedisStore),
    /// Fails every call, as an unreachable backend would
    #[cfg(test)]
    Unavailable,
}

impl ChallengeStore {
    pub async fn insert(&self, id: &str, answer: String) -> Result<()> {
        match self {
            Self::Memory(store) => {
                store.insert(id, answer);
                Ok(())
            }
            Self::Redis(store) => store.insert(id, &answer).await,
            #[cfg(test)]
            Self::Unavailable => Err(unavailable()),
        }
    }

    pub async fn answer(&self, id: &str) -> Result<Option<String>> {
        match self {
            Self::Memory(store) => Ok(store.answer(id)),
            Self::Redis(store) => store.answer(id).await,
            #[cfg(test)]
            Self::Unavailable => Err(unavailable()),
        }
    }

    pub async fn replace(&self, id: &str, rotation: Rotation) -> Result<bool> {
        match self {
            Self::Memory(store) => Ok(store.replace(id, rotation)),
            Self::Redis(store) => store.replace(id, &rotation).await,
            #[cfg(test)]
            Self::Unavailable => Err(unavailable()),
        }
    }

    pub async fn verify_and_replace(
        &self,
        id: &str,
        candidate: &str,
        rotation: Rotation,
    ) -> Result<Verdict> {
        match self {
            Self::Memory(store) => Ok(store.verify_and_replace(id, candidate, rotation)),
            Self::Redis(store) => store.verify_and_replace(id, candidate, &rotation).await,
            #[cfg(test)]
            Self::Unavailable => Err(unavailable()),
        }
    }

    /// Reclaim expired challenges. Redis expires keys on its own.
    pub fn sweep(&self) -> usize {
        match self {
            Self::Memory(store) => store.sweep(),
            Self::Redis(_) => 0,
            #[cfg(test)]
            Self::Unavailable => 0,
        }
    }

    /// Live challenges held in process, if known
    pub fn live_count(&self) -> Option<usize> {
        match self {
            Self::Memory(store) => Some(store.len()),
            Self::Redis(_) => None,
            #[cfg(test)]
            Self::Unavailable => None,
        }
    }

    pub async fn ping(&self) -> bool {
        match self {
            Self::Memory(_) => true,
            Self::Redis(store) => store.ping().await,
            #[cfg(test)]
            Self::Unavailable => false,
        }
    }
}

#[cfg(test)]
fn unavailable() -> anyhow::Error {
    anyhow::anyhow!("connection refused")
}
