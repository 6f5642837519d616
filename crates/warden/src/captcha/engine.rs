//! Challenge engine: the lifecycle operations the gate depends on.

use anyhow::Result;
use std::time::Duration;

use warden_common::Verdict;

use super::generator::{generate_answer, generate_challenge_id, normalize_answer, render_png};
use super::store::{ChallengeStore, MemoryStore, Rotation};

/// Issues, renders, verifies and rotates challenges
pub struct ChallengeEngine {
    store: ChallengeStore,
    /// Digits in rotated answers
    length: usize,
}

impl ChallengeEngine {
    pub fn new(store: ChallengeStore, length: usize) -> Self {
        Self { store, length }
    }

    /// Engine over a process-local store
    pub fn in_memory(ttl: Duration, length: usize) -> Self {
        Self::new(ChallengeStore::Memory(MemoryStore::new(ttl)), length)
    }

    pub fn store(&self) -> &ChallengeStore {
        &self.store
    }

    /// Create a new challenge and return its id
    pub async fn issue(&self, length: usize) -> Result<String> {
        let id = generate_challenge_id();
        let answer = generate_answer(&mut rand::rng(), length);
        self.store.insert(&id, answer).await?;

        tracing::debug!(challenge_id = %id, length, "Issued challenge");
        Ok(id)
    }

    /// Render the current answer of a challenge. `None` for unknown or
    /// expired ids.
    pub async fn render(&self, id: &str, width: u32, height: u32) -> Result<Option<Vec<u8>>> {
        let Some(answer) = self.store.answer(id).await? else {
            return Ok(None);
        };
        render_png(&answer, width, height).map(Some)
    }

    /// One-shot check of an answer without rotating.
    ///
    /// Callers must `reload` afterwards; the gate uses `verify_and_reload`.
    pub async fn verify(&self, id: &str, answer: &str) -> Result<bool> {
        let Some(candidate) = normalize_answer(answer) else {
            return Ok(false);
        };
        Ok(self.store.answer(id).await?.is_some_and(|expected| expected == candidate))
    }

    /// Assign a fresh answer under the same id. Returns false for unknown ids.
    pub async fn reload(&self, id: &str) -> Result<bool> {
        let reloaded = self.store.replace(id, self.rotation()).await?;
        if reloaded {
            tracing::debug!(challenge_id = %id, "Rotated challenge");
        }
        Ok(reloaded)
    }

    /// Verify an answer and rotate the challenge in one step, whatever the
    /// outcome.
    pub async fn verify_and_reload(&self, id: &str, answer: &str) -> Result<Verdict> {
        // Malformed answers still burn the challenge
        let candidate = normalize_answer(answer).unwrap_or_default();
        self.store
            .verify_and_replace(id, &candidate, self.rotation())
            .await
    }

    fn rotation(&self) -> Rotation {
        let mut rng = rand::rng();
        let primary = generate_answer(&mut rng, self.length);
        let fallback = loop {
            let candidate = generate_answer(&mut rng, self.length);
            if candidate != primary {
                break candidate;
            }
        };
        Rotation::new(primary, fallback)
    }

    /// Reclaim expired challenges
    pub fn sweep(&self) -> usize {
        self.store.sweep()
    }
}
