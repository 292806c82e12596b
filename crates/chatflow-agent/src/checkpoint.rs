//! In-memory checkpoint store.
//!
//! Holds the last committed [`ConversationState`] of every thread so a later
//! run resumes where the previous one stopped.  State is volatile and lost on
//! restart.
//!
//! Runs on the same thread are serialized: [`CheckpointStore::lease`] hands
//! out at most one [`ThreadLease`] per thread id at a time, and a lease is
//! the only way a run commits.  Different threads never contend beyond the
//! map shard they hash to.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::config::CheckpointConfig;
use crate::graph::state::ConversationState;

/// The last committed state of one thread.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadCheckpoint {
    /// Thread identity.
    pub thread_id: String,

    /// Committed conversation.
    pub state: ConversationState,

    /// When the state was last committed.
    pub updated_at: DateTime<Utc>,

    /// Number of commits for this thread.
    pub runs: u64,
}

/// Per-thread conversation state shared across requests.
#[derive(Debug, Default)]
pub struct CheckpointStore {
    checkpoints: DashMap<String, ThreadCheckpoint>,
    /// Run locks for threads with a run in flight or waiting.
    locks: DashMap<String, Arc<Mutex<()>>>,
    max_threads: Option<usize>,
}

impl CheckpointStore {
    /// Create an unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with the limits from `config`.
    pub fn from_config(config: &CheckpointConfig) -> Self {
        Self {
            max_threads: config.max_threads,
            ..Self::default()
        }
    }

    /// Keep at most `max_threads` threads, evicting the least recently
    /// updated idle thread on overflow.
    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = Some(max_threads);
        self
    }

    /// The committed state of `thread_id`, empty if unknown.
    pub fn get(&self, thread_id: &str) -> ConversationState {
        self.checkpoints
            .get(thread_id)
            .map(|cp| cp.state.clone())
            .unwrap_or_default()
    }

    /// The full checkpoint of `thread_id`, if one exists.
    pub fn snapshot(&self, thread_id: &str) -> Option<ThreadCheckpoint> {
        self.checkpoints.get(thread_id).map(|cp| cp.clone())
    }

    /// Overwrite the state of `thread_id` (last write wins).
    ///
    /// Does not wait for a running lease; use [`CheckpointStore::lease`] to
    /// read-modify-write.
    pub fn put(&self, thread_id: &str, state: ConversationState) {
        self.write(thread_id, state);
    }

    /// Wait for exclusive use of `thread_id` and load its committed state.
    pub async fn lease(&self, thread_id: &str) -> ThreadLease<'_> {
        let lock = {
            let entry = self.locks.entry(thread_id.to_owned()).or_default();
            Arc::clone(&*entry)
        };
        let guard = lock.lock_owned().await;

        ThreadLease {
            store: self,
            thread_id: thread_id.to_owned(),
            state: self.get(thread_id),
            guard: Some(guard),
        }
    }

    /// Forget `thread_id`.  Returns whether a checkpoint existed.
    ///
    /// A run already in flight on the thread still commits when it ends.
    pub fn remove(&self, thread_id: &str) -> bool {
        self.checkpoints.remove(thread_id).is_some()
    }

    /// Number of threads with a checkpoint.
    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    /// Whether no thread has a checkpoint.
    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    /// Ids of all checkpointed threads, sorted.
    pub fn thread_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.checkpoints.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    fn write(&self, thread_id: &str, state: ConversationState) {
        let inserted = match self.checkpoints.entry(thread_id.to_owned()) {
            Entry::Occupied(mut entry) => {
                let cp = entry.get_mut();
                cp.state = state;
                cp.updated_at = Utc::now();
                cp.runs += 1;
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(ThreadCheckpoint {
                    thread_id: thread_id.to_owned(),
                    state,
                    updated_at: Utc::now(),
                    runs: 1,
                });
                true
            }
        };

        if inserted {
            self.evict_over_capacity(thread_id);
        }
    }

    fn evict_over_capacity(&self, keep: &str) {
        let Some(max_threads) = self.max_threads else {
            return;
        };

        while self.checkpoints.len() > max_threads {
            let victim = self
                .checkpoints
                .iter()
                .filter(|e| e.key() != keep && !self.is_busy(e.key()))
                .min_by_key(|e| e.updated_at)
                .map(|e| e.key().clone());

            let Some(victim) = victim else {
                break;
            };
            self.checkpoints.remove(&victim);
            debug!(thread_id = %victim, max_threads, "evicted idle thread checkpoint");
        }
    }

    /// Whether a run holds or awaits the lock of `thread_id`.
    fn is_busy(&self, thread_id: &str) -> bool {
        self.locks
            .get(thread_id)
            .is_some_and(|lock| Arc::strong_count(&*lock) > 1)
    }

    /// Drop the run lock of `thread_id` once nobody holds or awaits it.
    fn release(&self, thread_id: &str) {
        self.locks
            .remove_if(thread_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

// ---------------------------------------------------------------------------
// Lease
// ---------------------------------------------------------------------------

/// Exclusive use of one thread for the duration of a run.
///
/// Dropping the lease without [`ThreadLease::commit`] leaves the committed
/// state untouched.
#[derive(Debug)]
pub struct ThreadLease<'a> {
    store: &'a CheckpointStore,
    thread_id: String,
    state: ConversationState,
    guard: Option<OwnedMutexGuard<()>>,
}

impl ThreadLease<'_> {
    /// The committed state at the time the lease was taken.
    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    /// Store `state` as the thread's checkpoint and release the thread.
    pub fn commit(self, state: ConversationState) {
        debug!(thread_id = %self.thread_id, messages = state.len(), "committing checkpoint");
        self.store.write(&self.thread_id, state);
    }
}

impl Drop for ThreadLease<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.store.release(&self.thread_id);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
