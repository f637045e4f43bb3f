//! Snapshot, apply, then commit or restore.
//!
//! ```text
//! Idle -> OptimisticallyApplied -> Confirmed   (remote ok: invalidate, refetch later)
//!                               -> RolledBack  (remote failed or future dropped)
//! ```

use std::{fmt, future::Future, hash::Hash};

use crate::cache::{EntrySnapshot, QueryCache};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MutationState {
    #[default]
    Idle,
    OptimisticallyApplied,
    Confirmed,
    RolledBack,
}

/// A cache write made ahead of remote confirmation.
///
/// Dropping the guard while it is still `OptimisticallyApplied` restores the
/// snapshot, so an abandoned mutation never leaves its optimistic value
/// behind.
pub struct OptimisticUpdate<'a, K, V>
where
    K: Eq + Hash + Clone + fmt::Display,
    V: Clone,
{
    cache: &'a QueryCache<K, V>,
    key: K,
    snapshot: Option<EntrySnapshot<V>>,
    state: MutationState,
}

impl<'a, K, V> OptimisticUpdate<'a, K, V>
where
    K: Eq + Hash + Clone + fmt::Display,
    V: Clone,
{
    /// Cancels in-flight reads of `key`, snapshots it, then applies `apply`
    /// to the cached value (if any).
    pub fn begin<F>(cache: &'a QueryCache<K, V>, key: &K, apply: F) -> Self
    where
        F: FnOnce(&V) -> V,
    {
        cache.cancel(key);
        let snapshot = cache.snapshot(key);
        let applied = cache.update(key, apply);
        tracing::debug!(key = %key, applied, "optimistic write");
        Self {
            cache,
            key: key.clone(),
            snapshot: Some(snapshot),
            state: MutationState::OptimisticallyApplied,
        }
    }

    pub fn state(&self) -> MutationState {
        self.state
    }

    /// The pre-write state that a rollback would restore.
    pub fn snapshot(&self) -> Option<&EntrySnapshot<V>> {
        self.snapshot.as_ref()
    }

    /// Remote write confirmed: drop the snapshot and invalidate the key so
    /// the next read reconciles with the store.
    pub fn commit(mut self) -> MutationState {
        self.snapshot = None;
        self.cache.invalidate(&self.key);
        self.state = MutationState::Confirmed;
        self.state
    }

    pub fn rollback(mut self) -> MutationState {
        self.restore();
        self.state
    }

    fn restore(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.cache.restore(&self.key, snapshot);
            tracing::warn!(key = %self.key, "optimistic write rolled back");
        }
        self.state = MutationState::RolledBack;
    }
}

impl<K, V> Drop for OptimisticUpdate<'_, K, V>
where
    K: Eq + Hash + Clone + fmt::Display,
    V: Clone,
{
    fn drop(&mut self) {
        if self.state == MutationState::OptimisticallyApplied {
            self.restore();
        }
    }
}

/// Applies `apply` optimistically, awaits `remote`, then commits on `Ok` or
/// restores the snapshot on `Err`.
pub async fn optimistic<K, V, F, Fut, T, E>(
    cache: &QueryCache<K, V>,
    key: &K,
    apply: F,
    remote: Fut,
) -> Result<T, E>
where
    K: Eq + Hash + Clone + fmt::Display,
    V: Clone,
    F: FnOnce(&V) -> V,
    Fut: Future<Output = Result<T, E>>,
{
    let update = OptimisticUpdate::begin(cache, key, apply);
    match remote.await {
        Ok(value) => {
            update.commit();
            Ok(value)
        }
        Err(err) => {
            update.rollback();
            Err(err)
        }
    }
}
