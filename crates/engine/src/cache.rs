//! Keyed query cache.
//!
//! Each key holds the last fetched value plus the bookkeeping needed for
//! stale-while-revalidate reads: when it was stored, whether a mutation
//! invalidated it, how many fetches are in flight, and a generation counter.
//! Every fetch remembers the generation it started under and is only allowed
//! to store its result if nothing bumped the generation meanwhile (see
//! [`QueryCache::cancel`] and [`QueryCache::invalidate`]).
//!
//! The inner lock is never held across an `.await`.

use std::{
    collections::HashMap,
    fmt,
    hash::Hash,
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use api_types::auth::UserId;

/// Identity of a cached query.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum QueryKey {
    /// All expenses of one user, date descending.
    Expenses { user: UserId },
}

impl QueryKey {
    pub fn expenses(user: &UserId) -> Self {
        Self::Expenses { user: user.clone() }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expenses { user } => write!(f, "expenses:{user}"),
        }
    }
}

#[derive(Debug)]
struct Entry<V> {
    data: Option<V>,
    updated_at: Option<Instant>,
    invalidated: bool,
    generation: u64,
    fetching: usize,
}

impl<V> Default for Entry<V> {
    fn default() -> Self {
        Self {
            data: None,
            updated_at: None,
            invalidated: false,
            generation: 0,
            fetching: 0,
        }
    }
}

/// Observable state of one key, as captured before an optimistic write.
///
/// Fetch bookkeeping is not part of it: restoring a snapshot puts the
/// data back exactly as it was without pretending fetches did not happen.
/// Equality compares the observable state only, not the generation.
#[derive(Clone, Debug)]
pub struct EntrySnapshot<V> {
    data: Option<V>,
    updated_at: Option<Instant>,
    invalidated: bool,
    generation: u64,
}

impl<V: PartialEq> PartialEq for EntrySnapshot<V> {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
            && self.updated_at == other.updated_at
            && self.invalidated == other.invalidated
    }
}

impl<V: Eq> Eq for EntrySnapshot<V> {}

impl<V> EntrySnapshot<V> {
    pub fn data(&self) -> Option<&V> {
        self.data.as_ref()
    }

    pub fn is_invalidated(&self) -> bool {
        self.invalidated
    }
}

/// Outcome of a finished fetch.
#[derive(Debug, PartialEq, Eq)]
pub enum Resolved<V> {
    /// The fetch was still current and its result is now cached.
    Stored(V),
    /// Someone cancelled or invalidated the key while the fetch was in
    /// flight; the result was dropped.
    Superseded { fetched: V, current: Option<V> },
}

impl<V> Resolved<V> {
    /// What the caller should show: the cached value wins over a superseded
    /// fetch result.
    pub fn into_visible(self) -> V {
        match self {
            Self::Stored(data) => data,
            Self::Superseded { fetched, current } => current.unwrap_or(fetched),
        }
    }
}

#[derive(Debug)]
pub struct QueryCache<K, V> {
    entries: Mutex<HashMap<K, Entry<V>>>,
}

impl<K, V> Default for QueryCache<K, V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> QueryCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Display,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Entry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.lock().get(key).and_then(|entry| entry.data.clone())
    }

    /// Stores `data` as fresh.
    pub fn set(&self, key: &K, data: V) {
        let mut entries = self.lock();
        let entry = entries.entry(key.clone()).or_default();
        entry.data = Some(data);
        entry.updated_at = Some(Instant::now());
        entry.invalidated = false;
    }

    /// Replaces the cached value with `f(current)`.
    ///
    /// Returns `false` (and changes nothing) when the key holds no data.
    pub fn update<F>(&self, key: &K, f: F) -> bool
    where
        F: FnOnce(&V) -> V,
    {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(key) else {
            return false;
        };
        let Some(current) = entry.data.as_ref() else {
            return false;
        };
        entry.data = Some(f(current));
        entry.updated_at = Some(Instant::now());
        entry.invalidated = false;
        true
    }

    /// `true` when the key holds data that was not invalidated and is younger
    /// than `stale_time`.
    pub fn is_fresh(&self, key: &K, stale_time: Duration) -> bool {
        self.lock().get(key).is_some_and(|entry| {
            entry.data.is_some()
                && !entry.invalidated
                && entry
                    .updated_at
                    .is_some_and(|at| at.elapsed() < stale_time)
        })
    }

    /// Marks the key stale so the next read refetches. In-flight fetches
    /// started before this call will not store their result.
    pub fn invalidate(&self, key: &K) {
        let mut entries = self.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.invalidated = true;
            entry.generation += 1;
            tracing::debug!(key = %key, generation = entry.generation, "cache invalidated");
        }
    }

    /// Discards the result of every fetch currently in flight for `key`.
    pub fn cancel(&self, key: &K) {
        let mut entries = self.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.generation += 1;
            if entry.fetching > 0 {
                tracing::debug!(
                    key = %key,
                    in_flight = entry.fetching,
                    "cancelled in-flight fetch"
                );
            }
        }
    }

    pub fn snapshot(&self, key: &K) -> EntrySnapshot<V> {
        match self.lock().get(key) {
            Some(entry) => EntrySnapshot {
                data: entry.data.clone(),
                updated_at: entry.updated_at,
                invalidated: entry.invalidated,
                generation: entry.generation,
            },
            None => EntrySnapshot {
                data: None,
                updated_at: None,
                invalidated: false,
                generation: 0,
            },
        }
    }

    /// Puts a snapshot back.
    ///
    /// If the key was cancelled or invalidated after the snapshot was taken,
    /// the data is restored but the entry stays invalidated: whoever bumped
    /// the generation expects the next read to refetch.
    pub fn restore(&self, key: &K, snapshot: EntrySnapshot<V>) {
        let mut entries = self.lock();
        let entry = entries.entry(key.clone()).or_default();
        let superseded = entry.generation != snapshot.generation;
        entry.data = snapshot.data;
        entry.updated_at = snapshot.updated_at;
        entry.invalidated = snapshot.invalidated || superseded;
        if superseded {
            tracing::debug!(key = %key, "restored over a newer invalidation");
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Registers a fetch for `key`. The returned guard must be resolved with
    /// the fetched value; dropping it unresolved just ends the fetch.
    pub fn begin_fetch(&self, key: &K) -> FetchGuard<'_, K, V> {
        let mut entries = self.lock();
        let entry = entries.entry(key.clone()).or_default();
        entry.fetching += 1;
        FetchGuard {
            cache: self,
            key: key.clone(),
            generation: entry.generation,
        }
    }

    pub fn is_fetching(&self, key: &K) -> bool {
        self.lock().get(key).is_some_and(|entry| entry.fetching > 0)
    }

    /// First load: a fetch is running and there is nothing to show yet.
    pub fn is_loading(&self, key: &K) -> bool {
        self.lock()
            .get(key)
            .is_some_and(|entry| entry.fetching > 0 && entry.data.is_none())
    }
}

/// An in-flight fetch registered with [`QueryCache::begin_fetch`].
pub struct FetchGuard<'a, K, V>
where
    K: Eq + Hash + Clone + fmt::Display,
    V: Clone,
{
    cache: &'a QueryCache<K, V>,
    key: K,
    generation: u64,
}

impl<K, V> FetchGuard<'_, K, V>
where
    K: Eq + Hash + Clone + fmt::Display,
    V: Clone,
{
    /// `false` once the key was cancelled or invalidated after this fetch
    /// started.
    pub fn is_current(&self) -> bool {
        self.cache
            .lock()
            .get(&self.key)
            .is_some_and(|entry| entry.generation == self.generation)
    }

    pub fn resolve(self, data: V) -> Resolved<V> {
        let mut entries = self.cache.lock();
        let entry = entries.entry(self.key.clone()).or_default();
        if entry.generation != self.generation {
            tracing::debug!(key = %self.key, "dropping superseded fetch result");
            let current = entry.data.clone();
            drop(entries);
            return Resolved::Superseded {
                fetched: data,
                current,
            };
        }
        entry.data = Some(data.clone());
        entry.updated_at = Some(Instant::now());
        entry.invalidated = false;
        drop(entries);
        Resolved::Stored(data)
    }
}

impl<K, V> Drop for FetchGuard<'_, K, V>
where
    K: Eq + Hash + Clone + fmt::Display,
    V: Clone,
{
    fn drop(&mut self) {
        if let Some(entry) = self.cache.lock().get_mut(&self.key) {
            entry.fetching = entry.fetching.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> QueryKey {
        QueryKey::expenses(&UserId::from("alice"))
    }

    #[test]
    fn keys_are_scoped_by_user() {
        let cache: QueryCache<QueryKey, Vec<u32>> = QueryCache::new();
        cache.set(&key(), vec![1]);
        assert_eq!(cache.get(&QueryKey::expenses(&UserId::from("bob"))), None);
        assert_eq!(cache.get(&key()), Some(vec![1]));
        assert_eq!(key().to_string(), "expenses:alice");
    }

    #[test]
    fn fresh_until_invalidated() {
        let cache: QueryCache<QueryKey, Vec<u32>> = QueryCache::new();
        assert!(!cache.is_fresh(&key(), Duration::from_secs(60)));

        cache.set(&key(), vec![1, 2]);
        assert!(cache.is_fresh(&key(), Duration::from_secs(60)));
        assert!(!cache.is_fresh(&key(), Duration::ZERO));

        cache.invalidate(&key());
        assert!(!cache.is_fresh(&key(), Duration::from_secs(60)));
        // Stale data is still shown.
        assert_eq!(cache.get(&key()), Some(vec![1, 2]));
    }

    #[test]
    fn fetch_result_is_stored_when_current() {
        let cache: QueryCache<QueryKey, Vec<u32>> = QueryCache::new();
        let guard = cache.begin_fetch(&key());
        assert!(cache.is_loading(&key()));
        assert!(guard.is_current());

        assert_eq!(guard.resolve(vec![7]), Resolved::Stored(vec![7]));
        assert!(!cache.is_fetching(&key()));
        assert_eq!(cache.get(&key()), Some(vec![7]));
    }

    #[test]
    fn cancelled_fetch_does_not_clobber() {
        let cache: QueryCache<QueryKey, Vec<u32>> = QueryCache::new();
        cache.set(&key(), vec![1]);

        let guard = cache.begin_fetch(&key());
        cache.cancel(&key());
        cache.update(&key(), |_| vec![2]);
        assert!(!guard.is_current());

        let resolved = guard.resolve(vec![1]);
        assert_eq!(
            resolved,
            Resolved::Superseded {
                fetched: vec![1],
                current: Some(vec![2]),
            }
        );
        assert_eq!(resolved.into_visible(), vec![2]);
        assert_eq!(cache.get(&key()), Some(vec![2]));
        assert!(!cache.is_fetching(&key()));
    }

    #[test]
    fn invalidation_supersedes_running_fetch() {
        let cache: QueryCache<QueryKey, Vec<u32>> = QueryCache::new();
        let guard = cache.begin_fetch(&key());
        cache.invalidate(&key());
        assert!(matches!(guard.resolve(vec![3]), Resolved::Superseded { current: None, .. }));
        assert_eq!(cache.get(&key()), None);
    }

    #[test]
    fn dropped_guard_ends_the_fetch() {
        let cache: QueryCache<QueryKey, Vec<u32>> = QueryCache::new();
        {
            let _first = cache.begin_fetch(&key());
            let _second = cache.begin_fetch(&key());
            assert!(cache.is_fetching(&key()));
        }
        assert!(!cache.is_fetching(&key()));
        assert!(!cache.is_loading(&key()));
    }

    #[test]
    fn restore_is_exact() {
        let cache: QueryCache<QueryKey, Vec<u32>> = QueryCache::new();
        cache.set(&key(), vec![10]);
        cache.invalidate(&key());
        let before = cache.snapshot(&key());

        assert!(cache.update(&key(), |old| old.iter().map(|v| v * 2).collect()));
        assert_eq!(cache.get(&key()), Some(vec![20]));
        assert_ne!(cache.snapshot(&key()), before);

        cache.restore(&key(), before.clone());
        assert_eq!(cache.snapshot(&key()), before);
        assert!(before.is_invalidated());
    }

    #[test]
    fn restore_keeps_a_later_invalidation() {
        let cache: QueryCache<QueryKey, Vec<u32>> = QueryCache::new();
        cache.set(&key(), vec![10]);
        let before = cache.snapshot(&key());

        cache.update(&key(), |_| vec![20]);
        cache.invalidate(&key());
        cache.restore(&key(), before);

        assert_eq!(cache.get(&key()), Some(vec![10]));
        assert!(!cache.is_fresh(&key(), Duration::from_secs(60)));
    }

    #[test]
    fn update_without_data_is_a_no_op() {
        let cache: QueryCache<QueryKey, Vec<u32>> = QueryCache::new();
        assert!(!cache.update(&key(), |_| vec![1]));
        assert_eq!(cache.get(&key()), None);
    }
}
