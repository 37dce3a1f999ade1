//! In-flight request deduplication.
//!
//! [`Deduplicator`] guarantees at most one concurrent real invocation per
//! [`RequestKey`]. The first caller for a key starts the call; every caller
//! arriving while it is pending attaches to the same shared future and
//! receives an identical result or error.
//!
//! # Lifecycle
//!
//! An entry exists only between start and settlement. The shared future
//! removes its own entry as soon as the call settles, success or failure,
//! so the next caller after settlement starts a fresh call (or hits the
//! response cache, see [`Gatekeeper`](crate::Gatekeeper)).
//!
//! # Cancellation
//!
//! Dropping a [`Pending`] detaches that waiter only. The underlying call
//! keeps running as long as any other waiter is attached; it is driven by
//! whichever waiters are still polling. When the last waiter detaches
//! before settlement, the entry is removed and the call is dropped, which
//! also releases any admission slot it was queued for. The next caller for
//! that key starts a fresh call.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};

use tracing::debug;

use crate::Result;
use crate::types::RequestKey;

type SharedCall<V> = Shared<BoxFuture<'static, Result<V>>>;

struct InFlightEntry<V> {
    id: u64,
    call: SharedCall<V>,
    waiters: Arc<AtomicUsize>,
}

type EntryMap<V> = Arc<Mutex<HashMap<RequestKey, InFlightEntry<V>>>>;

/// Tracks concurrently requested identical keys.
pub struct Deduplicator<V> {
    entries: EntryMap<V>,
    next_id: AtomicU64,
}

impl<V> Deduplicator<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty deduplicator.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Attach to the in-flight call for `key`, or start one with `factory`.
    ///
    /// `factory` is invoked at most once, and only if no call for `key`
    /// is pending.
    pub fn join_or_start<F, Fut>(&self, key: &RequestKey, factory: F) -> Pending<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        self.join_or_start_with(key, || None, factory, |_| {})
    }

    /// Like [`join_or_start()`](Self::join_or_start), with two hooks that
    /// run under the in-flight lock:
    ///
    /// - `lookup` runs before starting a new call; a `Some` value is returned
    ///   immediately as [`Pending::is_ready()`]. The facade uses it to
    ///   re-check the response cache so a key is never both cached and
    ///   in flight.
    /// - `settle` runs when the call completes, right after the entry is
    ///   removed and before the lock is released. It is skipped if the entry
    ///   was cleared in the meantime.
    pub(crate) fn join_or_start_with<P, F, Fut, S>(
        &self,
        key: &RequestKey,
        lookup: P,
        factory: F,
        settle: S,
    ) -> Pending<V>
    where
        P: FnOnce() -> Option<V>,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
        S: FnOnce(&Result<V>) + Send + 'static,
    {
        let mut entries = lock(&self.entries);

        if let Some(entry) = entries.get(key) {
            let guard = WaiterGuard::attach(&self.entries, key, entry.id, &entry.waiters);
            return Pending::attached(entry.call.clone(), guard, false);
        }

        if let Some(value) = lookup() {
            return Pending {
                state: PendingState::Ready(value),
            };
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let map = Arc::clone(&self.entries);
        let owned_key = key.clone();
        let call = async move {
            let result = factory().await;
            let mut entries = lock(&map);
            if entries.get(&owned_key).is_some_and(|e| e.id == id) {
                entries.remove(&owned_key);
                settle(&result);
            }
            result
        }
        .boxed()
        .shared();

        let waiters = Arc::new(AtomicUsize::new(0));
        let guard = WaiterGuard::attach(&self.entries, key, id, &waiters);
        let pending = Pending::attached(call.clone(), guard, true);
        entries.insert(key.clone(), InFlightEntry { id, call, waiters });
        pending
    }

    /// Whether a call for `key` is pending.
    pub fn contains(&self, key: &RequestKey) -> bool {
        lock(&self.entries).contains_key(key)
    }

    /// Number of callers attached to the pending call for `key`.
    pub fn waiters(&self, key: &RequestKey) -> usize {
        lock(&self.entries)
            .get(key)
            .map(|e| e.waiters.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Pending keys with their waiter counts.
    pub fn snapshot(&self) -> Vec<(RequestKey, usize)> {
        lock(&self.entries)
            .iter()
            .map(|(k, e)| (k.clone(), e.waiters.load(Ordering::Relaxed)))
            .collect()
    }

    /// Number of pending calls.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Whether nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every pending call.
    ///
    /// Callers already attached still receive their result; new callers
    /// start fresh calls.
    pub fn clear(&self) {
        lock(&self.entries).clear();
    }
}

impl<V> Default for Deduplicator<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

fn lock<V>(
    entries: &Mutex<HashMap<RequestKey, InFlightEntry<V>>>,
) -> MutexGuard<'_, HashMap<RequestKey, InFlightEntry<V>>> {
    entries.lock().unwrap_or_else(|e| e.into_inner())
}

/// One attached waiter. Counted under the map lock; the last one to
/// detach from an unsettled call removes its entry.
struct WaiterGuard<V> {
    entries: EntryMap<V>,
    key: RequestKey,
    id: u64,
    waiters: Arc<AtomicUsize>,
}

impl<V> WaiterGuard<V> {
    /// Caller must hold the `entries` lock.
    fn attach(entries: &EntryMap<V>, key: &RequestKey, id: u64, waiters: &Arc<AtomicUsize>) -> Self {
        waiters.fetch_add(1, Ordering::Relaxed);
        Self {
            entries: Arc::clone(entries),
            key: key.clone(),
            id,
            waiters: Arc::clone(waiters),
        }
    }
}

impl<V> Drop for WaiterGuard<V> {
    fn drop(&mut self) {
        let mut entries = lock(&self.entries);
        let last = self.waiters.fetch_sub(1, Ordering::Relaxed) == 1;
        if !last || !entries.get(&self.key).is_some_and(|e| e.id == self.id) {
            return;
        }
        let abandoned = entries.remove(&self.key);
        drop(entries);
        debug!(key = %self.key, "in-flight call abandoned by all waiters");
        // Dropped outside the lock: tearing down the call may take other locks.
        drop(abandoned);
    }
}

enum PendingState<V> {
    Ready(V),
    Attached {
        call: SharedCall<V>,
        leader: bool,
        guard: WaiterGuard<V>,
    },
}

/// A caller's handle on a (possibly shared) call.
pub struct Pending<V> {
    state: PendingState<V>,
}

impl<V: Clone> Pending<V> {
    fn attached(call: SharedCall<V>, guard: WaiterGuard<V>, leader: bool) -> Self {
        Self {
            state: PendingState::Attached {
                call,
                leader,
                guard,
            },
        }
    }

    /// This caller started the call.
    pub fn is_leader(&self) -> bool {
        matches!(self.state, PendingState::Attached { leader: true, .. })
    }

    /// This caller attached to another caller's call.
    pub fn is_joined(&self) -> bool {
        matches!(self.state, PendingState::Attached { leader: false, .. })
    }

    /// The lookup produced a value; no call was started or joined.
    pub fn is_ready(&self) -> bool {
        matches!(self.state, PendingState::Ready(_))
    }

    /// Wait for the result.
    pub async fn wait(self) -> Result<V> {
        match self.state {
            PendingState::Ready(value) => Ok(value),
            PendingState::Attached { call, guard, .. } => {
                let result = call.await;
                drop(guard);
                result
            }
        }
    }
}
