// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use timer::{TimerFactory, TimerHandle};
use tokio::sync::broadcast;

/// Refreshes arriving within this window of the last one are coalesced into
/// a no-op, per the `auto_refresh` constant.
pub const AUTO_REFRESH_COALESCE: Duration = Duration::from_millis(500);

const EVENT_CAPACITY: usize = 256;

/// An event broadcast on every mutation of an [`ExpiringSet`] on its
/// "collection_changed" channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionChange<K> {
    Inserted(K),
    Updated(K),
    Removed(K),
    Cleared,
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
    ttl: Option<Duration>,
    last_refresh: Option<Instant>,
}

struct Inner<K, V> {
    factory: Arc<TimerFactory>,
    auto_refresh: bool,
    entries: Mutex<HashMap<K, Entry<V>>>,
    /// Lazily sorted by expiration; only re-sorted when an eviction pass or
    /// rearm needs the true head.
    aux: Mutex<Vec<(Instant, K)>>,
    timer: Mutex<Option<Arc<TimerHandle>>>,
    changed_tx: broadcast::Sender<CollectionChange<K>>,
    expired_tx: broadcast::Sender<Vec<(K, V)>>,
}

/// A map keyed set where every entry carries an expiration, evicted by one
/// timer armed at the earliest live entry's fire time.
pub struct ExpiringSet<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for ExpiringSet<K, V> {
    fn clone(&self) -> Self {
        ExpiringSet { inner: self.inner.clone() }
    }
}

impl<K, V> ExpiringSet<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates an empty set, arming timers on `factory`. `auto_refresh`
    /// enables the 500ms coalescing window on [`refresh`](Self::refresh).
    pub fn new(factory: Arc<TimerFactory>, auto_refresh: bool) -> Self {
        let (changed_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (expired_tx, _) = broadcast::channel(EVENT_CAPACITY);
        ExpiringSet {
            inner: Arc::new(Inner {
                factory,
                auto_refresh,
                entries: Mutex::new(HashMap::new()),
                aux: Mutex::new(Vec::new()),
                timer: Mutex::new(None),
                changed_tx,
                expired_tx,
            }),
        }
    }

    /// A receiver of every mutation: inserts, updates, removals, and
    /// `clear()`.
    pub fn collection_changed(&self) -> broadcast::Receiver<CollectionChange<K>> {
        self.inner.changed_tx.subscribe()
    }

    /// A receiver of every eviction pass's batch of expired entries.
    pub fn entries_expired(&self) -> broadcast::Receiver<Vec<(K, V)>> {
        self.inner.expired_tx.subscribe()
    }

    /// Sets `key` to expire at `when`, remembering `ttl` for later
    /// [`refresh`](Self::refresh) calls. If `key` is already present, its
    /// value and expiration are overwritten and the prior value is
    /// returned; if absent and `create_if_missing` is `false`, nothing
    /// happens and `None` is returned.
    pub fn set_expiration(
        &self,
        key: K,
        value: V,
        when: Instant,
        ttl: Option<Duration>,
        create_if_missing: bool,
    ) -> Option<V> {
        let mut entries = self.inner.entries.lock();
        let existed = entries.contains_key(&key);
        if !existed && !create_if_missing {
            return None;
        }
        let prior = entries.insert(
            key.clone(),
            Entry { value, expires_at: when, ttl, last_refresh: None },
        );
        drop(entries);

        self.inner.aux.lock().push((when, key.clone()));
        self.rearm(Instant::now());

        let event = if existed {
            CollectionChange::Updated(key)
        } else {
            CollectionChange::Inserted(key)
        };
        let _ = self.inner.changed_tx.send(event);
        prior.map(|e| e.value)
    }

    /// Extends `key`'s expiration by its stored TTL. Returns `false` if
    /// `key` is absent. Calls arriving within [`AUTO_REFRESH_COALESCE`] of
    /// the previous effective refresh are coalesced into a no-op when
    /// `auto_refresh` is enabled — left undefined if the driving ticker is
    /// starved longer than the TTL.
    pub fn refresh(&self, key: &K) -> bool {
        let now = Instant::now();
        let new_expiry = {
            let mut entries = self.inner.entries.lock();
            let Some(entry) = entries.get_mut(key) else {
                return false;
            };
            if self.inner.auto_refresh {
                if let Some(last) = entry.last_refresh {
                    if now.saturating_duration_since(last) < AUTO_REFRESH_COALESCE {
                        return true;
                    }
                }
            }
            let Some(ttl) = entry.ttl else {
                return true;
            };
            entry.expires_at = now + ttl;
            entry.last_refresh = Some(now);
            entry.expires_at
        };
        self.inner.aux.lock().push((new_expiry, key.clone()));
        self.rearm(now);
        let _ = self.inner.changed_tx.send(CollectionChange::Updated(key.clone()));
        true
    }

    /// Removes `key` unconditionally, returning its value if present.
    pub fn delete(&self, key: &K) -> Option<V> {
        let removed = self.inner.entries.lock().remove(key);
        if removed.is_some() {
            let _ = self.inner.changed_tx.send(CollectionChange::Removed(key.clone()));
        }
        removed.map(|e| e.value)
    }

    /// Removes every entry and rearms to infinity (cancels the pending
    /// eviction timer, per §4.7's "clear (rearm to infinity)").
    pub fn clear(&self) {
        self.inner.entries.lock().clear();
        self.inner.aux.lock().clear();
        if let Some(timer) = self.inner.timer.lock().take() {
            timer.cancel();
        }
        let _ = self.inner.changed_tx.send(CollectionChange::Cleared);
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.entries.lock().get(key).map(|e| e.value.clone())
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.entries.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorts the auxiliary list, drops entries no longer live, and arms the
    /// factory timer at the earliest survivor's fire time — or cancels any
    /// existing timer if nothing remains.
    fn rearm(&self, now: Instant) {
        let head = {
            let mut aux = self.inner.aux.lock();
            aux.sort_by_key(|(at, _)| *at);
            let entries = self.inner.entries.lock();
            aux.retain(|(at, key)| match entries.get(key) {
                Some(e) => e.expires_at == *at,
                None => false,
            });
            aux.first().map(|(at, _)| *at)
        };

        if let Some(previous) = self.inner.timer.lock().take() {
            previous.cancel();
        }
        let Some(fire_at) = head else { return };

        let weak: Weak<Inner<K, V>> = Arc::downgrade(&self.inner);
        let handle = self.inner.factory.arm_at(fire_at.max(now), move || {
            if let Some(inner) = weak.upgrade() {
                ExpiringSet { inner }.evict_due(Instant::now());
            }
        });
        *self.inner.timer.lock() = Some(handle);
    }

    fn evict_due(&self, now: Instant) {
        let mut expired = Vec::new();
        {
            let mut aux = self.inner.aux.lock();
            aux.sort_by_key(|(at, _)| *at);
            let mut entries = self.inner.entries.lock();
            while let Some((at, _)) = aux.first() {
                if *at > now {
                    break;
                }
                let (_, key) = aux.remove(0);
                if let Some(entry) = entries.get(&key) {
                    if entry.expires_at <= now {
                        let entry = entries.remove(&key).unwrap();
                        expired.push((key, entry.value));
                    }
                    // else: a stale aux entry left behind by a refresh; the
                    // live entry survives under a later expiration.
                }
            }
        }
        if !expired.is_empty() {
            let _ = self.inner.expired_tx.send(expired.clone());
            for (key, _) in &expired {
                let _ = self.inner.changed_tx.send(CollectionChange::Removed(key.clone()));
            }
        }
        self.rearm(now);
    }
}
