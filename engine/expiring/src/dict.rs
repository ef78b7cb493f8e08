// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).
//! Thin delegating wrappers over [`ExpiringSet`]: a TTL dictionary or
//! hashset reduces to the expiring keyed set with no logic of its own.
//! Neither type below adds a field or an eviction rule; they only narrow
//! the API surface.

use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use timer::TimerFactory;

use crate::set::{CollectionChange, ExpiringSet};

/// An [`ExpiringSet`] presented as a TTL dictionary: `set`/`get`/`remove`
/// instead of `set_expiration`/`get`/`delete`.
pub struct ExpiringDict<K, V> {
    set: ExpiringSet<K, V>,
}

impl<K, V> Clone for ExpiringDict<K, V> {
    fn clone(&self) -> Self {
        ExpiringDict { set: self.set.clone() }
    }
}

impl<K, V> ExpiringDict<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(factory: Arc<TimerFactory>, auto_refresh: bool) -> Self {
        ExpiringDict { set: ExpiringSet::new(factory, auto_refresh) }
    }

    pub fn set(&self, key: K, value: V, ttl: Duration) -> Option<V> {
        self.set.set_expiration(key, value, Instant::now() + ttl, Some(ttl), true)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.set.get(key)
    }

    pub fn refresh(&self, key: &K) -> bool {
        self.set.refresh(key)
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.set.delete(key)
    }

    pub fn clear(&self) {
        self.set.clear()
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn collection_changed(&self) -> tokio::sync::broadcast::Receiver<CollectionChange<K>> {
        self.set.collection_changed()
    }
}

/// An [`ExpiringSet<K, ()>`] presented as a TTL hashset: membership only, no
/// associated value.
pub struct ExpiringKeySet<K> {
    set: ExpiringSet<K, ()>,
}

impl<K> Clone for ExpiringKeySet<K> {
    fn clone(&self) -> Self {
        ExpiringKeySet { set: self.set.clone() }
    }
}

impl<K> ExpiringKeySet<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    pub fn new(factory: Arc<TimerFactory>, auto_refresh: bool) -> Self {
        ExpiringKeySet { set: ExpiringSet::new(factory, auto_refresh) }
    }

    pub fn insert(&self, key: K, ttl: Duration) -> bool {
        self.set.set_expiration(key, (), Instant::now() + ttl, Some(ttl), true).is_none()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.set.contains(key)
    }

    pub fn refresh(&self, key: &K) -> bool {
        self.set.refresh(key)
    }

    pub fn remove(&self, key: &K) -> bool {
        self.set.delete(key).is_some()
    }

    pub fn clear(&self) {
        self.set.clear()
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}
