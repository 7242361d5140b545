//! Keyed query cache shared by the page list and the detail view.
//!
//! Each key moves through `absent -> in flight -> (cached | errored)`. A key
//! that is in flight is never requested twice; a result only ever touches its
//! own slot. With `keep_previous` enabled, a key with no data of its own
//! borrows the last displayed key's data as a placeholder until it resolves.

use lru::LruCache;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::num::NonZeroUsize;
use tracing::debug;

use crate::catalog::FetchError;

/// Outcome of asking the cache for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Data is cached; nothing to fetch.
    Cached,
    /// A fetch for this key is already outstanding.
    AlreadyInFlight,
    /// The caller must issue exactly one fetch for this key.
    Started,
}

impl Request {
    pub fn needs_fetch(self) -> bool {
        self == Request::Started
    }
}

/// Read view of one key.
#[derive(Debug, PartialEq)]
pub struct Snapshot<'a, V> {
    pub data: Option<&'a V>,
    /// `data` belongs to a previously displayed key.
    pub is_placeholder: bool,
    pub is_loading: bool,
    pub error: Option<&'a FetchError>,
}

pub struct QueryCache<K: Hash + Eq, V> {
    entries: LruCache<K, V>,
    errors: HashMap<K, FetchError>,
    in_flight: HashSet<K>,
    keep_previous: bool,
    last_displayed: Option<K>,
}

impl<K: Hash + Eq + Clone + std::fmt::Debug, V> QueryCache<K, V> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
            errors: HashMap::new(),
            in_flight: HashSet::new(),
            keep_previous: false,
            last_displayed: None,
        }
    }

    /// Serve the last displayed key's data while a new key loads.
    pub fn keep_previous_data(mut self) -> Self {
        self.keep_previous = true;
        self
    }

    pub fn request(&mut self, key: &K) -> Request {
        if self.in_flight.contains(key) {
            debug!(?key, "request de-duplicated");
            return Request::AlreadyInFlight;
        }
        if self.entries.get(key).is_some() {
            debug!(?key, "cache hit");
            return Request::Cached;
        }
        self.in_flight.insert(key.clone());
        Request::Started
    }

    /// Forces a fetch for `key` even if it is cached. Still de-duplicated.
    pub fn refetch(&mut self, key: &K) -> Request {
        if !self.in_flight.insert(key.clone()) {
            debug!(?key, "refetch de-duplicated");
            return Request::AlreadyInFlight;
        }
        Request::Started
    }

    /// Applies a fetch result to its own slot.
    ///
    /// Success replaces the entry and clears any error for the key. Failure
    /// records the error and leaves existing data for the key in place.
    pub fn resolve(&mut self, key: K, result: Result<V, FetchError>) {
        self.in_flight.remove(&key);
        match result {
            Ok(value) => {
                self.errors.remove(&key);
                self.entries.put(key, value);
            }
            Err(error) => {
                self.errors.insert(key, error);
            }
        }
    }

    /// Records that `key` is what the caller is showing. Only keys with data
    /// of their own can become the placeholder source.
    pub fn mark_displayed(&mut self, key: &K) {
        if self.keep_previous && self.entries.contains(key) {
            self.last_displayed = Some(key.clone());
        }
    }

    pub fn snapshot(&self, key: &K) -> Snapshot<'_, V> {
        let own = self.entries.peek(key);
        let (data, is_placeholder) = match own {
            Some(v) => (Some(v), false),
            None if self.keep_previous => {
                let prev = self.last_displayed.as_ref().and_then(|k| self.entries.peek(k));
                (prev, prev.is_some())
            }
            None => (None, false),
        };
        Snapshot {
            data,
            is_placeholder,
            is_loading: self.in_flight.contains(key),
            error: self.errors.get(key),
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.peek(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
