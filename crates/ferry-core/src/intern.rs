//! String intern table
//!
//! Maps string content to a single canonical entry so identical strings can
//! cross the bridge as a small id instead of a full copy.
//!
//! Entries are bucketed by hash and every probe compares full content against
//! each candidate in the bucket; two different strings with the same hash
//! never share an entry. Probe-or-insert runs under a single shard lock, which
//! keeps at most one resident entry per content on multi-threaded hosts.
//!
//! Entries live until [`StringInternTable::retire`] or
//! [`StringInternTable::clear`]; there is no automatic eviction.

use dashmap::DashMap;
use rustc_hash::FxBuildHasher;
use serde::Serialize;
use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};

/// Process-wide table
static GLOBAL_TABLE: LazyLock<Arc<StringInternTable>> =
    LazyLock::new(|| Arc::new(StringInternTable::new()));

/// Identifier of an interned entry, shared with the foreign side.
///
/// Ids are never reused within a table, so a stale id cannot alias a newer
/// entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InternId(u32);

impl InternId {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for InternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct InternEntry {
    id: InternId,
    content: Box<str>,
    hash: u64,
}

/// Handle to a resident intern-table entry.
///
/// Equality is entry identity.
#[derive(Clone)]
pub struct InternedString(Arc<InternEntry>);

impl InternedString {
    fn new(id: InternId, content: &str, hash: u64) -> Self {
        Self(Arc::new(InternEntry {
            id,
            content: content.into(),
            hash,
        }))
    }

    pub fn id(&self) -> InternId {
        self.0.id
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0.content
    }

    pub fn hash_value(&self) -> u64 {
        self.0.hash
    }

    /// Identity comparison
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl PartialEq for InternedString {
    fn eq(&self, other: &Self) -> bool {
        Self::ptr_eq(self, other)
    }
}

impl Eq for InternedString {}

impl Hash for InternedString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for InternedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InternedString({}, {:?})", self.0.id, self.0.content)
    }
}

impl fmt::Display for InternedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.content)
    }
}

impl AsRef<str> for InternedString {
    fn as_ref(&self) -> &str {
        &self.0.content
    }
}

#[derive(Debug, Default)]
struct InternCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Point-in-time view of intern table activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InternStats {
    /// Probes that found an existing entry
    pub hits: u64,
    /// Probes that found nothing (and inserts of new entries)
    pub misses: u64,
    /// Entries currently resident
    pub resident: usize,
}

pub struct StringInternTable<S = FxBuildHasher> {
    buckets: DashMap<u64, Vec<InternedString>>,
    by_id: DashMap<InternId, InternedString>,
    next_id: AtomicU32,
    hasher: S,
    counters: InternCounters,
}

impl StringInternTable {
    pub fn new() -> Self {
        Self::with_hasher(FxBuildHasher)
    }

    /// The lazily created process-wide table.
    ///
    /// Call [`clear`](Self::clear) on it for teardown.
    pub fn global() -> Arc<StringInternTable> {
        GLOBAL_TABLE.clone()
    }
}

impl Default for StringInternTable {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: BuildHasher> StringInternTable<S> {
    pub fn with_hasher(hasher: S) -> Self {
        Self {
            buckets: DashMap::new(),
            by_id: DashMap::new(),
            next_id: AtomicU32::new(1),
            hasher,
            counters: InternCounters::default(),
        }
    }

    fn hash(&self, content: &str) -> u64 {
        self.hasher.hash_one(content)
    }

    /// Return the entry for `content`, creating it if absent.
    pub fn intern(&self, content: &str) -> InternedString {
        let hash = self.hash(content);
        let mut bucket = self.buckets.entry(hash).or_default();

        if let Some(existing) = bucket.iter().find(|entry| entry.as_str() == content) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return existing.clone();
        }

        let id = InternId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let entry = InternedString::new(id, content, hash);
        bucket.push(entry.clone());
        self.by_id.insert(id, entry.clone());
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        entry
    }

    /// Non-creating probe
    pub fn lookup(&self, content: &str) -> Option<InternedString> {
        let hash = self.hash(content);
        let found = self
            .buckets
            .get(&hash)
            .and_then(|bucket| bucket.iter().find(|e| e.as_str() == content).cloned());

        let counter = if found.is_some() {
            &self.counters.hits
        } else {
            &self.counters.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Resolve an entry by id
    pub fn get(&self, id: InternId) -> Option<InternedString> {
        self.by_id.get(&id).map(|entry| entry.clone())
    }

    /// Whether `entry` is still the resident entry for its content
    pub fn is_resident(&self, entry: &InternedString) -> bool {
        self.by_id
            .get(&entry.id())
            .is_some_and(|resident| InternedString::ptr_eq(&resident, entry))
    }

    /// Remove the entry for `content`. Outstanding handles keep their content
    /// but are no longer resident.
    pub fn retire(&self, content: &str) -> bool {
        let hash = self.hash(content);
        let removed = {
            let Some(mut bucket) = self.buckets.get_mut(&hash) else {
                return false;
            };
            let position = bucket.iter().position(|e| e.as_str() == content);
            position.map(|index| bucket.swap_remove(index))
        };
        self.buckets.remove_if(&hash, |_, bucket| bucket.is_empty());

        match removed {
            Some(entry) => {
                self.by_id.remove(&entry.id());
                true
            }
            None => false,
        }
    }

    /// Drop every entry. Ids keep increasing afterwards.
    pub fn clear(&self) {
        self.buckets.clear();
        self.by_id.clear();
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn stats(&self) -> InternStats {
        InternStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            resident: self.len(),
        }
    }
}
