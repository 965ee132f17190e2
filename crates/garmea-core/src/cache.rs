use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::document::Segment;
use crate::person::PersonMention;
use crate::pipeline::NormalizedText;
use crate::relationship::Relationship;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Normalize,
    Segment,
    Extract,
    Infer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CacheValue {
    Normalized(NormalizedText),
    Segments(Vec<Segment>),
    Mentions(Vec<PersonMention>),
    Relationships(Vec<Relationship>),
}

/// Stable 64-bit fingerprint of a stage's input content.
#[must_use]
pub fn fingerprint(content: &str) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    hasher.finish()
}

struct Entry {
    value: CacheValue,
    last_access: u64,
}

struct Inner {
    map: HashMap<(PipelineStage, u64), Entry>,
    tick: u64,
}

/// Bounded memoization store shared by the pipeline stages. Thread-safe;
/// last-writer-wins on an identical fingerprint is acceptable because stage
/// outputs are deterministic for the same input. A hit must always be
/// indistinguishable from recomputing, so entries whose stored shape does
/// not match the requesting stage are dropped and reported as misses.
pub struct ProcessingCache {
    capacity: usize,
    inner: Mutex<Inner>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ProcessingCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                tick: 0,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn put(&self, stage: PipelineStage, fp: u64, value: CacheValue) {
        let mut inner = self.lock();
        inner.tick += 1;
        let tick = inner.tick;
        inner.map.insert((stage, fp), Entry { value, last_access: tick });
        self.evict_over(&mut inner, self.capacity);
    }

    pub fn get(&self, stage: PipelineStage, fp: u64) -> Option<CacheValue> {
        let mut inner = self.lock();
        inner.tick += 1;
        let tick = inner.tick;
        match inner.map.get_mut(&(stage, fp)) {
            Some(entry) => {
                entry.last_access = tick;
                let value = entry.value.clone();
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn invalidate(&self, stage: PipelineStage, fp: u64) {
        self.lock().map.remove(&(stage, fp));
    }

    /// Drops least-recently-used entries until the store fits its capacity.
    pub fn trim(&self) {
        let mut inner = self.lock();
        self.evict_over(&mut inner, self.capacity);
    }

    pub fn get_normalized(&self, fp: u64) -> Option<NormalizedText> {
        self.get_typed(PipelineStage::Normalize, fp, |v| match v {
            CacheValue::Normalized(n) => Some(n),
            _ => None,
        })
    }

    pub fn get_segments(&self, fp: u64) -> Option<Vec<Segment>> {
        self.get_typed(PipelineStage::Segment, fp, |v| match v {
            CacheValue::Segments(s) => Some(s),
            _ => None,
        })
    }

    pub fn get_mentions(&self, fp: u64) -> Option<Vec<PersonMention>> {
        self.get_typed(PipelineStage::Extract, fp, |v| match v {
            CacheValue::Mentions(m) => Some(m),
            _ => None,
        })
    }

    pub fn get_relationships(&self, fp: u64) -> Option<Vec<Relationship>> {
        self.get_typed(PipelineStage::Infer, fp, |v| match v {
            CacheValue::Relationships(r) => Some(r),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn get_typed<T>(
        &self,
        stage: PipelineStage,
        fp: u64,
        extract: impl FnOnce(CacheValue) -> Option<T>,
    ) -> Option<T> {
        let value = self.get(stage, fp)?;
        match extract(value) {
            Some(typed) => Some(typed),
            None => {
                // Unreadable entry: recover by treating it as a miss.
                tracing::warn!(?stage, fp, "dropping cache entry with mismatched shape");
                self.invalidate(stage, fp);
                self.hits.fetch_sub(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn evict_over(&self, inner: &mut Inner, capacity: usize) {
        while inner.map.len() > capacity {
            let Some((&key, _)) = inner
                .map
                .iter()
                .min_by_key(|(_, entry)| entry.last_access)
            else {
                break;
            };
            inner.map.remove(&key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(?key, "evicted least-recently-used cache entry");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}
