//! Tool-result cache with time expiry and bounded capacity.
//!
//! Keys are `md5(tool_name || canonical_json(arguments))`, so semantically
//! equal argument maps hash identically regardless of insertion order.
//! Eviction is a scan-and-evict heuristic rather than a strict LRU list:
//! on insert into a full cache, expired entries are removed first (bounded
//! per insert), then the single oldest entry if still full.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde_json::Value;

/// How long a cached tool result stays servable.
pub(crate) const CACHE_EXPIRATION: Duration = Duration::from_secs(300);

/// A cached execution outcome: the tool's value or its failure text.
pub(crate) type CachedResult = Result<Value, String>;

struct CacheEntry {
    result: CachedResult,
    stored_at: Instant,
}

pub(crate) struct ToolCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    capacity: usize,
}

impl ToolCache {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// A fresh entry for `(tool, args)`, or None when absent or expired.
    pub(crate) fn get(
        &self,
        tool: &str,
        args: &serde_json::Map<String, Value>,
    ) -> Option<CachedResult> {
        let key = cache_key(tool, args);
        let entries = self.entries.read().unwrap();
        entries
            .get(&key)
            .filter(|entry| entry.stored_at.elapsed() < CACHE_EXPIRATION)
            .map(|entry| entry.result.clone())
    }

    pub(crate) fn insert(
        &self,
        tool: &str,
        args: &serde_json::Map<String, Value>,
        result: CachedResult,
    ) {
        let key = cache_key(tool, args);
        let mut entries = self.entries.write().unwrap();

        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            Self::evict_for_insert(&mut entries, self.capacity);
        }

        entries.insert(
            key,
            CacheEntry {
                result,
                stored_at: Instant::now(),
            },
        );
    }

    /// Remove expired entries (at most a quarter of the cache per call, to
    /// bound work), then the single oldest entry if the cache is still full.
    fn evict_for_insert(entries: &mut HashMap<String, CacheEntry>, capacity: usize) {
        let max_removals = (entries.len() / 4).max(1);
        let mut expired = Vec::new();
        let mut oldest: Option<(String, Instant)> = None;

        for (key, entry) in entries.iter() {
            if expired.len() >= max_removals {
                break;
            }
            if entry.stored_at.elapsed() >= CACHE_EXPIRATION {
                expired.push(key.clone());
            } else if oldest
                .as_ref()
                .map_or(true, |(_, stored)| entry.stored_at < *stored)
            {
                oldest = Some((key.clone(), entry.stored_at));
            }
        }

        for key in &expired {
            entries.remove(key);
        }

        if entries.len() >= capacity {
            if let Some((key, _)) = oldest {
                entries.remove(&key);
            }
        }
    }

    #[cfg(test)]
    fn backdate(&self, tool: &str, args: &serde_json::Map<String, Value>, age: Duration) {
        let key = cache_key(tool, args);
        let mut entries = self.entries.write().unwrap();
        if let Some(entry) = entries.get_mut(&key) {
            entry.stored_at = Instant::now() - age;
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }
}

pub(crate) fn cache_key(tool: &str, args: &serde_json::Map<String, Value>) -> String {
    let mut context = md5::Context::new();
    context.consume(tool.as_bytes());
    if !args.is_empty() {
        context.consume(canonical_json(&Value::Object(args.clone())).as_bytes());
    }
    format!("{:x}", context.compute())
}

/// Serialize a JSON value with object keys in ascending order, so equal
/// maps produce equal bytes.
pub(crate) fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|key| {
                    format!(
                        "{}:{}",
                        serde_json::to_string(key).unwrap_or_default(),
                        canonical_json(&map[key])
                    )
                })
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", rendered.join(","))
        }
        other => other.to_string(),
    }
}
