//! Tool result cache.
//!
//! Maps `(tool, normalized arguments)` to a previously produced result with a
//! per-tool TTL. Bounded by `max_size` with least-recently-used eviction.
//! One async mutex per cache instance guards the map, the LRU order and the
//! counters.

use cadence_config::CacheConfig;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Tools whose results must never be served from cache.
const DEFAULT_NON_CACHEABLE: &[&str] = &[
    "write_file",
    "edit_file",
    "create_file",
    "delete_file",
    "move_file",
    "copy_file",
    "git_add",
    "git_commit",
    "git_push",
    "git_pull",
    "git_checkout",
    "shell",
    "run_tests",
    "create_project",
    "add_component",
];

/// Default TTLs: short for status-like tools, long for static listings.
const DEFAULT_TOOL_TTLS: &[(&str, u64)] = &[
    ("git_status", 5),
    ("git_diff", 5),
    ("git_branch", 10),
    ("git_log", 60),
    ("grep_search", 30),
    ("find_files", 30),
    ("find_definition", 30),
    ("read_file", 30),
    ("list_files", 30),
    ("web_fetch", 60),
    ("list_templates", 300),
    ("list_components", 300),
];

/// Which tools may be cached and for how long.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    non_cacheable: HashSet<String>,
    tool_ttls: HashMap<String, Duration>,
    default_ttl: Duration,
}

impl CachePolicy {
    /// A policy with no per-tool rules.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            non_cacheable: HashSet::new(),
            tool_ttls: HashMap::new(),
            default_ttl,
        }
    }

    /// Built-in tables, with config entries layered on top.
    pub fn from_config(config: &CacheConfig) -> Self {
        let mut policy = Self::default();
        policy.default_ttl = Duration::from_secs(config.default_ttl_secs);
        for (tool, secs) in &config.tool_ttl_secs {
            policy = policy.with_ttl(tool, Duration::from_secs(*secs));
        }
        for tool in &config.non_cacheable {
            policy = policy.with_non_cacheable(tool);
        }
        policy
    }

    pub fn with_non_cacheable(mut self, tool: &str) -> Self {
        self.non_cacheable.insert(tool.to_string());
        self
    }

    pub fn with_ttl(mut self, tool: &str, ttl: Duration) -> Self {
        self.tool_ttls.insert(tool.to_string(), ttl);
        self
    }

    pub fn is_cacheable(&self, tool: &str) -> bool {
        !self.non_cacheable.contains(tool)
    }

    pub fn ttl_for(&self, tool: &str) -> Duration {
        self.tool_ttls.get(tool).copied().unwrap_or(self.default_ttl)
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Non-cacheable tool names, sorted.
    pub fn non_cacheable_tools(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.non_cacheable.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Per-tool TTLs, sorted by tool name.
    pub fn ttl_table(&self) -> Vec<(&str, Duration)> {
        let mut table: Vec<_> = self.tool_ttls.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        table.sort_unstable_by(|a, b| a.0.cmp(b.0));
        table
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        let mut policy = Self::new(Duration::from_secs(60));
        for tool in DEFAULT_NON_CACHEABLE {
            policy.non_cacheable.insert((*tool).to_string());
        }
        for (tool, secs) in DEFAULT_TOOL_TTLS {
            policy.tool_ttls.insert((*tool).to_string(), Duration::from_secs(*secs));
        }
        policy
    }
}

/// Deterministic cache key: `"<tool>:<first 16 hex of sha256(canonical args)>"`.
pub fn cache_key(tool: &str, arguments: &serde_json::Value) -> String {
    format!("{tool}:{}", fingerprint(arguments))
}

/// Stable hash of the arguments, independent of object key order.
pub fn fingerprint(arguments: &serde_json::Value) -> String {
    let mut canonical = String::new();
    write_canonical(arguments, &mut canonical);
    let digest = Sha256::digest(canonical.as_bytes());
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

fn write_canonical(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// A cached tool result.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: String,
    pub expires_at: Instant,
    pub tool_name: String,
    pub fingerprint: String,
    last_used: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub invalidations: u64,
    pub size: usize,
    /// hits / (hits + misses), rounded to 3 places
    pub hit_rate: f64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: u64,
    misses: u64,
    evictions: u64,
    invalidations: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// use tick → key; the first entry is the least recently used
    order: BTreeMap<u64, String>,
    tick: u64,
    counters: Counters,
}

impl CacheState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn touch(&mut self, key: &str) {
        let tick = self.next_tick();
        if let Some(entry) = self.entries.get_mut(key) {
            self.order.remove(&entry.last_used);
            entry.last_used = tick;
            self.order.insert(tick, key.to_string());
        }
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.last_used);
        Some(entry)
    }

    fn evict_oldest(&mut self) -> bool {
        match self.order.pop_first() {
            Some((_, key)) => {
                self.entries.remove(&key);
                true
            }
            None => false,
        }
    }
}

/// LRU + TTL cache for tool results.
#[derive(Debug)]
pub struct ToolCache {
    state: Mutex<CacheState>,
    policy: CachePolicy,
    max_size: usize,
}

impl ToolCache {
    pub fn new(max_size: usize, policy: CachePolicy) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            policy,
            max_size: max_size.max(1),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_size, CachePolicy::from_config(config))
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Look up a cached result. Non-cacheable tools always miss.
    pub async fn get(&self, tool: &str, arguments: &serde_json::Value) -> Option<String> {
        let mut state = self.state.lock().await;
        if !self.policy.is_cacheable(tool) {
            state.counters.misses += 1;
            return None;
        }

        let key = cache_key(tool, arguments);
        let expired = match state.entries.get(&key) {
            Some(entry) => entry.is_expired(Instant::now()),
            None => {
                state.counters.misses += 1;
                return None;
            }
        };

        if expired {
            state.remove(&key);
            state.counters.misses += 1;
            debug!(tool, key = %key, "Cache entry expired");
            return None;
        }

        state.touch(&key);
        state.counters.hits += 1;
        state.entries.get(&key).map(|e| e.value.clone())
    }

    /// Store a result. No-op for non-cacheable tools; uses the tool's
    /// default TTL when `ttl` is `None`.
    pub async fn set(
        &self,
        tool: &str,
        arguments: &serde_json::Value,
        value: impl Into<String>,
        ttl: Option<Duration>,
    ) {
        if !self.policy.is_cacheable(tool) {
            return;
        }

        let fingerprint = fingerprint(arguments);
        let key = format!("{tool}:{fingerprint}");
        let ttl = ttl.unwrap_or_else(|| self.policy.ttl_for(tool));

        let mut state = self.state.lock().await;
        state.remove(&key);
        while state.entries.len() >= self.max_size {
            if !state.evict_oldest() {
                break;
            }
            state.counters.evictions += 1;
        }

        let tick = state.next_tick();
        state.order.insert(tick, key.clone());
        state.entries.insert(
            key,
            CacheEntry {
                value: value.into(),
                expires_at: Instant::now() + ttl,
                tool_name: tool.to_string(),
                fingerprint,
                last_used: tick,
            },
        );
    }

    /// Remove every key matching a glob such as `"read_file:*"`.
    pub async fn invalidate(&self, pattern: &str) -> usize {
        let matcher = match glob::Pattern::new(pattern) {
            Ok(m) => m,
            Err(e) => {
                warn!(pattern, error = %e, "Invalid cache invalidation pattern");
                return 0;
            }
        };

        let mut state = self.state.lock().await;
        let doomed: Vec<String> = state
            .entries
            .keys()
            .filter(|k| matcher.matches(k))
            .cloned()
            .collect();
        for key in &doomed {
            state.remove(key);
        }
        state.counters.invalidations += doomed.len() as u64;
        doomed.len()
    }

    /// Remove every entry for one tool.
    pub async fn invalidate_tool(&self, tool: &str) -> usize {
        self.invalidate(&format!("{}:*", glob::Pattern::escape(tool)))
            .await
    }

    /// Remove everything; cleared entries count as invalidations.
    pub async fn clear(&self) -> usize {
        let mut state = self.state.lock().await;
        let count = state.entries.len();
        state.entries.clear();
        state.order.clear();
        state.counters.invalidations += count as u64;
        count
    }

    /// Purge expired entries. Counters are untouched.
    pub async fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            state.remove(key);
        }
        expired.len()
    }

    pub async fn size(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        let c = &state.counters;
        let lookups = (c.hits + c.misses).max(1) as f64;
        CacheStats {
            hits: c.hits,
            misses: c.misses,
            evictions: c.evictions,
            invalidations: c.invalidations,
            size: state.entries.len(),
            hit_rate: (c.hits as f64 / lookups * 1000.0).round() / 1000.0,
        }
    }

    pub async fn reset_stats(&self) {
        self.state.lock().await.counters = Counters::default();
    }
}

impl Default for ToolCache {
    fn default() -> Self {
        Self::new(100, CachePolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache(max_size: usize) -> ToolCache {
        ToolCache::new(max_size, CachePolicy::default())
    }

    #[test]
    fn key_is_order_independent() {
        let a = json!({"path": "src", "pattern": "*.rs", "opts": {"x": 1, "y": [1, 2]}});
        let b = json!({"opts": {"y": [1, 2], "x": 1}, "pattern": "*.rs", "path": "src"});
        assert_eq!(cache_key("grep_search", &a), cache_key("grep_search", &b));
        assert_ne!(cache_key("grep_search", &a), cache_key("find_files", &a));

        let key = cache_key("read_file", &json!({"path": "a.txt"}));
        let (tool, hash) = key.split_once(':').unwrap();
        assert_eq!(tool, "read_file");
        assert_eq!(hash.len(), 16);
    }

    #[test]
    fn policy_from_config_layers_overrides() {
        let mut config = CacheConfig::default();
        config.tool_ttl_secs.insert("read_file".into(), 3);
        config.non_cacheable.push("web_fetch".into());
        let policy = CachePolicy::from_config(&config);

        assert_eq!(policy.ttl_for("read_file"), Duration::from_secs(3));
        assert_eq!(policy.ttl_for("git_status"), Duration::from_secs(5));
        assert_eq!(policy.ttl_for("something_else"), Duration::from_secs(60));
        assert!(!policy.is_cacheable("web_fetch"));
        assert!(!policy.is_cacheable("shell"));
    }

    #[tokio::test(start_paused = true)]
    async fn set_then_get_until_ttl() {
        let cache = cache(10);
        let args = json!({"path": "a.txt"});
        cache.set("read_file", &args, "alpha", None).await;

        assert_eq!(cache.get("read_file", &args).await.as_deref(), Some("alpha"));

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(cache.get("read_file", &args).await.is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get("read_file", &args).await.is_none());
        assert_eq!(cache.size().await, 0);

        let stats = cache.stats().await;
        assert_eq!((stats.hits, stats.misses), (2, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_ttl_wins() {
        let cache = cache(10);
        let args = json!({"path": "."});
        cache.set("list_templates", &args, "x", Some(Duration::from_secs(1))).await;
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("list_templates", &args).await.is_none());
    }

    #[tokio::test]
    async fn non_cacheable_never_hits() {
        let cache = cache(10);
        let args = json!({"command": "ls"});
        cache.set("shell", &args, "out", None).await;
        assert!(cache.get("shell", &args).await.is_none());
        assert_eq!(cache.size().await, 0);
        assert_eq!(cache.stats().await.misses, 1);
    }

    #[tokio::test]
    async fn lru_evicts_least_recently_used() {
        let cache = cache(2);
        let a = json!({"path": "a"});
        let b = json!({"path": "b"});
        let c = json!({"path": "c"});

        cache.set("read_file", &a, "A", None).await;
        cache.set("read_file", &b, "B", None).await;
        // Touch A so B becomes the oldest.
        assert!(cache.get("read_file", &a).await.is_some());
        cache.set("read_file", &c, "C", None).await;

        assert_eq!(cache.size().await, 2);
        assert!(cache.get("read_file", &a).await.is_some());
        assert!(cache.get("read_file", &b).await.is_none());
        assert!(cache.get("read_file", &c).await.is_some());
        assert_eq!(cache.stats().await.evictions, 1);
    }

    #[tokio::test]
    async fn overwrite_does_not_evict() {
        let cache = cache(2);
        let a = json!({"path": "a"});
        let b = json!({"path": "b"});
        cache.set("read_file", &a, "A1", None).await;
        cache.set("read_file", &b, "B", None).await;
        cache.set("read_file", &a, "A2", None).await;

        assert_eq!(cache.size().await, 2);
        assert_eq!(cache.get("read_file", &a).await.as_deref(), Some("A2"));
        assert_eq!(cache.stats().await.evictions, 0);
    }

    #[tokio::test]
    async fn invalidate_by_pattern_and_tool() {
        let cache = cache(10);
        cache.set("read_file", &json!({"path": "a"}), "A", None).await;
        cache.set("read_file", &json!({"path": "b"}), "B", None).await;
        cache.set("list_files", &json!({"path": "."}), "L", None).await;

        assert_eq!(cache.invalidate("read_*").await, 2);
        assert_eq!(cache.invalidate_tool("list_files").await, 1);
        assert_eq!(cache.invalidate("[").await, 0);
        assert_eq!(cache.size().await, 0);
        assert_eq!(cache.stats().await.invalidations, 3);
    }

    #[tokio::test]
    async fn clear_counts_invalidations() {
        let cache = cache(10);
        cache.set("read_file", &json!({"path": "a"}), "A", None).await;
        cache.set("git_log", &json!({}), "log", None).await;
        assert_eq!(cache.clear().await, 2);
        assert_eq!(cache.stats().await.invalidations, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_expired_leaves_stats_alone() {
        let cache = cache(10);
        cache.set("git_status", &json!({}), "clean", None).await;
        cache.set("list_templates", &json!({}), "t", None).await;
        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(cache.cleanup_expired().await, 1);
        assert_eq!(cache.size().await, 1);
        assert_eq!(cache.stats().await, CacheStats { size: 1, ..CacheStats::default() });
    }

    #[tokio::test]
    async fn hit_rate_rounds_to_three_places() {
        let cache = cache(10);
        let args = json!({"path": "a"});
        cache.set("read_file", &args, "A", None).await;
        cache.get("read_file", &args).await;
        cache.get("read_file", &json!({"path": "x"})).await;
        cache.get("read_file", &json!({"path": "y"})).await;

        let stats = cache.stats().await;
        assert_eq!(stats.hit_rate, 0.333);

        cache.reset_stats().await;
        let stats = cache.stats().await;
        assert_eq!((stats.hits, stats.misses, stats.hit_rate), (0, 0, 0.0));
        assert_eq!(stats.size, 1);
    }

    #[tokio::test]
    async fn concurrent_access_is_consistent() {
        let cache = std::sync::Arc::new(cache(8));
        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let cache = std::sync::Arc::clone(&cache);
                tokio::spawn(async move {
                    let args = json!({"path": format!("f{}", i % 12)});
                    cache.set("read_file", &args, format!("v{i}"), None).await;
                    cache.get("read_file", &args).await;
                })
            })
            .collect();
        for t in tasks {
            t.await.unwrap();
        }
        assert!(cache.size().await <= 8);
    }
}
