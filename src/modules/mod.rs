//! Module cache
//!
//! Keeps one loaded module per `(consumer, script_hash)` so repeated
//! evaluations of the same compiled script skip the load step. Entries
//! idle for longer than the configured TTL are removed by [`ModuleCache::sweep`],
//! usually driven by the background [`sweeper`].
//!
//! A cache built without a TTL retains nothing: every resolve loads a
//! fresh module that lives only as long as its caller's handle.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

mod loader;
pub mod sweeper;

pub use loader::LoadedModule;
pub(crate) use loader::Fault;

use crate::error::{CacheError, ScriptError};
use crate::model::Script;

/// Identity of a cached module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub consumer: &'static str,
    pub hash: i32,
}

impl CacheKey {
    pub fn new(consumer: &'static str, hash: i32) -> Self {
        Self { consumer, hash }
    }
}

struct CacheEntry {
    module: Arc<LoadedModule>,
    /// Binary the module was loaded from, compared on every hit
    binary: Box<[u8]>,
    /// Nanoseconds since the cache epoch
    last_used: AtomicU64,
}

impl CacheEntry {
    fn idle_nanos(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_used.load(Ordering::Relaxed))
    }
}

/// Point-in-time counters of a [`ModuleCache`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub loads: u64,
    pub hits: u64,
    pub evictions: u64,
}

pub struct ModuleCache {
    entries: DashMap<CacheKey, CacheEntry>,
    ttl: Option<Duration>,
    epoch: Instant,
    loads: AtomicU64,
    hits: AtomicU64,
    evictions: AtomicU64,
}

impl ModuleCache {
    /// A cache whose entries expire after `ttl` of disuse
    ///
    /// `None` or a zero duration disables retention.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: ttl.filter(|ttl| !ttl.is_zero()),
            epoch: Instant::now(),
            loads: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn is_enabled(&self) -> bool {
        self.ttl.is_some()
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Return the loaded module for `script`, loading it on a miss
    pub fn resolve(
        &self,
        consumer: &'static str,
        script: &Script,
    ) -> Result<Arc<LoadedModule>, ScriptError> {
        let binary = script.compiled_binary()?;
        let key = CacheKey::new(consumer, script.script_hash);

        if self.is_enabled() {
            if let Some(module) = self.lookup(&key, binary) {
                return Ok(module);
            }
        }

        let start = Instant::now();
        let module = Arc::new(LoadedModule::load(consumer, key.hash, binary)?);
        self.loads.fetch_add(1, Ordering::Relaxed);
        info!(
            operation = "load",
            consumer,
            script_hash = key.hash,
            script_id = script.id,
            duration_ms = start.elapsed().as_millis() as u64,
            "module loaded"
        );

        if self.is_enabled() {
            if let Err(e) = self.insert(key, binary, Arc::clone(&module)) {
                debug!("{}", e);
            }
        }

        Ok(module)
    }

    fn lookup(&self, key: &CacheKey, binary: &[u8]) -> Option<Arc<LoadedModule>> {
        let entry = self.entries.get(key)?;
        if *entry.binary != *binary {
            let collision = CacheError::HashCollision {
                consumer: key.consumer,
                hash: key.hash,
            };
            warn!("{}; reloading", collision);
            return None;
        }

        entry.last_used.store(self.now_nanos(), Ordering::Relaxed);
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(Arc::clone(&entry.module))
    }

    fn insert(
        &self,
        key: CacheKey,
        binary: &[u8],
        module: Arc<LoadedModule>,
    ) -> Result<(), CacheError> {
        let fresh = CacheEntry {
            module,
            binary: binary.into(),
            last_used: AtomicU64::new(self.now_nanos()),
        };

        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                if *occupied.get().binary == *binary {
                    // an equivalent module won the race; keep it
                    return Err(CacheError::InsertRace {
                        consumer: key.consumer,
                        hash: key.hash,
                    });
                }
                occupied.insert(fresh);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
            }
        }
        Ok(())
    }

    /// Drop the entry for `(consumer, hash)`; true if one was present
    pub fn invalidate(&self, consumer: &'static str, hash: i32) -> bool {
        let removed = self.entries.remove(&CacheKey::new(consumer, hash)).is_some();
        if removed {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(consumer, script_hash = hash, "Invalidated cached module");
        }
        removed
    }

    /// Remove every entry idle for longer than the TTL
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub(crate) fn sweep_at(&self, now: Instant) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };
        let now = self.nanos_at(now);
        let ttl = ttl.as_nanos() as u64;

        let stale: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|entry| entry.value().idle_nanos(now) > ttl)
            .map(|entry| *entry.key())
            .collect();

        // re-checked per key so an entry touched since the scan survives
        let removed = stale
            .into_iter()
            .filter(|key| {
                self.entries
                    .remove_if(key, |_, entry| entry.idle_nanos(now) > ttl)
                    .is_some()
            })
            .count();

        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
            info!(
                operation = "sweep",
                evicted = removed,
                remaining = self.entries.len(),
                "expired modules evicted"
            );
        }
        removed
    }

    /// Remove every entry, returning how many were removed
    pub fn clear_all(&self) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, _| {
            removed += 1;
            false
        });
        self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        debug!("Cleared {} cached modules", removed);
        removed
    }

    pub fn contains(&self, consumer: &'static str, hash: i32) -> bool {
        self.entries.contains_key(&CacheKey::new(consumer, hash))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            loads: self.loads.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn now_nanos(&self) -> u64 {
        self.nanos_at(Instant::now())
    }

    fn nanos_at(&self, instant: Instant) -> u64 {
        instant.saturating_duration_since(self.epoch).as_nanos() as u64
    }
}

impl std::fmt::Debug for ModuleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleCache")
            .field("ttl", &self.ttl)
            .field("stats", &self.stats())
            .finish()
    }
}
