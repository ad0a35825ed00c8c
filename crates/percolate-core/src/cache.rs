//! In-memory memoization of compiler output.
//!
//! Entries are keyed by an identity token only (a request path, a bundle
//! name). The source supplier runs on a miss and nowhere else, so a changed
//! source is only picked up after an explicit [`CompilationCache::invalidate`]
//! or once the entry ages out.

use lru::LruCache;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::compiler::{CompileError, Compiler};
use crate::source::SourceError;

pub const DEFAULT_MAX_ENTRIES: usize = 100;
pub const DEFAULT_TIME_TO_LIVE_SECS: u64 = 600;

/// Bounds on how much and how long the cache keeps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheOptions {
    /// Entries kept before the least recently used is evicted (default: 100)
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Seconds an entry stays valid after it was written (default: 600)
    #[serde(default = "default_time_to_live_secs")]
    pub time_to_live_secs: u64,
}

fn default_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

fn default_time_to_live_secs() -> u64 {
    DEFAULT_TIME_TO_LIVE_SECS
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            time_to_live_secs: DEFAULT_TIME_TO_LIVE_SECS,
        }
    }
}

impl CacheOptions {
    pub fn time_to_live(&self) -> Duration {
        Duration::from_secs(self.time_to_live_secs)
    }
}

struct CacheEntry {
    output: Arc<str>,
    written_at: Instant,
}

type Outcome = Result<Arc<str>, CompileError>;

/// A computation other callers for the same key can wait on
#[derive(Default)]
struct InFlight {
    outcome: Mutex<Option<Outcome>>,
    ready: Condvar,
}

impl InFlight {
    fn publish(&self, outcome: Outcome) {
        *lock(&self.outcome) = Some(outcome);
        self.ready.notify_all();
    }

    fn wait(&self) -> Outcome {
        let mut outcome = lock(&self.outcome);
        loop {
            if let Some(result) = outcome.as_ref() {
                return result.clone();
            }
            outcome = self
                .ready
                .wait(outcome)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

struct Inner {
    entries: LruCache<String, CacheEntry>,
    in_flight: FxHashMap<String, Arc<InFlight>>,
}

/// Compiled output by key, computed at most once per key at a time
///
/// Concurrent callers asking for the same missing key share one supplier call
/// and one compilation. Failures are handed to every waiting caller but never
/// stored, so the next request retries.
pub struct CompilationCache {
    inner: Mutex<Inner>,
    time_to_live: Duration,
}

impl Default for CompilationCache {
    fn default() -> Self {
        Self::new(&CacheOptions::default())
    }
}

impl CompilationCache {
    pub fn new(options: &CacheOptions) -> Self {
        let capacity = NonZeroUsize::new(options.max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                in_flight: FxHashMap::default(),
            }),
            time_to_live: options.time_to_live(),
        }
    }

    /// Return the cached output for `key`, or fetch the source, compile it with
    /// `compiler`, and cache the result
    ///
    /// Blocks while another caller computes the same key. `source` is invoked
    /// only by the caller that performs the computation.
    pub fn get_or_compile<C, F>(
        &self,
        key: &str,
        compiler: &mut C,
        source: F,
    ) -> Result<Arc<str>, CompileError>
    where
        C: Compiler + ?Sized,
        F: FnOnce() -> Result<String, SourceError>,
    {
        let flight = {
            let mut inner = lock(&self.inner);

            if let Some(output) = self.lookup(&mut inner, key) {
                debug!("Cache hit: {}", key);
                return Ok(output);
            }

            if let Some(flight) = inner.in_flight.get(key) {
                let flight = flight.clone();
                drop(inner);
                debug!("Waiting for in-flight compilation of {}", key);
                return flight.wait();
            }

            let flight = Arc::new(InFlight::default());
            inner.in_flight.insert(key.to_string(), flight.clone());
            flight
        };

        let mut guard = FlightGuard {
            cache: self,
            key,
            flight,
            finished: false,
        };

        let outcome = compute(key, compiler, source);
        guard.finish(outcome.clone());
        outcome
    }

    /// Cached output for `key`, if present and fresh; never computes
    pub fn get(&self, key: &str) -> Option<Arc<str>> {
        let mut inner = lock(&self.inner);
        self.lookup(&mut inner, key)
    }

    /// Drop the entry for `key`, forcing the next request to recompute
    ///
    /// A computation already in flight for `key` is detached: its current
    /// waiters still get its outcome, but it is not stored, and later
    /// requests start over with fresh source.
    pub fn invalidate(&self, key: &str) -> bool {
        let mut inner = lock(&self.inner);
        let removed = inner.entries.pop(key).is_some();
        let detached = inner.in_flight.remove(key).is_some();
        if removed || detached {
            debug!("Invalidated {}", key);
        }
        removed || detached
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    fn lookup(&self, inner: &mut Inner, key: &str) -> Option<Arc<str>> {
        let expired = match inner.entries.get(key) {
            Some(entry) if entry.written_at.elapsed() < self.time_to_live => {
                return Some(entry.output.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            debug!("Cache entry for {} expired", key);
            inner.entries.pop(key);
        }
        None
    }
}

fn compute<C, F>(key: &str, compiler: &mut C, source: F) -> Result<Arc<str>, CompileError>
where
    C: Compiler + ?Sized,
    F: FnOnce() -> Result<String, SourceError>,
{
    let text = source().map_err(|e| {
        warn!("Failed to fetch source for {}: {}", key, e);
        CompileError::from_source(key, &e)
    })?;

    info!("Compiling {}", key);
    match compiler.compile(&text) {
        Ok(output) => Ok(Arc::from(output)),
        Err(failure) => {
            warn!("Compilation of {} failed: {}", key, failure);
            Err(CompileError::syntax(key, text, failure))
        }
    }
}

/// Publishes the outcome of a computation and releases its waiters, even if
/// the computing caller unwinds before it finishes
struct FlightGuard<'a> {
    cache: &'a CompilationCache,
    key: &'a str,
    flight: Arc<InFlight>,
    finished: bool,
}

impl FlightGuard<'_> {
    fn finish(&mut self, outcome: Outcome) {
        {
            let mut inner = lock(&self.cache.inner);
            let attached = inner
                .in_flight
                .get(self.key)
                .is_some_and(|current| Arc::ptr_eq(current, &self.flight));

            if attached {
                inner.in_flight.remove(self.key);
                if let Ok(output) = &outcome {
                    inner.entries.put(
                        self.key.to_string(),
                        CacheEntry {
                            output: output.clone(),
                            written_at: Instant::now(),
                        },
                    );
                }
            } else {
                debug!("Discarding invalidated compilation of {}", self.key);
            }
        }
        self.flight.publish(outcome);
        self.finished = true;
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.finish(Err(CompileError::Abandoned {
                path: self.key.to_string(),
            }));
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
