//! In-memory key-value store with TTL expiry.
//!
//! Expiry uses [`tokio::time::Instant`], so tests running under
//! `#[tokio::test(start_paused = true)]` can advance time to expire records.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Only poisoned locks panic

use asyncreq_core::kv_store::{KeyValueError, KeyValueStore};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    ttl: Duration,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// In-memory key-value store for fast, deterministic testing.
///
/// Clones share storage and failure switches, so a test can keep a handle
/// while the runtime owns an `Arc<dyn KeyValueStore>`.
///
/// # Example
///
/// ```
/// use asyncreq_testing::InMemoryKeyValueStore;
/// use asyncreq_core::kv_store::KeyValueStore;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryKeyValueStore::new();
/// store.set_with_ttl("k", "v".to_string(), Duration::from_secs(5)).await?;
/// assert_eq!(store.get("k").await?, Some("v".to_string()));
///
/// store.fail_reads(true);
/// assert!(store.get("k").await.is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryKeyValueStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
}

impl InMemoryKeyValueStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent read fail (or succeed again)
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent write fail (or succeed again)
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// TTL given to the most recent write of `key`, if it is still live
    #[must_use]
    pub fn last_ttl(&self, key: &str) -> Option<Duration> {
        self.entries
            .read()
            .unwrap()
            .get(key)
            .filter(|entry| entry.is_live())
            .map(|entry| entry.ttl)
    }

    /// Current live value of `key`, bypassing failure injection
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap()
            .get(key)
            .filter(|entry| entry.is_live())
            .map(|entry| entry.value.clone())
    }

    /// Check if a live value exists for `key`
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.raw(key).is_some()
    }

    /// Number of live entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap()
            .values()
            .filter(|entry| entry.is_live())
            .count()
    }

    /// Check if the store holds no live entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successful writes since creation
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Remove every entry (for test isolation)
    pub fn clear(&self) {
        self.entries.write().unwrap().clear();
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn set_with_ttl(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), KeyValueError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            if ttl.is_zero() {
                return Err(KeyValueError::InvalidTtl(ttl));
            }
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(KeyValueError::WriteFailed {
                    key,
                    reason: "injected write failure".to_string(),
                });
            }

            let entry = Entry {
                value,
                ttl,
                expires_at: Instant::now() + ttl,
            };
            self.entries.write().unwrap().insert(key, entry);
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, KeyValueError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(KeyValueError::ReadFailed {
                    key,
                    reason: "injected read failure".to_string(),
                });
            }

            let mut entries = self.entries.write().unwrap();
            match entries.get(&key) {
                Some(entry) if entry.is_live() => Ok(Some(entry.value.clone())),
                Some(_) => {
                    entries.remove(&key);
                    Ok(None)
                }
                None => Ok(None),
            }
        })
    }
}
