//! Signing certificate store.
//!
//! Fetches, origin-validates, parses and caches X.509 certificates keyed by the
//! raw `SigningCertURL` string.
//!
//! # Concurrency
//!
//! - Hits take a shared read lock on the entry map and never wait on each other.
//! - A miss takes a per-URL gate before loading, so concurrent misses for the
//!   same URL collapse into one fetch while other URLs load independently.
//!   The gate is released when the load finishes or its future is dropped.
//! - Counters are atomics; evictions are recorded under the map write lock.
//!
//! The store is a cheap-to-clone handle. Construct one at startup and pass it
//! to every verifier that should share the cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::VerifyResult;
use crate::types::CertStoreConfig;

mod certificate;
mod fetch;
mod origin;
mod stats;

pub use certificate::SigningCertificate;
pub use fetch::{CertificateFetcher, HttpFetcher, FETCH_USER_AGENT, MAX_CERT_BYTES};
pub use origin::validate_cert_url;
pub use stats::CacheStats;

use stats::StatsCounter;

/// Cached certificate. Replaced wholesale, never mutated.
#[derive(Debug, Clone)]
struct CacheEntry {
    certificate: Arc<SigningCertificate>,
    expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Certificate store with TTL cache and hit/miss accounting.
#[derive(Debug, Clone)]
pub struct CertificateStore {
    inner: Arc<StoreInner>,
}

/// Serializes loads of one URL.
type LoadGate = Arc<tokio::sync::Mutex<()>>;

#[derive(Debug)]
struct StoreInner {
    config: CertStoreConfig,
    fetcher: Arc<dyn CertificateFetcher>,

    /// URL -> cached certificate
    entries: RwLock<HashMap<String, CacheEntry>>,

    /// URL -> load gate, present only while a load for that URL is pending
    inflight: Mutex<HashMap<String, LoadGate>>,

    stats: StatsCounter,
}

impl CertificateStore {
    /// Create a store that fetches over HTTPS.
    pub fn new(config: CertStoreConfig) -> VerifyResult<Self> {
        config.validate()?;
        let fetcher = HttpFetcher::new(Duration::from_secs(config.fetch_timeout_secs))?;
        Ok(Self::with_fetcher(config, Arc::new(fetcher)))
    }

    /// Create a store from environment configuration.
    pub fn from_env() -> VerifyResult<Self> {
        Self::new(CertStoreConfig::from_env()?)
    }

    /// Create a store with a custom fetcher.
    pub fn with_fetcher(config: CertStoreConfig, fetcher: Arc<dyn CertificateFetcher>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                config,
                fetcher,
                entries: RwLock::new(HashMap::new()),
                inflight: Mutex::new(HashMap::new()),
                stats: StatsCounter::default(),
            }),
        }
    }

    pub fn config(&self) -> &CertStoreConfig {
        &self.inner.config
    }

    /// Get the certificate published at `url`.
    ///
    /// The URL is origin-validated before the cache is consulted, so an
    /// untrusted URL never produces a hit, a miss, or a fetch.
    pub async fn get_certificate(&self, url: &str) -> VerifyResult<Arc<SigningCertificate>> {
        validate_cert_url(url, self.inner.config.origin_policy)?;

        if let Some(cert) = self.lookup(url).await {
            self.inner.stats.record_hit();
            debug!(url = %url, "certificate cache hit");
            return Ok(cert);
        }

        self.inner.stats.record_miss();
        debug!(url = %url, "certificate cache miss");
        self.load_coalesced(url).await
    }

    /// Snapshot of the cache counters.
    pub fn stats(&self) -> CacheStats {
        self.inner.stats.snapshot()
    }

    /// Number of cached entries, live or expired.
    pub async fn len(&self) -> usize {
        self.inner.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop the cached certificate for `url`, if any.
    pub async fn invalidate(&self, url: &str) {
        let removed = self.inner.entries.write().await.remove(url).is_some();
        if removed {
            self.inner.stats.record_evictions(1);
        }
    }

    /// Drop every cached certificate.
    pub async fn invalidate_all(&self) {
        let mut entries = self.inner.entries.write().await;
        let n = entries.len() as u64;
        entries.clear();
        self.inner.stats.record_evictions(n);
    }

    async fn lookup(&self, url: &str) -> Option<Arc<SigningCertificate>> {
        let entries = self.inner.entries.read().await;
        entries
            .get(url)
            .filter(|entry| entry.is_live(Utc::now()))
            .map(|entry| Arc::clone(&entry.certificate))
    }

    async fn load_coalesced(&self, url: &str) -> VerifyResult<Arc<SigningCertificate>> {
        let slot = InflightSlot::acquire(&self.inner.inflight, url);
        let _guard = slot.gate.lock().await;

        // Another task may have finished loading while we waited on the gate.
        match self.lookup(url).await {
            Some(cert) => Ok(cert),
            None => self.load(url).await,
        }
    }

    async fn load(&self, url: &str) -> VerifyResult<Arc<SigningCertificate>> {
        let loaded = match self.inner.fetcher.fetch(url).await {
            Ok(bytes) => SigningCertificate::parse(url, &bytes),
            Err(e) => Err(e),
        };

        let certificate = match loaded {
            Ok(cert) => {
                self.inner.stats.record_load(true);
                Arc::new(cert)
            }
            Err(e) => {
                self.inner.stats.record_load(false);
                warn!(url = %url, error = %e, "failed to load signing certificate");
                return Err(e);
            }
        };

        let now = Utc::now();
        if !certificate.is_valid_at(now) {
            warn!(
                url = %url,
                not_after = %certificate.not_after(),
                "signing certificate is outside its validity window"
            );
        }

        // An entry never outlives the certificate itself.
        let expires_at = i64::try_from(self.inner.config.ttl_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
            .min(certificate.not_after());

        debug!(
            url = %url,
            subject = %certificate.subject(),
            expires_at = %expires_at,
            "cached signing certificate"
        );

        self.insert(
            url,
            CacheEntry {
                certificate: Arc::clone(&certificate),
                expires_at,
            },
            now,
        )
        .await;

        Ok(certificate)
    }

    async fn insert(&self, url: &str, entry: CacheEntry, now: DateTime<Utc>) {
        let max_entries = self.inner.config.max_entries.max(1);
        let mut entries = self.inner.entries.write().await;
        let mut evicted = 0u64;

        if entries.remove(url).is_some() {
            evicted += 1;
        }

        if entries.len() >= max_entries {
            let before = entries.len();
            entries.retain(|_, e| e.is_live(now));
            evicted += (before - entries.len()) as u64;
        }

        while entries.len() >= max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.expires_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    entries.remove(&key);
                    evicted += 1;
                }
                None => break,
            }
        }

        entries.insert(url.to_string(), entry);
        self.inner.stats.record_evictions(evicted);
    }
}

/// A claim on the load gate for one URL.
///
/// Dropping the slot releases the claim, including when the loading future is
/// cancelled mid-fetch. The last claimant removes the gate from the map.
struct InflightSlot<'a> {
    inflight: &'a Mutex<HashMap<String, LoadGate>>,
    url: &'a str,
    gate: LoadGate,
}

impl<'a> InflightSlot<'a> {
    fn acquire(inflight: &'a Mutex<HashMap<String, LoadGate>>, url: &'a str) -> Self {
        let mut map = inflight.lock().unwrap_or_else(PoisonError::into_inner);
        let gate = Arc::clone(map.entry(url.to_string()).or_default());
        Self { inflight, url, gate }
    }
}

impl Drop for InflightSlot<'_> {
    fn drop(&mut self) {
        let mut map = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map plus ours: nobody else holds a claim.
        let last = map
            .get(self.url)
            .is_some_and(|gate| Arc::ptr_eq(gate, &self.gate))
            && Arc::strong_count(&self.gate) <= 2;
        if last {
            map.remove(self.url);
        }
    }
}
