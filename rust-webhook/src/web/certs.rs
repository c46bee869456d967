//! Signing certificate fetch and cache.
//!
//! The verifier needs the RSA public key behind `SigningCertURL`. Fetches go
//! through an injected [`CertFetcher`] and land in a [`CertCache`] instance
//! with explicit TTL eviction (no process-global state, no cross-test
//! leakage). Concurrent misses for the same URL may both fetch; the duplicate
//! work is acceptable and the cache is never a lock around network I/O.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::RwLock;
use tracing::info;
use x509_parser::pem::parse_x509_pem;

/// Fetches the DER-encoded SubjectPublicKeyInfo of the certificate at a URL.
#[async_trait]
pub trait CertFetcher: Send + Sync {
    async fn fetch_spki(&self, url: &str) -> Result<Vec<u8>>;
}

/// HTTP fetcher: GETs the PEM certificate and extracts its public key.
pub struct HttpCertFetcher {
    client: Client,
}

impl HttpCertFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CertFetcher for HttpCertFetcher {
    async fn fetch_spki(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to fetch signing certificate")?
            .error_for_status()
            .context("Certificate fetch returned an error status")?;

        let pem = response
            .bytes()
            .await
            .context("Failed to read certificate body")?;

        let spki = spki_from_pem(&pem)?;

        info!(url = %url, spki_length = spki.len(), "signing_cert_fetched");

        Ok(spki)
    }
}

/// Extract the DER SubjectPublicKeyInfo from a PEM certificate.
pub fn spki_from_pem(pem: &[u8]) -> Result<Vec<u8>> {
    let (_, parsed) =
        parse_x509_pem(pem).map_err(|e| anyhow!("invalid certificate PEM: {e}"))?;
    let cert = parsed
        .parse_x509()
        .map_err(|e| anyhow!("invalid X.509 certificate: {e}"))?;
    Ok(cert.public_key().raw.to_vec())
}

/// TTL cache of public keys keyed by certificate URL.
pub struct CertCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedKey>>,
}

struct CachedKey {
    spki: Vec<u8>,
    fetched_at: Instant,
}

impl CertCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Get a fresh entry; expired entries count as misses.
    pub async fn get(&self, url: &str) -> Option<Vec<u8>> {
        let entries = self.entries.read().await;
        entries
            .get(url)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| entry.spki.clone())
    }

    pub async fn insert(&self, url: &str, spki: Vec<u8>) {
        let mut entries = self.entries.write().await;
        entries.insert(
            url.to_string(),
            CachedKey {
                spki,
                fetched_at: Instant::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cache_hit_within_ttl() {
        let cache = CertCache::new(Duration::from_secs(60));
        cache.insert("https://example/cert.pem", vec![1, 2, 3]).await;
        assert_eq!(
            cache.get("https://example/cert.pem").await,
            Some(vec![1, 2, 3])
        );
    }

    #[tokio::test]
    async fn test_cache_expiry() {
        let cache = CertCache::new(Duration::from_millis(0));
        cache.insert("https://example/cert.pem", vec![1]).await;
        assert_eq!(cache.get("https://example/cert.pem").await, None);
    }

    #[tokio::test]
    async fn test_cache_miss_for_unknown_url() {
        let cache = CertCache::new(Duration::from_secs(60));
        assert_eq!(cache.get("https://example/other.pem").await, None);
    }

    #[test]
    fn test_spki_from_garbage_fails() {
        assert!(spki_from_pem(b"not a pem").is_err());
    }
}
