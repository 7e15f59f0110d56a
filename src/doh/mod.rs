//! DNS-over-HTTPS upstream resolution with a TTL-capped answer cache.
//!
//! Concurrent lookups for the same name and type are coalesced by a
//! per-key lock: the first caller fetches and stores, the rest read what it
//! stored.

pub mod cache;
pub mod lock;
pub mod provider;
pub mod transport;

use std::sync::Arc;
use std::time::Instant;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use tracing::{error, info};

use crate::dns::DNSPacket;
use crate::dns::enums::DNSResourceType;
use crate::dns::question::DNSQuestion;
use crate::dns::resource::DNSResource;
use crate::error::DohError;

pub use cache::{CacheKey, MAX_CACHE_TTL, UpstreamCache, UpstreamCacheEntry};
pub use lock::SingleFlightLock;
pub use provider::{DEFAULT_PROVIDER, DohProvider, PROVIDERS, bootstrap_records};
pub use transport::{DohResponse, DohTransport, HttpsTransport};

/// Milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub struct DohResolver {
    transport: Arc<dyn DohTransport>,
    cache: UpstreamCache,
    lock: SingleFlightLock,
}

impl DohResolver {
    pub fn new(transport: Arc<dyn DohTransport>) -> Self {
        Self {
            transport,
            cache: UpstreamCache::new(),
            lock: SingleFlightLock::new(),
        }
    }

    pub fn cache(&self) -> &UpstreamCache {
        &self.cache
    }

    /// Encode a single-question query for the `dns` URL parameter
    pub fn encode_query(name: &str, rtype: DNSResourceType) -> Result<String, DohError> {
        let id = rand::random::<u16>();
        let packet = DNSPacket::query(id, DNSQuestion::new(name, rtype));
        Ok(URL_SAFE_NO_PAD.encode(packet.serialize()?))
    }

    async fn fetch(
        &self,
        name: &str,
        rtype: DNSResourceType,
        provider: &DohProvider,
    ) -> Result<Vec<DNSResource>, DohError> {
        let url = provider.url(&Self::encode_query(name, rtype)?);
        let response = self.transport.get(provider, &url).await?;
        if response.status != 200 {
            return Err(DohError::Status(response.status));
        }
        let packet = DNSPacket::parse(&response.body)?;
        Ok(packet.answers)
    }

    /// Ask `provider` directly. Failures are logged and yield no records.
    pub async fn resolve(
        &self,
        name: &str,
        rtype: DNSResourceType,
        provider: &DohProvider,
    ) -> Vec<DNSResource> {
        match self.fetch(name, rtype, provider).await {
            Ok(answers) => answers,
            Err(DohError::Status(status)) => {
                error!(
                    "Cannot find the domain, provider: {}, status: {}",
                    provider.name, status
                );
                Vec::new()
            }
            Err(e) => {
                error!("DoH lookup of {} via {} failed: {}", name, provider.name, e);
                Vec::new()
            }
        }
    }

    /// Resolve through the cache unless `use_cache` is false
    pub async fn query(
        &self,
        fqdn: &str,
        rtype: DNSResourceType,
        provider: &DohProvider,
        use_cache: bool,
    ) -> Vec<DNSResource> {
        if !use_cache {
            return self.resolve(fqdn, rtype, provider).await;
        }

        let start = Instant::now();
        let key = format!("{}.{:?}", fqdn, rtype);
        let _guard = self.lock.acquire(&key).await;

        let cache_key = CacheKey::new(fqdn, rtype, provider.name);
        if let Some(entries) = self.cache.get(&cache_key) {
            let now = now_millis();
            let records: Vec<DNSResource> = entries.iter().map(|e| e.record_at(now)).collect();
            log_query(&key, start, true, &records);
            return records;
        }

        let answers = self.resolve(fqdn, rtype, provider).await;
        let now = now_millis();
        let records: Vec<DNSResource> = self
            .cache
            .persist_at(cache_key, answers, now)
            .iter()
            .map(|e| e.record_at(now))
            .collect();
        log_query(&key, start, false, &records);
        records
    }

    /// Drop expired cache entries; returns `(removed, before)`
    pub fn clear_expired(&self) -> (usize, usize) {
        self.cache.clear_expired_at(now_millis())
    }
}

fn log_query(key: &str, start: Instant, hit: bool, records: &[DNSResource]) {
    let data: Vec<String> = records.iter().map(|r| r.rdata.primary_text()).collect();
    info!(
        "{} {}ms {} {:?}",
        key,
        start.elapsed().as_millis(),
        if hit { "HIT" } else { "MISS" },
        data
    );
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::dns::enums::DNSResourceClass;
    use crate::dns::resource::DNSResourceData;
    use async_trait::async_trait;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Answers every A query with one record after a short delay
    pub(crate) struct MockTransport {
        pub calls: AtomicUsize,
        pub status: u16,
        pub ttl: u32,
        pub delay: Duration,
    }

    impl MockTransport {
        pub(crate) fn new(ttl: u32) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                status: 200,
                ttl,
                delay: Duration::from_millis(20),
            }
        }
    }

    #[async_trait]
    impl DohTransport for MockTransport {
        async fn get(&self, _provider: &DohProvider, url: &str) -> Result<DohResponse, DohError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;

            let encoded = url.split("?dns=").nth(1).unwrap_or_default();
            let raw = URL_SAFE_NO_PAD.decode(encoded).unwrap();
            let query = DNSPacket::parse(&raw)?;
            let mut response = query.generate_response();
            response.answers.push(DNSResource::new(
                &query.questions[0].name(),
                DNSResourceClass::IN,
                self.ttl,
                DNSResourceData::A(Ipv4Addr::new(93, 184, 216, 34)),
            ));
            Ok(DohResponse {
                status: self.status,
                body: response.serialize()?,
            })
        }
    }

    fn provider() -> &'static DohProvider {
        DohProvider::by_name("google").unwrap()
    }

    #[test]
    fn test_encoded_query_is_unpadded_base64url() {
        let encoded = DohResolver::encode_query("example.com", DNSResourceType::A).unwrap();
        assert!(!encoded.contains('='));
        assert!(!encoded.contains('+') && !encoded.contains('/'));

        let packet = DNSPacket::parse(&URL_SAFE_NO_PAD.decode(&encoded).unwrap()).unwrap();
        assert_eq!(packet.questions[0].name(), "example.com");
        assert_eq!(packet.questions[0].qtype, DNSResourceType::A);
        assert!(packet.header.rd);
    }

    #[tokio::test]
    async fn test_concurrent_queries_are_coalesced() {
        let transport = Arc::new(MockTransport::new(300));
        let resolver = Arc::new(DohResolver::new(transport.clone()));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let resolver = resolver.clone();
            handles.push(tokio::spawn(async move {
                resolver
                    .query("example.com", DNSResourceType::A, provider(), true)
                    .await
            }));
        }
        for handle in handles {
            let records = handle.await.unwrap();
            assert_eq!(records.len(), 1);
            assert!(records[0].ttl <= 300);
        }

        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_cached_ttl_is_capped() {
        let transport = Arc::new(MockTransport::new(86_400));
        let resolver = DohResolver::new(transport.clone());

        let first = resolver
            .query("big.example.com", DNSResourceType::A, provider(), true)
            .await;
        assert_eq!(first[0].ttl, MAX_CACHE_TTL);

        let second = resolver
            .query("big.example.com", DNSResourceType::A, provider(), true)
            .await;
        assert!(second[0].ttl <= MAX_CACHE_TTL);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_swept_entry_is_fetched_again() {
        let transport = Arc::new(MockTransport::new(86_400));
        let resolver = DohResolver::new(transport.clone());

        resolver
            .query("sweep.example.com", DNSResourceType::A, provider(), true)
            .await;
        let (removed, _) = resolver
            .cache()
            .clear_expired_at(now_millis() + 2_500_001);
        assert_eq!(removed, 1);
        assert!(resolver.cache().is_empty());

        let again = resolver
            .query("sweep.example.com", DNSResourceType::A, provider(), true)
            .await;
        assert_eq!(again.len(), 1);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_uncached_query_always_fetches() {
        let transport = Arc::new(MockTransport::new(60));
        let resolver = DohResolver::new(transport.clone());

        for _ in 0..2 {
            let records = resolver
                .query("example.com", DNSResourceType::A, provider(), false)
                .await;
            assert_eq!(records[0].ttl, 60);
        }
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
        assert!(resolver.cache().is_empty());
    }

    #[tokio::test]
    async fn test_error_status_yields_empty() {
        let mut mock = MockTransport::new(60);
        mock.status = 503;
        let transport = Arc::new(mock);
        let resolver = DohResolver::new(transport.clone());

        let records = resolver
            .query("down.example.com", DNSResourceType::A, provider(), true)
            .await;
        assert!(records.is_empty());
        assert!(resolver.cache().is_empty());

        // nothing cached, so the next query tries again
        resolver
            .query("down.example.com", DNSResourceType::A, provider(), true)
            .await;
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }
}
