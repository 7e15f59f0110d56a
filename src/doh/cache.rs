use std::path::Path;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::dns::common::name_to_labels;
use crate::dns::enums::{DNSResourceClass, DNSResourceType};
use crate::dns::resource::{DNSResource, DNSResourceData};

/// Upper bound on how long an upstream answer is kept, in seconds
pub const MAX_CACHE_TTL: u32 = 2500;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub fqdn: String,
    pub rtype: DNSResourceType,
    pub provider: String,
}

impl CacheKey {
    pub fn new(fqdn: &str, rtype: DNSResourceType, provider: &str) -> Self {
        Self {
            fqdn: fqdn.to_ascii_lowercase(),
            rtype,
            provider: provider.to_string(),
        }
    }
}

/// One upstream answer record with its absolute expiry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpstreamCacheEntry {
    pub record: DNSResource,
    /// TTL at insertion, already clamped
    pub ttl: u32,
    /// Expiry in milliseconds since the epoch
    pub expires: i64,
    pub created: i64,
}

impl UpstreamCacheEntry {
    pub fn new(record: DNSResource, now: i64) -> Self {
        let ttl = record.ttl.min(MAX_CACHE_TTL);
        Self {
            record,
            ttl,
            expires: now + i64::from(ttl) * 1000,
            created: now,
        }
    }

    /// Seconds left at `now`, rounded up and never negative
    pub fn remaining_ttl(&self, now: i64) -> u32 {
        let left = self.expires - now;
        if left <= 0 {
            return 0;
        }
        u32::try_from((left + 999) / 1000).unwrap_or(u32::MAX)
    }

    /// The record as it should be served at `now`
    pub fn record_at(&self, now: i64) -> DNSResource {
        let mut record = self.record.clone();
        record.ttl = self.remaining_ttl(now);
        record
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expires <= now
    }
}

/// Answers from DoH providers keyed by `(fqdn, type, provider)`
#[derive(Debug, Default)]
pub struct UpstreamCache {
    entries: DashMap<CacheKey, Vec<UpstreamCacheEntry>>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotEntry {
    fqdn: String,
    provider: String,
    qtype: u16,
    name: String,
    rtype: u16,
    rclass: u16,
    ttl: u32,
    rdata: Vec<u8>,
    expires: i64,
    created: i64,
}

#[derive(Serialize, Deserialize)]
struct CacheSnapshot {
    version: u32,
    saved_at: i64,
    entries: Vec<SnapshotEntry>,
}

impl UpstreamCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached records for `key`, regardless of expiry
    pub fn get(&self, key: &CacheKey) -> Option<Vec<UpstreamCacheEntry>> {
        self.entries
            .get(key)
            .map(|e| e.value().clone())
            .filter(|v| !v.is_empty())
    }

    /// Store `records` under `key`; returns the stored entries
    pub fn persist_at(&self, key: CacheKey, records: Vec<DNSResource>, now: i64) -> Vec<UpstreamCacheEntry> {
        let stored: Vec<UpstreamCacheEntry> = records
            .into_iter()
            .map(|r| UpstreamCacheEntry::new(r, now))
            .collect();
        if !stored.is_empty() {
            self.entries
                .entry(key)
                .or_default()
                .extend(stored.iter().cloned());
        }
        stored
    }

    /// Remove entries with `expires <= now`; returns `(removed, before)`
    pub fn clear_expired_at(&self, now: i64) -> (usize, usize) {
        // Counted per key; inserts may race the sweep
        let mut before = 0;
        let mut removed = 0;
        self.entries.retain(|_, list| {
            let held = list.len();
            list.retain(|e| !e.is_expired(now));
            before += held;
            removed += held - list.len();
            !list.is_empty()
        });
        if removed > 0 {
            info!("Expired records. Removed {} of {}", removed, before);
        }
        (removed, before)
    }

    /// Number of cached records
    pub fn len(&self) -> usize {
        self.entries.iter().map(|e| e.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write all unexpired entries to `path` as JSON
    pub async fn save_to_file(
        &self,
        path: &Path,
        now: i64,
    ) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        let mut entries = Vec::new();
        for item in self.entries.iter() {
            let key = item.key();
            for entry in item.value().iter().filter(|e| !e.is_expired(now)) {
                entries.push(SnapshotEntry {
                    fqdn: key.fqdn.clone(),
                    provider: key.provider.clone(),
                    qtype: key.rtype.into(),
                    name: entry.record.name(),
                    rtype: entry.record.rtype.into(),
                    rclass: entry.record.rclass.into(),
                    ttl: entry.ttl,
                    rdata: entry.record.rdata.to_bytes()?,
                    expires: entry.expires,
                    created: entry.created,
                });
            }
        }

        let count = entries.len();
        let snapshot = CacheSnapshot {
            version: 1,
            saved_at: now,
            entries,
        };
        let data = serde_json::to_vec(&snapshot)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        // Write to a temporary file, then rename over the target
        let temp = path.with_extension("tmp");
        fs::write(&temp, &data).await?;
        fs::rename(&temp, path).await?;

        debug!("Saved {} upstream cache entries to {}", count, path.display());
        Ok(count)
    }

    /// Load entries from `path`, dropping those already expired at `now`
    pub async fn load_from_file(
        &self,
        path: &Path,
        now: i64,
    ) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        if !fs::try_exists(path).await? {
            debug!("Cache file {} does not exist, starting empty", path.display());
            return Ok(0);
        }

        let data = fs::read(path).await?;
        let snapshot: CacheSnapshot = serde_json::from_slice(&data)?;

        let mut loaded = 0;
        for saved in snapshot.entries {
            if saved.expires <= now {
                continue;
            }
            let rtype = DNSResourceType::from(saved.rtype);
            let rdata = match DNSResourceData::parse(rtype, &saved.rdata, &saved.rdata) {
                Ok(rdata) => rdata,
                Err(e) => {
                    warn!("Skipping unreadable cache entry for {}: {}", saved.name, e);
                    continue;
                }
            };
            let record = DNSResource {
                labels: name_to_labels(&saved.name),
                rtype,
                rclass: DNSResourceClass::from(saved.rclass),
                ttl: saved.ttl,
                rdata,
            };
            let key = CacheKey::new(&saved.fqdn, DNSResourceType::from(saved.qtype), &saved.provider);
            self.entries.entry(key).or_default().push(UpstreamCacheEntry {
                record,
                ttl: saved.ttl,
                expires: saved.expires,
                created: saved.created,
            });
            loaded += 1;
        }

        info!("Loaded {} upstream cache entries from {}", loaded, path.display());
        Ok(loaded)
    }
}
