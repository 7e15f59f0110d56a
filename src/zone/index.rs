use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use super::record::{RecordType, ResourceRecord, normalize_name};
use super::subnet::Subnet;

/// Records scoped to one client network
#[derive(Debug)]
pub struct NetworkRecords {
    pub network: String,
    subnet: Option<Subnet>,
    pub records: Vec<ResourceRecord>,
}

impl NetworkRecords {
    fn matches(&self, source: IpAddr) -> bool {
        self.subnet.is_some_and(|s| s.contains(source))
    }
}

/// All records sharing one record type and FQDN
#[derive(Debug, Default)]
pub struct ZoneEntry {
    pub records: Vec<ResourceRecord>,
    /// Subnet-scoped records in insertion order
    pub networks: Vec<NetworkRecords>,
    hits: AtomicU64,
    total_hits: AtomicU64,
}

impl ZoneEntry {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.networks.is_empty()
    }

    /// Records of the first subnet (in insertion order) containing `source`
    pub fn network_records(&self, source: IpAddr) -> Option<&[ResourceRecord]> {
        self.networks
            .iter()
            .find(|n| n.matches(source))
            .map(|n| n.records.as_slice())
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn total_hits(&self) -> u64 {
        self.total_hits.load(Ordering::Relaxed)
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Move the per-cycle hit count into the lifetime total
    fn flush_hits(&self) -> u64 {
        let hits = self.hits.swap(0, Ordering::Relaxed);
        self.total_hits.fetch_add(hits, Ordering::Relaxed);
        hits
    }

    fn network_mut(&mut self, network: &str) -> Option<&mut NetworkRecords> {
        self.networks.iter_mut().find(|n| n.network == network)
    }
}

/// Record type -> FQDN -> zone entry
#[derive(Debug)]
pub struct ZoneIndex {
    maps: HashMap<RecordType, HashMap<String, ZoneEntry>>,
}

impl Default for ZoneIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl ZoneIndex {
    pub fn new() -> Self {
        let maps = RecordType::ALL
            .into_iter()
            .map(|rtype| (rtype, HashMap::new()))
            .collect();
        Self { maps }
    }

    /// Build an index from a full record set
    pub fn from_records(records: impl IntoIterator<Item = ResourceRecord>) -> Self {
        let mut index = Self::new();
        for record in records {
            index.insert(record);
        }
        index
    }

    pub fn insert(&mut self, record: ResourceRecord) {
        let fqdn = normalize_name(&record.fqdn);
        let entry = self
            .maps
            .entry(record.rtype)
            .or_default()
            .entry(fqdn)
            .or_default();

        match record.network() {
            Some(network) => {
                let network = network.to_string();
                match entry.network_mut(&network) {
                    Some(scoped) => scoped.records.push(record),
                    None => {
                        let subnet = Subnet::parse(&network);
                        if subnet.is_none() {
                            warn!("Record {} has unusable network {}", record.id, network);
                        }
                        entry.networks.push(NetworkRecords {
                            network,
                            subnet,
                            records: vec![record],
                        });
                    }
                }
            }
            None => entry.records.push(record),
        }
    }

    /// Remove the first record with `id`; returns whether one was removed
    pub fn remove(
        &mut self,
        id: &str,
        fqdn: &str,
        rtype: RecordType,
        network: Option<&str>,
    ) -> bool {
        let fqdn = normalize_name(fqdn);
        let Some(map) = self.maps.get_mut(&rtype) else {
            return false;
        };
        let Some(entry) = map.get_mut(&fqdn) else {
            return false;
        };

        let mut removed = false;
        match network.filter(|n| !n.is_empty()) {
            None => {
                if let Some(pos) = entry.records.iter().position(|r| r.id == id) {
                    entry.records.remove(pos);
                    removed = true;
                }
            }
            Some(network) => {
                if let Some(scoped) = entry.network_mut(network) {
                    if let Some(pos) = scoped.records.iter().position(|r| r.id == id) {
                        scoped.records.remove(pos);
                        removed = true;
                    }
                }
                entry.networks.retain(|n| !n.records.is_empty());
            }
        }

        if entry.is_empty() {
            debug!("Dropping empty zone entry {} {}", rtype, fqdn);
            map.remove(&fqdn);
        }
        removed
    }

    pub fn get(&self, rtype: RecordType, fqdn: &str) -> Option<&ZoneEntry> {
        self.maps.get(&rtype)?.get(fqdn)
    }

    /// Split-horizon lookup: the first subnet containing `source` wins,
    /// otherwise the default records are returned.
    pub fn lookup(&self, rtype: RecordType, fqdn: &str, source: IpAddr) -> &[ResourceRecord] {
        let Some(entry) = self.get(rtype, fqdn) else {
            return &[];
        };
        entry.record_hit();
        entry
            .network_records(source)
            .unwrap_or(entry.records.as_slice())
    }

    /// Number of zone entries across all types
    pub fn len(&self) -> usize {
        self.maps.values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of zone entries per record type
    pub fn entries_by_type(&self) -> BTreeMap<RecordType, usize> {
        self.maps
            .iter()
            .map(|(rtype, map)| (*rtype, map.len()))
            .collect()
    }

    /// Flush every entry's hits into its total; returns hits per type
    pub fn flush_hits(&self) -> BTreeMap<RecordType, u64> {
        self.maps
            .iter()
            .map(|(rtype, map)| (*rtype, map.values().map(|e| e.flush_hits()).sum()))
            .collect()
    }
}
