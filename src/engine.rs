use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::AgentConfig;
use crate::dns::DNSPacket;
use crate::dns::question::DNSQuestion;
use crate::dns::resource::DNSResource;
use crate::doh::{DohProvider, DohResolver, bootstrap_records};
use crate::psl::PublicSuffix;
use crate::stats::{Stats, StatsSnapshot};
use crate::zone::index::ZoneIndex;
use crate::zone::record::{ChangeEvent, RecordType, ResourceRecord};
use crate::zone::walker::Walker;

/// Sections produced for one question
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub answers: Vec<DNSResource>,
    pub authorities: Vec<DNSResource>,
    pub authoritative: bool,
}

/// Query pipeline shared by every listener
pub struct Engine {
    index: RwLock<ZoneIndex>,
    suffixes: Arc<dyn PublicSuffix>,
    doh: Arc<DohResolver>,
    stats: Stats,
    provider: &'static DohProvider,
    upstream_cache: bool,
    logging: AtomicBool,
}

impl Engine {
    pub fn new(config: &AgentConfig, suffixes: Arc<dyn PublicSuffix>, doh: Arc<DohResolver>) -> Self {
        Self {
            index: RwLock::new(ZoneIndex::from_records(bootstrap_records())),
            suffixes,
            doh,
            stats: Stats::new(),
            provider: config.provider,
            upstream_cache: config.upstream_cache,
            logging: AtomicBool::new(config.query_log),
        }
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn doh(&self) -> &Arc<DohResolver> {
        &self.doh
    }

    pub fn set_logging(&self, enabled: bool) {
        info!("Query logging {}", if enabled { "enabled" } else { "disabled" });
        self.logging.store(enabled, Ordering::Relaxed);
    }

    pub fn logging(&self) -> bool {
        self.logging.load(Ordering::Relaxed)
    }

    /// Apply one incremental change from the record source
    pub fn apply(&self, event: ChangeEvent) {
        match event {
            ChangeEvent::Created(record) => {
                debug!("Adding {} {} ({})", record.rtype, record.fqdn, record.id);
                self.index.write().insert(record);
            }
            ChangeEvent::Removed {
                id,
                fqdn,
                rtype,
                network,
            } => {
                let removed = self
                    .index
                    .write()
                    .remove(&id, &fqdn, rtype, network.as_deref());
                if !removed {
                    debug!("No record {} under {} {}", id, rtype, fqdn);
                }
            }
        }
    }

    /// Swap in a fresh index built from a full record set plus the
    /// provider bootstrap records; returns the number of entries
    pub fn replace_index(&self, records: Vec<ResourceRecord>) -> usize {
        let mut index = ZoneIndex::from_records(bootstrap_records());
        for record in records {
            index.insert(record);
        }
        let entries = index.len();
        *self.index.write() = index;
        entries
    }

    /// Number of zone entries
    pub fn entries(&self) -> usize {
        self.index.read().len()
    }

    pub fn flush_stats(&self) -> StatsSnapshot {
        let index = self.index.read();
        self.stats.flush(&index)
    }

    /// Resolve one question. `None` means the type is not served and the
    /// request gets no response at all.
    pub async fn on_query(
        &self,
        question: &DNSQuestion,
        source: IpAddr,
        trusted: bool,
    ) -> Option<Resolution> {
        let name = question.name().to_lowercase().replacen('*', "", 1);
        let rtype = match RecordType::try_from(question.qtype) {
            Ok(rtype) => rtype,
            Err(qtype) => {
                error!("Unsupported record type {:?} {} {}", qtype, name, source);
                return None;
            }
        };

        let authoritative = {
            let index = self.index.read();
            let walker = Walker::new(&index, self.suffixes.as_ref());
            let authoritative = walker.is_auth(&name);

            let records = match walker.walk_records(&name, rtype, source) {
                Some(records) => records,
                None => {
                    return Some(Resolution {
                        authoritative,
                        ..Default::default()
                    });
                }
            };

            if !records.is_empty() {
                let answers = records
                    .iter()
                    .filter(|r| !r.is_suppressed())
                    .filter_map(|r| walker.record_to_answer(r, &name, question.qclass))
                    .collect();
                let authorities = if authoritative && rtype == RecordType::SOA {
                    walker.get_nameserver(&name)
                } else {
                    Vec::new()
                };
                return Some(Resolution {
                    answers,
                    authorities,
                    authoritative,
                });
            }
            authoritative
        };

        let mut resolution = Resolution {
            authoritative,
            ..Default::default()
        };
        if !authoritative && (trusted || source == IpAddr::V4(Ipv4Addr::LOCALHOST)) {
            self.stats.record_proxy();
            resolution.answers = self
                .doh
                .query(&name, question.qtype, self.provider, self.upstream_cache)
                .await
                .into_iter()
                .map(|mut record| {
                    record.rclass = question.qclass;
                    record
                })
                .collect();
        }
        Some(resolution)
    }

    /// Handle one inbound datagram; returns the serialized response, if any
    pub async fn handle_datagram(&self, buf: &[u8], src: SocketAddr, trusted: bool) -> Option<Vec<u8>> {
        self.stats.record_query();

        let request = match DNSPacket::parse(buf) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("Failed to parse packet from {}: {}", src, e);
                self.stats.record_error();
                return None;
            }
        };
        let Some(question) = request.questions.first() else {
            self.stats.record_error();
            return None;
        };

        let Some(resolution) = self.on_query(question, src.ip(), trusted).await else {
            self.stats.record_miss();
            return None;
        };

        let mut response = request.generate_response();
        response.header.aa = resolution.authoritative;
        response.header.ra = trusted;
        if resolution.answers.is_empty() {
            self.stats.record_miss();
        }
        response.answers = resolution.answers;
        response.authorities = resolution.authorities;

        if self.logging() {
            info!(
                "{} {} {:?} {:?} {} {} {}",
                src,
                question.name(),
                question.qtype,
                question.qclass,
                response.answers.len(),
                response.authorities.len(),
                response.resources.len()
            );
        }

        match response.serialize() {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!("Failed to serialize response for {}: {}", question.name(), e);
                self.stats.record_error();
                None
            }
        }
    }
}
