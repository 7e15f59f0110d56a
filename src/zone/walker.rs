use std::net::IpAddr;

use tracing::warn;

use super::index::ZoneIndex;
use super::record::{RecordType, ResourceRecord, normalize_name};
use crate::dns::enums::DNSResourceClass;
use crate::dns::resource::DNSResource;
use crate::psl::PublicSuffix;

/// Names deeper than this are cut down before wildcard expansion
pub const MAX_LABELS: usize = 10;

/// CNAME links followed for A/AAAA questions
pub const MAX_CNAME_HOPS: usize = 2;

/// Candidate keys for a name, most specific first.
///
/// The full name comes first, then the wildcard form of every proper suffix
/// with at least two labels, then the bare `*`:
/// `a.b.example.com` gives `a.b.example.com`, `*.b.example.com`,
/// `*.example.com`, `*`.
pub fn domain_parts(fqdn: &str) -> Vec<String> {
    let mut parts: Vec<&str> = fqdn.split('.').collect();
    let mut result = vec![fqdn.to_string()];

    if parts.len() > MAX_LABELS {
        warn!("Abusive lookup {}", fqdn);
        parts.drain(..parts.len() - MAX_LABELS);
    }

    while parts.len() > 2 {
        parts.remove(0);
        result.push(format!("*.{}", parts.join(".")));
    }
    result.push("*".to_string());

    result
}

/// Read-only resolution over a borrowed zone index
pub struct Walker<'a> {
    pub(crate) index: &'a ZoneIndex,
    pub(crate) suffixes: &'a dyn PublicSuffix,
}

impl<'a> Walker<'a> {
    pub fn new(index: &'a ZoneIndex, suffixes: &'a dyn PublicSuffix) -> Self {
        Self { index, suffixes }
    }

    /// Registrable domain of `fqdn`, ignoring wildcard and leading `_` labels
    pub fn registrable(&self, fqdn: &str) -> Option<String> {
        let cleaned = fqdn.replacen('*', "", 1);
        let cleaned = cleaned.trim_start_matches('.').trim_start_matches('_');
        self.suffixes
            .registrable_domain(cleaned)
            .filter(|d| !d.is_empty())
    }

    /// Subnet-aware lookup of `(rtype, fqdn)`; address types fall back to
    /// the name's CNAME and append the target's records after it.
    pub fn get_records(&self, fqdn: &str, rtype: RecordType, source: IpAddr) -> Vec<ResourceRecord> {
        self.get_records_within(fqdn, rtype, source, 0)
    }

    fn get_records_within(
        &self,
        fqdn: &str,
        rtype: RecordType,
        source: IpAddr,
        hops: usize,
    ) -> Vec<ResourceRecord> {
        let direct = self.index.lookup(rtype, fqdn, source);
        if !direct.is_empty() {
            return direct.to_vec();
        }

        if rtype.is_address() && hops < MAX_CNAME_HOPS {
            let cnames = self.index.lookup(RecordType::CNAME, fqdn, source);
            if let Some(first) = cnames.first() {
                let target = normalize_name(&first.data);
                let mut records = cnames.to_vec();
                records.extend(self.get_records_within(&target, rtype, source, hops + 1));
                return records;
            }
        }

        Vec::new()
    }

    /// Walk the exact name and then its wildcard candidates.
    ///
    /// NS and SOA questions are answered from the registrable domain. Returns
    /// `None` when no name is left to look up.
    pub fn walk_records(
        &self,
        fqdn: &str,
        rtype: RecordType,
        source: IpAddr,
    ) -> Option<Vec<ResourceRecord>> {
        let name = match rtype {
            RecordType::NS | RecordType::SOA => self.registrable(fqdn)?,
            _ => fqdn.to_string(),
        };
        if name.is_empty() {
            return None;
        }

        for candidate in domain_parts(&name) {
            let records = self.get_records(&candidate, rtype, source);
            if !records.is_empty() {
                return Some(records);
            }
        }
        Some(Vec::new())
    }

    /// Whether an SOA exists for the registrable domain of `fqdn`
    pub fn is_auth(&self, fqdn: &str) -> bool {
        self.registrable(fqdn)
            .is_some_and(|domain| self.index.get(RecordType::SOA, &domain).is_some())
    }

    /// NS answers for the registrable domain of `fqdn`
    pub fn get_nameserver(&self, fqdn: &str) -> Vec<DNSResource> {
        let Some(domain) = self.registrable(fqdn) else {
            return Vec::new();
        };
        let Some(entry) = self.index.get(RecordType::NS, &domain) else {
            return Vec::new();
        };
        entry
            .records
            .iter()
            .filter_map(|record| self.record_to_answer(record, &domain, DNSResourceClass::IN))
            .collect()
    }
}
