use std::net::{Ipv4Addr, Ipv6Addr};

use tracing::warn;

use super::record::{RecordType, ResourceRecord};
use super::walker::Walker;
use crate::dns::enums::DNSResourceClass;
use crate::dns::resource::{DNSResource, DNSResourceData};

impl Walker<'_> {
    /// Encode a stored record as an answer owned by `name`.
    ///
    /// Returns `None` when the record data cannot be represented on the wire.
    pub fn record_to_answer(
        &self,
        record: &ResourceRecord,
        name: &str,
        qclass: DNSResourceClass,
    ) -> Option<DNSResource> {
        let rdata = match record.rtype {
            RecordType::A => match record.data.trim().parse::<Ipv4Addr>() {
                Ok(addr) => DNSResourceData::A(addr),
                Err(_) => {
                    warn!("Record {} has invalid A data {:?}", record.id, record.data);
                    return None;
                }
            },
            RecordType::AAAA => {
                let parsed = expand_ipv6(&record.data).and_then(|s| s.parse::<Ipv6Addr>().ok());
                match parsed {
                    Some(addr) => DNSResourceData::AAAA(addr),
                    None => {
                        warn!("Record {} has invalid AAAA data {:?}", record.id, record.data);
                        return None;
                    }
                }
            }
            RecordType::CNAME => DNSResourceData::CNAME(record.data.clone()),
            RecordType::NS => DNSResourceData::NS(record.data.clone()),
            RecordType::TXT => DNSResourceData::TXT(vec![record.data.clone()]),
            RecordType::MX => DNSResourceData::MX {
                preference: u16::try_from(record.priority).unwrap_or(0),
                exchange: record.data.clone(),
            },
            RecordType::CAA => DNSResourceData::CAA {
                flags: record.flag,
                tag: record.tag.clone().unwrap_or_default(),
                value: record.data.clone(),
            },
            RecordType::SOA => DNSResourceData::SOA {
                mname: self.soa_primary(record, name),
                rname: record.admin.as_deref().unwrap_or_default().replace('@', "."),
                serial: record.serial.unwrap_or(0),
                refresh: record.refresh.unwrap_or(0),
                retry: record.retry.unwrap_or(0),
                expire: record.expiration.unwrap_or(0),
                minimum: record.minimum.unwrap_or(0),
            },
        };

        Some(DNSResource::new(name, qclass, record.ttl, rdata))
    }

    fn soa_primary(&self, record: &ResourceRecord, name: &str) -> String {
        if let Some(primary) = record.primary.as_deref().filter(|p| !p.is_empty()) {
            return primary.to_string();
        }
        let first_ns = self
            .get_nameserver(name)
            .into_iter()
            .find_map(|answer| match answer.rdata {
                DNSResourceData::NS(ns) => Some(ns),
                _ => None,
            });
        first_ns
            .or_else(|| self.registrable(name))
            .unwrap_or_else(|| name.to_string())
    }
}

/// Expand an IPv6 address to eight colon-separated groups of four hex digits.
///
/// Handles `::` compression and a trailing embedded IPv4 address.
pub fn expand_ipv6(addr: &str) -> Option<String> {
    let addr = addr.trim();
    if addr.is_empty() {
        return None;
    }

    // Trailing dotted quad becomes two hex groups
    let mut text = addr.to_ascii_lowercase();
    if text.contains('.') {
        let split = text.rfind(':')?;
        let v4: Ipv4Addr = text[split + 1..].parse().ok()?;
        let o = v4.octets();
        text = format!(
            "{}{:02x}{:02x}:{:02x}{:02x}",
            &text[..=split],
            o[0],
            o[1],
            o[2],
            o[3]
        );
    }

    let groups: Vec<String> = match text.split_once("::") {
        Some((head, tail)) => {
            if tail.contains("::") {
                return None;
            }
            let head: Vec<&str> = head.split(':').filter(|g| !g.is_empty()).collect();
            let tail: Vec<&str> = tail.split(':').filter(|g| !g.is_empty()).collect();
            let present = head.len() + tail.len();
            if present > 7 {
                return None;
            }
            head.iter()
                .map(|g| g.to_string())
                .chain(std::iter::repeat_n("0".to_string(), 8 - present))
                .chain(tail.iter().map(|g| g.to_string()))
                .collect()
        }
        None => text.split(':').map(str::to_string).collect(),
    };

    if groups.len() != 8 {
        return None;
    }
    if groups
        .iter()
        .any(|g| g.is_empty() || g.len() > 4 || !g.bytes().all(|b| b.is_ascii_hexdigit()))
    {
        return None;
    }

    Some(
        groups
            .iter()
            .map(|g| format!("{:0>4}", g))
            .collect::<Vec<_>>()
            .join(":"),
    )
}
