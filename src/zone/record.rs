use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dns::enums::DNSResourceType;

/// Default TTL for records that do not carry one
pub const DEFAULT_TTL: u32 = 99;

/// Default record priority; `-1` marks a suppressed record
pub const DEFAULT_PRIORITY: i32 = 5;

/// Priority value that keeps a record out of every answer
pub const SUPPRESSED_PRIORITY: i32 = -1;

/// The record kinds the agent stores and serves
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordType {
    A,
    AAAA,
    CNAME,
    SOA,
    MX,
    NS,
    TXT,
    CAA,
}

impl RecordType {
    pub const ALL: [RecordType; 8] = [
        RecordType::A,
        RecordType::AAAA,
        RecordType::CNAME,
        RecordType::SOA,
        RecordType::MX,
        RecordType::NS,
        RecordType::TXT,
        RecordType::CAA,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::AAAA => "AAAA",
            RecordType::CNAME => "CNAME",
            RecordType::SOA => "SOA",
            RecordType::MX => "MX",
            RecordType::NS => "NS",
            RecordType::TXT => "TXT",
            RecordType::CAA => "CAA",
        }
    }

    pub fn wire_type(&self) -> DNSResourceType {
        match self {
            RecordType::A => DNSResourceType::A,
            RecordType::AAAA => DNSResourceType::AAAA,
            RecordType::CNAME => DNSResourceType::CNAME,
            RecordType::SOA => DNSResourceType::SOA,
            RecordType::MX => DNSResourceType::MX,
            RecordType::NS => DNSResourceType::NS,
            RecordType::TXT => DNSResourceType::TXT,
            RecordType::CAA => DNSResourceType::CAA,
        }
    }

    /// Address types follow CNAME indirection
    pub fn is_address(&self) -> bool {
        matches!(self, RecordType::A | RecordType::AAAA)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unsupported record type: {}", s))
    }
}

impl TryFrom<DNSResourceType> for RecordType {
    type Error = DNSResourceType;

    fn try_from(value: DNSResourceType) -> Result<Self, Self::Error> {
        match value {
            DNSResourceType::A => Ok(RecordType::A),
            DNSResourceType::AAAA => Ok(RecordType::AAAA),
            DNSResourceType::CNAME => Ok(RecordType::CNAME),
            DNSResourceType::SOA => Ok(RecordType::SOA),
            DNSResourceType::MX => Ok(RecordType::MX),
            DNSResourceType::NS => Ok(RecordType::NS),
            DNSResourceType::TXT => Ok(RecordType::TXT),
            DNSResourceType::CAA => Ok(RecordType::CAA),
            other => Err(other),
        }
    }
}

/// A single stored record as delivered by the record source
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    #[serde(default)]
    pub id: String,
    pub fqdn: String,
    #[serde(rename = "type")]
    pub rtype: RecordType,
    #[serde(default)]
    pub data: String,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,

    // CAA
    #[serde(default)]
    pub flag: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    // SOA
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<String>,
}

fn default_ttl() -> u32 {
    DEFAULT_TTL
}

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

impl ResourceRecord {
    pub fn new(
        id: impl Into<String>,
        fqdn: impl Into<String>,
        rtype: RecordType,
        data: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            fqdn: fqdn.into(),
            rtype,
            data: data.into(),
            ttl: DEFAULT_TTL,
            priority: DEFAULT_PRIORITY,
            network: None,
            flag: 0,
            tag: None,
            admin: None,
            serial: None,
            refresh: None,
            retry: None,
            expiration: None,
            minimum: None,
            primary: None,
        }
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// The subnet this record is scoped to; an empty string counts as none
    pub fn network(&self) -> Option<&str> {
        self.network.as_deref().filter(|n| !n.is_empty())
    }

    pub fn is_suppressed(&self) -> bool {
        self.priority == SUPPRESSED_PRIORITY
    }
}

/// Incremental update pushed by the record source
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeEvent {
    Created(ResourceRecord),
    Removed {
        id: String,
        fqdn: String,
        rtype: RecordType,
        network: Option<String>,
    },
}

impl ChangeEvent {
    pub fn removed(record: &ResourceRecord) -> Self {
        ChangeEvent::Removed {
            id: record.id.clone(),
            fqdn: record.fqdn.clone(),
            rtype: record.rtype,
            network: record.network.clone(),
        }
    }
}

/// Lower-case a name and drop the trailing root dot
pub fn normalize_name(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}
