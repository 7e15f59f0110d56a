use std::net::{IpAddr, Ipv4Addr};

use crate::error::ConfigError;
use crate::zone::record::{RecordType, ResourceRecord};

pub const DEFAULT_PROVIDER: &str = "cloudflare";

/// A DNS-over-HTTPS endpoint reachable at fixed addresses
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DohProvider {
    pub name: &'static str,
    pub domain: &'static str,
    pub path: &'static str,
    pub addresses: &'static [IpAddr],
}

const GOOGLE_ADDRS: &[IpAddr] = &[IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))];
const CLOUDFLARE_ADDRS: &[IpAddr] = &[
    IpAddr::V4(Ipv4Addr::new(104, 16, 249, 249)),
    IpAddr::V4(Ipv4Addr::new(104, 16, 248, 249)),
];
const CLEANBROWSING_ADDRS: &[IpAddr] = &[IpAddr::V4(Ipv4Addr::new(185, 228, 168, 10))];

pub const PROVIDERS: &[DohProvider] = &[
    DohProvider {
        name: "google",
        domain: "dns.google",
        path: "/dns-query",
        addresses: GOOGLE_ADDRS,
    },
    DohProvider {
        name: "cloudflare",
        domain: "cloudflare-dns.com",
        path: "/dns-query",
        addresses: CLOUDFLARE_ADDRS,
    },
    DohProvider {
        name: "cleanbrowsing",
        domain: "doh.cleanbrowsing.org",
        path: "/doh/family-filter",
        addresses: CLEANBROWSING_ADDRS,
    },
];

impl DohProvider {
    pub fn by_name(name: &str) -> Option<&'static DohProvider> {
        PROVIDERS.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn lookup(name: &str) -> Result<&'static DohProvider, ConfigError> {
        Self::by_name(name).ok_or_else(|| ConfigError::UnknownProvider(name.to_string()))
    }

    pub fn url(&self, encoded_query: &str) -> String {
        format!("https://{}{}?dns={}", self.domain, self.path, encoded_query)
    }
}

/// A records pointing every provider domain at its fixed addresses.
///
/// Seeded into the zone index so the agent can answer for its own upstreams.
pub fn bootstrap_records() -> Vec<ResourceRecord> {
    PROVIDERS
        .iter()
        .flat_map(|provider| {
            provider.addresses.iter().enumerate().filter_map(move |(i, addr)| {
                let IpAddr::V4(v4) = addr else {
                    return None;
                };
                Some(ResourceRecord::new(
                    format!("bootstrap-{}-{}", provider.name, i),
                    provider.domain,
                    RecordType::A,
                    v4.to_string(),
                ))
            })
        })
        .collect()
}
