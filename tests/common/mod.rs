//! Shared helpers for the integration tests

#![allow(dead_code)] // Not every test file uses every helper

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ddns_agent::{
    config::AgentConfig,
    dns::{
        DNSPacket,
        enums::{DNSResourceClass, DNSResourceType},
        question::DNSQuestion,
        resource::{DNSResource, DNSResourceData},
    },
    doh::{DohProvider, DohResolver, DohResponse, DohTransport},
    engine::Engine,
    error::DohError,
    psl::SuffixList,
    zone::record::{RecordType, ResourceRecord},
};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// Address every fake upstream answer points at
pub const UPSTREAM_ADDR: Ipv4Addr = Ipv4Addr::new(93, 184, 216, 34);

/// DoH transport that answers A queries locally and counts requests
#[derive(Default)]
pub struct FakeUpstream {
    calls: AtomicUsize,
}

impl FakeUpstream {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DohTransport for FakeUpstream {
    async fn get(&self, _provider: &DohProvider, url: &str) -> Result<DohResponse, DohError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let encoded = url.split("?dns=").nth(1).unwrap_or_default();
        let query = DNSPacket::parse(&URL_SAFE_NO_PAD.decode(encoded).unwrap())?;

        let mut response = query.generate_response();
        response.answers.push(DNSResource::new(
            &query.questions[0].name(),
            DNSResourceClass::IN,
            60,
            DNSResourceData::A(UPSTREAM_ADDR),
        ));
        Ok(DohResponse {
            status: 200,
            body: response.serialize()?,
        })
    }
}

/// A small owned zone with split-horizon and wildcard records
pub fn example_zone() -> Vec<ResourceRecord> {
    let mut soa = ResourceRecord::new("soa", "example.com", RecordType::SOA, "");
    soa.admin = Some("hostmaster@example.com".into());
    soa.serial = Some(1);
    vec![
        soa,
        ResourceRecord::new("ns1", "example.com", RecordType::NS, "ns1.example.com"),
        ResourceRecord::new("www", "www.example.com", RecordType::A, "203.0.113.10"),
        ResourceRecord::new("www6", "www.example.com", RecordType::AAAA, "2001:db8::10"),
        ResourceRecord::new("lan", "nas.example.com", RecordType::A, "10.0.0.5")
            .with_network("10.0.0.0/24"),
        ResourceRecord::new("wild", "*.dev.example.com", RecordType::A, "203.0.113.30"),
        ResourceRecord::new("alias", "blog.example.com", RecordType::CNAME, "www.example.com"),
    ]
}

pub fn test_engine(records: Vec<ResourceRecord>) -> (Arc<Engine>, Arc<FakeUpstream>) {
    let upstream = Arc::new(FakeUpstream::default());
    let doh = Arc::new(DohResolver::new(upstream.clone()));
    let engine = Arc::new(Engine::new(
        &AgentConfig::default(),
        Arc::new(SuffixList::bundled()),
        doh,
    ));
    engine.replace_index(records);
    (engine, upstream)
}

pub fn query_bytes(id: u16, name: &str, qtype: DNSResourceType) -> Vec<u8> {
    DNSPacket::query(id, DNSQuestion::new(name, qtype))
        .serialize()
        .unwrap()
}

/// Send one query and wait briefly for the reply
pub async fn exchange(server: SocketAddr, request: &[u8]) -> Option<DNSPacket> {
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(request, server).await.unwrap();

    let mut buf = vec![0u8; 4096];
    match timeout(Duration::from_millis(500), client.recv_from(&mut buf)).await {
        Ok(Ok((len, _))) => Some(DNSPacket::parse(&buf[..len]).unwrap()),
        _ => None,
    }
}
