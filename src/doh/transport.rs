use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HOST};
use tracing::debug;

use super::provider::{DohProvider, PROVIDERS};
use crate::error::DohError;

pub const DNS_MESSAGE: &str = "application/dns-message";

/// Raw HTTP response from a provider
#[derive(Debug, Clone)]
pub struct DohResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Fetches a DoH GET URL from a provider
#[async_trait]
pub trait DohTransport: Send + Sync {
    async fn get(&self, provider: &DohProvider, url: &str) -> Result<DohResponse, DohError>;
}

/// reqwest-backed transport with every provider domain pinned to its
/// fixed addresses, so no system resolver is consulted
#[derive(Debug, Clone)]
pub struct HttpsTransport {
    client: reqwest::Client,
}

impl HttpsTransport {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ddns-agent/", env!("CARGO_PKG_VERSION")));
        for provider in PROVIDERS {
            let addrs: Vec<SocketAddr> = provider
                .addresses
                .iter()
                .map(|ip| SocketAddr::new(*ip, 443))
                .collect();
            builder = builder.resolve_to_addrs(provider.domain, &addrs);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl DohTransport for HttpsTransport {
    async fn get(&self, provider: &DohProvider, url: &str) -> Result<DohResponse, DohError> {
        debug!("DoH GET {} via {}", url, provider.name);
        let response = self
            .client
            .get(url)
            .header(ACCEPT, DNS_MESSAGE)
            .header(CONTENT_TYPE, DNS_MESSAGE)
            .header(HOST, provider.domain)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        Ok(DohResponse { status, body })
    }
}
