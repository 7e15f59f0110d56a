use thiserror::Error;

use crate::dns::ParseError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid port: {0}")]
    InvalidPort(String),

    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("Unknown DoH provider: {0}")]
    UnknownProvider(String),

    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),
}

/// Failures of the external record source
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed record data: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Upstream DoH failures. These never leave the resolver; they are logged
/// and turned into an empty answer set.
#[derive(Error, Debug)]
pub enum DohError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Provider returned status {0}")]
    Status(u16),

    #[error("Failed to parse DNS packet: {0}")]
    Packet(#[from] ParseError),
}

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid listen address: {0}")]
    InvalidAddress(String),

    #[error("Record source error: {0}")]
    Source(#[from] SourceError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;
