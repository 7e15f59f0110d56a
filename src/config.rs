use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::doh::{DEFAULT_PROVIDER, DohProvider};
use crate::error::ConfigError;

/// An extra address to listen on; `proxy` marks its clients as trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindAddress {
    pub address: IpAddr,
    pub proxy: bool,
}

impl BindAddress {
    pub fn new(address: IpAddr, proxy: bool) -> Self {
        Self { address, proxy }
    }
}

impl FromStr for BindAddress {
    type Err = ConfigError;

    /// `addr` or `addr=proxy`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (addr, proxy) = match s.split_once('=') {
            Some((addr, flag)) if flag.trim().eq_ignore_ascii_case("proxy") => (addr, true),
            Some(_) => return Err(ConfigError::InvalidBindAddress(s.to_string())),
            None => (s, false),
        };
        let address = addr
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(s.to_string()))?;
        Ok(Self { address, proxy })
    }
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// UDP port every listener binds
    pub port: u16,

    /// Listen addresses in addition to the loopback pair
    pub bind_addrs: Vec<BindAddress>,

    /// JSON record file used as the record source
    pub records_file: Option<PathBuf>,

    /// DoH provider used for forwarded queries
    pub provider: &'static DohProvider,

    /// Whether forwarded queries go through the upstream cache
    pub upstream_cache: bool,

    /// Timeout for a single DoH request
    pub upstream_timeout: Duration,

    /// How often stats are flushed and emitted
    pub stats_interval: Duration,

    /// How often expired upstream cache entries are removed
    pub sweep_interval: Duration,

    /// Upstream cache snapshot (None = no persistence)
    pub cache_file: Option<PathBuf>,

    /// Log every answered query at info level
    pub query_log: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            port: 53,
            bind_addrs: Vec::new(),
            records_file: None,
            provider: &crate::doh::PROVIDERS[1],
            upstream_cache: true,
            upstream_timeout: Duration::from_secs(5),
            stats_interval: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(60),
            cache_file: None,
            query_log: false,
        }
    }
}

impl AgentConfig {
    /// Create an AgentConfig from `DDNS_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup, defaults for absent keys
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(port) = lookup("DDNS_PORT") {
            config.port = port
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort(port.clone()))?;
        }

        if let Some(addrs) = lookup("DDNS_BIND_ADDRS") {
            config.bind_addrs = addrs
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(BindAddress::from_str)
                .collect::<Result<_, _>>()?;
        }

        if let Some(path) = lookup("DDNS_RECORDS_FILE").filter(|p| !p.is_empty()) {
            config.records_file = Some(PathBuf::from(path));
        }

        if let Some(provider) = lookup("DDNS_PROVIDER") {
            config.provider = DohProvider::lookup(provider.trim())?;
        }

        if let Some(cache) = lookup("DDNS_UPSTREAM_CACHE") {
            config.upstream_cache = parse_bool(&cache, true);
        }

        if let Some(timeout) = lookup("DDNS_UPSTREAM_TIMEOUT") {
            config.upstream_timeout = parse_secs(&timeout)
                .ok_or_else(|| ConfigError::InvalidTimeout(timeout.clone()))?;
        }

        if let Some(interval) = lookup("DDNS_STATS_INTERVAL") {
            config.stats_interval = parse_secs(&interval)
                .ok_or_else(|| ConfigError::InvalidInterval(interval.clone()))?;
        }

        if let Some(interval) = lookup("DDNS_SWEEP_INTERVAL") {
            config.sweep_interval = parse_secs(&interval)
                .ok_or_else(|| ConfigError::InvalidInterval(interval.clone()))?;
        }

        if let Some(path) = lookup("DDNS_CACHE_FILE").filter(|p| !p.is_empty()) {
            config.cache_file = Some(PathBuf::from(path));
        }

        if let Some(query_log) = lookup("DDNS_QUERY_LOG") {
            config.query_log = parse_bool(&query_log, false);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upstream_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "Timeout must be greater than 0".to_string(),
            ));
        }
        if self.upstream_timeout.as_secs() > 300 {
            return Err(ConfigError::InvalidTimeout(
                "Timeout too large (max 300 seconds)".to_string(),
            ));
        }
        if self.stats_interval.is_zero() || self.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidInterval(
                "Intervals must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name
    }
}

fn parse_secs(s: &str) -> Option<Duration> {
    s.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Parse a boolean from a string, with a default value for invalid input
fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => default,
    }
}
