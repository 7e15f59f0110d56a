use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use ddns_agent::config::{AgentConfig, BindAddress};
use ddns_agent::doh::DohProvider;
use ddns_agent::source::{FileRecordSource, RecordSource, StaticRecordSource};
use ddns_agent::Agent;
use ddns_agent::agent::log_stats_events;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Split-horizon authoritative DNS agent with DoH forwarding
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// UDP port for every listener
    #[arg(short, long)]
    port: Option<u16>,

    /// Extra listen address, `addr` or `addr=proxy` (repeatable)
    #[arg(short, long = "bind")]
    bind: Vec<BindAddress>,

    /// JSON file holding the record set
    #[arg(short, long)]
    records: Option<PathBuf>,

    /// DoH provider for forwarded queries (google, cloudflare, cleanbrowsing)
    #[arg(long)]
    provider: Option<String>,

    /// Forward without the upstream cache
    #[arg(long)]
    no_upstream_cache: bool,

    /// Stats interval in seconds
    #[arg(long)]
    stats_interval: Option<u64>,

    /// Upstream cache sweep interval in seconds
    #[arg(long)]
    sweep_interval: Option<u64>,

    /// Upstream cache snapshot file
    #[arg(long)]
    cache_file: Option<PathBuf>,

    /// Log every answered query
    #[arg(short, long)]
    query_log: bool,
}

impl Args {
    fn apply(self, config: &mut AgentConfig) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(port) = self.port {
            config.port = port;
        }
        if !self.bind.is_empty() {
            config.bind_addrs = self.bind;
        }
        if self.records.is_some() {
            config.records_file = self.records;
        }
        if let Some(provider) = self.provider {
            config.provider = DohProvider::lookup(&provider)?;
        }
        if self.no_upstream_cache {
            config.upstream_cache = false;
        }
        if let Some(secs) = self.stats_interval {
            config.stats_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.sweep_interval {
            config.sweep_interval = Duration::from_secs(secs);
        }
        if self.cache_file.is_some() {
            config.cache_file = self.cache_file;
        }
        if self.query_log {
            config.query_log = true;
        }
        config.validate()?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = AgentConfig::from_env()?;
    args.apply(&mut config)?;

    let source: Arc<dyn RecordSource> = match &config.records_file {
        Some(path) => Arc::new(FileRecordSource::new(path)),
        None => {
            warn!("No records file configured; serving bootstrap records only");
            Arc::new(StaticRecordSource::default())
        }
    };

    info!(
        "Starting agent on port {} with provider {}",
        config.port,
        config.provider_name()
    );
    let agent = Agent::with_https(config, source)?;

    tokio::spawn(log_stats_events(agent.subscribe()));

    agent.start(None).await;

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down");
    agent.shutdown().await;

    Ok(())
}
