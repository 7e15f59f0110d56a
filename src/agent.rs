//! Agent lifecycle: bootstrap, listeners, sync, timers and shutdown.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, interval_at};
use tracing::{debug, error, info, warn};

use crate::config::{AgentConfig, BindAddress};
use crate::doh::{DohResolver, DohTransport, HttpsTransport, now_millis};
use crate::engine::Engine;
use crate::error::Result;
use crate::listener::{ListenerInfo, ListenerManager};
use crate::psl::{PublicSuffix, SuffixList};
use crate::shutdown::Shutdown;
use crate::source::RecordSource;
use crate::stats::StatsSnapshot;
use crate::zone::record::ChangeEvent;

/// Lifecycle notifications for subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    Online,
    Offline,
    Stats(StatsSnapshot),
}

/// Log every stats snapshot at debug as JSON until the channel closes.
/// Returns the number of snapshots seen.
pub async fn log_stats_events(mut events: broadcast::Receiver<AgentEvent>) -> usize {
    let mut seen = 0;
    loop {
        match events.recv().await {
            Ok(AgentEvent::Stats(snapshot)) => {
                seen += 1;
                if let Ok(json) = serde_json::to_string(&snapshot) {
                    debug!("stats {}", json);
                }
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!("Stats subscriber lagged, skipped {} events", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
    seen
}

pub struct Agent {
    config: AgentConfig,
    engine: Arc<Engine>,
    listeners: ListenerManager,
    source: Arc<dyn RecordSource>,
    events: broadcast::Sender<AgentEvent>,
    shutdown: Shutdown,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl Agent {
    pub fn new(
        config: AgentConfig,
        source: Arc<dyn RecordSource>,
        transport: Arc<dyn DohTransport>,
        suffixes: Arc<dyn PublicSuffix>,
    ) -> Self {
        let doh = Arc::new(DohResolver::new(transport));
        let engine = Arc::new(Engine::new(&config, suffixes, doh));
        let (events, _) = broadcast::channel(64);
        Self {
            listeners: ListenerManager::new(engine.clone()),
            config,
            engine,
            source,
            events,
            shutdown: Shutdown::new(),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    /// Agent talking to the real DoH providers, with the bundled suffix list
    pub fn with_https(config: AgentConfig, source: Arc<dyn RecordSource>) -> Result<Self> {
        let transport = Arc::new(HttpsTransport::new(config.upstream_timeout)?);
        Ok(Self::new(
            config,
            source,
            transport,
            Arc::new(SuffixList::bundled()),
        ))
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.events.subscribe()
    }

    pub fn set_logging(&self, enabled: bool) {
        self.engine.set_logging(enabled);
    }

    pub async fn listeners(&self) -> Vec<ListenerInfo> {
        self.listeners.listeners().await
    }

    /// Add a listener at runtime; `proxy` makes its clients trusted
    pub async fn bind(&self, address: BindAddress) -> Result<SocketAddr> {
        self.listeners.bind(address, self.config.port).await
    }

    /// Rebuild the zone index from the record source
    pub async fn sync(&self) -> Result<usize> {
        let records = self.source.sync_records().await?;
        let count = records.len();
        let entries = self.engine.replace_index(records);
        info!("Synced {} records into {} entries", count, entries);
        Ok(count)
    }

    /// Bring the agent up. Listener and sync failures are logged; the
    /// agent still starts with whatever came up.
    pub async fn start(&self, changes: Option<mpsc::Receiver<ChangeEvent>>) {
        if self.stopped.load(Ordering::SeqCst) {
            warn!("Agent already shut down, not starting");
            return;
        }
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("Agent already started");
            return;
        }

        if let Some(path) = &self.config.cache_file {
            if let Err(e) = self.engine.doh().cache().load_from_file(path, now_millis()).await {
                warn!("Failed to load upstream cache from {}: {}", path.display(), e);
            }
        }

        let port = self.config.port;
        for bind in &self.config.bind_addrs {
            if let Err(e) = self.listeners.bind(*bind, port).await {
                error!("Failed to listen on {}:{}: {}", bind.address, port, e);
            }
        }
        for loopback in [IpAddr::V4(Ipv4Addr::LOCALHOST), IpAddr::V6(Ipv6Addr::LOCALHOST)] {
            if let Err(e) = self.listeners.bind(BindAddress::new(loopback, true), port).await {
                error!("Failed to listen on {}:{}: {}", loopback, port, e);
            }
        }

        if let Err(e) = self.sync().await {
            error!("Record sync failed: {}", e);
        }

        self.spawn_stats_timer();
        self.spawn_sweep_timer();
        if let Some(changes) = changes {
            self.spawn_change_consumer(changes);
        }

        let _ = self.events.send(AgentEvent::Online);
        info!("Agent online");
    }

    fn spawn_stats_timer(&self) {
        let engine = self.engine.clone();
        let events = self.events.clone();
        let period = self.config.stats_interval;
        let mut shutdown_rx = self.shutdown.subscribe();

        self.shutdown.spawn("stats", async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        let snapshot = engine.flush_stats();
                        snapshot.log(period);
                        // No subscribers is fine
                        let _ = events.send(AgentEvent::Stats(snapshot));
                    }
                }
            }
        });
    }

    fn spawn_sweep_timer(&self) {
        let engine = self.engine.clone();
        let period = self.config.sweep_interval;
        let mut shutdown_rx = self.shutdown.subscribe();

        self.shutdown.spawn("sweep", async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        engine.doh().clear_expired();
                    }
                }
            }
        });
    }

    fn spawn_change_consumer(&self, mut changes: mpsc::Receiver<ChangeEvent>) {
        let engine = self.engine.clone();
        let mut shutdown_rx = self.shutdown.subscribe();

        self.shutdown.spawn("changes", async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    event = changes.recv() => match event {
                        Some(event) => engine.apply(event),
                        None => {
                            debug!("Change channel closed");
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Take the agent down. Safe to call more than once, and before or
    /// after a partial start.
    pub async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Agent going offline");
        let _ = self.events.send(AgentEvent::Offline);

        self.listeners.close_all().await;
        self.shutdown.shutdown().await;

        if let Some(path) = &self.config.cache_file {
            match self.engine.doh().cache().save_to_file(path, now_millis()).await {
                Ok(count) => info!("Saved {} upstream cache entries", count),
                Err(e) => error!("Failed to save upstream cache to {}: {}", path.display(), e),
            }
        }
    }
}
