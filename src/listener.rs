use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::BindAddress;
use crate::engine::Engine;
use crate::error::{AgentError, Result};

/// Largest datagram read from a socket
const MAX_DATAGRAM: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Family::V4,
            IpAddr::V6(_) => Family::V6,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Family::V4 => "udp4",
            Family::V6 => "udp6",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Unbound,
    Listening,
    Closed,
}

struct Listener {
    state: ListenerState,
    trusted: bool,
    local_addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

/// Snapshot of one registered listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerInfo {
    pub key: String,
    pub local_addr: SocketAddr,
    pub trusted: bool,
    pub state: ListenerState,
}

/// UDP listeners keyed by `host:port`
pub struct ListenerManager {
    engine: Arc<Engine>,
    listeners: Mutex<HashMap<String, Listener>>,
}

impl ListenerManager {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Bind `host:port` and start answering on it. Binding an address that
    /// already has a listener returns the existing one.
    pub async fn create_listener(
        &self,
        family: Family,
        port: u16,
        host: &str,
        trusted: bool,
    ) -> Result<SocketAddr> {
        info!("Creating on {}:{}:{} proxy: {}", family, host, port, trusted);
        let key = format!("{}:{}", host, port);

        let mut listeners = self.listeners.lock().await;
        if let Some(existing) = listeners.get(&key) {
            debug!("Listener {} already exists", key);
            return Ok(existing.local_addr);
        }

        let ip: IpAddr = host
            .parse()
            .map_err(|_| AgentError::InvalidAddress(host.to_string()))?;
        if Family::of(&ip) != family {
            return Err(AgentError::InvalidAddress(format!("{} is not {}", host, family)));
        }

        let socket = Arc::new(UdpSocket::bind(SocketAddr::new(ip, port)).await?);
        let local_addr = socket.local_addr()?;
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(serve(socket, self.engine.clone(), trusted, shutdown_rx));

        info!("Server listening on {}:{} proxy: {}", family, local_addr, trusted);
        listeners.insert(
            key,
            Listener {
                state: ListenerState::Listening,
                trusted,
                local_addr,
                shutdown_tx,
                task,
            },
        );
        Ok(local_addr)
    }

    /// Listen on a runtime-supplied address
    pub async fn bind(&self, address: BindAddress, port: u16) -> Result<SocketAddr> {
        let ip = address.address;
        self.create_listener(Family::of(&ip), port, &ip.to_string(), address.proxy)
            .await
    }

    pub async fn state(&self, host: &str, port: u16) -> ListenerState {
        let key = format!("{}:{}", host, port);
        self.listeners
            .lock()
            .await
            .get(&key)
            .map_or(ListenerState::Unbound, |l| l.state)
    }

    pub async fn listeners(&self) -> Vec<ListenerInfo> {
        let listeners = self.listeners.lock().await;
        let mut infos: Vec<ListenerInfo> = listeners
            .iter()
            .map(|(key, l)| ListenerInfo {
                key: key.clone(),
                local_addr: l.local_addr,
                trusted: l.trusted,
                state: l.state,
            })
            .collect();
        infos.sort_by(|a, b| a.key.cmp(&b.key));
        infos
    }

    /// Stop every listener and clear the registry
    pub async fn close_all(&self) {
        let drained: Vec<(String, Listener)> = self.listeners.lock().await.drain().collect();
        for (key, mut listener) in drained {
            listener.state = ListenerState::Closed;
            if listener.shutdown_tx.send(()).is_err() {
                debug!("Listener {} already stopped", key);
            }
            if let Err(e) = listener.task.await {
                error!("Listener {} task failed: {}", key, e);
            }
            info!("Server closed {} ({:?})", key, listener.state);
        }
    }
}

/// Receive loop: each datagram is handled on its own task
async fn serve(
    socket: Arc<UdpSocket>,
    engine: Arc<Engine>,
    trusted: bool,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("Listener received shutdown signal");
                break;
            }

            result = socket.recv_from(&mut buf) => {
                let (read_bytes, src_addr) = match result {
                    Ok(received) => received,
                    Err(e) => {
                        warn!("UDP receive error: {}", e);
                        continue;
                    }
                };

                let query_data = buf[..read_bytes].to_vec();
                let engine = engine.clone();
                let socket = socket.clone();
                tokio::spawn(async move {
                    if let Some(response) = engine.handle_datagram(&query_data, src_addr, trusted).await {
                        if let Err(e) = socket.send_to(&response, src_addr).await {
                            error!("Failed to send UDP response to {}: {}", src_addr, e);
                        }
                    }
                });
            }
        }
    }
}
