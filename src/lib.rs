pub mod agent;
pub mod config;
pub mod dns;
pub mod doh;
pub mod engine;
pub mod error;
pub mod listener;
pub mod psl;
pub mod shutdown;
pub mod source;
pub mod stats;
pub mod zone;

pub use agent::{Agent, AgentEvent};
pub use config::{AgentConfig, BindAddress};
pub use dns::DNSPacket;
pub use engine::Engine;
