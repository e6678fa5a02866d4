//! Node configuration file and logging setup.
//!
//! ```toml
//! [node]
//! local_id = 1
//! peer_id = 0
//! bind = "127.0.0.1:9001"
//!
//! [arq]
//! max_retransmissions = 3
//! retransmit_timeout_ms = 2000
//!
//! [peers]
//! 0 = "127.0.0.1:9000"
//!
//! [logging]
//! level = "info"
//! ```

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{
    ArqConfig, ArqError, ArqResult, DEFAULT_MAX_PAYLOAD, DEFAULT_MAX_RETRANSMISSIONS,
    DEFAULT_RETRANSMIT_TIMEOUT, DEFAULT_SEQ_MODULUS, NodeId,
};
use crate::transport::AddressBook;

/// Contents of a node configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeFileConfig {
    /// Addressing.
    #[serde(default)]
    pub node: NodeSection,

    /// Protocol parameters.
    #[serde(default)]
    pub arq: ArqSection,

    /// Node id to socket address.
    #[serde(default)]
    pub peers: BTreeMap<String, SocketAddr>,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NodeFileConfig {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> ArqResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ArqError::Config(format!("failed to read config: {e}")))?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> ArqResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ArqError::Config(format!("failed to parse config: {e}")))?;
        config.to_arq_config()?;
        config.address_book()?;
        Ok(config)
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> ArqResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ArqError::Config(format!("failed to serialize config: {e}")))
    }

    /// Protocol configuration described by this file.
    pub fn to_arq_config(&self) -> ArqResult<ArqConfig> {
        ArqConfig::builder(NodeId(self.node.local_id), NodeId(self.node.peer_id))
            .max_retransmissions(self.arq.max_retransmissions)
            .seq_modulus(self.arq.seq_modulus)
            .max_payload(self.arq.max_payload)
            .retransmit_timeout(Duration::from_millis(self.arq.retransmit_timeout_ms))
            .build()
    }

    /// Routes listed under `[peers]`.
    pub fn address_book(&self) -> ArqResult<AddressBook> {
        self.peers
            .iter()
            .map(|(id, addr)| {
                id.parse::<u8>()
                    .map(|id| (NodeId(id), *addr))
                    .map_err(|_| ArqError::Config(format!("invalid node id in [peers]: {id:?}")))
            })
            .collect()
    }
}

/// `[node]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSection {
    /// Address of this node.
    #[serde(default = "default_local_id")]
    pub local_id: u8,

    /// Address of the peer.
    #[serde(default)]
    pub peer_id: u8,

    /// UDP socket to bind.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
}

fn default_local_id() -> u8 {
    1
}
fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9001))
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            local_id: default_local_id(),
            peer_id: 0,
            bind: default_bind(),
        }
    }
}

/// `[arq]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArqSection {
    /// Resends allowed per frame.
    #[serde(default = "default_max_retransmissions")]
    pub max_retransmissions: u8,

    /// Sequence number modulus.
    #[serde(default = "default_seq_modulus")]
    pub seq_modulus: u16,

    /// Largest SDU.
    #[serde(default = "default_max_payload")]
    pub max_payload: usize,

    /// Retransmission timer in milliseconds.
    #[serde(default = "default_retransmit_timeout_ms")]
    pub retransmit_timeout_ms: u64,
}

fn default_max_retransmissions() -> u8 {
    DEFAULT_MAX_RETRANSMISSIONS
}
fn default_seq_modulus() -> u16 {
    DEFAULT_SEQ_MODULUS
}
fn default_max_payload() -> usize {
    DEFAULT_MAX_PAYLOAD
}
fn default_retransmit_timeout_ms() -> u64 {
    DEFAULT_RETRANSMIT_TIMEOUT.as_millis() as u64
}

impl Default for ArqSection {
    fn default() -> Self {
        Self {
            max_retransmissions: default_max_retransmissions(),
            seq_modulus: default_seq_modulus(),
            max_payload: default_max_payload(),
            retransmit_timeout_ms: default_retransmit_timeout_ms(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text or json).
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Enable colored output.
    #[serde(default = "default_color")]
    pub color: bool,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}
fn default_color() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            color: default_color(),
        }
    }
}

/// Initialize logging to stderr.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(config: &LoggingConfig) -> ArqResult<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| ArqError::Config(format!("failed to init logging: {e}")))?;
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_ansi(config.color)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .map_err(|e| ArqError::Config(format!("failed to init logging: {e}")))?;
    }

    Ok(())
}
