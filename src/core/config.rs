//! Node addressing and protocol configuration.

use std::time::Duration;

use super::constants::{
    DEFAULT_MAX_PAYLOAD, DEFAULT_MAX_RETRANSMISSIONS, DEFAULT_RETRANSMIT_TIMEOUT,
    DEFAULT_SEQ_MODULUS, MAX_PAYLOAD_LIMIT, MAX_SEQ_MODULUS, MIN_SEQ_MODULUS,
};
use super::error::{ArqError, ArqResult};

/// Link-layer address of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodeId(pub u8);

impl NodeId {
    /// Get the raw address byte.
    pub fn as_byte(self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for NodeId {
    fn from(id: u8) -> Self {
        Self(id)
    }
}

impl From<NodeId> for u8 {
    fn from(id: NodeId) -> u8 {
        id.0
    }
}

/// Session configuration, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArqConfig {
    /// Address of this node.
    pub local_id: NodeId,

    /// Address of the single peer data frames are sent to.
    pub peer_id: NodeId,

    /// Resends allowed per outstanding frame before giving up.
    pub max_retransmissions: u8,

    /// Sequence number modulus `N`.
    pub seq_modulus: u16,

    /// Largest SDU accepted from the input source.
    pub max_payload: usize,

    /// Retransmission timer duration.
    pub retransmit_timeout: Duration,
}

impl Default for ArqConfig {
    fn default() -> Self {
        Self {
            local_id: NodeId(1),
            peer_id: NodeId(0),
            max_retransmissions: DEFAULT_MAX_RETRANSMISSIONS,
            seq_modulus: DEFAULT_SEQ_MODULUS,
            max_payload: DEFAULT_MAX_PAYLOAD,
            retransmit_timeout: DEFAULT_RETRANSMIT_TIMEOUT,
        }
    }
}

impl ArqConfig {
    /// Start building a configuration for the given pair of nodes.
    pub fn builder(local_id: NodeId, peer_id: NodeId) -> ArqConfigBuilder {
        ArqConfigBuilder::new(local_id, peer_id)
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> ArqResult<()> {
        if self.local_id == self.peer_id {
            return Err(ArqError::Config(format!(
                "local id and peer id must differ (both {})",
                self.local_id
            )));
        }
        if !(MIN_SEQ_MODULUS..=MAX_SEQ_MODULUS).contains(&self.seq_modulus) {
            return Err(ArqError::Config(format!(
                "sequence modulus {} outside {MIN_SEQ_MODULUS}..={MAX_SEQ_MODULUS}",
                self.seq_modulus
            )));
        }
        if self.max_payload == 0 || self.max_payload > MAX_PAYLOAD_LIMIT {
            return Err(ArqError::Config(format!(
                "max payload {} outside 1..={MAX_PAYLOAD_LIMIT}",
                self.max_payload
            )));
        }
        if self.retransmit_timeout.is_zero() {
            return Err(ArqError::Config("retransmit timeout must be non-zero".into()));
        }
        Ok(())
    }
}

/// Builder for [`ArqConfig`].
#[derive(Debug, Clone)]
pub struct ArqConfigBuilder {
    config: ArqConfig,
}

impl ArqConfigBuilder {
    /// Create a builder with default protocol parameters.
    pub fn new(local_id: NodeId, peer_id: NodeId) -> Self {
        Self {
            config: ArqConfig {
                local_id,
                peer_id,
                ..ArqConfig::default()
            },
        }
    }

    /// Set the retransmission budget.
    pub fn max_retransmissions(mut self, max: u8) -> Self {
        self.config.max_retransmissions = max;
        self
    }

    /// Set the sequence modulus.
    pub fn seq_modulus(mut self, modulus: u16) -> Self {
        self.config.seq_modulus = modulus;
        self
    }

    /// Set the maximum SDU size.
    pub fn max_payload(mut self, size: usize) -> Self {
        self.config.max_payload = size;
        self
    }

    /// Set the retransmission timer duration.
    pub fn retransmit_timeout(mut self, timeout: Duration) -> Self {
        self.config.retransmit_timeout = timeout;
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> ArqResult<ArqConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = ArqConfig::builder(NodeId(1), NodeId(2)).build().unwrap();
        assert_eq!(config.max_retransmissions, DEFAULT_MAX_RETRANSMISSIONS);
        assert_eq!(config.seq_modulus, DEFAULT_SEQ_MODULUS);
        assert_eq!(config.max_payload, DEFAULT_MAX_PAYLOAD);
        assert_eq!(config.retransmit_timeout, DEFAULT_RETRANSMIT_TIMEOUT);
    }

    #[test]
    fn test_same_ids_rejected() {
        let err = ArqConfig::builder(NodeId(3), NodeId(3)).build().unwrap_err();
        assert!(matches!(err, ArqError::Config(_)));
    }

    #[test]
    fn test_modulus_bounds() {
        assert!(ArqConfig::builder(NodeId(0), NodeId(1)).seq_modulus(1).build().is_err());
        assert!(ArqConfig::builder(NodeId(0), NodeId(1)).seq_modulus(257).build().is_err());
        assert!(ArqConfig::builder(NodeId(0), NodeId(1)).seq_modulus(2).build().is_ok());
        assert!(ArqConfig::builder(NodeId(0), NodeId(1)).seq_modulus(256).build().is_ok());
    }

    #[test]
    fn test_payload_and_timeout_bounds() {
        assert!(ArqConfig::builder(NodeId(0), NodeId(1)).max_payload(0).build().is_err());
        assert!(
            ArqConfig::builder(NodeId(0), NodeId(1))
                .max_payload(MAX_PAYLOAD_LIMIT + 1)
                .build()
                .is_err()
        );
        assert!(
            ArqConfig::builder(NodeId(0), NodeId(1))
                .retransmit_timeout(Duration::ZERO)
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_node_id_display() {
        assert_eq!(NodeId(7).to_string(), "7");
        assert_eq!(u8::from(NodeId(9)), 9);
    }
}
