//! Broker runtime configuration.
//!
//! The worker cap and the candidate endpoint list are configuration, passed
//! in at construction; the broker keeps no process-wide globals.

use crate::protocol::ServerAddress;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default cap on workers dialled for a run.
pub const DEFAULT_MAX_NODES: usize = 4;

/// Configuration for one broker process.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Port the broker listens on.
    pub port: u16,

    /// Maximum number of workers to connect; the first `max_nodes`
    /// endpoints that answer are used.
    pub max_nodes: usize,

    /// Candidate worker endpoints, dialled in order.
    pub worker_endpoints: Vec<ServerAddress>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_nodes: DEFAULT_MAX_NODES,
            worker_endpoints: (8081..=8085)
                .map(|port| ServerAddress::new("127.0.0.1", port))
                .collect(),
        }
    }
}

impl BrokerConfig {
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = max_nodes;
        self
    }

    pub fn with_worker_endpoints(mut self, endpoints: Vec<ServerAddress>) -> Self {
        self.worker_endpoints = endpoints;
        self
    }
}
