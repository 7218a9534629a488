//! Error types for the simulator

use thiserror::Error;

use manet_core::NodeAddress;
use manet_dsr::DsrError;

use crate::topology::TopologyError;

/// Simulation setup and control errors
#[derive(Debug, Error)]
pub enum SimError {
    #[error("Unknown node: {0}")]
    UnknownNode(NodeAddress),

    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),

    #[error("Engine error: {0}")]
    Engine(#[from] DsrError),
}

/// Result type for simulation operations
pub type SimResult<T> = Result<T, SimError>;
