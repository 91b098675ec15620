use crate::network::{ConnectionId, FeatureId};
use crate::region::RegionId;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("vector dimensions differ: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
    #[error("cannot normalize a zero-length vector")]
    ZeroLength,
    #[error("non-finite coordinate in geometry input")]
    NonFinite,
    #[error("invalid arc radius {0}")]
    InvalidRadius(f64),
    #[error("arc sweep {0} exceeds a full turn")]
    SweepTooLarge(f64),
    #[error("geometry input is empty")]
    EmptyInput,
}

/// Raised while building a [`crate::network::Network`]; no network is produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReferentialError {
    #[error("connection {connection} references unknown feature {feature}")]
    UnknownFeature { connection: ConnectionId, feature: FeatureId },
    #[error("connection {connection} references unknown region {region}")]
    UnknownRegion { connection: ConnectionId, region: RegionId },
    #[error("feature {feature} belongs to unknown region {region}")]
    UnknownFeatureRegion { feature: FeatureId, region: RegionId },
    #[error("feature {0} is defined more than once")]
    DuplicateFeature(FeatureId),
    #[error("connection {0} is defined more than once")]
    DuplicateConnection(ConnectionId),
    #[error("region {0} is defined more than once")]
    DuplicateRegion(RegionId),
}

/// A single connection could not be routed. The rest of the batch is unaffected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RoutingError {
    #[error("{connection}: no shared boundary between {from} and {to}")]
    Disconnected { connection: ConnectionId, from: String, to: String },
    #[error("{connection}: path never crosses the boundary of {region}")]
    NoBoundaryCrossing { connection: ConnectionId, region: RegionId },
    #[error("{connection}: route collapses to a single point")]
    ZeroLength { connection: ConnectionId },
    #[error("{connection}: gap of {gap} after segment {segment}")]
    Discontinuous { connection: ConnectionId, segment: usize, gap: f64 },
    #[error("{connection}: {source}")]
    Geometry {
        connection: ConnectionId,
        #[source]
        source: GeometryError,
    },
}

impl RoutingError {
    pub fn connection(&self) -> &ConnectionId {
        match self {
            RoutingError::Disconnected { connection, .. }
            | RoutingError::NoBoundaryCrossing { connection, .. }
            | RoutingError::ZeroLength { connection }
            | RoutingError::Discontinuous { connection, .. }
            | RoutingError::Geometry { connection, .. } => connection,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("{0:?} is not a permutation")]
    NotAPermutation(Vec<usize>),
    #[error("expected {expected} positions, found {found}")]
    SizeMismatch { expected: usize, found: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse routing config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid routing config field `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("failed to serialize routing trace: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write routing trace to {}: {source}", path.display())]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure of [`crate::route_map`] before any connection was routed.
#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Referential(#[from] ReferentialError),
}
