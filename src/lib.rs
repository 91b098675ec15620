//! Connection path layout for anatomical flatmaps.

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, ::serde::Serialize, ::serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                $name(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                $name(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                $name(id)
            }
        }

        impl ::std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

pub mod error;
pub mod geometry;
pub mod lib_tracing;
pub mod network;
pub mod region;
pub mod routing;
pub mod scaffold;

use tracing::{info, warn};

pub use error::{ConfigError, GeometryError, LayoutError, OrderError, ReferentialError, RoutingError, TraceError};
pub use geometry::{BezierSegment, Point2, Polygon, Rect};
pub use lib_tracing::LibTracer;
pub use network::{Connection, ConnectionId, Corridor, CorridorKey, FeatureId, FeatureKind, FeatureNode, Network, PropertyValue, Stop};
pub use region::{Region, RegionId, RegionModel};
pub use routing::{
    count_tangles, resolve_order, Diagnostic, LaneAssignment, LayoutEngine, LayoutResult, Permutation, RoutedPath,
    RoutingConfig, RoutingStage,
};
pub use scaffold::Scaffold2d;

/// Environment variable naming a file to receive a JSON trace of each [`route_map`] call.
pub const TRACE_ENV_VAR: &str = "FLATMAP_ROUTING_TRACE_JSON";

/// Build the region model and network, then lay out every connection.
///
/// Invalid configuration and dangling references fail before any routing.
/// Per-connection routing failures are reported inside the result.
pub fn route_map(
    regions: Vec<Region>,
    features: Vec<FeatureNode>,
    connections: Vec<Connection>,
    config: RoutingConfig,
) -> Result<LayoutResult, LayoutError> {
    config.validate()?;
    let model = RegionModel::new(regions, config.adjacency_tolerance)?;
    let network = Network::build(&model, features, connections)?;
    let engine = LayoutEngine::new(&network, &model, config)?;
    let result = engine.layout();

    if let Ok(path) = std::env::var(TRACE_ENV_VAR) {
        let trace = routing::build_trace(&result, engine.config());
        match routing::write_trace(&path, &trace) {
            Ok(()) => info!(path = %path, "wrote routing trace"),
            Err(error) => warn!("{error}"),
        }
    }
    Ok(result)
}
