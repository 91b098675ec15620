pub mod edge_router;
pub mod order;
pub(crate) mod route_single;
pub mod tangles;
pub mod trace;
pub mod types;

pub use edge_router::LayoutEngine;
pub use order::{order_lanes, project_corridor, resolve_order, CorridorEnds, LaneOrder};
pub use tangles::{count_tangles, junction, junction_tangles, trace_tangles, Permutation, TangleEvent, TangleTrace};
pub use trace::{build_trace, write_trace};
pub use types::{
    lane_offset, Diagnostic, DiagnosticLevel, LaneAssignment, LayoutResult, LegLane, RoutedPath, RoutingConfig,
    RoutingStage,
};
