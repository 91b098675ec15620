use std::fs;
use std::path::Path;

use serde_json::json;

use crate::error::TraceError;
use crate::geometry::Point2;

use super::types::{LaneAssignment, LayoutResult, RoutedPath, RoutingConfig, RoutingStage};

fn point_json(point: Point2) -> serde_json::Value {
    json!({ "x": point.x, "y": point.y })
}

fn corridor_trace(assignment: &LaneAssignment) -> serde_json::Value {
    let lanes: Vec<serde_json::Value> = assignment
        .lanes()
        .map(|(connection, lane)| json!({ "connection": connection, "lane": lane }))
        .collect();
    json!({
        "corridor": assignment.corridor.to_string(),
        "low": assignment.corridor.low.to_string(),
        "high": assignment.corridor.high.to_string(),
        "lanes": lanes,
        "tangles": assignment.tangles,
        "lower_bound": assignment.lower_bound,
        "exhaustive": assignment.exhaustive,
        "converged": assignment.converged,
    })
}

fn path_trace(path: &RoutedPath, config: &RoutingConfig) -> serde_json::Value {
    let segments: Vec<serde_json::Value> = path
        .control_points()
        .into_iter()
        .map(|points| serde_json::Value::Array(points.into_iter().map(point_json).collect()))
        .collect();
    let lanes: Vec<serde_json::Value> = path
        .lanes
        .iter()
        .map(|lane| {
            json!({
                "corridor": lane.corridor.to_string(),
                "lane": lane.lane,
                "max_paths": lane.max_paths,
                "offset": lane.offset,
            })
        })
        .collect();
    json!({
        "source": path.source,
        "target": path.target,
        "via": path.via,
        "length": path.total_length(),
        "lanes": lanes,
        "segments": segments,
        "polyline": config.polyline(path).into_iter().map(point_json).collect::<Vec<_>>(),
    })
}

/// JSON snapshot of a layout pass: corridor orders, then one entry per
/// connection with its final stage and either its geometry or its failure.
/// Paths are also flattened to `config.flatten_tolerance`.
pub fn build_trace(result: &LayoutResult, config: &RoutingConfig) -> serde_json::Value {
    let corridors: Vec<serde_json::Value> = result.assignments.iter().map(corridor_trace).collect();

    let connections: Vec<serde_json::Value> = result
        .stages
        .iter()
        .map(|(id, stage)| {
            let mut entry = json!({ "id": id, "stage": stage });
            if let Some(path) = result.paths.get(id) {
                entry["path"] = path_trace(path, config);
            }
            if let Some(error) = result.failures.get(id) {
                entry["error"] = json!(error.to_string());
                entry["failed_at"] = json!(result.failed_at.get(id));
            }
            entry
        })
        .collect();

    let total_tangles: usize = result.assignments.iter().map(|assignment| assignment.tangles).sum();
    json!({
        "summary": {
            "corridors": result.assignments.len(),
            "tangles": total_tangles,
            "routed": result.paths.len(),
            "failed": result.failures.len(),
            "skipped": result.skipped.len(),
            "finalized": result.stages.values().filter(|stage| **stage == RoutingStage::Finalized).count(),
        },
        "corridors": corridors,
        "connections": connections,
        "diagnostics": result.diagnostics,
    })
}

pub fn write_trace(path: impl AsRef<Path>, trace: &serde_json::Value) -> Result<(), TraceError> {
    let path = path.as_ref();
    let serialized = serde_json::to_string_pretty(trace)?;
    fs::write(path, serialized).map_err(|source| TraceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Point2, Polygon, Rect};
    use crate::network::{Connection, FeatureKind, FeatureNode, Network};
    use crate::region::{Region, RegionModel};
    use crate::routing::edge_router::LayoutEngine;

    fn layout() -> LayoutResult {
        let square = |id: &str, x: f64| {
            let rect = Rect::new(Point2::new(x, 0.0), Point2::new(x + 100.0, 100.0));
            Region::new(id, vec![Polygon::rect(&rect)]).unwrap()
        };
        let regions = RegionModel::new(vec![square("A", 0.0), square("B", 100.0), square("Z", 500.0)], 0.0).unwrap();
        let features = vec![
            FeatureNode::new("s", FeatureKind::PointNode, None, Point2::new(-50.0, 95.0)),
            FeatureNode::new("t", FeatureKind::PointNode, None, Point2::new(300.0, 50.0)),
        ];
        let connections = vec![
            Connection::new("ok", "s", "t", ["A".into(), "B".into()]),
            Connection::new("broken", "s", "t", ["A".into(), "Z".into()]),
        ];
        let network = Network::build(&regions, features, connections).unwrap();
        LayoutEngine::new(&network, &regions, RoutingConfig::default())
            .unwrap()
            .layout()
    }

    #[test]
    fn trace_lists_paths_and_failures() {
        let trace = build_trace(&layout(), &RoutingConfig::default());
        assert_eq!(trace["summary"]["routed"], 1);
        assert_eq!(trace["summary"]["failed"], 1);

        let connections = trace["connections"].as_array().unwrap();
        assert_eq!(connections.len(), 2);
        assert_eq!(connections[0]["id"], "broken");
        assert_eq!(connections[0]["stage"], "failed");
        assert!(connections[0]["error"].as_str().unwrap().contains("broken"));
        assert_eq!(connections[0]["failed_at"], "unrouted");
        assert_eq!(connections[1]["stage"], "finalized");
        assert!(!connections[1]["path"]["segments"].as_array().unwrap().is_empty());
        assert!(connections[1].get("failed_at").is_none());
    }

    #[test]
    fn polyline_follows_flatten_tolerance() {
        let result = layout();
        let polyline_len = |tolerance: f64| {
            let config = RoutingConfig {
                flatten_tolerance: tolerance,
                ..RoutingConfig::default()
            };
            build_trace(&result, &config)["connections"][1]["path"]["polyline"]
                .as_array()
                .unwrap()
                .len()
        };
        assert!(polyline_len(0.01) > polyline_len(50.0));
        assert!(polyline_len(50.0) >= 2);
    }

    #[test]
    fn trace_is_written_as_json() {
        let dir = std::env::temp_dir().join(format!("flatmap-router-trace-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let file = dir.join("trace.json");
        let trace = build_trace(&layout(), &RoutingConfig::default());
        write_trace(&file, &trace).unwrap();
        let read: serde_json::Value = serde_json::from_str(&fs::read_to_string(&file).unwrap()).unwrap();
        assert_eq!(read, trace);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn unwritable_path_is_an_io_error() {
        let missing = std::env::temp_dir().join("flatmap-router-missing-dir").join("nested").join("trace.json");
        assert!(matches!(
            write_trace(&missing, &json!({})),
            Err(TraceError::Io { .. })
        ));
    }
}
