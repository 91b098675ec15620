use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, GeometryError, RoutingError};
use crate::geometry::bezier::chain_length;
use crate::geometry::markers::junction_dot;
use crate::geometry::{BezierSegment, Point2};
use crate::network::{ConnectionId, CorridorKey, FeatureId, Properties};
use crate::region::RegionId;

/// Largest corridor for which every lane order may be tried (10! orders).
pub const MAX_EXHAUSTIVE_LIMIT: usize = 10;

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Distance between neighbouring lanes of a corridor.
    pub lane_spacing: f64,
    /// Largest radial error of arc approximations, relative to the radius.
    pub arc_tolerance: f64,
    /// Largest gap allowed between consecutive segments of a path.
    pub epsilon: f64,
    /// Default deviation for [`RoutedPath::as_polyline`] callers.
    pub flatten_tolerance: f64,
    /// Outlines this close are taken to share a boundary.
    pub adjacency_tolerance: f64,
    pub exhaustive_limit: usize,
    pub max_passes: usize,
    pub heuristic_restarts: usize,
    /// Fraction of the first and last leg over which a lane offset is eased in.
    pub terminal_taper: f64,
    /// Scale of the tangents used to smooth the waypoint polyline.
    pub smoothing: f64,
    pub max_threads: Option<usize>,
    pub time_budget_ms: Option<u64>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        RoutingConfig {
            lane_spacing: 3000.0,
            arc_tolerance: 0.001,
            epsilon: 1e-6,
            flatten_tolerance: 10.0,
            adjacency_tolerance: 0.0,
            exhaustive_limit: 8,
            max_passes: 32,
            heuristic_restarts: 4,
            terminal_taper: 0.25,
            smoothing: 1.0,
            max_threads: None,
            time_budget_ms: None,
        }
    }
}

impl RoutingConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: RoutingConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: String| Err(ConfigError::Invalid { field, reason });
        if !self.lane_spacing.is_finite() || self.lane_spacing < 0.0 {
            return invalid("lane_spacing", format!("{} is not a non-negative number", self.lane_spacing));
        }
        for (field, value) in [
            ("arc_tolerance", self.arc_tolerance),
            ("epsilon", self.epsilon),
            ("flatten_tolerance", self.flatten_tolerance),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return invalid(field, format!("{value} must be positive"));
            }
        }
        if !self.adjacency_tolerance.is_finite() || self.adjacency_tolerance < 0.0 {
            return invalid("adjacency_tolerance", format!("{} is negative", self.adjacency_tolerance));
        }
        if self.exhaustive_limit > MAX_EXHAUSTIVE_LIMIT {
            return invalid(
                "exhaustive_limit",
                format!("{} exceeds {MAX_EXHAUSTIVE_LIMIT}", self.exhaustive_limit),
            );
        }
        if !(0.0..=0.5).contains(&self.terminal_taper) {
            return invalid("terminal_taper", format!("{} is outside [0, 0.5]", self.terminal_taper));
        }
        if !self.smoothing.is_finite() || self.smoothing < 0.0 {
            return invalid("smoothing", format!("{} is negative", self.smoothing));
        }
        if self.max_threads == Some(0) {
            return invalid("max_threads", "at least one thread is needed".to_string());
        }
        Ok(())
    }

    /// Junction dot sized from the lane spacing, drawn to `arc_tolerance`.
    pub fn junction_dot(&self, center: Point2) -> Result<Vec<BezierSegment>, GeometryError> {
        junction_dot(center, self.lane_spacing, self.arc_tolerance)
    }

    /// Flatten a routed path to `flatten_tolerance`.
    pub fn polyline(&self, path: &RoutedPath) -> Vec<Point2> {
        path.as_polyline(self.flatten_tolerance)
    }
}

/// Resolved left-to-right order of one corridor. Lane 0 is the rightmost
/// lane looking from the corridor's low stop towards its high stop.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LaneAssignment {
    pub corridor: CorridorKey,
    /// Members by lane.
    pub order: Vec<ConnectionId>,
    pub tangles: usize,
    pub lower_bound: usize,
    pub exhaustive: bool,
    pub converged: bool,
}

impl LaneAssignment {
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn lane_of(&self, connection: &ConnectionId) -> Option<usize> {
        self.order.iter().position(|member| member == connection)
    }

    pub fn lanes(&self) -> impl Iterator<Item = (&ConnectionId, usize)> {
        self.order.iter().enumerate().map(|(lane, id)| (id, lane))
    }
}

/// Signed distance of `lane` from the corridor centreline, to the left of
/// the corridor's canonical direction.
pub fn lane_offset(lane: usize, max_paths: usize, lane_spacing: f64) -> f64 {
    if max_paths <= 1 {
        return 0.0;
    }
    (lane as f64 - (max_paths as f64 - 1.0) / 2.0) * lane_spacing
}

/// Lane used by one leg of a routed path.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LegLane {
    pub corridor: CorridorKey,
    pub lane: usize,
    pub max_paths: usize,
    /// Offset in the path's own direction of travel, positive to the left.
    pub offset: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStage {
    Unrouted,
    ViaResolved,
    LaneOffsetApplied,
    Finalized,
    Failed,
}

/// Finished geometry of one connection.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RoutedPath {
    pub id: ConnectionId,
    pub source: FeatureId,
    pub target: FeatureId,
    pub via: Vec<RegionId>,
    pub segments: Vec<BezierSegment>,
    pub lanes: Vec<LegLane>,
    pub properties: Properties,
    length: f64,
}

impl RoutedPath {
    pub(crate) fn new(
        id: ConnectionId,
        source: FeatureId,
        target: FeatureId,
        via: Vec<RegionId>,
        segments: Vec<BezierSegment>,
        lanes: Vec<LegLane>,
        properties: Properties,
    ) -> Self {
        let length = chain_length(&segments);
        RoutedPath {
            id,
            source,
            target,
            via,
            segments,
            lanes,
            properties,
            length,
        }
    }

    pub fn total_length(&self) -> f64 {
        self.length
    }

    pub fn start(&self) -> Option<Point2> {
        self.segments.first().map(BezierSegment::start)
    }

    pub fn end(&self) -> Option<Point2> {
        self.segments.last().map(BezierSegment::end)
    }

    /// Point at fraction `t` of the path's length. Within a segment the
    /// curve parameter stands in for arc length.
    pub fn sample(&self, t: f64) -> Option<Point2> {
        let last = self.segments.last()?;
        let target = t.clamp(0.0, 1.0) * self.length;
        let mut travelled = 0.0;
        for segment in &self.segments {
            let length = segment.length();
            if travelled + length >= target && length > 0.0 {
                return Some(segment.point_at((target - travelled) / length));
            }
            travelled += length;
        }
        Some(last.end())
    }

    /// Polyline within `tolerance` of the curves.
    pub fn as_polyline(&self, tolerance: f64) -> Vec<Point2> {
        let Some(first) = self.segments.first() else {
            return Vec::new();
        };
        let mut points = vec![first.start()];
        for segment in &self.segments {
            segment.flatten_into(tolerance, &mut points);
        }
        points
    }

    pub fn control_points(&self) -> Vec<[Point2; 4]> {
        self.segments.iter().map(BezierSegment::points).collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Info,
    Warning,
}

/// Non-fatal findings attached to a layout result.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// The heuristic ran out of passes before settling.
    OrderNotConverged {
        corridor: CorridorKey,
        achieved: usize,
        lower_bound: usize,
        passes: usize,
    },
    /// Consecutive via regions do not touch; `detour` is the nearest chain
    /// of adjacent regions between them, when one exists.
    RegionDetour {
        connection: ConnectionId,
        from: RegionId,
        to: RegionId,
        detour: Option<Vec<RegionId>>,
    },
    /// Not attempted because the time budget ran out.
    Skipped { connection: ConnectionId },
}

impl Diagnostic {
    pub fn level(&self) -> DiagnosticLevel {
        match self {
            Diagnostic::OrderNotConverged { .. } | Diagnostic::Skipped { .. } => DiagnosticLevel::Warning,
            Diagnostic::RegionDetour { .. } => DiagnosticLevel::Info,
        }
    }
}

/// Everything one layout pass produced. Maps are in ascending connection id order.
#[derive(Clone, Debug, Default)]
pub struct LayoutResult {
    pub paths: IndexMap<ConnectionId, RoutedPath>,
    pub failures: IndexMap<ConnectionId, RoutingError>,
    pub skipped: Vec<ConnectionId>,
    pub assignments: Vec<LaneAssignment>,
    pub stages: IndexMap<ConnectionId, RoutingStage>,
    /// Last stage a failed connection completed before its error.
    pub failed_at: IndexMap<ConnectionId, RoutingStage>,
    pub diagnostics: Vec<Diagnostic>,
}

impl LayoutResult {
    pub fn failed_ids(&self) -> Vec<&ConnectionId> {
        self.failures.keys().collect()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.skipped.is_empty()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|diagnostic| diagnostic.level() == DiagnosticLevel::Warning)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_fields_default_individually() {
        let config = RoutingConfig::from_json_str(r#"{ "lane_spacing": 500.0, "max_threads": 2 }"#).unwrap();
        assert_eq!(config.lane_spacing, 500.0);
        assert_eq!(config.max_threads, Some(2));
        assert_eq!(config.exhaustive_limit, RoutingConfig::default().exhaustive_limit);
    }

    #[test]
    fn config_validation() {
        assert!(matches!(
            RoutingConfig::from_json_str(r#"{ "exhaustive_limit": 11 }"#),
            Err(ConfigError::Invalid {
                field: "exhaustive_limit",
                ..
            })
        ));
        assert!(matches!(
            RoutingConfig::from_json_str(r#"{ "terminal_taper": 0.75 }"#),
            Err(ConfigError::Invalid { field: "terminal_taper", .. })
        ));
        assert!(matches!(RoutingConfig::from_json_str("{"), Err(ConfigError::Parse(_))));
        assert!(RoutingConfig::default().validate().is_ok());
    }

    #[test]
    fn junction_dots_follow_arc_tolerance() {
        let config = RoutingConfig {
            lane_spacing: 100.0,
            ..RoutingConfig::default()
        };
        let dot = config.junction_dot(Point2::ORIGIN).unwrap();
        assert!(dot[0].start().approx_eq(Point2::new(80.0, 0.0), 1e-9));
        assert!(crate::geometry::arc::radial_error(&dot, Point2::ORIGIN, 80.0) <= config.arc_tolerance);
        let coarse = RoutingConfig {
            arc_tolerance: 0.01,
            ..config.clone()
        };
        assert!(coarse.junction_dot(Point2::ORIGIN).unwrap().len() <= dot.len());
        let collapsed = RoutingConfig {
            lane_spacing: 0.0,
            ..config
        };
        assert_eq!(collapsed.junction_dot(Point2::ORIGIN), Err(GeometryError::InvalidRadius(0.0)));
    }

    #[test]
    fn lanes_are_centred() {
        assert_eq!(lane_offset(0, 1, 10.0), 0.0);
        assert_eq!(lane_offset(0, 2, 10.0), -5.0);
        assert_eq!(lane_offset(1, 2, 10.0), 5.0);
        assert_eq!(lane_offset(1, 3, 10.0), 0.0);
        assert_eq!(lane_offset(3, 4, 2.0), 3.0);
    }

    #[test]
    fn routed_path_sampling() {
        let path = RoutedPath::new(
            "c".into(),
            "s".into(),
            "t".into(),
            Vec::new(),
            vec![
                BezierSegment::line(Point2::new(0.0, 0.0), Point2::new(10.0, 0.0)),
                BezierSegment::line(Point2::new(10.0, 0.0), Point2::new(10.0, 30.0)),
            ],
            Vec::new(),
            Properties::new(),
        );
        assert!((path.total_length() - 40.0).abs() < 1e-9);
        assert!(path.sample(0.5).unwrap().approx_eq(Point2::new(10.0, 10.0), 1e-9));
        assert!(path.sample(1.0).unwrap().approx_eq(path.end().unwrap(), 1e-9));
        assert_eq!(path.as_polyline(1.0), vec![Point2::new(0.0, 0.0), Point2::new(10.0, 0.0), Point2::new(10.0, 30.0)]);
        assert_eq!(path.control_points().len(), 2);
    }
}
