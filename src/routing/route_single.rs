use hashbrown::HashMap;
use tracing::{debug, warn};

use crate::error::{GeometryError, RoutingError};
use crate::geometry::bezier::first_gap;
use crate::geometry::{BezierSegment, Point2};
use crate::network::{Connection, CorridorKey, Network, Stop};
use crate::region::{RegionId, RegionModel};

use super::order::stop_position;
use super::types::{lane_offset, Diagnostic, LaneAssignment, LegLane, RoutedPath, RoutingConfig, RoutingStage};

/// Waypoint polyline of one connection. `legs[i]` is the route leg the edge
/// from `points[i]` to `points[i + 1]` belongs to.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Waypoints {
    pub points: Vec<Point2>,
    pub legs: Vec<Option<usize>>,
}

/// Progress of one connection through layout.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum RouteState {
    Unrouted,
    ViaResolved(Waypoints),
    LaneOffsetApplied(Vec<Point2>),
    Finalized(Vec<BezierSegment>),
}

impl RouteState {
    pub(crate) fn stage(&self) -> RoutingStage {
        match self {
            RouteState::Unrouted => RoutingStage::Unrouted,
            RouteState::ViaResolved(_) => RoutingStage::ViaResolved,
            RouteState::LaneOffsetApplied(_) => RoutingStage::LaneOffsetApplied,
            RouteState::Finalized(_) => RoutingStage::Finalized,
        }
    }
}

pub(crate) struct RouteOutcome {
    pub result: Result<RoutedPath, RoutingError>,
    /// Last stage reached before finishing or failing.
    pub reached: RoutingStage,
    pub diagnostics: Vec<Diagnostic>,
}

struct RouteContext<'a> {
    connection: &'a Connection,
    network: &'a Network,
    regions: &'a RegionModel,
    config: &'a RoutingConfig,
    stops: Vec<Stop>,
    leg_lanes: Vec<Option<LegLane>>,
}

/// Run one connection from `Unrouted` to `Finalized`. Failures leave the
/// rest of the batch untouched.
pub(crate) fn route_single_connection(
    connection: &Connection,
    network: &Network,
    regions: &RegionModel,
    assignments: &HashMap<CorridorKey, LaneAssignment>,
    config: &RoutingConfig,
) -> RouteOutcome {
    let stops = network.stops(connection);
    let leg_lanes = stops
        .windows(2)
        .map(|pair| {
            let key = CorridorKey::new(pair[0].clone(), pair[1].clone());
            let reversed = pair[0] != key.low;
            let assignment = assignments.get(&key)?;
            let lane = assignment.lane_of(&connection.id)?;
            let offset = lane_offset(lane, assignment.len(), config.lane_spacing);
            Some(LegLane {
                corridor: key,
                lane,
                max_paths: assignment.len(),
                offset: if reversed { -offset } else { offset },
            })
        })
        .collect();
    let context = RouteContext {
        connection,
        network,
        regions,
        config,
        stops,
        leg_lanes,
    };

    let mut diagnostics = Vec::new();
    let mut state = RouteState::Unrouted;
    let mut reached = state.stage();
    let result = loop {
        let next = match state {
            RouteState::Unrouted => context.resolve_vias(&mut diagnostics).map(RouteState::ViaResolved),
            RouteState::ViaResolved(waypoints) => context.apply_lane_offsets(&waypoints).map(RouteState::LaneOffsetApplied),
            RouteState::LaneOffsetApplied(points) => context.finalize(&points).map(RouteState::Finalized),
            RouteState::Finalized(segments) => break Ok(context.routed_path(segments)),
        };
        match next {
            Ok(next) => {
                reached = next.stage();
                state = next;
            }
            Err(error) => break Err(error),
        }
    };
    match &result {
        Ok(path) => debug!(connection = %connection.id, segments = path.segments.len(), "routed connection"),
        Err(error) => warn!(connection = %connection.id, stage = ?reached, "{error}"),
    }
    RouteOutcome {
        result,
        reached,
        diagnostics,
    }
}

impl RouteContext<'_> {
    fn waypoint(&self, index: usize) -> Option<Point2> {
        let last = self.stops.len().saturating_sub(1);
        let endpoint = |id| self.network.feature(id).map(|feature| feature.anchor);
        if index == 0 {
            endpoint(&self.connection.source)
        } else if index >= last {
            endpoint(&self.connection.target)
        } else {
            stop_position(&self.stops[index], self.network, self.regions)
        }
    }

    /// Unrouted -> ViaResolved: anchors, via centroids and the gates where
    /// the straight route passes from one region into the next.
    fn resolve_vias(&self, diagnostics: &mut Vec<Diagnostic>) -> Result<Waypoints, RoutingError> {
        let id = &self.connection.id;
        let missing = |name: String| RoutingError::Disconnected {
            connection: id.clone(),
            from: name.clone(),
            to: name,
        };

        for pair in self.stops.windows(2) {
            if let (Stop::Region(a), Stop::Region(b)) = (&pair[0], &pair[1]) {
                if !self.regions.are_adjacent(a, b) {
                    let detour = self.regions.region_path(a, b);
                    debug!(connection = %id, from = %a, to = %b, detour = ?detour, "via regions do not touch");
                    diagnostics.push(Diagnostic::RegionDetour {
                        connection: id.clone(),
                        from: a.clone(),
                        to: b.clone(),
                        detour,
                    });
                    return Err(RoutingError::Disconnected {
                        connection: id.clone(),
                        from: a.to_string(),
                        to: b.to_string(),
                    });
                }
            }
        }

        let mut waypoints = Waypoints {
            points: Vec::with_capacity(2 * self.stops.len()),
            legs: Vec::with_capacity(2 * self.stops.len()),
        };
        let start = self.waypoint(0).ok_or_else(|| missing(self.connection.source.to_string()))?;
        waypoints.points.push(start);
        if self.stops.len() < 2 {
            let end = self.waypoint(1).ok_or_else(|| missing(self.connection.target.to_string()))?;
            waypoints.legs.push(None);
            waypoints.points.push(end);
            return Ok(waypoints);
        }

        for (leg, pair) in self.stops.windows(2).enumerate() {
            let from = waypoints.points[waypoints.points.len() - 1];
            let to = self.waypoint(leg + 1).ok_or_else(|| missing(pair[1].to_string()))?;
            if let (Stop::Region(a), Stop::Region(b)) = (&pair[0], &pair[1]) {
                if let Some(gate) = self.gate(a, b, from, to)? {
                    waypoints.points.push(gate);
                    waypoints.legs.push(Some(leg));
                }
            }
            waypoints.points.push(to);
            waypoints.legs.push(Some(leg));
        }
        Ok(waypoints)
    }

    /// Midpoint between leaving `a` and entering `b` along `from -> to`.
    fn gate(
        &self,
        a: &RegionId,
        b: &RegionId,
        from: Point2,
        to: Point2,
    ) -> Result<Option<Point2>, RoutingError> {
        let (Some(region_a), Some(region_b)) = (self.regions.get(a), self.regions.get(b)) else {
            return Ok(None);
        };
        let epsilon = self.config.epsilon;
        let exit = region_a.boundary_crossing_points(from, to, epsilon).last().copied();
        let entry = region_b.boundary_crossing_points(from, to, epsilon).first().copied();
        match (exit, entry) {
            (Some(exit), Some(entry)) => Ok(Some(exit.midpoint(entry))),
            (None, None) if !region_a.is_degenerate() && !region_b.is_degenerate() => {
                Err(RoutingError::NoBoundaryCrossing {
                    connection: self.connection.id.clone(),
                    region: a.clone(),
                })
            }
            _ => Ok(None),
        }
    }

    /// ViaResolved -> LaneOffsetApplied: shift every edge sideways by its
    /// leg's lane offset and rejoin neighbouring edges at their midpoints.
    /// The anchors stay put; the offset is reached `terminal_taper` of the
    /// way along the first and last edges.
    fn apply_lane_offsets(&self, waypoints: &Waypoints) -> Result<Vec<Point2>, RoutingError> {
        let epsilon = self.config.epsilon;
        let mut points: Vec<Point2> = Vec::with_capacity(waypoints.points.len());
        let mut legs: Vec<Option<usize>> = Vec::with_capacity(waypoints.legs.len());
        points.push(waypoints.points[0]);
        for (point, leg) in waypoints.points[1..].iter().zip(&waypoints.legs) {
            if points[points.len() - 1].approx_eq(*point, epsilon) {
                continue;
            }
            points.push(*point);
            legs.push(*leg);
        }
        if legs.is_empty() {
            return Err(RoutingError::ZeroLength {
                connection: self.connection.id.clone(),
            });
        }

        let offsets: Vec<f64> = legs
            .iter()
            .map(|leg| {
                leg.and_then(|leg| self.leg_lanes.get(leg)?.as_ref())
                    .map_or(0.0, |lane| lane.offset)
            })
            .collect();
        let shifted = points
            .windows(2)
            .zip(&offsets)
            .map(|(pair, &offset)| BezierSegment::line(pair[0], pair[1]).offset(offset))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| RoutingError::Geometry {
                connection: self.connection.id.clone(),
                source,
            })?;

        let taper = self.config.terminal_taper;
        let last = shifted.len() - 1;
        let mut offset_points = Vec::with_capacity(shifted.len() + 3);
        offset_points.push(points[0]);
        if offsets[0] != 0.0 {
            offset_points.push(shifted[0].point_at(taper));
        }
        for pair in shifted.windows(2) {
            offset_points.push(pair[0].end().midpoint(pair[1].start()));
        }
        if offsets[last] != 0.0 {
            offset_points.push(shifted[last].point_at(1.0 - taper));
        }
        offset_points.push(points[points.len() - 1]);
        offset_points.dedup_by(|b, a| a.approx_eq(*b, epsilon));
        Ok(offset_points)
    }

    /// LaneOffsetApplied -> Finalized: Catmull-Rom style tangents turn the
    /// polyline into a C1 bezier chain through every point.
    fn finalize(&self, points: &[Point2]) -> Result<Vec<BezierSegment>, RoutingError> {
        let connection = &self.connection.id;
        if points.len() < 2 {
            return Err(RoutingError::ZeroLength {
                connection: connection.clone(),
            });
        }
        if points.iter().any(|p| !p.is_finite()) {
            return Err(RoutingError::Geometry {
                connection: connection.clone(),
                source: GeometryError::NonFinite,
            });
        }
        let segments = smooth_polyline(points, self.config.smoothing);
        if let Some((segment, gap)) = first_gap(&segments, self.config.epsilon) {
            return Err(RoutingError::Discontinuous {
                connection: connection.clone(),
                segment,
                gap,
            });
        }
        Ok(segments)
    }

    fn routed_path(&self, segments: Vec<BezierSegment>) -> RoutedPath {
        RoutedPath::new(
            self.connection.id.clone(),
            self.connection.source.clone(),
            self.connection.target.clone(),
            self.connection.via.clone(),
            segments,
            self.leg_lanes.iter().flatten().cloned().collect(),
            self.connection.properties.clone(),
        )
    }
}

/// Cubic chain through `points` whose segments share tangents at every
/// interior point. `smoothing` scales the tangents; zero gives straight lines.
pub(crate) fn smooth_polyline(points: &[Point2], smoothing: f64) -> Vec<BezierSegment> {
    let n = points.len();
    if n < 2 {
        return Vec::new();
    }
    let tangents: Vec<Point2> = (0..n)
        .map(|i| {
            if i == 0 {
                points[1] - points[0]
            } else if i == n - 1 {
                points[n - 1] - points[n - 2]
            } else {
                (points[i + 1] - points[i - 1]) / 2.0
            }
        })
        .collect();
    let arm = smoothing / 3.0;
    (0..n - 1)
        .map(|i| {
            BezierSegment::new(
                points[i],
                points[i] + tangents[i] * arm,
                points[i + 1] - tangents[i + 1] * arm,
                points[i + 1],
            )
        })
        .collect()
}
