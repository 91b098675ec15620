use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, warn};

use crate::error::OrderError;
use crate::geometry::Point2;
use crate::network::{Connection, Corridor, CorridorKey, Network, Stop};
use crate::region::RegionModel;

use super::tangles::junction_tangles;
use super::types::{Diagnostic, LaneAssignment, RoutingConfig};

/// Where each corridor member sits across the corridor at either end,
/// as ranks from right to left. Indexed like `Corridor::members`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorridorEnds {
    pub before: Vec<usize>,
    pub after: Vec<usize>,
}

/// Outcome of ordering the lanes of one corridor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaneOrder {
    /// Member indices by lane.
    pub order: Vec<usize>,
    pub tangles: usize,
    pub lower_bound: usize,
    pub exhaustive: bool,
    pub converged: bool,
    pub passes: usize,
}

pub(crate) fn stop_position(stop: &Stop, network: &Network, regions: &RegionModel) -> Option<Point2> {
    match stop {
        Stop::Region(id) => regions.get(id).map(|region| region.centroid()),
        Stop::Feature(id) => network.feature(id).map(|feature| feature.anchor),
    }
}

fn endpoint_anchor(connection: &Connection, at_source: bool, network: &Network) -> Option<Point2> {
    let id = if at_source { &connection.source } else { &connection.target };
    network.feature(id).map(|feature| feature.anchor)
}

/// Position just outside the corridor along the connection's route: the
/// stop before (`outward = -1`) or after (`outward = 1`) the leg, or the
/// connection's own endpoint anchor past either end.
fn outside_point(
    connection: &Connection,
    stops: &[Stop],
    leg: usize,
    forward: bool,
    network: &Network,
    regions: &RegionModel,
) -> Option<Point2> {
    if forward {
        match stops.get(leg + 2) {
            Some(stop) => stop_position(stop, network, regions),
            None => endpoint_anchor(connection, false, network),
        }
    } else if leg > 0 {
        stop_position(&stops[leg - 1], network, regions)
    } else {
        endpoint_anchor(connection, true, network)
    }
}

fn ranks(sides: &[f64]) -> Vec<usize> {
    let mut by_side: Vec<usize> = (0..sides.len()).collect();
    by_side.sort_by(|a, b| sides[*a].total_cmp(&sides[*b]).then(a.cmp(b)));
    let mut ranks = vec![0; sides.len()];
    for (rank, member) in by_side.into_iter().enumerate() {
        ranks[member] = rank;
    }
    ranks
}

/// Project every member's neighbouring route point onto the corridor's
/// cross axis at both ends. Positive sides are to the left of the
/// low-to-high direction; members are ranked from the right.
pub fn project_corridor(corridor: &Corridor, network: &Network, regions: &RegionModel) -> CorridorEnds {
    let from = stop_position(&corridor.key.low, network, regions).unwrap_or(Point2::ORIGIN);
    let to = stop_position(&corridor.key.high, network, regions).unwrap_or(Point2::ORIGIN);
    let axis = (to - from).normalized().unwrap_or(Point2::new(1.0, 0.0));

    let mut before_sides = Vec::with_capacity(corridor.len());
    let mut after_sides = Vec::with_capacity(corridor.len());
    for member in &corridor.members {
        let Some(connection) = network.connection(&member.connection) else {
            before_sides.push(0.0);
            after_sides.push(0.0);
            continue;
        };
        let stops = network.stops(connection);
        // A reversed member reaches the low end last.
        let at_low = outside_point(connection, &stops, member.leg, member.reversed, network, regions);
        let at_high = outside_point(connection, &stops, member.leg, !member.reversed, network, regions);
        before_sides.push(at_low.map_or(0.0, |p| axis.cross(p - from)));
        after_sides.push(at_high.map_or(0.0, |p| axis.cross(p - to)));
    }
    CorridorEnds {
        before: ranks(&before_sides),
        after: ranks(&after_sides),
    }
}

const FNV1A_OFFSET: u64 = 0xcbf29ce484222325;
const FNV1A_PRIME: u64 = 0x100000001b3;

fn fnv1a(hash: &mut u64, bytes: &[u8]) {
    for &byte in bytes {
        *hash ^= u64::from(byte);
        *hash = hash.wrapping_mul(FNV1A_PRIME);
    }
}

/// Seed for the heuristic restarts of one corridor. Fixed across builds and
/// platforms so large corridors get the same order on every run.
pub(crate) fn corridor_seed(key: &CorridorKey, corridor: &Corridor) -> u64 {
    let mut hash = FNV1A_OFFSET;
    fnv1a(&mut hash, key.to_string().as_bytes());
    fnv1a(&mut hash, &(corridor.members.len() as u64).to_le_bytes());
    for member in &corridor.members {
        // 0xff never occurs in UTF-8, so ids cannot run into each other
        fnv1a(&mut hash, &[0xff]);
        fnv1a(&mut hash, member.connection.as_str().as_bytes());
    }
    hash
}

struct LaneCost<'a> {
    before: &'a [usize],
    after: &'a [usize],
    lane_ranks: Vec<usize>,
}

impl LaneCost<'_> {
    fn tangles(&mut self, order: &[usize]) -> Result<usize, OrderError> {
        for (lane, &member) in order.iter().enumerate() {
            self.lane_ranks[member] = lane;
        }
        Ok(junction_tangles(self.before, &self.lane_ranks)? + junction_tangles(&self.lane_ranks, self.after)?)
    }
}

/// Rearrange lexicographically into the next permutation; false after the last.
fn next_permutation(order: &mut [usize]) -> bool {
    let Some(pivot) = order.windows(2).rposition(|w| w[0] < w[1]) else {
        return false;
    };
    let Some(successor) = order.iter().rposition(|&value| value > order[pivot]) else {
        return false;
    };
    order.swap(pivot, successor);
    order[pivot + 1..].reverse();
    true
}

struct GreedyRun {
    order: Vec<usize>,
    tangles: usize,
    passes: usize,
    converged: bool,
}

/// Adjacent-swap descent, keeping only strictly better swaps.
fn greedy(
    mut order: Vec<usize>,
    cost: &mut LaneCost<'_>,
    lower_bound: usize,
    max_passes: usize,
) -> Result<GreedyRun, OrderError> {
    let mut tangles = cost.tangles(&order)?;
    let mut passes = 0;
    let mut converged = tangles == lower_bound;
    while !converged && passes < max_passes {
        passes += 1;
        let mut improved = false;
        for i in 0..order.len().saturating_sub(1) {
            order.swap(i, i + 1);
            let candidate = cost.tangles(&order)?;
            if candidate < tangles {
                tangles = candidate;
                improved = true;
            } else {
                order.swap(i, i + 1);
            }
        }
        converged = !improved || tangles == lower_bound;
    }
    Ok(GreedyRun {
        order,
        tangles,
        passes,
        converged,
    })
}

/// Choose the lane order minimising crossings between the `before` side,
/// the lanes and the `after` side. Up to `exhaustive_limit` members every
/// order is tried in lexicographic order, so the ascending-id order wins
/// ties. Larger corridors use seeded greedy descent.
pub fn order_lanes(
    before: &[usize],
    after: &[usize],
    seed: u64,
    config: &RoutingConfig,
) -> Result<LaneOrder, OrderError> {
    let k = before.len();
    let lower_bound = junction_tangles(before, after)?;
    let mut cost = LaneCost {
        before,
        after,
        lane_ranks: vec![0; k],
    };

    if k <= config.exhaustive_limit {
        let mut candidate: Vec<usize> = (0..k).collect();
        let mut best = candidate.clone();
        let mut best_tangles = cost.tangles(&candidate)?;
        while best_tangles > lower_bound && next_permutation(&mut candidate) {
            let tangles = cost.tangles(&candidate)?;
            if tangles < best_tangles {
                best_tangles = tangles;
                best.clone_from(&candidate);
            }
        }
        return Ok(LaneOrder {
            order: best,
            tangles: best_tangles,
            lower_bound,
            exhaustive: true,
            converged: true,
            passes: 0,
        });
    }

    let by_rank = |ranks: &[usize]| {
        let mut order = vec![0; ranks.len()];
        for (member, &rank) in ranks.iter().enumerate() {
            order[rank] = member;
        }
        order
    };
    let mut start: Vec<usize> = (0..k).collect();
    let mut start_tangles = cost.tangles(&start)?;
    for candidate in [by_rank(before), by_rank(after)] {
        let tangles = cost.tangles(&candidate)?;
        if tangles < start_tangles {
            start = candidate;
            start_tangles = tangles;
        }
    }

    let first = greedy(start, &mut cost, lower_bound, config.max_passes)?;
    let converged = first.converged;
    let mut passes = first.passes;
    let mut best = first;
    let mut rng = StdRng::seed_from_u64(seed);
    for _ in 0..config.heuristic_restarts {
        if best.tangles == lower_bound {
            break;
        }
        let mut shuffled: Vec<usize> = (0..k).collect();
        shuffled.shuffle(&mut rng);
        let run = greedy(shuffled, &mut cost, lower_bound, config.max_passes)?;
        passes += run.passes;
        if run.tangles < best.tangles {
            best = run;
        }
    }
    Ok(LaneOrder {
        order: best.order,
        tangles: best.tangles,
        lower_bound,
        exhaustive: false,
        converged: converged || best.tangles == lower_bound,
        passes,
    })
}

/// Lane assignment for one corridor. Non-convergence is reported as a
/// diagnostic alongside the best order found.
pub fn resolve_order(
    corridor: &Corridor,
    network: &Network,
    regions: &RegionModel,
    config: &RoutingConfig,
) -> Result<(LaneAssignment, Option<Diagnostic>), OrderError> {
    let ends = project_corridor(corridor, network, regions);
    let seed = corridor_seed(&corridor.key, corridor);
    let resolved = order_lanes(&ends.before, &ends.after, seed, config)?;
    debug!(
        corridor = %corridor.key,
        members = corridor.len(),
        tangles = resolved.tangles,
        lower_bound = resolved.lower_bound,
        exhaustive = resolved.exhaustive,
        "resolved corridor order"
    );
    let diagnostic = if resolved.converged {
        None
    } else {
        warn!(
            corridor = %corridor.key,
            achieved = resolved.tangles,
            lower_bound = resolved.lower_bound,
            "lane ordering did not converge"
        );
        Some(Diagnostic::OrderNotConverged {
            corridor: corridor.key.clone(),
            achieved: resolved.tangles,
            lower_bound: resolved.lower_bound,
            passes: resolved.passes,
        })
    };
    let assignment = LaneAssignment {
        corridor: corridor.key.clone(),
        order: resolved
            .order
            .iter()
            .map(|&member| corridor.members[member].connection.clone())
            .collect(),
        tangles: resolved.tangles,
        lower_bound: resolved.lower_bound,
        exhaustive: resolved.exhaustive,
        converged: resolved.converged,
    };
    Ok((assignment, diagnostic))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Polygon, Rect};
    use crate::network::{FeatureKind, FeatureNode};
    use crate::region::Region;

    fn config() -> RoutingConfig {
        RoutingConfig::default()
    }

    #[test]
    fn next_permutation_is_lexicographic() {
        let mut order = vec![0, 1, 2];
        let mut seen = vec![order.clone()];
        while next_permutation(&mut order) {
            seen.push(order.clone());
        }
        assert_eq!(
            seen,
            vec![vec![0, 1, 2], vec![0, 2, 1], vec![1, 0, 2], vec![1, 2, 0], vec![2, 0, 1], vec![2, 1, 0]]
        );
    }

    #[test]
    fn identity_wins_ties() {
        let resolved = order_lanes(&[0, 1, 2], &[0, 1, 2], 7, &config()).unwrap();
        assert_eq!(resolved.order, vec![0, 1, 2]);
        assert_eq!(resolved.tangles, 0);
        // crossed ends: any order between them costs 3; the first found is kept
        let crossed = order_lanes(&[0, 1, 2], &[2, 1, 0], 7, &config()).unwrap();
        assert_eq!(crossed.order, vec![0, 1, 2]);
        assert_eq!(crossed.tangles, 3);
        assert_eq!(crossed.lower_bound, 3);
    }

    #[test]
    fn lanes_follow_agreeing_ends() {
        let resolved = order_lanes(&[2, 0, 1], &[2, 0, 1], 7, &config()).unwrap();
        assert_eq!(resolved.order, vec![1, 2, 0]);
        assert_eq!(resolved.tangles, 0);
    }

    #[test]
    fn heuristic_reaches_lower_bound_deterministically() {
        let before: Vec<usize> = vec![5, 3, 9, 0, 11, 1, 7, 2, 10, 4, 8, 6];
        let after: Vec<usize> = vec![4, 3, 10, 0, 11, 2, 6, 1, 9, 5, 8, 7];
        let first = order_lanes(&before, &after, 99, &config()).unwrap();
        let second = order_lanes(&before, &after, 99, &config()).unwrap();
        assert_eq!(first, second);
        assert!(!first.exhaustive);
        assert_eq!(first.tangles, first.lower_bound);
        assert!(first.converged);
    }

    #[test]
    fn greedy_reports_exhausted_budget() {
        let before: Vec<usize> = (0..6).collect();
        let mut cost = LaneCost {
            before: &before,
            after: &before,
            lane_ranks: vec![0; 6],
        };
        let run = greedy(vec![5, 4, 3, 2, 1, 0], &mut cost, 0, 1).unwrap();
        assert_eq!(run.passes, 1);
        assert!(!run.converged);
        assert!(run.tangles > 0);
        let run = greedy(vec![5, 4, 3, 2, 1, 0], &mut cost, 0, 64).unwrap();
        assert!(run.converged);
        assert_eq!(run.tangles, 0);
    }

    fn parallel_network(targets_swapped: bool) -> (RegionModel, Network) {
        let square = |id: &str, x: f64| {
            let rect = Rect::new(Point2::new(x, 0.0), Point2::new(x + 100.0, 100.0));
            Region::new(id, vec![Polygon::rect(&rect)]).unwrap()
        };
        let regions = RegionModel::new(vec![square("A", 0.0), square("B", 100.0)], 0.0).unwrap();
        let (upper, lower) = if targets_swapped { (20.0, 80.0) } else { (80.0, 20.0) };
        let features = vec![
            FeatureNode::new("s1", FeatureKind::PointNode, None, Point2::new(-50.0, 80.0)),
            FeatureNode::new("s2", FeatureKind::PointNode, None, Point2::new(-50.0, 20.0)),
            FeatureNode::new("t1", FeatureKind::PointNode, None, Point2::new(250.0, upper)),
            FeatureNode::new("t2", FeatureKind::PointNode, None, Point2::new(250.0, lower)),
        ];
        let connections = vec![
            Connection::new("c1", "s1", "t1", ["A".into(), "B".into()]),
            Connection::new("c2", "s2", "t2", ["A".into(), "B".into()]),
        ];
        let network = Network::build(&regions, features, connections).unwrap();
        (regions, network)
    }

    fn shared_corridor(network: &Network) -> Corridor {
        let key = CorridorKey::new(Stop::Region("A".into()), Stop::Region("B".into()));
        network.corridors().into_iter().find(|corridor| corridor.key == key).unwrap()
    }

    #[test]
    fn projection_ranks_from_the_right() {
        let (regions, network) = parallel_network(false);
        let corridor = shared_corridor(&network);
        let ends = project_corridor(&corridor, &network, &regions);
        // heading +x, c1 is on the left (y = 80) at both ends
        assert_eq!(ends, CorridorEnds { before: vec![1, 0], after: vec![1, 0] });
        let (assignment, diagnostic) = resolve_order(&corridor, &network, &regions, &config()).unwrap();
        assert_eq!(assignment.order, vec!["c2".into(), "c1".into()]);
        assert_eq!(assignment.tangles, 0);
        assert!(diagnostic.is_none());
    }

    #[test]
    fn corridor_seed_is_pinned() {
        let (_, network) = parallel_network(false);
        let corridor = shared_corridor(&network);
        assert_eq!(corridor_seed(&corridor.key, &corridor), 0xca27_1725_5351_acff);
    }

    #[test]
    fn swapped_targets_force_one_crossing() {
        let (regions, network) = parallel_network(true);
        let corridor = shared_corridor(&network);
        let (assignment, _) = resolve_order(&corridor, &network, &regions, &config()).unwrap();
        assert_eq!(assignment.lower_bound, 1);
        assert_eq!(assignment.tangles, 1);
        assert_eq!(assignment.order, vec!["c1".into(), "c2".into()]);
    }
}
