use flatmap_router::geometry::bezier::first_gap;
use flatmap_router::{
    route_map, Connection, CorridorKey, FeatureKind, FeatureNode, LayoutError, LayoutResult, Network, Point2,
    Polygon, PropertyValue, Rect, ReferentialError, Region, RegionId, RegionModel, RoutingConfig, RoutingError,
    RoutingStage, Stop,
};
use proptest::prelude::*;
use rstest::{fixture, rstest};

const STRIP: usize = 6;

fn square(id: &str, x: f64) -> Region {
    let rect = Rect::new(Point2::new(x, 0.0), Point2::new(x + 100.0, 100.0));
    Region::new(id, vec![Polygon::rect(&rect)]).unwrap()
}

/// Six touching squares `R0..R5` along the x axis and an island `Z` far away.
fn strip() -> Vec<Region> {
    let mut regions: Vec<Region> = (0..STRIP).map(|i| square(&format!("R{i}"), 100.0 * i as f64)).collect();
    regions.push(square("Z", 2000.0));
    regions
}

fn via(range: std::ops::RangeInclusive<usize>) -> Vec<RegionId> {
    range.map(|i| RegionId::new(format!("R{i}"))).collect()
}

fn endpoints(count: usize) -> Vec<FeatureNode> {
    let mut features = Vec::with_capacity(2 * count);
    for i in 0..count {
        let y = 5.0 + 9.0 * i as f64;
        features.push(FeatureNode::new(format!("s{i}"), FeatureKind::PointNode, None, Point2::new(-50.0, y)));
        features.push(FeatureNode::new(format!("t{i}"), FeatureKind::PointNode, None, Point2::new(650.0, 95.0 - y)));
    }
    features
}

fn config() -> RoutingConfig {
    RoutingConfig {
        lane_spacing: 4.0,
        ..RoutingConfig::default()
    }
}

/// Ten connections through the strip; `c7` jumps from `R1` to the island.
#[fixture]
fn batch() -> (Vec<Region>, Vec<FeatureNode>, Vec<Connection>) {
    let connections = (0..10)
        .map(|i| {
            let route = if i == 7 {
                vec![RegionId::from("R1"), RegionId::from("Z")]
            } else {
                via((i % 3)..=(STRIP - 1 - i % 2))
            };
            Connection::new(format!("c{i}"), format!("s{i}"), format!("t{i}"), route)
                .with_property("index", i as f64)
        })
        .collect();
    (strip(), endpoints(10), connections)
}

#[rstest]
fn one_disconnected_connection_fails_alone(batch: (Vec<Region>, Vec<FeatureNode>, Vec<Connection>)) {
    let (regions, features, connections) = batch;
    let result = route_map(regions, features, connections, config()).unwrap();

    assert_eq!(result.paths.len(), 9);
    assert_eq!(result.failures.len(), 1);
    let (failed, error) = result.failures.first().unwrap();
    assert_eq!(failed.as_str(), "c7");
    assert!(matches!(error, RoutingError::Disconnected { from, to, .. } if from == "R1" && to == "Z"));
    assert_eq!(error.connection().as_str(), "c7");
    assert_eq!(result.stages.values().filter(|stage| **stage == RoutingStage::Finalized).count(), 9);
    assert!(!result.paths.keys().any(|id| id.as_str() == "c7"));
}

#[rstest]
fn routed_paths_keep_endpoints_and_properties(batch: (Vec<Region>, Vec<FeatureNode>, Vec<Connection>)) {
    let (regions, features, connections) = batch;
    let anchors: Vec<(String, Point2)> = features.iter().map(|f| (f.id.to_string(), f.anchor)).collect();
    let anchor = |id: &str| anchors.iter().find(|(name, _)| name == id).map(|(_, p)| *p).unwrap();
    let result = route_map(regions, features, connections, config()).unwrap();

    for (id, path) in &result.paths {
        assert_eq!(path.id, *id);
        assert!(path.start().unwrap().approx_eq(anchor(path.source.as_str()), 1e-9));
        assert!(path.end().unwrap().approx_eq(anchor(path.target.as_str()), 1e-9));
        assert_eq!(first_gap(&path.segments, 1e-6), None);
        assert!(path.total_length() > 700.0);
        assert!(matches!(path.properties.get("index"), Some(PropertyValue::Number(_))));
        let polyline = path.as_polyline(1.0);
        assert_eq!(polyline.first().copied(), path.start());
        assert_eq!(polyline.last().copied(), path.end());
    }
}

#[rstest]
fn layout_is_deterministic(batch: (Vec<Region>, Vec<FeatureNode>, Vec<Connection>)) {
    let run = |max_threads: Option<usize>| -> LayoutResult {
        let (regions, features, connections) = batch.clone();
        let config = RoutingConfig {
            max_threads,
            ..config()
        };
        route_map(regions, features, connections, config).unwrap()
    };
    let first = run(None);
    let second = run(Some(1));
    assert_eq!(first.assignments, second.assignments);
    assert_eq!(first.paths, second.paths);
    assert_eq!(first.failures, second.failures);
    assert_eq!(first.diagnostics, second.diagnostics);
}

#[test]
fn unknown_via_region_builds_nothing() {
    let connections = vec![Connection::new("c0", "s0", "t0", [RegionId::from("R0"), RegionId::from("nowhere")])];
    let result = route_map(strip(), endpoints(1), connections, config());
    assert!(matches!(
        result,
        Err(LayoutError::Referential(ReferentialError::UnknownRegion { ref region, .. })) if region.as_str() == "nowhere"
    ));
}

#[test]
fn corridors_ignore_traversal_direction() {
    let regions = RegionModel::new(strip(), 0.0).unwrap();
    let connections = vec![
        Connection::new("east", "s0", "t0", via(1..=2)),
        Connection::new("west", "t1", "s1", [RegionId::from("R2"), RegionId::from("R1")]),
    ];
    let network = Network::build(&regions, endpoints(2), connections).unwrap();
    let key = CorridorKey::new(Stop::Region("R2".into()), Stop::Region("R1".into()));
    assert_eq!(key, CorridorKey::new(Stop::Region("R1".into()), Stop::Region("R2".into())));

    let corridors = network.corridors();
    let shared = corridors.iter().find(|corridor| corridor.key == key).unwrap();
    assert_eq!(shared.len(), 2);
    let east = shared.member(&"east".into()).unwrap();
    let west = shared.member(&"west".into()).unwrap();
    assert!(!east.reversed);
    assert!(west.reversed);
}

#[test]
fn opposing_lanes_sit_on_opposite_sides() {
    let connections = vec![
        Connection::new("east", "s0", "t0", via(1..=2)),
        Connection::new("west", "t1", "s1", [RegionId::from("R2"), RegionId::from("R1")]),
    ];
    let result = route_map(strip(), endpoints(2), connections, config()).unwrap();
    let lane = |id: &str| {
        result.paths[id]
            .lanes
            .iter()
            .find(|lane| lane.corridor.to_string() == "R1|R2")
            .cloned()
            .unwrap()
    };
    let (east, west) = (lane("east"), lane("west"));
    assert_eq!(east.max_paths, 2);
    assert_ne!(east.lane, west.lane);
    // both offsets are measured in the path's own direction of travel
    assert_eq!(east.offset.abs(), 2.0);
    assert_eq!(west.offset.abs(), 2.0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn finalized_paths_are_continuous(
        routes in prop::collection::vec((0usize..STRIP, 0usize..STRIP, any::<bool>()), 1..8),
        spacing in 0.0f64..30.0,
    ) {
        let connections: Vec<Connection> = routes
            .iter()
            .enumerate()
            .map(|(i, &(a, b, backwards))| {
                let (low, high) = (a.min(b), a.max(b));
                let (source, target) = if backwards { (format!("t{i}"), format!("s{i}")) } else { (format!("s{i}"), format!("t{i}")) };
                let mut route = via(low..=high);
                if backwards {
                    route.reverse();
                }
                Connection::new(format!("c{i}"), source, target, route)
            })
            .collect();
        let config = RoutingConfig { lane_spacing: spacing, ..RoutingConfig::default() };
        let result = route_map(strip(), endpoints(routes.len()), connections, config).unwrap();
        prop_assert!(result.is_complete());
        for path in result.paths.values() {
            prop_assert_eq!(first_gap(&path.segments, 1e-6), None);
            prop_assert!(path.segments.iter().all(|s| s.points().iter().all(|p| p.is_finite())));
        }
    }
}
