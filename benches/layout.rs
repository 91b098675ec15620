use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use flatmap_router::routing::order::order_lanes;
use flatmap_router::{
    Connection, FeatureKind, FeatureNode, LayoutEngine, Network, Point2, Polygon, Rect, Region, RegionId, RegionModel,
    RoutingConfig,
};

/// A `columns` x `rows` grid of touching squares with one connection per
/// row pair, each running the full width of the grid.
fn grid_map(columns: usize, rows: usize, connections: usize) -> (RegionModel, Network) {
    let mut regions = Vec::with_capacity(columns * rows);
    for row in 0..rows {
        for column in 0..columns {
            let min = Point2::new(100.0 * column as f64, 100.0 * row as f64);
            let rect = Rect::new(min, min + Point2::new(100.0, 100.0));
            regions.push(Region::new(format!("r{column}_{row}"), vec![Polygon::rect(&rect)]).expect("square region"));
        }
    }
    let model = RegionModel::new(regions, 0.0).expect("region model");

    let mut features = Vec::with_capacity(2 * connections);
    let mut routes = Vec::with_capacity(connections);
    for i in 0..connections {
        let row = i % rows;
        let y = 100.0 * row as f64 + 10.0 + (i / rows) as f64;
        features.push(FeatureNode::new(format!("s{i}"), FeatureKind::PointNode, None, Point2::new(-50.0, y)));
        features.push(FeatureNode::new(
            format!("t{i}"),
            FeatureKind::PointNode,
            None,
            Point2::new(100.0 * columns as f64 + 50.0, 100.0 * rows as f64 - y),
        ));
        let via: Vec<RegionId> = (0..columns).map(|column| RegionId::new(format!("r{column}_{row}"))).collect();
        routes.push(Connection::new(format!("c{i:03}"), format!("s{i}"), format!("t{i}"), via));
    }
    let network = Network::build(&model, features, routes).expect("network");
    (model, network)
}

fn benches_layout(c: &mut Criterion) {
    {
        let mut group = c.benchmark_group("layout.pass");
        for (case_id, columns, rows, connections) in [("small", 4, 2, 8), ("medium", 12, 4, 64), ("wide", 24, 2, 160)] {
            let (regions, network) = grid_map(columns, rows, connections);
            let engine = LayoutEngine::new(&network, &regions, RoutingConfig::default()).expect("engine");
            group.throughput(Throughput::Elements(connections as u64));
            group.bench_function(case_id, |b| {
                b.iter(|| {
                    let result = engine.layout();
                    black_box(result.paths.len())
                })
            });
        }
        group.finish();
    }

    {
        let mut group = c.benchmark_group("layout.order");
        let config = RoutingConfig::default();
        for k in [6usize, 8, 16, 32] {
            let before: Vec<usize> = (0..k).map(|i| (i * 7 + 3) % k).collect();
            let after: Vec<usize> = (0..k).rev().collect();
            group.bench_function(format!("k{k}"), |b| {
                b.iter(|| order_lanes(black_box(&before), black_box(&after), 17, &config).expect("order"))
            });
        }
        group.finish();
    }
}

criterion_group!(benches, benches_layout);
criterion_main!(benches);
