use flatmap_router::geometry::bezier::{bezier_offset, first_gap};
use flatmap_router::geometry::{arc_to_bezier_with_tolerance, BezierSegment, Point2};
use proptest::prelude::*;

fn point() -> impl Strategy<Value = Point2> {
    (-1000.0f64..1000.0, -1000.0f64..1000.0).prop_map(|(x, y)| Point2::new(x, y))
}

fn segment() -> impl Strategy<Value = BezierSegment> {
    (point(), point(), point(), point())
        .prop_map(|(p0, p1, p2, p3)| BezierSegment::new(p0, p1, p2, p3))
        .prop_filter("control arms must have length", |s| {
            s.p0.distance(s.p1) > 1e-3 && s.p2.distance(s.p3) > 1e-3
        })
}

proptest! {
    #[test]
    fn offset_round_trip(segment in segment(), distance in -500.0f64..500.0) {
        let there = bezier_offset(&segment, distance).unwrap();
        let back = bezier_offset(&there, -distance).unwrap();
        prop_assert!(back.start().approx_eq(segment.start(), 1e-6));
        prop_assert!(back.end().approx_eq(segment.end(), 1e-6));
    }

    #[test]
    fn offset_moves_ends_by_the_distance(segment in segment(), distance in -500.0f64..500.0) {
        let offset = bezier_offset(&segment, distance).unwrap();
        prop_assert!((offset.start().distance(segment.start()) - distance.abs()).abs() < 1e-6);
        prop_assert!((offset.end().distance(segment.end()) - distance.abs()).abs() < 1e-6);
    }

    #[test]
    fn arcs_are_continuous_and_on_the_circle(
        radius in 1.0f64..5000.0,
        start in -6.0f64..6.0,
        sweep in 0.01f64..6.2,
    ) {
        let center = Point2::new(10.0, -20.0);
        let pieces = arc_to_bezier_with_tolerance(center, radius, start, start + sweep, 1e-3).unwrap();
        prop_assert_eq!(first_gap(&pieces, 1e-9 * radius), None);
        for piece in &pieces {
            let mid = piece.point_at(0.5);
            prop_assert!((mid.distance(center) - radius).abs() <= 1e-3 * radius);
        }
    }
}
