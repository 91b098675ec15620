use indexmap::IndexMap;
use petgraph::algo::astar;
use petgraph::graphmap::UnGraphMap;
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GeometryError, ReferentialError};
use crate::geometry::polygon::point_segment_distance;
use crate::geometry::{BoundingBox, Point2, Polygon, Rect};
use crate::network::FeatureNode;

string_id!(
    /// Identifier of a map region, stable for one map build.
    RegionId
);

/// A map feature with an area. An empty boundary makes the region
/// degenerate: it behaves as the single point at its centroid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionId,
    pub boundary: Vec<Polygon>,
    centroid: Point2,
    bounds: Rect,
    area: f64,
}

impl Region {
    pub fn new(id: impl Into<RegionId>, boundary: Vec<Polygon>) -> Result<Region, GeometryError> {
        let boundary: Vec<Polygon> = boundary.into_iter().filter(|polygon| !polygon.is_empty()).collect();
        if boundary.is_empty() {
            return Err(GeometryError::EmptyInput);
        }
        if boundary.iter().flat_map(|polygon| polygon.exterior.iter()).any(|p| !p.is_finite()) {
            return Err(GeometryError::NonFinite);
        }
        let mut area = 0.0;
        let mut weighted = Point2::ORIGIN;
        let mut mean = Point2::ORIGIN;
        for polygon in &boundary {
            let centroid = polygon.centroid()?;
            let polygon_area = polygon.area();
            weighted = weighted + centroid * polygon_area;
            mean = mean + centroid;
            area += polygon_area;
        }
        let centroid = if area > f64::EPSILON {
            weighted / area
        } else {
            mean / boundary.len() as f64
        };
        let bounds = boundary
            .iter()
            .map(BoundingBox::bounds)
            .reduce(|a, b| a.union(&b))
            .unwrap_or(Rect::from_point(centroid));
        Ok(Region {
            id: id.into(),
            boundary,
            centroid,
            bounds,
            area,
        })
    }

    /// A region known only by its position.
    pub fn degenerate(id: impl Into<RegionId>, centroid: Point2) -> Region {
        Region {
            id: id.into(),
            boundary: Vec::new(),
            centroid,
            bounds: Rect::from_point(centroid),
            area: 0.0,
        }
    }

    pub fn centroid(&self) -> Point2 {
        self.centroid
    }

    pub fn area(&self) -> f64 {
        self.area
    }

    pub fn is_degenerate(&self) -> bool {
        self.boundary.is_empty()
    }

    pub fn contains_point(&self, point: Point2) -> bool {
        if self.is_degenerate() {
            return self.centroid.approx_eq(point, f64::EPSILON);
        }
        self.bounds.contains(point) && self.boundary.iter().any(|polygon| polygon.contains_point(point))
    }

    /// Region completely inside this one. Degenerate regions are inside when
    /// their point is.
    pub fn contains_region(&self, other: &Region) -> bool {
        if self.is_degenerate() || !self.bounds.contains_rect(&other.bounds) {
            return false;
        }
        if other.is_degenerate() {
            return self.contains_point(other.centroid);
        }
        other
            .boundary
            .iter()
            .all(|inner| self.boundary.iter().any(|outer| outer.contains_polygon(inner)))
    }

    pub fn distance_to(&self, other: &Region) -> f64 {
        match (self.is_degenerate(), other.is_degenerate()) {
            (true, true) => self.centroid.distance(other.centroid),
            (true, false) => other.distance_to_point(self.centroid),
            (false, true) => self.distance_to_point(other.centroid),
            (false, false) => self
                .boundary
                .iter()
                .flat_map(|a| other.boundary.iter().map(move |b| a.distance_to_polygon(b)))
                .fold(f64::INFINITY, f64::min),
        }
    }

    pub fn distance_to_point(&self, point: Point2) -> f64 {
        if self.is_degenerate() {
            return self.centroid.distance(point);
        }
        self.boundary
            .iter()
            .map(|polygon| polygon.distance_to_point(point))
            .fold(f64::INFINITY, f64::min)
    }

    /// Points where `start -> end` crosses the region's boundary, ordered
    /// along the line. Crossings closer than `epsilon` are merged. A
    /// degenerate region yields its centroid when the line passes through it.
    pub fn boundary_crossing_points(&self, start: Point2, end: Point2, epsilon: f64) -> Vec<Point2> {
        if self.is_degenerate() {
            return if point_segment_distance(self.centroid, start, end) <= epsilon {
                vec![self.centroid]
            } else {
                Vec::new()
            };
        }
        let mut crossings: Vec<f64> = self
            .boundary
            .iter()
            .flat_map(|polygon| polygon.segment_crossings(start, end))
            .collect();
        crossings.sort_by(f64::total_cmp);
        let mut points: Vec<Point2> = Vec::with_capacity(crossings.len());
        for t in crossings {
            let point = start.lerp(end, t);
            if points.last().map_or(true, |last| !last.approx_eq(point, epsilon)) {
                points.push(point);
            }
        }
        points
    }
}

impl BoundingBox for Region {
    fn bounds(&self) -> Rect {
        self.bounds
    }
}

/// Whether `point` lies in `region` (boundary included).
pub fn point_in_region(point: Point2, region: &Region) -> bool {
    region.contains_point(point)
}

#[derive(Clone, Debug, PartialEq)]
struct RegionEnvelope {
    index: usize,
    envelope: AABB<Point2>,
}

impl RTreeObject for RegionEnvelope {
    type Envelope = AABB<Point2>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// All regions of one map build with a spatial index and the graph of
/// regions that share a boundary.
#[derive(Debug)]
pub struct RegionModel {
    regions: IndexMap<RegionId, Region>,
    tree: RTree<RegionEnvelope>,
    adjacency: UnGraphMap<usize, ()>,
}

impl RegionModel {
    /// Index `regions`, joining those whose outlines come within
    /// `adjacency_tolerance` of each other.
    pub fn new(regions: Vec<Region>, adjacency_tolerance: f64) -> Result<RegionModel, ReferentialError> {
        let mut by_id = IndexMap::with_capacity(regions.len());
        for region in regions {
            if by_id.contains_key(&region.id) {
                return Err(ReferentialError::DuplicateRegion(region.id));
            }
            by_id.insert(region.id.clone(), region);
        }
        let tree = RTree::bulk_load(
            by_id
                .values()
                .enumerate()
                .map(|(index, region)| RegionEnvelope {
                    index,
                    envelope: region.envelope_aabb(),
                })
                .collect(),
        );
        let mut adjacency = UnGraphMap::with_capacity(by_id.len(), by_id.len() * 2);
        for index in 0..by_id.len() {
            adjacency.add_node(index);
        }
        for (index, region) in by_id.values().enumerate() {
            let search = region.bounds.expanded(adjacency_tolerance).envelope_aabb();
            for candidate in tree.locate_in_envelope_intersecting(&search) {
                if candidate.index <= index {
                    continue;
                }
                let other = &by_id[candidate.index];
                if region.distance_to(other) <= adjacency_tolerance {
                    adjacency.add_edge(index, candidate.index, ());
                }
            }
        }
        debug!(
            regions = by_id.len(),
            adjacencies = adjacency.edge_count(),
            "built region model"
        );
        Ok(RegionModel {
            regions: by_id,
            tree,
            adjacency,
        })
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn contains(&self, id: &RegionId) -> bool {
        self.regions.contains_key(id)
    }

    pub fn get(&self, id: &RegionId) -> Option<&Region> {
        self.regions.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.values()
    }

    pub fn region_for(&self, feature: &FeatureNode) -> Option<&Region> {
        feature.region.as_ref().and_then(|id| self.regions.get(id))
    }

    /// Declare a shared boundary the geometry does not show. Returns false
    /// if either region is unknown.
    pub fn connect(&mut self, a: &RegionId, b: &RegionId) -> bool {
        match (self.regions.get_index_of(a), self.regions.get_index_of(b)) {
            (Some(a), Some(b)) if a != b => {
                self.adjacency.add_edge(a, b, ());
                true
            }
            _ => false,
        }
    }

    pub fn are_adjacent(&self, a: &RegionId, b: &RegionId) -> bool {
        match (self.regions.get_index_of(a), self.regions.get_index_of(b)) {
            (Some(a), Some(b)) => self.adjacency.contains_edge(a, b),
            _ => false,
        }
    }

    /// Neighbours of `id` in insertion order.
    pub fn neighbours(&self, id: &RegionId) -> Vec<&RegionId> {
        let Some(index) = self.regions.get_index_of(id) else {
            return Vec::new();
        };
        let mut neighbours: Vec<usize> = self.adjacency.neighbors(index).collect();
        neighbours.sort_unstable();
        neighbours.into_iter().filter_map(|n| self.id_at(n)).collect()
    }

    /// Regions containing `point`, smallest first.
    pub fn regions_at(&self, point: Point2) -> Vec<&RegionId> {
        let candidates = self
            .tree
            .locate_in_envelope_intersecting(&AABB::from_point(point))
            .map(|entry| entry.index)
            .filter(|index| self.regions[*index].contains_point(point));
        self.sorted_by_area(candidates)
    }

    /// Regions that enclose region `id`, smallest first.
    pub fn regions_covering(&self, id: &RegionId) -> Vec<&RegionId> {
        let Some((index, _, region)) = self.regions.get_full(id) else {
            return Vec::new();
        };
        let candidates: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&region.envelope_aabb())
            .map(|entry| entry.index)
            .filter(|other| *other != index && self.regions[*other].contains_region(region))
            .collect();
        self.sorted_by_area(candidates)
    }

    /// Regions enclosed by region `id`, smallest first.
    pub fn regions_inside(&self, id: &RegionId) -> Vec<&RegionId> {
        let Some((index, _, region)) = self.regions.get_full(id) else {
            return Vec::new();
        };
        let candidates: Vec<usize> = self
            .tree
            .locate_in_envelope(&region.envelope_aabb())
            .map(|entry| entry.index)
            .filter(|other| *other != index && region.contains_region(&self.regions[*other]))
            .collect();
        self.sorted_by_area(candidates)
    }

    /// Shortest chain of adjacent regions from `from` to `to`, both included,
    /// measured by centroid distance.
    pub fn region_path(&self, from: &RegionId, to: &RegionId) -> Option<Vec<RegionId>> {
        let start = self.regions.get_index_of(from)?;
        let goal = self.regions.get_index_of(to)?;
        let goal_centroid = self.regions[goal].centroid;
        let (_, path) = astar(
            &self.adjacency,
            start,
            |node| node == goal,
            |(a, b, _): (usize, usize, &())| self.regions[a].centroid.distance(self.regions[b].centroid),
            |node| self.regions[node].centroid.distance(goal_centroid),
        )?;
        path.into_iter().map(|index| self.id_at(index).cloned()).collect()
    }

    fn id_at(&self, index: usize) -> Option<&RegionId> {
        self.regions.get_index(index).map(|(id, _)| id)
    }

    fn sorted_by_area(&self, indices: impl IntoIterator<Item = usize>) -> Vec<&RegionId> {
        let mut regions: Vec<&Region> = indices.into_iter().map(|index| &self.regions[index]).collect();
        regions.sort_by(|a, b| a.area.total_cmp(&b.area).then_with(|| a.id.cmp(&b.id)));
        regions.into_iter().map(|region| &region.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(id: &str, x: f64, y: f64, size: f64) -> Region {
        let rect = Rect::new(Point2::new(x, y), Point2::new(x + size, y + size));
        Region::new(id, vec![Polygon::rect(&rect)]).unwrap()
    }

    fn strip() -> RegionModel {
        RegionModel::new(
            vec![
                square("a", 0.0, 0.0, 10.0),
                square("b", 10.0, 0.0, 10.0),
                square("c", 20.0, 0.0, 10.0),
                square("island", 50.0, 50.0, 5.0),
            ],
            0.0,
        )
        .unwrap()
    }

    #[test]
    fn touching_regions_are_adjacent() {
        let model = strip();
        assert!(model.are_adjacent(&"a".into(), &"b".into()));
        assert!(model.are_adjacent(&"c".into(), &"b".into()));
        assert!(!model.are_adjacent(&"a".into(), &"c".into()));
        assert!(!model.are_adjacent(&"a".into(), &"island".into()));
        let neighbours: Vec<&str> = model.neighbours(&"b".into()).into_iter().map(RegionId::as_str).collect();
        assert_eq!(neighbours, vec!["a", "c"]);
    }

    #[test]
    fn region_path_follows_adjacency() {
        let mut model = strip();
        let path = model.region_path(&"a".into(), &"c".into()).unwrap();
        assert_eq!(path, vec![RegionId::from("a"), "b".into(), "c".into()]);
        assert!(model.region_path(&"a".into(), &"island".into()).is_none());
        assert!(model.connect(&"c".into(), &"island".into()));
        assert_eq!(model.region_path(&"a".into(), &"island".into()).map(|p| p.len()), Some(4));
    }

    #[test]
    fn duplicate_regions_are_rejected() {
        let result = RegionModel::new(vec![square("a", 0.0, 0.0, 1.0), square("a", 5.0, 0.0, 1.0)], 0.0);
        assert_eq!(result.err(), Some(ReferentialError::DuplicateRegion("a".into())));
    }

    #[test]
    fn containment_queries_sort_by_area() {
        let model = RegionModel::new(
            vec![
                square("outer", 0.0, 0.0, 100.0),
                square("middle", 10.0, 10.0, 50.0),
                square("inner", 20.0, 20.0, 10.0),
            ],
            0.0,
        )
        .unwrap();
        let at: Vec<&str> = model.regions_at(Point2::new(25.0, 25.0)).into_iter().map(RegionId::as_str).collect();
        assert_eq!(at, vec!["inner", "middle", "outer"]);
        let covering: Vec<&str> = model.regions_covering(&"inner".into()).into_iter().map(RegionId::as_str).collect();
        assert_eq!(covering, vec!["middle", "outer"]);
        let inside: Vec<&str> = model.regions_inside(&"outer".into()).into_iter().map(RegionId::as_str).collect();
        assert_eq!(inside, vec!["inner", "middle"]);
    }

    #[test]
    fn crossing_points_are_ordered_along_the_line() {
        let region = square("a", 0.0, 0.0, 10.0);
        let points = region.boundary_crossing_points(Point2::new(15.0, 5.0), Point2::new(-5.0, 5.0), 1e-9);
        assert_eq!(points, vec![Point2::new(10.0, 5.0), Point2::new(0.0, 5.0)]);
        let outside = region.boundary_crossing_points(Point2::new(15.0, 15.0), Point2::new(20.0, 5.0), 1e-9);
        assert!(outside.is_empty());
    }

    #[test]
    fn degenerate_region_is_its_centroid() {
        let region = Region::degenerate("dot", Point2::new(5.0, 5.0));
        assert!(region.is_degenerate());
        assert!(point_in_region(Point2::new(5.0, 5.0), &region));
        assert!(!point_in_region(Point2::new(5.0, 5.1), &region));
        let through = region.boundary_crossing_points(Point2::new(0.0, 0.0), Point2::new(10.0, 10.0), 1e-9);
        assert_eq!(through, vec![Point2::new(5.0, 5.0)]);
        assert!(region
            .boundary_crossing_points(Point2::new(0.0, 1.0), Point2::new(10.0, 1.0), 1e-9)
            .is_empty());
        assert_eq!(Region::new("empty", Vec::new()), Err(GeometryError::EmptyInput));
    }
}
