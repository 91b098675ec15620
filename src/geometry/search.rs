use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::network::{FeatureId, FeatureNode};

use super::Point2;

/// Closest candidate to `point` by anchor distance. Equal distances resolve
/// to the smallest feature id.
pub fn nearest_feature<'a>(point: Point2, candidates: &'a [FeatureNode]) -> Option<&'a FeatureNode> {
    candidates.iter().min_by(|a, b| {
        a.anchor
            .distance_2(point)
            .total_cmp(&b.anchor.distance_2(point))
            .then_with(|| a.id.cmp(&b.id))
    })
}

#[derive(Clone, Debug, PartialEq)]
struct IndexedAnchor {
    anchor: Point2,
    id: FeatureId,
}

impl RTreeObject for IndexedAnchor {
    type Envelope = AABB<Point2>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.anchor)
    }
}

impl PointDistance for IndexedAnchor {
    fn distance_2(&self, point: &Point2) -> f64 {
        self.anchor.distance_2(*point)
    }
}

/// Spatial index over feature anchors for repeated nearest queries.
pub struct FeatureIndex {
    tree: RTree<IndexedAnchor>,
}

impl FeatureIndex {
    pub fn new<'a>(features: impl IntoIterator<Item = &'a FeatureNode>) -> Self {
        let anchors = features
            .into_iter()
            .map(|feature| IndexedAnchor {
                anchor: feature.anchor,
                id: feature.id.clone(),
            })
            .collect();
        FeatureIndex {
            tree: RTree::bulk_load(anchors),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    pub fn nearest(&self, point: Point2) -> Option<&FeatureId> {
        let mut neighbours = self.tree.nearest_neighbor_iter_with_distance_2(&point);
        let (first, best) = neighbours.next()?;
        let mut nearest = &first.id;
        for (candidate, distance) in neighbours {
            if distance > best {
                break;
            }
            if candidate.id < *nearest {
                nearest = &candidate.id;
            }
        }
        Some(nearest)
    }

    /// Features whose anchor lies within `radius` of `point`, by ascending id.
    pub fn within(&self, point: Point2, radius: f64) -> Vec<&FeatureId> {
        let mut found: Vec<&FeatureId> = self
            .tree
            .locate_within_distance(point, radius * radius)
            .map(|anchor| &anchor.id)
            .collect();
        found.sort();
        found
    }
}
