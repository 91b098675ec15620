use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ReferentialError;
use crate::geometry::Point2;
use crate::region::{RegionId, RegionModel};

string_id!(
    /// Identifier of a feature node (region or point) used as an endpoint.
    FeatureId
);
string_id!(
    /// Identifier of a connection; also the id of its routed path.
    ConnectionId
);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeatureKind {
    Region,
    PointNode,
    Unclassified,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureNode {
    pub id: FeatureId,
    pub kind: FeatureKind,
    #[serde(default)]
    pub region: Option<RegionId>,
    pub anchor: Point2,
}

impl FeatureNode {
    pub fn new(id: impl Into<FeatureId>, kind: FeatureKind, region: Option<RegionId>, anchor: Point2) -> Self {
        FeatureNode {
            id: id.into(),
            kind,
            region,
            anchor,
        }
    }
}

/// Opaque metadata value carried through layout untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Number(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

pub type Properties = BTreeMap<String, PropertyValue>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub source: FeatureId,
    pub target: FeatureId,
    #[serde(default)]
    pub via: Vec<RegionId>,
    #[serde(default)]
    pub properties: Properties,
}

impl Connection {
    pub fn new(
        id: impl Into<ConnectionId>,
        source: impl Into<FeatureId>,
        target: impl Into<FeatureId>,
        via: impl IntoIterator<Item = RegionId>,
    ) -> Self {
        Connection {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            via: via.into_iter().collect(),
            properties: Properties::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// One step of a connection's route. Endpoints without an owning region are
/// virtual stops of their own.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "kebab-case")]
pub enum Stop {
    Region(RegionId),
    Feature(FeatureId),
}

impl fmt::Display for Stop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stop::Region(id) => write!(f, "{id}"),
            Stop::Feature(id) => write!(f, "@{id}"),
        }
    }
}

/// Unordered pair of stops, stored as (min, max).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CorridorKey {
    pub low: Stop,
    pub high: Stop,
}

impl CorridorKey {
    pub fn new(a: Stop, b: Stop) -> Self {
        if a <= b {
            CorridorKey { low: a, high: b }
        } else {
            CorridorKey { low: b, high: a }
        }
    }
}

impl fmt::Display for CorridorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.low, self.high)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorridorMember {
    pub connection: ConnectionId,
    /// Index of the leg (stops `leg`, `leg + 1`) of the connection's route.
    pub leg: usize,
    /// Runs from `high` to `low`.
    pub reversed: bool,
}

/// Connections sharing a pair of consecutive stops, in ascending id order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Corridor {
    pub key: CorridorKey,
    pub members: Vec<CorridorMember>,
}

impl Corridor {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn member(&self, connection: &ConnectionId) -> Option<&CorridorMember> {
        self.members.iter().find(|member| &member.connection == connection)
    }
}

/// Features and connections of one map build, checked for referential
/// integrity and immutable afterwards.
#[derive(Clone, Debug)]
pub struct Network {
    features: IndexMap<FeatureId, FeatureNode>,
    connections: IndexMap<ConnectionId, Connection>,
}

impl Network {
    pub fn build(
        regions: &RegionModel,
        features: impl IntoIterator<Item = FeatureNode>,
        connections: impl IntoIterator<Item = Connection>,
    ) -> Result<Network, ReferentialError> {
        let mut feature_map = IndexMap::new();
        for feature in features {
            if let Some(region) = &feature.region {
                if !regions.contains(region) {
                    return Err(ReferentialError::UnknownFeatureRegion {
                        feature: feature.id,
                        region: region.clone(),
                    });
                }
            }
            if feature_map.contains_key(&feature.id) {
                return Err(ReferentialError::DuplicateFeature(feature.id));
            }
            feature_map.insert(feature.id.clone(), feature);
        }

        let mut connection_map = IndexMap::new();
        for connection in connections {
            for endpoint in [&connection.source, &connection.target] {
                if !feature_map.contains_key(endpoint) {
                    return Err(ReferentialError::UnknownFeature {
                        connection: connection.id.clone(),
                        feature: endpoint.clone(),
                    });
                }
            }
            if let Some(region) = connection.via.iter().find(|region| !regions.contains(region)) {
                return Err(ReferentialError::UnknownRegion {
                    connection: connection.id.clone(),
                    region: region.clone(),
                });
            }
            if connection_map.contains_key(&connection.id) {
                return Err(ReferentialError::DuplicateConnection(connection.id));
            }
            connection_map.insert(connection.id.clone(), connection);
        }

        feature_map.sort_keys();
        connection_map.sort_keys();
        debug!(
            features = feature_map.len(),
            connections = connection_map.len(),
            "built connection network"
        );
        Ok(Network {
            features: feature_map,
            connections: connection_map,
        })
    }

    pub fn feature(&self, id: &FeatureId) -> Option<&FeatureNode> {
        self.features.get(id)
    }

    pub fn connection(&self, id: &ConnectionId) -> Option<&Connection> {
        self.connections.get(id)
    }

    pub fn features(&self) -> impl Iterator<Item = &FeatureNode> {
        self.features.values()
    }

    /// Connections in ascending id order.
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn endpoint_stop(&self, id: &FeatureId) -> Stop {
        match self.features.get(id).and_then(|feature| feature.region.clone()) {
            Some(region) => Stop::Region(region),
            None => Stop::Feature(id.clone()),
        }
    }

    /// Source stop, via regions and target stop with repeats collapsed.
    pub fn stops(&self, connection: &Connection) -> Vec<Stop> {
        let mut stops = Vec::with_capacity(connection.via.len() + 2);
        stops.push(self.endpoint_stop(&connection.source));
        stops.extend(connection.via.iter().cloned().map(Stop::Region));
        stops.push(self.endpoint_stop(&connection.target));
        stops.dedup();
        stops
    }

    /// Group every leg of every connection by its unordered stop pair. A
    /// connection joins a corridor at most once, through its first leg there.
    pub fn corridors(&self) -> Vec<Corridor> {
        let mut grouped: BTreeMap<CorridorKey, Vec<CorridorMember>> = BTreeMap::new();
        for connection in self.connections.values() {
            let stops = self.stops(connection);
            for (leg, pair) in stops.windows(2).enumerate() {
                let key = CorridorKey::new(pair[0].clone(), pair[1].clone());
                let reversed = pair[0] != key.low;
                let members = grouped.entry(key).or_default();
                if members.iter().any(|member| member.connection == connection.id) {
                    continue;
                }
                members.push(CorridorMember {
                    connection: connection.id.clone(),
                    leg,
                    reversed,
                });
            }
        }
        grouped
            .into_iter()
            .map(|(key, members)| Corridor { key, members })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Polygon, Rect};
    use crate::region::Region;

    fn regions() -> RegionModel {
        let square = |id: &str, x: f64| {
            let rect = Rect::new(Point2::new(x, 0.0), Point2::new(x + 10.0, 10.0));
            Region::new(id, vec![Polygon::rect(&rect)]).unwrap()
        };
        RegionModel::new(vec![square("A", 0.0), square("B", 10.0), square("C", 20.0)], 0.0).unwrap()
    }

    fn point(id: &str, x: f64) -> FeatureNode {
        FeatureNode::new(id, FeatureKind::PointNode, None, Point2::new(x, 5.0))
    }

    #[test]
    fn unknown_via_region_is_rejected() {
        let result = Network::build(
            &regions(),
            vec![point("s", -5.0), point("t", 35.0)],
            vec![Connection::new("c1", "s", "t", ["A".into(), "Z".into()])],
        );
        assert_eq!(
            result.err(),
            Some(ReferentialError::UnknownRegion {
                connection: "c1".into(),
                region: "Z".into(),
            })
        );
    }

    #[test]
    fn unknown_endpoint_is_rejected() {
        let result = Network::build(
            &regions(),
            vec![point("s", -5.0)],
            vec![Connection::new("c1", "s", "missing", [])],
        );
        assert!(matches!(result, Err(ReferentialError::UnknownFeature { .. })));
    }

    #[test]
    fn corridors_ignore_direction() {
        let network = Network::build(
            &regions(),
            vec![point("s", -5.0), point("t", 35.0)],
            vec![
                Connection::new("z-forward", "s", "t", ["A".into(), "B".into()]),
                Connection::new("a-backward", "t", "s", ["B".into(), "A".into()]),
            ],
        )
        .unwrap();
        let corridors = network.corridors();
        let shared = corridors
            .iter()
            .find(|corridor| corridor.key == CorridorKey::new(Stop::Region("A".into()), Stop::Region("B".into())))
            .unwrap();
        let members: Vec<(&str, bool)> = shared
            .members
            .iter()
            .map(|member| (member.connection.as_str(), member.reversed))
            .collect();
        assert_eq!(members, vec![("a-backward", true), ("z-forward", false)]);
    }

    #[test]
    fn endpoints_inside_via_regions_collapse() {
        let network = Network::build(
            &regions(),
            vec![
                FeatureNode::new("in-a", FeatureKind::Region, Some("A".into()), Point2::new(5.0, 5.0)),
                point("t", 35.0),
            ],
            vec![Connection::new("c", "in-a", "t", ["A".into(), "B".into()]).with_property("label", "vagus")],
        )
        .unwrap();
        let connection = network.connection(&"c".into()).unwrap();
        assert_eq!(
            network.stops(connection),
            vec![
                Stop::Region("A".into()),
                Stop::Region("B".into()),
                Stop::Feature("t".into())
            ]
        );
        assert_eq!(network.corridors().len(), 2);
        assert_eq!(connection.properties["label"], PropertyValue::Text("vagus".into()));
    }
}
