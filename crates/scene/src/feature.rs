//! GeoJSON-like feature model as returned by the vector feature service.
//!
//! Parsing is lenient: string ids, `null` properties and unsupported geometry
//! kinds are accepted and simply carry less information.

use std::collections::BTreeSet;

use foundation::{Aabb2, FeatureId, LngLat};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

pub type Properties = Map<String, Value>;

/// `[lon, lat]` with optional trailing ordinates (altitude, measure).
pub type Position = Vec<f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Position),
    MultiPoint(Vec<Position>),
    LineString(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
    Polygon(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

impl Geometry {
    pub fn for_each_position(&self, mut f: impl FnMut(&Position)) {
        match self {
            Geometry::Point(p) => f(p),
            Geometry::MultiPoint(ps) | Geometry::LineString(ps) => ps.iter().for_each(f),
            Geometry::MultiLineString(rings) | Geometry::Polygon(rings) => {
                rings.iter().flatten().for_each(f)
            }
            Geometry::MultiPolygon(polys) => polys.iter().flatten().flatten().for_each(f),
        }
    }

    pub fn bounds(&self) -> Option<Aabb2> {
        let mut points: Vec<LngLat> = Vec::new();
        self.for_each_position(|p| {
            if let [lon, lat, ..] = p.as_slice() {
                points.push([*lon, *lat]);
            }
        });
        Aabb2::from_points(points)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_id",
        deserialize_with = "deserialize_numeric_id"
    )]
    pub id: Option<FeatureId>,
    #[serde(default, deserialize_with = "deserialize_lenient_geometry")]
    pub geometry: Option<Geometry>,
    #[serde(default, deserialize_with = "deserialize_null_as_empty")]
    pub properties: Properties,
}

impl Feature {
    pub fn new(geometry: Option<Geometry>, properties: Properties) -> Self {
        Self {
            id: None,
            geometry,
            properties,
        }
    }

    pub fn with_id(mut self, id: FeatureId) -> Self {
        self.id = Some(id);
        self
    }

    /// String-valued property, if present.
    pub fn property_str(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(Value::as_str)
    }

    pub fn bounds(&self) -> Option<Aabb2> {
        self.geometry.as_ref().and_then(Geometry::bounds)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(default)]
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self { features }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Gives every feature without an id a stable integer one.
    ///
    /// A missing id becomes the feature's index in the collection unless that
    /// value is already taken, in which case the lowest free value is used.
    /// Identical input always yields identical ids. Returns how many ids were
    /// assigned.
    pub fn assign_stable_ids(&mut self) -> usize {
        let mut taken: BTreeSet<u64> = self
            .features
            .iter()
            .filter_map(|f| f.id.map(FeatureId::get))
            .collect();
        let mut spare = 0u64;
        let mut assigned = 0usize;

        for (index, feature) in self.features.iter_mut().enumerate() {
            if feature.id.is_some() {
                continue;
            }
            let mut candidate = index as u64;
            while taken.contains(&candidate) {
                candidate = spare;
                spare += 1;
            }
            taken.insert(candidate);
            feature.id = Some(FeatureId(candidate));
            assigned += 1;
        }
        assigned
    }

    pub fn feature(&self, id: FeatureId) -> Option<&Feature> {
        self.features.iter().find(|f| f.id == Some(id))
    }

    pub fn find_by_property(&self, name: &str, value: &str) -> Option<&Feature> {
        self.features
            .iter()
            .find(|f| f.property_str(name) == Some(value))
    }

    pub fn bounds(&self) -> Option<Aabb2> {
        self.features
            .iter()
            .filter_map(Feature::bounds)
            .reduce(|a, b| a.union(&b))
    }
}

fn serialize_id<S: Serializer>(id: &Option<FeatureId>, s: S) -> Result<S::Ok, S::Error> {
    match id {
        Some(id) => s.serialize_u64(id.get()),
        None => s.serialize_none(),
    }
}

// Non-numeric ids (e.g. "kabupaten.12") are dropped and reassigned at ingestion.
fn deserialize_numeric_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<FeatureId>, D::Error> {
    let raw = Option::<Value>::deserialize(d)?;
    Ok(raw.as_ref().and_then(Value::as_u64).map(FeatureId))
}

fn deserialize_lenient_geometry<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<Option<Geometry>, D::Error> {
    let raw = Option::<Value>::deserialize(d)?;
    Ok(raw.and_then(|v| serde_json::from_value(v).ok()))
}

fn deserialize_null_as_empty<'de, D: Deserializer<'de>>(d: D) -> Result<Properties, D::Error> {
    Ok(Option::<Properties>::deserialize(d)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::{Feature, FeatureCollection, Geometry};
    use foundation::{Aabb2, FeatureId};
    use pretty_assertions::assert_eq;

    fn parse(raw: &str) -> FeatureCollection {
        serde_json::from_str(raw).expect("parse collection")
    }

    #[test]
    fn parses_wfs_output_leniently() {
        let fc = parse(
            r#"{
                "type": "FeatureCollection",
                "features": [
                    {"type": "Feature", "id": "kabupaten.1",
                     "geometry": {"type": "Polygon", "coordinates": [[[0,0],[2,0],[2,1],[0,0]]]},
                     "properties": {"kab": "Sintang"}},
                    {"type": "Feature", "id": 7, "geometry": null, "properties": null},
                    {"type": "Feature",
                     "geometry": {"type": "GeometryCollection", "geometries": []},
                     "properties": {"kab": "Siak"}}
                ]
            }"#,
        );
        assert_eq!(fc.len(), 3);
        assert_eq!(fc.features[0].id, None);
        assert_eq!(fc.features[0].property_str("kab"), Some("Sintang"));
        assert_eq!(fc.features[1].id, Some(FeatureId(7)));
        assert!(fc.features[1].properties.is_empty());
        assert_eq!(fc.features[2].geometry, None);
    }

    #[test]
    fn multipolygon_bounds_cover_every_ring() {
        let g = Geometry::MultiPolygon(vec![
            vec![vec![vec![0.0, 0.0], vec![1.0, 1.0, 50.0]]],
            vec![vec![vec![-4.0, 3.0], vec![2.0, -1.0]]],
        ]);
        assert_eq!(g.bounds(), Some(Aabb2::new([-4.0, -1.0], [2.0, 3.0])));
    }

    #[test]
    fn assigned_ids_are_stable_and_avoid_existing_ones() {
        let mut fc = FeatureCollection::new(vec![
            Feature::default(),
            Feature::default().with_id(FeatureId(0)),
            Feature::default(),
        ]);
        let mut again = fc.clone();

        assert_eq!(fc.assign_stable_ids(), 2);
        let ids: Vec<_> = fc.features.iter().map(|f| f.id.unwrap().get()).collect();
        assert_eq!(ids, vec![1, 0, 2]);

        again.assign_stable_ids();
        assert_eq!(again, fc);
        // Already-identified collections are left alone.
        assert_eq!(fc.assign_stable_ids(), 0);
    }

    #[test]
    fn ids_survive_a_cache_round_trip() {
        let mut fc = FeatureCollection::new(vec![Feature::default(), Feature::default()]);
        fc.assign_stable_ids();
        let raw = serde_json::to_string(&fc).unwrap();
        let back: FeatureCollection = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, fc);
    }
}
