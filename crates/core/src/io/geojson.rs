//! GeoJSON reading and writing for polygon layers
//!
//! Only `Polygon` and `MultiPolygon` geometries are kept; any other geometry
//! type is read as a feature without geometry. Property order is preserved
//! so that a layer written back out keeps its field schema.

use geo_types::{Coord, Geometry, LineString, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::vector::{AttributeValue, Feature, FeatureCollection};

type Ring = Vec<Vec<f64>>;

#[derive(Debug, Serialize, Deserialize)]
struct GeoJsonCollection {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    crs: Option<GeoJsonCrs>,
    features: Vec<GeoJsonFeature>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeoJsonCrs {
    #[serde(rename = "type")]
    kind: String,
    properties: GeoJsonCrsProperties,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeoJsonCrsProperties {
    name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeoJsonFeature {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<Value>,
    #[serde(default)]
    properties: Option<Map<String, Value>>,
    #[serde(default)]
    geometry: Option<GeoJsonGeometry>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
enum GeoJsonGeometry {
    Polygon {
        coordinates: Vec<Ring>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Ring>>,
    },
    #[serde(other)]
    Unsupported,
}

/// Read a GeoJSON FeatureCollection from disk
pub fn read_geojson<P: AsRef<Path>>(path: P) -> Result<FeatureCollection> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let doc: GeoJsonCollection = serde_json::from_reader(reader)
        .map_err(|e| Error::Vector(format!("{}: {}", path.display(), e)))?;
    from_document(doc)
}

/// Parse a GeoJSON FeatureCollection from a string
pub fn read_geojson_from_str(text: &str) -> Result<FeatureCollection> {
    from_document(serde_json::from_str(text)?)
}

/// Write a FeatureCollection as GeoJSON, creating parent directories
pub fn write_geojson<P: AsRef<Path>>(collection: &FeatureCollection, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, &to_document(collection))?;
    writer.flush()?;
    Ok(())
}

/// Serialize a FeatureCollection to a GeoJSON string
pub fn to_geojson_string(collection: &FeatureCollection) -> Result<String> {
    Ok(serde_json::to_string(&to_document(collection))?)
}

fn from_document(doc: GeoJsonCollection) -> Result<FeatureCollection> {
    if doc.kind != "FeatureCollection" {
        return Err(Error::Vector(format!(
            "expected a FeatureCollection, found '{}'",
            doc.kind
        )));
    }

    let mut collection = FeatureCollection::new();
    collection.crs = doc
        .crs
        .as_ref()
        .and_then(|c| CRS::from_ogc_name(&c.properties.name));

    for (idx, raw) in doc.features.into_iter().enumerate() {
        let geometry = match raw.geometry {
            Some(g) => geometry_from_json(g)
                .map_err(|e| Error::Vector(format!("feature {}: {}", idx, e)))?,
            None => None,
        };

        let mut feature = Feature {
            geometry,
            properties: Default::default(),
            id: raw.id.map(|v| match v {
                Value::String(s) => s,
                other => other.to_string(),
            }),
        };
        for (key, value) in raw.properties.unwrap_or_default() {
            collection.add_field(key.as_str());
            feature.set_property(key, attribute_from_json(value));
        }
        collection.push(feature);
    }

    Ok(collection)
}

fn to_document(collection: &FeatureCollection) -> GeoJsonCollection {
    let crs = collection
        .crs
        .as_ref()
        .and_then(CRS::ogc_urn)
        .map(|name| GeoJsonCrs {
            kind: "name".into(),
            properties: GeoJsonCrsProperties { name },
        });

    let features = collection
        .iter()
        .map(|f| {
            let mut properties = Map::new();
            for field in &collection.fields {
                let value = f
                    .get_property(field)
                    .map(attribute_to_json)
                    .unwrap_or(Value::Null);
                properties.insert(field.clone(), value);
            }
            GeoJsonFeature {
                kind: "Feature".into(),
                id: f.id.clone().map(Value::String),
                properties: Some(properties),
                geometry: f.geometry.as_ref().and_then(geometry_to_json),
            }
        })
        .collect();

    GeoJsonCollection {
        kind: "FeatureCollection".into(),
        name: None,
        crs,
        features,
    }
}

fn attribute_from_json(value: Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null,
        Value::Bool(b) => AttributeValue::Bool(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => AttributeValue::Int(i),
            None => n
                .as_f64()
                .map(AttributeValue::Float)
                .unwrap_or(AttributeValue::Null),
        },
        Value::String(s) => AttributeValue::String(s),
        other => AttributeValue::String(other.to_string()),
    }
}

fn attribute_to_json(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::Null => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Int(i) => Value::from(*i),
        AttributeValue::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        AttributeValue::String(s) => Value::String(s.clone()),
    }
}

fn ring_from_json(ring: Ring) -> std::result::Result<LineString<f64>, String> {
    ring.into_iter()
        .map(|pos| match pos.as_slice() {
            [x, y, ..] => Ok(Coord { x: *x, y: *y }),
            _ => Err(format!("position with {} ordinates", pos.len())),
        })
        .collect::<std::result::Result<Vec<_>, _>>()
        .map(LineString::new)
}

fn polygon_from_json(rings: Vec<Ring>) -> std::result::Result<Polygon<f64>, String> {
    let mut rings = rings.into_iter();
    let exterior = match rings.next() {
        Some(r) => ring_from_json(r)?,
        None => return Err("polygon without an exterior ring".into()),
    };
    let interiors = rings.map(ring_from_json).collect::<std::result::Result<_, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn geometry_from_json(
    geometry: GeoJsonGeometry,
) -> std::result::Result<Option<Geometry<f64>>, String> {
    match geometry {
        GeoJsonGeometry::Polygon { coordinates } => {
            Ok(Some(Geometry::Polygon(polygon_from_json(coordinates)?)))
        }
        GeoJsonGeometry::MultiPolygon { coordinates } => {
            let polys = coordinates
                .into_iter()
                .map(polygon_from_json)
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(Some(Geometry::MultiPolygon(MultiPolygon(polys))))
        }
        GeoJsonGeometry::Unsupported => Ok(None),
    }
}

fn ring_to_json(ring: &LineString<f64>) -> Ring {
    ring.coords().map(|c| vec![c.x, c.y]).collect()
}

fn polygon_to_json(polygon: &Polygon<f64>) -> Vec<Ring> {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(ring_to_json)
        .collect()
}

fn geometry_to_json(geometry: &Geometry<f64>) -> Option<GeoJsonGeometry> {
    match geometry {
        Geometry::Polygon(p) => Some(GeoJsonGeometry::Polygon {
            coordinates: polygon_to_json(p),
        }),
        Geometry::MultiPolygon(mp) => Some(GeoJsonGeometry::MultiPolygon {
            coordinates: mp.iter().map(polygon_to_json).collect(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_UNITS: &str = r#"{
        "type": "FeatureCollection",
        "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::32631"}},
        "features": [
            {"type": "Feature",
             "properties": {"name": "north", "pop_female": 0.5, "pop_male": 0.5},
             "geometry": {"type": "Polygon",
                          "coordinates": [[[0,0],[10,0],[10,10],[0,10],[0,0]]]}},
            {"type": "Feature",
             "properties": {"name": "south", "pop_female": 0.25, "pop_male": 0.75},
             "geometry": {"type": "MultiPolygon",
                          "coordinates": [[[[0,-10],[10,-10],[10,0],[0,0],[0,-10]]]]}},
            {"type": "Feature",
             "properties": {"name": "point"},
             "geometry": {"type": "Point", "coordinates": [1, 2]}}
        ]
    }"#;

    #[test]
    fn test_read_collection() {
        let fc = read_geojson_from_str(TWO_UNITS).unwrap();
        assert_eq!(fc.len(), 3);
        assert_eq!(fc.fields, vec!["name", "pop_female", "pop_male"]);
        assert_eq!(fc.crs.as_ref().and_then(|c| c.epsg()), Some(32631));
        assert_eq!(
            fc.features[1].get_property("pop_male").and_then(|v| v.as_f64()),
            Some(0.75)
        );
        assert!(matches!(fc.features[1].geometry, Some(Geometry::MultiPolygon(_))));
        assert!(fc.features[2].geometry.is_none());
    }

    #[test]
    fn test_written_layer_keeps_schema_and_crs() {
        let mut fc = read_geojson_from_str(TWO_UNITS).unwrap();
        fc.add_field("adm_unit_id");
        for (i, f) in fc.features.iter_mut().enumerate() {
            f.set_property("adm_unit_id", AttributeValue::Int(i as i64));
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("aois.geojson");
        write_geojson(&fc, &path).unwrap();
        let back = read_geojson(&path).unwrap();

        assert_eq!(back.fields, vec!["name", "pop_female", "pop_male", "adm_unit_id"]);
        assert_eq!(back.crs.as_ref().and_then(|c| c.epsg()), Some(32631));
        assert_eq!(
            back.features[2].get_property("adm_unit_id"),
            Some(&AttributeValue::Int(2))
        );
        assert_eq!(
            back.features[2].get_property("pop_female"),
            Some(&AttributeValue::Null)
        );
    }

    #[test]
    fn test_rejects_bare_feature() {
        let err = read_geojson_from_str(r#"{"type": "Feature", "features": []}"#);
        assert!(matches!(err, Err(Error::Vector(_))));
    }
}
