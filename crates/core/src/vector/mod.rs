//! Vector data structures
//!
//! A [`FeatureCollection`] behaves like a single-layer vector dataset: an
//! ordered field schema, a CRS and polygon features with attributes.

use geo_types::{Geometry, MultiPolygon};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::crs::CRS;

/// Attribute value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    /// Numeric view of the value; strings are parsed, null is `None`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Null => None,
            AttributeValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            AttributeValue::Int(i) => Some(*i as f64),
            AttributeValue::Float(f) => Some(*f),
            AttributeValue::String(s) => s.trim().parse().ok(),
        }
    }
}

/// A geographic feature with geometry and attributes
#[derive(Debug, Clone)]
pub struct Feature {
    /// Feature geometry
    pub geometry: Option<Geometry<f64>>,
    /// Feature attributes
    pub properties: HashMap<String, AttributeValue>,
    /// Optional feature ID
    pub id: Option<String>,
}

impl Feature {
    /// Create a new feature with geometry
    pub fn new(geometry: Geometry<f64>) -> Self {
        Self {
            geometry: Some(geometry),
            properties: HashMap::new(),
            id: None,
        }
    }

    /// Set an attribute
    pub fn set_property(&mut self, key: impl Into<String>, value: AttributeValue) {
        self.properties.insert(key.into(), value);
    }

    /// Get an attribute
    pub fn get_property(&self, key: &str) -> Option<&AttributeValue> {
        self.properties.get(key)
    }

    /// Polygonal area covered by the feature.
    ///
    /// Polygons are promoted to single-member multipolygons; other geometry
    /// types cover nothing.
    pub fn polygons(&self) -> MultiPolygon<f64> {
        match &self.geometry {
            Some(Geometry::Polygon(p)) => MultiPolygon(vec![p.clone()]),
            Some(Geometry::MultiPolygon(mp)) => mp.clone(),
            _ => MultiPolygon(Vec::new()),
        }
    }
}

/// Collection of features sharing one field schema
#[derive(Debug, Clone, Default)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
    /// Field names in schema order
    pub fields: Vec<String>,
    pub crs: Option<CRS>,
}

impl FeatureCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, feature: Feature) {
        for key in feature.properties.keys() {
            if !self.fields.iter().any(|f| f == key) {
                self.fields.push(key.clone());
            }
        }
        self.features.push(feature);
    }

    /// Append a field to the schema, leaving existing features unset
    pub fn add_field(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.fields.contains(&name) {
            self.fields.push(name);
        }
    }

    /// Field names matching a prefix, in schema order
    pub fn fields_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }
}

impl IntoIterator for FeatureCollection {
    type Item = Feature;
    type IntoIter = std::vec::IntoIter<Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::polygon;

    #[test]
    fn test_schema_follows_first_seen_order() {
        let square = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)];
        let mut fc = FeatureCollection::new();
        let mut f = Feature::new(Geometry::Polygon(square));
        f.set_property("name", AttributeValue::String("a".into()));
        fc.push(f);
        fc.add_field("pop_children");
        fc.add_field("pop_adults");
        fc.add_field("name");

        assert_eq!(fc.fields, vec!["name", "pop_children", "pop_adults"]);
        assert_eq!(fc.fields_with_prefix("pop_"), vec!["pop_children", "pop_adults"]);
        assert_eq!(fc.features[0].polygons().0.len(), 1);
    }

    #[test]
    fn test_attribute_numeric_view() {
        assert_eq!(AttributeValue::Int(3).as_f64(), Some(3.0));
        assert_eq!(AttributeValue::String(" 0.25 ".into()).as_f64(), Some(0.25));
        assert_eq!(AttributeValue::Null.as_f64(), None);
    }
}
