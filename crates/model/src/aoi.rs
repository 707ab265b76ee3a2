//! Administrative units
//!
//! Units are identified by their position in the source layer: the first
//! feature gets `adm_unit_id = 0`. Fields named `pop_<group>` hold the share
//! of a unit's population belonging to `<group>`.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use greenaccess_algorithms::vector::measure_overlap;
use greenaccess_core::crs::ensure_compatible;
use greenaccess_core::io::{read_geojson, to_geojson_string, write_geojson};
use greenaccess_core::vector::{AttributeValue, FeatureCollection};
use greenaccess_core::{Error, Result, CRS};

pub const ID_FIELD: &str = "adm_unit_id";
pub const POP_FIELD_PREFIX: &str = "pop_";

/// A population group declared by a `pop_<group>` field
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PopGroup {
    field: String,
}

impl PopGroup {
    pub fn from_field(field: impl Into<String>) -> Option<Self> {
        let field = field.into();
        if field.len() > POP_FIELD_PREFIX.len() && field.starts_with(POP_FIELD_PREFIX) {
            Some(Self { field })
        } else {
            None
        }
    }

    /// Vector field holding the group's proportion, e.g. `pop_female`
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Group name without the field prefix, e.g. `female`
    pub fn name(&self) -> &str {
        &self.field[POP_FIELD_PREFIX.len()..]
    }
}

/// Identified administrative units and their population groups
#[derive(Debug, Clone)]
pub struct AdminUnits {
    pub layer: FeatureCollection,
    pub groups: Vec<PopGroup>,
}

impl AdminUnits {
    /// Load the source layer, check it against the working projection and
    /// assign unit IDs.
    ///
    /// A layer without a CRS is taken to be in `target_crs`. A layer in a
    /// different projected CRS is rejected.
    pub fn prepare(vector_path: &Path, target_crs: Option<&CRS>) -> Result<Self> {
        let mut layer = read_geojson(vector_path)?;
        ensure_compatible(layer.crs.as_ref(), target_crs)?;
        if layer.crs.is_none() {
            layer.crs = target_crs.cloned();
        }

        layer.add_field(ID_FIELD);
        for (id, feature) in layer.features.iter_mut().enumerate() {
            feature.set_property(ID_FIELD, AttributeValue::Int(id as i64));
        }

        let units = Self::from_layer(layer)?;
        info!(
            "loaded {} administrative units with {} population group(s)",
            units.layer.len(),
            units.groups.len()
        );
        Ok(units)
    }

    /// Read a layer that already carries unit IDs
    pub fn load_identified(path: &Path) -> Result<Self> {
        Self::from_layer(read_geojson(path)?)
    }

    fn from_layer(layer: FeatureCollection) -> Result<Self> {
        let mut groups: Vec<PopGroup> = layer
            .fields_with_prefix(POP_FIELD_PREFIX)
            .into_iter()
            .filter_map(PopGroup::from_field)
            .collect();
        groups.sort();
        let units = Self { layer, groups };
        for group in &units.groups {
            units.proportions(group)?;
        }
        Ok(units)
    }

    /// Write the layer as GeoJSON. An identical existing file is left
    /// untouched so tasks reading it stay up to date.
    pub fn write(&self, path: &Path) -> Result<()> {
        let text = to_geojson_string(&self.layer)?;
        if fs::read_to_string(path).is_ok_and(|existing| existing == text) {
            debug!("{} is unchanged", path.display());
            return Ok(());
        }
        write_geojson(&self.layer, path)
    }

    /// Unit ID of every feature, in layer order
    pub fn ids(&self) -> Result<Vec<i64>> {
        self.layer
            .iter()
            .enumerate()
            .map(|(idx, f)| {
                f.get_property(ID_FIELD)
                    .and_then(AttributeValue::as_f64)
                    .map(|v| v as i64)
                    .ok_or_else(|| {
                        Error::Vector(format!("feature {} has no {} value", idx, ID_FIELD))
                    })
            })
            .collect()
    }

    /// `{unit ID -> proportion}` for one group.
    ///
    /// A unit without a value for the group contributes no population to it.
    /// Values outside `[0, 1]` are rejected.
    pub fn proportions(&self, group: &PopGroup) -> Result<HashMap<i64, f64>> {
        let mut map = HashMap::with_capacity(self.layer.len());
        for (id, feature) in self.ids()?.into_iter().zip(self.layer.iter()) {
            let value = feature
                .get_property(group.field())
                .and_then(AttributeValue::as_f64)
                .unwrap_or(0.0);
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::InvalidParameter {
                    name: "aoi_vector_path",
                    value: format!("{}={} in unit {}", group.field(), value, id),
                    reason: "population group proportions must lie in [0, 1]".into(),
                });
            }
            map.insert(id, value);
        }
        Ok(map)
    }

    /// Find a group by field name (`pop_female`) or bare name (`female`)
    pub fn group(&self, key: &str) -> Option<&PopGroup> {
        let key = key.trim();
        self.groups
            .iter()
            .find(|g| g.field() == key || g.name() == key)
    }

    /// Warn when units overlap; overlapping units bias per-group supply.
    pub fn warn_if_overlapping(&self) -> bool {
        let report = measure_overlap(&self.layer);
        if report.overlaps() {
            warn!(
                "Some administrative boundaries overlap ({:.2}% of their area), which will \
                 affect the accuracy of supply rasters per population group",
                report.overlap_fraction() * 100.0
            );
        }
        report.overlaps()
    }
}
