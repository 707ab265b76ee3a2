//! Per-unit supply-demand summary
//!
//! Zonal sums over each administrative unit are written as new fields onto
//! a copy of the identified unit layer:
//!
//! | field | value |
//! |---|---|
//! | `SUP_DEMadm_cap` | supply-demand per capita |
//! | `SUP_DEMadm` | total supply-demand |
//! | `Pund_adm` | undersupplied population |
//! | `Povr_adm` | oversupplied population |
//!
//! plus `SUP_DEMadm_cap_<group>`, `Pund_adm_<group>` and `Povr_adm_<group>`
//! when population groups are summarized.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

use greenaccess_algorithms::statistics::{ZonalSum, Zones};
use greenaccess_core::io::{read_geotiff, write_geojson};
use greenaccess_core::raster::Raster;
use greenaccess_core::vector::AttributeValue;
use greenaccess_core::Result;

use crate::aoi::{AdminUnits, PopGroup};

/// Decimal places kept in summary fields
const FIELD_PRECISION: i32 = 11;

/// Rasters summarized for the whole population
#[derive(Debug, Clone)]
pub struct TotalLayers {
    pub supply_demand: PathBuf,
    pub population: PathBuf,
    pub undersupplied: PathBuf,
    pub oversupplied: PathBuf,
}

/// Rasters summarized for one population group
#[derive(Debug, Clone)]
pub struct GroupLayers {
    pub group: PopGroup,
    pub population: PathBuf,
    pub undersupplied: PathBuf,
    pub oversupplied: PathBuf,
    /// Only available when supply is computed per group
    pub supply_demand: Option<PathBuf>,
}

/// What the summary is computed from
#[derive(Debug, Clone)]
pub enum Summary {
    /// One supply raster, optionally broken down by group population
    SingleRaster {
        totals: TotalLayers,
        groups: Vec<GroupLayers>,
    },
    /// Supply per group; totals combine the groups
    PerGroup { groups: Vec<GroupLayers> },
}

fn round_field(value: f64) -> f64 {
    let scale = 10f64.powi(FIELD_PRECISION);
    let rounded = (value * scale).round() / scale;
    if rounded.is_finite() {
        rounded
    } else {
        value
    }
}

fn per_capita(supply_demand: f64, population: f64) -> f64 {
    if population == 0.0 {
        0.0
    } else {
        supply_demand / population
    }
}

struct ZoneSums<'a> {
    zones: &'a Zones,
}

impl ZoneSums<'_> {
    fn of(&self, path: &Path) -> Result<Vec<f64>> {
        let raster: Raster<f32> = read_geotiff(path)?;
        Ok(self.zones.sums(&raster)?.into_iter().map(|s: ZonalSum| s.sum).collect())
    }
}

/// Compute the summary and write it to `target` as GeoJSON.
pub fn write_summary(source_aois: &Path, template: &Path, summary: &Summary, target: &Path) -> Result<()> {
    let mut units = AdminUnits::load_identified(source_aois)?;
    let template: Raster<f32> = read_geotiff(template)?;
    let zones = Zones::from_features(&units.layer, &template)?;
    let sums = ZoneSums { zones: &zones };
    let n = units.layer.len();

    // field name -> value per feature, in field order
    let mut fields: Vec<(String, Vec<f64>)> = Vec::new();

    match summary {
        Summary::SingleRaster { totals, groups } => {
            let sd = sums.of(&totals.supply_demand)?;
            let pop = sums.of(&totals.population)?;
            let cap = sd.iter().zip(&pop).map(|(s, p)| per_capita(*s, *p)).collect();
            fields.push(("SUP_DEMadm_cap".into(), cap));
            fields.push(("SUP_DEMadm".into(), sd));
            fields.push(("Pund_adm".into(), sums.of(&totals.undersupplied)?));
            fields.push(("Povr_adm".into(), sums.of(&totals.oversupplied)?));
            for layers in groups {
                group_fields(&sums, layers, &mut fields)?;
            }
        }
        Summary::PerGroup { groups } => {
            let mut sd_total = vec![0.0; n];
            let mut pop_total = vec![0.0; n];
            let mut under_total = vec![0.0; n];
            let mut over_total = vec![0.0; n];
            let mut group_columns = Vec::new();
            for layers in groups {
                let group = group_fields(&sums, layers, &mut group_columns)?;
                for i in 0..n {
                    sd_total[i] += group.supply_demand[i];
                    pop_total[i] += group.population[i];
                    under_total[i] += group.undersupplied[i];
                    over_total[i] += group.oversupplied[i];
                }
            }
            let cap = sd_total
                .iter()
                .zip(&pop_total)
                .map(|(s, p)| per_capita(*s, *p))
                .collect();
            fields.push(("SUP_DEMadm_cap".into(), cap));
            fields.push(("SUP_DEMadm".into(), sd_total));
            fields.push(("Pund_adm".into(), under_total));
            fields.push(("Povr_adm".into(), over_total));
            fields.extend(group_columns);
        }
    }

    let ids = units.ids()?;
    let by_id: HashMap<i64, usize> = ids.iter().enumerate().map(|(idx, id)| (*id, idx)).collect();
    for (name, _) in &fields {
        units.layer.add_field(name.as_str());
    }
    for feature_idx in 0..n {
        let Some(&row) = by_id.get(&ids[feature_idx]) else { continue };
        let feature = &mut units.layer.features[feature_idx];
        for (name, values) in &fields {
            feature.set_property(name.as_str(), AttributeValue::Float(round_field(values[row])));
        }
    }

    write_geojson(&units.layer, target)?;
    info!("wrote supply-demand summary for {} units to {}", n, target.display());
    Ok(())
}

struct GroupSums {
    supply_demand: Vec<f64>,
    population: Vec<f64>,
    undersupplied: Vec<f64>,
    oversupplied: Vec<f64>,
}

fn group_fields(sums: &ZoneSums<'_>, layers: &GroupLayers, fields: &mut Vec<(String, Vec<f64>)>) -> Result<GroupSums> {
    let name = layers.group.name();
    let population = sums.of(&layers.population)?;
    let undersupplied = sums.of(&layers.undersupplied)?;
    let oversupplied = sums.of(&layers.oversupplied)?;
    let supply_demand = match &layers.supply_demand {
        Some(path) => {
            let sd = sums.of(path)?;
            let cap = sd.iter().zip(&population).map(|(s, p)| per_capita(*s, *p)).collect();
            fields.push((format!("SUP_DEMadm_cap_{name}"), cap));
            sd
        }
        None => vec![0.0; population.len()],
    };
    fields.push((format!("Pund_adm_{name}"), undersupplied.clone()));
    fields.push((format!("Povr_adm_{name}"), oversupplied.clone()));
    Ok(GroupSums {
        supply_demand,
        population,
        undersupplied,
        oversupplied,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo_types::{polygon, Geometry};
    use greenaccess_core::io::{read_geojson, write_geotiff};
    use greenaccess_core::raster::FLOAT32_NODATA;
    use greenaccess_core::vector::{Feature, FeatureCollection};
    use greenaccess_core::GeoTransform;

    // 2x4 grid of 10 m pixels; unit 0 covers the left half, unit 1 the right
    fn write(dir: &Path, name: &str, values: Vec<f32>) -> PathBuf {
        let mut r = Raster::from_vec(values, 2, 4).unwrap();
        r.set_transform(GeoTransform::new(0.0, 20.0, 10.0, -10.0));
        r.set_nodata(Some(FLOAT32_NODATA));
        let path = dir.join(name);
        write_geotiff(&r, &path).unwrap();
        path
    }

    fn units(dir: &Path) -> PathBuf {
        let mut fc = FeatureCollection::new();
        for (i, x) in [0.0, 20.0].into_iter().enumerate() {
            let mut f = Feature::new(Geometry::Polygon(polygon![
                (x: x, y: 0.0), (x: x + 20.0, y: 0.0), (x: x + 20.0, y: 20.0),
                (x: x, y: 20.0), (x: x, y: 0.0)
            ]));
            f.set_property("adm_unit_id", AttributeValue::Int(i as i64));
            f.set_property("pop_kids", AttributeValue::Float(0.25));
            fc.push(f);
        }
        let path = dir.join("reprojected_aois.geojson");
        write_geojson(&fc, &path).unwrap();
        path
    }

    fn field(layer: &FeatureCollection, idx: usize, name: &str) -> f64 {
        layer.features[idx].get_property(name).and_then(AttributeValue::as_f64).unwrap()
    }

    #[test]
    fn test_single_raster_summary() {
        let dir = tempfile::tempdir().unwrap();
        let aois = units(dir.path());
        let totals = TotalLayers {
            supply_demand: write(dir.path(), "sd.tif", vec![10.0, -5.0, 0.0, 0.0, 5.0, 0.0, 0.0, 0.0]),
            population: write(dir.path(), "pop.tif", vec![1.0, 1.0, 0.0, 0.0, 2.0, 1.0, 0.0, 0.0]),
            undersupplied: write(dir.path(), "under.tif", vec![0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
            oversupplied: write(dir.path(), "over.tif", vec![1.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0]),
        };
        let target = dir.path().join("output/aois.geojson");
        write_summary(
            &aois,
            &totals.population,
            &Summary::SingleRaster { totals: totals.clone(), groups: vec![] },
            &target,
        )
        .unwrap();

        let layer = read_geojson(&target).unwrap();
        assert_relative_eq!(field(&layer, 0, "SUP_DEMadm"), 10.0);
        assert_relative_eq!(field(&layer, 0, "SUP_DEMadm_cap"), 2.0);
        assert_relative_eq!(field(&layer, 0, "Pund_adm"), 1.0);
        assert_relative_eq!(field(&layer, 0, "Povr_adm"), 3.0);
        // no population on the right half
        assert_eq!(field(&layer, 1, "SUP_DEMadm_cap"), 0.0);
        assert_eq!(layer.fields[2..], ["SUP_DEMadm_cap", "SUP_DEMadm", "Pund_adm", "Povr_adm"]);
    }

    #[test]
    fn test_per_group_summary_combines_groups() {
        let dir = tempfile::tempdir().unwrap();
        let aois = units(dir.path());
        let group = |name: &str, sd: f32, pop: f32| GroupLayers {
            group: PopGroup::from_field(format!("pop_{name}")).unwrap(),
            population: write(dir.path(), &format!("pop_{name}.tif"), vec![pop; 8]),
            undersupplied: write(dir.path(), &format!("under_{name}.tif"), vec![pop; 8]),
            oversupplied: write(dir.path(), &format!("over_{name}.tif"), vec![0.0; 8]),
            supply_demand: Some(write(dir.path(), &format!("sd_{name}.tif"), vec![sd; 8])),
        };
        let groups = vec![group("kids", -1.0, 1.0), group("adults", 3.0, 3.0)];
        let template = groups[0].population.clone();
        let target = dir.path().join("aois.geojson");
        write_summary(&aois, &template, &Summary::PerGroup { groups }, &target).unwrap();

        let layer = read_geojson(&target).unwrap();
        // per unit: 4 pixels, kids sd -4 pop 4, adults sd 12 pop 12
        assert_relative_eq!(field(&layer, 1, "SUP_DEMadm_cap_kids"), -1.0);
        assert_relative_eq!(field(&layer, 1, "SUP_DEMadm_cap_adults"), 1.0);
        assert_relative_eq!(field(&layer, 1, "SUP_DEMadm_cap"), 0.5);
        assert_relative_eq!(field(&layer, 1, "SUP_DEMadm"), 8.0);
        assert_relative_eq!(field(&layer, 1, "Pund_adm"), 16.0);
        assert_relative_eq!(field(&layer, 1, "Pund_adm_kids"), 4.0);
        assert_relative_eq!(field(&layer, 1, "Povr_adm"), 0.0);
    }

    #[test]
    fn test_round_field() {
        assert_eq!(round_field(1.0 / 3.0), 0.33333333333);
        assert_eq!(round_field(f64::MAX), f64::MAX);
    }
}
