//! Attribute tables and search-radius resolution

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use greenaccess_core::io::read_table;
use greenaccess_core::{Error, Result};

use crate::aoi::{AdminUnits, PopGroup};
use crate::config::{SearchRadiusMode, ValidatedArgs};

/// One row of the land-cover attribute table
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LulcRow {
    pub lucode: i64,
    /// `1` for greenspace, `0` otherwise
    pub greenspace: u8,
    #[serde(default)]
    pub search_radius_m: Option<f64>,
}

/// Land-cover attribute table
#[derive(Debug, Clone)]
pub struct LulcTable {
    path: String,
    rows: Vec<LulcRow>,
}

impl LulcTable {
    pub fn load(path: &Path) -> Result<Self> {
        let rows: Vec<LulcRow> = read_table(path)?;
        let table_error = |message: String| Error::Table {
            path: path.display().to_string(),
            message,
        };

        let mut seen = BTreeSet::new();
        for row in &rows {
            if !seen.insert(row.lucode) {
                return Err(table_error(format!("lucode {} appears more than once", row.lucode)));
            }
            if row.greenspace > 1 {
                return Err(table_error(format!(
                    "greenspace must be 0 or 1, found {} for lucode {}",
                    row.greenspace, row.lucode
                )));
            }
        }
        Ok(Self {
            path: path.display().to_string(),
            rows,
        })
    }

    pub fn rows(&self) -> &[LulcRow] {
        &self.rows
    }

    /// `{lucode -> is greenspace}` for every row
    pub fn greenspace_flags(&self) -> HashMap<i64, bool> {
        self.rows
            .iter()
            .map(|r| (r.lucode, r.greenspace == 1))
            .collect()
    }

    /// Greenspace rows only
    pub fn greenspace_rows(&self) -> impl Iterator<Item = &LulcRow> {
        self.rows.iter().filter(|r| r.greenspace == 1)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct GroupRadiusRow {
    pop_group: String,
    search_radius_m: f64,
}

/// Search radius (metres) assignment, fixed before the task graph is built
#[derive(Debug, Clone, PartialEq)]
pub enum SearchRadii {
    Uniform(f64),
    PerGreenspaceClass(BTreeMap<i64, f64>),
    PerPopulationGroup(BTreeMap<PopGroup, f64>),
}

impl SearchRadii {
    /// Resolve radii for the selected mode from the arguments and tables.
    pub fn resolve(args: &ValidatedArgs, lulc: &LulcTable, units: &AdminUnits) -> Result<Self> {
        let radii = match args.mode {
            SearchRadiusMode::Uniform => {
                let radius = args.uniform_radius.ok_or_else(|| Error::InvalidParameter {
                    name: "search_radius",
                    value: "none".into(),
                    reason: "required for radius_uniform".into(),
                })?;
                SearchRadii::Uniform(radius)
            }
            SearchRadiusMode::PerGreenspaceClass => {
                let mut by_class = BTreeMap::new();
                for row in lulc.greenspace_rows() {
                    let radius = row.search_radius_m.ok_or_else(|| Error::Table {
                        path: lulc.path.clone(),
                        message: format!(
                            "greenspace lucode {} has no search_radius_m",
                            row.lucode
                        ),
                    })?;
                    by_class.insert(row.lucode, radius);
                }
                if by_class.is_empty() {
                    return Err(Error::Table {
                        path: lulc.path.clone(),
                        message: "no land-cover class is marked as greenspace".into(),
                    });
                }
                SearchRadii::PerGreenspaceClass(by_class)
            }
            SearchRadiusMode::PerPopGroup => {
                let path = args.radii_table.as_deref().ok_or_else(|| Error::InvalidParameter {
                    name: "population_group_radii_table",
                    value: "none".into(),
                    reason: "required for radius_per_pop_group".into(),
                })?;
                SearchRadii::PerPopulationGroup(group_radii(path, units)?)
            }
        };
        radii.check_non_negative()?;
        Ok(radii)
    }

    pub fn mode(&self) -> SearchRadiusMode {
        match self {
            SearchRadii::Uniform(_) => SearchRadiusMode::Uniform,
            SearchRadii::PerGreenspaceClass(_) => SearchRadiusMode::PerGreenspaceClass,
            SearchRadii::PerPopulationGroup(_) => SearchRadiusMode::PerPopGroup,
        }
    }

    /// Every radius in use, ascending, without duplicates
    pub fn distinct(&self) -> Vec<f64> {
        let mut radii: Vec<f64> = match self {
            SearchRadii::Uniform(r) => vec![*r],
            SearchRadii::PerGreenspaceClass(m) => m.values().copied().collect(),
            SearchRadii::PerPopulationGroup(m) => m.values().copied().collect(),
        };
        radii.sort_by(f64::total_cmp);
        radii.dedup();
        radii
    }

    fn check_non_negative(&self) -> Result<()> {
        match self.distinct().into_iter().find(|r| !(r.is_finite() && *r >= 0.0)) {
            Some(bad) => Err(Error::InvalidParameter {
                name: "search_radius_m",
                value: bad.to_string(),
                reason: "search radii must be finite and non-negative".into(),
            }),
            None => Ok(()),
        }
    }
}

fn group_radii(path: &Path, units: &AdminUnits) -> Result<BTreeMap<PopGroup, f64>> {
    let rows: Vec<GroupRadiusRow> = read_table(path)?;
    let mut radii = BTreeMap::new();
    for row in rows {
        let group = units.group(&row.pop_group).ok_or_else(|| Error::Table {
            path: path.display().to_string(),
            message: format!(
                "population group '{}' has no matching pop_ field in the administrative units",
                row.pop_group
            ),
        })?;
        if radii.insert(group.clone(), row.search_radius_m).is_some() {
            return Err(Error::Table {
                path: path.display().to_string(),
                message: format!("population group '{}' appears more than once", row.pop_group),
            });
        }
    }
    if let Some(missing) = units.groups.iter().find(|g| !radii.contains_key(*g)) {
        return Err(Error::Table {
            path: path.display().to_string(),
            message: format!("no search radius for population group '{}'", missing.field()),
        });
    }
    if radii.is_empty() {
        return Err(Error::InvalidParameter {
            name: "aoi_vector_path",
            value: "no pop_ fields".into(),
            reason: "radius_per_pop_group needs at least one population group field".into(),
        });
    }
    Ok(radii)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelArgs;
    use geo_types::{polygon, Geometry};
    use greenaccess_core::io::write_geojson;
    use greenaccess_core::vector::{AttributeValue, Feature, FeatureCollection};
    use std::fs;
    use std::path::PathBuf;

    fn units(dir: &Path, groups: &[&str]) -> AdminUnits {
        let mut f = Feature::new(Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 0.0)
        ]));
        for g in groups {
            f.set_property(format!("pop_{g}"), AttributeValue::Float(0.5));
        }
        let mut fc = FeatureCollection::new();
        fc.push(f);
        let path = dir.join("aois.geojson");
        write_geojson(&fc, &path).unwrap();
        AdminUnits::prepare(&path, None).unwrap()
    }

    fn args(mode: &str, radii_table: Option<PathBuf>) -> ValidatedArgs {
        ModelArgs {
            workspace_dir: "ws".into(),
            results_suffix: String::new(),
            n_workers: None,
            lulc_raster_path: "lulc.tif".into(),
            lulc_attribute_table: "lulc.csv".into(),
            population_raster_path: "pop.tif".into(),
            aoi_vector_path: "aois.geojson".into(),
            greenspace_demand: 10.0,
            decay_function: "dichotomy".into(),
            decay_function_power_beta: None,
            search_radius_mode: mode.into(),
            search_radius: Some(150.0),
            population_group_radii_table: radii_table,
            aggregate_by_pop_group: false,
        }
        .validate()
        .unwrap()
    }

    fn lulc(dir: &Path, text: &str) -> LulcTable {
        let path = dir.join("lulc.csv");
        fs::write(&path, text).unwrap();
        LulcTable::load(&path).unwrap()
    }

    #[test]
    fn test_lulc_table_flags() {
        let dir = tempfile::tempdir().unwrap();
        let table = lulc(dir.path(), "LuCode,Greenspace,search_radius_m\n1,1,100\n2,0,\n3,1,250\n");
        let flags = table.greenspace_flags();
        assert_eq!(flags[&1], true);
        assert_eq!(flags[&2], false);
        assert_eq!(table.rows()[1].search_radius_m, None);
    }

    #[test]
    fn test_duplicate_lucode_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lulc.csv");
        fs::write(&path, "lucode,greenspace\n1,1\n1,0\n").unwrap();
        assert!(matches!(LulcTable::load(&path), Err(Error::Table { .. })));
    }

    #[test]
    fn test_per_class_radii() {
        let dir = tempfile::tempdir().unwrap();
        let table = lulc(dir.path(), "lucode,greenspace,search_radius_m\n1,1,100\n2,0,\n3,1,100\n4,1,250\n");
        let radii = SearchRadii::resolve(
            &args("radius_per_greenspace_class", None),
            &table,
            &units(dir.path(), &[]),
        )
        .unwrap();
        assert_eq!(radii.mode(), SearchRadiusMode::PerGreenspaceClass);
        assert_eq!(radii.distinct(), vec![100.0, 250.0]);
        match radii {
            SearchRadii::PerGreenspaceClass(m) => assert_eq!(m.keys().copied().collect::<Vec<_>>(), vec![1, 3, 4]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_per_class_requires_radius_for_greenspace() {
        let dir = tempfile::tempdir().unwrap();
        let table = lulc(dir.path(), "lucode,greenspace,search_radius_m\n1,1,\n");
        assert!(SearchRadii::resolve(
            &args("radius_per_greenspace_class", None),
            &table,
            &units(dir.path(), &[])
        )
        .is_err());
    }

    #[test]
    fn test_per_group_radii_must_match_vector_groups() {
        let dir = tempfile::tempdir().unwrap();
        let table = lulc(dir.path(), "lucode,greenspace\n1,1\n");
        let units = units(dir.path(), &["female", "male"]);
        let radii_path = dir.path().join("radii.csv");

        fs::write(&radii_path, "pop_group,search_radius_m\npop_female,100\npop_male,200\n").unwrap();
        let radii = SearchRadii::resolve(&args("radius_per_pop_group", Some(radii_path.clone())), &table, &units)
            .unwrap();
        assert_eq!(radii.distinct(), vec![100.0, 200.0]);

        fs::write(&radii_path, "pop_group,search_radius_m\npop_female,100\n").unwrap();
        assert!(SearchRadii::resolve(&args("radius_per_pop_group", Some(radii_path.clone())), &table, &units).is_err());

        fs::write(&radii_path, "pop_group,search_radius_m\npop_female,100\npop_male,200\npop_child,50\n").unwrap();
        assert!(SearchRadii::resolve(&args("radius_per_pop_group", Some(radii_path)), &table, &units).is_err());
    }

    #[test]
    fn test_negative_radius_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let table = lulc(dir.path(), "lucode,greenspace,search_radius_m\n1,1,-5\n");
        assert!(matches!(
            SearchRadii::resolve(&args("radius_per_greenspace_class", None), &table, &units(dir.path(), &[])),
            Err(Error::InvalidParameter { name: "search_radius_m", .. })
        ));
    }
}
