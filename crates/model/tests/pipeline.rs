//! End-to-end runs on a small synthetic city.
//!
//! The city is a 21×21 grid of 10 m pixels holding 20 people each, with a
//! single greenspace pixel in the middle and one administrative unit
//! covering everything. With a 50 m (5 pixel) dichotomy kernel every pixel
//! within 5 pixels of the park sees it, and 81 pixels lie within 5 pixels
//! of the park.

use approx::assert_relative_eq;
use geo_types::{polygon, Geometry};
use std::fs;
use std::path::{Path, PathBuf};

use greenaccess_core::io::{read_geojson, read_geotiff, write_geojson, write_geotiff};
use greenaccess_core::raster::Raster;
use greenaccess_core::vector::{AttributeValue, Feature, FeatureCollection};
use greenaccess_core::{GeoTransform, CRS};
use greenaccess_model::{run, ModelArgs};

const SIZE: usize = 21;
const PARK: usize = 10;
const PEOPLE: f32 = 20.0;
const PIXELS_IN_REACH: f64 = 81.0;
const EPSG: u32 = 32631;

fn transform() -> GeoTransform {
    GeoTransform::new(500_000.0, 4_000_210.0, 10.0, -10.0)
}

/// Land cover, population, LULC table, radii table and units in `dir`
fn write_city(dir: &Path) {
    let mut lulc = Raster::filled(SIZE, SIZE, 2i32);
    lulc.set(PARK, PARK, 1).unwrap();
    lulc.set_transform(transform());
    lulc.set_crs(Some(CRS::from_epsg(EPSG)));
    write_geotiff(&lulc, dir.join("lulc.tif")).unwrap();

    let mut population = Raster::filled(SIZE, SIZE, PEOPLE);
    population.set_transform(transform());
    population.set_crs(Some(CRS::from_epsg(EPSG)));
    write_geotiff(&population, dir.join("population.tif")).unwrap();

    fs::write(
        dir.join("lulc.csv"),
        "lucode,greenspace,search_radius_m\n1,1,50\n2,0,\n",
    )
    .unwrap();
    fs::write(dir.join("radii.csv"), "pop_group,search_radius_m\npop_all,50\n").unwrap();
    write_units(dir, &[("pop_all", 1.0)]);
}

/// One unit covering the whole grid with the given group proportions
fn write_units(dir: &Path, groups: &[(&str, f64)]) {
    let (x0, y1) = (500_000.0, 4_000_210.0);
    let (x1, y0) = (x0 + 210.0, y1 - 210.0);
    let mut unit = Feature::new(Geometry::Polygon(polygon![
        (x: x0, y: y0), (x: x1, y: y0), (x: x1, y: y1), (x: x0, y: y1), (x: x0, y: y0)
    ]));
    unit.set_property("name", AttributeValue::String("downtown".into()));
    for &(name, proportion) in groups {
        unit.set_property(name, AttributeValue::Float(proportion));
    }
    let mut units = FeatureCollection::new();
    units.push(unit);
    units.crs = Some(CRS::from_epsg(EPSG));
    write_geojson(&units, dir.join("aois.geojson")).unwrap();
}

/// Two parks far enough apart that no pixel reaches both: a pocket park
/// (lucode 1, 30 m) at (5, 5) and a neighbourhood park (lucode 3, 50 m) at
/// (15, 15). A quarter of the people are kids who walk 30 m, the rest are
/// adults who walk 50 m.
fn write_two_park_city(dir: &Path) {
    write_city(dir);
    let mut lulc = Raster::filled(SIZE, SIZE, 2i32);
    lulc.set(5, 5, 1).unwrap();
    lulc.set(15, 15, 3).unwrap();
    lulc.set_transform(transform());
    lulc.set_crs(Some(CRS::from_epsg(EPSG)));
    write_geotiff(&lulc, dir.join("lulc.tif")).unwrap();

    fs::write(
        dir.join("lulc.csv"),
        "lucode,greenspace,search_radius_m\n1,1,30\n2,0,\n3,1,50\n",
    )
    .unwrap();
    fs::write(
        dir.join("radii.csv"),
        "pop_group,search_radius_m\npop_kids,30\npop_adults,50\n",
    )
    .unwrap();
    write_units(dir, &[("pop_kids", 0.25), ("pop_adults", 0.75)]);
}

fn args(dir: &Path, workspace: &str, mode: &str) -> ModelArgs {
    ModelArgs {
        workspace_dir: dir.join(workspace),
        results_suffix: String::new(),
        n_workers: None,
        lulc_raster_path: dir.join("lulc.tif"),
        lulc_attribute_table: dir.join("lulc.csv"),
        population_raster_path: dir.join("population.tif"),
        aoi_vector_path: dir.join("aois.geojson"),
        greenspace_demand: 10.0,
        decay_function: "dichotomy".into(),
        decay_function_power_beta: None,
        search_radius_mode: mode.into(),
        search_radius: Some(50.0),
        population_group_radii_table: Some(dir.join("radii.csv")),
        aggregate_by_pop_group: false,
    }
}

fn supply(path: &PathBuf) -> Raster<f32> {
    read_geotiff(path).unwrap()
}

fn field(layer: &FeatureCollection, name: &str) -> f64 {
    layer.features[0]
        .get_property(name)
        .and_then(AttributeValue::as_f64)
        .unwrap_or_else(|| panic!("missing field {name}"))
}

#[test]
fn uniform_run_matches_hand_computation() {
    let dir = tempfile::tempdir().unwrap();
    write_city(dir.path());

    let outcome = run(&args(dir.path(), "ws", "radius_uniform")).unwrap();
    assert!(outcome.report.skipped.is_empty());

    // park area / people within reach of the park
    let ratio = 100.0 / (PIXELS_IN_REACH * PEOPLE as f64);
    let supply = supply(&outcome.supply);
    assert_eq!(supply.shape(), (SIZE, SIZE));
    assert_relative_eq!(supply.get(PARK, PARK).unwrap() as f64, ratio, max_relative = 1e-5);
    assert_relative_eq!(supply.get(PARK, PARK + 5).unwrap() as f64, ratio, max_relative = 1e-5);
    assert_relative_eq!(supply.get(PARK + 3, PARK + 4).unwrap() as f64, ratio, max_relative = 1e-5);
    assert_eq!(supply.get(PARK, PARK + 6).unwrap(), 0.0);
    assert_eq!(supply.get(0, 0).unwrap(), 0.0);

    let workspace = dir.path().join("ws");
    let budget: Raster<f32> = read_geotiff(workspace.join("intermediate/greenspace_budget.tif")).unwrap();
    assert_relative_eq!(budget.get(PARK, PARK).unwrap() as f64, ratio - 10.0, max_relative = 1e-5);
    assert_relative_eq!(budget.get(0, 0).unwrap(), -10.0);

    // demand exceeds supply everywhere, so everybody is undersupplied
    let total_people = (SIZE * SIZE) as f64 * PEOPLE as f64;
    let in_reach = PIXELS_IN_REACH * PEOPLE as f64;
    let expected_sd = in_reach * ratio - total_people * 10.0;
    let layer = read_geojson(&outcome.summary).unwrap();
    assert_relative_eq!(field(&layer, "SUP_DEMadm"), expected_sd, max_relative = 1e-5);
    assert_relative_eq!(field(&layer, "SUP_DEMadm_cap"), expected_sd / total_people, max_relative = 1e-5);
    assert_relative_eq!(field(&layer, "Pund_adm"), total_people, max_relative = 1e-6);
    assert_eq!(field(&layer, "Povr_adm"), 0.0);
    assert_eq!(field(&layer, "adm_unit_id"), 0.0);
    assert!(layer.features[0].get_property("Pund_adm_all").is_none());
}

#[test]
fn rerun_skips_up_to_date_tasks() {
    let dir = tempfile::tempdir().unwrap();
    write_city(dir.path());
    let args = args(dir.path(), "ws", "radius_uniform");

    let first = run(&args).unwrap();
    let second = run(&args).unwrap();
    assert!(second.report.executed.is_empty(), "re-ran {:?}", second.report.executed);
    assert_eq!(second.report.skipped.len(), first.report.executed.len());
}

#[test]
fn single_class_and_single_group_runs_match_uniform() {
    let dir = tempfile::tempdir().unwrap();
    write_city(dir.path());

    let uniform = supply(&run(&args(dir.path(), "uniform", "radius_uniform")).unwrap().supply);
    let per_class = supply(
        &run(&args(dir.path(), "per_class", "radius_per_greenspace_class"))
            .unwrap()
            .supply,
    );
    let per_group = supply(&run(&args(dir.path(), "per_group", "radius_per_pop_group")).unwrap().supply);

    for row in 0..SIZE {
        for col in 0..SIZE {
            let expected = uniform.get(row, col).unwrap();
            assert_relative_eq!(per_class.get(row, col).unwrap(), expected, epsilon = 1e-7);
            assert_relative_eq!(per_group.get(row, col).unwrap(), expected, epsilon = 1e-7);
        }
    }

    let intermediate = dir.path().join("per_group/intermediate");
    assert!(intermediate.join("population_in_pop_all.tif").exists());
    assert!(intermediate.join("greenspace_supply_to_pop_all.tif").exists());
    let layer = read_geojson(dir.path().join("per_group/output/aois.geojson")).unwrap();
    assert_relative_eq!(
        field(&layer, "SUP_DEMadm_cap_all"),
        field(&layer, "SUP_DEMadm_cap"),
        max_relative = 1e-9
    );
}

#[test]
fn aggregate_by_group_adds_group_fields() {
    let dir = tempfile::tempdir().unwrap();
    write_city(dir.path());
    let mut args = args(dir.path(), "ws", "radius_uniform");
    args.aggregate_by_pop_group = true;
    args.results_suffix = "city".into();

    let outcome = run(&args).unwrap();
    assert!(outcome.summary.ends_with("output/aois_city.geojson"));
    let layer = read_geojson(&outcome.summary).unwrap();
    assert_relative_eq!(field(&layer, "Pund_adm_all"), field(&layer, "Pund_adm"), max_relative = 1e-6);
    assert_eq!(field(&layer, "Povr_adm_all"), 0.0);
}

#[test]
fn geographic_land_cover_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_city(dir.path());
    let mut lulc = Raster::filled(4, 4, 1i32);
    lulc.set_transform(GeoTransform::new(2.0, 48.0, 0.001, -0.001));
    lulc.set_crs(Some(CRS::from_epsg(4326)));
    write_geotiff(&lulc, dir.path().join("lulc.tif")).unwrap();

    let err = run(&args(dir.path(), "ws", "radius_uniform")).unwrap_err();
    assert!(err.to_string().contains("geographic"), "{err}");
}

// Lattice points within 3 and 5 pixels of a park
const WITHIN_3PX: f64 = 29.0;
const WITHIN_5PX: f64 = 81.0;
const PARK_AREA: f64 = 100.0;

#[test]
fn per_class_run_sums_both_parks() {
    let dir = tempfile::tempdir().unwrap();
    write_two_park_city(dir.path());
    let mut args = args(dir.path(), "ws", "radius_per_greenspace_class");
    args.greenspace_demand = 0.05;

    let outcome = run(&args).unwrap();
    let pocket = PARK_AREA / (WITHIN_3PX * PEOPLE as f64);
    let neighbourhood = PARK_AREA / (WITHIN_5PX * PEOPLE as f64);
    let supply = supply(&outcome.supply);
    assert_relative_eq!(supply.get(5, 5).unwrap() as f64, pocket, max_relative = 1e-5);
    assert_relative_eq!(supply.get(5, 8).unwrap() as f64, pocket, max_relative = 1e-5);
    assert_eq!(supply.get(5, 9).unwrap(), 0.0);
    assert_relative_eq!(supply.get(15, 15).unwrap() as f64, neighbourhood, max_relative = 1e-5);
    assert_relative_eq!(supply.get(15, 20).unwrap() as f64, neighbourhood, max_relative = 1e-5);

    let intermediate = dir.path().join("ws/intermediate");
    assert!(intermediate.join("greenspace_supply_lucode_1.tif").exists());
    assert!(intermediate.join("greenspace_supply_lucode_3.tif").exists());

    // each park hands out its whole area; both ratios exceed the demand
    let total_people = (SIZE * SIZE) as f64 * PEOPLE as f64;
    let served = (WITHIN_3PX + WITHIN_5PX) * PEOPLE as f64;
    let expected_sd = 2.0 * PARK_AREA - total_people * 0.05;
    let layer = read_geojson(&outcome.summary).unwrap();
    assert_relative_eq!(field(&layer, "SUP_DEMadm"), expected_sd, max_relative = 1e-4);
    assert_relative_eq!(field(&layer, "SUP_DEMadm_cap"), expected_sd / total_people, max_relative = 1e-4);
    assert_relative_eq!(field(&layer, "Povr_adm"), served, max_relative = 1e-6);
    assert_relative_eq!(field(&layer, "Pund_adm"), total_people - served, max_relative = 1e-6);
}

#[test]
fn per_group_run_weights_supply_by_group_share() {
    let dir = tempfile::tempdir().unwrap();
    write_two_park_city(dir.path());
    let mut args = args(dir.path(), "ws", "radius_per_pop_group");
    args.greenspace_demand = 0.05;

    let outcome = run(&args).unwrap();
    let (kids, adults) = (0.25 * PEOPLE as f64, 0.75 * PEOPLE as f64);
    // both parks see the same mix of kids within 3 px and adults within 5 px
    let ratio = PARK_AREA / (WITHIN_3PX * kids + WITHIN_5PX * adults);

    let supply = supply(&outcome.supply);
    assert_relative_eq!(supply.get(5, 5).unwrap() as f64, ratio, max_relative = 1e-5);
    // beyond the kids' reach, only the adults' share remains
    assert_relative_eq!(supply.get(5, 9).unwrap() as f64, 0.75 * ratio, max_relative = 1e-5);
    assert_relative_eq!(supply.get(15, 19).unwrap() as f64, 0.75 * ratio, max_relative = 1e-5);
    assert_eq!(supply.get(0, 20).unwrap(), 0.0);

    let cells = (SIZE * SIZE) as f64;
    let (kids_total, adults_total) = (cells * kids, cells * adults);
    let kids_served = 2.0 * WITHIN_3PX * kids;
    let adults_served = 2.0 * WITHIN_5PX * adults;
    let kids_sd = kids_served * ratio - kids_total * 0.05;
    let adults_sd = adults_served * ratio - adults_total * 0.05;

    let layer = read_geojson(&outcome.summary).unwrap();
    assert_relative_eq!(field(&layer, "SUP_DEMadm_cap_kids"), kids_sd / kids_total, max_relative = 1e-4);
    assert_relative_eq!(field(&layer, "SUP_DEMadm_cap_adults"), adults_sd / adults_total, max_relative = 1e-4);
    assert_relative_eq!(field(&layer, "SUP_DEMadm"), kids_sd + adults_sd, max_relative = 1e-4);
    assert_relative_eq!(
        field(&layer, "SUP_DEMadm_cap"),
        (kids_sd + adults_sd) / (kids_total + adults_total),
        max_relative = 1e-4
    );
    // the parks hand out their whole area across both groups
    assert_relative_eq!(kids_sd + adults_sd, 2.0 * PARK_AREA - (kids_total + adults_total) * 0.05, max_relative = 1e-9);

    assert_relative_eq!(field(&layer, "Povr_adm_kids"), kids_served, max_relative = 1e-6);
    assert_relative_eq!(field(&layer, "Pund_adm_kids"), kids_total - kids_served, max_relative = 1e-6);
    assert_relative_eq!(field(&layer, "Povr_adm_adults"), adults_served, max_relative = 1e-6);
    assert_relative_eq!(field(&layer, "Povr_adm"), kids_served + adults_served, max_relative = 1e-6);
    assert_relative_eq!(
        field(&layer, "Pund_adm"),
        kids_total + adults_total - kids_served - adults_served,
        max_relative = 1e-6
    );
}
