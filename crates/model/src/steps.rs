//! File-to-file steps run as tasks
//!
//! Every step reads its inputs from disk and writes exactly one output, so
//! that the task graph can key tasks by output path and skip them when the
//! output is up to date.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

use greenaccess_algorithms::access::{self, GreenspaceParams, SupplyFilter};
use greenaccess_algorithms::convolve::{convolve, ConvolveParams};
use greenaccess_algorithms::imagery::{reclassify, ReclassifyParams};
use greenaccess_algorithms::kernel::{decay_kernel, DecayFunction, DecayKernelParams};
use greenaccess_algorithms::resample::{resample_population, warp, GridSpec, ResampleMethod};
use greenaccess_algorithms::vector::rasterize_attribute;
use greenaccess_core::io::{read_geojson, read_geotiff, write_geotiff};
use greenaccess_core::raster::{Raster, FLOAT32_NODATA, UINT32_NODATA};
use greenaccess_core::Result;

use crate::aoi::ID_FIELD;

/// Land-cover rasters are read as signed 32-bit codes
pub type LulcRaster = Raster<i32>;

fn read_f32(path: &Path) -> Result<Raster<f32>> {
    read_geotiff(path)
}

fn read_all(paths: &[PathBuf]) -> Result<Vec<Raster<f32>>> {
    paths.iter().map(|p| read_f32(p)).collect()
}

/// Nearest-neighbour resample of the land cover onto square pixels over
/// its own extent
pub fn align_lulc(source: &Path, pixel_size: (f64, f64), target: &Path) -> Result<()> {
    let lulc: LulcRaster = read_geotiff(source)?;
    let grid = GridSpec::of(&lulc).with_pixel_size(pixel_size);
    write_geotiff(&warp(&lulc, &grid, ResampleMethod::Nearest)?, target)
}

/// Mass-conserving resample of the population onto the land-cover grid
pub fn align_population(source: &Path, grid: &GridSpec, working_dir: &Path, target: &Path) -> Result<()> {
    let population = read_f32(source)?;
    write_geotiff(&resample_population(&population, grid, working_dir)?, target)
}

/// Unnormalized decay kernel of `radius_px` pixels
pub fn create_kernel(function: DecayFunction, radius_px: f64, target: &Path) -> Result<()> {
    let kernel = decay_kernel(&DecayKernelParams {
        function,
        radius: radius_px,
        normalize: false,
    })?;
    write_geotiff(&kernel, target)
}

/// Greenspace area per pixel, optionally restricted to some codes
pub fn greenspace_area(
    lulc: &Path,
    flags: &HashMap<i64, bool>,
    only_codes: Option<BTreeSet<i64>>,
    target: &Path,
) -> Result<()> {
    let lulc: LulcRaster = read_geotiff(lulc)?;
    let mut params = GreenspaceParams::new(flags.clone());
    params.only_codes = only_codes;
    write_geotiff(&access::greenspace_area(&lulc, &params)?, target)
}

/// Convolve `signal` with `kernel`, clamping negatives when `clamp` is set
pub fn convolve_rasters(signal: &Path, kernel: &Path, clamp: bool, target: &Path) -> Result<()> {
    let params = ConvolveParams {
        clamp_negative: clamp,
        ..Default::default()
    };
    let out = convolve(&read_f32(signal)?, &read_f32(kernel)?, &params)?;
    write_geotiff(&out, target)
}

pub fn population_ratio(area: &Path, decayed_population: &Path, target: &Path) -> Result<()> {
    let out = access::greenspace_population_ratio(&read_f32(area)?, &read_f32(decayed_population)?)?;
    write_geotiff(&out, target)
}

pub fn budget(supply: &Path, demand: f64, target: &Path) -> Result<()> {
    write_geotiff(&access::greenspace_budget(&read_f32(supply)?, demand)?, target)
}

pub fn supply_demand(budget: &Path, population: &Path, target: &Path) -> Result<()> {
    let out = access::supply_demand(&read_f32(budget)?, &read_f32(population)?)?;
    write_geotiff(&out, target)
}

pub fn filter_population(population: &Path, budget: &Path, filter: SupplyFilter, target: &Path) -> Result<()> {
    let out = access::filter_population(&read_f32(population)?, &read_f32(budget)?, filter)?;
    write_geotiff(&out, target)
}

pub fn sum(sources: &[PathBuf], target: &Path) -> Result<()> {
    let rasters = read_all(sources)?;
    let refs: Vec<&Raster<f32>> = rasters.iter().collect();
    write_geotiff(&access::nodata_sum(&refs)?, target)
}

pub fn weighted_sum(values: &[PathBuf], weights: &[PathBuf], target: &Path) -> Result<()> {
    let values = read_all(values)?;
    let weights = read_all(weights)?;
    let value_refs: Vec<&Raster<f32>> = values.iter().collect();
    let weight_refs: Vec<&Raster<f32>> = weights.iter().collect();
    write_geotiff(&access::weighted_sum(&value_refs, &weight_refs)?, target)
}

/// Burn unit IDs onto the aligned land-cover grid
pub fn rasterize_ids(aois: &Path, template: &Path, target: &Path) -> Result<()> {
    let layer = read_geojson(aois)?;
    let template: LulcRaster = read_geotiff(template)?;
    let ids: Raster<u32> = rasterize_attribute(&layer, ID_FIELD, &template, UINT32_NODATA)?;
    write_geotiff(&ids, target)
}

/// Burn a unit's group proportion onto the aligned land-cover grid
pub fn rasterize_proportion(aois: &Path, field: &str, template: &Path, target: &Path) -> Result<()> {
    let layer = read_geojson(aois)?;
    let template: LulcRaster = read_geotiff(template)?;
    let proportion: Raster<f32> = rasterize_attribute(&layer, field, &template, FLOAT32_NODATA)?;
    write_geotiff(&proportion, target)
}

/// Population of one group: unit proportion times total population
pub fn group_population(
    ids: &Path,
    proportions: HashMap<i64, f64>,
    field: &str,
    population: &Path,
    target: &Path,
) -> Result<()> {
    let ids: Raster<u32> = read_geotiff(ids)?;
    let params = ReclassifyParams::new(proportions).described(
        "administrative unit ID raster",
        "administrative unit vector",
        field,
    );
    let proportion = reclassify(&ids, &params)?;
    let out = access::multiply(&proportion, &read_f32(population)?)?;
    debug!("{} population: {:.1}", field, out.valid_sum());
    write_geotiff(&out, target)
}
