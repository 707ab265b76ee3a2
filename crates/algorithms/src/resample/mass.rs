//! Mass-conserving population resampling
//!
//! Counts are converted to density per km², the density surface is
//! bilinearly resampled onto the target grid, and densities are converted
//! back to counts with the target pixel area. Interpolating a density rather
//! than a count keeps the total population stable when pixel sizes change.

use std::path::Path;
use tracing::debug;

use crate::maybe_rayon::*;
use greenaccess_core::crs::ensure_compatible;
use greenaccess_core::io::{read_geotiff, write_geotiff};
use greenaccess_core::raster::{Raster, FLOAT32_NODATA};
use greenaccess_core::{Error, Result};

use super::{warp, GridSpec, ResampleMethod};

fn linear_units(crs: Option<&greenaccess_core::CRS>) -> Result<f64> {
    crs.map_or(Ok(1.0), |c| c.linear_units())
}

/// Multiply every valid pixel by `factor`, writing the float32 sentinel
/// for nodata.
fn scale_valid(raster: &Raster<f32>, factor: f64) -> Result<Raster<f32>> {
    let mut out = raster.like(FLOAT32_NODATA);
    out.set_nodata(Some(FLOAT32_NODATA));
    let cols = raster.cols();
    if cols == 0 {
        return Ok(out);
    }

    let src = raster
        .data()
        .as_slice()
        .ok_or_else(|| Error::Algorithm("raster data is not contiguous".into()))?;
    let dst = out
        .data_mut()
        .as_slice_mut()
        .ok_or_else(|| Error::Algorithm("raster data is not contiguous".into()))?;

    dst.par_chunks_mut(cols)
        .zip(src.par_chunks(cols))
        .for_each(|(dst_row, src_row)| {
            for (d, &s) in dst_row.iter_mut().zip(src_row) {
                if !raster.is_nodata(s) {
                    *d = (s as f64 * factor) as f32;
                }
            }
        });
    Ok(out)
}

/// Resample a population-count raster onto `target` without losing or
/// gaining people.
///
/// Intermediate density rasters are written to a temporary directory created
/// inside `working_dir`; it is removed when this function returns, on every
/// path. Source and target must share a linear projection in metres.
pub fn resample_population(
    source: &Raster<f32>,
    target: &GridSpec,
    working_dir: &Path,
) -> Result<Raster<f32>> {
    ensure_compatible(source.crs(), target.crs.as_ref())?;
    let source_units = linear_units(source.crs())?;
    let target_units = linear_units(target.crs.as_ref().or(source.crs()))?;

    std::fs::create_dir_all(working_dir)?;
    let scratch = tempfile::Builder::new()
        .prefix("resample-population-")
        .tempdir_in(working_dir)?;

    // Step 1: counts per pixel to people per km²
    let source_km2 = source.transform().pixel_area() * source_units / 1e6;
    if source_km2 <= 0.0 {
        return Err(Error::InvalidParameter {
            name: "pixel_size",
            value: format!("{:?}", source.pixel_size()),
            reason: "population pixels must have a non-zero area".into(),
        });
    }
    let density_path = scratch.path().join("pop_density.tif");
    write_geotiff(&scale_valid(source, 1.0 / source_km2)?, &density_path)?;

    // Step 2: bilinear resample of the density surface
    let density: Raster<f32> = read_geotiff(&density_path)?;
    let warped_path = scratch.path().join("warped_density.tif");
    write_geotiff(&warp(&density, target, ResampleMethod::Bilinear)?, &warped_path)?;

    // Step 3: people per km² back to counts per target pixel
    let target_km2 = target.pixel_area() * target_units / 1e6;
    let warped: Raster<f32> = read_geotiff(&warped_path)?;
    let population = scale_valid(&warped, target_km2)?;

    debug!(
        "resampled population from {:.3} km² to {:.3} km² pixels (total {:.1} -> {:.1})",
        source_km2,
        target_km2,
        source.valid_sum(),
        population.valid_sum()
    );
    Ok(population)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use greenaccess_core::{GeoTransform, CRS};

    fn population(value: f32, rows: usize, cols: usize, size: f64) -> Raster<f32> {
        let mut r = Raster::filled(rows, cols, value);
        r.set_transform(GeoTransform::new(500_000.0, 4_000_000.0, size, -size));
        r.set_crs(Some(CRS::from_epsg(32631)));
        r.set_nodata(Some(FLOAT32_NODATA));
        r
    }

    #[test]
    fn test_total_is_conserved_on_finer_grid() {
        let dir = tempfile::tempdir().unwrap();
        let src = population(100.0, 10, 10, 100.0);
        let target = GridSpec::of(&src).with_pixel_size((50.0, -50.0));

        let out = resample_population(&src, &target, dir.path()).unwrap();

        assert_eq!(out.shape(), (20, 20));
        assert_relative_eq!(out.get(7, 7).unwrap(), 25.0, epsilon = 1e-3);
        assert_relative_eq!(out.valid_sum(), src.valid_sum(), max_relative = 1e-5);
    }

    #[test]
    fn test_nodata_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let mut src = population(10.0, 4, 4, 100.0);
        src.set(0, 0, FLOAT32_NODATA).unwrap();
        let target = GridSpec::of(&src);

        let out = resample_population(&src, &target, dir.path()).unwrap();
        assert!(out.is_nodata_at(0, 0).unwrap());
        assert_relative_eq!(out.get(2, 2).unwrap(), 10.0, epsilon = 1e-4);
        assert_eq!(out.nodata(), Some(FLOAT32_NODATA));
    }

    #[test]
    fn test_scratch_directory_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let src = population(1.0, 3, 3, 30.0);
        resample_population(&src, &GridSpec::of(&src), dir.path()).unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        // also when the run fails after the scratch directory exists
        let mut flat = src.clone();
        flat.set_transform(GeoTransform::new(0.0, 0.0, 0.0, -30.0));
        assert!(resample_population(&flat, &GridSpec::of(&src), dir.path()).is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_geographic_source_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut src = population(1.0, 2, 2, 0.01);
        src.set_crs(Some(CRS::from_epsg(4326)));
        let target = GridSpec::of(&src);
        assert!(resample_population(&src, &target, dir.path()).is_err());
    }
}
