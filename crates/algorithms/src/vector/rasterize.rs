//! Polygon rasterization
//!
//! A pixel belongs to a polygon when its centre lies strictly inside it.
//! Polygons too small to contain any pixel centre fall back to every pixel
//! whose footprint they intersect, so no feature ends up with an empty zone
//! while it overlaps the grid.

use geo::{BoundingRect, Contains, Intersects};
use geo_types::{coord, MultiPolygon, Point, Rect};

use crate::maybe_rayon::*;
use greenaccess_core::crs::ensure_compatible;
use greenaccess_core::raster::{Raster, RasterElement};
use greenaccess_core::vector::FeatureCollection;
use greenaccess_core::{Error, GeoTransform, Result};

/// Row-major pixel indices of a `rows x cols` grid covered by `polygons`.
pub fn feature_coverage(
    polygons: &MultiPolygon<f64>,
    transform: &GeoTransform,
    rows: usize,
    cols: usize,
) -> Vec<usize> {
    let Some((r0, r1, c0, c1)) = pixel_window(polygons, transform, rows, cols) else {
        return Vec::new();
    };

    let covered: Vec<usize> = (r0..r1)
        .into_par_iter()
        .flat_map(|row| {
            let mut hits = Vec::new();
            for col in c0..c1 {
                let (x, y) = transform.pixel_to_geo(col, row);
                if polygons.contains(&Point::new(x, y)) {
                    hits.push(row * cols + col);
                }
            }
            hits
        })
        .collect();
    if !covered.is_empty() {
        return covered;
    }

    // sliver or tiny polygon: take every pixel it touches
    let mut touched = Vec::new();
    for row in r0..r1 {
        for col in c0..c1 {
            let (ax, ay) = transform.pixel_to_geo_corner(col, row);
            let (bx, by) = transform.pixel_to_geo_corner(col + 1, row + 1);
            let footprint = Rect::new(coord! { x: ax, y: ay }, coord! { x: bx, y: by });
            if polygons.intersects(&footprint) {
                touched.push(row * cols + col);
            }
        }
    }
    touched
}

/// Half-open pixel window `(row_start, row_end, col_start, col_end)` holding
/// the polygons' bounding box, clipped to the grid.
fn pixel_window(
    polygons: &MultiPolygon<f64>,
    transform: &GeoTransform,
    rows: usize,
    cols: usize,
) -> Option<(usize, usize, usize, usize)> {
    let bbox = polygons.bounding_rect()?;
    let (ca, ra) = transform.geo_to_pixel(bbox.min().x, bbox.min().y);
    let (cb, rb) = transform.geo_to_pixel(bbox.max().x, bbox.max().y);
    let clip = |lo: f64, hi: f64, n: usize| -> Option<(usize, usize)> {
        let start = lo.floor().max(0.0);
        let end = hi.ceil().min(n as f64);
        if !(start < end) {
            return None;
        }
        Some((start as usize, end as usize))
    };
    let (r0, r1) = clip(ra.min(rb), ra.max(rb), rows)?;
    let (c0, c1) = clip(ca.min(cb), ca.max(cb), cols)?;
    Some((r0, r1, c0, c1))
}

/// Burn a numeric feature attribute onto the grid of `template`.
///
/// Cells covered by no feature hold `nodata`. Where features overlap, the
/// later feature wins. Features whose attribute is missing, null or not
/// representable as `T` are skipped.
pub fn rasterize_attribute<T: RasterElement, U: RasterElement>(
    features: &FeatureCollection,
    field: &str,
    template: &Raster<U>,
    nodata: T,
) -> Result<Raster<T>> {
    ensure_compatible(features.crs.as_ref(), template.crs())?;
    if !template.transform().is_axis_aligned() {
        return Err(Error::Algorithm(
            "rasterization needs a north-up, axis-aligned grid".into(),
        ));
    }

    let (rows, cols) = template.shape();
    let mut output = template.with_same_meta::<T>(rows, cols);
    output.data_mut().fill(nodata);
    output.set_nodata(Some(nodata));

    let transform = *template.transform();
    let cells = output
        .data_mut()
        .as_slice_mut()
        .ok_or_else(|| Error::Algorithm("raster data is not contiguous".into()))?;

    for feature in features.iter() {
        let value = feature
            .get_property(field)
            .and_then(|v| v.as_f64())
            .and_then(num_traits::cast::<f64, T>);
        let Some(value) = value else { continue };
        for idx in feature_coverage(&feature.polygons(), &transform, rows, cols) {
            cells[idx] = value;
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use greenaccess_core::vector::{AttributeValue, Feature};
    use geo_types::{polygon, Geometry};

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Geometry<f64> {
        Geometry::Polygon(polygon![
            (x: x0, y: y0), (x: x1, y: y0), (x: x1, y: y1), (x: x0, y: y1), (x: x0, y: y0)
        ])
    }

    fn template() -> Raster<f32> {
        // 4x4 grid of 10 m pixels covering (0, 0)-(40, 40)
        let mut r = Raster::filled(4, 4, 0.0_f32);
        r.set_transform(GeoTransform::new(0.0, 40.0, 10.0, -10.0));
        r
    }

    fn feature(geometry: Geometry<f64>, id: i64) -> Feature {
        let mut f = Feature::new(geometry);
        f.set_property("adm_unit_id", AttributeValue::Int(id));
        f
    }

    #[test]
    fn test_coverage_uses_pixel_centres() {
        let t = template();
        let cells = feature_coverage(
            &Feature::new(square(0.0, 20.0, 20.0, 40.0)).polygons(),
            t.transform(),
            4,
            4,
        );
        assert_eq!(cells, vec![0, 1, 4, 5]);
    }

    #[test]
    fn test_tiny_polygon_falls_back_to_touched_pixels() {
        let t = template();
        let cells = feature_coverage(
            &Feature::new(square(11.0, 11.0, 12.0, 12.0)).polygons(),
            t.transform(),
            4,
            4,
        );
        // (11, 11) lies in row 2, col 1
        assert_eq!(cells, vec![9]);
    }

    #[test]
    fn test_polygon_outside_grid_covers_nothing() {
        let t = template();
        let poly = Feature::new(square(100.0, 100.0, 120.0, 120.0)).polygons();
        assert!(feature_coverage(&poly, t.transform(), 4, 4).is_empty());
    }

    #[test]
    fn test_rasterize_ids_later_feature_wins() {
        let mut fc = FeatureCollection::new();
        fc.push(feature(square(0.0, 0.0, 40.0, 40.0), 0));
        fc.push(feature(square(0.0, 0.0, 20.0, 20.0), 1));

        let ids: Raster<u32> = rasterize_attribute(&fc, "adm_unit_id", &template(), u32::MAX).unwrap();
        assert_eq!(ids.get(0, 0).unwrap(), 0);
        assert_eq!(ids.get(3, 0).unwrap(), 1);
        assert_eq!(ids.get(2, 1).unwrap(), 1);
        assert_eq!(ids.get(2, 2).unwrap(), 0);
    }

    #[test]
    fn test_unburned_cells_are_nodata() {
        let mut fc = FeatureCollection::new();
        fc.push(feature(square(0.0, 0.0, 20.0, 20.0), 7));
        let mut missing = Feature::new(square(20.0, 20.0, 40.0, 40.0));
        missing.set_property("adm_unit_id", AttributeValue::Null);
        fc.push(missing);

        let ids: Raster<u32> = rasterize_attribute(&fc, "adm_unit_id", &template(), u32::MAX).unwrap();
        assert_eq!(ids.nodata(), Some(u32::MAX));
        assert!(ids.is_nodata_at(0, 3).unwrap());
        assert_eq!(ids.get(3, 0).unwrap(), 7);
    }

    #[test]
    fn test_rasterize_float_proportions() {
        let mut fc = FeatureCollection::new();
        let mut f = Feature::new(square(0.0, 0.0, 40.0, 40.0));
        f.set_property("pop_female", AttributeValue::Float(0.45));
        fc.push(f);
        let weights: Raster<f32> = rasterize_attribute(&fc, "pop_female", &template(), f32::MIN).unwrap();
        assert!(weights.data().iter().all(|&w| (w - 0.45).abs() < 1e-7));
    }
}
