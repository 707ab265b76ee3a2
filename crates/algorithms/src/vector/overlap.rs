//! Polygon overlap measurement

use geo::{Area, BooleanOps};
use geo_types::MultiPolygon;
use tracing::debug;

use greenaccess_core::vector::FeatureCollection;

/// Relative tolerance under which the union and the summed areas are equal
const AREA_TOLERANCE: f64 = 1e-9;

/// Summed feature area against the area of their union
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlapReport {
    pub area_sum: f64,
    pub union_area: f64,
}

impl OverlapReport {
    /// Share of the summed area covered more than once, in `[0, 1]`
    pub fn overlap_fraction(&self) -> f64 {
        if self.area_sum <= 0.0 {
            return 0.0;
        }
        (1.0 - self.union_area / self.area_sum).max(0.0)
    }

    /// Whether overlap exceeds floating-point noise
    pub fn overlaps(&self) -> bool {
        let diff = (self.area_sum - self.union_area).abs();
        diff > AREA_TOLERANCE * self.area_sum.abs().max(self.union_area.abs())
    }
}

/// Compare the sum of polygon areas with the area of their union.
pub fn measure_overlap(features: &FeatureCollection) -> OverlapReport {
    let mut area_sum = 0.0;
    let mut union = MultiPolygon::<f64>::new(Vec::new());
    for feature in features.iter() {
        let polygons = feature.polygons();
        area_sum += polygons.unsigned_area();
        union = union.union(&polygons);
    }
    let report = OverlapReport {
        area_sum,
        union_area: union.unsigned_area(),
    };
    debug!(
        "union area {:.3}, area sum {:.3}: about {:.2}% of the area overlaps",
        report.union_area,
        report.area_sum,
        report.overlap_fraction() * 100.0
    );
    report
}
