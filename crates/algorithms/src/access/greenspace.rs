//! Greenspace classification
//!
//! Eligible land-cover pixels hold their pixel area, every other valid
//! pixel holds zero and land-cover nodata becomes float32 nodata.

use std::collections::{BTreeSet, HashMap};

use greenaccess_core::raster::{Raster, RasterElement};
use greenaccess_core::Result;

use crate::imagery::{reclassify, ReclassifyParams};

/// Land-cover eligibility for greenspace area
#[derive(Debug, Clone, Default)]
pub struct GreenspaceParams {
    /// Greenspace flag per land-cover code; every code in the raster needs a row
    pub greenspace: HashMap<i64, bool>,
    /// Restrict eligibility to these codes instead of every flagged code
    pub only_codes: Option<BTreeSet<i64>>,
}

impl GreenspaceParams {
    pub fn new(greenspace: HashMap<i64, bool>) -> Self {
        Self {
            greenspace,
            only_codes: None,
        }
    }

    pub fn restricted_to(mut self, codes: impl IntoIterator<Item = i64>) -> Self {
        self.only_codes = Some(codes.into_iter().collect());
        self
    }

    fn is_eligible(&self, code: i64, flagged: bool) -> bool {
        match &self.only_codes {
            Some(codes) => codes.contains(&code),
            None => flagged,
        }
    }
}

/// Per-pixel greenspace area from a land-cover raster.
///
/// The area of an eligible pixel is `|width * height|` of the raster's own
/// pixels. A code missing from the table fails with a mapping error naming
/// the `greenspace` column of the LULC attribute table.
pub fn greenspace_area<T: RasterElement>(lulc: &Raster<T>, params: &GreenspaceParams) -> Result<Raster<f32>> {
    let pixel_area = lulc.transform().pixel_area();
    let values = params
        .greenspace
        .iter()
        .map(|(&code, &flagged)| {
            let area = if params.is_eligible(code, flagged) { pixel_area } else { 0.0 };
            (code, area)
        })
        .collect();

    let reclass = ReclassifyParams::new(values).described(
        "land use/land cover raster",
        "LULC attribute table",
        "greenspace",
    );
    reclassify(lulc, &reclass)
}

#[cfg(test)]
mod tests {
    use super::*;
    use greenaccess_core::GeoTransform;

    fn lulc() -> Raster<i64> {
        let mut r = Raster::from_vec(vec![1, 2, 3, 255], 2, 2).unwrap();
        r.set_transform(GeoTransform::new(0.0, 0.0, 10.0, -10.0));
        r.set_nodata(Some(255));
        r
    }

    fn table() -> HashMap<i64, bool> {
        HashMap::from([(1, true), (2, false), (3, true)])
    }

    #[test]
    fn test_eligible_pixels_hold_pixel_area() {
        let area = greenspace_area(&lulc(), &GreenspaceParams::new(table())).unwrap();
        assert_eq!(area.get(0, 0).unwrap(), 100.0);
        assert_eq!(area.get(0, 1).unwrap(), 0.0);
        assert_eq!(area.get(1, 0).unwrap(), 100.0);
        assert!(area.is_nodata_at(1, 1).unwrap());
    }

    #[test]
    fn test_restricted_codes() {
        let params = GreenspaceParams::new(table()).restricted_to([3]);
        let area = greenspace_area(&lulc(), &params).unwrap();
        assert_eq!(area.get(0, 0).unwrap(), 0.0);
        assert_eq!(area.get(1, 0).unwrap(), 100.0);
    }

    #[test]
    fn test_unknown_code_names_the_table() {
        let mut t = table();
        t.remove(&2);
        let err = greenspace_area(&lulc(), &GreenspaceParams::new(t)).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("greenspace column"));
        assert!(message.contains("LULC attribute table"));
        assert!(message.contains("value 2"));
    }
}
