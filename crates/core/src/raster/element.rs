//! Raster element trait for generic cell values

use num_traits::{NumCast, Zero};
use std::fmt::Debug;

/// On-disk sample layout of a raster element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

/// Trait for types that can be stored in a raster cell.
///
/// This trait bounds the types that can be used as raster values,
/// ensuring they support necessary numeric operations.
pub trait RasterElement:
    Copy + Clone + Debug + PartialOrd + PartialEq + NumCast + Zero + Send + Sync + 'static
{
    /// Minimum value representable by this type
    fn min_value() -> Self;

    /// Maximum value representable by this type
    fn max_value() -> Self;

    /// Default no-data value for this type
    fn default_nodata() -> Self;

    /// Check if this value represents no-data
    fn is_nodata(&self, nodata: Option<Self>) -> bool;

    /// Whether this type is a floating point type
    fn is_float() -> bool;

    /// Sample layout used when writing this type to a GeoTIFF
    fn sample_kind() -> SampleKind;

    /// Convert self to f64
    fn to_f64(self) -> Option<f64> {
        NumCast::from(self)
    }
}

macro_rules! impl_raster_element_int {
    ($t:ty, $kind:ident, $nodata:expr) => {
        impl RasterElement for $t {
            fn min_value() -> Self {
                <$t>::MIN
            }

            fn max_value() -> Self {
                <$t>::MAX
            }

            fn default_nodata() -> Self {
                $nodata
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                match nodata {
                    Some(nd) => *self == nd,
                    None => false,
                }
            }

            fn is_float() -> bool {
                false
            }

            fn sample_kind() -> SampleKind {
                SampleKind::$kind
            }
        }
    };
}

macro_rules! impl_raster_element_float {
    ($t:ty, $kind:ident) => {
        impl RasterElement for $t {
            fn min_value() -> Self {
                <$t>::MIN
            }

            fn max_value() -> Self {
                <$t>::MAX
            }

            /// The most negative finite value, which never collides with a
            /// legitimate count, area or ratio.
            fn default_nodata() -> Self {
                <$t>::MIN
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                if self.is_nan() {
                    return true;
                }
                match nodata {
                    Some(nd) if nd.is_nan() => false,
                    Some(nd) if nd == <$t>::MIN || nd == <$t>::MAX => *self == nd,
                    Some(nd) => (self - nd).abs() <= <$t>::EPSILON * nd.abs().max(1.0),
                    None => false,
                }
            }

            fn is_float() -> bool {
                true
            }

            fn sample_kind() -> SampleKind {
                SampleKind::$kind
            }
        }
    };
}

// Unsigned types reserve their maximum: u8 255 for byte rasters, u32::MAX
// for feature-ID rasters.
impl_raster_element_int!(i8, I8, i8::MIN);
impl_raster_element_int!(i16, I16, i16::MIN);
impl_raster_element_int!(i32, I32, i32::MIN);
impl_raster_element_int!(i64, I64, i64::MIN);
impl_raster_element_int!(u8, U8, u8::MAX);
impl_raster_element_int!(u16, U16, u16::MAX);
impl_raster_element_int!(u32, U32, u32::MAX);
impl_raster_element_int!(u64, U64, u64::MAX);
impl_raster_element_float!(f32, F32);
impl_raster_element_float!(f64, F64);
