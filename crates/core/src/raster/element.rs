//! Raster element trait for generic cell values

use num_traits::{NumCast, Zero};
use std::fmt::Debug;

/// Trait for types that can be stored in a raster cell.
///
/// Reflectance and index rasters use `f64` (NaN is always no-data),
/// classification rasters use small unsigned integers with an explicit
/// no-data sentinel.
pub trait RasterElement:
    Copy + Clone + Debug + PartialOrd + PartialEq + NumCast + Zero + Send + Sync + 'static
{
    /// Default no-data value for this type
    fn default_nodata() -> Self;

    /// Check if this value represents no-data
    fn is_nodata(&self, nodata: Option<Self>) -> bool;

    /// Whether this type is a floating point type
    fn is_float() -> bool;

    /// Convert self to f64
    fn to_f64(self) -> Option<f64> {
        NumCast::from(self)
    }

    /// Convert from f64, falling back to the default no-data value when the
    /// value is not representable (NaN into an integer type, overflow).
    fn from_f64_or_nodata(value: f64) -> Self {
        num_traits::cast(value).unwrap_or_else(Self::default_nodata)
    }
}

macro_rules! impl_raster_element_int {
    ($t:ty, $nodata:expr) => {
        impl RasterElement for $t {
            fn default_nodata() -> Self {
                $nodata
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                nodata == Some(*self)
            }

            fn is_float() -> bool {
                false
            }
        }
    };
}

macro_rules! impl_raster_element_float {
    ($t:ty) => {
        impl RasterElement for $t {
            fn default_nodata() -> Self {
                <$t>::NAN
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                if self.is_nan() {
                    return true;
                }
                match nodata {
                    Some(nd) if !nd.is_nan() => (self - nd).abs() < <$t>::EPSILON * 100.0,
                    _ => false,
                }
            }

            fn is_float() -> bool {
                true
            }
        }
    };
}

// Unsigned sentinels sit at the top of the range so that class code 0 stays usable.
impl_raster_element_int!(u8, u8::MAX);
impl_raster_element_int!(u16, u16::MAX);
impl_raster_element_int!(i16, i16::MIN);
impl_raster_element_float!(f32);
impl_raster_element_float!(f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_is_always_nodata() {
        assert!(f64::NAN.is_nodata(None));
        assert!(f64::NAN.is_nodata(Some(0.0)));
        assert!(!0.5f64.is_nodata(Some(f64::NAN)));
    }

    #[test]
    fn integer_sentinel() {
        assert!(255u8.is_nodata(Some(255)));
        assert!(!3u8.is_nodata(Some(255)));
        assert!(!255u8.is_nodata(None));
    }

    #[test]
    fn lossy_conversion_falls_back() {
        assert_eq!(u8::from_f64_or_nodata(f64::NAN), 255);
        assert_eq!(u8::from_f64_or_nodata(4.0), 4);
        assert_eq!(u8::from_f64_or_nodata(1000.0), 255);
    }
}
