//! Differenced NBR between two snapshots
//!
//! `dNBR = NBR_pre - NBR_post`; positive values mean vegetation loss.

use super::indices::build_output;
use crate::maybe_rayon::*;
use emberline_core::raster::Raster;
use emberline_core::{Algorithm, Error, Result};

/// Unbounded difference raster, NaN where either input is no-data
pub type DeltaRaster = Raster<f64>;

/// dNBR algorithm over a (pre, post) index pair
#[derive(Debug, Clone, Default)]
pub struct Dnbr;

impl Algorithm for Dnbr {
    type Input = (Raster<f64>, Raster<f64>);
    type Output = DeltaRaster;
    type Params = ();
    type Error = Error;

    fn name(&self) -> &'static str {
        "dNBR"
    }

    fn description(&self) -> &'static str {
        "Differenced Normalized Burn Ratio (pre-fire minus post-fire)"
    }

    fn execute(&self, input: Self::Input, _params: Self::Params) -> Result<Self::Output> {
        compute_delta(&input.0, &input.1)
    }
}

/// Compute `pre - post` cell by cell.
///
/// Fails with [`Error::GridMismatch`] unless both inputs share shape and
/// transform. Scenes from different acquisitions are not resampled onto
/// each other here.
pub fn compute_delta(pre: &Raster<f64>, post: &Raster<f64>) -> Result<DeltaRaster> {
    pre.ensure_aligned(post)?;

    let (rows, cols) = pre.shape();
    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for col in 0..cols {
                let a = unsafe { pre.get_unchecked(row, col) };
                let b = unsafe { post.get_unchecked(row, col) };
                if pre.is_nodata(a) || post.is_nodata(b) {
                    continue;
                }
                row_data[col] = a - b;
            }
            row_data
        })
        .collect();

    build_output(pre, rows, cols, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imagery::{compute_index, IndexParams, Snapshot};
    use approx::assert_relative_eq;
    use emberline_core::GeoTransform;

    fn grid(values: Vec<f64>, rows: usize, cols: usize) -> Raster<f64> {
        let mut r = Raster::from_vec(values, rows, cols).unwrap();
        r.set_transform(GeoTransform::new(0.0, 100.0, 10.0, -10.0));
        r
    }

    #[test]
    fn delta_is_pre_minus_post() {
        let pre = grid(vec![0.6, 0.2, -0.1, f64::NAN], 2, 2);
        let post = grid(vec![0.1, 0.3, -0.1, 0.5], 2, 2);
        let d = compute_delta(&pre, &post).unwrap();
        assert_relative_eq!(d.get(0, 0).unwrap(), 0.5, epsilon = 1e-12);
        assert_relative_eq!(d.get(0, 1).unwrap(), -0.1, epsilon = 1e-12);
        assert_eq!(d.get(1, 0).unwrap(), 0.0);
        assert!(d.get(1, 1).unwrap().is_nan());
    }

    #[test]
    fn swapping_inputs_negates() {
        let a = grid(vec![0.7, -0.2, 0.05, 0.33, 0.0, -0.9], 2, 3);
        let b = grid(vec![-0.3, 0.4, 0.05, 0.91, 0.2, 0.1], 2, 3);
        let ab = compute_delta(&a, &b).unwrap();
        let ba = compute_delta(&b, &a).unwrap();
        for (x, y) in ab.data().iter().zip(ba.data().iter()) {
            assert_eq!(*x, -*y);
        }
    }

    #[test]
    fn shifted_grid_is_rejected() {
        let pre = grid(vec![0.0; 4], 2, 2);
        let mut post = grid(vec![0.0; 4], 2, 2);
        post.set_transform(GeoTransform::new(10.0, 100.0, 10.0, -10.0));
        assert!(matches!(compute_delta(&pre, &post), Err(Error::GridMismatch(_))));

        let smaller = grid(vec![0.0; 2], 1, 2);
        assert!(matches!(compute_delta(&pre, &smaller), Err(Error::GridMismatch(_))));
    }

    #[test]
    fn synthetic_fire_scenario() {
        let params = IndexParams::default();
        let pre = compute_index(
            &grid(vec![5000.0], 1, 1),
            &grid(vec![1000.0], 1, 1),
            Snapshot::Pre,
            &params,
        )
        .unwrap();
        let post = compute_index(
            &grid(vec![1000.0], 1, 1),
            &grid(vec![4000.0], 1, 1),
            Snapshot::Post,
            &params,
        )
        .unwrap();

        let pre_v = pre.raster().get(0, 0).unwrap();
        let post_v = post.raster().get(0, 0).unwrap();
        assert_relative_eq!(pre_v, 0.6667, epsilon = 1e-3);
        assert_relative_eq!(post_v, -0.6, epsilon = 1e-12);

        let d = Dnbr
            .execute_default((pre.into_raster(), post.into_raster()))
            .unwrap();
        assert_relative_eq!(d.get(0, 0).unwrap(), 1.2667, epsilon = 1e-3);
    }
}
