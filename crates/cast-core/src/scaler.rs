//! Per-feature min/max normalization to [0, 1].
//!
//! The fitted ranges are the model's normalization descriptor and are
//! persisted next to the weights; features and targets get separate
//! scalers because their magnitudes differ by orders of magnitude
//! (price levels vs per-minute deltas).

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    min: Vec<f64>,
    max: Vec<f64>,
}

impl MinMaxScaler {
    /// Fit per-column ranges over the training rows.
    pub fn fit(data: &Array2<f64>) -> Self {
        let cols = data.ncols();
        let mut min = vec![f64::INFINITY; cols];
        let mut max = vec![f64::NEG_INFINITY; cols];
        for row in data.rows() {
            for (j, &v) in row.iter().enumerate() {
                min[j] = min[j].min(v);
                max[j] = max[j].max(v);
            }
        }
        Self { min, max }
    }

    pub fn width(&self) -> usize {
        self.min.len()
    }

    fn scale_one(&self, j: usize, v: f64) -> f64 {
        let range = self.max[j] - self.min[j];
        if range == 0.0 {
            0.0
        } else {
            (v - self.min[j]) / range
        }
    }

    fn unscale_one(&self, j: usize, v: f64) -> f64 {
        self.min[j] + v * (self.max[j] - self.min[j])
    }

    pub fn transform(&self, data: &Array2<f64>) -> Array2<f64> {
        let mut out = data.clone();
        for mut row in out.rows_mut() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = self.scale_one(j, *v);
            }
        }
        out
    }

    pub fn transform_row(&self, row: ArrayView1<'_, f64>) -> Array1<f64> {
        Array1::from_iter(row.iter().enumerate().map(|(j, &v)| self.scale_one(j, v)))
    }

    pub fn inverse_row(&self, row: ArrayView1<'_, f64>) -> Array1<f64> {
        Array1::from_iter(row.iter().enumerate().map(|(j, &v)| self.unscale_one(j, v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn fit_transform_round_trip() {
        let data = array![[1.0, -10.0], [3.0, 0.0], [5.0, 10.0]];
        let scaler = MinMaxScaler::fit(&data);
        let scaled = scaler.transform(&data);

        assert_eq!(scaled[[0, 0]], 0.0);
        assert_eq!(scaled[[1, 0]], 0.5);
        assert_eq!(scaled[[2, 0]], 1.0);
        assert_eq!(scaled[[0, 1]], 0.0);
        assert_eq!(scaled[[2, 1]], 1.0);

        let restored = scaler.inverse_row(scaled.row(1));
        assert!((restored[0] - 3.0).abs() < 1e-12);
        assert!((restored[1] - 0.0).abs() < 1e-12);
    }

    #[test]
    fn constant_column_maps_to_zero() {
        let data = array![[7.0, 1.0], [7.0, 2.0]];
        let scaler = MinMaxScaler::fit(&data);
        let scaled = scaler.transform(&data);
        assert_eq!(scaled[[0, 0]], 0.0);
        assert_eq!(scaled[[1, 0]], 0.0);
        // Inverse of the degenerate column returns the constant.
        let restored = scaler.inverse_row(scaled.row(0));
        assert_eq!(restored[0], 7.0);
    }

    #[test]
    fn descriptor_survives_serde() {
        let data = array![[1.0, 2.0], [4.0, 8.0]];
        let scaler = MinMaxScaler::fit(&data);
        let json = serde_json::to_string(&scaler).unwrap();
        let back: MinMaxScaler = serde_json::from_str(&json).unwrap();
        assert_eq!(back, scaler);
    }
}
