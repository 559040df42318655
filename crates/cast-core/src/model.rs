//! The per-horizon sequence model.
//!
//! A small dense network (features → hidden tanh → 4 linear outputs)
//! trained by seeded mini-batch SGD on normalized data. The contract
//! the rest of the system relies on is only `train` / `predict` /
//! serde; the architecture behind it is free to change as long as one
//! normalized feature vector in yields the four delta outputs.

use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub hidden: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            hidden: 32,
            epochs: 50,
            batch_size: 32,
            learning_rate: 1e-3,
            seed: 17,
        }
    }
}

/// Summary of a completed fit, recorded in the model metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainReport {
    pub epochs_run: usize,
    pub initial_loss: f64,
    pub final_loss: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HorizonModel {
    w1: Array2<f64>,
    b1: Array1<f64>,
    w2: Array2<f64>,
    b2: Array1<f64>,
}

impl HorizonModel {
    pub fn input_width(&self) -> usize {
        self.w1.nrows()
    }

    pub fn output_width(&self) -> usize {
        self.w2.ncols()
    }

    fn init(inputs: usize, hidden: usize, outputs: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut layer = |rows: usize, cols: usize| {
            let scale = 1.0 / (rows as f64).sqrt();
            Array2::from_shape_fn((rows, cols), |_| rng.gen_range(-scale..scale))
        };
        let w1 = layer(inputs, hidden);
        let w2 = layer(hidden, outputs);
        Self {
            w1,
            b1: Array1::zeros(hidden),
            w2,
            b2: Array1::zeros(outputs),
        }
    }

    fn forward(&self, x: &Array2<f64>) -> (Array2<f64>, Array2<f64>) {
        let hidden = (x.dot(&self.w1) + &self.b1).mapv(f64::tanh);
        let out = hidden.dot(&self.w2) + &self.b2;
        (hidden, out)
    }

    fn mse(&self, x: &Array2<f64>, y: &Array2<f64>) -> f64 {
        let (_, out) = self.forward(x);
        let err = &out - y;
        err.mapv(|e| e * e).mean().unwrap_or(0.0)
    }

    /// Fit a fresh model on normalized features `x` and targets `y`.
    pub fn train(x: &Array2<f64>, y: &Array2<f64>, cfg: &TrainConfig) -> (Self, TrainReport) {
        assert_eq!(x.nrows(), y.nrows(), "feature/target row mismatch");
        let samples = x.nrows();
        let mut model = Self::init(x.ncols(), cfg.hidden, y.ncols(), cfg.seed);
        let initial_loss = model.mse(x, y);

        let mut rng = StdRng::seed_from_u64(cfg.seed.wrapping_add(1));
        let mut order: Vec<usize> = (0..samples).collect();
        let batch = cfg.batch_size.max(1);

        for _ in 0..cfg.epochs {
            order.shuffle(&mut rng);
            for chunk in order.chunks(batch) {
                let xb = x.select(Axis(0), chunk);
                let yb = y.select(Axis(0), chunk);
                model.sgd_step(&xb, &yb, cfg.learning_rate);
            }
        }

        let final_loss = model.mse(x, y);
        let report = TrainReport {
            epochs_run: cfg.epochs,
            initial_loss,
            final_loss,
        };
        (model, report)
    }

    fn sgd_step(&mut self, xb: &Array2<f64>, yb: &Array2<f64>, lr: f64) {
        let m = xb.nrows() as f64;
        let (hidden, out) = self.forward(xb);

        // d(mse)/d(out), the 1/2 folded into the learning rate.
        let err = &out - yb;

        let grad_w2 = hidden.t().dot(&err) / m;
        let grad_b2 = err.mean_axis(Axis(0)).expect("non-empty batch");

        let dhidden = err.dot(&self.w2.t()) * hidden.mapv(|h| 1.0 - h * h);
        let grad_w1 = xb.t().dot(&dhidden) / m;
        let grad_b1 = dhidden.mean_axis(Axis(0)).expect("non-empty batch");

        self.w2 = &self.w2 - &(grad_w2 * lr);
        self.b2 = &self.b2 - &(grad_b2 * lr);
        self.w1 = &self.w1 - &(grad_w1 * lr);
        self.b1 = &self.b1 - &(grad_b1 * lr);
    }

    /// Run one normalized feature vector through the network.
    pub fn predict(&self, features: &Array1<f64>) -> Array1<f64> {
        let hidden = (features.dot(&self.w1) + &self.b1).mapv(f64::tanh);
        hidden.dot(&self.w2) + &self.b2
    }
}
