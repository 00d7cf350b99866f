//! Reference stochastic-trajectory capability.
//!
//! [`OrnsteinUhlenbeck`] integrates one seeded sample path per task with the
//! Euler–Maruyama scheme; [`Trajectory`] holds the ensemble average of any
//! number of such paths and merges by record-weighted averaging. Two averages
//! are only compatible when they share the same time grid.

use crate::capability::{Mergeable, Simulator};
use crate::error::{IncompatibleResultError, SimulationError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

/// Parameters of one sample path of `dx = theta (mu - x) dt + sigma dW`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathParams {
    /// RNG seed; equal seeds give identical paths
    pub seed: u64,
    /// Number of integration steps (the path has `steps + 1` points)
    pub steps: usize,
    /// Time step
    pub dt: f64,
    /// Initial value
    #[serde(default)]
    pub x0: f64,
    /// Mean-reversion rate
    #[serde(default = "default_theta")]
    pub theta: f64,
    /// Long-run mean
    #[serde(default)]
    pub mu: f64,
    /// Noise amplitude
    #[serde(default = "default_sigma")]
    pub sigma: f64,
    /// Force this run to fail
    #[serde(default)]
    pub fail: bool,
}

fn default_theta() -> f64 {
    1.0
}

fn default_sigma() -> f64 {
    0.5
}

impl PathParams {
    /// Path with default dynamics.
    pub fn new(seed: u64, steps: usize, dt: f64) -> Self {
        PathParams {
            seed,
            steps,
            dt,
            x0: 0.0,
            theta: default_theta(),
            mu: 0.0,
            sigma: default_sigma(),
            fail: false,
        }
    }
}

/// Ensemble average of one or more sample paths on a shared time grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    /// Time step of the grid
    pub dt: f64,
    /// Mean of `x(t)` at each grid point
    pub mean: Vec<f64>,
    /// Mean of `x(t)^2` at each grid point
    pub mean_sq: Vec<f64>,
    /// Number of sample paths averaged
    pub records: usize,
}

impl Trajectory {
    /// Trajectory of a single sample path.
    pub fn single(dt: f64, path: Vec<f64>) -> Self {
        let mean_sq = path.iter().map(|x| x * x).collect();
        Trajectory {
            dt,
            mean: path,
            mean_sq,
            records: 1,
        }
    }

    /// Ensemble variance at each grid point.
    pub fn variance(&self) -> Vec<f64> {
        self.mean
            .iter()
            .zip(&self.mean_sq)
            .map(|(m, sq)| (sq - m * m).max(0.0))
            .collect()
    }

    /// Internal consistency of one average: both moments on the same grid and
    /// at least one path behind them.
    fn check_shape(&self, side: &str) -> Result<(), IncompatibleResultError> {
        if self.mean_sq.len() != self.mean.len() {
            return Err(IncompatibleResultError::new(format!(
                "{side} result has {} means but {} second moments",
                self.mean.len(),
                self.mean_sq.len()
            )));
        }
        if self.records == 0 {
            return Err(IncompatibleResultError::new(format!(
                "{side} result averages zero paths"
            )));
        }
        Ok(())
    }

    fn check_compatible(&self, other: &Self) -> Result<(), IncompatibleResultError> {
        self.check_shape("local")?;
        other.check_shape("incoming")?;
        if self.mean.len() != other.mean.len() {
            return Err(IncompatibleResultError::new(format!(
                "time grids have {} and {} points",
                self.mean.len(),
                other.mean.len()
            )));
        }
        let scale = self.dt.abs().max(other.dt.abs());
        if (self.dt - other.dt).abs() > scale * 1e-12 {
            return Err(IncompatibleResultError::new(format!(
                "time steps differ: {} vs {}",
                self.dt, other.dt
            )));
        }
        Ok(())
    }
}

impl Mergeable for Trajectory {
    fn merge(&mut self, other: Self) -> Result<(), IncompatibleResultError> {
        self.check_compatible(&other)?;
        let total = self.records + other.records;
        let w_self = self.records as f64 / total as f64;
        let w_other = other.records as f64 / total as f64;
        for (a, b) in self.mean.iter_mut().zip(&other.mean) {
            *a = *a * w_self + b * w_other;
        }
        for (a, b) in self.mean_sq.iter_mut().zip(&other.mean_sq) {
            *a = *a * w_self + b * w_other;
        }
        self.records = total;
        Ok(())
    }

    fn record_count(&self) -> usize {
        self.records
    }
}

/// Euler–Maruyama integrator for the Ornstein–Uhlenbeck process.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrnsteinUhlenbeck;

impl Simulator for OrnsteinUhlenbeck {
    type Task = PathParams;
    type Output = Trajectory;

    fn run(&self, p: &PathParams) -> Result<Trajectory, SimulationError> {
        if p.fail {
            return Err(SimulationError::new(format!("seed {}: forced failure", p.seed)));
        }
        if p.steps == 0 || p.dt <= 0.0 || !p.dt.is_finite() {
            return Err(SimulationError::new(format!(
                "seed {}: invalid time grid (steps={}, dt={})",
                p.seed, p.steps, p.dt
            )));
        }

        let mut rng = StdRng::seed_from_u64(p.seed);
        let sqrt_dt = p.dt.sqrt();
        let mut path = Vec::with_capacity(p.steps + 1);
        let mut x = p.x0;
        path.push(x);
        for _ in 0..p.steps {
            let dw: f64 = StandardNormal.sample(&mut rng);
            x += p.theta * (p.mu - x) * p.dt + p.sigma * sqrt_dt * dw;
            path.push(x);
        }

        if !x.is_finite() {
            return Err(SimulationError::new(format!(
                "seed {}: path diverged",
                p.seed
            )));
        }
        Ok(Trajectory::single(p.dt, path))
    }
}
