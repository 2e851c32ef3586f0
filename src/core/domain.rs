use std::path::PathBuf;

use nalgebra::{Matrix3, Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::core::error::{SpsError, SpsResult};

// --- Constants ---

/// Boltzmann constant (eV/K).
pub const BOLTZMANN_EV: f64 = 8.617333262e-5;

/// Determinant magnitude below which a cell is treated as degenerate.
const MIN_CELL_VOLUME: f64 = 1e-10;

// --- Geometry ---

/// The periodic cell. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatticeFrame {
    pub vectors: Matrix3<f64>, // Columns are a, b, c
    pub inverse: Matrix3<f64>, // Precomputed for fractional conversion
}

impl LatticeFrame {
    pub fn new(a: Vector3<f64>, b: Vector3<f64>, c: Vector3<f64>) -> SpsResult<Self> {
        let vectors = Matrix3::from_columns(&[a, b, c]);
        if vectors.determinant().abs() < MIN_CELL_VOLUME {
            return Err(SpsError::config("Lattice vectors are degenerate (zero cell volume)"));
        }
        let inverse = vectors
            .try_inverse()
            .ok_or_else(|| SpsError::config("Lattice matrix is not invertible"))?;
        Ok(Self { vectors, inverse })
    }

    /// Builds the cell from the row layout `[R1, R2, R3]` used by structure files.
    /// Rejects anything that is not exactly 3x3.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> SpsResult<Self> {
        if rows.len() != 3 || rows.iter().any(|r| r.as_ref().len() != 3) {
            return Err(SpsError::config("Lattice shape must be (3,3)"));
        }
        let v = |i: usize| {
            let r = rows[i].as_ref();
            Vector3::new(r[0], r[1], r[2])
        };
        Self::new(v(0), v(1), v(2))
    }

    /// The lattice vectors as rows.
    pub fn rows(&self) -> [[f64; 3]; 3] {
        let mut out = [[0.0; 3]; 3];
        for (i, row) in out.iter_mut().enumerate() {
            let col = self.vectors.column(i);
            *row = [col[0], col[1], col[2]];
        }
        out
    }

    pub fn to_fractional(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.inverse * p.coords)
    }

    pub fn to_cartesian(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.vectors * p.coords)
    }

    pub fn volume(&self) -> f64 {
        self.vectors.determinant().abs()
    }
}

/// The flat `(lattice, species, positions)` triple handed to the energy oracle.
/// Positions are fractional.
#[derive(Debug, Clone, PartialEq)]
pub struct Structure {
    pub lattice: LatticeFrame,
    pub species: Vec<String>,
    pub positions: Vec<Point3<f64>>,
}

impl Structure {
    pub fn len(&self) -> usize {
        self.species.len()
    }

    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }

    pub fn cartesian_positions(&self) -> Vec<Point3<f64>> {
        self.positions
            .iter()
            .map(|p| self.lattice.to_cartesian(p))
            .collect()
    }
}

// --- Schedule ---

/// Ordered `(temperature, swap-count)` pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureSchedule {
    steps: Vec<(f64, usize)>,
}

impl TemperatureSchedule {
    /// Pairs temperatures with per-temperature proposal counts.
    /// An empty `swaps` slice means one proposal per temperature.
    pub fn new(temperatures: &[f64], swaps: &[usize]) -> SpsResult<Self> {
        if temperatures.is_empty() {
            return Err(SpsError::config("Temperature schedule must not be empty"));
        }
        if let Some(t) = temperatures.iter().find(|t| !t.is_finite() || **t < 0.0) {
            return Err(SpsError::config(format!(
                "Temperatures must be finite and non-negative, got {t}"
            )));
        }
        let steps = if swaps.is_empty() {
            temperatures.iter().map(|&t| (t, 1)).collect()
        } else {
            if swaps.len() != temperatures.len() {
                return Err(SpsError::config(format!(
                    "temperatures and temp_swaps must contain the same number of elements ({} vs {})",
                    temperatures.len(),
                    swaps.len()
                )));
            }
            temperatures.iter().copied().zip(swaps.iter().copied()).collect()
        };
        Ok(Self { steps })
    }

    /// Evenly spaced temperatures from `start` to `end` inclusive.
    pub fn linear(start: f64, end: f64, count: usize, swaps_per_step: usize) -> SpsResult<Self> {
        let temps: Vec<f64> = match count {
            0 => Vec::new(),
            1 => vec![start],
            n => (0..n)
                .map(|i| start + (end - start) * i as f64 / (n - 1) as f64)
                .collect(),
        };
        Self::new(&temps, &vec![swaps_per_step; temps.len()])
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, usize)> + '_ {
        self.steps.iter().copied()
    }

    pub fn first_temperature(&self) -> f64 {
        self.steps[0].0
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn total_iterations(&self) -> usize {
        self.steps.iter().map(|(_, n)| n).sum()
    }
}

// --- Configuration Types ---

/// Knobs shared by both annealing modes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpsParams {
    /// Base number of exchanges per proposal (the cap is reset to this on acceptance).
    pub nswap: usize,
    /// Consecutive rejections after which the cap grows by one.
    pub nswap_inc: usize,
    /// Trajectory output. Must not exist yet.
    pub swap_path: PathBuf,
    /// Best-structure snapshot. `None` disables snapshots.
    pub emin_path: Option<PathBuf>,
    /// Stop once the best energy is at or below this value.
    pub stop: Option<f64>,
    pub seed: u64,
}

impl Default for SpsParams {
    fn default() -> Self {
        Self {
            nswap: 2,
            nswap_inc: 1000,
            swap_path: PathBuf::from("swaps.out"),
            emin_path: Some(PathBuf::from("structure.emin.xyz")),
            stop: None,
            seed: 0,
        }
    }
}

impl SpsParams {
    pub fn validate(&self) -> SpsResult<()> {
        if self.nswap == 0 {
            return Err(SpsError::config("nswap must be at least 1"));
        }
        if self.nswap_inc == 0 {
            return Err(SpsError::config("nswap_inc must be at least 1"));
        }
        if let Some(stop) = self.stop {
            if stop.is_nan() {
                return Err(SpsError::config("stop energy must not be NaN"));
            }
        }
        Ok(())
    }
}

/// How a successful run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// The best energy reached the stop threshold.
    Converged,
    /// Every schedule entry was consumed.
    Exhausted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lattice_rows_round_trip() {
        let rows = [[2.0, 0.0, 0.0], [0.5, 3.0, 0.0], [0.0, 0.0, 4.0]];
        let lat = LatticeFrame::from_rows(&rows).unwrap();
        assert_eq!(lat.rows(), rows);
        assert!((lat.volume() - 24.0).abs() < 1e-9);
    }

    #[test]
    fn test_fractional_cartesian_row_convention() {
        let lat = LatticeFrame::from_rows(&[[2.0, 0.0, 0.0], [1.0, 2.0, 0.0], [0.0, 0.0, 3.0]]).unwrap();
        // frac @ L with rows as vectors
        let cart = lat.to_cartesian(&Point3::new(0.5, 0.5, 0.0));
        assert!((cart - Point3::new(1.5, 1.0, 0.0)).norm() < 1e-12);
        let back = lat.to_fractional(&cart);
        assert!((back - Point3::new(0.5, 0.5, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_schedule_defaults_to_single_swaps() {
        let s = TemperatureSchedule::new(&[10.0, 5.0, 0.0], &[]).unwrap();
        assert_eq!(s.total_iterations(), 3);
        assert_eq!(s.first_temperature(), 10.0);
    }

    #[test]
    fn test_linear_schedule_endpoints() {
        let s = TemperatureSchedule::linear(30.0, 0.0, 301, 1000).unwrap();
        let temps: Vec<f64> = s.iter().map(|(t, _)| t).collect();
        assert_eq!(temps.len(), 301);
        assert!((temps[0] - 30.0).abs() < 1e-12);
        assert!(temps[300].abs() < 1e-12);
        assert!((temps[1] - 29.9).abs() < 1e-9);
    }

    #[test]
    fn test_params_validation() {
        assert!(SpsParams::default().validate().is_ok());
        let p = SpsParams { nswap_inc: 0, ..Default::default() };
        assert!(p.validate().is_err());
    }
}
