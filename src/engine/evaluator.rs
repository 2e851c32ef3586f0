use crate::core::domain::Structure;
use anyhow::Result;

/// A generic interface for formation-energy calculators.
/// Implementations must be Thread-Safe (Sync).
///
/// The annealer calls `evaluate` strictly sequentially and never retries or
/// caches; any `Err` ends the run. Retry policy, if wanted, belongs inside the
/// implementation.
pub trait EnergyOracle: Send + Sync {
    /// Formation energy (eV, or eV/atom; the annealer only needs consistency).
    fn evaluate(&self, structure: &Structure) -> Result<f64>;

    /// Returns the name of the backend (e.g., "MEGNet Eform_MP_2019").
    fn name(&self) -> &str;
}
