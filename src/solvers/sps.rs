//! Simulated-annealing site-permutation search.
//!
//! One [`Annealer`] invocation owns one run: it validates the input, evaluates
//! the starting occupation, then walks the temperature schedule proposing
//! candidates, applying the Metropolis test, growing the swap cap while stuck,
//! and persisting the trajectory and best structure as it goes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use crossbeam_channel::Sender;
use log::{debug, info, warn};
use nalgebra::Point3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use uuid::Uuid;

use crate::core::domain::{
    LatticeFrame, SpsParams, Structure, TemperatureSchedule, Termination, BOLTZMANN_EV,
};
use crate::core::error::{SpsError, SpsResult};
use crate::core::occupation::{FixedOccupation, Occupation, VacancyOccupation};
use crate::engine::evaluator::EnergyOracle;
use crate::engine::operators::{SiteSwap, SwapMove, VacancyHop};
use crate::io::trajectory::{StepRecord, TrajectoryWriter};
use crate::io::xyz;
use crate::solvers::SolverEvent;

// --- Inputs ---

/// Fully occupied lattice. Sites `[0, nfixed)` never change.
#[derive(Debug, Clone, Default)]
pub struct FixedInput {
    /// Lattice vectors as rows.
    pub lattice: Vec<Vec<f64>>,
    pub species: Vec<String>,
    /// Fractional coordinates, one per species.
    pub positions: Vec<[f64; 3]>,
    pub temperatures: Vec<f64>,
    /// Proposals per temperature. Empty means one each.
    pub swaps: Vec<usize>,
    pub nfixed: usize,
}

/// Lattice with a vacancy sub-lattice and an optional immobile prefix.
#[derive(Debug, Clone, Default)]
pub struct VacancyInput {
    pub lattice: Vec<Vec<f64>>,
    pub vacancy_species: Vec<String>,
    /// Vacancy-eligible sites; at least as many as `vacancy_species`.
    pub vacancy_positions: Vec<[f64; 3]>,
    pub temperatures: Vec<f64>,
    pub swaps: Vec<usize>,
    /// Must come together with `fixed_positions`; one without the other is ignored.
    pub fixed_species: Option<Vec<String>>,
    pub fixed_positions: Option<Vec<[f64; 3]>>,
}

fn to_points(raw: &[[f64; 3]]) -> Vec<Point3<f64>> {
    raw.iter().map(|p| Point3::new(p[0], p[1], p[2])).collect()
}

impl FixedInput {
    /// Validates everything checkable without the oracle.
    pub fn prepare(&self) -> SpsResult<(FixedOccupation, TemperatureSchedule)> {
        let lattice = LatticeFrame::from_rows(&self.lattice)?;
        let occ = FixedOccupation::new(
            lattice,
            self.species.clone(),
            to_points(&self.positions),
            self.nfixed,
        )?;
        let schedule = TemperatureSchedule::new(&self.temperatures, &self.swaps)?;
        Ok((occ, schedule))
    }
}

impl VacancyInput {
    /// Validates everything checkable without the oracle.
    pub fn prepare(&self) -> SpsResult<(VacancyOccupation, TemperatureSchedule)> {
        let (fixed_species, fixed_positions) = match (&self.fixed_species, &self.fixed_positions) {
            (Some(s), Some(p)) => (s.clone(), to_points(p)),
            (None, None) => (Vec::new(), Vec::new()),
            _ => {
                warn!("User must provide 1:1::species:position to fix. No fixed species or positions will be included.");
                (Vec::new(), Vec::new())
            }
        };
        let lattice = LatticeFrame::from_rows(&self.lattice)?;
        let occ = VacancyOccupation::new(
            lattice,
            self.vacancy_species.clone(),
            to_points(&self.vacancy_positions),
            fixed_species,
            fixed_positions,
        )?;
        let schedule = TemperatureSchedule::new(&self.temperatures, &self.swaps)?;
        Ok((occ, schedule))
    }
}

// --- Run bookkeeping ---

/// Mutable per-run state. Owned by a single `anneal` call.
#[derive(Debug, Clone)]
struct RunState<S> {
    current: S,
    energy: f64,
    best: S,
    best_energy: f64,
    iteration: usize,
    last_accept: usize,
    cap: usize,
    peak_cap: usize,
    accepted: usize,
    improving: usize,
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct RunSummary<S> {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub termination: Termination,
    /// Occupation and energy the walker ended on.
    pub current: S,
    pub energy: f64,
    pub best: S,
    pub best_energy: f64,
    pub iterations: usize,
    pub accepted: usize,
    /// Accepted moves with a strictly negative energy change.
    pub improving: usize,
    pub final_cap: usize,
    /// Largest swap cap reached during the run.
    pub peak_cap: usize,
    pub oracle_calls: usize,
    pub elapsed: Duration,
}

// --- Annealer ---

pub struct Annealer<R: Rng = ChaCha8Rng> {
    oracle: Arc<dyn EnergyOracle>,
    params: SpsParams,
    rng: R,
    events: Option<Sender<SolverEvent>>,
    oracle_calls: usize,
}

impl Annealer<ChaCha8Rng> {
    /// Seeds a ChaCha generator from `params.seed`.
    pub fn new(oracle: Arc<dyn EnergyOracle>, params: SpsParams) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(params.seed);
        Self {
            oracle,
            params,
            rng,
            events: None,
            oracle_calls: 0,
        }
    }
}

impl<R: Rng> Annealer<R> {
    /// Replaces the random source.
    pub fn with_rng<R2: Rng>(self, rng: R2) -> Annealer<R2> {
        Annealer {
            oracle: self.oracle,
            params: self.params,
            rng,
            events: self.events,
            oracle_calls: self.oracle_calls,
        }
    }

    pub fn with_events(mut self, tx: Sender<SolverEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Fixed-occupancy search: permutes labels on the mobile sites.
    pub fn run_fixed(&mut self, input: &FixedInput) -> SpsResult<RunSummary<FixedOccupation>> {
        let (occ, schedule) = self.guard(input.prepare())?;
        self.anneal(&SiteSwap::new(), occ, &schedule)
    }

    /// Vacancy-mode search: walks species through the vacancy sub-lattice.
    pub fn run_vacancy(
        &mut self,
        input: &VacancyInput,
    ) -> SpsResult<RunSummary<VacancyOccupation>> {
        let (occ, schedule) = self.guard(input.prepare())?;
        self.anneal(&VacancyHop::new(), occ, &schedule)
    }

    /// Runs the annealing loop for any move type.
    ///
    /// # Errors
    /// Configuration errors (including an existing trajectory file) are raised
    /// before the first oracle call. Oracle and I/O errors end the run; the
    /// trajectory written up to that point stays valid.
    pub fn anneal<M: SwapMove>(
        &mut self,
        mover: &M,
        initial: M::State,
        schedule: &TemperatureSchedule,
    ) -> SpsResult<RunSummary<M::State>> {
        let result = self.anneal_inner(mover, initial, schedule);
        self.guard(result)
    }

    fn anneal_inner<M: SwapMove>(
        &mut self,
        mover: &M,
        initial: M::State,
        schedule: &TemperatureSchedule,
    ) -> SpsResult<RunSummary<M::State>> {
        // 1. Validation (no oracle calls)
        self.params.validate()?;
        if schedule.is_empty() {
            return Err(SpsError::config("Temperature schedule must not be empty"));
        }
        TrajectoryWriter::ensure_absent(&self.params.swap_path)?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();
        let base_cap = self.params.nswap;
        let calls_before = self.oracle_calls;

        let composition = initial.composition();
        info!(
            "SPS run {} ({}, oracle: {}): {} ({} atoms) over {} temperatures, {} proposals",
            run_id,
            mover.name(),
            self.oracle.name(),
            composition.formula(),
            composition.total(),
            schedule.len(),
            schedule.total_iterations()
        );

        // 2. Initial evaluation
        let e0 = self.evaluate(&initial.build_structure()?)?;
        let first = StepRecord {
            iteration: 0,
            since_previous: 0,
            temperature: schedule.first_temperature(),
            energy: e0,
        };
        let mut traj = TrajectoryWriter::create(&self.params.swap_path, &first)?;
        self.emit(SolverEvent::Accepted(first));
        self.emit(SolverEvent::Log(format!("Initial energy {e0}")));

        let mut state = RunState {
            current: initial.clone(),
            energy: e0,
            best: initial,
            best_energy: e0,
            iteration: 0,
            last_accept: 0,
            cap: base_cap,
            peak_cap: base_cap,
            accepted: 0,
            improving: 0,
        };

        // 3. Main loop
        let mut termination = Termination::Exhausted;
        'schedule: for (temperature, steps) in schedule.iter() {
            let block_clock = Instant::now();
            let block_start = state.iteration;

            for _ in 0..steps {
                state.iteration += 1;

                let candidate = mover.propose(&state.current, state.cap, &mut self.rng)?;
                let structure = candidate.build_structure()?;
                let energy = self.evaluate(&structure)?;
                let delta = energy - state.energy;

                if self.metropolis(delta, temperature) {
                    let rec = StepRecord {
                        iteration: state.iteration,
                        since_previous: state.iteration - state.last_accept,
                        temperature,
                        energy,
                    };
                    traj.append(&rec)?;
                    debug!("accepted {rec} (dE = {delta:+.6}, cap = {})", state.cap);

                    state.accepted += 1;
                    if delta < 0.0 {
                        state.improving += 1;
                    }
                    state.current = candidate;
                    state.energy = energy;
                    state.cap = base_cap;
                    state.last_accept = state.iteration;
                    self.emit(SolverEvent::Accepted(rec));

                    if energy < state.best_energy {
                        state.best_energy = energy;
                        state.best = state.current.clone();
                        if let Some(path) = &self.params.emin_path {
                            xyz::write_extxyz(path, &structure, Some(energy))?;
                        }
                        self.emit(SolverEvent::NewBest {
                            iteration: state.iteration,
                            energy,
                        });
                    }
                } else if (state.iteration - state.last_accept) % self.params.nswap_inc == 0 {
                    state.cap += 1;
                    state.peak_cap = state.peak_cap.max(state.cap);
                    debug!(
                        "{} rejections since iteration {}, swap cap now {}",
                        state.iteration - state.last_accept,
                        state.last_accept,
                        state.cap
                    );
                }

                if let Some(stop) = self.params.stop {
                    if state.best_energy <= stop {
                        info!(
                            "Best energy {} reached stop threshold {} at iteration {}",
                            state.best_energy, stop, state.iteration
                        );
                        termination = Termination::Converged;
                        break 'schedule;
                    }
                }
            }

            let secs = block_clock.elapsed().as_secs_f64();
            let done = state.iteration - block_start;
            let rate = if secs > 0.0 { done as f64 / secs } else { 0.0 };
            self.emit(SolverEvent::Heartbeat {
                iteration: state.iteration,
                temperature,
                rate,
                cap: state.cap,
            });
        }

        info!(
            "SPS run {} finished ({:?}): {} iterations, {} accepted, best energy {}",
            run_id, termination, state.iteration, state.accepted, state.best_energy
        );
        info!(
            "{} trajectory records in {}",
            traj.records(),
            traj.path().display()
        );
        self.emit(SolverEvent::Finished(termination));

        Ok(RunSummary {
            run_id,
            started_at,
            termination,
            current: state.current,
            energy: state.energy,
            best: state.best,
            best_energy: state.best_energy,
            iterations: state.iteration,
            accepted: state.accepted,
            improving: state.improving,
            final_cap: state.cap,
            peak_cap: state.peak_cap,
            oracle_calls: self.oracle_calls - calls_before,
            elapsed: clock.elapsed(),
        })
    }

    /// Metropolis criterion. Zero temperature accepts strict improvements only.
    fn metropolis(&mut self, delta: f64, temperature: f64) -> bool {
        if delta < 0.0 {
            return true;
        }
        if temperature == 0.0 {
            return false;
        }
        let prob = (-delta / (BOLTZMANN_EV * temperature)).exp();
        prob > self.rng.gen::<f64>()
    }

    fn evaluate(&mut self, structure: &Structure) -> SpsResult<f64> {
        self.oracle_calls += 1;
        let energy = self.oracle.evaluate(structure).map_err(SpsError::Oracle)?;
        if !energy.is_finite() {
            return Err(SpsError::Oracle(anyhow::anyhow!(
                "{} returned a non-finite energy ({energy})",
                self.oracle.name()
            )));
        }
        Ok(energy)
    }

    fn emit(&self, event: SolverEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Reports a failure to the monitor before handing it back.
    fn guard<T>(&self, result: SpsResult<T>) -> SpsResult<T> {
        if let Err(e) = &result {
            self.emit(SolverEvent::Failed(e.to_string()));
        }
        result
    }
}

/// Fixed-occupancy run with a freshly seeded annealer.
pub fn run_fixed(
    input: &FixedInput,
    params: &SpsParams,
    oracle: Arc<dyn EnergyOracle>,
) -> SpsResult<RunSummary<FixedOccupation>> {
    Annealer::new(oracle, params.clone()).run_fixed(input)
}

/// Vacancy-mode run with a freshly seeded annealer.
pub fn run_vacancy(
    input: &VacancyInput,
    params: &SpsParams,
    oracle: Arc<dyn EnergyOracle>,
) -> SpsResult<RunSummary<VacancyOccupation>> {
    Annealer::new(oracle, params.clone()).run_vacancy(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    struct Flat;

    impl EnergyOracle for Flat {
        fn evaluate(&self, _: &Structure) -> anyhow::Result<f64> {
            Ok(0.0)
        }
        fn name(&self) -> &str {
            "flat"
        }
    }

    fn annealer() -> Annealer<StepRng> {
        // Every uniform draw is 0.0
        Annealer::new(Arc::new(Flat), SpsParams::default()).with_rng(StepRng::new(0, 0))
    }

    #[test]
    fn test_metropolis_downhill_always_accepted() {
        let mut a = annealer();
        assert!(a.metropolis(-1e-9, 0.0));
        assert!(a.metropolis(-5.0, 300.0));
    }

    #[test]
    fn test_metropolis_zero_temperature_rejects_flat_and_uphill() {
        let mut a = annealer();
        assert!(!a.metropolis(0.0, 0.0));
        assert!(!a.metropolis(1e-6, 0.0));
    }

    #[test]
    fn test_metropolis_finite_temperature_uses_boltzmann_factor() {
        let mut a = annealer();
        // With u = 0, any positive probability is accepted
        assert!(a.metropolis(0.1, 300.0));
        // exp(-1e4) underflows to zero and never beats u = 0
        assert!(!a.metropolis(1e4 * BOLTZMANN_EV * 1.0, 1.0));
    }
}
