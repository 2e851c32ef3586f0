use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{error, info};

use crate::core::domain::Termination;
use crate::solvers::SolverEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Starting,
    Running,
    Finished,
    Error,
}

/// Drains solver events on the main thread and turns them into log lines.
///
/// Accepted steps are only counted; the trajectory file already holds them.
/// A heartbeat line is logged at most once per `interval`.
pub struct ProgressMonitor {
    rx: Receiver<SolverEvent>,
    interval: Duration,
    last_report: Instant,

    pub status: WorkerStatus,
    pub termination: Option<Termination>,
    pub accepted: usize,
    pub best_energy: Option<f64>,
    pub last_iteration: usize,
    pub rate: f64,
}

impl ProgressMonitor {
    pub fn new(rx: Receiver<SolverEvent>, interval: Duration) -> Self {
        Self {
            rx,
            interval,
            last_report: Instant::now(),
            status: WorkerStatus::Starting,
            termination: None,
            accepted: 0,
            best_energy: None,
            last_iteration: 0,
            rate: 0.0,
        }
    }

    /// Blocks until the sender side is dropped.
    pub fn drain(&mut self) {
        loop {
            match self.rx.recv_timeout(self.interval) {
                Ok(evt) => self.handle_event(evt),
                Err(RecvTimeoutError::Timeout) => self.report(),
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    pub fn handle_event(&mut self, event: SolverEvent) {
        match event {
            SolverEvent::Log(msg) => info!("{msg}"),

            SolverEvent::Accepted(rec) => {
                self.status = WorkerStatus::Running;
                self.last_iteration = rec.iteration;
                // The initial record is not an accepted proposal
                if rec.iteration > 0 {
                    self.accepted += 1;
                }
                if self.best_energy.is_none() {
                    self.best_energy = Some(rec.energy);
                }
            }

            SolverEvent::NewBest { iteration, energy } => {
                self.best_energy = Some(energy);
                info!(">>> New best: {energy:.6} eV at iteration {iteration}");
            }

            SolverEvent::Heartbeat {
                iteration,
                temperature,
                rate,
                cap,
            } => {
                self.status = WorkerStatus::Running;
                self.last_iteration = iteration;
                self.rate = rate;
                if self.last_report.elapsed() >= self.interval {
                    info!(
                        "iteration {iteration} at T = {temperature:.3} K, {rate:.1} proposals/s, swap cap {cap}"
                    );
                    self.last_report = Instant::now();
                }
            }

            SolverEvent::Finished(t) => {
                self.status = WorkerStatus::Finished;
                self.termination = Some(t);
                info!("Solver finished: {t:?}");
            }

            SolverEvent::Failed(msg) => {
                self.status = WorkerStatus::Error;
                error!("Solver failed: {msg}");
            }
        }
    }

    fn report(&mut self) {
        if self.status == WorkerStatus::Running {
            info!(
                "{} accepted so far, best {:?}, last accepted iteration {}",
                self.accepted, self.best_energy, self.last_iteration
            );
            self.last_report = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::trajectory::StepRecord;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_monitor_tracks_events() {
        let (tx, rx) = unbounded();
        let mut m = ProgressMonitor::new(rx, Duration::from_millis(10));

        let rec = |iteration, energy| StepRecord {
            iteration,
            since_previous: 0,
            temperature: 0.0,
            energy,
        };
        tx.send(SolverEvent::Accepted(rec(0, -1.0))).unwrap();
        tx.send(SolverEvent::Accepted(rec(3, -1.5))).unwrap();
        tx.send(SolverEvent::NewBest { iteration: 3, energy: -1.5 }).unwrap();
        tx.send(SolverEvent::Finished(Termination::Exhausted)).unwrap();
        drop(tx);

        m.drain();
        assert_eq!(m.accepted, 1);
        assert_eq!(m.best_energy, Some(-1.5));
        assert_eq!(m.status, WorkerStatus::Finished);
        assert_eq!(m.termination, Some(Termination::Exhausted));
    }
}
