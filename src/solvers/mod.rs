pub mod sps;

use crate::core::domain::Termination;
use crate::io::trajectory::StepRecord;

/// Events emitted by the annealer to an optional monitor thread.
/// A disconnected receiver never interrupts a run.
#[derive(Debug, Clone)]
pub enum SolverEvent {
    /// Diagnostic log message.
    Log(String),

    /// An accepted proposal (also emitted for the initial record).
    Accepted(StepRecord),

    /// A structure that beats the run's best energy.
    NewBest { iteration: usize, energy: f64 },

    /// Emitted after each schedule entry.
    Heartbeat {
        iteration: usize,
        temperature: f64,
        /// Proposals evaluated per second during the entry.
        rate: f64,
        /// Current adaptive swap cap.
        cap: usize,
    },

    /// The run ended normally.
    Finished(Termination),

    /// The run ended with an error.
    Failed(String),
}
