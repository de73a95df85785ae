mod coordinator;
mod gate;
mod outcome;

pub use coordinator::{Coordinator, DisbursementPolicy, DEFAULT_COOLDOWN_WINDOW, DEFAULT_SUBMISSION_TIMEOUT};
pub use gate::{AdmissionGate, GatePass};
pub use outcome::{CoordinatorError, DisbursementOutcome};
