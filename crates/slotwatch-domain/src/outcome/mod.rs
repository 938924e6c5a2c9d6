mod registry;
mod repository;
mod run_result;

pub use registry::{DateOutcome, DateOutcomeRegistry, Winner};
pub use repository::{OutcomeStore, WonRecord};
pub use run_result::{RunResult, StopReason};
