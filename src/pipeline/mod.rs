pub mod commands;
pub mod controller;
pub mod state;

pub use controller::{Orchestrator, RunOutcome, RunTicket};
pub use state::{PipelineState, PipelineStatus};
