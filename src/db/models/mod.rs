pub mod history;
pub mod outcome;

pub use history::HistoryEntry;
pub use outcome::{CaptureResult, ErrorRecord, LastOutcome, Latest};
