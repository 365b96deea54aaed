pub mod client;
pub mod types;

pub use client::{AnalysisClient, HealthStatus, PreparedUpload, HEALTH_CHECK_TIMEOUT};
pub use types::AnalysisResult;
