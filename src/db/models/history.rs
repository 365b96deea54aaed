use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::AnalysisResult;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub analysis: String,
    pub answer: Option<String>,
    pub analysis_time_seconds: f64,
    pub question_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn from_result(result: &AnalysisResult, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            analysis: result.analysis.clone(),
            answer: result.answer.clone(),
            analysis_time_seconds: result.analysis_time,
            question_type: result.question_type.clone(),
            created_at,
        }
    }
}
