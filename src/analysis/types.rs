use serde::{Deserialize, Serialize};

/// The `data` object of a successful `/api/v1/analyze` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnalysisResult {
    #[serde(default)]
    pub analysis: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default)]
    pub analysis_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
}

impl AnalysisResult {
    /// Some deployments answer with question/explanation fields instead of a
    /// single `analysis` text; fold those in and drop empty answers.
    pub fn normalized(mut self) -> Self {
        if self.analysis.trim().is_empty() {
            let parts: Vec<&str> = [&self.question_content, &self.explanation]
                .into_iter()
                .flatten()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .collect();
            self.analysis = parts.join("\n\n");
        }

        if self.answer.as_deref().is_some_and(|a| a.trim().is_empty()) {
            self.answer = None;
        }

        self
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AnalyzeEnvelope {
    pub data: AnalysisResult,
}

/// Error body; FastAPI puts a string here for handled errors and a list for
/// request validation failures.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ApiErrorBody {
    pub fn message(&self) -> Option<String> {
        match self.detail.as_ref()? {
            serde_json::Value::Null => None,
            serde_json::Value::String(text) if text.trim().is_empty() => None,
            serde_json::Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_minimal_payload_without_answer() {
        let envelope: AnalyzeEnvelope = serde_json::from_value(json!({
            "data": { "analysis": "2+2=4", "analysis_time": 1.2 }
        }))
        .unwrap();
        let result = envelope.data.normalized();
        assert_eq!(result.analysis, "2+2=4");
        assert_eq!(result.answer, None);
        assert!((result.analysis_time - 1.2).abs() < f64::EPSILON);
    }

    #[test]
    fn composes_analysis_from_question_fields() {
        let envelope: AnalyzeEnvelope = serde_json::from_value(json!({
            "success": true,
            "data": {
                "question_type": "choice",
                "question_content": "What is 2+2?",
                "answer": "4",
                "explanation": "Basic addition.",
                "analysis_time": 0.8,
                "model_used": "qwen-vl-plus"
            }
        }))
        .unwrap();
        let result = envelope.data.normalized();
        assert_eq!(result.analysis, "What is 2+2?\n\nBasic addition.");
        assert_eq!(result.answer.as_deref(), Some("4"));
        assert_eq!(result.model_used.as_deref(), Some("qwen-vl-plus"));
    }

    #[test]
    fn blank_answer_is_absent() {
        let result = AnalysisResult {
            analysis: "x".into(),
            answer: Some("  ".into()),
            ..AnalysisResult::default()
        }
        .normalized();
        assert_eq!(result.answer, None);
    }

    #[test]
    fn error_detail_variants() {
        let text: ApiErrorBody = serde_json::from_value(json!({ "detail": "model unavailable" })).unwrap();
        assert_eq!(text.message().as_deref(), Some("model unavailable"));

        let list: ApiErrorBody =
            serde_json::from_value(json!({ "detail": [{ "msg": "field required" }] })).unwrap();
        assert_eq!(list.message().as_deref(), Some(r#"[{"msg":"field required"}]"#));

        let empty: ApiErrorBody = serde_json::from_value(json!({})).unwrap();
        assert_eq!(empty.message(), None);
    }
}
