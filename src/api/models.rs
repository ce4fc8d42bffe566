//! Wire models for the analytics backend

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Server-issued task identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Response to a VOD submission
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitVodResponse {
    #[serde(default)]
    pub task_id: Option<TaskId>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Raw status response, before the vocabulary interprets it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEnvelope {
    pub status: String,
    #[serde(default)]
    pub result: Option<Value>,
}

impl StatusEnvelope {
    pub fn new(status: &str) -> Self {
        Self {
            status: status.to_string(),
            result: None,
        }
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }
}

/// Response to `/run_analysis`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunAnalysisResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub task_id: Option<TaskId>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Worker pool load reported by `/worker_status`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerStatus {
    #[serde(default, deserialize_with = "lenient_count")]
    pub active_tasks: Option<u64>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub max_workers: Option<u64>,
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: Option<u64>| v.map(|n| n.to_string()).unwrap_or_else(|| "–".to_string());
        write!(f, "{}/{}", show(self.active_tasks), show(self.max_workers))
    }
}

// max_workers comes straight from an environment variable on the server, so
// it may arrive as a string.
fn lenient_count<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Body of the legacy `/start-task` call
#[derive(Debug, Clone, Serialize)]
pub struct StartTaskRequest {
    pub video_id: String,
}

/// Success payload of an analytics task
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisEnvelope {
    #[serde(default)]
    pub analysis_result: Option<AnalysisResult>,
}

/// Analytics sections; each one is present only if its metric was requested
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_chatters: Option<Vec<(String, u64)>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_pastes: Option<Vec<PastaCluster>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_emoticons: Option<Vec<EmoteUsage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_activity: Option<ChatActivity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords_search: Option<Value>,
}

impl AnalysisResult {
    /// Decode a task's success payload. Anything without an
    /// `analysis_result` object decodes as an empty result.
    pub fn from_task_payload(payload: &Value) -> crate::error::Result<Self> {
        if !payload.is_object() {
            return Ok(Self::default());
        }
        let envelope: AnalysisEnvelope = serde_json::from_value(payload.clone())
            .map_err(crate::error::ClientError::InvalidResult)?;
        Ok(envelope.analysis_result.unwrap_or_default())
    }

    pub fn is_empty(&self) -> bool {
        self.top_chatters.is_none()
            && self.top_pastes.is_none()
            && self.top_emoticons.is_none()
            && self.chat_activity.is_none()
    }
}

/// A copy-pasta cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PastaCluster {
    pub base_pasta: String,
    pub count: u64,
    #[serde(default)]
    pub variants: Vec<PastaVariant>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PastaVariant {
    pub text: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmoteUsage {
    pub name: String,
    #[serde(default)]
    pub url: String,
    pub count: u64,
}

/// Per-minute chat activity. Minute keys stay as sent; `render` parses them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatActivity {
    #[serde(default)]
    pub messages_per_minute: Option<BTreeMap<String, u64>>,
    #[serde(default)]
    pub keyword_messages_per_minute: Option<BTreeMap<String, u64>>,
    #[serde(default)]
    pub category_intervals: Option<Vec<(f64, f64, String)>>,
}
