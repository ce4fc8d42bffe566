//! Task status vocabularies

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::models::StatusEnvelope;
use crate::error::{ClientError, Result};

/// Interpreted state of a server-side task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus {
    Pending,
    Success(Value),
    Failure(String),
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending)
    }
}

/// Which status contract the backend speaks.
///
/// Deployments disagree on the wire words, so a client picks exactly one:
///
/// | vocabulary | poll path                | pending   | success     | failure   |
/// |------------|--------------------------|-----------|-------------|-----------|
/// | `Current`  | `/check_status/{id}`     | `pending` | `success`   | `failure` |
/// | `Legacy`   | `/task-status/{id}`      | `pending` | `completed` | `failed`  |
///
/// Words from the other vocabulary are not accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusVocabulary {
    #[default]
    Current,
    Legacy,
}

impl StatusVocabulary {
    fn words(&self) -> (&'static str, &'static str, &'static str) {
        match self {
            StatusVocabulary::Current => ("pending", "success", "failure"),
            StatusVocabulary::Legacy => ("pending", "completed", "failed"),
        }
    }

    /// Path of the status endpoint for an already-encoded task id
    pub fn status_path(&self, encoded_task_id: &str) -> String {
        match self {
            StatusVocabulary::Current => format!("check_status/{}", encoded_task_id),
            StatusVocabulary::Legacy => format!("task-status/{}", encoded_task_id),
        }
    }

    /// Map a wire envelope to a [`TaskStatus`]. Unrecognised words are an error.
    pub fn interpret(&self, envelope: StatusEnvelope) -> Result<TaskStatus> {
        let (pending, success, failure) = self.words();
        let status = envelope.status.as_str();

        if status == pending {
            Ok(TaskStatus::Pending)
        } else if status == success {
            Ok(TaskStatus::Success(envelope.result.unwrap_or(Value::Null)))
        } else if status == failure {
            Ok(TaskStatus::Failure(failure_detail(envelope.result)))
        } else {
            Err(ClientError::UnknownStatus(envelope.status))
        }
    }
}

impl std::str::FromStr for StatusVocabulary {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "current" => Ok(StatusVocabulary::Current),
            "legacy" => Ok(StatusVocabulary::Legacy),
            other => Err(ClientError::Configuration(format!(
                "unknown status vocabulary: {}",
                other
            ))),
        }
    }
}

fn failure_detail(result: Option<Value>) -> String {
    match result {
        Some(Value::String(detail)) => detail,
        Some(Value::Null) | None => "no details from server".to_string(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_current_vocabulary() {
        let vocab = StatusVocabulary::Current;
        assert_eq!(
            vocab.interpret(StatusEnvelope::new("pending")).unwrap(),
            TaskStatus::Pending
        );
        assert_eq!(
            vocab
                .interpret(StatusEnvelope::new("success").with_result(json!({"a": 1})))
                .unwrap(),
            TaskStatus::Success(json!({"a": 1}))
        );
        assert_eq!(
            vocab
                .interpret(StatusEnvelope::new("failure").with_result(json!("boom")))
                .unwrap(),
            TaskStatus::Failure("boom".to_string())
        );
    }

    #[test]
    fn test_vocabularies_are_not_merged() {
        let err = StatusVocabulary::Current
            .interpret(StatusEnvelope::new("completed"))
            .unwrap_err();
        assert!(matches!(err, ClientError::UnknownStatus(ref s) if s == "completed"));

        let err = StatusVocabulary::Legacy
            .interpret(StatusEnvelope::new("success"))
            .unwrap_err();
        assert!(matches!(err, ClientError::UnknownStatus(_)));

        assert!(StatusVocabulary::Legacy
            .interpret(StatusEnvelope::new("completed"))
            .unwrap()
            .is_terminal());
    }

    #[test]
    fn test_unknown_status_fails_closed() {
        let err = StatusVocabulary::Current
            .interpret(StatusEnvelope::new("unknown"))
            .unwrap_err();
        assert_eq!(err.user_message(), "Unknown task status.");
    }

    #[test]
    fn test_failure_without_detail() {
        let status = StatusVocabulary::Legacy
            .interpret(StatusEnvelope::new("failed"))
            .unwrap();
        assert_eq!(status, TaskStatus::Failure("no details from server".to_string()));
    }

    #[test]
    fn test_status_paths() {
        assert_eq!(StatusVocabulary::Current.status_path("x1"), "check_status/x1");
        assert_eq!(StatusVocabulary::Legacy.status_path("x1"), "task-status/x1");
        assert_eq!("LEGACY".parse::<StatusVocabulary>().unwrap(), StatusVocabulary::Legacy);
    }
}
