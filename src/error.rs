//! Error types for the task-polling client

use crate::api::models::TaskId;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Error types for client operations
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("VOD URL must not be empty")]
    EmptyVodUrl,

    #[error("Cannot extract a video id from: {0}")]
    InvalidVodUrl(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Malformed analysis result: {0}")]
    InvalidResult(#[source] serde_json::Error),

    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Task {task_id} failed: {detail}")]
    TaskFailed { task_id: TaskId, detail: String },

    #[error("Unknown task status: {0:?}")]
    UnknownStatus(String),

    #[error("Task {task_id} still pending after {attempts} attempts")]
    PollTimeout { task_id: TaskId, attempts: u32 },

    #[error("Polling for task {0} was cancelled")]
    Cancelled(TaskId),

    #[error("Request was replaced by a newer one")]
    Superseded,

    #[error("Analysis was not started: {0}")]
    AnalysisRejected(String),

    #[error("An analysis is already running")]
    AnalysisInFlight,

    #[error("No VOD data loaded yet")]
    NotReady,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ClientError {
    /// One-line text for the status area.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::EmptyVodUrl => "Enter a VOD URL first.".to_string(),
            ClientError::InvalidVodUrl(url) => format!("Not a VOD URL: {}", url),
            ClientError::Http(_) | ClientError::Json(_) => {
                "Could not reach the server. Try again.".to_string()
            }
            ClientError::Url(e) => format!("Invalid server URL: {}", e),
            ClientError::InvalidResult(_) => {
                "The server returned an analysis result that could not be read.".to_string()
            }
            ClientError::Server { message, .. } => message.clone(),
            ClientError::TaskFailed { detail, .. } => format!("Task failed: {}", detail),
            ClientError::UnknownStatus(_) => "Unknown task status.".to_string(),
            ClientError::PollTimeout { attempts, .. } => {
                format!("Gave up waiting after {} status checks.", attempts)
            }
            ClientError::Cancelled(_) | ClientError::Superseded => {
                "Replaced by a newer request.".to_string()
            }
            ClientError::AnalysisRejected(message) => message.clone(),
            ClientError::AnalysisInFlight => "Analysis is already running.".to_string(),
            ClientError::NotReady => "Load a VOD before running analytics.".to_string(),
            ClientError::Configuration(message) => message.clone(),
        }
    }

    /// Errors caused by a newer request taking over, not by a failure
    pub fn is_superseded(&self) -> bool {
        matches!(self, ClientError::Cancelled(_) | ClientError::Superseded)
    }

    /// Errors that mean the request never reached a usable response.
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Http(_) | ClientError::Json(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_message_is_shown_verbatim() {
        let err = ClientError::Server {
            status: 400,
            message: "invalid stream id".to_string(),
        };
        assert_eq!(err.user_message(), "invalid stream id");
        assert!(!err.is_transport());
    }

    #[test]
    fn test_task_failure_carries_detail() {
        let err = ClientError::TaskFailed {
            task_id: TaskId::from("abc"),
            detail: "chat download failed".to_string(),
        };
        assert_eq!(err.user_message(), "Task failed: chat download failed");
        assert_eq!(err.to_string(), "Task abc failed: chat download failed");
    }

    #[test]
    fn test_bad_base_url_message() {
        let err = ClientError::from(url::Url::parse("not a url").unwrap_err());
        assert_eq!(
            err.user_message(),
            "Invalid server URL: relative URL without a base"
        );
        assert!(!err.is_transport());
    }

    #[test]
    fn test_undecodable_result_is_not_a_transport_error() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = ClientError::InvalidResult(source);
        assert!(!err.is_transport());
        assert_eq!(
            err.user_message(),
            "The server returned an analysis result that could not be read."
        );
    }
}
