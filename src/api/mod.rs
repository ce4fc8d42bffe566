//! Backend contract for the VOD chat analytics server
//!
//! [`Backend`] is the seam between the workflow and the wire: `HttpBackend`
//! talks to a live server, tests substitute scripted implementations.

use async_trait::async_trait;

use crate::analysis::AnalysisForm;
use crate::error::Result;
use crate::vod::VodSubmission;

pub mod http;
pub mod models;
pub mod status;

pub use http::HttpBackend;
pub use models::{
    AnalysisResult, RunAnalysisResponse, StatusEnvelope, SubmitVodResponse, TaskId, WorkerStatus,
};
pub use status::{StatusVocabulary, TaskStatus};

/// Calls the client makes against the backend
#[async_trait]
pub trait Backend: Send + Sync {
    /// Queue ingestion for a VOD. No `task_id` in the reply means the data is
    /// already loaded.
    async fn submit_vod(&self, vod: &VodSubmission) -> Result<SubmitVodResponse>;

    /// One status query for a task
    async fn check_status(&self, task_id: &TaskId) -> Result<StatusEnvelope>;

    async fn run_analysis(&self, form: &AnalysisForm) -> Result<RunAnalysisResponse>;

    async fn worker_status(&self) -> Result<WorkerStatus>;

    /// Vocabulary used to read `check_status` envelopes
    fn vocabulary(&self) -> StatusVocabulary;
}
