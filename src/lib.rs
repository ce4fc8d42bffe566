//! VOD Chat Analyzer - task-polling client
//!
//! Drives the two-phase workflow of the VOD chat analytics server: ingest a
//! VOD's chat, then run analytics over it and render the result.

pub mod analysis;
pub mod api;
pub mod config;
pub mod error;
pub mod polling;
pub mod render;
pub mod vod;
pub mod worker_status;
pub mod workflow;

// Re-export main types for easy access
pub use crate::analysis::{normalize_keywords, AnalysisParams, Metric};
pub use crate::api::{AnalysisResult, Backend, HttpBackend, StatusVocabulary, TaskId, TaskStatus};
pub use crate::config::{Config, ConfigBuilder};
pub use crate::error::{ClientError, Result};
pub use crate::polling::{PollPolicy, PollSlot};
pub use crate::render::{render_result, ResultView};
pub use crate::worker_status::WorkerStatusMonitor;
pub use crate::workflow::{AnalysisReport, AnalyzerClient, IngestOutcome, StatusEvent};
