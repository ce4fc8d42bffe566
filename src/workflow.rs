//! Two-phase analytics workflow
//!
//! [`AnalyzerClient`] drives ingestion (submit VOD, poll) and then analytics
//! (submit form, poll, decode). Each phase owns a [`PollSlot`], so starting a
//! phase again always cancels the poll it replaces. Progress goes to an
//! optional [`StatusEvent`] channel; outcomes come back as typed results.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::analysis::AnalysisParams;
use crate::api::{AnalysisResult, Backend, HttpBackend, TaskId, TaskStatus};
use crate::config::Config;
use crate::error::{ClientError, Result};
use crate::polling::{poll_until, PollPolicy, PollSession, PollSlot, Polled, Step};
use crate::render::{render_result, ResultView};
use crate::vod::VodSubmission;

/// Progress messages for the status area
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    LoadingVod { url: String },
    IngestQueued { task_id: TaskId },
    IngestPending { task_id: TaskId, attempt: u32 },
    DataReady,
    ServerMessage(String),
    AnalysisStarting,
    AnalysisPending { task_id: TaskId, attempt: u32 },
    AnalysisComplete { task_id: TaskId },
    TaskPending { task_id: TaskId, attempt: u32 },
    /// The one error line for a failed operation
    Failed { message: String },
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusEvent::LoadingVod { url } => write!(f, "Loading data for {}...", url),
            StatusEvent::IngestQueued { .. } | StatusEvent::IngestPending { .. } => {
                write!(f, "Data is loading, please wait...")
            }
            StatusEvent::DataReady => write!(f, "Data loaded. Analytics can be started."),
            StatusEvent::ServerMessage(message) => write!(f, "{}", message),
            StatusEvent::AnalysisStarting => write!(f, "Starting analytics..."),
            StatusEvent::AnalysisPending { .. } => write!(f, "Analytics running, please wait..."),
            StatusEvent::AnalysisComplete { .. } => write!(f, "Analytics complete."),
            StatusEvent::TaskPending { task_id, attempt } => {
                write!(f, "Task {} pending (check {})", task_id, attempt)
            }
            StatusEvent::Failed { message } => write!(f, "{}", message),
        }
    }
}

/// How ingestion ended
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// The server ran an ingestion task to completion
    Loaded { task_id: TaskId, attempts: u32 },
    /// The server already had the data
    AlreadyAvailable { message: Option<String> },
}

/// Finished analytics run
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub task_id: TaskId,
    pub attempts: u32,
    pub completed_at: DateTime<Utc>,
    pub result: AnalysisResult,
}

impl AnalysisReport {
    pub fn view(&self) -> ResultView {
        render_result(&self.result)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Ingest,
    Analysis,
    Lookup,
}

impl Stage {
    fn pending_event(self, task_id: &TaskId, attempt: u32) -> StatusEvent {
        let task_id = task_id.clone();
        match self {
            Stage::Ingest => StatusEvent::IngestPending { task_id, attempt },
            Stage::Analysis => StatusEvent::AnalysisPending { task_id, attempt },
            Stage::Lookup => StatusEvent::TaskPending { task_id, attempt },
        }
    }
}

/// Holds the analytics submit control for one submit-and-poll cycle
struct SubmitGuard<'a>(&'a AtomicBool);

impl<'a> SubmitGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Client for the VOD chat analytics workflow
pub struct AnalyzerClient {
    backend: Arc<dyn Backend>,
    policy: PollPolicy,
    ingest: Mutex<PollSlot>,
    analysis: Mutex<PollSlot>,
    lookup: Mutex<PollSlot>,
    /// Ingest generation whose data is loaded; `None` while analytics is off
    ready: Mutex<Option<u64>>,
    analysis_running: AtomicBool,
    events: Option<mpsc::UnboundedSender<StatusEvent>>,
}

impl AnalyzerClient {
    pub fn new(backend: Arc<dyn Backend>, policy: PollPolicy) -> Self {
        Self {
            backend,
            policy,
            ingest: Mutex::new(PollSlot::new()),
            analysis: Mutex::new(PollSlot::new()),
            lookup: Mutex::new(PollSlot::new()),
            ready: Mutex::new(None),
            analysis_running: AtomicBool::new(false),
            events: None,
        }
    }

    /// Build an HTTP-backed client from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let backend = HttpBackend::new(&config.server, config.contract.vocabulary)?;
        info!("🔗 Using backend at {}", backend.base_url());
        Ok(Self::new(Arc::new(backend), config.polling.policy()))
    }

    /// Send progress to `events`
    pub fn with_events(mut self, events: mpsc::UnboundedSender<StatusEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn backend(&self) -> Arc<dyn Backend> {
        self.backend.clone()
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Whether ingested data is available for analytics
    pub fn analysis_enabled(&self) -> bool {
        lock(&self.ready).is_some()
    }

    /// Whether the analytics submit control is currently held
    pub fn analysis_in_flight(&self) -> bool {
        self.analysis_running.load(Ordering::Acquire)
    }

    /// Submit a VOD and wait until its data is ingested.
    ///
    /// Any previous ingestion or analytics poll is cancelled first and the
    /// analytics phase stays disabled until this call succeeds.
    pub async fn submit_vod(&self, url: &str) -> Result<IngestOutcome> {
        let outcome = self.run_ingest(url).await;
        match &outcome {
            Ok(IngestOutcome::Loaded { task_id, attempts }) => {
                info!(task_id = %task_id, attempts, "✅ VOD data loaded");
            }
            Ok(IngestOutcome::AlreadyAvailable { .. }) => info!("✅ VOD data already available"),
            Err(e) => self.report(e),
        }
        outcome
    }

    async fn run_ingest(&self, url: &str) -> Result<IngestOutcome> {
        let vod = VodSubmission::new(url)?;

        let generation = self.reset_for_new_vod();
        self.emit(StatusEvent::LoadingVod {
            url: vod.url().to_string(),
        });

        let response = self.backend.submit_vod(&vod).await?;

        let Some(task_id) = response.task_id else {
            if let Some(message) = &response.message {
                self.emit(StatusEvent::ServerMessage(message.clone()));
            }
            if !self.mark_ready_if_current(generation) {
                return Err(ClientError::Superseded);
            }
            self.emit(StatusEvent::DataReady);
            return Ok(IngestOutcome::AlreadyAvailable {
                message: response.message,
            });
        };

        let session = lock(&self.ingest)
            .begin_if_current(generation, task_id.clone())
            .ok_or(ClientError::Superseded)?;
        self.emit(StatusEvent::IngestQueued {
            task_id: task_id.clone(),
        });
        info!(task_id = %task_id, "⏳ Ingestion queued");

        let session_generation = session.generation();
        let (polled, current) = self.poll_session(&self.ingest, session, Stage::Ingest).await;
        let polled = polled?;
        if !current || !self.mark_ready_if_current(session_generation) {
            return Err(ClientError::Superseded);
        }

        self.emit(StatusEvent::DataReady);
        Ok(IngestOutcome::Loaded {
            task_id,
            attempts: polled.attempts,
        })
    }

    /// Poll one task id until it reaches a terminal status.
    pub async fn poll_status(&self, task_id: &TaskId) -> Result<Polled<Value>> {
        let session = lock(&self.lookup).begin(task_id.clone());
        let (polled, _) = self.poll_session(&self.lookup, session, Stage::Lookup).await;
        if let Err(e) = &polled {
            self.report(e);
        }
        polled
    }

    /// Submit the analytics form and wait for the result.
    ///
    /// The submit control is held for the whole cycle; a second call while it
    /// is held fails with [`ClientError::AnalysisInFlight`].
    pub async fn submit_analysis(&self, params: AnalysisParams) -> Result<AnalysisReport> {
        let outcome = match SubmitGuard::acquire(&self.analysis_running) {
            Some(_guard) => self.run_analysis(params).await,
            None => Err(ClientError::AnalysisInFlight),
        };
        match &outcome {
            Ok(report) => info!(
                task_id = %report.task_id,
                attempts = report.attempts,
                "📊 Analytics complete"
            ),
            Err(e) => self.report(e),
        }
        outcome
    }

    async fn run_analysis(&self, params: AnalysisParams) -> Result<AnalysisReport> {
        let ready_generation = (*lock(&self.ready)).ok_or(ClientError::NotReady)?;

        self.emit(StatusEvent::AnalysisStarting);
        let generation = lock(&self.analysis).current_generation();
        let form = params.into_form();
        let response = self.backend.run_analysis(&form).await?;

        if response.status != "success" {
            return Err(ClientError::AnalysisRejected(
                response
                    .message
                    .unwrap_or_else(|| "Could not start the analysis.".to_string()),
            ));
        }
        let task_id = response.task_id.ok_or_else(|| {
            ClientError::AnalysisRejected("The server did not return a task id.".to_string())
        })?;

        let session = lock(&self.analysis)
            .begin_if_current(generation, task_id.clone())
            .ok_or(ClientError::Superseded)?;
        info!(task_id = %task_id, keywords = ?form.keywords, "⏳ Analytics queued");

        let (polled, current) = self
            .poll_session(&self.analysis, session, Stage::Analysis)
            .await;
        let polled = polled?;
        if !current || *lock(&self.ready) != Some(ready_generation) {
            return Err(ClientError::Superseded);
        }

        let result = AnalysisResult::from_task_payload(&polled.value)?;
        self.emit(StatusEvent::AnalysisComplete {
            task_id: task_id.clone(),
        });

        Ok(AnalysisReport {
            task_id,
            attempts: polled.attempts,
            completed_at: Utc::now(),
            result,
        })
    }

    /// Run a session to a terminal state, then release it from its slot.
    /// The flag tells whether the session was still current at the end.
    async fn poll_session(
        &self,
        slot: &Mutex<PollSlot>,
        mut session: PollSession,
        stage: Stage,
    ) -> (Result<Polled<Value>>, bool) {
        let task_id = session.task_id().clone();
        let probe_id = &task_id;
        let polled = poll_until(&task_id, self.policy, session.cancel_token(), move |attempt| {
            self.probe(probe_id, attempt, stage)
        })
        .await;

        let current = lock(slot).finish(&session);
        debug!(task_id = %task_id, current, "Poll session finished");
        (polled, current)
    }

    async fn probe(&self, task_id: &TaskId, attempt: u32, stage: Stage) -> Result<Step<Value>> {
        let envelope = self.backend.check_status(task_id).await?;
        match self.backend.vocabulary().interpret(envelope)? {
            TaskStatus::Pending => {
                self.emit(stage.pending_event(task_id, attempt));
                Ok(Step::Continue)
            }
            TaskStatus::Success(result) => Ok(Step::Done(result)),
            TaskStatus::Failure(detail) => Err(ClientError::TaskFailed {
                task_id: task_id.clone(),
                detail,
            }),
        }
    }

    /// Disable analytics and cancel both phases' polls. Returns the ingest
    /// generation the new submission owns.
    fn reset_for_new_vod(&self) -> u64 {
        let mut ingest = lock(&self.ingest);
        ingest.cancel();
        lock(&self.analysis).cancel();
        *lock(&self.ready) = None;
        ingest.current_generation()
    }

    fn mark_ready_if_current(&self, generation: u64) -> bool {
        let ingest = lock(&self.ingest);
        if ingest.current_generation() != generation {
            return false;
        }
        *lock(&self.ready) = Some(generation);
        true
    }

    fn report(&self, error: &ClientError) {
        if error.is_superseded() {
            debug!("Request superseded: {}", error);
            return;
        }
        if matches!(error, ClientError::AnalysisInFlight) {
            debug!("Ignoring duplicate analytics submission");
            return;
        }
        warn!("❌ {}", error);
        self.emit(StatusEvent::Failed {
            message: error.user_message(),
        });
    }

    fn emit(&self, event: StatusEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}
