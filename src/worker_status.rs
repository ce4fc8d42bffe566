//! Background worker-status display
//!
//! Purely informational: failures are logged and otherwise ignored.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::api::{Backend, WorkerStatus};

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Periodic poll of `/worker_status`
pub struct WorkerStatusMonitor {
    handle: JoinHandle<()>,
    latest: watch::Receiver<Option<WorkerStatus>>,
}

impl WorkerStatusMonitor {
    /// Start polling now and then every `interval` (at least 1ms).
    pub fn spawn(backend: Arc<dyn Backend>, interval: Duration) -> Self {
        let (tx, latest) = watch::channel(None);
        let interval = interval.max(MIN_INTERVAL);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match backend.worker_status().await {
                    Ok(status) => {
                        debug!("👷 Workers busy: {}", status);
                        if tx.send(Some(status)).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Failed to fetch worker status: {}", e),
                }
            }
        });

        Self { handle, latest }
    }

    /// Last status received, if any
    pub fn latest(&self) -> Option<WorkerStatus> {
        self.latest.borrow().clone()
    }

    /// Receiver that sees every update
    pub fn subscribe(&self) -> watch::Receiver<Option<WorkerStatus>> {
        self.latest.clone()
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for WorkerStatusMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisForm;
    use crate::api::{
        RunAnalysisResponse, StatusEnvelope, StatusVocabulary, SubmitVodResponse, TaskId,
    };
    use crate::error::{ClientError, Result};
    use crate::vod::VodSubmission;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Answers only `/worker_status`, counting calls
    struct CountingBackend {
        calls: AtomicU32,
        fail: bool,
    }

    impl CountingBackend {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl Backend for CountingBackend {
        async fn submit_vod(&self, _vod: &VodSubmission) -> Result<SubmitVodResponse> {
            unreachable!()
        }

        async fn check_status(&self, _task_id: &TaskId) -> Result<StatusEnvelope> {
            unreachable!()
        }

        async fn run_analysis(&self, _form: &AnalysisForm) -> Result<RunAnalysisResponse> {
            unreachable!()
        }

        async fn worker_status(&self) -> Result<WorkerStatus> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as u64 + 1;
            if self.fail {
                return Err(ClientError::Server {
                    status: 429,
                    message: "rate limited".to_string(),
                });
            }
            Ok(WorkerStatus {
                active_tasks: Some(n),
                max_workers: Some(4),
            })
        }

        fn vocabulary(&self) -> StatusVocabulary {
            StatusVocabulary::Current
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_immediately_then_every_interval() {
        let backend = CountingBackend::new(false);
        let monitor = WorkerStatusMonitor::spawn(backend.clone(), Duration::from_secs(5));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.latest().map(|s| s.to_string()), Some("1/4".to_string()));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);

        monitor.stop();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_still_polls() {
        let backend = CountingBackend::new(false);
        let monitor = WorkerStatusMonitor::spawn(backend.clone(), Duration::ZERO);

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(backend.calls.load(Ordering::SeqCst) >= 2);
        assert!(monitor.latest().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_keep_polling_without_publishing() {
        let backend = CountingBackend::new(true);
        let monitor = WorkerStatusMonitor::spawn(backend.clone(), Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
        assert!(monitor.latest().is_none());
    }
}
