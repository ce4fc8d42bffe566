//! Cancellable polling loop and per-action poll sessions
//!
//! A [`PollSlot`] stands for one logical action (ingesting a VOD, running an
//! analysis). It hands out at most one live [`PollSession`] at a time:
//! beginning a new session cancels the previous one before anything else
//! happens, so a stale task id is never polled alongside a fresh one.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

use crate::api::models::TaskId;
use crate::error::{ClientError, Result};

/// How often to poll and when to give up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    interval: Duration,
    max_attempts: Option<u32>,
}

impl PollPolicy {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

/// Outcome of a single probe
#[derive(Debug, Clone, PartialEq)]
pub enum Step<T> {
    Continue,
    Done(T),
}

/// Value produced by a finished poll, with the number of probes it took
#[derive(Debug, Clone, PartialEq)]
pub struct Polled<T> {
    pub value: T,
    pub attempts: u32,
}

/// Cancellation side of a poll session
#[derive(Debug)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
    // Set only for tokens nobody else can cancel.
    _sender: Option<watch::Sender<bool>>,
}

impl CancelToken {
    /// A token that is never cancelled
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _sender: Some(tx),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once the session is cancelled or its slot is dropped.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Run `probe` until it reports `Done`, fails, exhausts `max_attempts`, or
/// `cancel` fires. The first probe runs immediately; later ones run one
/// `interval` after the previous probe finished. Probe errors end the loop.
pub async fn poll_until<T, F, Fut>(
    task_id: &TaskId,
    policy: PollPolicy,
    cancel: &mut CancelToken,
    mut probe: F,
) -> Result<Polled<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Step<T>>>,
{
    let mut attempts = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled(task_id.clone()));
        }

        attempts += 1;
        let step = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Cancelled(task_id.clone())),
            step = probe(attempts) => step?,
        };

        match step {
            Step::Done(value) => return Ok(Polled { value, attempts }),
            Step::Continue => {
                debug!(task_id = %task_id, attempts, "Task still pending");
            }
        }

        if let Some(max) = policy.max_attempts {
            if attempts >= max {
                return Err(ClientError::PollTimeout {
                    task_id: task_id.clone(),
                    attempts,
                });
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Cancelled(task_id.clone())),
            _ = tokio::time::sleep(policy.interval) => {}
        }
    }
}

/// One polling lifecycle for one task id
#[derive(Debug)]
pub struct PollSession {
    task_id: TaskId,
    generation: u64,
    cancel: CancelToken,
}

impl PollSession {
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cancel_token(&mut self) -> &mut CancelToken {
        &mut self.cancel
    }
}

/// Holder of the single active session for a logical action
#[derive(Debug, Default)]
pub struct PollSlot {
    generation: u64,
    active: Option<(TaskId, watch::Sender<bool>)>,
}

impl PollSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel whatever is running and start a session for `task_id`.
    pub fn begin(&mut self, task_id: TaskId) -> PollSession {
        self.cancel();
        self.generation += 1;

        let (tx, rx) = watch::channel(false);
        self.active = Some((task_id.clone(), tx));
        debug!(task_id = %task_id, generation = self.generation, "Poll session started");

        PollSession {
            task_id,
            generation: self.generation,
            cancel: CancelToken { rx, _sender: None },
        }
    }

    /// Like [`begin`](Self::begin), but only if nothing touched the slot since
    /// `expected_generation` was read. Returns `None` when the caller has been
    /// superseded in the meantime.
    pub fn begin_if_current(
        &mut self,
        expected_generation: u64,
        task_id: TaskId,
    ) -> Option<PollSession> {
        if self.generation != expected_generation {
            return None;
        }
        Some(self.begin(task_id))
    }

    /// Cancel the running session, if any, and invalidate its generation.
    pub fn cancel(&mut self) {
        if let Some((task_id, tx)) = self.active.take() {
            let _ = tx.send(true);
            debug!(task_id = %task_id, "Poll session cancelled");
        }
        self.generation += 1;
    }

    /// Release a session that reached a terminal state. A session that was
    /// already superseded leaves the slot alone.
    pub fn finish(&mut self, session: &PollSession) -> bool {
        if self.is_current(session) {
            self.active = None;
            true
        } else {
            false
        }
    }

    pub fn is_current(&self, session: &PollSession) -> bool {
        self.generation == session.generation && self.active.is_some()
    }

    pub fn current_generation(&self) -> u64 {
        self.generation
    }

    pub fn active_task(&self) -> Option<&TaskId> {
        self.active.as_ref().map(|(id, _)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn policy(ms: u64) -> PollPolicy {
        PollPolicy::new(Duration::from_millis(ms))
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_done_at_interval() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();
        let counter = calls.clone();

        let polled = poll_until(
            &TaskId::from("t1"),
            policy(1000),
            &mut CancelToken::never(),
            move |attempt| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    Ok(if attempt < 3 { Step::Continue } else { Step::Done("ok") })
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(polled.value, "ok");
        assert_eq!(polled.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_error_stops_without_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let err = poll_until::<(), _, _>(
            &TaskId::from("t2"),
            policy(10),
            &mut CancelToken::never(),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(ClientError::UnknownStatus("weird".to_string())) }
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ClientError::UnknownStatus(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_attempts_guard() {
        let err = poll_until::<(), _, _>(
            &TaskId::from("t3"),
            policy(10).with_max_attempts(Some(4)),
            &mut CancelToken::never(),
            |_| async { Ok(Step::Continue) },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ClientError::PollTimeout { attempts: 4, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_session_cancels_previous() {
        let mut slot = PollSlot::new();
        let mut first = slot.begin(TaskId::from("a"));

        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let handle = tokio::spawn(async move {
            poll_until::<(), _, _>(
                &TaskId::from("a"),
                policy(1000),
                first.cancel_token(),
                move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Ok(Step::Continue) }
                },
            )
            .await
        });

        tokio::time::sleep(Duration::from_millis(1500)).await;
        let second = slot.begin(TaskId::from("b"));
        let err = handle.await.unwrap().unwrap_err();

        assert!(matches!(err, ClientError::Cancelled(ref id) if id.as_str() == "a"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(slot.active_task(), Some(&TaskId::from("b")));
        assert!(slot.is_current(&second));
    }

    #[test]
    fn test_finish_ignores_superseded_session() {
        let mut slot = PollSlot::new();
        let old = slot.begin(TaskId::from("a"));
        let new = slot.begin(TaskId::from("b"));

        assert!(!slot.finish(&old));
        assert_eq!(slot.active_task(), Some(&TaskId::from("b")));
        assert!(slot.finish(&new));
        assert!(slot.active_task().is_none());
    }

    #[test]
    fn test_begin_if_current_detects_supersession() {
        let mut slot = PollSlot::new();
        let seen = slot.current_generation();
        slot.cancel();
        assert!(slot.begin_if_current(seen, TaskId::from("late")).is_none());

        let seen = slot.current_generation();
        assert!(slot.begin_if_current(seen, TaskId::from("fresh")).is_some());
    }

    #[test]
    fn test_cancel_trips_token() {
        let mut slot = PollSlot::new();
        let session = slot.begin(TaskId::from("a"));
        assert!(!session.cancel.is_cancelled());
        slot.cancel();
        assert!(session.cancel.is_cancelled());
        assert!(!slot.is_current(&session));
    }
}
