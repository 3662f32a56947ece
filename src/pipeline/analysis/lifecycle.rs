//! Analysis lifecycle as an explicit state machine.
//!
//! `Idle → Submitted → AwaitingPrimary → AwaitingRepair → Succeeded | Failed`
//!
//! The orchestrator runs on a blocking worker and reports progress as
//! [`AnalysisEvent`]s over an mpsc channel; the owning [`AnalysisSession`]
//! folds them into its phase. Transitions are validated by
//! [`AnalysisPhase::apply`], a pure function.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::orchestrator::{AnalysisReport, Attempt};
use super::AnalysisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisPhase {
    Idle,
    Submitted,
    AwaitingPrimary,
    AwaitingRepair,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisEvent {
    Submitted,
    PrimaryStarted,
    RepairStarted { reason: String },
    Completed { attempt: Attempt },
    Failed { message: String },
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("Illegal transition from {from:?} on {event}")]
    IllegalTransition {
        from: AnalysisPhase,
        event: &'static str,
    },

    #[error("An analysis is already running")]
    Busy,
}

impl AnalysisEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::PrimaryStarted => "primary_started",
            Self::RepairStarted { .. } => "repair_started",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Reset => "reset",
        }
    }
}

impl AnalysisPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Phases during which a new submission must be refused.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            Self::Submitted | Self::AwaitingPrimary | Self::AwaitingRepair
        )
    }

    pub fn apply(self, event: &AnalysisEvent) -> Result<AnalysisPhase, LifecycleError> {
        use AnalysisEvent as E;
        use AnalysisPhase as P;

        let next = match (self, event) {
            (P::Idle, E::Submitted) => P::Submitted,
            (p, E::Submitted) if p.is_busy() => return Err(LifecycleError::Busy),
            (P::Submitted, E::PrimaryStarted) => P::AwaitingPrimary,
            (P::AwaitingPrimary, E::RepairStarted { .. }) => P::AwaitingRepair,
            (P::AwaitingPrimary, E::Completed { attempt: Attempt::Primary }) => P::Succeeded,
            (P::AwaitingRepair, E::Completed { attempt: Attempt::Repair }) => P::Succeeded,
            (p, E::Failed { .. }) if p.is_busy() => P::Failed,
            (P::Idle, E::Reset) => P::Idle,
            (p, E::Reset) if p.is_terminal() => P::Idle,
            (from, event) => {
                return Err(LifecycleError::IllegalTransition {
                    from,
                    event: event.name(),
                })
            }
        };
        Ok(next)
    }
}

/// Sending half handed to the orchestrator. Cheap to clone; a dropped
/// receiver silently discards events.
#[derive(Debug, Clone, Default)]
pub struct LifecycleSink {
    tx: Option<mpsc::UnboundedSender<AnalysisEvent>>,
}

impl LifecycleSink {
    /// Sink that discards everything.
    pub fn noop() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: AnalysisEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

/// Raises the cancel flag when dropped unless disarmed first.
struct CancelOnDrop {
    session_id: Uuid,
    flag: Arc<AtomicBool>,
    armed: bool,
}

impl CancelOnDrop {
    fn new(session_id: Uuid, flag: Arc<AtomicBool>) -> Self {
        Self {
            session_id,
            flag,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.flag.store(true, Ordering::Relaxed);
            tracing::info!(session_id = %self.session_id, "Analysis abandoned, cancelling job");
        }
    }
}

/// One user-facing analysis slot: at most one analysis in flight at a time.
pub struct AnalysisSession {
    id: Uuid,
    phase: AnalysisPhase,
    started_at: Option<DateTime<Utc>>,
    cancel: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<AnalysisEvent>,
    rx: mpsc::UnboundedReceiver<AnalysisEvent>,
}

impl Default for AnalysisSession {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisSession {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            id: Uuid::new_v4(),
            phase: AnalysisPhase::Idle,
            started_at: None,
            cancel: Arc::new(AtomicBool::new(false)),
            tx,
            rx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> AnalysisPhase {
        self.phase
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn sink(&self) -> LifecycleSink {
        LifecycleSink {
            tx: Some(self.tx.clone()),
        }
    }

    /// Flag the orchestrator checks before every model call.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
        tracing::info!(session_id = %self.id, "Analysis cancellation requested");
    }

    /// Accept a new document. Refused while another analysis is running.
    pub fn submit(&mut self) -> Result<(), LifecycleError> {
        self.apply(&AnalysisEvent::Submitted)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Return to `Idle` after a finished analysis, with a fresh cancel flag.
    pub fn reset(&mut self) -> Result<(), LifecycleError> {
        self.apply(&AnalysisEvent::Reset)?;
        self.cancel = Arc::new(AtomicBool::new(false));
        self.started_at = None;
        while self.rx.try_recv().is_ok() {}
        Ok(())
    }

    fn apply(&mut self, event: &AnalysisEvent) -> Result<AnalysisPhase, LifecycleError> {
        let next = self.phase.apply(event)?;
        tracing::debug!(
            session_id = %self.id,
            from = ?self.phase,
            to = ?next,
            event = event.name(),
            "Analysis phase transition"
        );
        self.phase = next;
        Ok(next)
    }

    fn record(&mut self, event: &AnalysisEvent, first_error: &mut Option<LifecycleError>) {
        if let Err(e) = self.apply(event) {
            tracing::warn!(session_id = %self.id, error = %e, "Rejected analysis event");
            first_error.get_or_insert(e);
        }
    }

    /// Fold every queued event into the phase.
    pub fn drain(&mut self) -> Result<AnalysisPhase, LifecycleError> {
        while let Ok(event) = self.rx.try_recv() {
            self.apply(&event)?;
        }
        Ok(self.phase)
    }

    /// Submit, run `job` on a blocking worker, and track its events until it ends.
    pub async fn run<F>(&mut self, job: F) -> Result<AnalysisReport, AnalysisError>
    where
        F: FnOnce(LifecycleSink, Arc<AtomicBool>) -> Result<AnalysisReport, AnalysisError>
            + Send
            + 'static,
    {
        self.submit()?;

        let sink = self.sink();
        let cancel = self.cancel_flag();
        // Dropping this future (e.g. the client went away) cancels the job.
        let guard = CancelOnDrop::new(self.id, self.cancel_flag());
        let mut handle = tokio::task::spawn_blocking(move || job(sink, cancel));

        // A bad event must not detach the job; keep the first error for after the join.
        let mut lifecycle_error: Option<LifecycleError> = None;
        let joined = loop {
            tokio::select! {
                Some(event) = self.rx.recv() => {
                    self.record(&event, &mut lifecycle_error);
                }
                joined = &mut handle => break joined,
            }
        };
        guard.disarm();
        while let Ok(event) = self.rx.try_recv() {
            self.record(&event, &mut lifecycle_error);
        }

        let result = joined.map_err(|e| AnalysisError::TaskFailed(e.to_string()))?;
        if let Some(e) = lifecycle_error {
            if !self.phase.is_terminal() {
                self.phase = AnalysisPhase::Failed;
            }
            return Err(e.into());
        }
        if !self.phase.is_terminal() {
            // The job ended without reporting; close the lifecycle ourselves.
            let event = match &result {
                Ok(report) => AnalysisEvent::Completed {
                    attempt: report.attempt,
                },
                Err(e) => AnalysisEvent::Failed {
                    message: e.to_string(),
                },
            };
            self.apply(&event)?;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk(events: &[AnalysisEvent]) -> Result<AnalysisPhase, LifecycleError> {
        events
            .iter()
            .try_fold(AnalysisPhase::Idle, |phase, event| phase.apply(event))
    }

    #[test]
    fn primary_success_path() {
        let phase = walk(&[
            AnalysisEvent::Submitted,
            AnalysisEvent::PrimaryStarted,
            AnalysisEvent::Completed {
                attempt: Attempt::Primary,
            },
        ])
        .unwrap();
        assert_eq!(phase, AnalysisPhase::Succeeded);
    }

    #[test]
    fn repair_path_then_failure() {
        let phase = walk(&[
            AnalysisEvent::Submitted,
            AnalysisEvent::PrimaryStarted,
            AnalysisEvent::RepairStarted {
                reason: "no braces".into(),
            },
            AnalysisEvent::Failed {
                message: "still no braces".into(),
            },
        ])
        .unwrap();
        assert_eq!(phase, AnalysisPhase::Failed);
    }

    #[test]
    fn completed_from_idle_is_illegal() {
        let err = AnalysisPhase::Idle
            .apply(&AnalysisEvent::Completed {
                attempt: Attempt::Primary,
            })
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::IllegalTransition {
                from: AnalysisPhase::Idle,
                event: "completed"
            }
        ));
    }

    #[test]
    fn completion_must_match_attempt() {
        let result = AnalysisPhase::AwaitingPrimary.apply(&AnalysisEvent::Completed {
            attempt: Attempt::Repair,
        });
        assert!(result.is_err());
    }

    #[test]
    fn second_submission_while_running_is_busy() {
        for phase in [
            AnalysisPhase::Submitted,
            AnalysisPhase::AwaitingPrimary,
            AnalysisPhase::AwaitingRepair,
        ] {
            assert_eq!(
                phase.apply(&AnalysisEvent::Submitted),
                Err(LifecycleError::Busy)
            );
        }
    }

    #[test]
    fn reset_only_from_idle_or_terminal() {
        assert_eq!(
            AnalysisPhase::Succeeded.apply(&AnalysisEvent::Reset),
            Ok(AnalysisPhase::Idle)
        );
        assert_eq!(
            AnalysisPhase::Failed.apply(&AnalysisEvent::Reset),
            Ok(AnalysisPhase::Idle)
        );
        assert!(AnalysisPhase::AwaitingRepair
            .apply(&AnalysisEvent::Reset)
            .is_err());
    }

    #[test]
    fn terminal_phase_requires_reset_before_resubmit() {
        assert!(AnalysisPhase::Succeeded
            .apply(&AnalysisEvent::Submitted)
            .is_err());
    }

    #[test]
    fn session_drains_sink_events() {
        let mut session = AnalysisSession::new();
        session.submit().unwrap();
        let sink = session.sink();
        sink.emit(AnalysisEvent::PrimaryStarted);
        sink.emit(AnalysisEvent::Failed {
            message: "transport".into(),
        });
        assert_eq!(session.drain().unwrap(), AnalysisPhase::Failed);
        assert!(session.started_at().is_some());

        session.reset().unwrap();
        assert_eq!(session.phase(), AnalysisPhase::Idle);
        assert!(session.started_at().is_none());
    }

    #[test]
    fn cancel_flag_is_shared_and_reset() {
        let mut session = AnalysisSession::new();
        let flag = session.cancel_flag();
        session.cancel();
        assert!(flag.load(Ordering::Relaxed));

        session.submit().unwrap();
        session.sink().emit(AnalysisEvent::Failed {
            message: "cancelled".into(),
        });
        session.drain().unwrap();
        session.reset().unwrap();
        assert!(!session.cancel_flag().load(Ordering::Relaxed));
    }

    #[test]
    fn noop_sink_discards() {
        LifecycleSink::noop().emit(AnalysisEvent::PrimaryStarted);
    }

    #[tokio::test]
    async fn run_closes_lifecycle_for_silent_jobs() {
        let mut session = AnalysisSession::new();
        let result = session
            .run(|_sink, _cancel| Err(AnalysisError::Cancelled))
            .await;
        assert!(matches!(result, Err(AnalysisError::Cancelled)));
        assert_eq!(session.phase(), AnalysisPhase::Failed);
    }

    #[tokio::test]
    async fn illegal_event_waits_for_job_then_fails() {
        let finished = Arc::new(AtomicBool::new(false));
        let job_finished = Arc::clone(&finished);
        let mut session = AnalysisSession::new();

        let result = session
            .run(move |sink, _cancel| {
                sink.emit(AnalysisEvent::Reset);
                std::thread::sleep(std::time::Duration::from_millis(50));
                job_finished.store(true, Ordering::SeqCst);
                Err(AnalysisError::Cancelled)
            })
            .await;

        assert!(matches!(
            result,
            Err(AnalysisError::Lifecycle(LifecycleError::IllegalTransition {
                from: AnalysisPhase::Submitted,
                event: "reset"
            }))
        ));
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(session.phase(), AnalysisPhase::Failed);
    }

    #[tokio::test]
    async fn dropped_run_raises_cancel_flag() {
        let mut session = AnalysisSession::new();
        let flag = session.cancel_flag();
        let (started_tx, started_rx) = std::sync::mpsc::channel();

        let run = session.run(move |_sink, cancel| {
            let _ = started_tx.send(());
            while !cancel.load(Ordering::Relaxed) {
                std::thread::sleep(std::time::Duration::from_millis(5));
            }
            Err(AnalysisError::Cancelled)
        });
        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(50), run).await;
        assert!(timed_out.is_err());

        assert!(started_rx.recv_timeout(std::time::Duration::from_secs(1)).is_ok());
        assert!(flag.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn finished_run_leaves_cancel_flag_clear() {
        let mut session = AnalysisSession::new();
        let _ = session
            .run(|_sink, _cancel| Err(AnalysisError::Cancelled))
            .await;
        assert!(!session.cancel_flag().load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn run_rejects_when_busy() {
        let mut session = AnalysisSession::new();
        session.submit().unwrap();
        let result = session
            .run(|_sink, _cancel| Err(AnalysisError::Cancelled))
            .await;
        assert!(matches!(
            result,
            Err(AnalysisError::Lifecycle(LifecycleError::Busy))
        ));
    }
}
