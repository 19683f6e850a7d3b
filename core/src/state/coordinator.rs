//! Script run coordinator
//!
//! Owns the session's [`RunState`], issues run requests against a
//! [`ScriptBackend`] and folds the run feed into that state.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use tokio::sync::broadcast;

use super::format::format_error_block;
use super::types::{OutputSource, RunState, RunUpdate, StatusKind, StatusMessage};
use crate::backend::{EventSink, ScriptBackend};
use crate::error::RunError;
use crate::events::RunEvent;
use crate::script::{ErrorDetail, ErrorType, RunResult, ScriptError};

pub const START_MESSAGE: &str = "Starting script execution...";
pub const SUCCESS_MESSAGE: &str = "Script executed successfully";
const NO_OUTPUT_MESSAGE: &str = "No output from script";
const DEFAULT_FAILURE: &str = "Script execution failed";
const INTERRUPTED_MESSAGE: &str = "Script execution interrupted";

#[derive(Clone)]
pub struct ScriptRunCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    backend: Arc<dyn ScriptBackend>,
    state: RwLock<RunState>,
    in_flight: AtomicBool,
    update_tx: broadcast::Sender<RunUpdate>,
}

impl CoordinatorInner {
    fn write(&self) -> RwLockWriteGuard<'_, RunState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, update: RunUpdate) {
        let _ = self.update_tx.send(update);
    }
}

/// Per-run bookkeeping that never reaches the display layer.
struct RunTracker {
    run_id: String,
    script_id: String,
    script_content: String,
    stdout: String,
    stderr: String,
    streamed_output: bool,
    terminal_seen: bool,
    partial: Option<ErrorDetail>,
}

impl RunTracker {
    fn new(run_id: String, script_id: &str, script_content: &str) -> Self {
        Self {
            run_id,
            script_id: script_id.to_string(),
            script_content: script_content.to_string(),
            stdout: String::new(),
            stderr: String::new(),
            streamed_output: false,
            terminal_seen: false,
            partial: None,
        }
    }

    /// Merges partial and terminal error fields; terminal fields win when present.
    fn build_error(&self, terminal: Option<&ErrorDetail>, result: Option<&RunResult>) -> ScriptError {
        let empty = ErrorDetail::default();
        let t = terminal.unwrap_or(&empty);
        let p = self.partial.as_ref().unwrap_or(&empty);

        let message = t
            .message
            .clone()
            .or_else(|| p.message.clone())
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FAILURE.to_string());

        let stdout = result
            .and_then(|r| r.stdout.clone())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.stdout.clone());

        let script_content = result
            .and_then(|r| r.script_content.clone())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.script_content.clone());

        ScriptError {
            error: message,
            error_type: t
                .error_type
                .or(p.error_type)
                .unwrap_or(ErrorType::ExecutionError),
            stdout,
            stderr: t
                .stderr
                .clone()
                .or_else(|| p.stderr.clone())
                .unwrap_or_else(|| self.stderr.clone()),
            traceback: t.traceback.clone().or_else(|| p.traceback.clone()),
            returncode: t.returncode.or(p.returncode),
            suggestions: first_non_empty(&t.suggestions, &p.suggestions),
            possible_causes: first_non_empty(&t.possible_causes, &p.possible_causes),
            script_content,
            script_id: Some(self.script_id.clone()),
            details: t.details.clone().or_else(|| p.details.clone()),
            page_history: result.and_then(|r| r.page_history.clone()),
        }
    }

    fn merge_partial(&mut self, detail: ErrorDetail) {
        let merged = match self.partial.take() {
            None => detail,
            Some(prev) => ErrorDetail {
                message: detail.message.or(prev.message),
                error_type: detail.error_type.or(prev.error_type),
                stderr: detail.stderr.or(prev.stderr),
                traceback: detail.traceback.or(prev.traceback),
                returncode: detail.returncode.or(prev.returncode),
                suggestions: first_non_empty(&detail.suggestions, &prev.suggestions),
                possible_causes: first_non_empty(&detail.possible_causes, &prev.possible_causes),
                details: detail.details.or(prev.details),
            },
        };
        self.partial = Some(merged);
    }
}

fn first_non_empty(primary: &[String], fallback: &[String]) -> Vec<String> {
    if primary.is_empty() {
        fallback.to_vec()
    } else {
        primary.to_vec()
    }
}

/// Resets the running flag on every exit path, including unwinding.
struct RunGuard<'a> {
    inner: &'a CoordinatorInner,
    run_id: String,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let success = {
            let mut state = self.inner.write();
            state.is_running = false;
            state.finished_at = Some(Utc::now());

            // No terminal outcome was recorded (cancelled or panicked).
            if matches!(state.status.as_ref().map(|s| s.kind), Some(StatusKind::Info) | None)
                && state.error.is_none()
            {
                state.error = Some(ScriptError {
                    error: INTERRUPTED_MESSAGE.to_string(),
                    error_type: ErrorType::UnknownError,
                    script_id: state.script_id.clone(),
                    ..ScriptError::default()
                });
                state.status = Some(StatusMessage::error(format!(
                    "Script execution failed: {INTERRUPTED_MESSAGE}"
                )));
            }
            state.error.is_none()
        };
        self.inner.in_flight.store(false, Ordering::Release);
        tracing::debug!(target: "rpa.run", stage = "run.finished", run_id = %self.run_id, success);
        self.inner.emit(RunUpdate::Finished {
            run_id: std::mem::take(&mut self.run_id),
            success,
        });
    }
}

impl ScriptRunCoordinator {
    pub fn new(backend: Arc<dyn ScriptBackend>) -> Self {
        let (update_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(CoordinatorInner {
                backend,
                state: RwLock::new(RunState::default()),
                in_flight: AtomicBool::new(false),
                update_tx,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunUpdate> {
        self.inner.update_tx.subscribe()
    }

    pub fn snapshot(&self) -> RunState {
        self.inner
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_running(&self) -> bool {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Resets output and error. Status and the running flag are untouched.
    pub fn clear(&self) {
        self.inner.write().clear();
        self.inner.emit(RunUpdate::Cleared);
    }

    /// Drops the current error after a replacement script was obtained.
    pub fn dismiss_error(&self, message: impl Into<String>) {
        let status = StatusMessage::success(message);
        {
            let mut state = self.inner.write();
            state.error = None;
            state.status = Some(status.clone());
        }
        self.inner.emit(RunUpdate::Status(status));
    }

    /// Executes `script_id` and folds its feed into the run state.
    ///
    /// Only fails when another run is in flight; every run outcome,
    /// including transport failures, is reported through [`RunState`].
    #[tracing::instrument(name = "coordinator.run", skip_all, fields(script_id = %script_id))]
    pub async fn run(&self, script_id: &str, script_content: &str) -> Result<(), RunError> {
        if self
            .inner
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            let active = self.snapshot().script_id.unwrap_or_default();
            tracing::warn!(target: "rpa.run", active = %active, "run rejected, another run is in flight");
            return Err(RunError::AlreadyRunning { script_id: active });
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        let _guard = RunGuard {
            inner: &self.inner,
            run_id: run_id.clone(),
        };
        let mut tracker = RunTracker::new(run_id, script_id, script_content);
        self.begin(&tracker);

        let (sink, mut rx) = EventSink::channel();
        let call = self.inner.backend.run_script(script_id, sink);
        tokio::pin!(call);

        let outcome = loop {
            tokio::select! {
                biased;
                Some(event) = rx.recv() => self.apply(&mut tracker, event),
                res = &mut call => break res,
            }
        };
        rx.close();
        while let Ok(event) = rx.try_recv() {
            self.apply(&mut tracker, event);
        }

        match outcome {
            Ok(result) if !tracker.terminal_seen => {
                tracing::debug!(
                    target: "rpa.run",
                    stage = "run.fallback",
                    success = result.success,
                    "no terminal event, using returned result"
                );
                self.finish(&mut tracker, result);
            }
            Ok(_) => {}
            Err(err) if tracker.terminal_seen => {
                tracing::warn!(target: "rpa.run", error = %err, "backend call failed after terminal event");
            }
            Err(err) => self.fail_unexpected(&tracker, &err),
        }

        Ok(())
    }

    fn begin(&self, tracker: &RunTracker) {
        let status = StatusMessage::info(START_MESSAGE);
        let chunk = {
            let mut state = self.inner.write();
            state.is_running = true;
            state.error = None;
            state.output.clear();
            state.status = Some(status.clone());
            state.run_id = Some(tracker.run_id.clone());
            state.script_id = Some(tracker.script_id.clone());
            state.started_at = Some(Utc::now());
            state.finished_at = None;
            state.push(OutputSource::System, format!("{START_MESSAGE}\n"))
        };
        tracing::info!(target: "rpa.run", run_id = %tracker.run_id, script_id = %tracker.script_id, "run started");
        self.inner.emit(RunUpdate::Started {
            run_id: tracker.run_id.clone(),
            script_id: tracker.script_id.clone(),
        });
        self.inner.emit(RunUpdate::Status(status));
        self.inner.emit(RunUpdate::Output(chunk));
    }

    fn append(&self, source: OutputSource, text: impl Into<String>) {
        let chunk = self.inner.write().push(source, text);
        self.inner.emit(RunUpdate::Output(chunk));
    }

    fn set_error(&self, err: ScriptError) {
        let status = StatusMessage::error(format!("Script execution failed: {}", err.error));
        {
            let mut state = self.inner.write();
            state.error = Some(err);
            state.status = Some(status.clone());
        }
        self.inner.emit(RunUpdate::Status(status));
    }

    fn apply(&self, tracker: &mut RunTracker, event: RunEvent) {
        if tracker.terminal_seen {
            tracing::debug!(target: "rpa.run", kind = event.kind(), "ignoring event after terminal");
            return;
        }

        match event {
            RunEvent::Output { content, is_error } => {
                tracker.streamed_output = true;
                let source = if is_error {
                    tracker.stderr.push_str(&content);
                    OutputSource::Stderr
                } else {
                    tracker.stdout.push_str(&content);
                    OutputSource::Stdout
                };
                self.append(source, content);
            }
            RunEvent::Error(detail) => {
                tracing::debug!(
                    target: "rpa.run",
                    stage = "run.error_event",
                    message = detail.message.as_deref().unwrap_or_default(),
                    error_type = ?detail.error_type
                );
                tracker.merge_partial(detail);
                let err = tracker.build_error(None, None);
                self.set_error(err);
            }
            RunEvent::Complete(result) => {
                tracker.terminal_seen = true;
                self.finish(tracker, result);
            }
            RunEvent::Unknown { kind, reason } => {
                tracing::debug!(target: "rpa.run", kind = %kind, reason = %reason, "ignoring unknown event");
            }
        }
    }

    fn finish(&self, tracker: &mut RunTracker, result: RunResult) {
        tracker.terminal_seen = true;

        if !tracker.streamed_output {
            let stdout = result.stdout.clone().unwrap_or_default();
            if !stdout.is_empty() {
                tracker.stdout.push_str(&stdout);
                self.append(OutputSource::Stdout, stdout);
            } else if result.success {
                self.append(OutputSource::System, NO_OUTPUT_MESSAGE);
            }
        }

        if result.success {
            let status = StatusMessage::success(SUCCESS_MESSAGE);
            {
                let mut state = self.inner.write();
                state.error = None;
                state.status = Some(status.clone());
            }
            tracing::info!(target: "rpa.run", run_id = %tracker.run_id, "run succeeded");
            self.inner.emit(RunUpdate::Status(status));
            return;
        }

        let terminal = result.error_detail();
        let err = tracker.build_error(Some(&terminal), Some(&result));
        tracing::warn!(
            target: "rpa.run",
            run_id = %tracker.run_id,
            error_type = %err.error_type,
            error = %err.error,
            "run failed"
        );
        self.append(OutputSource::System, format_error_block(&err));
        self.set_error(err);
    }

    fn fail_unexpected(&self, tracker: &RunTracker, err: &anyhow::Error) {
        let message = err.to_string();
        tracing::error!(target: "rpa.run", run_id = %tracker.run_id, error = ?err, "run request failed");

        let script_error = ScriptError {
            error: message.clone(),
            error_type: ErrorType::UnknownError,
            stdout: tracker.stdout.clone(),
            stderr: tracker.stderr.clone(),
            traceback: Some(format!("{err:?}")),
            script_content: tracker.script_content.clone(),
            script_id: Some(tracker.script_id.clone()),
            details: Some(serde_json::json!({ "message": message })),
            ..ScriptError::default()
        };
        self.append(OutputSource::System, format!("\nUnexpected Error: {message}\n"));
        self.set_error(script_error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{InstructionRequest, InstructionResponse, RepairRequest};
    use async_trait::async_trait;

    struct StaticBackend {
        events: Vec<RunEvent>,
        result: RunResult,
    }

    #[async_trait]
    impl ScriptBackend for StaticBackend {
        fn name(&self) -> &str {
            "static"
        }

        async fn submit_instruction(&self, _req: InstructionRequest) -> anyhow::Result<InstructionResponse> {
            anyhow::bail!("not used")
        }

        async fn repair_script(&self, _req: RepairRequest) -> anyhow::Result<InstructionResponse> {
            anyhow::bail!("not used")
        }

        async fn fetch_script(&self, _script_id: &str) -> anyhow::Result<Option<String>> {
            Ok(None)
        }

        async fn run_script(&self, _script_id: &str, sink: EventSink) -> anyhow::Result<RunResult> {
            for ev in &self.events {
                sink.emit(ev.clone());
            }
            Ok(self.result.clone())
        }
    }

    fn coordinator(events: Vec<RunEvent>, result: RunResult) -> ScriptRunCoordinator {
        ScriptRunCoordinator::new(Arc::new(StaticBackend { events, result }))
    }

    #[tokio::test]
    async fn success_clears_partial_error() {
        let c = coordinator(
            vec![
                RunEvent::Error(ErrorDetail {
                    message: Some("transient".to_string()),
                    ..ErrorDetail::default()
                }),
                RunEvent::Complete(RunResult {
                    success: true,
                    ..RunResult::default()
                }),
            ],
            RunResult::default(),
        );
        c.run("s1", "print()").await.unwrap();
        let state = c.snapshot();
        assert!(state.error.is_none());
        assert_eq!(state.status, Some(StatusMessage::success(SUCCESS_MESSAGE)));
        assert!(!state.is_running);
    }

    #[tokio::test]
    async fn trailing_complete_marker_is_ignored() {
        let c = coordinator(
            vec![
                RunEvent::Complete(RunResult {
                    success: true,
                    stdout: Some("ok\n".to_string()),
                    ..RunResult::default()
                }),
                RunEvent::Complete(RunResult::default()),
                RunEvent::Output {
                    content: "late".to_string(),
                    is_error: false,
                },
            ],
            RunResult::default(),
        );
        c.run("s1", "").await.unwrap();
        let state = c.snapshot();
        assert_eq!(state.output_text(), format!("{START_MESSAGE}\nok\n"));
        assert_eq!(state.status.unwrap().kind, StatusKind::Success);
    }

    #[tokio::test]
    async fn empty_success_reports_no_output() {
        let c = coordinator(
            vec![],
            RunResult {
                success: true,
                ..RunResult::default()
            },
        );
        c.run("s1", "").await.unwrap();
        assert!(c.snapshot().output_text().ends_with(NO_OUTPUT_MESSAGE));
    }

    #[tokio::test]
    async fn failure_defaults_type_and_message() {
        let c = coordinator(vec![], RunResult::default());
        c.run("s9", "import x").await.unwrap();
        let err = c.snapshot().error.unwrap();
        assert_eq!(err.error, DEFAULT_FAILURE);
        assert_eq!(err.error_type, ErrorType::ExecutionError);
        assert_eq!(err.script_content, "import x");
        assert_eq!(err.script_id.as_deref(), Some("s9"));
    }

    #[tokio::test]
    async fn clear_resets_output_and_error_only() {
        let c = coordinator(vec![], RunResult::failed(ErrorType::ApiError, "nope"));
        c.run("s1", "").await.unwrap();
        c.clear();
        let state = c.snapshot();
        assert_eq!(state.output_text(), "");
        assert!(state.error.is_none());
        assert_eq!(state.status.unwrap().kind, StatusKind::Error);
    }

    #[tokio::test]
    async fn dismiss_error_sets_success_status() {
        let c = coordinator(vec![], RunResult::failed(ErrorType::ApiError, "nope"));
        c.run("s1", "").await.unwrap();
        c.dismiss_error("Script repaired successfully");
        let state = c.snapshot();
        assert!(state.error.is_none());
        assert_eq!(
            state.status,
            Some(StatusMessage::success("Script repaired successfully"))
        );
    }
}
