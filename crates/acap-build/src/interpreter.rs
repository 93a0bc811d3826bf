//! Build event stream interpretation
//!
//! Drives the [`ProgressModel`] from the engine's log lines and decides
//! whether the build failed. Classification itself is table-driven, see
//! [`RuleSet`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use acap_build_docker::{BuildEvent, DockerError};
use futures::{Stream, StreamExt};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{BuildError, Result};
use crate::progress::{ProgressModel, ProgressState, SpinnerHandle};
use crate::rules::{RuleSet, INITIAL_LABEL};

/// Failure state for one build; once triggered it stays triggered
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureAccumulator {
    triggered: bool,
    messages: Vec<String>,
}

impl FailureAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the message that flagged the failure
    pub fn trigger(&mut self, message: impl Into<String>) {
        self.triggered = true;
        self.messages.push(message.into());
    }

    /// Record a message arriving after the failure
    pub fn push(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<String> {
        self.messages
    }
}

/// Raw build log, truncated when opened
pub struct BuildLog {
    path: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
}

impl BuildLog {
    /// Create (or truncate) the log at `path`
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = File::create(path).await?;
        debug!("Writing build log to {}", path.display());
        Ok(Self { path: Some(path.to_path_buf()), writer: Some(BufWriter::new(file)) })
    }

    /// A log that discards everything
    pub fn disabled() -> Self {
        Self { path: None, writer: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append one raw message, newline-terminated
    pub async fn append(&mut self, message: &str) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.write_all(message.as_bytes()).await?;
            if !message.ends_with('\n') {
                writer.write_all(b"\n").await?;
            }
        }
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush().await?;
        }
        Ok(())
    }
}

/// Result of consuming a whole event stream
#[derive(Debug, Clone)]
pub struct InterpretOutcome {
    pub success: bool,
    /// Triggering message and everything after it, in arrival order
    pub messages: Vec<String>,
    /// Progress at stream end
    pub progress: ProgressState,
    /// Events carrying log text
    pub events: usize,
}

impl InterpretOutcome {
    /// Turn a failed outcome into [`BuildError::BuildFailure`]
    pub fn into_result(self) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(BuildError::BuildFailure { messages: self.messages })
        }
    }
}

/// Consumes the engine's build events
pub struct LogInterpreter {
    rules: RuleSet,
    progress: Arc<ProgressModel>,
    log: BuildLog,
    cancel: Option<watch::Receiver<bool>>,
    failure: FailureAccumulator,
    spinner: Option<SpinnerHandle>,
    engine_total: u64,
    engine_steps: u64,
    extra_steps: u64,
    events: usize,
}

impl LogInterpreter {
    pub fn new(progress: Arc<ProgressModel>) -> Self {
        Self {
            rules: RuleSet::standard(),
            progress,
            log: BuildLog::disabled(),
            cancel: None,
            failure: FailureAccumulator::new(),
            spinner: None,
            engine_total: 0,
            engine_steps: 0,
            extra_steps: 0,
            events: 0,
        }
    }

    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_log(mut self, log: BuildLog) -> Self {
        self.log = log;
        self
    }

    /// Abort the decode loop when the receiver flips to `true`
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Consume `events` to the end.
    ///
    /// `expected_extra_steps` counts phases the engine's own step markers do
    /// not cover (install, start, watch). A broken stream ends the call with
    /// an error; a detected build failure is a normal outcome with
    /// `success == false`.
    pub async fn interpret<S>(mut self, events: S, expected_extra_steps: u64) -> Result<InterpretOutcome>
    where
        S: Stream<Item = acap_build_docker::Result<BuildEvent>>,
    {
        self.extra_steps = expected_extra_steps;
        self.progress.set_label(INITIAL_LABEL);

        let result = self.drive(events).await;

        if let Some(spinner) = self.spinner.take() {
            spinner.stop().await;
        }
        if let Err(e) = self.log.flush().await {
            warn!("Failed to flush build log: {}", e);
        }

        result?;

        let success = !self.failure.is_triggered();
        if success {
            self.progress.mark_complete();
        }
        self.progress.finish();

        info!(
            "Build stream ended after {} events: {}",
            self.events,
            if success { "success" } else { "failure" }
        );

        Ok(InterpretOutcome {
            success,
            messages: self.failure.into_messages(),
            progress: self.progress.snapshot(),
            events: self.events,
        })
    }

    async fn drive<S>(&mut self, events: S) -> Result<()>
    where
        S: Stream<Item = acap_build_docker::Result<BuildEvent>>,
    {
        futures::pin_mut!(events);
        let mut cancel = self.cancel.clone();

        loop {
            let next = match cancel.as_mut() {
                Some(rx) => tokio::select! {
                    biased;
                    _ = cancelled(rx) => {
                        info!("Build cancelled while reading the build stream");
                        self.progress.halt();
                        return Err(BuildError::Cancelled);
                    }
                    item = events.next() => item,
                },
                None => events.next().await,
            };

            let Some(item) = next else {
                return Ok(());
            };
            let event = item.map_err(|e| {
                self.progress.halt();
                classify_stream_error(e)
            })?;

            self.handle(event).await?;
            if !self.progress.is_complete() {
                self.progress.redraw();
            }
        }
    }

    async fn handle(&mut self, event: BuildEvent) -> Result<()> {
        if let Some(error) = event.error {
            self.log.append(&error).await?;
            warn!("Engine reported an error: {}", error.trim_end());
            if self.failure.is_triggered() {
                self.failure.push(error);
            } else {
                self.failure.trigger(error);
                self.progress.mark_complete();
            }
            return Ok(());
        }

        let Some(message) = event.stream else {
            return Ok(());
        };
        self.events += 1;
        self.log.append(&message).await?;
        self.classify(message);
        Ok(())
    }

    fn classify(&mut self, message: String) {
        if self.failure.is_triggered() {
            self.failure.push(message);
            return;
        }

        if self.rules.is_error(&message) {
            debug!("Failure detected: {}", message.trim_end());
            self.failure.trigger(message);
            self.progress.mark_complete();
            return;
        }

        if let Some(marker) = self.rules.step_marker(&message) {
            if marker.total > self.engine_total {
                self.engine_total = marker.total;
                self.progress.set_total(marker.total.saturating_add(self.extra_steps));
                if self.spinner.is_none() {
                    self.spinner = self.progress.spawn_spinner();
                }
            }
            if self.engine_steps < self.engine_total {
                self.engine_steps += 1;
                self.progress.increment();
            }
        }

        for rule in self.rules.phases(&message) {
            self.progress.set_label(rule.label.as_str());
            if rule.counts_step {
                self.progress.increment();
            }
        }
    }
}

/// A rejection before any event is a submission error, anything else a broken stream
fn classify_stream_error(error: DockerError) -> BuildError {
    match error {
        DockerError::BuildRejected { status, reason } => BuildError::BuildSubmission {
            reason: format!("engine returned {status}: {reason}"),
        },
        other => BuildError::StreamDecode { reason: other.to_string() },
    }
}

async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // sender gone, cancellation can no longer arrive
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;
    use crate::progress_ui::LogProgressDisplay;

    fn progress() -> Arc<ProgressModel> {
        Arc::new(ProgressModel::new(Box::new(LogProgressDisplay::new())))
    }

    fn lines(messages: &[&str]) -> Vec<acap_build_docker::Result<BuildEvent>> {
        messages.iter().map(|m| Ok(BuildEvent::log(*m))).collect()
    }

    #[test]
    fn test_accumulator_is_monotonic() {
        let mut failure = FailureAccumulator::new();
        assert!(!failure.is_triggered());
        failure.trigger("boom");
        failure.push("after");
        assert!(failure.is_triggered());
        assert_eq!(failure.messages(), ["boom", "after"]);
    }

    #[tokio::test]
    async fn test_events_without_text_are_ignored() {
        let events = vec![
            Ok(BuildEvent { status: Some("Pulling fs layer".to_string()), ..Default::default() }),
            Ok(BuildEvent::log("Step 1/1 : FROM scratch")),
        ];
        let outcome = LogInterpreter::new(progress())
            .interpret(stream::iter(events), 0)
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.events, 1);
    }

    #[tokio::test]
    async fn test_engine_error_field_fails_build() {
        let events = vec![
            Ok(BuildEvent::log("Step 1/2 : RUN make")),
            Ok(BuildEvent::engine_error("The command '/bin/sh -c make' returned a non-zero code: 2")),
        ];
        let outcome = LogInterpreter::new(progress())
            .interpret(stream::iter(events), 0)
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.messages.len(), 1);
        assert!(outcome.into_result().unwrap_err().build_messages()[0].contains("non-zero code"));
    }

    #[tokio::test]
    async fn test_label_without_step_marker() {
        let model = progress();
        let outcome = LogInterpreter::new(Arc::clone(&model))
            .interpret(stream::iter(lines(&["Building FFmpeg 6.0"])), 0)
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.progress.label, "Build libav ...");
        assert_eq!(outcome.progress.total, 0);
    }

    #[tokio::test]
    async fn test_lower_total_does_not_shrink() {
        let outcome = LogInterpreter::new(progress())
            .interpret(stream::iter(lines(&["Step 1/5", "Step 2/3", "Step 3/6"])), 0)
            .await
            .unwrap();
        assert_eq!(outcome.progress.total, 6);
        assert_eq!(outcome.progress.current, 6);
    }

    #[tokio::test]
    async fn test_oversized_step_total_saturates() {
        let outcome = LogInterpreter::new(progress())
            .interpret(stream::iter(lines(&["Step 1/18446744073709551615 : RUN echo"])), 1)
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.progress.total, u64::MAX);
        assert_eq!(outcome.progress.current, u64::MAX);
    }
}
