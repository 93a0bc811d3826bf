//! Bounded build progress model
//!
//! A step counter with a mutable label, shared between the event decode loop
//! and a background spinner task. Every read and write goes through one mutex
//! so a render never observes a half-applied update.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::progress_ui::ProgressDisplay;

/// Width of the rendered bar in columns
pub const BAR_WIDTH: usize = 40;

/// Spinner glyph cycle
pub const SPINNER_GLYPHS: [char; 4] = ['-', '/', '|', '\\'];

/// Spinner redraw interval
pub const SPINNER_INTERVAL: Duration = Duration::from_millis(100);

/// Snapshot of the progress record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressState {
    pub current: u64,
    pub total: u64,
    pub label: String,
    pub spinner_phase: usize,
    pub terminal: bool,
}

impl ProgressState {
    /// Completion percentage, 0 while no total is known
    pub fn percent(&self) -> u64 {
        if self.total == 0 {
            0
        } else {
            (u128::from(self.current) * 100 / u128::from(self.total)) as u64
        }
    }

    /// Format the display line for this state
    pub fn render(&self) -> String {
        let filled = if self.total == 0 {
            0
        } else {
            (u128::from(self.current) * BAR_WIDTH as u128 / u128::from(self.total)) as usize
        };
        let glyph = SPINNER_GLYPHS[self.spinner_phase % SPINNER_GLYPHS.len()];

        format!(
            "{} {} [{}{}] {}% Steps: {}/{}",
            glyph,
            self.label,
            "=".repeat(filled),
            " ".repeat(BAR_WIDTH - filled),
            self.percent(),
            self.current,
            self.total
        )
    }
}

/// Concurrency-safe progress record
pub struct ProgressModel {
    state: Mutex<ProgressState>,
    display: Box<dyn ProgressDisplay>,
    halt: watch::Sender<bool>,
}

impl ProgressModel {
    /// Create an empty model drawing to `display`
    pub fn new(display: Box<dyn ProgressDisplay>) -> Self {
        let (halt, _) = watch::channel(false);
        Self { state: Mutex::new(ProgressState::default()), display, halt }
    }

    // A poisoned lock still holds a consistent record: every mutation is a
    // single assignment.
    fn state(&self) -> MutexGuard<'_, ProgressState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Advance one step; saturates at the total
    pub fn increment(&self) {
        let mut state = self.state();
        if !state.terminal && state.current < state.total {
            state.current += 1;
        }
    }

    /// Raise the total; smaller values are ignored
    pub fn set_total(&self, total: u64) {
        let mut state = self.state();
        if !state.terminal && total > state.total {
            state.total = total;
        }
    }

    /// Replace the label; allowed even after completion
    pub fn set_label(&self, label: impl Into<String>) {
        self.state().label = label.into();
    }

    /// Force `current = total` and freeze the counter
    pub fn mark_complete(&self) {
        {
            let mut state = self.state();
            if state.terminal {
                return;
            }
            state.current = state.total;
            state.terminal = true;
        }
        self.halt.send_replace(true);
    }

    pub fn is_complete(&self) -> bool {
        self.state().terminal
    }

    /// Render the current line, advancing the spinner unless frozen
    pub fn render(&self) -> String {
        let mut state = self.state();
        if !state.terminal {
            state.spinner_phase = state.spinner_phase.wrapping_add(1);
        }
        state.render()
    }

    /// Copy of the current record
    pub fn snapshot(&self) -> ProgressState {
        self.state().clone()
    }

    /// Render and push the line to the display
    pub fn redraw(&self) {
        let (line, snapshot) = {
            let mut state = self.state();
            if !state.terminal {
                state.spinner_phase = state.spinner_phase.wrapping_add(1);
            }
            (state.render(), state.clone())
        };
        self.display.draw(&line, &snapshot);
    }

    /// Leave the final line on the display
    pub fn finish(&self) {
        let snapshot = self.snapshot();
        self.display.finish(&snapshot.render(), &snapshot);
    }

    /// Remove the line from the display
    pub fn clear(&self) {
        self.display.clear();
    }

    /// Stop the spinner without marking completion
    pub fn halt(&self) {
        self.halt.send_replace(true);
    }

    /// One spinner redraw; returns false once the model is frozen.
    ///
    /// Only the snapshot is taken under the lock. A draw racing
    /// `mark_complete` is overwritten by `finish`, which runs after the
    /// spinner task has been joined.
    fn tick(&self) -> bool {
        let (line, snapshot) = {
            let mut state = self.state();
            if state.terminal {
                return false;
            }
            state.spinner_phase = state.spinner_phase.wrapping_add(1);
            (state.render(), state.clone())
        };
        self.display.draw(&line, &snapshot);
        true
    }

    /// Start the background spinner.
    ///
    /// Returns `None` outside a tokio runtime.
    pub fn spawn_spinner(self: &Arc<Self>) -> Option<SpinnerHandle> {
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let model = Arc::clone(self);
        let mut halted = self.halt.subscribe();

        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(SPINNER_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if *halted.borrow() || !model.tick() {
                            break;
                        }
                    }
                    changed = halted.changed() => {
                        if changed.is_err() || *halted.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("Spinner stopped");
        });

        Some(SpinnerHandle { model: Arc::clone(self), task })
    }
}

/// Handle on a running spinner task
pub struct SpinnerHandle {
    model: Arc<ProgressModel>,
    task: JoinHandle<()>,
}

impl SpinnerHandle {
    /// Halt the spinner and wait for its task to exit
    pub async fn stop(self) {
        self.model.halt();
        if let Err(e) = self.task.await {
            debug!("Spinner task ended abnormally: {}", e);
        }
    }
}
