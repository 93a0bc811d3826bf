//! Progress display sinks
//!
//! The [`ProgressModel`](crate::progress::ProgressModel) renders its own line;
//! a display only decides where that line goes.

use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::progress::ProgressState;

/// Trait for progress display implementations
pub trait ProgressDisplay: Send + Sync {
    /// Show a freshly rendered line
    fn draw(&self, line: &str, state: &ProgressState);

    /// Leave the final line on screen
    fn finish(&self, line: &str, state: &ProgressState);

    /// Remove the display entirely
    fn clear(&self);
}

/// Indicatif-based display for interactive terminals
pub struct IndicatifProgressDisplay {
    bar: ProgressBar,
}

impl IndicatifProgressDisplay {
    /// Create a new indicatif display
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(ProgressStyle::default_spinner().template("{msg}").expect("Valid template"));
        Self { bar }
    }
}

impl Default for IndicatifProgressDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressDisplay for IndicatifProgressDisplay {
    fn draw(&self, line: &str, _state: &ProgressState) {
        self.bar.set_message(line.to_string());
    }

    fn finish(&self, line: &str, _state: &ProgressState) {
        if !self.bar.is_finished() {
            self.bar.finish_with_message(line.to_string());
        }
    }

    fn clear(&self) {
        self.bar.finish_and_clear();
    }
}

/// Display that reports label and step changes through tracing
#[derive(Default)]
pub struct LogProgressDisplay {
    last: Mutex<Option<(String, u64, u64)>>,
}

impl LogProgressDisplay {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressDisplay for LogProgressDisplay {
    fn draw(&self, _line: &str, state: &ProgressState) {
        let key = (state.label.clone(), state.current, state.total);
        let Ok(mut last) = self.last.lock() else {
            return;
        };
        if last.as_ref() == Some(&key) {
            return;
        }

        if state.total > 0 {
            info!("{} [{}/{}]", state.label, state.current, state.total);
        } else if !state.label.is_empty() {
            info!("{}", state.label);
        }
        *last = Some(key);
    }

    fn finish(&self, _line: &str, state: &ProgressState) {
        info!("Build progress: {}% ({}/{} steps)", state.percent(), state.current, state.total);
    }

    fn clear(&self) {
        debug!("Progress display cleared");
    }
}

/// Progress display factory
pub struct ProgressDisplayFactory;

impl ProgressDisplayFactory {
    /// Create a display based on the environment
    pub fn create(interactive: bool) -> Box<dyn ProgressDisplay> {
        if interactive && atty::is(atty::Stream::Stderr) {
            Box::new(IndicatifProgressDisplay::new())
        } else {
            Box::new(LogProgressDisplay::new())
        }
    }

    /// Create an indicatif display
    pub fn create_indicatif() -> Box<dyn ProgressDisplay> {
        Box::new(IndicatifProgressDisplay::new())
    }

    /// Create a tracing-only display
    pub fn create_log() -> Box<dyn ProgressDisplay> {
        Box::new(LogProgressDisplay::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(label: &str, current: u64, total: u64) -> ProgressState {
        ProgressState { current, total, label: label.to_string(), ..Default::default() }
    }

    #[test]
    fn test_indicatif_display() {
        let display = IndicatifProgressDisplay::new();
        display.draw("- Building [] 0% Steps: 0/0", &state("Building", 0, 0));
        display.finish("- Done", &state("Done", 3, 3));
        // finishing twice must be harmless
        display.finish("- Done", &state("Done", 3, 3));
        display.clear();
    }

    #[test]
    fn test_log_display_deduplicates() {
        let display = LogProgressDisplay::new();
        display.draw("a", &state("Install packages (apt)...", 1, 4));
        display.draw("b", &state("Install packages (apt)...", 1, 4));
        assert_eq!(
            *display.last.lock().unwrap(),
            Some(("Install packages (apt)...".to_string(), 1, 4))
        );

        display.draw("c", &state("Install packages (apt)...", 2, 4));
        assert_eq!(display.last.lock().unwrap().as_ref().map(|l| l.1), Some(2));
        display.finish("d", &state("", 4, 4));
    }

    #[test]
    fn test_display_factory() {
        let log = ProgressDisplayFactory::create_log();
        log.draw("line", &state("x", 0, 0));

        let indicatif = ProgressDisplayFactory::create_indicatif();
        indicatif.draw("line", &state("x", 0, 0));
        indicatif.clear();

        // never interactive when asked not to be
        let display = ProgressDisplayFactory::create(false);
        display.clear();
    }
}
