//! Classification rules for build log lines
//!
//! The interpreter never hard-codes a pattern: failure detection, step markers
//! and phase labels all come from a [`RuleSet`].

use regex::Regex;

/// Case-insensitive keywords that flag a failed build
pub const ERROR_PATTERN: &str = r"(?i)(error|failed|Illegal|cannot|could not|can't|\bfail\b|panic:|undefined|missing|expected|unexpected|cannot find package|no package found)";

/// Engine step marker, `Step <k>/<n>`
pub const STEP_PATTERN: &str = r"Step (\d+)/(\d+)";

/// Label shown before any phase trigger fires
pub const INITIAL_LABEL: &str = "Starting...";

/// A substring trigger that relabels the progress line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseRule {
    pub trigger: String,
    pub label: String,
    /// Whether a match also advances the counter by one step
    pub counts_step: bool,
}

impl PhaseRule {
    pub fn label(trigger: impl Into<String>, label: impl Into<String>) -> Self {
        Self { trigger: trigger.into(), label: label.into(), counts_step: false }
    }

    pub fn step(trigger: impl Into<String>, label: impl Into<String>) -> Self {
        Self { trigger: trigger.into(), label: label.into(), counts_step: true }
    }

    pub fn matches(&self, message: &str) -> bool {
        message.contains(&self.trigger)
    }
}

/// A parsed `Step k/n` marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepMarker {
    pub current: u64,
    pub total: u64,
}

/// Ordered classification table
#[derive(Debug, Clone)]
pub struct RuleSet {
    error_pattern: Regex,
    step_pattern: Regex,
    phases: Vec<PhaseRule>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::standard()
    }
}

impl RuleSet {
    /// Rules matching the bundled recipe
    pub fn standard() -> Self {
        let phases = vec![
            PhaseRule::label("ARG ARCH", "Docker prepare image..."),
            PhaseRule::label("RUN apt-get update", "Install packages (apt)..."),
            PhaseRule::label("ARG GOLANG_VERSION", "Install golang ..."),
            PhaseRule::label("Building FFmpeg", "Build libav ..."),
            PhaseRule::label("RUN python ge", "Generate Makefile ..."),
            PhaseRule::label("RUN . /opt/axis/acapsdk/environment-setup", "Prepare application..."),
            PhaseRule::label("go build -ldfl", "Building application..."),
            PhaseRule::label("Create pack", "Create package..."),
            PhaseRule::step("installing", "Install package..."),
            PhaseRule::step("starting", "Starting package..."),
            PhaseRule::label("RUN mv *.eap /opt/eap", "Copy package..."),
        ];

        Self {
            error_pattern: Regex::new(ERROR_PATTERN).expect("valid error pattern"),
            step_pattern: Regex::new(STEP_PATTERN).expect("valid step pattern"),
            phases,
        }
    }

    /// Custom rule set
    pub fn new(error_pattern: Regex, step_pattern: Regex, phases: Vec<PhaseRule>) -> Self {
        Self { error_pattern, step_pattern, phases }
    }

    /// Append a phase rule after the existing ones
    pub fn with_phase(mut self, rule: PhaseRule) -> Self {
        self.phases.push(rule);
        self
    }

    pub fn is_error(&self, message: &str) -> bool {
        self.error_pattern.is_match(message)
    }

    /// Extract a step marker; markers that do not fit in a u64 are ignored
    pub fn step_marker(&self, message: &str) -> Option<StepMarker> {
        let captures = self.step_pattern.captures(message)?;
        let current = captures.get(1)?.as_str().parse().ok()?;
        let total = captures.get(2)?.as_str().parse().ok()?;
        Some(StepMarker { current, total })
    }

    /// Every phase rule matching the message, in table order
    pub fn phases<'a>(&'a self, message: &'a str) -> impl Iterator<Item = &'a PhaseRule> + 'a {
        self.phases.iter().filter(move |rule| rule.matches(message))
    }

    pub fn phase_rules(&self) -> &[PhaseRule] {
        &self.phases
    }
}
