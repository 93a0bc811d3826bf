//! Build execution and artifact pipeline for the ACAP builder
//!
//! This crate packages a source tree into a build context, drives the image
//! build while tracking its progress, and copies the produced package out of
//! a throwaway container.

pub mod artifact;
pub mod context;
pub mod error;
pub mod graceful_shutdown;
pub mod interpreter;
pub mod lifecycle;
pub mod orchestrator;
pub mod progress;
pub mod progress_ui;
pub mod rules;

pub use artifact::{unpack_artifacts, ArtifactExtractor, ExtractedArtifact, ExtractedArtifactSet};
pub use context::{BuildContextArchive, ContextAssembler, InclusionRules, WalkDecision};
pub use error::{BuildError, Result};
pub use graceful_shutdown::{setup_signal_handlers, ShutdownManager, ShutdownReason};
pub use interpreter::{BuildLog, FailureAccumulator, InterpretOutcome, LogInterpreter};
pub use lifecycle::{ContainerLifecycleManager, ContainerState, ManagedContainer};
pub use orchestrator::{BuildOrchestrator, BuildReport};
pub use progress::{ProgressModel, ProgressState, SpinnerHandle};
pub use progress_ui::{
    IndicatifProgressDisplay, LogProgressDisplay, ProgressDisplay, ProgressDisplayFactory,
};
pub use rules::{PhaseRule, RuleSet, StepMarker};
