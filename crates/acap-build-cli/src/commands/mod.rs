//! CLI command implementations

pub mod build;
pub mod clean;

pub use build::BuildCommand;
pub use clean::CleanCommand;
