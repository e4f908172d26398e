//! Shared service plumbing
//!
//! Provides the pieces every binary in the workspace needs:
//! - logging initialization (console + optional daily-rolling files)
//! - graceful shutdown signal handling
//! - common command-line arguments
//! - layered configuration loading

pub mod bootstrap_args;
pub mod config_loader;
pub mod logging;
pub mod shutdown;

pub use bootstrap_args::ServiceArgs;
pub use config_loader::load_layered;
pub use logging::LoggingConfig;

// Re-export common dependencies
pub use figment;
pub use tokio;

// Re-export CLI dependencies when cli feature is enabled
#[cfg(feature = "cli")]
pub use clap;

// Re-export clap derive macros separately for proper macro resolution
#[cfg(feature = "cli")]
pub use clap::{Args, Parser};
