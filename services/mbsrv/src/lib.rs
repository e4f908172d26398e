//! mbsrv - Modbus slave service
//!
//! Serves one register memory over Modbus TCP and serial lines, restores it
//! from a checkpoint at startup and saves it periodically and on shutdown.

pub mod autosave;
pub mod config;

pub use autosave::spawn_autosave;
pub use config::ServiceConfig;

pub const SERVICE_NAME: &str = "mbsrv";
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");
