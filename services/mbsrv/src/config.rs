//! mbsrv configuration
//!
//! Loaded in layers: built-in defaults, `config/mbsrv.yaml` (or `--config`),
//! `MBSRV_*` environment variables, then command-line overrides.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use common::{LoggingConfig, ServiceArgs};
use errors::{SlaveError, SlaveResult};
use serde::{Deserialize, Serialize};
use voltage_mbserver::{CheckpointManager, EngineConfig, SerialConfig};

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "config/mbsrv.yaml";

/// Environment prefix; nested keys use `__` (`MBSRV_CHECKPOINT__AUTOSAVE_SECS=30`)
pub const ENV_PREFIX: &str = "MBSRV_";

/// Default Modbus TCP listener
pub const DEFAULT_TCP_ADDR: &str = "0.0.0.0:502";

/// Checkpoint schedule
///
/// The file itself is always `modbus.state` in the working directory; a
/// `path` key is rejected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CheckpointConfig {
    /// Periodic save interval in seconds, 0 disables
    pub autosave_secs: u64,
    /// Save once more after the transports are closed
    pub save_on_shutdown: bool,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            autosave_secs: 0,
            save_on_shutdown: true,
        }
    }
}

impl CheckpointConfig {
    pub fn autosave_interval(&self) -> Option<Duration> {
        (self.autosave_secs > 0).then(|| Duration::from_secs(self.autosave_secs))
    }

    /// Manager for the fixed checkpoint file
    pub fn manager(&self) -> CheckpointManager {
        CheckpointManager::default()
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub engine: EngineConfig,
    pub checkpoint: CheckpointConfig,
    /// Modbus TCP listen addresses
    pub tcp: Vec<String>,
    /// Serial ports served in RTU or ASCII framing
    pub serial: Vec<SerialConfig>,
    pub logging: LoggingConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            checkpoint: CheckpointConfig::default(),
            tcp: vec![DEFAULT_TCP_ADDR.to_string()],
            serial: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load defaults, file and environment, then apply `args`
    pub fn load(args: &ServiceArgs) -> SlaveResult<Self> {
        let mut config: Self = common::load_layered(
            args.config.as_deref(),
            Path::new(DEFAULT_CONFIG_FILE),
            ENV_PREFIX,
        )?;
        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    /// Command-line values win over everything loaded before
    pub fn apply_args(&mut self, args: &ServiceArgs) {
        if let Some(bind) = &args.bind {
            match self.tcp.first_mut() {
                Some(first) => *first = bind.clone(),
                None => self.tcp.push(bind.clone()),
            }
        }
        if let Some(level) = args.effective_log_level() {
            self.logging.level = level;
        }
        if args.verbose {
            self.engine.verbose = true;
        }
        if args.no_color {
            self.logging.ansi = false;
        }
    }

    pub fn validate(&self) -> SlaveResult<()> {
        self.engine.validate()?;

        if self.tcp.is_empty() && self.serial.is_empty() {
            return Err(SlaveError::InvalidConfig {
                field: "tcp".to_string(),
                reason: "no TCP listener and no serial port configured".to_string(),
            });
        }
        for addr in &self.tcp {
            addr.parse::<SocketAddr>()
                .map_err(|e| SlaveError::InvalidConfig {
                    field: "tcp".to_string(),
                    reason: format!("'{}': {}", addr, e),
                })?;
        }
        for port in &self.serial {
            port.validate()?;
        }
        Ok(())
    }
}
