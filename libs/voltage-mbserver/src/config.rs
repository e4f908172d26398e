//! Engine and serial transport configuration

use std::time::Duration;

use errors::SlaveError;
use serde::{Deserialize, Serialize};

use crate::frame::FrameKind;
use crate::Result;

/// Request serializer settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Bounded intake queue size; producers wait when it is full
    pub intake_capacity: usize,
    /// Upper bound on one response write inside the serialized section
    pub write_timeout_ms: u64,
    /// Log every dispatched request at info instead of debug
    pub verbose: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            intake_capacity: 64,
            write_timeout_ms: 5000,
            verbose: false,
        }
    }
}

impl EngineConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.intake_capacity == 0 {
            return Err(invalid("engine.intake_capacity", "must be at least 1"));
        }
        if self.write_timeout_ms == 0 {
            return Err(invalid("engine.write_timeout_ms", "must be greater than 0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

/// One serial port served in RTU or ASCII framing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SerialConfig {
    pub path: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
    pub mode: FrameKind,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: "/dev/ttyUSB0".to_string(),
            baud_rate: 19200,
            data_bits: 8,
            parity: Parity::Even,
            stop_bits: 1,
            mode: FrameKind::Rtu,
        }
    }
}

impl SerialConfig {
    pub fn validate(&self) -> Result<()> {
        if self.path.trim().is_empty() {
            return Err(invalid("serial.path", "must not be empty"));
        }
        if self.baud_rate == 0 {
            return Err(invalid("serial.baud_rate", "must be greater than 0"));
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(invalid("serial.data_bits", "must be between 5 and 8"));
        }
        if !(1..=2).contains(&self.stop_bits) {
            return Err(invalid("serial.stop_bits", "must be 1 or 2"));
        }
        if self.mode == FrameKind::Tcp {
            return Err(invalid("serial.mode", "must be rtu or ascii"));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> SlaveError {
    SlaveError::InvalidConfig {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
