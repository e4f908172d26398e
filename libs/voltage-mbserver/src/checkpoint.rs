//! Register memory checkpoints
//!
//! File layout:
//!
//! ```text
//! "MBST" | version u16 LE | bincode(StateObject)
//! ```
//!
//! `StateObject` holds the four spaces in order: discrete inputs, coils,
//! holding registers, input registers, each exactly 65536 entries. Writes
//! go to a temporary file in the target directory, are fsynced, then renamed
//! over the checkpoint so a crash never leaves a truncated file behind.
//!
//! Every failure here is fatal to the caller: running on with register
//! memory of unknown integrity is not an option.

use std::io::Write;
use std::path::{Path, PathBuf};

use errors::SlaveError;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::store::{RegisterStore, ADDRESS_SPACE};
use crate::Result;

/// Checkpoint path when none is configured, relative to the working directory
pub const DEFAULT_CHECKPOINT_PATH: &str = "modbus.state";

const MAGIC: &[u8; 4] = b"MBST";
const FORMAT_VERSION: u16 = 1;
const HEADER_LEN: usize = 6;

/// Snapshot of the whole register memory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateObject {
    pub discrete_inputs: Vec<u8>,
    pub coils: Vec<u8>,
    pub holding_registers: Vec<u16>,
    pub input_registers: Vec<u16>,
}

impl StateObject {
    pub fn capture(store: &RegisterStore) -> Self {
        Self {
            discrete_inputs: store.discrete_inputs().to_vec(),
            coils: store.coils().to_vec(),
            holding_registers: store.holding_registers().to_vec(),
            input_registers: store.input_registers().to_vec(),
        }
    }

    /// Every space must span the full address range
    pub fn validate(&self) -> Result<()> {
        let lengths = [
            ("discrete_inputs", self.discrete_inputs.len()),
            ("coils", self.coils.len()),
            ("holding_registers", self.holding_registers.len()),
            ("input_registers", self.input_registers.len()),
        ];
        for (space, len) in lengths {
            if len != ADDRESS_SPACE {
                return Err(SlaveError::CheckpointCorrupt(format!(
                    "{} has {} entries, expected {}",
                    space, len, ADDRESS_SPACE
                )));
            }
        }
        Ok(())
    }

    /// Overwrite all four spaces; nothing is written unless all lengths match
    pub fn apply(&self, store: &mut RegisterStore) -> Result<()> {
        self.validate()?;
        store.discrete_inputs_mut().copy_from_slice(&self.discrete_inputs);
        store.coils_mut().copy_from_slice(&self.coils);
        store
            .holding_registers_mut()
            .copy_from_slice(&self.holding_registers);
        store
            .input_registers_mut()
            .copy_from_slice(&self.input_registers);
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let body =
            bincode::serialize(self).map_err(|e| SlaveError::CheckpointEncode(e.to_string()))?;
        let mut bytes = Vec::with_capacity(HEADER_LEN + body.len());
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(SlaveError::CheckpointCorrupt(format!(
                "{} bytes is shorter than the header",
                bytes.len()
            )));
        }
        if &bytes[..4] != MAGIC {
            return Err(SlaveError::CheckpointCorrupt("bad magic".to_string()));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != FORMAT_VERSION {
            return Err(SlaveError::CheckpointCorrupt(format!(
                "unsupported format version {}",
                version
            )));
        }

        let state: Self = bincode::deserialize(&bytes[HEADER_LEN..])?;
        state.validate()?;
        Ok(state)
    }
}

/// Reads and writes the checkpoint file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointManager {
    path: PathBuf,
}

impl CheckpointManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn io_error(&self, source: std::io::Error) -> SlaveError {
        SlaveError::CheckpointIo {
            path: self.path.display().to_string(),
            source,
        }
    }

    /// Read the checkpoint; `None` when no checkpoint has been written yet
    pub fn load(&self) -> Result<Option<StateObject>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No checkpoint at {}", self.path.display());
                return Ok(None);
            },
            Err(e) => return Err(self.io_error(e)),
        };

        let state = StateObject::decode(&bytes)?;
        info!(
            "Checkpoint loaded: {} ({} bytes)",
            self.path.display(),
            bytes.len()
        );
        Ok(Some(state))
    }

    /// Atomically replace the checkpoint with `state`
    pub fn store(&self, state: &StateObject) -> Result<()> {
        let bytes = state.encode()?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let prefix = match self.path.file_name() {
            Some(name) => format!(".{}.", name.to_string_lossy()),
            None => ".checkpoint.".to_string(),
        };

        let mut tmp = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|e| self.io_error(e))?;
        tmp.write_all(&bytes).map_err(|e| self.io_error(e))?;
        tmp.as_file().sync_all().map_err(|e| self.io_error(e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o644))
                .map_err(|e| self.io_error(e))?;
        }

        tmp.persist(&self.path).map_err(|e| self.io_error(e.error))?;
        info!(
            "Checkpoint saved: {} ({} bytes)",
            self.path.display(),
            bytes.len()
        );
        Ok(())
    }
}

impl Default for CheckpointManager {
    fn default() -> Self {
        Self::new(DEFAULT_CHECKPOINT_PATH)
    }
}
