/*!
Update gate: the updater's working directory is replaced by an empty file to
block it, and restored as an empty directory to enable it.
*/

use std::fmt;
use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{StateError, StateResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Blocked,
    Enabled,
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateState::Blocked => write!(f, "blocked"),
            GateState::Enabled => write!(f, "enabled"),
        }
    }
}

/// What currently occupies the sentinel path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SentinelKind {
    Absent,
    File,
    Directory,
}

#[derive(Debug, Clone)]
pub struct UpdateGate {
    sentinel: PathBuf,
}

impl UpdateGate {
    pub fn new(sentinel: impl Into<PathBuf>) -> Self {
        Self {
            sentinel: sentinel.into(),
        }
    }

    pub fn sentinel(&self) -> &Path {
        &self.sentinel
    }

    /// Blocked iff something other than a directory occupies the sentinel.
    ///
    /// An absent sentinel reads as enabled: the updater recreates its own
    /// directory on demand.
    pub fn state(&self) -> GateState {
        match self.probe() {
            SentinelKind::File => GateState::Blocked,
            SentinelKind::Absent | SentinelKind::Directory => GateState::Enabled,
        }
    }

    pub fn probe(&self) -> SentinelKind {
        match fs::symlink_metadata(&self.sentinel) {
            Ok(meta) if meta.is_dir() => SentinelKind::Directory,
            Ok(_) => SentinelKind::File,
            Err(_) => SentinelKind::Absent,
        }
    }

    pub fn transition(&self, target: GateState) -> StateResult<()> {
        match target {
            GateState::Blocked => self.block(),
            GateState::Enabled => self.enable(),
        }
    }

    /// Replace whatever is at the sentinel with an empty regular file
    pub fn block(&self) -> StateResult<()> {
        self.clear()?;
        if let Some(parent) = self.sentinel.parent() {
            fs::create_dir_all(parent).map_err(|e| StateError::io(parent, e))?;
        }
        fs::File::create(&self.sentinel).map_err(|e| StateError::io(&self.sentinel, e))?;
        info!("Update gate blocked at {:?}", self.sentinel);
        Ok(())
    }

    /// Replace whatever is at the sentinel with an empty directory
    pub fn enable(&self) -> StateResult<()> {
        self.clear()?;
        fs::create_dir_all(&self.sentinel).map_err(|e| StateError::io(&self.sentinel, e))?;
        info!("Update gate enabled at {:?}", self.sentinel);
        Ok(())
    }

    fn clear(&self) -> StateResult<()> {
        let removed = match self.probe() {
            SentinelKind::Absent => Ok(()),
            SentinelKind::Directory => fs::remove_dir_all(&self.sentinel),
            SentinelKind::File => fs::remove_file(&self.sentinel),
        };
        match removed {
            Ok(()) => {
                debug!("Cleared sentinel {:?}", self.sentinel);
                Ok(())
            }
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(StateError::io(&self.sentinel, e)),
        }
    }
}
