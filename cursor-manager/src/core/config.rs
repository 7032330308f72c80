/*!
Settings for the manager, loaded from TOML
*/

use std::path::{Path, PathBuf};

use cursor_state::{ConfigStore, OsFamily, UserIdentity, platform};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ManagerSettings {
    /// Location overrides
    pub paths: PathSettings,
    /// Identifier regeneration behavior
    pub identifiers: IdentifierSettings,
    /// Where gate-change notifications are delivered
    pub notifications: Vec<NotificationConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PathSettings {
    /// The target application's `storage.json`
    pub config_file: Option<PathBuf>,
    /// The updater sentinel path
    pub sentinel: Option<PathBuf>,
    /// The SQLite audit store
    pub audit_db: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdentifierSettings {
    /// Write regenerated identifiers into `storage.json`
    pub persist_identifiers: bool,
    /// Kill running instances of the target application before regenerating
    pub terminate_target: bool,
}

impl Default for IdentifierSettings {
    fn default() -> Self {
        Self {
            persist_identifiers: false,
            terminate_target: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
    pub plugin: NotificationPlugin,
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub enum NotificationPlugin {
    Terminal { format: TerminalFormat },
    JsonLines { path: PathBuf },
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub enum TerminalFormat {
    Plain,
    Colored,
}

/// Fully resolved locations the orchestrator operates on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub config_file: PathBuf,
    pub sentinel: PathBuf,
    pub audit_db: PathBuf,
}

impl ManagerSettings {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let settings: ManagerSettings = toml::from_str(&content)?;
        info!("Loaded settings from {:?}", path.as_ref());
        Ok(settings)
    }

    /// Settings from the per-user settings file when present, defaults otherwise
    pub fn load_default() -> Result<Self, Box<dyn std::error::Error>> {
        match default_settings_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => {
                debug!("No settings file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn resolve_paths(&self) -> Result<ResolvedPaths, Box<dyn std::error::Error>> {
        let config_file = match &self.paths.config_file {
            Some(path) => path.clone(),
            None => {
                let user = UserIdentity::current().ok_or("could not determine the current user")?;
                ConfigStore::locate(OsFamily::current(), &user)
            }
        };
        let sentinel = match &self.paths.sentinel {
            Some(path) => path.clone(),
            None => platform::default_sentinel_path()
                .ok_or("could not determine the local data directory")?,
        };
        let audit_db = match &self.paths.audit_db {
            Some(path) => path.clone(),
            None => platform::default_audit_db_path()
                .ok_or("could not determine the local data directory")?,
        };

        Ok(ResolvedPaths {
            config_file,
            sentinel,
            audit_db,
        })
    }

    /// The default notification outputs, used when none are configured
    pub fn effective_notifications(&self) -> Vec<NotificationConfig> {
        if self.notifications.is_empty() {
            vec![NotificationConfig {
                plugin: NotificationPlugin::Terminal {
                    format: TerminalFormat::Colored,
                },
                enabled: true,
            }]
        } else {
            self.notifications.clone()
        }
    }
}

pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("cursor-manager").join("settings.toml"))
}
