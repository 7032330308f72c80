/*!
Per-platform locations of the target application's state
*/

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Directory name the target application's updater works in
pub const UPDATER_DIR_NAME: &str = "cursor-updater";
pub const AUDIT_DB_FILE_NAME: &str = "operations.db";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OsFamily {
    Windows,
    Posix,
}

impl OsFamily {
    pub fn current() -> Self {
        if cfg!(windows) {
            OsFamily::Windows
        } else {
            OsFamily::Posix
        }
    }
}

/// The user whose application state is being managed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub name: String,
    pub home: PathBuf,
}

impl UserIdentity {
    pub fn current() -> Option<Self> {
        let home = dirs::home_dir()?;
        let name = std::env::var("USERNAME")
            .or_else(|_| std::env::var("USER"))
            .ok()
            .or_else(|| home.file_name().map(|n| n.to_string_lossy().into_owned()))?;
        Some(Self { name, home })
    }
}

/// Default sentinel location: `{local data dir}/cursor-updater`
pub fn default_sentinel_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join(UPDATER_DIR_NAME))
}

pub fn default_audit_db_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("cursor-manager").join(AUDIT_DB_FILE_NAME))
}
