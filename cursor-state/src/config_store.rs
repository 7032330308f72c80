/*!
Atomic reads and writes of the target application's `storage.json`
*/

use std::fs;
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{StateError, StateResult};
use crate::identifiers::IdentifierSet;
use crate::platform::{OsFamily, UserIdentity};

/// The stored settings object, opaque apart from the keys we overwrite
pub type ConfigDocument = Map<String, Value>;

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Fixed location of `storage.json` for the given OS family and user
    pub fn locate(os: OsFamily, user: &UserIdentity) -> PathBuf {
        match os {
            OsFamily::Windows => PathBuf::from(format!(
                "C:/Users/{}/AppData/Roaming/Cursor/storage.json",
                user.name
            )),
            OsFamily::Posix => user.home.join(".config").join("Cursor").join("storage.json"),
        }
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn for_user(os: OsFamily, user: &UserIdentity) -> Self {
        Self::at(Self::locate(os, user))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `Ok(None)` when no config file exists yet
    pub fn read(&self) -> StateResult<Option<ConfigDocument>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StateError::io(&self.path, err)),
        };

        let doc = serde_json::from_slice::<ConfigDocument>(&bytes).map_err(|source| {
            StateError::Decode {
                path: self.path.clone(),
                source,
            }
        })?;
        debug!("Read {} keys from {:?}", doc.len(), self.path);
        Ok(Some(doc))
    }

    /// Missing or malformed files both read as an empty document
    pub fn read_or_empty(&self) -> StateResult<ConfigDocument> {
        match self.read() {
            Ok(doc) => Ok(doc.unwrap_or_default()),
            Err(StateError::Decode { path, source }) => {
                warn!("Ignoring malformed config at {:?}: {}", path, source);
                Ok(ConfigDocument::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Writes through a temp file in the same directory and renames it into place.
    pub fn write(&self, doc: &ConfigDocument) -> StateResult<()> {
        self.write_with(doc, |staged, path| {
            staged.persist(path).map(|_| ()).map_err(|e| e.error)
        })
    }

    /// Stage `doc` next to the live file, then hand it to `commit` to move into place.
    /// The live file is never opened for writing; a failed commit leaves it as it was.
    fn write_with<F>(&self, doc: &ConfigDocument, commit: F) -> StateResult<()>
    where
        F: FnOnce(NamedTempFile, &Path) -> std::io::Result<()>,
    {
        let staged = self.stage(doc)?;
        commit(staged, &self.path).map_err(|e| StateError::io(&self.path, e))?;

        info!("Wrote config to {:?}", self.path);
        Ok(())
    }

    fn stage(&self, doc: &ConfigDocument) -> StateResult<NamedTempFile> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(|e| StateError::io(parent, e))?;

        let mut json = serde_json::to_vec_pretty(doc).map_err(|source| StateError::Decode {
            path: self.path.clone(),
            source,
        })?;
        json.push(b'\n');

        let mut temp_file = NamedTempFile::new_in(parent).map_err(|e| StateError::io(parent, e))?;
        temp_file
            .write_all(&json)
            .and_then(|_| temp_file.as_file().sync_all())
            .map_err(|e| StateError::io(temp_file.path(), e))?;
        debug!("Staged config at {:?}", temp_file.path());
        Ok(temp_file)
    }

    /// Overwrite the telemetry keys, leaving every other setting untouched.
    /// A malformed file is an error here: merging needs its contents.
    pub fn apply_identifiers(&self, ids: &IdentifierSet) -> StateResult<()> {
        let mut doc = self.read()?.unwrap_or_default();
        for (key, value) in ids.telemetry_entries() {
            doc.insert(key.to_string(), Value::String(value.to_string()));
        }
        self.write(&doc)
    }
}
