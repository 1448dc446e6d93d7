//! File-backed connector preference.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use eerc_common::ConnectorPreferenceStore;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Serialize, Deserialize)]
struct StoredPreference {
    connector_id: String,
}

/// Keeps the last connector id in a small JSON file.
///
/// Best effort: I/O and parse failures are logged and treated as "nothing
/// remembered".
#[derive(Debug, Clone)]
pub struct FilePreferenceStore {
    path: PathBuf,
}

impl FilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConnectorPreferenceStore for FilePreferenceStore {
    fn load(&self) -> Option<String> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "could not read connector preference");
                return None;
            }
        };
        match serde_json::from_str::<StoredPreference>(&raw) {
            Ok(stored) if !stored.connector_id.is_empty() => Some(stored.connector_id),
            Ok(_) => None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring corrupt connector preference");
                None
            }
        }
    }

    fn save(&self, connector_id: &str) {
        let stored = StoredPreference {
            connector_id: connector_id.to_string(),
        };
        let result = self
            .path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|()| {
                let json = serde_json::to_vec_pretty(&stored)?;
                fs::write(&self.path, json)
            });
        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "could not save connector preference");
        }
    }

    fn clear(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "could not clear connector preference")
            }
        }
    }
}
