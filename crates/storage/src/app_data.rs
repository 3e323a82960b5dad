use crate::error::StorageError;
use crate::persist::save_json;
use directories::ProjectDirs;
use review_model::{LastSession, Preferences};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const PREFS_SCHEMA_VERSION: u32 = 1;
const SESSION_SCHEMA_VERSION: u32 = 1;

/// Per-user state kept between launches: reviewer preferences and the last
/// opened review.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PreferencesEnvelope {
    version: u32,
    preferences: Preferences,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionEnvelope {
    version: u32,
    session: LastSession,
}

impl Storage {
    pub fn from_default_project() -> Result<Self, StorageError> {
        let dirs = ProjectDirs::from("dev", "OcrReview", "OcrReview")
            .ok_or(StorageError::NoDataDirectory)?;

        Ok(Self { root: dirs.data_local_dir().to_path_buf() })
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn load_preferences(&self) -> Result<Preferences, StorageError> {
        let path = self.preferences_path();
        if !path.exists() {
            return Ok(Preferences::default());
        }

        let bytes = fs::read(path)?;
        let envelope: PreferencesEnvelope = serde_json::from_slice(&bytes)?;

        Ok(envelope.preferences)
    }

    pub fn save_preferences(&self, preferences: &Preferences) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;

        let envelope =
            PreferencesEnvelope { version: PREFS_SCHEMA_VERSION, preferences: preferences.clone() };
        save_json(&envelope, &self.preferences_path())?;
        Ok(())
    }

    /// The last recorded session. A missing, unreadable or outdated file
    /// yields `None`.
    pub fn load_session(&self) -> Option<LastSession> {
        let path = self.session_path();
        if !path.exists() {
            return None;
        }

        let envelope = fs::read(&path)
            .map_err(StorageError::from)
            .and_then(|bytes| Ok(serde_json::from_slice::<SessionEnvelope>(&bytes)?));

        match envelope {
            Ok(envelope) if envelope.version == SESSION_SCHEMA_VERSION => Some(envelope.session),
            Ok(envelope) => {
                tracing::warn!(version = envelope.version, "ignoring session from another version");
                None
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), "ignoring unreadable session: {err}");
                None
            }
        }
    }

    pub fn save_session(&self, session: &LastSession) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;

        let envelope = SessionEnvelope { version: SESSION_SCHEMA_VERSION, session: session.clone() };
        save_json(&envelope, &self.session_path())?;
        Ok(())
    }

    fn preferences_path(&self) -> PathBuf {
        self.root.join("preferences.json")
    }

    fn session_path(&self) -> PathBuf {
        self.root.join("session.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use review_model::Position;

    fn session() -> LastSession {
        LastSession {
            pdf: PathBuf::from("/data/NEET_2024.pdf"),
            bbox_json: PathBuf::from("/data/NEET_2024_BIO_bbox.json"),
            ocr_json: PathBuf::from("/data/NEET_2024_BIO.json"),
            output: PathBuf::from("/data/NEET_2024_BIO.corrected.json"),
            position: Position::new(3, 1),
        }
    }

    #[test]
    fn preferences_round_trip() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = Storage::with_root(temp.path().join("nested"));

        let prefs = Preferences { crop_padding: 4.0, crop_zoom: 3.0, show_overlays: false };

        store.save_preferences(&prefs).expect("save should succeed");
        let loaded = store.load_preferences().expect("load should succeed");

        assert_eq!(loaded, prefs);
    }

    #[test]
    fn load_defaults_when_file_absent() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = Storage::with_root(temp.path());

        let loaded = store.load_preferences().expect("load should succeed");
        assert_eq!(loaded, Preferences::default());
        assert_eq!(store.load_session(), None);
    }

    #[test]
    fn session_round_trip() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = Storage::with_root(temp.path());

        store.save_session(&session()).expect("save should succeed");
        assert_eq!(store.load_session(), Some(session()));
    }

    #[test]
    fn corrupt_session_is_ignored() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = Storage::with_root(temp.path());
        fs::write(temp.path().join("session.json"), "{ not json").expect("write");

        assert_eq!(store.load_session(), None);
    }

    #[test]
    fn session_from_other_version_is_ignored() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = Storage::with_root(temp.path());
        let envelope = SessionEnvelope { version: 99, session: session() };
        fs::write(
            temp.path().join("session.json"),
            serde_json::to_vec(&envelope).expect("serialize"),
        )
        .expect("write");

        assert_eq!(store.load_session(), None);
    }
}
