//! Local-first mirror of the in-memory match.

pub mod migrations;

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use self::migrations::{CURRENT_VERSION, MigrationError, migrate};
use crate::state::match_state::{Configuration, MatchState};

/// Failures of the local snapshot store.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Reading or writing the backing file failed.
    #[error("snapshot I/O failed on `{path}`")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The match could not be encoded.
    #[error("failed to encode snapshot")]
    Encode(#[source] serde_json::Error),
    /// The stored blob is not valid JSON or not a valid match.
    #[error("failed to decode snapshot")]
    Decode(#[source] serde_json::Error),
    /// The stored blob could not be upgraded.
    #[error("failed to migrate snapshot")]
    Migration(#[from] MigrationError),
}

/// Durable single-value slot holding the serialized snapshot.
pub trait SnapshotSlot: Send + Sync {
    /// Current contents, `None` when nothing was written yet.
    fn read(&self) -> Result<Option<String>, SnapshotError>;
    /// Replace the contents.
    fn write(&self, payload: &str) -> Result<(), SnapshotError>;
    /// Remove the contents.
    fn clear(&self) -> Result<(), SnapshotError>;
}

/// Slot backed by a JSON file, replaced atomically through a temp file.
pub struct FileSnapshotSlot {
    path: PathBuf,
}

impl FileSnapshotSlot {
    /// Slot stored at `path`; parent directories are created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn io_error(path: &Path) -> impl FnOnce(io::Error) -> SnapshotError + '_ {
        move |source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl SnapshotSlot for FileSnapshotSlot {
    fn read(&self) -> Result<Option<String>, SnapshotError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Self::io_error(&self.path)(err)),
        }
    }

    fn write(&self, payload: &str) -> Result<(), SnapshotError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(Self::io_error(parent))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, payload).map_err(Self::io_error(&tmp))?;
        fs::rename(&tmp, &self.path).map_err(Self::io_error(&self.path))
    }

    fn clear(&self) -> Result<(), SnapshotError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Self::io_error(&self.path)(err)),
        }
    }
}

/// Volatile slot, used by tests and when no snapshot path is configured.
#[derive(Default)]
pub struct MemorySnapshotSlot {
    contents: Mutex<Option<String>>,
}

impl MemorySnapshotSlot {
    /// Slot pre-filled with `payload`.
    pub fn with_contents(payload: impl Into<String>) -> Self {
        Self {
            contents: Mutex::new(Some(payload.into())),
        }
    }
}

impl SnapshotSlot for MemorySnapshotSlot {
    fn read(&self) -> Result<Option<String>, SnapshotError> {
        Ok(self
            .contents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn write(&self, payload: &str) -> Result<(), SnapshotError> {
        *self.contents.lock().unwrap_or_else(PoisonError::into_inner) = Some(payload.to_owned());
        Ok(())
    }

    fn clear(&self) -> Result<(), SnapshotError> {
        self.contents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    version: u64,
    #[serde(rename = "match")]
    state: &'a MatchState,
}

/// Versioned snapshot store on top of a [`SnapshotSlot`].
#[derive(Clone)]
pub struct LocalSnapshotStore {
    slot: Arc<dyn SnapshotSlot>,
    defaults: Configuration,
}

impl LocalSnapshotStore {
    /// Wrap a slot; `defaults` fills streak options missing from legacy blobs.
    pub fn new(slot: Arc<dyn SnapshotSlot>, defaults: Configuration) -> Self {
        Self { slot, defaults }
    }

    /// Mirror the full match, tagged with the current schema version.
    pub fn save(&self, state: &MatchState) -> Result<(), SnapshotError> {
        let payload = serde_json::to_string(&Envelope {
            version: CURRENT_VERSION,
            state,
        })
        .map_err(SnapshotError::Encode)?;
        self.slot.write(&payload)?;
        debug!(bytes = payload.len(), "snapshot written");
        Ok(())
    }

    /// Read and upgrade the stored match, if any.
    pub fn load(&self) -> Result<Option<MatchState>, SnapshotError> {
        let Some(raw) = self.slot.read()? else {
            return Ok(None);
        };
        let value: Value = serde_json::from_str(&raw).map_err(SnapshotError::Decode)?;
        let payload = migrate(value, &self.defaults)?;
        let state = serde_json::from_value(payload).map_err(SnapshotError::Decode)?;
        Ok(Some(state))
    }

    /// Forget the stored match.
    pub fn clear(&self) -> Result<(), SnapshotError> {
        self.slot.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::match_state::{Actor, MatchSetup, ModeKind, StatKind};

    fn store(slot: MemorySnapshotSlot) -> LocalSnapshotStore {
        LocalSnapshotStore::new(Arc::new(slot), Configuration::default())
    }

    fn recorded_match() -> MatchState {
        let mut state = MatchState::new(MatchSetup {
            roster: vec![4, 7],
            names: Default::default(),
            mode: ModeKind::TallySheet,
            config: Configuration::default(),
        });
        state.record_counter(Actor::Player(7), StatKind::Assists, 1);
        state
    }

    #[test]
    fn saved_match_is_restored_with_its_log() {
        let snapshots = store(MemorySnapshotSlot::default());
        let state = recorded_match();

        snapshots.save(&state).unwrap();
        let restored = snapshots.load().unwrap().unwrap();

        assert_eq!(restored, state);
        assert!(restored.can_undo());
    }

    #[test]
    fn empty_slot_loads_nothing() {
        assert!(store(MemorySnapshotSlot::default()).load().unwrap().is_none());
    }

    #[test]
    fn corrupt_blob_is_a_decode_error() {
        let snapshots = store(MemorySnapshotSlot::with_contents("{not json"));
        assert!(matches!(snapshots.load(), Err(SnapshotError::Decode(_))));
    }

    #[test]
    fn file_slot_round_trips_and_clears() {
        let dir = std::env::temp_dir().join(format!("courtside-snapshot-{}", uuid::Uuid::new_v4()));
        let slot = FileSnapshotSlot::new(dir.join("current_match.json"));

        assert!(slot.read().unwrap().is_none());
        slot.write("{\"a\":1}").unwrap();
        assert_eq!(slot.read().unwrap().as_deref(), Some("{\"a\":1}"));
        slot.clear().unwrap();
        assert!(slot.read().unwrap().is_none());

        let _ = fs::remove_dir_all(dir);
    }
}
