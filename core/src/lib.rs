//! OpenReelio Core Library
//!
//! The timeline editing engine as a standalone library: rational-frame
//! time, the persistent relational timeline store, the in-memory
//! timeline projection, the command engine (event log, branching undo
//! tree, snapshot/replay), the standard command library, the real-time
//! audio playback engine, and the flexible time-input parser. GUI/IPC
//! surfaces are out of scope here — this crate is meant to be driven by
//! a headless caller (a CLI, a test harness, or an embedding
//! application) rather than by a desktop shell.

pub mod core;

use std::path::Path;
use std::sync::Mutex;

use crate::core::commands::{CommandEngine, CommandEngineConfig, ExecutorRegistry};
use crate::core::model::Project;
use crate::core::store::TimelineStore;
use crate::core::CoreResult;

/// A convenience facade that owns a [`TimelineStore`] and the
/// [`CommandEngine`] that drives it, with the standard command library
/// already registered. Most callers only need this; reach for
/// `core::store`/`core::commands` directly for finer control.
pub struct OpenProject {
    pub engine: CommandEngine,
}

impl OpenProject {
    /// Opens (creating if absent) a project backed by a SQLite database
    /// file at `path`.
    pub fn open(path: impl AsRef<Path>) -> CoreResult<Self> {
        let store = TimelineStore::open(path)?;
        Self::from_store(store)
    }

    /// An ephemeral, in-memory project — handy for tests and CLI
    /// scratch sessions that don't need to persist to disk.
    pub fn in_memory() -> CoreResult<Self> {
        let store = TimelineStore::in_memory()?;
        Self::from_store(store)
    }

    fn from_store(store: TimelineStore) -> CoreResult<Self> {
        let mut registry = ExecutorRegistry::new();
        crate::core::commands::register_standard_library(&mut registry);
        let engine = CommandEngine::new(store, registry, CommandEngineConfig::default());
        Ok(Self { engine })
    }

    /// Creates and persists a new [`Project`] row, returning its id.
    pub fn create_project(&mut self, name: &str) -> CoreResult<Project> {
        let project = Project {
            id: crate::core::new_id(),
            name: name.to_string(),
            settings: serde_json::json!({}),
            created_at: chrono::Utc::now(),
            modified_at: chrono::Utc::now(),
        };
        TimelineStore::insert_project(self.engine.store().connection(), &project)?;
        Ok(project)
    }
}

/// Application state shared across all commands in an embedding
/// application; analogous to a desktop shell's single-document state
/// but with no assumption about how (or whether) a GUI drives it.
pub struct AppState {
    pub project: Mutex<Option<OpenProject>>,
}

impl AppState {
    pub fn new() -> Self {
        Self { project: Mutex::new(None) }
    }

    pub fn has_project(&self) -> bool {
        self.project.lock().map(|p| p.is_some()).unwrap_or(false)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_state_starts_empty() {
        let state = AppState::new();
        assert!(!state.has_project());
    }

    #[test]
    fn in_memory_project_round_trips_create_and_lookup() {
        let mut open = OpenProject::in_memory().unwrap();
        let project = open.create_project("Test Project").unwrap();
        assert_eq!(project.name, "Test Project");
    }

    #[test]
    fn open_on_disk_persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("project.sqlite3");

        let mut open = OpenProject::open(&db_path).unwrap();
        let project = open.create_project("Disk Project").unwrap();
        drop(open);

        let reopened = OpenProject::open(&db_path).unwrap();
        let fetched = crate::core::store::TimelineStore::get_project(
            reopened.engine.store().connection(),
            &project.id,
        )
        .unwrap();
        assert_eq!(fetched.name, "Disk Project");
    }
}
