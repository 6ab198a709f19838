// src/state.rs

//! Persistence of the `ProjectContext`.
//!
//! The store follows a single-writer model: one invocation loads the record,
//! runs its action and writes it back. There is no file locking, so two
//! concurrent invocations against the same project may overwrite each other's
//! state. This is unsupported rather than tolerated.

use crate::models::ProjectContext;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("No project has been set up here ({path}). Run `pipewright setup <preset>` first.")]
    NotInitialized { path: String },
    #[error("Filesystem Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed project context '{path}': {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Error with temporary file: {0}")]
    TempFile(#[from] tempfile::PersistError),
}

/// Where completed lifecycle progress is recorded.
pub trait ContextStore {
    fn save(&mut self, ctx: &ProjectContext) -> Result<(), ContextError>;
}

/// Tracks whether the record changed since it was last written.
enum Journal {
    /// Nothing has been written or loaded yet.
    Empty,
    /// The record as it currently exists on disk.
    Written(ProjectContext),
}

/// Stores the context as pretty-printed JSON, replacing the file atomically.
pub struct JsonContextStore {
    path: PathBuf,
    journal: Journal,
}

impl JsonContextStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            journal: Journal::Empty,
        }
    }

    /// Loads the record, remembering it so an unchanged save is skipped.
    pub fn load(&mut self) -> Result<ProjectContext, ContextError> {
        let ctx = load_context(&self.path)?;
        self.journal = Journal::Written(ctx.clone());
        Ok(ctx)
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn needs_saving(&self, ctx: &ProjectContext) -> bool {
        match &self.journal {
            Journal::Empty => true,
            Journal::Written(on_disk) => on_disk != ctx,
        }
    }
}

impl ContextStore for JsonContextStore {
    fn save(&mut self, ctx: &ProjectContext) -> Result<(), ContextError> {
        if !self.needs_saving(ctx) {
            log::trace!("Project context unchanged, skipping write.");
            return Ok(());
        }
        save_context(&self.path, ctx)?;
        self.journal = Journal::Written(ctx.clone());
        Ok(())
    }
}

/// Reads a context file.
pub fn load_context(path: &Path) -> Result<ProjectContext, ContextError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ContextError::NotInitialized {
                path: path.display().to_string(),
            });
        }
        Err(e) => return Err(e.into()),
    };
    serde_json::from_str(&content).map_err(|source| ContextError::Json {
        path: path.display().to_string(),
        source,
    })
}

/// Writes a context file through a temporary sibling so a crash never leaves
/// a truncated record behind.
pub fn save_context(path: &Path, ctx: &ProjectContext) -> Result<(), ContextError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let json = serde_json::to_string_pretty(ctx).map_err(|source| ContextError::Json {
        path: path.display().to_string(),
        source,
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(json.as_bytes())?;
    temp.write_all(b"\n")?;
    temp.flush()?;
    temp.persist(path)?;
    log::debug!("Project context saved to {} (stage: {}).", path.display(), ctx.stage);
    Ok(())
}

/// An in-memory store that records every save. Used by lifecycle tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub saved: Vec<ProjectContext>,
}

#[cfg(test)]
impl ContextStore for MemoryStore {
    fn save(&mut self, ctx: &ProjectContext) -> Result<(), ContextError> {
        self.saved.push(ctx.clone());
        Ok(())
    }
}
