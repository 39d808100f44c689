//! I/O boundary traits for testability
//!
//! Persistence is an external collaborator: services only see these ports,
//! so they can run against the in-memory store, the file-backed store, or a
//! database adapter.

use std::io;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::domain::{
    Branching, ContentNode, Course, Lesson, Profile, ProfileBranchingChoice, ProfileLessonDone,
    Resources, Scope,
};

/// Filesystem abstraction for testability.
pub trait FileSystem: Send + Sync {
    /// Read file contents to string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Write string content to file.
    fn write(&self, path: &Path, content: &str) -> io::Result<()>;

    /// Check if path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Check if path is a directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Create directory and all parent directories.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Rename/move a file.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Create parent directories if needed.
    fn ensure_parent(&self, path: &Path) -> io::Result<()>;
}

/// Authored content, read-only to the traversal engine.
pub trait ContentRepository: Send + Sync {
    fn course(&self, id: &str) -> Option<Arc<Course>>;

    fn courses(&self) -> Vec<Arc<Course>>;

    /// Content node with identity `id` inside `scope`.
    fn find(&self, scope: &Scope, id: &str) -> Option<ContentNode>;

    /// Lesson with identity `id` in any scope.
    fn find_lesson(&self, id: &str) -> Option<Arc<Lesson>>;

    /// Branching with identity `id` in any scope.
    fn find_branching(&self, id: &str) -> Option<Arc<Branching>>;
}

pub trait ProfileRepository: Send + Sync {
    fn profile(&self, id: &str) -> Option<Profile>;

    fn profiles(&self) -> Vec<Profile>;
}

/// Resource balances of profiles.
pub trait ResourceLedger: Send + Sync {
    fn balance(&self, profile: &str) -> Resources;
}

/// Progress changes that must land together or not at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressBatch {
    pub profile: String,
    pub debit: Resources,
    pub choice: Option<ProfileBranchingChoice>,
    pub lesson_done: Option<ProfileLessonDone>,
}

impl ProgressBatch {
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            debit: Resources::ZERO,
            choice: None,
            lesson_done: None,
        }
    }

    pub fn debit(mut self, amount: Resources) -> Self {
        self.debit = amount;
        self
    }

    pub fn choice(mut self, choice: ProfileBranchingChoice) -> Self {
        self.choice = Some(choice);
        self
    }

    pub fn lesson_done(mut self, done: ProfileLessonDone) -> Self {
        self.lesson_done = Some(done);
        self
    }
}

/// Why a batch was not applied. Nothing of the batch is visible afterwards.
#[derive(Error, Debug)]
pub enum CommitError {
    #[error("insufficient resources: need {required}, have {available}")]
    Insufficient {
        required: Resources,
        available: Resources,
    },

    #[error("duplicate progress record: {0}")]
    Duplicate(String),

    #[error("persisting progress failed: {0}")]
    Persist(#[from] io::Error),
}

/// Append-only progress log.
pub trait ProgressRepository: Send + Sync {
    fn choice(&self, profile: &str, branching: &str) -> Option<ProfileBranchingChoice>;

    fn choices(&self, profile: &str) -> Vec<ProfileBranchingChoice>;

    fn lessons_done(&self, profile: &str) -> Vec<ProfileLessonDone>;

    /// Apply the batch atomically together with its debit.
    fn commit(&self, batch: ProgressBatch) -> Result<(), CommitError>;
}

// ============================================================
// REAL IMPLEMENTATIONS
// ============================================================

/// Real filesystem implementation.
#[derive(Debug, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn write(&self, path: &Path, content: &str) -> io::Result<()> {
        std::fs::write(path, content)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn ensure_parent(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                self.create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}
