//! Service container for dependency injection
//!
//! Wires settings, file system, store and services together.

use std::sync::Arc;

use tracing::debug;

use crate::application::services::{CourseService, ProgressService};
use crate::config::Settings;
use crate::infrastructure::catalog::{load_catalog, load_progress, SnapshotFile};
use crate::infrastructure::error::InfraResult;
use crate::infrastructure::memory::InMemoryStore;
use crate::infrastructure::traits::{FileSystem, RealFileSystem};

/// Container holding all application services.
pub struct ServiceContainer {
    /// Application settings
    pub settings: Arc<Settings>,

    /// Filesystem abstraction
    pub fs: Arc<dyn FileSystem>,

    /// Backing store of content and progress
    pub store: Arc<InMemoryStore>,

    pub courses: Arc<CourseService>,
    pub progress: ProgressService,
}

impl ServiceContainer {
    /// Load the catalog and progress snapshot named by `settings`.
    pub fn new(settings: Settings) -> InfraResult<Self> {
        Self::with_fs(settings, Arc::new(RealFileSystem))
    }

    /// Same as `new` with a custom file system.
    pub fn with_fs(settings: Settings, fs: Arc<dyn FileSystem>) -> InfraResult<Self> {
        let catalog = load_catalog(fs.as_ref(), &settings.catalog_path())?;
        let progress_path = settings.progress_path();
        let snapshot = load_progress(fs.as_ref(), &progress_path)?;
        debug!(
            "{} profile(s), progress at {}",
            snapshot.profiles.len(),
            progress_path.display()
        );

        let store = InMemoryStore::new(&catalog)
            .with_progress(snapshot)
            .persist_to(SnapshotFile::new(Arc::clone(&fs), progress_path));
        Ok(Self::with_store(settings, fs, Arc::new(store)))
    }

    /// Wire services around an existing store (for testing).
    pub fn with_store(settings: Settings, fs: Arc<dyn FileSystem>, store: Arc<InMemoryStore>) -> Self {
        let settings = Arc::new(settings);
        let courses = Arc::new(CourseService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            settings.traversal_options(),
        ));
        let progress = ProgressService::new(Arc::clone(&courses), store.clone(), store.clone());

        Self {
            settings,
            fs,
            store,
            courses,
            progress,
        }
    }
}
