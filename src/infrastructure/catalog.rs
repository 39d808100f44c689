//! TOML catalog and progress snapshot files
//!
//! A catalog is either a single TOML file or a directory of `*.toml` files,
//! each holding `[[courses]]` tables. Progress lives in one snapshot file
//! that is rewritten after every committed batch.

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use walkdir::WalkDir;

use crate::domain::{
    Branching, Course, Lesson, Profile, ProfileBranchingChoice, ProfileLessonDone, Quest,
    Resources,
};
use crate::infrastructure::error::{InfraError, InfraResult};
use crate::infrastructure::traits::FileSystem;

/// Authored content of one or more courses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub courses: Vec<Course>,
}

impl Catalog {
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn merge(&mut self, other: Catalog) {
        self.courses.extend(other.courses);
    }

    /// Identities must be unique across the whole catalog.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        let mut check = |id: &str| {
            if seen.insert(id.to_string()) {
                Ok(())
            } else {
                Err(format!("duplicate identity: {id}"))
            }
        };

        for course in &self.courses {
            check(&course.id)?;
            collect_ids(&course.lessons, &course.quests, &course.branchings, &mut check)?;
        }
        Ok(())
    }
}

fn collect_ids(
    lessons: &[Lesson],
    quests: &[Quest],
    branchings: &[Branching],
    check: &mut impl FnMut(&str) -> Result<(), String>,
) -> Result<(), String> {
    for lesson in lessons {
        check(&lesson.id)?;
    }
    for branching in branchings {
        check(&branching.id)?;
    }
    for quest in quests {
        check(&quest.id)?;
        collect_ids(&quest.lessons, &quest.quests, &quest.branchings, check)?;
    }
    Ok(())
}

/// Profiles, balances and the progress log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    #[serde(default)]
    pub profiles: Vec<Profile>,
    #[serde(default)]
    pub balances: BTreeMap<String, Resources>,
    #[serde(default)]
    pub choices: Vec<ProfileBranchingChoice>,
    #[serde(default)]
    pub lessons_done: Vec<ProfileLessonDone>,
}

impl ProgressSnapshot {
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Load a catalog file, or every `*.toml` file below a catalog directory.
#[instrument(level = "debug", skip(fs))]
pub fn load_catalog(fs: &dyn FileSystem, path: &Path) -> InfraResult<Catalog> {
    if !fs.exists(path) {
        return Err(InfraError::Catalog {
            path: path.to_path_buf(),
            message: "not found".to_string(),
        });
    }

    let files: Vec<PathBuf> = if fs.is_dir(path) {
        WalkDir::new(path)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
            .collect()
    } else {
        vec![path.to_path_buf()]
    };

    let mut catalog = Catalog::default();
    for file in &files {
        let content = fs
            .read_to_string(file)
            .map_err(|e| InfraError::io(format!("read catalog {}", file.display()), e))?;
        let part = Catalog::parse(&content).map_err(|e| InfraError::Catalog {
            path: file.clone(),
            message: e.to_string(),
        })?;
        catalog.merge(part);
    }

    catalog.validate().map_err(|message| InfraError::Catalog {
        path: path.to_path_buf(),
        message,
    })?;
    debug!(
        "loaded {} course(s) from {} file(s)",
        catalog.courses.len(),
        files.len()
    );
    Ok(catalog)
}

/// Load a progress snapshot; a missing file is an empty snapshot.
#[instrument(level = "debug", skip(fs))]
pub fn load_progress(fs: &dyn FileSystem, path: &Path) -> InfraResult<ProgressSnapshot> {
    if !fs.exists(path) {
        debug!("no progress file at {}", path.display());
        return Ok(ProgressSnapshot::default());
    }
    let content = fs
        .read_to_string(path)
        .map_err(|e| InfraError::io(format!("read progress {}", path.display()), e))?;
    ProgressSnapshot::parse(&content).map_err(|e| InfraError::Catalog {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Destination a store rewrites after each commit.
#[derive(Clone)]
pub struct SnapshotFile {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(fs: Arc<dyn FileSystem>, path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write to a sibling temp file, then rename over the snapshot.
    pub fn save(&self, snapshot: &ProgressSnapshot) -> io::Result<()> {
        let content = snapshot
            .to_toml()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        self.fs.ensure_parent(&self.path)?;
        let tmp = self.path.with_extension("toml.tmp");
        self.fs.write(&tmp, &content)?;
        self.fs.rename(&tmp, &self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_duplicate_identity_when_validating_then_errors() {
        let catalog = Catalog::parse(
            r#"
[[courses]]
id = "c1"
entry = "A"

[[courses.lessons]]
id = "A"

[[courses.quests]]
id = "Q"
entry = "A"

[[courses.quests.lessons]]
id = "A"
"#,
        )
        .expect("parse catalog");

        assert_eq!(catalog.validate(), Err("duplicate identity: A".to_string()));
    }

    #[test]
    fn given_snapshot_when_serializing_then_parses_back() {
        let mut snapshot = ProgressSnapshot::default();
        snapshot
            .balances
            .insert("p1".into(), Resources::new(3, 40, 1));

        let text = snapshot.to_toml().expect("serialize");
        let parsed = ProgressSnapshot::parse(&text).expect("parse");

        assert_eq!(parsed, snapshot);
    }
}
