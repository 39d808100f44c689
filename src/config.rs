//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/coursemap/coursemap.toml`
//! 3. Local config: `<dir>/.coursemap.toml` (current directory by default)
//! 4. Environment variables: `COURSEMAP_*` prefix, `__` separates sections

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::ApplicationError;
use crate::domain::{CyclePolicy, TraversalOptions};

/// Traversal limits and cycle handling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TraversalConfig {
    /// Deepest quest nesting followed before failing
    pub max_quest_depth: usize,
    /// What to do when a map walk revisits a node
    pub cycle_policy: CyclePolicy,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        let options = TraversalOptions::default();
        Self {
            max_quest_depth: options.max_quest_depth,
            cycle_policy: options.cycle_policy,
        }
    }
}

/// Raw traversal config; `None` means "not specified, inherit".
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawTraversalConfig {
    pub max_quest_depth: Option<usize>,
    pub cycle_policy: Option<CyclePolicy>,
}

/// Raw settings for intermediate parsing.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub data_dir: Option<PathBuf>,
    pub catalog: Option<PathBuf>,
    pub progress: Option<PathBuf>,
    pub default_course: Option<String>,
    pub traversal: RawTraversalConfig,
}

/// Unified configuration for coursemap.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Base directory for catalog and progress (default: ~/.coursemap)
    pub data_dir: PathBuf,
    /// Catalog file or directory (default: data_dir/catalog)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog: Option<PathBuf>,
    /// Progress snapshot file (default: data_dir/progress.toml)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<PathBuf>,
    /// Course used when a command omits `--course`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_course: Option<String>,
    pub traversal: TraversalConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            catalog: None,
            progress: None,
            default_course: None,
            traversal: TraversalConfig::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".coursemap"))
        .unwrap_or_else(|| PathBuf::from("~/.coursemap"))
}

/// Get the XDG config directory for coursemap.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "coursemap").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("coursemap.toml"))
}

/// Get the path to the local config file in `dir`.
pub fn local_config_path(dir: &Path) -> PathBuf {
    dir.join(".coursemap.toml")
}

fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

fn expand(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match shellexpand::full(raw.as_ref()) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => path.to_path_buf(),
    }
}

fn parse_cycle_policy(value: &str) -> Result<CyclePolicy, ApplicationError> {
    match value.to_ascii_lowercase().as_str() {
        "error" => Ok(CyclePolicy::Error),
        "truncate" => Ok(CyclePolicy::Truncate),
        other => Err(ApplicationError::Config {
            message: format!("cycle_policy must be 'error' or 'truncate', got '{other}'"),
        }),
    }
}

impl Settings {
    /// Catalog file or directory.
    pub fn catalog_path(&self) -> PathBuf {
        self.catalog
            .clone()
            .unwrap_or_else(|| self.data_dir.join("catalog"))
    }

    /// Progress snapshot file.
    pub fn progress_path(&self) -> PathBuf {
        self.progress
            .clone()
            .unwrap_or_else(|| self.data_dir.join("progress.toml"))
    }

    pub fn traversal_options(&self) -> TraversalOptions {
        TraversalOptions {
            max_quest_depth: self.traversal.max_quest_depth,
            cycle_policy: self.traversal.cycle_policy,
        }
    }

    /// Expand `~`, `$VAR` and `${VAR}` in path fields.
    fn expand_paths(&mut self) {
        self.data_dir = expand(&self.data_dir);
        self.catalog = self.catalog.as_deref().map(expand);
        self.progress = self.progress.as_deref().map(expand);
    }

    /// Overlay wins wherever it specifies a value.
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            data_dir: overlay
                .data_dir
                .clone()
                .unwrap_or_else(|| self.data_dir.clone()),
            catalog: overlay.catalog.clone().or_else(|| self.catalog.clone()),
            progress: overlay.progress.clone().or_else(|| self.progress.clone()),
            default_course: overlay
                .default_course
                .clone()
                .or_else(|| self.default_course.clone()),
            traversal: TraversalConfig {
                max_quest_depth: overlay
                    .traversal
                    .max_quest_depth
                    .unwrap_or(self.traversal.max_quest_depth),
                cycle_policy: overlay
                    .traversal
                    .cycle_policy
                    .unwrap_or(self.traversal.cycle_policy),
            },
        }
    }

    /// Load settings with layered precedence.
    ///
    /// `local_dir` is searched for `.coursemap.toml`; pass `None` to skip
    /// the local layer.
    pub fn load(local_dir: Option<&Path>) -> Result<Self, ApplicationError> {
        let mut current = Self::default();

        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                let raw = load_raw_settings(&global_path)?;
                current = current.merge_with(&raw);
            }
        }

        if let Some(dir) = local_dir {
            let local_path = local_config_path(dir);
            if local_path.exists() {
                let raw = load_raw_settings(&local_path)?;
                current = current.merge_with(&raw);
            }
        }

        current = Self::apply_env_overrides(current)?;
        current.expand_paths();

        if current.traversal.max_quest_depth == 0 {
            return Err(ApplicationError::Config {
                message: "traversal.max_quest_depth must be at least 1".to_string(),
            });
        }
        Ok(current)
    }

    /// Apply COURSEMAP_* environment variables as explicit overrides.
    fn apply_env_overrides(mut settings: Self) -> Result<Self, ApplicationError> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix("COURSEMAP")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(config_err)?;

        if let Ok(val) = config.get_string("data_dir") {
            settings.data_dir = PathBuf::from(val);
        }
        if let Ok(val) = config.get_string("catalog") {
            settings.catalog = Some(PathBuf::from(val));
        }
        if let Ok(val) = config.get_string("progress") {
            settings.progress = Some(PathBuf::from(val));
        }
        if let Ok(val) = config.get_string("default_course") {
            settings.default_course = Some(val);
        }
        if let Ok(val) = config.get_string("traversal.max_quest_depth") {
            settings.traversal.max_quest_depth =
                val.parse().map_err(|_| ApplicationError::Config {
                    message: format!("traversal.max_quest_depth: not a number: {val}"),
                })?;
        }
        if let Ok(val) = config.get_string("traversal.cycle_policy") {
            settings.traversal.cycle_policy = parse_cycle_policy(&val)?;
        }

        Ok(settings)
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# coursemap configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/coursemap/coursemap.toml
#   Local:  ./.coursemap.toml
#   Env:    COURSEMAP_* environment variables (COURSEMAP_TRAVERSAL__CYCLE_POLICY=truncate)

# Base directory for catalog and progress
# data_dir = "~/.coursemap"

# Catalog: a TOML file or a directory of TOML files (default: data_dir/catalog)
# catalog = "~/.coursemap/catalog"

# Progress snapshot (default: data_dir/progress.toml)
# progress = "~/.coursemap/progress.toml"

# Course used when --course is omitted
# default_course = "intro"

[traversal]
# Deepest quest nesting before a map walk fails
# max_quest_depth = 8

# Revisited node in a map walk: "error" fails, "truncate" stops the walk
# cycle_policy = "error"
"#
        .to_string()
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}
