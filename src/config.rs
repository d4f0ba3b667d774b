//! Batch configuration
//!
//! The sync and combine commands read a JSON file naming the platform project and
//! the experiment-store exports:
//!
//! ```json
//! {
//!   "platform_root": "/data/platform",
//!   "group": "emocog",
//!   "project": "2023_HeartBEAM",
//!   "store": {
//!     "users_file": "/data/export/users.json",
//!     "experiments_file": "/data/export/experiment-data.json",
//!     "page_size": 100
//!   }
//! }
//! ```

use crate::error::CogError;
use crate::platform::LocalPlatform;
use crate::store::JsonExportStore;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable consulted when no config path is given.
pub const CONFIG_ENV_VAR: &str = "COGTAB_CONFIG";

pub const DEFAULT_GROUP: &str = "emocog";
pub const DEFAULT_PROJECT: &str = "2023_HeartBEAM";
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Location of the experiment-store table exports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub users_file: PathBuf,
    pub experiments_file: PathBuf,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

/// Settings for the sync and platform-backed combine commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub platform_root: PathBuf,
    #[serde(default = "default_group")]
    pub group: String,
    #[serde(default = "default_project")]
    pub project: String,
    pub store: StoreConfig,
}

fn default_group() -> String {
    DEFAULT_GROUP.to_string()
}

fn default_project() -> String {
    DEFAULT_PROJECT.to_string()
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

impl SyncConfig {
    /// Read and validate a config file. Relative paths inside it resolve against the file's directory.
    pub fn load(path: &Path) -> Result<Self, CogError> {
        let text = fs::read_to_string(path).map_err(|e| CogError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let mut config: SyncConfig = serde_json::from_str(&text).map_err(|e| CogError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        config.validate(path)?;
        Ok(config)
    }

    /// Pick the config path: the explicit one, else `$COGTAB_CONFIG`.
    pub fn resolve_path(explicit: Option<PathBuf>) -> Result<PathBuf, CogError> {
        explicit
            .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from))
            .ok_or_else(|| CogError::Config {
                path: PathBuf::new(),
                message: format!("no config file given and {} is not set", CONFIG_ENV_VAR),
            })
    }

    fn rebase(&mut self, base: &Path) {
        for path in [
            &mut self.platform_root,
            &mut self.store.users_file,
            &mut self.store.experiments_file,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    fn validate(&self, path: &Path) -> Result<(), CogError> {
        let invalid = |message: &str| CogError::Config {
            path: path.to_path_buf(),
            message: message.to_string(),
        };
        if self.group.trim().is_empty() || self.project.trim().is_empty() {
            return Err(invalid("group and project must not be empty"));
        }
        if self.store.page_size == 0 {
            return Err(invalid("store.page_size must be at least 1"));
        }
        Ok(())
    }

    pub fn platform(&self) -> Result<LocalPlatform, CogError> {
        LocalPlatform::open_project(&self.platform_root, &self.group, &self.project)
    }

    pub fn store(&self) -> Result<JsonExportStore, CogError> {
        JsonExportStore::load(
            &self.store.users_file,
            &self.store.experiments_file,
            self.store.page_size,
        )
    }
}
