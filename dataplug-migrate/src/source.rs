//! Where migration scripts come from.

use crate::error::{MigrationError, MigrationResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A named collection of script resources.
pub trait ScriptSource: Send + Sync {
    fn list_resource_names(&self) -> MigrationResult<Vec<String>>;

    fn open_resource(&self, name: &str) -> MigrationResult<String>;
}

/// Scripts compiled into the binary, e.g. with `include_str!`.
#[derive(Debug, Clone, Default)]
pub struct EmbeddedScripts {
    resources: BTreeMap<String, String>,
}

impl EmbeddedScripts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_static(resources: &[(&str, &str)]) -> Self {
        Self {
            resources: resources
                .iter()
                .map(|(name, text)| (name.to_string(), text.to_string()))
                .collect(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(name, text);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.resources.insert(name.into(), text.into());
    }
}

impl ScriptSource for EmbeddedScripts {
    fn list_resource_names(&self) -> MigrationResult<Vec<String>> {
        Ok(self.resources.keys().cloned().collect())
    }

    fn open_resource(&self, name: &str) -> MigrationResult<String> {
        self.resources
            .get(name)
            .cloned()
            .ok_or_else(|| MigrationError::ResourceNotFound(name.to_string()))
    }
}

/// Scripts read from the files of one directory (not recursive).
#[derive(Debug, Clone)]
pub struct DirectoryScripts {
    dir: PathBuf,
}

impl DirectoryScripts {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ScriptSource for DirectoryScripts {
    fn list_resource_names(&self) -> MigrationResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    fn open_resource(&self, name: &str) -> MigrationResult<String> {
        let path = self.dir.join(name);
        if !path.is_file() {
            return Err(MigrationError::ResourceNotFound(name.to_string()));
        }
        Ok(std::fs::read_to_string(path)?)
    }
}
