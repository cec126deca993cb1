use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{Error, Result};

/// Settings section holding the script command configuration
pub const SECTION: &str = "script.commands";

/// A workspace settings file (`.vscode/settings.json`)
pub struct SettingsFile {
    path: PathBuf,
}

impl SettingsFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// The settings file of a workspace
    pub fn for_workspace(root: &Path) -> Self {
        Self::new(root.join(".vscode").join("settings.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read one section of the settings file.
    ///
    /// Accepts both the flat (`"script.commands": {...}`) and the nested
    /// (`"script": { "commands": {...} }`) spelling. A missing file or
    /// section is `null`.
    pub fn load_section(&self, section: &str) -> Result<Value> {
        if !self.path.exists() {
            return Ok(Value::Null);
        }

        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Value::Null);
        }

        let root: Value = serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!("Failed to parse {}: {}", self.path.display(), e))
        })?;

        if let Some(value) = root.get(section) {
            return Ok(value.clone());
        }

        let nested = section
            .split('.')
            .try_fold(&root, |node, key| node.get(key));
        Ok(nested.cloned().unwrap_or(Value::Null))
    }

    /// Directory for data kept across sessions
    /// Uses the platform data dir, e.g. ~/.local/share/script-commands/
    pub fn data_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|p| p.join("script-commands"))
    }

    /// File backing the global key-value store
    pub fn global_state_file() -> Option<PathBuf> {
        Self::data_dir().map(|p| p.join("global-state.json"))
    }

    /// File backing the workspace key-value store
    pub fn workspace_state_file(root: &Path) -> PathBuf {
        root.join(".vscode").join("script-commands-state.json")
    }
}
