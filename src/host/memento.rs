use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Key-value store that survives sessions
pub struct Memento {
    path: Option<PathBuf>,
    values: RwLock<Map<String, Value>>,
}

impl Memento {
    /// A store that is never written to disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            values: RwLock::new(Map::new()),
        }
    }

    /// Load a store from disk; unreadable files start empty
    pub fn load(path: PathBuf) -> Self {
        let mut values = Map::new();
        if path.exists() {
            if let Ok(content) = fs::read_to_string(&path) {
                if let Ok(Value::Object(map)) = serde_json::from_str(&content) {
                    values = map;
                }
            }
        }

        Self {
            path: Some(path),
            values: RwLock::new(values),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.read().ok().and_then(|v| v.get(key).cloned())
    }

    /// Store a value and write the store through to disk
    pub fn update(&self, key: &str, value: Value) -> Result<()> {
        let snapshot = {
            let mut values = self
                .values
                .write()
                .map_err(|_| Error::Host("memento is poisoned".to_string()))?;
            values.insert(key.to_string(), value);
            values.clone()
        };
        self.save(&snapshot)
    }

    fn save(&self, values: &Map<String, Value>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(values)?;
        fs::write(path, content)?;
        Ok(())
    }
}
