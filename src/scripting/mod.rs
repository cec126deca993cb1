//! Scripting module - Rhai runtime behind script commands
//!
//! A script command points at a Rhai file that defines `fn execute(ctx)`.
//! Helpers every script can reach live under the `sc` namespace:
//! - `sc::markdown(text)` - markdown to HTML
//! - `sc::hex_view(data)` - hex dump of a string or blob
//! - `sc::html_encode(text)` - escape HTML special characters
//! - `sc::sleep(ms)`, `sc::now()`

pub mod api;
mod engine;
mod turn;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::controller::InvocationContext;
use crate::error::Result;

pub use engine::{QuickScope, Sandbox, ScriptEngine};

/// A loaded script module
pub trait ScriptModule: Send + Sync {
    /// Whether the module defines an executor
    fn has_execute(&self) -> bool;

    /// Run the executor and settle its result
    fn execute(&self, ctx: InvocationContext) -> BoxFuture<'static, Result<Value>>;
}

/// Turns a configured script path into a module
pub trait ModuleLoader: Send + Sync {
    /// Load `script`; `cached` allows reusing an earlier compilation
    fn load(&self, script: &str, cached: bool) -> Result<Arc<dyn ScriptModule>>;
}

/// Absolute path of a configured script, relative paths start at the workspace root
pub fn script_path(root: &Path, script: &str) -> PathBuf {
    let script = Path::new(script.trim());
    if script.is_absolute() {
        script.to_path_buf()
    } else {
        root.join(script)
    }
}

/// Directory a script's imports resolve against
pub fn script_dir(root: &Path, script: &str) -> PathBuf {
    script_path(root, script)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_scripts_start_at_root() {
        let root = Path::new("/work");
        assert_eq!(script_path(root, " ./tools/a.rhai "), PathBuf::from("/work/./tools/a.rhai"));
        assert_eq!(script_path(root, "/abs/b.rhai"), PathBuf::from("/abs/b.rhai"));
        assert_eq!(script_dir(root, "tools/a.rhai"), PathBuf::from("/work/tools"));
    }
}
