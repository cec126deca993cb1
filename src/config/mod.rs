//! Configuration: the `script.commands` settings section and where it lives

mod loader;
mod settings;

pub use loader::{SECTION, SettingsFile};
pub use settings::{ButtonSettings, Configuration, QuickSettings, ScriptCommand};
