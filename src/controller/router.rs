//! Event routing: which configured commands does an event trigger?

use std::collections::VecDeque;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::sequencer::{ArgsFactory, CommandBatch};
use crate::config::ScriptCommand;

/// Events script commands can be bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Changed,
    New,
    Deleted,
    Saved,
    Opened,
    Closed,
    EditorChanged,
    WillSave,
    Startup,
    Close,
    ConfigChanged,
}

impl EventKind {
    pub fn name(self) -> &'static str {
        match self {
            EventKind::Changed => "Changed",
            EventKind::New => "New",
            EventKind::Deleted => "Deleted",
            EventKind::Saved => "Saved",
            EventKind::Opened => "Opened",
            EventKind::Closed => "Closed",
            EventKind::EditorChanged => "EditorChanged",
            EventKind::WillSave => "WillSave",
            EventKind::Startup => "Startup",
            EventKind::Close => "Close",
            EventKind::ConfigChanged => "ConfigChanged",
        }
    }

    /// Whether `command` is bound to this event
    pub fn matches(self, command: &ScriptCommand) -> bool {
        match self {
            EventKind::Changed => command.on_file_changed,
            EventKind::New => command.on_new_file,
            EventKind::Deleted => command.on_file_deleted,
            EventKind::Saved => command.on_saved,
            EventKind::Opened => command.on_file_opened,
            EventKind::Closed => command.on_file_closed,
            EventKind::EditorChanged => command.on_editor_changed,
            EventKind::WillSave => command.on_will_save,
            EventKind::Startup => command.on_startup,
            EventKind::Close => command.on_close,
            EventKind::ConfigChanged => command.on_config_changed,
        }
    }
}

/// The commands triggered by `kind`, keeping the order of `commands`
pub fn select(commands: &[ScriptCommand], kind: EventKind) -> CommandBatch {
    commands
        .iter()
        .filter(|c| kind.matches(c))
        .cloned()
        .collect::<VecDeque<_>>()
}

/// Absolute, lexically normalized path of an affected file
pub fn resolve_file_path(root: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };

    let mut resolved = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            other => resolved.push(other.as_os_str()),
        }
    }
    resolved
}

/// First argument of a command triggered by a file event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileChangeContext {
    pub command: String,
    pub file: PathBuf,
    pub globals: Value,
    pub options: Value,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub uri: String,
}

/// Arguments for file events: the change context followed by `extra`
pub fn file_args(file: PathBuf, kind: EventKind, globals: Value, extra: Vec<Value>) -> ArgsFactory {
    Arc::new(move |command: &ScriptCommand| {
        let ctx = FileChangeContext {
            command: command.id.clone(),
            file: file.clone(),
            globals: globals.clone(),
            options: command.options.clone().unwrap_or(Value::Null),
            kind: kind.name(),
            uri: format!("file://{}", file.display()),
        };

        let mut args = vec![serde_json::to_value(&ctx).unwrap_or(Value::Null)];
        args.extend(extra.iter().cloned());
        args
    })
}
