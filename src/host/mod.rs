//! The editor host boundary
//!
//! Everything the controller needs from the editor goes through [`Host`]:
//! command registration and dispatch, status bar items, prompts, the output
//! channel, HTML previews, configuration and key-value stores.

mod memento;
mod registry;
mod terminal;
mod watcher;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

pub use memento::Memento;
pub use registry::{CommandRegistration, CommandRegistry};
pub use terminal::TerminalHost;
pub use watcher::{FileEvent, FileEventKind, FileWatcher};

/// Eventual result of a dispatched command
pub type CommandFuture = BoxFuture<'static, Result<Value>>;

/// Body of a registered command
pub type CommandHandler = Arc<dyn Fn(Vec<Value>) -> CommandFuture + Send + Sync>;

/// A handle that releases a host resource
pub trait Disposable: Send {
    fn dispose(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusBarAlignment {
    Left,
    Right,
}

/// A status bar affordance
pub trait StatusBarItem: Disposable {
    fn set_text(&mut self, text: &str);
    fn set_tooltip(&mut self, tooltip: &str);
    fn set_color(&mut self, color: &str);
    fn set_command(&mut self, command: &str);
    fn show(&mut self);
    fn hide(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuickPickItem {
    pub label: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputBoxOptions {
    pub placeholder: String,
    pub prompt: Option<String>,
    pub value: Option<String>,
}

/// An open text document
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocument {
    pub file_name: PathBuf,
    pub is_dirty: bool,
}

impl TextDocument {
    pub fn new(file_name: impl Into<PathBuf>) -> Self {
        Self {
            file_name: file_name.into(),
            is_dirty: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Position {
    pub line: usize,
    pub character: usize,
}

/// One edit inside a document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextChange {
    pub start: Position,
    pub end: Position,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentChangeEvent {
    pub document: TextDocument,
    pub content_changes: Vec<TextChange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SaveReason {
    Manual,
    AfterDelay,
    FocusOut,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentWillSaveEvent {
    pub document: TextDocument,
    pub reason: SaveReason,
}

/// Capabilities provided by the editor
pub trait Host: Send + Sync {
    /// Bind `id` to `handler`; a later registration of the same id wins
    fn register_command(&self, id: &str, handler: CommandHandler) -> Result<Box<dyn Disposable>>;

    /// Dispatch a command by id. `Err` means dispatch failed before any
    /// deferred result existed.
    fn execute_command(&self, id: &str, args: Vec<Value>) -> Result<CommandFuture>;

    /// Ids of every registered command
    fn get_commands(&self, filter_internal: bool) -> BoxFuture<'static, Result<Vec<String>>>;

    fn create_status_bar_item(
        &self,
        alignment: StatusBarAlignment,
        priority: Option<f64>,
    ) -> Result<Box<dyn StatusBarItem>>;

    /// Index of the picked item, `None` when dismissed
    fn show_quick_pick(
        &self,
        items: Vec<QuickPickItem>,
        placeholder: String,
    ) -> BoxFuture<'static, Result<Option<usize>>>;

    fn show_input_box(&self, options: InputBoxOptions) -> BoxFuture<'static, Result<Option<String>>>;

    fn show_message(&self, level: MessageLevel, text: &str);

    fn append_output(&self, line: &str);

    /// Reveal the output channel
    fn show_output(&self);

    fn preview_html(&self, title: &str, html: &str) -> BoxFuture<'static, Result<()>>;

    /// Raw settings section
    fn configuration(&self, section: &str) -> Result<Value>;

    fn global_memento(&self) -> &Memento;

    fn workspace_memento(&self) -> &Memento;

    fn workspace_root(&self) -> &Path;
}

/// Timestamped writer onto the host output channel
#[derive(Clone)]
pub struct Output {
    host: Arc<dyn Host>,
}

impl Output {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self { host }
    }

    pub fn log(&self, msg: impl fmt::Display) {
        log_line(self.host.as_ref(), msg);
    }
}

/// Write a timestamped line to the output channel of `host`
pub fn log_line(host: &dyn Host, msg: impl fmt::Display) {
    let now = Local::now();
    host.append_output(&format!("[{}] {}", now.format("%Y-%m-%d %H:%M:%S"), msg));
}

/// Run a dispatch, turning a failed dispatch into a failed future
pub fn dispatch(host: &dyn Host, id: &str, args: Vec<Value>) -> CommandFuture {
    match host.execute_command(id, args) {
        Ok(future) => future,
        Err(e) => Box::pin(futures::future::ready(Err(e))),
    }
}
