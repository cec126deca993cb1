//! Script command controller
//!
//! Owns everything that lives between two reloads: the registry entries,
//! the global state slot, stored HTML documents and the quick execution
//! state. Host events come in through the `on_*` hooks, are routed to the
//! matching commands and run as one batch per event.

mod context;
mod html;
mod quick;
mod registry;
mod reload;
mod router;
mod selection;
mod sequencer;

use std::path::Path;
use std::sync::{Arc, Mutex, RwLock, Weak};

use futures::FutureExt;
use serde_json::Value;

use crate::config::{Configuration, ScriptCommand};
use crate::error::{Error, Result};
use crate::host::{
    CommandHandler, Disposable, FileEvent, FileEventKind, Host, MessageLevel, Output, TextDocument,
    TextDocumentChangeEvent, TextDocumentWillSaveEvent,
};
use crate::scripting::ModuleLoader;

pub use context::{Capabilities, InvocationContext, StateSlot};
pub use html::HtmlDocuments;

use context::{ActiveCommands, Session};
use quick::QuickExecution;
use registry::RegistryEntry;
use router::EventKind;
use selection::CommandEntry;
use sequencer::{ArgsFactory, CommandBatch, Sequencer};

/// Pick one of the configured commands and run it
pub const EXECUTE_COMMAND: &str = "scriptCommands.execute";
/// Pick one of the host's commands and run it
pub const EXECUTE_HOST_COMMAND: &str = "scriptCommands.executeHostCommand";
/// Render a stored HTML document
pub const OPEN_HTML_DOC: &str = "scriptCommands.openHtmlDoc";
/// Evaluate an expression in the sandbox
pub const QUICK_EXECUTION: &str = "scriptCommands.quickExecution";

struct Shared {
    host: Arc<dyn Host>,
    loader: Arc<dyn ModuleLoader>,
    output: Output,
    version: String,
    config: RwLock<Configuration>,
    commands: RwLock<Vec<ScriptCommand>>,
    entries: Mutex<Vec<RegistryEntry>>,
    active: ActiveCommands,
    global_state: RwLock<StateSlot>,
    html: HtmlDocuments,
    quick: QuickExecution,
    entry_points: Mutex<Vec<Box<dyn Disposable>>>,
}

#[derive(Clone)]
pub struct Controller {
    shared: Arc<Shared>,
}

impl Controller {
    pub fn new(host: Arc<dyn Host>, loader: Arc<dyn ModuleLoader>, version: &str) -> Self {
        Self {
            shared: Arc::new(Shared {
                output: Output::new(Arc::clone(&host)),
                host,
                loader,
                version: version.to_string(),
                config: RwLock::new(Configuration::default()),
                commands: RwLock::new(Vec::new()),
                entries: Mutex::new(Vec::new()),
                active: Arc::new(RwLock::new(Vec::new())),
                global_state: RwLock::new(StateSlot::default()),
                html: HtmlDocuments::new(),
                quick: QuickExecution::new(),
                entry_points: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.shared.host
    }

    fn config(&self) -> Configuration {
        self.shared
            .config
            .read()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// Configured commands in execution order
    pub fn commands(&self) -> Vec<ScriptCommand> {
        self.shared
            .commands
            .read()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// Current global state
    pub fn global_state(&self) -> Value {
        self.shared
            .global_state
            .read()
            .map(|s| s.get())
            .unwrap_or_default()
    }

    /// Session of a registered command
    pub fn session(&self, id: &str) -> Option<Session> {
        self.shared.entries.lock().ok().and_then(|entries| {
            entries
                .iter()
                .find(|e| e.id() == id)
                .map(|e| e.session().clone())
        })
    }

    /// Register the controller's own commands with the host
    pub fn register_entry_points(&self) -> Result<()> {
        let weak = Arc::downgrade(&self.shared);

        let execute: CommandHandler = handler(&weak, |controller, _| {
            async move {
                controller.execute_command().await;
                Ok(Value::Null)
            }
            .boxed()
        });
        let execute_host: CommandHandler = handler(&weak, |controller, _| {
            async move {
                controller.execute_host_command().await;
                Ok(Value::Null)
            }
            .boxed()
        });
        let open_html: CommandHandler = handler(&weak, |controller, args| {
            async move {
                let id = match args.first() {
                    Some(Value::String(id)) => id.clone(),
                    Some(other) if !other.is_null() => other.to_string(),
                    _ => return Err(Error::Host("no HTML document id given".to_string())),
                };
                controller.open_html_doc(&id).await
            }
            .boxed()
        });
        let quick: CommandHandler = handler(&weak, |controller, _| {
            async move { controller.quick_execution().await }.boxed()
        });

        let mut registrations = Vec::new();
        for (id, handler) in [
            (EXECUTE_COMMAND, execute),
            (EXECUTE_HOST_COMMAND, execute_host),
            (OPEN_HTML_DOC, open_html),
            (QUICK_EXECUTION, quick),
        ] {
            registrations.push(self.shared.host.register_command(id, handler)?);
        }

        if let Ok(mut entry_points) = self.shared.entry_points.lock() {
            entry_points.extend(registrations);
        }
        Ok(())
    }

    /// Load the configuration and register its commands
    pub async fn on_activated(&self) {
        tracing::info!("activating script commands {}", self.shared.version);
        self.reload_configuration().await;
    }

    /// Reload, then run the commands bound to configuration changes
    pub async fn on_did_change_configuration(&self) {
        self.reload_configuration().await;
        let batch = router::select(&self.commands(), EventKind::ConfigChanged);
        self.run_batch(EventKind::ConfigChanged, batch, None).await;
    }

    /// Run the commands bound to shutdown
    pub async fn on_deactivate(&self) {
        let batch = router::select(&self.commands(), EventKind::Close);
        self.run_batch(EventKind::Close, batch, None).await;
    }

    pub async fn on_did_open_text_document(&self, doc: Option<&TextDocument>) {
        if let Some(doc) = doc {
            self.on_file_change(&doc.file_name, EventKind::Opened, Vec::new()).await;
        }
    }

    pub async fn on_did_close_text_document(&self, doc: Option<&TextDocument>) {
        if let Some(doc) = doc {
            self.on_file_change(&doc.file_name, EventKind::Closed, Vec::new()).await;
        }
    }

    pub async fn on_did_save_text_document(&self, doc: Option<&TextDocument>) {
        if let Some(doc) = doc {
            self.on_file_change(&doc.file_name, EventKind::Saved, Vec::new()).await;
        }
    }

    pub async fn on_did_change_text_document(&self, event: Option<&TextDocumentChangeEvent>) {
        if let Some(event) = event {
            let extra = vec![serde_json::to_value(event).unwrap_or(Value::Null)];
            self.on_file_change(&event.document.file_name, EventKind::EditorChanged, extra)
                .await;
        }
    }

    pub async fn on_will_save_text_document(&self, event: Option<&TextDocumentWillSaveEvent>) {
        if let Some(event) = event {
            let extra = vec![serde_json::to_value(event).unwrap_or(Value::Null)];
            self.on_file_change(&event.document.file_name, EventKind::WillSave, extra)
                .await;
        }
    }

    /// A change reported by the file system watcher
    pub async fn on_file_event(&self, event: &FileEvent) {
        let kind = match event.kind {
            FileEventKind::Changed => EventKind::Changed,
            FileEventKind::Created => EventKind::New,
            FileEventKind::Deleted => EventKind::Deleted,
        };
        self.on_file_change(&event.path, kind, Vec::new()).await;
    }

    async fn on_file_change(&self, path: &Path, kind: EventKind, extra: Vec<Value>) {
        if path.as_os_str().is_empty() {
            return;
        }

        let file = router::resolve_file_path(self.shared.host.workspace_root(), path);
        let batch = router::select(&self.commands(), kind);
        if batch.is_empty() {
            return;
        }

        tracing::debug!("{} {}: {} command(s)", kind.name(), file.display(), batch.len());
        let factory = router::file_args(file, kind, self.config().globals(), extra);
        self.run_batch(kind, batch, Some(factory)).await;
    }

    /// Run a batch; a failure is shown to the user and not passed on
    async fn run_batch(&self, kind: EventKind, batch: CommandBatch, factory: Option<ArgsFactory>) {
        let sequencer = Sequencer::new(
            Arc::clone(&self.shared.host),
            self.config().honor_continue_on_error,
        );

        if let Err(e) = sequencer.run(batch, factory).await {
            let text = format!(
                "[script-commands] Execution of script commands ({}) failed: {}",
                kind.name(),
                e
            );
            self.shared.output.log(format!("[ERROR] {}", text));
            self.shared.host.show_message(MessageLevel::Error, &text);
        }
    }

    /// Let the user pick one of the configured commands
    pub async fn execute_command(&self) {
        let entries = self
            .commands()
            .iter()
            .map(CommandEntry::from_command)
            .collect();
        selection::select_and_execute(Arc::clone(&self.shared.host), entries).await;
    }

    /// Let the user pick one of the host's commands
    pub async fn execute_host_command(&self) {
        let filter_internal = !self.config().show_internal_commands;
        match self.shared.host.get_commands(filter_internal).await {
            Ok(ids) => {
                let entries = selection::host_entries(ids);
                selection::select_and_execute(Arc::clone(&self.shared.host), entries).await;
            }
            Err(e) => self
                .shared
                .output
                .log(format!("[ERROR] executeHostCommand: {}", e)),
        }
    }

    pub async fn open_html_doc(&self, id: &str) -> Result<Value> {
        html::open_html_doc(
            self.shared.host.as_ref(),
            &self.shared.html,
            &self.shared.output,
            id,
        )
        .await
    }

    pub async fn quick_execution(&self) -> Result<Value> {
        self.shared
            .quick
            .run(self.shared.host.as_ref(), &self.shared.html)
            .await
    }

    /// Release every registration
    pub fn dispose(&self) {
        if let Ok(mut entries) = self.shared.entries.lock() {
            for mut entry in entries.drain(..) {
                entry.dispose();
            }
        }
        if let Ok(mut active) = self.shared.active.write() {
            active.clear();
        }
        if let Ok(mut entry_points) = self.shared.entry_points.lock() {
            for mut registration in entry_points.drain(..) {
                registration.dispose();
            }
        }
    }
}

/// Host command body that runs against the controller while it is alive
fn handler<F>(weak: &Weak<Shared>, f: F) -> CommandHandler
where
    F: Fn(Controller, Vec<Value>) -> crate::host::CommandFuture + Send + Sync + 'static,
{
    let weak = weak.clone();
    Arc::new(move |args: Vec<Value>| match weak.upgrade() {
        Some(shared) => f(Controller { shared }, args),
        None => async { Err(Error::Host("script commands are shut down".to_string())) }.boxed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FnLoader, RecordingHost};
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn controller(host: &Arc<RecordingHost>, loader: FnLoader) -> Controller {
        Controller::new(host.clone(), Arc::new(loader), "1.0.0")
    }

    #[tokio::test]
    async fn startup_commands_share_global_state() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let loader = FnLoader::new()
            .with("a.rhai", |ctx| {
                async move {
                    ctx.global_state.set(json!({ "x": 1 }));
                    Ok(Value::Null)
                }
                .boxed()
            })
            .with("b.rhai", move |ctx| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(ctx.global_state.get());
                    Ok(Value::Null)
                }
                .boxed()
            });

        let host = Arc::new(RecordingHost::new());
        host.set_configuration(json!({
            "commands": [
                { "id": "a", "script": "a.rhai", "onStartup": true, "async": false },
                { "id": "b", "script": "b.rhai", "onStartup": true }
            ]
        }));
        let controller = controller(&host, loader);
        controller.on_activated().await;

        let seen = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seen, json!({ "x": 1 }));
    }

    #[tokio::test]
    async fn module_without_execute_runs_cleanly() {
        let host = Arc::new(RecordingHost::new());
        host.set_configuration(json!({
            "commands": { "id": "noop", "script": "noop.rhai", "onStartup": true, "async": false }
        }));
        let controller = controller(&host, FnLoader::new().without_execute("noop.rhai"));
        controller.on_activated().await;

        let result = host.registry().execute("noop", vec![]).unwrap().await.unwrap();
        assert_eq!(result, json!(0));
        assert!(!host.output_lines().iter().any(|l| l.contains("[ERROR]")));
        assert!(host.messages().iter().all(|(level, _)| *level != MessageLevel::Error));
    }

    #[tokio::test]
    async fn startup_failure_names_the_event() {
        let host = Arc::new(RecordingHost::new());
        host.set_configuration(json!({
            "disableNewVersionPopups": true,
            "commands": { "id": "broken", "script": "missing.rhai", "onStartup": true, "async": false }
        }));
        let controller = controller(&host, FnLoader::new());
        controller.on_activated().await;

        let (level, text) = &host.messages()[0];
        assert_eq!(*level, MessageLevel::Error);
        assert!(text.starts_with("[script-commands] Execution of script commands (Startup) failed:"));
    }

    #[tokio::test]
    async fn file_events_pass_change_context() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let loader = FnLoader::new().with("saved.rhai", move |ctx| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(ctx.arguments.clone());
                Ok(json!(0))
            }
            .boxed()
        });

        let dir = tempfile::tempdir().unwrap();
        let host = Arc::new(RecordingHost::with_root(dir.path().to_path_buf()));
        host.set_configuration(json!({
            "globals": { "team": "core" },
            "commands": {
                "id": "saved", "script": "saved.rhai", "onSaved": true,
                "arguments": ["fixed"], "options": { "lint": true }
            }
        }));
        let controller = controller(&host, loader);
        controller.on_activated().await;

        controller.on_did_save_text_document(None).await;
        controller
            .on_did_save_text_document(Some(&TextDocument::new("src/lib.rs")))
            .await;

        let args = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(args.len(), 2);
        assert_eq!(args[0]["type"], json!("Saved"));
        assert_eq!(args[0]["file"], json!(dir.path().join("src/lib.rs")));
        assert_eq!(args[0]["globals"], json!({ "team": "core" }));
        assert_eq!(args[0]["options"], json!({ "lint": true }));
        assert_eq!(args[1], json!("fixed"));
        assert_eq!(host.dispatched_args("saved").len(), 1);
    }

    #[tokio::test]
    async fn will_save_passes_the_event() {
        let host = Arc::new(RecordingHost::new());
        host.set_configuration(json!({
            "commands": { "id": "w", "script": "w.rhai", "onWillSave": true, "async": false }
        }));
        let controller = controller(&host, FnLoader::new().without_execute("w.rhai"));
        controller.on_activated().await;

        let event = TextDocumentWillSaveEvent {
            document: TextDocument::new("/tmp/a.txt"),
            reason: crate::host::SaveReason::Manual,
        };
        controller.on_will_save_text_document(Some(&event)).await;

        let args = host.dispatched_args("w");
        assert_eq!(args[0][0]["type"], json!("WillSave"));
        assert_eq!(args[0][1]["reason"], json!("Manual"));
    }

    #[tokio::test]
    async fn config_change_runs_config_changed_commands() {
        let host = Arc::new(RecordingHost::new());
        host.set_configuration(json!({
            "commands": { "id": "c", "script": "c.rhai", "onConfigChanged": true, "async": false }
        }));
        let controller = controller(&host, FnLoader::new().without_execute("c.rhai"));

        controller.on_activated().await;
        assert!(host.dispatched_args("c").is_empty());

        controller.on_did_change_configuration().await;
        assert_eq!(host.dispatched_args("c").len(), 1);
    }

    #[tokio::test]
    async fn close_commands_run_on_deactivate() {
        let host = Arc::new(RecordingHost::new());
        host.set_configuration(json!({
            "commands": [
                { "id": "bye", "script": "bye.rhai", "onClose": true, "async": false },
                { "id": "other", "script": "bye.rhai" }
            ]
        }));
        let controller = controller(&host, FnLoader::new().without_execute("bye.rhai"));
        controller.on_activated().await;
        controller.on_deactivate().await;

        assert_eq!(host.dispatched(), vec!["bye"]);
    }

    #[tokio::test]
    async fn entry_points_are_registered() {
        let host = Arc::new(RecordingHost::new());
        host.set_configuration(json!({
            "commands": [
                { "id": "second", "script": "x.rhai", "sortOrder": 2 },
                { "id": "first", "script": "x.rhai", "sortOrder": 1, "displayName": "First one" }
            ]
        }));
        let controller = controller(&host, FnLoader::new().without_execute("x.rhai"));
        controller.register_entry_points().unwrap();
        controller.on_activated().await;

        host.push_pick(None);
        host.registry().execute(EXECUTE_COMMAND, vec![]).unwrap().await.unwrap();

        let (items, _) = &host.pick_requests()[0];
        let labels: Vec<&str> = items.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, vec!["First one", "second"]);

        controller.dispose();
        assert!(!host.registry().contains(EXECUTE_COMMAND));
        assert!(!host.registry().contains("first"));
    }

    #[tokio::test]
    async fn host_command_list_hides_internal_commands() {
        let host = Arc::new(RecordingHost::new());
        host.add_host_commands(&["_internal.thing", "editor.save"]);
        let controller = controller(&host, FnLoader::new());
        controller.on_activated().await;

        host.push_pick(None);
        controller.execute_host_command().await;
        let (items, _) = &host.pick_requests()[0];
        assert!(items.iter().any(|i| i.label == "editor.save"));
        assert!(!items.iter().any(|i| i.label.starts_with('_')));

        host.set_configuration(json!({ "showInternalVSCommands": true }));
        controller.reload_configuration().await;
        host.push_pick(None);
        controller.execute_host_command().await;
        let (items, _) = &host.pick_requests()[1];
        assert!(items.iter().any(|i| i.label == "_internal.thing"));
    }

    #[tokio::test]
    async fn scripts_open_html_through_entry_point() {
        let loader = FnLoader::new().with("html.rhai", |ctx| {
            async move { ctx.capabilities.open_html("<p>hi</p>", Some("Greeting"), None).await }.boxed()
        });
        let host = Arc::new(RecordingHost::new());
        host.set_configuration(json!({ "commands": { "id": "h", "script": "html.rhai" } }));
        let controller = controller(&host, loader);
        controller.register_entry_points().unwrap();
        controller.on_activated().await;

        let result = host.registry().execute("h", vec![]).unwrap().await.unwrap();
        assert_eq!(result, json!(0));
        assert_eq!(host.previews(), vec![("Greeting".to_string(), "<p>hi</p>".to_string())]);
    }

    #[tokio::test]
    async fn dropped_controller_rejects_entry_points() {
        let host = Arc::new(RecordingHost::new());
        {
            let controller = controller(&host, FnLoader::new());
            controller.register_entry_points().unwrap();
        }
        let result = host.registry().execute(OPEN_HTML_DOC, vec![json!("x")]).unwrap().await;
        assert!(matches!(result, Err(Error::Host(_))));
    }
}
