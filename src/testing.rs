//! Test doubles: a host that records what the controller does and a
//! module loader backed by closures.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::controller::InvocationContext;
use crate::error::{Error, Result};
use crate::host::{
    CommandFuture, CommandHandler, CommandRegistry, Disposable, Host, InputBoxOptions, Memento,
    MessageLevel, QuickPickItem, StatusBarAlignment, StatusBarItem,
};
use crate::scripting::{ModuleLoader, ScriptModule};

/// What a status bar item looks like at the moment
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub alignment: StatusBarAlignment,
    pub priority: Option<f64>,
    pub text: String,
    pub tooltip: String,
    pub color: String,
    pub command: String,
    pub visible: bool,
    pub disposed: bool,
}

type Snapshots = Arc<Mutex<Vec<StatusSnapshot>>>;

struct RecordingStatusItem {
    index: usize,
    snapshots: Snapshots,
}

impl RecordingStatusItem {
    fn update(&self, f: impl FnOnce(&mut StatusSnapshot)) {
        if let Some(item) = self.snapshots.lock().unwrap().get_mut(self.index) {
            f(item);
        }
    }
}

impl StatusBarItem for RecordingStatusItem {
    fn set_text(&mut self, text: &str) {
        self.update(|s| s.text = text.to_string());
    }

    fn set_tooltip(&mut self, tooltip: &str) {
        self.update(|s| s.tooltip = tooltip.to_string());
    }

    fn set_color(&mut self, color: &str) {
        self.update(|s| s.color = color.to_string());
    }

    fn set_command(&mut self, command: &str) {
        self.update(|s| s.command = command.to_string());
    }

    fn show(&mut self) {
        self.update(|s| s.visible = true);
    }

    fn hide(&mut self) {
        self.update(|s| s.visible = false);
    }
}

impl Disposable for RecordingStatusItem {
    fn dispose(&mut self) {
        self.update(|s| {
            s.visible = false;
            s.disposed = true;
        });
    }
}

/// Arguments of every call of a captured command
#[derive(Clone, Default)]
pub struct Capture(Arc<Mutex<Vec<Vec<Value>>>>);

impl Capture {
    pub fn calls(&self) -> Vec<Vec<Value>> {
        self.0.lock().unwrap().clone()
    }
}

/// A [`Host`] that records everything and answers prompts from queues
pub struct RecordingHost {
    root: PathBuf,
    registry: CommandRegistry,
    dispatched: Mutex<Vec<(String, Vec<Value>)>>,
    host_commands: Mutex<Vec<String>>,
    output: Mutex<Vec<String>>,
    output_shown: AtomicBool,
    messages: Mutex<Vec<(MessageLevel, String)>>,
    picks: Mutex<VecDeque<Option<usize>>>,
    pick_requests: Mutex<Vec<(Vec<QuickPickItem>, String)>>,
    inputs: Mutex<VecDeque<Option<String>>>,
    input_requests: Mutex<Vec<InputBoxOptions>>,
    previews: Mutex<Vec<(String, String)>>,
    fail_previews: AtomicBool,
    configuration: Mutex<Value>,
    status_items: Snapshots,
    global: Memento,
    workspace: Memento,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::with_root(std::env::temp_dir())
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self {
            root,
            registry: CommandRegistry::new(),
            dispatched: Mutex::new(Vec::new()),
            host_commands: Mutex::new(Vec::new()),
            output: Mutex::new(Vec::new()),
            output_shown: AtomicBool::new(false),
            messages: Mutex::new(Vec::new()),
            picks: Mutex::new(VecDeque::new()),
            pick_requests: Mutex::new(Vec::new()),
            inputs: Mutex::new(VecDeque::new()),
            input_requests: Mutex::new(Vec::new()),
            previews: Mutex::new(Vec::new()),
            fail_previews: AtomicBool::new(false),
            configuration: Mutex::new(Value::Null),
            status_items: Arc::new(Mutex::new(Vec::new())),
            global: Memento::in_memory(),
            workspace: Memento::in_memory(),
        }
    }

    /// Bind `id` to a handler
    pub fn on<F>(&self, id: &str, handler: F)
    where
        F: Fn(Vec<Value>) -> CommandFuture + Send + Sync + 'static,
    {
        self.registry.register(id, Arc::new(handler)).unwrap();
    }

    /// Bind `id` to a handler that always returns `value`
    pub fn respond(&self, id: &str, value: Value) {
        self.on(id, move |_| futures::future::ready(Ok(value.clone())).boxed());
    }

    /// Bind `id` to a handler that records its arguments
    pub fn capture_command(&self, id: &str) -> Capture {
        let capture = Capture::default();
        let calls = capture.clone();
        self.on(id, move |args| {
            calls.0.lock().unwrap().push(args);
            futures::future::ready(Ok(Value::Null)).boxed()
        });
        capture
    }

    /// Ids reported by `get_commands` in addition to registered ones
    pub fn add_host_commands(&self, ids: &[&str]) {
        self.host_commands
            .lock()
            .unwrap()
            .extend(ids.iter().map(|id| id.to_string()));
    }

    pub fn set_configuration(&self, value: Value) {
        *self.configuration.lock().unwrap() = value;
    }

    pub fn push_pick(&self, pick: Option<usize>) {
        self.picks.lock().unwrap().push_back(pick);
    }

    pub fn push_input(&self, input: Option<&str>) {
        self.inputs.lock().unwrap().push_back(input.map(str::to_string));
    }

    pub fn fail_previews(&self) {
        self.fail_previews.store(true, Ordering::SeqCst);
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Ids of dispatched commands, in dispatch order
    pub fn dispatched(&self) -> Vec<String> {
        self.dispatched.lock().unwrap().iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn dispatched_args(&self, id: &str) -> Vec<Vec<Value>> {
        self.dispatched
            .lock()
            .unwrap()
            .iter()
            .filter(|(d, _)| d == id)
            .map(|(_, args)| args.clone())
            .collect()
    }

    pub fn output_lines(&self) -> Vec<String> {
        self.output.lock().unwrap().clone()
    }

    pub fn output_shown(&self) -> bool {
        self.output_shown.load(Ordering::SeqCst)
    }

    pub fn messages(&self) -> Vec<(MessageLevel, String)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn pick_requests(&self) -> Vec<(Vec<QuickPickItem>, String)> {
        self.pick_requests.lock().unwrap().clone()
    }

    pub fn input_requests(&self) -> Vec<InputBoxOptions> {
        self.input_requests.lock().unwrap().clone()
    }

    pub fn previews(&self) -> Vec<(String, String)> {
        self.previews.lock().unwrap().clone()
    }

    pub fn status_items(&self) -> Vec<StatusSnapshot> {
        self.status_items.lock().unwrap().clone()
    }
}

impl Host for RecordingHost {
    fn register_command(&self, id: &str, handler: CommandHandler) -> Result<Box<dyn Disposable>> {
        Ok(Box::new(self.registry.register(id, handler)?))
    }

    fn execute_command(&self, id: &str, args: Vec<Value>) -> Result<CommandFuture> {
        self.dispatched
            .lock()
            .unwrap()
            .push((id.to_string(), args.clone()));
        self.registry.execute(id, args)
    }

    fn get_commands(&self, filter_internal: bool) -> BoxFuture<'static, Result<Vec<String>>> {
        let mut ids = self.registry.ids();
        ids.extend(self.host_commands.lock().unwrap().iter().cloned());
        ids.retain(|id| !filter_internal || !id.starts_with('_'));
        async move { Ok(ids) }.boxed()
    }

    fn create_status_bar_item(
        &self,
        alignment: StatusBarAlignment,
        priority: Option<f64>,
    ) -> Result<Box<dyn StatusBarItem>> {
        let mut items = self.status_items.lock().unwrap();
        items.push(StatusSnapshot {
            alignment,
            priority,
            text: String::new(),
            tooltip: String::new(),
            color: String::new(),
            command: String::new(),
            visible: false,
            disposed: false,
        });
        Ok(Box::new(RecordingStatusItem {
            index: items.len() - 1,
            snapshots: Arc::clone(&self.status_items),
        }))
    }

    fn show_quick_pick(
        &self,
        items: Vec<QuickPickItem>,
        placeholder: String,
    ) -> BoxFuture<'static, Result<Option<usize>>> {
        self.pick_requests.lock().unwrap().push((items, placeholder));
        let pick = self.picks.lock().unwrap().pop_front().flatten();
        async move { Ok(pick) }.boxed()
    }

    fn show_input_box(&self, options: InputBoxOptions) -> BoxFuture<'static, Result<Option<String>>> {
        self.input_requests.lock().unwrap().push(options);
        let input = self.inputs.lock().unwrap().pop_front().flatten();
        async move { Ok(input) }.boxed()
    }

    fn show_message(&self, level: MessageLevel, text: &str) {
        self.messages.lock().unwrap().push((level, text.to_string()));
    }

    fn append_output(&self, line: &str) {
        self.output.lock().unwrap().push(line.to_string());
    }

    fn show_output(&self) {
        self.output_shown.store(true, Ordering::SeqCst);
    }

    fn preview_html(&self, title: &str, html: &str) -> BoxFuture<'static, Result<()>> {
        let result = if self.fail_previews.load(Ordering::SeqCst) {
            Err(Error::Host("preview failed".to_string()))
        } else {
            self.previews
                .lock()
                .unwrap()
                .push((title.to_string(), html.to_string()));
            Ok(())
        };
        async move { result }.boxed()
    }

    fn configuration(&self, _section: &str) -> Result<Value> {
        Ok(self.configuration.lock().unwrap().clone())
    }

    fn global_memento(&self) -> &Memento {
        &self.global
    }

    fn workspace_memento(&self) -> &Memento {
        &self.workspace
    }

    fn workspace_root(&self) -> &Path {
        &self.root
    }
}

type Executor = Arc<dyn Fn(InvocationContext) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

struct FnModule {
    executor: Option<Executor>,
}

impl ScriptModule for FnModule {
    fn has_execute(&self) -> bool {
        self.executor.is_some()
    }

    fn execute(&self, ctx: InvocationContext) -> BoxFuture<'static, Result<Value>> {
        match &self.executor {
            Some(executor) => executor(ctx),
            None => async { Ok(Value::Null) }.boxed(),
        }
    }
}

/// Script modules made of closures, keyed by script path
#[derive(Default)]
pub struct FnLoader {
    modules: HashMap<String, Arc<FnModule>>,
}

impl FnLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<F>(mut self, script: &str, executor: F) -> Self
    where
        F: Fn(InvocationContext) -> BoxFuture<'static, Result<Value>> + Send + Sync + 'static,
    {
        self.modules.insert(
            script.to_string(),
            Arc::new(FnModule {
                executor: Some(Arc::new(executor)),
            }),
        );
        self
    }

    pub fn without_execute(mut self, script: &str) -> Self {
        self.modules
            .insert(script.to_string(), Arc::new(FnModule { executor: None }));
        self
    }
}

impl ModuleLoader for FnLoader {
    fn load(&self, script: &str, _cached: bool) -> Result<Arc<dyn ScriptModule>> {
        match self.modules.get(script) {
            Some(module) => Ok(Arc::clone(module) as Arc<dyn ScriptModule>),
            None => Err(Error::Script(format!("Failed to read script file {}", script))),
        }
    }
}
