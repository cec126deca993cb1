//! Invocation context of a script command.
//!
//! Every run of a script command gets a fresh [`InvocationContext`]. The
//! command-local state and the global state are live [`StateSlot`]s, so
//! whatever a script writes is kept even when the script fails afterwards.
//! The `next_value` a run leaves behind becomes the `previous_value` of the
//! next run of the same command.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde_json::{Value, json};

use super::html::HtmlDocuments;
use crate::config::ScriptCommand;
use crate::error::Result;
use crate::host::{self, CommandFuture, Host, Output};
use crate::scripting::{self, ModuleLoader};
use crate::scripting::api::text;

const DEPLOY_FILES: &str = "extension.deploy.filesTo";
const CRON_GET_JOBS: &str = "extension.cronJons.getJobs";
const CRON_START_JOBS: &str = "extension.cronJons.startJobsByName";
const CRON_STOP_JOBS: &str = "extension.cronJons.stopJobsByName";
const CRON_RESTART_JOBS: &str = "extension.cronJons.restartJobsByName";
const API_START_HOST: &str = "extension.restApi.startHost";
const API_STOP_HOST: &str = "extension.restApi.stopHost";

/// A shared, mutable JSON value
#[derive(Clone, Default)]
pub struct StateSlot(Arc<RwLock<Value>>);

impl StateSlot {
    pub fn new(value: Value) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    pub fn get(&self) -> Value {
        self.0.read().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn set(&self, value: Value) {
        if let Ok(mut slot) = self.0.write() {
            *slot = value;
        }
    }

    pub fn update(&self, f: impl FnOnce(&mut Value)) {
        if let Ok(mut slot) = self.0.write() {
            f(&mut slot);
        }
    }
}

impl fmt::Debug for StateSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StateSlot").field(&self.get()).finish()
    }
}

/// State of one command that lives as long as its registry entry
#[derive(Clone, Debug)]
pub struct Session {
    pub command_state: StateSlot,
    previous_value: StateSlot,
}

impl Session {
    /// Start from a copy of the configured initial state, or `{}`
    pub fn new(initial: Option<&Value>) -> Self {
        let state = initial.cloned().unwrap_or_else(|| json!({}));
        Self {
            command_state: StateSlot::new(state),
            previous_value: StateSlot::default(),
        }
    }

    /// What the last run wrote to `next_value`
    pub fn previous_value(&self) -> Value {
        self.previous_value.get()
    }
}

/// Ids of the commands registered by the last reload
pub type ActiveCommands = Arc<RwLock<Vec<String>>>;

/// The argument handed to a script's `execute` function
pub struct InvocationContext {
    pub arguments: Vec<Value>,
    pub command: String,
    pub command_state: StateSlot,
    /// Copy of the configured global variables
    pub globals: Value,
    pub global_state: StateSlot,
    previous_value: Value,
    pub next_value: StateSlot,
    pub options: Value,
    /// Ids of every other registered command
    pub others: Vec<String>,
    pub output: Output,
    pub capabilities: Capabilities,
    /// Directory that script imports resolve against
    pub module_root: PathBuf,
}

impl InvocationContext {
    /// A context with a fresh `next_value`, no options and no other commands
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        arguments: Vec<Value>,
        command: String,
        command_state: StateSlot,
        globals: Value,
        global_state: StateSlot,
        previous_value: Value,
        output: Output,
        capabilities: Capabilities,
        module_root: PathBuf,
    ) -> Self {
        Self {
            arguments,
            command,
            command_state,
            globals,
            global_state,
            previous_value,
            next_value: StateSlot::new(Value::Null),
            options: Value::Null,
            others: Vec::new(),
            output,
            capabilities,
            module_root,
        }
    }

    pub fn previous_value(&self) -> &Value {
        &self.previous_value
    }
}

/// Integration points of other extensions, reached through host commands
#[derive(Clone)]
pub struct Capabilities {
    host: Arc<dyn Host>,
    html: HtmlDocuments,
}

fn distinct(values: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        if !value.is_empty() && !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

impl Capabilities {
    pub fn new(host: Arc<dyn Host>, html: HtmlDocuments) -> Self {
        Self { host, html }
    }

    /// Deploy files to targets via the deploy extension
    pub fn deploy(&self, files: Vec<String>, targets: Vec<String>) -> CommandFuture {
        let files = distinct(files.into_iter().filter(|f| !f.trim().is_empty()));
        let targets = distinct(targets.into_iter().map(|t| t.trim().to_lowercase()));
        host::dispatch(self.host.as_ref(), DEPLOY_FILES, vec![json!(files), json!(targets)])
    }

    pub fn get_cron_jobs(&self) -> CommandFuture {
        host::dispatch(self.host.as_ref(), CRON_GET_JOBS, vec![])
    }

    pub fn start_cron_jobs(&self, jobs: Vec<String>) -> CommandFuture {
        host::dispatch(self.host.as_ref(), CRON_START_JOBS, vec![json!(jobs)])
    }

    pub fn stop_cron_jobs(&self, jobs: Vec<String>) -> CommandFuture {
        host::dispatch(self.host.as_ref(), CRON_STOP_JOBS, vec![json!(jobs)])
    }

    pub fn restart_cron_jobs(&self, jobs: Vec<String>) -> CommandFuture {
        host::dispatch(self.host.as_ref(), CRON_RESTART_JOBS, vec![json!(jobs)])
    }

    pub fn start_api(&self) -> CommandFuture {
        host::dispatch(self.host.as_ref(), API_START_HOST, vec![])
    }

    pub fn stop_api(&self) -> CommandFuture {
        host::dispatch(self.host.as_ref(), API_STOP_HOST, vec![])
    }

    /// Open HTML in a preview tab
    pub fn open_html(&self, html: &str, title: Option<&str>, id: Option<&str>) -> CommandFuture {
        self.html.open(self.host.as_ref(), html, title, id)
    }

    pub fn from_markdown(&self, markdown: &str) -> String {
        text::markdown_to_html(markdown)
    }

    pub fn to_hex_view(&self, bytes: &[u8]) -> String {
        text::hex_view(bytes)
    }

    pub fn html_encode(&self, text: &str) -> String {
        text::html_encode(text)
    }
}

/// Runs one configured command: loads its module, builds the context,
/// executes it and keeps the session up to date.
pub struct Invoker {
    command: ScriptCommand,
    session: Session,
    global_state: StateSlot,
    globals: Value,
    active: ActiveCommands,
    loader: Arc<dyn ModuleLoader>,
    output: Output,
    capabilities: Capabilities,
    module_root: PathBuf,
}

impl Invoker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        command: ScriptCommand,
        session: Session,
        global_state: StateSlot,
        globals: Value,
        active: ActiveCommands,
        loader: Arc<dyn ModuleLoader>,
        host: Arc<dyn Host>,
        html: HtmlDocuments,
    ) -> Self {
        let module_root = scripting::script_dir(host.workspace_root(), &command.script);
        Self {
            command,
            session,
            global_state,
            globals,
            active,
            loader,
            output: Output::new(Arc::clone(&host)),
            capabilities: Capabilities::new(host, html),
            module_root,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn build_context(&self, arguments: Vec<Value>) -> InvocationContext {
        let others: Vec<String> = self
            .active
            .read()
            .map(|ids| ids.iter().filter(|id| **id != self.command.id).cloned().collect())
            .unwrap_or_default();

        let mut ctx = InvocationContext::new(
            arguments,
            self.command.id.clone(),
            self.session.command_state.clone(),
            self.globals.clone(),
            self.global_state.clone(),
            self.session.previous_value(),
            self.output.clone(),
            self.capabilities.clone(),
            self.module_root.clone(),
        );
        ctx.options = self.command.options.clone().unwrap_or(Value::Null);
        ctx.others = others;
        ctx
    }

    /// Run the command's script and return its exit code
    pub async fn invoke(&self, arguments: Vec<Value>) -> Result<Value> {
        let module = self.loader.load(&self.command.script, self.command.cached)?;
        if !module.has_execute() {
            tracing::debug!("'{}' has no execute function", self.command.id);
            return Ok(json!(0));
        }

        let ctx = self.build_context(arguments);
        let next_value = ctx.next_value.clone();
        let outcome = module.execute(ctx).await;

        // Hand over the next value before the outcome decides success
        self.session.previous_value.set(next_value.get());

        let value = outcome?;
        Ok(json!(coerce_exit_code(&value)))
    }
}

/// Read an exit code the way `parseInt` would: leading sign and digits
pub fn parse_exit_code(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            let (sign, digits) = match s.strip_prefix('-') {
                Some(rest) => (-1, rest),
                None => (1, s.strip_prefix('+').unwrap_or(s)),
            };
            let end = digits
                .char_indices()
                .find(|(_, c)| !c.is_ascii_digit())
                .map(|(i, _)| i)
                .unwrap_or(digits.len());
            digits[..end].parse::<i64>().ok().map(|n| sign * n)
        }
        _ => None,
    }
}

/// Exit code of an executor result, `0` when there is none
pub fn coerce_exit_code(value: &Value) -> i64 {
    parse_exit_code(value).unwrap_or(0)
}
