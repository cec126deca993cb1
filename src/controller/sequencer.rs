//! Execution of a command batch.
//!
//! Commands are dequeued in batch order and dispatched through the host.
//! An async command is started and the sequencer moves on right away; a
//! sync command is awaited before the next one is dequeued. The batch
//! therefore settles once every command has been dequeued, which for
//! async commands does not mean their scripts have finished.
//!
//! A failure stops the batch unless the command continues on error. Async
//! failures that arrive while the batch is still running stop it as well.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::Notify;

use super::context::parse_exit_code;
use crate::config::ScriptCommand;
use crate::error::{Error, Result};
use crate::host::{Host, Output};

/// Extra arguments for a command, inserted between its id and its fixed arguments
pub type ArgsFactory = Arc<dyn Fn(&ScriptCommand) -> Vec<Value> + Send + Sync>;

/// Commands matched to one event, consumed front to back
pub type CommandBatch = VecDeque<ScriptCommand>;

/// How one command takes part in a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionPolicy {
    pub is_async: bool,
    pub continue_on_error: bool,
    pub suppress_arguments: bool,
}

impl ExecutionPolicy {
    /// Without `honor_continue_on_error` a command continues on error
    /// exactly when it runs async, whatever its `continueOnError` says.
    pub fn of(command: &ScriptCommand, honor_continue_on_error: bool) -> Self {
        let is_async = command.is_async();
        let continue_on_error = if honor_continue_on_error {
            command.continue_on_error.unwrap_or(true)
        } else {
            is_async
        };

        Self {
            is_async,
            continue_on_error,
            suppress_arguments: command.suppress_arguments,
        }
    }
}

/// First failure of a detached async command
#[derive(Clone, Default)]
struct Abort {
    error: Arc<Mutex<Option<Error>>>,
    raised: Arc<Notify>,
}

impl Abort {
    fn raise(&self, error: Error) {
        if let Ok(mut slot) = self.error.lock() {
            if slot.is_none() {
                *slot = Some(error);
            }
        }
        self.raised.notify_waiters();
    }

    fn get(&self) -> Option<Error> {
        self.error.lock().ok().and_then(|e| e.clone())
    }

    async fn wait(&self) -> Error {
        loop {
            let raised = self.raised.notified();
            if let Some(error) = self.get() {
                return error;
            }
            raised.await;
        }
    }
}

fn log_exit_code(id: &str, result: &Value) {
    if let Some(code) = parse_exit_code(result) {
        tracing::info!("'{}' returned with exit code {}", id, code);
    }
}

pub struct Sequencer {
    host: Arc<dyn Host>,
    output: Output,
    honor_continue_on_error: bool,
}

impl Sequencer {
    pub fn new(host: Arc<dyn Host>, honor_continue_on_error: bool) -> Self {
        Self {
            output: Output::new(Arc::clone(&host)),
            host,
            honor_continue_on_error,
        }
    }

    /// Arguments a command is dispatched with
    fn arguments(command: &ScriptCommand, policy: ExecutionPolicy, factory: Option<&ArgsFactory>) -> Vec<Value> {
        let mut args = Vec::new();
        if !policy.suppress_arguments {
            if let Some(factory) = factory {
                args.extend(factory(command));
            }
        }
        args.extend(command.arguments.iter().cloned());
        args
    }

    fn log_failure(&self, id: &str, error: &Error) {
        tracing::warn!("'{}' failed: {}", id, error);
        self.output
            .log(format!("[ERROR] Execution of '{}' failed: {}", id, error));
    }

    /// Run `batch` until it is drained or a failure stops it
    pub async fn run(&self, mut batch: CommandBatch, factory: Option<ArgsFactory>) -> Result<()> {
        let abort = Abort::default();

        loop {
            if let Some(error) = abort.get() {
                return Err(error);
            }
            let Some(command) = batch.pop_front() else {
                return Ok(());
            };

            let policy = ExecutionPolicy::of(&command, self.honor_continue_on_error);
            let args = Self::arguments(&command, policy, factory.as_ref());
            tracing::debug!(
                command = %command.id,
                is_async = policy.is_async,
                continue_on_error = policy.continue_on_error,
                "dispatching"
            );

            let pending = match self.host.execute_command(&command.id, args) {
                Ok(pending) => pending,
                Err(e) => {
                    self.log_failure(&command.id, &e);
                    if policy.continue_on_error {
                        continue;
                    }
                    return Err(e);
                }
            };

            if policy.is_async {
                let output = self.output.clone();
                let abort = abort.clone();
                let id = command.id.clone();
                tokio::spawn(async move {
                    match pending.await {
                        Ok(result) => log_exit_code(&id, &result),
                        Err(e) => {
                            tracing::warn!("'{}' failed: {}", id, e);
                            output.log(format!("[ERROR] Execution of '{}' failed: {}", id, e));
                            if !policy.continue_on_error {
                                abort.raise(e);
                            }
                        }
                    }
                });
                continue;
            }

            let outcome = tokio::select! {
                outcome = pending => outcome,
                error = abort.wait() => return Err(error),
            };
            match outcome {
                Ok(result) => log_exit_code(&command.id, &result),
                Err(e) => {
                    self.log_failure(&command.id, &e);
                    if !policy.continue_on_error {
                        return Err(e);
                    }
                }
            }
        }
    }
}
