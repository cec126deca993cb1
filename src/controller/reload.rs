//! Reload: rebuild every registry entry from the current configuration.
//!
//! Old entries are disposed before new ones are created. Global state,
//! command sessions, stored HTML documents and quick execution state all
//! start over. A command that cannot be registered is logged and skipped.

use std::sync::Arc;

use futures::FutureExt;
use serde_json::{Value, json};

use super::context::{Invoker, Session, StateSlot};
use super::registry::{self, RegistryEntry};
use super::router::{self, EventKind};
use super::Controller;
use crate::config::{ButtonSettings, Configuration, SECTION, ScriptCommand};
use crate::error::{Error, Result};
use crate::host::{CommandHandler, MessageLevel, StatusBarAlignment, StatusBarItem};

const KEY_LAST_KNOWN_VERSION: &str = "scriptCommandsLastKnownVersion";

/// Keep the last command of every id, in order
fn dedupe(commands: Vec<ScriptCommand>) -> Vec<ScriptCommand> {
    let mut kept: Vec<ScriptCommand> = Vec::with_capacity(commands.len());
    for command in commands.into_iter().rev() {
        if kept.iter().any(|c| c.id == command.id) {
            tracing::warn!("command '{}' is defined more than once, the last one wins", command.id);
            continue;
        }
        kept.push(command);
    }
    kept.reverse();
    kept
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

impl Controller {
    /// Read the settings section and rebuild everything from it.
    ///
    /// An unreadable section keeps the previous configuration and commands.
    pub async fn reload_configuration(&self) {
        let config = match self
            .shared
            .host
            .configuration(SECTION)
            .and_then(Configuration::from_value)
        {
            Ok(config) => config,
            Err(e) => {
                self.shared
                    .output
                    .log(format!("[ERROR] reloadConfiguration(): {}", e));
                self.shared.host.show_message(
                    MessageLevel::Error,
                    &format!("[script-commands] Could not load the configuration: {}", e),
                );
                return;
            }
        };

        if let Ok(mut current) = self.shared.config.write() {
            *current = config.clone();
        }

        self.shared.html.clear();
        self.reload_commands(&config);
        self.shared.quick.reset(&config.quick, config.globals());

        if config.show_output {
            self.shared.host.show_output();
        }
        self.show_new_version_notice(&config);

        let startup = router::select(&self.commands(), EventKind::Startup);
        self.run_batch(EventKind::Startup, startup, None).await;
    }

    fn reload_commands(&self, config: &Configuration) {
        let old = self
            .shared
            .entries
            .lock()
            .map(|mut entries| std::mem::take(&mut *entries))
            .unwrap_or_default();
        for mut entry in old {
            entry.dispose();
        }

        let global_state = StateSlot::new(json!({}));
        if let Ok(mut slot) = self.shared.global_state.write() {
            *slot = global_state.clone();
        }

        let mut parsed = Vec::new();
        for entry in config.command_entries() {
            match entry {
                Ok(command) => parsed.push(command),
                Err(e) => {
                    tracing::warn!("skipping command: {}", e);
                    self.shared.output.log(format!("[ERROR] reloadCommands: {}", e));
                }
            }
        }
        let commands = dedupe(registry::sort_commands(parsed));
        let globals = config.globals();

        let mut entries = Vec::with_capacity(commands.len());
        for command in &commands {
            match self.create_entry(command, &global_state, &globals) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!("could not register '{}': {}", command.id, e);
                    self.shared
                        .output
                        .log(format!("[ERROR] reloadCommands({}): {}", command.id, e));
                }
            }
        }
        tracing::info!("{} of {} script command(s) registered", entries.len(), commands.len());

        if let Ok(mut active) = self.shared.active.write() {
            *active = entries.iter().map(|e| e.id().to_string()).collect();
        }
        if let Ok(mut current) = self.shared.commands.write() {
            *current = commands;
        }
        if let Ok(mut current) = self.shared.entries.lock() {
            *current = entries;
        }
    }

    fn create_entry(&self, command: &ScriptCommand, global_state: &StateSlot, globals: &Value) -> Result<RegistryEntry> {
        let session = Session::new(command.command_state.as_ref());
        let invoker = Arc::new(Invoker::new(
            command.clone(),
            session,
            global_state.clone(),
            globals.clone(),
            Arc::clone(&self.shared.active),
            Arc::clone(&self.shared.loader),
            Arc::clone(&self.shared.host),
            self.shared.html.clone(),
        ));

        // Invocations run on their own task so a caller giving up on the
        // result does not cut the session update short
        let bound = Arc::clone(&invoker);
        let handler: CommandHandler = Arc::new(move |args: Vec<Value>| {
            let invoker = Arc::clone(&bound);
            async move { tokio::spawn(async move { invoker.invoke(args).await }).await? }.boxed()
        });

        let mut registration = self.shared.host.register_command(&command.id, handler)?;

        let button = match &command.button {
            Some(settings) => match self.create_button(&command.id, settings) {
                Ok(button) => Some(button),
                Err(e) => {
                    registration.dispose();
                    return Err(e);
                }
            },
            None => None,
        };

        Ok(RegistryEntry::new(command.clone(), invoker, registration, button))
    }

    fn create_button(&self, id: &str, settings: &ButtonSettings) -> Result<Box<dyn StatusBarItem>> {
        let alignment = if settings.is_right {
            StatusBarAlignment::Right
        } else {
            StatusBarAlignment::Left
        };

        let mut button = self
            .shared
            .host
            .create_status_bar_item(alignment, settings.priority)
            .map_err(|e| Error::Registration(format!("status bar item: {}", e)))?;

        button.set_command(id);
        button.set_text(non_empty(settings.text.as_deref()).unwrap_or(id));
        button.set_tooltip(non_empty(settings.tooltip.as_deref()).unwrap_or(id));
        if let Some(color) = non_empty(settings.color.as_deref()) {
            button.set_color(&color.trim().to_lowercase());
        }
        if settings.show != Some(false) {
            button.show();
        }

        Ok(button)
    }

    /// Tell the user once per version that it changed
    fn show_new_version_notice(&self, config: &Configuration) {
        let memento = self.shared.host.global_memento();
        let version = self.shared.version.as_str();

        let last = memento.get(KEY_LAST_KNOWN_VERSION);
        if last.as_ref().and_then(Value::as_str) == Some(version) {
            return;
        }
        if config.disable_new_version_popups {
            return;
        }

        self.shared.host.show_message(
            MessageLevel::Info,
            &format!("[script-commands] You are running new version {} of 'script-commands'", version),
        );
        if let Err(e) = memento.update(KEY_LAST_KNOWN_VERSION, json!(version)) {
            self.shared
                .output
                .log(format!("[ERROR] showNewVersionNotice(): {}", e));
        }
    }
}
