//! Registry entries: live bindings of configured commands.

use std::cmp::Ordering;
use std::sync::Arc;

use super::context::{Invoker, Session};
use crate::config::ScriptCommand;
use crate::host::{Disposable, StatusBarItem};

/// One configured command bound to the host, with its optional button.
///
/// Dropping an entry releases the command binding first and then the
/// button.
pub struct RegistryEntry {
    pub command: ScriptCommand,
    invoker: Arc<Invoker>,
    registration: Option<Box<dyn Disposable>>,
    button: Option<Box<dyn StatusBarItem>>,
}

impl RegistryEntry {
    pub fn new(
        command: ScriptCommand,
        invoker: Arc<Invoker>,
        registration: Box<dyn Disposable>,
        button: Option<Box<dyn StatusBarItem>>,
    ) -> Self {
        Self {
            command,
            invoker,
            registration: Some(registration),
            button,
        }
    }

    pub fn id(&self) -> &str {
        &self.command.id
    }

    pub fn session(&self) -> &Session {
        self.invoker.session()
    }

    pub fn dispose(&mut self) {
        if let Some(mut registration) = self.registration.take() {
            registration.dispose();
        }
        if let Some(mut button) = self.button.take() {
            button.dispose();
        }
    }
}

impl Drop for RegistryEntry {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn sort_name(command: &ScriptCommand) -> String {
    match command.display_name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_lowercase(),
        _ => command.id.trim().to_lowercase(),
    }
}

/// Order commands by sort order, then name, then id, then declaration order
pub fn sort_commands(commands: Vec<ScriptCommand>) -> Vec<ScriptCommand> {
    let mut keyed: Vec<(f64, String, String, ScriptCommand)> = commands
        .into_iter()
        .map(|c| (c.sort_value(), sort_name(&c), c.id.trim().to_lowercase(), c))
        .collect();

    // Stable, so equal keys keep declaration order
    keyed.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.1.cmp(&b.1))
            .then_with(|| a.2.cmp(&b.2))
    });

    keyed.into_iter().map(|(_, _, _, c)| c).collect()
}
