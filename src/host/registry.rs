use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use serde_json::Value;

use super::{CommandFuture, CommandHandler, Disposable};
use crate::error::{Error, Result};

struct Binding {
    token: u64,
    handler: CommandHandler,
}

#[derive(Default)]
struct Bindings {
    commands: HashMap<String, Binding>,
    next_token: u64,
}

/// In-process command table: id -> handler
#[derive(Clone, Default)]
pub struct CommandRegistry {
    bindings: Arc<RwLock<Bindings>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a handler to `id`, replacing any earlier binding
    pub fn register(&self, id: &str, handler: CommandHandler) -> Result<CommandRegistration> {
        if id.trim().is_empty() {
            return Err(Error::Registration("command id is empty".to_string()));
        }

        let mut bindings = self
            .bindings
            .write()
            .map_err(|_| Error::Registration("command table is poisoned".to_string()))?;

        bindings.next_token += 1;
        let token = bindings.next_token;
        if bindings
            .commands
            .insert(id.to_string(), Binding { token, handler })
            .is_some()
        {
            tracing::warn!("command '{}' registered twice, last registration wins", id);
        }

        Ok(CommandRegistration {
            id: id.to_string(),
            token,
            bindings: Arc::downgrade(&self.bindings),
            disposed: false,
        })
    }

    /// Look up `id` and start its handler
    pub fn execute(&self, id: &str, args: Vec<Value>) -> Result<CommandFuture> {
        let handler = self
            .bindings
            .read()
            .ok()
            .and_then(|b| b.commands.get(id).map(|binding| Arc::clone(&binding.handler)))
            .ok_or_else(|| Error::CommandNotFound(id.to_string()))?;

        Ok(handler(args))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.bindings
            .read()
            .map(|b| b.commands.contains_key(id))
            .unwrap_or(false)
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .bindings
            .read()
            .map(|b| b.commands.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }
}

/// Live binding of one command; disposing it unbinds the command
pub struct CommandRegistration {
    id: String,
    token: u64,
    bindings: Weak<RwLock<Bindings>>,
    disposed: bool,
}

impl Disposable for CommandRegistration {
    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        let Some(bindings) = self.bindings.upgrade() else {
            return;
        };
        if let Ok(mut bindings) = bindings.write() {
            // A newer registration of the same id stays bound
            let current = bindings.commands.get(&self.id).map(|b| b.token);
            if current == Some(self.token) {
                bindings.commands.remove(&self.id);
            }
        }
    }
}
