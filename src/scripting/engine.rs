//! The Rhai engines behind script commands and the quick prompt
//!
//! - [`ScriptEngine`] loads command scripts relative to the workspace root,
//!   each with its own engine whose `import` statements resolve next to
//!   the script.
//! - [`Sandbox`] evaluates quick expressions with operation limits and no
//!   file access.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use futures::FutureExt;
use futures::future::BoxFuture;
use rhai::module_resolvers::{DummyModuleResolver, FileModuleResolver};
use rhai::serde::{from_dynamic, to_dynamic};
use rhai::{AST, Dynamic, Engine, Scope};
use serde_json::Value;
use tokio::runtime::Handle;

use super::api::{self, ScriptContext, deferred::Deferred};
use super::turn::Turns;
use super::{ModuleLoader, ScriptModule, script_path};
use crate::controller::InvocationContext;
use crate::error::{Error, Result};

/// Engine settings shared by command scripts and the sandbox
fn create_engine() -> Engine {
    let mut engine = Engine::new();

    // Safety limits
    engine.set_max_expr_depths(64, 64);

    engine.register_static_module("sc", api::create_module().into());
    api::context::register(&mut engine);
    api::deferred::register(&mut engine);

    engine.on_print(|msg| tracing::info!(target: "script", "{}", msg));
    engine.on_debug(|msg, source, pos| {
        tracing::debug!(target: "script", "{} @ {:?} {}", msg, source, pos)
    });

    engine
}

/// Turn an executor result into JSON, awaiting a returned [`Deferred`]
async fn settle(value: Dynamic) -> Result<Value> {
    if value.is_unit() {
        return Ok(Value::Null);
    }
    if value.is::<Deferred>() {
        let deferred = value.cast::<Deferred>();
        return deferred.resolve().await;
    }
    from_dynamic(&value).map_err(Error::from)
}

/// A compiled command script
struct RhaiModule {
    engine: Arc<Engine>,
    ast: Arc<AST>,
    turns: Turns,
}

impl ScriptModule for RhaiModule {
    fn has_execute(&self) -> bool {
        self.ast
            .iter_functions()
            .any(|f| f.name == "execute" && f.params.len() == 1)
    }

    fn execute(&self, ctx: InvocationContext) -> BoxFuture<'static, Result<Value>> {
        let engine = Arc::clone(&self.engine);
        let ast = Arc::clone(&self.ast);
        let turns = self.turns.clone();

        async move {
            let ctx = ScriptContext::new(ctx, Handle::current());
            let value = tokio::task::spawn_blocking(move || -> Result<Dynamic> {
                turns.run(|| {
                    let mut scope = Scope::new();
                    Ok(engine.call_fn::<Dynamic>(&mut scope, &ast, "execute", (ctx,))?)
                })
            })
            .await??;
            settle(value).await
        }
        .boxed()
    }
}

/// Loads command scripts from the workspace
pub struct ScriptEngine {
    root: PathBuf,
    cache: RwLock<HashMap<PathBuf, Arc<RhaiModule>>>,
    turns: Turns,
}

impl ScriptEngine {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            cache: RwLock::new(HashMap::new()),
            turns: Turns::new(),
        }
    }

    fn compile(&self, path: &Path) -> Result<RhaiModule> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Script(format!("Failed to read script file {}: {}", path.display(), e))
        })?;

        let mut engine = create_engine();
        let dir = path.parent().unwrap_or(&self.root);
        engine.set_module_resolver(FileModuleResolver::new_with_path(dir));

        let mut ast = engine.compile(&content)?;
        ast.set_source(path.to_string_lossy().to_string());

        Ok(RhaiModule {
            engine: Arc::new(engine),
            ast: Arc::new(ast),
            turns: self.turns.clone(),
        })
    }

    /// Forget compiled scripts
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
        }
    }
}

impl ModuleLoader for ScriptEngine {
    fn load(&self, script: &str, cached: bool) -> Result<Arc<dyn ScriptModule>> {
        if script.trim().is_empty() {
            return Err(Error::Script("No script defined".to_string()));
        }
        let path = script_path(&self.root, script);

        if cached {
            let hit = self.cache.read().ok().and_then(|c| c.get(&path).cloned());
            if let Some(module) = hit {
                return Ok(module);
            }
        }

        tracing::debug!("compiling {}", path.display());
        let module = Arc::new(self.compile(&path)?);
        if cached {
            if let Ok(mut cache) = self.cache.write() {
                cache.insert(path, Arc::clone(&module));
            }
        }
        Ok(module)
    }
}

/// Variables visible to a quick expression
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuickScope {
    pub state: Value,
    pub prev: Value,
    pub next_value: Value,
    pub globals: Value,
}

/// Restricted engine for quick expressions
pub struct Sandbox {
    engine: Engine,
}

impl Sandbox {
    pub fn new() -> Self {
        let mut engine = create_engine();
        engine.set_max_operations(100_000);
        engine.set_module_resolver(DummyModuleResolver::new());
        Self { engine }
    }

    /// Evaluate `expression`; writes to `state` and `next_value` land in `vars`
    pub fn eval(&self, expression: &str, vars: &mut QuickScope) -> Result<Value> {
        let mut scope = Scope::new();
        scope.push_dynamic("state", to_dynamic(&vars.state)?);
        scope.push_dynamic("prev", to_dynamic(&vars.prev)?);
        scope.push_dynamic("next_value", to_dynamic(&vars.next_value)?);
        scope.push_constant_dynamic("globals", to_dynamic(&vars.globals)?);

        let result = self.engine.eval_with_scope::<Dynamic>(&mut scope, expression)?;

        if let Some(state) = scope.get("state") {
            vars.state = from_dynamic(state)?;
        }
        if let Some(next_value) = scope.get("next_value") {
            vars.next_value = from_dynamic(next_value)?;
        }

        if result.is_unit() {
            return Ok(Value::Null);
        }
        Ok(from_dynamic(&result)?)
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}
