//! `ScriptContext` - the `ctx` argument of `fn execute(ctx)`
//!
//! Usage in Rhai:
//! ```rhai
//! fn execute(ctx) {
//!     ctx.command_state.count = (ctx.command_state.count ?? 0) + 1;
//!     ctx.next_value = ctx.arguments;
//!     ctx.log(`run ${ctx.command}`);
//!     ctx.open_html(sc::markdown("# Done"), "Result")
//! }
//! ```

use std::sync::Arc;

use rhai::serde::{from_dynamic, to_dynamic};
use rhai::{Array, Blob, Dynamic, Engine, EvalAltResult};
use serde_json::Value;
use tokio::runtime::Handle;

use super::deferred::Deferred;
use crate::controller::InvocationContext;
use crate::host::CommandFuture;

type ScriptResult<T> = Result<T, Box<EvalAltResult>>;

#[derive(Clone)]
pub struct ScriptContext {
    inner: Arc<InvocationContext>,
    runtime: Handle,
}

impl ScriptContext {
    pub fn new(ctx: InvocationContext, runtime: Handle) -> Self {
        Self {
            inner: Arc::new(ctx),
            runtime,
        }
    }

    fn defer(&self, future: CommandFuture) -> Deferred {
        Deferred::spawn(&self.runtime, future)
    }
}

fn strings(values: Array) -> Vec<String> {
    values.into_iter().map(|v| v.to_string()).collect()
}

fn json(value: Dynamic) -> ScriptResult<Value> {
    from_dynamic(&value)
}

pub fn register(engine: &mut Engine) {
    engine.register_type_with_name::<ScriptContext>("ScriptContext");

    // Read-only properties
    engine
        .register_get("arguments", |ctx: &mut ScriptContext| to_dynamic(&ctx.inner.arguments))
        .register_get("command", |ctx: &mut ScriptContext| ctx.inner.command.clone())
        .register_get("globals", |ctx: &mut ScriptContext| to_dynamic(&ctx.inner.globals))
        .register_get("options", |ctx: &mut ScriptContext| to_dynamic(&ctx.inner.options))
        .register_get("previous_value", |ctx: &mut ScriptContext| {
            to_dynamic(ctx.inner.previous_value())
        })
        .register_get("module_root", |ctx: &mut ScriptContext| {
            ctx.inner.module_root.to_string_lossy().to_string()
        })
        .register_get("others", |ctx: &mut ScriptContext| {
            ctx.inner
                .others
                .iter()
                .map(|id| Dynamic::from(id.clone()))
                .collect::<Array>()
        });

    // State slots
    engine
        .register_get("command_state", |ctx: &mut ScriptContext| {
            to_dynamic(ctx.inner.command_state.get())
        })
        .register_set("command_state", |ctx: &mut ScriptContext, value: Dynamic| -> ScriptResult<()> {
            ctx.inner.command_state.set(json(value)?);
            Ok(())
        })
        .register_get("global_state", |ctx: &mut ScriptContext| {
            to_dynamic(ctx.inner.global_state.get())
        })
        .register_set("global_state", |ctx: &mut ScriptContext, value: Dynamic| -> ScriptResult<()> {
            ctx.inner.global_state.set(json(value)?);
            Ok(())
        })
        .register_get("next_value", |ctx: &mut ScriptContext| to_dynamic(ctx.inner.next_value.get()))
        .register_set("next_value", |ctx: &mut ScriptContext, value: Dynamic| -> ScriptResult<()> {
            ctx.inner.next_value.set(json(value)?);
            Ok(())
        });

    engine.register_fn("log", |ctx: &mut ScriptContext, msg: Dynamic| {
        ctx.inner.output.log(msg);
    });

    // Capabilities
    engine
        .register_fn("deploy", |ctx: &mut ScriptContext, files: Array, targets: Array| {
            ctx.defer(ctx.inner.capabilities.deploy(strings(files), strings(targets)))
        })
        .register_fn("get_cron_jobs", |ctx: &mut ScriptContext| {
            ctx.defer(ctx.inner.capabilities.get_cron_jobs())
        })
        .register_fn("start_cron_jobs", |ctx: &mut ScriptContext, jobs: Array| {
            ctx.defer(ctx.inner.capabilities.start_cron_jobs(strings(jobs)))
        })
        .register_fn("stop_cron_jobs", |ctx: &mut ScriptContext, jobs: Array| {
            ctx.defer(ctx.inner.capabilities.stop_cron_jobs(strings(jobs)))
        })
        .register_fn("restart_cron_jobs", |ctx: &mut ScriptContext, jobs: Array| {
            ctx.defer(ctx.inner.capabilities.restart_cron_jobs(strings(jobs)))
        })
        .register_fn("start_api", |ctx: &mut ScriptContext| {
            ctx.defer(ctx.inner.capabilities.start_api())
        })
        .register_fn("stop_api", |ctx: &mut ScriptContext| {
            ctx.defer(ctx.inner.capabilities.stop_api())
        })
        .register_fn("open_html", |ctx: &mut ScriptContext, html: &str| {
            ctx.defer(ctx.inner.capabilities.open_html(html, None, None))
        })
        .register_fn("open_html", |ctx: &mut ScriptContext, html: &str, title: &str| {
            ctx.defer(ctx.inner.capabilities.open_html(html, Some(title), None))
        })
        .register_fn(
            "open_html",
            |ctx: &mut ScriptContext, html: &str, title: &str, id: &str| {
                ctx.defer(ctx.inner.capabilities.open_html(html, Some(title), Some(id)))
            },
        );

    // Text helpers
    engine
        .register_fn("from_markdown", |ctx: &mut ScriptContext, markdown: &str| {
            ctx.inner.capabilities.from_markdown(markdown)
        })
        .register_fn("to_hex_view", |ctx: &mut ScriptContext, text: &str| {
            ctx.inner.capabilities.to_hex_view(text.as_bytes())
        })
        .register_fn("to_hex_view", |ctx: &mut ScriptContext, data: Blob| {
            ctx.inner.capabilities.to_hex_view(&data)
        })
        .register_fn("html_encode", |ctx: &mut ScriptContext, text: &str| {
            ctx.inner.capabilities.html_encode(text)
        });
}
