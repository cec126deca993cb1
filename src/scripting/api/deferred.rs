//! Deferred values: a script's handle on a host future.
//!
//! Capability calls start their host command right away and hand the
//! script a [`Deferred`]. The script may block on it with `wait()` or
//! return it from `execute`, in which case the runner awaits it.

use std::sync::Arc;

use futures::future::BoxFuture;
use rhai::{Dynamic, Engine, EvalAltResult};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{Mutex, oneshot};

use crate::error::{Error, Result};
use crate::scripting::turn;

struct Slot {
    pending: Option<oneshot::Receiver<Result<Value>>>,
    settled: Option<Result<Value>>,
}

/// The eventual result of a host command
#[derive(Clone)]
pub struct Deferred {
    slot: Arc<Mutex<Slot>>,
}

impl Deferred {
    /// Drive `future` on `runtime` and return a handle on its result
    pub fn spawn(runtime: &Handle, future: BoxFuture<'static, Result<Value>>) -> Self {
        let (tx, rx) = oneshot::channel();
        runtime.spawn(async move {
            let _ = tx.send(future.await);
        });
        Self {
            slot: Arc::new(Mutex::new(Slot {
                pending: Some(rx),
                settled: None,
            })),
        }
    }

    /// An already settled value
    pub fn ready(result: Result<Value>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot {
                pending: None,
                settled: Some(result),
            })),
        }
    }

    /// Block the current thread until the result is there.
    ///
    /// Must not be called from inside the async runtime; scripts run on
    /// the blocking pool. A running script hands on its turn meanwhile.
    pub fn wait(&self) -> Result<Value> {
        let mut slot = self.slot.blocking_lock();
        if let Some(settled) = &slot.settled {
            return settled.clone();
        }
        let result = match slot.pending.take() {
            Some(rx) => turn::yielding(|| rx.blocking_recv()).unwrap_or(Err(Error::Cancelled)),
            None => Err(Error::Cancelled),
        };
        slot.settled = Some(result.clone());
        result
    }

    /// Await the result
    pub async fn resolve(&self) -> Result<Value> {
        let mut slot = self.slot.lock().await;
        if let Some(settled) = &slot.settled {
            return settled.clone();
        }
        let result = match slot.pending.take() {
            Some(rx) => rx.await.unwrap_or(Err(Error::Cancelled)),
            None => Err(Error::Cancelled),
        };
        slot.settled = Some(result.clone());
        result
    }
}

/// Expose `Deferred` to scripts
pub fn register(engine: &mut Engine) {
    engine.register_type_with_name::<Deferred>("Deferred");
    engine.register_fn(
        "wait",
        |deferred: &mut Deferred| -> std::result::Result<Dynamic, Box<EvalAltResult>> {
            let value = deferred.wait().map_err(|e| e.to_string())?;
            rhai::serde::to_dynamic(value)
        },
    );
}
