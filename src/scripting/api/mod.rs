//! Script API: the `sc` helper namespace and the types scripts see
//!
//! Usage in Rhai:
//! ```rhai
//! let html = sc::markdown("# Report");
//! print(sc::hex_view("hello"));
//! sc::sleep(250);
//! ```

pub mod context;
pub mod deferred;
pub mod text;

use std::time::Duration;

use rhai::{Blob, EvalAltResult};

pub use context::ScriptContext;

use super::turn;

/// Create the `sc` helper module
pub fn create_module() -> rhai::Module {
    let mut module = rhai::Module::new();

    module.set_native_fn("markdown", |markdown: &str| -> Result<String, Box<EvalAltResult>> {
        Ok(text::markdown_to_html(markdown))
    });

    module.set_native_fn("hex_view", |data: &str| -> Result<String, Box<EvalAltResult>> {
        Ok(text::hex_view(data.as_bytes()))
    });
    module.set_native_fn("hex_view", |data: Blob| -> Result<String, Box<EvalAltResult>> {
        Ok(text::hex_view(&data))
    });

    module.set_native_fn("html_encode", |value: &str| -> Result<String, Box<EvalAltResult>> {
        Ok(text::html_encode(value))
    });

    // Scripts run on the blocking pool, so sleeping only stalls the script
    // and lets another one take its turn
    module.set_native_fn("sleep", |ms: i64| -> Result<(), Box<EvalAltResult>> {
        turn::yielding(|| std::thread::sleep(Duration::from_millis(ms.max(0) as u64)));
        Ok(())
    });

    module.set_native_fn("now", || -> Result<String, Box<EvalAltResult>> {
        Ok(chrono::Local::now().to_rfc3339())
    });

    module
}
