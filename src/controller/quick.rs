//! Quick execution: evaluate one expression in the sandbox.
//!
//! The prompt is pre-filled with the last expression. `state`, `prev` and
//! `next_value` survive between runs until the next reload; whatever an
//! expression writes to `next_value` becomes `prev` for the next one. A
//! failing expression shows the error and prompts again.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::html::HtmlDocuments;
use crate::config::QuickSettings;
use crate::error::Result;
use crate::host::{self, Host, InputBoxOptions, Memento, MessageLevel};
use crate::scripting::api::text::html_encode;
use crate::scripting::{QuickScope, Sandbox};

const KEY_LAST_EXPRESSION: &str = "scriptCommandsLastQuickCommand";
const KEY_HISTORY: &str = "scriptCommandsQuickCommandHistory";

/// A remembered expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Stored history without blanks and duplicates, first occurrence wins
fn load_history(memento: &Memento) -> Vec<HistoryEntry> {
    let entries: Vec<HistoryEntry> = memento
        .get(KEY_HISTORY)
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();
    normalize_history(entries)
}

fn normalize_history(entries: Vec<HistoryEntry>) -> Vec<HistoryEntry> {
    let mut out: Vec<HistoryEntry> = Vec::new();
    for mut entry in entries {
        if entry.expression.trim().is_empty() {
            continue;
        }
        if out.iter().any(|e| e.expression == entry.expression) {
            continue;
        }
        entry.description = entry
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        out.push(entry);
    }
    out
}

/// Show a result the way a person would read it
fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn result_html(expression: &str, value: &Value) -> String {
    let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    format!(
        "<h1>Quick execution</h1>\n<pre><code>{}</code></pre>\n<h2>Result</h2>\n<pre><code>{}</code></pre>\n",
        html_encode(expression),
        html_encode(&pretty)
    )
}

pub struct QuickExecution {
    sandbox: Arc<Sandbox>,
    vars: Mutex<QuickScope>,
    settings: Mutex<QuickSettings>,
}

impl QuickExecution {
    pub fn new() -> Self {
        Self {
            sandbox: Arc::new(Sandbox::new()),
            vars: Mutex::new(QuickScope::default()),
            settings: Mutex::new(QuickSettings::default()),
        }
    }

    /// Forget everything from earlier runs
    pub fn reset(&self, settings: &QuickSettings, globals: Value) {
        if let Ok(mut vars) = self.vars.lock() {
            *vars = QuickScope {
                state: settings.state.clone().unwrap_or(Value::Null),
                prev: Value::Null,
                next_value: Value::Null,
                globals,
            };
        }
        if let Ok(mut current) = self.settings.lock() {
            *current = settings.clone();
        }
    }

    pub fn state(&self) -> Value {
        self.vars.lock().map(|v| v.state.clone()).unwrap_or_default()
    }

    /// Prompt for expressions until one succeeds or the prompt is dismissed
    pub async fn run(&self, host: &dyn Host, html: &HtmlDocuments) -> Result<Value> {
        loop {
            let last = host
                .workspace_memento()
                .get(KEY_LAST_EXPRESSION)
                .and_then(|v| v.as_str().map(str::to_string));

            let input = host
                .show_input_box(InputBoxOptions {
                    placeholder: "Rhai expression, e.g. 1 + 2".to_string(),
                    prompt: Some("The expression to execute...".to_string()),
                    value: last,
                })
                .await?;
            let Some(expression) = input.filter(|e| !e.trim().is_empty()) else {
                return Ok(Value::Null);
            };

            match self.execute(host, html, &expression).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tracing::debug!("quick expression failed: {}", e);
                    host.show_message(MessageLevel::Error, &format!("[script-commands] {}", e));
                }
            }
        }
    }

    /// Evaluate one expression and present its result
    pub async fn execute(&self, host: &dyn Host, html: &HtmlDocuments, expression: &str) -> Result<Value> {
        let settings = self.settings.lock().map(|s| s.clone()).unwrap_or_default();
        let mut vars = self.vars.lock().map(|v| v.clone()).unwrap_or_default();
        vars.next_value = Value::Null;

        let sandbox = Arc::clone(&self.sandbox);
        let source = expression.to_string();
        let (outcome, vars) = tokio::task::spawn_blocking(move || {
            let outcome = sandbox.eval(&source, &mut vars);
            (outcome, vars)
        })
        .await?;

        // Keep state and hand over the next value, even on failure
        if let Ok(mut current) = self.vars.lock() {
            current.state = vars.state;
            current.prev = vars.next_value;
        }

        if let Err(e) = host
            .workspace_memento()
            .update(KEY_LAST_EXPRESSION, json!(expression))
        {
            host::log_line(host, format!("[ERROR] quick execution: {}", e));
        }
        if settings.save_to_history {
            let memento = if settings.save_to_global_history {
                host.global_memento()
            } else {
                host.workspace_memento()
            };
            let mut history = load_history(memento);
            history.push(HistoryEntry {
                expression: expression.to_string(),
                description: None,
            });
            let history = normalize_history(history);
            if let Err(e) = memento.update(KEY_HISTORY, json!(history)) {
                host::log_line(host, format!("[ERROR] quick execution: {}", e));
            }
        }

        let value = outcome?;
        if settings.save_results_to_state {
            if let Ok(mut current) = self.vars.lock() {
                current.state = value.clone();
            }
        }

        if !value.is_null() && !settings.no_result_info {
            if settings.show_result_in_tab {
                let opened = html
                    .open(
                        host,
                        &result_html(expression, &value),
                        Some("[script-commands] Quick execution result"),
                        None,
                    )
                    .await;
                if let Err(e) = opened {
                    host::log_line(host, format!("[ERROR] quick execution: {}", e));
                }
            } else {
                host.show_message(MessageLevel::Info, &display(&value));
            }
        }

        Ok(value)
    }
}

impl Default for QuickExecution {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingHost;

    fn settings(f: impl FnOnce(&mut QuickSettings)) -> QuickSettings {
        let mut settings = QuickSettings::default();
        f(&mut settings);
        settings
    }

    #[tokio::test]
    async fn result_is_shown_and_prev_is_threaded() {
        let host = RecordingHost::new();
        let quick = QuickExecution::new();
        quick.reset(&QuickSettings::default(), json!({ "name": "w" }));
        let html = HtmlDocuments::new();

        let value = quick.execute(&host, &html, "next_value = 41; globals.name").await.unwrap();
        assert_eq!(value, json!("w"));
        let value = quick.execute(&host, &html, "prev + 1").await.unwrap();
        assert_eq!(value, json!(42));

        let infos: Vec<String> = host.messages().into_iter().map(|(_, m)| m).collect();
        assert_eq!(infos, vec!["w".to_string(), "42".to_string()]);
        assert_eq!(
            host.workspace_memento().get(KEY_LAST_EXPRESSION),
            Some(json!("prev + 1"))
        );
    }

    #[tokio::test]
    async fn results_can_become_state() {
        let host = RecordingHost::new();
        let quick = QuickExecution::new();
        quick.reset(
            &settings(|s| {
                s.save_results_to_state = true;
                s.no_result_info = true;
                s.state = Some(json!(1));
            }),
            json!({}),
        );
        let html = HtmlDocuments::new();

        assert_eq!(quick.state(), json!(1));
        quick.execute(&host, &html, "state + 10").await.unwrap();
        assert_eq!(quick.state(), json!(11));
        assert!(host.messages().is_empty());
    }

    #[tokio::test]
    async fn history_is_deduplicated() {
        let host = RecordingHost::new();
        let quick = QuickExecution::new();
        quick.reset(&settings(|s| s.save_to_history = true), json!({}));
        let html = HtmlDocuments::new();

        for expr in ["1 + 1", "2 + 2", "1 + 1"] {
            quick.execute(&host, &html, expr).await.unwrap();
        }

        let history = load_history(host.workspace_memento());
        let expressions: Vec<&str> = history.iter().map(|h| h.expression.as_str()).collect();
        assert_eq!(expressions, vec!["1 + 1", "2 + 2"]);
        assert_eq!(host.global_memento().get(KEY_HISTORY), None);
    }

    #[tokio::test]
    async fn failing_expression_prompts_again() {
        let host = RecordingHost::new();
        let quick = QuickExecution::new();
        quick.reset(&QuickSettings::default(), json!({}));
        let html = HtmlDocuments::new();
        host.push_input(Some("this is not rhai ("));
        host.push_input(Some("6 * 7"));

        let value = quick.run(&host, &html).await.unwrap();
        assert_eq!(value, json!(42));

        let messages = host.messages();
        assert_eq!(messages[0].0, MessageLevel::Error);
        assert_eq!(messages[1], (MessageLevel::Info, "42".to_string()));
        // Second prompt is pre-filled with the failed expression
        assert_eq!(
            host.input_requests()[1].value.as_deref(),
            Some("this is not rhai (")
        );
    }

    #[tokio::test]
    async fn dismissed_prompt_ends_quietly() {
        let host = RecordingHost::new();
        let quick = QuickExecution::new();
        let html = HtmlDocuments::new();
        assert_eq!(quick.run(&host, &html).await.unwrap(), Value::Null);
        assert!(host.messages().is_empty());
    }

    #[tokio::test]
    async fn result_can_open_in_tab() {
        let host = RecordingHost::new();
        let quick = QuickExecution::new();
        quick.reset(&settings(|s| s.show_result_in_tab = true), json!({}));
        let html = HtmlDocuments::new();
        let opened = host.capture_command(crate::controller::OPEN_HTML_DOC);

        quick.execute(&host, &html, "\"<b>\"").await.unwrap();

        let calls = opened.calls();
        assert_eq!(calls.len(), 1);
        let id = calls[0][0].as_str().unwrap();
        let doc = html.find(id).unwrap();
        assert_eq!(doc.title.as_deref(), Some("[script-commands] Quick execution result"));
        assert!(doc.body.contains("&lt;b&gt;"));
    }

    #[test]
    fn history_normalization() {
        let entries = normalize_history(vec![
            HistoryEntry { expression: " ".into(), description: None },
            HistoryEntry { expression: "a".into(), description: Some("  ".into()) },
            HistoryEntry { expression: "a".into(), description: Some("dup".into()) },
        ]);
        assert_eq!(
            entries,
            vec![HistoryEntry { expression: "a".into(), description: None }]
        );
    }
}
