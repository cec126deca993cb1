use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// The `script.commands` settings section
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Configuration {
    commands: Option<Value>,
    pub globals: Option<Value>,
    pub show_output: bool,
    #[serde(rename = "showInternalVSCommands")]
    pub show_internal_commands: bool,
    pub disable_new_version_popups: bool,
    /// Use each command's own `continueOnError` instead of its `async` flag
    pub honor_continue_on_error: bool,
    pub quick: QuickSettings,
}

impl Configuration {
    /// Build a configuration from a raw settings section; `null` yields the defaults
    pub fn from_value(value: Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value).map_err(|e| Error::Config(e.to_string()))
    }

    /// Every configured command in declaration order, each parsed on its own.
    ///
    /// `commands` may be a single object or a list. A malformed entry
    /// yields an error naming it without affecting its neighbours.
    pub fn command_entries(&self) -> Vec<Result<ScriptCommand>> {
        let entries = match &self.commands {
            None | Some(Value::Null) => return Vec::new(),
            Some(Value::Array(list)) => list.clone(),
            Some(single) => vec![single.clone()],
        };
        entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| {
                let name = match entry.get("id").and_then(Value::as_str) {
                    Some(id) => format!("'{}'", id),
                    None => format!("#{}", index),
                };
                ScriptCommand::deserialize(entry)
                    .map_err(|e| Error::Config(format!("command {}: {}", name, e)))
            })
            .collect()
    }

    /// The commands that parsed, in declaration order
    pub fn commands(&self) -> Vec<ScriptCommand> {
        self.command_entries().into_iter().filter_map(Result::ok).collect()
    }

    /// A private copy of the configured global variables
    pub fn globals(&self) -> Value {
        self.globals
            .clone()
            .unwrap_or_else(|| Value::Object(Default::default()))
    }
}

/// A configured script command
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScriptCommand {
    pub id: String,
    pub script: String,
    #[serde(deserialize_with = "as_list")]
    pub arguments: Vec<Value>,
    #[serde(deserialize_with = "truthy")]
    pub ask_for_argument: bool,
    #[serde(rename = "async", deserialize_with = "truthy_or_unset")]
    pub run_async: Option<bool>,
    pub button: Option<ButtonSettings>,
    #[serde(deserialize_with = "truthy")]
    pub cached: bool,
    #[serde(deserialize_with = "declared")]
    pub command_state: Option<Value>,
    #[serde(deserialize_with = "truthy_or_unset")]
    pub continue_on_error: Option<bool>,
    pub description: Option<String>,
    pub display_name: Option<String>,
    pub options: Option<Value>,
    #[serde(deserialize_with = "lenient_number")]
    pub sort_order: Option<f64>,
    #[serde(deserialize_with = "truthy")]
    pub suppress_arguments: bool,

    // Triggers
    #[serde(deserialize_with = "truthy")]
    pub on_startup: bool,
    #[serde(deserialize_with = "truthy")]
    pub on_close: bool,
    #[serde(deserialize_with = "truthy")]
    pub on_config_changed: bool,
    #[serde(deserialize_with = "truthy")]
    pub on_saved: bool,
    #[serde(deserialize_with = "truthy")]
    pub on_will_save: bool,
    #[serde(deserialize_with = "truthy")]
    pub on_file_changed: bool,
    #[serde(deserialize_with = "truthy")]
    pub on_new_file: bool,
    #[serde(deserialize_with = "truthy")]
    pub on_file_deleted: bool,
    #[serde(deserialize_with = "truthy")]
    pub on_file_opened: bool,
    #[serde(deserialize_with = "truthy")]
    pub on_file_closed: bool,
    #[serde(deserialize_with = "truthy")]
    pub on_editor_changed: bool,
}

impl ScriptCommand {
    pub fn new(id: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            script: script.into(),
            ..Self::default()
        }
    }

    /// Commands run asynchronously unless `async` is explicitly `false`
    pub fn is_async(&self) -> bool {
        self.run_async.unwrap_or(true)
    }

    /// Text shown in the selection list
    pub fn label(&self) -> String {
        match self.display_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.id.clone(),
        }
    }

    pub fn sort_value(&self) -> f64 {
        self.sort_order.unwrap_or(0.0)
    }
}

/// Optional status bar button of a command
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ButtonSettings {
    pub color: Option<String>,
    #[serde(deserialize_with = "truthy")]
    pub is_right: bool,
    #[serde(deserialize_with = "lenient_number")]
    pub priority: Option<f64>,
    #[serde(deserialize_with = "truthy_or_unset")]
    pub show: Option<bool>,
    pub text: Option<String>,
    pub tooltip: Option<String>,
}

/// Options of the quick execution prompt
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuickSettings {
    pub no_result_info: bool,
    pub save_results_to_state: bool,
    pub save_to_history: bool,
    pub save_to_global_history: bool,
    pub show_result_in_tab: bool,
    #[serde(deserialize_with = "declared")]
    pub state: Option<Value>,
}

/// Keeps an explicit `null` as `Some(Value::Null)` so it differs from an absent key
fn declared<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Accepts numbers and numeric strings; anything else counts as unset
fn lenient_number<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(number.filter(|n| !n.is_nan()))
}

/// Loose truthiness of a setting value
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Flags accept any value and count its truthiness
fn truthy<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(|value| is_truthy(&value))
}

/// Like [`truthy`], but `null` leaves the flag at its default
fn truthy_or_unset<'de, D>(deserializer: D) -> std::result::Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok((!value.is_null()).then(|| is_truthy(&value)))
}

/// A falsy value means no arguments, a single value becomes a one element list
fn as_list<'de, D>(deserializer: D) -> std::result::Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(list) => list,
        value if !is_truthy(&value) => Vec::new(),
        value => vec![value],
    })
}
