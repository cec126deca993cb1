//! Manual selection: pick a command from a list and run it.

use std::sync::Arc;

use serde_json::Value;

use super::context::parse_exit_code;
use crate::config::ScriptCommand;
use crate::error::Result;
use crate::host::{self, Host, InputBoxOptions, MessageLevel, QuickPickItem};

/// One choice in the selection list
#[derive(Debug, Clone, PartialEq)]
pub struct CommandEntry {
    pub id: String,
    pub label: String,
    pub description: String,
    pub arguments: Vec<Value>,
    pub ask_for_argument: bool,
}

impl CommandEntry {
    /// Entry for a configured script command
    pub fn from_command(command: &ScriptCommand) -> Self {
        Self {
            id: command.id.clone(),
            label: command.label(),
            description: command
                .description
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string(),
            arguments: command.arguments.clone(),
            ask_for_argument: command.ask_for_argument,
        }
    }

    /// Entry for one of the host's own commands
    pub fn host_command(id: &str) -> Self {
        Self {
            id: id.to_string(),
            label: id.to_string(),
            description: "(host command)".to_string(),
            arguments: Vec::new(),
            ask_for_argument: false,
        }
    }
}

/// Host command ids as entries, ordered by id ignoring case
pub fn host_entries(ids: Vec<String>) -> Vec<CommandEntry> {
    let mut entries: Vec<CommandEntry> = ids.iter().map(|id| CommandEntry::host_command(id)).collect();
    entries.sort_by_key(|e| e.id.trim().to_lowercase());
    entries
}

/// Let the user pick one of `entries` and dispatch it.
///
/// Failures are shown to the user and never returned.
pub async fn select_and_execute(host: Arc<dyn Host>, entries: Vec<CommandEntry>) {
    let mut picked_id = None;
    if let Err(e) = run(host.as_ref(), entries, &mut picked_id).await {
        let text = match picked_id {
            Some(id) => format!("[script-commands] Manual execution of {} failed: {}", id, e),
            None => format!("[script-commands] Manual execution failed: {}", e),
        };
        tracing::warn!("{}", text);
        host.show_message(MessageLevel::Error, &text);
    }
}

async fn run(host: &dyn Host, entries: Vec<CommandEntry>, picked_id: &mut Option<String>) -> Result<()> {
    if entries.is_empty() {
        host.show_message(
            MessageLevel::Warning,
            "[script-commands] No command found that can be executed!",
        );
        return Ok(());
    }

    let items = entries
        .iter()
        .map(|e| QuickPickItem {
            label: e.label.clone(),
            description: e.description.clone(),
        })
        .collect();
    let placeholder = format!("Select one of the {} commands...", entries.len());

    let Some(index) = host.show_quick_pick(items, placeholder).await? else {
        return Ok(());
    };
    let Some(entry) = entries.into_iter().nth(index) else {
        return Ok(());
    };
    *picked_id = Some(entry.id.clone());

    let mut args = entry.arguments.clone();
    if entry.ask_for_argument {
        let input = host
            .show_input_box(InputBoxOptions {
                placeholder: "Input the first argument for the execution here...".to_string(),
                ..InputBoxOptions::default()
            })
            .await?;
        args.push(input.map(Value::String).unwrap_or(Value::Null));
    }

    let result = host::dispatch(host, &entry.id, args).await?;
    if let Some(code) = parse_exit_code(&result) {
        tracing::info!("'{}' returned with exit code {}", entry.id, code);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::testing::RecordingHost;
    use futures::FutureExt;
    use serde_json::json;

    fn entry(id: &str) -> CommandEntry {
        CommandEntry::from_command(&ScriptCommand::new(id, "x.rhai"))
    }

    #[tokio::test]
    async fn empty_list_warns() {
        let host = Arc::new(RecordingHost::new());
        select_and_execute(host.clone(), vec![]).await;

        assert_eq!(
            host.messages(),
            vec![(
                MessageLevel::Warning,
                "[script-commands] No command found that can be executed!".to_string()
            )]
        );
        assert!(host.pick_requests().is_empty());
    }

    #[tokio::test]
    async fn picked_entry_is_dispatched_with_its_arguments() {
        let host = Arc::new(RecordingHost::new());
        let calls = host.capture_command("b");
        host.push_pick(Some(1));

        let mut b = ScriptCommand::new("b", "b.rhai");
        b.display_name = Some("Bee".to_string());
        b.description = Some(" second ".to_string());
        b.arguments = vec![json!(1)];
        select_and_execute(host.clone(), vec![entry("a"), CommandEntry::from_command(&b)]).await;

        let (items, placeholder) = &host.pick_requests()[0];
        assert_eq!(placeholder, "Select one of the 2 commands...");
        assert_eq!(items[1].label, "Bee");
        assert_eq!(items[1].description, "second");
        assert_eq!(calls.calls(), vec![vec![json!(1)]]);
    }

    #[tokio::test]
    async fn prompts_for_one_argument() {
        let host = Arc::new(RecordingHost::new());
        let calls = host.capture_command("a");
        host.push_pick(Some(0));
        host.push_input(Some("hello"));

        let mut a = ScriptCommand::new("a", "a.rhai");
        a.ask_for_argument = true;
        a.arguments = vec![json!("fixed")];
        select_and_execute(host.clone(), vec![CommandEntry::from_command(&a)]).await;

        assert_eq!(calls.calls(), vec![vec![json!("fixed"), json!("hello")]]);
    }

    #[tokio::test]
    async fn cancelled_prompt_passes_null() {
        let host = Arc::new(RecordingHost::new());
        let calls = host.capture_command("a");
        host.push_pick(Some(0));
        host.push_input(None);

        let mut a = ScriptCommand::new("a", "a.rhai");
        a.ask_for_argument = true;
        select_and_execute(host.clone(), vec![CommandEntry::from_command(&a)]).await;

        assert_eq!(calls.calls(), vec![vec![Value::Null]]);
    }

    #[tokio::test]
    async fn dismissed_pick_does_nothing() {
        let host = Arc::new(RecordingHost::new());
        host.push_pick(None);
        select_and_execute(host.clone(), vec![entry("a")]).await;

        assert!(host.dispatched().is_empty());
        assert!(host.messages().is_empty());
    }

    #[tokio::test]
    async fn failure_names_the_command() {
        let host = Arc::new(RecordingHost::new());
        host.on("a", |_| async { Err(Error::Script("bad".to_string())) }.boxed());
        host.push_pick(Some(0));
        select_and_execute(host.clone(), vec![entry("a")]).await;

        let (level, text) = &host.messages()[0];
        assert_eq!(*level, MessageLevel::Error);
        assert_eq!(text, "[script-commands] Manual execution of a failed: Script error: bad");
    }

    #[test]
    fn host_entries_are_sorted_ignoring_case() {
        let entries = host_entries(vec!["b.cmd".into(), "A.cmd".into(), "c.cmd".into()]);
        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["A.cmd", "b.cmd", "c.cmd"]);
        assert_eq!(entries[0].description, "(host command)");
        assert!(!entries[0].ask_for_argument);
    }
}
