use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crossterm::style::{Color, Stylize};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use super::{
    CommandFuture, CommandHandler, CommandRegistry, Disposable, Host, InputBoxOptions, Memento,
    MessageLevel, QuickPickItem, StatusBarAlignment, StatusBarItem,
};
use crate::config::SettingsFile;
use crate::error::Result;

type InputLines = Arc<tokio::sync::Mutex<Lines<BufReader<Stdin>>>>;

#[derive(Default)]
struct OutputChannel {
    lines: Vec<String>,
    revealed: bool,
}

/// A line-oriented host running in a terminal.
///
/// Prompts read from stdin, everything else is written to stderr. Output
/// lines are buffered until the channel is revealed.
pub struct TerminalHost {
    root: PathBuf,
    registry: CommandRegistry,
    input: InputLines,
    output: Arc<Mutex<OutputChannel>>,
    global: Memento,
    workspace: Memento,
}

impl TerminalHost {
    pub fn new(root: PathBuf) -> Self {
        let global = match SettingsFile::global_state_file() {
            Some(path) => Memento::load(path),
            None => Memento::in_memory(),
        };
        let workspace = Memento::load(SettingsFile::workspace_state_file(&root));

        Self {
            root,
            registry: CommandRegistry::new(),
            input: Arc::new(tokio::sync::Mutex::new(
                BufReader::new(tokio::io::stdin()).lines(),
            )),
            output: Arc::new(Mutex::new(OutputChannel::default())),
            global,
            workspace,
        }
    }

    /// Next line from stdin, `None` on end of input
    pub async fn read_line(&self) -> Option<String> {
        read_line(&self.input).await
    }
}

async fn read_line(input: &InputLines) -> Option<String> {
    let mut lines = input.lock().await;
    lines.next_line().await.ok().flatten()
}

fn prompt(text: &str) {
    let mut stderr = std::io::stderr();
    let _ = write!(stderr, "{} ", text.cyan());
    let _ = stderr.flush();
}

impl Host for TerminalHost {
    fn register_command(&self, id: &str, handler: CommandHandler) -> Result<Box<dyn Disposable>> {
        Ok(Box::new(self.registry.register(id, handler)?))
    }

    fn execute_command(&self, id: &str, args: Vec<Value>) -> Result<CommandFuture> {
        self.registry.execute(id, args)
    }

    fn get_commands(&self, filter_internal: bool) -> BoxFuture<'static, Result<Vec<String>>> {
        let ids: Vec<String> = self
            .registry
            .ids()
            .into_iter()
            .filter(|id| !filter_internal || !id.starts_with('_'))
            .collect();
        async move { Ok(ids) }.boxed()
    }

    fn create_status_bar_item(
        &self,
        alignment: StatusBarAlignment,
        priority: Option<f64>,
    ) -> Result<Box<dyn StatusBarItem>> {
        Ok(Box::new(TerminalStatusItem {
            alignment,
            priority,
            ..TerminalStatusItem::default()
        }))
    }

    fn show_quick_pick(
        &self,
        items: Vec<QuickPickItem>,
        placeholder: String,
    ) -> BoxFuture<'static, Result<Option<usize>>> {
        let input = Arc::clone(&self.input);
        async move {
            for (i, item) in items.iter().enumerate() {
                if item.description.is_empty() {
                    eprintln!("  {:>3}) {}", i + 1, item.label);
                } else {
                    eprintln!("  {:>3}) {}  {}", i + 1, item.label, item.description.as_str().dim());
                }
            }
            prompt(&placeholder);

            let Some(line) = read_line(&input).await else {
                return Ok(None);
            };
            let picked = line
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n >= 1 && *n <= items.len())
                .map(|n| n - 1);
            Ok(picked)
        }
        .boxed()
    }

    fn show_input_box(&self, options: InputBoxOptions) -> BoxFuture<'static, Result<Option<String>>> {
        let input = Arc::clone(&self.input);
        async move {
            if let Some(text) = &options.prompt {
                eprintln!("{}", text);
            }
            match &options.value {
                Some(value) if !value.is_empty() => {
                    prompt(&format!("{} [{}]", options.placeholder, value))
                }
                _ => prompt(&options.placeholder),
            }

            let Some(line) = read_line(&input).await else {
                return Ok(None);
            };
            if line.trim().is_empty() {
                return Ok(Some(options.value.unwrap_or_default()));
            }
            Ok(Some(line))
        }
        .boxed()
    }

    fn show_message(&self, level: MessageLevel, text: &str) {
        match level {
            MessageLevel::Info => eprintln!("{} {}", "info".green().bold(), text),
            MessageLevel::Warning => eprintln!("{} {}", "warning".yellow().bold(), text),
            MessageLevel::Error => eprintln!("{} {}", "error".red().bold(), text),
        }
    }

    fn append_output(&self, line: &str) {
        tracing::debug!(target: "output", "{}", line);
        if let Ok(mut output) = self.output.lock() {
            if output.revealed {
                eprintln!("{}", line.dim());
            }
            output.lines.push(line.to_string());
        }
    }

    fn show_output(&self) {
        if let Ok(mut output) = self.output.lock() {
            if !output.revealed {
                for line in &output.lines {
                    eprintln!("{}", line.as_str().dim());
                }
                output.revealed = true;
            }
        }
    }

    fn preview_html(&self, title: &str, html: &str) -> BoxFuture<'static, Result<()>> {
        let dir = SettingsFile::data_dir()
            .unwrap_or_else(|| self.root.join(".vscode"))
            .join("preview");
        let file_name: String = title
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        let path = dir.join(format!("{}.html", file_name));
        let html = html.to_string();
        let title = title.to_string();

        async move {
            tokio::fs::create_dir_all(&dir).await?;
            tokio::fs::write(&path, html).await?;
            eprintln!("{} {} -> {}", "preview".magenta().bold(), title, path.display());
            Ok(())
        }
        .boxed()
    }

    fn configuration(&self, section: &str) -> Result<Value> {
        SettingsFile::for_workspace(&self.root).load_section(section)
    }

    fn global_memento(&self) -> &Memento {
        &self.global
    }

    fn workspace_memento(&self) -> &Memento {
        &self.workspace
    }

    fn workspace_root(&self) -> &Path {
        &self.root
    }
}

#[derive(Debug)]
struct TerminalStatusItem {
    alignment: StatusBarAlignment,
    priority: Option<f64>,
    text: String,
    tooltip: String,
    color: String,
    command: String,
    visible: bool,
}

impl Default for TerminalStatusItem {
    fn default() -> Self {
        Self {
            alignment: StatusBarAlignment::Left,
            priority: None,
            text: String::new(),
            tooltip: String::new(),
            color: String::new(),
            command: String::new(),
            visible: false,
        }
    }
}

impl StatusBarItem for TerminalStatusItem {
    fn set_text(&mut self, text: &str) {
        self.text = text.to_string();
    }

    fn set_tooltip(&mut self, tooltip: &str) {
        self.tooltip = tooltip.to_string();
    }

    fn set_color(&mut self, color: &str) {
        self.color = color.to_string();
    }

    fn set_command(&mut self, command: &str) {
        self.command = command.to_string();
    }

    fn show(&mut self) {
        if !self.visible {
            self.visible = true;
            let side = match self.alignment {
                StatusBarAlignment::Left => "left",
                StatusBarAlignment::Right => "right",
            };
            let priority = self.priority.map(|p| format!(" #{}", p)).unwrap_or_default();
            let text = match Color::try_from(self.color.as_str()) {
                Ok(color) => self.text.as_str().with(color).bold(),
                Err(_) => self.text.as_str().bold(),
            };
            eprintln!(
                "{} [{}{}] {} ({}) {}",
                "status".blue().bold(),
                side,
                priority,
                text,
                self.command,
                self.tooltip.as_str().dim()
            );
        }
    }

    fn hide(&mut self) {
        self.visible = false;
    }
}

impl Disposable for TerminalStatusItem {
    fn dispose(&mut self) {
        if self.visible {
            tracing::debug!("status item '{}' removed", self.text);
        }
        self.visible = false;
    }
}
