use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod config;
mod controller;
mod error;
mod host;
mod scripting;
#[cfg(test)]
mod testing;

use config::SettingsFile;
use controller::Controller;
use error::Result;
use host::{
    FileWatcher, Host, SaveReason, TerminalHost, TextChange, TextDocument, TextDocumentChangeEvent,
    TextDocumentWillSaveEvent,
};
use scripting::ScriptEngine;
use tokio::task::JoinSet;

const HELP: &str = "\
commands:
  run              pick a script command and run it
  host             pick any registered command and run it
  quick            evaluate an expression
  exec <id>        run a command by id
  open <file>      report a file as opened
  close <file>     report a file as closed
  edit <file>      report a change inside a file
  save <file>      report a file as saved
  reload           reload the configuration
  quit             run shutdown commands and exit";

/// What a line typed at the prompt asks for
enum Request<'a> {
    Run,
    Host,
    Quick,
    Exec(&'a str),
    Open(&'a str),
    Close(&'a str),
    Edit(&'a str),
    Save(&'a str),
    Reload,
    Help,
    Quit,
    Unknown(&'a str),
}

impl Request<'_> {
    /// Requests that talk to the user hold the prompt until they finish
    fn is_interactive(&self) -> bool {
        matches!(
            self,
            Request::Run | Request::Host | Request::Quick | Request::Help | Request::Quit | Request::Unknown(_)
        )
    }
}

fn parse_request(line: &str) -> Option<Request<'_>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let request = match (verb, rest.is_empty()) {
        ("run", _) => Request::Run,
        ("host", _) => Request::Host,
        ("quick", _) => Request::Quick,
        ("exec", false) => Request::Exec(rest),
        ("open", false) => Request::Open(rest),
        ("close", false) => Request::Close(rest),
        ("edit", false) => Request::Edit(rest),
        ("save", false) => Request::Save(rest),
        ("reload", _) => Request::Reload,
        ("help", _) | ("?", _) => Request::Help,
        ("quit", _) | ("exit", _) => Request::Quit,
        _ => Request::Unknown(line),
    };
    Some(request)
}

async fn reload(controller: &Controller, engine: &ScriptEngine) {
    engine.clear_cache();
    controller.on_did_change_configuration().await;
}

async fn handle(controller: &Controller, engine: &ScriptEngine, request: Request<'_>) -> bool {
    match request {
        Request::Run => controller.execute_command().await,
        Request::Host => controller.execute_host_command().await,
        Request::Quick => {
            if let Err(e) = controller.quick_execution().await {
                tracing::warn!("quick execution failed: {}", e);
            }
        }
        Request::Exec(id) => match host::dispatch(controller.host().as_ref(), id, Vec::new()).await {
            Ok(result) => eprintln!("{} -> {}", id, result),
            Err(e) => eprintln!("{} failed: {}", id, e),
        },
        Request::Open(file) => {
            controller
                .on_did_open_text_document(Some(&TextDocument::new(file)))
                .await
        }
        Request::Close(file) => {
            controller
                .on_did_close_text_document(Some(&TextDocument::new(file)))
                .await
        }
        Request::Edit(file) => {
            let event = TextDocumentChangeEvent {
                document: TextDocument::new(file),
                content_changes: vec![TextChange {
                    start: Default::default(),
                    end: Default::default(),
                    text: String::new(),
                }],
            };
            controller.on_did_change_text_document(Some(&event)).await
        }
        Request::Save(file) => {
            let event = TextDocumentWillSaveEvent {
                document: TextDocument::new(file),
                reason: SaveReason::Manual,
            };
            controller.on_will_save_text_document(Some(&event)).await;
            controller
                .on_did_save_text_document(Some(&event.document))
                .await
        }
        Request::Reload => reload(controller, engine).await,
        Request::Help => eprintln!("{}", HELP),
        Request::Quit => return false,
        Request::Unknown(line) => eprintln!("unknown command '{}', try 'help'", line),
    }
    true
}

fn workspace_root(arg: Option<&String>) -> Result<PathBuf> {
    let root = match arg {
        Some(path) => PathBuf::from(path),
        None => env::current_dir()?,
    };
    Ok(root.canonicalize()?)
}

fn is_settings_file(path: &Path, settings: &SettingsFile) -> bool {
    path == settings.path()
}

#[tokio::main]
async fn main() -> Result<()> {
    // Log filter comes from RUST_LOG
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Parse command line args
    let args: Vec<String> = env::args().collect();
    let root = workspace_root(args.get(1))?;
    tracing::info!("workspace {}", root.display());

    let terminal = Arc::new(TerminalHost::new(root.clone()));
    let host: Arc<dyn Host> = terminal.clone();
    let engine = Arc::new(ScriptEngine::new(root.clone()));
    let controller = Controller::new(host, engine.clone(), env!("CARGO_PKG_VERSION"));

    controller.register_entry_points()?;
    controller.on_activated().await;

    let settings = SettingsFile::for_workspace(&root);
    let mut watcher = FileWatcher::new(&root, vec![SettingsFile::workspace_state_file(&root)])?;

    eprintln!("script-commands {} ready, type 'help'", env!("CARGO_PKG_VERSION"));

    // Event batches run in the background so the prompt stays responsive
    let mut tasks = JoinSet::new();

    // Main loop
    loop {
        tokio::select! {
            line = terminal.read_line() => {
                let Some(line) = line else { break };
                let Some(request) = parse_request(&line) else { continue };
                if request.is_interactive() {
                    if !handle(&controller, &engine, request).await {
                        break;
                    }
                    continue;
                }
                let (controller, engine) = (controller.clone(), engine.clone());
                tasks.spawn(async move {
                    if let Some(request) = parse_request(&line) {
                        handle(&controller, &engine, request).await;
                    }
                });
            }
            Some(event) = watcher.next() => {
                let settings_changed = is_settings_file(&event.path, &settings);
                let (controller, engine) = (controller.clone(), engine.clone());
                tasks.spawn(async move {
                    if settings_changed {
                        reload(&controller, &engine).await;
                    } else {
                        controller.on_file_event(&event).await;
                    }
                });
            }
            Some(done) = tasks.join_next() => {
                if let Err(e) = done {
                    tracing::warn!("background task failed: {}", e);
                }
            }
        }
    }

    // Cleanup
    controller.on_deactivate().await;
    controller.dispose();

    Ok(())
}
