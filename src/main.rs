//! Research chat - terminal client
//!
//! Asks the backend a question and streams the answer to stdout while
//! progress, references and errors go to stderr. With no arguments it reads
//! one question per line; a new line supersedes a turn still streaming.

use research_chat::config::ToolPreference;
use research_chat::runtime::run_turn;
use research_chat::transport::{ChatTransport, HttpTransport};
use research_chat::{ChatRequest, ClientConfig, EventDispatcher, TerminalSink, ToolCatalog, ToolSelection};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type Sink = TerminalSink<std::io::Stdout, std::io::Stderr>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs share stderr with the diagnostics; stdout carries only the answer
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "research_chat=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = ClientConfig::from_env()?;
    tracing::info!(url = %config.backend_url, "Using backend");
    let transport = HttpTransport::new(&config)?;

    let catalog = match transport.fetch_tools().await {
        Ok(catalog) => {
            tracing::info!(tools = catalog.tools().len(), "Tool catalog loaded");
            Some(catalog)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Tool catalog unavailable");
            None
        }
    };
    let selection = resolve_selection(catalog.as_ref(), &config.tools);

    let mut dispatcher = EventDispatcher::new(TerminalSink::stdio(config.tool_output_limit));

    let question = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if !question.trim().is_empty() {
        let request = ChatRequest::new(question, selection)?;
        let report = run_turn(&transport, &mut dispatcher, request, CancellationToken::new()).await;
        if report.failed() {
            std::process::exit(1);
        }
        return Ok(());
    }

    interactive(&transport, &mut dispatcher, catalog.as_ref(), &selection).await
}

/// Pick the tools to send. Without a catalog, named tools are passed through
/// for the backend to judge.
fn resolve_selection(catalog: Option<&ToolCatalog>, preference: &ToolPreference) -> ToolSelection {
    match (catalog, preference) {
        (Some(catalog), ToolPreference::All) => catalog.select_all(),
        (None, ToolPreference::All) => ToolSelection::none(),
        (Some(catalog), ToolPreference::Named(names)) => {
            let known = names.iter().filter(|name| {
                let known = catalog.contains(name);
                if !known {
                    tracing::warn!(tool = %name, "Skipping tool not offered by the backend");
                }
                known
            });
            ToolSelection::from_names(known.cloned())
        }
        (None, ToolPreference::Named(names)) => ToolSelection::from_names(names.iter().cloned()),
    }
}

async fn interactive<T: ChatTransport>(
    transport: &T,
    dispatcher: &mut EventDispatcher<Sink>,
    catalog: Option<&ToolCatalog>,
    selection: &ToolSelection,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
    let mut pending: Option<String> = None;

    loop {
        let line = match pending.take() {
            Some(line) => line,
            None => {
                prompt();
                match lines.next().await {
                    Some(line) => line?,
                    None => return Ok(()),
                }
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/tools" {
            list_tools(catalog, selection);
            continue;
        }

        let request = ChatRequest::new(line, selection.clone())?;
        let cancel = CancellationToken::new();
        let turn = run_turn(transport, dispatcher, request, cancel.clone());
        tokio::pin!(turn);

        let mut stdin_open = true;
        loop {
            tokio::select! {
                _ = &mut turn => break,
                next = lines.next(), if stdin_open => match next {
                    Some(Ok(line)) if !line.trim().is_empty() => {
                        // Supersede the streaming turn with the new question
                        cancel.cancel();
                        pending = Some(line);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "Failed to read stdin");
                        stdin_open = false;
                    }
                    None => stdin_open = false,
                },
            }
        }

        if !stdin_open && pending.is_none() {
            return Ok(());
        }
    }
}

fn prompt() {
    let mut stderr = std::io::stderr();
    if let Err(e) = write!(stderr, "> ").and_then(|()| stderr.flush()) {
        tracing::debug!(error = %e, "Failed to write prompt");
    }
}

fn list_tools(catalog: Option<&ToolCatalog>, selection: &ToolSelection) {
    let Some(catalog) = catalog else {
        eprintln!("~ tool catalog unavailable");
        return;
    };
    if catalog.is_empty() {
        eprintln!("~ backend offers no tools");
        return;
    }
    for tool in catalog.tools() {
        let mark = if selection.contains(&tool.name) { '*' } else { ' ' };
        eprintln!("{mark} {} - {}", tool.name, tool.description);
    }
}
