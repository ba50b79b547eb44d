//! Command handlers for the colloquy binary
//!
//! Handlers write user-facing output to `out` and leave diagnostics to
//! `tracing`, which logs to stderr.

use crate::cli::GraphFormat;
use anyhow::{Context, Result};
use colloquy_core::state::from_value;
use colloquy_core::{CompiledGraph, ReportTree, State, StreamEvent, ThreadStatus};
use colloquy_roles::content::fields;
use colloquy_roles::workflow::{EXPLORE, HUMAN, REPORTER};
use colloquy_roles::{
    ClassroomBuilder, ColloquyConfig, CriticContent, Document, ScriptedModel, StaticRetriever,
};
use futures::StreamExt;
use serde_json::{json, Value};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Documents used when no corpus file is given.
pub fn demo_corpus() -> Vec<Document> {
    vec![
        Document::new("Tariffs raise the price of imported goods for domestic buyers.")
            .with_source("trade brief"),
        Document::new("Trading partners often answer tariffs with retaliatory tariffs on exports.")
            .with_source("policy review"),
        Document::new("Steel tariffs were followed by new investment in domestic mills.")
            .with_source("industry report"),
        Document::new("Washing machine tariffs raised retail prices by about twelve percent.")
            .with_source("price survey"),
    ]
}

pub async fn load_corpus(path: &Path) -> Result<Vec<Document>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read corpus {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("corpus {} is not a JSON array of documents", path.display()))
}

/// Assemble the classroom graph described by `config`.
pub async fn build_graph(config: &ColloquyConfig, corpus: Option<&Path>) -> Result<CompiledGraph> {
    let documents = match corpus {
        Some(path) => load_corpus(path).await?,
        None => demo_corpus(),
    };
    let saver = config
        .checkpoint
        .open_saver()
        .await
        .context("failed to open checkpoint store")?;
    info!(
        documents = documents.len(),
        backend = ?config.checkpoint.backend,
        "Building classroom workflow"
    );

    let graph = ClassroomBuilder::new(
        Arc::new(ScriptedModel::classroom()),
        Arc::new(StaticRetriever::new(documents)),
    )
    .with_workflow(config.workflow.clone())
    .with_engine_config(config.engine.clone())
    .with_checkpointer(saver)
    .build()?;
    Ok(graph)
}

/// Handle run command
pub async fn handle_run(
    graph: &CompiledGraph,
    out: &mut impl Write,
    thread: &str,
    query: &str,
    stream: bool,
) -> Result<()> {
    let input = from_value(json!({ "query": query }))?;
    execute(graph, out, thread, Some(input), stream)
        .await
        .with_context(|| format!("failed to run thread '{thread}'"))
}

/// The input a resume command supplies, if any.
pub fn resume_input(point: Option<usize>, case: Option<usize>, explore: Option<usize>) -> Option<State> {
    let mut input = State::new();
    if let Some(point) = point {
        input.insert(
            fields::HUMAN_SELECTION.into(),
            json!({ "point": point, "case": case.unwrap_or(0) }),
        );
    }
    if let Some(point) = explore {
        input.insert(fields::POINT_SELECTION.into(), json!({ "point": point }));
    }
    (!input.is_empty()).then_some(input)
}

/// Handle resume command
pub async fn handle_resume(
    graph: &CompiledGraph,
    out: &mut impl Write,
    thread: &str,
    input: Option<State>,
    stream: bool,
) -> Result<()> {
    // Resuming never starts a thread; a mistyped id would otherwise run from
    // the entry node with no query.
    let resumed = match graph.get_state(thread).await {
        Ok(_) => execute(graph, out, thread, input, stream).await,
        Err(e) => Err(e.into()),
    };
    resumed.with_context(|| format!("failed to resume thread '{thread}'"))
}

async fn execute(
    graph: &CompiledGraph,
    out: &mut impl Write,
    thread: &str,
    input: Option<State>,
    stream: bool,
) -> Result<()> {
    if stream {
        let mut events = graph.stream(thread, input).await?;
        while let Some(event) = events.next().await {
            match event? {
                StreamEvent::NodeStart { node } => writeln!(out, "[{node}]")?,
                StreamEvent::Update {
                    node,
                    update,
                    is_final: false,
                } if node == REPORTER => {
                    if let Some(delta) = update.get(fields::REPORTER_CONTENT).and_then(Value::as_str) {
                        write!(out, "{delta}")?;
                        out.flush()?;
                    }
                }
                StreamEvent::Update {
                    node,
                    is_final: true,
                    ..
                } if node == REPORTER => writeln!(out)?,
                _ => {}
            }
        }
    } else {
        let state = graph.invoke(thread, input).await?;
        if let Some(report) = state.get(fields::REPORTER_CONTENT).and_then(Value::as_str) {
            writeln!(out, "{report}")?;
        }
    }
    summarize(graph, out, thread).await
}

/// Describe where the thread stands and what to do next.
async fn summarize(graph: &CompiledGraph, out: &mut impl Write, thread: &str) -> Result<()> {
    let snapshot = graph.get_state(thread).await?;
    let values = &snapshot.values;
    writeln!(out)?;

    match (snapshot.status, snapshot.next.as_deref()) {
        (ThreadStatus::Done, _) => {
            writeln!(out, "Thread '{thread}' is done.")?;
            if let Some(check) = values.get(fields::CHECK_CONTENT).and_then(Value::as_str) {
                writeln!(out, "\n{check}")?;
            }
        }
        (ThreadStatus::Paused, Some(HUMAN)) => {
            write_explored(out, values)?;
            let content: Option<CriticContent> = values
                .get(fields::CRITIC_CONTENT)
                .cloned()
                .map(serde_json::from_value)
                .transpose()?;
            writeln!(out, "Discussion points:")?;
            for (i, point) in content.iter().flat_map(|c| c.points.iter()).enumerate() {
                writeln!(out, "  {i}. {}", point.title)?;
                for (j, case) in point.cases.iter().enumerate() {
                    writeln!(out, "     case {j}: {case}")?;
                }
            }
            writeln!(
                out,
                "\nPaused before '{HUMAN}'. Continue with: colloquy resume --thread {thread} --point <P> --case <C>"
            )?;
        }
        (ThreadStatus::Paused, Some(EXPLORE)) => {
            let tree = ReportTree::from_state(values)?;
            if let Some(root) = tree.root() {
                writeln!(out, "Report points:")?;
                for (i, point) in root.points.iter().enumerate() {
                    writeln!(out, "  {i}. {}", point.title)?;
                }
            }
            writeln!(
                out,
                "\nPaused before '{EXPLORE}'. Continue with: colloquy resume --thread {thread} --explore <P>, or without --explore to skip"
            )?;
        }
        (status, next) => {
            let next = next.unwrap_or("nothing");
            writeln!(
                out,
                "Thread '{thread}' is {status:?} before '{next}'. Continue with: colloquy resume --thread {thread}"
            )?;
        }
    }
    Ok(())
}

/// List every detailed report as a trail of titles from the root report.
fn write_explored(out: &mut impl Write, values: &State) -> Result<()> {
    let tree = ReportTree::from_state(values)?;
    let Some(root) = tree.root() else {
        return Ok(());
    };

    let mut pending = tree.children(&root.id);
    if pending.is_empty() {
        return Ok(());
    }
    writeln!(out, "Explored reports:")?;
    pending.reverse();
    while let Some(report) = pending.pop() {
        let trail: Vec<&str> = tree
            .path(&report.id)
            .iter()
            .map(|r| r.title.as_str())
            .collect();
        writeln!(out, "  {}", trail.join(" > "))?;
        pending.extend(tree.children(&report.id).into_iter().rev());
    }
    writeln!(out)?;
    Ok(())
}

/// Handle state command
pub async fn handle_state(graph: &CompiledGraph, out: &mut impl Write, thread: &str) -> Result<()> {
    let snapshot = graph
        .get_state(thread)
        .await
        .with_context(|| format!("failed to read thread '{thread}'"))?;
    writeln!(out, "{}", serde_json::to_string_pretty(&snapshot)?)?;
    Ok(())
}

/// Handle clear command
pub async fn handle_clear(graph: &CompiledGraph, out: &mut impl Write, thread: &str) -> Result<()> {
    graph
        .clear_thread(thread)
        .await
        .with_context(|| format!("failed to clear thread '{thread}'"))?;
    writeln!(out, "Cleared thread '{thread}'")?;
    Ok(())
}

/// Handle threads command
pub async fn handle_threads(graph: &CompiledGraph, out: &mut impl Write) -> Result<()> {
    let threads = graph.list_threads().await?;
    if threads.is_empty() {
        writeln!(out, "No threads found")?;
    }
    for thread in threads {
        writeln!(out, "{thread}")?;
    }
    Ok(())
}

/// Handle graph command
pub fn handle_graph(graph: &CompiledGraph, out: &mut impl Write, format: GraphFormat) -> Result<()> {
    write!(out, "{}", graph.visualize(&format.options()))?;
    Ok(())
}
