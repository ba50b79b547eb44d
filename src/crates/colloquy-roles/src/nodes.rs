//! Role nodes of the classroom workflow
//!
//! Each constructor returns a handler ready for
//! [`StateGraph::add_node`](colloquy_core::StateGraph::add_node) (or
//! `add_streaming_node` for the reporter). Handlers read what they need from
//! the state, call the collaborators in [`RoleContext`] and return a partial
//! update holding only the fields they own:
//!
//! | Node | Reads | Writes |
//! |------|-------|--------|
//! | [`reporter`] | `query` | `reporter_content`, `report_id`, `reports` |
//! | [`critic`] | `reporter_content`, `critic_content`, `ta_feedback` | `critic_content`, `critic_passes` |
//! | [`ta_review`] | `reporter_content`, `critic_content` | `ta_feedback` |
//! | [`human`] | `human_selection`, `critic_content` | nothing |
//! | [`check`] | `human_selection`, `critic_content` | `check_content` |
//! | [`explore`] | `point_selection`, `report_id`, `reports` | `explored_content`, `reports`, or nothing without a selection |
//!
//! Role failures become node errors, so the engine keeps the last
//! checkpoint and the node runs again on the next invoke.

use crate::content::{fields, CriticContent, HumanSelection, PointSelection, TaFeedback};
use crate::error::{Result, RoleError};
use crate::model::{Retriever, TextModel, TextStream};
use crate::templates::{self, render};
use colloquy_core::graph::{NodeResult, UpdateStream};
use colloquy_core::report::REPORTS_FIELD;
use colloquy_core::state::fields::QUERY;
use colloquy_core::{
    NodeError, ReportError, ReportTree, State, StateExt, StateUpdate, StreamUpdate,
    TextAccumulator,
};
use futures::future::BoxFuture;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// Collaborators and limits shared by the role nodes.
#[derive(Clone)]
pub struct RoleContext {
    pub model: Arc<dyn TextModel>,
    pub retriever: Arc<dyn Retriever>,
    /// Documents retrieved per prompt.
    pub retrieval_limit: usize,
    /// Deepest level of detailed reports the explorer may create.
    pub max_report_depth: usize,
}

impl RoleContext {
    pub fn new(model: Arc<dyn TextModel>, retriever: Arc<dyn Retriever>) -> Self {
        Self {
            model,
            retriever,
            retrieval_limit: 4,
            max_report_depth: 2,
        }
    }

    pub fn with_retrieval_limit(mut self, limit: usize) -> Self {
        self.retrieval_limit = limit;
        self
    }

    pub fn with_max_report_depth(mut self, depth: usize) -> Self {
        self.max_report_depth = depth;
        self
    }

    async fn context_for(&self, query: &str) -> Result<String> {
        let documents = self.retriever.retrieve(query, self.retrieval_limit).await?;
        Ok(templates::format_context(&documents))
    }
}

impl std::fmt::Debug for RoleContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleContext")
            .field("retrieval_limit", &self.retrieval_limit)
            .field("max_report_depth", &self.max_report_depth)
            .finish_non_exhaustive()
    }
}

fn required_str(state: &State, field: &str) -> Result<String> {
    state
        .str_field(field)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| RoleError::MissingField(field.to_string()))
}

fn required<T: DeserializeOwned>(state: &State, field: &str) -> Result<T> {
    state
        .typed_field(field)?
        .ok_or_else(|| RoleError::MissingField(field.to_string()))
}

/// A caller-supplied selection: missing and malformed are reported as such.
fn selection<T: DeserializeOwned>(state: &State, field: &str) -> Result<T> {
    state
        .typed_field(field)
        .map_err(|e| RoleError::invalid_selection(field, e.to_string()))?
        .ok_or_else(|| RoleError::MissingField(field.to_string()))
}

fn unary<F, Fut>(
    ctx: RoleContext,
    role: &'static str,
    run: F,
) -> impl Fn(State) -> BoxFuture<'static, NodeResult> + Send + Sync + 'static
where
    F: Fn(RoleContext, State) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StateUpdate>> + Send + 'static,
{
    move |state: State| -> BoxFuture<'static, NodeResult> {
        let fut = run(ctx.clone(), state);
        Box::pin(async move {
            fut.await.map_err(|e| {
                warn!(role, error = %e, "Role failed");
                NodeError::from(e)
            })
        })
    }
}

/// Streaming reporter: drafts a report on `query` from retrieved material
/// and records it as the root of the thread's report tree.
pub fn reporter(ctx: RoleContext) -> impl Fn(State) -> UpdateStream + Send + Sync + 'static {
    move |state: State| -> UpdateStream {
        let ctx = ctx.clone();
        Box::pin(async_stream::stream! {
            let (query, mut deltas) = match start_report(&ctx, &state).await {
                Ok(started) => started,
                Err(e) => {
                    warn!(role = "reporter", error = %e, "Role failed");
                    yield Err(NodeError::from(e));
                    return;
                }
            };

            let mut acc = TextAccumulator::new(fields::REPORTER_CONTENT);
            while let Some(delta) = deltas.next().await {
                match delta {
                    Ok(delta) => {
                        let (next, update) = acc.push(delta);
                        acc = next;
                        yield Ok(update);
                    }
                    Err(e) => {
                        warn!(role = "reporter", error = %e, "Model stream failed");
                        yield Err(NodeError::from(e));
                        return;
                    }
                }
            }

            match finish_report(&state, &query, acc) {
                Ok(last) => yield Ok(last),
                Err(e) => yield Err(NodeError::from(e)),
            }
        })
    }
}

async fn start_report(ctx: &RoleContext, state: &State) -> Result<(String, TextStream)> {
    let query = required_str(state, QUERY)?;
    let context = ctx.context_for(&query).await?;
    let prompt = render(templates::REPORT, &[("query", &query), ("context", &context)]);
    let deltas = ctx.model.stream(&prompt).await?;
    Ok((query, deltas))
}

fn finish_report(state: &State, query: &str, acc: TextAccumulator) -> Result<StreamUpdate> {
    let mut tree = ReportTree::from_state(state)?;
    let points = templates::extract_points(acc.text());
    let report_id = tree.add_root(query, acc.text(), points);
    info!(
        role = "reporter",
        report_id = %report_id,
        chars = acc.text().len(),
        increments = acc.increments(),
        "Report drafted"
    );

    let mut last = acc.finish();
    last.update.insert(fields::REPORT_ID.into(), json!(report_id));
    last.update.insert(REPORTS_FIELD.into(), tree.to_value()?);
    Ok(last)
}

/// Critic: extracts discussion points from the report, revising its
/// previous points when the teaching assistant asked for changes.
pub fn critic(ctx: RoleContext) -> impl Fn(State) -> BoxFuture<'static, NodeResult> + Send + Sync + 'static {
    unary(ctx, "critic", run_critic)
}

async fn run_critic(ctx: RoleContext, state: State) -> Result<StateUpdate> {
    let report = required_str(&state, fields::REPORTER_CONTENT)?;
    let previous: Option<CriticContent> = state.typed_field(fields::CRITIC_CONTENT)?;
    let feedback: Option<TaFeedback> = state.typed_field(fields::TA_FEEDBACK)?;
    let passes = state
        .get(fields::CRITIC_PASSES)
        .and_then(Value::as_u64)
        .unwrap_or(0);

    let previous = previous
        .map(|c| c.to_bullets())
        .unwrap_or_else(|| "(none)".to_string());
    let feedback = feedback
        .filter(|f| !f.approved)
        .map(|f| f.comment)
        .unwrap_or_else(|| "(none)".to_string());
    let prompt = render(
        templates::CRITIQUE,
        &[("report", &report), ("previous", &previous), ("feedback", &feedback)],
    );

    let answer = ctx.model.generate(&prompt).await?;
    let content = CriticContent::parse(&answer)?;
    info!(role = "critic", points = content.points.len(), pass = passes + 1, "Points extracted");

    let mut update = StateUpdate::new();
    update.insert(fields::CRITIC_CONTENT.into(), serde_json::to_value(&content)?);
    update.insert(fields::CRITIC_PASSES.into(), json!(passes + 1));
    Ok(update)
}

/// Teaching assistant: approves the critic's points or asks for a revision.
pub fn ta_review(ctx: RoleContext) -> impl Fn(State) -> BoxFuture<'static, NodeResult> + Send + Sync + 'static {
    unary(ctx, "ta_review", run_ta_review)
}

async fn run_ta_review(ctx: RoleContext, state: State) -> Result<StateUpdate> {
    let report = required_str(&state, fields::REPORTER_CONTENT)?;
    let content: CriticContent = required(&state, fields::CRITIC_CONTENT)?;
    let prompt = render(
        templates::TA_REVIEW,
        &[("report", &report), ("points", &content.to_bullets())],
    );

    let feedback = TaFeedback::parse(&ctx.model.generate(&prompt).await?);
    info!(role = "ta_review", approved = feedback.approved, "Points reviewed");

    let mut update = StateUpdate::new();
    update.insert(fields::TA_FEEDBACK.into(), serde_json::to_value(&feedback)?);
    Ok(update)
}

/// Human reviewer: accepts the thread only once `human_selection` names an
/// existing point and case. It writes nothing; the selection itself is the
/// caller's input.
pub fn human(state: State) -> BoxFuture<'static, NodeResult> {
    Box::pin(async move {
        let selected = selected_case(&state).map(|(point, case)| {
            info!(role = "human", point = %point, case = %case, "Selection accepted");
        });
        match selected {
            Ok(()) => Ok(StateUpdate::new()),
            Err(e) => {
                warn!(role = "human", error = %e, "Role failed");
                Err(NodeError::from(e))
            }
        }
    })
}

fn selected_case(state: &State) -> Result<(String, String)> {
    let choice: HumanSelection = selection(state, fields::HUMAN_SELECTION)?;
    let content: CriticContent = required(state, fields::CRITIC_CONTENT)?;
    let (point, case) = content.select(&choice)?;
    Ok((point.title.clone(), case.to_string()))
}

/// Checker: reports concrete examples supporting the selected case.
pub fn check(ctx: RoleContext) -> impl Fn(State) -> BoxFuture<'static, NodeResult> + Send + Sync + 'static {
    unary(ctx, "check", run_check)
}

async fn run_check(ctx: RoleContext, state: State) -> Result<StateUpdate> {
    let (point, case) = selected_case(&state)?;
    let context = ctx.context_for(&case).await?;
    let prompt = render(
        templates::CHECK_CASES,
        &[("case", &case), ("point", &point), ("context", &context)],
    );

    let checked = ctx.model.generate(&prompt).await?;
    info!(role = "check", chars = checked.len(), "Case checked");

    let mut update = StateUpdate::new();
    update.insert(fields::CHECK_CONTENT.into(), json!(checked));
    Ok(update)
}

/// Explorer: writes a detailed report for the selected point and attaches
/// it to the report tree below that point. Without a `point_selection` it
/// passes the thread on unchanged.
pub fn explore(ctx: RoleContext) -> impl Fn(State) -> BoxFuture<'static, NodeResult> + Send + Sync + 'static {
    unary(ctx, "explore", run_explore)
}

async fn run_explore(ctx: RoleContext, state: State) -> Result<StateUpdate> {
    if state.get(fields::POINT_SELECTION).map_or(true, Value::is_null) {
        info!(role = "explore", "No point selected, skipping");
        return Ok(StateUpdate::new());
    }
    let choice: PointSelection = selection(&state, fields::POINT_SELECTION)?;
    let query = required_str(&state, QUERY)?;
    let mut tree = ReportTree::from_state(&state)?;
    let report_id = match choice.report {
        Some(id) => id,
        None => required_str(&state, fields::REPORT_ID)?,
    };

    let parent = tree
        .get(&report_id)
        .ok_or_else(|| ReportError::UnknownReport(report_id.clone()))?;
    let title = parent
        .points
        .get(choice.point)
        .map(|p| p.title.clone())
        .ok_or_else(|| ReportError::UnknownPoint {
            report: report_id.clone(),
            point: choice.point,
            len: parent.points.len(),
        })?;

    let context = ctx.context_for(&title).await?;
    let prompt = render(
        templates::EXPLORE,
        &[("query", &query), ("point", &title), ("context", &context)],
    );
    let detail = ctx.model.generate(&prompt).await?;

    let detail_id = tree.add_detail(
        &report_id,
        choice.point,
        detail.as_str(),
        templates::extract_points(&detail),
        ctx.max_report_depth,
    )?;
    info!(role = "explore", report_id = %report_id, detail_id = %detail_id, "Point explored");

    let mut update = StateUpdate::new();
    update.insert(fields::EXPLORED_CONTENT.into(), json!(detail));
    update.insert(REPORTS_FIELD.into(), tree.to_value()?);
    Ok(update)
}
