//! Classroom Workflow - Report, Critique, Review, Human Choice, Check
//!
//! Assembles the role nodes into one graph:
//!
//! ```text
//!   reporter (streaming)
//!      │
//!      ├──► explore      (only with exploration on; halts before it)
//!      ↓
//!   critic ◄────────────┐
//!      ↓                │ REVISE, while critic_passes < max
//!   ta_review ──────────┘
//!      │ APPROVE, or max passes reached
//!      ↓
//!   human                (halts before it until human_selection is given)
//!      ↓
//!   check ──► END
//! ```
//!
//! A run stops at each halt point with the thread paused. Supply the
//! selection either with the resuming `invoke` or through `update_state`
//! followed by `invoke(thread, None)`.
//!
//! # Example
//!
//! ```rust,no_run
//! use colloquy_core::state::from_value;
//! use colloquy_roles::{ClassroomBuilder, ScriptedModel, StaticRetriever};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let graph = ClassroomBuilder::new(
//!     Arc::new(ScriptedModel::classroom()),
//!     Arc::new(StaticRetriever::default()),
//! )
//! .build()?;
//!
//! graph
//!     .invoke("lesson-1", Some(from_value(json!({"query": "Do tariffs work?"}))?))
//!     .await?;
//! assert_eq!(graph.get_state("lesson-1").await?.next.as_deref(), Some("human"));
//!
//! let selection = from_value(json!({"human_selection": {"point": 0, "case": 1}}))?;
//! let done = graph.invoke("lesson-1", Some(selection)).await?;
//! println!("{}", done["check_content"]);
//! # Ok(())
//! # }
//! ```

use crate::config::WorkflowConfig;
use crate::content::fields;
use crate::model::{Retriever, TextModel};
use crate::nodes::{self, RoleContext};
use colloquy_checkpoint::CheckpointSaver;
use colloquy_core::routing::bounded;
use colloquy_core::{CompiledGraph, EngineConfig, NodeId, Result, State, StateGraph, END};
use serde_json::Value;
use std::sync::Arc;

pub const REPORTER: &str = "reporter";
pub const EXPLORE: &str = "explore";
pub const CRITIC: &str = "critic";
pub const TA_REVIEW: &str = "ta_review";
pub const HUMAN: &str = "human";
pub const CHECK: &str = "check";

/// Builder for the classroom workflow graph
pub struct ClassroomBuilder {
    model: Arc<dyn TextModel>,
    retriever: Arc<dyn Retriever>,
    workflow: WorkflowConfig,
    engine: Option<EngineConfig>,
    checkpointer: Option<Arc<dyn CheckpointSaver>>,
}

impl ClassroomBuilder {
    pub fn new(model: Arc<dyn TextModel>, retriever: Arc<dyn Retriever>) -> Self {
        Self {
            model,
            retriever,
            workflow: WorkflowConfig::default(),
            engine: None,
            checkpointer: None,
        }
    }

    pub fn with_workflow(mut self, workflow: WorkflowConfig) -> Self {
        self.workflow = workflow;
        self
    }

    pub fn with_engine_config(mut self, engine: EngineConfig) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Persist threads in `saver` instead of the default in-memory store.
    pub fn with_checkpointer(mut self, saver: Arc<dyn CheckpointSaver>) -> Self {
        self.checkpointer = Some(saver);
        self
    }

    pub fn build(self) -> Result<CompiledGraph> {
        let ctx = RoleContext::new(self.model, self.retriever)
            .with_retrieval_limit(self.workflow.retrieval_limit)
            .with_max_report_depth(self.workflow.max_report_depth);

        let mut graph = StateGraph::new();
        graph
            .add_streaming_node(REPORTER, nodes::reporter(ctx.clone()))?
            .add_node(CRITIC, nodes::critic(ctx.clone()))?
            .add_node(TA_REVIEW, nodes::ta_review(ctx.clone()))?
            .add_node(HUMAN, nodes::human)?
            .add_node(CHECK, nodes::check(ctx.clone()))?;

        if self.workflow.exploration {
            graph
                .add_node(EXPLORE, nodes::explore(ctx))?
                .add_edge(REPORTER, EXPLORE)?
                .add_edge(EXPLORE, CRITIC)?
                .mark_interrupt_before([EXPLORE]);
        } else {
            graph.add_edge(REPORTER, CRITIC)?;
        }

        graph
            .add_edge(CRITIC, TA_REVIEW)?
            .add_conditional_edge(
                TA_REVIEW,
                bounded(
                    after_review,
                    fields::CRITIC_PASSES,
                    self.workflow.max_critic_passes,
                    HUMAN,
                ),
                [CRITIC, HUMAN],
            )?
            .add_edge(HUMAN, CHECK)?
            .add_edge(CHECK, END)?
            .set_entry_point(REPORTER)
            .mark_interrupt_before([HUMAN]);

        let mut compiled = graph.compile()?;
        if let Some(engine) = self.engine {
            compiled = compiled.with_config(engine);
        }
        if let Some(saver) = self.checkpointer {
            compiled = compiled.with_checkpointer(saver);
        }
        Ok(compiled)
    }
}

/// Send approved points to the human, everything else back to the critic.
fn after_review(state: &State) -> NodeId {
    let approved = state
        .get(fields::TA_FEEDBACK)
        .and_then(|feedback| feedback.get("approved"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if approved {
        HUMAN.to_string()
    } else {
        CRITIC.to_string()
    }
}
