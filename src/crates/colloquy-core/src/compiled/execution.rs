//! Graph execution: invoke and the per-thread run loop
//!
//! Every run goes through the same three phases:
//!
//! ```text
//! prepare   lease the thread, load its checkpoint, validate and merge input
//!    │
//! drive     loop { run node ► merge update ► route ► put checkpoint }
//!    │        until the next node is END (Done) or an interrupt point (Paused)
//!    ▼
//! outcome   final values, or values at the interrupt
//! ```
//!
//! A checkpoint is written only after a node completed and its successor was
//! resolved. A failing node, a router naming an unknown target, a timeout or
//! a cancelled stream leave the last checkpoint untouched, so invoking the
//! thread again retries the same node.

use super::streaming::EventSink;
use super::types::RunOutcome;
use super::CompiledGraph;
use crate::error::{GraphError, Result};
use crate::graph::{Edge, NodeId, NodeKind, NodeSpec, END};
use crate::interrupt::check_input;
use crate::state::{fields, merge, State, StateUpdate};
use crate::stream::StreamEvent;
use colloquy_checkpoint::{
    Checkpoint, CheckpointMetadata, CheckpointSource, ThreadLease, ThreadStatus,
};
use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, error, info};

/// A leased thread, ready to be driven.
pub(crate) struct Prepared {
    pub(crate) lease: ThreadLease,
    pub(crate) checkpoint: Checkpoint,
    /// Set when there is nothing to run: the thread is already done, or it
    /// was just created paused in front of its entry node.
    pub(crate) outcome: Option<RunOutcome>,
}

impl CompiledGraph {
    /// Run thread `thread_id` until it completes or reaches an interrupt
    /// point, returning the state at that moment.
    ///
    /// * New thread: `input` is required and becomes the initial state.
    /// * Paused or running thread: `input` (optional) is merged before
    ///   resuming. It may set fields no node has produced yet, such as a
    ///   human selection, but may not change any node's output.
    /// * Done thread: returns the final state; changing input is rejected.
    ///
    /// # Errors
    ///
    /// [`GraphError::UnknownThread`] for a new thread without input,
    /// [`GraphError::ConcurrentInvocation`] if another run holds the thread,
    /// [`GraphError::StaleOverwrite`] for rejected input, plus any node,
    /// routing or persistence failure.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use colloquy_core::{CompiledGraph, StateGraph};
    /// use serde_json::json;
    ///
    /// # async fn example(graph: CompiledGraph) -> colloquy_core::Result<()> {
    /// let input = colloquy_core::state::from_value(json!({"query": "tariffs"}))?;
    /// let paused = graph.invoke("thread-1", Some(input)).await?;
    ///
    /// let selection = colloquy_core::state::from_value(
    ///     json!({"human_selection": {"point": 0, "case": 1}}),
    /// )?;
    /// let done = graph.invoke("thread-1", Some(selection)).await?;
    /// # Ok(())
    /// # }
    /// ```
    #[tracing::instrument(skip(self, input), fields(thread_id = %thread_id))]
    pub async fn invoke(&self, thread_id: &str, input: Option<State>) -> Result<State> {
        info!(has_input = input.is_some(), "Starting graph execution");

        let Prepared {
            lease,
            checkpoint,
            outcome,
        } = self.prepare(thread_id, input).await?;

        let outcome = match outcome {
            Some(outcome) => outcome,
            None => self
                .drive(checkpoint, &EventSink::disabled())
                .await
                .inspect_err(|e| error!(error = %e, "Graph execution failed"))?,
        };
        drop(lease);

        Ok(outcome.into_state())
    }

    /// Lease the thread and bring its checkpoint up to date with `input`.
    pub(crate) async fn prepare(&self, thread_id: &str, input: Option<State>) -> Result<Prepared> {
        let lease = self.saver.try_lease(thread_id)?;
        let stored = self.saver.get(thread_id).await?;

        let (checkpoint, outcome) = match (stored, input) {
            (None, None) => return Err(GraphError::UnknownThread(thread_id.to_string())),
            (None, Some(input)) => self.start_thread(thread_id, input).await?,
            (Some(checkpoint), input) => {
                let checkpoint = match input {
                    Some(input) if check_input(&checkpoint, &input)? => {
                        self.write_input(checkpoint, input, CheckpointSource::Input)
                            .await?
                    }
                    _ => checkpoint,
                };
                let outcome = checkpoint.status.is_done().then(|| RunOutcome::Complete {
                    state: checkpoint.values.clone(),
                });
                (checkpoint, outcome)
            }
        };

        debug!(
            version = checkpoint.version,
            status = %checkpoint.status,
            next = ?checkpoint.next,
            "Prepared thread"
        );
        Ok(Prepared {
            lease,
            checkpoint,
            outcome,
        })
    }

    async fn start_thread(
        &self,
        thread_id: &str,
        input: State,
    ) -> Result<(Checkpoint, Option<RunOutcome>)> {
        let entry = self.graph.entry.clone().ok_or(GraphError::NoEntryPoint)?;
        let mut checkpoint = Checkpoint::initial(thread_id, input, entry.clone());

        let outcome = if self.interrupts.should_interrupt_before(&entry) {
            checkpoint.status = ThreadStatus::Paused;
            checkpoint.metadata = CheckpointMetadata::new()
                .with_source(CheckpointSource::Interrupt)
                .with_node(entry.clone());
            Some(RunOutcome::Interrupted {
                node: entry,
                state: checkpoint.values.clone(),
            })
        } else {
            None
        };

        self.saver.put(checkpoint.clone()).await?;
        info!(status = %checkpoint.status, "Created thread");
        Ok((checkpoint, outcome))
    }

    /// Persist `input` merged into `checkpoint`. Status and `next` carry over.
    pub(crate) async fn write_input(
        &self,
        checkpoint: Checkpoint,
        input: State,
        source: CheckpointSource,
    ) -> Result<Checkpoint> {
        let mut next = checkpoint.successor();
        let written = merge(&mut next.values, input);
        next.metadata = CheckpointMetadata::new()
            .with_source(source)
            .with_extra("fields", Value::from(written));
        self.saver.put(next.clone()).await?;
        Ok(next)
    }

    /// Run nodes from `checkpoint.next` until the thread halts.
    ///
    /// The first node always runs, even when it is an interrupt point: a
    /// paused thread is resumed by running the node it paused in front of.
    pub(crate) async fn drive(&self, mut checkpoint: Checkpoint, sink: &EventSink) -> Result<RunOutcome> {
        let thread_id = checkpoint.thread_id.clone();

        while let Some(node) = checkpoint.next.clone() {
            sink.emit(&thread_id, &node, StreamEvent::NodeStart { node: node.clone() })
                .await?;
            let update = self
                .run_node(&thread_id, &node, checkpoint.values.clone(), sink)
                .await?;

            let mut next = checkpoint.successor();
            let mut written = merge(&mut next.values, update);
            next.values
                .insert(fields::CURRENT_ROLE.to_string(), Value::String(node.clone()));
            written.push(fields::CURRENT_ROLE.to_string());
            for field in written {
                next.written_by.insert(field, node.clone());
            }
            next.step += 1;

            let successor = self.resolve_next(&thread_id, &node, &next.values)?;
            let outcome = match successor {
                None => {
                    next.status = ThreadStatus::Done;
                    next.next = None;
                    next.metadata = CheckpointMetadata::new()
                        .with_source(CheckpointSource::Done)
                        .with_node(node.clone());
                    Some(RunOutcome::Complete {
                        state: next.values.clone(),
                    })
                }
                Some(target) if self.interrupts.should_interrupt_before(&target) => {
                    next.status = ThreadStatus::Paused;
                    next.next = Some(target.clone());
                    next.metadata = CheckpointMetadata::new()
                        .with_source(CheckpointSource::Interrupt)
                        .with_node(node.clone());
                    Some(RunOutcome::Interrupted {
                        node: target,
                        state: next.values.clone(),
                    })
                }
                Some(target) => {
                    next.status = ThreadStatus::Running;
                    next.next = Some(target);
                    next.metadata = CheckpointMetadata::new()
                        .with_source(CheckpointSource::Loop)
                        .with_node(node.clone());
                    None
                }
            };

            self.saver.put(next.clone()).await?;
            debug!(
                node = %node,
                step = next.step,
                version = next.version,
                next = ?next.next,
                "Committed node"
            );

            if let Some(outcome) = outcome {
                match &outcome {
                    RunOutcome::Interrupted { node, .. } => {
                        info!(interrupt_before = %node, step = next.step, "Graph execution interrupted")
                    }
                    RunOutcome::Complete { .. } => {
                        info!(step = next.step, "Graph execution completed")
                    }
                }
                return Ok(outcome);
            }
            checkpoint = next;
        }

        // Only reachable for a checkpoint that was already done.
        Ok(RunOutcome::Complete {
            state: checkpoint.values,
        })
    }

    /// Run one node under the configured timeout, abandoning it if the
    /// stream consumer goes away.
    async fn run_node(
        &self,
        thread_id: &str,
        node: &str,
        state: State,
        sink: &EventSink,
    ) -> Result<StateUpdate> {
        let spec = self
            .graph
            .node(node)
            .ok_or_else(|| GraphError::UnknownNode(node.to_string()))?;

        let work = self.execute(thread_id, spec, state, sink);
        let guarded = async {
            match self.config.node_timeout {
                Some(limit) => match tokio::time::timeout(limit, work).await {
                    Ok(result) => result,
                    Err(_) => Err(GraphError::Timeout {
                        thread_id: thread_id.to_string(),
                        node: node.to_string(),
                        duration_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    }),
                },
                None => work.await,
            }
        };

        let result = tokio::select! {
            result = guarded => result,
            _ = sink.closed() => Err(GraphError::Cancelled {
                thread_id: thread_id.to_string(),
                node: node.to_string(),
            }),
        };

        if let Err(e) = &result {
            match std::error::Error::source(e) {
                Some(cause) => error!(node = %node, error = %e, cause = %cause, "Node failed"),
                None => error!(node = %node, error = %e, "Node failed"),
            }
        }
        result
    }

    async fn execute(
        &self,
        thread_id: &str,
        spec: &NodeSpec,
        state: State,
        sink: &EventSink,
    ) -> Result<StateUpdate> {
        let node = spec.name.as_str();
        match &spec.kind {
            NodeKind::Unary(handler) => {
                let update = handler(state)
                    .await
                    .map_err(|e| GraphError::node_execution(thread_id, node, e))?;
                sink.emit(
                    thread_id,
                    node,
                    StreamEvent::Update {
                        node: node.to_string(),
                        update: update.clone(),
                        is_final: true,
                    },
                )
                .await?;
                Ok(update)
            }
            NodeKind::Streaming(handler) => {
                let mut updates = handler(state);
                while let Some(item) = updates.next().await {
                    let item = item.map_err(|e| GraphError::node_execution(thread_id, node, e))?;
                    sink.emit(
                        thread_id,
                        node,
                        StreamEvent::Update {
                            node: node.to_string(),
                            update: item.update.clone(),
                            is_final: item.is_final,
                        },
                    )
                    .await?;
                    if item.is_final {
                        return Ok(item.update);
                    }
                }
                Err(GraphError::node_execution(
                    thread_id,
                    node,
                    "stream ended without a final update",
                ))
            }
        }
    }

    /// Successor of `node` given the merged state; `None` means END.
    fn resolve_next(&self, thread_id: &str, node: &str, state: &State) -> Result<Option<NodeId>> {
        match self.graph.edge(node) {
            None => Ok(None),
            Some(Edge::Direct(to)) => Ok((to != END).then(|| to.clone())),
            Some(Edge::Conditional { router, targets }) => {
                let target = router(state);
                if !targets.contains(&target) || !self.graph.is_target(&target) {
                    return Err(GraphError::UnknownRoutingTarget {
                        thread_id: thread_id.to_string(),
                        node: node.to_string(),
                        target,
                    });
                }
                if target == END {
                    return Ok(None);
                }
                debug!(from = %node, to = %target, "Routed");
                Ok(Some(target))
            }
        }
    }
}
