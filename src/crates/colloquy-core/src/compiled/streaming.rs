//! Streaming execution
//!
//! [`CompiledGraph::stream`] validates and leases the thread up front, then
//! drives it on a spawned task that forwards events through a bounded
//! channel. The channel provides backpressure: a consumer that stops reading
//! eventually blocks the run. A consumer that drops the stream cancels it;
//! the node in flight is abandoned and nothing further is written.

use super::execution::Prepared;
use super::types::EventStream;
use super::CompiledGraph;
use crate::error::{GraphError, Result};
use crate::state::State;
use crate::stream::StreamEvent;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, Instrument};

/// Where a run sends its events. Runs started by `invoke` have no sink.
pub(crate) struct EventSink {
    tx: Option<mpsc::Sender<Result<StreamEvent>>>,
}

impl EventSink {
    pub(crate) fn disabled() -> Self {
        Self { tx: None }
    }

    pub(crate) fn channel(tx: mpsc::Sender<Result<StreamEvent>>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Forward `event`, failing with [`GraphError::Cancelled`] once the
    /// consumer is gone.
    pub(crate) async fn emit(&self, thread_id: &str, node: &str, event: StreamEvent) -> Result<()> {
        match &self.tx {
            Some(tx) => tx.send(Ok(event)).await.map_err(|_| GraphError::Cancelled {
                thread_id: thread_id.to_string(),
                node: node.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Resolves when the consumer drops the stream; never for a disabled sink.
    pub(crate) async fn closed(&self) {
        match &self.tx {
            Some(tx) => tx.closed().await,
            None => std::future::pending().await,
        }
    }
}

impl CompiledGraph {
    /// Run thread `thread_id` like [`invoke`](Self::invoke), observing it as
    /// it happens.
    ///
    /// The stream yields, in order, a `NodeStart` per node, its `Update`s
    /// (partial increments of streaming nodes, then exactly one final update
    /// per node) and one terminal `Interrupted` or `Complete` event. A failure
    /// is delivered as a single `Err` item, after which the stream ends.
    ///
    /// Thread errors (unknown thread, concurrent invocation, stale input) are
    /// returned by this call itself, before any event is produced.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use colloquy_core::{CompiledGraph, StreamEvent};
    /// use futures::StreamExt;
    ///
    /// # async fn example(graph: CompiledGraph, input: colloquy_core::State) -> colloquy_core::Result<()> {
    /// let mut events = graph.stream("thread-1", Some(input)).await?;
    /// while let Some(event) = events.next().await {
    ///     match event? {
    ///         StreamEvent::Update { update, is_final: false, .. } => print!("{update:?}"),
    ///         StreamEvent::Interrupted { node, .. } => println!("waiting before {node}"),
    ///         _ => {}
    ///     }
    /// }
    /// # Ok(())
    /// # }
    /// ```
    #[tracing::instrument(skip(self, input), fields(thread_id = %thread_id))]
    pub async fn stream(&self, thread_id: &str, input: Option<State>) -> Result<EventStream> {
        info!(has_input = input.is_some(), "Starting streamed execution");
        let Prepared {
            lease,
            checkpoint,
            outcome,
        } = self.prepare(thread_id, input).await?;

        let (tx, rx) = mpsc::channel(self.config.stream_buffer.max(1));
        let graph = self.clone();

        tokio::spawn(
            async move {
                let sink = EventSink::channel(tx.clone());
                let result = match outcome {
                    Some(outcome) => Ok(outcome),
                    None => graph.drive(checkpoint, &sink).await,
                };
                // Release before the terminal event so a consumer reacting to
                // it can invoke the thread again right away.
                drop(lease);

                let terminal = match result {
                    Ok(outcome) => Ok(outcome.into_event()),
                    Err(GraphError::Cancelled { node, .. }) => {
                        info!(node = %node, "Stream consumer went away, run cancelled");
                        return;
                    }
                    Err(e) => {
                        error!(error = %e, "Streamed execution failed");
                        Err(e)
                    }
                };
                let _ = tx.send(terminal).await;
            }
            .in_current_span(),
        );

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
