//! Thread state inspection and out-of-band updates

use super::{CompiledGraph, StateSnapshot};
use crate::error::{GraphError, Result};
use crate::interrupt::check_input;
use crate::state::State;
use colloquy_checkpoint::CheckpointSource;
use tracing::info;

impl CompiledGraph {
    /// Current persisted state of a thread.
    ///
    /// # Errors
    ///
    /// [`GraphError::UnknownThread`] if the thread has no checkpoint.
    pub async fn get_state(&self, thread_id: &str) -> Result<StateSnapshot> {
        self.saver
            .get(thread_id)
            .await?
            .map(StateSnapshot::from)
            .ok_or_else(|| GraphError::UnknownThread(thread_id.to_string()))
    }

    /// Merge `values` into a thread without running anything.
    ///
    /// This is the first half of the two-call resume convention: update the
    /// paused thread, then invoke it with no input. The same rules as input
    /// to [`invoke`](Self::invoke) apply. Values that change nothing are
    /// accepted without writing a checkpoint.
    ///
    /// # Errors
    ///
    /// [`GraphError::UnknownThread`], [`GraphError::ConcurrentInvocation`]
    /// while a run holds the thread, and [`GraphError::StaleOverwrite`].
    #[tracing::instrument(skip(self, values), fields(thread_id = %thread_id))]
    pub async fn update_state(&self, thread_id: &str, values: State) -> Result<StateSnapshot> {
        let _lease = self.saver.try_lease(thread_id)?;
        let checkpoint = self
            .saver
            .get(thread_id)
            .await?
            .ok_or_else(|| GraphError::UnknownThread(thread_id.to_string()))?;

        if !check_input(&checkpoint, &values)? {
            return Ok(checkpoint.into());
        }

        let fields: Vec<&String> = values.keys().collect();
        info!(?fields, "Updating thread state");
        let updated = self
            .write_input(checkpoint, values, CheckpointSource::Update)
            .await?;
        Ok(updated.into())
    }

    /// Delete every checkpoint of a thread. Clearing an unknown thread is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// [`GraphError::ConcurrentInvocation`] while a run holds the thread.
    #[tracing::instrument(skip(self), fields(thread_id = %thread_id))]
    pub async fn clear_thread(&self, thread_id: &str) -> Result<()> {
        let _lease = self.saver.try_lease(thread_id)?;
        self.saver.delete_thread(thread_id).await?;
        info!("Cleared thread");
        Ok(())
    }

    /// Ids of every thread with a checkpoint.
    pub async fn list_threads(&self) -> Result<Vec<String>> {
        Ok(self.saver.list_threads().await?)
    }
}
