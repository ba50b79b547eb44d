//! Engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default capacity of the event channel behind
/// [`CompiledGraph::stream`](crate::CompiledGraph::stream).
pub const DEFAULT_STREAM_BUFFER: usize = 100;

/// Runtime knobs of a [`CompiledGraph`](crate::CompiledGraph).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on a single node run. `None` waits indefinitely.
    #[serde(
        rename = "node_timeout_ms",
        with = "duration_ms",
        skip_serializing_if = "Option::is_none"
    )]
    pub node_timeout: Option<Duration>,

    /// Events buffered between a running stream and its consumer. A slow
    /// consumer applies backpressure to the run once the buffer is full.
    pub stream_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            node_timeout: None,
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = Some(timeout);
        self
    }

    /// Set the event buffer. Values below 1 are raised to 1.
    pub fn with_stream_buffer(mut self, capacity: usize) -> Self {
        self.stream_buffer = capacity.max(1);
        self
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        value
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}
