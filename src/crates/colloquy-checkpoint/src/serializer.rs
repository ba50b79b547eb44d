//! Serialization protocol for persisted checkpoints

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Encodes checkpoints to bytes and back for byte-oriented stores.
pub trait SerializerProtocol: Send + Sync {
    fn dumps<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    fn loads<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> Result<T>;
}

/// JSON serializer (default).
///
/// Pretty output keeps checkpoint files readable by hand at the cost of a few
/// bytes of whitespace.
#[derive(Debug, Clone, Default)]
pub struct JsonSerializer {
    pretty: bool,
}

impl JsonSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl SerializerProtocol for JsonSerializer {
    fn dumps<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        if self.pretty {
            Ok(serde_json::to_vec_pretty(value)?)
        } else {
            Ok(serde_json::to_vec(value)?)
        }
    }

    fn loads<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(data)?)
    }
}
