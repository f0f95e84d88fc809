//! Update records and handler outcomes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One binary update for a single loaded module.
///
/// Byte payloads travel hex-encoded over the JSON channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRecord {
    pub module_id: Uuid,
    #[serde(with = "hex_bytes")]
    pub il_delta: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub metadata_delta: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub pdb_delta: Vec<u8>,
    /// Metadata tokens of the types touched by the update.
    pub updated_types: Vec<u32>,
}

impl UpdateRecord {
    pub fn new(module_id: Uuid) -> Self {
        Self {
            module_id,
            il_delta: Vec::new(),
            metadata_delta: Vec::new(),
            pdb_delta: Vec::new(),
            updated_types: Vec::new(),
        }
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(text).map_err(serde::de::Error::custom)
    }
}

/// Result of offering a change batch to a compilation backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerOutcome {
    /// Whether the backend took responsibility for the batch.
    pub handled: bool,
    /// Human-readable diagnostic, when something went wrong.
    pub diagnostic: Option<String>,
}

impl HandlerOutcome {
    pub fn unhandled() -> Self {
        Self::default()
    }

    pub fn handled() -> Self {
        Self {
            handled: true,
            diagnostic: None,
        }
    }

    /// The backend owned the batch but could not apply it.
    pub fn failed(diagnostic: impl Into<String>) -> Self {
        Self {
            handled: true,
            diagnostic: Some(diagnostic.into()),
        }
    }

    /// The backend declined the batch with an explanation.
    pub fn unhandled_with(diagnostic: impl Into<String>) -> Self {
        Self {
            handled: false,
            diagnostic: Some(diagnostic.into()),
        }
    }
}
