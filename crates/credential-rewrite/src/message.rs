use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Decoded view of one Stratum line.
///
/// Only `method` and `params` are interpreted. Every other key (`id`,
/// `worker`, pool extensions, ...) is captured in `rest` so that a rewritten
/// message re-encodes with nothing lost. Key order is not preserved.
///
/// Decoding fails for anything that is not a JSON object, or whose `method`
/// is not a string, or whose `params` is not an array. Callers treat such
/// lines as opaque and forward them verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StratumMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<Value>>,

    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl StratumMessage {
    /// Decode a single line. Returns `None` if the line is not a message this
    /// view can represent.
    pub fn parse(line: &str) -> Option<Self> {
        serde_json::from_str(line).ok()
    }

    /// Encode back to a single line (no trailing newline).
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// `params[0]` if it is a string.
    pub fn identity(&self) -> Option<&str> {
        self.params.as_ref()?.first()?.as_str()
    }
}
