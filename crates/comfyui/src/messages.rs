//! Push-channel frame decoding.
//!
//! Every text frame is an envelope `{"type": "<kind>", "data": {...}}`.
//! Only the kinds that can move a job towards completion are decoded into
//! typed payloads; the rest keep their kind name and nothing else.

use serde::Deserialize;
use serde_json::Value;

/// A decoded push-channel frame.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineFrame {
    /// `executed`: a node finished and reported its output.
    Executed(ExecutedData),
    /// `progress`: step counter of a long-running node.
    Progress(ProgressData),
    /// `execution_error`: the engine aborted a prompt.
    ExecutionError(ExecutionErrorData),
    /// Any other kind (queue status, cache notices, custom-node broadcasts).
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExecutedData {
    pub node: String,
    #[serde(default)]
    pub output: Value,
    /// Absent on older engine builds.
    #[serde(default)]
    pub prompt_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProgressData {
    pub value: i32,
    pub max: i32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExecutionErrorData {
    #[serde(default)]
    pub prompt_id: Option<String>,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub exception_type: String,
    #[serde(default)]
    pub exception_message: String,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

/// Decode one text frame.
///
/// Fails on malformed JSON, a missing `type`, or a known kind whose
/// payload does not have the expected shape.
pub fn parse_frame(text: &str) -> Result<EngineFrame, serde_json::Error> {
    let Envelope { kind, data } = serde_json::from_str(text)?;
    let frame = match kind.as_str() {
        "executed" => EngineFrame::Executed(serde_json::from_value(data)?),
        "progress" => EngineFrame::Progress(serde_json::from_value(data)?),
        "execution_error" => EngineFrame::ExecutionError(serde_json::from_value(data)?),
        _ => EngineFrame::Other(kind),
    };
    Ok(frame)
}
