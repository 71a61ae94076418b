use crate::injection::Slot;

/// Every failure the orchestrator can surface to its caller.
///
/// Each variant carries a stable machine-readable [`code`](Self::code) plus
/// a human-readable detail via `Display`. Push-channel failures are not
/// represented here: they are recovered locally by falling back to polling.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Node not found: {node_id}")]
    NodeNotFound { node_id: String },

    #[error("Could not find required nodes. Missing slots: {}", slot_list(.missing))]
    IncompleteTemplate { missing: Vec<Slot> },

    #[error("Invalid workflow template: {0}")]
    InvalidTemplate(String),

    #[error("Image upload failed: {0}")]
    UploadFailed(String),

    #[error("Workflow submission failed: {0}")]
    SubmissionFailed(String),

    #[error("History poll failed: {0}")]
    PollFailed(String),

    #[error("Job {job_id} finished without output for node {node_id}")]
    ArtifactNotProduced { job_id: String, node_id: String },

    #[error("Generation finished, but no artifact path in payload: {0}")]
    NoArtifactInPayload(String),
}

impl CoreError {
    /// Stable error code exposed to clients alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::NodeNotFound { .. } => "NODE_NOT_FOUND",
            CoreError::IncompleteTemplate { .. } => "INCOMPLETE_TEMPLATE",
            CoreError::InvalidTemplate(_) => "INVALID_TEMPLATE",
            CoreError::UploadFailed(_) => "UPLOAD_FAILED",
            CoreError::SubmissionFailed(_) => "SUBMISSION_FAILED",
            CoreError::PollFailed(_) => "POLL_FAILED",
            CoreError::ArtifactNotProduced { .. } => "ARTIFACT_NOT_PRODUCED",
            CoreError::NoArtifactInPayload(_) => "NO_ARTIFACT_IN_PAYLOAD",
        }
    }
}

fn slot_list(slots: &[Slot]) -> String {
    slots
        .iter()
        .map(|s| s.label())
        .collect::<Vec<_>>()
        .join(", ")
}
