//! Job submission.

use std::sync::Arc;

use clipgen_core::error::CoreError;
use clipgen_core::workflow::WorkflowGraph;

use crate::api::EngineApi;

/// Identifies one submitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    /// Engine-assigned job (prompt) ID.
    pub job_id: String,
    /// Session the job was submitted under. Push events for the job are
    /// routed to channels opened with the same ID.
    pub session_id: String,
    /// Queue position reported at submission time.
    pub queue_position: i32,
}

/// Fresh session ID for one request. Never shared between requests.
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Sends parameterized graphs to the engine.
pub struct JobSubmitter {
    engine: Arc<dyn EngineApi>,
}

impl JobSubmitter {
    pub fn new(engine: Arc<dyn EngineApi>) -> Self {
        Self { engine }
    }

    /// Submit `graph` under `session_id`.
    ///
    /// Transport failures, rejections and responses without a job ID all
    /// become [`CoreError::SubmissionFailed`].
    pub async fn submit(
        &self,
        graph: &WorkflowGraph,
        session_id: &str,
    ) -> Result<JobHandle, CoreError> {
        let response = self
            .engine
            .submit_workflow(graph, session_id)
            .await
            .map_err(|e| CoreError::SubmissionFailed(e.to_string()))?;

        if response.prompt_id.is_empty() {
            return Err(CoreError::SubmissionFailed(
                "engine returned an empty job ID".to_string(),
            ));
        }

        tracing::info!(
            job_id = %response.prompt_id,
            session_id = %session_id,
            queue_position = response.number,
            "Workflow submitted",
        );

        Ok(JobHandle {
            job_id: response.prompt_id,
            session_id: session_id.to_string(),
            queue_position: response.number,
        })
    }
}
