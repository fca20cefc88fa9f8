//! Agent capability consumed by agent steps.

use async_trait::async_trait;

use crate::error::AgentError;

/// An agent that can turn a prompt into a structured JSON object.
///
/// Provider integration lives outside the engine. Any failure returned here
/// becomes a step failure.
#[async_trait]
pub trait StructuredAgent: Send + Sync {
    /// Returns the agent ID.
    fn id(&self) -> &str;

    /// Generate an object conforming to `output_schema` from `prompt`.
    async fn generate_structured_output(
        &self,
        prompt: &str,
        output_schema: &serde_json::Value,
    ) -> Result<serde_json::Value, AgentError>;
}
