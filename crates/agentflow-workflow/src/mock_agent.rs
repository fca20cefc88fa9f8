//! Mock structured agent for testing and demos.

use agentflow_protocols::{AgentError, StructuredAgent};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::RwLock;

/// Agent that returns pre-configured responses.
///
/// A response is chosen by the first registered keyword found in the prompt.
/// Without a match the agent echoes the prompt. Every output is checked
/// against the requested schema.
pub struct MockStructuredAgent {
    id: String,
    responses: RwLock<Vec<(String, Value)>>,
    failure: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl MockStructuredAgent {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            responses: RwLock::new(Vec::new()),
            failure: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Agent whose every call fails with a provider error.
    pub fn failing(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::new(id)
        }
    }

    /// Answer prompts containing `keyword` with `response`.
    pub async fn set_response(&self, keyword: &str, response: Value) {
        self.responses
            .write()
            .await
            .push((keyword.to_string(), response));
    }

    /// Prompts received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().len()
    }
}

fn check_schema(output: &Value, schema: &Value) -> Result<(), AgentError> {
    if schema.is_null() {
        return Ok(());
    }
    let validator = jsonschema::validator_for(schema)
        .map_err(|e| AgentError::Validation(format!("invalid output schema: {}", e)))?;
    let errors: Vec<String> = validator.iter_errors(output).map(|e| e.to_string()).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AgentError::Validation(errors.join("; ")))
    }
}

#[async_trait]
impl StructuredAgent for MockStructuredAgent {
    fn id(&self) -> &str {
        &self.id
    }

    async fn generate_structured_output(
        &self,
        prompt: &str,
        output_schema: &Value,
    ) -> Result<Value, AgentError> {
        self.prompts.lock().push(prompt.to_string());

        if let Some(message) = &self.failure {
            return Err(AgentError::Provider(message.clone()));
        }

        let output = {
            let responses = self.responses.read().await;
            responses
                .iter()
                .find(|(keyword, _)| prompt.contains(keyword.as_str()))
                .map(|(_, response)| response.clone())
        };

        let output = output.unwrap_or_else(|| {
            serde_json::json!({
                "agent": self.id,
                "prompt": prompt,
            })
        });

        check_schema(&output, output_schema)?;
        Ok(output)
    }
}
