//! services/api/src/adapters/llm.rs
//!
//! This module contains the adapter for the language model used by the
//! answer engine and the conflict checker. It implements the `LanguageModel`
//! port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs},
    Client,
};
use async_trait::async_trait;
use healthbot_core::ports::{LanguageModel, PortError, PortResult};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `LanguageModel` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiModelAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiModelAdapter {
    /// Creates a new `OpenAiModelAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

//=========================================================================================
// `LanguageModel` Trait Implementation
//=========================================================================================

#[async_trait]
impl LanguageModel for OpenAiModelAdapter {
    /// Sends one prompt and returns the completion text. Stateless, no retries.
    async fn complete(&self, prompt: &str) -> PortResult<String> {
        let messages = vec![ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .into()];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Call the API and manually map the error if it occurs, which respects the orphan rule.
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        // Extract the text content from the first choice in the response.
        if let Some(choice) = response.choices.into_iter().next() {
            if let Some(content) = choice.message.content {
                Ok(content)
            } else {
                Err(PortError::Unexpected(
                    "LLM response contained no text content.".to_string(),
                ))
            }
        } else {
            Err(PortError::Unexpected(
                "LLM returned no choices in its response.".to_string(),
            ))
        }
    }
}
