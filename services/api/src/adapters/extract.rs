//! services/api/src/adapters/extract.rs
//!
//! This module contains the document-to-text adapter. Plain text passes
//! through, PDFs go through `lopdf`, and images are OCR'd by a
//! vision-capable model. It implements the `DocumentTextExtractor` port
//! from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs,
        ImageUrlArgs,
    },
    Client,
};
use async_trait::async_trait;
use base64::Engine;
use healthbot_core::ports::{DocumentTextExtractor, PortError, PortResult};

const OCR_INSTRUCTIONS: &str = "Transcribe all text visible in this medical document image. \
Preserve the reading order. Output plain text only, no commentary.";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `DocumentTextExtractor` for text, PDF, and
/// image uploads.
#[derive(Clone)]
pub struct OpenAiExtractorAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiExtractorAdapter {
    /// Creates a new `OpenAiExtractorAdapter`. The model must be vision-capable.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    fn extract_pdf_text(data: &[u8]) -> PortResult<String> {
        let document = lopdf::Document::load_mem(data)
            .map_err(|e| PortError::Unexpected(format!("failed to parse PDF: {}", e)))?;
        let pages: Vec<u32> = document.get_pages().keys().copied().collect();
        let text = document
            .extract_text(&pages)
            .map_err(|e| PortError::Unexpected(format!("failed to extract PDF text: {}", e)))?;
        Ok(text.trim().to_string())
    }

    async fn ocr_image(&self, data: &[u8], content_type: &str) -> PortResult<String> {
        let data_url = format!(
            "data:{};base64,{}",
            content_type,
            base64::engine::general_purpose::STANDARD.encode(data)
        );

        let content: Vec<ChatCompletionRequestUserMessageContentPart> = vec![
            ChatCompletionRequestMessageContentPartTextArgs::default()
                .text(OCR_INSTRUCTIONS)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestMessageContentPartImageArgs::default()
                .image_url(
                    ImageUrlArgs::default()
                        .url(data_url)
                        .build()
                        .map_err(|e| PortError::Unexpected(e.to_string()))?,
                )
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![ChatCompletionRequestUserMessageArgs::default()
                .content(content)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into()])
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::Unexpected("vision OCR response contained no text.".to_string())
            })
    }
}

//=========================================================================================
// `DocumentTextExtractor` Trait Implementation
//=========================================================================================

#[async_trait]
impl DocumentTextExtractor for OpenAiExtractorAdapter {
    async fn extract_text(&self, data: &[u8], content_type: &str) -> PortResult<String> {
        if content_type.starts_with("text/") {
            return Ok(String::from_utf8_lossy(data).into_owned());
        }
        if content_type == "application/pdf" {
            return Self::extract_pdf_text(data);
        }
        if content_type.starts_with("image/") {
            return self.ocr_image(data, content_type).await;
        }
        Err(PortError::Unexpected(format!(
            "unsupported content type: {}",
            content_type
        )))
    }
}
