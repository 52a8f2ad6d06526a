//! Gemini protocol implementation.
//!
//! Gemini is the provider that actively serves human-verification
//! challenges under automation, so this model carries the bot-detection
//! signal the recovery loop reacts to.

use super::{ensure_code_block_request, AiModel, ChatModel, ExpectedResult};
use crate::config::Config;
use crate::error::{AiUiError, Result};
use crate::retry::{retry_transient, Backoff};
use crate::surface::ChatSurface;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const CHAT_URL: &str = "https://gemini.google.com/app";
const INPUT_FIELD: &str = ".ql-editor";
const SEND_BUTTON: &str = r#"button[aria-label="Send message"]"#;
const STOP_BUTTON: &str = r#"button[aria-label="Stop response"]"#;
const RESPONSE_TEXT: &str = ".model-response-text";
const RESPONSE_CONTAINER: &str = ".response-container";
const COPY_BUTTON: &str = r#"button[data-test-id="copy-button"]"#;
const FILE_INPUT: &str = r#"input[type="file"]"#;
const CHALLENGE_FRAME: &str = r#"iframe[src*="recaptcha"]"#;
const CHALLENGE_CHECKBOX: &str = "#recaptcha-anchor";
const CHALLENGE_TEXT: &str = "unusual traffic";

/// Upper bound on polling for the stop button to disappear (one poll per
/// second).
const MAX_GENERATION_POLLS: u32 = 180;

pub struct Gemini {
    #[allow(dead_code)]
    config: Arc<Config>,
    surface: Arc<dyn ChatSurface>,
}

impl Gemini {
    pub fn new(config: Arc<Config>, surface: Arc<dyn ChatSurface>) -> Self {
        Self { config, surface }
    }

    async fn ensure_no_challenge(&self) -> Result<()> {
        if self.detect_bot_challenge().await? {
            Err(AiUiError::BotDetected)
        } else {
            Ok(())
        }
    }

    async fn ensure_on_chat_page(&self) -> Result<()> {
        let url = self.surface.current_url().await?;
        if !url.to_lowercase().contains("gemini") {
            self.surface.goto(CHAT_URL).await?;
            self.surface.wait_for_idle().await?;
        }
        Ok(())
    }

    async fn ensure_input_field(&self) -> Result<()> {
        if self.surface.count(INPUT_FIELD).await? > 0 {
            return Ok(());
        }
        // The challenge page replaces the whole app, composer included.
        self.ensure_no_challenge().await?;
        Err(AiUiError::ElementNotFound(INPUT_FIELD.to_string()))
    }

    async fn click_submit(&self) -> Result<()> {
        if self.surface.count(SEND_BUTTON).await? > 0 {
            self.surface.click(SEND_BUTTON).await
        } else {
            Err(AiUiError::ElementNotFound(SEND_BUTTON.to_string()))
        }
    }

    async fn get_text_response(&self) -> Result<String> {
        retry_transient(Backoff::reads(), || async move {
            if self.surface.count(RESPONSE_TEXT).await? == 0 {
                return Err(AiUiError::NoResponseFound);
            }
            let response = self.surface.inner_text_last(RESPONSE_TEXT).await?;
            if response.is_empty() {
                return Err(AiUiError::NoResponseFound);
            }
            Ok(response)
        })
        .await
    }

    async fn get_code_block_response(&self) -> Result<String> {
        retry_transient(Backoff::reads(), || async move {
            if self.surface.count(RESPONSE_CONTAINER).await? == 0 {
                return Err(AiUiError::NoResponseFound);
            }
            self.surface.clipboard_write("").await?;
            self.surface
                .click_within_last(RESPONSE_CONTAINER, COPY_BUTTON)
                .await?;
            let result = self.surface.clipboard_read().await?;
            if result.is_empty() {
                return Err(AiUiError::NoResponseFound);
            }
            Ok(result)
        })
        .await
    }

    async fn get_image_response(&self) -> Result<String> {
        let src = self
            .surface
            .attr_within_last(RESPONSE_CONTAINER, "img", "src")
            .await?;
        match src {
            Some(src) if !src.is_empty() => Ok(src),
            _ => Err(AiUiError::ImageGenerationFailed),
        }
    }
}

#[async_trait]
impl ChatModel for Gemini {
    fn provider(&self) -> AiModel {
        AiModel::Gemini
    }

    fn chat_url(&self) -> &'static str {
        CHAT_URL
    }

    fn surface(&self) -> &dyn ChatSurface {
        self.surface.as_ref()
    }

    async fn chat(&self, message: &str, expected: ExpectedResult) -> Result<String> {
        self.ensure_on_chat_page().await?;

        let message = if expected.wants_code_block() {
            ensure_code_block_request(message)
        } else {
            message.to_string()
        };

        self.ensure_input_field().await?;
        self.surface.fill(INPUT_FIELD, &message).await?;
        self.click_submit().await?;
        self.wait_for_response().await?;

        match expected {
            ExpectedResult::Code | ExpectedResult::Json => self.get_code_block_response().await,
            ExpectedResult::Image => self.get_image_response().await,
            ExpectedResult::Text => self.get_text_response().await,
        }
    }

    async fn attach_file(&self, path: &Path) -> Result<()> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| AiUiError::AttachmentFailed(path.display().to_string()))?;
        retry_transient(Backoff::attach(), || {
            let file_name = file_name.clone();
            async move {
                self.surface.set_input_files(FILE_INPUT, path).await?;
                self.surface.wait_for_idle().await?;
                if self.surface.count_text(&file_name).await? == 0 {
                    return Err(AiUiError::AttachmentFailed(file_name));
                }
                Ok(())
            }
        })
        .await
    }

    /// Wait for generation to finish: the stop button stays visible while
    /// the response streams in.
    async fn wait_for_response(&self) -> Result<()> {
        self.surface.wait_for_idle().await?;
        let mut polls = 0u32;
        while self.surface.count(STOP_BUTTON).await? > 0 {
            polls += 1;
            if polls >= MAX_GENERATION_POLLS {
                log::warn!("generation still running after {} polls", polls);
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        self.ensure_no_challenge().await
    }

    async fn detect_bot_challenge(&self) -> Result<bool> {
        if self.surface.count(CHALLENGE_FRAME).await? > 0 {
            return Ok(true);
        }
        Ok(self.surface.count_text(CHALLENGE_TEXT).await? > 0)
    }

    fn challenge_checkbox_selector(&self) -> Option<&'static str> {
        Some(CHALLENGE_CHECKBOX)
    }
}
