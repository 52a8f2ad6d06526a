//! Claude protocol implementation.
//!
//! The composer is a contenteditable region, responses live in
//! `.font-claude-message` blocks, and code extraction goes through the copy
//! button of the last response block.

use super::{ensure_code_block_request, AiModel, ChatModel, ExpectedResult};
use crate::config::Config;
use crate::error::{AiUiError, Result};
use crate::retry::{retry_transient, Backoff};
use crate::surface::ChatSurface;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

const CHAT_URL: &str = "https://claude.ai/new";
const INPUT_FIELD: &str = r#"[contenteditable="true"]"#;
const SEND_BUTTON: &str = r#"[aria-label="Send Message"]"#;
const RESPONSE_BLOCK: &str = ".font-claude-message";
const COPY_BUTTON: &str = "button";
const FILE_INPUT: &str = r#"input[data-testid="file-upload"]"#;

pub struct Claude {
    #[allow(dead_code)]
    config: Arc<Config>,
    surface: Arc<dyn ChatSurface>,
}

impl Claude {
    pub fn new(config: Arc<Config>, surface: Arc<dyn ChatSurface>) -> Self {
        Self { config, surface }
    }

    /// Conversations live under claude.ai; navigate there if the page has
    /// wandered off (or was just opened).
    async fn ensure_on_chat_page(&self) -> Result<()> {
        let url = self.surface.current_url().await?;
        if !url.to_lowercase().contains("claude") {
            self.surface.goto(CHAT_URL).await?;
            self.surface.wait_for_idle().await?;
        }
        Ok(())
    }

    async fn ensure_input_field(&self) -> Result<()> {
        if self.surface.count(INPUT_FIELD).await? > 0 {
            Ok(())
        } else {
            Err(AiUiError::ElementNotFound(INPUT_FIELD.to_string()))
        }
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
            if self.surface.count(RESPONSE_BLOCK).await? == 0 {
                return Err(AiUiError::NoResponseFound);
            }
            let response = self.surface.inner_text_last(RESPONSE_BLOCK).await?;
            if response.is_empty() {
                return Err(AiUiError::NoResponseFound);
            }
            Ok(response)
        })
        .await
    }

    /// Copy the last response block through its copy button and read the
    /// clipboard.
    async fn get_code_block_response(&self) -> Result<String> {
        retry_transient(Backoff::reads(), || async move {
            if self.surface.count(RESPONSE_BLOCK).await? == 0 {
                return Err(AiUiError::NoResponseFound);
            }
            self.surface.clipboard_write("").await?;
            self.surface
                .click_within_last(RESPONSE_BLOCK, COPY_BUTTON)
                .await?;
            let result = self.surface.clipboard_read().await?;
            if result.is_empty() {
                return Err(AiUiError::NoResponseFound);
            }
            Ok(result)
        })
        .await
    }
}

#[async_trait]
impl ChatModel for Claude {
    fn provider(&self) -> AiModel {
        AiModel::Claude
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
            ExpectedResult::Image => Err(AiUiError::Unsupported("image extraction")),
            ExpectedResult::Text => self.get_text_response().await,
        }
    }

    /// Attach a file and verify the input actually holds it.
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
                let value = self.surface.input_value(FILE_INPUT).await?;
                let attached = Path::new(&value)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if attached != file_name {
                    return Err(AiUiError::AttachmentFailed(file_name));
                }
                Ok(())
            }
        })
        .await
    }

    async fn wait_for_response(&self) -> Result<()> {
        self.surface.wait_for_idle().await
    }
}
