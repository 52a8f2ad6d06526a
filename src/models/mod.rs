//! Per-provider chat protocol implementations.
//!
//! Every provider exposes the same capability set (locate the composer,
//! submit, wait for generation to finish, extract text/code/image, attach
//! files, detect bot challenges), and `ChatModel` is that set as a trait.
//! The registry in [`build_model`] maps an [`AiModel`] discriminator to the
//! concrete implementation.

pub mod claude;
pub mod gemini;
pub mod gpt;

pub use claude::Claude;
pub use gemini::Gemini;
pub use gpt::{Gpt, GptTool};

use crate::error::{AiUiError, Result};
use crate::surface::ChatSurface;
use async_trait::async_trait;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Priming message sent at the start of every new conversation.
pub const INIT_INSTRUCTIONS: &str = "For my requests, please proceed as follows:\n\
    - Only respond to what is requested, do not add any descriptions or explanations.\n\
    - Return in a code block for JSON and code, while text remains in normal format.\n\
    - Search for any additional information on the internet if needed.\n";

/// Provider discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AiModel {
    Gpt,
    Claude,
    Gemini,
}

impl std::fmt::Display for AiModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AiModel::Gpt => write!(f, "gpt"),
            AiModel::Claude => write!(f, "claude"),
            AiModel::Gemini => write!(f, "gemini"),
        }
    }
}

impl FromStr for AiModel {
    type Err = AiUiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gpt" => Ok(AiModel::Gpt),
            "claude" => Ok(AiModel::Claude),
            "gemini" => Ok(AiModel::Gemini),
            other => Err(AiUiError::Config(format!("unknown model: {}", other))),
        }
    }
}

/// Which extraction routine a `chat` call should run. `Json` is `Code` plus
/// caller-side decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpectedResult {
    #[default]
    Text,
    Code,
    Image,
    Json,
}

impl ExpectedResult {
    pub fn wants_code_block(self) -> bool {
        matches!(self, ExpectedResult::Code | ExpectedResult::Json)
    }
}

impl FromStr for ExpectedResult {
    type Err = AiUiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(ExpectedResult::Text),
            "code" => Ok(ExpectedResult::Code),
            "image" => Ok(ExpectedResult::Image),
            "json" => Ok(ExpectedResult::Json),
            other => Err(AiUiError::Config(format!(
                "unknown expected result: {}",
                other
            ))),
        }
    }
}

/// The provider chat-session state machine: compose → submit →
/// await-completion → extract, plus file attachment and bot-challenge
/// detection. One in-flight `chat`/`attach_file` call per instance; the live
/// DOM is the only state.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn provider(&self) -> AiModel;

    /// The provider's chat URL.
    fn chat_url(&self) -> &'static str;

    fn surface(&self) -> &dyn ChatSurface;

    /// Send a message and return the extracted response.
    async fn chat(&self, message: &str, expected: ExpectedResult) -> Result<String>;

    /// Attach a file to the next message and verify the UI accepted it.
    async fn attach_file(&self, path: &Path) -> Result<()>;

    /// Wait until the provider has finished generating.
    async fn wait_for_response(&self) -> Result<()>;

    /// Whether the provider is currently showing a human-verification
    /// challenge.
    async fn detect_bot_challenge(&self) -> Result<bool> {
        Ok(false)
    }

    /// Selector of the verification checkbox to tick during recovery.
    fn challenge_checkbox_selector(&self) -> Option<&'static str> {
        None
    }

    /// Cooperative reaction to a failed call (e.g. waiting out a rate-limit
    /// reset) before the caller's next action.
    async fn handle_failure(&self, _error: &AiUiError) -> Result<()> {
        Ok(())
    }

    /// Navigate to the provider's chat URL and send the priming
    /// instructions, leaving the session idle and ready.
    async fn new_conversation(&self) -> Result<()> {
        self.surface().goto(self.chat_url()).await?;
        self.surface().wait_for_idle().await?;
        self.chat(INIT_INSTRUCTIONS, ExpectedResult::Text).await?;
        Ok(())
    }

    /// Write `content` to a temp file and attach it. Useful for prompts too
    /// large for the composer.
    async fn text_as_file(&self, content: &str, file_name: &str) -> Result<()> {
        let path = std::env::temp_dir().join(file_name);
        tokio::fs::write(&path, content).await?;
        self.attach_file(&path).await
    }
}

/// Build the model implementation for a provider, bound to a session's
/// surface.
pub fn build_model(
    model: AiModel,
    config: Arc<crate::config::Config>,
    surface: Arc<dyn ChatSurface>,
) -> Box<dyn ChatModel> {
    match model {
        AiModel::Gpt => Box::new(Gpt::new(config, surface)),
        AiModel::Claude => Box::new(Claude::new(config, surface)),
        AiModel::Gemini => Box::new(Gemini::new(config, surface)),
    }
}

/// Append the code-block instruction unless the message already asks for
/// one, keeping the model's output format aligned with the extraction
/// routine.
pub(crate) fn ensure_code_block_request(message: &str) -> String {
    if message.to_lowercase().contains("return in code block") {
        message.to_string()
    } else {
        format!("{}\nReturn in code block.", message)
    }
}

/// Normalize clipboard-read text: unify newlines, replace non-breaking
/// spaces, strip surrounding whitespace.
pub(crate) fn clean_text(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\u{a0}', " ")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_names_round_trip() {
        for model in [AiModel::Gpt, AiModel::Claude, AiModel::Gemini] {
            assert_eq!(model.to_string().parse::<AiModel>().unwrap(), model);
        }
        assert!("copilot".parse::<AiModel>().is_err());
    }

    #[test]
    fn expected_result_parses_case_insensitively() {
        assert_eq!("JSON".parse::<ExpectedResult>().unwrap(), ExpectedResult::Json);
        assert!(ExpectedResult::Json.wants_code_block());
        assert!(!ExpectedResult::Image.wants_code_block());
    }

    #[test]
    fn code_block_instruction_is_idempotent() {
        let once = ensure_code_block_request("give me JSON");
        assert!(once.ends_with("Return in code block."));
        assert_eq!(ensure_code_block_request(&once), once);
    }

    #[test]
    fn clean_text_normalizes_clipboard_output() {
        assert_eq!(clean_text(" hello\u{a0}world\r\n"), "hello world");
    }
}
