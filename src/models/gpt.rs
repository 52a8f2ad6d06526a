//! ChatGPT protocol implementation.
//!
//! The composer is driven through keyboard shortcuts (focus + type) to keep
//! message formatting intact, and responses are extracted through the app's
//! copy-last-article / copy-last-code shortcuts via the clipboard.

use super::{clean_text, ensure_code_block_request, AiModel, ChatModel, ExpectedResult};
use crate::config::Config;
use crate::error::{AiUiError, Result};
use crate::keyboard::{shortcut, KeyboardCommand};
use crate::retry::{retry_transient, Backoff};
use crate::surface::ChatSurface;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveTime};
use regex::Regex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const CHAT_URL: &str = "https://chatgpt.com";
const INPUT_FIELD: &str = "#prompt-textarea";
const SEND_BUTTON: &str = r#"[data-testid="send-button"]:not([disabled])"#;
const SPEECH_BUTTON: &str = r#"[data-testid="composer-speech-button"]"#;
const CONVERSATION_TURN: &str = r#"article[data-testid^="conversation-turn"]"#;
const SEARCH_TOOL_INACTIVE: &str = r#"[aria-label="Search the web"][aria-pressed="false"]"#;
const FILE_INPUT: &str = r#"input[type="file"]"#;
const CONTINUE_GENERATING: &str = "Continue generating";
const CHALLENGE_TEXT: &str = "Verify you are human";

/// Truncated responses surface a "Continue generating" affordance; clicking
/// it more than this many times means the UI is stuck.
const MAX_CONTINUE_CLICKS: u32 = 8;

/// Safety margin added to a parsed rate-limit reset time.
const RATE_LIMIT_MARGIN: ChronoDuration = ChronoDuration::minutes(5);

/// Auxiliary capabilities that can be toggled before submitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GptTool {
    SearchTheWeb,
}

pub struct Gpt {
    config: Arc<Config>,
    surface: Arc<dyn ChatSurface>,
}

impl Gpt {
    pub fn new(config: Arc<Config>, surface: Arc<dyn ChatSurface>) -> Self {
        Self { config, surface }
    }

    fn combo(&self, command: KeyboardCommand) -> &'static str {
        shortcut(self.config.platform, command)
    }

    async fn ensure_input_field(&self) -> Result<()> {
        if self.surface.count(INPUT_FIELD).await? > 0 {
            return Ok(());
        }
        if self.detect_bot_challenge().await? {
            return Err(AiUiError::BotDetected);
        }
        Err(AiUiError::ElementNotFound(INPUT_FIELD.to_string()))
    }

    /// Focus the composer via its shortcut and type the message through the
    /// keyboard, preserving newlines and formatting.
    async fn fill_message(&self, message: &str) -> Result<()> {
        self.surface
            .press_key(self.combo(KeyboardCommand::FocusChatInput))
            .await?;
        self.surface.type_text(message).await
    }

    /// Click the send button. The speech toggle replaces it while the
    /// composer is empty; that is an idle signal, never a submit fallback.
    async fn click_submit(&self) -> Result<()> {
        if self.surface.count(SEND_BUTTON).await? > 0 {
            return self.surface.click(SEND_BUTTON).await;
        }
        if self.surface.count(SPEECH_BUTTON).await? > 0 {
            return Err(AiUiError::ElementNotFound(
                "send button (composer is idle, only the speech toggle is present)".to_string(),
            ));
        }
        Err(AiUiError::ElementNotFound("send button".to_string()))
    }

    /// Toggle requested tools, skipping any that are already active.
    async fn activate_tools(&self, tools: &[GptTool]) -> Result<()> {
        if tools.contains(&GptTool::SearchTheWeb)
            && self.surface.count(SEARCH_TOOL_INACTIVE).await? > 0
        {
            self.surface.click(SEARCH_TOOL_INACTIVE).await?;
        }
        Ok(())
    }

    async fn get_text_response(&self) -> Result<String> {
        retry_transient(Backoff::reads(), || async move {
            self.surface.clipboard_write("").await?;
            self.surface
                .press_key(self.combo(KeyboardCommand::CopyLastArticle))
                .await?;
            let result = self.surface.clipboard_read().await?;
            if result.is_empty() {
                return Err(AiUiError::NoResponseFound);
            }
            Ok(clean_text(&result))
        })
        .await
    }

    async fn get_code_block_response(&self) -> Result<String> {
        retry_transient(Backoff::reads(), || async move {
            self.surface.clipboard_write("").await?;
            self.surface
                .press_key(self.combo(KeyboardCommand::CopyLastCode))
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
            .attr_within_last(CONVERSATION_TURN, "img", "src")
            .await?;
        match src {
            Some(src) if !src.is_empty() => Ok(src),
            _ => Err(AiUiError::ImageGenerationFailed),
        }
    }

    /// Full chat call with explicit tool activation.
    pub async fn chat_with_tools(
        &self,
        message: &str,
        expected: ExpectedResult,
        tools: &[GptTool],
    ) -> Result<String> {
        let message = if expected.wants_code_block() {
            ensure_code_block_request(message)
        } else {
            message.to_string()
        };

        self.ensure_input_field().await?;
        self.fill_message(&message).await?;
        self.activate_tools(tools).await?;
        self.click_submit().await?;
        self.wait_for_response().await?;

        match expected {
            ExpectedResult::Image => self.get_image_response().await,
            ExpectedResult::Code | ExpectedResult::Json => self.get_code_block_response().await,
            ExpectedResult::Text => self.get_text_response().await,
        }
    }
}

#[async_trait]
impl ChatModel for Gpt {
    fn provider(&self) -> AiModel {
        AiModel::Gpt
    }

    fn chat_url(&self) -> &'static str {
        CHAT_URL
    }

    fn surface(&self) -> &dyn ChatSurface {
        self.surface.as_ref()
    }

    async fn chat(&self, message: &str, expected: ExpectedResult) -> Result<String> {
        self.chat_with_tools(message, expected, &[]).await
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

    /// Wait for generation to finish, clicking through "Continue generating"
    /// for truncated long responses a bounded number of times.
    async fn wait_for_response(&self) -> Result<()> {
        self.surface.wait_for_idle().await?;
        let mut clicks = 0u32;
        while self.surface.count_text(CONTINUE_GENERATING).await? > 0 {
            if clicks >= MAX_CONTINUE_CLICKS {
                return Err(AiUiError::ResponseTruncated);
            }
            self.surface.click_text(CONTINUE_GENERATING).await?;
            clicks += 1;
            log::info!("continuing generation ({}/{})", clicks, MAX_CONTINUE_CLICKS);
            self.surface.wait_for_idle().await?;
        }
        if self.detect_bot_challenge().await? {
            return Err(AiUiError::BotDetected);
        }
        Ok(())
    }

    async fn detect_bot_challenge(&self) -> Result<bool> {
        Ok(self.surface.count_text(CHALLENGE_TEXT).await? > 0)
    }

    fn challenge_checkbox_selector(&self) -> Option<&'static str> {
        Some(r#"input[type="checkbox"]"#)
    }

    /// After a failed call, reload and look for a "try again at h:MM AM/PM"
    /// rate-limit notice; if present, sleep until that wall-clock time plus
    /// a margin so the caller's next action lands after the reset.
    async fn handle_failure(&self, _error: &AiUiError) -> Result<()> {
        self.surface.reload().await?;
        let body = self.surface.body_text().await?;
        if let Some(reset_at) = find_reset_time(&body) {
            let delay = reset_delay(Local::now(), reset_at);
            log::info!(
                "rate limit reset at {}; waiting {}s",
                reset_at.format("%I:%M %p"),
                delay.as_secs()
            );
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

/// Extract the first "h:MM AM/PM" timestamp from the page text.
fn find_reset_time(body: &str) -> Option<NaiveTime> {
    let pattern = Regex::new(r"([0-9]{1,2}:[0-9]{2}\s?(?:AM|PM))").ok()?;
    let captured = pattern.captures(body)?.get(1)?.as_str().to_string();
    NaiveTime::parse_from_str(&captured, "%I:%M %p").ok()
}

/// Time to sleep until the next wall-clock occurrence of `reset_at` (plus a
/// safety margin). If the time has already passed today, it means tomorrow.
fn reset_delay(now: DateTime<Local>, reset_at: NaiveTime) -> Duration {
    let mut reset = now.date_naive().and_time(reset_at);
    if reset_at < now.time() {
        reset += ChronoDuration::days(1);
    }
    reset += RATE_LIMIT_MARGIN;
    (reset - now.naive_local()).to_std().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn reset_time_is_found_in_notice_text() {
        let body = "You've reached our limit. Please try again after 2:30 PM.";
        let time = find_reset_time(body).unwrap();
        assert_eq!(time, NaiveTime::from_hms_opt(14, 30, 0).unwrap());
        assert!(find_reset_time("no notice here").is_none());
    }

    #[test]
    fn reset_later_today_sleeps_until_then_plus_margin() {
        let now = Local.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let reset_at = NaiveTime::from_hms_opt(14, 30, 0).unwrap();
        // 2.5 hours away plus the 5 minute margin.
        assert_eq!(reset_delay(now, reset_at), Duration::from_secs(9300));
    }

    #[test]
    fn reset_already_passed_rolls_to_tomorrow() {
        let now = Local.with_ymd_and_hms(2025, 3, 1, 15, 0, 0).unwrap();
        let reset_at = NaiveTime::from_hms_opt(14, 30, 0).unwrap();
        // 23.5 hours away plus the 5 minute margin.
        assert_eq!(reset_delay(now, reset_at), Duration::from_secs(84_900));
    }
}
