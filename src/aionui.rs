//! The `AiOnUi` orchestrator.
//!
//! Binds a [`Config`], a session backend and the selected provider model,
//! and exposes `chat` / `attach_file` wrapped in the bot-detection recovery
//! loop: on a detected challenge the browser session is torn down and
//! reopened, the verification checkbox is ticked if present, and the call
//! is retried up to the configured attempt budget.

use crate::config::Config;
use crate::error::{AiUiError, Result};
use crate::models::{build_model, AiModel, ChatModel, ExpectedResult};
use crate::session::{BrowserSession, SessionBackend};
use chromiumoxide::browser::Browser;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Bounds for the bot-detection recovery loop. The retry is deliberately
/// generous (challenges can recur) but finite, so an unattended job cannot
/// spin forever.
#[derive(Debug, Clone, Copy)]
pub struct RecoveryPolicy {
    pub max_attempts: u32,
    pub cooldown: Duration,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            cooldown: Duration::from_secs(10),
        }
    }
}

enum Action<'a> {
    Chat {
        message: &'a str,
        expected: ExpectedResult,
    },
    AttachFile(&'a Path),
    TextAsFile {
        content: &'a str,
        file_name: &'a str,
    },
}

pub struct AiOnUi {
    config: Arc<Config>,
    model_type: AiModel,
    backend: Box<dyn SessionBackend>,
    model: Option<Box<dyn ChatModel>>,
    recovery: RecoveryPolicy,
}

impl AiOnUi {
    /// Orchestrator with the default browser-session backend. `config_path`
    /// points at an optional YAML config file.
    pub fn new(model_type: AiModel, config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => Config::load(path)?,
            None => Config::new(),
        };
        Ok(Self::with_backend(
            model_type,
            config,
            Box::new(BrowserSession::new()),
        ))
    }

    /// Use a caller-supplied browser. The session creates its own page in it
    /// but never closes the browser; it stays owned by the caller.
    pub fn with_browser(model_type: AiModel, config: Config, browser: Browser) -> Self {
        Self::with_backend(model_type, config, Box::new(BrowserSession::attached(browser)))
    }

    pub fn with_backend(
        model_type: AiModel,
        config: Config,
        backend: Box<dyn SessionBackend>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            model_type,
            backend,
            model: None,
            recovery: RecoveryPolicy::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Replace the whole config from a YAML file. Takes effect on the next
    /// `open()`.
    pub fn load_config(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.config = Arc::new(Config::load(path)?);
        Ok(())
    }

    pub fn set_recovery_policy(&mut self, policy: RecoveryPolicy) {
        self.recovery = policy;
    }

    pub fn is_open(&self) -> bool {
        self.model.is_some()
    }

    /// Open the browser session, bind the provider model to its page and
    /// start a new conversation. If the conversation setup fails the session
    /// is released before the error propagates.
    pub async fn open(&mut self) -> Result<()> {
        if self.model.is_some() {
            self.close().await;
        }
        let surface = self.backend.open(&self.config).await?;
        let model = build_model(self.model_type, self.config.clone(), surface);
        if let Err(e) = model.new_conversation().await {
            self.backend.close().await;
            return Err(e);
        }
        self.model = Some(model);
        Ok(())
    }

    /// Close the session. Safe on every exit path; teardown errors are
    /// logged inside the backend, never raised.
    pub async fn close(&mut self) {
        self.model = None;
        self.backend.close().await;
    }

    /// Send a message and return the extracted response.
    pub async fn chat(&mut self, message: &str, expected: ExpectedResult) -> Result<String> {
        let result = self
            .run_with_recovery(Action::Chat { message, expected })
            .await?;
        Ok(result.unwrap_or_default())
    }

    /// Attach a file to the next message.
    pub async fn attach_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.run_with_recovery(Action::AttachFile(path.as_ref()))
            .await?;
        Ok(())
    }

    /// Write `content` to a temp file and attach it.
    pub async fn text_as_file(&mut self, content: &str, file_name: &str) -> Result<()> {
        self.run_with_recovery(Action::TextAsFile { content, file_name })
            .await?;
        Ok(())
    }

    fn model(&self) -> Result<&dyn ChatModel> {
        self.model
            .as_deref()
            .ok_or_else(|| AiUiError::Other("session not open; call open() first".to_string()))
    }

    /// Execute one logical call with the bot-detection recovery wrapper.
    /// The wrapper is applied exactly once per logical call: transient
    /// retries happen further down, inside the model.
    async fn run_with_recovery(&mut self, action: Action<'_>) -> Result<Option<String>> {
        let mut attempts = 0u32;
        loop {
            let result = match &action {
                Action::Chat { message, expected } => {
                    self.model()?.chat(message, *expected).await.map(Some)
                }
                Action::AttachFile(path) => {
                    self.model()?.attach_file(path).await.map(|_| None)
                }
                Action::TextAsFile { content, file_name } => self
                    .model()?
                    .text_as_file(content, file_name)
                    .await
                    .map(|_| None),
            };
            match result {
                Ok(value) => return Ok(value),
                Err(AiUiError::BotDetected) => {
                    attempts += 1;
                    log::error!(
                        "bot challenge detected (occurrence {}/{})",
                        attempts,
                        self.recovery.max_attempts
                    );
                    if attempts >= self.recovery.max_attempts {
                        return Err(AiUiError::RecoveryExhausted { attempts });
                    }
                    self.recover().await?;
                }
                Err(err) => {
                    if let Some(model) = &self.model {
                        if let Err(follow_up) = model.handle_failure(&err).await {
                            log::warn!("failure handler error: {}", follow_up);
                        }
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Bot-detection recovery: restart the browser session, land on the
    /// provider page with fresh handles, tick the verification checkbox if
    /// one is shown, and cool down before the retry.
    async fn recover(&mut self) -> Result<()> {
        self.model = None;
        self.backend.close().await;

        let surface = self.backend.open(&self.config).await?;
        let model = build_model(self.model_type, self.config.clone(), surface.clone());

        surface.goto(model.chat_url()).await?;
        surface.wait_for_idle().await?;
        if let Some(selector) = model.challenge_checkbox_selector() {
            if surface.count(selector).await? > 0 {
                surface.click(selector).await?;
                log::info!("ticked verification checkbox");
            }
        }
        self.model = Some(model);

        tokio::time::sleep(self.recovery.cooldown).await;
        Ok(())
    }
}
