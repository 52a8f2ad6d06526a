//! Drive web chat assistants (ChatGPT, Claude, Gemini) through a real
//! Chrome browser over the Chrome DevTools Protocol: type into the
//! composer, submit, wait for generation to finish, and extract text, code
//! blocks or images, with retry on transient UI races, rate-limit-reset
//! waiting, and automatic recovery from bot-detection challenges.

pub mod aionui;
pub mod blocking;
pub mod config;
pub mod error;
pub mod keyboard;
pub mod models;
pub mod retry;
pub mod session;
pub mod surface;

// Re-export commonly used items
pub use aionui::{AiOnUi, RecoveryPolicy};
pub use config::{Config, Platform};
pub use error::{AiUiError, Result};
pub use keyboard::{shortcut, KeyboardCommand};
pub use models::{build_model, AiModel, ChatModel, Claude, ExpectedResult, Gemini, Gpt, GptTool};
pub use retry::{retry_transient, Backoff};
pub use session::{BrowserSession, Ownership, SessionBackend};
pub use surface::{CdpSurface, ChatSurface};
