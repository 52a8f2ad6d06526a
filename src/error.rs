use thiserror::Error;

#[derive(Error, Debug)]
pub enum AiUiError {
    #[error("Failed to connect to Chrome: {0}")]
    ConnectionFailed(String),

    #[error("Failed to launch Chrome: {0}")]
    LaunchFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("No response found")]
    NoResponseFound,

    #[error("Response truncated: \"Continue generating\" did not settle")]
    ResponseTruncated,

    #[error("File could not be attached: {0}")]
    AttachmentFailed(String),

    #[error("Image generation failed")]
    ImageGenerationFailed,

    #[error("Bot challenge detected")]
    BotDetected,

    #[error("Bot-detection recovery gave up after {attempts} attempts")]
    RecoveryExhausted { attempts: u32 },

    #[error("Config error: {0}")]
    Config(String),

    #[error("{0} is not supported by this provider")]
    Unsupported(&'static str),

    #[error("CDP error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl AiUiError {
    /// Short-lived UI races (empty clipboard, response region not yet
    /// populated, attachment name not rendered). These get the bounded
    /// exponential-backoff retry; everything else surfaces immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AiUiError::NoResponseFound | AiUiError::AttachmentFailed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AiUiError>;
