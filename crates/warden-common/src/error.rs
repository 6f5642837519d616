//! Common error types for Warden components.

use thiserror::Error;

/// Common errors across Warden components
#[derive(Debug, Error)]
pub enum WardenError {
    /// Configuration error (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Challenge store unreachable or misbehaving
    #[error("Challenge store error: {0}")]
    ChallengeStore(String),

    /// A request that requires verification carried no challenge id or answer
    #[error("Missing captcha!")]
    MissingCaptcha,

    /// Verification failed
    #[error("Wrong captcha!")]
    WrongCaptcha,

    /// Unknown or expired resource
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input/request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Caller lacks the credentials for an internal endpoint
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl WardenError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Config(_) => 500,
            Self::ChallengeStore(_) => 503,
            Self::MissingCaptcha => 400,
            Self::WrongCaptcha => 403,
            Self::NotFound(_) => 404,
            Self::InvalidInput(_) => 400,
            Self::Unauthorized(_) => 401,
        }
    }

    /// Stable machine-readable code surfaced to API callers
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "InternalError",
            Self::ChallengeStore(_) => "ServiceUnavailable",
            Self::MissingCaptcha => "MissingCaptcha",
            Self::WrongCaptcha => "WrongCaptcha",
            Self::NotFound(_) => "NotFound",
            Self::InvalidInput(_) => "InvalidInput",
            Self::Unauthorized(_) => "Unauthorized",
        }
    }

    /// Returns true if the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ChallengeStore(_))
    }

    /// Returns true if the message is safe to show to API callers
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, Self::Config(_) | Self::ChallengeStore(_))
    }
}
