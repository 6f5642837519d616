//! Shared constants for Warden components.

/// Default Redis connection URL
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Default Warden HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8888";

/// Action that issues a new challenge id
pub const DEFAULT_GET_ACTION: &str = "GetCaptcha";

/// Action that renders a challenge image
pub const DEFAULT_SHOW_ACTION: &str = "ShowCaptcha";

/// Number of digits in a challenge answer
pub const DEFAULT_CAPTCHA_LENGTH: usize = 4;

/// Default rendered image width in pixels
pub const DEFAULT_IMAGE_WIDTH: u32 = 180;

/// Default rendered image height in pixels
pub const DEFAULT_IMAGE_HEIGHT: u32 = 60;

/// Caller-supplied image dimensions must stay strictly below this bound
pub const MAX_IMAGE_DIMENSION: u32 = 300;

/// Challenge expiry (10 minutes)
pub const CHALLENGE_TTL_SECS: u64 = 600;

/// Failure counter expiry (1 hour)
pub const FAILURE_TTL_SECS: u64 = 3600;

/// How often expired counters and challenges are reclaimed
pub const SWEEP_INTERVAL_SECS: u64 = 60;

/// Largest urlencoded request body the gate will buffer
pub const MAX_FORM_BYTES: usize = 64 * 1024;

/// Redis key prefixes
pub mod redis_keys {
    /// CAPTCHA challenge: captcha:{challenge_id}
    pub const CAPTCHA_PREFIX: &str = "captcha:";
}

/// Request field names understood by the gate
pub mod fields {
    /// Logical action name
    pub const ACTION: &str = "Action";

    /// Challenge id on render requests
    pub const CHALLENGE_ID: &str = "ChallengeId";

    /// Challenge id on gated requests (also accepted on render requests)
    pub const CAPTCHA_ID: &str = "CaptchaId";

    /// Submitted answer on gated requests
    pub const CAPTCHA_CODE: &str = "CaptchaCode";

    /// Optional render width
    pub const WIDTH: &str = "Width";

    /// Optional render height
    pub const HEIGHT: &str = "Height";

    /// Any non-empty value rotates the challenge before rendering
    pub const RELOAD: &str = "Reload";

    /// Downstream outcome reported to the sidecar hook
    pub const OUTCOME: &str = "Outcome";
}

/// HTTP header names
pub mod headers {
    /// Shared secret required on the sidecar hooks
    pub const SIDECAR_TOKEN: &str = "x-warden-token";
}
