use thiserror::Error;

/// Fatal problems found while loading configuration at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("OPENROUTER_API_KEY or OPENAI_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("MODEL_BASE_URL must start with http:// or https://, got '{0}'")]
    InvalidBaseUrl(String),
}

/// Rejected message content. Recovered locally by reprompting.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("message content is empty")]
    EmptyContent,
}

/// Failure of a single model call.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error(
        "Model request timed out after {timeout_secs}s while calling '{url}'. \
         Increase MODEL_TIMEOUT_SECS or check model responsiveness."
    )]
    Timeout { url: String, timeout_secs: u64 },

    #[error(
        "Connection refused by model API at '{url}'. \
         Ensure the provider is reachable and MODEL_BASE_URL is correct."
    )]
    ConnectionRefused { url: String },

    #[error(
        "Failed to connect to model API at '{url}'. \
         Check MODEL_BASE_URL and network connectivity."
    )]
    Connect { url: String },

    #[error("Failed to call model API at '{url}': {message}")]
    Network { url: String, message: String },

    #[error(
        "Model API rejected the credentials (status {status}): {message}. \
         Check OPENROUTER_API_KEY or OPENAI_API_KEY."
    )]
    Unauthorized { status: u16, message: String },

    #[error("Model API rate limit reached: {message}")]
    RateLimited { message: String },

    #[error("Model request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),
}

/// Why a conversation turn did not produce an assistant message.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("conversation has already ended")]
    SessionEnded,
}
