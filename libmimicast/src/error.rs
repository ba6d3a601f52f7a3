//! Error types for Mimicast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MimicastError>;

#[derive(Error, Debug)]
pub enum MimicastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl MimicastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            MimicastError::Config(_) => 2,
            MimicastError::Platform(PlatformError::Authentication(_)) => 3,
            MimicastError::Generation(GenerationError::Authentication(_)) => 3,
            MimicastError::Platform(_) => 1,
            MimicastError::Generation(_) => 1,
            MimicastError::Session(_) => 1,
            MimicastError::InvalidInput(_) => 1,
        }
    }

    /// Whether this error looks like a rejected or expired session
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            MimicastError::Platform(PlatformError::Authentication(_))
                | MimicastError::Generation(GenerationError::Authentication(_))
        )
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session file is corrupt: {0}")]
    Corrupt(String),

    #[error("Failed to persist session: {0}")]
    Persistence(#[from] std::io::Error),
}

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Unexpected response: {0}")]
    Parse(String),
}

#[derive(Error, Debug, Clone)]
pub enum GenerationError {
    #[error("Provider returned an error: {0}")]
    Provider(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider rejected credentials: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Failed to parse provider response: {0}")]
    Parse(String),
}
