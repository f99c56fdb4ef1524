use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;
pub type ConfigError = Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Image upload error: {0}")]
    Upload(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Field cannot be changed: {0}")]
    ImmutableField(String),

    #[error("Admin panel is temporarily locked, try again in {remaining_secs}s")]
    Locked { remaining_secs: u64 },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl Error {
    pub fn is_temporary(&self) -> bool {
        matches!(
            self,
            Error::HttpError(_) | Error::Io(_) | Error::Locked { .. }
        )
    }

    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::ImmutableField(_)
                | Error::InvalidUrl(_)
                | Error::Config(_)
                | Error::Unauthorized(_)
        )
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION",
            Error::Upload(_) => "UPLOAD",
            Error::Persistence(_) => "PERSISTENCE",
            Error::NotFound(_) => "NOT_FOUND",
            Error::ImmutableField(_) => "IMMUTABLE_FIELD",
            Error::Locked { .. } => "LOCKED",
            Error::Unauthorized(_) => "UNAUTHORIZED",
            Error::Config(_) => "CONFIG",
            Error::InvalidUrl(_) => "INVALID_URL",
            Error::HttpError(_) => "HTTP_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Serialization(_) => "SERIALIZATION",
        }
    }
}
