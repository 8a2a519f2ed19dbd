use std::fmt::Display;
use std::path::PathBuf;
use thiserror::Error;

pub mod codes;

pub use codes::{describe_error_code, ErrorCode};

/// The unified error type for the Roster service
#[derive(Error, Debug)]
pub enum RosterError {
    #[error("[E{code:04}] Configuration error: {message}")]
    Config {
        code: u16,
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Aggregation error: {message}")]
    Aggregation {
        code: u16,
        message: String,
        field: Option<String>,
    },

    #[error("[E{code:04}] Record source error: {message}")]
    Source {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Serialization error: {message}")]
    Serialization {
        code: u16,
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("[E{code:04}] Server error: {message}")]
    Server {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] {message}")]
    Other {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl RosterError {
    /// Create a configuration error with default code
    pub fn config(message: impl Into<String>) -> Self {
        Self::config_with_code(ErrorCode::CONFIG_GENERIC, message)
    }

    /// Create a configuration error with specific code
    pub fn config_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Config {
            code,
            message: message.into(),
            path: None,
            source: None,
        }
    }

    /// Attach the configuration file path to a configuration error
    pub fn with_path(mut self, file: impl Into<PathBuf>) -> Self {
        if let Self::Config { path, .. } = &mut self {
            *path = Some(file.into());
        }
        self
    }

    /// Create an aggregation error for an invalid argument
    pub fn invalid_argument(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Aggregation {
            code: ErrorCode::AGGREGATION_INVALID_ARGUMENT,
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create an aggregation error for an argument above its configured limit
    pub fn limit_exceeded(field: impl Into<String>, value: usize, limit: usize) -> Self {
        let field = field.into();
        Self::Aggregation {
            code: ErrorCode::AGGREGATION_LIMIT_EXCEEDED,
            message: format!("{} = {} exceeds the configured maximum of {}", field, value, limit),
            field: Some(field),
        }
    }

    /// Create an aggregation error with specific code
    pub fn aggregation_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Aggregation {
            code,
            message: message.into(),
            field: None,
        }
    }

    /// Create a record source error with specific code
    pub fn source_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Source {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create a serialization error from a serde_json failure
    pub fn serialization(message: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            code: ErrorCode::SERVER_SERIALIZATION_FAILED,
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a server error with specific code
    pub fn server_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Server {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Add a source error to this error
    pub fn with_source(
        mut self,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        match &mut self {
            Self::Config { source: src, .. }
            | Self::Source { source: src, .. }
            | Self::Server { source: src, .. }
            | Self::Other { source: src, .. } => {
                *src = Some(source.into());
            }
            Self::Aggregation { .. } | Self::Serialization { .. } => {}
        }
        self
    }

    /// Add context to the error message
    pub fn with_context(mut self, context: impl Display) -> Self {
        match &mut self {
            Self::Config { message, .. }
            | Self::Aggregation { message, .. }
            | Self::Source { message, .. }
            | Self::Serialization { message, .. }
            | Self::Server { message, .. }
            | Self::Other { message, .. } => {
                *message = format!("{}: {}", message, context);
            }
        }
        self
    }

    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } => 2,
            Self::Aggregation { .. } => 3,
            Self::Source { .. } => 4,
            Self::Serialization { .. } | Self::Server { .. } => 5,
            Self::Other { .. } => 1,
        }
    }

    /// Get the error code
    pub fn code(&self) -> u16 {
        match self {
            Self::Config { code, .. }
            | Self::Aggregation { code, .. }
            | Self::Source { code, .. }
            | Self::Serialization { code, .. }
            | Self::Server { code, .. }
            | Self::Other { code, .. } => *code,
        }
    }

    /// Whether the error was caused by the caller's input rather than the service
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Aggregation { code, .. } if *code != ErrorCode::AGGREGATION_BARRIER_VIOLATION)
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Config { message, path, .. } => match path {
                Some(p) => format!("Configuration problem in {}: {}", p.display(), message),
                None => format!("Configuration problem: {}", message),
            },
            Self::Aggregation { message, field, .. } => match field {
                Some(f) => format!("Invalid value for '{}': {}", f, message),
                None => format!("Aggregation failed: {}", message),
            },
            Self::Source { message, .. } => format!("Record source unavailable: {}", message),
            Self::Serialization { message, .. } => {
                format!("Failed to encode response: {}", message)
            }
            Self::Server { message, .. } => format!("Server error: {}", message),
            Self::Other { message, .. } => message.clone(),
        }
    }

    /// Get a developer-friendly error message with full chain
    pub fn developer_message(&self) -> String {
        let mut msg = format!("{}", self);
        let mut current = std::error::Error::source(self);
        while let Some(cause) = current {
            msg.push_str(&format!("\n  caused by: {}", cause));
            current = cause.source();
        }
        msg
    }
}

impl From<std::io::Error> for RosterError {
    fn from(err: std::io::Error) -> Self {
        Self::Other {
            code: ErrorCode::OTHER_INTERNAL_ERROR,
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, RosterError>;
