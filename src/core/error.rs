//! Crate-wide error type

pub type Result<T> = std::result::Result<T, LoggerError>;

#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    /// The reference class is missing from the stack, or nothing called it
    #[error("Failed to find {class} or its caller in the stack")]
    StackIntegrity { class: String },

    /// Appender received a payload it cannot encode
    #[error("Event object of type {type_name} can't be processed")]
    UnsupportedEvent { type_name: String },

    /// Remote collector rejected or never received a batch
    #[error("Transport to '{endpoint}' failed: {message}")]
    Transport { endpoint: String, message: String },

    /// Generic IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Invalid configuration with details
    #[error("Invalid configuration for {component}: {message}")]
    InvalidConfiguration { component: String, message: String },

    /// Channel send error
    #[error("Failed to send log entry to async worker")]
    ChannelSendError,

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl LoggerError {
    /// Create a stack integrity error for the given reference class
    pub fn stack_integrity(class: impl Into<String>) -> Self {
        LoggerError::StackIntegrity {
            class: class.into(),
        }
    }

    /// Create an unsupported event error
    pub fn unsupported_event(type_name: impl Into<String>) -> Self {
        LoggerError::UnsupportedEvent {
            type_name: type_name.into(),
        }
    }

    /// Create a transport error
    pub fn transport(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::Transport {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn config(component: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::InvalidConfiguration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        LoggerError::Other(msg.into())
    }
}
