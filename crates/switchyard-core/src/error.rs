use thiserror::Error;

#[derive(Debug, Error)]
pub enum SwitchyardError {
    // Integration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Operation not found: {service}.{operation}")]
    OperationNotFound { service: String, operation: String },

    #[error("Provider error: {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Request timeout after {timeout_ms}ms: {url}")]
    Timeout { url: String, timeout_ms: u64 },

    // Webhook errors
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // Graph errors
    #[error("Graph error: {0}")]
    Graph(String),

    #[error("Node execution failed: {node}: {message}")]
    NodeExecution { node: String, message: String },

    // App config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SwitchyardError {
    /// Shorthand for a missing required field on a service operation.
    pub fn missing_field(operation: &str, field: &str) -> Self {
        Self::Configuration(format!("{}: missing required field '{}'", operation, field))
    }
}

pub type Result<T> = std::result::Result<T, SwitchyardError>;
