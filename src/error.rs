use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("Invalid HTTP request: {0}")]
    HttpRequest(#[from] hyper::http::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid transformation template: {0}")]
    InvalidTemplate(String),

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Action invocation failed: {0}")]
    ActionFailed(String),

    #[error("Manager API returned {status}: {message}")]
    ManagerApi { status: u16, message: String },

    #[error("Operation timeout: {0}")]
    Timeout(String),

    #[error("Cluster error: {0}")]
    Cluster(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invariant violated: {0}")]
    InvariantViolated(String),

    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
