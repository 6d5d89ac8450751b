use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Tool error: {0}")]
    Tool(String),

    /// The automation backend (browser process or MCP server) is gone.
    /// Unlike `Tool`, this aborts the run.
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error should end the run instead of being reported
    /// back to the model as a tool result.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_) | Error::Backend(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
