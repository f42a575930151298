use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Command execution failed: {stderr}")]
    Command { stdout: String, stderr: String },

    #[error("Storage operation failed: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
