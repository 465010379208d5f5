use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("image build failed: {0}")]
    BuildFailed(String),

    #[error("infrastructure tool failed: {0}")]
    ToolFailed(String),

    #[error("infrastructure tool not found on PATH: {0}")]
    ToolNotFound(String),

    #[error("ssh failure: {0}")]
    Ssh(String),

    #[error("internal driver error: {0}")]
    Internal(String),
}
