use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("serial port {port} unavailable: {reason}")]
    Open { port: String, reason: String },
    #[error("serial read timeout")]
    Timeout,
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("serial error: {0}")]
    Serial(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
