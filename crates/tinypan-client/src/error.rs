use thiserror::Error;
use tinypan_core::{DecodeError, EncodeError};
use tinypan_hal::HalError;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PanError {
    #[error("invalid configuration")]
    InvalidConfig,
    #[error("already started")]
    AlreadyStarted,
    #[error("transport not connected")]
    NotConnected,
    #[error("bad argument")]
    BadArgument,
    #[error("tx queue full")]
    QueueFull,
    #[error("hal error: {0}")]
    Hal(#[from] HalError),
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("ip stack error: {0}")]
    Stack(&'static str),
}
