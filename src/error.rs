use std::fmt::{Display, Formatter};
use std::sync::{PoisonError, TryLockError};

use config::ConfigError;

use crate::storage::page::FrameId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    Internal(String),
    Value(String),
    /// The frame id is out of the range the replacer was built for.
    InvalidFrame(FrameId),
    /// Removing a frame from the replacer while it is still pinned.
    FrameNotEvictable(FrameId),
}

impl Error {
    /// Contract violations are programmer errors, a correct buffer pool
    /// never produces them.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Error::InvalidFrame(_) | Error::FrameNotEvictable(_))
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Internal(s) | Error::Value(s) => {
                write!(f, "{}", s)
            }
            Error::InvalidFrame(frame_id) => write!(f, "invalid frame id {}", frame_id),
            Error::FrameNotEvictable(frame_id) => {
                write!(f, "frame {} is not evictable", frame_id)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

impl<T> From<PoisonError<T>> for Error {
    fn from(err: PoisonError<T>) -> Self {
        Error::Internal(err.to_string())
    }
}

impl<T> From<TryLockError<T>> for Error {
    fn from(err: TryLockError<T>) -> Self {
        match err {
            TryLockError::Poisoned(err) => err.into(),
            TryLockError::WouldBlock => Error::Internal("page latch is held".to_string()),
        }
    }
}

impl From<std::num::TryFromIntError> for Error {
    fn from(err: std::num::TryFromIntError) -> Self {
        Error::Internal(err.to_string())
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Internal(err.to_string())
    }
}

impl From<log::SetLoggerError> for Error {
    fn from(err: log::SetLoggerError) -> Self {
        Error::Internal(err.to_string())
    }
}

impl From<log::ParseLevelError> for Error {
    fn from(err: log::ParseLevelError) -> Self {
        Error::Value(err.to_string())
    }
}
