use std::collections::TryReserveError;
use std::fmt::Display;

use thiserror::Error;

/// Everything that can go wrong talking to a display server's clipboard.
///
/// Backends never panic on protocol failures; every fallible operation
/// reports one of these.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    /// Connecting to the display, binding globals or setting up the proxy
    /// window failed, or the server offers none of the protocols we speak.
    #[error("clipboard backend initialization failed: {0}")]
    InitializationFailed(String),
    /// No backend matches the current session, or a Wayland-only operation
    /// was invoked on X11.
    #[error("no supported clipboard is available in this session")]
    UnsupportedPlatform,
    /// The selection has no owner, the payload was empty, or nothing is
    /// offered in the requested format.
    #[error("the clipboard holds no data")]
    NoData,
    /// The clipboard holds data of a different format than requested.
    #[error("the clipboard data does not match the requested format")]
    InvalidData,
    #[error("clipboard read failed: {0}")]
    ReadFailed(String),
    #[error("clipboard write failed: {0}")]
    WriteFailed(String),
    /// The selection owner did not answer within the protocol deadline.
    #[error("timed out waiting for the selection owner")]
    Timeout,
    /// A transfer buffer could not be grown.
    #[error("out of memory while transferring clipboard data")]
    OutOfMemory,
}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Error::OutOfMemory
    }
}

impl Error {
    pub(crate) fn init(err: impl Display) -> Self {
        Error::InitializationFailed(err.to_string())
    }

    pub(crate) fn read(err: impl Display) -> Self {
        Error::ReadFailed(err.to_string())
    }

    pub(crate) fn write(err: impl Display) -> Self {
        Error::WriteFailed(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
