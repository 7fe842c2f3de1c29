/*!
    Error taxonomy for the media source adapter.
*/

use thiserror::Error;

/**
    Errors surfaced by source creation, sample delivery, and seeking.

    `Clone` is required so a pump that entered the terminal `Failed` state
    can replay its triggering error to every subsequent request.
*/
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// The caller passed a null, empty, or otherwise unusable input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The engine cannot open the input, or no usable tracks remain.
    #[error("unsupported media: {0}")]
    UnsupportedMedia(String),

    /// The input URI is unreachable or the transport failed mid-stream.
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// Unrecoverable demux/decode error inside the engine.
    #[error("engine failure: {0}")]
    EngineFailure(String),

    /// The operation raced with or followed `shutdown()`.
    #[error("source has been shut down")]
    Shutdown,
}

impl Error {
    /**
        Shorthand for an `InvalidInput` error.
    */
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /**
        Shorthand for an `UnsupportedMedia` error.
    */
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedMedia(msg.into())
    }

    /**
        Shorthand for an `EngineFailure` error.
    */
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::EngineFailure(msg.into())
    }

    /**
        Returns true if the error leaves the engine context unusable.

        Used by the seek path to decide between failing soft (report and
        stay streaming) and transitioning the pump to `Failed`.
    */
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::EngineFailure(_))
    }
}

/**
    Result alias used throughout the crate.
*/
pub type Result<T> = std::result::Result<T, Error>;
