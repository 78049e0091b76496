//! Error types for the `stillframe` crate.
//!
//! [`StillFrameError`] is returned by every fallible operation. Variants carry
//! the path or upstream message that caused them; [`StillFrameError::kind`]
//! folds them into the five failure classes the nodes reason about.

use std::{io::Error as IoError, path::PathBuf};

use ffmpeg_next::Error as FfmpegError;
use thiserror::Error;

/// Coarse classification of a [`StillFrameError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or invalid configuration (no filename, bad rate, unknown command).
    Config,
    /// A container, codec, or file could not be opened, or held no video frame.
    Open,
    /// The codec rejected a submission or failed to flush.
    Encode,
    /// Muxing or filesystem I/O failed.
    Write,
    /// A query arrived before the source had a cached frame.
    NotReady,
}

/// The unified error type for all `stillframe` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StillFrameError {
    /// Required configuration is missing or malformed.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A media container or codec could not be opened.
    #[error("Failed to open media file at {path}: {reason}")]
    FileOpen {
        /// Path that was being opened.
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The input has no decodable video stream.
    #[error("No video stream found in {path}")]
    NoVideoStream {
        /// Path of the offending input.
        path: PathBuf,
    },

    /// The input was exhausted without yielding a single video frame.
    #[error("No decodable video frame found in {path}")]
    NoVideoFrame {
        /// Path of the offending input.
        path: PathBuf,
    },

    /// Encoding a frame failed.
    #[error("Video encoding error: {0}")]
    EncodeError(String),

    /// Writing encoded data to the container failed.
    #[error("Write error: {0}")]
    WriteError(String),

    /// Output parameters were requested before a frame was cached.
    #[error("Source is not ready: no frame is cached")]
    NotReady,

    /// The host delivered a command this crate does not understand.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// An I/O error occurred while preparing output paths.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),
}

impl StillFrameError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StillFrameError::ConfigError(_) | StillFrameError::UnknownCommand(_) => {
                ErrorKind::Config
            }
            StillFrameError::FileOpen { .. }
            | StillFrameError::NoVideoStream { .. }
            | StillFrameError::NoVideoFrame { .. } => ErrorKind::Open,
            StillFrameError::EncodeError(_) | StillFrameError::FfmpegError(_) => {
                ErrorKind::Encode
            }
            StillFrameError::WriteError(_) | StillFrameError::IoError(_) => ErrorKind::Write,
            StillFrameError::NotReady => ErrorKind::NotReady,
        }
    }
}

impl From<FfmpegError> for StillFrameError {
    fn from(error: FfmpegError) -> Self {
        StillFrameError::FfmpegError(error.to_string())
    }
}
