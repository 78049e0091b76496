//! Runtime reconfiguration commands.
//!
//! The host delivers commands as `(name, argument)` string pairs. They are
//! resolved into a [`Command`] once, at the boundary, and then handed to
//! [`SnapshotEncoder::process_command`](crate::SnapshotEncoder::process_command)
//! or [`CachedFrameSource::process_command`](crate::CachedFrameSource::process_command).

use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::error::StillFrameError;

/// A typed reconfiguration command.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Command {
    /// `filename <value>`: arm a snapshot to this name, or swap the
    /// watermark source to this file.
    Filename(String),
}

impl Command {
    /// Resolve a host command string pair.
    ///
    /// # Errors
    ///
    /// Returns [`StillFrameError::UnknownCommand`] for any name other than
    /// `filename`.
    pub fn parse(name: &str, argument: &str) -> Result<Self, StillFrameError> {
        match name.trim() {
            "filename" => Ok(Command::Filename(argument.trim().to_string())),
            other => Err(StillFrameError::UnknownCommand(other.to_string())),
        }
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Command::Filename(value) => write!(f, "filename {value}"),
        }
    }
}
