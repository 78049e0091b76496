//! On-demand single-frame encoder.
//!
//! [`SnapshotEncoder`] sits on a video link and passes every frame through
//! untouched. After [`arm`](SnapshotEncoder::arm), the next frame it sees is
//! also encoded into a still image at `directory/filename`. The encoder and
//! container are acquired lazily for that one frame and released as soon as
//! the image is written or any step fails.
//!
//! Snapshot failures never reach the pipeline: they are logged, recorded in
//! [`last_outcome`](SnapshotEncoder::last_outcome), and the node disarms.
//!
//! # Example
//!
//! ```no_run
//! use stillframe::{FfmpegCatalog, SnapshotEncoder, SnapshotOptions};
//!
//! let mut snapshot = SnapshotEncoder::new(FfmpegCatalog::new(), SnapshotOptions::default());
//! snapshot.arm(Some("first.png"));
//! # let frame = ffmpeg_next::frame::Video::empty();
//! let frame = snapshot.on_frame(frame);
//! ```

use std::fs::DirBuilder;
use std::path::{Path, PathBuf};

use ffmpeg_next::frame::Video as VideoFrame;

use crate::catalog::{EncoderLease, MediaCodecCatalog};
use crate::command::Command;
use crate::config::SnapshotOptions;
use crate::error::StillFrameError;

/// Position of a [`SnapshotEncoder`] in its capture cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotPhase {
    /// Not armed; frames pass straight through.
    Idle,
    /// Armed; the next frame starts a job.
    Armed,
    /// Creating the directory and acquiring container and encoder.
    Opening,
    /// Submitting the triggering frame.
    Encoding,
    /// Draining the encoder and writing the container.
    Flushing,
}

impl SnapshotPhase {
    /// Whether a job currently holds (or is acquiring) an encoder lease.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            SnapshotPhase::Opening | SnapshotPhase::Encoding | SnapshotPhase::Flushing
        )
    }
}

/// Result of the most recent snapshot job.
pub type SnapshotOutcome = Result<PathBuf, StillFrameError>;

/// Pass-through video node that captures one frame per arm request.
pub struct SnapshotEncoder<C: MediaCodecCatalog> {
    catalog: C,
    options: SnapshotOptions,
    phase: SnapshotPhase,
    last_outcome: Option<SnapshotOutcome>,
}

impl<C: MediaCodecCatalog> SnapshotEncoder<C> {
    /// Create a disarmed snapshot node.
    pub fn new(catalog: C, options: SnapshotOptions) -> Self {
        Self {
            catalog,
            options,
            phase: SnapshotPhase::Idle,
            last_outcome: None,
        }
    }

    /// Arm a one-shot capture, optionally replacing the file name.
    ///
    /// The directory is left unchanged. Repeated arms before the next frame
    /// collapse into one capture under the latest name.
    ///
    /// The job runs to completion inside [`on_frame`](Self::on_frame), which
    /// holds `&mut self`, so a caller can never arm mid-job and the in-flight
    /// guard is not reachable through this API.
    pub fn arm(&mut self, filename: Option<&str>) {
        if self.phase.is_in_flight() {
            log::warn!("Snapshot already in flight, ignoring arm request");
            return;
        }
        if let Some(filename) = filename {
            self.options.filename = filename.to_string();
        }
        log::debug!("Snapshot armed for {}", self.options.target_path().display());
        self.phase = SnapshotPhase::Armed;
    }

    /// Apply a host command.
    pub fn process_command(&mut self, command: Command) {
        match command {
            Command::Filename(filename) => self.arm(Some(&filename)),
        }
    }

    /// Observe one frame, capturing it if armed, and hand it back unchanged.
    pub fn on_frame(&mut self, frame: VideoFrame) -> VideoFrame {
        if self.phase != SnapshotPhase::Armed {
            return frame;
        }

        let outcome = self.run_job(&frame);
        match &outcome {
            Ok(path) => log::info!("Snapshot saved to {}", path.display()),
            Err(error) => log::error!("Snapshot failed: {error}"),
        }
        self.last_outcome = Some(outcome);
        self.phase = SnapshotPhase::Idle;
        frame
    }

    /// Current phase of the capture cycle.
    ///
    /// Callers only ever observe [`SnapshotPhase::Idle`] or
    /// [`SnapshotPhase::Armed`]; the in-flight phases are entered and left
    /// within a single [`on_frame`](Self::on_frame) call.
    pub fn phase(&self) -> SnapshotPhase {
        self.phase
    }

    /// Whether the next frame will be captured.
    pub fn is_armed(&self) -> bool {
        self.phase == SnapshotPhase::Armed
    }

    /// Result of the most recent job, if any has run.
    pub fn last_outcome(&self) -> Option<&SnapshotOutcome> {
        self.last_outcome.as_ref()
    }

    /// Current options, including the last file name set by [`arm`](Self::arm).
    pub fn options(&self) -> &SnapshotOptions {
        &self.options
    }

    /// Encode `frame` to the target path. The lease lives only inside this
    /// call, so it is released on every return path.
    fn run_job(&mut self, frame: &VideoFrame) -> SnapshotOutcome {
        self.phase = SnapshotPhase::Opening;
        if self.options.filename.trim().is_empty() {
            return Err(StillFrameError::ConfigError(
                "snapshot filename is empty".to_string(),
            ));
        }
        let target = self.options.target_path();
        ensure_directory(&self.options.directory)?;

        let mut lease = self.catalog.open_encoder(&target, frame)?;
        log::debug!(
            "Opened snapshot encoder for {} ({}x{})",
            target.display(),
            frame.width(),
            frame.height(),
        );

        self.phase = SnapshotPhase::Encoding;
        lease.send_frame(frame)?;

        self.phase = SnapshotPhase::Flushing;
        lease.send_eof()?;
        let packet = lease.receive_packet()?.ok_or_else(|| {
            StillFrameError::EncodeError("encoder produced no packet after flush".to_string())
        })?;
        lease.write_packet(packet)?;
        lease.write_trailer()?;

        Ok(target)
    }
}

/// Create `directory` (and parents) if missing. Existing directories are fine.
fn ensure_directory(directory: &Path) -> Result<(), StillFrameError> {
    if directory.as_os_str().is_empty() {
        return Ok(());
    }
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o777);
    }
    builder.create(directory).map_err(|error| {
        log::error!("Could not create directory {}: {error}", directory.display());
        StillFrameError::IoError(error)
    })
}
