//! Cached-decode synthetic video source.
//!
//! [`CachedFrameSource`] opens a media file once, decodes the first video
//! frame it contains, and then serves copies of that frame forever at an
//! operator-chosen rate. Timestamps count up from zero in units of the
//! output time base (the reciprocal of the rate), independent of the
//! file's own timing.
//!
//! Swapping the file is destructive-first: the old frame is dropped before
//! the new file is opened, so a failed swap leaves the source inert rather
//! than still showing the previous image.
//!
//! # Example
//!
//! ```no_run
//! use stillframe::{CachedFrameSource, FfmpegCatalog, StillFrameError, WatermarkOptions};
//!
//! let mut source = CachedFrameSource::new(FfmpegCatalog::new(), WatermarkOptions::new("logo.png"));
//! source.initialize("logo.png")?;
//! let parameters = source.negotiate_output()?;
//! println!("{}x{} @ {}", parameters.width, parameters.height, parameters.frame_rate);
//!
//! let first = source.produce_next().expect("source is ready");
//! assert_eq!(first.pts(), Some(0));
//! # Ok::<(), StillFrameError>(())
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};

use ffmpeg_next::{Rational, format::Pixel, frame::Video as VideoFrame};

use crate::catalog::{DecoderLease, MediaCodecCatalog};
use crate::command::Command;
use crate::config::WatermarkOptions;
use crate::decode::DecodedFrames;
use crate::error::StillFrameError;

/// Link parameters the source advertises to the host before frames flow.
#[derive(Debug, Clone, Copy)]
pub struct OutputParameters {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Sample (pixel) aspect ratio of the cached frame.
    pub sample_aspect_ratio: Rational,
    /// Synthetic output frame rate.
    pub frame_rate: Rational,
    /// Output time base, the reciprocal of `frame_rate`.
    pub time_base: Rational,
    /// Pixel format of the cached frame; the only format this source emits.
    pub pixel_format: Pixel,
}

/// An opened watermark file and the frame decoded from it.
///
/// The lease is held for the lifetime of the cached frame even though no
/// further decoding happens.
struct WatermarkSource<D> {
    file_path: PathBuf,
    #[allow(dead_code)]
    lease: D,
    cached_frame: VideoFrame,
}

/// Video source that repeats one decoded frame at a synthetic rate.
pub struct CachedFrameSource<C: MediaCodecCatalog> {
    catalog: C,
    options: WatermarkOptions,
    source: Option<WatermarkSource<C::Decoder>>,
    next_pts: i64,
}

impl<C: MediaCodecCatalog> Debug for CachedFrameSource<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("CachedFrameSource")
            .field("options", &self.options)
            .field("file_path", &self.file_path())
            .field("next_pts", &self.next_pts)
            .finish_non_exhaustive()
    }
}

impl<C: MediaCodecCatalog> CachedFrameSource<C> {
    /// Create an inert source. Call [`initialize`](Self::initialize) to load a file.
    pub fn new(catalog: C, options: WatermarkOptions) -> Self {
        Self {
            catalog,
            options,
            source: None,
            next_pts: 0,
        }
    }

    /// Create a source and load the file named in `options`.
    ///
    /// # Errors
    ///
    /// See [`initialize`](Self::initialize).
    pub fn open(catalog: C, options: WatermarkOptions) -> Result<Self, StillFrameError> {
        let mut source = Self::new(catalog, options);
        let file_path = source.options.require_filename()?.to_path_buf();
        source.initialize(file_path)?;
        Ok(source)
    }

    /// Open `file_path`, decode its first video frame, and cache it.
    ///
    /// Any previously cached frame is released first and the timestamp
    /// sequence restarts at zero.
    ///
    /// # Errors
    ///
    /// - [`StillFrameError::ConfigError`] if `file_path` is empty.
    /// - An [`ErrorKind::Open`](crate::ErrorKind::Open) error if the file
    ///   cannot be opened, has no video stream, or yields no video frame.
    pub fn initialize<P: AsRef<Path>>(&mut self, file_path: P) -> Result<(), StillFrameError> {
        self.release();

        let file_path = file_path.as_ref();
        self.options.filename = Some(file_path.to_path_buf());
        let file_path = self.options.require_filename()?.to_path_buf();

        let mut lease = self.catalog.open_decoder(&file_path)?;
        log::debug!(
            "Opened watermark {} (video stream {})",
            file_path.display(),
            lease.video_stream_index(),
        );

        let first = DecodedFrames::new(&mut lease).next();
        let cached_frame = match first {
            Some(Ok(frame)) => frame,
            Some(Err(error)) => {
                return Err(StillFrameError::FileOpen {
                    path: file_path,
                    reason: error.to_string(),
                });
            }
            None => return Err(StillFrameError::NoVideoFrame { path: file_path }),
        };

        log::info!(
            "Cached watermark frame {}x{} from {}",
            cached_frame.width(),
            cached_frame.height(),
            file_path.display(),
        );
        self.source = Some(WatermarkSource {
            file_path,
            lease,
            cached_frame,
        });
        Ok(())
    }

    /// Replace the watermark file at runtime.
    ///
    /// The current frame is dropped before the new file is opened. On error
    /// the source stays inert until a later swap succeeds.
    ///
    /// # Errors
    ///
    /// Same as [`initialize`](Self::initialize).
    pub fn swap_file<P: AsRef<Path>>(&mut self, new_path: P) -> Result<(), StillFrameError> {
        let new_path = new_path.as_ref();
        log::debug!("Swapping watermark to {}", new_path.display());
        self.initialize(new_path).inspect_err(|error| {
            log::error!("Watermark swap to {} failed: {error}", new_path.display());
        })
    }

    /// Apply a host command.
    ///
    /// # Errors
    ///
    /// Propagates [`swap_file`](Self::swap_file) failures.
    pub fn process_command(&mut self, command: Command) -> Result<(), StillFrameError> {
        match command {
            Command::Filename(path) => self.swap_file(path),
        }
    }

    /// Describe the output link.
    ///
    /// # Errors
    ///
    /// Returns [`StillFrameError::NotReady`] when no frame is cached.
    pub fn negotiate_output(&self) -> Result<OutputParameters, StillFrameError> {
        let source = self.source.as_ref().ok_or(StillFrameError::NotReady)?;
        let frame = &source.cached_frame;
        Ok(OutputParameters {
            width: frame.width(),
            height: frame.height(),
            sample_aspect_ratio: frame.aspect_ratio(),
            frame_rate: self.options.rate,
            time_base: self.options.time_base(),
            pixel_format: frame.format(),
        })
    }

    /// Produce the next frame, or `None` if the source is inert.
    pub fn produce_next(&mut self) -> Option<VideoFrame> {
        let source = self.source.as_ref()?;
        let mut frame = source.cached_frame.clone();
        frame.set_pts(Some(self.next_pts));
        self.next_pts += 1;
        Some(frame)
    }

    /// Whether a frame is cached and [`produce_next`](Self::produce_next) will yield.
    pub fn is_ready(&self) -> bool {
        self.source.is_some()
    }

    /// Path of the currently loaded file, if any.
    pub fn file_path(&self) -> Option<&Path> {
        self.source.as_ref().map(|source| source.file_path.as_path())
    }

    /// Timestamp the next produced frame will carry.
    pub fn next_pts(&self) -> i64 {
        self.next_pts
    }

    /// Current options.
    pub fn options(&self) -> &WatermarkOptions {
        &self.options
    }

    fn release(&mut self) {
        if let Some(previous) = self.source.take() {
            log::debug!("Releasing watermark {}", previous.file_path.display());
        }
        self.next_pts = 0;
    }
}
