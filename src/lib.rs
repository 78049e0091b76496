//! # stillframe
//!
//! Two runtime-reconfigurable video pipeline nodes built on FFmpeg via
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next):
//!
//! - [`SnapshotEncoder`] passes frames through unchanged and, when armed,
//!   encodes the next frame it sees into a still image on disk.
//! - [`CachedFrameSource`] decodes one frame from a media file and serves it
//!   repeatedly at a synthetic frame rate, with hot-swappable backing files.
//!
//! Both nodes reach the media framework only through the
//! [`MediaCodecCatalog`] trait; [`FfmpegCatalog`] is the production
//! implementation.
//!
//! ## Quick Start
//!
//! ### Capture a snapshot
//!
//! ```no_run
//! use stillframe::{Command, FfmpegCatalog, SnapshotEncoder, SnapshotOptions};
//!
//! let options = SnapshotOptions::default().directory("captures");
//! let mut snapshot = SnapshotEncoder::new(FfmpegCatalog::new(), options);
//!
//! // Delivered by the host's command channel.
//! snapshot.process_command(Command::parse("filename", "frame.png").unwrap());
//!
//! # let incoming: Vec<ffmpeg_next::frame::Video> = Vec::new();
//! for frame in incoming {
//!     let frame = snapshot.on_frame(frame);
//!     // ...forward `frame` downstream
//! #   drop(frame);
//! }
//! ```
//!
//! ### Serve a watermark
//!
//! ```no_run
//! use stillframe::{CachedFrameSource, FfmpegCatalog, WatermarkOptions, parse_frame_rate};
//!
//! let options = WatermarkOptions::new("logo.png").rate(parse_frame_rate("10").unwrap());
//! let mut source = CachedFrameSource::open(FfmpegCatalog::new(), options).unwrap();
//!
//! let parameters = source.negotiate_output().unwrap();
//! while let Some(frame) = source.produce_next() {
//!     // ...push `frame` downstream
//! #   break;
//! }
//! source.swap_file("other_logo.png").unwrap();
//! ```
//!
//! ## Threading
//!
//! Neither node is safe under parallel entry. Hosts that deliver commands on
//! a different thread than frames must serialise both through one lock (or
//! a single actor) per node instance.
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system.

pub mod backend;
pub mod catalog;
pub mod command;
pub mod config;
pub mod decode;
pub mod error;
pub mod ffmpeg;
pub mod snapshot;
pub mod watermark;

pub use backend::{FfmpegCatalog, FfmpegDecoderLease, FfmpegEncoderLease};
pub use catalog::{DecoderLease, EncoderLease, MediaCodecCatalog};
pub use command::Command;
pub use config::{SnapshotOptions, WatermarkOptions, parse_frame_rate};
pub use decode::DecodedFrames;
pub use error::{ErrorKind, StillFrameError};
pub use ffmpeg::{FfmpegLogLevel, get_ffmpeg_log_level, set_ffmpeg_log_level};
pub use snapshot::{SnapshotEncoder, SnapshotOutcome, SnapshotPhase};
pub use watermark::{CachedFrameSource, OutputParameters};
