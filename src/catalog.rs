//! Media framework boundary.
//!
//! The nodes never touch containers or codecs directly. They ask a
//! [`MediaCodecCatalog`] for a *lease*: one owned value holding a container
//! together with its codec. Dropping a lease releases both handles, so every
//! exit path of a snapshot job or source open gives its resources back
//! without explicit cleanup code.
//!
//! [`FfmpegCatalog`](crate::FfmpegCatalog) is the production implementation.
//! Tests substitute in-memory catalogs.

use std::path::Path;

use ffmpeg_next::{Packet, frame::Video as VideoFrame};

use crate::error::StillFrameError;

/// Resolves encoders and decoders for media paths.
pub trait MediaCodecCatalog {
    /// Output container paired with an opened encoder.
    type Encoder: EncoderLease;
    /// Input container paired with an opened decoder.
    type Decoder: DecoderLease;

    /// Open an output container for `target` (chosen by its extension) and an
    /// encoder sized for `frame`, using the encoder's preferred pixel format.
    ///
    /// # Errors
    ///
    /// An [`ErrorKind::Open`](crate::ErrorKind::Open) error when no container
    /// or encoder matches, or an encode/write error when the encoder or the
    /// container header cannot be initialised.
    fn open_encoder(&self, target: &Path, frame: &VideoFrame)
    -> Result<Self::Encoder, StillFrameError>;

    /// Open `source`, select its best video stream, and open a decoder for it.
    ///
    /// # Errors
    ///
    /// An [`ErrorKind::Open`](crate::ErrorKind::Open) error when the file
    /// cannot be opened or has no decodable video stream.
    fn open_decoder(&self, source: &Path) -> Result<Self::Decoder, StillFrameError>;
}

/// An output container and its encoder, owned together.
pub trait EncoderLease {
    /// Submit one frame to the encoder.
    ///
    /// # Errors
    ///
    /// [`StillFrameError::EncodeError`] when the frame's pixel format or size
    /// differs from the one the encoder was opened with, or the codec rejects it.
    fn send_frame(&mut self, frame: &VideoFrame) -> Result<(), StillFrameError>;

    /// Signal end of input so the encoder flushes buffered output.
    fn send_eof(&mut self) -> Result<(), StillFrameError>;

    /// Take the next encoded packet, or `None` if the encoder has none ready.
    fn receive_packet(&mut self) -> Result<Option<Packet>, StillFrameError>;

    /// Mux one packet into the container.
    fn write_packet(&mut self, packet: Packet) -> Result<(), StillFrameError>;

    /// Finalise the container.
    fn write_trailer(&mut self) -> Result<(), StillFrameError>;
}

/// An input container and the decoder for its selected video stream.
pub trait DecoderLease {
    /// Index of the selected video stream.
    fn video_stream_index(&self) -> usize;

    /// Demux the next packet from any stream, or `None` once the input is
    /// exhausted.
    fn read_packet(&mut self) -> Result<Option<Packet>, StillFrameError>;

    /// Feed one video packet to the decoder.
    fn send_packet(&mut self, packet: &Packet) -> Result<(), StillFrameError>;

    /// Signal end of input so the decoder releases buffered frames.
    fn send_eof(&mut self) -> Result<(), StillFrameError>;

    /// Take the next decoded frame, or `None` if the decoder needs more input.
    fn receive_frame(&mut self) -> Result<Option<VideoFrame>, StillFrameError>;
}
