//! FFmpeg-backed [`MediaCodecCatalog`].
//!
//! Output containers are guessed from the target file name and the encoder
//! comes from the container's codec guess for that name, so `.png`, `.jpg`
//! and `.bmp` each get their native still-image codec. Inputs are opened
//! with FFmpeg's demuxer probing and decoded with the best video stream's
//! codec.

use std::ffi::CString;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::ptr;

use ffmpeg_next::codec::Id;
use ffmpeg_next::codec::context::Context as CodecContext;
use ffmpeg_next::codec::encoder::video::Encoder as OpenedVideoEncoder;
use ffmpeg_next::decoder::Video as VideoDecoder;
use ffmpeg_next::format::context::{Input, Output};
use ffmpeg_next::format::{Flags as FormatFlags, Output as OutputFormat, Pixel};
use ffmpeg_next::frame::Video as VideoFrame;
use ffmpeg_next::media::Type;
use ffmpeg_next::util::error::EAGAIN;
use ffmpeg_next::{Codec, Error as FfmpegError, Packet, Rational};

use crate::catalog::{DecoderLease, EncoderLease, MediaCodecCatalog};
use crate::error::StillFrameError;

/// Encoder time base; a still image has no timeline of its own.
fn still_time_base() -> Rational {
    Rational::new(1, 1)
}

/// Catalog that resolves containers and codecs through FFmpeg.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegCatalog;

impl FfmpegCatalog {
    /// Create a catalog.
    pub fn new() -> Self {
        Self
    }

    /// The pixel format a snapshot written to `target` must arrive in.
    ///
    /// Hosts use this to convert frames upstream of a
    /// [`SnapshotEncoder`](crate::SnapshotEncoder), which never converts.
    ///
    /// # Errors
    ///
    /// An [`ErrorKind::Open`](crate::ErrorKind::Open) error when no encoder
    /// matches `target`, or [`StillFrameError::EncodeError`] when the encoder
    /// advertises no pixel formats.
    pub fn encoder_pixel_format<P: AsRef<Path>>(
        &self,
        target: P,
    ) -> Result<Pixel, StillFrameError> {
        let target = target.as_ref();
        initialise(target)?;
        let codec = find_image_encoder(&guess_container(target)?, target)?;
        preferred_pixel_format(codec)
    }
}

impl MediaCodecCatalog for FfmpegCatalog {
    type Encoder = FfmpegEncoderLease;
    type Decoder = FfmpegDecoderLease;

    fn open_encoder(
        &self,
        target: &Path,
        frame: &VideoFrame,
    ) -> Result<FfmpegEncoderLease, StillFrameError> {
        initialise(target)?;

        // Resolve the codec before the output file is created.
        let container = guess_container(target)?;
        let codec = find_image_encoder(&container, target)?;
        let pixel_format = preferred_pixel_format(codec)?;

        let mut output =
            ffmpeg_next::format::output(&target).map_err(|error| open_error(target, error))?;
        let (encoder, stream_index) =
            match add_encoded_stream(&mut output, codec, pixel_format, frame) {
                Ok(opened) => opened,
                Err(error) => {
                    drop(output);
                    remove_incomplete(target);
                    return Err(error);
                }
            };

        if let Err(error) = output.write_header() {
            drop(output);
            remove_incomplete(target);
            return Err(StillFrameError::WriteError(format!(
                "cannot write header: {error}"
            )));
        }
        Ok(FfmpegEncoderLease {
            path: target.to_path_buf(),
            output: Some(output),
            encoder,
            stream_index,
            pixel_format,
            width: frame.width(),
            height: frame.height(),
            finished: false,
        })
    }

    fn open_decoder(&self, source: &Path) -> Result<FfmpegDecoderLease, StillFrameError> {
        initialise(source)?;

        let input =
            ffmpeg_next::format::input(&source).map_err(|error| open_error(source, error))?;
        let stream = input
            .streams()
            .best(Type::Video)
            .ok_or_else(|| StillFrameError::NoVideoStream {
                path: source.to_path_buf(),
            })?;
        let video_stream_index = stream.index();

        let decoder = CodecContext::from_parameters(stream.parameters())
            .and_then(|context| context.decoder().video())
            .map_err(|error| StillFrameError::FileOpen {
                path: source.to_path_buf(),
                reason: format!("cannot open video decoder: {error}"),
            })?;
        Ok(FfmpegDecoderLease {
            path: source.to_path_buf(),
            input,
            decoder,
            video_stream_index,
        })
    }
}

/// An FFmpeg output context and the opened encoder feeding it.
pub struct FfmpegEncoderLease {
    path: PathBuf,
    /// Taken on drop so the file is closed before an incomplete one is removed.
    output: Option<Output>,
    encoder: OpenedVideoEncoder,
    stream_index: usize,
    pixel_format: Pixel,
    width: u32,
    height: u32,
    /// Set once the trailer is written; unfinished files are removed on drop.
    finished: bool,
}

impl FfmpegEncoderLease {
    fn output(&mut self) -> Result<&mut Output, StillFrameError> {
        self.output
            .as_mut()
            .ok_or_else(|| StillFrameError::WriteError("output already closed".to_string()))
    }
}

impl Debug for FfmpegEncoderLease {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("FfmpegEncoderLease")
            .field("path", &self.path)
            .field("stream_index", &self.stream_index)
            .field("pixel_format", &self.pixel_format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl EncoderLease for FfmpegEncoderLease {
    /// libavcodec reads the frame's planes with the context's layout, so a
    /// frame in any other format or size is rejected here.
    fn send_frame(&mut self, frame: &VideoFrame) -> Result<(), StillFrameError> {
        if frame.format() != self.pixel_format {
            return Err(StillFrameError::EncodeError(format!(
                "frame format {:?} does not match encoder format {:?}",
                frame.format(),
                self.pixel_format,
            )));
        }
        if (frame.width(), frame.height()) != (self.width, self.height) {
            return Err(StillFrameError::EncodeError(format!(
                "frame size {}x{} does not match encoder size {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height,
            )));
        }
        self.encoder.send_frame(frame).map_err(|error| {
            StillFrameError::EncodeError(format!("send_frame failed: {error}"))
        })
    }

    fn send_eof(&mut self) -> Result<(), StillFrameError> {
        self.encoder.send_eof().map_err(|error| {
            StillFrameError::EncodeError(format!("send_eof failed: {error}"))
        })
    }

    fn receive_packet(&mut self) -> Result<Option<Packet>, StillFrameError> {
        let mut packet = Packet::empty();
        match self.encoder.receive_packet(&mut packet) {
            Ok(()) => Ok(Some(packet)),
            Err(FfmpegError::Eof) => Ok(None),
            Err(FfmpegError::Other { errno }) if errno == EAGAIN => Ok(None),
            Err(error) => Err(StillFrameError::EncodeError(format!(
                "receive_packet failed: {error}"
            ))),
        }
    }

    fn write_packet(&mut self, mut packet: Packet) -> Result<(), StillFrameError> {
        let stream_index = self.stream_index;
        let output = self.output()?;
        let stream_time_base = output
            .stream(stream_index)
            .map(|stream| stream.time_base())
            .unwrap_or(still_time_base());
        packet.set_stream(stream_index);
        packet.rescale_ts(still_time_base(), stream_time_base);
        packet.write_interleaved(output).map_err(|error| {
            StillFrameError::WriteError(format!("write packet failed: {error}"))
        })
    }

    fn write_trailer(&mut self) -> Result<(), StillFrameError> {
        self.output()?.write_trailer().map_err(|error| {
            StillFrameError::WriteError(format!("cannot write trailer: {error}"))
        })?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for FfmpegEncoderLease {
    fn drop(&mut self) {
        log::debug!("Releasing snapshot encoder for {}", self.path.display());
        drop(self.output.take());
        if !self.finished {
            remove_incomplete(&self.path);
        }
    }
}

/// An FFmpeg input context and the opened decoder for its video stream.
pub struct FfmpegDecoderLease {
    path: PathBuf,
    input: Input,
    decoder: VideoDecoder,
    video_stream_index: usize,
}

impl Debug for FfmpegDecoderLease {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("FfmpegDecoderLease")
            .field("path", &self.path)
            .field("video_stream_index", &self.video_stream_index)
            .finish_non_exhaustive()
    }
}

impl DecoderLease for FfmpegDecoderLease {
    fn video_stream_index(&self) -> usize {
        self.video_stream_index
    }

    fn read_packet(&mut self) -> Result<Option<Packet>, StillFrameError> {
        let mut packet = Packet::empty();
        match packet.read(&mut self.input) {
            Ok(()) => Ok(Some(packet)),
            Err(FfmpegError::Eof) => Ok(None),
            Err(error) => Err(StillFrameError::FileOpen {
                path: self.path.clone(),
                reason: format!("cannot read packet: {error}"),
            }),
        }
    }

    fn send_packet(&mut self, packet: &Packet) -> Result<(), StillFrameError> {
        self.decoder.send_packet(packet).map_err(StillFrameError::from)
    }

    fn send_eof(&mut self) -> Result<(), StillFrameError> {
        self.decoder.send_eof().map_err(StillFrameError::from)
    }

    fn receive_frame(&mut self) -> Result<Option<VideoFrame>, StillFrameError> {
        let mut frame = VideoFrame::empty();
        match self.decoder.receive_frame(&mut frame) {
            Ok(()) => Ok(Some(frame)),
            Err(FfmpegError::Eof) => Ok(None),
            Err(FfmpegError::Other { errno }) if errno == EAGAIN => Ok(None),
            Err(error) => Err(StillFrameError::from(error)),
        }
    }
}

impl Drop for FfmpegDecoderLease {
    fn drop(&mut self) {
        log::debug!("Releasing watermark decoder for {}", self.path.display());
    }
}

fn initialise(path: &Path) -> Result<(), StillFrameError> {
    ffmpeg_next::init().map_err(|error| StillFrameError::FileOpen {
        path: path.to_path_buf(),
        reason: format!("FFmpeg initialisation failed: {error}"),
    })
}

fn open_error(path: &Path, error: FfmpegError) -> StillFrameError {
    StillFrameError::FileOpen {
        path: path.to_path_buf(),
        reason: error.to_string(),
    }
}

/// Guess the output container from the file name without touching the filesystem.
fn guess_container(target: &Path) -> Result<OutputFormat, StillFrameError> {
    let file_name = CString::new(target.to_string_lossy().as_bytes()).map_err(|_| {
        StillFrameError::ConfigError(format!("invalid snapshot path: {}", target.display()))
    })?;
    let format =
        unsafe { ffmpeg_sys_next::av_guess_format(ptr::null(), file_name.as_ptr(), ptr::null()) };
    if format.is_null() {
        return Err(StillFrameError::FileOpen {
            path: target.to_path_buf(),
            reason: "no container matches the file extension".to_string(),
        });
    }
    Ok(unsafe { OutputFormat::wrap(format as _) })
}

fn find_image_encoder(container: &OutputFormat, target: &Path) -> Result<Codec, StillFrameError> {
    let codec_id = container.codec(&target, Type::Video);
    if codec_id == Id::None {
        return Err(StillFrameError::FileOpen {
            path: target.to_path_buf(),
            reason: format!("container {} has no video codec", container.name()),
        });
    }
    ffmpeg_next::encoder::find(codec_id).ok_or_else(|| StillFrameError::FileOpen {
        path: target.to_path_buf(),
        reason: format!("encoder {codec_id:?} isn't available"),
    })
}

fn preferred_pixel_format(codec: Codec) -> Result<Pixel, StillFrameError> {
    codec
        .video()
        .ok()
        .and_then(|video| video.formats())
        .and_then(|mut formats| formats.next())
        .ok_or_else(|| {
            StillFrameError::EncodeError(format!(
                "encoder {} advertises no pixel formats",
                codec.name()
            ))
        })
}

/// Add a video stream to `output` and open an encoder for it sized to `frame`.
fn add_encoded_stream(
    output: &mut Output,
    codec: Codec,
    pixel_format: Pixel,
    frame: &VideoFrame,
) -> Result<(OpenedVideoEncoder, usize), StillFrameError> {
    let needs_global_header = output.format().flags().contains(FormatFlags::GLOBAL_HEADER);

    let mut stream = output
        .add_stream(codec)
        .map_err(|error| StillFrameError::WriteError(format!("cannot add stream: {error}")))?;
    let stream_index = stream.index();

    let mut encoder = CodecContext::from_parameters(stream.parameters())
        .and_then(|context| context.encoder().video())
        .map_err(|error| {
            StillFrameError::EncodeError(format!("cannot allocate encoder: {error}"))
        })?;
    encoder.set_width(frame.width());
    encoder.set_height(frame.height());
    encoder.set_format(pixel_format);
    encoder.set_time_base(still_time_base());

    if needs_global_header {
        unsafe {
            (*encoder.as_mut_ptr()).flags |= ffmpeg_sys_next::AV_CODEC_FLAG_GLOBAL_HEADER as i32;
        }
    }

    let encoder = encoder
        .open_as(codec)
        .map_err(|error| StillFrameError::EncodeError(format!("cannot open encoder: {error}")))?;
    stream.set_parameters(&encoder);
    stream.set_time_base(still_time_base());

    Ok((encoder, stream_index))
}

fn remove_incomplete(path: &Path) {
    if let Err(error) = std::fs::remove_file(path) {
        log::warn!("Could not remove incomplete snapshot {}: {error}", path.display());
    }
}
