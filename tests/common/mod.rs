//! In-memory media catalog shared by the integration tests.
//!
//! Leases report acquisition and release to a shared ledger so tests can
//! check that no path leaks a container or codec. Failures can be injected
//! at every encoder step; decoder inputs are scripted per path.

#![allow(dead_code)]

use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    path::{Path, PathBuf},
    rc::Rc,
};

use ffmpeg_next::{Packet, format::Pixel, frame::Video as VideoFrame};
use stillframe::{DecoderLease, EncoderLease, MediaCodecCatalog, StillFrameError};

/// Encoder step at which the mock fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Open,
    SendFrame,
    SendEof,
    NoPacket,
    WritePacket,
    WriteTrailer,
}

/// One scripted input packet.
#[derive(Debug, Clone, Copy)]
pub struct ScriptedPacket {
    pub stream: usize,
    /// Undecodable packets make `send_packet` fail.
    pub decodable: bool,
}

/// Scripted content of a mock input file.
#[derive(Debug, Clone)]
pub struct ScriptedMedia {
    pub video_stream: Option<usize>,
    pub packets: Vec<ScriptedPacket>,
    pub width: u32,
    pub height: u32,
    /// Byte every pixel of decoded frames is filled with.
    pub fill: u8,
    /// Frames are held back until end of input, like a delaying decoder.
    pub buffered: bool,
    /// Demuxing fails after this many packets.
    pub read_error_after: Option<usize>,
}

impl ScriptedMedia {
    pub fn image(width: u32, height: u32, fill: u8) -> Self {
        Self {
            video_stream: Some(0),
            packets: vec![ScriptedPacket {
                stream: 0,
                decodable: true,
            }],
            width,
            height,
            fill,
            buffered: false,
            read_error_after: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct Ledger {
    pub encoders_opened: usize,
    pub encoders_released: usize,
    pub decoders_opened: usize,
    pub decoders_released: usize,
    pub frames_encoded: Vec<(u32, u32)>,
    pub fail_at: Option<FailAt>,
    pub media: HashMap<PathBuf, ScriptedMedia>,
}

#[derive(Debug, Clone, Default)]
pub struct MockCatalog {
    pub ledger: Rc<RefCell<Ledger>>,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_at(&self, step: Option<FailAt>) {
        self.ledger.borrow_mut().fail_at = step;
    }

    pub fn add_media<P: Into<PathBuf>>(&self, path: P, media: ScriptedMedia) {
        self.ledger.borrow_mut().media.insert(path.into(), media);
    }

    pub fn encoders_outstanding(&self) -> usize {
        let ledger = self.ledger.borrow();
        ledger.encoders_opened - ledger.encoders_released
    }

    pub fn decoders_outstanding(&self) -> usize {
        let ledger = self.ledger.borrow();
        ledger.decoders_opened - ledger.decoders_released
    }
}

/// Pixel format every mock encoder is opened with.
pub const ENCODER_FORMAT: Pixel = Pixel::RGB24;

pub fn filled_frame(width: u32, height: u32, fill: u8) -> VideoFrame {
    let mut frame = VideoFrame::new(Pixel::RGB24, width, height);
    frame.data_mut(0).fill(fill);
    frame
}

/// Whether every visible RGB24 byte of `frame` equals `fill`. Row padding is
/// ignored since copies do not carry it over.
pub fn is_filled(frame: &VideoFrame, fill: u8) -> bool {
    let stride = frame.stride(0);
    let visible = frame.width() as usize * 3;
    frame
        .data(0)
        .chunks(stride)
        .take(frame.height() as usize)
        .all(|row| row[..visible].iter().all(|&byte| byte == fill))
}

pub struct MockEncoderLease {
    ledger: Rc<RefCell<Ledger>>,
    path: PathBuf,
    opened_for: (Pixel, u32, u32),
    pending: Option<(u32, u32)>,
    flushed: bool,
    packets: Vec<Vec<u8>>,
}

impl MockEncoderLease {
    fn fails_at(&self, step: FailAt) -> bool {
        self.ledger.borrow().fail_at == Some(step)
    }
}

impl EncoderLease for MockEncoderLease {
    fn send_frame(&mut self, frame: &VideoFrame) -> Result<(), StillFrameError> {
        if self.fails_at(FailAt::SendFrame) {
            return Err(StillFrameError::EncodeError("mock send_frame".to_string()));
        }
        if (frame.format(), frame.width(), frame.height()) != self.opened_for {
            return Err(StillFrameError::EncodeError("frame mismatch".to_string()));
        }
        self.pending = Some((frame.width(), frame.height()));
        Ok(())
    }

    fn send_eof(&mut self) -> Result<(), StillFrameError> {
        if self.fails_at(FailAt::SendEof) {
            return Err(StillFrameError::EncodeError("mock send_eof".to_string()));
        }
        self.flushed = true;
        Ok(())
    }

    fn receive_packet(&mut self) -> Result<Option<Packet>, StillFrameError> {
        if self.fails_at(FailAt::NoPacket) || !self.flushed {
            return Ok(None);
        }
        Ok(self.pending.take().map(|(width, height)| {
            self.ledger.borrow_mut().frames_encoded.push((width, height));
            Packet::copy(format!("{width}x{height}").as_bytes())
        }))
    }

    fn write_packet(&mut self, packet: Packet) -> Result<(), StillFrameError> {
        if self.fails_at(FailAt::WritePacket) {
            return Err(StillFrameError::WriteError("mock write_packet".to_string()));
        }
        self.packets.push(packet.data().unwrap_or_default().to_vec());
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<(), StillFrameError> {
        if self.fails_at(FailAt::WriteTrailer) {
            return Err(StillFrameError::WriteError("mock write_trailer".to_string()));
        }
        std::fs::write(&self.path, self.packets.concat())?;
        Ok(())
    }
}

impl Drop for MockEncoderLease {
    fn drop(&mut self) {
        self.ledger.borrow_mut().encoders_released += 1;
    }
}

pub struct MockDecoderLease {
    ledger: Rc<RefCell<Ledger>>,
    media: ScriptedMedia,
    packets: VecDeque<ScriptedPacket>,
    read: usize,
    queued: VecDeque<VideoFrame>,
    held: VecDeque<VideoFrame>,
}

impl DecoderLease for MockDecoderLease {
    fn video_stream_index(&self) -> usize {
        self.media.video_stream.unwrap_or_default()
    }

    fn read_packet(&mut self) -> Result<Option<Packet>, StillFrameError> {
        if self.media.read_error_after == Some(self.read) {
            return Err(StillFrameError::FfmpegError("mock read failure".to_string()));
        }
        self.read += 1;
        Ok(self.packets.pop_front().map(|scripted| {
            let mut packet = Packet::copy(&[u8::from(scripted.decodable)]);
            packet.set_stream(scripted.stream);
            packet
        }))
    }

    fn send_packet(&mut self, packet: &Packet) -> Result<(), StillFrameError> {
        if packet.data() != Some(&[1u8][..]) {
            return Err(StillFrameError::FfmpegError("mock corrupt packet".to_string()));
        }
        let frame = filled_frame(self.media.width, self.media.height, self.media.fill);
        if self.media.buffered {
            self.held.push_back(frame);
        } else {
            self.queued.push_back(frame);
        }
        Ok(())
    }

    fn send_eof(&mut self) -> Result<(), StillFrameError> {
        self.queued.append(&mut self.held);
        Ok(())
    }

    fn receive_frame(&mut self) -> Result<Option<VideoFrame>, StillFrameError> {
        Ok(self.queued.pop_front())
    }
}

impl Drop for MockDecoderLease {
    fn drop(&mut self) {
        self.ledger.borrow_mut().decoders_released += 1;
    }
}

impl MediaCodecCatalog for MockCatalog {
    type Encoder = MockEncoderLease;
    type Decoder = MockDecoderLease;

    fn open_encoder(
        &self,
        target: &Path,
        frame: &VideoFrame,
    ) -> Result<MockEncoderLease, StillFrameError> {
        let supported = matches!(
            target.extension().and_then(|extension| extension.to_str()),
            Some("png" | "jpg" | "bmp")
        );
        if !supported || self.ledger.borrow().fail_at == Some(FailAt::Open) {
            return Err(StillFrameError::FileOpen {
                path: target.to_path_buf(),
                reason: "no encoder for extension".to_string(),
            });
        }
        self.ledger.borrow_mut().encoders_opened += 1;
        Ok(MockEncoderLease {
            ledger: Rc::clone(&self.ledger),
            path: target.to_path_buf(),
            opened_for: (ENCODER_FORMAT, frame.width(), frame.height()),
            pending: None,
            flushed: false,
            packets: Vec::new(),
        })
    }

    fn open_decoder(&self, source: &Path) -> Result<MockDecoderLease, StillFrameError> {
        let media = self
            .ledger
            .borrow()
            .media
            .get(source)
            .cloned()
            .ok_or_else(|| StillFrameError::FileOpen {
                path: source.to_path_buf(),
                reason: "no such file".to_string(),
            })?;
        if media.video_stream.is_none() {
            return Err(StillFrameError::NoVideoStream {
                path: source.to_path_buf(),
            });
        }
        self.ledger.borrow_mut().decoders_opened += 1;
        Ok(MockDecoderLease {
            ledger: Rc::clone(&self.ledger),
            packets: media.packets.iter().copied().collect(),
            media,
            read: 0,
            queued: VecDeque::new(),
            held: VecDeque::new(),
        })
    }
}
