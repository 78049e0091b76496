//! Lazy, bounded pull of decoded video frames from a [`DecoderLease`].
//!
//! [`DecodedFrames`] feeds packets of the selected video stream into the
//! decoder only when the caller asks for the next frame. Packets from other
//! streams are discarded, undecodable packets are skipped with a warning,
//! and at end of input the decoder is drained once. The sequence therefore
//! always terminates.

use ffmpeg_next::frame::Video as VideoFrame;

use crate::catalog::DecoderLease;
use crate::error::StillFrameError;

/// Iterator over the frames a decoder lease produces.
///
/// Yields `Err` at most once (on a demux failure), after which it is fused.
pub struct DecodedFrames<'a, D: DecoderLease> {
    lease: &'a mut D,
    video_stream_index: usize,
    eof_sent: bool,
    done: bool,
}

impl<'a, D: DecoderLease> DecodedFrames<'a, D> {
    /// Start pulling frames from `lease`.
    pub fn new(lease: &'a mut D) -> Self {
        let video_stream_index = lease.video_stream_index();
        Self {
            lease,
            video_stream_index,
            eof_sent: false,
            done: false,
        }
    }

    fn fail(&mut self, error: StillFrameError) -> Option<Result<VideoFrame, StillFrameError>> {
        self.done = true;
        Some(Err(error))
    }
}

impl<D: DecoderLease> Iterator for DecodedFrames<'_, D> {
    type Item = Result<VideoFrame, StillFrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            match self.lease.receive_frame() {
                Ok(Some(frame)) => return Some(Ok(frame)),
                Ok(None) => {}
                Err(error) => {
                    log::warn!("Decoder returned an error, skipping: {error}");
                }
            }

            if self.eof_sent {
                self.done = true;
                return None;
            }

            match self.lease.read_packet() {
                Ok(Some(packet)) => {
                    if packet.stream() != self.video_stream_index {
                        continue;
                    }
                    if let Err(error) = self.lease.send_packet(&packet) {
                        log::warn!("Error decoding video packet, skipping: {error}");
                    }
                }
                Ok(None) => {
                    if let Err(error) = self.lease.send_eof() {
                        log::warn!("Failed to drain decoder: {error}");
                        self.done = true;
                        return None;
                    }
                    self.eof_sent = true;
                }
                Err(error) => return self.fail(error),
            }
        }
    }
}
