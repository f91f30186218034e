use std::path::Path;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::frame_source::{FrameSource, SourceError};

/// Decodes video frames via ffmpeg-next (libavformat + libavcodec).
///
/// Converts each decoded frame to RGB24 and wraps it in a [`Frame`].
/// Seeking backwards rewinds the container and decodes forward again, so
/// callers re-sampling several frames should seek in ascending order.
pub struct FfmpegFrameSource {
    state: Option<DecodeState>,
}

// Safety: FfmpegFrameSource is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegFrameSource {}

struct DecodeState {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    width: u32,
    height: u32,
    video_stream_index: usize,
    next_index: usize,
    /// Packets the decoder rejected since the last rewind.
    failed_packets: usize,
    flushing: bool,
    done: bool,
}

impl FfmpegFrameSource {
    pub fn new() -> Self {
        Self { state: None }
    }
}

impl Default for FfmpegFrameSource {
    fn default() -> Self {
        Self::new()
    }
}

fn open_err(path: &Path) -> impl Fn(ffmpeg_next::Error) -> SourceError + '_ {
    move |e| SourceError::Open {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

impl FrameSource for FfmpegFrameSource {
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, SourceError> {
        ffmpeg_next::init().map_err(open_err(path))?;

        let ictx = ffmpeg_next::format::input(path).map_err(open_err(path))?;

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| SourceError::NoVideoStream(path.to_path_buf()))?;

        let video_stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(open_err(path))?;
        let decoder = codec_ctx.decoder().video().map_err(open_err(path))?;

        let rate = stream.rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };
        let total_frames = stream.frames().max(0) as usize;

        let width = decoder.width();
        let height = decoder.height();
        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .map_err(open_err(path))?;

        let metadata = VideoMetadata {
            width,
            height,
            fps,
            total_frames,
            codec: decoder
                .codec()
                .map(|c| c.name().to_string())
                .unwrap_or_default(),
            source_path: Some(path.to_path_buf()),
        };

        self.state = Some(DecodeState {
            ictx,
            decoder,
            scaler,
            width,
            height,
            video_stream_index,
            next_index: 0,
            failed_packets: 0,
            flushing: false,
            done: false,
        });

        Ok(metadata)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let state = self.state.as_mut().ok_or(SourceError::NotOpened)?;
        state.decode_next()
    }

    fn seek(&mut self, index: usize) -> Result<Frame, SourceError> {
        let state = self.state.as_mut().ok_or(SourceError::NotOpened)?;
        if index < state.next_index {
            state.rewind().map_err(|e| SourceError::Seek {
                index,
                message: e.to_string(),
            })?;
        }
        loop {
            match state.decode_next() {
                Ok(Some(frame)) if frame.index() == index => return Ok(frame),
                Ok(Some(_)) => continue,
                Ok(None) => {
                    return Err(SourceError::Seek {
                        index,
                        message: format!("stream ends after {} frames", state.next_index),
                    })
                }
                Err(e) => {
                    return Err(SourceError::Seek {
                        index,
                        message: e.to_string(),
                    })
                }
            }
        }
    }

    fn close(&mut self) {
        self.state = None;
    }
}

impl DecodeState {
    fn rewind(&mut self) -> Result<(), ffmpeg_next::Error> {
        self.ictx.seek(0, ..)?;
        self.decoder.flush();
        self.next_index = 0;
        self.failed_packets = 0;
        self.flushing = false;
        self.done = false;
        Ok(())
    }

    fn try_receive(&mut self) -> Result<Option<Frame>, SourceError> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        match self.decoder.receive_frame(&mut decoded) {
            Ok(()) => {}
            Err(ffmpeg_next::Error::Eof) => return Ok(None),
            Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::error::EAGAIN => {
                return Ok(None)
            }
            Err(e) => return Err(SourceError::Decode(e.to_string())),
        }
        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
        self.scaler
            .run(&decoded, &mut rgb_frame)
            .map_err(|e| SourceError::Decode(e.to_string()))?;

        let pixels = extract_rgb_pixels(&rgb_frame, self.width, self.height);
        let frame = Frame::new(pixels, self.width, self.height, self.next_index);
        self.next_index += 1;
        Ok(Some(frame))
    }

    /// Decodes one frame at a time, avoiding the need to buffer the whole
    /// video in memory. Corrupt packets are skipped as long as the stream
    /// yields at least one frame.
    fn decode_next(&mut self) -> Result<Option<Frame>, SourceError> {
        if self.done {
            return Ok(None);
        }

        if let Some(frame) = self.try_receive()? {
            return Ok(Some(frame));
        }

        if self.flushing {
            return self.end_of_stream();
        }

        loop {
            let Some((stream, packet)) = self.ictx.packets().next() else {
                let _ = self.decoder.send_eof();
                self.flushing = true;
                if let Some(frame) = self.try_receive()? {
                    return Ok(Some(frame));
                }
                return self.end_of_stream();
            };

            if stream.index() != self.video_stream_index {
                continue;
            }

            if let Err(e) = self.decoder.send_packet(&packet) {
                self.failed_packets += 1;
                log::debug!(
                    "Skipping undecodable packet before frame {}: {e}",
                    self.next_index
                );
                continue;
            }

            if let Some(frame) = self.try_receive()? {
                return Ok(Some(frame));
            }
        }
    }

    /// A stream that ends without a single decoded frame is corrupt.
    fn end_of_stream(&mut self) -> Result<Option<Frame>, SourceError> {
        self.done = true;
        if self.next_index == 0 {
            return Err(SourceError::Decode(format!(
                "no decodable video frames ({} packet(s) rejected)",
                self.failed_packets
            )));
        }
        if self.failed_packets > 0 {
            log::warn!(
                "Skipped {} undecodable packet(s) in {} frames",
                self.failed_packets,
                self.next_index
            );
        }
        Ok(None)
    }
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer.
///
/// ffmpeg frames may have padding bytes at the end of each row (stride > width*3).
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}
