//! video — FFmpeg bridge
//!
//! Pull-based decoding of any FFmpeg-readable file or URL into packed RGB24
//! frames, and an H.264 writer used to record the annotated view and the crop
//! window. The frame loop only sees the [`FrameSource`] and [`DisplaySink`]
//! traits, so tests drive it with synthetic frames.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, decoder, encoder, format, frame, media, software::scaling};
use image::GrayImage;
use rayon::prelude::*;
use tracing::{debug, info};

pub use ffmpeg_next::Rational;

/// Output pixel format for the encoder (YUV420p is universally compatible).
const ENCODE_FORMAT: format::Pixel = format::Pixel::YUV420P;
/// Bilinear scaling for the decode and encode paths.
const SCALE_FLAGS: scaling::Flags = scaling::Flags::BILINEAR;
/// Used when the container does not advertise a frame rate.
const FALLBACK_FRAME_RATE: (i32, i32) = (30, 1);

/// A single decoded video frame in RGB24 format, along with its presentation
/// timestamp (in the source stream's time-base units).
#[derive(Clone)]
pub struct RgbFrame {
    pub data: Vec<u8>, // packed RGB24, row-major
    pub width: u32,
    pub height: u32,
    pub pts: i64,
}

impl RgbFrame {
    /// Solid-colour frame, mostly useful for placeholders and tests.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take((width * height * 3) as usize)
            .collect();
        Self {
            data,
            width,
            height,
            pts: 0,
        }
    }
}

/// BT.601 luma plane, the input the tracker and reacquirer work on.
pub fn to_luma(frame: &RgbFrame) -> Result<GrayImage> {
    let luma: Vec<u8> = frame
        .data
        .par_chunks_exact(3)
        .map(|c| (0.299 * c[0] as f32 + 0.587 * c[1] as f32 + 0.114 * c[2] as f32) as u8)
        .collect();
    GrayImage::from_raw(frame.width, frame.height, luma).with_context(|| {
        format!(
            "frame buffer does not match {}x{} RGB24",
            frame.width, frame.height
        )
    })
}

// ── Traits seen by the frame loop ────────────────────────────────────────────

/// Delivers frames one at a time. `Ok(None)` is end of stream.
pub trait FrameSource {
    fn read(&mut self) -> Result<Option<RgbFrame>>;

    fn frame_rate(&self) -> Rational {
        Rational::new(FALLBACK_FRAME_RATE.0, FALLBACK_FRAME_RATE.1)
    }
}

/// Receives the annotated full frame and the crop window image every frame.
pub trait DisplaySink {
    fn show(&mut self, annotated: &RgbFrame, crop: &RgbFrame) -> Result<()>;

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Discards everything.
impl DisplaySink for () {
    fn show(&mut self, _annotated: &RgbFrame, _crop: &RgbFrame) -> Result<()> {
        Ok(())
    }
}

// ── Decoding ─────────────────────────────────────────────────────────────────

pub struct FfmpegSource {
    ictx: format::context::Input,
    video_stream_index: usize,
    decoder: decoder::Video,
    to_rgb: scaling::Context,
    decoded: frame::Video,
    rgb: frame::Video,
    width: u32,
    height: u32,
    frame_rate: Rational,
    frames_read: u64,
    eof_sent: bool,
}

impl FfmpegSource {
    pub fn open<P: AsRef<Path>>(input_path: P) -> Result<Self> {
        ffmpeg::init().context("failed to initialise FFmpeg")?;

        let path = input_path.as_ref();
        let ictx = format::input(&path)
            .with_context(|| format!("could not open video source: {}", path.display()))?;

        let stream = ictx
            .streams()
            .best(media::Type::Video)
            .context("no video stream found in input")?;
        let video_stream_index = stream.index();
        let frame_rate = usable_rate(stream.avg_frame_rate())
            .or_else(|| usable_rate(stream.rate()))
            .unwrap_or_else(|| Rational::new(FALLBACK_FRAME_RATE.0, FALLBACK_FRAME_RATE.1));

        let decoder_ctx = codec::context::Context::from_parameters(stream.parameters())
            .context("failed to build decoder context")?;
        let decoder = decoder_ctx
            .decoder()
            .video()
            .context("failed to open video decoder")?;

        let width = decoder.width();
        let height = decoder.height();
        let src_pixel_fmt = decoder.format();

        info!(width, height, ?src_pixel_fmt, %frame_rate, "opened input video stream");

        let to_rgb = scaling::Context::get(
            src_pixel_fmt,
            width,
            height,
            format::Pixel::RGB24,
            width,
            height,
            SCALE_FLAGS,
        )
        .context("failed to create to-RGB scaler")?;

        Ok(Self {
            ictx,
            video_stream_index,
            decoder,
            to_rgb,
            decoded: frame::Video::empty(),
            rgb: frame::Video::empty(),
            width,
            height,
            frame_rate,
            frames_read: 0,
            eof_sent: false,
        })
    }

    /// Approximate total frame count (for progress reporting); 0 if unknown.
    pub fn estimated_frames(&self) -> u64 {
        let Some(stream) = self.ictx.stream(self.video_stream_index) else {
            return 0;
        };
        // nb_frames is set by most muxers; fall back to duration × fps estimate.
        let nb = stream.frames();
        if nb > 0 {
            return nb as u64;
        }
        let dur = stream.duration();
        let tb = stream.time_base();
        let fps = self.frame_rate;
        if dur > 0 && tb.denominator() > 0 && fps.denominator() > 0 {
            let seconds = dur as f64 * tb.numerator() as f64 / tb.denominator() as f64;
            let fps_f = fps.numerator() as f64 / fps.denominator() as f64;
            return (seconds * fps_f).round() as u64;
        }
        0
    }

    fn convert(&mut self) -> Result<RgbFrame> {
        self.to_rgb
            .run(&self.decoded, &mut self.rgb)
            .context("to-RGB scaling failed")?;

        // Compact to a plain Vec<u8> (remove stride padding if any)
        let stride = self.rgb.stride(0);
        let row_len = self.width as usize * 3;
        let raw = self.rgb.data(0);
        let mut data = Vec::with_capacity(row_len * self.height as usize);
        for row in 0..self.height as usize {
            let start = row * stride;
            data.extend_from_slice(&raw[start..start + row_len]);
        }

        let pts = self.decoded.pts().unwrap_or(self.frames_read as i64);
        self.frames_read += 1;
        if self.frames_read % 100 == 0 {
            debug!(frames = self.frames_read, "decoded frames");
        }

        Ok(RgbFrame {
            data,
            width: self.width,
            height: self.height,
            pts,
        })
    }
}

impl FrameSource for FfmpegSource {
    fn read(&mut self) -> Result<Option<RgbFrame>> {
        loop {
            if self.decoder.receive_frame(&mut self.decoded).is_ok() {
                return self.convert().map(Some);
            }
            if self.eof_sent {
                return Ok(None);
            }
            match self.ictx.packets().next() {
                Some((stream, packet)) => {
                    if stream.index() == self.video_stream_index {
                        self.decoder
                            .send_packet(&packet)
                            .context("decoder send_packet")?;
                    }
                }
                None => {
                    self.decoder.send_eof().context("decoder send_eof")?;
                    self.eof_sent = true;
                }
            }
        }
    }

    fn frame_rate(&self) -> Rational {
        self.frame_rate
    }
}

fn usable_rate(rate: Rational) -> Option<Rational> {
    (rate.numerator() > 0 && rate.denominator() > 0).then_some(rate)
}

// ── Encoding ─────────────────────────────────────────────────────────────────

/// H.264 writer for fixed-size RGB frames.
///
/// YUV420p needs even dimensions, so odd sizes are scaled down by one pixel on
/// the way into the encoder.
pub struct VideoWriter {
    octx: format::context::Output,
    encoder: encoder::Video,
    to_yuv: scaling::Context,
    rgb: frame::Video,
    yuv: frame::Video,
    stream_index: usize,
    time_base: Rational,
    stream_time_base: Rational,
    width: u32,
    height: u32,
    frames: i64,
    path: PathBuf,
}

impl VideoWriter {
    pub fn create<P: AsRef<Path>>(
        output_path: P,
        width: u32,
        height: u32,
        frame_rate: Rational,
    ) -> Result<Self> {
        ffmpeg::init().context("failed to initialise FFmpeg")?;

        let path = output_path.as_ref().to_path_buf();
        let (enc_w, enc_h) = (width & !1, height & !1);
        if enc_w == 0 || enc_h == 0 {
            bail!("cannot encode a {width}x{height} video");
        }

        let mut octx = format::output(&path)
            .with_context(|| format!("could not create output: {}", path.display()))?;
        let global_header = octx
            .format()
            .flags()
            .contains(format::flag::Flags::GLOBAL_HEADER);

        let encoder_codec = encoder::find(codec::Id::H264)
            .context("H.264 encoder not found (is FFmpeg built with libx264?)")?;
        let time_base = frame_rate.invert();

        let mut out_stream = octx.add_stream(encoder_codec)?;
        let encoder_ctx = codec::context::Context::new_with_codec(encoder_codec);
        let mut builder = encoder_ctx.encoder().video()?;
        builder.set_width(enc_w);
        builder.set_height(enc_h);
        builder.set_format(ENCODE_FORMAT);
        builder.set_time_base(time_base);
        builder.set_frame_rate(Some(frame_rate));
        if global_header {
            builder.set_flags(codec::flag::Flags::GLOBAL_HEADER);
        }
        let encoder = builder
            .open_as_with(
                encoder_codec,
                ffmpeg::Dictionary::from_iter([("crf", "18"), ("preset", "fast")]),
            )
            .context("failed to open H.264 encoder")?;
        out_stream.set_parameters(&encoder);
        let stream_index = out_stream.index();

        let to_yuv = scaling::Context::get(
            format::Pixel::RGB24,
            width,
            height,
            ENCODE_FORMAT,
            enc_w,
            enc_h,
            SCALE_FLAGS,
        )
        .context("failed to create to-YUV scaler")?;

        octx.write_header()
            .with_context(|| format!("failed to write header: {}", path.display()))?;
        let stream_time_base = octx
            .stream(stream_index)
            .context("output stream vanished after header")?
            .time_base();

        info!(path = %path.display(), enc_w, enc_h, "video writer ready");

        Ok(Self {
            octx,
            encoder,
            to_yuv,
            rgb: frame::Video::new(format::Pixel::RGB24, width, height),
            yuv: frame::Video::empty(),
            stream_index,
            time_base,
            stream_time_base,
            width,
            height,
            frames: 0,
            path,
        })
    }

    pub fn write(&mut self, frame: &RgbFrame) -> Result<()> {
        if frame.width != self.width || frame.height != self.height {
            bail!(
                "frame is {}x{} but {} was opened for {}x{}",
                frame.width,
                frame.height,
                self.path.display(),
                self.width,
                self.height
            );
        }

        let row_len = self.width as usize * 3;
        let stride = self.rgb.stride(0);
        let plane = self.rgb.data_mut(0);
        for row in 0..self.height as usize {
            let dst = row * stride;
            let src = row * row_len;
            plane[dst..dst + row_len].copy_from_slice(&frame.data[src..src + row_len]);
        }

        self.to_yuv
            .run(&self.rgb, &mut self.yuv)
            .context("to-YUV scaling failed")?;
        self.yuv.set_pts(Some(self.frames));
        self.frames += 1;

        self.encoder
            .send_frame(&self.yuv)
            .context("encoder send_frame")?;
        self.drain()
    }

    /// Flush the encoder and write the trailer.
    pub fn finish(mut self) -> Result<()> {
        self.encoder.send_eof().context("encoder send_eof")?;
        self.drain()?;
        self.octx
            .write_trailer()
            .with_context(|| format!("failed to write trailer: {}", self.path.display()))?;
        info!(path = %self.path.display(), frames = self.frames, "video written");
        Ok(())
    }

    /// Drain all pending packets from the encoder and write them to the muxer.
    fn drain(&mut self) -> Result<()> {
        let mut encoded = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut encoded).is_ok() {
            encoded.set_stream(self.stream_index);
            encoded.rescale_ts(self.time_base, self.stream_time_base);
            encoded
                .write_interleaved(&mut self.octx)
                .context("failed to write encoded packet")?;
        }
        Ok(())
    }
}

/// Records the annotated view and the crop window to two video files.
///
/// Writers are opened on the first frame, once output sizes are known.
pub struct RecordingSink {
    annotated_path: Option<PathBuf>,
    crop_path: Option<PathBuf>,
    frame_rate: Rational,
    annotated: Option<VideoWriter>,
    crop: Option<VideoWriter>,
}

impl RecordingSink {
    pub fn new(
        annotated_path: Option<PathBuf>,
        crop_path: Option<PathBuf>,
        frame_rate: Rational,
    ) -> Self {
        Self {
            annotated_path,
            crop_path,
            frame_rate,
            annotated: None,
            crop: None,
        }
    }

    fn write_to(
        slot: &mut Option<VideoWriter>,
        path: &Option<PathBuf>,
        frame: &RgbFrame,
        frame_rate: Rational,
    ) -> Result<()> {
        let Some(path) = path else {
            return Ok(());
        };
        if slot.is_none() {
            *slot = Some(VideoWriter::create(
                path,
                frame.width,
                frame.height,
                frame_rate,
            )?);
        }
        match slot.as_mut() {
            Some(writer) => writer.write(frame),
            None => Ok(()),
        }
    }
}

impl DisplaySink for RecordingSink {
    fn show(&mut self, annotated: &RgbFrame, crop: &RgbFrame) -> Result<()> {
        Self::write_to(
            &mut self.annotated,
            &self.annotated_path,
            annotated,
            self.frame_rate,
        )?;
        Self::write_to(&mut self.crop, &self.crop_path, crop, self.frame_rate)
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(w) = self.annotated.take() {
            w.finish()?;
        }
        if let Some(w) = self.crop.take() {
            w.finish()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn luma_uses_bt601_weights() {
        let white = RgbFrame::filled(4, 2, [255, 255, 255]);
        let luma = to_luma(&white).unwrap();
        assert_eq!(luma.dimensions(), (4, 2));
        assert!(luma.pixels().all(|p| p[0] >= 254));

        let red = to_luma(&RgbFrame::filled(1, 1, [255, 0, 0])).unwrap();
        assert_eq!(red.get_pixel(0, 0)[0], 76);
    }

    #[test]
    fn luma_rejects_mismatched_buffer() {
        let mut frame = RgbFrame::filled(4, 4, [0, 0, 0]);
        frame.data.truncate(10);
        assert!(to_luma(&frame).is_err());
    }
}
