//! rendering — crop extraction, letterbox fallback and on-screen overlays
//!
//! The crop window is copied row by row straight out of the source frame.
//! Frames without a crop (nothing tracked yet, or the track is lost) are
//! letterboxed into the same output size so the crop stream never changes
//! dimensions.

use anyhow::{bail, Context, Result};
use fast_image_resize as fr;
use image::{ImageBuffer, Rgb, RgbImage};
use imageproc::rect::Rect as DrawRect;

use crate::geometry::Rect;
use crate::video::RgbFrame;

/// Live drag rectangle.
pub const SELECTION_COLOR: [u8; 3] = [0, 255, 0];
/// Raw tracked subject.
pub const SUBJECT_COLOR: [u8; 3] = [255, 0, 0];
/// Composed crop window.
pub const CROP_COLOR: [u8; 3] = [0, 0, 255];
/// Overlay line thickness in pixels.
const LINE_THICKNESS: i32 = 2;

/// Rectangles to draw over the full frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Overlays {
    pub selection: Option<Rect>,
    pub subject: Option<Rect>,
    pub crop: Option<Rect>,
}

/// Reusable rendering context to avoid per-frame allocations.
pub struct FrameRenderer {
    resizer: fr::Resizer,
    scaled_buf: Vec<u8>,
}

impl FrameRenderer {
    pub fn new() -> Self {
        Self {
            resizer: fr::Resizer::new(),
            scaled_buf: Vec::new(),
        }
    }

    /// Copy `window` out of `frame`.
    ///
    /// The window must be non-degenerate and lie fully inside the frame; the
    /// framing stage guarantees both, so a violation is a bug upstream.
    pub fn crop(&self, frame: &RgbFrame, window: Rect) -> Result<RgbFrame> {
        if window.is_degenerate() {
            bail!("refusing to crop degenerate window {window}");
        }
        if !window.fits_within(&Rect::frame(frame.width, frame.height)) {
            bail!(
                "crop window {window} exceeds {}x{} frame",
                frame.width,
                frame.height
            );
        }

        // Copy only the crop rows from the raw slice; O(crop area).
        let (x1, y1) = (window.x as usize, window.y as usize);
        let (w, h) = (window.width as usize, window.height as usize);
        let src_stride = frame.width as usize * 3;
        let dst_stride = w * 3;
        let mut data = vec![0u8; dst_stride * h];
        for row in 0..h {
            let src_start = (y1 + row) * src_stride + x1 * 3;
            let dst_start = row * dst_stride;
            data[dst_start..dst_start + dst_stride]
                .copy_from_slice(&frame.data[src_start..src_start + dst_stride]);
        }

        Ok(RgbFrame {
            data,
            width: w as u32,
            height: h as u32,
            pts: frame.pts,
        })
    }

    /// Scale the whole frame uniformly into `out_w × out_h`, adding black bars.
    pub fn letterbox(&mut self, frame: &RgbFrame, out_w: u32, out_h: u32) -> Result<RgbFrame> {
        if out_w == 0 || out_h == 0 {
            bail!("refusing to letterbox into {out_w}x{out_h}");
        }

        let src_aspect = frame.width as f32 / frame.height as f32;
        let dst_aspect = out_w as f32 / out_h as f32;

        let (scaled_w, scaled_h) = if src_aspect > dst_aspect {
            (out_w, (out_w as f32 / src_aspect) as u32)
        } else {
            ((out_h as f32 * src_aspect) as u32, out_h)
        };
        let scaled_w = scaled_w.clamp(1, out_w);
        let scaled_h = scaled_h.clamp(1, out_h);

        let src =
            fr::images::ImageRef::new(frame.width, frame.height, &frame.data, fr::PixelType::U8x3)
                .context("failed to create fast_image_resize source for letterbox")?;

        let scaled_len = (scaled_w * scaled_h * 3) as usize;
        if self.scaled_buf.len() != scaled_len {
            self.scaled_buf.resize(scaled_len, 0);
        }
        let mut dst = fr::images::Image::from_vec_u8(
            scaled_w,
            scaled_h,
            std::mem::take(&mut self.scaled_buf),
            fr::PixelType::U8x3,
        )
        .context("failed to create fast_image_resize destination for letterbox")?;

        let options = fr::ResizeOptions::new()
            .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::CatmullRom));
        self.resizer
            .resize(&src, &mut dst, Some(&options))
            .context("fast_image_resize letterbox scale failed")?;

        self.scaled_buf = dst.into_vec();

        let offset_x = ((out_w - scaled_w) / 2) as usize;
        let offset_y = ((out_h - scaled_h) / 2) as usize;
        let canvas_stride = (out_w * 3) as usize;
        let scaled_stride = (scaled_w * 3) as usize;

        let mut data = vec![0u8; canvas_stride * out_h as usize];
        for row in 0..scaled_h as usize {
            let dst_start = (offset_y + row) * canvas_stride + offset_x * 3;
            let src_start = row * scaled_stride;
            data[dst_start..dst_start + scaled_stride]
                .copy_from_slice(&self.scaled_buf[src_start..src_start + scaled_stride]);
        }

        Ok(RgbFrame {
            data,
            width: out_w,
            height: out_h,
            pts: frame.pts,
        })
    }

    /// Draw the overlays onto `frame` in place. Degenerate rectangles are
    /// skipped.
    pub fn annotate(&self, frame: &mut RgbFrame, overlays: &Overlays) -> Result<()> {
        // Take the buffer as an image, draw, then hand it back.
        let (width, height) = (frame.width, frame.height);
        let mut img: RgbImage = ImageBuffer::from_raw(width, height, std::mem::take(&mut frame.data))
            .with_context(|| format!("frame buffer does not match {width}x{height} RGB24"))?;

        let layers = [
            (overlays.selection, SELECTION_COLOR),
            (overlays.subject, SUBJECT_COLOR),
            (overlays.crop, CROP_COLOR),
        ];
        for (rect, color) in layers {
            if let Some(rect) = rect.filter(|r| !r.is_degenerate()) {
                draw_outline(&mut img, rect, Rgb(color));
            }
        }

        frame.data = img.into_raw();
        Ok(())
    }
}

impl Default for FrameRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Hollow rectangle `LINE_THICKNESS` pixels wide, growing inwards.
fn draw_outline(img: &mut RgbImage, rect: Rect, color: Rgb<u8>) {
    for inset in 0..LINE_THICKNESS {
        let w = rect.width - 2 * inset;
        let h = rect.height - 2 * inset;
        if w <= 0 || h <= 0 {
            break;
        }
        let r = DrawRect::at(rect.x + inset, rect.y + inset).of_size(w as u32, h as u32);
        imageproc::drawing::draw_hollow_rect_mut(img, r, color);
    }
}
