//! framing — turn a subject box into a 16:9 crop window
//!
//! Horizontal placement is purely reactive: centre on the subject, clamp to
//! the frame. Vertical placement encodes photographic convention. The
//! subject's eye-line is lifted above centre by the rule of thirds, an
//! operator bias is layered on top, and the result is clamped a second time.
//!
//! Only the vertical target is re-clamped after biasing. No horizontal bias
//! exists, so the horizontal target is clamped once.

use anyhow::{bail, Result};
use tracing::debug;

use crate::geometry::Rect;
use crate::smoothing::DEFAULT_ALPHA;

// ── Tuning constants ─────────────────────────────────────────────────────────

/// Output window width as a fraction of frame width.
pub const DEFAULT_REF_WIDTH_RATIO: f64 = 0.7;
/// Extra space above the subject, as a fraction of subject height.
pub const DEFAULT_HEADROOM_RATIO: f64 = 0.0;
/// Rule-of-thirds line, as a fraction of subject height.
pub const DEFAULT_THIRDS_RULE_RATIO: f64 = 0.666;
/// Minimum drag size (exclusive, both axes) before a selection starts tracking.
pub const DEFAULT_MIN_SELECTION: i32 = 10;
/// Initial position of the vertical bias slider.
pub const DEFAULT_BIAS_SLIDER: u8 = 50;
/// Output aspect ratio, height over width.
const ASPECT_H_OVER_W: f64 = 9.0 / 16.0;

// ── Parameters ───────────────────────────────────────────────────────────────

/// Static composition ratios.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CinematicParams {
    pub ref_width_ratio: f64,
    pub headroom_ratio: f64,
    pub thirds_rule_ratio: f64,
}

impl Default for CinematicParams {
    fn default() -> Self {
        Self {
            ref_width_ratio: DEFAULT_REF_WIDTH_RATIO,
            headroom_ratio: DEFAULT_HEADROOM_RATIO,
            thirds_rule_ratio: DEFAULT_THIRDS_RULE_RATIO,
        }
    }
}

/// Operator-controlled vertical bias in `[0.0, 1.0]`, expressed as a fraction
/// of subject height.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct VerticalBias(f64);

impl VerticalBias {
    pub const SLIDER_MAX: u8 = 100;

    /// Clamp an arbitrary value into range.
    pub fn new(value: f64) -> Self {
        Self(value.clamp(0.0, 1.0))
    }

    /// Map a `0..=100` slider position to `value / 100`.
    pub fn from_slider(position: u8) -> Self {
        Self::new(position.min(Self::SLIDER_MAX) as f64 / Self::SLIDER_MAX as f64)
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl Default for VerticalBias {
    fn default() -> Self {
        Self::from_slider(DEFAULT_BIAS_SLIDER)
    }
}

/// Everything the per-frame loop needs to know about composition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramingConfig {
    pub params: CinematicParams,
    /// Smoothing gain passed to [`crate::smoothing::smooth`].
    pub alpha: f64,
    /// Drags must exceed this many pixels on both axes.
    pub min_selection: i32,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            params: CinematicParams::default(),
            alpha: DEFAULT_ALPHA,
            min_selection: DEFAULT_MIN_SELECTION,
        }
    }
}

impl FramingConfig {
    /// Output window size for a frame, rejecting configurations where the
    /// window would not fit (the clamp range would be empty).
    pub fn output_size(&self, frame_width: u32, frame_height: u32) -> Result<(i32, i32)> {
        if !(0.0..=1.0).contains(&self.alpha) {
            bail!("smoothing alpha must be within [0, 1], got {}", self.alpha);
        }
        let (w, h) = window_size(frame_width, self.params.ref_width_ratio);
        if w <= 0 || h <= 0 {
            bail!(
                "crop window {w}x{h} is empty for a {frame_width}px wide frame \
                 (ref width ratio {})",
                self.params.ref_width_ratio
            );
        }
        if w > frame_width as i32 || h > frame_height as i32 {
            bail!(
                "crop window {w}x{h} does not fit in {frame_width}x{frame_height}; \
                 lower the ref width ratio"
            );
        }
        Ok((w, h))
    }
}

// ── Composition ──────────────────────────────────────────────────────────────

/// 16:9 window size derived from frame width only.
fn window_size(frame_width: u32, ref_width_ratio: f64) -> (i32, i32) {
    let ref_width = (frame_width as f64 * ref_width_ratio).floor() as i32;
    let ref_height = (ref_width as f64 * ASPECT_H_OVER_W).floor() as i32;
    (ref_width, ref_height)
}

/// Same bounds behaviour as `max(lo, min(v, hi))`: never panics, even when
/// the range is inverted.
fn clamp_low_wins(v: i32, lo: i32, hi: i32) -> i32 {
    lo.max(v.min(hi))
}

/// Compute the crop window for `subject` in a `frame_width × frame_height`
/// frame.
///
/// The caller must ensure the window fits the frame (see
/// [`FramingConfig::output_size`]); otherwise the result may extend past the
/// far edge.
pub fn compose(
    frame_width: u32,
    frame_height: u32,
    subject: Rect,
    bias: VerticalBias,
    params: &CinematicParams,
) -> Rect {
    let (ref_width, ref_height) = window_size(frame_width, params.ref_width_ratio);
    let max_x = frame_width as i32 - ref_width;
    let max_y = frame_height as i32 - ref_height;

    let center = subject.center();
    let x_target = center.x - ref_width / 2;
    let y_target = center.y - ref_height / 2;

    let x_target = clamp_low_wins(x_target, 0, max_x);
    let y_target = clamp_low_wins(y_target, 0, max_y);

    let h = subject.height as f64;
    let biased = y_target as f64 - h * (1.0 - params.thirds_rule_ratio) + h * bias.value();
    let headroom = (h * params.headroom_ratio).floor() as i32;
    let y_target = clamp_low_wins(biased as i32 - headroom, 0, max_y);

    debug!(
        %subject,
        bias = bias.value(),
        x_target,
        y_target,
        "composed crop window"
    );

    Rect::new(x_target, y_target, ref_width, ref_height)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hd() -> CinematicParams {
        CinematicParams::default()
    }

    #[test]
    fn reference_example() {
        let out = compose(
            1920,
            1080,
            Rect::new(800, 400, 100, 200),
            VerticalBias::new(0.5),
            &hd(),
        );
        assert_eq!(out, Rect::new(178, 155, 1344, 756));
    }

    #[test]
    fn window_is_sixteen_by_nine_of_frame_width() {
        assert_eq!(window_size(1920, 0.7), (1344, 756));
        assert_eq!(window_size(1280, 0.7), (896, 504));
        // Aspect of the source frame does not matter.
        let out = compose(1000, 1000, Rect::new(0, 0, 10, 10), VerticalBias::new(0.0), &hd());
        assert_eq!((out.width, out.height), (700, 393));
    }

    #[test]
    fn clamps_at_every_edge() {
        let params = hd();
        let top_left = compose(
            1920,
            1080,
            Rect::new(0, 0, 50, 50),
            VerticalBias::new(0.0),
            &params,
        );
        assert_eq!((top_left.x, top_left.y), (0, 0));

        let bias = VerticalBias::new(0.5);
        let bottom_right = compose(1920, 1080, Rect::new(1850, 1000, 60, 70), bias, &params);
        assert_eq!((bottom_right.x, bottom_right.y), (576, 324));
    }

    #[test]
    fn bias_pushes_window_down_and_is_reclamped() {
        let params = hd();
        let subject = Rect::new(900, 500, 100, 200);
        let low = compose(1920, 1080, subject, VerticalBias::new(0.0), &params);
        let high = compose(1920, 1080, subject, VerticalBias::new(1.0), &params);
        assert!(high.y > low.y);
        assert_eq!(low.x, high.x);

        // A tall subject near the bottom with full bias would overshoot.
        let tall = Rect::new(900, 600, 100, 900);
        let out = compose(1920, 1080, tall, VerticalBias::new(1.0), &params);
        assert_eq!(out.y, 324);
    }

    #[test]
    fn headroom_lifts_the_window() {
        let subject = Rect::new(800, 400, 100, 200);
        let bias = VerticalBias::new(0.5);
        let plain = compose(1920, 1080, subject, bias, &hd());
        let roomy = compose(
            1920,
            1080,
            subject,
            bias,
            &CinematicParams {
                headroom_ratio: 0.25,
                ..hd()
            },
        );
        assert_eq!(plain.y - roomy.y, 50);
    }

    #[test]
    fn output_stays_in_bounds_for_subjects_inside_frame() {
        let params = hd();
        let (fw, fh) = (1280u32, 720u32);
        let (rw, rh) = FramingConfig::default().output_size(fw, fh).unwrap();
        for x in (0..1280).step_by(97) {
            for y in (0..720).step_by(53) {
                for (w, h) in [(1, 1), (40, 120), (300, 500), (1279 - x, 719 - y)] {
                    let subject = Rect::new(x, y, w.min(1280 - x), h.min(720 - y));
                    for slider in [0, 37, 100] {
                        let out =
                            compose(fw, fh, subject, VerticalBias::from_slider(slider), &params);
                        assert!(out.x >= 0 && out.x <= fw as i32 - rw, "{out} for {subject}");
                        assert!(out.y >= 0 && out.y <= fh as i32 - rh, "{out} for {subject}");
                        assert_eq!((out.width, out.height), (rw, rh));
                    }
                }
            }
        }
    }

    #[test]
    fn slider_maps_to_unit_range() {
        assert_eq!(VerticalBias::from_slider(0).value(), 0.0);
        assert_eq!(VerticalBias::from_slider(40).value(), 0.4);
        assert_eq!(VerticalBias::from_slider(100).value(), 1.0);
        assert_eq!(VerticalBias::from_slider(250).value(), 1.0);
        assert_eq!(VerticalBias::default().value(), 0.5);
        assert_eq!(VerticalBias::new(-3.0).value(), 0.0);
    }

    #[test]
    fn oversized_window_is_rejected_up_front() {
        let cfg = FramingConfig {
            params: CinematicParams {
                ref_width_ratio: 1.2,
                ..hd()
            },
            ..FramingConfig::default()
        };
        assert!(cfg.output_size(1920, 1080).is_err());
        // Portrait frames work as long as the window height fits.
        assert!(FramingConfig::default().output_size(1080, 1920).is_ok());
        assert!(FramingConfig::default().output_size(1920, 300).is_err());
        assert!(FramingConfig::default().output_size(1, 1).is_err());
    }
}
