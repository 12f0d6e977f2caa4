//! Grayscale template-matching tracker.
//!
//! The appearance model is the luma patch under the initial box. Each update
//! scans a window around the last position for the placement with the lowest
//! mean absolute difference, then blends the matched patch into the model so
//! slow appearance changes are followed. Large templates are compared on a
//! sparse grid to keep the cost per frame bounded.

use image::GrayImage;
use rayon::prelude::*;
use tracing::debug;

use super::Tracker;
use crate::geometry::Rect;

/// Pixels searched in every direction around the last position.
pub const DEFAULT_SEARCH_RADIUS: i32 = 24;
/// Mean absolute luma difference above which the target counts as lost.
pub const DEFAULT_LOSS_THRESHOLD: f32 = 40.0;
/// Samples per template axis before the comparison grid is thinned out.
const MAX_SAMPLES_PER_AXIS: u32 = 48;
/// Weight of the newly matched patch when refreshing the model.
const MODEL_LEARNING_RATE: f32 = 0.1;

struct Model {
    pixels: Vec<f32>,
    width: u32,
    height: u32,
    step: u32,
}

pub struct TemplateTracker {
    model: Option<Model>,
    position: Option<Rect>,
    search_radius: i32,
    loss_threshold: f32,
}

impl TemplateTracker {
    pub fn new(search_radius: i32, loss_threshold: f32) -> Self {
        Self {
            model: None,
            position: None,
            search_radius: search_radius.max(0),
            loss_threshold,
        }
    }

    /// Mean absolute difference between the model and the frame patch whose
    /// top-left corner is `(x, y)`. The patch must lie inside the frame.
    fn score(&self, model: &Model, frame: &GrayImage, x: u32, y: u32) -> f32 {
        let stride = frame.width() as usize;
        let raw = frame.as_raw();
        let mut sum = 0f32;
        let mut count = 0u32;
        for ty in (0..model.height).step_by(model.step as usize) {
            let row = (y + ty) as usize * stride + x as usize;
            let model_row = (ty * model.width) as usize;
            for tx in (0..model.width).step_by(model.step as usize) {
                let f = raw[row + tx as usize] as f32;
                let m = model.pixels[model_row + tx as usize];
                sum += (f - m).abs();
                count += 1;
            }
        }
        if count == 0 {
            f32::INFINITY
        } else {
            sum / count as f32
        }
    }

    fn refresh_model(model: &mut Model, frame: &GrayImage, x: u32, y: u32) {
        for ty in 0..model.height {
            for tx in 0..model.width {
                let f = frame.get_pixel(x + tx, y + ty)[0] as f32;
                let m = &mut model.pixels[(ty * model.width + tx) as usize];
                *m += (f - *m) * MODEL_LEARNING_RATE;
            }
        }
    }
}

impl Default for TemplateTracker {
    fn default() -> Self {
        Self::new(DEFAULT_SEARCH_RADIUS, DEFAULT_LOSS_THRESHOLD)
    }
}

impl Tracker for TemplateTracker {
    fn start(&mut self, frame: &GrayImage, rect: Rect) {
        self.position = Some(rect);
        let Some(clip) = rect.intersect(&Rect::frame(frame.width(), frame.height())) else {
            debug!(%rect, "initial box lies outside the frame");
            self.model = None;
            return;
        };

        let (width, height) = (clip.width as u32, clip.height as u32);
        let mut pixels = Vec::with_capacity((width * height) as usize);
        for ty in 0..height {
            for tx in 0..width {
                pixels.push(frame.get_pixel(clip.x as u32 + tx, clip.y as u32 + ty)[0] as f32);
            }
        }
        let step = (width.max(height) / MAX_SAMPLES_PER_AXIS).max(1);

        self.position = Some(clip);
        self.model = Some(Model {
            pixels,
            width,
            height,
            step,
        });
    }

    fn update(&mut self, frame: &GrayImage) -> Option<Rect> {
        let model = self.model.as_ref()?;
        let last = self.position?;

        let max_x = frame.width() as i32 - model.width as i32;
        let max_y = frame.height() as i32 - model.height as i32;
        if max_x < 0 || max_y < 0 {
            return None;
        }
        let x0 = (last.x - self.search_radius).clamp(0, max_x);
        let x1 = (last.x + self.search_radius).clamp(0, max_x);
        let y0 = (last.y - self.search_radius).clamp(0, max_y);
        let y1 = (last.y + self.search_radius).clamp(0, max_y);

        // (score, squared displacement, y, x): ties go to the smallest move.
        let best = (y0..=y1)
            .into_par_iter()
            .flat_map_iter(|y| (x0..=x1).map(move |x| (x, y)))
            .map(|(x, y)| {
                let s = self.score(model, frame, x as u32, y as u32);
                let dx = (x - last.x) as i64;
                let dy = (y - last.y) as i64;
                (s, dx * dx + dy * dy, y, x)
            })
            .min_by(|a, b| {
                a.0.total_cmp(&b.0)
                    .then(a.1.cmp(&b.1))
                    .then(a.2.cmp(&b.2))
                    .then(a.3.cmp(&b.3))
            })?;

        let (score, _, y, x) = best;
        if score > self.loss_threshold {
            debug!(score, threshold = self.loss_threshold, "template match too weak");
            return None;
        }

        let rect = Rect::new(x, y, model.width as i32, model.height as i32);
        if let Some(model) = self.model.as_mut() {
            Self::refresh_model(model, frame, x as u32, y as u32);
        }
        self.position = Some(rect);
        Some(rect)
    }

    fn position(&self) -> Option<Rect> {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use image::Luma;

    use super::*;

    fn square_at(x: u32, y: u32) -> GrayImage {
        GrayImage::from_fn(120, 120, |px, py| {
            if (x..x + 20).contains(&px) && (y..y + 20).contains(&py) {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    #[test]
    fn follows_a_moving_square() {
        let mut t = TemplateTracker::default();
        t.start(&square_at(40, 40), Rect::new(35, 35, 30, 30));
        assert_eq!(
            t.update(&square_at(45, 43)),
            Some(Rect::new(40, 38, 30, 30))
        );
        assert_eq!(
            t.update(&square_at(52, 41)),
            Some(Rect::new(47, 36, 30, 30))
        );
        assert_eq!(t.position(), Some(Rect::new(47, 36, 30, 30)));
    }

    #[test]
    fn reports_loss_when_appearance_changes_completely() {
        let mut t = TemplateTracker::default();
        t.start(&square_at(40, 40), Rect::new(35, 35, 30, 30));
        let white = GrayImage::from_pixel(120, 120, Luma([255]));
        assert_eq!(t.update(&white), None);
        // Last good position is kept.
        assert_eq!(t.position(), Some(Rect::new(35, 35, 30, 30)));
    }

    #[test]
    fn uniform_scene_keeps_position() {
        let grey = GrayImage::from_pixel(80, 80, Luma([90]));
        let mut t = TemplateTracker::default();
        t.start(&grey, Rect::new(20, 20, 16, 16));
        assert_eq!(t.update(&grey), Some(Rect::new(20, 20, 16, 16)));
    }

    #[test]
    fn box_outside_frame_cannot_be_tracked() {
        let mut t = TemplateTracker::default();
        t.start(&square_at(0, 0), Rect::new(500, 500, 30, 30));
        assert_eq!(t.update(&square_at(0, 0)), None);
    }

    #[test]
    fn box_is_clipped_to_the_frame() {
        let mut t = TemplateTracker::default();
        t.start(&square_at(0, 0), Rect::new(-10, -10, 40, 40));
        assert_eq!(t.position(), Some(Rect::new(0, 0, 30, 30)));
    }
}
