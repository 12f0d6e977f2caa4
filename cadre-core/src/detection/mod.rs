//! detection — foreground blob search used to recover a lost target
//!
//! The frame is binarised at a fixed luma threshold, outer and hole borders
//! are traced, and the bounding box of the contour enclosing the largest area
//! is returned. This runs inline on every frame where the track is lost.

use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, Contour};
use tracing::debug;

use crate::geometry::Rect;

/// Luma values strictly above this become foreground.
pub const DEFAULT_THRESHOLD: u8 = 127;

/// Finds a candidate target when tracking has been lost.
pub trait Reacquirer {
    /// Bounding box of the most prominent foreground object, if any.
    fn largest_bounding_box(&mut self, frame: &GrayImage) -> Option<Rect>;
}

impl<R: Reacquirer + ?Sized> Reacquirer for Box<R> {
    fn largest_bounding_box(&mut self, frame: &GrayImage) -> Option<Rect> {
        (**self).largest_bounding_box(frame)
    }
}

/// Largest-contour reacquisition over a thresholded luma frame.
#[derive(Debug, Clone, Copy)]
pub struct ContourReacquirer {
    threshold: u8,
}

impl ContourReacquirer {
    pub fn new(threshold: u8) -> Self {
        Self { threshold }
    }
}

impl Default for ContourReacquirer {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl Reacquirer for ContourReacquirer {
    fn largest_bounding_box(&mut self, frame: &GrayImage) -> Option<Rect> {
        let mask = binarize(frame, self.threshold);
        let contours = find_contours::<i32>(&mask);

        // Strict comparison: the first contour wins ties.
        let mut best: Option<(f64, &Contour<i32>)> = None;
        for contour in &contours {
            let area = contour_area(contour);
            if best.is_none_or(|(a, _)| area > a) {
                best = Some((area, contour));
            }
        }

        let (area, contour) = best?;
        let rect = bounding_rect(contour)?;
        debug!(contours = contours.len(), area, %rect, "largest contour");
        Some(rect)
    }
}

fn binarize(frame: &GrayImage, threshold: u8) -> GrayImage {
    let mut mask = frame.clone();
    for p in mask.pixels_mut() {
        *p = if p[0] > threshold { Luma([255]) } else { Luma([0]) };
    }
    mask
}

/// Polygon area of the traced border (shoelace formula).
fn contour_area(contour: &Contour<i32>) -> f64 {
    let pts = &contour.points;
    if pts.len() < 3 {
        return 0.0;
    }
    let twice: i64 = pts
        .iter()
        .zip(pts.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();
    twice.abs() as f64 / 2.0
}

/// Inclusive pixel bounds of the border points.
fn bounding_rect(contour: &Contour<i32>) -> Option<Rect> {
    let first = contour.points.first()?;
    let (mut x1, mut y1, mut x2, mut y2) = (first.x, first.y, first.x, first.y);
    for p in &contour.points {
        x1 = x1.min(p.x);
        y1 = y1.min(p.y);
        x2 = x2.max(p.x);
        y2 = y2.max(p.y);
    }
    Some(Rect::new(x1, y1, x2 - x1 + 1, y2 - y1 + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(blobs: &[(u32, u32, u32, u32, u8)]) -> GrayImage {
        GrayImage::from_fn(100, 80, |x, y| {
            for &(bx, by, bw, bh, v) in blobs {
                if (bx..bx + bw).contains(&x) && (by..by + bh).contains(&y) {
                    return Luma([v]);
                }
            }
            Luma([20])
        })
    }

    #[test]
    fn empty_scene_has_nothing_to_reacquire() {
        let mut r = ContourReacquirer::default();
        assert_eq!(r.largest_bounding_box(&scene(&[])), None);
    }

    #[test]
    fn picks_the_largest_blob() {
        let frame = scene(&[(5, 5, 10, 10, 200), (40, 20, 30, 25, 255), (85, 70, 4, 4, 255)]);
        let mut r = ContourReacquirer::default();
        assert_eq!(r.largest_bounding_box(&frame), Some(Rect::new(40, 20, 30, 25)));
    }

    #[test]
    fn threshold_is_exclusive() {
        let frame = scene(&[(10, 10, 30, 30, 127), (60, 10, 8, 8, 128)]);
        let mut r = ContourReacquirer::default();
        assert_eq!(r.largest_bounding_box(&frame), Some(Rect::new(60, 10, 8, 8)));

        let mut low = ContourReacquirer::new(100);
        assert_eq!(low.largest_bounding_box(&frame), Some(Rect::new(10, 10, 30, 30)));
    }

    #[test]
    fn single_pixel_blob_still_yields_a_box() {
        let frame = scene(&[(50, 50, 1, 1, 255)]);
        let mut r = ContourReacquirer::default();
        assert_eq!(r.largest_bounding_box(&frame), Some(Rect::new(50, 50, 1, 1)));
    }

    #[test]
    fn shoelace_area_of_square_border() {
        let frame = scene(&[(10, 10, 11, 11, 255)]);
        let contours = find_contours::<i32>(&binarize(&frame, DEFAULT_THRESHOLD));
        let outer = contours
            .iter()
            .map(contour_area)
            .fold(0.0f64, f64::max);
        // Border pixels trace a 10x10 polygon.
        assert_eq!(outer, 100.0);
    }
}
