//! smoothing — damp frame-to-frame jitter of the tracked box
//!
//! An exponential moving average over the box origin. Size is deliberately
//! left alone: a subject walking towards the camera must grow immediately.

use crate::geometry::Rect;

/// Default smoothing gain. Smaller is smoother and slower to react.
pub const DEFAULT_ALPHA: f64 = 0.15;

/// Blend `current` towards `prev` with gain `alpha`.
///
/// With no history the measurement is returned unchanged. The output always
/// carries the size of `current`. Pure: the same inputs give the same output.
pub fn smooth(current: Rect, prev: Option<Rect>, alpha: f64) -> Rect {
    let Some(prev) = prev else {
        return current;
    };

    let blend = |cur: i32, old: i32| -> i32 {
        (cur as f64 * alpha + old as f64 * (1.0 - alpha)).round() as i32
    };

    Rect {
        x: blend(current.x, prev.x),
        y: blend(current.y, prev.y),
        width: current.width,
        height: current.height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cold_start_returns_measurement() {
        let r = Rect::new(13, -7, 40, 90);
        assert_eq!(smooth(r, None, DEFAULT_ALPHA), r);
        assert_eq!(smooth(r, None, 0.9), r);
    }

    #[test]
    fn size_follows_measurement_not_history() {
        let cur = Rect::new(100, 100, 300, 40);
        let prev = Rect::new(0, 0, 10, 10);
        for alpha in [0.0, 0.15, 0.5, 1.0] {
            let out = smooth(cur, Some(prev), alpha);
            assert_eq!((out.width, out.height), (300, 40));
        }
    }

    #[test]
    fn position_is_blended() {
        let out = smooth(
            Rect::new(100, 200, 10, 10),
            Some(Rect::new(0, 0, 10, 10)),
            DEFAULT_ALPHA,
        );
        assert_eq!((out.x, out.y), (15, 30));
    }

    #[test]
    fn gain_extremes() {
        let cur = Rect::new(100, 50, 10, 10);
        let prev = Rect::new(20, 10, 10, 10);
        assert_eq!(smooth(cur, Some(prev), 1.0), cur);
        let held = smooth(cur, Some(prev), 0.0);
        assert_eq!((held.x, held.y), (20, 10));
    }

    #[test]
    fn constant_input_is_a_fixed_point() {
        let r = Rect::new(1234, 567, 89, 10);
        let mut prev = None;
        for _ in 0..50 {
            let out = smooth(r, prev, DEFAULT_ALPHA);
            assert_eq!(out, r);
            prev = Some(out);
        }
    }

    #[test]
    fn converges_on_a_step() {
        let target = Rect::new(500, 300, 20, 20);
        let mut prev = Some(Rect::new(0, 0, 20, 20));
        let mut last_gap = i32::MAX;
        for _ in 0..40 {
            let out = smooth(target, prev, DEFAULT_ALPHA);
            let gap = (target.x - out.x).abs();
            assert!(gap <= last_gap);
            last_gap = gap;
            prev = Some(out);
        }
        // Rounding parks the average within a few pixels of the target.
        assert!(last_gap <= 3);
    }
}
