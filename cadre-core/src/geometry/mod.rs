//! geometry — integer pixel rectangles shared by every stage
//!
//! One `Rect` type flows through the whole pipeline: the user's selection,
//! the raw tracked box, the smoothed box and the composed crop window.

use std::fmt;

/// A pixel coordinate in frame space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle `(x, y, width, height)` in integer pixels.
///
/// A rectangle with a non-positive width or height is *degenerate* and must
/// never reach the crop or draw stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Normalised rectangle spanning two arbitrary corners of a drag.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (a.x - b.x).abs(),
            height: (a.y - b.y).abs(),
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    /// Integer centre, rounding towards the top-left like the framing maths.
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2, self.y + self.height / 2)
    }

    /// Overlap with `other`, or `None` when they do not share any pixel.
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());
        let r = Rect::new(x1, y1, x2 - x1, y2 - y1);
        (!r.is_degenerate()).then_some(r)
    }

    /// Whether `self` lies entirely within `outer`.
    pub fn fits_within(&self, outer: &Rect) -> bool {
        self.x >= outer.x
            && self.y >= outer.y
            && self.right() <= outer.right()
            && self.bottom() <= outer.bottom()
    }

    /// The full-frame rectangle for a `width × height` image.
    pub fn frame(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x, self.y, self.width, self.height)
    }
}

impl std::str::FromStr for Rect {
    type Err = anyhow::Error;

    /// Parse `x,y,w,h` as produced by `Display`.
    fn from_str(s: &str) -> anyhow::Result<Self> {
        let parts: Vec<i32> = s
            .split(',')
            .map(|p| p.trim().parse::<i32>())
            .collect::<Result<_, _>>()
            .map_err(|e| anyhow::anyhow!("invalid rectangle {s:?}: {e}"))?;
        match parts[..] {
            [x, y, w, h] => Ok(Rect::new(x, y, w, h)),
            _ => anyhow::bail!("rectangle must be x,y,w,h, got {s:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_are_normalised_in_any_drag_direction() {
        let r = Rect::from_corners(Point::new(100, 100), Point::new(10, 10));
        assert_eq!(r, Rect::new(10, 10, 90, 90));
        let r = Rect::from_corners(Point::new(10, 100), Point::new(100, 10));
        assert_eq!(r, Rect::new(10, 10, 90, 90));
    }

    #[test]
    fn zero_sized_rect_is_degenerate() {
        assert!(Rect::new(5, 5, 0, 10).is_degenerate());
        assert!(Rect::new(5, 5, 10, -1).is_degenerate());
        assert!(!Rect::new(5, 5, 1, 1).is_degenerate());
    }

    #[test]
    fn center_rounds_towards_top_left() {
        assert_eq!(Rect::new(800, 400, 100, 200).center(), Point::new(850, 500));
        assert_eq!(Rect::new(0, 0, 5, 3).center(), Point::new(2, 1));
    }

    #[test]
    fn intersect_clips_to_frame() {
        let frame = Rect::frame(100, 50);
        let r = Rect::new(-10, 40, 30, 30);
        assert_eq!(r.intersect(&frame), Some(Rect::new(0, 40, 20, 10)));
        assert_eq!(Rect::new(200, 0, 5, 5).intersect(&frame), None);
    }

    #[test]
    fn parses_display_form() {
        let r: Rect = "800, 400,100,200".parse().unwrap();
        assert_eq!(r, Rect::new(800, 400, 100, 200));
        assert_eq!(r.to_string(), "800,400,100,200");
        assert!("1,2,3".parse::<Rect>().is_err());
        assert!("a,b,c,d".parse::<Rect>().is_err());
    }
}
