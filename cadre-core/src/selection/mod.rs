//! selection — pointer-driven region-of-interest drawing
//!
//! The selection is an immutable value: every pointer event produces the next
//! state wholesale. A committed drag is consumed exactly once by the frame
//! loop through [`Selection::take_commit`]; selection is single-shot.

use tracing::debug;

use crate::control::PointerEvent;
use crate::geometry::{Point, Rect};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    Idle,
    /// Button held; `current` follows the pointer.
    Drawing { start: Point, current: Point },
    /// Button released; waiting for the next frame to consume it.
    Committed { start: Point, current: Point },
}

/// Result of feeding one pointer event to the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: Selection,
    /// The press landed while a session was active; the caller must stop it.
    pub cancel_tracking: bool,
}

impl Transition {
    fn to(next: Selection) -> Self {
        Self {
            next,
            cancel_tracking: false,
        }
    }
}

impl Selection {
    /// Apply `event`. `tracking` reports whether a session is currently active.
    pub fn apply(self, event: PointerEvent, tracking: bool) -> Transition {
        match event {
            PointerEvent::Press(_) if tracking => Transition {
                next: Selection::Idle,
                cancel_tracking: true,
            },
            PointerEvent::Press(p) => Transition::to(Selection::Drawing {
                start: p,
                current: p,
            }),
            PointerEvent::Move(p) => Transition::to(match self {
                Selection::Idle => Selection::Idle,
                Selection::Drawing { start, .. } => Selection::Drawing { start, current: p },
                Selection::Committed { start, .. } => Selection::Committed { start, current: p },
            }),
            PointerEvent::Release(_) => Transition::to(match self {
                Selection::Drawing { start, current } | Selection::Committed { start, current } => {
                    Selection::Committed { start, current }
                }
                Selection::Idle => Selection::Idle,
            }),
        }
    }

    /// Drag rectangle for on-screen feedback, kept until the commit is taken.
    pub fn preview(&self) -> Option<Rect> {
        match *self {
            Selection::Drawing { start, current } | Selection::Committed { start, current } => {
                Some(Rect::from_corners(start, current))
            }
            Selection::Idle => None,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, Selection::Committed { .. })
    }

    /// Consume a committed drag.
    ///
    /// Returns the state to continue with (always `Idle` after a commit) and
    /// the initial ROI when the drag exceeds `min_size` on both axes. Any
    /// state other than `Committed` is returned untouched.
    pub fn take_commit(self, min_size: i32) -> (Selection, Option<Rect>) {
        let Selection::Committed { start, current } = self else {
            return (self, None);
        };

        let roi = Rect::from_corners(start, current);
        if roi.width > min_size && roi.height > min_size {
            (Selection::Idle, Some(roi))
        } else {
            debug!(%roi, min_size, "selection too small; discarded");
            (Selection::Idle, None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drag(from: (i32, i32), to: (i32, i32)) -> Selection {
        let s = Selection::Idle
            .apply(PointerEvent::Press(Point::new(from.0, from.1)), false)
            .next;
        let s = s.apply(PointerEvent::Move(Point::new(to.0, to.1)), false).next;
        s.apply(PointerEvent::Release(Point::new(to.0, to.1)), false)
            .next
    }

    #[test]
    fn drag_commits_and_yields_roi() {
        let s = drag((10, 10), (100, 100));
        assert!(s.is_committed());
        let (next, roi) = s.take_commit(10);
        assert_eq!(next, Selection::Idle);
        assert_eq!(roi, Some(Rect::new(10, 10, 90, 90)));
    }

    #[test]
    fn tiny_drag_is_discarded() {
        let s = drag((10, 10), (12, 12));
        let (next, roi) = s.take_commit(10);
        assert_eq!(next, Selection::Idle);
        assert_eq!(roi, None);
    }

    #[test]
    fn gate_is_exclusive_on_both_axes() {
        assert_eq!(drag((0, 0), (10, 50)).take_commit(10).1, None);
        assert_eq!(drag((0, 0), (50, 10)).take_commit(10).1, None);
        assert_eq!(
            drag((0, 0), (11, 11)).take_commit(10).1,
            Some(Rect::new(0, 0, 11, 11))
        );
    }

    #[test]
    fn reverse_drag_is_normalised() {
        let (_, roi) = drag((100, 80), (20, 10)).take_commit(10);
        assert_eq!(roi, Some(Rect::new(20, 10, 80, 70)));
    }

    #[test]
    fn press_while_tracking_cancels_regardless_of_drag() {
        let mid_drag = Selection::Drawing {
            start: Point::new(1, 1),
            current: Point::new(50, 50),
        };
        let t = mid_drag.apply(PointerEvent::Press(Point::new(5, 5)), true);
        assert!(t.cancel_tracking);
        assert_eq!(t.next, Selection::Idle);

        let t = Selection::Idle.apply(PointerEvent::Press(Point::new(5, 5)), true);
        assert!(t.cancel_tracking);
        assert_eq!(t.next, Selection::Idle);
    }

    #[test]
    fn move_and_release_without_press_are_ignored() {
        let s = Selection::Idle
            .apply(PointerEvent::Move(Point::new(3, 3)), false)
            .next;
        assert_eq!(s, Selection::Idle);
        let s = s.apply(PointerEvent::Release(Point::new(3, 3)), false).next;
        assert_eq!(s, Selection::Idle);
        assert_eq!(s.take_commit(10), (Selection::Idle, None));
    }

    #[test]
    fn preview_until_commit_is_taken() {
        let s = Selection::Idle
            .apply(PointerEvent::Press(Point::new(30, 40)), false)
            .next;
        assert_eq!(s.preview(), Some(Rect::new(30, 40, 0, 0)));
        let s = s.apply(PointerEvent::Move(Point::new(10, 60)), false).next;
        assert_eq!(s.preview(), Some(Rect::new(10, 40, 20, 20)));
        let s = s.apply(PointerEvent::Release(Point::new(10, 60)), false).next;
        assert_eq!(s.preview(), Some(Rect::new(10, 40, 20, 20)));
        let (s, _) = s.take_commit(10);
        assert_eq!(s.preview(), None);
    }

    #[test]
    fn new_press_restarts_a_pending_commit() {
        let s = drag((10, 10), (100, 100));
        let s = s.apply(PointerEvent::Press(Point::new(7, 7)), false).next;
        assert_eq!(
            s,
            Selection::Drawing {
                start: Point::new(7, 7),
                current: Point::new(7, 7)
            }
        );
        assert_eq!(s.take_commit(10).1, None);
    }
}
