//! tracking — drive a frame-to-frame tracker and recover lost targets
//!
//! The session wraps an external [`Tracker`]. When the tracker loses its
//! target (or reports a zero-area box) the session asks a [`Reacquirer`] for
//! the largest foreground blob and restarts a fresh tracker on it. The session
//! stays armed until the operator cancels it.
//!
//! The session also owns the smoothing history (`prev_roi`), which is cleared
//! whenever a tracker is (re)started so smoothing always restarts cold.

pub mod template;

use image::GrayImage;
use tracing::{debug, info};

use crate::detection::Reacquirer;
use crate::geometry::Rect;
use crate::smoothing::smooth;

pub use template::TemplateTracker;

/// A single-target visual tracker.
///
/// Implementations must tolerate `start` being called at any time.
pub trait Tracker {
    /// Begin following `rect` in `frame`.
    fn start(&mut self, frame: &GrayImage, rect: Rect);
    /// Advance one frame. `None` means the target was lost.
    fn update(&mut self, frame: &GrayImage) -> Option<Rect>;
    /// Last reported position.
    fn position(&self) -> Option<Rect>;
}

impl<T: Tracker + ?Sized> Tracker for Box<T> {
    fn start(&mut self, frame: &GrayImage, rect: Rect) {
        (**self).start(frame, rect)
    }
    fn update(&mut self, frame: &GrayImage) -> Option<Rect> {
        (**self).update(frame)
    }
    fn position(&self) -> Option<Rect> {
        (**self).position()
    }
}

/// Produces a fresh tracker for every session start.
pub trait TrackerFactory {
    type Tracker: Tracker;
    fn create(&mut self) -> Self::Tracker;
}

impl<F, T> TrackerFactory for F
where
    F: FnMut() -> T,
    T: Tracker,
{
    type Tracker = T;
    fn create(&mut self) -> T {
        self()
    }
}

/// Outcome of one [`TrackingSession::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackEvent {
    /// No session running.
    Inactive,
    /// The tracker followed the target; frame it.
    Tracked(Rect),
    /// The target was lost and a new tracker now follows this blob. Framing
    /// resumes on the next frame.
    Reacquired(Rect),
    /// Lost and nothing to reacquire; retry next frame.
    Lost,
}

enum SessionState<T> {
    Inactive,
    Active {
        tracker: T,
        prev_roi: Option<Rect>,
        lost_frames: u32,
    },
}

pub struct TrackingSession<F: TrackerFactory, R> {
    factory: F,
    reacquirer: R,
    state: SessionState<F::Tracker>,
}

impl<F: TrackerFactory, R: Reacquirer> TrackingSession<F, R> {
    pub fn new(factory: F, reacquirer: R) -> Self {
        Self {
            factory,
            reacquirer,
            state: SessionState::Inactive,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Active { .. })
    }

    /// Smoothing history; `None` right after any (re)start.
    pub fn prev_roi(&self) -> Option<Rect> {
        match self.state {
            SessionState::Active { prev_roi, .. } => prev_roi,
            SessionState::Inactive => None,
        }
    }

    /// Start following `rect`, discarding any previous tracker.
    pub fn start(&mut self, frame: &GrayImage, rect: Rect) {
        let mut tracker = self.factory.create();
        tracker.start(frame, rect);
        info!(%rect, "tracking started");
        self.state = SessionState::Active {
            tracker,
            prev_roi: None,
            lost_frames: 0,
        };
    }

    /// Drop the tracker and the smoothing history.
    pub fn stop(&mut self) {
        if self.is_active() {
            info!("tracking stopped");
        }
        self.state = SessionState::Inactive;
    }

    /// Advance the session by one frame, reacquiring on loss.
    pub fn update(&mut self, frame: &GrayImage) -> TrackEvent {
        let SessionState::Active {
            tracker,
            lost_frames,
            ..
        } = &mut self.state
        else {
            return TrackEvent::Inactive;
        };

        match tracker.update(frame) {
            Some(rect) if !rect.is_degenerate() => {
                *lost_frames = 0;
                return TrackEvent::Tracked(rect);
            }
            Some(rect) => debug!(%rect, "tracker reported a degenerate box; treating as lost"),
            None => debug!("tracker lost target"),
        }

        *lost_frames += 1;
        let lost_frames = *lost_frames;
        match self.reacquirer.largest_bounding_box(frame) {
            Some(rect) if !rect.is_degenerate() => {
                info!(%rect, lost_frames, "target reacquired");
                self.start(frame, rect);
                TrackEvent::Reacquired(rect)
            }
            _ => {
                debug!(lost_frames, "reacquisition found nothing");
                TrackEvent::Lost
            }
        }
    }

    /// Smooth a tracked box against the session history and record the
    /// result as the new history. Returns the input unchanged when inactive.
    pub fn smooth(&mut self, raw: Rect, alpha: f64) -> Rect {
        match &mut self.state {
            SessionState::Active { prev_roi, .. } => {
                let out = smooth(raw, *prev_roi, alpha);
                *prev_roi = Some(out);
                out
            }
            SessionState::Inactive => raw,
        }
    }
}
