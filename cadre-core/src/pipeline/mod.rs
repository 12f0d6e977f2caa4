//! pipeline — the per-frame control loop
//!
//! ```text
//! frame ─► controls ─► selection (idle) ─┐
//!                    └► tracking (active) ┴► smoothing ─► framing ─► crop ─► sink
//! ```
//!
//! [`Assistant`] holds all mutable state and is driven one frame at a time;
//! [`run`] wires it between a [`FrameSource`] and a [`DisplaySink`].

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use image::GrayImage;
use tracing::{debug, info, warn};

use crate::control::{ControlEvent, ControlSource};
use crate::detection::Reacquirer;
use crate::framing::{compose, FramingConfig, VerticalBias};
use crate::geometry::Rect;
use crate::rendering::{FrameRenderer, Overlays};
use crate::selection::Selection;
use crate::tracking::{TrackEvent, TrackerFactory, TrackingSession};
use crate::video::{to_luma, DisplaySink, FrameSource};

/// Frames between timing log lines.
const PROFILE_INTERVAL: u64 = 300;

/// What happened on one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    pub index: u64,
    /// Live drag rectangle while the operator is drawing.
    pub selection: Option<Rect>,
    /// Raw tracker output.
    pub subject: Option<Rect>,
    /// Position-smoothed subject fed to the framer.
    pub smoothed: Option<Rect>,
    /// Composed crop window.
    pub crop: Option<Rect>,
    pub track: TrackEvent,
    /// A selection was committed this frame and tracking started on it.
    pub started: Option<Rect>,
}

impl FrameReport {
    fn empty(index: u64, track: TrackEvent) -> Self {
        Self {
            index,
            selection: None,
            subject: None,
            smoothed: None,
            crop: None,
            track,
            started: None,
        }
    }

    pub fn overlays(&self) -> Overlays {
        Overlays {
            selection: self.selection,
            subject: self.subject,
            crop: self.crop,
        }
    }
}

pub struct Assistant<F: TrackerFactory, R: Reacquirer> {
    config: FramingConfig,
    bias: VerticalBias,
    selection: Selection,
    session: TrackingSession<F, R>,
    quit: bool,
    frame_index: u64,
}

impl<F: TrackerFactory, R: Reacquirer> Assistant<F, R> {
    pub fn new(config: FramingConfig, bias: VerticalBias, session: TrackingSession<F, R>) -> Self {
        Self {
            config,
            bias,
            selection: Selection::Idle,
            session,
            quit: false,
            frame_index: 0,
        }
    }

    pub fn config(&self) -> &FramingConfig {
        &self.config
    }

    pub fn bias(&self) -> VerticalBias {
        self.bias
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn is_tracking(&self) -> bool {
        self.session.is_active()
    }

    pub fn quit_requested(&self) -> bool {
        self.quit
    }

    /// Index of the next frame [`Assistant::process`] will handle.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Apply one operator event. Runs to completion between frames.
    pub fn handle(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::Pointer(pointer) => {
                let transition = self.selection.apply(pointer, self.session.is_active());
                self.selection = transition.next;
                if transition.cancel_tracking {
                    self.session.stop();
                }
            }
            ControlEvent::Bias(position) => {
                self.bias = VerticalBias::from_slider(position);
                debug!(bias = self.bias.value(), "vertical bias changed");
            }
            ControlEvent::Quit => {
                info!(frame = self.frame_index, "quit requested");
                self.quit = true;
            }
        }
    }

    /// Run selection or tracking, smoothing and framing for one frame.
    pub fn process(&mut self, frame_width: u32, frame_height: u32, luma: &GrayImage) -> FrameReport {
        let index = self.frame_index;
        self.frame_index += 1;

        if !self.session.is_active() {
            let mut report = FrameReport::empty(index, TrackEvent::Inactive);
            report.selection = self.selection.preview();
            if self.selection.is_committed() {
                let (next, roi) = self.selection.take_commit(self.config.min_selection);
                self.selection = next;
                if let Some(roi) = roi {
                    self.session.start(luma, roi);
                    report.started = Some(roi);
                }
            }
            return report;
        }

        match self.session.update(luma) {
            TrackEvent::Tracked(raw) => {
                let smoothed = self.session.smooth(raw, self.config.alpha);
                let crop = compose(
                    frame_width,
                    frame_height,
                    smoothed,
                    self.bias,
                    &self.config.params,
                );
                FrameReport {
                    subject: Some(raw),
                    smoothed: Some(smoothed),
                    crop: Some(crop),
                    ..FrameReport::empty(index, TrackEvent::Tracked(raw))
                }
            }
            other => FrameReport::empty(index, other),
        }
    }
}

/// Totals for one [`run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub tracked: u64,
    pub reacquired: u64,
    pub lost: u64,
    pub sessions_started: u64,
    pub quit: bool,
}

impl RunSummary {
    fn record(&mut self, report: &FrameReport) {
        self.frames += 1;
        match report.track {
            TrackEvent::Tracked(_) => self.tracked += 1,
            TrackEvent::Reacquired(_) => self.reacquired += 1,
            TrackEvent::Lost => self.lost += 1,
            TrackEvent::Inactive => {}
        }
        if report.started.is_some() {
            self.sessions_started += 1;
        }
    }
}

#[derive(Default)]
struct Timings {
    frames: u64,
    analyze: Duration,
    render: Duration,
}

impl Timings {
    fn tick(&mut self) {
        self.frames += 1;
        if self.frames % PROFILE_INTERVAL == 0 {
            let per_frame = |d: Duration| format!("{:.2}", d.as_secs_f64() * 1000.0 / self.frames as f64);
            info!(
                frames = self.frames,
                analyze_ms_per_frame = per_frame(self.analyze),
                render_ms_per_frame = per_frame(self.render),
                "pipeline timings"
            );
        }
    }
}

/// Drive `assistant` over every frame of `source` until end of stream or quit.
///
/// Failing to obtain the first frame is fatal. Later read failures end the
/// run as if the stream had ended. `on_frame` sees every report after the
/// frame has been shown.
pub fn run<F, R, S, K, C>(
    assistant: &mut Assistant<F, R>,
    source: &mut S,
    sink: &mut K,
    controls: &mut C,
    mut on_frame: impl FnMut(&FrameReport),
) -> Result<RunSummary>
where
    F: TrackerFactory,
    R: Reacquirer,
    S: FrameSource,
    K: DisplaySink,
    C: ControlSource,
{
    let mut frame = source
        .read()
        .context("video source unavailable")?
        .context("video source produced no frames")?;

    let (crop_w, crop_h) = assistant
        .config()
        .output_size(frame.width, frame.height)
        .context("framing configuration does not suit this source")?;
    info!(
        width = frame.width,
        height = frame.height,
        crop_w,
        crop_h,
        "framing started"
    );

    let mut renderer = FrameRenderer::new();
    let mut summary = RunSummary::default();
    let mut timings = Timings::default();

    loop {
        for event in controls.poll(assistant.frame_index()) {
            assistant.handle(event);
        }
        if assistant.quit_requested() {
            summary.quit = true;
            break;
        }

        let analyze_start = Instant::now();
        let luma = to_luma(&frame)?;
        let report = assistant.process(frame.width, frame.height, &luma);
        timings.analyze += analyze_start.elapsed();

        let render_start = Instant::now();
        let crop = match report.crop {
            Some(window) => renderer.crop(&frame, window)?,
            None => renderer.letterbox(&frame, crop_w as u32, crop_h as u32)?,
        };
        renderer.annotate(&mut frame, &report.overlays())?;
        timings.render += render_start.elapsed();

        sink.show(&frame, &crop)?;
        summary.record(&report);
        timings.tick();
        on_frame(&report);

        frame = match source.read() {
            Ok(Some(next)) => next,
            Ok(None) => break,
            Err(e) => {
                warn!("frame read failed; treating as end of stream: {e:#}");
                break;
            }
        };
    }

    sink.finish()?;
    info!(
        frames = summary.frames,
        tracked = summary.tracked,
        reacquired = summary.reacquired,
        lost = summary.lost,
        "framing finished"
    );
    Ok(summary)
}
