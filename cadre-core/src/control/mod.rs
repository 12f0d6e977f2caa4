//! control — operator input delivered between frames
//!
//! Pointer events, the vertical-bias slider and the quit key arrive through a
//! [`ControlSource`] that the frame loop polls once per frame. Events for a
//! frame are applied in order before that frame is framed.
//!
//! [`ControlScript`] replays a recorded session from a text file:
//!
//! ```text
//! # frame  event    args
//! 0        press    10 10
//! 3        move     100 100
//! 4        release  100 100
//! 120      bias     70
//! 300      quit
//! ```

use std::collections::VecDeque;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::geometry::{Point, Rect};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEvent {
    Press(Point),
    Move(Point),
    Release(Point),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    Pointer(PointerEvent),
    /// Slider position `0..=100`.
    Bias(u8),
    Quit,
}

/// Anything that can deliver operator input to the frame loop.
pub trait ControlSource {
    /// Drain the events due before frame `frame_index` is processed.
    fn poll(&mut self, frame_index: u64) -> Vec<ControlEvent>;
}

/// No operator present.
impl ControlSource for () {
    fn poll(&mut self, _frame_index: u64) -> Vec<ControlEvent> {
        Vec::new()
    }
}

/// Time-stamped events replayed in frame order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlScript {
    events: VecDeque<(u64, ControlEvent)>,
}

impl ControlScript {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read control script: {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid control script: {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut events = Vec::new();
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            let entry = parse_line(line).with_context(|| format!("line {}: {raw:?}", lineno + 1))?;
            events.push(entry);
        }
        // Stable: same-frame events keep file order.
        events.sort_by_key(|(frame, _)| *frame);
        Ok(Self {
            events: events.into(),
        })
    }

    /// A press–drag–release sequence drawing `roi` at frame `at`.
    pub fn select(roi: Rect, at: u64) -> Self {
        let start = Point::new(roi.x, roi.y);
        let end = Point::new(roi.right(), roi.bottom());
        Self {
            events: VecDeque::from([
                (at, ControlEvent::Pointer(PointerEvent::Press(start))),
                (at, ControlEvent::Pointer(PointerEvent::Move(end))),
                (at, ControlEvent::Pointer(PointerEvent::Release(end))),
            ]),
        }
    }

    /// Quit before frame `at` is processed.
    pub fn quit_at(at: u64) -> Self {
        Self {
            events: VecDeque::from([(at, ControlEvent::Quit)]),
        }
    }

    /// Merge another script, keeping frame order.
    pub fn merge(mut self, other: ControlScript) -> Self {
        let mut all: Vec<_> = self.events.drain(..).chain(other.events).collect();
        all.sort_by_key(|(frame, _)| *frame);
        self.events = all.into();
        self
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl ControlSource for ControlScript {
    fn poll(&mut self, frame_index: u64) -> Vec<ControlEvent> {
        let mut due = Vec::new();
        while let Some((frame, _)) = self.events.front() {
            if *frame > frame_index {
                break;
            }
            if let Some((_, event)) = self.events.pop_front() {
                due.push(event);
            }
        }
        due
    }
}

fn parse_line(line: &str) -> Result<(u64, ControlEvent)> {
    let mut fields = line.split_whitespace();
    let frame: u64 = fields
        .next()
        .context("missing frame index")?
        .parse()
        .context("frame index must be a non-negative integer")?;
    let kind = fields.next().context("missing event name")?;
    let args: Vec<&str> = fields.collect();

    let point = |args: &[&str]| -> Result<Point> {
        match args {
            [x, y] => Ok(Point::new(
                x.parse().context("bad x coordinate")?,
                y.parse().context("bad y coordinate")?,
            )),
            _ => bail!("expected two coordinates, got {}", args.len()),
        }
    };

    let event = match kind.to_ascii_lowercase().as_str() {
        "press" => ControlEvent::Pointer(PointerEvent::Press(point(&args)?)),
        "move" => ControlEvent::Pointer(PointerEvent::Move(point(&args)?)),
        "release" => ControlEvent::Pointer(PointerEvent::Release(point(&args)?)),
        "bias" => {
            let [value] = args[..] else {
                bail!("bias takes exactly one value");
            };
            let value: u8 = value.parse().context("bias must be an integer 0-100")?;
            if value > 100 {
                bail!("bias must be within 0-100, got {value}");
            }
            ControlEvent::Bias(value)
        }
        "quit" => {
            if !args.is_empty() {
                bail!("quit takes no arguments");
            }
            ControlEvent::Quit
        }
        other => bail!("unknown event {other:?}"),
    };

    Ok((frame, event))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# warm-up
0 press 10 10
3 move 100 100   # drag
4 release 100 100
4 bias 70

300 QUIT
";

    #[test]
    fn parses_and_polls_in_frame_order() {
        let mut script = ControlScript::parse(SAMPLE).unwrap();
        assert_eq!(script.len(), 5);

        assert_eq!(
            script.poll(0),
            vec![ControlEvent::Pointer(PointerEvent::Press(Point::new(10, 10)))]
        );
        assert!(script.poll(1).is_empty());
        // Skipped frames deliver everything that is due.
        assert_eq!(
            script.poll(5),
            vec![
                ControlEvent::Pointer(PointerEvent::Move(Point::new(100, 100))),
                ControlEvent::Pointer(PointerEvent::Release(Point::new(100, 100))),
                ControlEvent::Bias(70),
            ]
        );
        assert_eq!(script.poll(300), vec![ControlEvent::Quit]);
        assert!(script.is_empty());
    }

    #[test]
    fn rejects_malformed_lines_with_line_number() {
        for bad in [
            "x press 1 1",
            "0 press 1",
            "0 bias 101",
            "0 bias",
            "0 jump 1 1",
            "0 quit now",
            "0",
        ] {
            let err = ControlScript::parse(bad).unwrap_err();
            assert!(format!("{err:#}").contains("line 1"), "{bad}: {err:#}");
        }
    }

    #[test]
    fn select_builds_a_full_drag() {
        let mut script = ControlScript::select(Rect::new(10, 20, 90, 80), 2);
        assert!(script.poll(1).is_empty());
        assert_eq!(
            script.poll(2),
            vec![
                ControlEvent::Pointer(PointerEvent::Press(Point::new(10, 20))),
                ControlEvent::Pointer(PointerEvent::Move(Point::new(100, 100))),
                ControlEvent::Pointer(PointerEvent::Release(Point::new(100, 100))),
            ]
        );
    }

    #[test]
    fn merge_interleaves_by_frame() {
        let mut merged =
            ControlScript::select(Rect::new(0, 0, 20, 20), 5).merge(ControlScript::quit_at(1));
        assert_eq!(merged.poll(1), vec![ControlEvent::Quit]);
        assert_eq!(merged.poll(5).len(), 3);
    }
}
