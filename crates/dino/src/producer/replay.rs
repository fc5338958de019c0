//! Producer that plays back recorded state buffers.
//!
//! Each frame is hosted in a guarded memory region so the bridge decodes it
//! through the same handle-and-offset path it uses for a native module.
//! Frame files hold one frame per line, cells separated by commas or
//! whitespace. `#` starts a comment and a line reading `null` records a frame
//! where the module returned no buffer.

use std::path::Path;
use std::rc::Rc;

use dino_state::layout::{ACTOR_AIRBORNE, ACTOR_DESTROYED, HIGH_SCORE, SCORE, flag};
use dino_state::{CELL_SIZE, CellSource, GuardedRegion, StateHandle};
use futures::FutureExt;
use futures::future::LocalBoxFuture;
use tracing::{debug, error};

use super::{Loader, Producer};
use crate::BridgeError;

/// Parse a frame file.
///
/// # Errors
///
/// Returns [`BridgeError::InvalidFrame`] for a cell that is not a number.
pub fn parse_frames(text: &str) -> Result<Vec<Vec<f32>>, BridgeError> {
    let mut frames = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("null") {
            frames.push(Vec::new());
            continue;
        }
        let frame = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|cell| !cell.is_empty())
            .map(|cell| {
                cell.parse::<f32>().map_err(|e| BridgeError::InvalidFrame {
                    line: i + 1,
                    reason: format!("{cell:?}: {e}"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        frames.push(frame);
    }
    Ok(frames)
}

/// Render one frame as a frame-file line. An empty frame renders as `null`.
#[must_use]
pub fn format_frame(cells: &[f32]) -> String {
    if cells.is_empty() {
        return "null".to_string();
    }
    cells
        .iter()
        .map(f32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Replays a fixed sequence of frames.
///
/// `start` begins playback and each `step` advances one frame. Playback ends
/// on a frame showing the actor destroyed or on the last frame.
pub struct ReplayProducer {
    frames: Rc<[Vec<f32>]>,
    region: Option<GuardedRegion>,
    cursor: usize,
    playing: bool,
    over: bool,
    high_score: i32,
}

impl ReplayProducer {
    #[must_use]
    pub const fn new(frames: Rc<[Vec<f32>]>) -> Self {
        Self {
            frames,
            region: None,
            cursor: 0,
            playing: false,
            over: false,
            high_score: 0,
        }
    }

    /// Index of the frame currently published.
    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    fn frame(&self) -> &[f32] {
        self.frames.get(self.cursor).map_or(&[][..], Vec::as_slice)
    }

    fn cell(&self, index: usize) -> f32 {
        self.frame().get(index).copied().unwrap_or(0.0)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn int_cell(&self, index: usize) -> i32 {
        let cell = self.cell(index);
        if cell.is_finite() { cell as i32 } else { 0 }
    }

    /// Publish the frame at `cursor` into the region.
    fn publish(&mut self) {
        let frame = self.frames.get(self.cursor).map_or(&[][..], Vec::as_slice);
        if let Some(region) = self.region.as_mut() {
            region.clear();
            // The region is sized for the longest frame.
            if let Err(e) = region.write_cells(0, frame) {
                error!(error = %e, frame = self.cursor, "failed to publish replay frame");
            }
        }
        self.high_score = self
            .high_score
            .max(self.int_cell(SCORE))
            .max(self.int_cell(HIGH_SCORE));
        let last = self.cursor + 1 >= self.frames.len();
        if last || flag(self.cell(ACTOR_DESTROYED)) {
            self.playing = false;
            self.over = true;
        }
    }
}

impl CellSource for ReplayProducer {
    fn read_cell(&self, handle: StateHandle, byte_offset: usize) -> Option<f32> {
        if byte_offset / CELL_SIZE >= self.frame().len() {
            return None;
        }
        self.region.as_ref()?.read_cell(handle, byte_offset)
    }
}

impl Producer for ReplayProducer {
    fn init(&mut self) -> Result<(), BridgeError> {
        if self.frames.is_empty() {
            return Err(BridgeError::InitFailed("no frames to replay".to_string()));
        }
        let cells = self.frames.iter().map(Vec::len).max().unwrap_or(0).max(1);
        self.region = Some(GuardedRegion::with_cells(cells)?);
        debug!(frames = self.frames.len(), cells, "replay region allocated");
        self.cursor = 0;
        self.publish();
        Ok(())
    }

    fn start(&mut self) {
        if !self.over {
            self.playing = true;
        }
    }

    fn step(&mut self, _timestamp_ms: f32) {
        if !self.playing || self.cursor + 1 >= self.frames.len() {
            return;
        }
        self.cursor += 1;
        self.publish();
    }

    fn jump(&mut self) -> i32 {
        i32::from(self.playing && !flag(self.cell(ACTOR_AIRBORNE)))
    }

    fn restart(&mut self) {
        self.cursor = 0;
        self.playing = false;
        self.over = false;
        self.publish();
    }

    fn state_pointer(&mut self) -> Option<StateHandle> {
        if self.frame().is_empty() {
            return None;
        }
        self.region.as_ref().map(GuardedRegion::handle)
    }

    fn is_playing(&self) -> i32 {
        i32::from(self.playing)
    }

    fn is_over(&self) -> i32 {
        i32::from(self.over)
    }

    fn score(&self) -> i32 {
        self.int_cell(SCORE)
    }

    fn high_score(&self) -> i32 {
        self.high_score
    }
}

/// Builds a [`ReplayProducer`] over shared frames.
#[derive(Clone, Debug)]
pub struct ReplayLoader {
    frames: Rc<[Vec<f32>]>,
}

impl ReplayLoader {
    pub fn new(frames: Vec<Vec<f32>>) -> Self {
        Self {
            frames: frames.into(),
        }
    }

    /// Load frames from a frame file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, BridgeError> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::new(parse_frames(&text)?))
    }

    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

impl Loader for ReplayLoader {
    type Producer = ReplayProducer;

    fn acquire(&self) -> LocalBoxFuture<'static, Result<ReplayProducer, BridgeError>> {
        let frames = Rc::clone(&self.frames);
        async move { Ok(ReplayProducer::new(frames)) }.boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use dino_state::{DecodeLimits, StagingBuffer, decode};

    use super::*;

    const FRAMES: &str = "\
# x y w h air dead ground speed score high count
10,50,89,94,0,0,3,13,120,300,1, 200,600,34,70,1
10 40 89 94 1 0 4 13 121 300 0
null
10,50,89,94,0,1,5,13,122,300,0  # crashed
";

    fn producer() -> ReplayProducer {
        let mut p = ReplayProducer::new(parse_frames(FRAMES).unwrap().into());
        p.init().unwrap();
        p
    }

    #[test]
    fn test_parse_frames() {
        let frames = parse_frames(FRAMES).unwrap();
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[0].len(), 16);
        assert_eq!(frames[1][4], 1.0);
        assert!(frames[2].is_empty());
        assert_eq!(frames[3].len(), 11);

        let frames = parse_frames("nan inf -inf 1e3").unwrap();
        assert!(frames[0][0].is_nan());
        assert_eq!(frames[0][1], f32::INFINITY);
        assert_eq!(frames[0][3], 1000.0);
    }

    #[test]
    fn test_format_frame_parses_back() {
        let frames = parse_frames(FRAMES).unwrap();
        let text: Vec<String> = frames.iter().map(|f| format_frame(f)).collect();
        assert_eq!(text[2], "null");
        assert_eq!(parse_frames(&text.join("\n")).unwrap(), frames);

        let odd = vec![f32::INFINITY, -0.5, 1e-3];
        assert_eq!(parse_frames(&format_frame(&odd)).unwrap(), vec![odd]);
        assert!(parse_frames(&format_frame(&[f32::NAN])).unwrap()[0][0].is_nan());
    }

    #[test]
    fn test_parse_frames_error() {
        let err = parse_frames("1,2,3\n4,five,6").unwrap_err();
        assert!(matches!(err, BridgeError::InvalidFrame { line: 2, .. }));
    }

    #[test]
    fn test_init_requires_frames() {
        let mut p = ReplayProducer::new(Vec::<Vec<f32>>::new().into());
        assert!(matches!(p.init(), Err(BridgeError::InitFailed(_))));
        assert!(p.state_pointer().is_none());
    }

    #[test]
    fn test_playback() {
        let mut p = producer();
        assert_eq!(p.is_playing(), 0);
        // Steps are ignored until started.
        p.step(16.0);
        assert_eq!(p.cursor(), 0);
        assert_eq!(p.jump(), 0);

        p.start();
        assert_eq!(p.is_playing(), 1);
        assert_eq!(p.jump(), 1);
        assert_eq!(p.score(), 120);
        assert_eq!(p.high_score(), 300);

        p.step(32.0);
        // Airborne: no second jump.
        assert_eq!(p.jump(), 0);

        p.step(48.0);
        assert!(p.state_pointer().is_none());

        p.step(64.0);
        assert_eq!(p.is_over(), 1);
        assert_eq!(p.is_playing(), 0);
        assert_eq!(p.score(), 122);

        p.restart();
        assert_eq!((p.cursor(), p.is_over(), p.is_playing()), (0, 0, 0));
    }

    #[test]
    fn test_last_frame_ends_playback() {
        let mut p = ReplayProducer::new(parse_frames("0 0 1 1 0 0 0 1 0 0 0").unwrap().into());
        p.init().unwrap();
        assert_eq!(p.is_over(), 1);
        p.start();
        assert_eq!(p.is_playing(), 0);
        p.step(16.0);
        assert_eq!(p.cursor(), 0);

        let mut p = ReplayProducer::new(parse_frames("0 0 1 1 0 0 0 1 0 0 0\n0 0 1 1 0 0 0 1 5 0 0").unwrap().into());
        p.init().unwrap();
        p.start();
        p.step(16.0);
        assert_eq!((p.cursor(), p.is_over(), p.is_playing()), (1, 1, 0));
        assert_eq!(p.score(), 5);
        p.step(32.0);
        assert_eq!(p.cursor(), 1);
    }

    #[test]
    fn test_frame_larger_than_region_degrades() {
        let mut p = producer();
        p.region = Some(GuardedRegion::with_cells(1).unwrap());
        p.restart();

        let handle = p.state_pointer().unwrap();
        assert_eq!(p.read_cell(handle, 0), Some(0.0));
        assert!(p.read_cell(handle, CELL_SIZE).is_none());
        let mut staging = StagingBuffer::new();
        assert_eq!(
            decode(&p, handle, &DecodeLimits::default(), &mut staging).unwrap_err(),
            dino_state::DecodeError::HeaderTruncated { len: 0 }
        );
        // Frame bookkeeping still follows the cells.
        assert_eq!(p.score(), 120);
    }

    #[test]
    fn test_reads_are_bounded_by_frame() {
        let mut p = producer();
        p.start();
        p.step(16.0);
        let handle = p.state_pointer().unwrap();
        // Frame 1 has 11 cells even though the region holds 16.
        assert_eq!(p.read_cell(handle, 10 * CELL_SIZE), Some(0.0));
        assert!(p.read_cell(handle, 11 * CELL_SIZE).is_none());

        let mut staging = StagingBuffer::new();
        let decoded = decode(&p, handle, &DecodeLimits::default(), &mut staging).unwrap();
        assert!(decoded.snapshot.actor.is_airborne);
        assert_eq!(decoded.snapshot.score, 121.0);
    }
}
