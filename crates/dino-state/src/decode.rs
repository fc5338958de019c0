//! Defensive decoding of the state buffer.
//!
//! Validation is split in two tiers with different outcomes:
//!
//! - **Header tier**: a declared obstacle count or implied total length outside
//!   [`DecodeLimits`], or a buffer too short to hold the header, means the
//!   handle itself is stale or misread. The whole frame is rejected.
//! - **Trailer tier**: a declared count that overstates the readable records
//!   is clamped, and non-finite or non-positive obstacle fields are replaced.
//!   The frame is still returned and the repairs are reported in [`Repairs`].

use std::ops::Deref;

use thiserror::Error;

use crate::layout::{
    ACTOR_AIRBORNE, ACTOR_DESTROYED, ACTOR_HEIGHT, ACTOR_WIDTH, ACTOR_X, ACTOR_Y, CELL_SIZE,
    CellSource, GROUND_OFFSET, HEADER_CELLS, HIGH_SCORE, OBSTACLE_COUNT, RECORD_CELLS,
    RECORD_HEIGHT, RECORD_KIND, RECORD_WIDTH, RECORD_X, RECORD_Y, SCORE, SPEED, StateHandle, flag,
};
use crate::snapshot::{Actor, Obstacle, ObstacleKind, Snapshot};

/// Default ceiling on the declared obstacle count.
pub const DEFAULT_MAX_OBSTACLES: usize = 100;

/// Default ceiling on the total number of cells read for one frame.
pub const DEFAULT_MAX_TOTAL_CELLS: usize = 1000;

/// Substituted for obstacle sizes that are non-finite or not positive.
pub const SIZE_SENTINEL: f32 = 1.0;

/// Header-tier rejection reasons.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("obstacle count cell is not finite")]
    NonFiniteCount,

    #[error("negative obstacle count: {0}")]
    NegativeCount(i64),

    #[error("too many obstacles: {count} (max {max})")]
    TooManyObstacles { count: usize, max: usize },

    #[error("total length {total} out of range (max {max})")]
    TotalLengthOutOfRange { total: usize, max: usize },

    #[error("buffer too short for header: {len} cells")]
    HeaderTruncated { len: usize },
}

impl DecodeError {
    /// Short label for metrics.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::NonFiniteCount => "non_finite_count",
            Self::NegativeCount(_) => "negative_count",
            Self::TooManyObstacles { .. } => "too_many_obstacles",
            Self::TotalLengthOutOfRange { .. } => "total_length",
            Self::HeaderTruncated { .. } => "header_truncated",
        }
    }
}

/// Hard ceilings for the header tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodeLimits {
    pub max_obstacles: usize,
    pub max_total_cells: usize,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_obstacles: DEFAULT_MAX_OBSTACLES,
            max_total_cells: DEFAULT_MAX_TOTAL_CELLS,
        }
    }
}

impl DecodeLimits {
    /// Validate the raw count cell and truncate it toward zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the cell is not finite, negative after truncation,
    /// or above `max_obstacles`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn check_count(&self, raw: f32) -> Result<usize, DecodeError> {
        if !raw.is_finite() {
            return Err(DecodeError::NonFiniteCount);
        }
        // Saturating float-to-int cast.
        let count = raw.trunc() as i64;
        if count < 0 {
            return Err(DecodeError::NegativeCount(count));
        }
        let count = count as u64;
        if count > self.max_obstacles as u64 {
            return Err(DecodeError::TooManyObstacles {
                count: usize::try_from(count).unwrap_or(usize::MAX),
                max: self.max_obstacles,
            });
        }
        Ok(count as usize)
    }

    /// Validate the total cell count implied by a header.
    ///
    /// # Errors
    ///
    /// Returns an error if `total` is zero or above `max_total_cells`.
    pub const fn check_total(&self, total: usize) -> Result<usize, DecodeError> {
        if total == 0 || total > self.max_total_cells {
            return Err(DecodeError::TotalLengthOutOfRange {
                total,
                max: self.max_total_cells,
            });
        }
        Ok(total)
    }

    /// Total cells for `count` obstacles, validated.
    ///
    /// # Errors
    ///
    /// Returns an error if the total overflows or is out of range.
    pub fn total_cells(&self, count: usize) -> Result<usize, DecodeError> {
        let total = count
            .checked_mul(RECORD_CELLS)
            .and_then(|n| n.checked_add(HEADER_CELLS))
            .unwrap_or(usize::MAX);
        self.check_total(total)
    }
}

/// Trailer-tier repairs applied while decoding one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Repairs {
    /// Declared count, when fewer records than declared were readable.
    pub truncated_from: Option<usize>,
    /// Obstacle fields replaced by a default.
    pub fields: usize,
}

impl Repairs {
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.truncated_from.is_none() && self.fields == 0
    }
}

/// A decoded frame and what had to be repaired to produce it.
#[derive(Clone, Debug, PartialEq)]
pub struct Decoded {
    pub snapshot: Snapshot,
    pub repairs: Repairs,
}

/// Host-side copy of the cells being decoded.
///
/// Holds memory only for the duration of one decode: cells live inside a
/// [`Staged`] guard, which frees the allocation when dropped.
#[derive(Debug, Default)]
pub struct StagingBuffer {
    cells: Vec<f32>,
}

impl StagingBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy up to `len` cells from `source`, stopping at the first unreadable one.
    pub fn stage(&mut self, source: &impl CellSource, handle: StateHandle, len: usize) -> Staged<'_> {
        self.cells.clear();
        self.cells.reserve(len);
        for i in 0..len {
            match source.read_cell(handle, i * CELL_SIZE) {
                Some(cell) => self.cells.push(cell),
                None => break,
            }
        }
        Staged {
            cells: &mut self.cells,
        }
    }

    /// Number of staged cells. Zero whenever no decode is in progress.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Bytes held by the buffer. Zero outside a decode.
    #[must_use]
    pub fn capacity_bytes(&self) -> usize {
        self.cells.capacity() * CELL_SIZE
    }
}

/// Cells staged for one decode. Freed on drop.
pub struct Staged<'a> {
    cells: &'a mut Vec<f32>,
}

impl Deref for Staged<'_> {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        self.cells
    }
}

impl Drop for Staged<'_> {
    fn drop(&mut self) {
        *self.cells = Vec::new();
    }
}

/// Decode the frame at `handle`.
///
/// The declared count is read straight from the source, then exactly the
/// implied number of cells is copied into `staging` and everything else is
/// decoded from that copy, so a producer mutating its buffer mid-read cannot
/// tear individual fields.
///
/// # Errors
///
/// Returns a header-tier [`DecodeError`]; trailer problems are repaired.
pub fn decode(
    source: &impl CellSource,
    handle: StateHandle,
    limits: &DecodeLimits,
    staging: &mut StagingBuffer,
) -> Result<Decoded, DecodeError> {
    let raw_count = source
        .read_cell(handle, OBSTACLE_COUNT * CELL_SIZE)
        .ok_or(DecodeError::HeaderTruncated { len: 0 })?;
    let count = limits.check_count(raw_count)?;
    let total = limits.total_cells(count)?;

    let cells = staging.stage(source, handle, total);
    decode_cells(&cells, count)
}

/// Decode already-copied cells given a validated declared count.
///
/// Non-finite positions are replaced with `0.0` for the actor as well as for
/// obstacles, so a header carrying NaN coordinates does not round-trip
/// through [`encode`](crate::encode) unchanged. Actor sizes are passed
/// through as read.
///
/// # Errors
///
/// Returns [`DecodeError::HeaderTruncated`] if `cells` cannot hold the header.
pub fn decode_cells(cells: &[f32], declared: usize) -> Result<Decoded, DecodeError> {
    if cells.len() < HEADER_CELLS {
        return Err(DecodeError::HeaderTruncated { len: cells.len() });
    }

    let mut repairs = Repairs::default();
    let mut snapshot = Snapshot {
        actor: Actor {
            x: position(cells[ACTOR_X], &mut repairs),
            y: position(cells[ACTOR_Y], &mut repairs),
            width: cells[ACTOR_WIDTH],
            height: cells[ACTOR_HEIGHT],
            is_airborne: flag(cells[ACTOR_AIRBORNE]),
            is_destroyed: flag(cells[ACTOR_DESTROYED]),
        },
        ground_offset: cells[GROUND_OFFSET],
        speed: cells[SPEED],
        score: cells[SCORE],
        high_score: cells[HIGH_SCORE],
        obstacles: Vec::new(),
    };

    let trailer = &cells[HEADER_CELLS..];
    let mut count = declared;
    if trailer.len() < declared.saturating_mul(RECORD_CELLS) {
        count = trailer.len() / RECORD_CELLS;
        repairs.truncated_from = Some(declared);
    }

    snapshot.obstacles = trailer
        .chunks_exact(RECORD_CELLS)
        .take(count)
        .map(|record| Obstacle {
            x: position(record[RECORD_X], &mut repairs),
            y: position(record[RECORD_Y], &mut repairs),
            width: size(record[RECORD_WIDTH], &mut repairs),
            height: size(record[RECORD_HEIGHT], &mut repairs),
            kind: ObstacleKind::from_flag(record[RECORD_KIND]),
        })
        .collect();

    Ok(Decoded { snapshot, repairs })
}

fn position(cell: f32, repairs: &mut Repairs) -> f32 {
    if cell.is_finite() {
        cell
    } else {
        repairs.fields += 1;
        0.0
    }
}

fn size(cell: f32, repairs: &mut Repairs) -> f32 {
    if cell.is_finite() && cell > 0.0 {
        cell
    } else {
        repairs.fields += 1;
        SIZE_SENTINEL
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::layout::{StateWriter, record_cell};

    const BASE: usize = 0x4000;

    /// Cells laid out at `BASE`; anything past the end is unreadable.
    struct Cells {
        cells: Vec<f32>,
        reads: Cell<usize>,
    }

    impl Cells {
        fn new(cells: Vec<f32>) -> Self {
            Self {
                cells,
                reads: Cell::new(0),
            }
        }
    }

    impl CellSource for Cells {
        fn read_cell(&self, handle: StateHandle, byte_offset: usize) -> Option<f32> {
            self.reads.set(self.reads.get() + 1);
            let index = (handle.addr() - BASE + byte_offset) / CELL_SIZE;
            self.cells.get(index).copied()
        }
    }

    fn handle() -> StateHandle {
        StateHandle::new(BASE).unwrap()
    }

    fn header(count: f32) -> Vec<f32> {
        vec![10.0, 50.0, 89.0, 94.0, 0.0, 0.0, 3.0, 13.0, 120.0, 300.0, count]
    }

    fn run(cells: Vec<f32>) -> Result<Decoded, DecodeError> {
        let source = Cells::new(cells);
        let mut staging = StagingBuffer::new();
        let result = decode(&source, handle(), &DecodeLimits::default(), &mut staging);
        assert_eq!(staging.capacity_bytes(), 0, "staging must be freed after decode");
        result
    }

    #[test]
    fn test_scenario_one_small_obstacle() {
        let cells = vec![
            10.0, 50.0, 89.0, 94.0, 0.0, 0.0, 3.0, 13.0, 120.0, 300.0, 1.0, 200.0, 600.0, 34.0,
            70.0, 1.0,
        ];
        let decoded = run(cells).unwrap();
        let s = &decoded.snapshot;
        assert_eq!(
            s.actor,
            Actor {
                x: 10.0,
                y: 50.0,
                width: 89.0,
                height: 94.0,
                is_airborne: false,
                is_destroyed: false,
            }
        );
        assert_eq!(s.ground_offset, 3.0);
        assert_eq!(s.speed, 13.0);
        assert_eq!(s.score, 120.0);
        assert_eq!(s.high_score, 300.0);
        assert_eq!(
            s.obstacles,
            vec![Obstacle {
                x: 200.0,
                y: 600.0,
                width: 34.0,
                height: 70.0,
                kind: ObstacleKind::Small,
            }]
        );
        assert!(decoded.repairs.is_clean());
    }

    #[test]
    fn test_empty_trailer_keeps_header_fields() {
        let decoded = run(header(0.0)).unwrap();
        let s = &decoded.snapshot;
        assert!(s.obstacles.is_empty());
        assert_eq!((s.actor.x, s.actor.y, s.actor.width, s.actor.height), (10.0, 50.0, 89.0, 94.0));
        assert_eq!((s.ground_offset, s.speed, s.score, s.high_score), (3.0, 13.0, 120.0, 300.0));
    }

    #[test]
    fn test_exact_length_for_every_count() {
        for count in 0..=DEFAULT_MAX_OBSTACLES {
            let mut cells = header(count as f32);
            for i in 0..count {
                let i = i as f32;
                cells.extend_from_slice(&[i, i + 1.0, 34.0, 70.0, 0.0]);
            }
            let decoded = run(cells).unwrap();
            assert_eq!(decoded.snapshot.obstacles.len(), count);
            if let Some(last) = decoded.snapshot.obstacles.last() {
                assert_eq!(last.x, (count - 1) as f32);
                assert_eq!(last.kind, ObstacleKind::Large);
            }
        }
    }

    #[test]
    fn test_count_truncated_toward_zero() {
        let cells = StateWriter::new()
            .raw(&header(1.9))
            .raw(&[1.0, 2.0, 3.0, 4.0, 0.0])
            .finish();
        assert_eq!(run(cells).unwrap().snapshot.obstacles.len(), 1);
        // -0.5 truncates to zero rather than flooring to -1.
        assert!(run(header(-0.5)).unwrap().snapshot.obstacles.is_empty());
    }

    #[test]
    fn test_rejects_corrupt_count() {
        assert_eq!(run(header(-1.0)), Err(DecodeError::NegativeCount(-1)));
        assert_eq!(
            run(header(150.0)),
            Err(DecodeError::TooManyObstacles { count: 150, max: 100 })
        );
        assert_eq!(run(header(f32::NAN)), Err(DecodeError::NonFiniteCount));
        assert_eq!(run(header(f32::INFINITY)), Err(DecodeError::NonFiniteCount));
        assert!(run(header(1e30)).unwrap_err().to_string().contains("too many"));
    }

    #[test]
    fn test_rejects_total_length_out_of_range() {
        let limits = DecodeLimits::default();
        assert_eq!(
            limits.check_total(0),
            Err(DecodeError::TotalLengthOutOfRange { total: 0, max: 1000 })
        );
        assert_eq!(
            limits.check_total(1200),
            Err(DecodeError::TotalLengthOutOfRange { total: 1200, max: 1000 })
        );
        assert_eq!(limits.check_total(1000), Ok(1000));

        // A count below the obstacle ceiling can still imply too many cells.
        let loose = DecodeLimits {
            max_obstacles: 500,
            ..DecodeLimits::default()
        };
        let source = Cells::new(header(240.0));
        let mut staging = StagingBuffer::new();
        assert_eq!(
            decode(&source, handle(), &loose, &mut staging),
            Err(DecodeError::TotalLengthOutOfRange { total: 1211, max: 1000 })
        );
        // Rejected before anything but the count cell was read.
        assert_eq!(source.reads.get(), 1);
    }

    #[test]
    fn test_header_truncated() {
        assert_eq!(run(vec![]), Err(DecodeError::HeaderTruncated { len: 0 }));
        // Count cell readable but cell 3 onward is not.
        let source = Cells::new(vec![0.0; 3]);
        assert!(matches!(
            decode_cells(&source.cells, 0),
            Err(DecodeError::HeaderTruncated { len: 3 })
        ));
    }

    #[test]
    fn test_truncated_trailer_is_clamped() {
        // Declares 10 obstacles but only 6 trailer cells follow.
        let cells = StateWriter::new()
            .raw(&header(10.0))
            .raw(&[200.0, 600.0, 34.0, 70.0, 1.0, 999.0])
            .finish();
        let decoded = run(cells).unwrap();
        assert_eq!(decoded.snapshot.obstacles.len(), 1);
        assert_eq!(decoded.repairs.truncated_from, Some(10));

        // Six full records under a declared ten.
        let mut cells = header(10.0);
        for _ in 0..6 {
            cells.extend_from_slice(&[1.0, 2.0, 3.0, 4.0, 0.0]);
        }
        let decoded = run(cells).unwrap();
        assert_eq!(decoded.snapshot.obstacles.len(), 6);
        assert_eq!(decoded.repairs.truncated_from, Some(10));
    }

    #[test]
    fn test_substitutes_invalid_obstacle_fields() {
        let cells = StateWriter::new()
            .raw(&header(3.0))
            .raw(&[f32::INFINITY, f32::NAN, f32::NAN, 70.0, 0.6])
            .raw(&[5.0, 6.0, 0.0, -4.0, 0.3])
            .raw(&[7.0, 8.0, f32::NEG_INFINITY, 2.5, 0.5])
            .finish();
        let decoded = run(cells).unwrap();
        let o = &decoded.snapshot.obstacles;
        assert_eq!((o[0].x, o[0].y, o[0].width, o[0].height), (0.0, 0.0, 1.0, 70.0));
        assert_eq!(o[0].kind, ObstacleKind::Small);
        assert_eq!((o[1].width, o[1].height), (1.0, 1.0));
        assert_eq!(o[1].kind, ObstacleKind::Large);
        assert_eq!((o[2].width, o[2].height), (1.0, 2.5));
        assert_eq!(o[2].kind, ObstacleKind::Large);
        assert_eq!(decoded.repairs.fields, 6);
        assert!(o.iter().all(|o| o.width.is_finite() && o.width > 0.0));
    }

    #[test]
    fn test_actor_position_defaults_to_zero() {
        let mut cells = header(0.0);
        cells[ACTOR_X] = f32::NAN;
        cells[ACTOR_Y] = f32::NEG_INFINITY;
        cells[ACTOR_WIDTH] = -5.0;
        let decoded = run(cells.clone()).unwrap();
        assert_eq!((decoded.snapshot.actor.x, decoded.snapshot.actor.y), (0.0, 0.0));
        // Actor sizes are not repaired.
        assert_eq!(decoded.snapshot.actor.width, -5.0);
        assert_eq!(decoded.repairs.fields, 2);

        // Re-encoding yields the repaired header, not the original one.
        let encoded = crate::encode(&decoded.snapshot);
        assert_eq!((encoded[ACTOR_X], encoded[ACTOR_Y]), (0.0, 0.0));
        assert_eq!(encoded[ACTOR_HEIGHT..], cells[ACTOR_HEIGHT..]);
    }

    #[test]
    fn test_reads_only_declared_cells() {
        let mut cells = header(1.0);
        cells.extend_from_slice(&[1.0, 2.0, 3.0, 4.0, 1.0]);
        // Trailing garbage past the declared record.
        cells.extend_from_slice(&[f32::NAN; 20]);
        let source = Cells::new(cells);
        let mut staging = StagingBuffer::new();
        let decoded = decode(&source, handle(), &DecodeLimits::default(), &mut staging).unwrap();
        assert_eq!(decoded.snapshot.obstacles.len(), 1);
        // One count probe plus 16 staged cells.
        assert_eq!(source.reads.get(), 1 + record_cell(1, 0));
    }

    #[test]
    fn test_staging_freed_on_every_exit() {
        let mut staging = StagingBuffer::new();
        let limits = DecodeLimits::default();

        let source = Cells::new(header(0.0));
        {
            let staged = staging.stage(&source, handle(), HEADER_CELLS);
            assert_eq!(staged.len(), HEADER_CELLS);
        }
        assert_eq!(staging.capacity_bytes(), 0);

        decode(&source, handle(), &limits, &mut staging).unwrap();
        assert_eq!(staging.capacity_bytes(), 0);

        // Rejected before staging.
        let source = Cells::new(header(-1.0));
        assert!(decode(&source, handle(), &limits, &mut staging).is_err());
        assert_eq!(staging.capacity_bytes(), 0);

        // Clamped trailer.
        let mut cells = header(4.0);
        cells.extend_from_slice(&[1.0, 2.0, 3.0, 4.0, 1.0, 9.0]);
        let source = Cells::new(cells);
        let decoded = decode(&source, handle(), &limits, &mut staging).unwrap();
        assert_eq!(decoded.repairs.truncated_from, Some(4));
        assert_eq!(staging.capacity_bytes(), 0);
    }
}
