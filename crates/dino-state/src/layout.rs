//! Wire layout of the producer's state buffer.
//!
//! The buffer is a flat array of `f32` cells: a fixed 11-cell header followed
//! by 5-cell obstacle records. Booleans and the obstacle kind travel as float
//! magnitudes compared against [`FLAG_THRESHOLD`], which is what the
//! simulation module writes and must stay bit-compatible.

use std::num::NonZeroUsize;

use crate::snapshot::{ObstacleKind, Snapshot};

/// Width of one cell in bytes.
pub const CELL_SIZE: usize = 4;

/// Number of cells in the fixed header.
pub const HEADER_CELLS: usize = 11;

/// Number of cells per obstacle record.
pub const RECORD_CELLS: usize = 5;

/// Flag cells strictly above this value are `true`.
pub const FLAG_THRESHOLD: f32 = 0.5;

// Header offsets (in cells).
pub const ACTOR_X: usize = 0;
pub const ACTOR_Y: usize = 1;
pub const ACTOR_WIDTH: usize = 2;
pub const ACTOR_HEIGHT: usize = 3;
pub const ACTOR_AIRBORNE: usize = 4;
pub const ACTOR_DESTROYED: usize = 5;
pub const GROUND_OFFSET: usize = 6;
pub const SPEED: usize = 7;
pub const SCORE: usize = 8;
pub const HIGH_SCORE: usize = 9;
pub const OBSTACLE_COUNT: usize = 10;

// Record offsets (in cells, relative to the record start).
pub const RECORD_X: usize = 0;
pub const RECORD_Y: usize = 1;
pub const RECORD_WIDTH: usize = 2;
pub const RECORD_HEIGHT: usize = 3;
pub const RECORD_KIND: usize = 4;

/// Interpret a flag cell.
#[must_use]
pub fn flag(cell: f32) -> bool {
    cell > FLAG_THRESHOLD
}

/// Cell index of field `field` in obstacle record `index`.
#[must_use]
pub const fn record_cell(index: usize, field: usize) -> usize {
    HEADER_CELLS + index * RECORD_CELLS + field
}

/// Opaque address of a state buffer inside the producer.
///
/// Never dereferenced by the bridge; only passed back to
/// [`CellSource::read_cell`]. A null pointer from the producer has no handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StateHandle(NonZeroUsize);

impl StateHandle {
    /// Wrap a raw address, `None` for null.
    #[must_use]
    pub const fn new(addr: usize) -> Option<Self> {
        match NonZeroUsize::new(addr) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }

    /// Wrap a raw pointer, `None` for null.
    #[must_use]
    pub fn from_ptr<T>(ptr: *const T) -> Option<Self> {
        Self::new(ptr as usize)
    }

    /// Raw address.
    #[must_use]
    pub const fn addr(self) -> usize {
        self.0.get()
    }
}

/// Readable memory owned by someone else.
///
/// Reads one cell at `byte_offset` past `handle`. Returns `None` when the
/// cell lies outside what the owner can vouch for; the decoder treats that as
/// the end of the buffer.
pub trait CellSource {
    fn read_cell(&self, handle: StateHandle, byte_offset: usize) -> Option<f32>;
}

impl<T: CellSource + ?Sized> CellSource for &T {
    fn read_cell(&self, handle: StateHandle, byte_offset: usize) -> Option<f32> {
        (**self).read_cell(handle, byte_offset)
    }
}

/// Flattens state into the wire format the way the simulation module does.
///
/// Backs [`encode`], which the CLI uses to record sessions as frame files.
#[derive(Debug, Default)]
pub struct StateWriter {
    cells: Vec<f32>,
}

impl StateWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Write the header. `obstacle_count` is stored as a float.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn header(mut self, snapshot: &Snapshot, obstacle_count: usize) -> Self {
        let actor = &snapshot.actor;
        let count = obstacle_count as f32;
        self.cells.clear();
        self.cells.extend_from_slice(&[
            actor.x,
            actor.y,
            actor.width,
            actor.height,
            bool_cell(actor.is_airborne),
            bool_cell(actor.is_destroyed),
            snapshot.ground_offset,
            snapshot.speed,
            snapshot.score,
            snapshot.high_score,
            count,
        ]);
        self
    }

    /// Append one obstacle record.
    #[must_use]
    pub fn record(mut self, x: f32, y: f32, width: f32, height: f32, kind: ObstacleKind) -> Self {
        self.cells
            .extend_from_slice(&[x, y, width, height, kind.to_flag()]);
        self
    }

    /// Append raw cells.
    #[cfg(test)]
    #[must_use]
    pub(crate) fn raw(mut self, cells: &[f32]) -> Self {
        self.cells.extend_from_slice(cells);
        self
    }

    #[must_use]
    pub fn finish(self) -> Vec<f32> {
        self.cells
    }
}

const fn bool_cell(value: bool) -> f32 {
    if value { 1.0 } else { 0.0 }
}

/// Encode a snapshot into wire cells.
#[must_use]
pub fn encode(snapshot: &Snapshot) -> Vec<f32> {
    snapshot
        .obstacles
        .iter()
        .fold(
            StateWriter::new().header(snapshot, snapshot.obstacles.len()),
            |writer, o| writer.record(o.x, o.y, o.width, o.height, o.kind),
        )
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{Actor, Obstacle};

    #[test]
    fn test_flag_is_strict() {
        assert!(flag(0.6));
        assert!(!flag(0.5));
        assert!(!flag(0.3));
        assert!(!flag(f32::NAN));
    }

    #[test]
    fn test_record_cell_offsets() {
        assert_eq!(record_cell(0, RECORD_X), 11);
        assert_eq!(record_cell(0, RECORD_KIND), 15);
        assert_eq!(record_cell(2, RECORD_HEIGHT), 24);
    }

    #[test]
    fn test_state_handle_null() {
        assert!(StateHandle::new(0).is_none());
        assert!(StateHandle::from_ptr(std::ptr::null::<f32>()).is_none());
        assert_eq!(StateHandle::new(0x1000).map(StateHandle::addr), Some(0x1000));
    }

    #[test]
    fn test_encode_matches_module_layout() {
        let snapshot = Snapshot {
            actor: Actor {
                x: 10.0,
                y: 50.0,
                width: 89.0,
                height: 94.0,
                is_airborne: false,
                is_destroyed: true,
            },
            ground_offset: 3.0,
            speed: 13.0,
            score: 120.0,
            high_score: 300.0,
            obstacles: vec![Obstacle {
                x: 200.0,
                y: 600.0,
                width: 34.0,
                height: 70.0,
                kind: ObstacleKind::Small,
            }],
        };
        assert_eq!(
            encode(&snapshot),
            vec![
                10.0, 50.0, 89.0, 94.0, 0.0, 1.0, 3.0, 13.0, 120.0, 300.0, 1.0, 200.0, 600.0,
                34.0, 70.0, 1.0
            ]
        );
    }
}
