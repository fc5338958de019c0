//! State buffer layout and decoding for the dino simulation bridge.
//!
//! The simulation module publishes each frame as a flat buffer of `f32` cells
//! which the host reads by raw offset. This crate owns everything about that
//! buffer: the offsets, the decoded [`Snapshot`] types, and the defensive
//! [`decode`] that turns a borrowed region into a validated snapshot.
//!
//! ```ignore
//! use dino_state::{decode, DecodeLimits, GuardedRegion, StagingBuffer, encode};
//!
//! let mut region = GuardedRegion::with_cells(64)?;
//! region.write_cells(0, &encode(&snapshot))?;
//!
//! let mut staging = StagingBuffer::new();
//! let decoded = decode(&region, region.handle(), &DecodeLimits::default(), &mut staging)?;
//! ```

mod decode;
pub mod layout;
mod region;
mod snapshot;

pub use decode::{
    DEFAULT_MAX_OBSTACLES, DEFAULT_MAX_TOTAL_CELLS, DecodeError, DecodeLimits, Decoded, Repairs,
    SIZE_SENTINEL, StagingBuffer, Staged, decode, decode_cells,
};
pub use layout::{CELL_SIZE, CellSource, HEADER_CELLS, RECORD_CELLS, StateHandle, StateWriter, encode};
pub use region::{GUARD_SIZE, GuardedRegion, RegionError};
pub use snapshot::{Actor, Obstacle, ObstacleKind, Snapshot};
