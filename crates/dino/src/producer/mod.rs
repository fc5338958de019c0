//! Producer capability surface.
//!
//! A producer is the simulation module on the other side of the bridge. It is
//! compiled independently of the host, so everything the bridge knows about it
//! goes through [`Producer`]: lifecycle calls returning C-style integers and a
//! handle to a state buffer the bridge reads cell by cell.

mod api;
mod library;
mod replay;

use dino_state::{CellSource, StateHandle};
use futures::future::LocalBoxFuture;

use crate::BridgeError;

pub use api::{GameApi, STATE_ABI_VERSION};
pub use library::{LibraryLoader, LibraryProducer};
pub use replay::{ReplayLoader, ReplayProducer, format_frame, parse_frames};

/// Operations exposed by the simulation module.
///
/// Flags and counters come back as raw integers; the bridge adapts them.
pub trait Producer: CellSource {
    /// One-time initialization after the module is loaded.
    fn init(&mut self) -> Result<(), BridgeError>;

    fn start(&mut self);

    /// Advance the simulation to `timestamp_ms`.
    fn step(&mut self, timestamp_ms: f32);

    /// Returns 1 if the jump was accepted.
    fn jump(&mut self) -> i32;

    fn restart(&mut self);

    /// Handle to the current frame's state buffer, `None` for a null pointer.
    ///
    /// The buffer stays owned by the producer and is only valid until the
    /// next mutating call.
    fn state_pointer(&mut self) -> Option<StateHandle>;

    fn is_playing(&self) -> i32;

    fn is_over(&self) -> i32;

    fn score(&self) -> i32;

    fn high_score(&self) -> i32;
}

/// Acquires a producer (resolving and loading the module).
///
/// The returned future is the only suspension point of the bridge.
pub trait Loader {
    type Producer: Producer + 'static;

    fn acquire(&self) -> LocalBoxFuture<'static, Result<Self::Producer, BridgeError>>;
}
