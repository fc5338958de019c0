//! Dino - host bridge for the dino simulation module.
//!
//! The simulation core runs as a separately compiled producer and publishes
//! its per-frame state as a flat buffer of `f32` cells. This crate acquires
//! the producer, forwards lifecycle calls to it and decodes each frame's
//! buffer into a typed [`Snapshot`].
//!
//! # Example
//!
//! ```ignore
//! use dino::{Bridge, BridgeConfig, LibraryLoader};
//!
//! let bridge = Bridge::new(LibraryLoader::new("libdino_core.so"), BridgeConfig::default());
//! if futures::executor::block_on(bridge.init()) {
//!     bridge.start();
//!     bridge.step(16.0);
//!     if let Some(snapshot) = bridge.snapshot() {
//!         println!("{}", snapshot.to_json());
//!     }
//! }
//! bridge.shutdown();
//! ```

mod bridge;
mod config;
mod error;
pub mod metrics;
pub mod producer;

pub use bridge::{Bridge, Phase};
pub use config::BridgeConfig;
pub use error::{BridgeError, SnapshotError};
pub use producer::{
    LibraryLoader, LibraryProducer, Loader, Producer, ReplayLoader, ReplayProducer, format_frame,
    parse_frames,
};

pub use dino_state::{
    Actor, DecodeError, DecodeLimits, Obstacle, ObstacleKind, RegionError, Snapshot, encode,
};
