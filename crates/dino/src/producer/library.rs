//! Producer backed by a native shared library.

use std::path::{Path, PathBuf};

use dino_state::{CELL_SIZE, CellSource, StateHandle};
use futures::FutureExt;
use futures::future::LocalBoxFuture;
use libloading::os::unix::{Library, RTLD_NOW};
use tracing::{debug, error};

use super::{GameApi, Loader, Producer};
use crate::BridgeError;

/// Simulation module loaded from a shared library.
pub struct LibraryProducer {
    api: GameApi,
    /// Readable cells reported by `game_get_state_len` for the current buffer.
    readable: Option<usize>,
    // Dropped last: `api` points into it.
    _lib: Library,
}

impl LibraryProducer {
    /// Open the library at `path` and resolve its entry points.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, cannot be loaded, lacks a
    /// required symbol, or declares an unsupported state ABI.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BridgeError> {
        let path = path.as_ref();
        if !path.exists() {
            error!(path = %path.display(), "producer library not found");
            return Err(BridgeError::LibraryNotFound(path.display().to_string()));
        }

        debug!(path = %path.display(), "loading producer library");
        let lib = unsafe { Library::open(Some(path), RTLD_NOW)? };
        let api = unsafe { GameApi::load(&lib)? };

        debug!(
            bounded = api.state_len.is_some(),
            abi = ?api.abi_version,
            "resolved producer entry points"
        );

        Ok(Self {
            api,
            readable: None,
            _lib: lib,
        })
    }
}

impl CellSource for LibraryProducer {
    fn read_cell(&self, handle: StateHandle, byte_offset: usize) -> Option<f32> {
        if let Some(cells) = self.readable {
            if byte_offset.checked_add(CELL_SIZE)? > cells.checked_mul(CELL_SIZE)? {
                return None;
            }
        }
        let addr = handle.addr().checked_add(byte_offset)?;
        // SAFETY: the module keeps the buffer behind the last state pointer
        // alive until its next mutating call, and the bridge never holds a
        // handle across one.
        Some(unsafe { (addr as *const f32).read_unaligned() })
    }
}

impl Producer for LibraryProducer {
    fn init(&mut self) -> Result<(), BridgeError> {
        unsafe { (self.api.init)() };
        Ok(())
    }

    fn start(&mut self) {
        unsafe { (self.api.start)() };
    }

    fn step(&mut self, timestamp_ms: f32) {
        unsafe { (self.api.update)(timestamp_ms) };
    }

    fn jump(&mut self) -> i32 {
        unsafe { (self.api.jump)() }
    }

    fn restart(&mut self) {
        unsafe { (self.api.restart)() };
    }

    fn state_pointer(&mut self) -> Option<StateHandle> {
        let ptr = unsafe { (self.api.state_array)() };
        self.readable = self
            .api
            .state_len
            .map(|len| usize::try_from(unsafe { len() }).unwrap_or(0));
        StateHandle::from_ptr(ptr)
    }

    fn is_playing(&self) -> i32 {
        unsafe { (self.api.is_playing)() }
    }

    fn is_over(&self) -> i32 {
        unsafe { (self.api.is_game_over)() }
    }

    fn score(&self) -> i32 {
        unsafe { (self.api.score)() }
    }

    fn high_score(&self) -> i32 {
        unsafe { (self.api.high_score)() }
    }
}

/// Loads a [`LibraryProducer`] from a path.
#[derive(Clone, Debug)]
pub struct LibraryLoader {
    path: PathBuf,
}

impl LibraryLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Loader for LibraryLoader {
    type Producer = LibraryProducer;

    fn acquire(&self) -> LocalBoxFuture<'static, Result<LibraryProducer, BridgeError>> {
        let path = self.path.clone();
        async move { LibraryProducer::open(&path) }.boxed_local()
    }
}
