//! The bridge between the host and a producer.
//!
//! A [`Bridge`] is one connection to one producer, owned by whatever runs the
//! session. Every operation is safe to call in any phase: until the
//! connection is ready they return a neutral value (`false`, `0`, `None`)
//! without touching the producer.
//!
//! The bridge is single-threaded. [`Bridge::init`] is the only async
//! operation; concurrent `init` calls share one acquisition attempt.

mod connection;

use std::cell::RefCell;
use std::time::Instant;

use dino_state::{Snapshot, StagingBuffer, decode};
use tracing::{debug, error, info, trace, warn};

use crate::producer::{Loader, Producer};
use crate::{BridgeConfig, SnapshotError, metrics};

pub use connection::Phase;
use connection::{Connection, Pending};

/// Connection to a producer acquired through `L`.
pub struct Bridge<L: Loader> {
    loader: L,
    config: BridgeConfig,
    conn: RefCell<Connection<L::Producer>>,
    staging: RefCell<StagingBuffer>,
}

impl<L: Loader> Bridge<L> {
    /// Create an uninitialized bridge.
    pub fn new(loader: L, config: BridgeConfig) -> Self {
        Self {
            loader,
            config,
            conn: RefCell::new(Connection::Uninitialized),
            staging: RefCell::new(StagingBuffer::new()),
        }
    }

    pub const fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub const fn loader(&self) -> &L {
        &self.loader
    }

    pub fn phase(&self) -> Phase {
        self.conn.borrow().phase()
    }

    pub fn is_ready(&self) -> bool {
        self.phase() == Phase::Ready
    }

    /// Acquire and initialize the producer.
    ///
    /// Returns `true` once the connection is ready. While an attempt is in
    /// flight, further calls wait for that attempt instead of starting
    /// another. On failure the connection returns to uninitialized and the
    /// call may be retried.
    pub async fn init(&self) -> bool {
        let pending = {
            let mut conn = self.conn.borrow_mut();
            match &*conn {
                Connection::Ready(_) => return true,
                Connection::Loading(pending) => pending.clone(),
                Connection::Uninitialized => {
                    info!("acquiring producer");
                    let pending = Pending::begin(&self.loader);
                    *conn = Connection::Loading(pending.clone());
                    pending
                }
            }
        };

        pending.wait().await;
        self.settle(&pending)
    }

    /// Move a finished attempt's outcome into the connection.
    fn settle(&self, pending: &Pending<L::Producer>) -> bool {
        let mut conn = self.conn.borrow_mut();
        let current = matches!(&*conn, Connection::Loading(p) if p.is_same(pending));
        if current {
            match pending.take() {
                Some(Ok(producer)) => {
                    info!("producer ready");
                    *conn = Connection::Ready(producer);
                }
                Some(Err(e)) => {
                    error!(error = %e, "producer unavailable");
                    metrics::record_connection_failure();
                    *conn = Connection::Uninitialized;
                }
                None => *conn = Connection::Uninitialized,
            }
        }
        matches!(*conn, Connection::Ready(_))
    }

    /// Drop the producer.
    ///
    /// Idempotent. An attempt still loading is not cancelled. The staging
    /// copy holds no memory between decodes, so there is nothing else to free.
    pub fn shutdown(&self) {
        let mut conn = self.conn.borrow_mut();
        match conn.phase() {
            Phase::Ready => {
                *conn = Connection::Uninitialized;
                info!("producer released");
            }
            Phase::Loading => debug!("shutdown ignored while loading"),
            Phase::Uninitialized => {}
        }
    }

    fn with_producer<T>(&self, neutral: T, f: impl FnOnce(&mut L::Producer) -> T) -> T {
        match &mut *self.conn.borrow_mut() {
            Connection::Ready(producer) => f(producer),
            _ => neutral,
        }
    }

    pub fn start(&self) {
        self.with_producer((), Producer::start);
    }

    /// Advance the simulation to `timestamp_ms`.
    pub fn step(&self, timestamp_ms: f32) {
        self.with_producer((), |p| p.step(timestamp_ms));
    }

    /// Request a jump; `true` if the producer accepted it.
    pub fn jump(&self) -> bool {
        self.with_producer(false, |p| p.jump() == 1)
    }

    pub fn restart(&self) {
        self.with_producer((), Producer::restart);
    }

    pub fn is_playing(&self) -> bool {
        self.with_producer(false, |p| p.is_playing() == 1)
    }

    pub fn is_over(&self) -> bool {
        self.with_producer(false, |p| p.is_over() == 1)
    }

    pub fn score(&self) -> i32 {
        self.with_producer(0, |p| p.score())
    }

    pub fn high_score(&self) -> i32 {
        self.with_producer(0, |p| p.high_score())
    }

    /// Decode the current frame, reporting why when there is none.
    ///
    /// # Errors
    ///
    /// [`SnapshotError::NotReady`] outside the ready phase,
    /// [`SnapshotError::NullBuffer`] when the producer has no buffer, and
    /// [`SnapshotError::Decode`] when the header is corrupt.
    pub fn try_snapshot(&self) -> Result<Snapshot, SnapshotError> {
        let mut conn = self.conn.borrow_mut();
        let Connection::Ready(producer) = &mut *conn else {
            return Err(SnapshotError::NotReady);
        };

        let Some(handle) = producer.state_pointer() else {
            metrics::record_null_buffer();
            return Err(SnapshotError::NullBuffer);
        };

        let started = Instant::now();
        let mut staging = self.staging.borrow_mut();
        let decoded = match decode(&*producer, handle, &self.config.limits, &mut staging) {
            Ok(decoded) => decoded,
            Err(e) => {
                metrics::record_rejected(&e);
                return Err(e.into());
            }
        };
        metrics::record_decoded(&decoded, started.elapsed());

        if let Some(declared) = decoded.repairs.truncated_from {
            debug!(
                declared,
                readable = decoded.snapshot.obstacles.len(),
                "state trailer truncated, obstacle count clamped"
            );
        }
        if decoded.repairs.fields > 0 {
            debug!(fields = decoded.repairs.fields, "replaced invalid fields");
        }

        Ok(decoded.snapshot)
    }

    /// Decode the current frame.
    ///
    /// `None` when not ready, when the producer has no buffer, or when the
    /// header is corrupt. Corruption is logged as a warning and never
    /// escalated, so a bad frame cannot break a per-frame loop.
    pub fn snapshot(&self) -> Option<Snapshot> {
        match self.try_snapshot() {
            Ok(snapshot) => Some(snapshot),
            Err(SnapshotError::Decode(e)) => {
                warn!(error = %e, "discarding frame with corrupt state header");
                None
            }
            Err(e) => {
                trace!(error = %e, "no snapshot");
                None
            }
        }
    }

    /// Bytes held by the staging buffer. Zero between decodes.
    pub fn staging_bytes(&self) -> usize {
        self.staging.borrow().capacity_bytes()
    }
}
