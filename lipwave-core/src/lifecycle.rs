//! Capability traits for embedder-driven scheduling.
//!
//! The embedding application owns the scheduler. Components expose a
//! `Tickable` capability (one cooperative time slice per call) and a
//! `Lifecycle` capability (explicit start/stop), composed by the
//! embedder instead of inherited from a framework base class.

/// One cooperative time slice.
///
/// Implementations must never block: cross-thread work is deferred to
/// the next tick when a lock is contended.
pub trait Tickable {
    /// Advance by `dt` seconds of wall-clock time.
    fn tick(&self, dt: f32);
}

/// Explicit start/stop lifetime boundary.
pub trait Lifecycle {
    type Error;

    /// Transition into the running state.
    fn start(&self) -> Result<(), Self::Error>;

    /// Tear down: discard queued work, release collaborators.
    fn stop(&self) -> Result<(), Self::Error>;
}
