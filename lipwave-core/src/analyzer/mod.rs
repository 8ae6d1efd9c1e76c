//! Frame analyzer abstraction.
//!
//! The `FrameAnalyzer` trait decouples the chunker from any specific
//! lip-sync backend (the built-in energy heuristic, a vendor SDK
//! context, etc.).
//!
//! `&mut self` on `analyze` intentionally expresses that analyzers are
//! stateful — they maintain internal windowing/latency state per logical
//! stream. One instance serves exactly one speaking entity; frames from
//! independent streams must never interleave through a shared instance.
//! All mutation is serialised through `AnalyzerHandle`'s
//! `parking_lot::Mutex`.

pub mod energy;

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::viseme::VisemeFrame;

/// Which analysis model variant the backend should run.
///
/// Variants trade accuracy for per-frame cost; `EnhancedWithLaughter`
/// additionally populates the laughter score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProviderKind {
    Original,
    Enhanced,
    EnhancedWithLaughter,
}

/// Backend construction parameters.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub provider: ProviderKind,
    /// Input sample rate in Hz of the audio being analyzed.
    pub sample_rate: u32,
    /// Internal processing buffer size in samples.
    pub buffer_size: u32,
    /// Enable hardware acceleration on supported backends.
    pub hardware_acceleration: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::EnhancedWithLaughter,
            sample_rate: 44_100,
            buffer_size: 4_096,
            hardware_acceleration: true,
        }
    }
}

/// Contract for lip-sync analysis backends.
pub trait FrameAnalyzer: Send + 'static {
    /// Analyze one fixed-size frame of interleaved `i16` samples.
    ///
    /// # Parameters
    /// - `frame`: exactly one analysis frame (10 ms granule, zero-padded
    ///   by the caller at stream boundaries).
    /// - `delay_ms`: look-ahead latency compensation the backend should
    ///   apply to its internal window.
    /// - `stereo`: whether `frame` carries interleaved stereo samples.
    ///
    /// # Errors
    /// Returns an error if the backend rejects the frame. The chunker
    /// aborts the current fragment without committing partial state.
    fn analyze(&mut self, frame: &[i16], delay_ms: u32, stereo: bool) -> Result<VisemeFrame>;

    /// Reset internal windowing state (between independent streams).
    fn reset(&mut self);
}

/// Thread-safe reference-counted handle to any `FrameAnalyzer` implementor.
#[derive(Clone)]
pub struct AnalyzerHandle(pub Arc<Mutex<dyn FrameAnalyzer>>);

impl AnalyzerHandle {
    /// Wrap any `FrameAnalyzer` in an `AnalyzerHandle`.
    pub fn new<A: FrameAnalyzer>(analyzer: A) -> Self {
        Self(Arc::new(Mutex::new(analyzer)))
    }
}

impl std::fmt::Debug for AnalyzerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyzerHandle").finish_non_exhaustive()
    }
}
