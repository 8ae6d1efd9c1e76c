//! # lipwave-core
//!
//! Reusable streaming audio-to-viseme lip-sync engine.
//!
//! ## Architecture
//!
//! ```text
//! feed_audio(bytes) → ingestion queue → Chunker/FrameAnalyzer
//!                                            │
//!                                     FrameSequence + samples
//!                                            │
//!                                      result queue → playback controller
//!                                                          │
//!                                                    PlaybackSink
//! ```
//!
//! Producers feed PCM from any thread; a single cooperative tick drains
//! the queues under try-lock discipline and plays utterances back in
//! submission order.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod analyzer;
pub mod chunker;
pub mod engine;
pub mod error;
pub mod events;
pub mod fragment;
pub mod lifecycle;
pub mod viseme;

// Convenience re-exports for downstream crates
pub use analyzer::{AnalyzerConfig, AnalyzerHandle, FrameAnalyzer, ProviderKind};
pub use chunker::Chunker;
pub use engine::playback::{PlaybackAudio, PlaybackSink};
pub use engine::{LipsyncConfig, LipsyncEngine};
pub use error::LipwaveError;
pub use events::{EngineStatus, PlaybackEvent, PlaybackPhase, UtteranceEvent};
pub use fragment::AudioFragment;
pub use lifecycle::{Lifecycle, Tickable};
pub use viseme::{FrameSequence, UtteranceUnit, VisemeFrame, VISEME_COUNT, VISEME_NAMES};
