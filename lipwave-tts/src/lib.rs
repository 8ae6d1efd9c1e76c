//! # lipwave-tts
//!
//! Voice engine lifecycle, text-to-speech synthesis, and speaker
//! playback for the Lipwave SDK.
//!
//! ## Architecture
//!
//! ```text
//! VoiceRegistry ──► Voice (refcounted residency, pinnable)
//!                      │
//!                 Converter (acquire → text_to_buffer → release)
//!                   │     │
//!              Speaker   VoiceFeed ──► PCM bytes ──► lipwave-core feed
//!              (AudioSink, viseme cursor)
//! ```
//!
//! The vendor SDK sits behind `SynthesisBackend`; everything above it
//! is host-independent. Components expose the `Tickable` capability
//! from lipwave-core and are driven by the embedder's scheduler.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod backend;
pub mod converter;
pub mod error;
pub mod registry;
pub mod settings;
pub mod speaker;
pub mod voice;
pub mod voice_feed;

// Convenience re-exports for downstream crates
pub use backend::{
    MarkTimestamp, OutputFormat, SynthesisBackend, SynthesisRequest, SynthesisSink, TextKind,
    VisemeTimestamp, VoiceInfo, WordTimestamp,
};
pub use converter::{Converter, SynthesisParams, SynthesisTask};
pub use error::TtsError;
pub use registry::VoiceRegistry;
pub use settings::{ExportSettings, PlatformFlag, VoiceExportEntry, PLATFORM_ORDER};
pub use speaker::{AudioSink, Speaker, SpeakerGroup, SynthesizedAudio};
pub use voice::Voice;
pub use voice_feed::VoiceFeed;
