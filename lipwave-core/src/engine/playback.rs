//! Playback sink boundary.
//!
//! The engine never touches an audio device itself. The embedder
//! registers a `PlaybackSink`; the engine hands it one playable buffer
//! per utterance and learns about progress through
//! `LipsyncEngine::on_playback_percent` / `on_playback_finished`.

use crate::error::Result;

/// One playable buffer handed to the external playback stage.
#[derive(Debug, Clone)]
pub struct PlaybackAudio {
    /// Little-endian 16-bit PCM bytes.
    pub data: Vec<u8>,
    /// Playback sample rate in Hz (the half-rate analysis feed).
    pub sample_rate: u32,
    pub channels: u32,
    /// Linear gain in [0, 1].
    pub volume: f32,
}

/// External playback stage contract.
pub trait PlaybackSink: Send + 'static {
    /// Begin playing `audio`. Must not block the calling tick.
    ///
    /// # Errors
    /// Returns an error if the buffer cannot be scheduled; the engine
    /// logs it and keeps its speaking state so progress reports from a
    /// previous buffer still resolve.
    fn play(&mut self, audio: PlaybackAudio) -> Result<()>;
}
