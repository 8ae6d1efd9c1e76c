//! Synthesis backend abstraction.
//!
//! The `SynthesisBackend` trait is the seam in front of the vendor
//! speech SDK: voice discovery, voice database residency, and the
//! text-to-buffer call. Implementations wrap a native library; tests
//! script one in memory.
//!
//! Synthesis output streams back through a `SynthesisSink` — PCM chunks
//! always, word/viseme/mark timestamps only when the request asks for
//! synchronized info.

use std::path::Path;

use crate::error::Result;

/// Static description of one installed voice, as reported by discovery.
#[derive(Debug, Clone)]
pub struct VoiceInfo {
    /// Speaker name, e.g. `"ashley"`.
    pub name: String,
    /// Voice database variant, e.g. `"d16"`.
    pub variant: String,
    pub language: String,
    pub gender: String,
    pub version: String,
    /// Output sample rate in Hz.
    pub sampling: u32,
    pub channels: u32,
}

/// Whether markup tags in the text are processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextKind {
    #[default]
    Normal,
    Ssml,
}

impl TextKind {
    /// Wire code the vendor call expects.
    pub fn markup_code(self) -> u8 {
        match self {
            TextKind::Normal => 0,
            TextKind::Ssml => 128,
        }
    }
}

/// PCM encoding of the synthesized buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Pcm16,
    Pcm8,
}

impl OutputFormat {
    pub fn bit_depth(self) -> u16 {
        match self {
            OutputFormat::Pcm16 => 16,
            OutputFormat::Pcm8 => 8,
        }
    }
}

/// One text-to-buffer invocation.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice_name: String,
    pub voice_variant: String,
    /// Volume in [0, 500].
    pub volume: i32,
    /// Pitch in [50, 200].
    pub pitch: i32,
    /// Speed in [50, 400].
    pub speed: i32,
    /// Pause at clause delimiters, in milliseconds.
    pub pause_ms: i32,
    /// Pause at commas, in milliseconds.
    pub comma_pause_ms: i32,
    pub text_kind: TextKind,
    pub output_format: OutputFormat,
    /// Request word/viseme/mark timestamp callbacks.
    pub sync_info: bool,
}

/// A viseme timestamp reported during synchronized synthesis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisemeTimestamp {
    pub viseme_id: u16,
    /// Seconds from utterance start.
    pub time: f32,
}

/// A word boundary reported during synchronized synthesis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WordTimestamp {
    /// Start position in the source text, in characters.
    pub start: usize,
    /// End position in the source text, in characters.
    pub end: usize,
    pub time: f32,
}

/// A named SSML mark reported during synchronized synthesis.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkTimestamp {
    pub name: String,
    pub time: f32,
}

/// Receives synthesis output as it is produced.
pub trait SynthesisSink {
    /// A chunk of synthesized PCM, in production order.
    fn on_audio(&mut self, samples: &[i16]);

    fn on_word(&mut self, _word: WordTimestamp) {}

    fn on_viseme(&mut self, _viseme: VisemeTimestamp) {}

    fn on_mark(&mut self, _mark: MarkTimestamp) {}
}

/// Contract for vendor speech SDK wrappers.
///
/// All calls may be made from any thread; residency calls for one voice
/// are serialised by the owning [`crate::voice::Voice`].
pub trait SynthesisBackend: Send + Sync + 'static {
    /// Rebuild the vendor's voice configuration from the currently
    /// installed databases. Must be called before newly installed
    /// voices become discoverable.
    fn refresh_installations(&self) -> Result<()>;

    /// Enumerate installed voices.
    fn discover_voices(&self) -> Result<Vec<VoiceInfo>>;

    /// Load a voice database into memory, optionally against a license
    /// file.
    ///
    /// # Errors
    /// `TtsError::Backend` carrying the vendor return code.
    fn load_voice(&self, name: &str, variant: &str, license: Option<&Path>) -> Result<()>;

    /// Unload a voice database.
    fn unload_voice(&self, name: &str, variant: &str) -> Result<()>;

    /// Synthesize `request.text`, streaming output into `sink`.
    ///
    /// The voice must already be loaded; callers wrap this in one
    /// acquire/release pair.
    fn text_to_buffer(&self, request: &SynthesisRequest, sink: &mut dyn SynthesisSink)
        -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markup_codes_match_wire_values() {
        assert_eq!(TextKind::Normal.markup_code(), 0);
        assert_eq!(TextKind::Ssml.markup_code(), 128);
    }

    #[test]
    fn output_format_bit_depths() {
        assert_eq!(OutputFormat::Pcm16.bit_depth(), 16);
        assert_eq!(OutputFormat::Pcm8.bit_depth(), 8);
    }
}
