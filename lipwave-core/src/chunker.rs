//! Fixed-stride frame chunker.
//!
//! Splits an arbitrary-length PCM fragment into fixed-size analysis
//! frames, runs each through the frame analyzer, and accumulates the
//! per-frame results into one utterance timeline.
//!
//! ## Frame geometry
//!
//! ```text
//! frame_sample_count = (sample_rate / 2) / 100     // 10 ms at the half-rate feed
//! frame_size         = channels × frame_sample_count
//! frame_offset       = delay_ms × (sample_rate / 2) / 1000 × channels
//! ```
//!
//! The stride walk starts at offset 0 and runs `frame_offset` samples
//! past the end of the fragment. Results produced while
//! `offset < frame_offset` prime the analyzer's latency window and are
//! not appended; the trailing strides past the end push zero frames
//! through so the delayed output for the real tail is flushed out.

use tracing::debug;

use crate::analyzer::AnalyzerHandle;
use crate::engine::LipsyncConfig;
use crate::error::{LipwaveError, Result};
use crate::fragment::AudioFragment;
use crate::viseme::{FrameSequence, UtteranceUnit};

#[derive(Debug)]
pub struct Chunker {
    frame_size: usize,
    frame_offset: usize,
    frame_delay_ms: u32,
    stereo: bool,
    analyzer: AnalyzerHandle,
    /// Scratch frame reused for zero-padded tails.
    scratch: Vec<i16>,
}

impl Chunker {
    /// Build a chunker and prime the analyzer's latency window.
    ///
    /// Runs one all-zero frame through the analyzer so its internal
    /// delay line is populated before the first real frame arrives.
    ///
    /// # Errors
    /// - `LipwaveError::Config` if the configured rate/channel layout
    ///   produces an empty frame.
    /// - Any analyzer error from the priming call.
    pub fn new(config: &LipsyncConfig, analyzer: AnalyzerHandle) -> Result<Self> {
        let frame_sample_count = (config.sample_rate as usize / 2) / 100;
        let frame_size = config.channels as usize * frame_sample_count;
        if frame_size == 0 {
            return Err(LipwaveError::Config(format!(
                "sample_rate {} / channels {} yields an empty analysis frame",
                config.sample_rate, config.channels
            )));
        }

        let stereo = config.channels > 1;
        let mut chunker = Self {
            frame_size,
            frame_offset: 0,
            frame_delay_ms: config.frame_delay_ms,
            stereo,
            analyzer,
            scratch: vec![0i16; frame_size],
        };

        chunker
            .analyzer
            .0
            .lock()
            .analyze(&chunker.scratch, chunker.frame_delay_ms, stereo)?;
        chunker.frame_offset = config.frame_delay_ms as usize * (config.sample_rate as usize / 2)
            / 1000
            * config.channels as usize;

        debug!(
            frame_size,
            frame_offset = chunker.frame_offset,
            stereo,
            "chunker primed"
        );
        Ok(chunker)
    }

    /// Samples per analysis frame (all channels interleaved).
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Look-ahead priming region length in samples.
    pub fn frame_offset(&self) -> usize {
        self.frame_offset
    }

    /// Chunk one fragment into an utterance unit.
    ///
    /// Called only from the single consumer that owns the ingestion
    /// queue — never concurrently with itself.
    ///
    /// # Errors
    /// Propagates the first analyzer error; no partial sequence is
    /// committed in that case.
    pub fn cook(&mut self, fragment: &AudioFragment) -> Result<UtteranceUnit> {
        let samples = fragment.to_samples();
        let total = samples.len();
        let mut sequence = FrameSequence::new();

        let mut analyzer = self.analyzer.0.lock();
        let mut offset = 0usize;
        while offset < total + self.frame_offset {
            let remaining = total.saturating_sub(offset);
            let frame = if remaining >= self.frame_size {
                analyzer.analyze(
                    &samples[offset..offset + self.frame_size],
                    self.frame_delay_ms,
                    self.stereo,
                )?
            } else {
                // Short tail: copy what remains, zero-fill the rest.
                // `remaining == 0` sends an all-zero frame, flushing the
                // analyzer's delayed output for the real tail samples.
                self.scratch[..remaining].copy_from_slice(&samples[offset..]);
                self.scratch[remaining..].fill(0);
                analyzer.analyze(&self.scratch, self.frame_delay_ms, self.stereo)?
            };

            if offset >= self.frame_offset {
                sequence.push(frame);
            }
            offset += self.frame_size;
        }
        drop(analyzer);

        debug!(
            samples = total,
            frames = sequence.len(),
            "fragment chunked"
        );
        Ok(UtteranceUnit::new(sequence, samples))
    }
}
