//! Text-to-buffer conversion.
//!
//! A `Converter` drives one voice through the backend's text-to-buffer
//! call, accumulating synthesized PCM and, in synchronized-info mode,
//! the word/viseme/mark timelines. Every invocation is wrapped in one
//! `acquire()`/`release()` pair so the voice database is guaranteed
//! resident for the duration of synthesis and eligible for unloading
//! immediately after (unless pinned).
//!
//! Background conversion goes through [`SynthesisTask`]: the work runs
//! on the blocking pool and the consuming tick polls the handle.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::backend::{
    MarkTimestamp, OutputFormat, SynthesisRequest, SynthesisSink, TextKind, VisemeTimestamp,
    WordTimestamp,
};
use crate::error::{Result, TtsError};
use crate::voice::Voice;

/// Numeric synthesis parameters, with the vendor's accepted ranges.
#[derive(Debug, Clone)]
pub struct SynthesisParams {
    /// Volume in [0, 500].
    pub volume: i32,
    /// Pitch in [50, 200].
    pub pitch: i32,
    /// Speed in [50, 400].
    pub speed: i32,
    /// Pause at clause delimiters, in milliseconds, [0, 65535].
    pub pause_ms: i32,
    /// Pause at commas, in milliseconds, [0, 65535].
    pub comma_pause_ms: i32,
    pub output_format: OutputFormat,
}

impl Default for SynthesisParams {
    fn default() -> Self {
        Self {
            volume: 225,
            pitch: 100,
            speed: 100,
            pause_ms: 0,
            comma_pause_ms: 0,
            output_format: OutputFormat::Pcm16,
        }
    }
}

impl SynthesisParams {
    /// Clamp every parameter into its accepted range.
    pub fn clamped(mut self) -> Self {
        self.volume = self.volume.clamp(0, 500);
        self.pitch = self.pitch.clamp(50, 200);
        self.speed = self.speed.clamp(50, 400);
        self.pause_ms = self.pause_ms.clamp(0, 65_535);
        self.comma_pause_ms = self.comma_pause_ms.clamp(0, 65_535);
        self
    }
}

/// Collects streaming synthesis output before it is committed to the
/// converter's buffers in one step.
#[derive(Default)]
struct Collector {
    audio: Vec<i16>,
    visemes: Vec<VisemeTimestamp>,
    words: Vec<WordTimestamp>,
    marks: Vec<MarkTimestamp>,
}

impl SynthesisSink for Collector {
    fn on_audio(&mut self, samples: &[i16]) {
        self.audio.extend_from_slice(samples);
    }

    fn on_word(&mut self, word: WordTimestamp) {
        self.words.push(word);
    }

    fn on_viseme(&mut self, viseme: VisemeTimestamp) {
        self.visemes.push(viseme);
    }

    fn on_mark(&mut self, mark: MarkTimestamp) {
        self.marks.push(mark);
    }
}

/// Handle to a background conversion running on the blocking pool.
///
/// Dropping the handle does not cancel the work; the converter's
/// buffers fill either way. The consuming tick polls `is_finished()`
/// and then reads the converter.
pub struct SynthesisTask {
    handle: JoinHandle<Result<()>>,
}

impl SynthesisTask {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Await completion and surface the conversion result.
    ///
    /// # Errors
    /// `TtsError::Task` if the worker panicked, otherwise the
    /// conversion's own result.
    pub async fn join(self) -> Result<()> {
        self.handle
            .await
            .map_err(|e| TtsError::Task(e.to_string()))?
    }
}

/// Encapsulates one voice's text-to-speech conversion state.
pub struct Converter {
    voice: Arc<Voice>,
    params: SynthesisParams,
    audio: Mutex<Vec<i16>>,
    visemes: Mutex<VecDeque<VisemeTimestamp>>,
    words: Mutex<Vec<WordTimestamp>>,
    marks: Mutex<Vec<MarkTimestamp>>,
    finished: AtomicBool,
}

impl Converter {
    pub fn new(voice: Arc<Voice>, params: SynthesisParams) -> Self {
        Self {
            voice,
            params: params.clamped(),
            audio: Mutex::new(Vec::new()),
            visemes: Mutex::new(VecDeque::new()),
            words: Mutex::new(Vec::new()),
            marks: Mutex::new(Vec::new()),
            finished: AtomicBool::new(false),
        }
    }

    pub fn voice(&self) -> &Arc<Voice> {
        &self.voice
    }

    pub fn params(&self) -> &SynthesisParams {
        &self.params
    }

    /// Convert text to PCM in the calling thread.
    pub fn convert_to_buffer(&self, text: &str, kind: TextKind) -> Result<()> {
        self.convert_inner(text, kind, false)
    }

    /// Convert text to PCM plus word/viseme/mark timelines.
    pub fn convert_to_buffer_sync_info(&self, text: &str, kind: TextKind) -> Result<()> {
        self.convert_inner(text, kind, true)
    }

    /// Convert on the blocking pool; poll the returned task.
    pub fn convert_to_buffer_async(self: &Arc<Self>, text: String, kind: TextKind) -> SynthesisTask {
        self.spawn(text, kind, false)
    }

    /// Synchronized-info variant of [`Converter::convert_to_buffer_async`].
    pub fn convert_to_buffer_async_sync_info(
        self: &Arc<Self>,
        text: String,
        kind: TextKind,
    ) -> SynthesisTask {
        self.spawn(text, kind, true)
    }

    fn spawn(self: &Arc<Self>, text: String, kind: TextKind, sync_info: bool) -> SynthesisTask {
        let converter = Arc::clone(self);
        SynthesisTask {
            handle: tokio::task::spawn_blocking(move || {
                converter.convert_inner(&text, kind, sync_info)
            }),
        }
    }

    fn convert_inner(&self, text: &str, kind: TextKind, sync_info: bool) -> Result<()> {
        info!(voice = %self.voice.id, sync_info, "synthesizing");

        if let Err(e) = self.voice.acquire() {
            error!(voice = %self.voice.id, error = %e, "acquiring voice failed");
        }

        let request = SynthesisRequest {
            text: text.to_owned(),
            voice_name: self.voice.name.clone(),
            voice_variant: self.voice.variant.clone(),
            volume: self.params.volume,
            pitch: self.params.pitch,
            speed: self.params.speed,
            pause_ms: self.params.pause_ms,
            comma_pause_ms: self.params.comma_pause_ms,
            text_kind: kind,
            output_format: self.params.output_format,
            sync_info,
        };

        let mut collector = Collector::default();
        let result = self
            .voice
            .backend()
            .text_to_buffer(&request, &mut collector);
        match &result {
            Ok(()) => info!(
                voice = %self.voice.id,
                samples = collector.audio.len(),
                "text to buffer succeeded"
            ),
            Err(e) => error!(
                voice = %self.voice.id,
                text_len = text.len(),
                error = %e,
                "text to buffer failed"
            ),
        }

        // Commit whatever arrived — a failed call may still have
        // produced leading audio.
        self.audio.lock().extend(collector.audio);
        self.visemes.lock().extend(collector.visemes);
        self.words.lock().extend(collector.words);
        self.marks.lock().extend(collector.marks);

        if let Err(e) = self.voice.release() {
            error!(voice = %self.voice.id, error = %e, "releasing voice failed");
        }

        self.finished.store(true, Ordering::SeqCst);
        result
    }

    /// True once a conversion has been started and completed.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// The converted PCM; the complete buffer once `is_finished()`,
    /// empty before that.
    pub fn audio_data(&self) -> Vec<i16> {
        if self.is_finished() {
            self.audio.lock().clone()
        } else {
            Vec::new()
        }
    }

    /// Move the converted PCM out, leaving the buffer empty. Returns
    /// nothing while a conversion is still running.
    pub fn take_audio(&self) -> Vec<i16> {
        if self.is_finished() {
            std::mem::take(&mut *self.audio.lock())
        } else {
            Vec::new()
        }
    }

    pub fn clear_audio_data(&self) {
        self.audio.lock().clear();
    }

    /// Move the viseme timeline out, in synthesis order.
    pub fn take_viseme_timeline(&self) -> VecDeque<VisemeTimestamp> {
        std::mem::take(&mut *self.visemes.lock())
    }

    pub fn word_timestamps(&self) -> Vec<WordTimestamp> {
        self.words.lock().clone()
    }

    pub fn mark_timestamps(&self) -> Vec<MarkTimestamp> {
        self.marks.lock().clone()
    }

    /// Convert and write the result as a 16-bit WAV file.
    pub fn synthesize_to_file(&self, text: &str, kind: TextKind, path: &Path) -> Result<()> {
        self.convert_inner(text, kind, false)?;

        let spec = hound::WavSpec {
            channels: self.voice.channels as u16,
            sample_rate: self.voice.sampling,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for sample in self.audio.lock().iter() {
            writer.write_sample(*sample)?;
        }
        writer.finalize()?;
        info!(path = %path.display(), "synthesized to file");
        Ok(())
    }
}
