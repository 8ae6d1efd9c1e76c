//! Per-actor speech playback.
//!
//! A `Speaker` owns the synthesis parameters for one speaking entity,
//! drives conversions through a [`Converter`], hands the result to the
//! embedder's [`AudioSink`], and walks the viseme timeline during
//! playback on each tick.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, error, info};

use lipwave_core::lifecycle::Tickable;

use crate::backend::{TextKind, VisemeTimestamp};
use crate::converter::{Converter, SynthesisParams, SynthesisTask};
use crate::error::{Result, TtsError};
use crate::registry::VoiceRegistry;
use crate::voice::Voice;

/// One synthesized buffer handed to the external playback stage.
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u32,
    pub bit_depth: u16,
}

/// External playback stage for synthesized speech.
pub trait AudioSink: Send + 'static {
    /// Begin playing `audio`. Must not block the calling tick.
    fn play(&mut self, audio: SynthesizedAudio) -> Result<()>;

    fn set_paused(&mut self, paused: bool);

    /// Stop playback immediately.
    fn stop(&mut self);
}

/// Notification fired on speech start/finish with the spoken text.
pub type SpeechCallback = Box<dyn Fn(&str, TextKind) + Send>;

struct ActivePlayback {
    text: String,
    kind: TextKind,
    /// Total playback length in seconds.
    length: f64,
    /// Seconds of playback left.
    remaining: f64,
    visemes: VecDeque<VisemeTimestamp>,
    paused: bool,
}

struct PendingSay {
    task: SynthesisTask,
    converter: Arc<Converter>,
    text: String,
    kind: TextKind,
}

/// A speaking entity: voice selection, synthesis parameters, playback
/// state, and the viseme cursor.
pub struct Speaker {
    registry: Arc<VoiceRegistry>,
    voice_id: Mutex<String>,
    params: Mutex<SynthesisParams>,
    sink: Mutex<Option<Box<dyn AudioSink>>>,
    active: Mutex<Option<ActivePlayback>>,
    pending: Mutex<Option<PendingSay>>,
    current_viseme: AtomicI32,
    on_started: Mutex<Vec<SpeechCallback>>,
    on_finished: Mutex<Vec<SpeechCallback>>,
}

impl Speaker {
    pub fn new(registry: Arc<VoiceRegistry>) -> Self {
        Self {
            registry,
            voice_id: Mutex::new(String::new()),
            params: Mutex::new(SynthesisParams::default()),
            sink: Mutex::new(None),
            active: Mutex::new(None),
            pending: Mutex::new(None),
            current_viseme: AtomicI32::new(0),
            on_started: Mutex::new(Vec::new()),
            on_finished: Mutex::new(Vec::new()),
        }
    }

    /// Register the external playback stage.
    pub fn set_audio_sink(&self, sink: Box<dyn AudioSink>) {
        *self.sink.lock() = Some(sink);
    }

    /// Select a voice from the registry.
    pub fn set_voice(&self, voice: &Arc<Voice>) {
        *self.voice_id.lock() = voice.id.clone();
    }

    pub fn set_voice_id(&self, id: impl Into<String>) {
        *self.voice_id.lock() = id.into();
    }

    pub fn voice_id(&self) -> String {
        self.voice_id.lock().clone()
    }

    /// The currently selected voice, if it exists in the registry.
    pub fn voice(&self) -> Option<Arc<Voice>> {
        self.registry.find_by_id(&self.voice_id.lock())
    }

    pub fn set_volume(&self, volume: i32) {
        self.params.lock().volume = volume;
    }

    pub fn volume(&self) -> i32 {
        self.params.lock().volume
    }

    pub fn set_pitch(&self, pitch: i32) {
        self.params.lock().pitch = pitch;
    }

    pub fn pitch(&self) -> i32 {
        self.params.lock().pitch
    }

    pub fn set_speed(&self, speed: i32) {
        self.params.lock().speed = speed;
    }

    pub fn speed(&self) -> i32 {
        self.params.lock().speed
    }

    pub fn set_pause_ms(&self, pause_ms: i32) {
        self.params.lock().pause_ms = pause_ms;
    }

    pub fn pause_ms(&self) -> i32 {
        self.params.lock().pause_ms
    }

    pub fn set_comma_pause_ms(&self, comma_pause_ms: i32) {
        self.params.lock().comma_pause_ms = comma_pause_ms;
    }

    pub fn comma_pause_ms(&self) -> i32 {
        self.params.lock().comma_pause_ms
    }

    /// Snapshot of the full parameter set.
    pub fn params(&self) -> SynthesisParams {
        self.params.lock().clone()
    }

    /// Register a callback fired when this speaker starts speaking.
    pub fn on_started(&self, callback: SpeechCallback) {
        self.on_started.lock().push(callback);
    }

    /// Register a callback fired when this speaker finishes speaking.
    pub fn on_finished(&self, callback: SpeechCallback) {
        self.on_finished.lock().push(callback);
    }

    /// True while speech is actively playing (not paused, not done).
    pub fn is_speaking(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .map(|a| !a.paused && a.remaining > 0.0)
            .unwrap_or(false)
    }

    /// Viseme id the playback cursor most recently passed.
    pub fn current_viseme(&self) -> i32 {
        self.current_viseme.load(Ordering::SeqCst)
    }

    /// Synthesize `text` with this speaker's settings and play it.
    ///
    /// Blocks the caller for the duration of synthesis; use
    /// [`Speaker::say_async`] from latency-sensitive contexts.
    ///
    /// # Errors
    /// - `TtsError::VoiceNotFound` when the selected voice is missing.
    /// - `TtsError::NoAudioSink` when no sink is registered.
    /// - Synthesis errors from the backend.
    pub fn say(&self, text: &str, kind: TextKind) -> Result<()> {
        let converter = self.build_converter()?;
        converter.convert_to_buffer_sync_info(text, kind)?;
        self.begin_playback(&converter, text, kind)
    }

    /// Synthesize in the background; playback begins on the tick after
    /// conversion completes.
    ///
    /// # Errors
    /// `TtsError::VoiceNotFound` when the selected voice is missing.
    pub fn say_async(&self, text: &str, kind: TextKind) -> Result<()> {
        let converter = Arc::new(self.build_converter()?);
        let task = converter.convert_to_buffer_async_sync_info(text.to_owned(), kind);
        let replaced = self
            .pending
            .lock()
            .replace(PendingSay {
                task,
                converter,
                text: text.to_owned(),
                kind,
            })
            .is_some();
        if replaced {
            debug!("previous pending conversion superseded");
        }
        Ok(())
    }

    /// Pause playback; the viseme cursor and remaining time freeze.
    pub fn pause_speaking(&self) {
        let mut active = self.active.lock();
        if let Some(active) = active.as_mut() {
            if !active.paused {
                active.paused = true;
                if let Some(sink) = self.sink.lock().as_mut() {
                    sink.set_paused(true);
                }
            }
        }
    }

    pub fn resume_speaking(&self) {
        let mut active = self.active.lock();
        if let Some(active) = active.as_mut() {
            if active.paused {
                active.paused = false;
                if let Some(sink) = self.sink.lock().as_mut() {
                    sink.set_paused(false);
                }
            }
        }
    }

    /// Stop playback immediately, discarding the rest of the utterance.
    /// No finished notification fires.
    pub fn interrupt_speaking(&self) {
        let had_active = self.active.lock().take().is_some();
        if had_active {
            if let Some(sink) = self.sink.lock().as_mut() {
                sink.stop();
            }
        }
    }

    // ── Internal helpers ─────────────────────────────────────────────

    fn build_converter(&self) -> Result<Converter> {
        let id = self.voice_id.lock().clone();
        let Some(voice) = self.registry.find_by_id(&id) else {
            error!(voice_id = %id, "could not find requested voice");
            return Err(TtsError::VoiceNotFound(id));
        };
        Ok(Converter::new(voice, self.params.lock().clone()))
    }

    fn begin_playback(&self, converter: &Converter, text: &str, kind: TextKind) -> Result<()> {
        let voice = converter.voice();
        let samples = converter.audio_data();
        let visemes = converter.take_viseme_timeline();

        let length = if voice.sampling == 0 || voice.channels == 0 {
            0.0
        } else {
            samples.len() as f64 / (voice.sampling as f64 * voice.channels as f64)
        };

        {
            let mut sink_guard = self.sink.lock();
            let Some(sink) = sink_guard.as_mut() else {
                error!("no audio sink set — set one on the speaker first");
                return Err(TtsError::NoAudioSink);
            };
            let audio = SynthesizedAudio {
                samples,
                sample_rate: voice.sampling,
                channels: voice.channels,
                bit_depth: converter.params().output_format.bit_depth(),
            };
            if let Err(e) = sink.play(audio) {
                error!(error = %e, "audio sink rejected synthesized buffer");
            }
        }

        *self.active.lock() = Some(ActivePlayback {
            text: text.to_owned(),
            kind,
            length,
            remaining: length,
            visemes,
            paused: false,
        });

        info!(voice = %voice.id, length_secs = length, "started speaking");
        for callback in self.on_started.lock().iter() {
            callback(text, kind);
        }
        Ok(())
    }

    /// Promote a finished background conversion into playback.
    fn poll_pending(&self) {
        let finished = {
            let pending = self.pending.lock();
            matches!(&*pending, Some(p) if p.task.is_finished())
        };
        if !finished {
            return;
        }
        let Some(pending) = self.pending.lock().take() else {
            return;
        };
        if let Err(e) = self.begin_playback(&pending.converter, &pending.text, pending.kind) {
            error!(error = %e, "deferred playback failed");
        }
    }

    /// Advance the playback cursor and drain due viseme timestamps.
    fn advance_playback(&self, dt: f32) {
        let mut finished: Option<(String, TextKind)> = None;
        {
            let mut guard = self.active.lock();
            if let Some(active) = guard.as_mut() {
                if active.paused {
                    return;
                }
                active.remaining -= dt as f64;
                let elapsed = active.length - active.remaining;

                while active
                    .visemes
                    .front()
                    .map_or(false, |v| v.time as f64 <= elapsed)
                {
                    if let Some(v) = active.visemes.pop_front() {
                        self.current_viseme.store(v.viseme_id as i32, Ordering::SeqCst);
                    }
                }

                if active.remaining <= 0.0 {
                    finished = Some((std::mem::take(&mut active.text), active.kind));
                    *guard = None;
                }
            }
        }

        if let Some((text, kind)) = finished {
            info!("finished speaking");
            for callback in self.on_finished.lock().iter() {
                callback(&text, kind);
            }
        }
    }
}

impl Tickable for Speaker {
    fn tick(&self, dt: f32) {
        self.poll_pending();
        self.advance_playback(dt);
    }
}

/// Explicit registration list for whole-scene playback control.
///
/// Speakers register on creation and are weakly held; dropped speakers
/// fall out of the list on the next broadcast.
#[derive(Default)]
pub struct SpeakerGroup {
    speakers: Mutex<Vec<Weak<Speaker>>>,
}

impl SpeakerGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, speaker: &Arc<Speaker>) {
        self.speakers.lock().push(Arc::downgrade(speaker));
    }

    pub fn unbind(&self, speaker: &Arc<Speaker>) {
        self.speakers
            .lock()
            .retain(|w| w.upgrade().map_or(false, |s| !Arc::ptr_eq(&s, speaker)));
    }

    pub fn pause_all(&self) {
        info!("pausing all speakers");
        self.for_each(|s| s.pause_speaking());
    }

    pub fn resume_all(&self) {
        info!("resuming all speakers");
        self.for_each(|s| s.resume_speaking());
    }

    pub fn interrupt_all(&self) {
        info!("interrupting all speakers");
        self.for_each(|s| s.interrupt_speaking());
    }

    fn for_each(&self, f: impl Fn(&Speaker)) {
        let mut speakers = self.speakers.lock();
        speakers.retain(|w| w.upgrade().is_some());
        for weak in speakers.iter() {
            if let Some(speaker) = weak.upgrade() {
                f(&speaker);
            }
        }
    }
}
