//! `LipsyncEngine` — streaming audio-to-viseme controller.
//!
//! ## Data flow (per tick)
//!
//! ```text
//! feed_audio(bytes)  ──► ingestion queue (any thread, never blocks)
//!                              │ try-lock drain
//!                              ▼
//!                    Chunker::cook → UtteranceUnit
//!                              │
//!                              ▼
//!                        result queue ──► playback controller
//!                                               │ try-lock dequeue
//!                                               ▼
//!                                      PlaybackSink::play
//! ```
//!
//! Fragments may be fed from any thread; the tick is the single
//! consumer. Both drains use non-blocking lock acquisition — a
//! contended lock defers the work to the next tick instead of stalling
//! the caller.
//!
//! ## Playback resumption
//!
//! The controller is Idle / Speaking / Pending. A completed utterance
//! (sink reports 100 %) chains straight into the next queued unit for
//! gapless playback; only when the queue is empty does the engine fall
//! back to the neutral pose.

pub mod playback;

use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc,
};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::{
    analyzer::{AnalyzerConfig, AnalyzerHandle, ProviderKind},
    chunker::Chunker,
    error::{LipwaveError, Result},
    events::{EngineStatus, PlaybackEvent, PlaybackPhase, UtteranceEvent},
    fragment::{samples_to_bytes, AudioFragment},
    lifecycle::{Lifecycle, Tickable},
    viseme::{FrameSequence, UtteranceUnit},
};

use playback::{PlaybackAudio, PlaybackSink};

/// Broadcast channel capacity: events buffered for slow subscribers.
const BROADCAST_CAP: usize = 256;

/// Sink progress within this distance of 1.0 counts as complete.
const PERCENT_COMPLETE_EPSILON: f32 = 1e-4;

/// Configuration for `LipsyncEngine`.
#[derive(Debug, Clone)]
pub struct LipsyncConfig {
    /// Sample rate in Hz of the fed PCM. Default: 44100.
    pub sample_rate: u32,
    /// Interleaved channel count of the fed PCM. Default: 1.
    pub channels: u32,
    /// Playback volume in [0, 100]. Default: 50.
    pub volume: u32,
    /// Analyzer look-ahead compensation in milliseconds. Default: 0.
    pub frame_delay_ms: u32,
    /// Analysis model variant. Default: `EnhancedWithLaughter`.
    pub provider: ProviderKind,
    /// Analyzer internal buffer size in samples. Default: 4096.
    pub buffer_size: u32,
    /// Enable hardware acceleration on supported backends.
    pub hardware_acceleration: bool,
}

impl Default for LipsyncConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 1,
            volume: 50,
            frame_delay_ms: 0,
            provider: ProviderKind::EnhancedWithLaughter,
            buffer_size: 4_096,
            hardware_acceleration: true,
        }
    }
}

impl LipsyncConfig {
    /// Analyzer construction parameters derived from this config.
    pub fn analyzer_config(&self) -> AnalyzerConfig {
        AnalyzerConfig {
            provider: self.provider,
            sample_rate: self.sample_rate,
            buffer_size: self.buffer_size,
            hardware_acceleration: self.hardware_acceleration,
        }
    }
}

pub struct PipelineDiagnostics {
    pub fragments_in: AtomicUsize,
    pub fragments_dropped: AtomicUsize,
    pub frames_committed: AtomicUsize,
    pub units_queued: AtomicUsize,
    pub units_played: AtomicUsize,
}

impl Default for PipelineDiagnostics {
    fn default() -> Self {
        Self {
            fragments_in: AtomicUsize::new(0),
            fragments_dropped: AtomicUsize::new(0),
            frames_committed: AtomicUsize::new(0),
            units_queued: AtomicUsize::new(0),
            units_played: AtomicUsize::new(0),
        }
    }
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.fragments_in.store(0, Ordering::Relaxed);
        self.fragments_dropped.store(0, Ordering::Relaxed);
        self.frames_committed.store(0, Ordering::Relaxed);
        self.units_queued.store(0, Ordering::Relaxed);
        self.units_played.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            fragments_in: self.fragments_in.load(Ordering::Relaxed),
            fragments_dropped: self.fragments_dropped.load(Ordering::Relaxed),
            frames_committed: self.frames_committed.load(Ordering::Relaxed),
            units_queued: self.units_queued.load(Ordering::Relaxed),
            units_played: self.units_played.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DiagnosticsSnapshot {
    pub fragments_in: usize,
    pub fragments_dropped: usize,
    pub frames_committed: usize,
    pub units_queued: usize,
    pub units_played: usize,
}

/// The streaming lip-sync engine.
///
/// `LipsyncEngine` is `Send + Sync` — all fields use interior
/// mutability. Wrap in `Arc` to share between the feeding threads and
/// the ticking context.
pub struct LipsyncEngine {
    config: LipsyncConfig,
    analyzer: AnalyzerHandle,
    /// `Some` while running. The mutex doubles as the single-consumer
    /// gate on the ingestion drain.
    chunker: Mutex<Option<Chunker>>,
    ingest_tx: Sender<AudioFragment>,
    ingest_rx: Receiver<AudioFragment>,
    result_tx: Sender<UtteranceUnit>,
    result_rx: Receiver<UtteranceUnit>,
    /// Non-blocking gate on the dequeue-and-play step.
    playback_lock: Mutex<()>,
    /// Timeline of the currently playing utterance.
    active: Mutex<Option<Arc<FrameSequence>>>,
    sink: Mutex<Option<Box<dyn PlaybackSink>>>,
    speaking: AtomicBool,
    running: AtomicBool,
    status: Mutex<EngineStatus>,
    utterance_tx: broadcast::Sender<UtteranceEvent>,
    playback_tx: broadcast::Sender<PlaybackEvent>,
    seq: AtomicU64,
    diagnostics: PipelineDiagnostics,
}

impl LipsyncEngine {
    /// Create a new engine around a frame analyzer. Does not prime the
    /// analyzer — call `start()` before feeding audio.
    pub fn new(config: LipsyncConfig, analyzer: AnalyzerHandle) -> Self {
        let (ingest_tx, ingest_rx) = unbounded();
        let (result_tx, result_rx) = unbounded();
        let (utterance_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (playback_tx, _) = broadcast::channel(BROADCAST_CAP);

        Self {
            config,
            analyzer,
            chunker: Mutex::new(None),
            ingest_tx,
            ingest_rx,
            result_tx,
            result_rx,
            playback_lock: Mutex::new(()),
            active: Mutex::new(None),
            sink: Mutex::new(None),
            speaking: AtomicBool::new(false),
            running: AtomicBool::new(false),
            status: Mutex::new(EngineStatus::Idle),
            utterance_tx,
            playback_tx,
            seq: AtomicU64::new(0),
            diagnostics: PipelineDiagnostics::default(),
        }
    }

    /// Register the external playback stage.
    pub fn set_playback_sink(&self, sink: Box<dyn PlaybackSink>) {
        *self.sink.lock() = Some(sink);
    }

    /// Accept one fragment of raw little-endian 16-bit PCM.
    ///
    /// Callable from any thread; enqueues and returns immediately.
    ///
    /// # Errors
    /// `LipwaveError::AnalyzerUnavailable` if the engine has not been
    /// started — the fragment is dropped and nothing is mutated.
    pub fn feed_audio(&self, bytes: Vec<u8>) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            error!("feed_audio: analyzer not available — fragment dropped");
            return Err(LipwaveError::AnalyzerUnavailable);
        }
        self.diagnostics.fragments_in.fetch_add(1, Ordering::Relaxed);
        let _ = self.ingest_tx.send(AudioFragment::new(bytes));
        Ok(())
    }

    /// True while an utterance is being played by the sink.
    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    /// Timeline of the utterance currently driving playback.
    pub fn active_sequence(&self) -> Option<Arc<FrameSequence>> {
        self.active.lock().clone()
    }

    /// Utterance units chunked but not yet played.
    pub fn queued_utterances(&self) -> usize {
        self.result_rx.len()
    }

    /// Current engine status (snapshot).
    pub fn status(&self) -> EngineStatus {
        *self.status.lock()
    }

    /// Subscribe to utterance-queued events.
    pub fn subscribe_utterances(&self) -> broadcast::Receiver<UtteranceEvent> {
        self.utterance_tx.subscribe()
    }

    /// Subscribe to playback transition events.
    pub fn subscribe_playback(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.playback_tx.subscribe()
    }

    /// Snapshot of pipeline counters for observability.
    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    /// Progress report from the playback sink.
    ///
    /// At 100 % the controller either chains into the next queued
    /// utterance (gapless) or, with nothing queued, leaves the speaking
    /// state and settles on the neutral pose.
    pub fn on_playback_percent(&self, percent: f32) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        if (1.0 - percent).abs() > PERCENT_COMPLETE_EPSILON {
            return;
        }
        if self.result_rx.is_empty() {
            self.speaking.store(false, Ordering::SeqCst);
            self.emit_playback(PlaybackPhase::Finished);
            self.on_playback_finished();
        } else {
            self.try_resume_playback();
        }
    }

    /// Finished report from the playback sink.
    pub fn on_playback_finished(&self) {
        if self.result_rx.is_empty() {
            *self.active.lock() = None;
            self.emit_playback(PlaybackPhase::Neutral);
        }
    }

    // ── Internal helpers ─────────────────────────────────────────────

    /// Fully drain the ingestion queue through the chunker.
    ///
    /// Skipped without blocking when another drain holds the lock.
    fn drain_ingest(&self) {
        if self.ingest_rx.is_empty() {
            return;
        }
        let Some(mut chunker_guard) = self.chunker.try_lock() else {
            return;
        };
        let Some(chunker) = chunker_guard.as_mut() else {
            return;
        };

        while let Ok(fragment) = self.ingest_rx.try_recv() {
            match chunker.cook(&fragment) {
                Ok(unit) => {
                    let frame_count = unit.sequence.len();
                    let sample_count = unit.samples.len();
                    self.diagnostics
                        .frames_committed
                        .fetch_add(frame_count, Ordering::Relaxed);
                    if self.result_tx.send(unit).is_ok() {
                        self.diagnostics.units_queued.fetch_add(1, Ordering::Relaxed);
                        self.emit_utterance(frame_count, sample_count);
                    }
                }
                Err(e) => {
                    self.diagnostics
                        .fragments_dropped
                        .fetch_add(1, Ordering::Relaxed);
                    error!(error = %e, "failed to chunk fragment — dropped");
                }
            }
        }
    }

    /// Dequeue exactly one utterance unit and hand it to the sink.
    ///
    /// No-op when the queue is empty, when the playback lock is
    /// contended, or when no sink is registered (the unit stays queued).
    fn try_resume_playback(&self) {
        if self.result_rx.is_empty() {
            return;
        }
        let Some(_guard) = self.playback_lock.try_lock() else {
            return;
        };

        let mut sink_guard = self.sink.lock();
        let Some(sink) = sink_guard.as_mut() else {
            error!("no playback sink registered — utterance left queued");
            return;
        };
        let Ok(unit) = self.result_rx.try_recv() else {
            return;
        };

        let audio = PlaybackAudio {
            data: samples_to_bytes(&unit.samples),
            sample_rate: self.config.sample_rate / 2,
            channels: self.config.channels,
            volume: self.config.volume.min(100) as f32 / 100.0,
        };
        *self.active.lock() = Some(Arc::new(unit.sequence));
        if let Err(e) = sink.play(audio) {
            error!(error = %e, "playback sink rejected buffer");
        }
        self.speaking.store(true, Ordering::SeqCst);
        self.diagnostics.units_played.fetch_add(1, Ordering::Relaxed);
        self.emit_playback(PlaybackPhase::Started);
    }

    fn emit_utterance(&self, frame_count: usize, sample_count: usize) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let _ = self.utterance_tx.send(UtteranceEvent {
            seq,
            frame_count,
            sample_count,
        });
    }

    fn emit_playback(&self, phase: PlaybackPhase) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let _ = self.playback_tx.send(PlaybackEvent { seq, phase });
    }
}

impl Lifecycle for LipsyncEngine {
    type Error = LipwaveError;

    /// Prime the analyzer and begin accepting fragments.
    ///
    /// # Errors
    /// - `LipwaveError::AlreadyRunning` if already started.
    /// - Configuration/analyzer errors from chunker construction.
    fn start(&self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(LipwaveError::AlreadyRunning);
        }

        let chunker = Chunker::new(&self.config, self.analyzer.clone())?;
        *self.chunker.lock() = Some(chunker);
        self.diagnostics.reset();
        self.running.store(true, Ordering::SeqCst);
        *self.status.lock() = EngineStatus::Streaming;
        info!(
            sample_rate = self.config.sample_rate,
            channels = self.config.channels,
            frame_delay_ms = self.config.frame_delay_ms,
            "lipsync engine started"
        );
        Ok(())
    }

    /// Tear down: queued fragments and utterance units are discarded
    /// without replay; no analyzer calls occur afterwards.
    ///
    /// # Errors
    /// `LipwaveError::NotRunning` if not currently running.
    fn stop(&self) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(LipwaveError::NotRunning);
        }

        self.running.store(false, Ordering::SeqCst);
        *self.chunker.lock() = None;
        while self.ingest_rx.try_recv().is_ok() {}
        while self.result_rx.try_recv().is_ok() {}
        *self.active.lock() = None;
        self.speaking.store(false, Ordering::SeqCst);
        self.analyzer.0.lock().reset();
        *self.status.lock() = EngineStatus::Stopped;

        let snap = self.diagnostics.snapshot();
        info!(
            fragments_in = snap.fragments_in,
            fragments_dropped = snap.fragments_dropped,
            frames_committed = snap.frames_committed,
            units_queued = snap.units_queued,
            units_played = snap.units_played,
            "lipsync engine stopped — diagnostics"
        );
        Ok(())
    }
}

impl Tickable for LipsyncEngine {
    /// One cooperative slice: drain pending fragments, then resume
    /// playback if idle with work queued.
    fn tick(&self, _dt: f32) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }

        self.drain_ingest();

        if !self.result_rx.is_empty() && !self.speaking.load(Ordering::SeqCst) {
            debug!(queued = self.result_rx.len(), "resuming playback");
            self.try_resume_playback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::analyzer::FrameAnalyzer;
    use crate::viseme::VisemeFrame;

    /// Emits a running fragment index so playback order is observable.
    struct CountingAnalyzer {
        calls: u32,
    }

    impl CountingAnalyzer {
        fn new() -> Self {
            Self { calls: 0 }
        }
    }

    impl FrameAnalyzer for CountingAnalyzer {
        fn analyze(&mut self, _frame: &[i16], _delay_ms: u32, _stereo: bool) -> Result<VisemeFrame> {
            self.calls += 1;
            Ok(VisemeFrame::new(vec![self.calls as f32], 0.0))
        }

        fn reset(&mut self) {
            self.calls = 0;
        }
    }

    struct CaptureSink {
        played: Arc<Mutex<Vec<PlaybackAudio>>>,
    }

    impl PlaybackSink for CaptureSink {
        fn play(&mut self, audio: PlaybackAudio) -> Result<()> {
            self.played.lock().push(audio);
            Ok(())
        }
    }

    fn engine_with_sink() -> (Arc<LipsyncEngine>, Arc<Mutex<Vec<PlaybackAudio>>>) {
        let engine = Arc::new(LipsyncEngine::new(
            LipsyncConfig::default(),
            AnalyzerHandle::new(CountingAnalyzer::new()),
        ));
        let played = Arc::new(Mutex::new(Vec::new()));
        engine.set_playback_sink(Box::new(CaptureSink {
            played: Arc::clone(&played),
        }));
        (engine, played)
    }

    fn bytes_of(value: i16, samples: usize) -> Vec<u8> {
        samples_to_bytes(&vec![value; samples])
    }

    #[test]
    fn feed_before_start_is_rejected_and_drops_fragment() {
        let (engine, played) = engine_with_sink();
        let err = engine.feed_audio(bytes_of(1, 220)).unwrap_err();
        assert!(matches!(err, LipwaveError::AnalyzerUnavailable));

        engine.start().unwrap();
        engine.tick(0.016);
        assert!(played.lock().is_empty());
        assert_eq!(engine.queued_utterances(), 0);
    }

    #[test]
    fn start_twice_and_stop_twice_error() {
        let (engine, _) = engine_with_sink();
        engine.start().unwrap();
        assert!(matches!(
            engine.start().unwrap_err(),
            LipwaveError::AlreadyRunning
        ));
        engine.stop().unwrap();
        assert!(matches!(
            engine.stop().unwrap_err(),
            LipwaveError::NotRunning
        ));
    }

    #[test]
    fn fed_fragment_is_chunked_and_played_on_tick() {
        let (engine, played) = engine_with_sink();
        engine.start().unwrap();
        assert_eq!(engine.status(), EngineStatus::Streaming);

        engine.feed_audio(bytes_of(50, 1100)).unwrap();
        engine.tick(0.016);

        assert!(engine.is_speaking());
        let played = played.lock();
        assert_eq!(played.len(), 1);
        assert_eq!(played[0].data.len(), 2200);
        assert_eq!(played[0].sample_rate, 22_050);
        assert!((played[0].volume - 0.5).abs() < 1e-6);
        assert_eq!(engine.active_sequence().unwrap().len(), 5);
    }

    #[test]
    fn second_tick_while_speaking_does_not_double_dequeue() {
        let (engine, played) = engine_with_sink();
        engine.start().unwrap();

        engine.feed_audio(bytes_of(10, 440)).unwrap();
        engine.feed_audio(bytes_of(20, 440)).unwrap();
        engine.tick(0.016);
        engine.tick(0.016);
        engine.tick(0.016);

        // First unit playing, second stays queued until completion.
        assert_eq!(played.lock().len(), 1);
        assert_eq!(engine.queued_utterances(), 1);
    }

    #[test]
    fn completion_with_queue_chains_gapless_replay() {
        let (engine, played) = engine_with_sink();
        engine.start().unwrap();

        engine.feed_audio(bytes_of(10, 440)).unwrap();
        engine.feed_audio(bytes_of(20, 440)).unwrap();
        engine.tick(0.016);
        assert_eq!(played.lock().len(), 1);

        engine.on_playback_percent(1.0);
        // Chained straight into the next unit without returning to idle.
        assert!(engine.is_speaking());
        assert_eq!(played.lock().len(), 2);
        assert_eq!(engine.queued_utterances(), 0);
    }

    #[test]
    fn completion_with_empty_queue_returns_to_neutral() {
        let (engine, _) = engine_with_sink();
        engine.start().unwrap();
        let mut playback_rx = engine.subscribe_playback();

        engine.feed_audio(bytes_of(10, 440)).unwrap();
        engine.tick(0.016);
        assert!(engine.active_sequence().is_some());

        engine.on_playback_percent(1.0);
        assert!(!engine.is_speaking());
        assert!(engine.active_sequence().is_none());

        let phases: Vec<PlaybackPhase> =
            std::iter::from_fn(|| playback_rx.try_recv().ok().map(|e| e.phase)).collect();
        assert_eq!(
            phases,
            vec![
                PlaybackPhase::Started,
                PlaybackPhase::Finished,
                PlaybackPhase::Neutral
            ]
        );
    }

    #[test]
    fn partial_progress_reports_are_ignored() {
        let (engine, played) = engine_with_sink();
        engine.start().unwrap();

        engine.feed_audio(bytes_of(10, 440)).unwrap();
        engine.tick(0.016);
        engine.on_playback_percent(0.5);

        assert!(engine.is_speaking());
        assert_eq!(played.lock().len(), 1);
    }

    #[test]
    fn units_play_in_submission_order() {
        let (engine, played) = engine_with_sink();
        engine.start().unwrap();

        for value in [1i16, 2, 3, 4] {
            engine.feed_audio(bytes_of(value, 220)).unwrap();
        }
        engine.tick(0.016);
        engine.on_playback_percent(1.0);
        engine.on_playback_percent(1.0);
        engine.on_playback_percent(1.0);

        let played = played.lock();
        assert_eq!(played.len(), 4);
        let first_samples: Vec<i16> = played
            .iter()
            .map(|audio| i16::from_le_bytes([audio.data[0], audio.data[1]]))
            .collect();
        assert_eq!(first_samples, vec![1, 2, 3, 4]);
    }

    #[test]
    fn missing_sink_leaves_unit_queued() {
        let engine = Arc::new(LipsyncEngine::new(
            LipsyncConfig::default(),
            AnalyzerHandle::new(CountingAnalyzer::new()),
        ));
        engine.start().unwrap();

        engine.feed_audio(bytes_of(10, 440)).unwrap();
        engine.tick(0.016);

        assert!(!engine.is_speaking());
        assert_eq!(engine.queued_utterances(), 1);

        // Registering a sink later recovers the queued unit.
        let played = Arc::new(Mutex::new(Vec::new()));
        engine.set_playback_sink(Box::new(CaptureSink {
            played: Arc::clone(&played),
        }));
        engine.tick(0.016);
        assert_eq!(played.lock().len(), 1);
    }

    #[test]
    fn stop_discards_queued_work_without_replay() {
        let (engine, played) = engine_with_sink();
        engine.start().unwrap();

        engine.feed_audio(bytes_of(10, 440)).unwrap();
        engine.tick(0.016);
        engine.feed_audio(bytes_of(20, 440)).unwrap();
        engine.feed_audio(bytes_of(30, 440)).unwrap();
        engine.tick(0.016);

        engine.stop().unwrap();
        assert_eq!(engine.status(), EngineStatus::Stopped);
        assert_eq!(engine.queued_utterances(), 0);
        assert!(engine.active_sequence().is_none());
        assert!(!engine.is_speaking());

        // Ticks after stop do nothing.
        engine.tick(0.016);
        assert_eq!(played.lock().len(), 1);
    }

    #[test]
    fn diagnostics_track_pipeline_counters() {
        let (engine, _) = engine_with_sink();
        engine.start().unwrap();

        engine.feed_audio(bytes_of(10, 1100)).unwrap();
        engine.feed_audio(bytes_of(20, 220)).unwrap();
        engine.tick(0.016);

        let snap = engine.diagnostics_snapshot();
        assert_eq!(snap.fragments_in, 2);
        assert_eq!(snap.units_queued, 2);
        assert_eq!(snap.frames_committed, 6);
        assert_eq!(snap.units_played, 1);
        assert_eq!(snap.fragments_dropped, 0);
    }

    #[test]
    fn utterance_events_carry_frame_and_sample_counts() {
        let (engine, _) = engine_with_sink();
        engine.start().unwrap();
        let mut rx = engine.subscribe_utterances();

        engine.feed_audio(bytes_of(10, 1100)).unwrap();
        engine.tick(0.016);

        let event = rx.try_recv().expect("utterance event");
        assert_eq!(event.frame_count, 5);
        assert_eq!(event.sample_count, 1100);
    }
}
