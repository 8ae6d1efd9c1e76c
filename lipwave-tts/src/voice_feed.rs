//! Bridge from synthesized speech into a raw-PCM audio consumer.
//!
//! A `VoiceFeed` synthesizes with a speaker's settings but, instead of
//! playing the result, queues the PCM and forwards it on the next tick
//! as byte fragments — typically straight into
//! `LipsyncEngine::feed_audio`, so a synthesized line drives the same
//! viseme pipeline as live audio.
//!
//! While attached, the speaker's voice is pinned resident: feeds
//! synthesize repeatedly and per-call load/unload churn would dominate.

use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info};

use lipwave_core::fragment::samples_to_bytes;
use lipwave_core::lifecycle::Tickable;

use crate::backend::TextKind;
use crate::converter::{Converter, SynthesisTask};
use crate::error::{Result, TtsError};
use crate::speaker::Speaker;
use crate::voice::Voice;

/// Receives the coalesced PCM bytes drained on each tick.
pub type AudioConsumer = Box<dyn FnMut(Vec<u8>) + Send>;

pub struct VoiceFeed {
    voice: Mutex<Option<Arc<Voice>>>,
    converter: Mutex<Option<Arc<Converter>>>,
    pending: Mutex<Option<SynthesisTask>>,
    audio_tx: Sender<Vec<i16>>,
    audio_rx: Receiver<Vec<i16>>,
    /// Non-blocking gate on the tick drain.
    drain_gate: Mutex<()>,
    consumers: Mutex<Vec<AudioConsumer>>,
}

impl VoiceFeed {
    pub fn new() -> Self {
        let (audio_tx, audio_rx) = unbounded();
        Self {
            voice: Mutex::new(None),
            converter: Mutex::new(None),
            pending: Mutex::new(None),
            audio_tx,
            audio_rx,
            drain_gate: Mutex::new(()),
            consumers: Mutex::new(Vec::new()),
        }
    }

    /// Adopt a speaker's voice and synthesis parameters.
    ///
    /// Pins the voice resident until [`VoiceFeed::detach`] (or drop).
    ///
    /// # Errors
    /// `TtsError::VoiceUndefined` when the speaker has no resolvable
    /// voice.
    pub fn attach_speaker(&self, speaker: &Speaker) -> Result<()> {
        let Some(voice) = speaker.voice() else {
            error!("speaker has no resolvable voice");
            return Err(TtsError::VoiceUndefined);
        };
        if let Err(e) = voice.pin() {
            error!(voice = %voice.id, error = %e, "failed to pin voice for feed");
        }

        *self.converter.lock() = Some(Arc::new(Converter::new(
            Arc::clone(&voice),
            speaker.params(),
        )));
        *self.voice.lock() = Some(voice);
        Ok(())
    }

    /// Release the attached voice and drop any pending conversion.
    pub fn detach(&self) {
        if let Some(voice) = self.voice.lock().take() {
            if let Err(e) = voice.unpin() {
                error!(voice = %voice.id, error = %e, "failed to unpin voice");
            }
        }
        *self.converter.lock() = None;
        *self.pending.lock() = None;
    }

    /// Register a consumer for the forwarded PCM byte fragments.
    pub fn on_audio(&self, consumer: AudioConsumer) {
        self.consumers.lock().push(consumer);
    }

    /// Synthesize `text` now and queue the PCM for the next tick.
    ///
    /// # Errors
    /// `TtsError::VoiceUndefined` before [`VoiceFeed::attach_speaker`];
    /// otherwise synthesis errors from the backend.
    pub fn synthesize(&self, text: &str, kind: TextKind) -> Result<()> {
        let Some(converter) = self.converter.lock().clone() else {
            error!("voice feed has no attached speaker");
            return Err(TtsError::VoiceUndefined);
        };
        converter.convert_to_buffer(text, kind)?;
        self.grab_audio(&converter);
        Ok(())
    }

    /// Synthesize in the background; the PCM is queued on the tick
    /// after conversion completes.
    pub fn synthesize_async(&self, text: &str, kind: TextKind) -> Result<()> {
        let Some(converter) = self.converter.lock().clone() else {
            error!("voice feed has no attached speaker");
            return Err(TtsError::VoiceUndefined);
        };
        let task = converter.convert_to_buffer_async(text.to_owned(), kind);
        if self.pending.lock().replace(task).is_some() {
            debug!("previous pending feed conversion superseded");
        }
        Ok(())
    }

    fn grab_audio(&self, converter: &Converter) {
        let samples = converter.take_audio();
        if !samples.is_empty() {
            let _ = self.audio_tx.send(samples);
        }
    }

    fn poll_pending(&self) {
        let finished = {
            let pending = self.pending.lock();
            matches!(&*pending, Some(t) if t.is_finished())
        };
        if !finished {
            return;
        }
        self.pending.lock().take();
        if let Some(converter) = self.converter.lock().clone() {
            self.grab_audio(&converter);
        }
    }

    /// Coalesce everything queued into one byte fragment and forward
    /// it to the registered consumers.
    fn drain(&self) {
        if self.audio_rx.is_empty() {
            return;
        }
        let Some(_gate) = self.drain_gate.try_lock() else {
            return;
        };

        let mut pcm: Vec<i16> = Vec::new();
        while let Ok(chunk) = self.audio_rx.try_recv() {
            pcm.extend(chunk);
        }
        if pcm.is_empty() {
            return;
        }

        let bytes = samples_to_bytes(&pcm);
        info!(bytes = bytes.len(), "voice feed forwarded audio");
        for consumer in self.consumers.lock().iter_mut() {
            consumer(bytes.clone());
        }
    }
}

impl Tickable for VoiceFeed {
    fn tick(&self, _dt: f32) {
        self.poll_pending();
        self.drain();
    }
}

impl Default for VoiceFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for VoiceFeed {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::Path;

    use crate::backend::{
        SynthesisBackend, SynthesisRequest, SynthesisSink, VoiceInfo,
    };
    use crate::registry::VoiceRegistry;

    struct RampBackend;

    impl SynthesisBackend for RampBackend {
        fn refresh_installations(&self) -> Result<()> {
            Ok(())
        }

        fn discover_voices(&self) -> Result<Vec<VoiceInfo>> {
            Ok(vec![VoiceInfo {
                name: "ashley".into(),
                variant: "d16".into(),
                language: "en-US".into(),
                gender: "female".into(),
                version: "1.0".into(),
                sampling: 22_050,
                channels: 1,
            }])
        }

        fn load_voice(&self, _name: &str, _variant: &str, _license: Option<&Path>) -> Result<()> {
            Ok(())
        }

        fn unload_voice(&self, _name: &str, _variant: &str) -> Result<()> {
            Ok(())
        }

        fn text_to_buffer(
            &self,
            request: &SynthesisRequest,
            sink: &mut dyn SynthesisSink,
        ) -> Result<()> {
            // One sample per character keeps lengths observable.
            let samples: Vec<i16> = (0..request.text.chars().count()).map(|i| i as i16).collect();
            sink.on_audio(&samples);
            Ok(())
        }
    }

    fn feed_with_speaker() -> (VoiceFeed, Arc<Speaker>) {
        let mut registry = VoiceRegistry::new(Arc::new(RampBackend));
        registry.init().unwrap();
        let speaker = Arc::new(Speaker::new(Arc::new(registry)));
        speaker.set_voice_id("Ashley D16");

        let feed = VoiceFeed::new();
        feed.attach_speaker(&speaker).unwrap();
        (feed, speaker)
    }

    #[test]
    fn attach_pins_the_voice_and_detach_unpins() {
        let (feed, speaker) = feed_with_speaker();
        let voice = speaker.voice().unwrap();
        assert!(voice.is_pinned());
        assert!(voice.is_loaded());

        feed.detach();
        assert!(!voice.is_pinned());
        assert!(!voice.is_loaded());
    }

    #[test]
    fn synthesized_audio_is_forwarded_as_bytes_on_tick() {
        let (feed, _speaker) = feed_with_speaker();
        let received: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
        {
            let received = Arc::clone(&received);
            feed.on_audio(Box::new(move |bytes| received.lock().push(bytes)));
        }

        feed.synthesize("hello", TextKind::Normal).unwrap();
        feed.tick(0.016);

        let received = received.lock();
        assert_eq!(received.len(), 1);
        // 5 characters → 5 samples → 10 bytes.
        assert_eq!(received[0].len(), 10);
        assert_eq!(&received[0][..4], &[0, 0, 1, 0]);
    }

    #[test]
    fn multiple_syntheses_coalesce_into_one_fragment() {
        let (feed, _speaker) = feed_with_speaker();
        let received: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
        {
            let received = Arc::clone(&received);
            feed.on_audio(Box::new(move |bytes| received.lock().push(bytes)));
        }

        feed.synthesize("one", TextKind::Normal).unwrap();
        feed.synthesize("four", TextKind::Normal).unwrap();
        feed.tick(0.016);

        let received = received.lock();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].len(), (3 + 4) * 2);
    }

    #[test]
    fn tick_without_audio_forwards_nothing() {
        let (feed, _speaker) = feed_with_speaker();
        let received: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
        {
            let received = Arc::clone(&received);
            feed.on_audio(Box::new(move |bytes| received.lock().push(bytes)));
        }

        feed.tick(0.016);
        assert!(received.lock().is_empty());
    }

    #[test]
    fn synthesize_before_attach_is_rejected() {
        let feed = VoiceFeed::new();
        let err = feed.synthesize("hello", TextKind::Normal).unwrap_err();
        assert!(matches!(err, TtsError::VoiceUndefined));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn async_synthesis_arrives_on_a_later_tick() {
        let (feed, _speaker) = feed_with_speaker();
        let received: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
        {
            let received = Arc::clone(&received);
            feed.on_audio(Box::new(move |bytes| received.lock().push(bytes)));
        }

        feed.synthesize_async("hello", TextKind::Normal).unwrap();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        while received.lock().is_empty() {
            assert!(std::time::Instant::now() < deadline, "conversion stalled");
            feed.tick(0.016);
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(received.lock()[0].len(), 10);
    }
}
