//! Reference-counted voice residency.
//!
//! A `Voice` wraps one vendor voice database. The database is loaded
//! into memory exactly when the reference count crosses 0→1 and
//! unloaded when it returns to 0 — unless the voice is pinned resident,
//! which decouples residency from the count entirely.
//!
//! The residency decision is guarded by a voice-local mutex held only
//! for the load/unload decision, never across a synthesis call.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::backend::{SynthesisBackend, VoiceInfo};
use crate::error::Result;

#[derive(Debug, Default)]
struct ResidencyState {
    ref_count: u32,
    pinned: bool,
}

/// Handle to one installed voice and its residency state.
pub struct Voice {
    /// Display identifier, e.g. `"Ashley D16"`.
    pub id: String,
    pub name: String,
    pub variant: String,
    pub language: String,
    pub gender: String,
    pub version: String,
    /// Output sample rate in Hz.
    pub sampling: u32,
    pub channels: u32,
    license: Option<PathBuf>,
    backend: Arc<dyn SynthesisBackend>,
    state: Mutex<ResidencyState>,
}

/// `"ashley"` + `"d16"` → `"Ashley D16"`.
fn display_id(name: &str, variant: &str) -> String {
    fn capitalize(s: &str) -> String {
        let mut chars = s.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
    format!("{} {}", capitalize(name), capitalize(variant))
}

impl Voice {
    pub fn new(
        info: VoiceInfo,
        backend: Arc<dyn SynthesisBackend>,
        license: Option<PathBuf>,
    ) -> Self {
        Self {
            id: display_id(&info.name, &info.variant),
            name: info.name,
            variant: info.variant,
            language: info.language,
            gender: info.gender,
            version: info.version,
            sampling: info.sampling,
            channels: info.channels,
            license,
            backend,
            state: Mutex::new(ResidencyState::default()),
        }
    }

    pub fn backend(&self) -> &Arc<dyn SynthesisBackend> {
        &self.backend
    }

    /// Take one reference; loads the database on the 0→1 crossing.
    ///
    /// The count increments regardless of the load outcome — callers
    /// inspect the returned result before assuming usability, and must
    /// still pair this with a `release()`.
    pub fn acquire(&self) -> Result<()> {
        let mut state = self.state.lock();
        let mut result = Ok(());
        if state.ref_count == 0 && !state.pinned {
            result = self
                .backend
                .load_voice(&self.name, &self.variant, self.license.as_deref());
            match &result {
                Ok(()) => info!(voice = %self.id, "voice acquired"),
                Err(e) => error!(voice = %self.id, error = %e, "voice failed to be acquired"),
            }
        }
        state.ref_count += 1;
        result
    }

    /// Drop one reference; unloads the database on the →0 crossing.
    pub fn release(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.ref_count == 0 {
            warn!(voice = %self.id, "release without matching acquire");
            return Ok(());
        }
        state.ref_count -= 1;

        let mut result = Ok(());
        if state.ref_count == 0 && !state.pinned {
            result = self.backend.unload_voice(&self.name, &self.variant);
            match &result {
                Ok(()) => info!(voice = %self.id, "voice released"),
                Err(e) => error!(voice = %self.id, error = %e, "voice failed to unload"),
            }
        }
        result
    }

    /// Force the database resident regardless of the reference count.
    /// No-op if already loaded.
    pub fn pin(&self) -> Result<()> {
        let mut state = self.state.lock();
        let mut result = Ok(());
        if state.ref_count == 0 && !state.pinned {
            result = self
                .backend
                .load_voice(&self.name, &self.variant, self.license.as_deref());
            match &result {
                Ok(()) => info!(voice = %self.id, "voice pinned resident"),
                Err(e) => error!(voice = %self.id, error = %e, "voice failed to load"),
            }
        }
        state.pinned = true;
        result
    }

    /// Lift the residency pin; unloads immediately when no references
    /// remain.
    pub fn unpin(&self) -> Result<()> {
        let mut state = self.state.lock();
        let mut result = Ok(());
        if state.ref_count == 0 && state.pinned {
            result = self.backend.unload_voice(&self.name, &self.variant);
            match &result {
                Ok(()) => info!(voice = %self.id, "voice unpinned and unloaded"),
                Err(e) => error!(voice = %self.id, error = %e, "voice failed to unload"),
            }
        }
        state.pinned = false;
        result
    }

    /// True when the database should currently be resident.
    pub fn is_loaded(&self) -> bool {
        let state = self.state.lock();
        state.ref_count > 0 || state.pinned
    }

    pub fn ref_count(&self) -> u32 {
        self.state.lock().ref_count
    }

    pub fn is_pinned(&self) -> bool {
        self.state.lock().pinned
    }
}

impl std::fmt::Debug for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Voice")
            .field("id", &self.id)
            .field("language", &self.language)
            .field("sampling", &self.sampling)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::Path;
    use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

    use crate::backend::{SynthesisRequest, SynthesisSink};
    use crate::error::TtsError;

    /// Counts residency transitions; optionally fails loads.
    pub(crate) struct CountingBackend {
        pub loads: AtomicUsize,
        pub unloads: AtomicUsize,
        pub fail_load_code: AtomicI32,
    }

    impl CountingBackend {
        pub fn new() -> Self {
            Self {
                loads: AtomicUsize::new(0),
                unloads: AtomicUsize::new(0),
                fail_load_code: AtomicI32::new(0),
            }
        }
    }

    impl SynthesisBackend for CountingBackend {
        fn refresh_installations(&self) -> Result<()> {
            Ok(())
        }

        fn discover_voices(&self) -> Result<Vec<VoiceInfo>> {
            Ok(vec![])
        }

        fn load_voice(&self, _name: &str, _variant: &str, _license: Option<&Path>) -> Result<()> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            let code = self.fail_load_code.load(Ordering::SeqCst);
            if code != 0 {
                return Err(TtsError::Backend { code });
            }
            Ok(())
        }

        fn unload_voice(&self, _name: &str, _variant: &str) -> Result<()> {
            self.unloads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn text_to_buffer(
            &self,
            _request: &SynthesisRequest,
            _sink: &mut dyn SynthesisSink,
        ) -> Result<()> {
            Ok(())
        }
    }

    fn test_voice(backend: Arc<CountingBackend>) -> Voice {
        Voice::new(
            VoiceInfo {
                name: "ashley".into(),
                variant: "d16".into(),
                language: "en-US".into(),
                gender: "female".into(),
                version: "1.0".into(),
                sampling: 22_050,
                channels: 1,
            },
            backend,
            None,
        )
    }

    #[test]
    fn display_id_capitalizes_name_and_variant() {
        let voice = test_voice(Arc::new(CountingBackend::new()));
        assert_eq!(voice.id, "Ashley D16");
    }

    #[test]
    fn nested_acquires_load_once_and_unload_once() {
        let backend = Arc::new(CountingBackend::new());
        let voice = test_voice(Arc::clone(&backend));

        voice.acquire().unwrap();
        voice.acquire().unwrap();
        voice.acquire().unwrap();
        assert!(voice.is_loaded());
        assert_eq!(backend.loads.load(Ordering::SeqCst), 1);

        voice.release().unwrap();
        voice.release().unwrap();
        assert!(voice.is_loaded());
        assert_eq!(backend.unloads.load(Ordering::SeqCst), 0);

        voice.release().unwrap();
        assert!(!voice.is_loaded());
        assert_eq!(backend.unloads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn pin_keeps_voice_resident_across_release() {
        let backend = Arc::new(CountingBackend::new());
        let voice = test_voice(Arc::clone(&backend));

        voice.pin().unwrap();
        assert!(voice.is_loaded());
        assert_eq!(backend.loads.load(Ordering::SeqCst), 1);

        voice.acquire().unwrap();
        voice.release().unwrap();
        // Still resident; the pin holds it.
        assert!(voice.is_loaded());
        assert_eq!(backend.unloads.load(Ordering::SeqCst), 0);

        voice.unpin().unwrap();
        assert!(!voice.is_loaded());
        assert_eq!(backend.unloads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unpin_with_live_references_defers_unload_to_last_release() {
        let backend = Arc::new(CountingBackend::new());
        let voice = test_voice(Arc::clone(&backend));

        voice.acquire().unwrap();
        voice.pin().unwrap();
        voice.unpin().unwrap();
        assert!(voice.is_loaded());
        assert_eq!(backend.unloads.load(Ordering::SeqCst), 0);

        voice.release().unwrap();
        assert!(!voice.is_loaded());
        assert_eq!(backend.unloads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn pin_while_acquired_does_not_double_load() {
        let backend = Arc::new(CountingBackend::new());
        let voice = test_voice(Arc::clone(&backend));

        voice.acquire().unwrap();
        voice.pin().unwrap();
        assert_eq!(backend.loads.load(Ordering::SeqCst), 1);
        voice.pin().unwrap();
        assert_eq!(backend.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_load_still_counts_the_reference() {
        let backend = Arc::new(CountingBackend::new());
        backend.fail_load_code.store(-3, Ordering::SeqCst);
        let voice = test_voice(Arc::clone(&backend));

        let err = voice.acquire().unwrap_err();
        assert!(matches!(err, TtsError::Backend { code: -3 }));
        assert_eq!(voice.ref_count(), 1);

        // The pairing release still balances the count.
        voice.release().unwrap();
        assert_eq!(voice.ref_count(), 0);
    }

    #[test]
    fn unmatched_release_is_a_warning_not_an_unload() {
        let backend = Arc::new(CountingBackend::new());
        let voice = test_voice(Arc::clone(&backend));

        voice.release().unwrap();
        assert_eq!(backend.unloads.load(Ordering::SeqCst), 0);
        assert_eq!(voice.ref_count(), 0);
    }

    #[test]
    fn concurrent_acquire_release_stays_balanced() {
        let backend = Arc::new(CountingBackend::new());
        let voice = Arc::new(test_voice(Arc::clone(&backend)));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let voice = Arc::clone(&voice);
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    voice.acquire().unwrap();
                    voice.release().unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().expect("worker panicked");
        }

        assert!(!voice.is_loaded());
        assert_eq!(voice.ref_count(), 0);
        // Every load observed a matching unload.
        assert_eq!(
            backend.loads.load(Ordering::SeqCst),
            backend.unloads.load(Ordering::SeqCst)
        );
    }
}
