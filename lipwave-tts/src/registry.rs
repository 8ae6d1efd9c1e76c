//! Installed-voice registry.
//!
//! One registry per application root, initialized once from backend
//! discovery and passed by reference to components that need lookups.
//! There is no process-wide voice list.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};

use crate::backend::SynthesisBackend;
use crate::error::Result;
use crate::voice::Voice;

pub struct VoiceRegistry {
    voices: Vec<Arc<Voice>>,
    backend: Arc<dyn SynthesisBackend>,
    /// License file handed to every voice load, when the deployment
    /// uses file-based licensing.
    license: Option<PathBuf>,
}

impl VoiceRegistry {
    pub fn new(backend: Arc<dyn SynthesisBackend>) -> Self {
        Self {
            voices: Vec::new(),
            backend,
            license: None,
        }
    }

    pub fn with_license(backend: Arc<dyn SynthesisBackend>, license: PathBuf) -> Self {
        Self {
            voices: Vec::new(),
            backend,
            license: Some(license),
        }
    }

    /// Refresh vendor configuration and (re)discover installed voices.
    ///
    /// A failed refresh is logged and discovery still runs — a stale
    /// configuration can still enumerate previously installed voices.
    ///
    /// # Errors
    /// Propagates discovery failure; the registry keeps its previous
    /// contents in that case.
    pub fn init(&mut self) -> Result<()> {
        if let Err(e) = self.backend.refresh_installations() {
            error!(error = %e, "voice installation refresh failed");
        }

        for info in self.backend.discover_voices()? {
            let duplicate = self
                .voices
                .iter()
                .any(|v| v.name == info.name && v.variant == info.variant);
            if duplicate {
                continue;
            }
            info!(
                name = %info.name,
                variant = %info.variant,
                language = %info.language,
                gender = %info.gender,
                sampling = info.sampling,
                channels = info.channels,
                "found voice"
            );
            self.voices.push(Arc::new(Voice::new(
                info,
                Arc::clone(&self.backend),
                self.license.clone(),
            )));
        }
        Ok(())
    }

    pub fn voices(&self) -> &[Arc<Voice>] {
        &self.voices
    }

    pub fn backend(&self) -> &Arc<dyn SynthesisBackend> {
        &self.backend
    }

    /// Lookup by (name, variant) pair.
    pub fn find(&self, name: &str, variant: &str) -> Option<Arc<Voice>> {
        self.voices
            .iter()
            .find(|v| v.name == name && v.variant == variant)
            .cloned()
    }

    /// Lookup by display id, e.g. `"Ashley D16"`.
    pub fn find_by_id(&self, id: &str) -> Option<Arc<Voice>> {
        self.voices.iter().find(|v| v.id == id).cloned()
    }

    pub fn first_with_language(&self, language: &str) -> Option<Arc<Voice>> {
        self.voices
            .iter()
            .find(|v| v.language == language)
            .cloned()
    }

    pub fn first_with_gender(&self, gender: &str) -> Option<Arc<Voice>> {
        self.voices.iter().find(|v| v.gender == gender).cloned()
    }

    pub fn first_with_language_and_gender(
        &self,
        language: &str,
        gender: &str,
    ) -> Option<Arc<Voice>> {
        self.voices
            .iter()
            .find(|v| v.language == language && v.gender == gender)
            .cloned()
    }

    pub fn with_language(&self, language: &str) -> Vec<Arc<Voice>> {
        self.voices
            .iter()
            .filter(|v| v.language == language)
            .cloned()
            .collect()
    }

    pub fn with_gender(&self, gender: &str) -> Vec<Arc<Voice>> {
        self.voices
            .iter()
            .filter(|v| v.gender == gender)
            .cloned()
            .collect()
    }

    pub fn with_language_and_gender(&self, language: &str, gender: &str) -> Vec<Arc<Voice>> {
        self.voices
            .iter()
            .filter(|v| v.language == language && v.gender == gender)
            .cloned()
            .collect()
    }

    /// Distinct languages, in discovery order.
    pub fn available_languages(&self) -> Vec<String> {
        let mut languages: Vec<String> = Vec::new();
        for voice in &self.voices {
            if !languages.contains(&voice.language) {
                languages.push(voice.language.clone());
            }
        }
        languages
    }

    /// Distinct genders available for a language, in discovery order.
    pub fn genders_for_language(&self, language: &str) -> Vec<String> {
        let mut genders: Vec<String> = Vec::new();
        for voice in &self.voices {
            if voice.language == language && !genders.contains(&voice.gender) {
                genders.push(voice.gender.clone());
            }
        }
        genders
    }
}

impl std::fmt::Debug for VoiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceRegistry")
            .field("voices", &self.voices.len())
            .finish_non_exhaustive()
    }
}
