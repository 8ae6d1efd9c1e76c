//! Persisted voice-export settings.
//!
//! Line-oriented text format with two record kinds:
//!
//! ```text
//! verboseDebug:true
//! export:{id=Ashley D16, flags=2200000}
//! ```
//!
//! Each flags digit encodes one platform's availability/selection
//! state, in the fixed order win64, linux64, android, ps4, ps5, xsx,
//! switch. A line that does not parse to exactly the expected shape is
//! dropped with a warning; the remaining lines still load.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;

/// Number of export target platforms.
pub const PLATFORM_COUNT: usize = 7;

/// Platform order of the flag digits.
pub const PLATFORM_ORDER: [&str; PLATFORM_COUNT] =
    ["win64", "linux64", "android", "ps4", "ps5", "xsx", "switch"];

/// Per-platform availability/selection state of one voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformFlag {
    /// The voice database is not installed for this platform.
    Unavailable,
    /// Installed but excluded from export.
    Unused,
    /// Installed and exported.
    Used,
}

impl PlatformFlag {
    fn from_digit(digit: char) -> Option<Self> {
        match digit {
            '0' => Some(PlatformFlag::Unavailable),
            '1' => Some(PlatformFlag::Unused),
            '2' => Some(PlatformFlag::Used),
            _ => None,
        }
    }

    fn as_digit(self) -> char {
        match self {
            PlatformFlag::Unavailable => '0',
            PlatformFlag::Unused => '1',
            PlatformFlag::Used => '2',
        }
    }
}

/// Export selection for one voice across all platforms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceExportEntry {
    pub id: String,
    pub flags: [PlatformFlag; PLATFORM_COUNT],
}

impl VoiceExportEntry {
    pub fn new(id: impl Into<String>, flags: [PlatformFlag; PLATFORM_COUNT]) -> Self {
        Self {
            id: id.into(),
            flags,
        }
    }

    fn flag_string(&self) -> String {
        self.flags.iter().map(|f| f.as_digit()).collect()
    }
}

/// The persisted settings set: debug verbosity plus one export entry
/// per known voice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSettings {
    pub verbose_debug: bool,
    pub entries: Vec<VoiceExportEntry>,
}

impl ExportSettings {
    /// Load settings from `path`. A missing file yields the defaults;
    /// malformed lines are skipped with a warning.
    ///
    /// # Errors
    /// Only on an unreadable existing file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let mut settings = Self::default();
        for line in fs::read_to_string(path)?.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(value) = line.strip_prefix("verboseDebug:") {
                settings.verbose_debug = value == "true";
            } else if let Some(entry) = parse_export_line(line) {
                settings.entries.push(entry);
            } else {
                warn!(line, "settings file invalidated — rescan voice engines to repair");
            }
        }
        Ok(settings)
    }

    /// Write the settings to `path`: the debug flag first, then one
    /// export line per entry, sorted by id.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut entries: Vec<&VoiceExportEntry> = self.entries.iter().collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));

        let mut out = String::new();
        out.push_str(if self.verbose_debug {
            "verboseDebug:true\n"
        } else {
            "verboseDebug:false\n"
        });
        for entry in entries {
            out.push_str(&format!(
                "export:{{id={}, flags={}}}\n",
                entry.id,
                entry.flag_string()
            ));
        }
        fs::write(path, out)?;
        info!(path = %path.display(), entries = self.entries.len(), "export settings saved");
        Ok(())
    }

    /// Merge a fresh availability scan with the stored selections.
    ///
    /// Scanned availability wins: platforms the scan reports as
    /// unavailable become unavailable. Where both sides have a platform
    /// available, the previously chosen Used/Unused selection survives.
    /// The result replaces the stored entries, sorted by id.
    pub fn synchronize(&mut self, scanned: Vec<VoiceExportEntry>) {
        let mut merged = scanned;
        for entry in merged.iter_mut() {
            if let Some(existing) = self.entries.iter().find(|e| e.id == entry.id) {
                for i in 0..PLATFORM_COUNT {
                    if entry.flags[i] != PlatformFlag::Unavailable
                        && existing.flags[i] != PlatformFlag::Unavailable
                    {
                        entry.flags[i] = existing.flags[i];
                    }
                }
            }
        }
        merged.sort_by(|a, b| a.id.cmp(&b.id));
        self.entries = merged;
    }
}

/// Parse `export:{id=<id>, flags=<7 digits>}`; `None` on any mismatch.
fn parse_export_line(line: &str) -> Option<VoiceExportEntry> {
    let body = line.strip_prefix("export:{")?.strip_suffix('}')?;
    let (id_part, flags_part) = body.split_once(", ")?;
    let id = id_part.strip_prefix("id=")?;
    let digits = flags_part.strip_prefix("flags=")?;

    if id.is_empty() || digits.chars().count() != PLATFORM_COUNT {
        return None;
    }
    let mut flags = [PlatformFlag::Unavailable; PLATFORM_COUNT];
    for (i, digit) in digits.chars().enumerate() {
        flags[i] = PlatformFlag::from_digit(digit)?;
    }
    Some(VoiceExportEntry::new(id, flags))
}
