//! Energy-based reference analyzer.
//!
//! ## Algorithm
//!
//! 1. Compute RMS of the incoming frame (normalised to [0, 1]).
//! 2. RMS below `threshold` → neutral frame (`sil` = 1).
//! 3. RMS at or above `threshold` → open-jaw `aa` shape whose weight
//!    scales with RMS, `sil` taking the remaining weight.
//!
//! Deterministic and dependency-free, so the full pipeline can be
//! exercised end-to-end without a vendor SDK.

use tracing::debug;

use super::{AnalyzerConfig, FrameAnalyzer, ProviderKind};
use crate::error::Result;
use crate::viseme::{VisemeFrame, VISEME_COUNT};

/// Index of the `aa` (open jaw) viseme in the weight vector.
const VISEME_AA: usize = 10;

/// RMS level at which the mouth is considered fully open.
const FULL_OPEN_RMS: f32 = 0.25;

/// A simple RMS-driven lip-sync analyzer.
#[derive(Debug, Clone)]
pub struct EnergyAnalyzer {
    /// Normalised RMS threshold below which a frame reads as silence.
    threshold: f32,
    provider: ProviderKind,
    frames_seen: u64,
}

impl EnergyAnalyzer {
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self::with_threshold(config, 0.02)
    }

    /// # Parameters
    /// - `threshold`: normalised RMS above which a frame drives the jaw.
    ///   Typical range: 0.01–0.05.
    pub fn with_threshold(config: &AnalyzerConfig, threshold: f32) -> Self {
        Self {
            threshold,
            provider: config.provider,
            frames_seen: 0,
        }
    }

    /// Root-mean-square of an `i16` slice, normalised to [0, 1].
    fn rms(frame: &[i16]) -> f32 {
        if frame.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = frame
            .iter()
            .map(|s| {
                let v = *s as f64 / i16::MAX as f64;
                v * v
            })
            .sum();
        (sum_sq / frame.len() as f64).sqrt() as f32
    }
}

impl Default for EnergyAnalyzer {
    fn default() -> Self {
        Self::new(&AnalyzerConfig::default())
    }
}

impl FrameAnalyzer for EnergyAnalyzer {
    fn analyze(&mut self, frame: &[i16], _delay_ms: u32, _stereo: bool) -> Result<VisemeFrame> {
        self.frames_seen += 1;

        let rms = Self::rms(frame);
        let mut weights = vec![0.0f32; VISEME_COUNT];

        if rms < self.threshold {
            weights[0] = 1.0;
        } else {
            let open = (rms / FULL_OPEN_RMS).clamp(0.0, 1.0);
            weights[VISEME_AA] = open;
            weights[0] = 1.0 - open;
        }

        // Laughter detection needs a spectral model; the energy
        // heuristic reports zero for every provider variant.
        Ok(VisemeFrame::new(weights, 0.0))
    }

    fn reset(&mut self) {
        debug!(
            provider = ?self.provider,
            frames_seen = self.frames_seen,
            "EnergyAnalyzer::reset"
        );
        self.frames_seen = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn frame_of(amplitude: i16, len: usize) -> Vec<i16> {
        (0..len)
            .map(|i| if i % 2 == 0 { amplitude } else { -amplitude })
            .collect()
    }

    #[test]
    fn silent_frame_yields_neutral_pose() {
        let mut analyzer = EnergyAnalyzer::default();
        let frame = analyzer.analyze(&vec![0i16; 220], 0, false).unwrap();
        assert_eq!(frame.weights[0], 1.0);
        assert!(frame.weights[1..].iter().all(|w| *w == 0.0));
    }

    #[test]
    fn loud_frame_opens_the_jaw() {
        let mut analyzer = EnergyAnalyzer::default();
        let frame = analyzer
            .analyze(&frame_of(i16::MAX / 2, 220), 0, false)
            .unwrap();
        assert!(frame.weights[VISEME_AA] > 0.5);
        assert_relative_eq!(
            frame.weights[0] + frame.weights[VISEME_AA],
            1.0,
            epsilon = 1e-5
        );
    }

    #[test]
    fn jaw_weight_saturates_at_one() {
        let mut analyzer = EnergyAnalyzer::default();
        let frame = analyzer.analyze(&frame_of(i16::MAX, 220), 0, false).unwrap();
        assert_relative_eq!(frame.weights[VISEME_AA], 1.0, epsilon = 1e-5);
    }

    #[test]
    fn empty_frame_is_silence() {
        let mut analyzer = EnergyAnalyzer::default();
        let frame = analyzer.analyze(&[], 0, false).unwrap();
        assert_eq!(frame.weights[0], 1.0);
    }

    #[test]
    fn rms_of_square_wave() {
        // A square wave at ±half-scale has RMS ≈ 0.5.
        let rms = EnergyAnalyzer::rms(&frame_of(i16::MAX / 2, 256));
        assert_relative_eq!(rms, 0.5, epsilon = 1e-3);
    }
}
