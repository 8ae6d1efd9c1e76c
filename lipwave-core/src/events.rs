//! Event types emitted to the embedding application.
//!
//! Each event kind has its own broadcast channel on the engine:
//!
//! | Event | Channel |
//! |-------|---------|
//! | `UtteranceEvent` | `subscribe_utterances()` |
//! | `PlaybackEvent`  | `subscribe_playback()` |

use serde::{Deserialize, Serialize};

/// Emitted when the chunker finishes one fragment and enqueues its
/// utterance unit on the result queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UtteranceEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// Committed viseme frames in the utterance timeline.
    pub frame_count: usize,
    /// Interleaved `i16` samples paired with the timeline.
    pub sample_count: usize,
}

/// Emitted on playback state transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    pub phase: PlaybackPhase,
}

/// Playback controller transitions observable by the embedder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackPhase {
    /// An utterance unit was dequeued and handed to the sink.
    Started,
    /// The sink reported completion and nothing further is queued.
    Finished,
    /// The active timeline was cleared back to the neutral pose.
    Neutral,
}

/// Current state of the lip-sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Engine created but `start()` not yet called.
    Idle,
    /// Accepting fragments and driving playback.
    Streaming,
    /// Stopped; queues cleared, may be restarted.
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utterance_event_serializes_with_camel_case() {
        let event = UtteranceEvent {
            seq: 3,
            frame_count: 5,
            sample_count: 1100,
        };

        let json = serde_json::to_value(&event).expect("serialize utterance event");
        assert_eq!(json["seq"], 3);
        assert_eq!(json["frameCount"], 5);
        assert_eq!(json["sampleCount"], 1100);

        let round_trip: UtteranceEvent =
            serde_json::from_value(json).expect("deserialize utterance event");
        assert_eq!(round_trip.frame_count, 5);
    }

    #[test]
    fn playback_phase_serializes_lowercase() {
        let event = PlaybackEvent {
            seq: 0,
            phase: PlaybackPhase::Neutral,
        };

        let json = serde_json::to_value(&event).expect("serialize playback event");
        assert_eq!(json["phase"], "neutral");

        let round_trip: PlaybackEvent =
            serde_json::from_value(json).expect("deserialize playback event");
        assert_eq!(round_trip.phase, PlaybackPhase::Neutral);
    }

    #[test]
    fn engine_status_rejects_non_lowercase_values() {
        let err = serde_json::from_str::<EngineStatus>(r#""Streaming""#);
        assert!(err.is_err(), "expected invalid casing to fail");
    }
}
