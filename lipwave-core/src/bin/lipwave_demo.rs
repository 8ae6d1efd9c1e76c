//! Feed a synthetic tone burst through the full pipeline and log what
//! the playback stage receives. Exercises the engine end-to-end with
//! the built-in energy analyzer — no vendor SDK required.
//!
//! ```text
//! cargo run --bin lipwave-demo [fragment_count]
//! ```

use std::sync::Arc;

use tracing::info;

use lipwave_core::{
    analyzer::energy::EnergyAnalyzer, AnalyzerHandle, Lifecycle, LipsyncConfig, LipsyncEngine,
    PlaybackAudio, PlaybackSink, Tickable,
};

struct LoggingSink;

impl PlaybackSink for LoggingSink {
    fn play(&mut self, audio: PlaybackAudio) -> lipwave_core::error::Result<()> {
        info!(
            bytes = audio.data.len(),
            sample_rate = audio.sample_rate,
            channels = audio.channels,
            volume = audio.volume,
            "playback sink received buffer"
        );
        Ok(())
    }
}

/// A 220 Hz tone at the given amplitude, `secs` long.
fn tone_bytes(config: &LipsyncConfig, secs: f32, amplitude: f32) -> Vec<u8> {
    let total = (config.sample_rate as f32 * secs) as usize * config.channels as usize;
    let mut bytes = Vec::with_capacity(total * 2);
    for i in 0..total {
        let t = i as f32 / config.sample_rate as f32;
        let value = (t * 220.0 * std::f32::consts::TAU).sin() * amplitude * i16::MAX as f32;
        bytes.extend_from_slice(&(value as i16).to_le_bytes());
    }
    bytes
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lipwave_core=info,lipwave_demo=info".parse().unwrap()),
        )
        .init();

    let fragment_count: usize = std::env::args()
        .nth(1)
        .and_then(|v| v.parse().ok())
        .unwrap_or(3);

    let config = LipsyncConfig::default();
    let engine = Arc::new(LipsyncEngine::new(
        config.clone(),
        AnalyzerHandle::new(EnergyAnalyzer::default()),
    ));
    engine.set_playback_sink(Box::new(LoggingSink));
    engine.start()?;

    // Feed from a producer thread while the main thread ticks, the way
    // a network voice source would.
    let feeder = {
        let engine = Arc::clone(&engine);
        let config = config.clone();
        std::thread::spawn(move || {
            for i in 0..fragment_count {
                let amplitude = 0.2 + 0.2 * (i % 3) as f32;
                let bytes = tone_bytes(&config, 0.25, amplitude);
                if let Err(e) = engine.feed_audio(bytes) {
                    tracing::error!(error = %e, "feed failed");
                }
                std::thread::sleep(std::time::Duration::from_millis(30));
            }
        })
    };

    for _ in 0..fragment_count * 10 {
        engine.tick(0.016);
        if engine.is_speaking() {
            // Pretend the sink finished instantly so the queue drains.
            engine.on_playback_percent(1.0);
        }
        std::thread::sleep(std::time::Duration::from_millis(16));
    }
    feeder.join().expect("feeder thread panicked");

    // Drain anything the feeder landed after the loop.
    engine.tick(0.016);
    while engine.is_speaking() {
        engine.on_playback_percent(1.0);
    }

    let snap = engine.diagnostics_snapshot();
    info!(
        fragments_in = snap.fragments_in,
        frames_committed = snap.frames_committed,
        units_played = snap.units_played,
        "demo finished"
    );
    engine.stop()?;
    Ok(())
}
