use thiserror::Error;

/// All errors produced by lipwave-core.
#[derive(Debug, Error)]
pub enum LipwaveError {
    #[error("frame analyzer is not available — engine not started")]
    AnalyzerUnavailable,

    #[error("frame analysis error: {0}")]
    Analysis(String),

    #[error("invalid engine configuration: {0}")]
    Config(String),

    #[error("no playback sink registered")]
    NoPlaybackSink,

    #[error("playback sink error: {0}")]
    PlaybackSink(String),

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine is not running")]
    NotRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, LipwaveError>;
