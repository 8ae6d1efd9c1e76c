use thiserror::Error;

/// All errors produced by lipwave-tts.
#[derive(Debug, Error)]
pub enum TtsError {
    #[error("voice engine undefined")]
    VoiceUndefined,

    #[error("no voice matching '{0}'")]
    VoiceNotFound(String),

    #[error("synthesis backend call failed, return code {code}")]
    Backend { code: i32 },

    #[error("no audio sink registered")]
    NoAudioSink,

    #[error("synthesis task failed: {0}")]
    Task(String),

    #[error("WAV encoding error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TtsError>;
