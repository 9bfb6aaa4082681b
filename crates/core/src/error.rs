/// Result alias that carries the custom [`MixerError`] type.
pub type Result<T> = std::result::Result<T, MixerError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum MixerError {
    /// Free-form failure, mostly used for poisoned shared state.
    #[error("{0}")]
    Message(String),
    /// A caller handed in a value the subsystem cannot work with.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Manifest or configuration JSON could not be parsed.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// The FFT backend rejected its buffers.
    #[error("{0}")]
    Fft(#[from] realfft::FftError),
    /// Raw bytes for an asset could not be retrieved.
    #[error("failed to fetch `{location}`: {reason}")]
    Fetch { location: String, reason: String },
    /// Bytes were retrieved but are not decodable audio.
    #[error("failed to decode audio: {0}")]
    Decode(String),
    /// The output device or playback graph refused an operation.
    #[error("playback failure: {0}")]
    Playback(String),
}

impl MixerError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn fetch(location: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Fetch {
            location: location.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<&str> for MixerError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for MixerError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
