//! Error types shared by the playback core and its transports.

use crate::transport::ChatId;

/// Failures reported by the chat or streaming transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("chat transport error: {0}")]
    Chat(String),

    #[error("stream transport error: {0}")]
    Stream(String),

    #[error("no voice connection for chat {0}")]
    NotConnected(ChatId),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures reported by the media resolution service.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("yt-dlp failed: {0}")]
    Process(String),

    #[error("could not parse yt-dlp output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("no results for {0:?}")]
    NoResults(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Rejections raised before an entry is accepted into a queue.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    #[error("queue is full (max {max} songs)")]
    QueueFull { max: usize },

    #[error("user already has songs playing or queued in {channels:?}")]
    AlreadyActive { channels: Vec<ChatId> },
}

/// Errors returned by [`crate::audio::player::AudioPlayer`].
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error("chat {0} cannot be resolved")]
    ChatUnavailable(ChatId),

    #[error("playback failed to start: {0}")]
    PlaybackFailed(#[source] TransportError),
}

pub type PlayerResult<T> = std::result::Result<T, PlayerError>;
