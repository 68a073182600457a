//! # Transport Module
//!
//! Capability seams between the playback core and the outside world.
//!
//! The core never talks to Discord, a voice gateway or yt-dlp directly. It
//! consumes three collaborators:
//!
//! - [`ChatTransport`] - resolves chats, checks admins, posts notifications
//! - [`StreamTransport`] - starts, pauses, resumes and leaves voice streams
//! - [`MediaResolver`] - turns a query into track metadata and a local file
//!
//! The streaming transport reports finished tracks as [`StreamEvent`]s over a
//! channel; the bot loop feeds them back into
//! [`AudioPlayer::finish_track`](crate::audio::player::AudioPlayer::finish_track),
//! which drops events for tracks that were already replaced.

pub mod discord;
#[cfg(test)]
pub mod fake;

use async_trait::async_trait;
use std::{fmt, path::Path, path::PathBuf};

use crate::error::{ResolveError, TransportError};

/// Identifier of an independent playback context (a guild on Discord).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChatId(pub u64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Numeric identity of a requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message posted to a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Text(String),
    Media { image_url: String, caption: String },
}

impl Notification {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn media(image_url: impl Into<String>, caption: impl Into<String>) -> Self {
        Self::Media {
            image_url: image_url.into(),
            caption: caption.into(),
        }
    }

    /// Caption or body text, whichever this notification carries.
    pub fn body(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Media { caption, .. } => caption,
        }
    }
}

/// Events raised by a streaming transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    /// A track of a chat finished on its own. `generation` identifies the
    /// start that produced it.
    Ended { chat: ChatId, generation: u64 },
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Whether the chat can still be resolved.
    async fn chat_exists(&self, chat: ChatId) -> bool;

    async fn send_notification(
        &self,
        chat: ChatId,
        notification: Notification,
    ) -> Result<(), TransportError>;

    async fn is_admin(&self, chat: ChatId, user: UserId) -> bool;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Starts streaming `file` in the chat's call, joining the call if needed.
    async fn start_stream(&self, chat: ChatId, file: &Path) -> Result<(), TransportError>;

    async fn pause(&self, chat: ChatId) -> Result<(), TransportError>;

    async fn resume(&self, chat: ChatId) -> Result<(), TransportError>;

    async fn leave(&self, chat: ChatId) -> Result<(), TransportError>;

    /// Whether `generation` is still the track playing in `chat`.
    fn is_current(&self, chat: ChatId, generation: u64) -> bool;
}

/// Metadata returned by [`MediaResolver::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTrack {
    pub title: String,
    pub url: String,
    pub duration_label: String,
    pub thumbnail: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Looks up a search query or URL. `Ok(None)` means nothing matched.
    async fn resolve(&self, query: &str) -> Result<Option<ResolvedTrack>, ResolveError>;

    /// Downloads the audio behind `url` and returns the local file.
    async fn download(&self, url: &str) -> Result<PathBuf, ResolveError>;
}
