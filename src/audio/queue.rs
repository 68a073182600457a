use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::{
    collections::VecDeque,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::files::FileTracker;
use crate::{
    error::AdmissionError,
    transport::{ChatId, UserId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaKind {
    #[default]
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => write!(f, "Audio"),
            Self::Video => write!(f, "Video"),
        }
    }
}

/// One playable unit in a channel queue.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    title: String,
    file: PathBuf,
    url: Option<String>,
    media_kind: MediaKind,
    quality: u32,
    requester: String,
    requester_id: UserId,
    duration_label: Option<String>,
    thumbnail: Option<String>,
    added_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn new(
        title: impl Into<String>,
        file: impl Into<PathBuf>,
        requester: impl Into<String>,
        requester_id: UserId,
    ) -> Self {
        Self {
            title: title.into(),
            file: file.into(),
            url: None,
            media_kind: MediaKind::Audio,
            quality: 0,
            requester: requester.into(),
            requester_id,
            duration_label: None,
            thumbnail: None,
            added_at: Utc::now(),
        }
    }

    // Getters
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn file(&self) -> &Path {
        &self.file
    }
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }
    pub fn media_kind(&self) -> MediaKind {
        self.media_kind
    }
    pub fn quality(&self) -> u32 {
        self.quality
    }
    pub fn requester(&self) -> &str {
        &self.requester
    }
    pub fn requester_id(&self) -> UserId {
        self.requester_id
    }
    pub fn duration_label(&self) -> Option<&str> {
        self.duration_label.as_deref()
    }
    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail.as_deref()
    }
    pub fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }

    // Builders
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_media_kind(mut self, kind: MediaKind) -> Self {
        self.media_kind = kind;
        self
    }

    pub fn with_quality(mut self, quality: u32) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_duration_label(mut self, label: impl Into<String>) -> Self {
        self.duration_label = Some(label.into());
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }
}

#[derive(Debug, Default)]
struct ChannelQueue {
    items: VecDeque<QueueEntry>,
    // Set once the queue has been removed from the store.
    closed: bool,
}

/// Bounded FIFO queues keyed by channel.
///
/// Each channel has its own lock, so operations on different channels never
/// wait on each other. The map itself only serializes lazy creation.
#[derive(Debug)]
pub struct QueueStore {
    queues: DashMap<ChatId, Arc<Mutex<ChannelQueue>>>,
    files: FileTracker,
    max_size: usize,
}

impl QueueStore {
    pub fn new(max_size: usize, files: FileTracker) -> Self {
        Self {
            queues: DashMap::new(),
            files,
            max_size,
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn files(&self) -> &FileTracker {
        &self.files
    }

    /// Appends `entry` and returns its 1-based position.
    pub async fn enqueue(&self, chat: ChatId, entry: QueueEntry) -> Result<usize, AdmissionError> {
        loop {
            let queue = self.get_or_create(chat);
            let mut q = queue.lock().await;
            if q.closed {
                // Cleared while we were waiting; retry against a fresh queue.
                continue;
            }

            if q.items.len() >= self.max_size {
                debug!("Cola llena en chat {} ({} canciones)", chat, self.max_size);
                return Err(AdmissionError::QueueFull { max: self.max_size });
            }

            self.files.acquire(entry.file());
            info!("➕ Agregado a la cola de {}: {}", chat, entry.title());
            q.items.push_back(entry);
            return Ok(q.items.len());
        }
    }

    /// Removes the front entry and releases its file reference.
    pub async fn dequeue_front(&self, chat: ChatId) -> Option<QueueEntry> {
        let queue = self.get(chat)?;
        let mut q = queue.lock().await;
        let entry = q.items.pop_front()?;
        self.files.release(entry.file());
        debug!("➡️ Siguiente en cola (FIFO) de {}: {}", chat, entry.title());
        Some(entry)
    }

    pub async fn peek_front(&self, chat: ChatId) -> Option<QueueEntry> {
        let queue = self.get(chat)?;
        let q = queue.lock().await;
        q.items.front().cloned()
    }

    /// Copy of the channel's queue, front first.
    pub async fn snapshot(&self, chat: ChatId) -> Vec<QueueEntry> {
        match self.get(chat) {
            Some(queue) => queue.lock().await.items.iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub async fn len(&self, chat: ChatId) -> usize {
        match self.get(chat) {
            Some(queue) => queue.lock().await.items.len(),
            None => 0,
        }
    }

    /// Drops the channel's queue, releasing every remaining file reference.
    ///
    /// Returns the number of entries removed; a second call returns 0.
    pub async fn clear(&self, chat: ChatId) -> usize {
        let Some((_, queue)) = self.queues.remove(&chat) else {
            return 0;
        };

        let mut q = queue.lock().await;
        q.closed = true;
        let cleared = q.items.len();
        for entry in q.items.drain(..) {
            self.files.release(entry.file());
        }

        info!("🗑️ Cola de {} limpiada: {} canciones removidas", chat, cleared);
        cleared
    }

    /// Whether the store currently holds a queue for `chat`.
    pub fn contains(&self, chat: ChatId) -> bool {
        self.queues.contains_key(&chat)
    }

    fn get(&self, chat: ChatId) -> Option<Arc<Mutex<ChannelQueue>>> {
        self.queues.get(&chat).map(|queue| queue.clone())
    }

    fn get_or_create(&self, chat: ChatId) -> Arc<Mutex<ChannelQueue>> {
        self.queues
            .entry(chat)
            .or_insert_with(|| Arc::new(Mutex::new(ChannelQueue::default())))
            .clone()
    }
}
