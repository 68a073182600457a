//! Recording transport used by the unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
};

use super::{ChatId, ChatTransport, Notification, StreamTransport, UserId};
use crate::error::TransportError;

/// Records every call; chats, files and admins can be configured per test.
#[derive(Default)]
pub struct FakeTransport {
    pub missing_chats: Mutex<HashSet<ChatId>>,
    pub failing_files: Mutex<HashSet<PathBuf>>,
    pub admins: Mutex<HashSet<UserId>>,
    pub started: Mutex<Vec<(ChatId, PathBuf)>>,
    pub left: Mutex<Vec<ChatId>>,
    pub notices: Mutex<Vec<(ChatId, Notification)>>,
    /// Current generation per chat: the number of streams started there.
    pub generations: Mutex<HashMap<ChatId, u64>>,
}

impl FakeTransport {
    pub fn fail_file(&self, file: &str) {
        self.failing_files.lock().insert(PathBuf::from(file));
    }

    pub fn starts_in(&self, chat: ChatId) -> usize {
        self.started.lock().iter().filter(|(c, _)| *c == chat).count()
    }

    pub fn current_generation(&self, chat: ChatId) -> Option<u64> {
        self.generations.lock().get(&chat).copied()
    }

    pub fn notice_bodies(&self, chat: ChatId) -> Vec<String> {
        self.notices
            .lock()
            .iter()
            .filter(|(c, _)| *c == chat)
            .map(|(_, n)| n.body().to_string())
            .collect()
    }
}

#[async_trait]
impl ChatTransport for FakeTransport {
    async fn chat_exists(&self, chat: ChatId) -> bool {
        !self.missing_chats.lock().contains(&chat)
    }

    async fn send_notification(
        &self,
        chat: ChatId,
        notification: Notification,
    ) -> Result<(), TransportError> {
        self.notices.lock().push((chat, notification));
        Ok(())
    }

    async fn is_admin(&self, _chat: ChatId, user: UserId) -> bool {
        self.admins.lock().contains(&user)
    }
}

#[async_trait]
impl StreamTransport for FakeTransport {
    async fn start_stream(&self, chat: ChatId, file: &Path) -> Result<(), TransportError> {
        if self.failing_files.lock().contains(file) {
            return Err(TransportError::Stream("decoder rejected file".into()));
        }
        self.started.lock().push((chat, file.to_path_buf()));
        let generation = self.starts_in(chat) as u64;
        self.generations.lock().insert(chat, generation);
        Ok(())
    }

    async fn pause(&self, _chat: ChatId) -> Result<(), TransportError> {
        Ok(())
    }

    async fn resume(&self, _chat: ChatId) -> Result<(), TransportError> {
        Ok(())
    }

    async fn leave(&self, chat: ChatId) -> Result<(), TransportError> {
        self.left.lock().push(chat);
        self.generations.lock().remove(&chat);
        Ok(())
    }

    fn is_current(&self, chat: ChatId, generation: u64) -> bool {
        self.current_generation(chat) == Some(generation)
    }
}
