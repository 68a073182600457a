use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::transport::{ChatId, UserId};

/// Channels in which each user currently has a playing or queued entry.
///
/// A user is present only while their channel set is non-empty.
#[derive(Debug, Default)]
pub struct ActivityIndex {
    users: Mutex<HashMap<UserId, BTreeSet<ChatId>>>,
}

impl ActivityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_activity(&self, user: UserId, chat: ChatId) {
        self.users.lock().entry(user).or_default().insert(chat);
    }

    /// Records `user` in `chat` unless `restrict` is set and the user is
    /// already active in another channel, in which case those channels are
    /// returned and nothing changes.
    ///
    /// Returns whether `chat` was newly added, so a failed enqueue can undo it.
    pub fn try_admit(&self, user: UserId, chat: ChatId, restrict: bool) -> Result<bool, Vec<ChatId>> {
        let mut users = self.users.lock();
        let chats = users.entry(user).or_default();

        if restrict {
            let others: Vec<ChatId> = chats.iter().copied().filter(|c| *c != chat).collect();
            if !others.is_empty() {
                return Err(others);
            }
        }

        Ok(chats.insert(chat))
    }

    pub fn remove_activity(&self, user: UserId, chat: ChatId) {
        let mut users = self.users.lock();
        if let Some(chats) = users.get_mut(&user) {
            chats.remove(&chat);
            if chats.is_empty() {
                users.remove(&user);
            }
        }
    }

    /// Channels for `user`, in ascending order. Empty when the user is idle.
    pub fn active_channels_of(&self, user: UserId) -> Vec<ChatId> {
        self.users
            .lock()
            .get(&user)
            .map(|chats| chats.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Removes `chat` from every user, pruning users left with no channels.
    pub fn remove_channel(&self, chat: ChatId) -> usize {
        let mut users = self.users.lock();
        let mut touched = 0;
        users.retain(|_, chats| {
            if chats.remove(&chat) {
                touched += 1;
            }
            !chats.is_empty()
        });
        if touched > 0 {
            debug!("Actividad de {} usuarios removida del chat {}", touched, chat);
        }
        touched
    }

    /// Number of users with at least one active channel.
    pub fn len(&self) -> usize {
        self.users.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
