use dashmap::DashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        activity::ActivityIndex,
        files::{FileTracker, ReclaimPolicy},
        queue::{QueueEntry, QueueStore},
    },
    error::{AdmissionError, PlayerError, PlayerResult},
    transport::{ChatId, ChatTransport, Notification, StreamTransport, UserId},
    ui::captions,
};

/// Playback state of a single channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Playing,
    Paused,
}

#[derive(Debug, Clone)]
pub struct PlayerSettings {
    pub max_queue_size: usize,
    pub restrict_multiple_chats: bool,
    pub reclaim: ReclaimPolicy,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            max_queue_size: 10,
            restrict_multiple_chats: false,
            reclaim: ReclaimPolicy::default(),
        }
    }
}

/// Result of a successful [`AudioPlayer::enqueue_request`].
#[derive(Debug, Clone)]
pub enum EnqueueOutcome {
    /// The channel was idle and playback of `entry` started.
    Started { entry: QueueEntry },
    /// A session is already running; the entry waits at `position`.
    Queued { position: usize },
}

/// Result of [`AudioPlayer::advance`].
#[derive(Debug, Clone)]
pub enum AdvanceOutcome {
    /// The next entry is playing; `queued` counts the entries left, itself included.
    Playing { entry: QueueEntry, queued: usize },
    /// Nothing left to play; the session was torn down.
    QueueEmpty,
    /// The next entry could not be started; the session was torn down.
    PlaybackFailed,
}

/// Per-channel session orchestrator.
///
/// Owns the queue store, the activity index and the set of live sessions, and
/// drives the chat and streaming transports. Each shared structure carries its
/// own synchronization; session-affecting operations are additionally
/// serialized per channel so that two first enqueues cannot both start a
/// stream.
pub struct AudioPlayer {
    queues: QueueStore,
    activity: ActivityIndex,
    sessions: DashMap<ChatId, SessionState>,
    session_locks: DashMap<ChatId, Arc<Mutex<()>>>,
    restrict_multiple_chats: AtomicBool,
    chat: Arc<dyn ChatTransport>,
    stream: Arc<dyn StreamTransport>,
}

impl AudioPlayer {
    pub fn new(
        settings: PlayerSettings,
        chat: Arc<dyn ChatTransport>,
        stream: Arc<dyn StreamTransport>,
    ) -> Self {
        Self {
            queues: QueueStore::new(settings.max_queue_size, FileTracker::new(settings.reclaim)),
            activity: ActivityIndex::new(),
            sessions: DashMap::new(),
            session_locks: DashMap::new(),
            restrict_multiple_chats: AtomicBool::new(settings.restrict_multiple_chats),
            chat,
            stream,
        }
    }

    /// Checks the one-active-channel policy for `user` wanting to queue in `chat`.
    ///
    /// Only channels other than `chat` count as conflicts. This is a read-only
    /// pre-check; [`enqueue_request`](Self::enqueue_request) checks again and
    /// records the channel atomically.
    pub fn admit(&self, user: UserId, chat: ChatId) -> Result<(), AdmissionError> {
        if !self.restriction_enabled() {
            return Ok(());
        }

        let channels: Vec<ChatId> = self
            .activity
            .active_channels_of(user)
            .into_iter()
            .filter(|active| *active != chat)
            .collect();

        if channels.is_empty() {
            Ok(())
        } else {
            debug!("Usuario {} rechazado, activo en {:?}", user, channels);
            Err(AdmissionError::AlreadyActive { channels })
        }
    }

    /// Queues `entry` in `chat`, starting playback when the channel is idle.
    ///
    /// A failed start leaves the entry at the front of the queue without a
    /// session and reports [`PlayerError::PlaybackFailed`].
    pub async fn enqueue_request(
        &self,
        chat: ChatId,
        entry: QueueEntry,
    ) -> PlayerResult<EnqueueOutcome> {
        self.ensure_chat(chat).await?;
        let user = entry.requester_id();

        let lock = self.session_lock(chat);
        let _guard = lock.lock().await;

        // Check and record in one step so concurrent requests to other
        // channels cannot both get through.
        let reserved = self
            .activity
            .try_admit(user, chat, self.restriction_enabled())
            .map_err(|channels| {
                debug!("Usuario {} rechazado, activo en {:?}", user, channels);
                AdmissionError::AlreadyActive { channels }
            })?;

        let position = match self.queues.enqueue(chat, entry).await {
            Ok(position) => position,
            Err(e) => {
                if reserved {
                    self.activity.remove_activity(user, chat);
                }
                return Err(e.into());
            }
        };

        if self.sessions.contains_key(&chat) {
            info!("📋 En cola #{} en chat {}", position, chat);
            return Ok(EnqueueOutcome::Queued { position });
        }

        let Some(front) = self.queues.peek_front(chat).await else {
            return Ok(EnqueueOutcome::Queued { position });
        };

        match self.stream.start_stream(chat, front.file()).await {
            Ok(()) => {
                self.sessions.insert(chat, SessionState::Playing);
                info!("🎵 Reproduciendo en chat {}: {}", chat, front.title());
                Ok(EnqueueOutcome::Started { entry: front })
            }
            Err(e) => {
                warn!("No se pudo iniciar la reproducción en chat {}: {}", chat, e);
                Err(PlayerError::PlaybackFailed(e))
            }
        }
    }

    /// Moves `chat` to its next entry after a skip.
    pub async fn advance(&self, chat: ChatId) -> PlayerResult<AdvanceOutcome> {
        self.ensure_chat(chat).await?;

        let lock = self.session_lock(chat);
        let _guard = lock.lock().await;

        self.advance_locked(chat).await
    }

    /// Advances after the streaming transport reported the end of the track
    /// started as `generation`.
    ///
    /// Returns `None` when that track is no longer current, e.g. a skip
    /// already replaced it while the event was in flight.
    pub async fn finish_track(
        &self,
        chat: ChatId,
        generation: u64,
    ) -> PlayerResult<Option<AdvanceOutcome>> {
        self.ensure_chat(chat).await?;

        let lock = self.session_lock(chat);
        let _guard = lock.lock().await;

        if !self.sessions.contains_key(&chat) || !self.stream.is_current(chat, generation) {
            debug!("Evento de fin obsoleto en chat {} (gen {})", chat, generation);
            return Ok(None);
        }

        self.advance_locked(chat).await.map(Some)
    }

    /// Caller holds the session lock of `chat`.
    async fn advance_locked(&self, chat: ChatId) -> PlayerResult<AdvanceOutcome> {
        let Some(finished) = self.queues.dequeue_front(chat).await else {
            self.end_session(chat).await;
            return Ok(AdvanceOutcome::QueueEmpty);
        };

        let remaining = self.queues.snapshot(chat).await;
        let requester = finished.requester_id();
        if !remaining.iter().any(|e| e.requester_id() == requester) {
            self.activity.remove_activity(requester, chat);
        }

        let Some(next) = remaining.first().cloned() else {
            info!("📭 Cola vacía en chat {}", chat);
            self.end_session(chat).await;
            return Ok(AdvanceOutcome::QueueEmpty);
        };

        match self.stream.start_stream(chat, next.file()).await {
            Ok(()) => {
                self.sessions.insert(chat, SessionState::Playing);
                info!("⏭️ Siguiente en chat {}: {}", chat, next.title());
                Ok(AdvanceOutcome::Playing {
                    entry: next,
                    queued: remaining.len(),
                })
            }
            Err(e) => {
                error!("❌ Error al reproducir {} en chat {}: {}", next.title(), chat, e);
                self.end_session(chat).await;
                Ok(AdvanceOutcome::PlaybackFailed)
            }
        }
    }

    pub async fn pause(&self, chat: ChatId) -> bool {
        self.set_paused(chat, true).await
    }

    pub async fn resume(&self, chat: ChatId) -> bool {
        self.set_paused(chat, false).await
    }

    /// Stops playback and drops the whole queue of `chat`.
    ///
    /// Returns whether a session was running.
    pub async fn terminate(&self, chat: ChatId) -> PlayerResult<bool> {
        self.ensure_chat(chat).await?;

        let lock = self.session_lock(chat);
        let _guard = lock.lock().await;

        let had_session = self.end_session(chat).await;
        info!("⏹️ Reproducción detenida en chat {}", chat);
        Ok(had_session)
    }

    pub async fn snapshot(&self, chat: ChatId) -> Vec<QueueEntry> {
        self.queues.snapshot(chat).await
    }

    pub fn state(&self, chat: ChatId) -> SessionState {
        self.sessions
            .get(&chat)
            .map(|state| *state)
            .unwrap_or(SessionState::Idle)
    }

    pub fn is_active(&self, chat: ChatId) -> bool {
        self.sessions.contains_key(&chat)
    }

    pub fn active_channels_of(&self, user: UserId) -> Vec<ChatId> {
        self.activity.active_channels_of(user)
    }

    pub fn max_queue_size(&self) -> usize {
        self.queues.max_size()
    }

    pub fn files(&self) -> &FileTracker {
        self.queues.files()
    }

    pub fn restriction_enabled(&self) -> bool {
        self.restrict_multiple_chats.load(Ordering::SeqCst)
    }

    pub fn set_restriction(&self, enabled: bool) {
        self.restrict_multiple_chats.store(enabled, Ordering::SeqCst);
        info!("⚙️ Restricción multi-chat: {}", enabled);
    }

    /// Flips the one-active-channel policy and returns the new value.
    pub fn toggle_restriction(&self) -> bool {
        let enabled = !self.restrict_multiple_chats.fetch_xor(true, Ordering::SeqCst);
        info!("⚙️ Restricción multi-chat: {}", enabled);
        enabled
    }

    // Funciones privadas

    async fn set_paused(&self, chat: ChatId, paused: bool) -> bool {
        if self.ensure_chat(chat).await.is_err() {
            return false;
        }

        let lock = self.session_lock(chat);
        let _guard = lock.lock().await;

        if !self.sessions.contains_key(&chat) {
            return false;
        }

        let result = if paused {
            self.stream.pause(chat).await
        } else {
            self.stream.resume(chat).await
        };

        match result {
            Ok(()) => {
                if let Some(mut state) = self.sessions.get_mut(&chat) {
                    *state = if paused {
                        SessionState::Paused
                    } else {
                        SessionState::Playing
                    };
                }
                if paused {
                    info!("⏸️ Reproducción pausada en chat {}", chat);
                } else {
                    info!("▶️ Reproducción reanudada en chat {}", chat);
                }
                true
            }
            Err(e) => {
                error!("Error al cambiar pausa en chat {}: {}", chat, e);
                false
            }
        }
    }

    /// Tears down the session of `chat`. Caller holds the session lock.
    async fn end_session(&self, chat: ChatId) -> bool {
        let had_session = self.sessions.remove(&chat).is_some();

        if had_session {
            if let Err(e) = self.stream.leave(chat).await {
                warn!("Error al salir del chat de voz {}: {}, limpiando localmente", chat, e);
            }
        }

        self.queues.clear(chat).await;
        self.activity.remove_channel(chat);

        if had_session && self.chat.chat_exists(chat).await {
            if let Err(e) = self
                .chat
                .send_notification(chat, Notification::text(captions::VOICE_CHAT_ENDED))
                .await
            {
                warn!("No se pudo notificar fin de sesión en {}: {}", chat, e);
            }
        }

        had_session
    }

    async fn ensure_chat(&self, chat: ChatId) -> PlayerResult<()> {
        if self.chat.chat_exists(chat).await {
            Ok(())
        } else {
            warn!("Chat inválido {}, se omite la operación", chat);
            Err(PlayerError::ChatUnavailable(chat))
        }
    }

    fn session_lock(&self, chat: ChatId) -> Arc<Mutex<()>> {
        self.session_locks.entry(chat).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::TransportError,
        transport::{fake::FakeTransport, MockChatTransport, MockStreamTransport},
    };
    use pretty_assertions::assert_eq;
    use std::path::Path;

    const C1: ChatId = ChatId(100);
    const C2: ChatId = ChatId(200);
    const U1: UserId = UserId(1);
    const U2: UserId = UserId(2);

    fn player_with(max: usize, restrict: bool) -> (AudioPlayer, Arc<FakeTransport>) {
        let fake = Arc::new(FakeTransport::default());
        let settings = PlayerSettings {
            max_queue_size: max,
            restrict_multiple_chats: restrict,
            ..PlayerSettings::default()
        };
        let player = AudioPlayer::new(settings, fake.clone(), fake.clone());
        (player, fake)
    }

    fn song(title: &str, user: UserId) -> QueueEntry {
        QueueEntry::new(title, format!("/nonexistent/{}.m4a", title), "Ana", user)
            .with_url(format!("https://youtu.be/{}", title))
    }

    #[tokio::test]
    async fn test_first_enqueue_starts_playback() {
        let (player, fake) = player_with(5, false);

        let outcome = player.enqueue_request(C1, song("A", U1)).await.unwrap();

        match outcome {
            EnqueueOutcome::Started { entry } => assert_eq!(entry.title(), "A"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(player.state(C1), SessionState::Playing);
        assert_eq!(player.active_channels_of(U1), vec![C1]);
        assert_eq!(fake.starts_in(C1), 1);
    }

    #[tokio::test]
    async fn test_capacity_rejects_third_song() {
        let (player, fake) = player_with(2, false);

        let first = player.enqueue_request(C1, song("A", U1)).await.unwrap();
        assert!(matches!(first, EnqueueOutcome::Started { .. }));
        let second = player.enqueue_request(C1, song("B", U2)).await.unwrap();
        assert!(matches!(second, EnqueueOutcome::Queued { position: 2 }));
        let third = player.enqueue_request(C1, song("C", U2)).await;
        assert!(matches!(
            third,
            Err(PlayerError::Admission(AdmissionError::QueueFull { max: 2 }))
        ));

        assert_eq!(player.snapshot(C1).await.len(), 2);
        assert_eq!(player.files().count(Path::new("/nonexistent/C.m4a")), 0);
        assert_eq!(fake.starts_in(C1), 1);
    }

    #[tokio::test]
    async fn test_advance_on_last_entry_ends_session() {
        let (player, fake) = player_with(5, false);
        player.enqueue_request(C1, song("A", U1)).await.unwrap();

        let outcome = player.advance(C1).await.unwrap();

        assert!(matches!(outcome, AdvanceOutcome::QueueEmpty));
        assert_eq!(player.state(C1), SessionState::Idle);
        assert!(player.snapshot(C1).await.is_empty());
        assert!(!player.queues.contains(C1));
        assert!(player.active_channels_of(U1).is_empty());
        assert_eq!(*fake.left.lock(), vec![C1]);
        let notices = fake.notices.lock();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].1.body(), captions::VOICE_CHAT_ENDED);
    }

    #[tokio::test]
    async fn test_advance_reports_playback_failure() {
        let (player, fake) = player_with(5, false);
        fake.fail_file("/nonexistent/B.m4a");
        player.enqueue_request(C1, song("A", U1)).await.unwrap();
        player.enqueue_request(C1, song("B", U2)).await.unwrap();

        let outcome = player.advance(C1).await.unwrap();

        assert!(matches!(outcome, AdvanceOutcome::PlaybackFailed));
        assert_eq!(player.state(C1), SessionState::Idle);
        assert!(!player.queues.contains(C1));
        assert!(player.active_channels_of(U2).is_empty());
        assert_eq!(player.files().count(Path::new("/nonexistent/B.m4a")), 0);
    }

    #[tokio::test]
    async fn test_advance_plays_next_and_keeps_busy_requesters() {
        let (player, fake) = player_with(5, false);
        player.enqueue_request(C1, song("A", U1)).await.unwrap();
        player.enqueue_request(C1, song("B", U1)).await.unwrap();
        player.enqueue_request(C1, song("C", U2)).await.unwrap();

        match player.advance(C1).await.unwrap() {
            AdvanceOutcome::Playing { entry, queued } => {
                assert_eq!(entry.title(), "B");
                assert_eq!(entry.url(), Some("https://youtu.be/B"));
                assert_eq!(queued, 2);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        // U1 still owns the playing entry.
        assert_eq!(player.active_channels_of(U1), vec![C1]);

        assert!(matches!(
            player.advance(C1).await.unwrap(),
            AdvanceOutcome::Playing { .. }
        ));
        assert!(player.active_channels_of(U1).is_empty());
        assert_eq!(player.active_channels_of(U2), vec![C1]);
        assert_eq!(fake.starts_in(C1), 3);
    }

    #[tokio::test]
    async fn test_restriction_rejects_other_channels() {
        let (player, _fake) = player_with(5, true);
        player.enqueue_request(C1, song("A", U1)).await.unwrap();

        let rejected = player.enqueue_request(C2, song("B", U1)).await;
        match rejected {
            Err(PlayerError::Admission(AdmissionError::AlreadyActive { channels })) => {
                assert_eq!(channels, vec![C1]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(player.snapshot(C2).await.is_empty());

        // Queueing more in the same channel is allowed.
        let same = player.enqueue_request(C1, song("C", U1)).await.unwrap();
        assert!(matches!(same, EnqueueOutcome::Queued { position: 2 }));
    }

    #[tokio::test]
    async fn test_restriction_toggle() {
        let (player, _fake) = player_with(5, false);
        player.enqueue_request(C1, song("A", U1)).await.unwrap();
        assert!(player.enqueue_request(C2, song("B", U1)).await.is_ok());

        assert!(player.toggle_restriction());
        assert!(player.admit(U1, ChatId(300)).is_err());
        assert!(!player.toggle_restriction());
        assert!(player.admit(U1, ChatId(300)).is_ok());
        player.set_restriction(true);
        assert!(player.restriction_enabled());
    }

    #[tokio::test]
    async fn test_failed_start_keeps_entry_queued() {
        let (player, fake) = player_with(5, false);
        fake.fail_file("/nonexistent/A.m4a");

        let result = player.enqueue_request(C1, song("A", U1)).await;

        assert!(matches!(result, Err(PlayerError::PlaybackFailed(_))));
        assert_eq!(player.state(C1), SessionState::Idle);
        let queued = player.snapshot(C1).await;
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].title(), "A");
        assert_eq!(player.active_channels_of(U1), vec![C1]);

        // The next request retries the stuck front entry.
        fake.failing_files.lock().clear();
        match player.enqueue_request(C1, song("B", U2)).await.unwrap() {
            EnqueueOutcome::Started { entry } => assert_eq!(entry.title(), "A"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unresolvable_chat_aborts_quietly() {
        let (player, fake) = player_with(5, false);
        fake.missing_chats.lock().insert(C1);

        assert!(matches!(
            player.enqueue_request(C1, song("A", U1)).await,
            Err(PlayerError::ChatUnavailable(C1))
        ));
        assert!(matches!(
            player.advance(C1).await,
            Err(PlayerError::ChatUnavailable(C1))
        ));
        assert!(!player.pause(C1).await);
        assert!(player.snapshot(C1).await.is_empty());
        assert!(fake.started.lock().is_empty());
    }

    #[tokio::test]
    async fn test_pause_and_resume_need_a_session() {
        let (player, _fake) = player_with(5, false);
        assert!(!player.pause(C1).await);
        assert!(!player.resume(C1).await);

        player.enqueue_request(C1, song("A", U1)).await.unwrap();
        assert!(player.pause(C1).await);
        assert_eq!(player.state(C1), SessionState::Paused);
        assert!(player.resume(C1).await);
        assert_eq!(player.state(C1), SessionState::Playing);
        assert_eq!(player.snapshot(C1).await.len(), 1);
    }

    #[tokio::test]
    async fn test_terminate_clears_everything() {
        let (player, fake) = player_with(5, false);
        player.enqueue_request(C1, song("A", U1)).await.unwrap();
        player.enqueue_request(C1, song("B", U2)).await.unwrap();
        player.enqueue_request(C2, song("C", U2)).await.unwrap();

        assert!(player.terminate(C1).await.unwrap());

        assert_eq!(player.state(C1), SessionState::Idle);
        assert!(player.snapshot(C1).await.is_empty());
        assert!(player.active_channels_of(U1).is_empty());
        assert_eq!(player.active_channels_of(U2), vec![C2]);
        assert_eq!(player.files().count(Path::new("/nonexistent/B.m4a")), 0);
        assert_eq!(*fake.left.lock(), vec![C1]);

        assert!(!player.terminate(C1).await.unwrap());
        assert_eq!(player.state(C2), SessionState::Playing);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_simultaneous_first_enqueues_start_once() {
        let (player, fake) = player_with(20, false);
        let player = Arc::new(player);

        let requests = (0..10u64).map(|i| {
            let player = player.clone();
            tokio::spawn(async move {
                player
                    .enqueue_request(C1, song(&format!("S{}", i), UserId(i)))
                    .await
            })
        });
        let results = futures::future::join_all(requests).await;

        let started = results
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .filter(|o| matches!(o, EnqueueOutcome::Started { .. }))
            .count();
        assert_eq!(started, 1);
        assert_eq!(fake.starts_in(C1), 1);
        assert_eq!(player.snapshot(C1).await.len(), 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_simultaneous_requests_admit_user_in_one_channel() {
        for round in 0..20u64 {
            let (player, _fake) = player_with(5, true);
            let player = Arc::new(player);

            let requests = (1..=4u64).map(|c| {
                let player = player.clone();
                tokio::spawn(async move {
                    player
                        .enqueue_request(ChatId(c * 100), song(&format!("R{}-{}", round, c), U1))
                        .await
                })
            });
            let results = futures::future::join_all(requests).await;

            let admitted = results
                .into_iter()
                .map(|r| r.unwrap())
                .filter(|r| r.is_ok())
                .count();
            assert_eq!(admitted, 1, "round {}", round);
            assert_eq!(player.active_channels_of(U1).len(), 1, "round {}", round);
        }
    }

    #[tokio::test]
    async fn test_full_queue_does_not_record_requester() {
        let (player, _fake) = player_with(1, true);
        player.enqueue_request(C1, song("A", U1)).await.unwrap();

        let rejected = player.enqueue_request(C1, song("B", U2)).await;

        assert!(matches!(
            rejected,
            Err(PlayerError::Admission(AdmissionError::QueueFull { max: 1 }))
        ));
        assert!(player.active_channels_of(U2).is_empty());
        // Still free to use another channel.
        assert!(player.enqueue_request(C2, song("C", U2)).await.is_ok());
    }

    #[tokio::test]
    async fn test_stale_track_end_is_ignored() {
        let (player, fake) = player_with(5, false);
        player.enqueue_request(C1, song("A", U1)).await.unwrap();
        player.enqueue_request(C1, song("B", U1)).await.unwrap();
        player.enqueue_request(C1, song("C", U2)).await.unwrap();
        let first = fake.current_generation(C1).unwrap();

        // A skip replaces A before its end event is handled.
        player.advance(C1).await.unwrap();
        assert!(player.finish_track(C1, first).await.unwrap().is_none());

        let queued: Vec<_> = player
            .snapshot(C1)
            .await
            .iter()
            .map(|entry| entry.title().to_string())
            .collect();
        assert_eq!(queued, vec!["B", "C"]);
        assert_eq!(fake.starts_in(C1), 2);

        let current = fake.current_generation(C1).unwrap();
        match player.finish_track(C1, current).await.unwrap() {
            Some(AdvanceOutcome::Playing { entry, .. }) => assert_eq!(entry.title(), "C"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_track_end_without_session_is_ignored() {
        let (player, fake) = player_with(5, false);

        assert!(player.finish_track(C1, 1).await.unwrap().is_none());
        assert!(fake.left.lock().is_empty());
        assert!(fake.notices.lock().is_empty());
    }

    #[tokio::test]
    async fn test_transport_pause_error_reports_failure() {
        let mut chat = MockChatTransport::new();
        chat.expect_chat_exists().returning(|_| true);

        let mut stream = MockStreamTransport::new();
        stream.expect_start_stream().times(1).returning(|_, _| Ok(()));
        stream
            .expect_pause()
            .times(1)
            .returning(|chat| Err(TransportError::NotConnected(chat)));

        let player = AudioPlayer::new(
            PlayerSettings::default(),
            Arc::new(chat),
            Arc::new(stream),
        );
        player.enqueue_request(C1, song("A", U1)).await.unwrap();

        assert!(!player.pause(C1).await);
        assert_eq!(player.state(C1), SessionState::Playing);
    }

    #[tokio::test]
    async fn test_leave_error_still_cleans_up() {
        let mut chat = MockChatTransport::new();
        chat.expect_chat_exists().returning(|_| true);
        chat.expect_send_notification().returning(|_, _| Ok(()));

        let mut stream = MockStreamTransport::new();
        stream.expect_start_stream().returning(|_, _| Ok(()));
        stream
            .expect_leave()
            .times(1)
            .returning(|_| Err(TransportError::Stream("gateway gone".into())));

        let player = AudioPlayer::new(
            PlayerSettings::default(),
            Arc::new(chat),
            Arc::new(stream),
        );
        player.enqueue_request(C1, song("A", U1)).await.unwrap();

        assert!(player.terminate(C1).await.unwrap());
        assert_eq!(player.state(C1), SessionState::Idle);
        assert!(player.active_channels_of(U1).is_empty());
    }
}
