use std::{path::PathBuf, sync::Arc};
use tracing::{error, info, warn};

use crate::{
    audio::{
        player::{AdvanceOutcome, AudioPlayer, EnqueueOutcome},
        queue::{MediaKind, QueueEntry},
    },
    error::{AdmissionError, PlayerError},
    transport::{ChatId, ChatTransport, MediaResolver, Notification, UserId},
    ui::captions,
};

/// Text commands understood by the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Play(String),
    Skip,
    Queue,
    Pause,
    Resume,
    End,
    ToggleMulti,
}

impl Command {
    /// Parses `<prefix><name> [args]`. Unknown names and foreign messages
    /// yield `None`.
    pub fn parse(prefix: &str, content: &str) -> Option<Self> {
        let body = content.trim_start().strip_prefix(prefix)?;
        let (name, args) = match body.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (body, ""),
        };

        let command = match name.to_lowercase().as_str() {
            "play" | "p" => Self::Play(args.to_string()),
            "skip" => Self::Skip,
            "queue" | "q" => Self::Queue,
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "end" | "stop" => Self::End,
            "togglemulti" => Self::ToggleMulti,
            _ => return None,
        };

        Some(command)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Play(_) => "play",
            Self::Skip => "skip",
            Self::Queue => "queue",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::End => "end",
            Self::ToggleMulti => "togglemulti",
        }
    }
}

/// Who issued a command, and in which chat.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub chat: ChatId,
    pub user: UserId,
    pub display_name: String,
}

/// A file the user attached, already saved locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub title: String,
    pub file: PathBuf,
    pub kind: MediaKind,
}

/// What `play` was asked to queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayRequest {
    /// Search text or a URL for the resolver.
    Query(String),
    Upload(Upload),
    Missing,
}

/// Transport-agnostic command handlers.
///
/// Every handler returns the reply for the invoking chat, or `None` when the
/// chat could not be resolved and the request was dropped.
pub struct CommandHandler {
    player: Arc<AudioPlayer>,
    chat: Arc<dyn ChatTransport>,
    resolver: Arc<dyn MediaResolver>,
}

impl CommandHandler {
    pub fn new(
        player: Arc<AudioPlayer>,
        chat: Arc<dyn ChatTransport>,
        resolver: Arc<dyn MediaResolver>,
    ) -> Self {
        Self {
            player,
            chat,
            resolver,
        }
    }

    pub fn player(&self) -> &Arc<AudioPlayer> {
        &self.player
    }

    /// Runs `command`; `upload` carries an attached file for `play`.
    pub async fn dispatch(
        &self,
        invocation: &Invocation,
        command: Command,
        upload: Option<Upload>,
    ) -> Option<Notification> {
        info!(
            "📝 Comando {} usado por {} en chat {}",
            command.name(),
            invocation.display_name,
            invocation.chat
        );

        match command {
            Command::Play(query) => {
                let request = match upload {
                    Some(upload) => PlayRequest::Upload(upload),
                    None if query.is_empty() => PlayRequest::Missing,
                    None => PlayRequest::Query(query),
                };
                self.play(invocation, request).await
            }
            Command::Skip => self.skip(invocation).await,
            Command::Queue => self.queue(invocation).await,
            Command::Pause => self.pause(invocation).await,
            Command::Resume => self.resume(invocation).await,
            Command::End => self.end(invocation).await,
            Command::ToggleMulti => self.toggle_multi(invocation).await,
        }
    }

    pub async fn play(&self, invocation: &Invocation, request: PlayRequest) -> Option<Notification> {
        let chat = invocation.chat;

        // A saved upload that never reaches a queue is deleted on rejection.
        let upload_file = match &request {
            PlayRequest::Upload(upload) => Some(upload.file.clone()),
            _ => None,
        };
        let reject = |reply: String| {
            if let Some(file) = &upload_file {
                self.player.files().discard(file);
            }
            Some(Notification::text(reply))
        };

        if let Err(AdmissionError::AlreadyActive { channels }) =
            self.player.admit(invocation.user, chat)
        {
            return reject(captions::already_active(&channels));
        }

        let max = self.player.max_queue_size();
        if self.player.snapshot(chat).await.len() >= max {
            return reject(captions::queue_full(max));
        }

        let entry = match request {
            PlayRequest::Missing => return Some(Notification::text(captions::PLAY_USAGE)),
            PlayRequest::Upload(upload) => {
                QueueEntry::new(upload.title, upload.file, &invocation.display_name, invocation.user)
                    .with_media_kind(upload.kind)
            }
            PlayRequest::Query(query) => match self.fetch(invocation, &query).await {
                Ok(entry) => entry,
                Err(reply) => return Some(reply),
            },
        };

        let file = entry.file().to_path_buf();
        match self.player.enqueue_request(chat, entry.clone()).await {
            Ok(EnqueueOutcome::Started { entry }) => Some(captions::now_playing(&entry)),
            Ok(EnqueueOutcome::Queued { position }) => Some(captions::queued(&entry, position)),
            Err(e) => {
                self.player.files().discard(&file);
                match e {
                    PlayerError::Admission(AdmissionError::QueueFull { max }) => {
                        Some(Notification::text(captions::queue_full(max)))
                    }
                    PlayerError::Admission(AdmissionError::AlreadyActive { channels }) => {
                        Some(Notification::text(captions::already_active(&channels)))
                    }
                    PlayerError::ChatUnavailable(_) => None,
                    PlayerError::PlaybackFailed(e) => {
                        warn!("Reproducción no iniciada en chat {}: {}", chat, e);
                        Some(Notification::text(captions::PLAYBACK_FAILED))
                    }
                }
            }
        }
    }

    pub async fn skip(&self, invocation: &Invocation) -> Option<Notification> {
        match self.player.advance(invocation.chat).await {
            Ok(AdvanceOutcome::Playing { entry, queued }) => Some(captions::skipped(
                &entry,
                &invocation.display_name,
                queued,
            )),
            Ok(AdvanceOutcome::QueueEmpty) => Some(Notification::text(captions::SKIP_QUEUE_EMPTY)),
            Ok(AdvanceOutcome::PlaybackFailed) => Some(Notification::text(captions::SKIP_ERROR)),
            Err(e) => {
                warn!("Skip abortado en chat {}: {}", invocation.chat, e);
                None
            }
        }
    }

    pub async fn queue(&self, invocation: &Invocation) -> Option<Notification> {
        if !self.chat.chat_exists(invocation.chat).await {
            return Some(Notification::text(captions::CHAT_UNAVAILABLE));
        }

        let entries = self.player.snapshot(invocation.chat).await;
        Some(Notification::text(captions::queue_listing(&entries)))
    }

    pub async fn pause(&self, invocation: &Invocation) -> Option<Notification> {
        if let Err(reply) = self.require_session(invocation).await {
            return Some(reply);
        }

        let reply = if self.player.pause(invocation.chat).await {
            captions::PAUSED
        } else {
            captions::PAUSE_FAILED
        };
        Some(Notification::text(reply))
    }

    pub async fn resume(&self, invocation: &Invocation) -> Option<Notification> {
        if let Err(reply) = self.require_session(invocation).await {
            return Some(reply);
        }

        let reply = if self.player.resume(invocation.chat).await {
            captions::RESUMED
        } else {
            captions::RESUME_FAILED
        };
        Some(Notification::text(reply))
    }

    pub async fn end(&self, invocation: &Invocation) -> Option<Notification> {
        if let Err(reply) = self.require_session(invocation).await {
            return Some(reply);
        }

        match self.player.terminate(invocation.chat).await {
            Ok(_) => Some(Notification::text(captions::STOPPED)),
            Err(e) => {
                error!("Error al terminar en chat {}: {}", invocation.chat, e);
                None
            }
        }
    }

    pub async fn toggle_multi(&self, invocation: &Invocation) -> Option<Notification> {
        if let Err(reply) = self.require_admin(invocation).await {
            return Some(reply);
        }

        let enabled = self.player.toggle_restriction();
        Some(Notification::text(captions::restriction_status(enabled)))
    }

    /// Auto-advance after the streaming transport reported the end of the
    /// track started as `generation`.
    ///
    /// Posts the outcome to the chat and returns what was posted. Ends of
    /// tracks that were already skipped post nothing.
    pub async fn on_stream_end(&self, chat: ChatId, generation: u64) -> Option<Notification> {
        let notification = match self.player.finish_track(chat, generation).await {
            Ok(Some(AdvanceOutcome::Playing { entry, .. })) => captions::auto_played(&entry),
            Ok(Some(AdvanceOutcome::QueueEmpty)) => {
                Notification::text(captions::QUEUE_EMPTY_LEAVING)
            }
            Ok(Some(AdvanceOutcome::PlaybackFailed)) => Notification::text(captions::ERROR_LEAVING),
            Ok(None) => return None,
            Err(e) => {
                warn!("Auto-avance abortado en chat {}: {}", chat, e);
                return None;
            }
        };

        if let Err(e) = self.chat.send_notification(chat, notification.clone()).await {
            warn!("No se pudo anunciar en chat {}: {}", chat, e);
        }

        Some(notification)
    }

    // Funciones privadas

    async fn fetch(&self, invocation: &Invocation, query: &str) -> Result<QueueEntry, Notification> {
        let track = match self.resolver.resolve(query).await {
            Ok(Some(track)) => track,
            Ok(None) => return Err(Notification::text(captions::NO_RESULTS)),
            Err(e) => {
                error!("Error resolviendo '{}': {}", query, e);
                return Err(Notification::text(captions::processing_error("query", &e)));
            }
        };

        let file = match self.resolver.download(&track.url).await {
            Ok(file) => file,
            Err(e) => {
                error!("Error descargando {}: {}", track.url, e);
                return Err(Notification::text(captions::DOWNLOAD_FAILED));
            }
        };

        let mut entry = QueueEntry::new(track.title, file, &invocation.display_name, invocation.user)
            .with_url(track.url)
            .with_duration_label(track.duration_label);
        if let Some(thumbnail) = track.thumbnail {
            entry = entry.with_thumbnail(thumbnail);
        }

        Ok(entry)
    }

    async fn require_admin(&self, invocation: &Invocation) -> Result<(), Notification> {
        if !self.chat.chat_exists(invocation.chat).await {
            return Err(Notification::text(captions::CHAT_UNAVAILABLE));
        }

        if !self.chat.is_admin(invocation.chat, invocation.user).await {
            return Err(Notification::text(captions::ADMIN_ONLY));
        }

        Ok(())
    }

    async fn require_session(&self, invocation: &Invocation) -> Result<(), Notification> {
        self.require_admin(invocation).await?;

        if !self.player.is_active(invocation.chat) {
            return Err(Notification::text(captions::NO_ACTIVE_PLAYBACK));
        }

        Ok(())
    }
}
