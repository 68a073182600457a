use async_trait::async_trait;
use dashmap::DashMap;
use serenity::all::{Cache, ChannelId, CreateMessage, GuildId, Http, UserId as DiscordUserId};
use songbird::{
    input::{File, Input},
    tracks::TrackHandle,
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{
    path::Path,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{ChatId, ChatTransport, Notification, StreamEvent, StreamTransport, UserId};
use crate::{error::TransportError, ui::embeds::create_media_embed};

/// Where a guild's notifications go and which voice channel to join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelBinding {
    pub text: ChannelId,
    pub voice: Option<ChannelId>,
}

/// Serenity + Songbird implementation of the chat and stream transports.
///
/// Every started track gets a generation number, carried by its
/// [`StreamEvent::Ended`]. Tracks replaced by a skip or dropped on leave stop
/// being current, and the player ignores their events.
pub struct DiscordTransport {
    http: Arc<Http>,
    cache: Arc<Cache>,
    songbird: Arc<Songbird>,
    bindings: DashMap<GuildId, ChannelBinding>,
    tracks: DashMap<GuildId, TrackHandle>,
    generations: Arc<DashMap<GuildId, u64>>,
    next_generation: AtomicU64,
    events: mpsc::UnboundedSender<StreamEvent>,
}

pub fn guild_of(chat: ChatId) -> GuildId {
    GuildId::new(chat.0)
}

pub fn chat_of(guild: GuildId) -> ChatId {
    ChatId(guild.get())
}

impl DiscordTransport {
    pub fn new(
        http: Arc<Http>,
        cache: Arc<Cache>,
        songbird: Arc<Songbird>,
    ) -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();

        let transport = Self {
            http,
            cache,
            songbird,
            bindings: DashMap::new(),
            tracks: DashMap::new(),
            generations: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(0),
            events,
        };

        (transport, receiver)
    }

    /// Records the channels a command came from.
    ///
    /// A missing voice channel keeps the previously bound one.
    pub fn bind(&self, guild: GuildId, text: ChannelId, voice: Option<ChannelId>) {
        self.bindings
            .entry(guild)
            .and_modify(|binding| {
                binding.text = text;
                if voice.is_some() {
                    binding.voice = voice;
                }
            })
            .or_insert(ChannelBinding { text, voice });
    }

    pub fn binding(&self, guild: GuildId) -> Option<ChannelBinding> {
        self.bindings.get(&guild).map(|binding| *binding)
    }

    fn current_track(&self, chat: ChatId) -> Result<TrackHandle, TransportError> {
        self.tracks
            .get(&guild_of(chat))
            .map(|handle| handle.clone())
            .ok_or(TransportError::NotConnected(chat))
    }

    async fn call_for(
        &self,
        guild: GuildId,
    ) -> Result<Arc<tokio::sync::Mutex<songbird::Call>>, TransportError> {
        if let Some(call) = self.songbird.get(guild) {
            return Ok(call);
        }

        let voice = self
            .binding(guild)
            .and_then(|binding| binding.voice)
            .ok_or_else(|| {
                TransportError::Stream(format!("no voice channel known for guild {}", guild))
            })?;

        info!("🔗 Conectando al canal {} en guild {}", voice, guild);
        self.songbird
            .join(guild, voice)
            .await
            .map_err(|e| TransportError::Stream(format!("join failed: {}", e)))
    }
}

#[async_trait]
impl ChatTransport for DiscordTransport {
    async fn chat_exists(&self, chat: ChatId) -> bool {
        self.cache.guild(guild_of(chat)).is_some()
    }

    async fn send_notification(
        &self,
        chat: ChatId,
        notification: Notification,
    ) -> Result<(), TransportError> {
        let channel = self
            .binding(guild_of(chat))
            .map(|binding| binding.text)
            .ok_or_else(|| TransportError::Chat(format!("no text channel bound for {}", chat)))?;

        match notification {
            Notification::Text(text) => {
                channel
                    .say(&self.http, text)
                    .await
                    .map_err(|e| TransportError::Chat(e.to_string()))?;
            }
            Notification::Media { image_url, caption } => {
                let message = CreateMessage::new().embed(create_media_embed(&image_url, &caption));
                if let Err(e) = channel.send_message(&self.http, message).await {
                    // Plain caption as fallback.
                    warn!("Embed rechazado en {}: {}, enviando texto", chat, e);
                    channel
                        .say(&self.http, caption)
                        .await
                        .map_err(|e| TransportError::Chat(e.to_string()))?;
                }
            }
        }

        Ok(())
    }

    async fn is_admin(&self, chat: ChatId, user: UserId) -> bool {
        let guild = guild_of(chat);
        let user = DiscordUserId::new(user.0);

        let member = match self.http.get_member(guild, user).await {
            Ok(member) => member,
            Err(e) => {
                debug!("No se pudo obtener miembro {} en {}: {}", user, guild, e);
                return false;
            }
        };

        let Some(guild) = self.cache.guild(guild) else {
            return false;
        };

        if guild.owner_id == user {
            return true;
        }

        let permissions = guild.member_permissions(&member);
        permissions.administrator() || permissions.manage_guild()
    }
}

#[async_trait]
impl StreamTransport for DiscordTransport {
    async fn start_stream(&self, chat: ChatId, file: &Path) -> Result<(), TransportError> {
        if !file.exists() {
            return Err(TransportError::Stream(format!(
                "file not found: {}",
                file.display()
            )));
        }

        let guild = guild_of(chat);
        let call = self.call_for(guild).await?;

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.generations.insert(guild, generation);

        let input: Input = File::new(file.to_path_buf()).into();
        let handle = {
            let mut call = call.lock().await;
            call.play_only_input(input)
        };

        for event in [TrackEvent::End, TrackEvent::Error] {
            handle
                .add_event(
                    Event::Track(event),
                    TrackEndNotifier {
                        guild,
                        generation,
                        generations: self.generations.clone(),
                        events: self.events.clone(),
                    },
                )
                .map_err(|e| TransportError::Stream(e.to_string()))?;
        }

        self.tracks.insert(guild, handle);
        debug!("▶️ Stream iniciado en guild {} (gen {})", guild, generation);
        Ok(())
    }

    async fn pause(&self, chat: ChatId) -> Result<(), TransportError> {
        self.current_track(chat)?
            .pause()
            .map_err(|e| TransportError::Stream(e.to_string()))
    }

    async fn resume(&self, chat: ChatId) -> Result<(), TransportError> {
        self.current_track(chat)?
            .play()
            .map_err(|e| TransportError::Stream(e.to_string()))
    }

    async fn leave(&self, chat: ChatId) -> Result<(), TransportError> {
        let guild = guild_of(chat);
        self.generations.remove(&guild);
        self.tracks.remove(&guild);

        if self.songbird.get(guild).is_none() {
            return Err(TransportError::NotConnected(chat));
        }

        self.songbird
            .remove(guild)
            .await
            .map_err(|e| TransportError::Stream(e.to_string()))?;

        info!("👋 Desconectado del canal de voz en guild {}", guild);
        Ok(())
    }

    fn is_current(&self, chat: ChatId, generation: u64) -> bool {
        self.generations
            .get(&guild_of(chat))
            .is_some_and(|current| *current == generation)
    }
}

/// Reports the end of the track started with `generation` while it is current.
struct TrackEndNotifier {
    guild: GuildId,
    generation: u64,
    generations: Arc<DashMap<GuildId, u64>>,
    events: mpsc::UnboundedSender<StreamEvent>,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(tracks) = ctx {
            for (state, _handle) in *tracks {
                debug!("Track en guild {} terminó con {:?}", self.guild, state.playing);
            }
        }

        let current = self
            .generations
            .get(&self.guild)
            .is_some_and(|generation| *generation == self.generation);

        if current {
            info!("🎵 Track terminó en guild {}", self.guild);
            let event = StreamEvent::Ended {
                chat: chat_of(self.guild),
                generation: self.generation,
            };
            if self.events.send(event).is_err() {
                warn!("Canal de eventos cerrado, guild {}", self.guild);
            }
        }

        None
    }
}
