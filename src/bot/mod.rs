//! # Bot Module
//!
//! Discord glue for Vibe Queue.
//!
//! - [`VibeQueueBot`] implements Serenity's [`EventHandler`]: it parses prefix
//!   commands, remembers which text and voice channels a guild uses, saves
//!   attached audio and hands everything to [`commands::CommandHandler`]
//! - [`run_stream_events`] feeds finished tracks back into the player
//!
//! Shared state lives in the client's `TypeMap` under [`BotState`]; it is
//! inserted after the client is built because the transport needs the
//! client's HTTP and cache handles.

use serenity::{
    all::{Attachment, ChannelId, Context, EventHandler, GuildId, Message, Ready, UserId as DiscordUserId},
    async_trait,
    prelude::TypeMapKey,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub mod commands;

use crate::{
    audio::queue::MediaKind,
    config::Config,
    transport::{
        discord::{chat_of, DiscordTransport},
        ChatTransport, StreamEvent, UserId,
    },
};
use commands::{Command, CommandHandler, Invocation, Upload};

/// State shared between the event handler and the stream-event loop.
pub struct BotState {
    pub transport: Arc<DiscordTransport>,
    pub commands: Arc<CommandHandler>,
}

impl TypeMapKey for BotState {
    type Value = Arc<BotState>;
}

pub struct VibeQueueBot {
    config: Arc<Config>,
}

impl VibeQueueBot {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    async fn state(ctx: &Context) -> Option<Arc<BotState>> {
        ctx.data.read().await.get::<BotState>().cloned()
    }

    /// Saves the first audio or video attachment of `msg`, or of the message
    /// it replies to.
    async fn save_upload(&self, msg: &Message) -> Option<Upload> {
        let attachment = find_media(&msg.attachments).or_else(|| {
            msg.referenced_message
                .as_deref()
                .and_then(|replied| find_media(&replied.attachments))
        })?;

        let bytes = match attachment.download().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("No se pudo descargar adjunto {}: {}", attachment.filename, e);
                return None;
            }
        };

        let file = self
            .config
            .download_dir
            .join(format!("{}-{}", attachment.id, sanitize(&attachment.filename)));
        if let Err(e) = tokio::fs::write(&file, bytes).await {
            error!("Error guardando adjunto en {}: {}", file.display(), e);
            return None;
        }

        debug!("💾 Adjunto guardado en {}", file.display());
        Some(Upload {
            title: attachment.filename.clone(),
            file,
            kind: media_kind(attachment),
        })
    }
}

fn find_media(attachments: &[Attachment]) -> Option<&Attachment> {
    attachments.iter().find(|attachment| {
        attachment
            .content_type
            .as_deref()
            .is_some_and(|kind| kind.starts_with("audio/") || kind.starts_with("video/"))
    })
}

fn media_kind(attachment: &Attachment) -> MediaKind {
    match attachment.content_type.as_deref() {
        Some(kind) if kind.starts_with("video/") => MediaKind::Video,
        _ => MediaKind::Audio,
    }
}

fn sanitize(filename: &str) -> String {
    filename
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect()
}

fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: DiscordUserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

#[async_trait]
impl EventHandler for VibeQueueBot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(guild_id) = msg.guild_id else {
            return;
        };
        let Some(command) = Command::parse(&self.config.command_prefix, &msg.content) else {
            return;
        };
        let Some(state) = Self::state(&ctx).await else {
            warn!("Estado del bot no inicializado, ignorando {}", command.name());
            return;
        };

        let voice = user_voice_channel(&ctx, guild_id, msg.author.id);
        state.transport.bind(guild_id, msg.channel_id, voice);

        let upload = match command {
            Command::Play(_) => self.save_upload(&msg).await,
            _ => None,
        };

        let invocation = Invocation {
            chat: chat_of(guild_id),
            user: UserId(msg.author.id.get()),
            display_name: msg
                .author
                .global_name
                .clone()
                .unwrap_or_else(|| msg.author.name.clone()),
        };

        if let Some(reply) = state.commands.dispatch(&invocation, command, upload).await {
            if let Err(e) = state
                .transport
                .send_notification(invocation.chat, reply)
                .await
            {
                error!("Error respondiendo en guild {}: {}", guild_id, e);
            }
        }
    }
}

/// Advances a chat every time its track ends. Runs until the transport is
/// dropped.
pub async fn run_stream_events(
    mut events: mpsc::UnboundedReceiver<StreamEvent>,
    commands: Arc<CommandHandler>,
) {
    while let Some(event) = events.recv().await {
        match event {
            StreamEvent::Ended { chat, generation } => {
                let commands = commands.clone();
                tokio::spawn(async move {
                    commands.on_stream_end(chat, generation).await;
                });
            }
        }
    }

    info!("Canal de eventos de audio cerrado");
}
