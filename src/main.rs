use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod error;
mod sources;
mod transport;
mod ui;

use crate::audio::player::AudioPlayer;
use crate::bot::{commands::CommandHandler, run_stream_events, BotState, VibeQueueBot};
use crate::config::Config;
use crate::sources::YtDlpResolver;
use crate::transport::discord::DiscordTransport;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vibe_queue=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Vibe Queue v{}", env!("CARGO_PKG_VERSION"));

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    // Construir cliente
    let songbird = Songbird::serenity();
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(VibeQueueBot::new(config.clone()))
        .register_songbird_with(songbird.clone())
        .await?;

    // Transporte, reproductor y comandos necesitan los handles del cliente
    let (transport, stream_events) =
        DiscordTransport::new(client.http.clone(), client.cache.clone(), songbird);
    let transport = Arc::new(transport);
    let player = Arc::new(AudioPlayer::new(
        config.player_settings(),
        transport.clone(),
        transport.clone(),
    ));
    let resolver = Arc::new(YtDlpResolver::new(
        config.download_dir.clone(),
        config.resolver_concurrency,
    ));
    let commands = Arc::new(CommandHandler::new(player, transport.clone(), resolver));

    {
        let mut data = client.data.write().await;
        data.insert::<BotState>(Arc::new(BotState {
            transport,
            commands: commands.clone(),
        }));
    }

    tokio::spawn(run_stream_events(stream_events, commands));

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check() -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new("yt-dlp")
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = async_process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
