use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod cache;
mod config;
mod error;
mod sources;
mod storage;
mod ui;

use crate::audio::{
    player::PlayerDeps, registry::PlayerRegistry, voice::SongbirdVoice,
};
use crate::bot::{announcer::ChannelAnnouncer, StreamBot};
use crate::cache::AudioCache;
use crate::config::Config;
use crate::sources::{DirectUrlClient, MediaResolver, SourceManager, YtDlpResolver};
use crate::storage::FavoritesStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("stream_bot=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎧 Starting Stream Bot v{}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    let sources = Arc::new(SourceManager::new(
        YtDlpResolver::new(
            config.ytdlp_path.clone(),
            config.yt_cookies.clone(),
            config.max_playlist_size,
        ),
        DirectUrlClient::new()?,
    ));

    if std::env::args().any(|arg| arg == "--health-check") {
        sources.verify_dependencies().await?;
        println!("OK");
        return Ok(());
    }

    if let Err(e) = sources.verify_dependencies().await {
        error!("⚠️ External tools are missing, downloads will fail: {:?}", e);
    }

    let resolver: Arc<dyn MediaResolver> = sources;
    let cache = Arc::new(AudioCache::new(config.cache_settings(), resolver.clone())?);
    let favorites = Arc::new(FavoritesStore::open(config.favorites_path()).await?);

    let songbird = Songbird::serenity();
    let announcer = Arc::new(ChannelAnnouncer::new(Arc::new(Http::new(
        &config.discord_token,
    ))));

    let players = Arc::new(PlayerRegistry::new(PlayerDeps {
        voice: Arc::new(SongbirdVoice::new(songbird.clone())),
        cache: cache.clone(),
        announcer: announcer.clone(),
        settings: config.player_settings(),
    }));

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = StreamBot::new(
        config.clone(),
        resolver,
        cache,
        favorites,
        players,
        announcer,
    );

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Could not listen for Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Shutdown signal received, closing...");
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot started");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}
