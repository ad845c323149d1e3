//! # Bot Module
//!
//! Discord front end of the stream bot.
//!
//! This module contains:
//! - Slash command registration ([`commands`]) and dispatch ([`handlers`])
//! - The text-channel announcer used by the guild players ([`announcer`])
//! - Gateway event handling (ready, interactions, voice state updates)
//! - The background cache sweep
//!
//! ## Architecture
//!
//! [`StreamBot`] implements Serenity's [`EventHandler`] trait. It does not
//! touch voice connections itself: every guild has a player task (see
//! [`crate::audio::player`]) reached through the [`PlayerRegistry`], and the
//! handlers only translate interactions into player requests and the
//! replies back into messages.

use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, UserId, VoiceState},
    async_trait,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing::{debug, error, info, warn};

pub mod announcer;
pub mod commands;
pub mod handlers;

use crate::{
    audio::registry::PlayerRegistry, cache::AudioCache, config::Config,
    sources::MediaResolver, storage::FavoritesStore,
};
use announcer::ChannelAnnouncer;

/// Discord event handler for the stream bot.
///
/// ## Fields
///
/// - `config`: Bot configuration (token, paths, limits)
/// - `resolver`: Turns URLs and search queries into queue items
/// - `cache`: Download cache, swept periodically
/// - `favorites`: Saved playlists per guild
/// - `players`: One playback coordinator per guild
/// - `announcer`: Where each guild's player posts its events
///
/// ## Thread Safety
///
/// Everything is behind an [`Arc`]; mutable per-guild state lives inside the
/// player tasks and is only reached through message passing.
pub struct StreamBot {
    pub config: Arc<Config>,
    pub resolver: Arc<dyn MediaResolver>,
    pub cache: Arc<AudioCache>,
    pub favorites: Arc<FavoritesStore>,
    pub players: Arc<PlayerRegistry>,
    pub announcer: Arc<ChannelAnnouncer>,
    maintenance_started: AtomicBool,
}

impl StreamBot {
    /// Creates the handler from already constructed services.
    pub fn new(
        config: Arc<Config>,
        resolver: Arc<dyn MediaResolver>,
        cache: Arc<AudioCache>,
        favorites: Arc<FavoritesStore>,
        players: Arc<PlayerRegistry>,
        announcer: Arc<ChannelAnnouncer>,
    ) -> Self {
        Self {
            config,
            resolver,
            cache,
            favorites,
            players,
            announcer,
            maintenance_started: AtomicBool::new(false),
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// With `GUILD_ID` set the commands are registered on that guild only
    /// (they show up immediately); otherwise they are registered globally,
    /// which can take up to an hour to propagate.
    async fn register_commands(&self, ctx: &Context) -> anyhow::Result<()> {
        info!("📝 Registering slash commands...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ The bot is not a member of guild {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Guild command registration failed: {:?}", e);
                        anyhow::anyhow!(
                            "Could not register guild commands. Check the applications.commands scope."
                        )
                    })?;
                info!("✅ Guild commands registered for {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Global command registration failed: {:?}", e);
                    anyhow::anyhow!(
                        "Could not register global commands. Check the applications.commands scope."
                    )
                })?;
                info!("✅ Global commands registered");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for StreamBot {
    /// Registers commands and starts the cache sweep.
    ///
    /// `ready` fires again after every gateway reconnect; the sweep task is
    /// only spawned the first time.
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} is online!", ready.user.name);
        info!("📊 Connected to {} guild(s)", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Command registration failed: {:?}", e);
        }

        if !self.maintenance_started.swap(true, Ordering::SeqCst) {
            let cache = self.cache.clone();
            let players = self.players.clone();
            let interval = self.config.sweep_interval();

            tokio::spawn(async move {
                maintenance_tasks(cache, players, interval).await;
            });
        }
    }

    /// Dispatches slash commands and button clicks.
    ///
    /// Errors are logged; a failed interaction shows Discord's generic
    /// "interaction failed" notice to the user.
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                    error!("Command failed: {:?}", e);
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) = handlers::handle_component(&ctx, component_interaction, self).await
                {
                    error!("Component interaction failed: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Keeps the guild player informed about its voice channel.
    ///
    /// - **Bot disconnected** by someone else: the player stops and clears
    /// - **Anyone else moved**: the listener count of the bot's channel is
    ///   recomputed, which arms or cancels the idle timer
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let Some(player) = self.players.get(guild_id) else {
            return;
        };

        let bot_id = ctx.cache.current_user().id;

        if new.user_id == bot_id {
            let was_connected = old.as_ref().and_then(|o| o.channel_id).is_some();
            if was_connected && new.channel_id.is_none() {
                info!("🔌 Disconnected from voice in guild {}", guild_id);
                player.voice_lost();
                return;
            }
        }

        let listeners = ctx.cache.guild(guild_id).and_then(|guild| {
            let bot_channel = guild.voice_states.get(&bot_id)?.channel_id?;
            let states = guild.voice_states.values().map(|vs| {
                let is_bot = vs
                    .member
                    .as_ref()
                    .map(|m| m.user.bot)
                    .or_else(|| guild.members.get(&vs.user_id).map(|m| m.user.bot))
                    .unwrap_or(false);
                (vs.user_id, vs.channel_id, is_bot)
            });
            Some(count_listeners(states, bot_channel, bot_id))
        });

        if let Some(count) = listeners {
            debug!("👥 {} listener(s) with the bot in guild {}", count, guild_id);
            player.listeners_changed(count);
        }
    }
}

/// Counts the human members sitting in `channel`, ignoring the bot itself.
pub fn count_listeners(
    states: impl IntoIterator<Item = (UserId, Option<ChannelId>, bool)>,
    channel: ChannelId,
    bot_id: UserId,
) -> usize {
    states
        .into_iter()
        .filter(|(user_id, channel_id, is_bot)| {
            *user_id != bot_id && !is_bot && *channel_id == Some(channel)
        })
        .count()
}

/// Periodically deletes expired downloads.
///
/// Runs forever; a failed sweep is logged and retried on the next tick.
async fn maintenance_tasks(
    cache: Arc<AudioCache>,
    players: Arc<PlayerRegistry>,
    interval: Duration,
) {
    let mut interval = tokio::time::interval(interval);

    loop {
        interval.tick().await;

        match cache.sweep().await {
            Ok(0) => debug!("🧹 Cache sweep found nothing to delete"),
            Ok(removed) => info!("🧹 Cache sweep removed {} file(s)", removed),
            Err(e) => warn!("Cache sweep failed: {:?}", e),
        }

        info!("🧹 Maintenance done ({} guild player(s))", players.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listeners_exclude_bots_and_other_channels() {
        let bot = UserId::new(1);
        let music = ChannelId::new(100);
        let other = ChannelId::new(200);

        let states = vec![
            (bot, Some(music), true),
            (UserId::new(2), Some(music), false),
            (UserId::new(3), Some(music), false),
            (UserId::new(4), Some(music), true),
            (UserId::new(5), Some(other), false),
            (UserId::new(6), None, false),
        ];

        assert_eq!(count_listeners(states, music, bot), 2);
    }

    #[test]
    fn bot_alone_has_no_listeners() {
        let bot = UserId::new(1);
        let music = ChannelId::new(100);
        // The bot's own state may come without member data.
        let states = vec![(bot, Some(music), false)];
        assert_eq!(count_listeners(states, music, bot), 0);
    }
}
