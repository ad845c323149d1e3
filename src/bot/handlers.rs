use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::{CommandInteraction, ComponentInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{
    audio::{
        player::{EnqueueOutcome, PlayOutcome, PlayerHandle, PlayerState},
        queue::{LoopMode, PlaybackQueue},
    },
    bot::StreamBot,
    error::{PlayerError, PlayerResult},
    sources::{MediaItem, Resolved},
    ui::{buttons, embeds},
};

/// Handles slash commands
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &StreamBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Command used outside of a guild"))?;

    info!(
        "📝 /{} used by {} in guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "stream" => handle_stream(ctx, &command, bot, guild_id).await?,
        "play" => handle_play(ctx, &command, bot, guild_id).await?,
        "pause" => handle_pause(ctx, &command, bot, guild_id).await?,
        "resume" => handle_resume(ctx, &command, bot, guild_id).await?,
        "skip" => handle_skip(ctx, &command, bot, guild_id).await?,
        "stop" => handle_stop(ctx, &command, bot, guild_id).await?,
        "queue" => handle_queue(ctx, &command, bot, guild_id).await?,
        "jump" => handle_jump(ctx, &command, bot, guild_id).await?,
        "restart" => handle_restart(ctx, &command, bot, guild_id).await?,
        "loop" => handle_loop(ctx, &command, bot, guild_id).await?,
        "nowplaying" => handle_nowplaying(ctx, &command, bot, guild_id).await?,
        "fav-save" => handle_fav_save(ctx, &command, bot, guild_id).await?,
        "fav-list" => handle_fav_list(ctx, &command, bot, guild_id).await?,
        "fav-play" => handle_fav_play(ctx, &command, bot, guild_id).await?,
        "help" => respond_embed(ctx, &command, embeds::create_help_embed(), true).await?,
        _ => respond(ctx, &command, "❌ Unknown command", true).await?,
    }

    Ok(())
}

/// Handles component interactions (player buttons)
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &StreamBot,
) -> Result<()> {
    info!(
        "🔘 Button {} pressed by {}",
        component.data.custom_id, component.user.name
    );

    buttons::handle_player_component(ctx, &component, bot).await
}

// Playback

async fn handle_stream(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &StreamBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = string_option(command, "query")
        .ok_or_else(|| anyhow::anyhow!("Missing query"))?;

    enqueue_query(ctx, command, bot, guild_id, query).await
}

/// `/play` with a query behaves like `/stream`; without one it resumes or
/// starts the existing queue.
async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &StreamBot,
    guild_id: GuildId,
) -> Result<()> {
    if let Some(query) = string_option(command, "query") {
        return enqueue_query(ctx, command, bot, guild_id, query).await;
    }

    let channel_id = match get_user_voice_channel(ctx, guild_id, command.user.id) {
        Ok(channel_id) => channel_id,
        Err(e) => return respond_error(ctx, command, &e).await,
    };

    // Joining voice can take a few seconds
    defer(ctx, command).await?;

    bot.announcer.set_channel(guild_id, command.channel_id);
    let player = bot.players.get_or_spawn(guild_id);

    let message = match player.play(channel_id).await {
        Ok(PlayOutcome::Started) => "▶️ Starting the queue".to_string(),
        Ok(PlayOutcome::Resumed) => "▶️ Resumed".to_string(),
        Ok(PlayOutcome::AlreadyPlaying) => "🎵 Already playing".to_string(),
        Err(e) => e.user_message(),
    };
    edit_content(ctx, command, &message).await
}

async fn enqueue_query(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &StreamBot,
    guild_id: GuildId,
    query: &str,
) -> Result<()> {
    let channel_id = match get_user_voice_channel(ctx, guild_id, command.user.id) {
        Ok(channel_id) => channel_id,
        Err(e) => return respond_error(ctx, command, &e).await,
    };

    // Lookups can take a few seconds
    defer(ctx, command).await?;

    let resolved = match bot.resolver.lookup(query).await {
        Ok(resolved) => resolved,
        Err(e) => {
            warn!("Lookup failed for \"{}\": {:?}", query, e);
            let error = PlayerError::ResolutionFailed(e.to_string());
            return edit_content(ctx, command, &error.user_message()).await;
        }
    };

    let playlist_title = match &resolved {
        Resolved::Single(_) => None,
        Resolved::Playlist { title, .. } => Some(title.clone().unwrap_or_default()),
    };
    let items = resolved.into_items();
    let first = items.first().cloned();

    bot.announcer.set_channel(guild_id, command.channel_id);
    let player = bot.players.get_or_spawn(guild_id);

    let outcome = match player.enqueue(items, channel_id).await {
        Ok(outcome) => outcome,
        Err(e) => return edit_content(ctx, command, &e.user_message()).await,
    };

    let embed = match (playlist_title, first) {
        (None, Some(item)) => match outcome {
            EnqueueOutcome::Started {
                position, current, ..
            } => embeds::create_item_added_embed(&item, position, Some(current)),
            EnqueueOutcome::Queued { position, .. } => {
                embeds::create_item_added_embed(&item, position, None)
            }
        },
        (title, _) => {
            let (added, started) = match outcome {
                EnqueueOutcome::Started { added, .. } => (added, true),
                EnqueueOutcome::Queued { added, .. } => (added, false),
            };
            let title = title.filter(|t| !t.is_empty());
            embeds::create_playlist_added_embed(title.as_deref(), added, started)
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn handle_pause(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &StreamBot,
    guild_id: GuildId,
) -> Result<()> {
    let result = match existing_player(bot, guild_id) {
        Ok(player) => player.pause().await,
        Err(e) => Err(e),
    };

    match result {
        Ok(outcome) => respond(ctx, command, outcome.user_message(), false).await,
        Err(e) => respond_error(ctx, command, &e).await,
    }
}

async fn handle_resume(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &StreamBot,
    guild_id: GuildId,
) -> Result<()> {
    let result = match existing_player(bot, guild_id) {
        Ok(player) => player.resume().await,
        Err(e) => Err(e),
    };

    match result {
        Ok(outcome) => respond(ctx, command, outcome.user_message(), false).await,
        Err(e) => respond_error(ctx, command, &e).await,
    }
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &StreamBot,
    guild_id: GuildId,
) -> Result<()> {
    let result = match existing_player(bot, guild_id) {
        Ok(player) => player.skip().await,
        Err(e) => Err(e),
    };

    match result {
        Ok(title) => respond(ctx, command, &format!("⏭️ Skipped **{}**", title), false).await,
        Err(e) => respond_error(ctx, command, &e).await,
    }
}

async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &StreamBot,
    guild_id: GuildId,
) -> Result<()> {
    let result = match existing_player(bot, guild_id) {
        Ok(player) => player.stop().await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => {
            respond(
                ctx,
                command,
                "⏹️ Stopped, cleared the queue and left the channel",
                false,
            )
            .await
        }
        Err(e) => respond_error(ctx, command, &e).await,
    }
}

// Queue

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &StreamBot,
    guild_id: GuildId,
) -> Result<()> {
    let page = integer_option(command, "page").unwrap_or(1).max(1) as usize;

    let snapshot = match bot.players.get(guild_id) {
        Some(player) => match player.status().await {
            Ok(status) => status.queue,
            Err(e) => return respond_error(ctx, command, &e).await,
        },
        None => PlaybackQueue::new(bot.config.max_queue_size).snapshot(None),
    };

    respond_embed(ctx, command, embeds::create_queue_embed(&snapshot, page), false).await
}

async fn handle_jump(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &StreamBot,
    guild_id: GuildId,
) -> Result<()> {
    let position = integer_option(command, "position")
        .ok_or_else(|| anyhow::anyhow!("Missing position"))?;

    let result = match existing_player(bot, guild_id) {
        Ok(player) => player.jump(position).await,
        Err(_) => Err(PlayerError::InvalidIndex {
            index: position,
            len: 0,
        }),
    };

    match result {
        Ok(true) => {
            respond(ctx, command, &format!("⏩ Jumping to item {}", position), false).await
        }
        Ok(false) => {
            respond(
                ctx,
                command,
                &format!("📍 Item {} is up next. Use `/play` to start.", position),
                false,
            )
            .await
        }
        Err(e) => respond_error(ctx, command, &e).await,
    }
}

async fn handle_restart(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &StreamBot,
    guild_id: GuildId,
) -> Result<()> {
    let result = match existing_player(bot, guild_id) {
        Ok(player) => player.restart().await,
        Err(_) => Err(PlayerError::InvalidIndex { index: 1, len: 0 }),
    };

    match result {
        Ok(true) => respond(ctx, command, "⏮️ Restarting from the first item", false).await,
        Ok(false) => {
            respond(
                ctx,
                command,
                "📍 Back at the first item. Use `/play` to start.",
                false,
            )
            .await
        }
        Err(e) => respond_error(ctx, command, &e).await,
    }
}

async fn handle_loop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &StreamBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(mode) = string_option(command, "mode").and_then(LoopMode::parse) else {
        return respond(ctx, command, "❌ Mode must be off, track or queue", true).await;
    };

    let player = bot.players.get_or_spawn(guild_id);
    if let Err(e) = player.set_loop(mode).await {
        return respond_error(ctx, command, &e).await;
    }

    let message = match mode {
        LoopMode::Off => "➡️ Loop disabled",
        LoopMode::Track => "🔂 Repeating the current item",
        LoopMode::Queue => "🔁 Repeating the whole queue",
    };
    respond(ctx, command, message, false).await
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &StreamBot,
    guild_id: GuildId,
) -> Result<()> {
    let status = match existing_player(bot, guild_id) {
        Ok(player) => player.status().await,
        Err(e) => Err(e),
    };

    let status = match status {
        Ok(status) => status,
        Err(e) => return respond_error(ctx, command, &e).await,
    };

    let Some(item) = status.queue.current_item() else {
        return respond_error(ctx, command, &PlayerError::NothingPlaying).await;
    };

    let paused = status.state == PlayerState::Paused;
    let position = status.queue.current.map_or(0, |i| i + 1);
    let embed = embeds::create_now_playing_embed(
        item,
        position,
        status.queue.items.len(),
        Some(status.queue.loop_mode),
        paused,
    );

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .components(buttons::create_player_buttons(paused)),
            ),
        )
        .await?;

    Ok(())
}

// Favourites

async fn handle_fav_save(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &StreamBot,
    guild_id: GuildId,
) -> Result<()> {
    let name = string_option(command, "name")
        .ok_or_else(|| anyhow::anyhow!("Missing name"))?;

    let urls: Vec<String> = match bot.players.get(guild_id) {
        Some(player) => match player.status().await {
            Ok(status) => status.queue.source_urls(),
            Err(e) => return respond_error(ctx, command, &e).await,
        },
        None => Vec::new(),
    };

    if urls.is_empty() {
        return respond(ctx, command, "📭 The queue is empty, nothing to save.", true).await;
    }

    let count = urls.len();
    match bot.favorites.save(guild_id.get(), name, urls).await {
        Ok(()) => {
            respond(
                ctx,
                command,
                &format!("⭐ Saved **{}** ({} items)", name.trim(), count),
                false,
            )
            .await
        }
        Err(e) => {
            warn!("Could not save favourite \"{}\": {:?}", name, e);
            respond(ctx, command, &format!("❌ Could not save: {}", e), true).await
        }
    }
}

async fn handle_fav_list(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &StreamBot,
    guild_id: GuildId,
) -> Result<()> {
    let names = bot.favorites.list_names(guild_id.get()).await;
    respond_embed(ctx, command, embeds::create_favorites_embed(&names), true).await
}

async fn handle_fav_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &StreamBot,
    guild_id: GuildId,
) -> Result<()> {
    let name = string_option(command, "name")
        .ok_or_else(|| anyhow::anyhow!("Missing name"))?;

    let Some(urls) = bot.favorites.get(guild_id.get(), name).await else {
        return respond(
            ctx,
            command,
            &format!("❌ No favourite named **{}**. See `/fav-list`.", name.trim()),
            true,
        )
        .await;
    };

    let channel_id = match get_user_voice_channel(ctx, guild_id, command.user.id) {
        Ok(channel_id) => channel_id,
        Err(e) => return respond_error(ctx, command, &e).await,
    };

    let items: Vec<MediaItem> = urls.into_iter().map(MediaItem::unresolved).collect();

    defer(ctx, command).await?;

    bot.announcer.set_channel(guild_id, command.channel_id);
    let player = bot.players.get_or_spawn(guild_id);

    let (added, started) = match player.enqueue(items, channel_id).await {
        Ok(EnqueueOutcome::Started { added, .. }) => (added, true),
        Ok(EnqueueOutcome::Queued { added, .. }) => (added, false),
        Err(e) => return edit_content(ctx, command, &e.user_message()).await,
    };

    let embed = embeds::create_playlist_added_embed(Some(name.trim()), added, started);
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

// Helpers

fn existing_player(bot: &StreamBot, guild_id: GuildId) -> PlayerResult<PlayerHandle> {
    bot.players
        .get(guild_id)
        .ok_or(PlayerError::NothingPlaying)
}

fn string_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn integer_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

async fn respond(
    ctx: &Context,
    command: &CommandInteraction,
    content: &str,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;

    Ok(())
}

async fn respond_embed(
    ctx: &Context,
    command: &CommandInteraction,
    embed: CreateEmbed,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;

    Ok(())
}

async fn respond_error(
    ctx: &Context,
    command: &CommandInteraction,
    error: &PlayerError,
) -> Result<()> {
    info!("/{} rejected: {}", command.data.name, error);
    respond(ctx, command, &error.user_message(), true).await
}

async fn defer(ctx: &Context, command: &CommandInteraction) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    Ok(())
}

async fn edit_content(ctx: &Context, command: &CommandInteraction, content: &str) -> Result<()> {
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(content))
        .await?;

    Ok(())
}

/// Voice channel the user is currently connected to
pub fn get_user_voice_channel(
    ctx: &Context,
    guild_id: GuildId,
    user_id: UserId,
) -> PlayerResult<ChannelId> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or(PlayerError::NotInVoiceChannel)?;

    guild
        .voice_states
        .get(&user_id)
        .and_then(|vs| vs.channel_id)
        .ok_or(PlayerError::NotInVoiceChannel)
}
