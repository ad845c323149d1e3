use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Registers every command globally
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registers every command on one guild (instant propagation)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

pub fn all_commands() -> Vec<CreateCommand> {
    vec![
        stream_command(),
        play_command(),
        pause_command(),
        resume_command(),
        skip_command(),
        stop_command(),
        queue_command(),
        jump_command(),
        restart_command(),
        loop_command(),
        nowplaying_command(),
        fav_save_command(),
        fav_list_command(),
        fav_play_command(),
        help_command(),
    ]
}

// Playback

fn stream_command() -> CreateCommand {
    CreateCommand::new("stream")
        .description("Play a link, playlist or search query")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL or search terms",
            )
            .required(true),
        )
}

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Queue something, or resume / start the current queue")
        .add_option(CreateCommandOption::new(
            CommandOptionType::String,
            "query",
            "URL or search terms",
        ))
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pause playback")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Resume paused playback")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Skip to the next item")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Stop, clear the queue and leave voice")
}

// Queue

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Show the queue")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "page", "Page number")
                .min_int_value(1),
        )
}

fn jump_command() -> CreateCommand {
    CreateCommand::new("jump")
        .description("Jump to a position in the queue")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "position",
                "Position as shown by /queue",
            )
            .required(true),
        )
}

fn restart_command() -> CreateCommand {
    CreateCommand::new("restart").description("Play the queue again from the first item")
}

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop")
        .description("Set the repeat mode")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "mode", "Repeat mode")
                .add_string_choice("Off", "off")
                .add_string_choice("Current item", "track")
                .add_string_choice("Whole queue", "queue")
                .required(true),
        )
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Show what is playing")
}

// Favourites

fn fav_save_command() -> CreateCommand {
    CreateCommand::new("fav-save")
        .description("Save the current queue as a favourite playlist")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "name", "Playlist name")
                .required(true),
        )
}

fn fav_list_command() -> CreateCommand {
    CreateCommand::new("fav-list").description("List saved favourite playlists")
}

fn fav_play_command() -> CreateCommand {
    CreateCommand::new("fav-play")
        .description("Queue a saved favourite playlist")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "name", "Playlist name")
                .required(true),
        )
}

fn help_command() -> CreateCommand {
    CreateCommand::new("help").description("Show available commands")
}
