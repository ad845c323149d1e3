use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    audio::queue::{LoopMode, QueueSnapshot},
    sources::MediaItem,
};

const ITEMS_PER_PAGE: usize = 10;

/// Standard colour palette for the bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Standard footer for every embed
const STANDARD_FOOTER: &str = "🎧 Stream Bot";

fn loop_label(mode: LoopMode) -> &'static str {
    match mode {
        LoopMode::Off => "➡️ Off",
        LoopMode::Track => "🔂 Current item",
        LoopMode::Queue => "🔁 Whole queue",
    }
}

fn linked_title(item: &MediaItem) -> String {
    if crate::sources::is_url(&item.source_url) {
        format!("**[{}]({})**", item.title, item.source_url)
    } else {
        format!("**{}**", item.title)
    }
}

fn duration_label(item: &MediaItem) -> String {
    item.duration()
        .map(format_duration)
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Embed for the item that just started
pub fn create_now_playing_embed(
    item: &MediaItem,
    position: usize,
    total: usize,
    loop_mode: Option<LoopMode>,
    paused: bool,
) -> CreateEmbed {
    let title = if paused {
        "⏸️ Paused"
    } else {
        "🎵 Now Playing"
    };

    let mut embed = CreateEmbed::default()
        .title(title)
        .description(linked_title(item))
        .color(if paused {
            colors::WARNING_ORANGE
        } else {
            colors::MUSIC_PURPLE
        })
        .field("⏱️ Duration", duration_label(item), true)
        .field("📋 Position", format!("{} / {}", position, total), true);

    if let Some(mode) = loop_mode {
        embed = embed.field("🔁 Loop", loop_label(mode), true);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Embed confirming a single queued item
///
/// `started_at` is the position playback started from, if this enqueue
/// started it.
pub fn create_item_added_embed(
    item: &MediaItem,
    position: usize,
    started_at: Option<usize>,
) -> CreateEmbed {
    let footer = match started_at {
        Some(current) if current == position => "▶️ Starting playback".to_string(),
        Some(current) => format!(
            "📋 Position {} in the queue · ▶️ Starting playback at item {}",
            position, current
        ),
        None => format!("📋 Position {} in the queue", position),
    };

    CreateEmbed::default()
        .title("✅ Added to Queue")
        .description(linked_title(item))
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Duration", duration_label(item), true)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(footer))
}

/// Embed confirming a playlist (or favourite) was queued
pub fn create_playlist_added_embed(title: Option<&str>, added: usize, started: bool) -> CreateEmbed {
    let name = title.unwrap_or("Playlist");
    let description = if added == 1 {
        format!("Added **1 item** from **{}**", name)
    } else {
        format!("Added **{} items** from **{}**", added, name)
    };

    CreateEmbed::default()
        .title("📋 Playlist Added")
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(if started {
            "▶️ Starting playback"
        } else {
            STANDARD_FOOTER
        }))
}

/// Embed for one page of the queue
pub fn create_queue_embed(snapshot: &QueueSnapshot, page: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Queue")
        .color(colors::INFO_BLUE);

    if snapshot.items.is_empty() {
        return embed
            .description("😴 **The queue is empty**\n\n💡 Use `/stream <link or search>` to add something")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    if let Some(current) = snapshot.current_item() {
        embed = embed.field("▶️ Now Playing", linked_title(current), false);
    }

    let queue_page = snapshot.get_page(page, ITEMS_PER_PAGE);
    let mut listing = String::new();
    for (position, item) in &queue_page.entries {
        let marker = if snapshot.current == Some(position - 1) {
            "▶️ "
        } else {
            ""
        };
        let duration = item
            .duration()
            .map(|d| format!(" `[{}]`", format_duration(d)))
            .unwrap_or_default();
        listing.push_str(&format!(
            "{}**{}**. {}{}\n",
            marker, position, item.title, duration
        ));
    }
    embed = embed.field("Items", listing, false);

    let mut info = format!("**Total:** {} items", snapshot.items.len());
    if snapshot.total_duration > Duration::ZERO {
        info.push_str(&format!(
            " • **Duration:** {}",
            format_duration(snapshot.total_duration)
        ));
    }
    info.push_str(&format!(" • **Loop:** {}", loop_label(snapshot.loop_mode)));
    embed = embed.field("Info", info, false);

    if queue_page.total_pages > 1 {
        embed = embed.footer(CreateEmbedFooter::new(format!(
            "Page {} of {} • Stream Bot",
            queue_page.current_page, queue_page.total_pages
        )));
    } else {
        embed = embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    }

    embed.timestamp(Timestamp::now())
}

/// General help embed
pub fn create_help_embed() -> CreateEmbed {
    CreateEmbed::default()
        .title("🎧 Stream Bot - Commands")
        .color(colors::INFO_BLUE)
        .description("Plays links, playlists and searches in your voice channel")
        .field(
            "🎵 Playback",
            "• `/stream <link or search>` - Queue and play\n\
            • `/play [link or search]` - Same, or resume / start the queue\n\
            • `/pause` • `/resume` • `/skip` • `/stop`\n\
            • `/nowplaying` - Show the current item",
            false,
        )
        .field(
            "📋 Queue",
            "• `/queue [page]` - Show the queue\n\
            • `/jump <position>` - Play a specific item\n\
            • `/restart` - Start again from the first item\n\
            • `/loop <off|track|queue>` - Repeat mode",
            false,
        )
        .field(
            "⭐ Favourites",
            "• `/fav-save <name>` - Save the queue\n\
            • `/fav-list` - List saved playlists\n\
            • `/fav-play <name>` - Queue a saved playlist",
            false,
        )
        .field(
            "🔗 Sources",
            "• YouTube videos, playlists and searches (via yt-dlp)\n\
            • Direct `.mp3` links",
            false,
        )
        .footer(CreateEmbedFooter::new(
            "The bot leaves when the voice channel stays empty",
        ))
        .timestamp(Timestamp::now())
}

/// Embed listing a guild's favourite playlists
pub fn create_favorites_embed(names: &[String]) -> CreateEmbed {
    let description = if names.is_empty() {
        "No favourites yet. Save the current queue with `/fav-save <name>`.".to_string()
    } else {
        names
            .iter()
            .map(|name| format!("• **{}**", name))
            .collect::<Vec<_>>()
            .join("\n")
    };

    CreateEmbed::default()
        .title("⭐ Favourite Playlists")
        .description(description)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("ℹ️ {}", title))
        .description(description)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Formats a duration as `m:ss` or `h:mm:ss`
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::queue::PlaybackQueue;
    use serde_json::Value;

    fn to_json(embed: &CreateEmbed) -> Value {
        serde_json::to_value(embed).unwrap()
    }

    #[test]
    fn durations_are_formatted() {
        assert_eq!(format_duration(Duration::from_secs(5)), "0:05");
        assert_eq!(format_duration(Duration::from_secs(305)), "5:05");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
    }

    #[test]
    fn queue_embed_marks_current_item() {
        let mut queue = PlaybackQueue::new(10);
        queue
            .enqueue(MediaItem::new("https://a.test/1", "First", 60))
            .unwrap();
        queue
            .enqueue(MediaItem::new("https://a.test/2", "Second", 90))
            .unwrap();

        let json = to_json(&create_queue_embed(&queue.snapshot(Some(1)), 1));
        let fields = json["fields"].as_array().unwrap();

        assert!(fields[0]["value"].as_str().unwrap().contains("Second"));
        let listing = fields[1]["value"].as_str().unwrap();
        assert!(listing.contains("**1**. First `[1:00]`"));
        assert!(listing.contains("▶️ **2**. Second `[1:30]`"));
        assert!(fields[2]["value"].as_str().unwrap().contains("2:30"));
    }

    #[test]
    fn added_embed_names_where_playback_starts() {
        let item = MediaItem::new("https://a.test/4", "Fourth", 60);
        let footer = |started_at| {
            to_json(&create_item_added_embed(&item, 4, started_at))["footer"]["text"]
                .as_str()
                .unwrap()
                .to_string()
        };

        assert_eq!(footer(Some(4)), "▶️ Starting playback");
        assert_eq!(
            footer(Some(2)),
            "📋 Position 4 in the queue · ▶️ Starting playback at item 2"
        );
        assert_eq!(footer(None), "📋 Position 4 in the queue");
    }

    #[test]
    fn empty_queue_embed_has_hint() {
        let queue = PlaybackQueue::new(10);
        let json = to_json(&create_queue_embed(&queue.snapshot(None), 1));
        assert!(json["description"].as_str().unwrap().contains("empty"));
    }

    #[test]
    fn unknown_duration_is_labelled() {
        let item = MediaItem::unresolved("https://a.test/x.mp3");
        let json = to_json(&create_now_playing_embed(&item, 1, 3, None, false));
        assert_eq!(json["fields"][0]["value"], "Unknown");
        assert_eq!(json["fields"][1]["value"], "1 / 3");
    }
}
