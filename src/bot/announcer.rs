use async_trait::async_trait;
use dashmap::DashMap;
use serenity::{
    all::{ChannelId, GuildId},
    builder::CreateMessage,
    http::Http,
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{
    audio::player::{Announcer, PlayerEvent},
    ui::{buttons, embeds},
};

/// Posts player events to the text channel a guild last used for commands.
pub struct ChannelAnnouncer {
    http: Arc<Http>,
    channels: DashMap<GuildId, ChannelId>,
}

impl ChannelAnnouncer {
    pub fn new(http: Arc<Http>) -> Self {
        Self {
            http,
            channels: DashMap::new(),
        }
    }

    pub fn set_channel(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.channels.insert(guild_id, channel_id);
    }

    fn channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.channels.get(&guild_id).map(|c| *c)
    }
}

/// Plain-text rendering of the events that are not sent as an embed.
pub fn event_message(event: &PlayerEvent) -> Option<String> {
    match event {
        PlayerEvent::NowPlaying { .. } => None,
        PlayerEvent::Skipped { title, reason } => {
            Some(format!("⚠️ Skipped **{}**: {}", title, reason))
        }
        PlayerEvent::QueueFinished => {
            Some("✅ Reached the end of the queue. Use `/play` to start it again.".to_string())
        }
        PlayerEvent::Halted => Some(
            "🛑 Every item in the queue failed to play, so playback stopped.".to_string(),
        ),
        PlayerEvent::IdleDisconnect => {
            Some("👋 Left the voice channel because nobody was listening.".to_string())
        }
    }
}

#[async_trait]
impl Announcer for ChannelAnnouncer {
    async fn announce(&self, guild_id: GuildId, event: PlayerEvent) {
        let Some(channel_id) = self.channel(guild_id) else {
            debug!("No announcement channel for guild {}: {:?}", guild_id, event);
            return;
        };

        let message = match &event {
            PlayerEvent::NowPlaying {
                item,
                position,
                total,
            } => CreateMessage::new()
                .embed(embeds::create_now_playing_embed(
                    item, *position, *total, None, false,
                ))
                .components(buttons::create_player_buttons(false)),
            other => {
                let Some(text) = event_message(other) else {
                    return;
                };
                match other {
                    PlayerEvent::Halted => {
                        CreateMessage::new().embed(embeds::create_error_embed("Playback stopped", &text))
                    }
                    PlayerEvent::QueueFinished | PlayerEvent::IdleDisconnect => {
                        CreateMessage::new().embed(embeds::create_info_embed("Player", &text))
                    }
                    _ => CreateMessage::new().content(text),
                }
            }
        };

        if let Err(e) = channel_id.send_message(&self.http, message).await {
            warn!("Could not post to channel {} in guild {}: {:?}", channel_id, guild_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MediaItem;

    #[test]
    fn skip_message_names_item_and_reason() {
        let text = event_message(&PlayerEvent::Skipped {
            title: "Song".to_string(),
            reason: "download failed".to_string(),
        })
        .unwrap();
        assert_eq!(text, "⚠️ Skipped **Song**: download failed");
    }

    #[test]
    fn now_playing_is_not_plain_text() {
        let event = PlayerEvent::NowPlaying {
            item: MediaItem::new("https://a.test/1", "One", 10),
            position: 1,
            total: 1,
        };
        assert_eq!(event_message(&event), None);
        assert!(event_message(&PlayerEvent::IdleDisconnect)
            .unwrap()
            .contains("nobody"));
    }

    #[test]
    fn channel_is_remembered_per_guild() {
        let announcer = ChannelAnnouncer::new(Arc::new(Http::new("token")));
        announcer.set_channel(GuildId::new(1), ChannelId::new(10));
        announcer.set_channel(GuildId::new(1), ChannelId::new(11));

        assert_eq!(announcer.channel(GuildId::new(1)), Some(ChannelId::new(11)));
        assert_eq!(announcer.channel(GuildId::new(2)), None);
    }
}
