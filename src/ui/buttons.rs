use anyhow::Result;
use serenity::{
    all::{ButtonStyle, ComponentInteraction, Context},
    builder::{
        CreateActionRow, CreateButton, CreateInteractionResponse,
        CreateInteractionResponseMessage,
    },
};
use tracing::debug;

use crate::{audio::player::PlayerState, bot::StreamBot, ui::embeds};

/// Custom ids of the player buttons
pub mod button_ids {
    pub const PLAY_PAUSE: &str = "stream_play_pause";
    pub const SKIP: &str = "stream_skip";
    pub const STOP: &str = "stream_stop";
    pub const QUEUE: &str = "stream_queue";
}

/// Control row attached to the now-playing message
pub fn create_player_buttons(paused: bool) -> Vec<CreateActionRow> {
    let play_pause = CreateButton::new(button_ids::PLAY_PAUSE)
        .emoji(if paused { '▶' } else { '⏸' })
        .style(ButtonStyle::Primary);

    let skip = CreateButton::new(button_ids::SKIP)
        .emoji('⏭')
        .style(ButtonStyle::Secondary);

    let stop = CreateButton::new(button_ids::STOP)
        .emoji('⏹')
        .style(ButtonStyle::Danger);

    let queue = CreateButton::new(button_ids::QUEUE)
        .label("Queue")
        .emoji('📋')
        .style(ButtonStyle::Secondary);

    vec![CreateActionRow::Buttons(vec![play_pause, skip, stop, queue])]
}

/// Handles a click on one of the player buttons
pub async fn handle_player_component(
    ctx: &Context,
    interaction: &ComponentInteraction,
    bot: &StreamBot,
) -> Result<()> {
    let guild_id = interaction
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("No guild ID"))?;

    let Some(player) = bot.players.get(guild_id) else {
        return respond(ctx, interaction, "📭 Nothing is playing right now.").await;
    };

    let message = match interaction.data.custom_id.as_str() {
        button_ids::PLAY_PAUSE => {
            let status = player.status().await?;
            let result = if status.state == PlayerState::Paused {
                player.resume().await.map(|o| o.user_message().to_string())
            } else {
                player.pause().await.map(|o| o.user_message().to_string())
            };

            if let Ok(text) = &result {
                let status = player.status().await?;
                if let Some(item) = status.queue.current_item() {
                    let paused = status.state == PlayerState::Paused;
                    let position = status.queue.current.map_or(0, |i| i + 1);
                    interaction
                        .create_response(
                            &ctx.http,
                            CreateInteractionResponse::UpdateMessage(
                                CreateInteractionResponseMessage::new()
                                    .embed(embeds::create_now_playing_embed(
                                        item,
                                        position,
                                        status.queue.items.len(),
                                        Some(status.queue.loop_mode),
                                        paused,
                                    ))
                                    .components(create_player_buttons(paused)),
                            ),
                        )
                        .await?;
                    debug!("{} via button in guild {}", text, guild_id);
                    return Ok(());
                }
            }
            result.unwrap_or_else(|e| e.user_message())
        }
        button_ids::SKIP => match player.skip().await {
            Ok(title) => format!("⏭️ Skipped **{}**", title),
            Err(e) => e.user_message(),
        },
        button_ids::STOP => match player.stop().await {
            Ok(()) => "⏹️ Stopped and cleared the queue".to_string(),
            Err(e) => e.user_message(),
        },
        button_ids::QUEUE => {
            let status = player.status().await?;
            let page = status.queue.current.map_or(1, |i| i / 10 + 1);
            interaction
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .embed(embeds::create_queue_embed(&status.queue, page))
                            .ephemeral(true),
                    ),
                )
                .await?;
            return Ok(());
        }
        other => {
            debug!("Unhandled component: {}", other);
            "⚠️ Unknown control".to_string()
        }
    };

    respond(ctx, interaction, &message).await
}

async fn respond(ctx: &Context, interaction: &ComponentInteraction, content: &str) -> Result<()> {
    interaction
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn play_pause_button_reflects_state() {
        let playing = serde_json::to_value(&create_player_buttons(false)).unwrap();
        let paused = serde_json::to_value(&create_player_buttons(true)).unwrap();

        let ids: Vec<_> = playing[0]["components"]
            .as_array()
            .unwrap()
            .iter()
            .map(|b| b["custom_id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            ids,
            vec![
                button_ids::PLAY_PAUSE,
                button_ids::SKIP,
                button_ids::STOP,
                button_ids::QUEUE
            ]
        );
        assert_ne!(
            playing[0]["components"][0]["emoji"],
            paused[0]["components"][0]["emoji"]
        );
    }
}
