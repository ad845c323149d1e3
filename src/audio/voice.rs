use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::File,
    tracks::{PlayMode, TrackHandle},
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{path::Path, sync::Arc};
use tracing::{debug, info, warn};

use crate::error::{PlayerError, PlayerResult};

/// Callback fired once a track ends, with the error text when it failed.
#[derive(Clone)]
pub struct FinishNotifier(Arc<dyn Fn(Option<String>) + Send + Sync>);

impl FinishNotifier {
    pub fn new(notify: impl Fn(Option<String>) + Send + Sync + 'static) -> Self {
        Self(Arc::new(notify))
    }

    pub fn notify(&self, error: Option<String>) {
        (self.0)(error)
    }
}

/// Control over a track handed to the voice driver.
pub trait TrackControl: Send + Sync {
    fn pause(&self);
    fn resume(&self);
    fn stop(&self);
}

/// Voice connection and playback, one call per guild.
#[async_trait]
pub trait VoiceLink: Send + Sync {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> PlayerResult<()>;

    async fn leave(&self, guild_id: GuildId);

    /// Starts playing a local file, replacing whatever the call was playing.
    async fn play(
        &self,
        guild_id: GuildId,
        path: &Path,
        on_finish: FinishNotifier,
    ) -> PlayerResult<Box<dyn TrackControl>>;
}

/// [`VoiceLink`] backed by the songbird manager registered on the client.
pub struct SongbirdVoice {
    manager: Arc<Songbird>,
}

impl SongbirdVoice {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl VoiceLink for SongbirdVoice {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> PlayerResult<()> {
        match self.manager.join(guild_id, channel_id).await {
            Ok(_) => {
                info!("🔊 Joined voice channel {} in guild {}", channel_id, guild_id);
                Ok(())
            }
            Err(e) => Err(PlayerError::VoiceConnectFailed(e.to_string())),
        }
    }

    async fn leave(&self, guild_id: GuildId) {
        match self.manager.remove(guild_id).await {
            Ok(()) => info!("👋 Left voice in guild {}", guild_id),
            Err(e) => debug!("No voice call to leave in guild {}: {}", guild_id, e),
        }
    }

    async fn play(
        &self,
        guild_id: GuildId,
        path: &Path,
        on_finish: FinishNotifier,
    ) -> PlayerResult<Box<dyn TrackControl>> {
        let call = self
            .manager
            .get(guild_id)
            .ok_or_else(|| PlayerError::PlaybackError("not connected to voice".to_string()))?;

        let input = File::new(path.to_path_buf());
        let handle = {
            let mut call = call.lock().await;
            call.stop();
            call.play_input(input.into())
        };

        for event in [TrackEvent::End, TrackEvent::Error] {
            handle
                .add_event(
                    Event::Track(event),
                    TrackFinishHandler {
                        notifier: on_finish.clone(),
                    },
                )
                .map_err(|e| PlayerError::PlaybackError(e.to_string()))?;
        }

        debug!("▶️ Playing {} in guild {}", path.display(), guild_id);
        Ok(Box::new(SongbirdTrack(handle)))
    }
}

struct SongbirdTrack(TrackHandle);

impl TrackControl for SongbirdTrack {
    fn pause(&self) {
        if let Err(e) = self.0.pause() {
            warn!("Could not pause track: {}", e);
        }
    }

    fn resume(&self) {
        if let Err(e) = self.0.play() {
            warn!("Could not resume track: {}", e);
        }
    }

    fn stop(&self) {
        let _ = self.0.stop();
    }
}

/// Forwards songbird's End/Error track events to the player.
struct TrackFinishHandler {
    notifier: FinishNotifier,
}

#[async_trait]
impl VoiceEventHandler for TrackFinishHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let error = match ctx {
            EventContext::Track(tracks) => tracks.iter().find_map(|(state, _)| match &state.playing {
                PlayMode::Errored(e) => Some(format!("{:?}", e)),
                _ => None,
            }),
            _ => None,
        };

        if let Some(e) = &error {
            warn!("Track errored: {}", e);
        }
        self.notifier.notify(error);

        None
    }
}
