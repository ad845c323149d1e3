use dashmap::DashMap;
use serenity::model::id::GuildId;
use tracing::info;

use super::player::{GuildPlayer, PlayerDeps, PlayerHandle};

/// Lazily created player per guild.
pub struct PlayerRegistry {
    deps: PlayerDeps,
    players: DashMap<GuildId, PlayerHandle>,
}

impl PlayerRegistry {
    pub fn new(deps: PlayerDeps) -> Self {
        Self {
            deps,
            players: DashMap::new(),
        }
    }

    /// Returns the guild's player, spawning it on first use (or after its
    /// task went away).
    pub fn get_or_spawn(&self, guild_id: GuildId) -> PlayerHandle {
        let mut entry = self
            .players
            .entry(guild_id)
            .or_insert_with(|| Self::spawn(guild_id, &self.deps));

        if !entry.is_alive() {
            *entry = Self::spawn(guild_id, &self.deps);
        }
        entry.clone()
    }

    /// Existing player only; voice events for unknown guilds are ignored.
    pub fn get(&self, guild_id: GuildId) -> Option<PlayerHandle> {
        self.players
            .get(&guild_id)
            .map(|handle| handle.clone())
            .filter(PlayerHandle::is_alive)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    fn spawn(guild_id: GuildId, deps: &PlayerDeps) -> PlayerHandle {
        info!("🎛️ Creating player for guild {}", guild_id);
        GuildPlayer::spawn(guild_id, deps.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{
            player::{Announcer, PlayerEvent, PlayerSettings, PlayerState},
            voice::{FinishNotifier, TrackControl, VoiceLink},
        },
        cache::{AudioCache, CacheSettings},
        error::PlayerResult,
        sources::MockMediaResolver,
    };
    use async_trait::async_trait;
    use serenity::model::id::ChannelId;
    use std::{path::Path, sync::Arc, time::Duration};

    struct NoVoice;

    #[async_trait]
    impl VoiceLink for NoVoice {
        async fn join(&self, _: GuildId, _: ChannelId) -> PlayerResult<()> {
            Ok(())
        }
        async fn leave(&self, _: GuildId) {}
        async fn play(
            &self,
            _: GuildId,
            _: &Path,
            _: FinishNotifier,
        ) -> PlayerResult<Box<dyn TrackControl>> {
            Err(crate::error::PlayerError::PlaybackError("unused".to_string()))
        }
    }

    struct Silent;

    #[async_trait]
    impl Announcer for Silent {
        async fn announce(&self, _: GuildId, _: PlayerEvent) {}
    }

    fn registry(dir: &Path) -> PlayerRegistry {
        let cache = AudioCache::new(
            CacheSettings {
                dir: dir.to_path_buf(),
                single_ttl: Duration::from_secs(60),
                playlist_ttl: Duration::from_secs(60),
                download_concurrency: 1,
            },
            Arc::new(MockMediaResolver::new()),
        )
        .unwrap();

        PlayerRegistry::new(PlayerDeps {
            voice: Arc::new(NoVoice),
            cache: Arc::new(cache),
            announcer: Arc::new(Silent),
            settings: PlayerSettings {
                prefetch_depth: 2,
                idle_timeout: Duration::from_secs(60),
                max_queue_size: 10,
            },
        })
    }

    #[tokio::test]
    async fn players_are_created_once_per_guild() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        let a = GuildId::new(1);
        let b = GuildId::new(2);

        assert!(registry.get(a).is_none());
        registry.get_or_spawn(a);
        registry.get_or_spawn(a);
        registry.get_or_spawn(b);
        assert_eq!(registry.len(), 2);

        let status = registry.get(a).unwrap().status().await.unwrap();
        assert_eq!(status.state, PlayerState::Idle);
        assert_eq!(registry.get(b).unwrap().guild_id(), b);
    }
}
