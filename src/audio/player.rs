use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        idle::IdleTimer,
        queue::{LoopMode, PlaybackQueue, QueueSnapshot},
        voice::{FinishNotifier, TrackControl, VoiceLink},
    },
    cache::AudioCache,
    error::{PlayerError, PlayerResult},
    sources::MediaItem,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Connecting,
    Playing,
    Paused,
}

/// Something worth telling the guild's text channel about.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    NowPlaying {
        item: MediaItem,
        position: usize,
        total: usize,
    },
    Skipped {
        title: String,
        reason: String,
    },
    QueueFinished,
    /// Every item in the queue failed in a row.
    Halted,
    IdleDisconnect,
}

/// Sink for [`PlayerEvent`]s.
#[async_trait]
pub trait Announcer: Send + Sync {
    async fn announce(&self, guild_id: GuildId, event: PlayerEvent);
}

#[derive(Debug, Clone)]
pub struct PlayerSettings {
    pub prefetch_depth: usize,
    pub idle_timeout: Duration,
    pub max_queue_size: usize,
}

/// Shared collaborators of every guild player.
#[derive(Clone)]
pub struct PlayerDeps {
    pub voice: Arc<dyn VoiceLink>,
    pub cache: Arc<AudioCache>,
    pub announcer: Arc<dyn Announcer>,
    pub settings: PlayerSettings,
}

/// Positions are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Playback started at `current`. That is the first added item unless
    /// the cursor was moved by a jump while idle.
    Started {
        position: usize,
        added: usize,
        current: usize,
    },
    /// Items were appended behind the current one.
    Queued { position: usize, added: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayOutcome {
    Started,
    Resumed,
    AlreadyPlaying,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseOutcome {
    Paused,
    AlreadyPaused,
}

impl PauseOutcome {
    pub fn user_message(&self) -> &'static str {
        match self {
            PauseOutcome::Paused => "⏸️ Paused",
            PauseOutcome::AlreadyPaused => "⏸️ Already paused",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    Resumed,
    AlreadyPlaying,
}

impl ResumeOutcome {
    pub fn user_message(&self) -> &'static str {
        match self {
            ResumeOutcome::Resumed => "▶️ Resumed",
            ResumeOutcome::AlreadyPlaying => "🎵 Already playing",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlayerStatus {
    pub state: PlayerState,
    pub queue: QueueSnapshot,
    pub idle_pending: bool,
}

type Reply<T> = oneshot::Sender<PlayerResult<T>>;

enum PlayerMessage {
    Enqueue {
        items: Vec<MediaItem>,
        channel_id: ChannelId,
        reply: Reply<EnqueueOutcome>,
    },
    Play {
        channel_id: ChannelId,
        reply: Reply<PlayOutcome>,
    },
    Pause(Reply<PauseOutcome>),
    Resume(Reply<ResumeOutcome>),
    Skip(Reply<String>),
    Stop(Reply<()>),
    Jump {
        index: i64,
        reply: Reply<bool>,
    },
    Restart(Reply<bool>),
    SetLoop {
        mode: LoopMode,
        reply: Reply<()>,
    },
    Snapshot(oneshot::Sender<PlayerStatus>),
    ListenersChanged(usize),
    VoiceLost,
    Loaded {
        generation: u64,
        index: usize,
        result: Result<MediaItem, String>,
    },
    Prefetched {
        index: usize,
        item: MediaItem,
    },
    TrackFinished {
        generation: u64,
        error: Option<String>,
    },
    IdleElapsed(u64),
}

/// Cheap, cloneable front of a guild's player task.
#[derive(Clone)]
pub struct PlayerHandle {
    guild_id: GuildId,
    tx: mpsc::UnboundedSender<PlayerMessage>,
}

impl PlayerHandle {
    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> PlayerMessage,
    ) -> PlayerResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .map_err(|_| PlayerError::PlayerUnavailable)?;
        rx.await.map_err(|_| PlayerError::PlayerUnavailable)
    }

    /// Appends items; starts playback in `channel_id` when idle.
    pub async fn enqueue(
        &self,
        items: Vec<MediaItem>,
        channel_id: ChannelId,
    ) -> PlayerResult<EnqueueOutcome> {
        self.request(|reply| PlayerMessage::Enqueue {
            items,
            channel_id,
            reply,
        })
        .await?
    }

    /// Resumes a paused session or starts the pending items.
    pub async fn play(&self, channel_id: ChannelId) -> PlayerResult<PlayOutcome> {
        self.request(|reply| PlayerMessage::Play { channel_id, reply })
            .await?
    }

    /// Pausing an already paused player is reported, not an error.
    pub async fn pause(&self) -> PlayerResult<PauseOutcome> {
        self.request(PlayerMessage::Pause).await?
    }

    pub async fn resume(&self) -> PlayerResult<ResumeOutcome> {
        self.request(PlayerMessage::Resume).await?
    }

    /// Skips the current item and returns its title.
    pub async fn skip(&self) -> PlayerResult<String> {
        self.request(PlayerMessage::Skip).await?
    }

    pub async fn stop(&self) -> PlayerResult<()> {
        self.request(PlayerMessage::Stop).await?
    }

    /// Returns true when the jump took effect immediately.
    pub async fn jump(&self, index: i64) -> PlayerResult<bool> {
        self.request(|reply| PlayerMessage::Jump { index, reply })
            .await?
    }

    pub async fn restart(&self) -> PlayerResult<bool> {
        self.request(PlayerMessage::Restart).await?
    }

    pub async fn set_loop(&self, mode: LoopMode) -> PlayerResult<()> {
        self.request(|reply| PlayerMessage::SetLoop { mode, reply })
            .await?
    }

    pub async fn status(&self) -> PlayerResult<PlayerStatus> {
        self.request(PlayerMessage::Snapshot).await
    }

    /// Reports the number of non-bot members sharing the bot's channel.
    pub fn listeners_changed(&self, count: usize) {
        let _ = self.tx.send(PlayerMessage::ListenersChanged(count));
    }

    /// The bot was disconnected from voice by someone else.
    pub fn voice_lost(&self) {
        let _ = self.tx.send(PlayerMessage::VoiceLost);
    }
}

/// A background download of upcoming items, keyed by queue index and URL.
struct Prefetch {
    targets: Vec<(usize, String)>,
    task: JoinHandle<()>,
}

/// Per-guild playback coordinator.
///
/// Owns the queue and the voice session of one guild and processes one
/// message at a time. Work that can take long (downloads) runs in spawned
/// tasks that report back through the same channel, tagged with the
/// generation they were started for.
pub struct GuildPlayer {
    guild_id: GuildId,
    deps: PlayerDeps,
    tx: mpsc::UnboundedSender<PlayerMessage>,
    state: PlayerState,
    queue: PlaybackQueue,
    now_playing: Option<usize>,
    track: Option<Box<dyn TrackControl>>,
    load: Option<JoinHandle<()>>,
    prefetch: Vec<Prefetch>,
    idle: IdleTimer,
    generation: u64,
    connected: bool,
    listeners: Option<usize>,
    failures: usize,
}

impl GuildPlayer {
    pub fn spawn(guild_id: GuildId, deps: PlayerDeps) -> PlayerHandle {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut player = GuildPlayer {
            guild_id,
            queue: PlaybackQueue::new(deps.settings.max_queue_size),
            idle: IdleTimer::new(deps.settings.idle_timeout),
            deps,
            tx: tx.clone(),
            state: PlayerState::Idle,
            now_playing: None,
            track: None,
            load: None,
            prefetch: Vec::new(),
            generation: 0,
            connected: false,
            listeners: None,
            failures: 0,
        };

        tokio::spawn(async move {
            debug!("🎛️ Player task started for guild {}", guild_id);
            while let Some(message) = rx.recv().await {
                player.handle(message).await;
            }
        });

        PlayerHandle { guild_id, tx }
    }

    async fn handle(&mut self, message: PlayerMessage) {
        match message {
            PlayerMessage::Enqueue {
                items,
                channel_id,
                reply,
            } => {
                let result = self.enqueue(items, channel_id).await;
                let _ = reply.send(result);
            }
            PlayerMessage::Play { channel_id, reply } => {
                let result = self.play(channel_id).await;
                let _ = reply.send(result);
            }
            PlayerMessage::Pause(reply) => {
                let _ = reply.send(self.pause());
            }
            PlayerMessage::Resume(reply) => {
                let _ = reply.send(self.resume());
            }
            PlayerMessage::Skip(reply) => {
                let result = self.skip().await;
                let _ = reply.send(result);
            }
            PlayerMessage::Stop(reply) => {
                self.stop().await;
                let _ = reply.send(Ok(()));
            }
            PlayerMessage::Jump { index, reply } => {
                let result = self.jump(index).await;
                let _ = reply.send(result);
            }
            PlayerMessage::Restart(reply) => {
                let result = self.restart().await;
                let _ = reply.send(result);
            }
            PlayerMessage::SetLoop { mode, reply } => {
                self.queue.set_loop_mode(mode);
                self.refresh_prefetch();
                let _ = reply.send(Ok(()));
            }
            PlayerMessage::Snapshot(reply) => {
                let _ = reply.send(self.status());
            }
            PlayerMessage::ListenersChanged(count) => self.listeners_changed(count),
            PlayerMessage::VoiceLost => {
                if self.connected {
                    info!("🔌 Disconnected from voice externally in guild {}", self.guild_id);
                    self.stop().await;
                }
            }
            PlayerMessage::Loaded {
                generation,
                index,
                result,
            } => self.loaded(generation, index, result).await,
            PlayerMessage::Prefetched { index, item } => {
                self.queue.mark_downloaded(index, &item);
            }
            PlayerMessage::TrackFinished { generation, error } => {
                self.track_finished(generation, error).await
            }
            PlayerMessage::IdleElapsed(token) => self.idle_elapsed(token).await,
        }
    }

    async fn enqueue(
        &mut self,
        items: Vec<MediaItem>,
        channel_id: ChannelId,
    ) -> PlayerResult<EnqueueOutcome> {
        if items.is_empty() {
            return Err(PlayerError::ResolutionFailed("nothing to play".to_string()));
        }

        let before = self.queue.len();
        let added = if items.len() == 1 {
            let mut items = items;
            self.queue.enqueue(items.remove(0))?;
            1
        } else {
            self.queue.enqueue_all(items)?
        };

        if self.state != PlayerState::Idle {
            self.refresh_prefetch();
            return Ok(EnqueueOutcome::Queued {
                position: before + 1,
                added,
            });
        }

        if let Err(e) = self.start(channel_id).await {
            self.queue.truncate(before);
            return Err(e);
        }
        Ok(EnqueueOutcome::Started {
            position: before + 1,
            added,
            current: self.now_playing.map_or(before + 1, |i| i + 1),
        })
    }

    async fn play(&mut self, channel_id: ChannelId) -> PlayerResult<PlayOutcome> {
        match self.state {
            PlayerState::Paused => {
                self.resume()?;
                Ok(PlayOutcome::Resumed)
            }
            PlayerState::Playing | PlayerState::Connecting => Ok(PlayOutcome::AlreadyPlaying),
            PlayerState::Idle => {
                if self.queue.is_empty() {
                    return Err(PlayerError::InvalidIndex { index: 1, len: 0 });
                }
                if !self.queue.has_next() {
                    self.queue.restart()?;
                }
                self.start(channel_id).await?;
                Ok(PlayOutcome::Started)
            }
        }
    }

    /// Idle → Connecting → Playing.
    async fn start(&mut self, channel_id: ChannelId) -> PlayerResult<()> {
        self.idle.cancel();
        self.state = PlayerState::Connecting;

        if !self.connected {
            info!("🔌 Connecting to voice in guild {}", self.guild_id);
            if let Err(e) = self.deps.voice.join(self.guild_id, channel_id).await {
                error!("❌ Voice connection failed in guild {}: {}", self.guild_id, e);
                self.state = PlayerState::Idle;
                return Err(e);
            }
            self.connected = true;
        }

        self.failures = 0;
        self.advance(false).await;
        Ok(())
    }

    fn pause(&mut self) -> PlayerResult<PauseOutcome> {
        match self.state {
            PlayerState::Paused => return Ok(PauseOutcome::AlreadyPaused),
            PlayerState::Playing => {}
            PlayerState::Idle | PlayerState::Connecting => return Err(PlayerError::NothingPlaying),
        }
        if let Some(track) = &self.track {
            track.pause();
        }
        self.state = PlayerState::Paused;
        info!("⏸️ Paused in guild {}", self.guild_id);
        Ok(PauseOutcome::Paused)
    }

    fn resume(&mut self) -> PlayerResult<ResumeOutcome> {
        match self.state {
            PlayerState::Playing => return Ok(ResumeOutcome::AlreadyPlaying),
            PlayerState::Paused => {}
            PlayerState::Idle | PlayerState::Connecting => return Err(PlayerError::NothingPlaying),
        }
        if let Some(track) = &self.track {
            track.resume();
        }
        self.state = PlayerState::Playing;
        info!("▶️ Resumed in guild {}", self.guild_id);
        Ok(ResumeOutcome::Resumed)
    }

    async fn skip(&mut self) -> PlayerResult<String> {
        if !matches!(self.state, PlayerState::Playing | PlayerState::Paused) {
            return Err(PlayerError::NothingPlaying);
        }

        let title = self
            .current_item()
            .map(|item| item.title.clone())
            .unwrap_or_default();
        info!("⏭️ Skipping \"{}\" in guild {}", title, self.guild_id);
        self.failures = 0;
        self.advance(false).await;
        Ok(title)
    }

    async fn jump(&mut self, index: i64) -> PlayerResult<bool> {
        self.queue.jump(index)?;
        if self.is_active() {
            self.failures = 0;
            self.advance(false).await;
            return Ok(true);
        }
        self.refresh_prefetch();
        Ok(false)
    }

    async fn restart(&mut self) -> PlayerResult<bool> {
        self.queue.restart()?;
        if self.is_active() {
            self.failures = 0;
            self.advance(false).await;
            return Ok(true);
        }
        self.refresh_prefetch();
        Ok(false)
    }

    /// Clears the queue and leaves voice.
    async fn stop(&mut self) {
        self.halt_current();
        for prefetch in self.prefetch.drain(..) {
            prefetch.task.abort();
        }
        self.queue.clear();
        self.go_idle().await;
        info!("⏹️ Stopped in guild {}", self.guild_id);
    }

    fn is_active(&self) -> bool {
        matches!(self.state, PlayerState::Playing | PlayerState::Paused)
    }

    fn current_item(&self) -> Option<&MediaItem> {
        self.now_playing.and_then(|i| self.queue.get(i))
    }

    /// Stops the current track and invalidates everything started for it.
    fn halt_current(&mut self) {
        self.generation += 1;
        if let Some(track) = self.track.take() {
            track.stop();
        }
        if let Some(load) = self.load.take() {
            load.abort();
        }
    }

    async fn go_idle(&mut self) {
        self.state = PlayerState::Idle;
        self.now_playing = None;
        self.idle.cancel();
        if self.connected {
            self.deps.voice.leave(self.guild_id).await;
            self.connected = false;
        }
    }

    /// Moves to the next item, or to Idle when there is none.
    async fn advance(&mut self, natural: bool) {
        self.halt_current();

        match self.queue.advance(natural) {
            Some(index) => self.begin(index),
            None => {
                info!("📭 Queue finished in guild {}", self.guild_id);
                self.go_idle().await;
                self.announce(PlayerEvent::QueueFinished);
            }
        }
    }

    /// Makes `index` the current item and starts loading it.
    fn begin(&mut self, index: usize) {
        let Some(item) = self.queue.get(index).cloned() else {
            return;
        };

        self.now_playing = Some(index);
        self.state = PlayerState::Playing;

        let generation = self.generation;
        let cache = self.deps.cache.clone();
        let tx = self.tx.clone();
        debug!("📥 Loading \"{}\" for guild {}", item.title, self.guild_id);

        self.load = Some(tokio::spawn(async move {
            let result = cache
                .resolve(&item.source_url, item.kind)
                .await
                .map_err(|e| format!("{:#}", e));
            let _ = tx.send(PlayerMessage::Loaded {
                generation,
                index,
                result,
            });
        }));

        self.refresh_prefetch();
    }

    async fn loaded(&mut self, generation: u64, index: usize, result: Result<MediaItem, String>) {
        if generation != self.generation {
            debug!("Ignoring stale load for guild {}", self.guild_id);
            return;
        }
        self.load = None;

        let resolved = match result {
            Ok(resolved) => resolved,
            Err(e) => return self.failed(PlayerError::ResolutionFailed(e)).await,
        };
        self.queue.mark_downloaded(index, &resolved);

        let Some(path) = resolved.local_path.clone() else {
            return self
                .failed(PlayerError::ResolutionFailed("no local file".to_string()))
                .await;
        };

        let tx = self.tx.clone();
        let notifier = FinishNotifier::new(move |error| {
            let _ = tx.send(PlayerMessage::TrackFinished { generation, error });
        });

        match self.deps.voice.play(self.guild_id, &path, notifier).await {
            Ok(track) => {
                if self.state == PlayerState::Paused {
                    track.pause();
                }
                self.track = Some(track);

                let item = self.queue.get(index).cloned().unwrap_or(resolved);
                info!("🎵 Now playing \"{}\" in guild {}", item.title, self.guild_id);
                self.announce(PlayerEvent::NowPlaying {
                    item,
                    position: index + 1,
                    total: self.queue.len(),
                });
            }
            Err(e) => self.failed(e).await,
        }
    }

    async fn track_finished(&mut self, generation: u64, error: Option<String>) {
        if generation != self.generation || self.track.is_none() {
            debug!("Ignoring stale track end for guild {}", self.guild_id);
            return;
        }
        self.track = None;

        match error {
            Some(e) => self.failed(PlayerError::PlaybackError(e)).await,
            None => {
                self.failures = 0;
                self.advance(true).await;
            }
        }
    }

    /// Skip-and-continue: log and announce once, then move on.
    async fn failed(&mut self, err: PlayerError) {
        let title = self
            .current_item()
            .map(|item| item.title.clone())
            .unwrap_or_default();
        warn!("⚠️ Skipping \"{}\" in guild {}: {}", title, self.guild_id, err);

        self.failures += 1;
        self.announce(PlayerEvent::Skipped {
            title,
            reason: err.user_message(),
        });

        if self.failures >= self.queue.len() {
            error!("❌ Every queued item failed in guild {}, stopping", self.guild_id);
            self.halt_current();
            self.go_idle().await;
            self.announce(PlayerEvent::Halted);
            return;
        }

        self.advance(false).await;
    }

    fn listeners_changed(&mut self, count: usize) {
        self.listeners = Some(count);

        if count > 0 {
            if self.idle.cancel() {
                info!("👥 Listener back in guild {}, staying", self.guild_id);
            }
            return;
        }

        if self.connected && !self.idle.is_armed() {
            info!(
                "🕐 Alone in voice in guild {}, leaving in {:?}",
                self.guild_id,
                self.idle.timeout()
            );
            let tx = self.tx.clone();
            self.idle.arm(move |token| {
                let _ = tx.send(PlayerMessage::IdleElapsed(token));
            });
        }
    }

    async fn idle_elapsed(&mut self, token: u64) {
        if !self.idle.is_current(token) || self.listeners.unwrap_or(0) > 0 || !self.connected {
            return;
        }

        info!("💤 Idle timeout in guild {}, disconnecting", self.guild_id);
        self.stop().await;
        self.announce(PlayerEvent::IdleDisconnect);
    }

    /// Downloads the next few items in the background.
    ///
    /// Running downloads that are still wanted are kept; only those whose
    /// items dropped out of the upcoming window are aborted. A download of
    /// the item that just became current is kept too, its load waits on it.
    fn refresh_prefetch(&mut self) {
        let wanted: Vec<_> = self
            .queue
            .upcoming(self.deps.settings.prefetch_depth)
            .into_iter()
            .filter(|(_, item)| !item.is_downloaded())
            .collect();
        let current = self
            .now_playing
            .zip(self.current_item().map(|item| item.source_url.clone()));

        let is_wanted = |(index, url): &(usize, String)| {
            current.as_ref().is_some_and(|(i, u)| i == index && u == url)
                || wanted
                    .iter()
                    .any(|(i, item)| i == index && item.source_url == *url)
        };
        self.prefetch.retain(|prefetch| {
            if prefetch.task.is_finished() {
                return false;
            }
            let keep = prefetch.targets.iter().all(is_wanted);
            if !keep {
                prefetch.task.abort();
            }
            keep
        });

        let running = &self.prefetch;
        let targets: Vec<_> = wanted
            .iter()
            .filter(|(index, item)| {
                !running
                    .iter()
                    .any(|p| p.targets.iter().any(|(i, url)| i == index && *url == item.source_url))
            })
            .cloned()
            .collect();
        if targets.is_empty() {
            return;
        }

        let cache = self.deps.cache.clone();
        let tx = self.tx.clone();
        let guild_id = self.guild_id;

        let keys = targets
            .iter()
            .map(|(index, item)| (*index, item.source_url.clone()))
            .collect();
        let task = tokio::spawn(async move {
            for (index, item) in targets {
                match cache.resolve(&item.source_url, item.kind).await {
                    Ok(item) => {
                        debug!("📦 Prefetched \"{}\" for guild {}", item.title, guild_id);
                        let _ = tx.send(PlayerMessage::Prefetched { index, item });
                    }
                    Err(e) => warn!("Prefetch failed for {}: {:#}", item.source_url, e),
                }
            }
        });
        self.prefetch.push(Prefetch { targets: keys, task });
    }

    fn status(&self) -> PlayerStatus {
        let current = if self.is_active() { self.now_playing } else { None };
        PlayerStatus {
            state: self.state,
            queue: self.queue.snapshot(current),
            idle_pending: self.idle.is_armed(),
        }
    }

    fn announce(&self, event: PlayerEvent) {
        let announcer = self.deps.announcer.clone();
        let guild_id = self.guild_id;
        tokio::spawn(async move {
            announcer.announce(guild_id, event).await;
        });
    }
}
