//! # Audio Module
//!
//! Per-guild playback for Stream Bot.
//!
//! ## Architecture
//!
//! ### [`player`] - Guild Player
//! - One task per guild owning the queue and the voice session
//! - States: Idle, Connecting, Playing, Paused
//! - Loads the current item through the cache and prefetches the next ones
//! - Skips items that fail to load or play and announces them
//!
//! ### [`queue`] - Playback Queue
//! - Ordered playlist with a cursor; played items are kept
//! - `jump`/`restart` reposition the cursor, loop modes decide the wrap
//!
//! ### [`idle`] - Idle Timer
//! - Leaves voice after a configurable time alone in the channel
//!
//! ### [`voice`] - Voice Link
//! - Thin seam over songbird so the player can be driven without Discord
//!
//! ### [`registry`] - Player Registry
//! - Creates guild players lazily and hands out their handles
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let handle = registry.get_or_spawn(guild_id);
//! handle.enqueue(vec![item], voice_channel_id).await?;
//! handle.pause().await?;
//! handle.skip().await?;
//! ```

pub mod idle;
pub mod player;
pub mod queue;
pub mod registry;
pub mod voice;
