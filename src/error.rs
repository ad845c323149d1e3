use thiserror::Error;

/// Errors surfaced by the playback coordinator and its collaborators.
///
/// Every variant maps to a short, human-readable reply through
/// [`PlayerError::user_message`]; the command surface is the only place that
/// turns them into Discord responses.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlayerError {
    /// The requesting user is not connected to any voice channel.
    #[error("user is not in a voice channel")]
    NotInVoiceChannel,

    /// A URL or search query could not be turned into playable media.
    #[error("could not resolve media: {0}")]
    ResolutionFailed(String),

    /// Joining the voice channel failed.
    #[error("voice connection failed: {0}")]
    VoiceConnectFailed(String),

    /// `jump`/`restart` target outside the queue (1-based `index`).
    #[error("index {index} is out of range for a queue of {len} item(s)")]
    InvalidIndex { index: i64, len: usize },

    /// The voice driver rejected or aborted a track.
    #[error("playback error: {0}")]
    PlaybackError(String),

    /// The queue already holds the configured maximum number of items.
    #[error("queue is full (max {0} items)")]
    QueueFull(usize),

    /// Pause/resume/skip with nothing in the matching state.
    #[error("nothing is playing")]
    NothingPlaying,

    /// The per-guild player task is gone (shutdown or panic).
    #[error("player for this guild is not available")]
    PlayerUnavailable,
}

impl PlayerError {
    /// Short message suitable for an ephemeral reply.
    pub fn user_message(&self) -> String {
        match self {
            Self::NotInVoiceChannel => "🚫 You must be in a voice channel.".to_string(),
            Self::ResolutionFailed(_) => {
                "❌ Could not load that link or query. Check the URL and try again.".to_string()
            }
            Self::VoiceConnectFailed(_) => "❌ Could not join your voice channel.".to_string(),
            Self::InvalidIndex { len, .. } if *len == 0 => "📭 The queue is empty.".to_string(),
            Self::InvalidIndex { len, .. } => {
                format!("❌ Pick a position between 1 and {}.", len)
            }
            Self::PlaybackError(_) => "❌ Playback failed, moving on.".to_string(),
            Self::QueueFull(max) => format!("❌ The queue is full (max {} items).", max),
            Self::NothingPlaying => "📭 Nothing is playing right now.".to_string(),
            Self::PlayerUnavailable => "❌ The player is restarting, try again.".to_string(),
        }
    }
}

pub type PlayerResult<T> = std::result::Result<T, PlayerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_index_message_mentions_range() {
        let err = PlayerError::InvalidIndex { index: 7, len: 3 };
        assert_eq!(err.user_message(), "❌ Pick a position between 1 and 3.");
        assert_eq!(
            err.to_string(),
            "index 7 is out of range for a queue of 3 item(s)"
        );
    }

    #[test]
    fn empty_queue_has_its_own_message() {
        let err = PlayerError::InvalidIndex { index: 1, len: 0 };
        assert_eq!(err.user_message(), "📭 The queue is empty.");
    }
}
