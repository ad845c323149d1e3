//! # Cache Module
//!
//! On-disk audio cache shared by every guild.
//!
//! Each downloaded item lives under a key derived from its source URL, so the
//! same link requested twice (by one guild or several) is extracted only once
//! while it stays fresh.
//!
//! ## Layout
//!
//! ```text
//! <cache_dir>/<sha256(url)>.mp3       single item
//! <cache_dir>/<sha256(url)>.json      its metadata sidecar
//! <cache_dir>/<sha256(url)>.pl.mp3    playlist entry (longer retention)
//! <cache_dir>/<sha256(url)>.pl.json
//! ```
//!
//! ## Configuration
//!
//! ```env
//! CACHE_DIR=downloads
//! CACHE_RETENTION_DAYS=3            # single items
//! PLAYLIST_CACHE_RETENTION_DAYS=10  # playlist entries
//! DOWNLOAD_CONCURRENCY=2            # simultaneous extractions, process-wide
//! ```

pub mod audio_cache;

use sha2::{Digest, Sha256};
use std::{path::PathBuf, time::Duration};

pub use audio_cache::AudioCache;

use crate::sources::MediaKind;

/// Settings for [`AudioCache`].
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub dir: PathBuf,
    pub single_ttl: Duration,
    pub playlist_ttl: Duration,
    pub download_concurrency: usize,
}

impl CacheSettings {
    pub fn ttl_for(&self, kind: MediaKind) -> Duration {
        match kind {
            MediaKind::Single => self.single_ttl,
            MediaKind::PlaylistEntry => self.playlist_ttl,
        }
    }
}

/// Deterministic content key for a source URL.
pub fn cache_key(source_url: &str) -> String {
    hex::encode(Sha256::digest(source_url.trim().as_bytes()))
}

/// File stem for a key: playlist entries carry a `.pl` marker.
pub(crate) fn file_stem(key: &str, kind: MediaKind) -> String {
    match kind {
        MediaKind::Single => key.to_string(),
        MediaKind::PlaylistEntry => format!("{}.pl", key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_stable_and_hex() {
        let a = cache_key("https://www.youtube.com/watch?v=abc");
        let b = cache_key(" https://www.youtube.com/watch?v=abc ");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, cache_key("https://www.youtube.com/watch?v=abd"));
    }

    #[test]
    fn playlist_entries_get_marker() {
        assert_eq!(file_stem("k", MediaKind::Single), "k");
        assert_eq!(file_stem("k", MediaKind::PlaylistEntry), "k.pl");
    }
}
