//! # Sources Module
//!
//! Turns a URL or free-text query into playable media.
//!
//! - [`ytdlp`] drives the external `yt-dlp` binary (pages, searches, playlists)
//! - [`direct_url`] fetches plain `.mp3` links over HTTP without yt-dlp
//!
//! [`SourceManager`] routes between the two and is the production
//! [`MediaResolver`]; the cache and the command surface only ever see the trait.

pub mod direct_url;
pub mod ytdlp;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
    time::Duration,
};
use tracing::debug;

pub use direct_url::DirectUrlClient;
pub use ytdlp::YtDlpResolver;

static URL_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)^https?://\S+$").ok());

/// Returns true when the input looks like an http(s) URL rather than a search.
pub fn is_url(input: &str) -> bool {
    URL_RE
        .as_ref()
        .is_some_and(|re| re.is_match(input.trim()))
}

/// Whether an item came in on its own or as part of a playlist.
///
/// Playlist entries are kept longer in the on-disk cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Single,
    PlaylistEntry,
}

/// One playable entry of a guild queue.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaItem {
    pub source_url: String,
    pub title: String,
    pub local_path: Option<PathBuf>,
    pub duration_secs: u64,
    pub kind: MediaKind,
    pub added_at: DateTime<Utc>,
}

impl MediaItem {
    pub fn new(source_url: impl Into<String>, title: impl Into<String>, duration_secs: u64) -> Self {
        Self {
            source_url: source_url.into(),
            title: title.into(),
            local_path: None,
            duration_secs,
            kind: MediaKind::Single,
            added_at: Utc::now(),
        }
    }

    /// Placeholder for a URL whose metadata is only known after download
    /// (favourite playlists store bare URLs).
    pub fn unresolved(source_url: impl Into<String>) -> Self {
        let source_url = source_url.into();
        Self::new(source_url.clone(), source_url, 0)
    }

    pub fn with_kind(mut self, kind: MediaKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn is_downloaded(&self) -> bool {
        self.local_path.is_some()
    }

    pub fn duration(&self) -> Option<Duration> {
        (self.duration_secs > 0).then(|| Duration::from_secs(self.duration_secs))
    }

    /// Fills in the download result. Only the first call has an effect.
    pub fn mark_downloaded(&mut self, resolved: &MediaItem) {
        if self.local_path.is_some() {
            return;
        }
        self.local_path = resolved.local_path.clone();
        self.title = resolved.title.clone();
        if resolved.duration_secs > 0 {
            self.duration_secs = resolved.duration_secs;
        }
    }
}

/// Result of looking up a URL or query.
#[derive(Debug, Clone)]
pub enum Resolved {
    Single(MediaItem),
    Playlist {
        title: Option<String>,
        items: Vec<MediaItem>,
    },
}

impl Resolved {
    pub fn into_items(self) -> Vec<MediaItem> {
        match self {
            Resolved::Single(item) => vec![item],
            Resolved::Playlist { items, .. } => items,
        }
    }
}

/// A file produced by [`MediaResolver::download`].
#[derive(Debug, Clone, Default)]
pub struct DownloadedMedia {
    pub path: PathBuf,
    pub title: Option<String>,
    pub duration_secs: Option<u64>,
}

/// External extraction backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Resolves a URL or search query into metadata, without downloading.
    async fn lookup(&self, query: &str) -> Result<Resolved>;

    /// Downloads and transcodes `source_url` into a file under `dest_dir`.
    async fn download(&self, source_url: &str, dest_dir: &Path) -> Result<DownloadedMedia>;
}

/// Production resolver: direct mp3 links over HTTP, everything else through yt-dlp.
pub struct SourceManager {
    ytdlp: YtDlpResolver,
    direct_url: DirectUrlClient,
}

impl SourceManager {
    pub fn new(ytdlp: YtDlpResolver, direct_url: DirectUrlClient) -> Self {
        Self { ytdlp, direct_url }
    }

    pub async fn verify_dependencies(&self) -> Result<()> {
        self.ytdlp.verify_dependencies().await
    }
}

#[async_trait]
impl MediaResolver for SourceManager {
    async fn lookup(&self, query: &str) -> Result<Resolved> {
        if self.direct_url.is_valid_url(query) {
            debug!("🔗 Direct audio link: {}", query);
            return self.direct_url.lookup(query).await;
        }
        self.ytdlp.lookup(query).await
    }

    async fn download(&self, source_url: &str, dest_dir: &Path) -> Result<DownloadedMedia> {
        if self.direct_url.is_valid_url(source_url) {
            return self.direct_url.download(source_url, dest_dir).await;
        }
        self.ytdlp.download(source_url, dest_dir).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_detection() {
        assert!(is_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(is_url("HTTP://example.com/a.mp3"));
        assert!(is_url("  https://example.com  "));
        assert!(!is_url("surah al fatiha"));
        assert!(!is_url("ftp://example.com/file"));
        assert!(!is_url("https://example.com/with space"));
    }

    #[test]
    fn mark_downloaded_only_applies_once() {
        let mut item = MediaItem::unresolved("https://example.com/a");
        let mut first = MediaItem::new("https://example.com/a", "Surah 1", 300);
        first.local_path = Some(PathBuf::from("/tmp/first.mp3"));
        let mut second = MediaItem::new("https://example.com/a", "Other", 10);
        second.local_path = Some(PathBuf::from("/tmp/second.mp3"));

        item.mark_downloaded(&first);
        item.mark_downloaded(&second);

        assert_eq!(item.title, "Surah 1");
        assert_eq!(item.duration_secs, 300);
        assert_eq!(item.local_path, Some(PathBuf::from("/tmp/first.mp3")));
    }

    #[test]
    fn unknown_duration_is_none() {
        assert_eq!(MediaItem::unresolved("https://x.test/a").duration(), None);
        assert_eq!(
            MediaItem::new("u", "t", 61).duration(),
            Some(Duration::from_secs(61))
        );
    }
}
