use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, SystemTime},
};
use tokio::{fs, sync::Semaphore};
use tracing::{debug, info, warn};

use super::{cache_key, file_stem, CacheSettings};
use crate::sources::{MediaItem, MediaKind, MediaResolver};

/// Metadata stored next to each cached audio file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    source_url: String,
    title: String,
    duration_secs: u64,
    fetched_at: DateTime<Utc>,
}

/// Disk cache in front of a [`MediaResolver`].
pub struct AudioCache {
    settings: CacheSettings,
    resolver: Arc<dyn MediaResolver>,
    permits: Arc<Semaphore>,
    in_flight: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl AudioCache {
    pub fn new(settings: CacheSettings, resolver: Arc<dyn MediaResolver>) -> Result<Self> {
        std::fs::create_dir_all(&settings.dir)
            .with_context(|| format!("could not create {}", settings.dir.display()))?;

        let permits = Arc::new(Semaphore::new(settings.download_concurrency.max(1)));
        info!(
            "📁 Audio cache at {} ({} concurrent downloads)",
            settings.dir.display(),
            settings.download_concurrency.max(1)
        );

        Ok(Self {
            settings,
            resolver,
            permits,
            in_flight: DashMap::new(),
        })
    }

    /// Returns a downloaded copy of `source_url`, fetching it on a miss.
    ///
    /// Concurrent calls for the same key wait for the first one and then read
    /// its result from disk.
    pub async fn resolve(&self, source_url: &str, kind: MediaKind) -> Result<MediaItem> {
        let stem = file_stem(&cache_key(source_url), kind);
        let slot = InFlight::enter(&self.in_flight, &stem);

        let _guard = slot.lock().await;
        self.resolve_locked(source_url, kind, &stem).await
    }

    async fn resolve_locked(&self, source_url: &str, kind: MediaKind, stem: &str) -> Result<MediaItem> {
        let audio_path = self.audio_path(stem);
        let meta_path = self.meta_path(stem);

        if let Some(item) = self.read_fresh(&audio_path, &meta_path, kind).await {
            debug!("💾 Cache hit for {}", source_url);
            return Ok(item);
        }

        let _permit = self.permits.acquire().await?;
        debug!("📥 Cache miss for {}, downloading", source_url);

        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&self.settings.dir)?;

        let downloaded = self
            .resolver
            .download(source_url, staging.path())
            .await
            .with_context(|| format!("download failed for {}", source_url))?;

        if fs::rename(&downloaded.path, &audio_path).await.is_err() {
            fs::copy(&downloaded.path, &audio_path)
                .await
                .with_context(|| format!("could not store {}", downloaded.path.display()))?;
        }

        let entry = CacheEntry {
            source_url: source_url.to_string(),
            title: downloaded.title.unwrap_or_else(|| source_url.to_string()),
            duration_secs: downloaded.duration_secs.unwrap_or(0),
            fetched_at: Utc::now(),
        };
        fs::write(&meta_path, serde_json::to_vec_pretty(&entry)?).await?;

        info!("💾 Cached \"{}\" as {}", entry.title, audio_path.display());

        Ok(item_from_entry(entry, audio_path, kind))
    }

    /// Age comes from the sidecar's `fetched_at`; the downloader may have
    /// stamped the audio file with the server's modification time.
    async fn read_fresh(&self, audio_path: &Path, meta_path: &Path, kind: MediaKind) -> Option<MediaItem> {
        if !fs::try_exists(audio_path).await.unwrap_or(false) {
            return None;
        }

        let entry = read_entry(meta_path).await?;
        let fetched_at = SystemTime::from(entry.fetched_at);
        if is_expired(fetched_at, SystemTime::now(), self.settings.ttl_for(kind)) {
            debug!("⌛ Cached file {} expired", audio_path.display());
            return None;
        }

        Some(item_from_entry(entry, audio_path.to_path_buf(), kind))
    }

    /// Removes entries older than their retention window.
    pub async fn sweep(&self) -> Result<usize> {
        self.sweep_at(SystemTime::now()).await
    }

    /// Same as [`sweep`](Self::sweep) with an explicit clock.
    pub async fn sweep_at(&self, now: SystemTime) -> Result<usize> {
        let mut removed = 0;
        let mut entries = fs::read_dir(&self.settings.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(stem) = name.strip_suffix(".mp3") else {
                continue;
            };
            if self.in_flight.contains_key(stem) {
                continue;
            }

            let kind = if stem.ends_with(".pl") {
                MediaKind::PlaylistEntry
            } else {
                MediaKind::Single
            };

            let fetched_at = match read_entry(&self.meta_path(stem)).await {
                Some(meta) => SystemTime::from(meta.fetched_at),
                // Orphaned audio file
                None => match entry.metadata().await.and_then(|m| m.modified()) {
                    Ok(modified) => modified,
                    Err(_) => continue,
                },
            };
            if !is_expired(fetched_at, now, self.settings.ttl_for(kind)) {
                continue;
            }

            match fs::remove_file(&path).await {
                Ok(()) => {
                    removed += 1;
                    let _ = fs::remove_file(self.meta_path(stem)).await;
                    debug!("🗑️ Evicted {}", path.display());
                }
                Err(e) => warn!("Could not evict {}: {}", path.display(), e),
            }
        }

        if removed > 0 {
            info!("🧹 Cache sweep removed {} expired file(s)", removed);
        }

        Ok(removed)
    }

    fn audio_path(&self, stem: &str) -> PathBuf {
        self.settings.dir.join(format!("{}.mp3", stem))
    }

    fn meta_path(&self, stem: &str) -> PathBuf {
        self.settings.dir.join(format!("{}.json", stem))
    }
}

/// Registration of one caller in `in_flight`; the map entry goes away with
/// the last caller, including callers whose task was aborted.
struct InFlight<'a> {
    map: &'a DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    stem: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl<'a> InFlight<'a> {
    fn enter(map: &'a DashMap<String, Arc<tokio::sync::Mutex<()>>>, stem: &str) -> Self {
        let lock = map.entry(stem.to_string()).or_default().clone();
        Self {
            map,
            stem: stem.to_string(),
            lock,
        }
    }

    async fn lock(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.lock.lock().await
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        // The map and this slot are the only holders left.
        self.map
            .remove_if(&self.stem, |_, lock| Arc::strong_count(lock) == 2);
    }
}

async fn read_entry(meta_path: &Path) -> Option<CacheEntry> {
    let raw = fs::read(meta_path).await.ok()?;
    match serde_json::from_slice::<CacheEntry>(&raw) {
        Ok(entry) => Some(entry),
        Err(e) => {
            warn!("Corrupt cache sidecar {}: {}", meta_path.display(), e);
            None
        }
    }
}

/// Strictly older than `ttl`; an entry aged exactly `ttl` is still fresh.
fn is_expired(fetched_at: SystemTime, now: SystemTime, ttl: Duration) -> bool {
    now.duration_since(fetched_at).unwrap_or_default() > ttl
}

fn item_from_entry(entry: CacheEntry, audio_path: PathBuf, kind: MediaKind) -> MediaItem {
    let mut item = MediaItem::new(entry.source_url, entry.title, entry.duration_secs).with_kind(kind);
    item.local_path = Some(audio_path);
    item
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{DownloadedMedia, MockMediaResolver, Resolved};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DAY: Duration = Duration::from_secs(24 * 3600);

    fn settings(dir: &Path) -> CacheSettings {
        CacheSettings {
            dir: dir.to_path_buf(),
            single_ttl: 3 * DAY,
            playlist_ttl: 10 * DAY,
            download_concurrency: 2,
        }
    }

    fn write_mp3(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"ID3").unwrap();
        path
    }

    fn fetched_at(audio_path: &Path) -> SystemTime {
        let raw = std::fs::read(audio_path.with_extension("json")).unwrap();
        let entry: CacheEntry = serde_json::from_slice(&raw).unwrap();
        SystemTime::from(entry.fetched_at)
    }

    fn resolver_expecting(times: usize) -> MockMediaResolver {
        let mut resolver = MockMediaResolver::new();
        resolver
            .expect_download()
            .times(times)
            .returning(|_url, dir| {
                Ok(DownloadedMedia {
                    path: write_mp3(dir, "abc.mp3"),
                    title: Some("Surah 1".to_string()),
                    duration_secs: Some(300),
                })
            });
        resolver
    }

    #[tokio::test]
    async fn second_resolve_hits_the_disk() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AudioCache::new(settings(dir.path()), Arc::new(resolver_expecting(1))).unwrap();
        let url = "https://www.youtube.com/watch?v=abc";

        let first = cache.resolve(url, MediaKind::Single).await.unwrap();
        let second = cache.resolve(url, MediaKind::Single).await.unwrap();

        assert_eq!(first.title, "Surah 1");
        assert_eq!(first.duration_secs, 300);
        assert_eq!(first.local_path, second.local_path);
        assert_eq!(second.title, "Surah 1");
        let path = first.local_path.unwrap();
        assert!(path.exists());
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            format!("{}.mp3", cache_key(url))
        );
    }

    #[tokio::test]
    async fn concurrent_resolves_share_one_download() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AudioCache::new(settings(dir.path()), Arc::new(resolver_expecting(1))).unwrap();
        let url = "https://www.youtube.com/watch?v=abc";

        let (a, b) = tokio::join!(
            cache.resolve(url, MediaKind::Single),
            cache.resolve(url, MediaKind::Single)
        );

        assert_eq!(a.unwrap().local_path, b.unwrap().local_path);
        assert!(cache.in_flight.is_empty());
    }

    #[tokio::test]
    async fn failed_download_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let mut resolver = MockMediaResolver::new();
        resolver
            .expect_download()
            .times(2)
            .returning(|_, _| Err(anyhow::anyhow!("video unavailable")));
        let cache = AudioCache::new(settings(dir.path()), Arc::new(resolver)).unwrap();

        for _ in 0..2 {
            let err = cache
                .resolve("https://www.youtube.com/watch?v=gone", MediaKind::Single)
                .await
                .unwrap_err();
            assert!(err.to_string().contains("download failed"));
        }

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn playlist_entries_use_their_own_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AudioCache::new(settings(dir.path()), Arc::new(resolver_expecting(2))).unwrap();
        let url = "https://www.youtube.com/watch?v=abc";

        let single = cache.resolve(url, MediaKind::Single).await.unwrap();
        let entry = cache.resolve(url, MediaKind::PlaylistEntry).await.unwrap();

        assert_ne!(single.local_path, entry.local_path);
        assert_eq!(entry.kind, MediaKind::PlaylistEntry);
        assert!(entry
            .local_path
            .unwrap()
            .to_str()
            .unwrap()
            .ends_with(".pl.mp3"));
    }

    #[tokio::test]
    async fn sweep_keeps_entries_at_exactly_the_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AudioCache::new(settings(dir.path()), Arc::new(resolver_expecting(1))).unwrap();

        let item = cache
            .resolve("https://www.youtube.com/watch?v=abc", MediaKind::Single)
            .await
            .unwrap();
        let path = item.local_path.unwrap();
        let fetched = fetched_at(&path);

        assert_eq!(cache.sweep_at(fetched + 3 * DAY).await.unwrap(), 0);
        assert!(path.exists());

        assert_eq!(
            cache
                .sweep_at(fetched + 3 * DAY + Duration::from_secs(1))
                .await
                .unwrap(),
            1
        );
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn playlist_entries_outlive_singles() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AudioCache::new(settings(dir.path()), Arc::new(resolver_expecting(2))).unwrap();

        let single = cache
            .resolve("https://example.test/a", MediaKind::Single)
            .await
            .unwrap()
            .local_path
            .unwrap();
        let entry = cache
            .resolve("https://example.test/b", MediaKind::PlaylistEntry)
            .await
            .unwrap()
            .local_path
            .unwrap();

        let now = fetched_at(&entry) + 5 * DAY;
        assert_eq!(cache.sweep_at(now).await.unwrap(), 1);
        assert!(!single.exists());
        assert!(entry.exists());
    }

    #[tokio::test]
    async fn expired_entry_is_downloaded_again() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(dir.path());
        s.single_ttl = Duration::ZERO;
        let cache = AudioCache::new(s, Arc::new(resolver_expecting(2))).unwrap();
        let url = "https://www.youtube.com/watch?v=abc";

        cache.resolve(url, MediaKind::Single).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        cache.resolve(url, MediaKind::Single).await.unwrap();
    }

    #[tokio::test]
    async fn old_file_timestamps_do_not_expire_fresh_downloads() {
        let dir = tempfile::tempdir().unwrap();
        let mut resolver = MockMediaResolver::new();
        resolver.expect_download().times(1).returning(|_url, dir| {
            let path = write_mp3(dir, "abc.mp3");
            // Upload date of the video, as `yt-dlp --mtime` would set it
            std::fs::File::options()
                .write(true)
                .open(&path)?
                .set_modified(SystemTime::now() - 30 * DAY)?;
            Ok(DownloadedMedia {
                path,
                title: Some("Old upload".to_string()),
                duration_secs: Some(60),
            })
        });
        let cache = AudioCache::new(settings(dir.path()), Arc::new(resolver)).unwrap();
        let url = "https://www.youtube.com/watch?v=old";

        let first = cache.resolve(url, MediaKind::Single).await.unwrap();
        let second = cache.resolve(url, MediaKind::Single).await.unwrap();
        assert_eq!(first.local_path, second.local_path);

        assert_eq!(cache.sweep().await.unwrap(), 0);
        assert!(first.local_path.unwrap().exists());
    }

    #[tokio::test]
    async fn orphaned_files_age_by_their_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AudioCache::new(settings(dir.path()), Arc::new(MockMediaResolver::new())).unwrap();
        let orphan = write_mp3(dir.path(), "orphan.mp3");
        let modified = std::fs::metadata(&orphan).unwrap().modified().unwrap();

        assert_eq!(cache.sweep_at(modified + DAY).await.unwrap(), 0);
        assert_eq!(cache.sweep_at(modified + 4 * DAY).await.unwrap(), 1);
        assert!(!orphan.exists());
    }

    /// Resolver that records how many downloads overlap.
    struct SlowResolver {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl MediaResolver for SlowResolver {
        async fn lookup(&self, query: &str) -> Result<Resolved> {
            Ok(Resolved::Single(MediaItem::new(query, query, 0)))
        }

        async fn download(&self, source_url: &str, dest_dir: &Path) -> Result<DownloadedMedia> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(DownloadedMedia {
                path: write_mp3(dest_dir, "x.mp3"),
                title: Some(source_url.to_string()),
                duration_secs: None,
            })
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn downloads_are_bounded_by_the_pool() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = Arc::new(SlowResolver {
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let cache = Arc::new(AudioCache::new(settings(dir.path()), resolver.clone()).unwrap());

        let tasks: Vec<_> = (0..6)
            .map(|i| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    cache
                        .resolve(&format!("https://example.test/{}", i), MediaKind::Single)
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let peak = resolver.peak.load(Ordering::SeqCst);
        assert!(peak >= 1 && peak <= 2, "peak concurrency was {}", peak);
        let cached = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().extension().is_some_and(|x| x == "mp3"))
            .count();
        assert_eq!(cached, 6);
    }
}
