use anyhow::{Context, Result};
use async_process::Command;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{DownloadedMedia, MediaItem, MediaKind, Resolved};

/// Client for the external `yt-dlp` extractor.
pub struct YtDlpResolver {
    binary: String,
    cookies: Option<PathBuf>,
    max_playlist_size: usize,
}

/// Subset of `--dump-single-json` output we care about.
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    #[serde(rename = "_type")]
    kind: Option<String>,
    id: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    webpage_url: Option<String>,
    original_url: Option<String>,
    url: Option<String>,
    entries: Option<Vec<YtDlpInfo>>,
}

impl YtDlpInfo {
    /// Best page URL for an entry; flat playlist entries only carry `url`.
    fn page_url(&self) -> Option<String> {
        self.webpage_url
            .clone()
            .or_else(|| self.original_url.clone())
            .or_else(|| self.url.clone())
            .or_else(|| {
                self.id
                    .as_ref()
                    .map(|id| format!("https://www.youtube.com/watch?v={}", id))
            })
    }

    fn into_item(self, kind: MediaKind) -> Option<MediaItem> {
        let url = self.page_url()?;
        let title = self.title.clone().unwrap_or_else(|| "—".to_string());
        let duration = self.duration.map(|d| d.max(0.0) as u64).unwrap_or(0);
        Some(MediaItem::new(url, title, duration).with_kind(kind))
    }
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<String>, cookies: Option<PathBuf>, max_playlist_size: usize) -> Self {
        Self {
            binary: binary.into(),
            cookies,
            max_playlist_size,
        }
    }

    /// Checks that yt-dlp and ffmpeg can be executed.
    pub async fn verify_dependencies(&self) -> Result<()> {
        let ytdlp = Command::new(&self.binary)
            .arg("--version")
            .output()
            .await
            .with_context(|| format!("could not run {}", self.binary))?;
        if !ytdlp.status.success() {
            anyhow::bail!("yt-dlp is not available");
        }
        info!(
            "✅ yt-dlp version: {}",
            String::from_utf8_lossy(&ytdlp.stdout).trim()
        );

        let ffmpeg = Command::new("ffmpeg")
            .arg("-version")
            .output()
            .await
            .context("could not run ffmpeg")?;
        if !ffmpeg.status.success() {
            anyhow::bail!("ffmpeg is not available");
        }
        info!("✅ ffmpeg available");

        Ok(())
    }

    /// Cookie arguments, only when the configured file actually exists.
    fn cookie_args(&self) -> Vec<String> {
        match &self.cookies {
            Some(path) if path.exists() => {
                debug!("🍪 Using cookie file {}", path.display());
                vec!["--cookies".to_string(), path.display().to_string()]
            }
            Some(path) => {
                warn!("🍪 Cookie file {} not found, continuing without it", path.display());
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    pub async fn lookup(&self, query: &str) -> Result<Resolved> {
        let is_search = !super::is_url(query);
        let target = if is_search {
            format!("ytsearch1:{}", query.trim())
        } else {
            query.trim().to_string()
        };

        info!("🔍 Resolving with yt-dlp: {}", target);

        let output = Command::new(&self.binary)
            .args(["--dump-single-json", "--flat-playlist", "--no-warnings"])
            .args(self.cookie_args())
            .arg(&target)
            .kill_on_drop(true)
            .output()
            .await
            .context("failed to run yt-dlp")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp lookup failed: {}", error.trim());
        }

        let info: YtDlpInfo = serde_json::from_slice(&output.stdout)
            .context("could not parse yt-dlp output")?;

        resolved_from_info(info, is_search, self.max_playlist_size)
    }

    pub async fn download(&self, source_url: &str, dest_dir: &Path) -> Result<DownloadedMedia> {
        info!("⬇️ Downloading with yt-dlp: {}", source_url);

        let template = dest_dir.join("%(id)s.%(ext)s");
        let output = Command::new(&self.binary)
            .args([
                "--format",
                "bestaudio/best",
                "--extract-audio",
                "--audio-format",
                "mp3",
                "--audio-quality",
                "192K",
                "--no-playlist",
                "--no-mtime",
                "--geo-bypass",
                "--no-warnings",
                "--print",
                "after_move:%(filepath)s|%(duration)s|%(title)s",
                "--output",
            ])
            .arg(&template)
            .args(self.cookie_args())
            .arg(source_url)
            .kill_on_drop(true)
            .output()
            .await
            .context("failed to run yt-dlp")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp download failed: {}", error.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if let Some(media) = parse_print_line(&stdout) {
            if media.path.exists() {
                return Ok(media);
            }
        }

        // Older yt-dlp builds may not print after_move; fall back to the dir listing.
        let path = first_mp3_in(dest_dir)
            .await?
            .ok_or_else(|| anyhow::anyhow!("yt-dlp produced no mp3 for {}", source_url))?;
        Ok(DownloadedMedia {
            path,
            title: None,
            duration_secs: None,
        })
    }
}

fn resolved_from_info(info: YtDlpInfo, is_search: bool, max_playlist_size: usize) -> Result<Resolved> {
    let is_playlist = info.kind.as_deref() == Some("playlist") || info.entries.is_some();

    if !is_playlist {
        let item = info
            .into_item(MediaKind::Single)
            .ok_or_else(|| anyhow::anyhow!("yt-dlp returned an entry without URL"))?;
        return Ok(Resolved::Single(item));
    }

    let title = info.title.clone();
    let entries = info.entries.unwrap_or_default();

    if is_search {
        let item = entries
            .into_iter()
            .find_map(|entry| entry.into_item(MediaKind::Single))
            .ok_or_else(|| anyhow::anyhow!("no results found"))?;
        return Ok(Resolved::Single(item));
    }

    let items: Vec<MediaItem> = entries
        .into_iter()
        .filter_map(|entry| entry.into_item(MediaKind::PlaylistEntry))
        .take(max_playlist_size)
        .collect();

    if items.is_empty() {
        anyhow::bail!("playlist has no playable entries");
    }

    Ok(Resolved::Playlist { title, items })
}

/// Parses `filepath|duration|title` as printed by `--print after_move:...`.
fn parse_print_line(stdout: &str) -> Option<DownloadedMedia> {
    let line = stdout.lines().rev().find(|l| !l.trim().is_empty())?;
    let mut parts = line.trim().splitn(3, '|');
    let path = PathBuf::from(parts.next()?);
    let duration_secs = parts
        .next()
        .and_then(|d| d.parse::<f64>().ok())
        .map(|d| d.max(0.0) as u64);
    let title = parts
        .next()
        .filter(|t| !t.is_empty() && *t != "NA")
        .map(str::to_string);

    Some(DownloadedMedia {
        path,
        title,
        duration_secs,
    })
}

async fn first_mp3_in(dir: &Path) -> Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("mp3")) {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn info(json: &str) -> YtDlpInfo {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn single_video_resolves_to_single_item() {
        let parsed = info(
            r#"{"id":"abc","title":"Surah 1","duration":300.4,
                "webpage_url":"https://www.youtube.com/watch?v=abc"}"#,
        );
        let Resolved::Single(item) = resolved_from_info(parsed, false, 100).unwrap() else {
            panic!("expected a single item");
        };
        assert_eq!(item.title, "Surah 1");
        assert_eq!(item.duration_secs, 300);
        assert_eq!(item.source_url, "https://www.youtube.com/watch?v=abc");
        assert_eq!(item.kind, MediaKind::Single);
    }

    #[test]
    fn search_takes_first_entry() {
        let parsed = info(
            r#"{"_type":"playlist","title":"query","entries":[
                {"id":"one","title":"First","url":"https://www.youtube.com/watch?v=one"},
                {"id":"two","title":"Second","url":"https://www.youtube.com/watch?v=two"}]}"#,
        );
        let Resolved::Single(item) = resolved_from_info(parsed, true, 100).unwrap() else {
            panic!("expected a single item");
        };
        assert_eq!(item.title, "First");
    }

    #[test]
    fn playlist_entries_are_capped_and_tagged() {
        let parsed = info(
            r#"{"_type":"playlist","title":"Mix","entries":[
                {"id":"a","title":"A"},{"id":"b","title":"B"},{"id":"c","title":"C"}]}"#,
        );
        let Resolved::Playlist { title, items } = resolved_from_info(parsed, false, 2).unwrap()
        else {
            panic!("expected a playlist");
        };
        assert_eq!(title.as_deref(), Some("Mix"));
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].source_url, "https://www.youtube.com/watch?v=a");
        assert!(items.iter().all(|i| i.kind == MediaKind::PlaylistEntry));
    }

    #[test]
    fn empty_search_is_an_error() {
        let parsed = info(r#"{"_type":"playlist","entries":[]}"#);
        assert!(resolved_from_info(parsed, true, 100).is_err());
    }

    #[test]
    fn print_line_keeps_pipes_in_title() {
        let media = parse_print_line("/tmp/x/abc.mp3|300.0|Title | with pipe\n").unwrap();
        assert_eq!(media.path, PathBuf::from("/tmp/x/abc.mp3"));
        assert_eq!(media.duration_secs, Some(300));
        assert_eq!(media.title.as_deref(), Some("Title | with pipe"));
    }

    #[test]
    fn print_line_handles_missing_fields() {
        let media = parse_print_line("/tmp/x/abc.mp3|NA|NA").unwrap();
        assert_eq!(media.duration_secs, None);
        assert_eq!(media.title, None);
    }

    #[tokio::test]
    async fn finds_mp3_in_staging_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("abc.webm.part"), b"").unwrap();
        std::fs::write(dir.path().join("abc.mp3"), b"id3").unwrap();
        let found = first_mp3_in(dir.path()).await.unwrap();
        assert_eq!(found, Some(dir.path().join("abc.mp3")));
    }
}
