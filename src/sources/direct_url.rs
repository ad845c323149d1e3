use anyhow::{Context, Result};
use futures::StreamExt;
use std::{path::Path, time::Duration};
use tokio::io::AsyncWriteExt;
use tracing::info;
use url::Url;

use super::{DownloadedMedia, MediaItem, Resolved};

/// Plain HTTP client for direct `.mp3` links.
pub struct DirectUrlClient {
    http: reqwest::Client,
}

impl DirectUrlClient {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .connect_timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self { http })
    }

    pub fn is_valid_url(&self, url: &str) -> bool {
        is_direct_audio(url)
    }

    pub async fn lookup(&self, url: &str) -> Result<Resolved> {
        let title = file_name(url).unwrap_or_else(|| url.to_string());
        Ok(Resolved::Single(MediaItem::new(url.trim(), title, 0)))
    }

    pub async fn download(&self, url: &str, dest_dir: &Path) -> Result<DownloadedMedia> {
        let name = file_name(url).unwrap_or_else(|| "file.mp3".to_string());
        let path = dest_dir.join(&name);

        info!("⬇️ Direct download: {}", url);

        let response = self
            .http
            .get(url.trim())
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?
            .error_for_status()?;

        let mut file = tokio::fs::File::create(&path).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;

        info!("✅ Saved {}", path.display());

        Ok(DownloadedMedia {
            path,
            title: Some(name),
            duration_secs: None,
        })
    }
}

/// True for http(s) URLs whose path ends in `.mp3`.
pub fn is_direct_audio(url: &str) -> bool {
    Url::parse(url.trim())
        .map(|parsed| {
            matches!(parsed.scheme(), "http" | "https")
                && parsed.path().to_ascii_lowercase().ends_with(".mp3")
        })
        .unwrap_or(false)
}

/// Last path segment, without the query string.
fn file_name(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    parsed
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::to_string)
}
