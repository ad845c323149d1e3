use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::{fs, sync::Mutex};
use tracing::{info, warn};

/// guild id → playlist name → ordered source URLs.
type Favorites = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// Named favourite playlists, persisted as one pretty-printed JSON file.
///
/// The whole file is read at startup and rewritten on every change.
pub struct FavoritesStore {
    path: PathBuf,
    data: Mutex<Favorites>,
}

impl FavoritesStore {
    pub async fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let data = match fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<Favorites>(&content) {
                Ok(data) => {
                    let count: usize = data.values().map(BTreeMap::len).sum();
                    info!("📂 Loaded {} favourite playlist(s) from {}", count, path.display());
                    data
                }
                Err(e) => {
                    warn!(
                        "Favourites file {} is empty or corrupt ({}), starting fresh",
                        path.display(),
                        e
                    );
                    Favorites::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Favorites::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("could not read {}", path.display()));
            }
        };

        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    /// Stores (or replaces) a playlist and flushes the file.
    pub async fn save(&self, guild_id: u64, name: &str, urls: Vec<String>) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            anyhow::bail!("playlist name must not be empty");
        }
        if urls.is_empty() {
            anyhow::bail!("cannot save an empty playlist");
        }

        let mut data = self.data.lock().await;
        data.entry(guild_id.to_string())
            .or_default()
            .insert(name.to_string(), urls);

        let content = serde_json::to_string_pretty(&*data)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("could not write {}", self.path.display()))?;

        info!("💾 Saved favourite \"{}\" for guild {}", name, guild_id);
        Ok(())
    }

    pub async fn list_names(&self, guild_id: u64) -> Vec<String> {
        self.data
            .lock()
            .await
            .get(&guild_id.to_string())
            .map(|playlists| playlists.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn get(&self, guild_id: u64, name: &str) -> Option<Vec<String>> {
        self.data
            .lock()
            .await
            .get(&guild_id.to_string())
            .and_then(|playlists| playlists.get(name.trim()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn urls(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn saved_playlists_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("favorite_playlists.json");

        let store = FavoritesStore::open(path.clone()).await.unwrap();
        store.save(1, "morning", urls(&["u1", "u2"])).await.unwrap();
        store.save(1, "evening", urls(&["u3"])).await.unwrap();
        store.save(2, "morning", urls(&["u4"])).await.unwrap();

        let reopened = FavoritesStore::open(path).await.unwrap();
        assert_eq!(reopened.list_names(1).await, vec!["evening", "morning"]);
        assert_eq!(reopened.get(1, "morning").await, Some(urls(&["u1", "u2"])));
        assert_eq!(reopened.get(2, "morning").await, Some(urls(&["u4"])));
        assert_eq!(reopened.get(3, "morning").await, None);
    }

    #[tokio::test]
    async fn file_is_pretty_json_keyed_by_guild() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("favorite_playlists.json");
        let store = FavoritesStore::open(path.clone()).await.unwrap();
        store.save(42, "mix", urls(&["a"])).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains('\n'));
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["42"]["mix"][0], "a");
    }

    #[tokio::test]
    async fn saving_same_name_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let store = FavoritesStore::open(dir.path().join("f.json")).await.unwrap();
        store.save(1, "mix", urls(&["a"])).await.unwrap();
        store.save(1, " mix ", urls(&["b", "c"])).await.unwrap();
        assert_eq!(store.get(1, "mix").await, Some(urls(&["b", "c"])));
        assert_eq!(store.list_names(1).await.len(), 1);
    }

    #[tokio::test]
    async fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("favorite_playlists.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = FavoritesStore::open(path).await.unwrap();
        assert!(store.list_names(1).await.is_empty());
    }

    #[tokio::test]
    async fn empty_name_or_playlist_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FavoritesStore::open(dir.path().join("f.json")).await.unwrap();
        assert!(store.save(1, "  ", urls(&["a"])).await.is_err());
        assert!(store.save(1, "mix", Vec::new()).await.is_err());
    }
}
