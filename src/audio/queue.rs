use std::time::Duration;
use tracing::{debug, info};

use crate::{
    error::{PlayerError, PlayerResult},
    sources::MediaItem,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    /// Stop after the last item.
    #[default]
    Off,
    /// Replay the current item on natural completion.
    Track,
    /// Wrap to the first item after the last one.
    Queue,
}

impl LoopMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "off" => Some(Self::Off),
            "track" => Some(Self::Track),
            "queue" => Some(Self::Queue),
            _ => None,
        }
    }
}

/// Ordered playlist with a cursor on the item being played.
///
/// Items are retained after they play so `jump` and `restart` can go back.
#[derive(Debug)]
pub struct PlaybackQueue {
    items: Vec<MediaItem>,
    cursor: Option<usize>,
    loop_mode: LoopMode,
    // Set by jump/restart: the next advance must not repeat the cursor item.
    repositioned: bool,
    max_size: usize,
}

impl PlaybackQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: Vec::new(),
            cursor: None,
            loop_mode: LoopMode::Off,
            repositioned: false,
            max_size,
        }
    }

    /// Appends an item and returns its 1-based position.
    pub fn enqueue(&mut self, item: MediaItem) -> PlayerResult<usize> {
        if self.items.len() >= self.max_size {
            return Err(PlayerError::QueueFull(self.max_size));
        }

        info!("➕ Queued: {}", item.title);
        self.items.push(item);
        Ok(self.items.len())
    }

    /// Appends as many items as fit; returns how many were added.
    pub fn enqueue_all(&mut self, items: Vec<MediaItem>) -> PlayerResult<usize> {
        let space = self.max_size.saturating_sub(self.items.len());
        if space == 0 && !items.is_empty() {
            return Err(PlayerError::QueueFull(self.max_size));
        }

        let added = items.len().min(space);
        self.items.extend(items.into_iter().take(added));
        info!("➕ Queued {} item(s)", added);
        Ok(added)
    }

    /// Moves the cursor to the next item to play.
    ///
    /// `natural` is true when the previous item ended on its own; only then
    /// does [`LoopMode::Track`] repeat it.
    pub fn advance(&mut self, natural: bool) -> Option<usize> {
        let repositioned = std::mem::take(&mut self.repositioned);
        let len = self.items.len();
        if len == 0 {
            return None;
        }

        if let (LoopMode::Track, Some(current), true, false) =
            (self.loop_mode, self.cursor, natural, repositioned)
        {
            if current < len {
                debug!("🔂 Repeating item {}", current + 1);
                return Some(current);
            }
        }

        let next = self.cursor.map_or(0, |c| c + 1);
        if next < len {
            self.cursor = Some(next);
        } else if self.loop_mode == LoopMode::Queue {
            debug!("🔁 Wrapping to the start of the queue");
            self.cursor = Some(0);
        } else {
            debug!("📭 No item after position {}", len);
            return None;
        }

        self.cursor
    }

    /// Whether [`advance`](Self::advance) would yield an item.
    pub fn has_next(&self) -> bool {
        let len = self.items.len();
        len > 0 && (self.loop_mode == LoopMode::Queue || self.cursor.map_or(0, |c| c + 1) < len)
    }

    /// Positions the cursor so the next advance lands on `index` (1-based).
    pub fn jump(&mut self, index: i64) -> PlayerResult<()> {
        let len = self.items.len();
        if index < 1 || index as usize > len {
            return Err(PlayerError::InvalidIndex { index, len });
        }

        self.cursor = if index == 1 {
            None
        } else {
            Some(index as usize - 2)
        };
        self.repositioned = true;
        info!("🎯 Next item will be {}", index);
        Ok(())
    }

    /// Replays from the first item on the next advance.
    pub fn restart(&mut self) -> PlayerResult<()> {
        if self.items.is_empty() {
            return Err(PlayerError::InvalidIndex { index: 1, len: 0 });
        }
        self.cursor = None;
        self.repositioned = true;
        info!("⏮️ Queue will restart from the beginning");
        Ok(())
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.cursor = None;
        self.repositioned = false;
        info!("🗑️ Queue cleared");
    }

    /// Up to `count` `(index, item)` pairs after the cursor, for prefetching.
    pub fn upcoming(&self, count: usize) -> Vec<(usize, MediaItem)> {
        let len = self.items.len();
        let start = self.cursor.map_or(0, |c| c + 1);
        let wrap = self.loop_mode == LoopMode::Queue;

        (start..start + count.min(len))
            .filter_map(|i| {
                if i < len {
                    Some(i)
                } else if wrap {
                    Some(i % len)
                } else {
                    None
                }
            })
            .filter(|i| Some(*i) != self.cursor)
            .map(|i| (i, self.items[i].clone()))
            .collect()
    }

    /// Drops everything past `len`; used to roll back a failed enqueue.
    pub fn truncate(&mut self, len: usize) {
        self.items.truncate(len);
        if self.cursor.is_some_and(|c| c >= len) {
            self.cursor = len.checked_sub(1);
        }
    }

    pub fn get(&self, index: usize) -> Option<&MediaItem> {
        self.items.get(index)
    }

    /// Records the download result on the entry at `index`.
    pub fn mark_downloaded(&mut self, index: usize, resolved: &MediaItem) {
        if let Some(item) = self.items.get_mut(index) {
            if item.source_url == resolved.source_url {
                item.mark_downloaded(resolved);
            }
        }
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        self.loop_mode = mode;
        match mode {
            LoopMode::Off => info!("➡️ Loop disabled"),
            LoopMode::Track => info!("🔂 Looping current item"),
            LoopMode::Queue => info!("🔁 Looping whole queue"),
        }
    }

    /// Read-only view for display; `current` is the item actually playing.
    pub fn snapshot(&self, current: Option<usize>) -> QueueSnapshot {
        QueueSnapshot {
            items: self.items.clone(),
            current,
            loop_mode: self.loop_mode,
            total_duration: self.items.iter().filter_map(MediaItem::duration).sum(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub items: Vec<MediaItem>,
    pub current: Option<usize>,
    pub loop_mode: LoopMode,
    pub total_duration: Duration,
}

impl QueueSnapshot {
    pub fn current_item(&self) -> Option<&MediaItem> {
        self.current.and_then(|i| self.items.get(i))
    }

    /// Source URLs in queue order, as stored by favourites.
    pub fn source_urls(&self) -> Vec<String> {
        self.items.iter().map(|item| item.source_url.clone()).collect()
    }

    /// One page of the listing (pages are 1-based).
    pub fn get_page(&self, page: usize, items_per_page: usize) -> QueuePage {
        let items_per_page = items_per_page.max(1);
        let total_pages = self.items.len().div_ceil(items_per_page).max(1);
        let current_page = page.clamp(1, total_pages);
        let start = (current_page - 1) * items_per_page;
        let end = (start + items_per_page).min(self.items.len());

        QueuePage {
            entries: (start..end).map(|i| (i + 1, self.items[i].clone())).collect(),
            current_page,
            total_pages,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueuePage {
    /// `(1-based position, item)` pairs.
    pub entries: Vec<(usize, MediaItem)>,
    pub current_page: usize,
    pub total_pages: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn item(n: usize) -> MediaItem {
        MediaItem::new(format!("https://example.test/{}", n), format!("Item {}", n), 60)
    }

    fn queue_of(n: usize) -> PlaybackQueue {
        let mut q = PlaybackQueue::new(100);
        for i in 1..=n {
            q.enqueue(item(i)).unwrap();
        }
        q
    }

    fn titles(q: &PlaybackQueue) -> Vec<String> {
        q.snapshot(None).items.into_iter().map(|i| i.title).collect()
    }

    #[test]
    fn list_keeps_insertion_order() {
        let q = queue_of(5);
        assert_eq!(
            titles(&q),
            vec!["Item 1", "Item 2", "Item 3", "Item 4", "Item 5"]
        );
    }

    #[test]
    fn enqueue_returns_position() {
        let mut q = queue_of(2);
        assert_eq!(q.enqueue(item(3)).unwrap(), 3);
    }

    #[test]
    fn advance_walks_forward_and_stops_at_end() {
        let mut q = queue_of(2);
        assert_eq!(q.advance(true), Some(0));
        assert_eq!(q.advance(true), Some(1));
        assert!(!q.has_next());
        assert_eq!(q.advance(true), None);
        assert_eq!(q.cursor(), Some(1));
        assert_eq!(q.len(), 2);

        q.enqueue(item(3)).unwrap();
        assert!(q.has_next());
        assert_eq!(q.advance(true), Some(2));
    }

    #[test]
    fn jump_then_advance_lands_on_every_valid_index() {
        for n in 1..=5 {
            let mut q = queue_of(5);
            q.advance(true);
            q.jump(n).unwrap();
            assert_eq!(q.advance(false), Some(n as usize - 1), "jump to {}", n);
        }
    }

    #[test]
    fn invalid_jump_changes_nothing() {
        let mut q = queue_of(3);
        q.advance(true);
        q.advance(true);

        for bad in [0, -1, 4, 100] {
            assert_eq!(
                q.jump(bad),
                Err(PlayerError::InvalidIndex { index: bad, len: 3 })
            );
            assert_eq!(q.cursor(), Some(1));
            assert_eq!(q.len(), 3);
        }
        assert_eq!(q.advance(true), Some(2));
    }

    #[test]
    fn restart_replays_from_first() {
        let mut q = queue_of(3);
        q.advance(true);
        q.advance(true);
        q.restart().unwrap();
        assert_eq!(q.cursor(), None);
        assert_eq!(q.advance(true), Some(0));
    }

    #[test]
    fn restart_on_empty_queue_fails() {
        let mut q = PlaybackQueue::new(10);
        assert_eq!(
            q.restart(),
            Err(PlayerError::InvalidIndex { index: 1, len: 0 })
        );
    }

    #[test]
    fn clear_empties_everything() {
        let mut q = queue_of(3);
        q.advance(true);
        q.clear();
        assert!(q.is_empty());
        assert_eq!(q.cursor(), None);
        assert_eq!(q.advance(true), None);
    }

    #[test]
    fn track_loop_repeats_only_on_natural_end() {
        let mut q = queue_of(2);
        q.set_loop_mode(LoopMode::Track);
        assert_eq!(q.advance(true), Some(0));
        assert_eq!(q.advance(true), Some(0));
        assert_eq!(q.advance(false), Some(1));
    }

    #[test]
    fn track_loop_honours_jump() {
        let mut q = queue_of(3);
        q.set_loop_mode(LoopMode::Track);
        q.advance(true);
        q.jump(3).unwrap();
        assert_eq!(q.advance(true), Some(2));
    }

    #[test]
    fn queue_loop_wraps() {
        let mut q = queue_of(2);
        q.set_loop_mode(LoopMode::Queue);
        q.advance(true);
        q.advance(true);
        assert!(q.has_next());
        assert_eq!(q.advance(true), Some(0));
    }

    #[test]
    fn upcoming_lists_items_after_cursor() {
        let mut q = queue_of(4);
        q.advance(true);
        let next: Vec<_> = q.upcoming(2).into_iter().map(|(_, i)| i.title).collect();
        assert_eq!(next, vec!["Item 2", "Item 3"]);

        q.advance(true);
        q.advance(true);
        let next: Vec<_> = q.upcoming(2).into_iter().map(|(_, i)| i.title).collect();
        assert_eq!(next, vec!["Item 4"]);
    }

    #[test]
    fn upcoming_wraps_in_queue_loop() {
        let mut q = queue_of(3);
        q.set_loop_mode(LoopMode::Queue);
        q.advance(true);
        q.advance(true);
        q.advance(true);
        let next: Vec<_> = q.upcoming(2).into_iter().map(|(_, i)| i.title).collect();
        assert_eq!(next, vec!["Item 1", "Item 2"]);
    }

    #[test]
    fn truncate_rolls_back_enqueue() {
        let mut q = queue_of(2);
        q.advance(true);
        q.enqueue(item(3)).unwrap();
        q.truncate(2);
        assert_eq!(titles(&q), vec!["Item 1", "Item 2"]);
        assert_eq!(q.cursor(), Some(0));
    }

    #[test]
    fn full_queue_rejects_items() {
        let mut q = PlaybackQueue::new(2);
        q.enqueue(item(1)).unwrap();
        q.enqueue(item(2)).unwrap();
        assert_eq!(q.enqueue(item(3)), Err(PlayerError::QueueFull(2)));
    }

    #[test]
    fn enqueue_all_truncates_to_space() {
        let mut q = PlaybackQueue::new(3);
        q.enqueue(item(1)).unwrap();
        assert_eq!(q.enqueue_all(vec![item(2), item(3), item(4)]).unwrap(), 2);
        assert_eq!(q.len(), 3);
        assert_eq!(
            q.enqueue_all(vec![item(5)]),
            Err(PlayerError::QueueFull(3))
        );
    }

    #[test]
    fn mark_downloaded_checks_source() {
        let mut q = queue_of(2);
        let mut resolved = item(1);
        resolved.local_path = Some("/cache/1.mp3".into());

        q.mark_downloaded(1, &resolved);
        assert!(!q.get(1).unwrap().is_downloaded());

        q.mark_downloaded(0, &resolved);
        assert!(q.get(0).unwrap().is_downloaded());
    }

    #[test]
    fn pages_are_clamped() {
        let q = queue_of(25);
        let snapshot = q.snapshot(Some(0));
        assert_eq!(snapshot.total_duration, Duration::from_secs(25 * 60));

        let page = snapshot.get_page(3, 10);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.entries.len(), 5);
        assert_eq!(page.entries[0].0, 21);

        let page = snapshot.get_page(9, 10);
        assert_eq!(page.current_page, 3);

        let empty = PlaybackQueue::new(10).snapshot(None).get_page(1, 10);
        assert_eq!(empty.total_pages, 1);
        assert!(empty.entries.is_empty());
    }

    #[test]
    fn loop_mode_parsing() {
        assert_eq!(LoopMode::parse("Queue"), Some(LoopMode::Queue));
        assert_eq!(LoopMode::parse("track"), Some(LoopMode::Track));
        assert_eq!(LoopMode::parse("off"), Some(LoopMode::Off));
        assert_eq!(LoopMode::parse("forever"), None);
    }
}
