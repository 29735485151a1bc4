use std::sync::Arc;

use chrono::Utc;
use futures::stream::BoxStream;

use crate::config::Config;
use crate::db::{BookmarkRepository, DatabaseHolder};
use crate::error::Result;
use crate::models::{Bookmark, BookmarkFilter};
use crate::notify::{BroadcastHub, UpdateNotifier};

/// State of one bookmark list view (popup or manager) in one context.
pub struct App {
    // Data
    pub bookmarks: Vec<Bookmark>,

    // UI State
    pub selected_index: usize,
    pub filter: BookmarkFilter,

    // Services
    pub repository: BookmarkRepository,
}

impl App {
    pub async fn new(config: &Config, hub: &BroadcastHub) -> Result<Self> {
        let holder = Arc::new(DatabaseHolder::for_bookmarks(config.database())?);
        let notifier = UpdateNotifier::with_channel(hub, &config.update_channel);
        Self::with_repository(BookmarkRepository::new(holder, notifier)).await
    }

    pub async fn with_repository(repository: BookmarkRepository) -> Result<Self> {
        let mut app = Self {
            bookmarks: Vec::new(),
            selected_index: 0,
            filter: BookmarkFilter::default(),
            repository,
        };
        app.reload().await?;
        Ok(app)
    }

    /// Urls changed by this or any other context from now on.
    pub fn updates(&self) -> BoxStream<'static, String> {
        self.repository.notifier().subscribe()
    }

    pub fn selected_bookmark(&self) -> Option<&Bookmark> {
        self.bookmarks.get(self.selected_index)
    }

    pub async fn cycle_filter(&mut self) -> Result<()> {
        self.filter = self.filter.cycle();
        self.selected_index = 0;
        self.reload().await
    }

    /// Saves an edited bookmark. The first save stamps its creation date.
    pub async fn save(&mut self, mut bookmark: Bookmark) -> Result<()> {
        bookmark.mark_created(Utc::now().naive_utc());
        self.repository.save_bookmark(&bookmark).await?;
        self.apply_update(&bookmark.url).await
    }

    pub async fn toggle_favorite(&mut self) -> Result<()> {
        let Some(bookmark) = self.selected_bookmark() else {
            return Ok(());
        };
        let mut bookmark = bookmark.clone();
        bookmark.favorite = !bookmark.favorite;
        self.repository.save_bookmark(&bookmark).await?;
        self.reload().await
    }

    /// Adds comma-separated tags to the selected bookmark.
    pub async fn add_tags(&mut self, input: &str) -> Result<()> {
        let tags = parse_tags(input);
        if tags.is_empty() {
            return Ok(());
        }
        let Some(bookmark) = self.selected_bookmark() else {
            return Ok(());
        };
        let mut bookmark = bookmark.clone();
        bookmark.tags.extend(tags);
        self.repository.save_bookmark(&bookmark).await?;
        self.reload().await
    }

    pub async fn delete_selected(&mut self) -> Result<()> {
        let Some(bookmark) = self.selected_bookmark() else {
            return Ok(());
        };
        let url = bookmark.url.clone();
        self.repository.delete_bookmark(&url).await?;
        self.bookmarks.retain(|b| b.url != url);
        self.clamp_selection();
        Ok(())
    }

    /// Refreshes the entry for `url` after a change notification.
    pub async fn apply_update(&mut self, url: &str) -> Result<()> {
        let current = self
            .repository
            .load_bookmark(url)
            .await?
            .filter(|b| self.filter.matches(b));
        let position = self.bookmarks.iter().position(|b| b.url == url);

        match (current, position) {
            (Some(bookmark), Some(pos)) => self.bookmarks[pos] = bookmark,
            (Some(bookmark), None) => {
                let pos = self
                    .bookmarks
                    .partition_point(|b| b.url.as_str() < bookmark.url.as_str());
                self.bookmarks.insert(pos, bookmark);
            }
            (None, Some(pos)) => {
                self.bookmarks.remove(pos);
            }
            (None, None) => {}
        }
        self.clamp_selection();
        Ok(())
    }

    pub async fn reload(&mut self) -> Result<()> {
        self.bookmarks = self.repository.list_bookmarks(self.filter).await?;
        self.clamp_selection();
        Ok(())
    }

    fn clamp_selection(&mut self) {
        let len = self.bookmarks.len();
        if len > 0 && self.selected_index >= len {
            self.selected_index = len - 1;
        } else if len == 0 {
            self.selected_index = 0;
        }
    }
}

pub fn parse_tags(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
