use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::error::{AppError, Result, StoreError};
use crate::models::{Bookmark, BookmarkFilter, TabQuery};
use crate::notify::UpdateNotifier;
use crate::store::{Database, Key, KeyRange, Schema, Transaction};

use super::holder::DatabaseHolder;
use super::schema::{bookmark_fields, tag_fields, BookmarkSchema, TagEntry, TagSchema};

const STORES: [&str; 2] = [BookmarkSchema::STORE, TagSchema::STORE];

pub struct BookmarkRepository {
    holder: Arc<DatabaseHolder>,
    notifier: UpdateNotifier,
}

impl BookmarkRepository {
    pub fn new(holder: Arc<DatabaseHolder>, notifier: UpdateNotifier) -> Self {
        Self { holder, notifier }
    }

    pub fn notifier(&self) -> &UpdateNotifier {
        &self.notifier
    }

    async fn database(&self) -> Result<&Database> {
        Ok(self.holder.database().await?)
    }

    // Single bookmark operations

    /// Returns `None` when no bookmark is stored for `url`.
    pub async fn load_bookmark(&self, url: &str) -> Result<Option<Bookmark>> {
        tracing::debug!("Trying to find bookmark by {}", url);
        let url = url.to_string();
        let bookmark = self
            .database()
            .await?
            .transaction(&STORES, move |tx| read_bookmark(tx, &url))
            .await?;
        Ok(bookmark)
    }

    /// Upserts the bookmark and its tag rows in one transaction.
    ///
    /// Tag rows for this url that are no longer in `bookmark.tags` are
    /// deleted as part of the same transaction, so the stored tag set always
    /// equals the saved one.
    pub async fn save_bookmark(&self, bookmark: &Bookmark) -> Result<()> {
        bookmark.validate()?;
        tracing::debug!("Saving bookmark {}", bookmark.url);

        let bookmark = bookmark.clone();
        let url = bookmark.url.clone();
        self.database()
            .await?
            .write_transaction(&STORES, move |tx| {
                tx.store(BookmarkSchema::STORE)?
                    .put(&BookmarkSchema::to_record(&bookmark))?;

                let stale = delete_tags(tx, &bookmark.url, Some(&bookmark.tags))?;
                if stale > 0 {
                    tracing::debug!("Removed {} stale tags from {}", stale, bookmark.url);
                }

                let tags = tx.store(TagSchema::STORE)?;
                for tag in &bookmark.tags {
                    tags.put(&TagSchema::to_record(&TagEntry {
                        url: bookmark.url.clone(),
                        tag: tag.clone(),
                    }))?;
                }
                Ok(())
            })
            .await?;

        self.notifier.publish(&url);
        Ok(())
    }

    /// Deletes the bookmark and every tag row it owns.
    pub async fn delete_bookmark(&self, url: &str) -> Result<()> {
        tracing::debug!("Deleting bookmark for {}", url);
        let key = url.to_string();
        let removed_tags = self
            .database()
            .await?
            .write_transaction(&STORES, move |tx| {
                tx.store(BookmarkSchema::STORE)?.delete(&Key::from(key.as_str()))?;
                delete_tags(tx, &key, None)
            })
            .await?;
        tracing::debug!("Deleted {} tags for {}", removed_tags, url);

        self.notifier.publish(url);
        Ok(())
    }

    /// The stored bookmark for the active tab, or a new unsaved one built
    /// from the tab when the page was never bookmarked.
    pub async fn load_bookmark_for_active_tab<T: TabQuery>(&self, tabs: &T) -> Result<Bookmark> {
        let tab = tabs.active_tab().await?.ok_or(AppError::UnsupportedTab)?;
        let url = tab.page_url().ok_or(AppError::UnsupportedTab)?;

        if let Some(bookmark) = self.load_bookmark(url).await? {
            return Ok(bookmark);
        }
        tracing::debug!("Bookmark for {} not found, creating new item", url);
        Bookmark::from_tab(&tab)
    }

    // Listings

    pub async fn list_bookmarks(&self, filter: BookmarkFilter) -> Result<Vec<Bookmark>> {
        let bookmarks = self
            .database()
            .await?
            .transaction(&STORES, |tx| {
                let records = tx.store(BookmarkSchema::STORE)?.get_all(KeyRange::All)?;
                let mut bookmarks = Vec::with_capacity(records.len());
                for record in &records {
                    let bookmark = BookmarkSchema::bookmark_from_record(record)?;
                    bookmarks.push(with_tags(tx, bookmark)?);
                }
                Ok(bookmarks)
            })
            .await?;

        Ok(bookmarks
            .into_iter()
            .filter(|b| filter.matches(b))
            .collect())
    }

    /// Bookmarks carrying `tag`, in url order.
    pub async fn bookmarks_by_tag(&self, tag: &str) -> Result<Vec<Bookmark>> {
        let tag = tag.to_string();
        let bookmarks = self
            .database()
            .await?
            .transaction(&STORES, move |tx| {
                let entries = tx
                    .store(TagSchema::STORE)?
                    .index(tag_fields::TAG)?
                    .get_all(KeyRange::Only(Key::from(tag.as_str())))?;

                let mut bookmarks = Vec::with_capacity(entries.len());
                for record in &entries {
                    let entry = TagSchema::tag_from_record(record)?;
                    if let Some(bookmark) = read_bookmark(tx, &entry.url)? {
                        bookmarks.push(bookmark);
                    }
                }
                Ok(bookmarks)
            })
            .await?;
        Ok(bookmarks)
    }

    /// Every distinct tag in use.
    pub async fn all_tags(&self) -> Result<BTreeSet<String>> {
        let tags = self
            .database()
            .await?
            .transaction(&[TagSchema::STORE], |tx| {
                let mut tags = BTreeSet::new();
                let mut cursor = tx
                    .store(TagSchema::STORE)?
                    .index(tag_fields::TAG)?
                    .cursor(KeyRange::All);
                while let Some(entry) = cursor.next()? {
                    tags.insert(TagSchema::tag_from_record(&entry.record)?.tag);
                }
                Ok(tags)
            })
            .await?;
        Ok(tags)
    }

    /// Deletes every bookmark whose expiration date is before `today`,
    /// together with its tags. Returns the purged urls.
    pub async fn purge_expired(&self, today: NaiveDate) -> Result<Vec<String>> {
        let purged = self
            .database()
            .await?
            .write_transaction(&STORES, move |tx| {
                let mut purged = Vec::new();
                let mut cursor = tx
                    .store(BookmarkSchema::STORE)?
                    .index(bookmark_fields::EXPIRATION_DATE)?
                    .cursor(KeyRange::All);

                // ISO dates sort chronologically, so the first unexpired entry ends the walk.
                while let Some(entry) = cursor.next()? {
                    let bookmark = BookmarkSchema::bookmark_from_record(&entry.record)?;
                    if !bookmark.is_expired(today) {
                        break;
                    }
                    cursor.delete()?;
                    delete_tags(tx, &bookmark.url, None)?;
                    purged.push(bookmark.url);
                }
                Ok(purged)
            })
            .await?;

        if !purged.is_empty() {
            tracing::info!("Purged {} expired bookmarks", purged.len());
        }
        for url in &purged {
            self.notifier.publish(url);
        }
        Ok(purged)
    }
}

fn read_bookmark(tx: &Transaction<'_>, url: &str) -> std::result::Result<Option<Bookmark>, StoreError> {
    let Some(record) = tx.store(BookmarkSchema::STORE)?.get(&Key::from(url))? else {
        return Ok(None);
    };
    let bookmark = BookmarkSchema::bookmark_from_record(&record)?;
    Ok(Some(with_tags(tx, bookmark)?))
}

fn with_tags(tx: &Transaction<'_>, mut bookmark: Bookmark) -> std::result::Result<Bookmark, StoreError> {
    let records = tx
        .store(TagSchema::STORE)?
        .index(tag_fields::URL)?
        .get_all(KeyRange::Only(Key::from(bookmark.url.as_str())))?;
    bookmark.tags = records
        .iter()
        .map(|r| TagSchema::tag_from_record(r).map(|entry| entry.tag))
        .collect::<std::result::Result<BTreeSet<_>, StoreError>>()?;
    Ok(bookmark)
}

/// Deletes the tag rows of `url` through the url index, sparing those in `keep`.
fn delete_tags(
    tx: &Transaction<'_>,
    url: &str,
    keep: Option<&BTreeSet<String>>,
) -> std::result::Result<usize, StoreError> {
    let mut cursor = tx
        .store(TagSchema::STORE)?
        .index(tag_fields::URL)?
        .cursor(KeyRange::Only(Key::from(url)));

    let mut deleted = 0;
    while let Some(entry) = cursor.next()? {
        let tag = TagSchema::tag_from_record(&entry.record)?.tag;
        if keep.is_some_and(|keep| keep.contains(&tag)) {
            continue;
        }
        cursor.delete()?;
        deleted += 1;
    }
    Ok(deleted)
}
