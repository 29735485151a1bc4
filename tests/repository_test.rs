use std::collections::BTreeSet;
use std::sync::Arc;

use backlog_keeper::db::schema::{BookmarkSchema, TagSchema};
use backlog_keeper::db::{BookmarkRepository, DatabaseHolder};
use backlog_keeper::models::{Bookmark, BookmarkFilter, BookmarkType, Tab, TabQuery};
use backlog_keeper::notify::{BroadcastHub, UpdateNotifier};
use backlog_keeper::store::{DatabaseConfig, DatabaseLocation, Schema};
use backlog_keeper::{AppError, Result};
use chrono::NaiveDate;
use futures::StreamExt;

fn memory_holder() -> Arc<DatabaseHolder> {
    Arc::new(
        DatabaseHolder::for_bookmarks(DatabaseConfig {
            name: "bookmarks".into(),
            version: 1,
            location: DatabaseLocation::Memory,
        })
        .unwrap(),
    )
}

fn repository() -> BookmarkRepository {
    BookmarkRepository::new(memory_holder(), UpdateNotifier::new(&BroadcastHub::new()))
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

async fn store_counts(repo_holder: &DatabaseHolder) -> (u64, u64) {
    repo_holder
        .database()
        .await
        .unwrap()
        .transaction(&[BookmarkSchema::STORE, TagSchema::STORE], |tx| {
            Ok((
                tx.store(BookmarkSchema::STORE)?.count()?,
                tx.store(TagSchema::STORE)?.count()?,
            ))
        })
        .await
        .unwrap()
}

struct FixedTab(Option<Tab>);

impl TabQuery for FixedTab {
    async fn active_tab(&self) -> Result<Option<Tab>> {
        Ok(self.0.clone())
    }
}

struct BrokenTabs;

impl TabQuery for BrokenTabs {
    async fn active_tab(&self) -> Result<Option<Tab>> {
        Err(anyhow::anyhow!("tabs API unavailable").into())
    }
}

fn tab(url: Option<&str>) -> Tab {
    Tab {
        id: Some(7),
        url: url.map(str::to_string),
        title: Some("Example".into()),
        favicon: Some("https://example.com/favicon.ico".into()),
        window_id: Some(1),
    }
}

#[tokio::test]
async fn save_then_load_returns_equal_bookmark() {
    let repo = repository();
    let bookmark = Bookmark::new("https://x.com", "X", BookmarkType::Backlog).with_tags(["a", "b"]);

    repo.save_bookmark(&bookmark).await.unwrap();

    let loaded = repo.load_bookmark("https://x.com").await.unwrap();
    assert_eq!(loaded, Some(bookmark));
}

#[tokio::test]
async fn load_of_unknown_url_is_none() {
    let repo = repository();
    assert_eq!(repo.load_bookmark("https://nowhere.org").await.unwrap(), None);
}

#[tokio::test]
async fn all_fields_survive_storage() {
    let repo = repository();
    let mut bookmark = Bookmark::new("https://docs.rs", "Docs", BookmarkType::Library);
    bookmark.favicon = Some("https://docs.rs/favicon.ico".into());
    bookmark.creation_date = date(2024, 2, 29).and_hms_micro_opt(23, 59, 58, 999_999);
    bookmark.deadline = Some(date(2024, 3, 10));
    bookmark.remind_date = Some(date(2024, 3, 3));
    bookmark.expiration_date = Some(date(2024, 12, 31));
    bookmark.favorite = true;
    bookmark.comment = "crate docs, \"quoted\"".into();
    bookmark.tags = BTreeSet::from(["reference".to_string()]);

    repo.save_bookmark(&bookmark).await.unwrap();
    assert_eq!(repo.load_bookmark(&bookmark.url).await.unwrap(), Some(bookmark));
}

#[tokio::test]
async fn saving_twice_keeps_one_row_per_tag() {
    let holder = memory_holder();
    let repo = BookmarkRepository::new(Arc::clone(&holder), UpdateNotifier::new(&BroadcastHub::new()));
    let bookmark =
        Bookmark::new("https://x.com", "X", BookmarkType::Backlog).with_tags(["a", "b", "c"]);

    repo.save_bookmark(&bookmark).await.unwrap();
    repo.save_bookmark(&bookmark).await.unwrap();

    assert_eq!(store_counts(&holder).await, (1, 3));
}

#[tokio::test]
async fn removed_tags_are_deleted_on_save() {
    let holder = memory_holder();
    let repo = BookmarkRepository::new(Arc::clone(&holder), UpdateNotifier::new(&BroadcastHub::new()));
    let mut bookmark =
        Bookmark::new("https://x.com", "X", BookmarkType::Backlog).with_tags(["a", "b", "c"]);
    repo.save_bookmark(&bookmark).await.unwrap();

    bookmark.tags.remove("b");
    bookmark.tags.insert("d".into());
    repo.save_bookmark(&bookmark).await.unwrap();

    let loaded = repo.load_bookmark("https://x.com").await.unwrap().unwrap();
    assert_eq!(
        loaded.tags,
        BTreeSet::from(["a".to_string(), "c".to_string(), "d".to_string()])
    );
    assert_eq!(store_counts(&holder).await, (1, 3));
}

#[tokio::test]
async fn delete_removes_bookmark_and_its_tags_only() {
    let holder = memory_holder();
    let repo = BookmarkRepository::new(Arc::clone(&holder), UpdateNotifier::new(&BroadcastHub::new()));
    let doomed = Bookmark::new("https://x.com", "X", BookmarkType::Backlog).with_tags(["a", "b", "c"]);
    let kept = Bookmark::new("https://y.com", "Y", BookmarkType::Library).with_tags(["a", "z"]);
    repo.save_bookmark(&doomed).await.unwrap();
    repo.save_bookmark(&kept).await.unwrap();
    assert_eq!(store_counts(&holder).await, (2, 5));

    repo.delete_bookmark("https://x.com").await.unwrap();

    assert_eq!(store_counts(&holder).await, (1, 2));
    assert_eq!(repo.load_bookmark("https://x.com").await.unwrap(), None);
    assert_eq!(repo.load_bookmark("https://y.com").await.unwrap(), Some(kept));
}

#[tokio::test]
async fn delete_of_unknown_url_is_a_no_op() {
    let repo = repository();
    repo.delete_bookmark("https://nowhere.org").await.unwrap();
}

#[tokio::test]
async fn empty_url_is_rejected() {
    let repo = repository();
    let bookmark = Bookmark::new("", "nothing", BookmarkType::Backlog);
    assert!(matches!(
        repo.save_bookmark(&bookmark).await,
        Err(AppError::InvalidBookmark(_))
    ));
}

#[tokio::test]
async fn concurrent_saves_of_different_urls_both_land() {
    let holder = memory_holder();
    let hub = BroadcastHub::new();
    let repo_a = BookmarkRepository::new(Arc::clone(&holder), UpdateNotifier::new(&hub));
    let repo_b = BookmarkRepository::new(Arc::clone(&holder), UpdateNotifier::new(&hub));

    let a = Bookmark::new("https://a.com", "A", BookmarkType::Backlog).with_tags(["x", "y"]);
    let b = Bookmark::new("https://b.com", "B", BookmarkType::Library).with_tags(["x"]);

    let (ra, rb) = tokio::join!(repo_a.save_bookmark(&a), repo_b.save_bookmark(&b));
    ra.unwrap();
    rb.unwrap();

    assert_eq!(repo_a.load_bookmark("https://a.com").await.unwrap(), Some(a));
    assert_eq!(repo_b.load_bookmark("https://b.com").await.unwrap(), Some(b));
    assert_eq!(store_counts(&holder).await, (2, 3));
}

#[tokio::test]
async fn active_tab_returns_stored_bookmark() {
    let repo = repository();
    let stored = Bookmark::new("https://example.com/", "Saved title", BookmarkType::Library)
        .with_tags(["kept"]);
    repo.save_bookmark(&stored).await.unwrap();

    let found = repo
        .load_bookmark_for_active_tab(&FixedTab(Some(tab(Some("https://example.com/")))))
        .await
        .unwrap();
    assert_eq!(found, stored);
}

#[tokio::test]
async fn active_tab_without_bookmark_yields_new_one() {
    let repo = repository();
    let found = repo
        .load_bookmark_for_active_tab(&FixedTab(Some(tab(Some("https://example.com/page")))))
        .await
        .unwrap();

    assert_eq!(found.url, "https://example.com/page");
    assert_eq!(found.title, "Example");
    assert_eq!(found.favicon.as_deref(), Some("https://example.com/favicon.ico"));
    assert_eq!(found.kind, BookmarkType::Backlog);
    assert!(found.is_new());
    // nothing is written
    assert_eq!(repo.load_bookmark("https://example.com/page").await.unwrap(), None);
}

#[tokio::test]
async fn unusable_tabs_are_unsupported() {
    let repo = repository();
    for tabs in [
        FixedTab(None),
        FixedTab(Some(tab(None))),
        FixedTab(Some(tab(Some("not a url")))),
    ] {
        assert!(matches!(
            repo.load_bookmark_for_active_tab(&tabs).await,
            Err(AppError::UnsupportedTab)
        ));
    }

    assert!(matches!(
        repo.load_bookmark_for_active_tab(&BrokenTabs).await,
        Err(AppError::Other(_))
    ));
}

#[tokio::test]
async fn list_applies_filter() {
    let repo = repository();
    let mut fav = Bookmark::new("https://a.com", "A", BookmarkType::Library);
    fav.favorite = true;
    repo.save_bookmark(&fav).await.unwrap();
    repo.save_bookmark(&Bookmark::new("https://b.com", "B", BookmarkType::Backlog).with_tags(["t"]))
        .await
        .unwrap();
    repo.save_bookmark(&Bookmark::new("https://c.com", "C", BookmarkType::Backlog))
        .await
        .unwrap();

    let urls = |list: Vec<Bookmark>| list.into_iter().map(|b| b.url).collect::<Vec<_>>();

    assert_eq!(
        urls(repo.list_bookmarks(BookmarkFilter::All).await.unwrap()),
        vec!["https://a.com", "https://b.com", "https://c.com"]
    );
    assert_eq!(
        urls(repo.list_bookmarks(BookmarkFilter::Backlog).await.unwrap()),
        vec!["https://b.com", "https://c.com"]
    );
    assert_eq!(
        urls(repo.list_bookmarks(BookmarkFilter::Favorite).await.unwrap()),
        vec!["https://a.com"]
    );

    let all = repo.list_bookmarks(BookmarkFilter::All).await.unwrap();
    assert_eq!(all[1].tags, BTreeSet::from(["t".to_string()]));
}

#[tokio::test]
async fn tags_are_queryable_across_bookmarks() {
    let repo = repository();
    repo.save_bookmark(&Bookmark::new("https://a.com", "A", BookmarkType::Backlog).with_tags(["rust", "db"]))
        .await
        .unwrap();
    repo.save_bookmark(&Bookmark::new("https://b.com", "B", BookmarkType::Backlog).with_tags(["rust"]))
        .await
        .unwrap();

    let tagged: Vec<String> = repo
        .bookmarks_by_tag("rust")
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.url)
        .collect();
    assert_eq!(tagged, vec!["https://a.com", "https://b.com"]);
    assert!(repo.bookmarks_by_tag("go").await.unwrap().is_empty());

    assert_eq!(
        repo.all_tags().await.unwrap(),
        BTreeSet::from(["db".to_string(), "rust".to_string()])
    );
}

#[tokio::test]
async fn purge_removes_only_expired_bookmarks() {
    let holder = memory_holder();
    let repo = BookmarkRepository::new(Arc::clone(&holder), UpdateNotifier::new(&BroadcastHub::new()));
    let today = date(2024, 6, 15);

    let mut old = Bookmark::new("https://old.com", "Old", BookmarkType::Backlog).with_tags(["a", "b"]);
    old.expiration_date = Some(date(2023, 12, 31));
    let mut yesterday = Bookmark::new("https://yesterday.com", "Y", BookmarkType::Backlog);
    yesterday.expiration_date = Some(date(2024, 6, 14));
    let mut today_b = Bookmark::new("https://today.com", "T", BookmarkType::Backlog);
    today_b.expiration_date = Some(today);
    let mut later = Bookmark::new("https://later.com", "L", BookmarkType::Backlog).with_tags(["c"]);
    later.expiration_date = Some(date(2025, 1, 1));
    let never = Bookmark::new("https://never.com", "N", BookmarkType::Library);

    for b in [&old, &yesterday, &today_b, &later, &never] {
        repo.save_bookmark(b).await.unwrap();
    }

    let mut updates = repo.notifier().subscribe();
    let purged = repo.purge_expired(today).await.unwrap();
    assert_eq!(purged, vec!["https://old.com", "https://yesterday.com"]);

    assert_eq!(updates.next().await.as_deref(), Some("https://old.com"));
    assert_eq!(updates.next().await.as_deref(), Some("https://yesterday.com"));

    assert_eq!(store_counts(&holder).await, (3, 1));
    assert_eq!(repo.load_bookmark("https://old.com").await.unwrap(), None);
    assert!(repo.load_bookmark("https://today.com").await.unwrap().is_some());
}

#[tokio::test]
async fn mutations_publish_the_url() {
    let repo = repository();
    let mut updates = repo.notifier().subscribe();

    let bookmark = Bookmark::new("https://x.com", "X", BookmarkType::Backlog);
    repo.save_bookmark(&bookmark).await.unwrap();
    repo.delete_bookmark("https://x.com").await.unwrap();

    assert_eq!(updates.next().await.as_deref(), Some("https://x.com"));
    assert_eq!(updates.next().await.as_deref(), Some("https://x.com"));
}

#[tokio::test]
async fn database_opens_once_for_concurrent_callers() {
    let holder = memory_holder();
    assert!(!holder.is_open());

    let (a, b, c) = tokio::join!(holder.database(), holder.database(), holder.database());
    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
    assert!(std::ptr::eq(a, b));
    assert!(std::ptr::eq(b, c));
    assert!(holder.is_open());
}

#[tokio::test]
async fn bookmarks_persist_in_file_database() {
    let dir = tempfile::tempdir().unwrap();
    let config = DatabaseConfig {
        name: "bookmarks".into(),
        version: 1,
        location: DatabaseLocation::File(dir.path().join("bookmarks.db")),
    };
    let bookmark = Bookmark::new("https://x.com", "X", BookmarkType::Library).with_tags(["a"]);

    {
        let holder = Arc::new(DatabaseHolder::for_bookmarks(config.clone()).unwrap());
        let repo = BookmarkRepository::new(holder, UpdateNotifier::new(&BroadcastHub::new()));
        repo.save_bookmark(&bookmark).await.unwrap();
    }

    let holder = Arc::new(DatabaseHolder::for_bookmarks(config).unwrap());
    let repo = BookmarkRepository::new(holder, UpdateNotifier::new(&BroadcastHub::new()));
    assert_eq!(repo.load_bookmark("https://x.com").await.unwrap(), Some(bookmark));
}
