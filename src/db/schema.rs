//! Object store layouts for bookmarks and their tags.

use serde_json::Value;

use crate::error::StoreError;
use crate::models::Bookmark;
use crate::store::record::{encode_optional_date, encode_optional_date_time};
use crate::store::{FieldDef, IndexKind, Key, Record, Schema, StoreDef};

/// Bumping this re-runs store creation on every existing database.
pub const DB_VERSION: u32 = 1;

pub const DB_NAME: &str = "bookmarks";

pub mod bookmark_fields {
    pub const URL: &str = "url";
    pub const TITLE: &str = "title";
    pub const FAVICON: &str = "favicon";
    pub const TYPE: &str = "type";
    pub const CREATION_DATE: &str = "creationDate";
    pub const DEADLINE: &str = "deadline";
    pub const REMIND_DATE: &str = "remindDate";
    pub const EXPIRATION_DATE: &str = "expirationDate";
    pub const FAVORITE: &str = "favorite";
    pub const COMMENT: &str = "comment";
}

pub mod tag_fields {
    pub const ID: &str = "id";
    pub const URL: &str = "url";
    pub const TAG: &str = "tag";
}

pub struct BookmarkSchema;

impl Schema for BookmarkSchema {
    type Entity = Bookmark;

    const STORE: &'static str = "bookmarks";

    fn fields() -> &'static [FieldDef<Bookmark>] {
        use bookmark_fields::*;

        static FIELDS: [FieldDef<Bookmark>; 10] = [
            FieldDef {
                name: URL,
                get: |b| Value::from(b.url.as_str()),
                index: Some(IndexKind::PrimaryKey),
            },
            FieldDef {
                name: TITLE,
                get: |b| Value::from(b.title.as_str()),
                index: Some(IndexKind::Field),
            },
            FieldDef {
                name: FAVICON,
                get: |b| b.favicon.as_deref().map(Value::from).unwrap_or(Value::Null),
                index: None,
            },
            FieldDef {
                name: TYPE,
                get: |b| Value::from(b.kind.as_str()),
                index: Some(IndexKind::Field),
            },
            FieldDef {
                name: CREATION_DATE,
                get: |b| encode_optional_date_time(b.creation_date),
                index: Some(IndexKind::Field),
            },
            FieldDef {
                name: DEADLINE,
                get: |b| encode_optional_date(b.deadline),
                index: Some(IndexKind::Field),
            },
            FieldDef {
                name: REMIND_DATE,
                get: |b| encode_optional_date(b.remind_date),
                index: Some(IndexKind::Field),
            },
            FieldDef {
                name: EXPIRATION_DATE,
                get: |b| encode_optional_date(b.expiration_date),
                index: Some(IndexKind::Field),
            },
            FieldDef {
                name: FAVORITE,
                get: |b| Value::from(b.favorite),
                index: Some(IndexKind::Field),
            },
            FieldDef {
                name: COMMENT,
                get: |b| Value::from(b.comment.as_str()),
                index: None,
            },
        ];
        &FIELDS
    }
}

impl BookmarkSchema {
    /// Rebuilds a bookmark without its tags, which live in [`TagSchema`]'s store.
    pub fn bookmark_from_record(record: &Record) -> Result<Bookmark, StoreError> {
        use bookmark_fields::*;

        Self::from_record(record, |f| {
            Ok(Bookmark {
                url: f.required(URL)?,
                title: f.required(TITLE)?,
                favicon: f.optional(FAVICON)?,
                kind: f.required(TYPE)?,
                creation_date: f.date_time(CREATION_DATE)?,
                deadline: f.date(DEADLINE)?,
                remind_date: f.date(REMIND_DATE)?,
                expiration_date: f.date(EXPIRATION_DATE)?,
                favorite: f.optional(FAVORITE)?.unwrap_or(false),
                comment: f.optional(COMMENT)?.unwrap_or_default(),
                tags: Default::default(),
            })
        })
    }
}

/// One `(url, tag)` row; a bookmark owns one per tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagEntry {
    pub url: String,
    pub tag: String,
}

impl TagEntry {
    pub fn key(url: &str, tag: &str) -> Key {
        Key::compound([Key::from(url), Key::from(tag)])
    }
}

pub struct TagSchema;

impl Schema for TagSchema {
    type Entity = TagEntry;

    const STORE: &'static str = "tags";

    fn fields() -> &'static [FieldDef<TagEntry>] {
        use tag_fields::*;

        static FIELDS: [FieldDef<TagEntry>; 3] = [
            FieldDef {
                name: ID,
                get: |t| TagEntry::key(&t.url, &t.tag).as_value().clone(),
                index: Some(IndexKind::PrimaryKey),
            },
            FieldDef {
                name: URL,
                get: |t| Value::from(t.url.as_str()),
                index: Some(IndexKind::Field),
            },
            FieldDef {
                name: TAG,
                get: |t| Value::from(t.tag.as_str()),
                index: Some(IndexKind::Field),
            },
        ];
        &FIELDS
    }
}

impl TagSchema {
    pub fn tag_from_record(record: &Record) -> Result<TagEntry, StoreError> {
        Self::from_record(record, |f| {
            Ok(TagEntry {
                url: f.required(tag_fields::URL)?,
                tag: f.required(tag_fields::TAG)?,
            })
        })
    }
}

/// Every store the bookmark database is created with.
pub fn bookmark_stores() -> Result<Vec<StoreDef>, StoreError> {
    Ok(vec![BookmarkSchema::store_def()?, TagSchema::store_def()?])
}
