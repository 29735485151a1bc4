use std::collections::BTreeSet;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::tab::Tab;
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookmarkType {
    #[default]
    Backlog,
    Library,
}

impl BookmarkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookmarkType::Backlog => "BACKLOG",
            BookmarkType::Library => "LIBRARY",
        }
    }
}

impl fmt::Display for BookmarkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub url: String,
    pub title: String,
    pub favicon: Option<String>,
    #[serde(rename = "type")]
    pub kind: BookmarkType,
    pub creation_date: Option<NaiveDateTime>,
    pub deadline: Option<NaiveDate>,
    pub remind_date: Option<NaiveDate>,
    pub expiration_date: Option<NaiveDate>,
    pub favorite: bool,
    pub comment: String,
    pub tags: BTreeSet<String>,
}

impl Bookmark {
    pub fn new(url: impl Into<String>, title: impl Into<String>, kind: BookmarkType) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            favicon: None,
            kind,
            creation_date: None,
            deadline: None,
            remind_date: None,
            expiration_date: None,
            favorite: false,
            comment: String::new(),
            tags: BTreeSet::new(),
        }
    }

    /// An unsaved backlog entry for the page shown in `tab`.
    pub fn from_tab(tab: &Tab) -> Result<Self> {
        let url = tab.page_url().ok_or(AppError::UnsupportedTab)?;
        Ok(Self {
            favicon: tab.favicon.clone(),
            ..Self::new(url, tab.title.clone().unwrap_or_default(), BookmarkType::Backlog)
        })
    }

    /// Bookmarks that were never saved carry no creation date.
    pub fn is_new(&self) -> bool {
        self.creation_date.is_none()
    }

    /// Stamps the creation date unless one is already set.
    pub fn mark_created(&mut self, at: NaiveDateTime) {
        self.creation_date.get_or_insert(at);
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiration_date.is_some_and(|date| date < today)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(AppError::InvalidBookmark("url must not be empty".into()));
        }
        if self.tags.iter().any(|t| t.trim().is_empty()) {
            return Err(AppError::InvalidBookmark(format!(
                "blank tag on {}",
                self.url
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BookmarkFilter {
    #[default]
    All,
    Backlog,
    Library,
    Favorite,
}

impl BookmarkFilter {
    pub fn cycle(self) -> Self {
        match self {
            BookmarkFilter::All => BookmarkFilter::Backlog,
            BookmarkFilter::Backlog => BookmarkFilter::Library,
            BookmarkFilter::Library => BookmarkFilter::Favorite,
            BookmarkFilter::Favorite => BookmarkFilter::All,
        }
    }

    pub fn matches(self, bookmark: &Bookmark) -> bool {
        match self {
            BookmarkFilter::All => true,
            BookmarkFilter::Backlog => bookmark.kind == BookmarkType::Backlog,
            BookmarkFilter::Library => bookmark.kind == BookmarkType::Library,
            BookmarkFilter::Favorite => bookmark.favorite,
        }
    }
}
