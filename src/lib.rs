//! Bookmark store core: tag, categorize and schedule web pages.
//!
//! Bookmarks live in a schema-driven object store ([`store`]) on SQLite,
//! reached through a lazily opened shared connection ([`db::DatabaseHolder`]).
//! [`db::BookmarkRepository`] reads and writes the bookmark aggregate
//! atomically and announces every change through [`notify::UpdateNotifier`]
//! so other open contexts can refresh.

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod notify;
pub mod store;

pub use error::{AppError, Result, StoreError};
