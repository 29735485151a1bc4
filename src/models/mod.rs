mod bookmark;
mod tab;
mod timers;

pub use bookmark::{Bookmark, BookmarkFilter, BookmarkType};
pub use tab::{Tab, TabQuery};
pub use timers::{BookmarkTimers, RelativeDate};
