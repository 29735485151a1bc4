mod holder;
mod repository;
pub mod schema;

pub use holder::DatabaseHolder;
pub use repository::BookmarkRepository;
