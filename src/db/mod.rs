// Re-export the Database struct and other public items
pub mod catalog;
pub mod core;
pub mod preferences;
pub mod ranking;
mod schema;
pub mod signals;
pub mod updater;

// Re-export Database and the main entry points
pub use self::core::Database;
pub use self::ranking::{Audience, FeedItem};
pub use self::updater::{ArticleRef, NewReport, ReportReason};
pub use sqlx::Row;
