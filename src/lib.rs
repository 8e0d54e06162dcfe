pub mod app;
pub mod db;
pub mod environment;
pub mod error;
pub mod logging;
pub mod scoring;

pub const TARGET_WEB_REQUEST: &str = "web_request";
pub const TARGET_DB: &str = "db_query";
pub const TARGET_SCORING: &str = "scoring";
