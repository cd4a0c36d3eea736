//! Periodic RSS ingestion: poll due feeds, decode their documents and store
//! new posts in SQLite.

pub mod config;
pub mod feed;
pub mod scraper;
pub mod storage;
