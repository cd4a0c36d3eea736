//! Feed retrieval and decoding.
//!
//! - [`parser`] decodes RSS 2.0 bodies with `quick-xml`'s serde support,
//!   keeping item fields as raw text.
//! - [`fetcher`] defines the [`FetchFeed`] seam and its HTTP implementation.
//! - [`url_validator`] refuses non-HTTP and (by default) private targets
//!   before a request is made.
//!
//! # Example
//!
//! ```ignore
//! use rssagg::feed::{FetchFeed, HttpFetcher};
//!
//! let fetcher = HttpFetcher::new(reqwest::Client::new());
//! let doc = fetcher.fetch("https://blog.example.com/index.xml").await?;
//! for item in doc.items() {
//!     println!("{} ({})", item.title, item.pub_date);
//! }
//! ```

mod fetcher;
mod parser;
mod url_validator;

pub use fetcher::{
    FetchError, FetchFeed, HttpFetcher, DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_FEED_BYTES,
};
pub use parser::{parse_document, RssChannel, RssDocument, RssItem};
pub use url_validator::{validate_feed_url, HostPolicy, UrlValidationError};
