use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::feed::{FetchError, FetchFeed, RssItem};
use crate::storage::{CreatePostParams, DatabaseError, Feed, FeedStore};

/// RFC 1123 with a numeric zone, e.g. `Mon, 02 Jan 2006 15:04:05 -0700`.
pub const PUB_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Format of the part after the weekday. The weekday is checked for
/// syntax only, so a feed that gets it wrong still parses.
const PUB_DATE_BODY_FORMAT: &str = "%d %b %Y %H:%M:%S %z";

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Byte layout of the part after the weekday: `0` is a digit, `a` a letter,
/// `+` a sign, anything else must match exactly. chrono alone would also
/// take a one-digit day or a `-07:00` offset.
const PUB_DATE_BODY_SHAPE: &[u8] = b"00 aaa 0000 00:00:00 +0000";

fn has_pub_date_shape(body: &str) -> bool {
    body.len() == PUB_DATE_BODY_SHAPE.len()
        && body
            .bytes()
            .zip(PUB_DATE_BODY_SHAPE)
            .all(|(b, &want)| match want {
                b'0' => b.is_ascii_digit(),
                b'a' => b.is_ascii_alphabetic(),
                b'+' => b == b'+' || b == b'-',
                _ => b == want,
            })
}

/// Feed-scoped failures. Either one ends that feed's run; nothing is
/// retried until the store selects the feed again.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Couldn't mark feed fetched: {0}")]
    MarkFetched(#[source] DatabaseError),
    #[error("Couldn't collect feed: {0}")]
    Fetch(#[source] FetchError),
}

/// Item-scoped failure: the publish date did not match [`PUB_DATE_FORMAT`].
#[derive(Debug, Error)]
#[error("Couldn't parse date {raw:?}: {reason}")]
pub struct DateParseError {
    pub raw: String,
    reason: String,
}

/// Outcome of one pipeline run.
#[derive(Debug)]
pub struct PipelineResult {
    pub feed_id: Uuid,
    pub feed_name: String,
    /// Items present in the fetched document
    pub items_found: usize,
    /// Posts the store accepted
    pub inserted: usize,
    /// Items dropped because their publish date did not parse
    pub skipped_dates: usize,
    /// Items the store rejected (duplicates included)
    pub failed_inserts: usize,
    pub error: Option<PipelineError>,
}

impl PipelineResult {
    fn new(feed: &Feed) -> Self {
        Self {
            feed_id: feed.id,
            feed_name: feed.name.clone(),
            items_found: 0,
            inserted: 0,
            skipped_dates: 0,
            failed_inserts: 0,
            error: None,
        }
    }

    fn failed(feed: &Feed, error: PipelineError) -> Self {
        Self {
            error: Some(error),
            ..Self::new(feed)
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Empty text is "no description"; anything else is kept verbatim.
pub fn normalize_description(text: &str) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Parse an RSS `pubDate` in [`PUB_DATE_FORMAT`] and convert it to UTC.
///
/// The weekday is matched case-insensitively. The day needs two digits and
/// the zone must be a numeric `+hhmm`; named zones (`GMT`, `EST`) are rejected.
pub fn parse_pub_date(raw: &str) -> Result<DateTime<Utc>, DateParseError> {
    let fail = |reason: String| DateParseError {
        raw: raw.to_string(),
        reason,
    };

    let (weekday, body) = raw
        .split_once(", ")
        .ok_or_else(|| fail("missing weekday".to_string()))?;
    if !WEEKDAYS.iter().any(|day| day.eq_ignore_ascii_case(weekday)) {
        return Err(fail(format!("unknown weekday {weekday:?}")));
    }
    if !has_pub_date_shape(body) {
        return Err(fail("expected \"02 Jan 2006 15:04:05 -0700\" after the weekday".to_string()));
    }

    DateTime::parse_from_str(body, PUB_DATE_BODY_FORMAT)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| fail(e.to_string()))
}

/// Turn one decoded item into insert parameters for `feed_id`.
///
/// Identity and timestamps are generated here, at insertion time.
pub fn build_post(item: &RssItem, feed_id: Uuid) -> Result<CreatePostParams, DateParseError> {
    let published_at = parse_pub_date(&item.pub_date)?;
    let now = Utc::now();

    Ok(CreatePostParams {
        id: Uuid::new_v4(),
        created_at: now,
        updated_at: now,
        title: item.title.clone(),
        description: normalize_description(&item.description),
        published_at,
        url: item.link.clone(),
        feed_id,
    })
}

/// Run fetch → parse → persist for a single feed.
///
/// Never fails as a whole: feed-level errors end up in
/// [`PipelineResult::error`], item-level errors only in the counters.
/// All of them are logged here.
pub async fn run_pipeline<S, F>(store: &S, fetcher: &F, feed: &Feed) -> PipelineResult
where
    S: FeedStore,
    F: FetchFeed,
{
    if let Err(e) = store.mark_feed_fetched(feed.id).await {
        tracing::warn!(feed = %feed.name, feed_id = %feed.id, error = %e, "Couldn't mark feed fetched");
        return PipelineResult::failed(feed, PipelineError::MarkFetched(e));
    }

    let document = match fetcher.fetch(&feed.url).await {
        Ok(document) => document,
        Err(e) => {
            tracing::warn!(feed = %feed.name, url = %feed.url, error = %e, "Couldn't collect feed");
            return PipelineResult::failed(feed, PipelineError::Fetch(e));
        }
    };

    let mut result = PipelineResult::new(feed);
    result.items_found = document.items().len();

    for item in document.items() {
        let params = match build_post(item, feed.id) {
            Ok(params) => params,
            Err(e) => {
                tracing::warn!(feed = %feed.name, link = %item.link, error = %e, "Skipping item");
                result.skipped_dates += 1;
                continue;
            }
        };

        match store.insert_post(params).await {
            Ok(_) => result.inserted += 1,
            Err(e) if e.is_constraint_violation() => {
                tracing::debug!(feed = %feed.name, link = %item.link, error = %e, "Post not stored");
                result.failed_inserts += 1;
            }
            Err(e) => {
                tracing::warn!(feed = %feed.name, link = %item.link, error = %e, "Failed to create post");
                result.failed_inserts += 1;
            }
        }
    }

    tracing::info!(
        feed = %feed.name,
        posts_found = result.items_found,
        inserted = result.inserted,
        failed_inserts = result.failed_inserts,
        skipped_dates = result.skipped_dates,
        "Feed collected"
    );

    result
}
