use serde::{Deserialize, Deserializer};

/// A decoded RSS 2.0 document.
///
/// Only the fields the ingestion pipeline reads are modelled; unknown
/// elements (`guid`, `category`, `enclosure`, ...) are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct RssDocument {
    pub channel: RssChannel,
}

/// Channel metadata is not modelled. Namespace prefixes are dropped on
/// decode, so a channel-level `<atom:link>` would otherwise collide with
/// `<link>`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RssChannel {
    #[serde(rename = "item", default)]
    pub items: Vec<RssItem>,
}

/// One `<item>` as it appears on the wire.
///
/// Missing elements decode as empty strings. `pub_date` keeps the source
/// text untouched; parsing it is the pipeline's job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RssItem {
    #[serde(default)]
    pub title: String,
    /// First non-empty `<link>`. `<atom:link href=".."/>` decodes under
    /// the same name with no text and is passed over.
    #[serde(default, deserialize_with = "first_non_empty")]
    pub link: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "pubDate", default)]
    pub pub_date: String,
}

fn first_non_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let links = Vec::<String>::deserialize(deserializer)?;
    Ok(links
        .into_iter()
        .find(|link| !link.trim().is_empty())
        .unwrap_or_default())
}

impl RssDocument {
    pub fn items(&self) -> &[RssItem] {
        &self.channel.items
    }
}

/// Decode an RSS body into an [`RssDocument`].
pub fn parse_document(bytes: &[u8]) -> Result<RssDocument, quick_xml::DeError> {
    quick_xml::de::from_reader(bytes)
}
