use std::time::Duration;

use reqwest::Client;
use thiserror::Error;
use tracing::info;

use crate::config::SourceConfig;
use crate::normalize::normalize_item;
use crate::story::Story;
use crate::xml::{self, XmlError, XmlValue};

pub const USER_AGENT: &str = "NewsDrip/1.0 (Feed Aggregator)";

/// Where each feed dialect keeps its items, tried in order.
const ITEM_PATHS: [&[&str]; 3] = [
    &["rss", "channel", "item"],
    &["rdf:RDF", "item"],
    &["feed", "entry"],
];

#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error, including timeouts
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP {0}")]
    HttpStatus(u16),
    #[error("Parse error: {0}")]
    Parse(#[from] XmlError),
}

#[derive(Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { client })
    }

    /// Downloads one feed and normalizes at most `item_limit` of its items.
    pub async fn fetch_source(
        &self,
        source: &SourceConfig,
        item_limit: usize,
    ) -> Result<Vec<Story>, FetchError> {
        info!("Fetching feed: {} ({})", source.name, source.url);

        let response = self.client.get(&source.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let body = response.text().await?;
        let stories = parse_feed(&body, &source.name, item_limit)?;

        info!("Parsed {} stories from '{}'", stories.len(), source.name);
        Ok(stories)
    }
}

/// Parses a feed body of any supported dialect into stories.
pub fn parse_feed(body: &str, source: &str, item_limit: usize) -> Result<Vec<Story>, FetchError> {
    let doc = xml::parse(body)?;

    Ok(raw_items(&doc)
        .into_iter()
        .take(item_limit)
        .filter_map(|item| normalize_item(item, source))
        .collect())
}

/// The first non-empty item list among RSS, RDF and Atom layouts.
pub fn raw_items(doc: &XmlValue) -> Vec<&XmlValue> {
    ITEM_PATHS
        .iter()
        .map(|path| doc.path(path).map(XmlValue::items).unwrap_or_default())
        .find(|items| !items.is_empty())
        .unwrap_or_default()
}
