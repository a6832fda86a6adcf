use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{Config, SourceConfig};
use crate::fetcher::{FetchError, Fetcher};
use crate::story::{AggregationResult, SourceError, Story};

/// A whole aggregation cycle failed. Cloneable so one failure can be handed
/// to every caller waiting on the same refresh.
#[derive(Debug, Clone, Error)]
pub enum AggregateError {
    #[error("{0}")]
    Failed(String),
    #[error("aggregation task failed: {0}")]
    Task(String),
}

/// Produces one [`AggregationResult`] per call.
#[async_trait]
pub trait Aggregate: Send + Sync {
    async fn aggregate(&self) -> Result<AggregationResult, AggregateError>;
}

/// Fans out to every configured source and merges what comes back.
pub struct Aggregator {
    fetcher: Fetcher,
    sources: Vec<SourceConfig>,
    feed_item_limit: usize,
    result_limit: usize,
}

impl Aggregator {
    pub fn new(
        fetcher: Fetcher,
        sources: Vec<SourceConfig>,
        feed_item_limit: usize,
        result_limit: usize,
    ) -> Self {
        Self {
            fetcher,
            sources,
            feed_item_limit,
            result_limit,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        let fetcher = Fetcher::new(config.request_timeout())?;
        Ok(Self::new(
            fetcher,
            config.sources.clone(),
            config.feed_item_limit,
            config.result_limit,
        ))
    }

    /// Fetches all sources concurrently and waits for every one to settle.
    /// A failing source becomes an entry in `errors` and never stops the rest.
    pub async fn run(&self) -> AggregationResult {
        info!("Aggregating {} sources", self.sources.len());

        let settled = join_all(
            self.sources
                .iter()
                .map(|source| self.fetcher.fetch_source(source, self.feed_item_limit)),
        )
        .await;

        let mut items = Vec::new();
        let mut errors = Vec::new();
        for (source, outcome) in self.sources.iter().zip(settled) {
            match outcome {
                Ok(stories) => items.extend(stories),
                Err(e) => {
                    warn!("Failed to fetch feed '{}': {}", source.name, e);
                    errors.push(SourceError {
                        source: source.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let fetched = items.len();
        let items = dedupe_and_sort(items, self.result_limit);
        info!(
            "Aggregation complete: {} stories ({} fetched), {} failed sources",
            items.len(),
            fetched,
            errors.len()
        );

        AggregationResult {
            generated_at: Utc::now(),
            items,
            errors,
        }
    }
}

#[async_trait]
impl Aggregate for Aggregator {
    async fn aggregate(&self) -> Result<AggregationResult, AggregateError> {
        Ok(self.run().await)
    }
}

/// Collapses stories sharing a dedup key, newest first, capped at `limit`.
///
/// Among duplicates the later `published_at` wins; a timestamp beats none,
/// and on a tie the story seen first is kept in its original position.
pub fn dedupe_and_sort(stories: Vec<Story>, limit: usize) -> Vec<Story> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<Story> = Vec::with_capacity(stories.len());

    for story in stories {
        let key = story.dedup_key();
        match slots.get(&key) {
            Some(&slot) => {
                if story.timestamp_millis() > unique[slot].timestamp_millis() {
                    unique[slot] = story;
                }
            }
            None => {
                slots.insert(key, unique.len());
                unique.push(story);
            }
        }
    }

    // stable, so equal timestamps keep first-seen order
    unique.sort_by(|a, b| b.timestamp_millis().cmp(&a.timestamp_millis()));
    unique.truncate(limit);
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone};
    use std::time::Duration as StdDuration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 12, 9, hour, 0, 0).unwrap()
    }

    fn story(id: &str, link: &str, title: &str, published_at: Option<DateTime<Utc>>) -> Story {
        Story {
            id: id.to_string(),
            source: "Test".to_string(),
            title: title.to_string(),
            link: link.to_string(),
            published_at,
            tldr: String::new(),
            image: None,
        }
    }

    fn rss(items: &[(&str, &str)]) -> String {
        let body: String = items
            .iter()
            .map(|(title, link)| {
                format!(
                    "<item><title>{title}</title><link>{link}</link><pubDate>Mon, 09 Dec 2024 12:00:00 GMT</pubDate></item>"
                )
            })
            .collect();
        format!("<rss><channel>{body}</channel></rss>")
    }

    mod dedupe_tests {
        use super::*;

        #[test]
        fn test_later_timestamp_wins() {
            let merged = dedupe_and_sort(
                vec![
                    story("old", "https://x.com/a", "A", Some(at(8))),
                    story("new", "https://x.com/a", "A", Some(at(10))),
                ],
                90,
            );

            assert_eq!(merged.len(), 1);
            assert_eq!(merged[0].id, "new");
        }

        #[test]
        fn test_present_timestamp_beats_absent() {
            let merged = dedupe_and_sort(
                vec![
                    story("undated", "https://x.com/a", "A", None),
                    story("dated", "https://x.com/a", "A", Some(at(1))),
                ],
                90,
            );

            assert_eq!(merged.len(), 1);
            assert_eq!(merged[0].id, "dated");
        }

        #[test]
        fn test_tie_keeps_first_seen() {
            let merged = dedupe_and_sort(
                vec![
                    story("first", "https://x.com/a", "A", Some(at(9))),
                    story("second", "https://x.com/a", "A", Some(at(9))),
                ],
                90,
            );

            assert_eq!(merged[0].id, "first");
        }

        #[test]
        fn test_title_key_when_link_missing() {
            let merged = dedupe_and_sort(
                vec![
                    story("a", "", "Storm Hits Coast", Some(at(1))),
                    story("b", "", "storm hits coast", Some(at(2))),
                ],
                90,
            );

            assert_eq!(merged.len(), 1);
            assert_eq!(merged[0].id, "b");
        }

        #[test]
        fn test_distinct_links_are_kept() {
            let merged = dedupe_and_sort(
                vec![
                    story("a", "https://x.com/a", "Same title", None),
                    story("b", "https://x.com/b", "Same title", None),
                ],
                90,
            );

            assert_eq!(merged.len(), 2);
        }
    }

    mod sort_tests {
        use super::*;

        #[test]
        fn test_newest_first_and_undated_last() {
            let merged = dedupe_and_sort(
                vec![
                    story("undated", "https://x.com/u", "U", None),
                    story("mid", "https://x.com/m", "M", Some(at(10))),
                    story("new", "https://x.com/n", "N", Some(at(12))),
                    story("old", "https://x.com/o", "O", Some(at(6))),
                ],
                90,
            );

            let ids: Vec<_> = merged.iter().map(|s| s.id.as_str()).collect();
            assert_eq!(ids, vec!["new", "mid", "old", "undated"]);

            for pair in merged.windows(2) {
                assert!(pair[0].timestamp_millis() >= pair[1].timestamp_millis());
            }
        }

        #[test]
        fn test_equal_timestamps_keep_input_order() {
            let merged = dedupe_and_sort(
                vec![
                    story("x", "https://x.com/x", "X", None),
                    story("y", "https://x.com/y", "Y", None),
                    story("z", "https://x.com/z", "Z", None),
                ],
                90,
            );

            let ids: Vec<_> = merged.iter().map(|s| s.id.as_str()).collect();
            assert_eq!(ids, vec!["x", "y", "z"]);
        }

        #[test]
        fn test_cap_applies_after_sort() {
            let stories = (0..10)
                .map(|n| {
                    story(
                        &n.to_string(),
                        &format!("https://x.com/{n}"),
                        "T",
                        Some(at(0) + Duration::minutes(n)),
                    )
                })
                .collect();

            let merged = dedupe_and_sort(stories, 3);
            let ids: Vec<_> = merged.iter().map(|s| s.id.as_str()).collect();
            assert_eq!(ids, vec!["9", "8", "7"]);
        }
    }

    mod run_tests {
        use super::*;

        fn aggregator_for(server: &MockServer, routes: &[(&str, &str)]) -> Aggregator {
            let sources = routes
                .iter()
                .map(|(name, route)| SourceConfig::new(*name, format!("{}{}", server.uri(), route)))
                .collect();
            Aggregator::new(Fetcher::new(StdDuration::from_secs(5)).unwrap(), sources, 30, 90)
        }

        #[tokio::test]
        async fn test_partial_failure_is_collected() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/good.xml"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_string(rss(&[("Good story", "https://good.example.com/1")])),
                )
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/bad.xml"))
                .respond_with(ResponseTemplate::new(503))
                .mount(&server)
                .await;

            let aggregator =
                aggregator_for(&server, &[("Good", "/good.xml"), ("Bad", "/bad.xml")]);
            let result = aggregator.aggregate().await.unwrap();

            assert_eq!(result.items.len(), 1);
            assert_eq!(result.items[0].source, "Good");
            assert_eq!(
                result.errors,
                vec![SourceError {
                    source: "Bad".to_string(),
                    error: "HTTP 503".to_string(),
                }]
            );
        }

        #[tokio::test]
        async fn test_all_sources_failing_still_yields_a_result() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(500))
                .mount(&server)
                .await;

            let aggregator =
                aggregator_for(&server, &[("A", "/a.xml"), ("B", "/b.xml")]);
            let result = aggregator.aggregate().await.unwrap();

            assert!(result.items.is_empty());
            let failed: Vec<_> = result.errors.iter().map(|e| e.source.as_str()).collect();
            assert_eq!(failed, vec!["A", "B"]);
        }

        #[tokio::test]
        async fn test_slow_source_is_waited_for() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/slow.xml"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_string(rss(&[("Slow story", "https://slow.example.com/1")]))
                        .set_delay(StdDuration::from_millis(300)),
                )
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/fast.xml"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_string(rss(&[("Fast story", "https://fast.example.com/1")])),
                )
                .mount(&server)
                .await;

            let aggregator =
                aggregator_for(&server, &[("Slow", "/slow.xml"), ("Fast", "/fast.xml")]);
            let result = aggregator.run().await;

            assert_eq!(result.items.len(), 2);
            assert!(result.errors.is_empty());
        }

        #[tokio::test]
        async fn test_duplicates_across_sources_collapse() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/one.xml"))
                .respond_with(ResponseTemplate::new(200).set_body_string(rss(&[(
                    "Storm hits coast",
                    "https://news.example.com/storm?utm_source=one",
                )])))
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/two.xml"))
                .respond_with(ResponseTemplate::new(200).set_body_string(rss(&[(
                    "Storm hits coast",
                    "https://news.example.com/storm",
                )])))
                .mount(&server)
                .await;

            let aggregator =
                aggregator_for(&server, &[("One", "/one.xml"), ("Two", "/two.xml")]);
            let result = aggregator.run().await;

            assert_eq!(result.items.len(), 1);
            assert_eq!(result.items[0].link, "https://news.example.com/storm");
            assert_eq!(result.items[0].source, "One");
        }

        #[tokio::test]
        async fn test_no_sources() {
            let aggregator = Aggregator::new(
                Fetcher::new(StdDuration::from_secs(5)).unwrap(),
                Vec::new(),
                30,
                90,
            );
            let result = aggregator.run().await;

            assert!(result.items.is_empty());
            assert!(result.errors.is_empty());
        }
    }
}
