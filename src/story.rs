use chrono::{DateTime, Utc};
use serde::Serialize;

/// One canonical, deduplicated news item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    /// Short fingerprint of `title` and `link`
    pub id: String,
    pub source: String,
    pub title: String,
    pub link: String,
    pub published_at: Option<DateTime<Utc>>,
    pub tldr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Story {
    /// Milliseconds since the epoch, with a missing timestamp counting as zero.
    pub fn timestamp_millis(&self) -> i64 {
        self.published_at
            .map(|published| published.timestamp_millis())
            .unwrap_or(0)
    }

    /// Key used to collapse duplicates across sources.
    pub fn dedup_key(&self) -> String {
        if self.link.is_empty() {
            self.title.to_lowercase()
        } else {
            self.link.clone()
        }
    }
}

/// A source that failed during one aggregation cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceError {
    pub source: String,
    pub error: String,
}

/// Output of one aggregation cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationResult {
    pub generated_at: DateTime<Utc>,
    pub items: Vec<Story>,
    pub errors: Vec<SourceError>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn story(link: &str, title: &str) -> Story {
        Story {
            id: "abc".to_string(),
            source: "BBC".to_string(),
            title: title.to_string(),
            link: link.to_string(),
            published_at: None,
            tldr: "Summary.".to_string(),
            image: None,
        }
    }

    #[test]
    fn test_dedup_key_prefers_link() {
        let s = story("https://example.com/a", "Storm Hits Coast");
        assert_eq!(s.dedup_key(), "https://example.com/a");
    }

    #[test]
    fn test_dedup_key_falls_back_to_lowercased_title() {
        let s = story("", "Storm Hits Coast");
        assert_eq!(s.dedup_key(), "storm hits coast");
    }

    #[test]
    fn test_missing_timestamp_counts_as_zero() {
        let mut s = story("https://example.com/a", "Title");
        assert_eq!(s.timestamp_millis(), 0);

        s.published_at = Some(Utc.with_ymd_and_hms(2024, 12, 9, 12, 0, 0).unwrap());
        assert_eq!(s.timestamp_millis(), 1_733_745_600_000);
    }

    #[test]
    fn test_story_json_shape() {
        let s = story("https://example.com/a", "Title");
        let value = serde_json::to_value(&s).unwrap();

        assert_eq!(
            value,
            json!({
                "id": "abc",
                "source": "BBC",
                "title": "Title",
                "link": "https://example.com/a",
                "publishedAt": null,
                "tldr": "Summary."
            })
        );
    }

    #[test]
    fn test_story_json_includes_image_when_present() {
        let mut s = story("https://example.com/a", "Title");
        s.image = Some("https://example.com/a.jpg".to_string());
        s.published_at = Some(Utc.with_ymd_and_hms(2024, 12, 9, 12, 0, 0).unwrap());

        let value = serde_json::to_value(&s).unwrap();
        assert_eq!(value["image"], "https://example.com/a.jpg");
        assert_eq!(value["publishedAt"], "2024-12-09T12:00:00Z");
    }

    #[test]
    fn test_aggregation_result_json_shape() {
        let result = AggregationResult {
            generated_at: Utc.with_ymd_and_hms(2024, 12, 9, 12, 0, 0).unwrap(),
            items: vec![],
            errors: vec![SourceError {
                source: "NPR".to_string(),
                error: "HTTP 503".to_string(),
            }],
        };

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["generatedAt"], "2024-12-09T12:00:00Z");
        assert_eq!(value["items"], json!([]));
        assert_eq!(value["errors"][0]["source"], "NPR");
        assert_eq!(value["errors"][0]["error"], "HTTP 503");
    }
}
