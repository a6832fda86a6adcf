//! Editorial heuristics the reading clients apply on top of an aggregation
//! result: a language filter, urgency ranking, lead-story selection, topic
//! grouping and related-story links.
//!
//! The keyword tables are hand-tuned editorial data and are kept verbatim.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::story::{AggregationResult, SourceError, Story};

pub const GENERAL_TOPIC: &str = "General";
pub const FEATURED_SOURCE: &str = "DRUDGE REPORT";
pub const PRIORITY_SOURCES: [&str; 3] = ["CNN", "DRUDGE REPORT", "NEW YORK POST"];

const MIN_ENGLISH_RATIO: f64 = 0.7;
const MIN_TOKEN_LEN: usize = 4;
const MAX_SHARED_TOKENS: usize = 4;
const MIN_RELATED_SCORE: usize = 2;
const MAX_RELATED: usize = 4;

pub struct TopicRule {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
}

pub struct UrgencyRule {
    pub term: &'static str,
    pub weight: u32,
}

/// Ordered: earlier topics win ties, and groups are presented in this order.
pub const TOPIC_RULES: &[TopicRule] = &[
    TopicRule {
        name: "Politics",
        keywords: &[
            "election", "senate", "congress", "parliament", "president", "prime minister",
            "government", "policy", "campaign", "vote",
        ],
    },
    TopicRule {
        name: "Conflict",
        keywords: &[
            "war", "military", "missile", "attack", "ceasefire", "troops", "airstrike",
            "hostage", "defense", "conflict",
        ],
    },
    TopicRule {
        name: "Business",
        keywords: &[
            "market", "stocks", "economy", "inflation", "interest rate", "fed", "earnings",
            "trade", "tariff", "company",
        ],
    },
    TopicRule {
        name: "Technology",
        keywords: &[
            "artificial intelligence", "ai", "software", "cyber", "chip", "startup",
            "data breach", "app", "tech",
        ],
    },
    TopicRule {
        name: "Health",
        keywords: &["health", "hospital", "disease", "virus", "vaccine", "medical", "outbreak"],
    },
    TopicRule {
        name: "Climate",
        keywords: &[
            "climate", "storm", "hurricane", "flood", "wildfire", "earthquake", "heatwave",
            "emissions",
        ],
    },
    TopicRule {
        name: "Science",
        keywords: &["space", "nasa", "research", "study", "scientist", "astronomy"],
    },
    TopicRule {
        name: "Sports",
        keywords: &[
            "nba", "nfl", "mlb", "nhl", "soccer", "football", "tennis", "olympic", "tournament",
            "match",
        ],
    },
    TopicRule {
        name: "Culture",
        keywords: &["movie", "music", "tv", "celebrity", "festival", "book", "award", "art"],
    },
    TopicRule {
        name: "Crime",
        keywords: &[
            "police", "shooting", "killed", "arrest", "charged", "trial", "investigation",
            "crime",
        ],
    },
];

pub const URGENCY_RULES: &[UrgencyRule] = &[
    UrgencyRule { term: "breaking", weight: 6 },
    UrgencyRule { term: "urgent", weight: 5 },
    UrgencyRule { term: "live", weight: 4 },
    UrgencyRule { term: "alert", weight: 4 },
    UrgencyRule { term: "emergency", weight: 4 },
    UrgencyRule { term: "attack", weight: 4 },
    UrgencyRule { term: "killed", weight: 4 },
    UrgencyRule { term: "war", weight: 3 },
    UrgencyRule { term: "earthquake", weight: 4 },
    UrgencyRule { term: "wildfire", weight: 3 },
    UrgencyRule { term: "hurricane", weight: 3 },
    UrgencyRule { term: "evacuat", weight: 3 },
    UrgencyRule { term: "outbreak", weight: 3 },
    UrgencyRule { term: "explosion", weight: 3 },
    UrgencyRule { term: "hostage", weight: 3 },
    UrgencyRule { term: "ceasefire", weight: 2 },
];

pub const STOP_WORDS: [&str; 41] = [
    "about", "after", "again", "against", "among", "around", "because", "being", "before",
    "between", "could", "during", "first", "from", "have", "into", "just", "more", "most", "over",
    "said", "than", "that", "their", "there", "these", "they", "this", "those", "through",
    "under", "very", "were", "what", "when", "where", "which", "while", "will", "with", "would",
];

// Cyrillic, Hebrew, Arabic, Devanagari, Thai, Hangul Jamo, kana and CJK
static NON_LATIN_SCRIPT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"[\x{0400}-\x{04FF}\x{0590}-\x{05FF}\x{0600}-\x{06FF}\x{0900}-\x{097F}\x{0E00}-\x{0E7F}\x{1100}-\x{11FF}\x{3040}-\x{30FF}\x{3400}-\x{9FFF}]",
    )
    .expect("valid script range regex")
});

static TOKEN_SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("valid token regex"));

static STOP_WORD_SET: Lazy<HashSet<&'static str>> =
    Lazy::new(|| STOP_WORDS.iter().copied().collect());

/// Best topic for a story and how many of its keywords matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicMatch {
    pub topic: &'static str,
    pub score: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicGroup {
    pub topic: &'static str,
    pub items: Vec<Story>,
}

/// What a reading client shows for one aggregation result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Digest {
    pub generated_at: DateTime<Utc>,
    pub featured: Option<Story>,
    pub related: Vec<Story>,
    pub sections: Vec<TopicGroup>,
    pub errors: Vec<SourceError>,
}

fn story_text(story: &Story) -> String {
    format!("{} {}", story.title, story.tldr).to_lowercase()
}

fn is_latin_letter(c: char) -> bool {
    c.is_ascii_alphabetic() || ('\u{00C0}'..='\u{024F}').contains(&c)
}

/// Whether a title reads as English: no characters from non-Latin scripts,
/// and at least 70% of its Latin letters plain ASCII.
pub fn is_likely_english(title: &str) -> bool {
    let value = title.trim();
    if value.is_empty() || NON_LATIN_SCRIPT.is_match(value) {
        return false;
    }

    let letters = value.chars().filter(|c| is_latin_letter(*c)).count();
    let ascii = value.chars().filter(char::is_ascii_alphabetic).count();
    if letters == 0 || ascii == 0 {
        return false;
    }

    ascii as f64 / letters as f64 >= MIN_ENGLISH_RATIO
}

/// Bucketed freshness: 5 within the hour down to 0 after a day and a half.
pub fn recency_score(published_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> u32 {
    let Some(published_at) = published_at else {
        return 0;
    };

    let hours_old = ((now - published_at).num_milliseconds() as f64 / 3_600_000.0).max(0.0);
    match hours_old {
        h if h <= 1.0 => 5,
        h if h <= 3.0 => 4,
        h if h <= 8.0 => 3,
        h if h <= 18.0 => 2,
        h if h <= 36.0 => 1,
        _ => 0,
    }
}

pub fn urgency_score(story: &Story, now: DateTime<Utc>) -> u32 {
    let text = story_text(story);
    let keyword_weight: u32 = URGENCY_RULES
        .iter()
        .filter(|rule| text.contains(rule.term))
        .map(|rule| rule.weight)
        .sum();

    recency_score(story.published_at, now) + keyword_weight
}

/// Highest urgency, newer first on a tie, earliest in input order after that.
pub fn pick_top_by_urgency<'a>(stories: &[&'a Story], now: DateTime<Utc>) -> Option<&'a Story> {
    let mut best: Option<(&Story, (u32, i64))> = None;
    for &story in stories {
        let rank = (urgency_score(story, now), story.timestamp_millis());
        if best.map_or(true, |(_, top)| rank > top) {
            best = Some((story, rank));
        }
    }
    best.map(|(story, _)| story)
}

fn source_key(story: &Story) -> String {
    story.source.trim().to_uppercase()
}

/// Lead story: the always-featured source if present, else the most urgent
/// story from a prioritized source, else the most urgent story overall.
pub fn pick_featured(stories: &[Story], now: DateTime<Utc>) -> Option<&Story> {
    if let Some(lead) = stories.iter().find(|s| source_key(s) == FEATURED_SOURCE) {
        return Some(lead);
    }

    let prioritized: Vec<&Story> = stories
        .iter()
        .filter(|s| PRIORITY_SOURCES.contains(&source_key(s).as_str()))
        .collect();
    if !prioritized.is_empty() {
        return pick_top_by_urgency(&prioritized, now);
    }

    let all: Vec<&Story> = stories.iter().collect();
    pick_top_by_urgency(&all, now)
}

/// Counts keyword hits per topic over already lower-cased text.
pub fn classify_text(text: &str) -> TopicMatch {
    let mut best = TopicMatch {
        topic: GENERAL_TOPIC,
        score: 0,
    };

    for rule in TOPIC_RULES {
        let score = rule.keywords.iter().filter(|k| text.contains(*k)).count();
        if score > best.score {
            best = TopicMatch {
                topic: rule.name,
                score,
            };
        }
    }

    best
}

pub fn classify_topic(story: &Story) -> TopicMatch {
    classify_text(&story_text(story))
}

/// Partitions stories by topic in table order, `General` last.
pub fn group_by_topic(stories: &[Story]) -> Vec<TopicGroup> {
    let mut grouped: HashMap<&'static str, Vec<Story>> = HashMap::new();
    for story in stories {
        grouped
            .entry(classify_topic(story).topic)
            .or_default()
            .push(story.clone());
    }

    TOPIC_RULES
        .iter()
        .map(|rule| rule.name)
        .chain(std::iter::once(GENERAL_TOPIC))
        .filter_map(|topic| {
            grouped
                .remove(topic)
                .map(|items| TopicGroup { topic, items })
        })
        .collect()
}

/// Significant words: lower-cased, alphanumeric runs of four or more
/// characters that are not stop words. Duplicates are kept.
pub fn tokenize(text: &str) -> Vec<String> {
    TOKEN_SPLIT
        .split(&text.to_lowercase())
        .filter(|token| token.len() >= MIN_TOKEN_LEN && !STOP_WORD_SET.contains(token))
        .map(str::to_string)
        .collect()
}

/// How many of `left`'s tokens (with repeats) also occur in `right`.
pub fn overlap_count(left: &[String], right: &[String]) -> usize {
    let right: HashSet<&str> = right.iter().map(String::as_str).collect();
    left.iter().filter(|token| right.contains(token.as_str())).count()
}

/// Up to four stories from `pool` that look related to `anchor`.
///
/// Score: +2 for the same topic, +1 per shared token up to 4, +1 for the
/// same source. Candidates under 2 are dropped; the rest are ranked by score
/// then recency.
pub fn pick_related(anchor: &Story, pool: &[Story]) -> Vec<Story> {
    let anchor_topic = classify_topic(anchor).topic;
    let anchor_tokens = tokenize(&format!("{} {}", anchor.title, anchor.tldr));

    let mut ranked: Vec<(usize, i64, &Story)> = pool
        .iter()
        .filter(|story| story.id != anchor.id)
        .map(|story| {
            let tokens = tokenize(&format!("{} {}", story.title, story.tldr));
            let mut score = overlap_count(&anchor_tokens, &tokens).min(MAX_SHARED_TOKENS);
            if classify_topic(story).topic == anchor_topic {
                score += 2;
            }
            if story.source == anchor.source {
                score += 1;
            }
            (score, story.timestamp_millis(), story)
        })
        .filter(|(score, _, _)| *score >= MIN_RELATED_SCORE)
        .collect();

    ranked.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
    ranked
        .into_iter()
        .take(MAX_RELATED)
        .map(|(_, _, story)| story.clone())
        .collect()
}

/// Runs the whole presentation pipeline over one aggregation result.
pub fn build_digest(result: &AggregationResult, now: DateTime<Utc>) -> Digest {
    let readable: Vec<Story> = result
        .items
        .iter()
        .filter(|story| is_likely_english(&story.title))
        .cloned()
        .collect();

    let featured = pick_featured(&readable, now).cloned();
    let rest: Vec<Story> = match &featured {
        Some(lead) => readable.into_iter().filter(|s| s.id != lead.id).collect(),
        None => readable,
    };
    let related = featured
        .as_ref()
        .map(|lead| pick_related(lead, &rest))
        .unwrap_or_default();

    Digest {
        generated_at: result.generated_at,
        featured,
        related,
        sections: group_by_topic(&rest),
        errors: result.errors.clone(),
    }
}
