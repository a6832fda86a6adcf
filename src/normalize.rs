//! Turns one raw feed item, in whichever dialect it arrived, into a [`Story`].

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use url::Url;

use crate::story::Story;
use crate::xml::{XmlValue, TEXT_KEY};

const SUMMARY_WORDS: usize = 18;
const TITLE_FALLBACK_WORDS: usize = 14;
const MIN_SENTENCE_CHARS: usize = 30;
const ELLIPSIS: &str = "...";
const NO_SUMMARY: &str = "No summary available.";
const FINGERPRINT_LEN: usize = 16;

/// Summary fields in priority order.
const SUMMARY_FIELDS: [&str; 4] = ["description", "summary", "content:encoded", "content"];
/// Date fields in priority order.
const DATE_FIELDS: [&str; 4] = ["pubDate", "published", "updated", "dc:date"];
/// Zone-less timestamp layouts; `%.f` also matches a missing fraction.
const NAIVE_DATE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const TRACKING_PREFIXES: [&str; 1] = ["utm_"];
const TRACKING_PARAMS: [&str; 2] = ["gclid", "fbclid"];

/// Element names that may carry an image.
const IMAGE_NODES: [&str; 6] = [
    "media:content",
    "media:thumbnail",
    "enclosure",
    "itunes:image",
    "image",
    "thumbnail",
];
/// Nodes that are images by definition even without a declared type.
const IMAGE_ONLY_NODES: [&str; 4] = ["media:thumbnail", "itunes:image", "image", "thumbnail"];
/// How many levels below the item the image search descends.
const IMAGE_SEARCH_DEPTH: usize = 3;

static RE_STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style.*?</style>").expect("valid style regex"));
static RE_SCRIPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script.*?</script>").expect("valid script regex"));
static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid tag regex"));
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));
static RE_SENTENCE_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]\s+").expect("valid sentence regex"));
static RE_IMG_SRC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<img[^>]+src\s*=\s*["']([^"']+)["']"#).expect("valid img regex")
});
static RE_IMAGE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\.(avif|bmp|gif|jpe?g|png|svg|webp)([?#]|$))|/images?/|/img/")
        .expect("valid image url regex")
});

/// Builds a story from one raw item, or `None` when it has no usable title or link.
pub fn normalize_item(item: &XmlValue, source: &str) -> Option<Story> {
    let title = clean_text(&text_value(item.get("title")));
    let link = normalize_url(&extract_link(item));
    if title.is_empty() || link.is_empty() {
        return None;
    }

    let raw_summary = raw_summary(item);

    Some(Story {
        id: fingerprint(&title, &link),
        source: source.to_string(),
        published_at: extract_date(item),
        tldr: summarize(&raw_summary, item),
        image: extract_image(item, &raw_summary),
        title,
        link,
    })
}

/// Reads text out of a node that may be a string, a list of candidates, or a
/// structured node carrying `#text` or an `href`.
pub fn text_value(value: Option<&XmlValue>) -> String {
    match value {
        Some(XmlValue::Text(text)) => text.clone(),
        Some(XmlValue::List(items)) => items
            .iter()
            .map(|item| text_value(Some(item)))
            .find(|text| !text.is_empty())
            .unwrap_or_default(),
        Some(node @ XmlValue::Map(_)) => node
            .get(TEXT_KEY)
            .and_then(XmlValue::as_text)
            .or_else(|| node.attr("href"))
            .or_else(|| node.get("href").and_then(XmlValue::as_text))
            .unwrap_or_default()
            .to_string(),
        None => String::new(),
    }
}

/// Strips markup, decodes entities and collapses whitespace.
pub fn clean_text(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }

    let stripped = RE_STYLE.replace_all(input, " ");
    let stripped = RE_SCRIPT.replace_all(&stripped, " ");
    let stripped = RE_TAGS.replace_all(&stripped, " ");
    let decoded = html_escape::decode_html_entities(&stripped);

    RE_WS.replace_all(&decoded, " ").trim().to_string()
}

/// First sentence long enough to be informative, else the first sentence.
pub fn first_sentence(text: &str) -> &str {
    let mut pieces = Vec::new();
    let mut start = 0;
    for m in RE_SENTENCE_BREAK.find_iter(text) {
        // the punctuation mark is a single byte
        pieces.push(&text[start..m.start() + 1]);
        start = m.end();
    }
    pieces.push(&text[start..]);

    pieces
        .iter()
        .find(|piece| piece.chars().count() > MIN_SENTENCE_CHARS)
        .or_else(|| pieces.first().filter(|piece| !piece.is_empty()))
        .copied()
        .unwrap_or(text)
}

/// Keeps at most `max_words` words, appending an ellipsis when anything was cut.
pub fn limit_words(input: &str, max_words: usize) -> String {
    let words: Vec<&str> = input.split_whitespace().collect();
    if words.len() <= max_words {
        return input.to_string();
    }
    format!("{}{}", words[..max_words].join(" "), ELLIPSIS)
}

fn raw_summary(item: &XmlValue) -> String {
    SUMMARY_FIELDS
        .iter()
        .map(|field| text_value(item.get(field)))
        .find(|text| !text.is_empty())
        .unwrap_or_default()
}

fn summarize(raw_summary: &str, item: &XmlValue) -> String {
    let cleaned = clean_text(raw_summary);
    if !cleaned.is_empty() {
        return limit_words(first_sentence(&cleaned), SUMMARY_WORDS);
    }

    let fallback = clean_text(&text_value(item.get("title")));
    if fallback.is_empty() {
        limit_words(NO_SUMMARY, TITLE_FALLBACK_WORDS)
    } else {
        limit_words(&fallback, TITLE_FALLBACK_WORDS)
    }
}

/// The item's link: a plain string, or the first `href` found among link nodes.
pub fn extract_link(item: &XmlValue) -> String {
    let Some(link) = item.get("link") else {
        return String::new();
    };

    for candidate in link.items() {
        match candidate {
            XmlValue::Text(text) => return text.clone(),
            XmlValue::Map(_) => {
                let href = candidate
                    .attr("href")
                    .or_else(|| candidate.get("href").and_then(XmlValue::as_text));
                if let Some(href) = href {
                    return href.to_string();
                }
            }
            XmlValue::List(_) => {}
        }
    }

    String::new()
}

pub fn extract_date(item: &XmlValue) -> Option<DateTime<Utc>> {
    let raw = DATE_FIELDS
        .iter()
        .map(|field| text_value(item.get(field)))
        .find(|text| !text.is_empty())?;
    parse_date(&raw)
}

/// Parses the date formats feeds use in practice. Zone-less values are taken as UTC.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    // A trailing `Z` on an otherwise zone-less value is already UTC
    let naive_raw = raw
        .strip_suffix('Z')
        .or_else(|| raw.strip_suffix('z'))
        .unwrap_or(raw);
    for format in NAIVE_DATE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(naive_raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn is_tracking_param(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    TRACKING_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
        || TRACKING_PARAMS.contains(&name.as_str())
}

/// Canonical form of an absolute URL with tracking parameters removed.
///
/// Other parameters keep their order. Input that does not parse as an
/// absolute URL comes back trimmed and otherwise untouched.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut url) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };

    if url.query().is_some() {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(name, _)| !is_tracking_param(name))
            .map(|(name, value)| (name.into_owned(), value.into_owned()))
            .collect();

        url.set_query(None);
        if !kept.is_empty() {
            url.query_pairs_mut().extend_pairs(kept.iter());
        }
    }

    url.to_string()
}

/// Stable short id for a title/link pair.
pub fn fingerprint(title: &str, link: &str) -> String {
    let digest = Sha256::digest(format!("{title}::{link}").as_bytes());
    let mut hex = format!("{digest:x}");
    hex.truncate(FINGERPRINT_LEN);
    hex
}

struct ImageCandidate {
    url: String,
    mime: Option<String>,
    node: &'static str,
}

impl ImageCandidate {
    fn is_preferred(&self) -> bool {
        let typed_image = self
            .mime
            .as_deref()
            .is_some_and(|mime| mime.to_ascii_lowercase().starts_with("image/"));
        typed_image || RE_IMAGE_URL.is_match(&self.url)
    }

    fn is_acceptable(&self) -> bool {
        self.mime.is_none() && IMAGE_ONLY_NODES.contains(&self.node)
    }
}

fn node_url(node: &XmlValue) -> Option<&str> {
    let url = match node {
        XmlValue::Text(text) => Some(text.as_str()),
        XmlValue::Map(_) => node
            .attr("url")
            .or_else(|| node.attr("href"))
            .or_else(|| node.get("url").and_then(XmlValue::as_text))
            .or_else(|| node.get(TEXT_KEY).and_then(XmlValue::as_text)),
        XmlValue::List(_) => None,
    };
    url.map(str::trim).filter(|url| !url.is_empty())
}

fn node_mime(node: &XmlValue) -> Option<String> {
    if let Some(mime) = node.attr("type") {
        return Some(mime.to_string());
    }
    // Media RSS says `medium="image"` instead of a MIME type
    node.attr("medium").map(|medium| format!("{medium}/"))
}

fn collect_image_candidates(node: &XmlValue, depth: usize, out: &mut Vec<ImageCandidate>) {
    if depth > IMAGE_SEARCH_DEPTH {
        return;
    }

    for name in IMAGE_NODES {
        let Some(value) = node.get(name) else {
            continue;
        };
        for candidate in value.items() {
            if let Some(url) = node_url(candidate) {
                out.push(ImageCandidate {
                    url: url.to_string(),
                    mime: node_mime(candidate),
                    node: name,
                });
            }
        }
    }

    for (_, child) in node.entries() {
        for nested in child.items() {
            if matches!(nested, XmlValue::Map(_)) {
                collect_image_candidates(nested, depth + 1, out);
            }
        }
    }
}

fn absolute_image_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let candidate = match raw.strip_prefix("//") {
        Some(rest) => format!("https://{rest}"),
        None => raw.to_string(),
    };

    let normalized = normalize_url(&candidate);
    match Url::parse(&normalized) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Some(normalized),
        _ => None,
    }
}

/// Finds an image for the item: media nodes first, then the first `<img>` in
/// the summary markup.
///
/// The tree search is bounded to [`IMAGE_SEARCH_DEPTH`] levels below the item.
pub fn extract_image(item: &XmlValue, raw_summary: &str) -> Option<String> {
    let mut candidates = Vec::new();
    collect_image_candidates(item, 0, &mut candidates);

    let from_nodes = candidates
        .iter()
        .filter(|c| c.is_preferred())
        .chain(candidates.iter().filter(|c| c.is_acceptable()))
        .find_map(|c| absolute_image_url(&c.url));
    if from_nodes.is_some() {
        return from_nodes;
    }

    RE_IMG_SRC
        .captures_iter(raw_summary)
        .filter_map(|caps| caps.get(1))
        .find_map(|src| absolute_image_url(src.as_str()))
}
