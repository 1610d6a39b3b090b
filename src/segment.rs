//! Article segmentation of raw law text (XML or HTML) into labeled segments.
//!
//! Structured `<artikel>` elements are preferred. Documents without them
//! are flattened to lines and split on `Artikel <nr>` headings.

use std::borrow::Cow;
use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::query::ArticleRef;

/// Segments shorter than this are navigation or heading noise.
pub const MIN_ARTICLE_CHARS: usize = 120;

static ARTIKEL_ELEMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<artikel\b([^>]*)>(.*?)</artikel\s*>").expect("artikel pattern is valid")
});

static NR_ELEMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<nr\b[^>]*>(.*?)</nr\s*>").expect("nr pattern is valid"));

static LABEL_ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\blabel\s*=\s*"(?:artikel\s+)?([^"]+)""#).expect("label pattern is valid")
});

static HEADING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*artikel\s+(\d+[a-z]?(?:[:.]\d+[a-z]?)*)\b")
        .expect("heading pattern is valid")
});

/// Elements whose boundaries become line breaks when flattening.
static BLOCK_TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<\s*(?:br|/?p|/?div|/?h[1-6]|/?li|/?tr|/?al|/?kop|/?lid|/?section)\b[^>]*>")
        .expect("block tag pattern is valid")
});

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag pattern is valid"));

static SCRIPT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(?:script|style)\s*>")
        .expect("script pattern is valid")
});

#[derive(Debug, Error, PartialEq)]
pub enum SegmentError {
    #[error("document is empty")]
    EmptyInput,
    #[error("no articles found in document")]
    NoArticlesFound,
}

/// One article: display label plus cleaned text.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleSegment {
    pub label: String,
    pub text: String,
}

/// Split `raw` into one segment per article, in document order.
pub fn segment_articles(raw: &str, label_prefix: &str) -> Result<Vec<ArticleSegment>, SegmentError> {
    if raw.trim().is_empty() {
        return Err(SegmentError::EmptyInput);
    }

    let raw = SCRIPT_RE.replace_all(raw, " ");
    let mut pieces = structured_pass(&raw);
    if pieces.is_empty() {
        tracing::debug!("No <artikel> elements, falling back to heading split");
        pieces = heading_pass(&raw);
    }

    let mut seen = HashSet::new();
    let segments: Vec<ArticleSegment> = pieces
        .into_iter()
        .filter(|(_, text)| text.chars().count() >= MIN_ARTICLE_CHARS)
        .filter(|(nr, _)| seen.insert(nr.clone()))
        .map(|(nr, text)| ArticleSegment {
            label: format!("{} — Artikel {}", label_prefix.trim(), nr),
            text,
        })
        .collect();

    if segments.is_empty() {
        return Err(SegmentError::NoArticlesFound);
    }
    Ok(segments)
}

/// `(article number, cleaned text)` per `<artikel>` element.
fn structured_pass(raw: &str) -> Vec<(ArticleRef, String)> {
    ARTIKEL_ELEMENT_RE
        .captures_iter(raw)
        .filter_map(|caps| {
            let attrs = caps.get(1).map_or("", |m| m.as_str());
            let body = caps.get(2).map_or("", |m| m.as_str());
            let nr = NR_ELEMENT_RE
                .captures(body)
                .and_then(|c| c.get(1))
                .map(|m| clean_text(m.as_str()))
                .and_then(|s| ArticleRef::parse(&s))
                .or_else(|| {
                    LABEL_ATTR_RE
                        .captures(attrs)
                        .and_then(|c| c.get(1))
                        .and_then(|m| ArticleRef::parse(m.as_str()))
                })?;
            let flattened = BLOCK_TAG_RE.replace_all(body, " ");
            Some((nr, clean_text(&flattened)))
        })
        .collect()
}

/// Split flattened text on lines that start with an article heading.
fn heading_pass(raw: &str) -> Vec<(ArticleRef, String)> {
    let flattened = BLOCK_TAG_RE.replace_all(raw, "\n");
    let stripped = TAG_RE.replace_all(&flattened, " ");
    let text = decode_entities(&stripped);

    let mut pieces = Vec::new();
    let mut current: Option<(ArticleRef, Vec<&str>)> = None;

    for line in text.lines() {
        let heading = HEADING_RE
            .captures(line)
            .and_then(|c| c.get(1))
            .and_then(|m| ArticleRef::parse(m.as_str()));
        match heading {
            Some(nr) => {
                if let Some((prev, lines)) = current.take() {
                    pieces.push((prev, collapse_whitespace(&lines.join(" "))));
                }
                current = Some((nr, vec![line]));
            }
            None => {
                if let Some((_, lines)) = current.as_mut() {
                    lines.push(line);
                }
            }
        }
    }
    if let Some((nr, lines)) = current {
        pieces.push((nr, collapse_whitespace(&lines.join(" "))));
    }
    pieces
}

/// Strip tags, decode entities, collapse whitespace.
fn clean_text(fragment: &str) -> String {
    let stripped = TAG_RE.replace_all(fragment, " ");
    collapse_whitespace(&decode_entities(&stripped))
}

/// XML entities plus `&nbsp;`, which HTML sources use freely. Malformed
/// entities leave the text as is.
fn decode_entities(text: &str) -> String {
    let text: Cow<str> = if text.contains("&nbsp;") {
        Cow::Owned(text.replace("&nbsp;", " "))
    } else {
        Cow::Borrowed(text)
    };
    let decoded = quick_xml::escape::unescape(&text).map(Cow::into_owned).ok();
    decoded.unwrap_or_else(|| text.into_owned())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
