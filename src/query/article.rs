//! Article citations: extraction from free text and strict label matching.

use once_cell::sync::Lazy;
use regex::Regex;

/// "artikel 5.1", "art. 5:1", "artikel 8:41a", "artikel 3"
static QUERY_REF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bart(?:ikel|\.)?\s*(\d+[a-z]?(?:\s*[:.]\s*\d+[a-z]?)*)")
        .expect("article reference pattern is valid")
});

/// Article number following the word "Artikel" in a stored label.
static LABEL_REF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bartikel\s+(\d+[a-z]?(?:[:.]\d+[a-z]?)*)")
        .expect("label article pattern is valid")
});

/// A normalized article number, e.g. "5:1" or "8:41a".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArticleRef(String);

impl ArticleRef {
    /// Normalize a raw article number: "." and ":" both become ":",
    /// whitespace is dropped and letters are lowercased.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| if c == '.' { ':' } else { c.to_ascii_lowercase() })
            .collect();
        let normalized = normalized.trim_matches(':').to_string();
        if normalized.is_empty() || !normalized.starts_with(|c: char| c.is_ascii_digit()) {
            return None;
        }
        Some(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The label fragment the datastore is searched for.
    pub fn label_pattern(&self) -> String {
        format!("Artikel {}", self.0)
    }
}

impl std::fmt::Display for ArticleRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// First explicit article citation in a question.
pub fn extract_article_ref(question: &str) -> Option<ArticleRef> {
    QUERY_REF_RE
        .captures(question)
        .and_then(|caps| caps.get(1))
        .and_then(|m| ArticleRef::parse(m.as_str()))
}

/// Strict match: the article number in `label` must equal `wanted` exactly,
/// so "Artikel 5:10" never satisfies a request for 5:1.
pub fn label_matches_article(label: &str, wanted: &ArticleRef) -> bool {
    LABEL_REF_RE
        .captures_iter(label)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| ArticleRef::parse(m.as_str()))
        .any(|found| &found == wanted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(s: &str) -> ArticleRef {
        ArticleRef::parse(s).unwrap()
    }

    #[test]
    fn test_dot_and_colon_normalize_identically() {
        let dotted = extract_article_ref("Wat staat er in artikel 5.1?").unwrap();
        let coloned = extract_article_ref("wat staat er in artikel 5:1").unwrap();
        assert_eq!(dotted, coloned);
        assert_eq!(dotted.as_str(), "5:1");
    }

    #[test]
    fn test_extract_abbreviated_and_spaced() {
        assert_eq!(extract_article_ref("zie art. 8:41a Awb").unwrap().as_str(), "8:41a");
        assert_eq!(extract_article_ref("ARTIKEL 3 : 4").unwrap().as_str(), "3:4");
        assert_eq!(extract_article_ref("artikel 12").unwrap().as_str(), "12");
    }

    #[test]
    fn test_sentence_final_dot_is_not_part_of_ref() {
        assert_eq!(extract_article_ref("Lees artikel 7.").unwrap().as_str(), "7");
    }

    #[test]
    fn test_no_ref_in_plain_question() {
        assert!(extract_article_ref("Wat is een besluit?").is_none());
        assert!(extract_article_ref("artikelen over bezwaar").is_none());
    }

    #[test]
    fn test_strict_filter_rejects_near_misses() {
        let wanted = r("5:1");
        assert!(label_matches_article("Artikel 5:1", &wanted));
        assert!(label_matches_article("Awb — Artikel 5:1", &wanted));
        assert!(!label_matches_article("Artikel 5:10", &wanted));
        assert!(!label_matches_article("Artikel 15:10", &wanted));
        assert!(!label_matches_article("Artikel 15:1", &wanted));
    }

    #[test]
    fn test_strict_filter_handles_letter_suffix() {
        assert!(label_matches_article("Artikel 8:41a", &r("8:41a")));
        assert!(!label_matches_article("Artikel 8:41a", &r("8:41")));
    }

    #[test]
    fn test_label_pattern() {
        assert_eq!(r("1.3").label_pattern(), "Artikel 1:3");
    }
}
