//! Query normalization and routing: article citations and document detection.

pub mod article;
pub mod detect;

pub use article::{extract_article_ref, label_matches_article, ArticleRef};
pub use detect::{detect_document, Detection, DetectionTable};

/// Lowercase, drop punctuation other than article separators, collapse whitespace.
pub fn normalize_query(input: &str) -> String {
    input
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == ':' || c == '.' {
                c
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .map(|w| w.trim_end_matches('.'))
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Alphanumeric words of a normalized string.
pub fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty())
}

/// Questions asking what a term means ("wat is een besluit?").
pub fn is_definition_question(normalized: &str) -> bool {
    const PREFIXES: [&str; 5] = [
        "wat is ",
        "wat zijn ",
        "wat wordt verstaan",
        "wat betekent ",
        "wat houdt ",
    ];
    PREFIXES.iter().any(|p| normalized.starts_with(p))
        || normalized.contains("definitie")
        || normalized.contains("betekenis van")
        || normalized.contains("wordt verstaan onder")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_and_lowercases() {
        assert_eq!(normalize_query("  Wat is een BESLUIT?  "), "wat is een besluit");
        assert_eq!(normalize_query("Artikel 5.1, Awb!"), "artikel 5.1 awb");
        assert_eq!(normalize_query("artikel 5:1."), "artikel 5:1");
    }

    #[test]
    fn test_definition_question_detection() {
        assert!(is_definition_question("wat is een besluit"));
        assert!(is_definition_question("geef de definitie van belanghebbende"));
        assert!(is_definition_question("wat wordt verstaan onder een aanvraag"));
        assert!(!is_definition_question("hoe lang is de bezwaartermijn"));
    }

    #[test]
    fn test_words_split_on_punctuation() {
        let w: Vec<&str> = words("awb: artikel 1:3").collect();
        assert_eq!(w, vec!["awb", "artikel", "1", "3"]);
    }
}
