use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use scraper::Html;
use std::collections::HashSet;
use std::panic;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref WORD: Regex = Regex::new(r"[a-z0-9-]+").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
}

/// Length of the pseudo-title built from an answer body.
pub const PSEUDO_TITLE_CHARS: usize = 60;

pub type WordSet = HashSet<String>;

#[derive(Debug, Error)]
#[error("malformed match input: {0}")]
pub struct MalformedInput(pub String);

fn normalize(text: &str) -> String {
    text.nfkc().collect::<String>().to_lowercase()
}

/// Stem a single query word with the same normalization applied to documents.
pub fn stem(word: &str) -> String {
    STEMMER.stem(&normalize(word)).into_owned()
}

/// Lower-cased, stemmed words of `text`. Hyphenated tokens contribute the whole token and each part.
pub fn word_set(text: &str) -> WordSet {
    let normalized = normalize(text);
    let mut words = WordSet::new();
    for mat in WORD.find_iter(&normalized) {
        let token = mat.as_str();
        if token.trim_matches('-').is_empty() {
            continue;
        }
        words.insert(STEMMER.stem(token).into_owned());
        if token.contains('-') {
            for part in token.split('-').filter(|p| !p.is_empty()) {
                words.insert(STEMMER.stem(part).into_owned());
            }
        }
    }
    words
}

/// Plain text of an HTML fragment, text nodes joined by spaces.
///
/// The HTML parser is third-party code fed with arbitrary dump content; a panic inside it
/// is reported as [`MalformedInput`] instead of unwinding through the pass.
pub fn strip_html(html: &str) -> Result<String, MalformedInput> {
    if !html.contains('<') && !html.contains('&') {
        return Ok(html.to_string());
    }
    panic::catch_unwind(|| {
        let fragment = Html::parse_fragment(html);
        let text: Vec<&str> = fragment.root_element().text().collect();
        text.join(" ")
    })
    .map_err(|payload| {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "html parser panicked".to_string());
        MalformedInput(msg)
    })
}

/// First [`PSEUDO_TITLE_CHARS`] characters of `text`, with `...` appended when cut.
pub fn pseudo_title(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() > PSEUDO_TITLE_CHARS {
        let head: String = trimmed.chars().take(PSEUDO_TITLE_CHARS).collect();
        format!("{head}...")
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_share_a_stem() {
        let words = word_set("Questions about questioning");
        assert!(words.contains(&stem("question")));
        assert_eq!(stem("Questions"), stem("question"));
    }

    #[test]
    fn hyphenated_tokens_keep_whole_and_parts() {
        let words = word_set("The best site-promotion");
        assert!(words.contains(&stem("site-promotion")));
        assert!(words.contains(&stem("site")));
        assert!(words.contains(&stem("promotion")));
        assert!(!words.contains("-"));
    }

    #[test]
    fn tag_markup_is_split() {
        let words = word_set("<faq><site-promotion>|discussion");
        assert!(words.contains("faq"));
        assert!(words.contains(&stem("discussion")));
    }

    #[test]
    fn html_is_stripped() {
        let text = strip_html("<p>Hello <b>world</b></p><p>again &amp; again</p>").unwrap();
        let words = word_set(&text);
        assert!(words.contains("hello"));
        assert!(words.contains("world"));
        assert!(!words.contains("p"));
        assert!(!words.contains("b"));
    }

    #[test]
    fn pseudo_title_truncates() {
        let long = "x".repeat(80);
        let t = pseudo_title(&long);
        assert_eq!(t.chars().count(), PSEUDO_TITLE_CHARS + 3);
        assert!(t.ends_with("..."));
        assert_eq!(pseudo_title("short body"), "short body");
    }
}
