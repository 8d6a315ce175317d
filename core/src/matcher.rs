use crate::model::{DocId, Post};
use crate::tokenizer::{pseudo_title, stem, strip_html, word_set, MalformedInput, WordSet};
use std::collections::HashSet;

/// Stemmed word matcher over a post's title, tags and (for exclusion) body.
///
/// `when_empty_accept` doubles as the mode switch: `true` is an include filter,
/// `false` an exclude filter that also inspects bodies and answer pseudo-titles.
#[derive(Debug, Clone)]
pub struct Matcher {
    query: HashSet<String>,
    when_empty_accept: bool,
}

impl Matcher {
    pub fn new(query_words: &str, when_empty_accept: bool) -> Self {
        let query = query_words
            .split_whitespace()
            .map(stem)
            .filter(|w| !w.is_empty())
            .collect();
        Self { query, when_empty_accept }
    }

    pub fn include(query_words: &str) -> Self {
        Self::new(query_words, true)
    }

    pub fn exclude(query_words: &str) -> Self {
        Self::new(query_words, false)
    }

    pub fn is_empty(&self) -> bool {
        self.query.is_empty()
    }

    fn is_exclusion(&self) -> bool {
        !self.when_empty_accept
    }

    /// Whether any query word occurs in the post.
    ///
    /// Text processing failures keep the post in the working set: an include filter
    /// accepts it and an exclude filter lets it through.
    pub fn matches(&self, post: &Post) -> bool {
        if self.query.is_empty() {
            return self.when_empty_accept;
        }
        self.settle(post.id, self.try_matches(post))
    }

    fn settle(&self, post_id: DocId, outcome: Result<bool, MalformedInput>) -> bool {
        match outcome {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(post_id, error = %e, exclusion = self.is_exclusion(), "text processing failed, keeping post");
                self.when_empty_accept
            }
        }
    }

    fn hits(&self, words: &WordSet) -> bool {
        self.query.iter().any(|q| words.contains(q))
    }

    fn try_matches(&self, post: &Post) -> Result<bool, MalformedInput> {
        let title = match post.title.as_deref().filter(|t| !t.is_empty()) {
            Some(t) => Some(strip_html(t)?),
            None if self.is_exclusion() => match post.body.as_deref() {
                Some(body) => Some(pseudo_title(&strip_html(body)?)),
                None => None,
            },
            None => None,
        };
        if let Some(title) = title {
            if self.hits(&word_set(&title)) {
                return Ok(true);
            }
        }
        if let Some(tags) = post.tags.as_deref() {
            if self.hits(&word_set(tags)) {
                return Ok(true);
            }
        }
        if self.is_exclusion() {
            if let Some(body) = post.body.as_deref() {
                if self.hits(&word_set(&strip_html(body)?)) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

/// Closure form of [`Matcher`].
pub fn make_matcher(query_words: &str, when_empty_accept: bool) -> impl Fn(&Post) -> bool {
    let matcher = Matcher::new(query_words, when_empty_accept);
    move |post| matcher.matches(post)
}
