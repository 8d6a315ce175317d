//! Post-set resolution: which posts end up in the index.
//!
//! Two passes. The link pass pulls every post linked from a seed question into the set
//! as if it were a seed itself. The post pass then retracts questions that match the
//! exclude filter and admits answers whose parent is still in the extended set.
//!
//! The post pass mutates the sets it reads while it walks the stream, so its result
//! depends on record order: an answer visited before its parent question is rejected
//! stays admitted. The pass must stay single-threaded and in stream order.

use crate::dump::RecordStream;
use crate::error::Result;
use crate::matcher::Matcher;
use crate::model::{IdSet, Record};
use crate::progress::{Progress, ProgressFn, PROGRESS_INTERVAL};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostSet {
    /// Every post to index: questions, admitted answers and linked posts.
    pub post_ids: IdSet,
    /// Seed questions plus posts one link away from a seed. Linked posts are added
    /// whether or not they are questions.
    pub extended_question_ids: IdSet,
    pub admitted_answers: usize,
}

impl PostSet {
    pub fn from_seed(seed: &IdSet) -> Self {
        Self { post_ids: seed.clone(), extended_question_ids: seed.clone(), admitted_answers: 0 }
    }
}

/// Link pass. Membership is checked against `seed`, never against ids added by this pass,
/// so expansion is exactly one hop and repeating it is a no-op.
pub fn expand_links<S: RecordStream>(
    mut links: S,
    seed: &IdSet,
    set: &mut PostSet,
    progress: ProgressFn<'_>,
) -> Result<()> {
    let mut read = 0u64;
    let mut linked = 0u64;
    while let Some(record) = links.next() {
        let record = record?;
        read += 1;
        if let Record::PostLink(link) = record {
            if seed.contains(&link.post_id) {
                set.post_ids.insert(link.related_post_id);
                set.extended_question_ids.insert(link.related_post_id);
                linked += 1;
            }
            if seed.contains(&link.related_post_id) {
                set.post_ids.insert(link.post_id);
                set.extended_question_ids.insert(link.post_id);
                linked += 1;
            }
        }
        if read % PROGRESS_INTERVAL == 0 {
            progress(&Progress {
                records_read: read,
                completed: linked,
                percent: links.percent_read(),
                phase: "Expanding post links",
            });
        }
    }
    tracing::info!(
        links_read = read,
        linked,
        extended = set.extended_question_ids.len(),
        skipped_rows = links.skipped_rows(),
        "link expansion complete"
    );
    Ok(())
}

/// Post pass: late rejection of excluded questions and admission of answers.
///
/// Already admitted answers are not retracted when their parent is rejected later in
/// the stream.
pub fn classify_posts<S: RecordStream>(
    mut posts: S,
    exclude: &Matcher,
    set: &mut PostSet,
    progress: ProgressFn<'_>,
) -> Result<()> {
    let mut read = 0u64;
    let mut rejected = 0u64;
    while let Some(record) = posts.next() {
        let record = record?;
        read += 1;
        if let Record::Post(post) = record {
            if post.is_question() {
                if set.extended_question_ids.contains(&post.id) && exclude.matches(&post) {
                    set.extended_question_ids.remove(&post.id);
                    set.post_ids.remove(&post.id);
                    rejected += 1;
                }
            } else if post.is_answer() {
                let parent_wanted = post.parent_id.is_some_and(|p| set.extended_question_ids.contains(&p));
                if parent_wanted && !exclude.matches(&post) {
                    set.post_ids.insert(post.id);
                    set.admitted_answers += 1;
                }
            }
        }
        if read % PROGRESS_INTERVAL == 0 {
            progress(&Progress {
                records_read: read,
                completed: set.admitted_answers as u64,
                percent: posts.percent_read(),
                phase: "Classifying posts",
            });
        }
    }
    tracing::info!(
        posts_read = read,
        rejected_questions = rejected,
        admitted_answers = set.admitted_answers,
        post_ids = set.post_ids.len(),
        skipped_rows = posts.skipped_rows(),
        "post classification complete"
    );
    Ok(())
}

/// Both passes: links first, then posts.
pub fn resolve_post_set<L: RecordStream, P: RecordStream>(
    seed: &IdSet,
    links: L,
    posts: P,
    exclude: &Matcher,
    progress: ProgressFn<'_>,
) -> Result<PostSet> {
    let mut set = PostSet::from_seed(seed);
    expand_links(links, seed, &mut set, &mut *progress)?;
    classify_posts(posts, exclude, &mut set, progress)?;
    Ok(set)
}
