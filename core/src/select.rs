use crate::dump::RecordStream;
use crate::error::Result;
use crate::matcher::Matcher;
use crate::model::{DocId, Record};
use crate::progress::{Progress, ProgressFn, PROGRESS_INTERVAL};

/// Ids of questions accepted by `include`, in stream order.
pub fn question_ids_by_tag<S: RecordStream>(
    mut posts: S,
    include: &Matcher,
    progress: ProgressFn<'_>,
) -> Result<Vec<DocId>> {
    let mut ids = Vec::new();
    let mut read = 0u64;
    while let Some(record) = posts.next() {
        let record = record?;
        read += 1;
        if let Record::Post(post) = record {
            if post.is_question() && include.matches(&post) {
                ids.push(post.id);
            }
        }
        if read % PROGRESS_INTERVAL == 0 {
            progress(&Progress {
                records_read: read,
                completed: ids.len() as u64,
                percent: posts.percent_read(),
                phase: "Selecting questions by tag",
            });
        }
    }
    tracing::info!(posts_read = read, selected = ids.len(), skipped_rows = posts.skipped_rows(), "question selection complete");
    Ok(ids)
}
