//! Filtered, enriched writes into the sink.

use crate::dump::RecordStream;
use crate::error::Result;
use crate::model::{DocId, IdSet, Kind, Record, VoteTotals};
use crate::progress::{percent_of, Progress, ProgressFn, PROGRESS_INTERVAL};
use crate::sink::writer::log_failures;
use crate::sink::{BoundedWriter, SearchQuery, Sink};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub index_prefix: String,
    /// Sink writes in flight at once.
    pub write_concurrency: usize,
    /// Most answers copied from a single question.
    pub answer_page_size: usize,
    /// Question ids handled before waiting for their writes.
    pub extend_batch_size: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self { index_prefix: "stackset_".into(), write_concurrency: 20, answer_page_size: 1000, extend_batch_size: 20 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub kind: Kind,
    pub index: String,
    pub read: u64,
    /// Dump rows that could not be read as a record.
    pub skipped_rows: u64,
    pub written: usize,
    pub skipped_invalid: usize,
    pub failed: usize,
}

/// Whether a record of `kind` belongs in the index, given the ids of interest.
fn admit(record: &Record, ids: &IdSet) -> bool {
    match record {
        Record::Post(p) => ids.contains(&p.id),
        Record::Comment(c) => ids.contains(&c.post_id),
        Record::PostLink(l) => ids.contains(&l.post_id) || ids.contains(&l.related_post_id),
        Record::User(u) => u.id >= 0 && ids.contains(&u.id),
        Record::Vote(_) => false,
    }
}

/// Document for an admitted record. Posts get `VoteCount`; owners and commenters are
/// recorded in `users`.
fn enrich(record: &Record, users: &mut IdSet, votes: Option<&VoteTotals>) -> Result<Value> {
    let mut doc = record.to_document()?;
    match record {
        Record::Post(p) => {
            let score = votes.and_then(|v| v.get(&p.id)).copied().unwrap_or(0);
            doc["VoteCount"] = Value::from(score);
            if let Some(owner) = p.owner_user_id {
                users.insert(owner);
            }
        }
        Record::Comment(c) => {
            if let Some(user) = c.user_id {
                users.insert(user);
            }
        }
        _ => {}
    }
    Ok(doc)
}

/// Rebuild the index for `kind` from `records`, keeping only records of interest.
///
/// Individual write failures are counted and logged once per progress checkpoint;
/// records with invalid (negative) ids are dropped silently.
#[allow(clippy::too_many_arguments)]
pub async fn load_kind<S, R>(
    kind: Kind,
    ids: &IdSet,
    mut records: R,
    sink: Arc<S>,
    users: &mut IdSet,
    votes: Option<&VoteTotals>,
    options: &LoadOptions,
    progress: ProgressFn<'_>,
) -> Result<LoadReport>
where
    S: Sink + ?Sized + 'static,
    R: RecordStream,
{
    let index = kind.index_name(&options.index_prefix)?;
    sink.recreate_index(&index, kind).await?;
    tracing::info!(%kind, index = %index, "index recreated, loading records");

    let mut writer = BoundedWriter::new(Arc::clone(&sink), options.write_concurrency);
    let mut read = 0u64;
    let mut skipped_invalid = 0usize;
    let phase = progress_phase(kind);
    while let Some(record) = records.next() {
        let record = record?;
        read += 1;
        if record.kind() == kind && admit(&record, ids) {
            match record.doc_id() {
                Some(id) if id >= 0 => {
                    let doc = enrich(&record, users, votes)?;
                    writer.submit(&index, kind, id, doc).await;
                }
                _ => skipped_invalid += 1,
            }
        }
        if read % PROGRESS_INTERVAL == 0 {
            log_failures(phase, &writer.take_failures());
            progress(&Progress {
                records_read: read,
                completed: writer.written() as u64,
                percent: records.percent_read(),
                phase,
            });
        }
    }
    writer.flush().await;
    log_failures(phase, &writer.take_failures());
    sink.refresh_index(&index).await?;

    let report = LoadReport {
        kind,
        index,
        read,
        skipped_rows: records.skipped_rows(),
        written: writer.written(),
        skipped_invalid: skipped_invalid + writer.skipped_invalid(),
        failed: writer.failed(),
    };
    tracing::info!(
        %kind,
        index = %report.index,
        read = report.read,
        skipped_rows = report.skipped_rows,
        written = report.written,
        skipped_invalid = report.skipped_invalid,
        failed = report.failed,
        "load complete"
    );
    Ok(report)
}

fn progress_phase(kind: Kind) -> &'static str {
    match kind {
        Kind::Post => "Loading posts",
        Kind::Comment => "Loading comments",
        Kind::User => "Loading users",
        Kind::PostLink => "Loading post links",
        Kind::Vote => "Loading votes",
    }
}

/// Answers of one question, enriched with the question's metadata. Empty when the
/// question has no stored answers or is not itself a stored question.
async fn enriched_answers<S: Sink + ?Sized>(
    sink: &S,
    index: &str,
    question_id: DocId,
    page: usize,
) -> Result<Vec<(DocId, Value)>> {
    let answers = sink.search(index, &SearchQuery::answers_of(question_id, page)).await?;
    if answers.is_empty() {
        return Ok(Vec::new());
    }
    let Some(question) = sink.get_document(index, Kind::Post, question_id).await? else {
        tracing::debug!(question_id, "question not in sink, answers left as is");
        return Ok(Vec::new());
    };
    if question.get("PostTypeId").and_then(Value::as_i64) != Some(1) {
        return Ok(Vec::new());
    }
    let mut out = Vec::with_capacity(answers.len());
    for mut answer in answers {
        let Some(id) = answer.get("Id").and_then(Value::as_i64) else { continue };
        for (from, to) in [("Tags", "Tags"), ("ViewCount", "ViewCount"), ("Title", "QuestionTitle")] {
            if let Some(v) = question.get(from) {
                answer[to] = v.clone();
            }
        }
        out.push((id, answer));
    }
    Ok(out)
}

/// Copy `Tags`, `ViewCount` and `Title` (as `QuestionTitle`) from each question onto its
/// answers already in the post index. Returns the number of answers rewritten.
///
/// A question missing from the sink is skipped; any other per-question failure is
/// logged at debug level and the loop moves on.
pub async fn extend_answers_from_questions<S: Sink + ?Sized + 'static>(
    question_ids: &IdSet,
    sink: Arc<S>,
    options: &LoadOptions,
    progress: ProgressFn<'_>,
) -> Result<usize> {
    let index = Kind::Post.index_name(&options.index_prefix)?;
    let mut ordered: Vec<DocId> = question_ids.iter().copied().collect();
    ordered.sort_unstable();
    let total = ordered.len() as u64;
    let batch = options.extend_batch_size.max(1);

    let mut writer = BoundedWriter::new(Arc::clone(&sink), options.write_concurrency.min(batch));
    for (n, question_id) in ordered.into_iter().enumerate() {
        match enriched_answers(sink.as_ref(), &index, question_id, options.answer_page_size).await {
            Ok(answers) => {
                for (id, answer) in answers {
                    writer.submit(&index, Kind::Post, id, answer).await;
                }
            }
            Err(e) => tracing::debug!(question_id, error = %e, "skipping question"),
        }
        let done = n as u64 + 1;
        if done % batch as u64 == 0 {
            writer.flush().await;
            log_failures("Extending answers", &writer.take_failures());
        }
        if done % PROGRESS_INTERVAL == 0 {
            progress(&Progress {
                records_read: done,
                completed: writer.written() as u64,
                percent: percent_of(done, total),
                phase: "Extending answers",
            });
        }
    }
    writer.flush().await;
    log_failures("Extending answers", &writer.take_failures());
    sink.refresh_index(&index).await?;
    tracing::info!(questions = total, answers_extended = writer.written(), "answer extension complete");
    Ok(writer.written())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dump::{DumpFormat, DumpReader, MemoryStream};
    use crate::error::Error;
    use crate::model::{Comment, Post, PostLink, User};
    use crate::progress::silent;
    use crate::sink::MemorySink;
    use serde_json::json;

    fn opts() -> LoadOptions {
        LoadOptions { index_prefix: "test_".into(), ..LoadOptions::default() }
    }

    fn ids(v: &[i64]) -> IdSet {
        v.iter().copied().collect()
    }

    fn post(id: i64, type_id: i64, parent: Option<i64>, owner: Option<i64>) -> Record {
        Record::Post(Post {
            id,
            post_type_id: Some(type_id),
            parent_id: parent,
            owner_user_id: owner,
            title: (type_id == 1).then(|| format!("Question {id}")),
            tags: (type_id == 1).then(|| "<faq>".to_string()),
            view_count: (type_id == 1).then_some(40 + id),
            ..Post::default()
        })
    }

    #[tokio::test]
    async fn posts_are_filtered_and_enriched() {
        let sink = Arc::new(MemorySink::new());
        let records = vec![post(1, 1, None, Some(7)), post(2, 1, None, Some(8)), post(3, 2, Some(1), Some(-1))];
        let votes: VoteTotals = [(1, 4)].into_iter().collect();
        let mut users = IdSet::new();
        let report = load_kind(
            Kind::Post,
            &ids(&[1, 3]),
            MemoryStream::new(records),
            Arc::clone(&sink),
            &mut users,
            Some(&votes),
            &opts(),
            &mut silent,
        )
        .await
        .unwrap();

        assert_eq!(report.written, 2);
        assert_eq!(report.read, 3);
        assert_eq!(sink.ids("test_post"), vec![1, 3]);
        let q = sink.get_document("test_post", Kind::Post, 1).await.unwrap().unwrap();
        assert_eq!(q["VoteCount"], json!(4));
        let a = sink.get_document("test_post", Kind::Post, 3).await.unwrap().unwrap();
        assert_eq!(a["VoteCount"], json!(0));
        assert_eq!(users, ids(&[7, -1]));
    }

    #[tokio::test]
    async fn load_rebuilds_the_index() {
        let sink = Arc::new(MemorySink::new());
        sink.create_index("test_post", Kind::Post).await.unwrap();
        sink.put_document("test_post", Kind::Post, 99, &json!({"Id": 99})).await.unwrap();
        let mut users = IdSet::new();
        load_kind(Kind::Post, &ids(&[1]), MemoryStream::new(vec![post(1, 1, None, None)]), Arc::clone(&sink), &mut users, None, &opts(), &mut silent)
            .await
            .unwrap();
        assert_eq!(sink.ids("test_post"), vec![1]);
    }

    #[tokio::test]
    async fn comments_links_and_users_use_their_own_predicates() {
        let sink = Arc::new(MemorySink::new());
        let wanted = ids(&[1, 2]);
        let mut users = IdSet::new();

        let comments = vec![
            Record::Comment(Comment { id: Some(100), post_id: 1, user_id: Some(7), ..Comment::default() }),
            Record::Comment(Comment { id: Some(101), post_id: 5, user_id: Some(9), ..Comment::default() }),
        ];
        let r = load_kind(Kind::Comment, &wanted, MemoryStream::new(comments), Arc::clone(&sink), &mut users, None, &opts(), &mut silent)
            .await
            .unwrap();
        assert_eq!(r.written, 1);
        assert_eq!(users, ids(&[7]));

        let links = vec![
            Record::PostLink(PostLink { id: Some(200), post_id: 9, related_post_id: 2, ..PostLink::default() }),
            Record::PostLink(PostLink { id: Some(201), post_id: 9, related_post_id: 8, ..PostLink::default() }),
        ];
        let r = load_kind(Kind::PostLink, &wanted, MemoryStream::new(links), Arc::clone(&sink), &mut users, None, &opts(), &mut silent)
            .await
            .unwrap();
        assert_eq!(sink.ids("test_postlink"), vec![200]);
        assert_eq!(r.written, 1);

        users.insert(-1);
        let user_records = vec![
            Record::User(User { id: -1, ..User::default() }),
            Record::User(User { id: 7, ..User::default() }),
            Record::User(User { id: 8, ..User::default() }),
        ];
        let user_ids = users.clone();
        let r = load_kind(Kind::User, &user_ids, MemoryStream::new(user_records), Arc::clone(&sink), &mut users, None, &opts(), &mut silent)
            .await
            .unwrap();
        assert_eq!(sink.ids("test_user"), vec![7]);
        assert_eq!(r.written, 1);
        assert_eq!(r.failed, 0);
    }

    #[tokio::test]
    async fn unreadable_rows_are_reported() {
        let data = r#"<posts><row Id="1" PostTypeId="1" /><row Id="2" Title="&bogus;" /><row Id="3" PostTypeId="1" /></posts>"#;
        let stream = DumpReader::new(std::io::Cursor::new(data), Kind::Post, DumpFormat::Xml, None);
        let sink = Arc::new(MemorySink::new());
        let mut users = IdSet::new();
        let r = load_kind(Kind::Post, &ids(&[1, 2, 3]), stream, Arc::clone(&sink), &mut users, None, &opts(), &mut silent)
            .await
            .unwrap();
        assert_eq!(r.read, 2);
        assert_eq!(r.skipped_rows, 1);
        assert_eq!(sink.ids("test_post"), vec![1, 3]);
    }

    #[tokio::test]
    async fn votes_have_no_index() {
        let sink = Arc::new(MemorySink::new());
        let mut users = IdSet::new();
        let err = load_kind(Kind::Vote, &ids(&[1]), MemoryStream::new(vec![]), sink, &mut users, None, &opts(), &mut silent)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedKind(_)));
    }

    #[tokio::test]
    async fn answers_receive_question_metadata() {
        let sink = Arc::new(MemorySink::new());
        let records = vec![post(1, 1, None, None), post(2, 2, Some(1), None), post(3, 2, Some(1), None), post(4, 2, Some(9), None)];
        let mut users = IdSet::new();
        load_kind(Kind::Post, &ids(&[1, 2, 3, 4]), MemoryStream::new(records), Arc::clone(&sink), &mut users, None, &opts(), &mut silent)
            .await
            .unwrap();

        let extended = extend_answers_from_questions(&ids(&[1, 9, 77]), Arc::clone(&sink), &opts(), &mut silent).await.unwrap();
        assert_eq!(extended, 2);
        let a = sink.get_document("test_post", Kind::Post, 2).await.unwrap().unwrap();
        assert_eq!(a["QuestionTitle"], json!("Question 1"));
        assert_eq!(a["Tags"], json!("<faq>"));
        assert_eq!(a["ViewCount"], json!(41));
        let orphan = sink.get_document("test_post", Kind::Post, 4).await.unwrap().unwrap();
        assert!(orphan.get("QuestionTitle").is_none());
    }

    #[tokio::test]
    async fn extension_reports_progress_every_hundred_ids() {
        let sink = Arc::new(MemorySink::new());
        sink.create_index("test_post", Kind::Post).await.unwrap();
        let question_ids: IdSet = (0..250).collect();
        let mut calls = Vec::new();
        let n = extend_answers_from_questions(&question_ids, sink, &opts(), &mut |p: &Progress| calls.push(p.percent)).await.unwrap();
        assert_eq!(n, 0);
        assert_eq!(calls, vec![40.0, 80.0]);
    }
}
