//! Phase entry points: select, resolve, load, extend.

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::load::{extend_answers_from_questions, load_kind, LoadReport};
use crate::model::{DocId, IdSet, Kind};
use crate::persist;
use crate::progress::ProgressFn;
use crate::resolve::{resolve_post_set, PostSet};
use crate::select::question_ids_by_tag;
use crate::sink::Sink;
use crate::votes::total_votes;
use serde::Serialize;
use std::sync::Arc;

/// Seed questions from the include filter.
pub fn select_questions(config: &PipelineConfig, progress: ProgressFn<'_>) -> Result<Vec<DocId>> {
    let posts = config.dump_files().open(Kind::Post)?;
    question_ids_by_tag(posts, &config.include_matcher(), progress)
}

pub fn resolve_posts(config: &PipelineConfig, seed: &IdSet, progress: ProgressFn<'_>) -> Result<PostSet> {
    let files = config.dump_files();
    let links = files.open(Kind::PostLink)?;
    let posts = files.open(Kind::Post)?;
    resolve_post_set(seed, links, posts, &config.exclude_matcher(), progress)
}

/// Load posts, comments, post links and users of `post_ids` into the sink.
///
/// Vote totals are computed first since they are attached to posts. Users are loaded
/// last, restricted to owners and commenters seen while loading posts and comments.
pub async fn load_posts<S: Sink + ?Sized + 'static>(
    config: &PipelineConfig,
    sink: Arc<S>,
    post_ids: &IdSet,
    progress: ProgressFn<'_>,
) -> Result<Vec<LoadReport>> {
    let files = config.dump_files();
    for kind in [Kind::Vote, Kind::Post, Kind::Comment, Kind::PostLink, Kind::User] {
        files.path(kind)?;
    }
    let options = config.load_options();

    let votes = total_votes(files.open(Kind::Vote)?, post_ids, &mut *progress)?;
    let mut users = IdSet::new();
    let mut reports = Vec::with_capacity(4);
    for kind in [Kind::Post, Kind::Comment, Kind::PostLink] {
        let records = files.open(kind)?;
        let report = load_kind(kind, post_ids, records, Arc::clone(&sink), &mut users, Some(&votes), &options, &mut *progress).await?;
        reports.push(report);
    }
    let user_ids = users.clone();
    let records = files.open(Kind::User)?;
    reports.push(load_kind(Kind::User, &user_ids, records, Arc::clone(&sink), &mut users, None, &options, progress).await?);
    Ok(reports)
}

pub async fn extend_answers<S: Sink + ?Sized + 'static>(
    config: &PipelineConfig,
    sink: Arc<S>,
    question_ids: &IdSet,
    progress: ProgressFn<'_>,
) -> Result<usize> {
    extend_answers_from_questions(question_ids, sink, &config.load_options(), progress).await
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub question_ids: usize,
    pub post_ids: usize,
    pub extended_question_ids: usize,
    pub admitted_answers: usize,
    pub loads: Vec<LoadReport>,
    pub answers_extended: usize,
}

/// All phases in one process. Ids are handed over in memory and also written to the
/// hand-off directory so the run can be inspected or resumed phase by phase.
pub async fn run_all<S: Sink + ?Sized + 'static>(
    config: &PipelineConfig,
    sink: Arc<S>,
    progress: ProgressFn<'_>,
) -> Result<RunSummary> {
    let paths = config.handoff_paths();
    let question_ids = select_questions(config, &mut *progress)?;
    persist::save_question_ids(&paths, &question_ids)?;

    let seed: IdSet = question_ids.iter().copied().collect();
    let set = resolve_posts(config, &seed, &mut *progress)?;
    persist::save_post_set(&paths, question_ids.len(), &set)?;

    let loads = load_posts(config, Arc::clone(&sink), &set.post_ids, &mut *progress).await?;
    let answers_extended = extend_answers(config, sink, &set.extended_question_ids, progress).await?;

    Ok(RunSummary {
        question_ids: question_ids.len(),
        post_ids: set.post_ids.len(),
        extended_question_ids: set.extended_question_ids.len(),
        admitted_answers: set.admitted_answers,
        loads,
        answers_extended,
    })
}
