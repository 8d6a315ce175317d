//! Hand-off files between the id-resolution and load phases. Every id list is a JSON
//! array of integers.

use crate::error::Result;
use crate::model::{DocId, IdSet};
use crate::resolve::PostSet;
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;

pub const HANDOFF_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaFile {
    pub created_at: String,
    pub question_ids: usize,
    pub post_ids: usize,
    pub extended_question_ids: usize,
    pub admitted_answers: usize,
    pub version: u32,
}

pub struct HandoffPaths {
    pub root: PathBuf,
}

impl HandoffPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn question_ids(&self) -> PathBuf { self.root.join("question_ids.json") }
    pub fn post_ids(&self) -> PathBuf { self.root.join("post_ids.json") }
    pub fn extended_question_ids(&self) -> PathBuf { self.root.join("extended_question_ids.json") }
    fn meta(&self) -> PathBuf { self.root.join("meta.json") }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent() {
        create_dir_all(dir)?;
    }
    let mut out = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut out, value)?;
    out.flush()?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let f = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(f))?)
}

fn sorted(set: &IdSet) -> Vec<DocId> {
    let mut ids: Vec<DocId> = set.iter().copied().collect();
    ids.sort_unstable();
    ids
}

pub fn save_ids(path: &Path, ids: &[DocId]) -> Result<()> {
    write_json(path, ids)
}

pub fn save_id_set(path: &Path, ids: &IdSet) -> Result<()> {
    write_json(path, &sorted(ids))
}

pub fn load_ids(path: &Path) -> Result<Vec<DocId>> {
    read_json(path)
}

pub fn load_id_set(path: &Path) -> Result<IdSet> {
    Ok(load_ids(path)?.into_iter().collect())
}

pub fn save_question_ids(paths: &HandoffPaths, ids: &[DocId]) -> Result<()> {
    save_ids(&paths.question_ids(), ids)
}

pub fn load_question_ids(paths: &HandoffPaths) -> Result<IdSet> {
    load_id_set(&paths.question_ids())
}

/// Write both resolver outputs plus the manifest.
pub fn save_post_set(paths: &HandoffPaths, question_ids: usize, set: &PostSet) -> Result<()> {
    save_id_set(&paths.post_ids(), &set.post_ids)?;
    save_id_set(&paths.extended_question_ids(), &set.extended_question_ids)?;
    let meta = MetaFile {
        created_at: time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
        question_ids,
        post_ids: set.post_ids.len(),
        extended_question_ids: set.extended_question_ids.len(),
        admitted_answers: set.admitted_answers,
        version: HANDOFF_VERSION,
    };
    write_json(&paths.meta(), &meta)
}

pub fn load_meta(paths: &HandoffPaths) -> Result<MetaFile> {
    read_json(&paths.meta())
}

pub fn load_post_ids(paths: &HandoffPaths) -> Result<IdSet> {
    load_id_set(&paths.post_ids())
}

pub fn load_extended_question_ids(paths: &HandoffPaths) -> Result<IdSet> {
    load_id_set(&paths.extended_question_ids())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn id_lists_are_plain_integer_arrays() {
        let dir = tempdir().unwrap();
        let paths = HandoffPaths::new(dir.path().join("handoff"));
        save_question_ids(&paths, &[4, 1, 2]).unwrap();
        let raw = std::fs::read_to_string(paths.question_ids()).unwrap();
        assert_eq!(raw, "[4,1,2]");

        let set = PostSet {
            post_ids: [3, 1, 2].into_iter().collect(),
            extended_question_ids: [1, 3].into_iter().collect(),
            admitted_answers: 1,
        };
        save_post_set(&paths, 3, &set).unwrap();
        assert_eq!(std::fs::read_to_string(paths.post_ids()).unwrap(), "[1,2,3]");
        assert_eq!(load_post_ids(&paths).unwrap(), set.post_ids);
        assert_eq!(load_extended_question_ids(&paths).unwrap(), set.extended_question_ids);

        let meta = load_meta(&paths).unwrap();
        assert_eq!(meta.post_ids, 3);
        assert_eq!(meta.admitted_answers, 1);
        assert_eq!(meta.version, HANDOFF_VERSION);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(load_post_ids(&HandoffPaths::new(dir.path())).is_err());
    }
}
