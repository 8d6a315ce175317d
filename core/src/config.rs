use crate::dump::DumpFiles;
use crate::error::Result;
use crate::load::LoadOptions;
use crate::matcher::Matcher;
use crate::persist::HandoffPaths;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Settings for one pipeline run. Passed explicitly to every phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory with `Posts.xml`, `PostLinks.xml`, `Comments.xml`, `Users.xml`, `Votes.xml`.
    pub dump_dir: PathBuf,
    /// Where id lists are written between phases.
    pub handoff_dir: PathBuf,
    pub index_prefix: String,
    /// Space-separated words; questions matching any of them seed the post set.
    /// Empty accepts every question.
    pub include_tags: String,
    /// Space-separated words; matching questions and answers are dropped.
    /// Empty excludes nothing.
    pub exclude_tags: String,
    pub write_concurrency: usize,
    pub answer_page_size: usize,
    pub extend_batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let load = LoadOptions::default();
        Self {
            dump_dir: PathBuf::from("./dump"),
            handoff_dir: PathBuf::from("./handoff"),
            index_prefix: load.index_prefix,
            include_tags: String::new(),
            exclude_tags: String::new(),
            write_concurrency: load.write_concurrency,
            answer_page_size: load.answer_page_size,
            extend_batch_size: load.extend_batch_size,
        }
    }
}

impl PipelineConfig {
    /// Read a JSON config file. Missing keys take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(f))?)
    }

    pub fn dump_files(&self) -> DumpFiles {
        DumpFiles::new(&self.dump_dir)
    }

    pub fn handoff_paths(&self) -> HandoffPaths {
        HandoffPaths::new(&self.handoff_dir)
    }

    pub fn include_matcher(&self) -> Matcher {
        Matcher::include(&self.include_tags)
    }

    pub fn exclude_matcher(&self) -> Matcher {
        Matcher::exclude(&self.exclude_tags)
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            index_prefix: self.index_prefix.clone(),
            write_concurrency: self.write_concurrency.max(1),
            answer_page_size: self.answer_page_size.max(1),
            extend_batch_size: self.extend_batch_size.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"index_prefix": "so_", "exclude_tags": "spam"}"#).unwrap();
        let cfg = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(cfg.index_prefix, "so_");
        assert_eq!(cfg.write_concurrency, 20);
        assert_eq!(cfg.answer_page_size, 1000);
        assert!(cfg.include_tags.is_empty());
        assert!(!cfg.exclude_matcher().is_empty());
        assert_eq!(cfg.load_options().extend_batch_size, 20);
    }
}
