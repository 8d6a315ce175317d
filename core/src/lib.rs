//! Builds the working set of StackExchange dump posts to index and loads them,
//! enriched with vote totals and question metadata, into a document sink.

pub mod config;
pub mod dump;
pub mod error;
pub mod load;
pub mod matcher;
pub mod model;
pub mod persist;
pub mod pipeline;
pub mod progress;
pub mod resolve;
pub mod select;
pub mod sink;
pub mod tokenizer;
pub mod votes;

pub use config::PipelineConfig;
pub use error::{Error, Result, SinkError};
pub use matcher::{make_matcher, Matcher};
pub use model::{DocId, IdSet, Kind, Post, Record, VoteTotals};
pub use resolve::PostSet;
