use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use stackset_core::persist;
use stackset_core::pipeline;
use stackset_core::progress::log_progress;
use stackset_core::sink::{ElasticSink, MemorySink, SledSink, Sink};
use stackset_core::{Kind, PipelineConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "stackset")]
#[command(about = "Resolve and load the relevant posts of a StackExchange dump into a search index", long_about = None)]
struct Cli {
    #[command(flatten)]
    opts: GlobalOpts,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalOpts {
    /// JSON config file; flags below override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory holding Posts.xml, PostLinks.xml, Comments.xml, Users.xml, Votes.xml
    #[arg(long, global = true)]
    dump_dir: Option<PathBuf>,
    /// Directory for the id lists handed from one phase to the next
    #[arg(long, global = true)]
    handoff_dir: Option<PathBuf>,
    /// Index name prefix, e.g. `so_` gives so_post, so_comment, ...
    #[arg(long, global = true)]
    prefix: Option<String>,
    /// Words selecting seed questions by title or tags (empty = all questions)
    #[arg(long, global = true)]
    include_tags: Option<String>,
    /// Words excluding questions and answers by title, tags or body
    #[arg(long, global = true)]
    exclude_tags: Option<String>,
    /// `memory`, a sled directory, or an http(s) Elasticsearch URL
    #[arg(long, global = true, default_value = "memory")]
    sink: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the ids of questions matching --include-tags
    Select,
    /// Expand the selected questions over post links and admit their answers
    Resolve,
    /// Load posts, comments, post links and users of the resolved post set
    Load,
    /// Copy question tags, view count and title onto stored answers
    Extend,
    /// Run every phase in one process
    Run,
}

impl GlobalOpts {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_file(path).with_context(|| format!("reading config {}", path.display()))?,
            None => PipelineConfig::default(),
        };
        if let Some(dir) = &self.dump_dir {
            config.dump_dir = dir.clone();
        }
        if let Some(dir) = &self.handoff_dir {
            config.handoff_dir = dir.clone();
        }
        if let Some(prefix) = &self.prefix {
            config.index_prefix = prefix.clone();
        }
        if let Some(words) = &self.include_tags {
            config.include_tags = words.clone();
        }
        if let Some(words) = &self.exclude_tags {
            config.exclude_tags = words.clone();
        }
        Ok(config)
    }
}

fn open_sink(target: &str) -> Result<Arc<dyn Sink>> {
    let sink: Arc<dyn Sink> = if target == "memory" {
        Arc::new(MemorySink::new())
    } else if target.starts_with("http://") || target.starts_with("https://") {
        Arc::new(ElasticSink::new(target)?)
    } else {
        Arc::new(SledSink::open(target).with_context(|| format!("opening sled store {target}"))?)
    };
    Ok(sink)
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let config = cli.opts.pipeline_config()?;
    let paths = config.handoff_paths();

    match cli.command {
        Commands::Select => {
            let ids = pipeline::select_questions(&config, &mut log_progress)?;
            persist::save_question_ids(&paths, &ids)?;
            tracing::info!(selected = ids.len(), path = %paths.question_ids().display(), "question ids written");
        }
        Commands::Resolve => {
            let seed = persist::load_question_ids(&paths).context("run `select` first")?;
            let set = pipeline::resolve_posts(&config, &seed, &mut log_progress)?;
            persist::save_post_set(&paths, seed.len(), &set)?;
            tracing::info!(
                post_ids = set.post_ids.len(),
                extended_question_ids = set.extended_question_ids.len(),
                admitted_answers = set.admitted_answers,
                "post set written"
            );
        }
        Commands::Load => {
            let post_ids = persist::load_post_ids(&paths).context("run `resolve` first")?;
            let sink = open_sink(&cli.opts.sink)?;
            let reports = pipeline::load_posts(&config, Arc::clone(&sink), &post_ids, &mut log_progress).await?;
            print_json(&reports)?;
        }
        Commands::Extend => {
            let question_ids = persist::load_extended_question_ids(&paths).context("run `resolve` first")?;
            let sink = open_sink(&cli.opts.sink)?;
            let extended = pipeline::extend_answers(&config, sink, &question_ids, &mut log_progress).await?;
            tracing::info!(answers_extended = extended, "answers extended");
        }
        Commands::Run => {
            let sink = open_sink(&cli.opts.sink)?;
            let summary = pipeline::run_all(&config, Arc::clone(&sink), &mut log_progress).await?;
            report_counts(sink.as_ref(), &config.index_prefix).await;
            print_json(&summary)?;
        }
    }
    Ok(())
}

async fn report_counts(sink: &dyn Sink, prefix: &str) {
    for kind in Kind::INDEXED {
        let Ok(index) = kind.index_name(prefix) else { continue };
        match sink.count(&index).await {
            Ok(n) => tracing::info!(index = %index, documents = n, "index size"),
            Err(e) => tracing::warn!(index = %index, error = %e, "could not count index"),
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
