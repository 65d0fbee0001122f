mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use policydb_core::config::{Config, Settings};
use policydb_core::traits::EmbeddingService;
use policydb_core::types::ScoredPassage;
use policydb_embed::{service_from_settings, BatchEmbedder};
use policydb_hybrid::{assemble_context, HybridRanker, Retriever};
use policydb_store::PersistenceAdapter;

#[derive(Parser)]
#[command(name = "policydb", about = "Hybrid passage retrieval over insurance policy documents")]
struct Cli {
    /// Base config file; `config.<RUST_ENV>.toml` next to it is layered on top.
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Also append logs to this file.
    #[arg(long, global = true, env = "APP_LOG_FILE")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk, embed and index a text file, then save the index artifact.
    Ingest {
        file: PathBuf,
        #[arg(long)]
        index_name: Option<String>,
        /// Source label stored on every passage (defaults to the file stem).
        #[arg(long)]
        source: Option<String>,
    },
    /// Print the best passages for each question.
    Query {
        #[arg(required = true)]
        questions: Vec<String>,
        #[arg(long)]
        index_name: Option<String>,
        #[arg(short, long)]
        k: Option<usize>,
        /// Similarity weight in [0, 1]; the rest goes to keyword overlap.
        #[arg(long)]
        alpha: Option<f32>,
    },
    /// Print the assembled context block for one question.
    Context {
        question: String,
        #[arg(long)]
        index_name: Option<String>,
        #[arg(short, long)]
        k: Option<usize>,
    },
}

struct Engine {
    settings: Settings,
    service: Arc<dyn EmbeddingService>,
    adapter: PersistenceAdapter,
}

impl Engine {
    fn load(config_path: &Path) -> Result<Self> {
        let env_name = std::env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        let settings = Config::load_from(config_path, &env_name)?.settings()?;
        let service = service_from_settings(&settings.embedding)?;
        let adapter = PersistenceAdapter::from_settings(&settings.storage)?;
        Ok(Self { settings, service, adapter })
    }

    fn index_name(&self, name: Option<String>) -> String { name.unwrap_or_else(|| self.settings.index.name.clone()) }

    async fn open(&self, index_name: &str, embedder: BatchEmbedder) -> Result<Retriever> {
        let opened = self
            .adapter
            .open_index(index_name, &self.settings.index, self.service.dim())
            .await
            .with_context(|| format!("opening index `{index_name}`"))?;
        Ok(Retriever::from_opened(opened, embedder, &self.settings).await?)
    }

    fn embedder(&self) -> BatchEmbedder { BatchEmbedder::from_settings(self.service.clone(), &self.settings.embedding) }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_file.as_deref())?;
    let mut engine = Engine::load(&cli.config)?;

    match cli.command {
        Command::Ingest { file, index_name, source } => {
            let bytes = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let text = String::from_utf8_lossy(&bytes);
            let source = source.unwrap_or_else(|| file.file_stem().map_or_else(|| "document".to_string(), |s| s.to_string_lossy().into_owned()));
            let index_name = engine.index_name(index_name);

            let pb = ProgressBar::no_length();
            pb.set_style(ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {pos} passages embedded {msg}")?);
            let mut retriever = engine.open(&index_name, engine.embedder().with_progress(pb.clone())).await?;
            let n = retriever.index_document(&text, &source).await?;
            pb.finish_and_clear();
            if n == 0 {
                println!("Index `{index_name}` already holds passages; nothing ingested.");
                return Ok(());
            }
            println!("Indexed {n} passages from {} into `{index_name}`", file.display());
            if engine.adapter.tier_count() == 0 {
                warn!("no storage tiers configured; index not saved");
                return Ok(());
            }
            let locations = retriever.save(&engine.adapter).await?;
            if locations.is_empty() {
                println!("  stored by the managed index service");
            }
            for location in locations {
                println!("  saved to {location}");
            }
        }
        Command::Query { questions, index_name, k, alpha } => {
            if let Some(a) = alpha {
                HybridRanker::new(a, engine.settings.hybrid.keyword)?;
                engine.settings.hybrid.alpha = a;
            }
            let k = k.unwrap_or(engine.settings.hybrid.default_k);
            let index_name = engine.index_name(index_name);
            let retriever = engine.open(&index_name, engine.embedder()).await?;
            let answers = retriever.retrieve_many(&questions, k).await;
            for (question, answer) in questions.iter().zip(answers) {
                print_hits(question, &answer?);
            }
        }
        Command::Context { question, index_name, k } => {
            let k = k.unwrap_or(engine.settings.hybrid.default_k);
            let index_name = engine.index_name(index_name);
            let retriever = engine.open(&index_name, engine.embedder()).await?;
            let hits = retriever.retrieve_or_empty(&question, k).await?;
            info!(passages = hits.len(), "assembled context");
            println!("{}", assemble_context(&hits));
        }
    }
    Ok(())
}

fn print_hits(question: &str, hits: &[ScoredPassage]) {
    println!("\nQ: {question}");
    if hits.is_empty() {
        println!("  No relevant passages found.");
        return;
    }
    for (i, h) in hits.iter().enumerate() {
        let s = &h.scores;
        println!(
            "  {}. score={:.4} similarity={:.4} keyword={:.4} source={} #{}",
            i + 1,
            h.score(),
            s.similarity,
            s.keyword.unwrap_or(0.0),
            h.passage.source,
            h.passage.sequence_index
        );
        println!("     {}", h.passage.text.trim().replace('\n', " "));
    }
}
