use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use reqres_core::classify::KeywordClassifier;
use reqres_core::config::AppConfig;
use reqres_core::loader::load_directory;
use reqres_core::traits::Generator;
use reqres_core::types::{Evidence, GenerationRequest};
use reqres_embed::load_embedder;
use reqres_hybrid::{load_reranker, BatchReport, KnowledgeBase, OpenAiGenerator, OutcomeStatus, Pipeline};

#[derive(Parser)]
#[command(name = "reqres", about = "Rewrite ambiguous requirements using a local knowledge base")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index every knowledge file under DIR (defaults to data.knowledge_dir).
    Ingest {
        dir: Option<PathBuf>,
        /// Empty both indices first.
        #[arg(long)]
        reset: bool,
    },
    /// Show the fused and reranked retrieval for a query.
    Search { query: String },
    /// Split TEXT into sentences and rewrite the ambiguous ones.
    Resolve {
        text: String,
        /// Ask for an explanation of the ambiguity as well.
        #[arg(long)]
        explain: bool,
        /// Print the batch report as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Stand-in generator for commands that only retrieve.
struct RetrievalOnly;

#[async_trait]
impl Generator for RetrievalOnly {
    async fn generate(&self, _request: &GenerationRequest) -> reqres_core::Result<String> {
        Err(reqres_core::Error::Generation("generation is disabled for this command".into()))
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

async fn open_pipeline(config: &AppConfig, generator: Arc<dyn Generator>) -> anyhow::Result<Pipeline> {
    let embedder = load_embedder(&config.models)?;
    let kb = KnowledgeBase::open(config, embedder).await?;
    let reranker = load_reranker(&config.models)?;
    Ok(Pipeline::new(Arc::new(kb), reranker, generator, config))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let mut config = AppConfig::load().context("loading configuration")?;

    match cli.command {
        Command::Ingest { dir, reset } => {
            let dir = dir.unwrap_or_else(|| PathBuf::from(&config.data.knowledge_dir));
            let pipeline = open_pipeline(&config, Arc::new(RetrievalOnly)).await?;
            let kb = pipeline.knowledge_base();
            if reset {
                kb.reset().await?;
            }
            println!("Ingesting from {}", dir.display());
            let docs = load_directory(&dir)?;
            let bar = ProgressBar::new(docs.len() as u64);
            bar.set_style(ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")?);
            let report = kb
                .ingest_all(docs, |source| {
                    bar.set_message(source.to_string());
                    bar.inc(1);
                })
                .await?;
            bar.finish_and_clear();

            for (source, chunks) in &report.ingested {
                println!("  ✅ {source} ({chunks} chunks)");
            }
            for failure in &report.failed {
                println!("  ⚠️  {failure}");
            }
            println!("📊 {} chunks stored", kb.chunk_count().await?);
        }
        Command::Search { query } => {
            let pipeline = open_pipeline(&config, Arc::new(RetrievalOnly)).await?;
            let retrieval = pipeline.retrieve(&query).await?;
            println!("Fused ranking:");
            for (i, f) in retrieval.fused.iter().enumerate() {
                println!(
                    "{:>3}. {:.5}  dense={:<4} sparse={:<4} {}",
                    i + 1,
                    f.fused_score,
                    rank_label(f.dense_rank),
                    rank_label(f.sparse_rank),
                    f.chunk_id
                );
            }
            println!("\nReranked:");
            for (i, r) in retrieval.reranked.iter().enumerate() {
                println!("{:>3}. {:.4}  {}  {}", i + 1, r.relevance_score, r.chunk.source, excerpt(&r.chunk.text, 100));
            }
        }
        Command::Resolve { text, explain, json } => {
            config.generation.include_explanation |= explain;
            let generator = Arc::new(OpenAiGenerator::from_config(&config.generation)?);
            let pipeline = open_pipeline(&config, generator).await?;

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("interrupt received; finishing in-flight sentences");
                    on_signal.cancel();
                }
            });

            let report = pipeline.resolve_text(&text, &KeywordClassifier, &cancel).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
    }
    Ok(())
}

fn rank_label(rank: Option<usize>) -> String { rank.map_or_else(|| "-".to_string(), |r| r.to_string()) }

fn excerpt(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        return flat;
    }
    let cut: String = flat.chars().take(max).collect();
    format!("{cut}…")
}

fn print_evidence(evidence: &[Evidence]) {
    for (i, ev) in evidence.iter().enumerate() {
        let mut origin = ev.source.clone();
        if let Some(rule) = &ev.meta.rule_name { origin.push_str(&format!(", rule {rule}")); }
        if let Some(section) = &ev.meta.section { origin.push_str(&format!(", {section}")); }
        if let Some(page) = &ev.meta.page { origin.push_str(&format!(", p. {page}")); }
        println!("      [{}] ({origin}, relevance {:.3}) {}", i + 1, ev.relevance_score, excerpt(&ev.excerpt, 120));
    }
}

fn print_report(report: &BatchReport) {
    for outcome in &report.outcomes {
        match &outcome.status {
            OutcomeStatus::Clear => println!("✔ {}", outcome.sentence),
            OutcomeStatus::Resolved(result) => {
                println!("✖ {} (confidence {:.2})", outcome.sentence, outcome.classification.confidence);
                if result.fallback_used {
                    println!("    ⚠️  NO SUPPORTING EVIDENCE FOUND: rewrite is not grounded in the knowledge base");
                }
                println!("    → {}", result.rewrite_text.replace('\n', "\n      "));
                print_evidence(&result.evidence);
            }
            OutcomeStatus::Failed { error, evidence } => {
                println!("✖ {}", outcome.sentence);
                println!("    ❌ {error}");
                print_evidence(evidence);
            }
        }
    }
    if report.cancelled {
        println!("\n⏹  Cancelled after {} of {} sentences", report.outcomes.len(), report.submitted);
    }
}
