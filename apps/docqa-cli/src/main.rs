use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use docqa_answer::{OpenAiGenerator, QaService};
use docqa_core::config::Settings;
use docqa_core::conversation::{parse_history, Query};
use docqa_hybrid::KnowledgeBase;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

/// Question answering over a local document collection.
#[derive(Parser)]
#[command(name = "docqa", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index text files (pages separated by form feeds) from files or directories.
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Print fused retrieval results for a query.
    Search {
        query: String,
        #[arg(short, long)]
        json: bool,
    },
    /// Answer a question with citations.
    Ask {
        query: String,
        /// JSON file with prior turns: `[{"role": "user", "content": "..."}]`.
        #[arg(long)]
        history: Option<PathBuf>,
        #[arg(short, long)]
        json: bool,
    },
    /// Show indexed documents and chunk count.
    Status,
    /// Remove everything from the knowledge base.
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();
    let settings = Settings::load().map_err(|e| {
        eprintln!("Error loading config: {e}");
        e
    })?;
    let kb = Arc::new(KnowledgeBase::open(&settings).await?);

    match cli.command {
        Command::Ingest { paths } => return ingest(&kb, &paths).await,
        Command::Search { query, json } => {
            let results = kb.search(&query).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else if results.is_empty() {
                println!("No results.");
            } else {
                for r in &results {
                    let c = &r.chunk;
                    let (rank, score) = (r.rank, r.score);
                    println!("{rank:>2}. [{score:.3}] {} p.{} ({})", c.source, c.page, c.id);
                    let preview: String = c.text.chars().take(200).collect();
                    println!("    {}", preview.replace('\n', " "));
                }
            }
        }
        Command::Ask { query, history, json } => {
            let history = match history {
                Some(path) => {
                    let raw = fs::read_to_string(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    parse_history(&raw)?
                }
                None => Vec::new(),
            };
            let generator = Arc::new(OpenAiGenerator::from_config(&settings.generation)?);
            let service = QaService::new(kb, generator, &settings);
            let answer = service.ask(&Query::new(query).with_history(history)).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                println!("{}\n", answer.text);
                for c in &answer.citations {
                    let pages = if c.page == c.page_end {
                        format!("p. {}", c.page)
                    } else {
                        format!("pp. {}-{}", c.page, c.page_end)
                    };
                    let snippet = c.snippet.replace('\n', " ");
                    println!("[{}] {} ({pages})\n    {snippet}", c.marker, c.source);
                }
            }
        }
        Command::Status => {
            let status = kb.status().await?;
            println!("Embedding model: {} (dim {})", status.embedding_model, status.dim);
            println!("Chunks: {}", status.chunks);
            println!("Documents: {}", status.documents.len());
            for d in &status.documents {
                println!("  {} ({} chunks, {})", d.source, d.chunks, d.doc_id);
            }
        }
        Command::Clear => {
            kb.clear().await?;
            println!("Knowledge base cleared.");
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn ingest(kb: &KnowledgeBase, paths: &[PathBuf]) -> anyhow::Result<ExitCode> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files {msg}",
            )?
            .progress_chars("#>-"),
    );

    let outcomes = kb
        .ingest_paths_with(paths, |total, outcome| {
            pb.set_length(total as u64);
            pb.set_message(outcome.path.display().to_string());
            match &outcome.result {
                Ok(report) => pb.println(format!(
                    "ok    {} ({} chunks, {} ms)",
                    report.source,
                    report.chunks,
                    report.elapsed.as_millis()
                )),
                Err(e) => pb.println(format!("error {}: {e}", outcome.path.display())),
            }
            pb.inc(1);
        })
        .await;
    pb.finish_and_clear();

    if outcomes.is_empty() {
        eprintln!("No .txt files found.");
        return Ok(ExitCode::FAILURE);
    }
    let ok = outcomes.iter().filter(|o| o.result.is_ok()).count();
    println!("Ingested {ok} of {} files.", outcomes.len());
    Ok(if ok == outcomes.len() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
