//! Bio-Query terminal front end.
//!
//! Loads the publication corpus and both models once, then answers queries
//! either one-shot or from an interactive prompt. Results render as a table or
//! as JSON; any hit's abstract can be summarized on request.
//!
//! # Examples
//!
//! Single query:
//! ```bash
//! bioquery --query "radiation effects on bone density"
//! ```
//!
//! Single query, summarizing the best hit:
//! ```bash
//! bioquery --query "plant growth in microgravity" --summarize 1
//! ```
//!
//! Interactive mode:
//! ```bash
//! bioquery --interactive
//! ```

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use bioquery::{
    corpus::{CorpusError, DEFAULT_EMBEDDINGS_PATH, DEFAULT_ENCODING, DEFAULT_PUBLICATIONS_PATH, DEFAULT_STAMP_PATH},
    embedding::EmbeddingProvider,
    explorer::{Explorer, ExplorerConfig, ExplorerError, DEFAULT_SUMMARIZER_DIR},
    models::{Publication, RelevanceLevel, SearchHit},
    query::DEFAULT_TOP_K,
    summarize::{truncate_chars, Summarizer, DEFAULT_SUMMARY_TIMEOUT},
};
use clap::{Parser, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const NO_SEARCH_MESSAGE: &str = "No search performed yet. Enter a query first.";
const NO_RESULTS_MESSAGE: &str = "No relevant results found. Please try a different query.";

const HELP: &str = "Commands:
  <query>          - Search for publications
  /top N           - Set number of results to N
  /format table    - Use table output format
  /format json     - Use JSON output format
  /detail N        - Show full details for result rank N
  /summarize N     - Summarize the abstract of result rank N
  /help            - Show this help
  Ctrl+D or Ctrl+C - Exit";

/// Output format for search results
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-friendly table with colored relevance levels
    Table,
    /// Machine-readable JSON format
    Json,
}

/// Semantic search and summarization over the publication corpus
#[derive(Parser, Debug)]
#[command(
    name = "bioquery",
    version,
    about = "Search bioscience publications by meaning and summarize their abstracts",
    long_about = "Query a fixed publication corpus using semantic search, and summarize any \
                  result's abstract with a pretrained model. Supports both single-query \
                  and interactive modes.

EXAMPLES:
  Single query:
    bioquery --query \"radiation effects on bone density\"

  Summarize the top hit:
    bioquery --query \"muscle atrophy\" --summarize 1

  JSON output, 20 results:
    bioquery --query \"plant roots\" --format json --top-k 20

  Interactive mode:
    bioquery --interactive"
)]
struct Args {
    /// Publication table (CSV with Title, Abstract, optional Authors, Year)
    #[arg(long, value_name = "PATH", default_value = DEFAULT_PUBLICATIONS_PATH)]
    publications: PathBuf,

    /// Precomputed embedding matrix (.npy), row-aligned with the table
    #[arg(long, value_name = "PATH", default_value = DEFAULT_EMBEDDINGS_PATH)]
    embeddings: PathBuf,

    /// Optional model identity stamp written next to the matrix
    #[arg(long, value_name = "PATH", default_value = DEFAULT_STAMP_PATH)]
    stamp: PathBuf,

    /// Text encoding of the publication table
    #[arg(long, value_name = "LABEL", default_value = DEFAULT_ENCODING)]
    encoding: String,

    /// Directory with the summarizer's ONNX export and tokenizer.json
    #[arg(long, value_name = "DIR", default_value = DEFAULT_SUMMARIZER_DIR)]
    summarizer_dir: PathBuf,

    /// FastEmbed model cache directory
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Search query (required for single-query mode, omitted in interactive mode)
    #[arg(long, value_name = "TEXT", conflicts_with = "interactive")]
    query: Option<String>,

    /// Also summarize the abstract of the result at this rank
    #[arg(long, value_name = "RANK", requires = "query")]
    summarize: Option<usize>,

    /// Number of results to return
    #[arg(long, value_name = "N", default_value_t = DEFAULT_TOP_K)]
    top_k: usize,

    /// Give up on a summary after this many seconds
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_SUMMARY_TIMEOUT.as_secs())]
    summary_timeout_secs: u64,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Enable interactive REPL mode
    #[arg(long, short = 'i')]
    interactive: bool,

    /// Logging verbosity level
    #[arg(long, default_value = "warn", value_name = "LEVEL")]
    log_level: String,
}

impl Args {
    fn to_config(&self) -> ExplorerConfig {
        let mut config = ExplorerConfig::default()
            .with_publications(&self.publications)
            .with_embeddings(&self.embeddings)
            .with_stamp(&self.stamp)
            .with_encoding(&self.encoding)
            .with_summarizer_dir(&self.summarizer_dir)
            .with_top_k(self.top_k)
            .with_summary_timeout(Duration::from_secs(self.summary_timeout_secs));
        if self.cache_dir.is_some() {
            config = config.with_embedding_cache_dir(self.cache_dir.clone());
        }
        config
    }
}

/// One rendered hit in JSON output
#[derive(Serialize)]
struct HitView<'a> {
    rank: usize,
    score: f32,
    relevance: RelevanceLevel,
    #[serde(flatten)]
    publication: &'a Publication,
}

/// Setup logging with the specified level
fn setup_logging(log_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();
}

/// Spinner on stderr for blocking model work
fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg} [{elapsed}]")
            .expect("Invalid spinner template"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Turn a startup failure into a message the user can act on
fn startup_error(err: ExplorerError, config: &ExplorerConfig) -> anyhow::Error {
    match &err {
        ExplorerError::Corpus(corpus_err) if corpus_err.is_not_found() => anyhow::anyhow!(
            "Critical files not found!\n{}\n\
             Expected the publication table at '{}' and the embedding matrix at '{}'.\n\
             Run the offline embedding pipeline first to generate them.",
            err,
            config.corpus.publications.display(),
            config.corpus.embeddings.display()
        ),
        ExplorerError::Corpus(CorpusError::Integrity { .. }) => anyhow::anyhow!(
            "{}\nThe publication table and the embedding matrix are out of sync. \
             Regenerate the embeddings from the current table.",
            err
        ),
        ExplorerError::Summarize(_) => anyhow::anyhow!(
            "{}\nExport the summarization model to '{}' (encoder_model.onnx, \
             decoder_model.onnx, tokenizer.json).",
            err,
            config.summarizer_dir.display()
        ),
        _ => anyhow::Error::new(err).context("Failed to start"),
    }
}

/// Format hits as a pretty table
fn format_results_table(publications: &[(&SearchHit, &Publication)]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Rank").add_attribute(Attribute::Bold),
        Cell::new("Title").add_attribute(Attribute::Bold),
        Cell::new("Authors").add_attribute(Attribute::Bold),
        Cell::new("Year").add_attribute(Attribute::Bold),
        Cell::new("Relevance").add_attribute(Attribute::Bold),
        Cell::new("Score").add_attribute(Attribute::Bold),
    ]);

    for (idx, (hit, paper)) in publications.iter().enumerate() {
        let relevance = hit.relevance();
        let color = match relevance {
            RelevanceLevel::Identical => Color::Green,
            RelevanceLevel::HighlySimilar => Color::Cyan,
            RelevanceLevel::Similar => Color::Yellow,
            RelevanceLevel::Relevant => Color::White,
        };

        table.add_row(vec![
            Cell::new(idx + 1),
            Cell::new(ellipsize(&paper.title, 60)),
            Cell::new(ellipsize(&paper.authors, 40)),
            Cell::new(&paper.year),
            Cell::new(relevance.label()).fg(color),
            Cell::new(format!("{:.4}", hit.score)),
        ]);
    }

    table.to_string()
}

/// Cut `text` to `max` characters, marking the cut
fn ellipsize(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", truncate_chars(text, max.saturating_sub(3)))
    } else {
        text.to_string()
    }
}

/// Format hits as JSON
fn format_results_json(publications: &[(&SearchHit, &Publication)]) -> Result<String> {
    let views: Vec<HitView<'_>> = publications
        .iter()
        .enumerate()
        .map(|(idx, (hit, paper))| HitView {
            rank: idx + 1,
            score: hit.score,
            relevance: hit.relevance(),
            publication: paper,
        })
        .collect();
    serde_json::to_string_pretty(&views).with_context(|| "Failed to serialize results to JSON")
}

/// Print a result list (or the no-results message)
fn print_results<E, S>(
    explorer: &Explorer<E, S>,
    hits: &[SearchHit],
    format: OutputFormat,
    elapsed: Duration,
) -> Result<()>
where
    E: EmbeddingProvider,
    S: Summarizer,
{
    if hits.is_empty() {
        println!("{}", NO_RESULTS_MESSAGE);
        return Ok(());
    }

    let rows: Vec<(&SearchHit, &Publication)> = hits
        .iter()
        .filter_map(|hit| explorer.publication(hit).map(|paper| (hit, paper)))
        .collect();

    match format {
        OutputFormat::Table => {
            println!("{}", format_results_table(&rows));
            println!(
                "\nFound {} results in {:.2}s",
                rows.len(),
                elapsed.as_secs_f64()
            );
        }
        OutputFormat::Json => println!("{}", format_results_json(&rows)?),
    }
    Ok(())
}

/// Display detailed view of a single result
fn display_result_detail(hit: &SearchHit, paper: &Publication, rank: usize) {
    println!("\n{}", "═".repeat(80));
    println!("Rank: {}", rank);
    println!("Title: {}", paper.title);
    println!("Authors: {}", paper.authors);
    println!("Year: {}", paper.year);
    println!("Relevance: {}", hit.relevance().label());
    println!("Score: {:.4}", hit.score);
    println!("\nAbstract:\n{}", paper.abstract_text);
    println!("{}", "═".repeat(80));
}

/// Resolve a 1-based rank against the last search
fn hit_at_rank(last_hits: Option<&[SearchHit]>, rank: usize) -> std::result::Result<&SearchHit, String> {
    match last_hits {
        None => Err(NO_SEARCH_MESSAGE.to_string()),
        Some([]) => Err(NO_RESULTS_MESSAGE.to_string()),
        Some(hits) if rank == 0 || rank > hits.len() => Err(format!(
            "Rank {} out of range (last search had {} results)",
            rank,
            hits.len()
        )),
        Some(hits) => Ok(&hits[rank - 1]),
    }
}

/// Summarize one hit and print the result; failures only affect this item
async fn show_summary<E, S>(
    explorer: &Explorer<E, S>,
    hit: &SearchHit,
    rank: usize,
    format: OutputFormat,
) -> Result<()>
where
    E: EmbeddingProvider,
    S: Summarizer,
{
    let title = explorer
        .publication(hit)
        .map(|p| p.title.clone())
        .unwrap_or_default();

    let pb = spinner("Generating summary...");
    let started = Instant::now();
    let outcome = explorer.summarize_hit(hit).await;
    pb.finish_and_clear();

    let summary = match outcome {
        Ok(summary) => {
            debug!(rank, elapsed = ?started.elapsed(), "Summary ready");
            summary
        }
        Err(e) => {
            warn!(rank, "Summary failed: {}", e);
            format!("Summary unavailable: {}", e)
        }
    };

    match format {
        OutputFormat::Table => {
            println!("\nSummary of #{} {}:", rank, title);
            println!("{}", summary);
        }
        OutputFormat::Json => {
            let json = serde_json::json!({ "rank": rank, "title": title, "summary": summary });
            println!(
                "{}",
                serde_json::to_string_pretty(&json)
                    .with_context(|| "Failed to serialize summary to JSON")?
            );
        }
    }
    Ok(())
}

/// Run interactive REPL mode
async fn run_interactive<E, S>(explorer: Explorer<E, S>, mut format: OutputFormat) -> Result<()>
where
    E: EmbeddingProvider,
    S: Summarizer,
{
    let mut top_k = explorer.top_k();

    println!("Interactive Publication Search");
    println!("{}", HELP);
    println!();

    let mut rl = DefaultEditor::new().with_context(|| "Failed to create readline editor")?;

    // None until the first search of the session
    let mut last_hits: Option<Vec<SearchHit>> = None;

    loop {
        let readline = rl.readline("Search> ");
        match readline {
            Ok(line) => {
                let line = line.trim();

                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line).ok();

                if line.starts_with('/') {
                    let parts: Vec<&str> = line.split_whitespace().collect();
                    match parts[0] {
                        "/help" => println!("{}", HELP),
                        "/top" => {
                            if parts.len() != 2 {
                                eprintln!("Usage: /top N");
                                continue;
                            }
                            match parts[1].parse::<usize>() {
                                Ok(n) if n > 0 => {
                                    top_k = n;
                                    println!("Set top-k to {}", top_k);
                                }
                                _ => eprintln!("Invalid number: must be a positive integer"),
                            }
                        }
                        "/format" => {
                            if parts.len() != 2 {
                                eprintln!("Usage: /format [table|json]");
                                continue;
                            }
                            match parts[1] {
                                "table" => {
                                    format = OutputFormat::Table;
                                    println!("Set output format to table");
                                }
                                "json" => {
                                    format = OutputFormat::Json;
                                    println!("Set output format to JSON");
                                }
                                _ => eprintln!("Invalid format: must be 'table' or 'json'"),
                            }
                        }
                        "/detail" | "/summarize" => {
                            if parts.len() != 2 {
                                eprintln!("Usage: {} N", parts[0]);
                                continue;
                            }
                            let Ok(rank) = parts[1].parse::<usize>() else {
                                eprintln!("Invalid rank: must be a positive integer");
                                continue;
                            };
                            let hit = match hit_at_rank(last_hits.as_deref(), rank) {
                                Ok(hit) => *hit,
                                Err(msg) => {
                                    eprintln!("{}", msg);
                                    continue;
                                }
                            };
                            if parts[0] == "/detail" {
                                match explorer.publication(&hit) {
                                    Some(paper) => display_result_detail(&hit, paper, rank),
                                    None => eprintln!("Publication {} not in corpus", hit.corpus_id),
                                }
                            } else if let Err(e) = show_summary(&explorer, &hit, rank, format).await {
                                eprintln!("{}", e);
                            }
                        }
                        _ => eprintln!(
                            "Unknown command: {}. Type /help for available commands.",
                            parts[0]
                        ),
                    }
                } else {
                    let start = Instant::now();
                    match explorer.search(line, top_k).await {
                        Ok(hits) => {
                            if let Err(e) = print_results(&explorer, &hits, format, start.elapsed()) {
                                eprintln!("Error formatting results: {}", e);
                            }
                            last_hits = Some(hits);
                        }
                        Err(e) => eprintln!("Search failed: {}", e),
                    }
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                error!("Error reading input: {}", err);
                break;
            }
        }
    }

    Ok(())
}

/// Run single-query mode
async fn run_single_query<E, S>(
    explorer: Explorer<E, S>,
    query: &str,
    summarize_rank: Option<usize>,
    format: OutputFormat,
) -> Result<()>
where
    E: EmbeddingProvider,
    S: Summarizer,
{
    if query.trim().is_empty() {
        println!("{}", NO_SEARCH_MESSAGE);
        return Ok(());
    }

    let start = Instant::now();
    let hits = explorer
        .search(query, explorer.top_k())
        .await
        .with_context(|| format!("Failed to execute search for query: '{}'", query))?;
    print_results(&explorer, &hits, format, start.elapsed())?;

    if let Some(rank) = summarize_rank {
        let hit = hit_at_rank(Some(&hits), rank).map_err(anyhow::Error::msg)?;
        show_summary(&explorer, hit, rank, format).await?;
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(&args.log_level);

    if !args.interactive && args.query.is_none() {
        anyhow::bail!(
            "Either --query or --interactive must be specified.\n\
             Use --help for usage information."
        );
    }

    let config = args.to_config();
    info!(
        version = bioquery::VERSION,
        publications = %config.corpus.publications.display(),
        embeddings = %config.corpus.embeddings.display(),
        summarizer = %config.summarizer_dir.display(),
        "Starting up"
    );

    let pb = spinner("Loading models and publication data...");
    let loaded = Explorer::load(&config).await;
    pb.finish_and_clear();
    let explorer = loaded.map_err(|e| startup_error(e, &config))?;

    println!("Loaded {} publications.", explorer.corpus().len());

    match args.query {
        Some(query) if !args.interactive => {
            run_single_query(explorer, &query, args.summarize, args.format).await?
        }
        _ => run_interactive(explorer, args.format).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_parse() {
        Args::command().debug_assert();
        let args = Args::parse_from(["bioquery", "--query", "bone loss", "--summarize", "2"]);
        assert_eq!(args.query.as_deref(), Some("bone loss"));
        assert_eq!(args.summarize, Some(2));
        assert_eq!(args.top_k, DEFAULT_TOP_K);
        assert_eq!(args.summary_timeout_secs, 120);
        assert_eq!(args.encoding, "latin-1");
    }

    #[test]
    fn test_summarize_requires_query() {
        assert!(Args::try_parse_from(["bioquery", "-i", "--summarize", "1"]).is_err());
        assert!(Args::try_parse_from(["bioquery", "-i", "--query", "x"]).is_err());
    }

    #[test]
    fn test_args_to_config() {
        let args = Args::parse_from([
            "bioquery",
            "-i",
            "--publications",
            "data/p.csv",
            "--top-k",
            "3",
            "--summary-timeout-secs",
            "9",
            "--cache-dir",
            "/tmp/fe",
        ]);
        let config = args.to_config();
        assert_eq!(config.corpus.publications, PathBuf::from("data/p.csv"));
        assert_eq!(config.top_k, 3);
        assert_eq!(config.summarizer.timeout, Duration::from_secs(9));
        assert_eq!(config.embedding_cache_dir, Some(PathBuf::from("/tmp/fe")));
    }

    #[test]
    fn test_hit_at_rank() {
        let hits = vec![SearchHit::new(4, 0.9), SearchHit::new(1, 0.8)];
        assert_eq!(hit_at_rank(None, 1).unwrap_err(), NO_SEARCH_MESSAGE);
        assert_eq!(hit_at_rank(Some(&[]), 1).unwrap_err(), NO_RESULTS_MESSAGE);
        assert_eq!(hit_at_rank(Some(&hits), 2).unwrap().corpus_id, 1);
        assert!(hit_at_rank(Some(&hits), 0).is_err());
        assert!(hit_at_rank(Some(&hits), 3).is_err());
    }

    #[test]
    fn test_ellipsize_is_char_safe() {
        assert_eq!(ellipsize("short", 10), "short");
        assert_eq!(ellipsize("Müller Müller Müller", 10), "Müller ...");
    }

    #[test]
    fn test_table_and_json_render() {
        let paper = Publication::new("Bone loss".into(), None, Some("2014".into()), "Text".into());
        let hit = SearchHit::new(0, 0.9);
        let rows = vec![(&hit, &paper)];

        let table = format_results_table(&rows);
        assert!(table.contains("Bone loss"));
        assert!(table.contains("HIGHLY_SIMILAR"));

        let json: serde_json::Value = serde_json::from_str(&format_results_json(&rows).unwrap()).unwrap();
        assert_eq!(json[0]["rank"], 1);
        assert_eq!(json[0]["title"], "Bone loss");
        assert_eq!(json[0]["authors"], "N/A");
        assert_eq!(json[0]["abstract"], "Text");
        assert_eq!(json[0]["relevance"], "HIGHLY_SIMILAR");
    }
}
