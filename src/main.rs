use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context};
use chrono::{Duration, Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use edgar_classifier::classifier::categories::DEFAULT_EVENT_CONFIG_PATH;
use edgar_classifier::classifier::{EventClassifier, FewShotExample, PromptStrategy, DEFAULT_MAX_RETRIES};
use edgar_classifier::config::{LlmConfig, DEFAULT_LLM_CONFIG_PATH};
use edgar_classifier::db::{self, ClassificationRecord, DEFAULT_DB_PATH};
use edgar_classifier::edgar::{self, EdgarClient, FilingInfo, DEFAULT_USER_AGENT};
use edgar_classifier::llm::{LlmClient, TextGenerator};
use edgar_classifier::parser;

#[derive(Parser)]
#[command(name = "edgar_classifier", about = "Classify SEC 8-K filing events with a local LLM")]
struct Cli {
    /// LLM settings file (overridable with EDGAR_LLM_* variables)
    #[arg(long, global = true, default_value = DEFAULT_LLM_CONFIG_PATH)]
    llm_config: PathBuf,
    /// Event category definitions
    #[arg(long, global = true, default_value = DEFAULT_EVENT_CONFIG_PATH)]
    event_config: PathBuf,
    /// SQLite database
    #[arg(long, global = true, default_value = DEFAULT_DB_PATH)]
    db: PathBuf,
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify one filing from a local HTML file or a URL
    Classify {
        /// Path or http(s) URL of the filing
        source: String,
        /// basic, detailed, cot or few_shot
        #[arg(short, long, default_value = "detailed")]
        strategy: PromptStrategy,
        /// JSON array of few-shot examples
        #[arg(long)]
        examples: Option<PathBuf>,
        /// Extra attempts after the first
        #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
        max_retries: u32,
        /// Ask the model to double-check the result
        #[arg(long)]
        validate: bool,
        /// Print the extracted text
        #[arg(long)]
        show_text: bool,
        #[arg(long, default_value = DEFAULT_USER_AGENT)]
        user_agent: String,
    },
    /// Fetch recent 8-K filings for a company, store and classify them
    Scrape {
        /// Company CIK
        #[arg(long, conflicts_with = "company")]
        cik: Option<String>,
        /// Company name from the `companies` list
        #[arg(long)]
        company: Option<String>,
        /// Look back this many days (ignored with --start-date)
        #[arg(long, default_value = "30")]
        days: i64,
        /// YYYY-MM-DD
        #[arg(long)]
        start_date: Option<NaiveDate>,
        /// YYYY-MM-DD (default: today)
        #[arg(long)]
        end_date: Option<NaiveDate>,
        /// Max filings to download
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// List filings without downloading
        #[arg(long)]
        dry_run: bool,
        /// Download and extract only
        #[arg(long)]
        no_classify: bool,
        #[arg(short, long, default_value = "detailed")]
        strategy: PromptStrategy,
        #[arg(long, default_value = DEFAULT_USER_AGENT)]
        user_agent: String,
    },
    /// Show the built-in company list
    Companies,
    /// Stored classifications
    Report {
        #[arg(long)]
        cik: Option<String>,
        #[arg(long)]
        relevant_only: bool,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    /// Database statistics
    Stats,
    /// Check that the LLM provider and model are usable
    Check {
        /// Pull the model if it is missing
        #[arg(long)]
        pull: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .init();

    let t0 = Instant::now();

    let result = match cli.command {
        Commands::Classify {
            ref source,
            strategy,
            ref examples,
            max_retries,
            validate,
            show_text,
            ref user_agent,
        } => {
            let raw = read_source(source, user_agent).await?;
            let text = parser::extract(&raw);
            println!("Extracted {} characters of text", text.chars().count());
            if text.is_empty() {
                bail!("no text could be extracted from {}", source);
            }
            if show_text {
                println!("\n{}\n{}\n{}", "-".repeat(60), text, "-".repeat(60));
            }

            let examples = examples.as_deref().map(load_examples).transpose()?;
            let classifier = build_classifier(&cli.llm_config, &cli.event_config).await?;

            println!("Classifying with strategy '{}'...", strategy);
            let outcome = classifier
                .classify_detailed(&text, strategy, examples.as_deref(), Some(max_retries), None)
                .await;

            match outcome.result {
                Some(result) => {
                    println!("\n{}", "=".repeat(60));
                    println!("Event Type: {}", result.event_type);
                    println!("Relevant:   {}", if result.relevant { "yes" } else { "no" });
                    println!("Confidence: {:.2}", result.confidence);
                    println!("Strategy:   {}", strategy);
                    if !result.reasoning.is_empty() {
                        println!("Reasoning:");
                        for line in result.reasoning.lines() {
                            println!("  {}", line);
                        }
                    }
                    println!("{}", "=".repeat(60));

                    if validate {
                        let proposed = format!(
                            "Event Type: {}, Relevant: {}",
                            result.event_type, result.relevant
                        );
                        let ok = classifier.validate(&text, &proposed).await;
                        println!("Validation: {}", if ok { "VALID" } else { "INVALID" });
                    }
                    Ok(())
                }
                None => {
                    for (i, raw) in outcome.raw_responses().iter().enumerate() {
                        println!("Response {}: {}", i + 1, truncate(raw, 200));
                    }
                    bail!(
                        "classification failed after {} attempts",
                        outcome.attempts.len()
                    )
                }
            }
        }
        Commands::Scrape {
            ref cik,
            ref company,
            days,
            start_date,
            end_date,
            limit,
            dry_run,
            no_classify,
            strategy,
            ref user_agent,
        } => {
            let cik = resolve_cik(cik.as_deref(), company.as_deref())?;
            let end = end_date.unwrap_or_else(|| Local::now().date_naive());
            let start = match start_date {
                Some(start) => start,
                None => lookback_start(end, days)?,
            };
            if start > end {
                bail!("start date {} is after end date {}", start, end);
            }

            let client = EdgarClient::new(user_agent)?;
            let mut filings = client.list_8k_filings(&cik, Some(start), Some(end)).await?;
            if let Some(n) = limit {
                filings.truncate(n);
            }
            println!("Found {} 8-K filings for CIK {} ({} to {})", filings.len(), cik, start, end);
            if filings.is_empty() {
                return Ok(());
            }

            if dry_run {
                for f in &filings {
                    println!("  {} | {} | {}", f.filing_date, f.accession_number, truncate(&f.company_name, 30));
                }
                return Ok(());
            }

            let conn = db::connect(&cli.db)?;
            db::init_schema(&conn)?;

            let downloaded = download_filings(&client, &conn, &filings).await?;
            println!("Downloaded {}/{} filings", downloaded.len(), filings.len());

            let texts = extract_texts(&conn, &downloaded)?;
            let non_empty = texts.iter().filter(|(_, t)| !t.is_empty()).count();
            println!("Extracted text from {} filings", non_empty);

            if no_classify {
                return Ok(());
            }

            let classifier = build_classifier(&cli.llm_config, &cli.event_config).await?;
            let counts = classify_filings(&conn, &classifier, &texts, strategy).await?;
            counts.print();
            Ok(())
        }
        Commands::Companies => {
            println!("{:<12} | {:>10}", "Company", "CIK");
            println!("{}", "-".repeat(25));
            for (name, cik) in edgar::POPULAR_COMPANIES {
                println!("{:<12} | {:>10}", name, cik);
            }
            Ok(())
        }
        Commands::Report { ref cik, relevant_only, limit } => {
            let conn = db::connect(&cli.db)?;
            db::init_schema(&conn)?;
            let rows = db::fetch_report(&conn, cik.as_deref(), relevant_only, limit)?;
            if rows.is_empty() {
                println!("No classifications found. Run 'scrape' first.");
                return Ok(());
            }

            println!(
                "{:>3} | {:<10} | {:<20} | {:<20} | {:<16} | {:<3} | {:<8}",
                "#", "Date", "Company", "Accession", "Event", "Rel", "Strategy"
            );
            println!("{}", "-".repeat(96));
            for (i, r) in rows.iter().enumerate() {
                let date = r.filing_date.as_deref().unwrap_or("-");
                let company = truncate(r.company_name.as_deref().unwrap_or("-"), 20);
                println!(
                    "{:>3} | {:<10} | {:<20} | {:<20} | {:<16} | {:<3} | {:<8}",
                    i + 1,
                    date,
                    company,
                    r.accession_number,
                    truncate(&r.event_type, 16),
                    if r.relevant { "yes" } else { "no" },
                    r.prompt_strategy
                );
            }
            println!("\n{} classifications", rows.len());
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&cli.db)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Filings:         {}", s.filings);
            println!("With text:       {}", s.with_text);
            println!("Classifications: {}", s.classifications);
            println!("Relevant:        {}", s.relevant);
            if !s.by_event_type.is_empty() {
                println!();
                for (event_type, total, relevant) in &s.by_event_type {
                    println!("  {:<20} {:>5} ({} relevant)", event_type, total, relevant);
                }
            }
            Ok(())
        }
        Commands::Check { pull } => {
            let config = LlmConfig::load(&cli.llm_config)?;
            let client = LlmClient::from_config(&config)?;
            println!("Provider: {}", client.provider());
            println!("Model:    {}", client.model());

            let models = client.list_models().await;
            if models.is_empty() {
                println!("Installed models: none (is the runtime running?)");
            } else {
                println!("Installed models: {}", models.join(", "));
            }

            let mut available = client.is_available().await;
            if !available && pull {
                println!("Pulling {}...", client.model());
                available = client.pull_model().await && client.is_available().await;
            }
            println!("Available: {}", if available { "yes" } else { "no" });
            if !available {
                bail!("model {} is not available", client.model());
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn build_classifier(llm_config: &Path, event_config: &Path) -> anyhow::Result<EventClassifier> {
    let config = LlmConfig::load(llm_config)?;
    let client = LlmClient::from_config(&config)?;
    if !client.is_available().await {
        bail!(
            "{} model {} is not available; run `edgar_classifier check --pull`",
            client.provider(),
            client.model()
        );
    }
    info!("Using {} model {}", client.provider(), client.model());
    let classifier = EventClassifier::from_config_file(Arc::new(client), event_config)?
        .with_timeout(config.timeout());
    Ok(classifier)
}

async fn read_source(source: &str, user_agent: &str) -> anyhow::Result<String> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let client = EdgarClient::new(user_agent)?;
        client.fetch_document(source).await
    } else {
        std::fs::read_to_string(source).with_context(|| format!("reading {}", source))
    }
}

fn load_examples(path: &Path) -> anyhow::Result<Vec<FewShotExample>> {
    let json = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("parsing examples in {}", path.display()))
}

fn resolve_cik(cik: Option<&str>, company: Option<&str>) -> anyhow::Result<String> {
    match (cik, company) {
        (Some(cik), _) => Ok(cik.to_string()),
        (None, Some(name)) => edgar::lookup_company(name)
            .map(str::to_string)
            .with_context(|| format!("unknown company '{}'; see `edgar_classifier companies`", name)),
        (None, None) => bail!("pass --cik or --company"),
    }
}

fn progress_bar(len: usize) -> indicatif::ProgressBar {
    use indicatif::{ProgressBar, ProgressStyle};

    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb
}

async fn download_filings(
    client: &EdgarClient,
    conn: &rusqlite::Connection,
    filings: &[FilingInfo],
) -> anyhow::Result<Vec<(FilingInfo, String)>> {
    let pb = progress_bar(filings.len());
    let mut downloaded = Vec::with_capacity(filings.len());

    for filing in filings {
        pb.set_message(filing.accession_number.clone());
        match client.download(filing).await {
            Ok(raw) => {
                db::save_filing(conn, filing, Some(&raw), None)?;
                downloaded.push((filing.clone(), raw));
            }
            Err(e) => {
                warn!("Error downloading {}: {:#}", filing.accession_number, e);
                db::save_filing(conn, filing, None, None)?;
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    Ok(downloaded)
}

fn extract_texts(
    conn: &rusqlite::Connection,
    downloaded: &[(FilingInfo, String)],
) -> anyhow::Result<Vec<(FilingInfo, String)>> {
    use rayon::prelude::*;

    let texts: Vec<(FilingInfo, String)> = downloaded
        .par_iter()
        .map(|(filing, raw)| (filing.clone(), parser::extract(raw)))
        .collect();

    for (filing, text) in &texts {
        db::save_filing(conn, filing, None, Some(text))?;
    }
    Ok(texts)
}

struct ClassifyCounts {
    classified: usize,
    relevant: usize,
    skipped: usize,
    failed: usize,
}

impl ClassifyCounts {
    fn print(&self) {
        println!(
            "Classified {} filings ({} relevant), {} skipped, {} failed.",
            self.classified, self.relevant, self.skipped, self.failed,
        );
    }
}

async fn classify_filings(
    conn: &rusqlite::Connection,
    classifier: &EventClassifier,
    texts: &[(FilingInfo, String)],
    strategy: PromptStrategy,
) -> anyhow::Result<ClassifyCounts> {
    let pb = progress_bar(texts.len());
    let mut counts = ClassifyCounts {
        classified: 0,
        relevant: 0,
        skipped: 0,
        failed: 0,
    };

    for (filing, text) in texts {
        pb.set_message(filing.accession_number.clone());
        if text.is_empty() || db::is_classified(conn, &filing.accession_number, strategy)? {
            counts.skipped += 1;
            pb.inc(1);
            continue;
        }

        let outcome = classifier
            .classify_detailed(text, strategy, None, None, Some(&filing.accession_number))
            .await;
        match outcome.result {
            Some(result) => {
                counts.classified += 1;
                if result.relevant {
                    counts.relevant += 1;
                }
                let record = ClassificationRecord::from_result(&filing.accession_number, &result, strategy);
                db::save_classifications(conn, std::slice::from_ref(&record))?;
            }
            None => {
                counts.failed += 1;
                warn!(
                    "No classification for {} after {} attempts",
                    filing.accession_number,
                    outcome.attempts.len()
                );
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    Ok(counts)
}

fn lookback_start(end: NaiveDate, days: i64) -> anyhow::Result<NaiveDate> {
    Duration::try_days(days)
        .and_then(|span| end.checked_sub_signed(span))
        .with_context(|| format!("--days {} is out of range", days))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

// ── Tests ──
