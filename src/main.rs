//! Markdoc main entry point
//!
//! This is the command-line interface for the Markdoc documentation crawler.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use markdoc::config::{load_settings_with_hash, PatternMode, Settings, TaskConfig};
use markdoc::crawler::RunOutcome;
use markdoc::{CrawlStatus, TaskRegistry, TaskStatus};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Markdoc: crawl documentation sites into markdown
///
/// Each task crawls one documentation site from a seed URL, following links
/// that match its include/exclude patterns, and stores every page as
/// markdown extracted by a reader service.
#[derive(Parser, Debug)]
#[command(name = "markdoc")]
#[command(version)]
#[command(about = "Crawl documentation sites into markdown", long_about = None)]
struct Cli {
    /// Path to TOML settings file (defaults apply when omitted)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Override the database path from the settings
    #[arg(long, value_name = "PATH", global = true)]
    database: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new pending task
    Create {
        /// Task title, also used as link text of the seed page
        #[arg(long)]
        title: String,

        /// Seed URL the crawl starts from
        #[arg(long)]
        seed: String,

        #[command(flatten)]
        config: TaskConfigArgs,
    },

    /// Start a pending task or resume a paused one, in the foreground
    Run { task_id: i64 },

    /// Pause a running task after its in-flight batch
    Pause { task_id: i64 },

    /// Resume a paused task, in the foreground
    Resume { task_id: i64 },

    /// Cancel a task, keeping what was crawled so far
    Cancel { task_id: i64 },

    /// Delete a task with its URLs and documents
    Delete { task_id: i64 },

    /// Show progress, counters and failures of a task
    Status { task_id: i64 },

    /// List all tasks
    List,

    /// List discovered URLs of a task
    Urls {
        task_id: i64,

        /// Only URLs in this crawl status (not_started, in_progress, succeeded, failed, skipped)
        #[arg(long, value_parser = parse_crawl_status)]
        status: Option<CrawlStatus>,
    },

    /// Print the stored markdown of a URL
    Show { task_id: i64, url: String },

    /// Queue a URL, or every failed URL, for crawling again
    Recrawl {
        task_id: i64,

        /// The URL to re-crawl
        #[arg(long, conflicts_with = "failed", required_unless_present = "failed")]
        url: Option<String>,

        /// Re-crawl every failed URL
        #[arg(long)]
        failed: bool,
    },

    /// Export crawled documents as a markdown directory tree
    Export { task_id: i64, output_dir: PathBuf },

    /// Replace the configuration of a pending or paused task
    Configure {
        task_id: i64,

        #[command(flatten)]
        config: TaskConfigArgs,
    },
}

/// URL patterns and extraction options of a task
#[derive(Args, Debug)]
struct TaskConfigArgs {
    /// Include pattern (repeatable); without any, the seed host is crawled
    #[arg(long = "include", value_name = "PATTERN")]
    include_patterns: Vec<String>,

    /// Exclude pattern (repeatable); excludes always win
    #[arg(long = "exclude", value_name = "PATTERN")]
    exclude_patterns: Vec<String>,

    /// How patterns are interpreted: prefix or regex
    #[arg(long = "mode", default_value = "prefix")]
    pattern_mode: PatternMode,

    /// CSS selector narrowing the extracted content (repeatable)
    #[arg(long = "selector", value_name = "CSS")]
    content_selectors: Vec<String>,

    /// Only discover links; do not extract content
    #[arg(long)]
    links_only: bool,
}

impl From<TaskConfigArgs> for TaskConfig {
    fn from(args: TaskConfigArgs) -> Self {
        TaskConfig {
            include_patterns: args.include_patterns,
            exclude_patterns: args.exclude_patterns,
            pattern_mode: args.pattern_mode,
            content_selectors: args.content_selectors,
            crawl_content: !args.links_only,
        }
    }
}

fn parse_crawl_status(s: &str) -> Result<CrawlStatus, String> {
    CrawlStatus::from_db_string(s).ok_or_else(|| format!("unknown crawl status '{}'", s))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let mut settings = match &cli.config {
        Some(path) => {
            tracing::info!("Loading settings from: {}", path.display());
            let (settings, hash) = load_settings_with_hash(path)
                .with_context(|| format!("failed to load settings from {}", path.display()))?;
            tracing::info!("Settings loaded successfully (hash: {})", hash);
            settings
        }
        None => Settings::default(),
    };

    if let Some(database) = &cli.database {
        settings.storage.database_path = database.display().to_string();
    }
    if settings.extraction.api_key.is_none() {
        settings.extraction.api_key = std::env::var("JINA_API_KEY").ok().filter(|k| !k.is_empty());
    }

    let registry = Arc::new(TaskRegistry::from_settings(&settings)?);

    match cli.command {
        Command::Create {
            title,
            seed,
            config,
        } => {
            let task_id = registry.create_task(&title, &seed, &config.into())?;
            println!("Created task {}", task_id);
        }
        Command::Run { task_id } => handle_run(registry, task_id).await?,
        Command::Resume { task_id } => {
            let status = registry.task(task_id)?.status;
            if status != TaskStatus::Paused {
                bail!("task {} is {}, only paused tasks can be resumed", task_id, status);
            }
            handle_run(registry, task_id).await?;
        }
        Command::Pause { task_id } => {
            registry.pause_task(task_id)?;
            println!("Task {} paused", task_id);
        }
        Command::Cancel { task_id } => {
            registry.cancel_task(task_id)?;
            println!("Task {} cancelled", task_id);
        }
        Command::Delete { task_id } => {
            registry.delete_task(task_id).await?;
            println!("Task {} deleted", task_id);
        }
        Command::Status { task_id } => print!("{}", registry.report(task_id)?),
        Command::List => handle_list(&registry)?,
        Command::Urls { task_id, status } => {
            for record in registry.list_urls(task_id, status)? {
                println!(
                    "{:<12} {:<20} {}{}",
                    record.crawl_status.to_db_string(),
                    record.link_status.to_db_string(),
                    record.url,
                    record
                        .error_message
                        .map(|e| format!("  ({})", e))
                        .unwrap_or_default()
                );
            }
        }
        Command::Show { task_id, url } => {
            let document = registry.document(task_id, &url)?;
            match document.error_message {
                Some(error) => bail!("{} failed: {}", document.url, error),
                None => print!("{}", document.content),
            }
        }
        Command::Recrawl {
            task_id,
            url,
            failed,
        } => {
            if failed {
                let reset = registry.recrawl_failed(task_id)?;
                println!("Queued {} failed URLs of task {}", reset, task_id);
            } else if let Some(url) = url {
                registry.recrawl_url(task_id, &url)?;
                println!("Queued {} of task {}", url, task_id);
            }
        }
        Command::Export {
            task_id,
            output_dir,
        } => {
            let written = registry.export(task_id, &output_dir)?;
            println!(
                "✓ Exported {} documents to {}",
                written.len(),
                output_dir.display()
            );
        }
        Command::Configure { task_id, config } => {
            registry.update_config(task_id, &config.into())?;
            println!("Task {} reconfigured", task_id);
        }
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("markdoc=info,warn"),
            1 => EnvFilter::new("markdoc=debug,info"),
            2 => EnvFilter::new("markdoc=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Runs a task in the foreground until it stops
///
/// Ctrl-C pauses the task; the runner finishes its in-flight batch first.
async fn handle_run(registry: Arc<TaskRegistry>, task_id: i64) -> anyhow::Result<()> {
    match registry.task(task_id)?.status {
        TaskStatus::Pending => registry.start_task(task_id).await?,
        TaskStatus::Paused => registry.resume_task(task_id).await?,
        other => bail!("task {} is {}, nothing to run", task_id, other),
    }

    let interrupt = {
        let registry = registry.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!(
                    "Interrupted, pausing task {} after the current batch",
                    task_id
                );
                if let Err(e) = registry.pause_task(task_id) {
                    tracing::error!("Failed to pause task {}: {}", task_id, e);
                }
            }
        })
    };

    let outcome = registry.wait(task_id).await;
    interrupt.abort();

    match outcome? {
        Some(RunOutcome::Completed) => println!("✓ Task {} completed", task_id),
        Some(RunOutcome::Paused) => {
            println!("Task {} paused; run it again to resume", task_id)
        }
        Some(RunOutcome::Cancelled) => println!("Task {} cancelled", task_id),
        Some(RunOutcome::Failed) => println!("Task {} failed", task_id),
        None => {}
    }

    print!("{}", registry.report(task_id)?);
    Ok(())
}

fn handle_list(registry: &TaskRegistry) -> anyhow::Result<()> {
    let tasks = registry.list_tasks()?;
    if tasks.is_empty() {
        println!("No tasks");
        return Ok(());
    }

    println!(
        "{:>4}  {:<10} {:>10} {:>8} {:>7}  {}",
        "ID", "STATUS", "DISCOVERED", "CRAWLED", "FAILED", "TITLE"
    );
    for task in tasks {
        println!(
            "{:>4}  {:<10} {:>10} {:>8} {:>7}  {} ({})",
            task.id,
            task.status.to_db_string(),
            task.counters.discovered,
            task.counters.crawled,
            task.counters.failed,
            task.title,
            task.seed_url
        );
    }
    Ok(())
}
