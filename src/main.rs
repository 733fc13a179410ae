//! CLI entry point for the vector index engine.
//!
//! Provides commands for building, extending, searching and inspecting a
//! persisted index. Main components: Cli parser, Commands enum, and the
//! async runtime that drives ingestion.

use anyhow::{Context, Result, bail};
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::{Path, PathBuf};
use tracing::Level;
use vecdex::display::{
    THEME, create_help_text, create_info_table, create_progress_bar, create_results_table,
    create_skipped_table, with_spinner,
};
use vecdex::{IngestReport, RawContent, Settings, VecdexError, VectorEngine};

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Vector index engine
#[derive(Parser)]
#[command(
    name = "vecdex",
    version = env!("CARGO_PKG_VERSION"),
    about = "Vector index engine for similarity search",
    long_about = "Build exact or inverted-file vector indexes over text, images and precomputed embeddings, then search them.",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = create_help_text()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Initialize project
    #[command(about = "Set up .vecdex directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Build a new index, replacing any existing one
    #[command(about = "Build an index from a directory, JSON catalog or file")]
    Build {
        /// Directory, JSON catalog or single file
        source: PathBuf,

        /// Show progress during extraction
        #[arg(short, long)]
        progress: bool,

        /// Output the ingestion report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Add items to the existing index
    #[command(about = "Append a batch to the index without rebuilding")]
    Add {
        /// Directory, JSON catalog or single file
        source: PathBuf,

        /// Show progress during extraction
        #[arg(short, long)]
        progress: bool,

        /// Output the ingestion report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Search the index
    #[command(
        about = "Find the nearest items to a text, file, URL or vector",
        after_help = "Examples:\n  vecdex search \"red running shoe\"\n  vecdex search photos/query.txt -k 10\n  vecdex search --vector \"0.1,0.9\" --json"
    )]
    Search {
        /// Query text, or a path or URL to extract features from
        #[arg(required_unless_present = "vector")]
        query: Option<String>,

        /// Comma-separated query vector, bypassing feature extraction
        #[arg(long, conflicts_with = "query")]
        vector: Option<String>,

        /// Number of results (defaults to query.default_k)
        #[arg(short = 'k', long)]
        k: Option<usize>,

        /// Regions to scan in an approximate index
        #[arg(long)]
        probes: Option<usize>,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show index statistics
    #[command(about = "Display flavor, size and sizing of the index")]
    Info {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show current configuration settings
    #[command(about = "Display active settings from .vecdex/settings.toml")]
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{}", THEME.error_with_icon(&format!("Error: {e:#}")));
        if let Some(error) = e.downcast_ref::<VecdexError>() {
            for suggestion in error.recovery_suggestions() {
                eprintln!("  {}", THEME.apply(&THEME.dim, format!("- {suggestion}")));
            }
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = if let Some(config_path) = &cli.config {
        Settings::load_from(config_path).map_err(|e| {
            anyhow::anyhow!(
                "configuration error loading from {}: {e}",
                config_path.display()
            )
        })?
    } else {
        Settings::load().unwrap_or_else(|e| {
            eprintln!("Configuration error: {e}");
            eprintln!("Using default configuration.");
            Settings::default()
        })
    };

    init_tracing(cli.verbose, config.debug);

    match cli.command {
        Commands::Init { force } => {
            let path = Settings::init_config_file(force)
                .map_err(|e| anyhow::anyhow!("{e}"))
                .context("could not create configuration file")?;
            println!(
                "{}",
                THEME.success_with_icon(&format!(
                    "Created configuration file at: {}",
                    path.display()
                ))
            );
            println!("Edit this file to customize your settings.");
        }

        Commands::Config => {
            println!("Current Configuration:");
            println!("{}", "=".repeat(50));
            println!("{}", toml::to_string_pretty(&config)?);
        }

        Commands::Build {
            source,
            progress,
            json,
        } => {
            let engine = open_engine(config)?;
            let items = engine.load_items(&source)?;
            let bar = progress.then(|| create_progress_bar(items.len() as u64, "Extracting"));

            let (info, report) = engine.build_index(items, bar.clone()).await?;
            if let Some(bar) = bar {
                bar.finish_and_clear();
            }

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "index": info,
                        "report": report,
                    }))?
                );
            } else {
                print_report(&report, &source);
                println!("{}", create_info_table(&info, engine.paths()));
            }
        }

        Commands::Add {
            source,
            progress,
            json,
        } => {
            let engine = open_engine(config)?;
            let items = engine.load_items(&source)?;
            let bar = progress.then(|| create_progress_bar(items.len() as u64, "Extracting"));

            let report = engine.add_to_index(items, bar.clone()).await?;
            if let Some(bar) = bar {
                bar.finish_and_clear();
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report, &source);
            }
        }

        Commands::Search {
            query,
            vector,
            k,
            probes,
            json,
        } => {
            if probes.is_some() {
                config.query.probes = probes;
            }
            let k = k.unwrap_or(config.query.default_k);
            if k == 0 {
                bail!("-k must be at least 1");
            }

            let engine = open_engine(config)?;
            let outcome = match (vector, query) {
                (Some(vector), _) => engine.search_vector(&parse_vector(&vector)?, k)?,
                (None, Some(query)) => engine.search(&query_content(&query), k)?,
                (None, None) => bail!("provide a query or --vector"),
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{}", create_results_table(&outcome));
            }
        }

        Commands::Info { json } => {
            let engine = open_engine(config)?;
            let info = engine.info()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("{}", create_info_table(&info, engine.paths()));
            }
        }
    }

    Ok(())
}

/// Installs the stderr log subscriber.
fn init_tracing(verbose: u8, debug: bool) {
    let level = match verbose {
        0 if debug => Level::DEBUG,
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn open_engine(config: Settings) -> Result<VectorEngine> {
    let engine = if config.embedding.extractor == "fastembed" {
        let model = config.embedding.model.clone();
        with_spinner(&format!("Loading embedding model {model}"), || {
            VectorEngine::from_settings(config, false)
        })?
    } else {
        VectorEngine::from_settings(config, false)?
    };
    Ok(engine)
}

/// Interprets a query argument as a URL, an existing file or plain text.
fn query_content(query: &str) -> RawContent {
    if query.starts_with("http://") || query.starts_with("https://") {
        RawContent::Url(query.to_string())
    } else if Path::new(query).is_file() {
        RawContent::Path(PathBuf::from(query))
    } else {
        RawContent::Text(query.to_string())
    }
}

fn parse_vector(raw: &str) -> Result<Vec<f32>> {
    raw.split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .with_context(|| format!("invalid vector component '{}'", part.trim()))
        })
        .collect()
}

fn print_report(report: &IngestReport, source: &Path) {
    let message = format!(
        "Indexed {} items from {} starting at ordinal {}",
        report.added,
        source.display(),
        report.first_ordinal
    );
    println!("{}", THEME.success_with_icon(&message));
    if report.trained {
        println!("{}", THEME.apply(&THEME.dim, "Trained region centroids"));
    }
    if !report.skipped.is_empty() {
        println!(
            "{}",
            THEME.warning_with_icon(&format!("Skipped {} items", report.skipped.len()))
        );
        println!("{}", create_skipped_table(&report.skipped));
    }
}
