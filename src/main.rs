//! Catalog-Sieve main entry point
//!
//! This is the command-line interface for the staged catalog pipeline. Every
//! stage is its own subcommand; `run` sequences them.

use anyhow::Context;
use catalog_sieve::artifact::{read_json, read_stats};
use catalog_sieve::config::{load_config_with_hash, DedupeStrategy};
use catalog_sieve::pipeline::{
    run_named, run_pipeline, RunOptions, RunSummary, StageContext, StageOptions, STAGE_NAMES,
};
use catalog_sieve::SieveError;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Catalog-Sieve: a staged crawl-to-clean catalog extractor
///
/// Discovers a site's URLs, groups them into templates, validates an
/// extraction recipe on a sample and then fetches, extracts, deduplicates,
/// cleans and loads the full catalog. Artifacts live under
/// `<data-dir>/<domain>/`.
#[derive(Parser, Debug)]
#[command(name = "catalog-sieve")]
#[command(version)]
#[command(about = "A staged crawl-to-clean catalog extractor", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(long, global = true, default_value = "catalog-sieve.toml")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct DomainArg {
    /// Target site, e.g. shop.example.com
    domain: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Discover the site's URLs
    Crawl {
        #[command(flatten)]
        target: DomainArg,

        /// Resume an interrupted crawl (default behavior)
        #[arg(long, conflicts_with = "fresh")]
        resume: bool,

        /// Start a fresh crawl, ignoring the checkpoint
        #[arg(long, conflicts_with = "resume")]
        fresh: bool,
    },

    /// Group crawled URLs into ranked templates
    Group {
        #[command(flatten)]
        target: DomainArg,
    },

    /// Validate the extraction recipe on a sample of one template
    Probe {
        #[command(flatten)]
        target: DomainArg,

        /// Template to sample instead of the top-ranked product template
        #[arg(long)]
        pattern: Option<String>,
    },

    /// Fetch every page of the approved template
    Fetch {
        #[command(flatten)]
        target: DomainArg,

        #[arg(long)]
        pattern: Option<String>,

        #[arg(long)]
        batch_size: Option<usize>,

        #[arg(long)]
        max_urls: Option<usize>,
    },

    /// Extract raw records from fetched pages
    Extract {
        #[command(flatten)]
        target: DomainArg,
    },

    /// Collapse duplicate records
    Dedupe {
        #[command(flatten)]
        target: DomainArg,

        /// Identity strategy: auto, url, content or id
        #[arg(long)]
        strategy: Option<DedupeStrategy>,
    },

    /// Clean and validate records into the catalog
    Clean {
        #[command(flatten)]
        target: DomainArg,
    },

    /// Persist the catalog to the configured store
    Load {
        #[command(flatten)]
        target: DomainArg,
    },

    /// Re-check loaded URLs for redirects, 404s and template drift
    Refresh {
        #[command(flatten)]
        target: DomainArg,

        /// Mark superseded store entries inactive
        #[arg(long)]
        apply: bool,
    },

    /// Run the pipeline, or part of it
    Run {
        #[command(flatten)]
        target: DomainArg,

        /// First stage to run
        #[arg(long)]
        start: Option<String>,

        /// Last stage to run
        #[arg(long)]
        end: Option<String>,

        /// Stage to skip (repeatable)
        #[arg(long)]
        skip: Vec<String>,

        /// Run only the refresher
        #[arg(long, conflicts_with_all = ["start", "end"])]
        refresh: bool,

        /// Confirm a manual gate (repeatable)
        #[arg(long)]
        confirm: Vec<String>,

        #[arg(long)]
        pattern: Option<String>,

        #[arg(long)]
        batch_size: Option<usize>,

        #[arg(long)]
        max_urls: Option<usize>,

        #[arg(long)]
        strategy: Option<DedupeStrategy>,

        #[arg(long)]
        fresh: bool,
    },

    /// Show the latest statistics of every stage
    Stats {
        #[command(flatten)]
        target: DomainArg,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            match e.downcast_ref::<SieveError>() {
                Some(SieveError::GateBlocked { .. }) => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("catalog_sieve=info,warn"),
            1 => EnvFilter::new("catalog_sieve=debug,info"),
            2 => EnvFilter::new("catalog_sieve=trace,debug"),
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

async fn run(cli: Cli) -> anyhow::Result<()> {
    tracing::debug!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::debug!("Configuration loaded (hash: {})", config_hash);
    let config = Arc::new(config);

    let context = |domain: &str, options: StageOptions| {
        StageContext::new(domain, Arc::clone(&config))
            .with_options(options)
            .with_config_hash(&config_hash)
    };

    match cli.command {
        Command::Crawl {
            target,
            resume: _,
            fresh,
        } => {
            let ctx = context(
                &target.domain,
                StageOptions {
                    fresh,
                    ..Default::default()
                },
            );
            run_single("crawl", &ctx).await
        }
        Command::Group { target } => run_single("group", &context(&target.domain, StageOptions::default())).await,
        Command::Probe { target, pattern } => {
            let ctx = context(
                &target.domain,
                StageOptions {
                    pattern,
                    ..Default::default()
                },
            );
            run_single("probe", &ctx).await
        }
        Command::Fetch {
            target,
            pattern,
            batch_size,
            max_urls,
        } => {
            let ctx = context(
                &target.domain,
                StageOptions {
                    pattern,
                    batch_size,
                    max_urls,
                    ..Default::default()
                },
            );
            run_single("fetch", &ctx).await
        }
        Command::Extract { target } => run_single("extract", &context(&target.domain, StageOptions::default())).await,
        Command::Dedupe { target, strategy } => {
            let ctx = context(
                &target.domain,
                StageOptions {
                    strategy,
                    ..Default::default()
                },
            );
            run_single("dedupe", &ctx).await
        }
        Command::Clean { target } => run_single("clean", &context(&target.domain, StageOptions::default())).await,
        Command::Load { target } => run_single("load", &context(&target.domain, StageOptions::default())).await,
        Command::Refresh { target, apply } => {
            let ctx = context(
                &target.domain,
                StageOptions {
                    apply_refresh: apply,
                    ..Default::default()
                },
            );
            run_single("refresh", &ctx).await
        }
        Command::Run {
            target,
            start,
            end,
            skip,
            refresh,
            confirm,
            pattern,
            batch_size,
            max_urls,
            strategy,
            fresh,
        } => {
            let ctx = context(
                &target.domain,
                StageOptions {
                    pattern,
                    batch_size,
                    max_urls,
                    fresh,
                    strategy,
                    apply_refresh: false,
                },
            );
            let options = RunOptions {
                start,
                end,
                skip,
                refresh,
                confirmed: confirm,
            };
            watch_interrupt(&ctx);
            let summary = run_pipeline(&ctx, &options).await?;
            print_summary(&summary);
            Ok(())
        }
        Command::Stats { target } => show_stats(&context(&target.domain, StageOptions::default())),
    }
}

/// Sets the context's stop flag on Ctrl-C
fn watch_interrupt(ctx: &StageContext) {
    let stop = ctx.stop_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current batch");
            stop.store(true, Ordering::SeqCst);
        }
    });
}

async fn run_single(stage: &str, ctx: &StageContext) -> anyhow::Result<()> {
    watch_interrupt(ctx);
    let stats = run_named(stage, ctx).await?;
    println!(
        "{}: input {}, output {}, dropped {}",
        stats.stage,
        stats.input,
        stats.output,
        stats.dropped_total()
    );
    for (reason, count) in &stats.dropped {
        println!("  {:<24} {}", reason, count);
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("=== Run summary for {} ===", summary.domain);
    for outcome in &summary.stages {
        let counts = match (outcome.input, outcome.output) {
            (Some(input), Some(output)) => format!("{} -> {}", input, output),
            _ => String::new(),
        };
        let status = format!("{:?}", outcome.status);
        println!("  {:<8} {:<10} {}", outcome.stage, status, counts);
    }
}

/// Handles the `stats` command: prints every stage's latest statistics
fn show_stats(ctx: &StageContext) -> anyhow::Result<()> {
    println!("=== {} ({}) ===\n", ctx.domain, ctx.paths.root().display());

    let mut found = false;
    for stage in STAGE_NAMES {
        let Some(stats) = read_stats(&ctx.paths, stage)? else {
            continue;
        };
        found = true;
        println!(
            "{:<8} input {:>8}  output {:>8}  dropped {:>8}  ({})",
            stats.stage,
            stats.input,
            stats.output,
            stats.dropped_total(),
            stats.finished_at.format("%Y-%m-%d %H:%M:%S")
        );
        for (reason, count) in &stats.dropped {
            println!("    {:<24} {}", reason, count);
        }
    }
    if !found {
        println!("No stage has run for {} yet", ctx.domain);
    }

    let summary_path = ctx.paths.run_summary();
    if summary_path.exists() {
        let summary: RunSummary = read_json(&summary_path)?;
        println!();
        print_summary(&summary);
        if let Some(gate) = &summary.blocked_at {
            println!("  blocked at gate '{}'", gate);
        }
    }
    Ok(())
}
