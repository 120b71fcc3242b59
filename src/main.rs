//! gzmirror - incremental gzip backup of a directory tree
//!
//! Exit status is non-zero only for usage errors, fatal directory failures
//! and interruption (130). Individual files that fail are logged and counted.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use gzmirror::cli::Args;
use gzmirror::compress;
use gzmirror::journal::JournalLogger;
use gzmirror::logger::{init_tracing, Fanout, Logger, TextLogger, TracingLogger};
use gzmirror::reconcile::{Reconciler, RunStats};

fn main() -> Result<()> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    ctrlc::set_handler(move || {
        if flag.swap(true, Ordering::SeqCst) {
            // Second Ctrl-C: exit immediately with 130 (128 + SIGINT)
            std::process::exit(130);
        }
        eprintln!("\nInterrupted by user. Finishing files in progress (Ctrl-C again to abort)...");
    })
    .context("Error setting Ctrl-C handler")?;

    let args = Args::parse();
    init_tracing(args.verbose, args.quiet, args.log_format)?;
    let config = args.resolve_config()?;

    let mut loggers: Vec<Arc<dyn Logger>> = vec![Arc::new(TracingLogger)];
    if let Some(path) = &config.log_file {
        let text = TextLogger::new(path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        loggers.push(Arc::new(text));
    }
    if let Some(path) = &config.journal {
        loggers.push(Arc::new(JournalLogger::new(path)?));
    }

    let compressor = compress::from_config(&config);
    tracing::debug!(
        compressor = compressor.name(),
        jobs = config.effective_jobs(),
        "configured"
    );

    let start = Instant::now();
    let stats = Reconciler::new(compressor)
        .with_logger(Arc::new(Fanout(loggers)))
        .with_jobs(config.effective_jobs())
        .with_cancel(cancel)
        .run(&args.source, &args.destination)?;

    if !args.quiet {
        print_summary(&stats, start.elapsed().as_secs_f64(), args.verbose > 0);
    }
    if stats.cancelled {
        tracing::warn!("backup interrupted; unprocessed files are picked up by the next run");
        std::process::exit(130);
    }
    Ok(())
}

fn print_summary(stats: &RunStats, seconds: f64, list_errors: bool) {
    println!("=== Backup Complete ===");
    println!("Directories: {}", stats.dirs);
    println!("Backed up:   {}", stats.backed_up);
    println!("Refreshed:   {}", stats.refreshed);
    println!("Unchanged:   {}", stats.unchanged);
    if stats.skipped > 0 {
        println!("Skipped:     {}", stats.skipped);
    }
    println!(
        "Copied:      {:.2} MB",
        stats.bytes_copied as f64 / 1_048_576.0
    );
    println!("Time:        {:.2}s", seconds);

    if !stats.errors.is_empty() {
        println!("\nErrors encountered: {}", stats.errors.len());
        if list_errors {
            for error in &stats.errors {
                eprintln!("  - {}", error);
            }
        }
    }
}
