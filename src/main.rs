// src/main.rs
// =============================================================================
// This is the entry point of our CLI application.
//
// What happens here:
// 1. Set up logging (to stderr, filtered by RUST_LOG)
// 2. Parse command-line arguments using clap
// 3. Build the network client and run the link pipeline on one page
// 4. Print the results as a table or JSON
// 5. Exit with proper code (0 = all reachable, 1 = unreachable links, 2 = error)
//
// Ctrl-C cancels the crawl: every pipeline stage stops and we exit with 2.
// =============================================================================

// Module declarations - tells Rust about our other source files
mod cli; // src/cli.rs - command-line parsing
mod client; // src/client/ - network access (direct or overlay)
mod pipeline; // src/pipeline/ - extract links and check them concurrently

use anyhow::{Context, Result};
use clap::Parser; // Parser trait enables the parse() method
use cli::Cli;
use client::DualClient;
use pipeline::{LinkCrawler, LinkResult};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    init_tracing();

    // Run our application logic and capture the exit code
    let exit_code = match run().await {
        Ok(code) => code,
        Err(e) => {
            // {:#} prints the whole error chain, e.g. "failed to fetch X: timed out"
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

// Logs go to stderr so that --json output on stdout stays machine-readable
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// This is the main application logic
// Returns:
//   Ok(0) = every link is reachable
//   Ok(1) = at least one link is unreachable
//   Err = the page could not be fetched, bad arguments, or Ctrl-C
async fn run() -> Result<i32> {
    let cli = Cli::parse();

    let client = DualClient::new(&cli.client_config()).context("could not set up the network client")?;
    let crawler = LinkCrawler::new(Arc::new(client), cli.pipeline_config());

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n⏹️  Interrupted, stopping...");
            on_interrupt.cancel();
        }
    });

    if !cli.json {
        println!("🔍 Checking links on: {}", cli.root_url);
    }

    let results = crawler.get_links_with_cancel(&cli.root_url, cancel).await?;

    print_results(&results, cli.json)?;

    let unreachable = results.iter().filter(|r| !r.reachable).count();
    if unreachable > 0 {
        Ok(1)
    } else {
        Ok(0)
    }
}

// Prints the results either as a table or JSON
fn print_results(results: &[LinkResult], json: bool) -> Result<()> {
    if json {
        let json_output = serde_json::to_string_pretty(results)?;
        println!("{}", json_output);
    } else if results.is_empty() {
        println!("✅ No links found to check");
    } else {
        print_table(results);
    }
    Ok(())
}

// Prints results as a human-readable table in the terminal
fn print_table(results: &[LinkResult]) {
    println!();
    println!("{:<80} {:<15}", "URL", "STATUS");
    println!("{}", "=".repeat(95));

    for result in results {
        println!("{:<80} {:<15}", truncate(&result.url, 77), format_status(result.reachable));
    }

    println!();

    let ok_count = results.iter().filter(|r| r.reachable).count();
    let unreachable_count = results.len() - ok_count;

    println!("📊 Summary:");
    println!("   ✅ Reachable: {}", ok_count);
    println!("   ❌ Unreachable: {}", unreachable_count);
    println!("   📋 Total: {}", results.len());
}

fn format_status(reachable: bool) -> &'static str {
    if reachable {
        "✅ OK"
    } else {
        "❌ UNREACHABLE"
    }
}

// Shortens long URLs for display, counting characters rather than bytes
// so a multi-byte character is never cut in half
fn truncate(url: &str, max_chars: usize) -> String {
    if url.chars().count() > max_chars {
        let head: String = url.chars().take(max_chars).collect();
        format!("{}...", head)
    } else {
        url.to_string()
    }
}
