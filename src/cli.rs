// src/cli.rs
// =============================================================================
// This file defines our command-line interface using the `clap` crate.
//
// clap is a popular Rust library for parsing command-line arguments.
// We use the "derive" API which lets us define the CLI structure using
// Rust structs and attributes (the #[...] things).
//
// The parsed Cli is turned into two config structs:
// - ClientConfig: how to reach the network (timeout, transport, proxy)
// - PipelineConfig: how many workers, how big the queues are
// =============================================================================

use clap::Parser;
use std::time::Duration;

use crate::client::{ClientConfig, Transport, DEFAULT_OVERLAY_PROXY};
use crate::pipeline::PipelineConfig;

// This struct represents our entire CLI application
//
// #[derive(Parser)] tells clap to automatically generate parsing code
// The #[command(...)] attributes configure how the CLI behaves
#[derive(Parser, Debug)]
#[command(
    name = "link-prober",
    version,
    about = "Extracts every link on a web page and checks which ones are reachable",
    long_about = "link-prober downloads one page, pulls out every absolute link from its <a href> \
                  tags and probes each one with a HEAD request. Links answering with a status \
                  below 400 are reachable; everything else (4xx, 5xx, timeouts, DNS errors) is not. \
                  .onion links can be checked through a local Tor SOCKS proxy."
)]
pub struct Cli {
    /// Page whose links should be checked (e.g., https://example.com)
    pub root_url: String,

    /// Output results in JSON format instead of a table
    #[arg(long)]
    pub json: bool,

    /// Number of workers extracting links, and number probing them
    ///
    /// Also the maximum number of HEAD requests in flight at once
    #[arg(long, default_value_t = 16, value_parser = parse_positive)]
    pub workers: usize,

    /// Capacity of each queue between pipeline stages
    #[arg(long, default_value_t = 10, value_parser = parse_positive)]
    pub queue_capacity: usize,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 10)]
    pub timeout: u64,

    /// Which network path requests take
    ///
    /// auto sends .onion hosts through the proxy and everything else direct
    #[arg(long, value_enum, default_value_t = Transport::Auto)]
    pub transport: Transport,

    /// SOCKS proxy for the overlay transport
    #[arg(long, default_value = DEFAULT_OVERLAY_PROXY)]
    pub proxy: String,

    /// User-Agent header sent with every request
    #[arg(long)]
    pub user_agent: Option<String>,
}

impl Cli {
    pub fn client_config(&self) -> ClientConfig {
        let config = ClientConfig::default()
            .with_timeout(Duration::from_secs(self.timeout))
            .with_transport(self.transport)
            .with_overlay_proxy(Some(self.proxy.clone()));

        match &self.user_agent {
            Some(user_agent) => config.with_user_agent(user_agent.as_str()),
            None => config,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::default()
            .with_workers(self.workers)
            .with_queue_capacity(self.queue_capacity)
    }
}

// Accepts whole numbers of at least 1
fn parse_positive(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}
