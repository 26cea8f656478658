// pagegraph-crawl: crawl one site with a page-graph enabled browser
//
// Writes the page graph (and optionally a HAR and a screenshot) for the
// target and for every continuation the crawl follows.

use anyhow::{Context, Result};
use clap::Parser;
use pagegraph_crawl::{CrawlConfig, crawl_batch};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "pagegraph-crawl", version, about = "Crawl a page and export its page graph")]
struct Cli {
    /// URL to crawl
    #[arg(short = 'u', long)]
    url: String,

    /// Output file (.graphml) or directory
    #[arg(short = 'o', long)]
    output: PathBuf,

    /// Browser binary; searched for or downloaded when omitted
    #[arg(short = 'b', long = "binary")]
    binary: Option<PathBuf>,

    /// Seconds to capture after the page loads
    #[arg(short = 't', long = "secs", default_value_t = pagegraph_crawl::utils::DEFAULT_WAIT_SECS)]
    seconds: u64,

    /// Depth budget; above 1 a random child link is followed per level
    #[arg(short = 'r', long = "recursive-depth", default_value_t = 1)]
    recursive_depth: u32,

    /// Headed browser on the real display
    #[arg(short = 'i', long)]
    interactive: bool,

    /// Crawl URLs again when a page navigates back to them
    #[arg(long)]
    crawl_duplicates: bool,

    /// Write a HAR of the page's network traffic
    #[arg(long)]
    har: bool,

    /// Include response bodies in the HAR (implies --har)
    #[arg(long)]
    har_bodies: bool,

    /// Save a screenshot of the page
    #[arg(long)]
    screenshot: bool,

    #[arg(long)]
    user_agent: Option<String>,

    /// Launch with automation-hiding arguments
    #[arg(long)]
    stealth: bool,

    /// Profile directory to start from; copied, never modified
    #[arg(short = 'e', long)]
    existing_profile: Option<PathBuf>,

    /// Keep the profile directory after the crawl
    #[arg(long)]
    persist_profile: bool,

    /// Directory of unpacked extensions to load
    #[arg(long)]
    extensions_path: Option<PathBuf>,

    #[arg(long)]
    proxy_server: Option<String>,

    /// Extra browser argument (repeatable)
    #[arg(long = "extra-arg", allow_hyphen_values = true)]
    extra_args: Vec<String>,

    #[arg(long, default_value_t = pagegraph_crawl::utils::DEFAULT_NAVIGATION_TIMEOUT_SECS)]
    navigation_timeout: u64,

    #[arg(long, default_value_t = pagegraph_crawl::utils::DEFAULT_LAUNCH_RETRIES)]
    launch_retries: u32,

    /// Run the same crawl N times
    #[arg(long, default_value_t = 1)]
    repeat: usize,

    /// Crawls to run at once when repeating
    #[arg(long, default_value_t = 1)]
    parallel: usize,

    /// Abandon a crawl lineage after this many seconds
    #[arg(long)]
    batch_timeout: Option<u64>,

    /// Verbose logging
    #[arg(short = 'd', long)]
    debug: bool,
}

impl Cli {
    fn to_config(&self) -> Result<CrawlConfig> {
        let mut builder = CrawlConfig::builder()
            .output_path(&self.output)
            .url(&self.url)
            .seconds(self.seconds)
            .recursive_depth(self.recursive_depth)
            .interactive(self.interactive)
            .crawl_duplicates(self.crawl_duplicates)
            .capture_network(self.har || self.har_bodies)
            .capture_har_bodies(self.har_bodies)
            .screenshot(self.screenshot)
            .user_agent(self.user_agent.clone())
            .stealth(self.stealth)
            .existing_profile(self.existing_profile.clone())
            .persist_profile(self.persist_profile)
            .extensions_path(self.extensions_path.clone())
            .proxy_server(self.proxy_server.clone())
            .extra_args(self.extra_args.clone())
            .navigation_timeout_secs(self.navigation_timeout)
            .launch_retries(self.launch_retries);
        if let Some(binary) = &self.binary {
            builder = builder.executable_path(binary);
        }
        builder.build().context("Invalid crawl configuration")
    }
}

fn init_logging(debug: bool) -> Result<()> {
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))?
        .add_directive("chromiumoxide::conn=off".parse()?)
        .add_directive("chromiumoxide::handler=off".parse()?);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug)?;

    let config = cli.to_config()?;
    let configs = vec![config; cli.repeat.max(1)];
    let outcomes = crawl_batch(configs, cli.parallel, cli.batch_timeout.map(Duration::from_secs)).await;

    let mut failures = 0;
    for outcome in &outcomes {
        if outcome.timed_out {
            warn!("Crawl #{} of {} timed out", outcome.index + 1, outcome.url);
            failures += 1;
            continue;
        }
        failures += outcome.reports.iter().filter(|report| !report.succeeded()).count();
        for report in &outcome.reports {
            match (&report.error, &report.artifacts.graph) {
                (None, Some(graph)) => info!("{} -> {}", report.url, graph.display()),
                (Some(error), _) => warn!("{} failed: {error}", report.url),
                (None, None) => warn!("{} produced no graph", report.url),
            }
        }
    }

    if failures > 0 {
        warn!("{failures} crawl invocation(s) failed");
    }
    Ok(())
}
