use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dealscout_api::{
    BrowseClient, Crawler, CredentialCache, RateGovernor, RateLimitsClient, SearchApi,
};
use dealscout_cache::SeenListingStore;
use dealscout_core::models::SearchQuery;
use dealscout_core::store::ListingStore;
use dealscout_core::Config;

#[derive(Parser)]
#[command(name = "dealscout")]
#[command(version, about = "Marketplace listing watcher with rate-aware polling", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Run a single search page and print the hits
    Search {
        /// Search query text
        query: String,
        /// Optional category id
        #[arg(long)]
        category: Option<String>,
    },
    /// Crawl a saved query for listings we haven't seen yet
    Poll {
        /// Search query text
        query: String,
        /// Treat this as a brand-new query (tighter page budget)
        #[arg(long)]
        first_run: bool,
    },
    /// Show the authoritative quota snapshot for the search API
    Quota,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging - helps when things go sideways
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dealscout=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::load().context("loading configuration")?;

    let credentials = Arc::new(CredentialCache::new(
        config.ebay.token_url.clone(),
        config.ebay.app_id.clone(),
        config.ebay.cert_id.clone(),
    ));

    match cli.command {
        Commands::Search { query, category } => {
            let client = browse_client(&config, credentials);
            let mut search = SearchQuery::new(query);
            search.category_id = category;

            let page = client.search(&search).await?;
            println!(
                "{} of about {} listing(s){}",
                page.items.len(),
                page.total,
                if page.has_more { " (more available)" } else { "" }
            );
            for item in page.items {
                let price = item
                    .price
                    .map(|p| {
                        format!("{:.2} {}", p, item.currency.as_deref().unwrap_or(""))
                    })
                    .unwrap_or_else(|| "?".into());
                println!("  [{}] {} - {}", item.item_id, item.title, price);
            }
        }
        Commands::Poll { query, first_run } => {
            let store = Arc::new(open_store()?);
            let client: Arc<dyn SearchApi> = Arc::new(browse_client(&config, credentials));
            let crawler = Crawler::new(
                client,
                store.clone(),
                config.crawl.page_size,
                config.crawl.max_pages,
            );

            let report = crawler.crawl(&SearchQuery::new(query), first_run).await?;
            for item in &report.new_items {
                store.insert(item).await?;
                println!("  new: [{}] {}", item.item_id, item.title);
            }
            println!(
                "{} new listing(s), {} examined over {} page(s), stopped on {}",
                report.new_items.len(),
                report.total_seen,
                report.pages_used,
                report.stop_reason
            );
        }
        Commands::Quota => {
            let client = RateLimitsClient::new(
                credentials,
                config.ebay.analytics_url.clone(),
                "buy",
                "browse",
                "buy.browse",
            );

            let quota = client.get_quota().await?;
            println!(
                "{}: {}/{} used, {} remaining, resets at {} (window {}s)",
                quota.resource,
                quota.count,
                quota.limit,
                quota.remaining,
                quota.reset_at.to_rfc3339(),
                quota.time_window_secs
            );
        }
    }

    Ok(())
}

fn browse_client(config: &Config, credentials: Arc<CredentialCache>) -> BrowseClient {
    let governor = Arc::new(RateGovernor::new(
        config.rate.per_second,
        config.rate.burst,
        config.rate.max_daily,
    ));

    BrowseClient::new(
        credentials,
        config.ebay.base_url.clone(),
        config.ebay.marketplace.clone(),
    )
    .with_governor(governor)
}

fn open_store() -> anyhow::Result<SeenListingStore> {
    let data_dir = dirs::data_dir()
        .context("could not find data directory")?
        .join("dealscout");
    std::fs::create_dir_all(&data_dir)?;

    let db_path = data_dir.join("seen.db");
    let db_path = db_path.to_str().context("db path is not valid UTF-8")?;
    Ok(SeenListingStore::new(db_path)?)
}
