//! Restodash - command-line view of a restaurant dashboard.
//!
//! Loads the dashboard snapshot through the shared response cache and
//! prints what the dashboard screens would show.

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use restodash_core::cache::{FileStore, TieredCache};
use restodash_core::models::ReviewFilter;
use restodash_core::{Config, DashboardData, RequestClient, ReqwestTransport, RestaurantApi};

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let config = Config::load().context("Failed to load configuration")?;
    let api = build_api(&config)?;

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("--clear-cache") => {
            api.client().clear_cache();
            eprintln!("Cache cleared.");
            Ok(())
        }
        Some("--pending-reviews") => print_reviews(&api, ReviewFilter::Pending).await,
        Some("--reviews") => print_reviews(&api, ReviewFilter::All).await,
        Some(other) => {
            eprintln!("Unknown option: {}", other);
            eprintln!("Usage: restodash [--clear-cache | --reviews | --pending-reviews]");
            std::process::exit(2);
        }
        None => print_snapshot(&api).await,
    }
}

fn build_api(config: &Config) -> Result<RestaurantApi> {
    let base_url = config
        .backend_url
        .clone()
        .context("No backend URL configured (set RESTODASH_URL)")?;
    let api_key = config
        .api_key
        .clone()
        .context("No API key configured (set RESTODASH_API_KEY)")?;

    let cache_dir = config.cache_dir()?;
    let store = FileStore::new(cache_dir.clone(), config.cache.persist_quota_bytes)
        .with_context(|| format!("Failed to open cache directory {}", cache_dir.display()))?;
    let cache = Arc::new(TieredCache::new(config.cache.clone(), Arc::new(store)));

    let transport = ReqwestTransport::new().context("Failed to create HTTP client")?;
    let client = RequestClient::new(
        base_url,
        api_key,
        Arc::new(transport),
        cache,
        config.client.clone(),
    );

    info!(restaurant = ?config.restaurant_id, "Restodash starting");
    Ok(RestaurantApi::new(client, config.restaurant_id.clone()))
}

async fn load(api: &RestaurantApi) -> Result<DashboardData> {
    api.load_all().await.context("Failed to load dashboard data")
}

async fn print_snapshot(api: &RestaurantApi) -> Result<()> {
    let data = load(api).await?;
    let stats = data.stats();

    let name = data
        .settings
        .as_ref()
        .map(|s| s.restaurant_name_ar.as_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("(unnamed restaurant)");
    println!("{}", name);
    println!("  Categories: {}", stats.categories);
    println!("  Products:   {}", stats.products);
    println!(
        "  Reviews:    {} ({} approved)",
        stats.reviews, stats.approved_reviews
    );
    println!("  Users:      {}", stats.users);

    let settings = data.settings.clone().unwrap_or_default();
    for category in data.active_categories() {
        println!("\n{}", category.display_name());
        for product in data.products_in_category(&category.id) {
            let marker = if product.is_featured { "*" } else { " " };
            println!(
                "  {} {}  {}",
                marker,
                product.name_ar,
                settings.format_price(product.price)
            );
        }
    }
    Ok(())
}

async fn print_reviews(api: &RestaurantApi, filter: ReviewFilter) -> Result<()> {
    let data = load(api).await?;
    for review in data.reviews_matching(filter) {
        let status = if review.is_approved { "approved" } else { "pending" };
        println!(
            "{}  {:.1}/5  {}  [{}]",
            review.id,
            review.average_rating(),
            review.customer_name,
            status
        );
        if let Some(comment) = review.comment.as_deref().filter(|c| !c.is_empty()) {
            println!("    {}", comment);
        }
    }
    Ok(())
}
