//! Marquee storefront client.
//!
//! Loads the city list and one page of events through the query cache,
//! keeping the city filter across runs.
//!
//! ```bash
//! MARQUEE_API_BASE_URL=https://tickets.example/api marquee lisbon jazz
//! ```
//!
//! The first argument selects a city, the second searches event titles and
//! venues. Set `MARQUEE_PRINT_METRICS=1` to print Prometheus metrics on exit.

use anyhow::Context;
use marquee_core::environment::TokenSupplier;
use marquee_persist::FileStorage;
use marquee_query::ReqwestHttpClient;
use marquee_runtime::metrics::MetricsRecorder;
use marquee_storefront::{Storefront, StorefrontConfig, StorefrontEnvironment};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marquee=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = StorefrontConfig::from_env().context("reading configuration")?;
    tracing::info!(
        api = %config.api_base_url,
        storage = %config.storage_dir.display(),
        "Configuration loaded"
    );

    let metrics = MetricsRecorder::install().context("installing metrics recorder")?;

    let http = ReqwestHttpClient::new(config.api_base_url.clone(), config.http_timeout)
        .context("building HTTP client")?;
    let token: Arc<dyn TokenSupplier> = Arc::new({
        let token = config.auth_token.clone();
        move || token.clone()
    });
    let env = StorefrontEnvironment::new(Arc::new(http), Arc::new(FileStorage::new(&config.storage_dir)))
        .with_token(token);
    let storefront = Storefront::start(&config, env).await;

    let mut args = std::env::args().skip(1);
    let cities = storefront.load_cities().await.context("loading cities")?;
    tracing::info!(count = cities.len(), "Cities loaded");

    if let Some(city) = args.next() {
        storefront.select_city(city).await?;
    }
    if let Some(query) = args.next() {
        storefront.search(query).await?;
    }

    let state = storefront.state().await;
    let page = storefront.visible_events().await.context("loading events")?;
    println!(
        "{} event(s) in {}, page {}/{}",
        page.total,
        state.cities.selected_city().map_or("all cities", |city| city.name.as_str()),
        page.page + 1,
        page.pages
    );
    for event in &page.items {
        println!(
            "  {}  {}",
            event.get("id").map(ToString::to_string).unwrap_or_default(),
            event.get("title").and_then(serde_json::Value::as_str).unwrap_or("(untitled)")
        );
    }

    storefront.shutdown(Duration::from_secs(5)).await?;

    if std::env::var_os("MARQUEE_PRINT_METRICS").is_some() {
        if let Some(text) = metrics.render() {
            println!("{text}");
        }
    }
    Ok(())
}
