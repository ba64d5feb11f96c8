// One-shot CLI: submit a single URL through the request manager and print
// the ProcessingResult as JSON.
//
// Usage: coursescrape <URL> [--javascript] [--screenshots]

use anyhow::{Context, Result};
use coursescrape::{RequestManager, ScrapeConfig, ScrapingOptions, ScrapingTarget};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // The engine modules log through the `log` facade; bridge those
    // records into tracing before the subscriber goes up.
    tracing_log::LogTracer::init().context("failed to install log bridge")?;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,chromiumoxide=off")
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(url) = args.get(1).filter(|a| !a.starts_with("--")) else {
        eprintln!("Usage: coursescrape <URL> [--javascript] [--screenshots]");
        std::process::exit(2);
    };

    let options = ScrapingOptions {
        javascript: args.iter().any(|a| a == "--javascript"),
        screenshots: args.iter().any(|a| a == "--screenshots"),
        ..ScrapingOptions::default()
    };

    let config = ScrapeConfig::builder().media_dir("./media").build()?;
    let manager = RequestManager::new(config);

    let target = ScrapingTarget::new("cli-1", "", url.clone());
    log::info!("Submitting {url}");
    let result = manager.add_request(target, Some(options)).await;

    println!("{}", serde_json::to_string_pretty(&result)?);

    manager.cleanup().await;

    if result.success {
        Ok(())
    } else {
        std::process::exit(1);
    }
}
