//! FODMAP classification service — HTTP API plus background classification.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

mod routes;
mod scheduler;
mod state;

use state::AppState;

fn resolve_data_dir() -> PathBuf {
    std::env::var("FODMAP_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}

fn build_state() -> anyhow::Result<Arc<AppState>> {
    let data_dir = resolve_data_dir();
    info!("Data directory: {}", data_dir.display());

    let config = fodmap_core::AppConfig::from_env(&data_dir)?;
    let classifier_config =
        fodmap_classify::ClassifierConfig::load(&config.data_paths.classifier_config_file);

    let store = Arc::new(
        fodmap_store::ProductStore::open(&config.data_paths.db)
            .map_err(|e| anyhow::anyhow!("Failed to open store: {}", e))?,
    );

    let limiter = fodmap_classify::create_rate_limiter(&classifier_config);
    let classifier = fodmap_classify::create_classifier(&classifier_config, limiter)
        .map_err(|e| anyhow::anyhow!("Failed to build classifier: {}", e))?;

    Ok(Arc::new(AppState::new(
        config,
        classifier_config,
        store,
        classifier,
    )))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    // Handle CLI subcommands
    if args.len() > 1 {
        match args[1].as_str() {
            "classify" => {
                let state = build_state()?;
                return run_immediate_classification(&state).await;
            }
            "status" => {
                let state = build_state()?;
                return print_status(&state);
            }
            "--help" | "-h" | "help" => {
                println!("fodmapd — FODMAP product classification service");
                println!();
                println!("Usage: fodmapd [command]");
                println!();
                println!("Commands:");
                println!("  (none) | serve    Start the HTTP server and scheduler");
                println!("  classify          Run one classification pass immediately");
                println!("  status            Show classification statistics");
                println!("  help              Show this help message");
                return Ok(());
            }
            "serve" => {}
            _ => {
                eprintln!("Unknown command: {}. Use 'fodmapd help' for usage.", args[1]);
                std::process::exit(1);
            }
        }
    }

    // Normal server startup
    let state = build_state()?;
    let port = state.config.port;

    // Start the background classification scheduler
    scheduler::start_classification_scheduler(state.clone());

    // Build router
    let app = routes::build_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("fodmapd listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// `fodmapd classify` — one pass with the full retry schedule, foreground.
async fn run_immediate_classification(state: &AppState) -> anyhow::Result<()> {
    let pending = state
        .store
        .count_pending()
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    if pending == 0 {
        println!("No pending products to classify.");
        return Ok(());
    }

    println!("Found {} pending products. Starting classification...", pending);
    let outcome = state
        .job
        .run_with_retries()
        .await
        .map_err(|e| anyhow::anyhow!("Classification failed: {}", e))?;

    println!(
        "Classification pass complete: {} processed, {} remaining.",
        outcome.processed, outcome.remaining
    );
    if outcome.remaining > 0 {
        println!("Run again (or let the scheduler continue) to drain the backlog.");
    }
    Ok(())
}

/// `fodmapd status` — per-status counts and the most recent submissions.
fn print_status(state: &AppState) -> anyhow::Result<()> {
    let counts = state
        .store
        .count_by_status()
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    let total: i64 = counts.values().sum();

    println!("FODMAP Classification Statistics");
    println!("================================");
    println!("Total products: {}", total);
    for status in ["HIGH", "LOW", "MODERATE", "NA", "UNKNOWN", "PENDING"] {
        let count = counts.get(status).copied().unwrap_or(0);
        println!("  {:<9} {:>6}  {}", status, count, percentage(count, total));
    }

    let recent = state
        .store
        .find_recent(10)
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    if !recent.is_empty() {
        println!();
        println!("Most recent products:");
        for product in recent {
            let created = chrono::DateTime::from_timestamp_millis(product.created_at)
                .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {:<10} {:<40} {}",
                product.status,
                truncate(&product.name, 40),
                created
            );
        }
    }

    Ok(())
}

fn percentage(count: i64, total: i64) -> String {
    if total == 0 {
        return "0.0%".to_string();
    }
    format!("{:.1}%", (count as f64 / total as f64) * 100.0)
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let prefix: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", prefix)
    } else {
        text.to_string()
    }
}
