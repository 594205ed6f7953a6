// Roommate Map - Web Server
// REST API with Axum

use anyhow::{Context, Result};
use roommate_map::api::{router, AppState};
use roommate_map::{db, Config, ReferenceData};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if let Err(e) = fmt().with_env_filter(filter).try_init() {
        eprintln!("tracing init failed: {e}");
    }

    println!("🏠 Roommate Map - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = Config::load();

    // Reference CSV and database come up side by side
    let neighborhoods = config.neighborhoods_csv.clone();
    let cities = config.cities_csv.clone();
    let db_path = config.db_path.clone();

    let (reference, conn) = tokio::join!(
        tokio::task::spawn_blocking(move || ReferenceData::load_from_paths(&neighborhoods, cities.as_deref())),
        tokio::task::spawn_blocking(move || db::open(&db_path)),
    );

    let conn = conn
        .context("Database task panicked")?
        .with_context(|| format!("Failed to open database at {:?}", config.db_path))?;
    println!("✓ Database opened: {:?}", config.db_path);

    let reference = match reference.context("Reference loader panicked")? {
        Ok(reference) => {
            println!(
                "✓ Reference data: {} neighborhoods, {} city centroids",
                reference.neighborhoods.len(),
                reference.cities.len()
            );
            reference
        }
        Err(e) => {
            // the map still serves, every user just ends up unmapped
            warn!(error = %e, path = ?config.neighborhoods_csv, "reference data unavailable");
            ReferenceData::default()
        }
    };

    let addr = format!("0.0.0.0:{}", config.port);
    let state = AppState::new(conn, reference, config);
    let app = router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!(%addr, "server listening");
    println!("\n🚀 Server running on http://{addr}");
    println!("   API: http://{addr}/api/users");
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
