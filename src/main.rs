// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{bail, Context, Result};
use roommate_map::{
    db, offset, to_feature_collection, viewport_target, Config, LocationIndex, Profile, ReferenceData,
    SelectionState,
};
use std::env;
use std::path::Path;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    // Quiet by default: stdout belongs to the command output and the TUI
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();

    let args: Vec<String> = env::args().collect();
    let config = Config::load();

    match args.get(1).map(String::as_str) {
        Some("import") => {
            let path = args.get(2).context("Usage: roommate-map import <profiles.json>")?;
            run_import(&config, Path::new(path))?;
        }
        Some("map") => {
            let city = match args.get(2).map(String::as_str) {
                Some("--city") => Some(args.get(3).context("--city needs a value")?.clone()),
                Some(other) => bail!("Unknown map option: {other}"),
                None => None,
            };
            run_map(&config, city)?;
        }
        Some("browse") | None => run_ui_mode(&config)?,
        Some(other) => bail!("Unknown command: {other} (expected import, map or browse)"),
    }

    Ok(())
}

fn load_reference(config: &Config) -> Result<ReferenceData> {
    let reference = ReferenceData::load_from_paths(&config.neighborhoods_csv, config.cities_csv.as_deref())
        .with_context(|| format!("Failed to load reference data from {:?}", config.neighborhoods_csv))?;

    println!(
        "✓ Reference data: {} neighborhoods ({} dropped), {} city centroids",
        reference.neighborhoods.len(),
        reference.stats.neighborhoods_dropped,
        reference.cities.len()
    );
    Ok(reference)
}

fn run_import(config: &Config, json_path: &Path) -> Result<()> {
    println!("🗄️  Profile Import - JSON → SQLite + WAL");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Load JSON
    println!("\n📂 Loading profiles...");
    let raw = std::fs::read_to_string(json_path)
        .with_context(|| format!("Failed to read {:?}", json_path))?;
    let profiles: Vec<Profile> = serde_json::from_str(&raw).context("Failed to parse profiles JSON")?;
    println!("✓ Loaded {} profiles", profiles.len());

    // 2. Setup database
    println!("\n🔧 Setting up database...");
    let conn = db::open(&config.db_path).context("Failed to open database")?;
    println!("✓ Database initialized with WAL mode");

    // 3. Upsert profiles
    println!("\n💾 Saving profiles...");
    let summary = db::import_profiles(&conn, profiles, "json_importer")?;
    println!("✓ Created: {}", summary.created);
    println!("✓ Updated: {}", summary.updated);
    if summary.skipped > 0 {
        println!("⚠️  Skipped (no firebase_id): {}", summary.skipped);
    }

    // 4. Verify count
    println!("\n🔍 Verifying database...");
    let count = db::count_profiles(&conn)?;
    println!("✓ Database contains {} profiles", count);

    Ok(())
}

fn run_map(config: &Config, city: Option<String>) -> Result<()> {
    let reference = load_reference(config)?;
    let conn = db::open(&config.db_path).context("Failed to open database")?;
    let users = db::list_users(&conn)?;

    let resolution = LocationIndex::new(&reference).resolve_all(&users);
    let points = offset(&resolution.candidates);
    let features = to_feature_collection(&points);
    let selection = SelectionState::with_city(city);

    println!(
        "✓ {} users, {} on the map, {} unmapped ({} placed at a city centroid)",
        users.len(),
        points.len(),
        resolution.unmapped_count(),
        resolution.centroid_fallbacks()
    );

    match viewport_target(&features, &selection, &reference) {
        Some((bounds, options)) => {
            if let (Some(sw), Some(ne)) = (bounds.south_west(), bounds.north_east()) {
                println!(
                    "✓ Viewport: ({:.4}, {:.4}) → ({:.4}, {:.4}), padding {}, max zoom {}",
                    sw.lat, sw.lng, ne.lat, ne.lng, options.padding, options.max_zoom
                );
            }
        }
        None => println!("✓ Viewport: unchanged"),
    }

    println!("{}", serde_json::to_string_pretty(&features)?);

    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &Config) -> Result<()> {
    println!("🖥️  Loading Roommate Map directory...\n");

    let db_path = &config.db_path;
    if !db_path.exists() {
        eprintln!("❌ Database not found at {:?}", db_path);
        eprintln!("   Run: roommate-map import <profiles.json>");
        eprintln!("   to load profiles first.");
        std::process::exit(1);
    }

    let reference = load_reference(config)?;
    let conn = db::open(db_path).context("Failed to open database")?;

    println!("📊 Loading users...");
    let users = db::list_users(&conn)?;
    println!("✓ Loaded {} users\n", users.len());
    println!("Starting UI... (Press 'q' to quit)\n");

    let mut app = ui::App::new(users, reference);
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &Config) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the web API: cargo run --bin roommate-server --features server");
    std::process::exit(1);
}
