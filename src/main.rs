use anyhow::Result;
use rusqlite::Connection;
use std::env;
use std::path::Path;

// Use library instead of local modules
use invest_forecast::{
    insert_commitments, load_commitments_csv, parse_base_year, setup_database, verify_count,
    ForecastConfig, ForecastEngine,
};

const DEFAULT_DB: &str = "invest.db";
const DEFAULT_CONFIG: &str = "forecast_config.json";

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("init") => run_init(),
        Some("import") => run_import(args.get(2).map(|s| s.as_str())),
        Some("forecast") => run_forecast(args.get(2).map(|s| s.as_str())),
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("invest-forecast - public-investment payment forecasting");
    println!();
    println!("Usage:");
    println!("  invest-forecast init                  Create the database schema");
    println!("  invest-forecast import <file.csv>     Import commitments (idempotent)");
    println!("  invest-forecast forecast <year>       Print the payment forecast");
    println!();
    println!("Database: ./{} - Config: ./{}", DEFAULT_DB, DEFAULT_CONFIG);
}

fn run_init() -> Result<()> {
    println!("🔧 Initializing database...");

    let conn = Connection::open(DEFAULT_DB)?;
    setup_database(&conn)?;

    println!("✓ Database initialized with WAL mode: {}", DEFAULT_DB);

    // Write the standard configuration next to the database on first run
    let config_path = Path::new(DEFAULT_CONFIG);
    if !config_path.exists() {
        ForecastConfig::default().save(config_path)?;
        println!("✓ Wrote default configuration: {}", DEFAULT_CONFIG);
    }

    Ok(())
}

fn run_import(csv_arg: Option<&str>) -> Result<()> {
    let csv_path = match csv_arg {
        Some(p) => Path::new(p).to_path_buf(),
        None => {
            eprintln!("❌ Missing CSV file");
            eprintln!("   Usage: invest-forecast import <file.csv>");
            std::process::exit(1);
        }
    };

    println!("🗄️  Commitment import - CSV → SQLite");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Load CSV
    println!("\n📂 Loading CSV...");
    let commitments = load_commitments_csv(&csv_path)?;
    println!("✓ Loaded {} commitments from CSV", commitments.len());

    // 2. Setup database
    println!("\n🔧 Setting up database...");
    let conn = Connection::open(DEFAULT_DB)?;
    setup_database(&conn)?;

    // 3. Insert commitments (duplicates skipped by idempotency hash)
    println!("\n💾 Inserting commitments...");
    insert_commitments(&conn, &commitments)?;

    // 4. Verify count
    println!("\n🔍 Verifying database...");
    let count = verify_count(&conn)?;
    println!("✓ Database contains {} commitments", count);

    Ok(())
}

fn run_forecast(year_arg: Option<&str>) -> Result<()> {
    let base_year = parse_base_year(year_arg)?;

    let db_path = Path::new(DEFAULT_DB);
    if !db_path.exists() {
        eprintln!("❌ Database not found at {:?}", db_path);
        eprintln!("   Run: invest-forecast init");
        std::process::exit(1);
    }

    let conn = Connection::open(db_path)?;

    let config_path = Path::new(DEFAULT_CONFIG);
    let config = if config_path.exists() {
        ForecastConfig::load(config_path)?
    } else {
        ForecastConfig::default()
    };

    println!("📊 Payment forecast - base year {}", base_year);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let engine = ForecastEngine::new(config);
    let result = engine.forecast(&conn, base_year)?;

    println!(
        "\n{:<10} {:<34} {:>12} {:>12} {:>12} {:>12} {:>12}",
        "Code",
        "Action",
        base_year,
        base_year + 1,
        base_year + 2,
        base_year + 3,
        base_year + 4
    );

    for entry in &result.entries {
        println!(
            "{:<10} {:<34} {:>12.2} {:>12.2} {:>12.2} {:>12.2} {:>12.2}",
            entry.action_code,
            entry.action_name,
            entry.y0,
            entry.y1,
            entry.y2,
            entry.y3,
            entry.y4
        );
    }

    println!(
        "\n✓ {} actions forecast (computed {})",
        result.entries.len(),
        result.computed_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if result.beyond_horizon_total > 0.0 {
        println!(
            "✓ Outstanding beyond the 5-year horizon (not projected): {:.2}",
            result.beyond_horizon_total
        );
    }

    Ok(())
}
