use anyhow::{Context, Result};
use std::env;
use std::fs::File;
use std::path::{Path, PathBuf};

// Use library instead of local modules
use price_sync::{
    init_tracing, read_price_rows, BatchOutcome, Credentials,
    MemoryRecordStore, PriceInput, ReconciliationEngine, SessionClient, TracingLog, UpdateEngine,
};

const USAGE: &str = "Usage:
  price-sync update <barcode> <price>
  price-sync batch <file.csv>
  price-sync lookup <barcode>
  price-sync reconcile <price_list.csv> [--apply]";

/// A parsed command line; validated before any configuration or network work
#[derive(Debug, PartialEq)]
enum Command {
    Update { barcode: String, price: String },
    Batch { path: PathBuf },
    Lookup { barcode: String },
    Reconcile { path: PathBuf, apply: bool },
}

impl Command {
    fn parse(args: &[String]) -> Option<Self> {
        let (name, rest) = args.split_first()?;
        match (name.as_str(), rest) {
            ("update", [barcode, price]) => Some(Command::Update {
                barcode: barcode.clone(),
                price: price.clone(),
            }),
            ("batch", [path]) => Some(Command::Batch { path: path.into() }),
            ("lookup", [barcode]) => Some(Command::Lookup { barcode: barcode.clone() }),
            ("reconcile", [path]) => Some(Command::Reconcile { path: path.into(), apply: false }),
            ("reconcile", [path, flag]) if flag == "--apply" => {
                Some(Command::Reconcile { path: path.into(), apply: true })
            }
            _ => None,
        }
    }
}

fn main() -> Result<()> {
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = Command::parse(&args) else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    // Fatal before any connection attempt
    let credentials = Credentials::from_env()?;

    let mut session = SessionClient::new(credentials, TracingLog::shared("session"))?;
    if !session.connect() {
        eprintln!("❌ Failed to connect to the product backend");
        std::process::exit(1);
    }

    match command {
        Command::Update { barcode, price } => run_update(&session, &barcode, &price),
        Command::Batch { path } => run_batch(&session, &path),
        Command::Lookup { barcode } => run_lookup(&session, &barcode),
        Command::Reconcile { path, apply } => run_reconcile(&session, &path, apply),
    }
}

fn run_update(session: &SessionClient, barcode: &str, price: &str) -> Result<()> {
    let engine = UpdateEngine::new(session);
    let outcome = engine.update_by_identifier(barcode, &PriceInput::from(price));

    if outcome.success {
        println!("✅ {}", outcome.message);
    } else {
        println!("❌ {}", outcome.message);
    }
    Ok(())
}

fn run_batch(session: &SessionClient, csv_path: &Path) -> Result<()> {
    let engine = UpdateEngine::new(session);
    let batch = engine.batch_update_from_csv(csv_path)?;
    print_batch(&batch);
    Ok(())
}

fn run_lookup(session: &SessionClient, barcode: &str) -> Result<()> {
    let engine = UpdateEngine::new(session);
    match engine.lookup_by_identifier(barcode) {
        Ok(entity) => println!("{}", serde_json::to_string_pretty(&entity)?),
        Err(e) => println!("❌ {}", e),
    }
    Ok(())
}

fn run_reconcile(session: &SessionClient, csv_path: &Path, apply: bool) -> Result<()> {
    println!("⚖️  Reconciling against {}", csv_path.display());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let file = File::open(csv_path)
        .with_context(|| format!("Failed to open file: {}", csv_path.display()))?;
    let raw_rows = read_price_rows(file)?;

    let engine = ReconciliationEngine::new().with_log(TracingLog::shared("reconciliation"));
    let report = engine.reconcile(session, &raw_rows)?;

    for c in &report.comparisons {
        let remote = c
            .remote_price
            .map(|p| format!("${:.2}", p))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<20} {:<22} {:>10} -> ${:<10.2} {:>+9.2} ({:+.2}%)  {}",
            c.external_id,
            c.classification.as_str(),
            remote,
            c.proposed_price,
            c.difference,
            c.percent_change,
            c.description
        );
    }

    println!("\n📊 {}", report.summary());

    if !apply {
        return Ok(());
    }

    if !report.has_changes() {
        println!("✓ Nothing to apply");
        return Ok(());
    }

    println!("\n💾 Applying {} price change(s)...", report.summary.increases + report.summary.decreases);

    let store = MemoryRecordStore::new();
    let applied = UpdateEngine::new(session).apply_approved(&report.comparisons, &store);
    if !applied.skipped.is_empty() {
        println!("✓ Skipped (already applied): {}", applied.skipped.join(", "));
    }
    print_batch(&applied.batch);

    Ok(())
}

fn print_batch(batch: &BatchOutcome) {
    for result in &batch.results {
        let mark = if result.success { "✅" } else { "❌" };
        println!(
            "{} row {}: {} ({})",
            mark,
            result.row_number.unwrap_or_default(),
            result.message,
            result.external_id
        );
    }
    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("{}", batch.summary());
}
