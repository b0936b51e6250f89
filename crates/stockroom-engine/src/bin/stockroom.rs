//! # Stockroom Operator Tool
//!
//! Seeds demo data, verifies the stock view against the ledger and prints
//! stock-level reports.
//!
//! ## Usage
//! ```bash
//! # Demo stores, products and a day of movements
//! cargo run -p stockroom-engine --bin stockroom -- seed
//!
//! # Verify (and repair) every key, or one store
//! cargo run -p stockroom-engine --bin stockroom -- verify
//! cargo run -p stockroom-engine --bin stockroom -- verify --store <ID>
//!
//! # Stock levels for a store as JSON
//! cargo run -p stockroom-engine --bin stockroom -- report --store <ID>
//! ```
//!
//! Configuration comes from `--config <PATH>` (or `$STOCKROOM_CONFIG`) and
//! the `STOCKROOM_*` environment variables. Log verbosity follows `RUST_LOG`.

use std::env;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use stockroom_core::{
    MovementType, NewMovement, NewProduct, NewStore, RequestContext, DEFAULT_TENANT_ID,
};
use stockroom_engine::{EngineConfig, InventoryEngine};

/// Demo catalogue: (SKU, name, low-stock threshold).
const PRODUCTS: &[(&str, &str, i64)] = &[
    ("BEV-001", "Cola 330ml", 24),
    ("BEV-002", "Sparkling Water 1L", 12),
    ("SNK-001", "Salted Crisps", 10),
    ("SNK-002", "Chocolate Bar", 20),
    ("DRY-001", "Whole Milk 1L", 15),
    ("GRO-001", "Basmati Rice 5kg", 5),
];

const STORES: &[(&str, &str)] = &[("Main Street", "Downtown"), ("Harbour Mall", "Waterfront")];

enum Command {
    Seed,
    Verify { store: Option<String> },
    Report { store: String },
}

struct Args {
    command: Command,
    config: Option<PathBuf>,
    tenant: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let Some(args) = parse_args(env::args().skip(1).collect())? else {
        print_usage();
        return Ok(());
    };

    let config = EngineConfig::load(args.config)?;
    info!(database = %config.database_path.display(), "Opening inventory");
    let engine = InventoryEngine::new(config).await?;
    let ctx = RequestContext::new(args.tenant).with_actor("stockroom-cli");

    let result = match args.command {
        Command::Seed => seed(&engine, &ctx).await,
        Command::Verify { store } => verify(&engine, &ctx, store.as_deref()).await,
        Command::Report { store } => report(&engine, &ctx, &store).await,
    };

    engine.close().await;
    result
}

/// Returns `None` when help was requested.
fn parse_args(args: Vec<String>) -> Result<Option<Args>, String> {
    let mut config = None;
    let mut tenant = DEFAULT_TENANT_ID.to_string();
    let mut store = None;
    let mut command = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-c" | "--config" => {
                config = Some(PathBuf::from(value(&args, i)?));
                i += 1;
            }
            "-t" | "--tenant" => {
                tenant = value(&args, i)?.to_string();
                i += 1;
            }
            "-s" | "--store" => {
                store = Some(value(&args, i)?.to_string());
                i += 1;
            }
            "-h" | "--help" => return Ok(None),
            "seed" | "verify" | "report" if command.is_none() => {
                command = Some(args[i].clone());
            }
            other => return Err(format!("unexpected argument '{other}'")),
        }
        i += 1;
    }

    let command = match command.as_deref() {
        Some("seed") => Command::Seed,
        Some("verify") => Command::Verify { store },
        Some("report") => Command::Report {
            store: store.ok_or("report needs --store <ID>")?,
        },
        _ => return Ok(None),
    };

    Ok(Some(Args {
        command,
        config,
        tenant,
    }))
}

fn value(args: &[String], i: usize) -> Result<&str, String> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| format!("{} needs a value", args[i]))
}

fn print_usage() {
    println!("Stockroom operator tool");
    println!();
    println!("Usage: stockroom [OPTIONS] <COMMAND>");
    println!();
    println!("Commands:");
    println!("  seed                 Create demo stores, products and movements");
    println!("  verify [--store ID]  Check stock rows against the ledger and repair");
    println!("  report --store ID    Print current stock levels as JSON");
    println!();
    println!("Options:");
    println!("  -c, --config <PATH>  TOML config file (default: $STOCKROOM_CONFIG)");
    println!("  -t, --tenant <ID>    Tenant to operate on (default: {DEFAULT_TENANT_ID})");
    println!("  -s, --store <ID>     Store id for verify/report");
    println!("  -h, --help           Show this help message");
}

async fn seed(engine: &InventoryEngine, ctx: &RequestContext) -> Result<(), Box<dyn std::error::Error>> {
    if !engine.list_stores(ctx, true).await?.is_empty() {
        println!("Tenant already has stores, skipping seed.");
        return Ok(());
    }

    let mut products = Vec::new();
    for (sku, name, threshold) in PRODUCTS {
        let mut input = NewProduct::new(*sku, *name);
        input.low_stock_threshold = Some(*threshold);
        products.push(engine.create_product(ctx, input).await?);
    }

    for (store_idx, (name, location)) in STORES.iter().enumerate() {
        let store = engine
            .create_store(
                ctx,
                NewStore {
                    name: name.to_string(),
                    location: Some(location.to_string()),
                    ..Default::default()
                },
            )
            .await?;

        for (product_idx, product) in products.iter().enumerate() {
            let received = 40 + (product_idx as i64 * 7) % 30;
            let sold = (received * (store_idx as i64 + 2)) / 5;
            let price = 99 + product_idx as i64 * 150;

            engine
                .append(
                    ctx,
                    NewMovement::new(&store.id, &product.id, MovementType::StockIn, received)
                        .reference(format!("PO-{store_idx}{product_idx:03}")),
                )
                .await?;
            engine
                .append(
                    ctx,
                    NewMovement::new(&store.id, &product.id, MovementType::Sale, sold).priced(price),
                )
                .await?;
            if product_idx % 3 == 0 {
                engine
                    .append(
                        ctx,
                        NewMovement::new(&store.id, &product.id, MovementType::Removal, 2)
                            .notes("damaged in transit"),
                    )
                    .await?;
            }
        }

        println!("Seeded store {} ({})", store.name, store.id);
    }

    println!("Seeded {} products across {} stores.", products.len(), STORES.len());
    Ok(())
}

async fn verify(
    engine: &InventoryEngine,
    ctx: &RequestContext,
    store: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store_ids = match store {
        Some(id) => vec![id.to_string()],
        None => engine
            .list_stores(ctx, true)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect(),
    };

    let mut checked = 0;
    let mut repaired = 0;
    for store_id in &store_ids {
        for outcome in engine.verify_store(ctx, store_id).await? {
            checked += 1;
            if outcome.repaired {
                repaired += 1;
                println!(
                    "Repaired {}/{}: recorded {:?}, ledger {}",
                    outcome.store_id, outcome.product_id, outcome.recorded, outcome.expected
                );
            }
        }
    }

    println!("Verified {checked} keys in {} stores, repaired {repaired}.", store_ids.len());
    Ok(())
}

async fn report(
    engine: &InventoryEngine,
    ctx: &RequestContext,
    store: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let levels = engine.stock_levels(ctx, Some(store), None).await?;
    println!("{}", serde_json::to_string_pretty(&levels)?);
    Ok(())
}
