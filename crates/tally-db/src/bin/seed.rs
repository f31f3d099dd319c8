//! # Seed Data Generator
//!
//! Populates the database with a small phone shop for development.
//!
//! ## Usage
//! ```bash
//! # Seed ./tally.db (or $TALLY_DB_PATH)
//! cargo run -p tally-db --bin seed
//!
//! # Specify database path
//! cargo run -p tally-db --bin seed -- --db ./data/tally.db
//!
//! # Also walk through a sale, a clamped return and a refused return
//! cargo run -p tally-db --bin seed -- --demo
//! ```
//!
//! Log level follows `RUST_LOG`, e.g. `RUST_LOG=tally_db=trace`.

use std::env;

use tally_core::{
    LineRequest, NewParty, NewProduct, NewPurchase, NewReturn, NewSale, ReturnLineRequest,
};
use tally_db::{Database, DbConfig};
use tracing_subscriber::EnvFilter;

/// Suppliers: (name, phone)
const SUPPLIERS: &[(&str, &str)] = &[("أحمد محمد", "01012345678"), ("محمد علي", "01198765432")];

/// Customers: (name, phone)
const CUSTOMERS: &[(&str, &str)] = &[("عميل نقدي", ""), ("سارة حسن", "01234567890")];

/// Catalog: (name, price_buy_cents, price_sell_cents, quantity, min_quantity)
const PHONES: &[(&str, i64, i64, i64, i64)] = &[
    ("iPhone 15 Pro", 4_500_000, 5_200_000, 10, 3),
    ("Samsung Galaxy S24", 2_500_000, 3_000_000, 15, 5),
    ("Xiaomi 14", 1_800_000, 2_200_000, 8, 3),
    ("Huawei P60 Pro", 2_800_000, 3_500_000, 5, 2),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tally_db=debug,sqlx=warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut config = DbConfig::from_env()?;
    let mut demo = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    config.database_path = args[i + 1].clone().into();
                    i += 1;
                }
            }
            "--demo" => demo = true,
            "--help" | "-h" => {
                println!("Tally Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: $TALLY_DB_PATH or ./tally.db)");
                println!("      --demo         Run a sale / return walkthrough after seeding");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            other => eprintln!("Ignoring unknown argument: {other}"),
        }
        i += 1;
    }

    println!("Tally Seed Data Generator");
    println!("=========================");
    println!("Database: {}", config.database_path.display());
    println!();

    let db = Database::new(config).await?;
    println!("✓ Connected to database, migrations applied");

    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {existing} products");
        println!("  Skipping seed to avoid duplicates.");
    } else {
        seed(&db).await?;
    }

    if demo {
        run_demo(&db).await?;
    }

    db.close().await;
    Ok(())
}

async fn seed(db: &Database) -> Result<(), Box<dyn std::error::Error>> {
    for &(name, phone) in SUPPLIERS {
        db.parties()
            .insert_supplier(&NewParty::new(name).with_phone(phone))
            .await?;
    }
    for &(name, phone) in CUSTOMERS {
        let mut party = NewParty::new(name);
        if !phone.is_empty() {
            party = party.with_phone(phone);
        }
        db.parties().insert_customer(&party).await?;
    }
    println!("✓ {} suppliers, {} customers", SUPPLIERS.len(), CUSTOMERS.len());

    for &(name, buy, sell, quantity, min_quantity) in PHONES {
        let product = db
            .products()
            .insert(
                &NewProduct::new(name, buy, sell)
                    .with_quantity(quantity)
                    .with_min_quantity(min_quantity),
            )
            .await?;
        println!("  {:<20} qty {:>3}  sells at {}", product.name, product.quantity, product.price_sell());
    }
    println!("✓ {} products", PHONES.len());

    Ok(())
}

/// Restocks, sells, over-returns and then returns again, printing each
/// result as JSON.
async fn run_demo(db: &Database) -> Result<(), Box<dyn std::error::Error>> {
    let ledger = db.ledger();

    let products = db.products().list().await?;
    let Some(phone) = products.first() else {
        println!("⚠ No products, nothing to demo");
        return Ok(());
    };
    let suppliers = db.parties().list_suppliers().await?;
    let Some(supplier) = suppliers.first() else {
        println!("⚠ No suppliers, nothing to demo");
        return Ok(());
    };

    println!();
    println!("Demo on {} (qty {})", phone.name, phone.quantity);

    let purchase = ledger
        .create_purchase(&NewPurchase::new(
            supplier.id,
            vec![LineRequest::new(phone.id, 2, phone.price_buy_cents)],
        ))
        .await?;
    println!("\n# purchase\n{}", serde_json::to_string_pretty(&purchase)?);

    let sale = ledger
        .create_sale(&NewSale::new(vec![LineRequest::new(
            phone.id,
            4,
            phone.price_sell_cents,
        )]))
        .await?;
    println!("\n# sale\n{}", serde_json::to_string_pretty(&sale)?);

    let receipt = ledger
        .create_return(&NewReturn::new(
            sale.sale.id,
            vec![ReturnLineRequest::new(phone.id, 6, phone.price_sell_cents)],
        ))
        .await?;
    println!("\n# return (6 asked, 4 sold)\n{}", serde_json::to_string_pretty(&receipt)?);

    match ledger
        .create_return(&NewReturn::new(
            sale.sale.id,
            vec![ReturnLineRequest::new(phone.id, 1, phone.price_sell_cents)],
        ))
        .await
    {
        Ok(receipt) => println!("\n# second return\n{}", serde_json::to_string_pretty(&receipt)?),
        Err(e) => println!(
            "\n# second return refused\n{}",
            serde_json::json!({ "kind": e.kind(), "status": e.kind().http_status(), "error": e.to_string() })
        ),
    }

    let summary = ledger.returnable(sale.sale.id).await?;
    println!("\n# returnable\n{}", serde_json::to_string_pretty(&summary)?);

    let quantity = db.products().get_quantity(phone.id).await?;
    let net = db.movements().net_delta(phone.id).await?;
    println!();
    println!("✓ {} now at {quantity} (journal net {net:+})", phone.name);

    Ok(())
}
