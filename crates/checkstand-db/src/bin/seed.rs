//! # Demo Catalog Seeder
//!
//! Populates a database with a small catalog covering every stock and
//! pricing shape checkout handles.
//!
//! ## Usage
//! ```bash
//! cargo run -p checkstand-db --bin seed
//!
//! # Specify database path
//! cargo run -p checkstand-db --bin seed -- --db ./data/checkstand.db
//! ```
//!
//! ## Generated Catalog
//! - Tracked products with finite stock (decremented by checkout)
//! - Untracked products (`stock_quantity` NULL, never decremented)
//! - Products whose variants override the price
//! - A product marked out of stock

use std::env;

use checkstand_db::{Database, DbConfig, NewProduct, NewVariant};

/// (name, slug, price_cents, stock_quantity)
const PRODUCTS: &[(&str, &str, i64, Option<i64>)] = &[
    ("Enamel Camp Mug", "enamel-camp-mug", 1800, Some(40)),
    ("Waxed Canvas Tote", "waxed-canvas-tote", 6500, Some(12)),
    ("Brass Bottle Opener", "brass-bottle-opener", 1200, Some(3)),
    ("Gift Card", "gift-card", 2500, None),
    ("Digital Field Guide", "digital-field-guide", 900, None),
];

/// (name, slug, base price, variants: (name, value, sku, price override))
type VariantSpec = (&'static str, &'static str, &'static str, Option<i64>);
const VARIANT_PRODUCTS: &[(&str, &str, i64, Option<i64>, &[VariantSpec])] = &[
    (
        "Merino Beanie",
        "merino-beanie",
        3200,
        Some(25),
        &[
            ("Color", "Charcoal", "BEANIE-CHR", None),
            ("Color", "Rust", "BEANIE-RST", None),
            ("Color", "Undyed", "BEANIE-UND", Some(3600)),
        ],
    ),
    (
        "Ridge Daypack",
        "ridge-daypack",
        11000,
        Some(8),
        &[
            ("Size", "18L", "PACK-18", None),
            ("Size", "24L", "PACK-24", Some(12500)),
            ("Size", "30L", "PACK-30", Some(14000)),
        ],
    ),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./checkstand_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Checkstand Demo Catalog Seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./checkstand_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Checkstand Demo Catalog Seeder");
    println!("==============================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let catalog = db.catalog();

    let existing = catalog.count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    println!();
    println!("Inserting products...");

    let mut products = 0;
    let mut variants = 0;

    for (name, slug, price_cents, stock) in PRODUCTS {
        let product = catalog
            .insert_product(&NewProduct::new(name, slug, *price_cents, *stock))
            .await?;
        println!("  {} ({}) {}", product.name, product.id, describe_stock(*stock));
        products += 1;
    }

    for (name, slug, price_cents, stock, specs) in VARIANT_PRODUCTS {
        let product = catalog
            .insert_product(&NewProduct::new(name, slug, *price_cents, *stock))
            .await?;
        println!("  {} ({}) {}", product.name, product.id, describe_stock(*stock));
        products += 1;

        for (variant_name, value, sku, price_override) in specs.iter() {
            let variant = catalog
                .insert_variant(&NewVariant {
                    product_id: product.id.clone(),
                    name: variant_name.to_string(),
                    value: value.to_string(),
                    sku: Some(sku.to_string()),
                    price_override_cents: *price_override,
                    in_stock: true,
                    image_url: None,
                })
                .await?;
            println!("    └─ {} = {} ({})", variant.name, variant.value, variant.id);
            variants += 1;
        }
    }

    let sold_out = catalog
        .insert_product(&NewProduct {
            in_stock: false,
            ..NewProduct::new("Cast Iron Skillet", "cast-iron-skillet", 4800, Some(0))
        })
        .await?;
    println!("  {} ({}) out of stock", sold_out.name, sold_out.id);
    products += 1;

    println!();
    println!("✓ Seeded {} products and {} variants", products, variants);

    Ok(())
}

fn describe_stock(stock: Option<i64>) -> String {
    match stock {
        Some(quantity) => format!("stock {}", quantity),
        None => "untracked".to_string(),
    }
}
