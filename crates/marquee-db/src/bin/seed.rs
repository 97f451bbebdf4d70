//! # Seed Data Generator
//!
//! Populates the database with a demo tenant for development.
//!
//! ## Usage
//! ```bash
//! # Seed ./marquee_dev.db with the default tenant
//! cargo run -p marquee-db --bin seed
//!
//! # Specify database path and tenant
//! cargo run -p marquee-db --bin seed -- --db ./data/marquee.db --tenant cinema-2
//! ```
//!
//! ## Generated Data
//! - One room (`ROOM-1`) with rows A-H of 12 seats each
//! - Three sessions tonight, one of them already canceled
//! - Concession stock (popcorn, sodas, candy)
//! - Two customers, one adult and one senior
//! - Discount codes: a 10% code, a capped fixed code, a senior-only code

use chrono::{Duration, NaiveDate, Utc};
use std::env;

use marquee_core::discount::DiscountCode;
use marquee_core::{AdjustmentReason, Customer, DiscountKind, Session, SessionStatus};
use marquee_db::{Database, DbConfig, StockMovement};

const ROOM_ID: &str = "ROOM-1";
const ROWS: &[char] = &['A', 'B', 'C', 'D', 'E', 'F', 'G', 'H'];
const SEATS_PER_ROW: usize = 12;

/// (sku, name, opening stock, reorder level)
const CONCESSIONS: &[(&str, &str, i64, i64)] = &[
    ("POPCORN-S", "Popcorn Small", 120, 20),
    ("POPCORN-M", "Popcorn Medium", 100, 20),
    ("POPCORN-L", "Popcorn Large", 80, 15),
    ("SODA-M", "Soda Medium", 200, 40),
    ("SODA-L", "Soda Large", 150, 30),
    ("WATER", "Bottled Water", 90, 20),
    ("NACHOS", "Nachos", 40, 10),
    ("CANDY-MIX", "Candy Mix", 60, 12),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./marquee_dev.db");
    let mut tenant = String::from("cinema-1");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--tenant" | "-t" => {
                if i + 1 < args.len() {
                    tenant = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Marquee Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>      Database file path (default: ./marquee_dev.db)");
                println!("  -t, --tenant <ID>    Tenant to seed (default: cinema-1)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Marquee Seed Data Generator");
    println!("==============================");
    println!("Database: {}", db_path);
    println!("Tenant:   {}", tenant);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let catalog = db.catalog();
    if catalog.session(&tenant, "S-1900").await?.is_some() {
        println!("⚠ Tenant {} is already seeded", tenant);
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    // Room
    let seat_labels: Vec<String> = ROWS
        .iter()
        .flat_map(|row| (1..=SEATS_PER_ROW).map(move |n| format!("{row}{n}")))
        .collect();
    let seat_refs: Vec<&str> = seat_labels.iter().map(String::as_str).collect();
    catalog.insert_seats(&tenant, ROOM_ID, &seat_refs).await?;
    println!("✓ Room {} with {} seats", ROOM_ID, seat_labels.len());

    // Sessions
    let now = Utc::now();
    let tonight = now + Duration::hours(3);
    let sessions = [
        ("S-1900", "The Long Matinee", tonight, SessionStatus::Scheduled),
        ("S-2130", "Night of the Lease", tonight + Duration::minutes(150), SessionStatus::Scheduled),
        ("S-2359", "Midnight Reaper", tonight + Duration::minutes(300), SessionStatus::Canceled),
    ];
    for (id, title, starts_at, status) in sessions {
        catalog
            .insert_session(&Session {
                id: id.to_string(),
                tenant_id: tenant.clone(),
                room_id: ROOM_ID.to_string(),
                title: title.to_string(),
                starts_at,
                ends_at: starts_at + Duration::minutes(130),
                status,
            })
            .await?;
    }
    println!("✓ {} sessions", sessions.len());

    // Concessions
    let inventory = db.inventory();
    for (sku, name, opening, reorder_level) in CONCESSIONS {
        inventory.create_item(&tenant, sku, name, *reorder_level, now).await?;
        inventory
            .adjust(
                &StockMovement {
                    tenant_id: &tenant,
                    sku,
                    delta: *opening,
                    reason: AdjustmentReason::Restock,
                    actor: "seed",
                    sale_id: None,
                },
                now,
            )
            .await?;
    }
    println!("✓ {} concession items", CONCESSIONS.len());

    // Customers
    let customers = [
        ("C-ADULT", "Alex Adult", NaiveDate::from_ymd_opt(1990, 6, 15)),
        ("C-SENIOR", "Sam Senior", NaiveDate::from_ymd_opt(1950, 2, 1)),
    ];
    for (id, name, birth_date) in customers {
        catalog
            .insert_customer(&Customer {
                id: id.to_string(),
                tenant_id: tenant.clone(),
                name: name.to_string(),
                birth_date,
            })
            .await?;
    }
    println!("✓ {} customers", customers.len());

    // Discount codes
    let codes = [
        discount(&tenant, "TENOFF", DiscountKind::Percent, 1000, None, (None, None)),
        discount(&tenant, "FIVEBUCKS", DiscountKind::Fixed, 500, Some(100), (None, None)),
        discount(&tenant, "SENIOR", DiscountKind::Percent, 2500, None, (Some(65), None)),
    ];
    for code in &codes {
        catalog.insert_discount_code(code).await?;
    }
    println!("✓ {} discount codes", codes.len());

    let summary = serde_json::json!({
        "tenant": tenant,
        "room": ROOM_ID,
        "seats": seat_labels.len(),
        "sessions": sessions.iter().map(|(id, _, _, status)| serde_json::json!({ "id": id, "status": status })).collect::<Vec<_>>(),
        "skus": CONCESSIONS.iter().map(|(sku, ..)| *sku).collect::<Vec<_>>(),
        "discount_codes": codes.iter().map(|c| c.code.as_str()).collect::<Vec<_>>(),
    });

    println!();
    println!("{}", serde_json::to_string_pretty(&summary)?);
    println!();
    println!("✓ Seed complete!");

    Ok(())
}

fn discount(
    tenant: &str,
    code: &str,
    kind: DiscountKind,
    value: i64,
    max_uses: Option<i64>,
    (min_age, max_age): (Option<i64>, Option<i64>),
) -> DiscountCode {
    DiscountCode {
        tenant_id: tenant.to_string(),
        code: code.to_string(),
        kind,
        value,
        valid_from: None,
        valid_until: None,
        max_uses,
        used_count: 0,
        min_age,
        max_age,
    }
}
