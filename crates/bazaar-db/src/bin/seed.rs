//! # Seed Data Generator
//!
//! Fills a development database with a chart of accounts, a grocery
//! catalog with opening stock, and a demo SMS reseller with one client.
//!
//! ## Usage
//! ```bash
//! cargo run -p bazaar-db --bin seed
//! cargo run -p bazaar-db --bin seed -- --db ./data/bazaar.db --stock 40
//! ```
//!
//! The client's developer API key is printed at the end; the SMS daemon
//! accepts it on `/api/sms/send`.

use std::env;

use bazaar_core::inventory::AdjustmentType;
use bazaar_core::sms::balance::{BillType, Region, Slot, SlotKind, UserRole};
use bazaar_core::{Money, NewParty, NewProduct, PartyKind};
use bazaar_db::repository::{NewPackage, NewSmsApi, NewSmsUser, Recharge};
use bazaar_db::{Database, DbConfig};
use uuid::Uuid;

/// (SKU prefix, product names) per category.
const CATALOG: &[(&str, &[&str])] = &[
    ("RIC", &["Miniket Rice 5kg", "Nazirshail Rice 5kg", "Chinigura Rice 1kg"]),
    ("DAL", &["Masoor Dal 1kg", "Mung Dal 1kg", "Chola Boot 1kg"]),
    ("OIL", &["Soybean Oil 1L", "Soybean Oil 5L", "Mustard Oil 1L"]),
    ("SPC", &["Turmeric Powder 200g", "Chili Powder 200g", "Cumin 100g"]),
    ("TEA", &["Black Tea 400g", "Green Tea 100g"]),
];

const CUSTOMERS: &[&str] = &["Rahim Store", "Nabila Enterprise", "Hasan Traders"];
const SUPPLIERS: &[&str] = &["Padma Wholesale", "Meghna Distributors"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./bazaar_dev.db");
    let mut opening_stock: i64 = 25;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--stock" | "-s" => {
                if i + 1 < args.len() {
                    opening_stock = args[i + 1].parse().unwrap_or(25);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Bazaar Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>     Database file path (default: ./bazaar_dev.db)");
                println!("  -s, --stock <N>     Opening stock per product (default: 25)");
                println!("  -h, --help          Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Bazaar Seed Data Generator");
    println!("==========================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected, migrations applied");

    if db.products().count().await? > 0 {
        println!("⚠ Database already has products; delete the file to regenerate.");
        return Ok(());
    }

    db.accounts().seed_defaults().await?;
    println!("✓ Chart of accounts seeded");

    for name in CUSTOMERS {
        db.parties().create(PartyKind::Customer, &party(name), None).await?;
    }
    for name in SUPPLIERS {
        db.parties().create(PartyKind::Supplier, &party(name), None).await?;
    }
    println!("✓ {} customers, {} suppliers", CUSTOMERS.len(), SUPPLIERS.len());

    let mut created = 0;
    for (category_idx, (code, names)) in CATALOG.iter().enumerate() {
        for (idx, name) in names.iter().enumerate() {
            let seed = (category_idx * 10 + idx) as i64;
            let price = Money::from_minor(6_000 + seed * 1_750);
            let product = db
                .products()
                .insert(
                    &NewProduct {
                        name: (*name).to_string(),
                        sku: format!("{}-{:03}", code, idx + 1),
                        category: Some((*code).to_string()),
                        brand: None,
                        unit: Some("pcs".to_string()),
                        price,
                        cost: price.percent_of(8_500),
                    },
                    None,
                )
                .await?;

            if opening_stock > 0 {
                db.inventory()
                    .adjust(&product.id, opening_stock, AdjustmentType::Increase, Some("Opening stock"), None)
                    .await?;
            }
            created += 1;
        }
    }
    println!("✓ {} products with {} units each", created, opening_stock);

    let api_key = seed_sms(&db).await?;
    println!("✓ SMS reseller, client and gateway created");
    println!();
    println!("  Developer API key: {}", api_key);
    println!();
    println!("✓ Seed complete!");

    db.close().await;
    Ok(())
}

fn party(name: &str) -> NewParty {
    NewParty {
        name: name.to_string(),
        ..NewParty::default()
    }
}

/// Reseller → package → client, one gateway, and a funded quota on both
/// wallets. Returns the client's developer key.
async fn seed_sms(db: &Database) -> Result<String, Box<dyn std::error::Error>> {
    let sms = db.sms();
    let quota = Slot::new(Region::Local, false, SlotKind::Messages);

    let reseller = sms
        .create_user(&NewSmsUser {
            username: "demo-reseller".to_string(),
            role: UserRole::Reseller,
            owner_user_id: None,
            package_id: None,
            region_type: Some(Region::Local),
            balance_valid_till: None,
        })
        .await?;
    let package = sms
        .create_package(&NewPackage {
            name: "Starter".to_string(),
            owner_user_id: Some(reseller.id.clone()),
            bill_type: BillType::default(),
            masking_national_charge: Money::from_minor(50),
            non_masking_national_charge: Money::from_minor(35),
            ..NewPackage::default()
        })
        .await?;
    let client = sms
        .create_user(&NewSmsUser {
            username: "demo-client".to_string(),
            role: UserRole::Client,
            owner_user_id: Some(reseller.id.clone()),
            package_id: Some(package.id),
            region_type: Some(Region::Local),
            balance_valid_till: None,
        })
        .await?;

    let api = sms
        .create_api(&NewSmsApi {
            name: "Local Test Gateway".to_string(),
            vendor_name: Some("elitbuzz".to_string()),
            url: "http://127.0.0.1:9900/smsapi?type={text_type}&contacts={phone_number}&msg={message}".to_string(),
            priority: 1,
            is_deletable: true,
        })
        .await?;
    sms.assign_api(&reseller.id, &api.id, 1, false, 0).await?;

    sms.top_up(&reseller.id, quota, 10_000).await?;
    sms.recharge(&Recharge {
        recharged_to: client.id.clone(),
        recharged_by: reseller.id.clone(),
        slot: quota,
        units: 1_000,
        balance_valid_till: None,
        remarks: Some("Seed".to_string()),
    })
    .await?;

    let key = Uuid::new_v4().simple().to_string();
    sms.create_developer_key(&client.id, &key).await?;
    Ok(key)
}
