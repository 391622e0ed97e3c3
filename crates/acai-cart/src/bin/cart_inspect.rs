//! # Saved Cart Inspector
//!
//! Prints the cart a buyer would get back on their next visit, as JSON.
//! For support: "my cart shows the wrong total" starts here.
//!
//! ## Usage
//! ```bash
//! # Use cart.toml from the platform config dir
//! cargo run -p acai-cart --bin cart-inspect
//!
//! # Explicit config file and database
//! cargo run -p acai-cart --bin cart-inspect -- --config ./cart.toml --db ./cart.db
//!
//! # Another record key
//! cargo run -p acai-cart --bin cart-inspect -- --key acai-cart-storage
//! ```
//!
//! Logs go to stderr (`RUST_LOG` applies); the snapshot goes to stdout.

use std::env;
use std::path::PathBuf;

use acai_cart::config::CartConfig;
use acai_cart::persistence::{self, SqliteCartStorage};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,acai=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_help() {
    println!("Açaí Storefront Cart Inspector");
    println!();
    println!("Usage: cart-inspect [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -c, --config <PATH>  Config file (default: platform config dir)");
    println!("  -d, --db <PATH>      Cart database (overrides the config)");
    println!("  -k, --key <KEY>      Record key (overrides the config)");
    println!("  -h, --help           Show this help message");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut db_path: Option<PathBuf> = None;
    let mut key: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--key" | "-k" => {
                if i + 1 < args.len() {
                    key = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => {
                eprintln!("Unknown option: {}", other);
                print_help();
                return Ok(());
            }
        }
        i += 1;
    }

    init_tracing();

    let config = CartConfig::load(config_path)?;
    let db_path = match db_path {
        Some(path) => path,
        None => config.database_path()?,
    };
    let key = key.unwrap_or_else(|| config.cart_key().to_string());

    info!(db = %db_path.display(), key = %key, "Inspecting saved cart");

    let storage = SqliteCartStorage::open(&db_path).await?;
    let cart = persistence::restore(&storage, &key).await;
    storage.close().await;

    println!("{}", serde_json::to_string_pretty(&cart.state())?);
    Ok(())
}
