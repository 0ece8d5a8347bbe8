//! QR admission simulator
//!
//! Appends a heroes_selection payload line to the scanner spool file so a
//! booth running the simulated camera backend admits a session end-to-end.
//!
//! Usage:
//!   cargo run --bin qr-sim -- --heroes Alice,Bob --payment-id pay_123

use clap::Parser;
use serde_json::json;
use std::fs::OpenOptions;
use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

/// Inject a simulated QR scan into a running booth
#[derive(Parser, Debug)]
#[command(name = "qr-sim", version, about)]
struct Args {
    /// Comma-separated hero names
    #[arg(long, default_value = "Alice")]
    heroes: String,

    /// Subcategory id carried by the payload
    #[arg(long, default_value_t = 13)]
    subcategory: i64,

    /// Payment id; reuse one within the cooldown window to exercise dedup
    #[arg(long, default_value = "pay_local_test")]
    payment_id: String,

    /// Payment amount
    #[arg(long, default_value_t = 25.0)]
    amount: f64,

    /// Spool file watched by the booth's simulated camera
    #[arg(long, default_value = "qr_spool.jsonl")]
    spool: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let heroes: Vec<String> = args
        .heroes
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let timestamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs_f64();
    let payload = json!({
        "hero_names": heroes,
        "subcategory_id": args.subcategory,
        "timestamp": timestamp,
        "type": "heroes_selection",
        "payment_id": args.payment_id,
        "amount": args.amount,
    });

    let mut file = OpenOptions::new().create(true).append(true).open(&args.spool)?;
    writeln!(file, "{payload}")?;

    println!("queued scan for {} into {}", args.heroes, args.spool);
    Ok(())
}
