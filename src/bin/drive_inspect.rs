use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use drive_relay::config;
use drive_relay::drive::{Credential, DriveClient, DriveService};

#[derive(Parser, Debug)]
struct Args {
    /// Path to YAML config
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// OAuth refresh token; omit to use the configured service-account key
    #[arg(long)]
    refresh_token: Option<String>,

    /// Page token to list changes from; omit to print the current one
    #[arg(long)]
    cursor: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let cfg = config::load(Some(&args.config))?;
    let credential = Credential::select(args.refresh_token.as_deref(), &cfg.google)?;
    let drive = DriveClient::connect(&cfg.google, &credential).await?;

    let cursor = match args.cursor {
        Some(cursor) => cursor,
        None => {
            let token = drive.get_start_page_token().await?;
            println!("Start page token: {}", token);
            return Ok(());
        }
    };

    let (changes, new_cursor) = drive.changes_since(&cursor).await?;
    println!("Changes since {} ({} entries):", cursor, changes.len());
    for change in &changes {
        println!(
            "  {} {:?} trashed={} parents={:?} {}",
            change.file_id, change.kind, change.trashed, change.parent_ids, change.file_name
        );
    }
    println!("New cursor: {}", new_cursor);
    Ok(())
}
