use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};
use uuid::Uuid;

use drive_relay::config;
use drive_relay::db::{self, Subscription};
use drive_relay::drive::{Credential, DriveClient, DriveService};
use drive_relay::notion::NotionClient;
use drive_relay::sync::{self, SyncOutcome};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Register a watch channel and store the subscription.
    Register {
        /// YAML file mapping folder names to Notion database ids
        #[arg(long)]
        routing: PathBuf,
        /// Per-subscription Google OAuth refresh token; omit to use the
        /// configured service-account key
        #[arg(long)]
        refresh_token: Option<String>,
        /// Per-subscription Notion token; omit to use the configured one
        #[arg(long)]
        notion_token: Option<String>,
    },
    /// Run one sync pass for a subscription.
    Sync {
        #[arg(long)]
        subscription: String,
    },
    /// Stop the watch channel and delete the subscription.
    Deregister {
        #[arg(long)]
        subscription: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/relay.db", cfg.app.data_dir));
    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    match args.command {
        Command::Register {
            routing,
            refresh_token,
            notion_token,
        } => {
            let raw = fs::read_to_string(&routing)
                .with_context(|| format!("failed to read routing map {}", routing.display()))?;
            let routing_map: HashMap<String, String> =
                serde_yaml::from_str(&raw).context("invalid routing map YAML")?;
            if routing_map.is_empty() {
                bail!("routing map must contain at least one folder -> database entry");
            }

            let credential = Credential::select(refresh_token.as_deref(), &cfg.google)?;
            let drive = DriveClient::connect(&cfg.google, &credential).await?;

            let cursor = drive.get_start_page_token().await?;
            let subscription_id = Uuid::new_v4().to_string();
            let address = format!(
                "{}/{}",
                cfg.google.webhook_url.trim_end_matches('/'),
                subscription_id
            );
            let channel = drive.register_watch(&cursor, &address).await?;

            let sub = Subscription {
                id: subscription_id.clone(),
                cursor,
                channel_id: channel.channel_id,
                resource_id: channel.resource_id,
                routing_map,
                google_refresh_token: refresh_token,
                notion_token: notion_token.unwrap_or_else(|| cfg.notion.token.clone()),
                created_at: chrono::Utc::now(),
            };
            db::insert_subscription(&pool, &sub).await?;

            info!(subscription_id = %sub.id, "subscription registered");
            println!("{}", sub.id);
        }
        Command::Sync { subscription } => {
            let Some(sub) = db::get_subscription(&pool, &subscription).await? else {
                bail!("subscription not found: {}", subscription);
            };

            if let Ok(purged) = db::purge_expired_markers(&pool).await {
                if purged > 0 {
                    info!(purged, "purged expired dedup markers");
                }
            }

            let credential = Credential::select(sub.google_refresh_token.as_deref(), &cfg.google)?;
            let drive = DriveClient::connect(&cfg.google, &credential).await?;
            let notion = NotionClient::new(sub.notion_token.clone(), cfg.notion.version.clone());

            match sync::run_sync_pass(&pool, &drive, &notion, &subscription).await? {
                SyncOutcome::NoChanges { cursor } => {
                    println!("no new changes (cursor {})", cursor);
                }
                SyncOutcome::RoutingConfigMissing {
                    channel_id,
                    resource_id,
                } => {
                    // Deregistration is delegated here, outside the pass.
                    warn!(subscription_id = %subscription, "routing map missing; stopping channel");
                    drive.deregister_watch(&channel_id, &resource_id).await?;
                    bail!("subscription {} has no routing map; channel stopped", subscription);
                }
                SyncOutcome::Completed(report) => {
                    println!(
                        "seen {} upserted {} failed {} skipped {} (cursor {})",
                        report.changes_seen,
                        report.upserted,
                        report.failed,
                        report.skipped.total(),
                        report.cursor
                    );
                }
            }
        }
        Command::Deregister { subscription } => {
            let Some(sub) = db::get_subscription(&pool, &subscription).await? else {
                bail!("subscription not found: {}", subscription);
            };
            let credential = Credential::select(sub.google_refresh_token.as_deref(), &cfg.google)?;
            let drive = DriveClient::connect(&cfg.google, &credential).await?;
            drive
                .deregister_watch(&sub.channel_id, &sub.resource_id)
                .await?;
            db::delete_subscription(&pool, &subscription).await?;
            info!(subscription_id = %subscription, "subscription deregistered");
        }
    }

    Ok(())
}
