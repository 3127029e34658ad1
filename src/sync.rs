//! Sync Orchestrator: one webhook ping → one synchronization pass.
//!
//! A pass loads the subscription's cursor, fetches one page of changes,
//! filters and dedups them, resolves each file's destination through the
//! ancestry walk, creates the destination records, and advances the cursor.
//! The cursor is the only cross-pass shared state; it is read once at the
//! start and advanced once at the end with a conditional update, so
//! concurrent passes for the same subscription cannot rewind it.

use futures::future::join_all;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::db::{self, Pool};
use crate::drive::DriveService;
use crate::model::{display_name, ChangeRecord, FileCategory, SkipReason};
use crate::notion::{NotionSink, PageUpsert};
use crate::resolver::resolve_destination;

/// How long a dedup marker suppresses re-upserts for the same file id.
pub const MARKER_TTL_SECONDS: i64 = 10;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Terminal for this pass; the caller must re-register before retrying.
    #[error("subscription not found: {0}")]
    SubscriptionNotFound(String),
    /// Transient upstream failure before any mutation; safe to retry the
    /// whole pass since the cursor has not moved.
    #[error("change source error: {0}")]
    Source(#[source] anyhow::Error),
    #[error("store error: {0}")]
    Store(#[source] anyhow::Error),
}

/// Per-reason tally of items that produced no upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkipTally {
    pub duplicate: usize,
    pub no_parent: usize,
    pub unrouted: usize,
}

impl SkipTally {
    fn record(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::Duplicate => self.duplicate += 1,
            SkipReason::NoParent => self.no_parent += 1,
            SkipReason::Unrouted => self.unrouted += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.duplicate + self.no_parent + self.unrouted
    }
}

/// Summary of a completed pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Change entries received from the source, before filtering.
    pub changes_seen: usize,
    pub upserted: usize,
    /// Items whose upsert or lookup failed; isolated, never retried in-pass.
    pub failed: usize,
    pub skipped: SkipTally,
    /// Cursor the subscription was advanced to.
    pub cursor: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The source reported no forward progress; the stored cursor is
    /// untouched. Normal terminal state, not an error.
    NoChanges { cursor: String },
    /// The subscription has no routing map. Deregistration signal only: the
    /// caller stops the channel with these identifiers.
    RoutingConfigMissing {
        channel_id: String,
        resource_id: String,
    },
    Completed(SyncReport),
}

enum ItemOutcome {
    Upserted,
    Skipped(SkipReason),
    Failed,
}

/// Run one synchronization pass for a subscription.
#[instrument(skip_all)]
pub async fn run_sync_pass(
    pool: &Pool,
    source: &dyn DriveService,
    sink: &dyn NotionSink,
    subscription_id: &str,
) -> Result<SyncOutcome, SyncError> {
    let sub = db::get_subscription(pool, subscription_id)
        .await
        .map_err(SyncError::Store)?
        .ok_or_else(|| SyncError::SubscriptionNotFound(subscription_id.to_string()))?;

    if sub.routing_map.is_empty() {
        warn!(subscription_id, "routing map missing; flagging for deregistration");
        return Ok(SyncOutcome::RoutingConfigMissing {
            channel_id: sub.channel_id,
            resource_id: sub.resource_id,
        });
    }

    // Transport/auth failures here abort before any mutation.
    let (changes, new_cursor) = source
        .changes_since(&sub.cursor)
        .await
        .map_err(SyncError::Source)?;

    if new_cursor == sub.cursor {
        info!(subscription_id, cursor = %sub.cursor, "no new changes");
        return Ok(SyncOutcome::NoChanges { cursor: sub.cursor });
    }

    let changes_seen = changes.len();
    let relayable: Vec<ChangeRecord> =
        changes.into_iter().filter(ChangeRecord::is_relayable).collect();

    // Items are independent: process them concurrently, each item's own
    // sub-steps staying sequential.
    let outcomes = join_all(
        relayable
            .iter()
            .map(|change| process_item(pool, source, sink, &sub.routing_map, change)),
    )
    .await;

    let mut report = SyncReport {
        changes_seen,
        upserted: 0,
        failed: 0,
        skipped: SkipTally::default(),
        cursor: new_cursor.clone(),
    };
    for outcome in outcomes {
        match outcome {
            ItemOutcome::Upserted => report.upserted += 1,
            ItemOutcome::Skipped(reason) => report.skipped.record(reason),
            ItemOutcome::Failed => report.failed += 1,
        }
    }

    // Forward progress on the cursor is prioritized over guaranteed
    // delivery: advance even when individual items failed above.
    let advanced = db::advance_cursor(pool, subscription_id, &sub.cursor, &new_cursor)
        .await
        .map_err(SyncError::Store)?;
    if !advanced {
        warn!(
            subscription_id,
            from = %sub.cursor,
            to = %new_cursor,
            "cursor already advanced by a concurrent pass"
        );
    }

    info!(
        subscription_id,
        changes_seen = report.changes_seen,
        upserted = report.upserted,
        failed = report.failed,
        skipped = report.skipped.total(),
        cursor = %report.cursor,
        "sync pass completed"
    );
    Ok(SyncOutcome::Completed(report))
}

/// Steps 6–9 for one retained change: derive, dedup, resolve, upsert.
/// Failures are isolated to the item and reported in the tally.
async fn process_item(
    pool: &Pool,
    source: &dyn DriveService,
    sink: &dyn NotionSink,
    routing_map: &HashMap<String, String>,
    change: &ChangeRecord,
) -> ItemOutcome {
    let Some(parent_id) = change.primary_parent() else {
        return ItemOutcome::Skipped(SkipReason::NoParent);
    };

    // Claim the marker before the expensive work to shrink (not close) the
    // duplicate-processing window for redelivered pings.
    match db::claim_file_marker(pool, &change.file_id, MARKER_TTL_SECONDS).await {
        Ok(true) => {}
        Ok(false) => {
            info!(file_id = %change.file_id, "already processed; skipping");
            return ItemOutcome::Skipped(SkipReason::Duplicate);
        }
        Err(err) => {
            warn!(?err, file_id = %change.file_id, "failed to claim dedup marker");
            return ItemOutcome::Failed;
        }
    }

    let resolved = match resolve_destination(source, parent_id, routing_map).await {
        Ok(Some(resolved)) => resolved,
        Ok(None) => {
            info!(file_id = %change.file_id, name = %change.file_name, "no destination; skipping");
            return ItemOutcome::Skipped(SkipReason::Unrouted);
        }
        Err(err) => {
            warn!(?err, file_id = %change.file_id, "ancestry lookup failed");
            return ItemOutcome::Failed;
        }
    };

    let page = PageUpsert {
        title: display_name(&change.file_name),
        source_url: change.web_view_link.clone(),
        category: FileCategory::from_mime(&change.mime_type),
        attributed_folder: resolved.folder_name,
    };
    match sink.create_record(&page, &resolved.database_id).await {
        Ok(page_id) => {
            info!(file_id = %change.file_id, %page_id, db = %resolved.database_id, "record created");
            ItemOutcome::Upserted
        }
        Err(err) => {
            warn!(?err, file_id = %change.file_id, "failed to create record");
            ItemOutcome::Failed
        }
    }
}
