use super::model::Subscription;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the
/// parent directory exists. Leaves in-memory URLs untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") {
        return url.to_string();
    }
    if url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = if let Some(rest) = path_part.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            format!("{}/{}", home.trim_end_matches('/'), rest)
        } else {
            path_part.to_string()
        }
    } else {
        path_part.to_string()
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn insert_subscription(pool: &Pool, sub: &Subscription) -> Result<()> {
    let routing_json =
        serde_json::to_string(&sub.routing_map).context("failed to serialize routing map")?;
    sqlx::query(
        "INSERT INTO subscriptions \
         (id, cursor, channel_id, resource_id, routing_map, google_refresh_token, notion_token) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&sub.id)
    .bind(&sub.cursor)
    .bind(&sub.channel_id)
    .bind(&sub.resource_id)
    .bind(&routing_json)
    .bind(&sub.google_refresh_token)
    .bind(&sub.notion_token)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn get_subscription(pool: &Pool, id: &str) -> Result<Option<Subscription>> {
    let row = sqlx::query(
        "SELECT id, cursor, channel_id, resource_id, routing_map, \
                google_refresh_token, notion_token, created_at \
         FROM subscriptions WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let routing_json: String = row.get("routing_map");
    let routing_map: HashMap<String, String> =
        serde_json::from_str(&routing_json).context("corrupt routing map in store")?;

    Ok(Some(Subscription {
        id: row.get("id"),
        cursor: row.get("cursor"),
        channel_id: row.get("channel_id"),
        resource_id: row.get("resource_id"),
        routing_map,
        google_refresh_token: row.get("google_refresh_token"),
        notion_token: row.get("notion_token"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
    }))
}

/// Advance the stored cursor, but only if it still holds the value this pass
/// started from. Returns false when a concurrent pass advanced it first, in
/// which case the caller's value must not clobber the newer one.
#[instrument(skip_all)]
pub async fn advance_cursor(
    pool: &Pool,
    id: &str,
    from_cursor: &str,
    to_cursor: &str,
) -> Result<bool> {
    let res = sqlx::query("UPDATE subscriptions SET cursor = ? WHERE id = ? AND cursor = ?")
        .bind(to_cursor)
        .bind(id)
        .bind(from_cursor)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

#[instrument(skip_all)]
pub async fn delete_subscription(pool: &Pool, id: &str) -> Result<()> {
    sqlx::query("DELETE FROM subscriptions WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Claim the dedup marker for a file id: insert-if-absent, or take over an
/// expired marker. Returns true when this caller won the claim and should
/// proceed with the upsert; false means an unexpired marker already exists.
#[instrument(skip_all)]
pub async fn claim_file_marker(pool: &Pool, file_id: &str, ttl_seconds: i64) -> Result<bool> {
    let now = Utc::now().timestamp();
    let expires_at = now + ttl_seconds;
    let res = sqlx::query(
        "INSERT INTO processed_files (file_id, expires_at) VALUES (?, ?) \
         ON CONFLICT(file_id) DO UPDATE SET expires_at = excluded.expires_at \
         WHERE processed_files.expires_at <= ?",
    )
    .bind(file_id)
    .bind(expires_at)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

/// Expiry timestamp of the marker for a file id, if one exists.
pub async fn get_file_marker(pool: &Pool, file_id: &str) -> Result<Option<i64>> {
    let expires_at =
        sqlx::query_scalar::<_, i64>("SELECT expires_at FROM processed_files WHERE file_id = ?")
            .bind(file_id)
            .fetch_optional(pool)
            .await?;
    Ok(expires_at)
}

/// Drop markers whose expiry has passed. Run opportunistically; correctness
/// does not depend on it since `claim_file_marker` takes over expired rows.
#[instrument(skip_all)]
pub async fn purge_expired_markers(pool: &Pool) -> Result<u64> {
    let res = sqlx::query("DELETE FROM processed_files WHERE expires_at <= ?")
        .bind(Utc::now().timestamp())
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_pool() -> Pool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    fn sample_subscription(id: &str, cursor: &str) -> Subscription {
        let mut routing_map = HashMap::new();
        routing_map.insert("Invoices".to_string(), "db-1".to_string());
        Subscription {
            id: id.to_string(),
            cursor: cursor.to_string(),
            channel_id: "chan-1".to_string(),
            resource_id: "res-1".to_string(),
            routing_map,
            google_refresh_token: Some("refresh-token".to_string()),
            notion_token: "notion-token".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn subscription_roundtrip() {
        let pool = setup_pool().await;
        let sub = sample_subscription("sub-1", "100");
        insert_subscription(&pool, &sub).await.unwrap();

        let loaded = get_subscription(&pool, "sub-1").await.unwrap().unwrap();
        assert_eq!(loaded.cursor, "100");
        assert_eq!(loaded.channel_id, "chan-1");
        assert_eq!(loaded.routing_map.get("Invoices").unwrap(), "db-1");
        assert_eq!(loaded.google_refresh_token.as_deref(), Some("refresh-token"));

        assert!(get_subscription(&pool, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn advance_cursor_is_conditional() {
        let pool = setup_pool().await;
        let sub = sample_subscription("sub-1", "100");
        insert_subscription(&pool, &sub).await.unwrap();

        assert!(advance_cursor(&pool, "sub-1", "100", "101").await.unwrap());
        // A second pass that read the old cursor loses the race.
        assert!(!advance_cursor(&pool, "sub-1", "100", "102").await.unwrap());

        let loaded = get_subscription(&pool, "sub-1").await.unwrap().unwrap();
        assert_eq!(loaded.cursor, "101");
    }

    #[tokio::test]
    async fn claim_marker_once_per_window() {
        let pool = setup_pool().await;
        assert!(claim_file_marker(&pool, "file-1", 10).await.unwrap());
        assert!(!claim_file_marker(&pool, "file-1", 10).await.unwrap());
        // A different file id is independent.
        assert!(claim_file_marker(&pool, "file-2", 10).await.unwrap());
    }

    #[tokio::test]
    async fn expired_marker_can_be_reclaimed() {
        let pool = setup_pool().await;
        // TTL of zero expires immediately.
        assert!(claim_file_marker(&pool, "file-1", 0).await.unwrap());
        assert!(claim_file_marker(&pool, "file-1", 10).await.unwrap());
    }

    #[tokio::test]
    async fn purge_drops_only_expired_markers() {
        let pool = setup_pool().await;
        claim_file_marker(&pool, "stale", 0).await.unwrap();
        claim_file_marker(&pool, "fresh", 60).await.unwrap();

        let purged = purge_expired_markers(&pool).await.unwrap();
        assert_eq!(purged, 1);
        assert!(get_file_marker(&pool, "stale").await.unwrap().is_none());
        assert!(get_file_marker(&pool, "fresh").await.unwrap().is_some());
    }

    #[test]
    fn sqlite_url_normalization() {
        assert_eq!(
            prepare_sqlite_url("sqlite::memory:"),
            "sqlite::memory:".to_string()
        );
        assert_eq!(
            prepare_sqlite_url("postgres://x"),
            "postgres://x".to_string()
        );
        assert!(prepare_sqlite_url("sqlite:///tmp/relay.db").starts_with("sqlite:///tmp/"));
    }
}
