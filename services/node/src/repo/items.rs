use chrono::{DateTime, Utc};
use core_model::TimelineItem;
use sqlx::{PgPool, Row};
use std::collections::HashMap;

/// Inserts a `TimelineItem` row. `(timeline_id, resource_id)` is the
/// primary key, so a replayed post is a no-op here.
pub async fn create_item(pool: &PgPool, item: &TimelineItem) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO timeline_items (timeline_id, resource_id, owner, author, created_at)
           VALUES ($1, $2, $3, $4, $5)
           ON CONFLICT (timeline_id, resource_id) DO NOTHING"#,
    )
    .bind(&item.timeline_id)
    .bind(&item.resource_id)
    .bind(&item.owner)
    .bind(&item.author)
    .bind(item.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Returns the single chunk (bounded by `[immediate, recent)`) for each of
/// `timelines` that has at least one item in range. Timelines with no rows
/// in the window are simply absent from the map -- the caller distinguishes
/// "DB has nothing" from "cache hit empty" on its own.
pub async fn get_chunk_from_db(
    pool: &PgPool,
    timelines: &[String],
    immediate: DateTime<Utc>,
    recent: DateTime<Utc>,
) -> Result<HashMap<String, Vec<TimelineItem>>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT timeline_id, resource_id, owner, author, created_at
           FROM timeline_items
           WHERE timeline_id = ANY($1) AND created_at >= $2 AND created_at < $3
           ORDER BY created_at DESC"#,
    )
    .bind(timelines)
    .bind(immediate)
    .bind(recent)
    .fetch_all(pool)
    .await?;

    let mut by_timeline: HashMap<String, Vec<TimelineItem>> = HashMap::new();
    for row in rows {
        let item = TimelineItem {
            timeline_id: row.get("timeline_id"),
            resource_id: row.get("resource_id"),
            owner: row.get("owner"),
            author: row.get("author"),
            created_at: row.get("created_at"),
        };
        by_timeline
            .entry(item.timeline_id.clone())
            .or_default()
            .push(item);
    }
    Ok(by_timeline)
}

/// Removes every item row referencing `resource_id`, across all timelines.
/// Called on message/association deletion.
pub async fn delete_by_resource(pool: &PgPool, resource_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM timeline_items WHERE resource_id = $1")
        .bind(resource_id)
        .execute(pool)
        .await?;
    Ok(())
}
