use core_model::SemanticId;
use sqlx::{PgPool, Row};

pub async fn find(pool: &PgPool, name: &str, owner: &str) -> Result<Option<SemanticId>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT name, owner, target_timeline_id FROM semantic_ids WHERE name = $1 AND owner = $2",
    )
    .bind(name)
    .bind(owner)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| SemanticId {
        name: r.get("name"),
        owner: r.get("owner"),
        target_timeline_id: r.get("target_timeline_id"),
    }))
}

pub async fn upsert(pool: &PgPool, semantic: &SemanticId) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO semantic_ids (name, owner, target_timeline_id) VALUES ($1, $2, $3)
           ON CONFLICT (name, owner) DO UPDATE SET target_timeline_id = EXCLUDED.target_timeline_id"#,
    )
    .bind(&semantic.name)
    .bind(&semantic.owner)
    .bind(&semantic.target_timeline_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Deletes a dangling entry (its target timeline no longer exists). Called
/// by `NormalizeTimelineID`/`UpsertTimeline` when a lookup discovers the
/// target is missing.
pub async fn delete(pool: &PgPool, name: &str, owner: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM semantic_ids WHERE name = $1 AND owner = $2")
        .bind(name)
        .bind(owner)
        .execute(pool)
        .await?;
    Ok(())
}
