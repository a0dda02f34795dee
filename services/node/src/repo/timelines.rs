use core_model::Timeline;
use sqlx::{PgPool, Row};

pub async fn find(pool: &PgPool, id: &str) -> Result<Option<Timeline>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT id, author, schema, policy, policy_params, domain_owned, indexable FROM timelines WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(row_to_timeline))
}

pub async fn upsert(pool: &PgPool, timeline: &Timeline) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO timelines (id, author, schema, policy, policy_params, domain_owned, indexable)
           VALUES ($1, $2, $3, $4, $5, $6, $7)
           ON CONFLICT (id) DO UPDATE SET
               author = EXCLUDED.author, schema = EXCLUDED.schema, policy = EXCLUDED.policy,
               policy_params = EXCLUDED.policy_params, domain_owned = EXCLUDED.domain_owned,
               indexable = EXCLUDED.indexable"#,
    )
    .bind(&timeline.id)
    .bind(&timeline.author)
    .bind(&timeline.schema)
    .bind(&timeline.policy)
    .bind(&timeline.policy_params)
    .bind(timeline.domain_owned)
    .bind(timeline.indexable)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM timelines WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

fn row_to_timeline(row: sqlx::postgres::PgRow) -> Timeline {
    Timeline {
        id: row.get("id"),
        author: row.get("author"),
        schema: row.get("schema"),
        policy: row.get("policy"),
        policy_params: row.get("policy_params"),
        domain_owned: row.get("domain_owned"),
        indexable: row.get("indexable"),
    }
}
