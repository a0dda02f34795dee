use core_model::Association;
use sqlx::{PgPool, Row};

pub async fn insert(pool: &PgPool, association: &Association) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO associations (id, author, schema, variant, target_id, document, signature, timelines, created_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
           ON CONFLICT (id) DO NOTHING"#,
    )
    .bind(&association.id)
    .bind(&association.author)
    .bind(&association.schema)
    .bind(&association.variant)
    .bind(&association.target_id)
    .bind(&association.document)
    .bind(&association.signature)
    .bind(&association.timelines)
    .bind(association.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find(pool: &PgPool, id: &str) -> Result<Option<Association>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT id, author, schema, variant, target_id, document, signature, timelines, created_at FROM associations WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(row_to_association))
}

pub async fn delete(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM associations WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

fn row_to_association(row: sqlx::postgres::PgRow) -> Association {
    Association {
        id: row.get("id"),
        author: row.get("author"),
        schema: row.get("schema"),
        variant: row.get("variant"),
        target_id: row.get("target_id"),
        document: row.get("document"),
        signature: row.get("signature"),
        timelines: row.get("timelines"),
        created_at: row.get("created_at"),
    }
}
