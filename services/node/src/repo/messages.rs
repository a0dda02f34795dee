use core_model::Message;
use sqlx::{PgPool, Row};

pub async fn insert(pool: &PgPool, message: &Message) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO messages (id, author, schema, document, signature, timelines, created_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7)
           ON CONFLICT (id) DO NOTHING"#,
    )
    .bind(&message.id)
    .bind(&message.author)
    .bind(&message.schema)
    .bind(&message.document)
    .bind(&message.signature)
    .bind(&message.timelines)
    .bind(message.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find(pool: &PgPool, id: &str) -> Result<Option<Message>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT id, author, schema, document, signature, timelines, created_at FROM messages WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(row_to_message))
}

pub async fn delete(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM messages WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

fn row_to_message(row: sqlx::postgres::PgRow) -> Message {
    Message {
        id: row.get("id"),
        author: row.get("author"),
        schema: row.get("schema"),
        document: row.get("document"),
        signature: row.get("signature"),
        timelines: row.get("timelines"),
        created_at: row.get("created_at"),
    }
}
