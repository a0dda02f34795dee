use core_model::Ack;
use sqlx::{PgPool, Row};

pub async fn ack(pool: &PgPool, entry: &Ack) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO acks (from_ccid, to_ccid, document, signature) VALUES ($1, $2, $3, $4)
           ON CONFLICT (from_ccid, to_ccid) DO UPDATE SET document = EXCLUDED.document, signature = EXCLUDED.signature"#,
    )
    .bind(&entry.from_ccid)
    .bind(&entry.to_ccid)
    .bind(&entry.document)
    .bind(&entry.signature)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn unack(pool: &PgPool, from_ccid: &str, to_ccid: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM acks WHERE from_ccid = $1 AND to_ccid = $2")
        .bind(from_ccid)
        .bind(to_ccid)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn exists(pool: &PgPool, from_ccid: &str, to_ccid: &str) -> Result<bool, sqlx::Error> {
    let row = sqlx::query(
        "SELECT EXISTS(SELECT 1 FROM acks WHERE from_ccid = $1 AND to_ccid = $2) AS exists",
    )
    .bind(from_ccid)
    .bind(to_ccid)
    .fetch_one(pool)
    .await?;
    Ok(row.get::<bool, _>("exists"))
}
