use core_model::Entity;
use sqlx::{PgPool, Row};

pub async fn find(pool: &PgPool, ccid: &str) -> Result<Option<Entity>, sqlx::Error> {
    let row = sqlx::query("SELECT ccid, domain, public_key FROM entities WHERE ccid = $1")
        .bind(ccid)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| Entity {
        ccid: r.get("ccid"),
        domain: r.get("domain"),
        public_key: r.get("public_key"),
    }))
}

pub async fn upsert(pool: &PgPool, entity: &Entity) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO entities (ccid, domain, public_key) VALUES ($1, $2, $3)
           ON CONFLICT (ccid) DO UPDATE SET domain = EXCLUDED.domain, public_key = EXCLUDED.public_key"#,
    )
    .bind(&entity.ccid)
    .bind(&entity.domain)
    .bind(&entity.public_key)
    .execute(pool)
    .await?;
    Ok(())
}
