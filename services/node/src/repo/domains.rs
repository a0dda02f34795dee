use chrono::Utc;
use core_model::Domain;
use sqlx::{PgPool, Row};

pub async fn find(pool: &PgPool, fqdn: &str) -> Result<Option<Domain>, sqlx::Error> {
    let row =
        sqlx::query("SELECT fqdn, ccid, dimension, last_scraped_at FROM domains WHERE fqdn = $1")
            .bind(fqdn)
            .fetch_optional(pool)
            .await?;
    Ok(row.map(row_to_domain))
}

pub async fn list(pool: &PgPool) -> Result<Vec<Domain>, sqlx::Error> {
    let rows = sqlx::query("SELECT fqdn, ccid, dimension, last_scraped_at FROM domains")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(row_to_domain).collect())
}

pub async fn upsert(pool: &PgPool, domain: &Domain) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO domains (fqdn, ccid, dimension, last_scraped_at) VALUES ($1, $2, $3, $4)
           ON CONFLICT (fqdn) DO UPDATE SET ccid = EXCLUDED.ccid, dimension = EXCLUDED.dimension"#,
    )
    .bind(&domain.fqdn)
    .bind(&domain.ccid)
    .bind(&domain.dimension)
    .bind(domain.last_scraped_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn update_scrape_time(pool: &PgPool, fqdn: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE domains SET last_scraped_at = $1 WHERE fqdn = $2")
        .bind(Utc::now())
        .bind(fqdn)
        .execute(pool)
        .await?;
    Ok(())
}

fn row_to_domain(row: sqlx::postgres::PgRow) -> Domain {
    Domain {
        fqdn: row.get("fqdn"),
        ccid: row.get("ccid"),
        dimension: row.get("dimension"),
        last_scraped_at: row.get("last_scraped_at"),
    }
}
