use sqlx::{postgres::PgPoolOptions, PgPool};

pub async fn create_pool(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
}

pub async fn health_check(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    Ok(row.0)
}

/// Create a domain's prediction table if it does not exist yet.
///
/// `table` always comes from a compiled-in domain definition, never from a request.
pub async fn ensure_table(pool: &PgPool, table: &'static str) -> Result<(), sqlx::Error> {
    let ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            id UUID PRIMARY KEY,
            inputs JSONB NOT NULL,
            predicted_value DOUBLE PRECISION NOT NULL,
            label TEXT,
            probability DOUBLE PRECISION,
            risk_level TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#
    );
    sqlx::query(&ddl).execute(pool).await?;

    let index =
        format!("CREATE INDEX IF NOT EXISTS {table}_created_at_idx ON {table} (created_at)");
    sqlx::query(&index).execute(pool).await?;
    Ok(())
}
