//! Database bootstrap: create the database, the private session table, and optional reset.

use crate::config::Catalog;
use crate::error::{ApiError, ConfigError};
use crate::service::auth::SESSIONS_TABLE;
use crate::sql::quoted;
use sqlx::ConnectOptions;
use sqlx::PgPool;
use std::str::FromStr;

/// Ensure the database in `database_url` exists; create it if not. Connects to the
/// default `postgres` database to run CREATE DATABASE. Call before creating the main pool.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), ApiError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url).map_err(|e| ConfigError::Setting {
        name: "DATABASE_URL",
        reason: e.to_string(),
    })?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        sqlx::query(&format!("CREATE DATABASE {}", quoted(&db_name)))
            .execute(&mut conn)
            .await?;
        tracing::info!(database = %db_name, "database created");
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), ConfigError> {
    let path_start = url.rfind('/').ok_or_else(|| ConfigError::Setting {
        name: "DATABASE_URL",
        reason: "no path".into(),
    })? + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let base = url.get(..path_start).unwrap_or(url);
    let admin_url = format!("{}postgres", base);
    Ok((admin_url, db_name.to_string()))
}

/// Session table keyed by raw token. Needs the user table; `apply_migrations` runs it last.
pub async fn ensure_private_tables(pool: &PgPool, catalog: &Catalog) -> Result<(), ApiError> {
    let users = catalog.entity("user")?;
    let ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            token TEXT PRIMARY KEY,
            user_id BIGINT NOT NULL REFERENCES {} ({}) ON DELETE CASCADE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        quoted(SESSIONS_TABLE),
        quoted(&users.table),
        quoted(&users.pk)
    );
    sqlx::query(&ddl).execute(pool).await?;
    Ok(())
}

/// Drops every catalog table, link table and the session table.
pub async fn reset_database(pool: &PgPool, catalog: &Catalog) -> Result<(), ApiError> {
    let mut tables: Vec<String> = vec![SESSIONS_TABLE.to_string()];
    for entity in catalog.entities() {
        for r in &entity.relations {
            if let crate::config::RelationKind::ManyToMany { link_table, .. } = &r.kind {
                if !tables.contains(link_table) {
                    tables.push(link_table.clone());
                }
            }
        }
    }
    tables.extend(catalog.entities().iter().map(|e| e.table.clone()));
    let list: Vec<String> = tables.iter().map(|t| quoted(t)).collect();
    sqlx::query(&format!("DROP TABLE IF EXISTS {} CASCADE", list.join(", ")))
        .execute(pool)
        .await?;
    tracing::warn!(tables = tables.len(), "database reset");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_url_targets_postgres_database() {
        let (admin, name) = parse_db_name_from_url("postgres://u:p@localhost:5432/academia?sslmode=disable").unwrap();
        assert_eq!(admin, "postgres://u:p@localhost:5432/postgres");
        assert_eq!(name, "academia");
    }

    #[test]
    fn url_without_path_is_rejected() {
        assert!(parse_db_name_from_url("localhost").is_err());
    }
}
