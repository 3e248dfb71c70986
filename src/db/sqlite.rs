use crate::db::models::DbRecord;
use crate::db::schema::SQLITE_INIT;
use crate::error::ClientError;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;

pub type SqlitePool = Pool<Sqlite>;

#[derive(Clone)]
pub struct StateStorage {
    pool: SqlitePool,
}

impl StateStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database and ensure the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self, ClientError> {
        let connect_opts = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // One connection: `sqlite::memory:` databases are per-connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_opts)
            .await?;
        let storage = Self::new(pool);
        storage.init_schema().await?;
        Ok(storage)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the schema by executing the bundled DDL.
    pub async fn init_schema(&self) -> Result<(), ClientError> {
        for stmt in SQLITE_INIT.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            sqlx::query(s).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn get(&self, namespace: &str) -> Result<Option<DbRecord>, ClientError> {
        let row = sqlx::query(
            r#"SELECT namespace, payload, updated_at
               FROM client_state WHERE namespace = ?"#,
        )
        .bind(namespace)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_model).transpose()
    }

    /// Replace the record stored under `namespace`.
    pub async fn put(&self, namespace: &str, payload: &str) -> Result<(), ClientError> {
        let updated_at = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO client_state (namespace, payload, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(namespace) DO UPDATE SET
                payload=excluded.payload,
                updated_at=excluded.updated_at
            "#,
        )
        .bind(namespace)
        .bind(payload)
        .bind(updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, namespace: &str) -> Result<(), ClientError> {
        sqlx::query("DELETE FROM client_state WHERE namespace = ?")
            .bind(namespace)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn row_to_model(row: SqliteRow) -> Result<DbRecord, ClientError> {
        let namespace: String = row.try_get("namespace")?;
        let payload: String = row.try_get("payload")?;
        let updated_at_str: String = row.try_get("updated_at")?;

        let updated_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&updated_at_str)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?
            .with_timezone(&Utc);

        Ok(DbRecord {
            namespace,
            payload,
            updated_at,
        })
    }
}
