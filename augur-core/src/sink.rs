//! Record sink: append-only log of predictions, read back for history and dashboards.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domains::Outcome;
use crate::error::PersistenceError;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PredictionRecord {
    pub id: Uuid,
    /// Canonical request inputs keyed by request field.
    pub inputs: Value,
    pub predicted_value: f64,
    pub label: Option<String>,
    pub probability: Option<f64>,
    pub risk_level: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PredictionRecord {
    pub fn new(inputs: Map<String, Value>, outcome: &Outcome) -> Self {
        Self {
            id: Uuid::new_v4(),
            inputs: Value::Object(inputs),
            predicted_value: outcome.value,
            label: outcome.label.clone(),
            probability: outcome.probability,
            risk_level: outcome.risk_level.clone(),
            created_at: Utc::now(),
        }
    }

    pub fn input_f64(&self, key: &str) -> Option<f64> {
        self.inputs.get(key).and_then(Value::as_f64)
    }

    pub fn input_str(&self, key: &str) -> Option<&str> {
        self.inputs.get(key).and_then(Value::as_str)
    }
}

#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn append(
        &self,
        table: &'static str,
        record: &PredictionRecord,
    ) -> Result<(), PersistenceError>;

    /// Newest first, at most `limit` rows.
    async fn recent(
        &self,
        table: &'static str,
        limit: i64,
    ) -> Result<Vec<PredictionRecord>, PersistenceError>;

    /// The last `limit` rows (or every row) in chronological order.
    async fn window(
        &self,
        table: &'static str,
        limit: Option<i64>,
    ) -> Result<Vec<PredictionRecord>, PersistenceError>;

    /// Short human-readable status of the backing store.
    async fn health(&self) -> Result<String, PersistenceError>;

    fn name(&self) -> &str;
}

// ============================================================================
// Postgres
// ============================================================================

#[derive(Debug, Clone)]
pub struct PgRecordSink {
    pool: PgPool,
}

impl PgRecordSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const RECORD_COLUMNS: &str =
    "id, inputs, predicted_value, label, probability, risk_level, created_at";

#[async_trait]
impl RecordSink for PgRecordSink {
    async fn append(
        &self,
        table: &'static str,
        record: &PredictionRecord,
    ) -> Result<(), PersistenceError> {
        let sql = format!(
            "INSERT INTO {table} ({RECORD_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)"
        );
        sqlx::query(&sql)
            .bind(record.id)
            .bind(&record.inputs)
            .bind(record.predicted_value)
            .bind(&record.label)
            .bind(record.probability)
            .bind(&record.risk_level)
            .bind(record.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn recent(
        &self,
        table: &'static str,
        limit: i64,
    ) -> Result<Vec<PredictionRecord>, PersistenceError> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM {table} ORDER BY created_at DESC LIMIT $1");
        let rows = sqlx::query_as::<_, PredictionRecord>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn window(
        &self,
        table: &'static str,
        limit: Option<i64>,
    ) -> Result<Vec<PredictionRecord>, PersistenceError> {
        let rows = match limit {
            Some(limit) => {
                let mut rows = self.recent(table, limit).await?;
                rows.reverse();
                rows
            }
            None => {
                let sql = format!("SELECT {RECORD_COLUMNS} FROM {table} ORDER BY created_at ASC");
                sqlx::query_as::<_, PredictionRecord>(&sql)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(rows)
    }

    async fn health(&self) -> Result<String, PersistenceError> {
        Ok(crate::db::health_check(&self.pool).await?)
    }

    fn name(&self) -> &str {
        "postgres"
    }
}

// ============================================================================
// In-process
// ============================================================================

/// Keeps records in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryRecordSink {
    tables: RwLock<HashMap<&'static str, Vec<PredictionRecord>>>,
}

impl MemoryRecordSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, table: &'static str) -> usize {
        self.tables
            .read()
            .map(|t| t.get(table).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> PersistenceError {
    PersistenceError::Unavailable(format!("memory sink lock poisoned: {e}"))
}

#[async_trait]
impl RecordSink for MemoryRecordSink {
    async fn append(
        &self,
        table: &'static str,
        record: &PredictionRecord,
    ) -> Result<(), PersistenceError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        tables.entry(table).or_default().push(record.clone());
        Ok(())
    }

    async fn recent(
        &self,
        table: &'static str,
        limit: i64,
    ) -> Result<Vec<PredictionRecord>, PersistenceError> {
        let tables = self.tables.read().map_err(poisoned)?;
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(tables
            .get(table)
            .map(|rows| rows.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn window(
        &self,
        table: &'static str,
        limit: Option<i64>,
    ) -> Result<Vec<PredictionRecord>, PersistenceError> {
        let tables = self.tables.read().map_err(poisoned)?;
        let rows = match tables.get(table) {
            Some(rows) => rows,
            None => return Ok(Vec::new()),
        };
        let skip = match limit {
            Some(limit) => rows.len().saturating_sub(usize::try_from(limit).unwrap_or(0)),
            None => 0,
        };
        Ok(rows[skip..].to_vec())
    }

    async fn health(&self) -> Result<String, PersistenceError> {
        Ok("in-memory".to_string())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
