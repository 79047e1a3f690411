//! Read side of the record store: history listings, CSV export and dashboard
//! aggregates.

use std::collections::BTreeSet;

use anyhow::anyhow;
use augur_core::{Domain, PersistenceError, RecordFilter};
use serde_json::Value;

use crate::context::DomainState;

/// Most recent records first, formatted by the domain. `limit` defaults to the
/// domain's own history size and applies before `filter`.
pub async fn history(
    state: &DomainState,
    limit: Option<i64>,
    filter: &RecordFilter,
) -> Result<Vec<Value>, PersistenceError> {
    let limit = limit.unwrap_or_else(|| state.domain.history_limit());
    let records = state.sink.recent(state.domain.table(), limit).await?;
    Ok(records
        .iter()
        .filter(|r| filter.matches(r))
        .map(|r| state.domain.history_row(r))
        .collect())
}

/// History rows as CSV. Request keys come first in feature order, then the
/// remaining row fields by name, then `created_at`.
pub fn history_csv(domain: &dyn Domain, rows: &[Value]) -> anyhow::Result<String> {
    let columns = csv_columns(domain, rows);
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&columns)?;
    for row in rows {
        writer.write_record(columns.iter().map(|c| csv_cell(row.get(c.as_str()))))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow!("CSV flush failed: {}", e.error()))?;
    Ok(String::from_utf8(bytes)?)
}

fn csv_columns(domain: &dyn Domain, rows: &[Value]) -> Vec<String> {
    let mut columns: Vec<String> = domain
        .encoder()
        .features()
        .iter()
        .map(|f| f.key.to_string())
        .collect();
    let extra: BTreeSet<&str> = rows
        .iter()
        .filter_map(Value::as_object)
        .flat_map(|row| row.keys())
        .map(String::as_str)
        .filter(|key| *key != "created_at" && !columns.iter().any(|c| c == key))
        .collect();
    columns.extend(extra.into_iter().map(str::to_string));
    columns.push("created_at".to_string());
    columns
}

fn csv_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Aggregate the domain's dashboard window, oldest record first.
pub async fn dashboard(state: &DomainState) -> Result<Value, PersistenceError> {
    let records = state
        .sink
        .window(state.domain.table(), state.domain.dashboard_window())
        .await?;
    Ok(state.domain.dashboard(&records))
}
