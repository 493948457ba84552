//! Market snapshot items: split-orient table payload keyed by instrument and
//! date-time group.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, TimeZone};
use serde_json::Value;
use tracing::info;

use crate::store::{Item, ItemKey, KeyValueStore};
use crate::table::Table;

/// Date-time group `yyMMddHHmmss`.
pub fn dtg<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%y%m%d%H%M%S").to_string()
}

/// One item holding a whole snapshot table. `data` is stored as a JSON string
/// so the row matrix survives stores that cannot nest lists.
pub fn snapshot_item(inst: &str, dtg: &str, table: &Table) -> Result<Item> {
    let split = table.to_split_json();
    let data = serde_json::to_string(&split["data"]).context("Failed to encode snapshot rows")?;
    let dtg_number: i64 = dtg
        .parse()
        .with_context(|| format!("Date-time group is not numeric: {dtg}"))?;

    Ok(Item::new(ItemKey::with_sort(inst, dtg))
        .with("columns", split["columns"].clone())
        .with("index", split["index"].clone())
        .with("data", Value::String(data))
        .with("dtg", dtg_number)
        .with("inst", inst))
}

/// Uploads a snapshot CSV, stamped with the file's modification time.
///
/// # Errors
/// Returns an error if the file cannot be read or the put fails.
pub async fn upload_csv(
    store: &dyn KeyValueStore,
    table_name: &str,
    path: &Path,
    inst: &str,
) -> Result<ItemKey> {
    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .with_context(|| format!("Failed to stat {}", path.display()))?;
    let stamp = dtg(&DateTime::<Local>::from(modified));
    let table = Table::read_csv_file(path)?;

    let item = snapshot_item(inst, &stamp, &table)?;
    store
        .put_item(table_name, &item)
        .await
        .with_context(|| format!("Failed to write snapshot to {table_name}"))?;

    info!(table = table_name, inst, dtg = %stamp, rows = table.len(), "Snapshot uploaded");
    Ok(item.key)
}
