//! Modeling database export and read-back.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{ArgGroup, Args};
use serde_json::Value;
use tracing::{info, warn};

use tws_data::{ModelDatabase, Table};

#[derive(Args, Debug, Clone)]
pub struct ModelExportArgs {
    /// Snapshot CSV produced by the `snapshot` command
    #[arg(long)]
    pub csv: PathBuf,

    /// Output modeling database (JSON)
    #[arg(long, default_value = "./data/model.json")]
    pub out: PathBuf,

    /// Snapshot column used for the price parameter
    #[arg(long, default_value = "Mid")]
    pub value: String,

    /// Contract month to export (first month in the snapshot when omitted)
    #[arg(long)]
    pub expiry: Option<String>,
}

#[derive(Args, Debug, Clone)]
#[command(group(ArgGroup::new("symbol").required(true).args(["parameter", "variable"])))]
pub struct ModelReadArgs {
    /// Modeling database (JSON)
    #[arg(long)]
    pub db: PathBuf,

    /// Parameter to print as CSV
    #[arg(long)]
    pub parameter: Option<String>,

    /// Variable whose levels to print
    #[arg(long)]
    pub variable: Option<String>,
}

fn text(cell: &Value) -> Option<String> {
    match cell {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn column<'a>(table: &'a Table, name: &str) -> Result<impl Iterator<Item = &'a Value> + 'a> {
    let index = table
        .column_index(name)
        .ok_or_else(|| anyhow!("snapshot has no column {name}"))?;
    Ok(table.rows().iter().map(move |row| &row[index]))
}

/// Builds the model inputs of one contract month:
/// - sets `k` (strikes), `s` (sides) and `i` (instruments)
/// - scalar `und` (underlying price)
/// - parameter `price(k, s)` from `value_column`
/// - parameters `pos(i)` and `delta(i)`
///
/// # Errors
/// Returns an error if a required column is missing or the month is empty.
pub fn snapshot_model(table: &Table, value_column: &str, expiry: Option<&str>) -> Result<ModelDatabase> {
    let expiries: Vec<Option<String>> = column(table, "Expiry")?.map(text).collect();
    let month = match expiry {
        Some(m) => m.to_string(),
        None => expiries
            .iter()
            .flatten()
            .next()
            .cloned()
            .context("snapshot has no expiry")?,
    };
    let rows: Vec<usize> = (0..table.len())
        .filter(|r| expiries[*r].as_deref() == Some(month.as_str()))
        .collect();
    if rows.is_empty() {
        return Err(anyhow!("snapshot has no rows for {month}"));
    }

    let cell = |row: usize, name: &str| table.cell(row, name).cloned().unwrap_or(Value::Null);
    let mut prices: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
    let mut strikes = Vec::new();
    let mut instruments = Vec::new();
    let mut positions = Vec::new();
    let mut deltas = Vec::new();
    for &row in &rows {
        let strike = text(&cell(row, "Strike")).context("row without strike")?;
        let side = text(&cell(row, "Side")).context("row without side")?;
        if !strikes.contains(&strike) {
            strikes.push(strike.clone());
        }
        let price = cell(row, value_column).as_f64().unwrap_or_else(|| {
            warn!(strike = %strike, side = %side, column = value_column, "No value, using 0");
            0.0
        });
        prices.entry(strike).or_default().insert(side, price);

        if let Some(inst) = text(&cell(row, "Financial Instrument")) {
            positions.push(cell(row, "Position").as_f64().unwrap_or(0.0));
            deltas.push(cell(row, "Delta").as_f64().unwrap_or(0.0));
            instruments.push(inst);
        }
    }

    let sides = ["C", "P"];
    let mut pivot = Table::new(["k", "C", "P"]);
    for strike in &strikes {
        let by_side = prices.get(strike);
        let mut row = vec![Value::from(strike.as_str())];
        for side in sides {
            let price = by_side.and_then(|p| p.get(side)).copied().unwrap_or(0.0);
            row.push(tws_data::number(price));
        }
        pivot.push_row(row)?;
    }

    let mut db = ModelDatabase::new();
    db.add_set("k", "strikes", &strikes);
    db.add_set("s", "sides", sides);
    db.add_set("i", "instruments", &instruments);
    let underlying = rows
        .iter()
        .find_map(|r| cell(*r, "Underlying Price").as_f64())
        .unwrap_or(0.0);
    db.add_scalar("und", "underlying price", underlying);
    db.add_parameter_full("price", &format!("{value_column} {month}"), ["k", "s"], &pivot)?;
    db.add_parameter_sparse("pos", "position", "i", &instruments, &positions)?;
    db.add_parameter_sparse("delta", "delta", "i", &instruments, &deltas)?;
    Ok(db)
}

/// # Errors
/// Returns an error if the CSV cannot be read or the database cannot be written.
pub fn run_model_export(args: ModelExportArgs) -> Result<()> {
    let table = Table::read_csv_file(&args.csv)?;
    let db = snapshot_model(&table, &args.value, args.expiry.as_deref())?;
    if let Some(parent) = args.out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    db.save(&args.out)?;
    info!(
        path = %args.out.display(),
        parameters = db.parameters.len(),
        sets = db.sets.len(),
        "Modeling database written"
    );
    Ok(())
}

/// # Errors
/// Returns an error if the database cannot be read or the symbol is unknown.
pub fn run_model_read(args: ModelReadArgs) -> Result<()> {
    let db = ModelDatabase::load(&args.db)?;
    if let Some(name) = &args.parameter {
        db.parameter_table(name)?.write_csv(std::io::stdout().lock())?;
    }
    if let Some(name) = &args.variable {
        for (keys, level) in db.variable_levels(name)? {
            println!("{}\t{level}", keys.join("."));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tws_data::number;

    fn snapshot() -> Table {
        let mut table = Table::new([
            "Financial Instrument",
            "Strike",
            "Side",
            "Expiry",
            "Underlying Price",
            "Mid",
            "Position",
            "Delta",
        ]);
        let rows = [
            ("CL FOP (LO) Feb'19 40 CALL @NYMEX", 40, "C", 201902, 11.65, -2, 0.96),
            ("CL FOP (LO) Feb'19 40 PUT @NYMEX", 40, "P", 201902, 0.05, 0, -0.03),
            ("CL FOP (LO) Feb'19 40.5 CALL @NYMEX", 40, "C", 201902, 11.15, 0, 0.95),
            ("CL FOP (LO) Mar'19 40 CALL @NYMEX", 40, "C", 201903, 12.0, 1, 0.9),
        ];
        for (inst, strike, side, expiry, mid, pos, delta) in rows {
            let strike = if inst.contains("40.5") { json!(40.5) } else { json!(strike) };
            table
                .push_row(vec![
                    json!(inst),
                    strike,
                    json!(side),
                    json!(expiry),
                    number(51.54),
                    number(mid),
                    json!(pos),
                    number(delta),
                ])
                .unwrap();
        }
        table
    }

    #[test]
    fn first_month_is_pivoted_by_strike_and_side() {
        let db = snapshot_model(&snapshot(), "Mid", None).unwrap();

        assert_eq!(db.sets["k"].members, vec!["40", "40.5"]);
        assert_eq!(db.sets["i"].members.len(), 3);
        assert_eq!(db.scalars["und"].value, 51.54);

        let price = db.parameter_table("price").unwrap();
        assert_eq!(price.columns(), ["k", "s", "val"]);
        assert_eq!(price.len(), 4);
        assert_eq!(price.cell(1, "val"), Some(&number(0.05)));
        // 40.5 has no put in the snapshot
        assert_eq!(price.cell(3, "val"), Some(&number(0.0)));

        let pos = db.parameter_table("pos").unwrap();
        assert_eq!(pos.cell(0, "val"), Some(&number(-2.0)));
    }

    #[test]
    fn explicit_month_selects_rows() {
        let db = snapshot_model(&snapshot(), "Mid", Some("201903")).unwrap();
        assert_eq!(db.sets["i"].members, vec!["CL FOP (LO) Mar'19 40 CALL @NYMEX"]);
        assert!(snapshot_model(&snapshot(), "Mid", Some("201912")).is_err());
    }
}
