//! Column-named table of JSON cells, the shape every export goes through.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub type Cell = Value;

/// A numeric cell; NaN and infinities become null.
pub fn number(value: f64) -> Cell {
    serde_json::Number::from_f64(value).map_or(Value::Null, Value::Number)
}

/// An optional numeric cell.
pub fn maybe_number(value: Option<f64>) -> Cell {
    value.map_or(Value::Null, number)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Appends a row; it must have one cell per column.
    ///
    /// # Errors
    /// Returns an error on a width mismatch.
    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<()> {
        ensure!(
            row.len() == self.columns.len(),
            "row has {} cells, table has {} columns",
            row.len(),
            self.columns.len()
        );
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&Cell> {
        let index = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(index))
    }

    /// pandas `orient="split"` layout: `{columns, index, data}`.
    pub fn to_split_json(&self) -> Value {
        let index: Vec<usize> = (0..self.rows.len()).collect();
        json!({
            "columns": self.columns,
            "index": index,
            "data": self.rows,
        })
    }

    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(render_cell))?;
        }
        writer.flush()?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the file cannot be created or written.
    pub fn write_csv_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let file = File::create(path)
            .with_context(|| format!("Failed to create CSV file: {}", path.display()))?;
        self.write_csv(file)
    }

    /// Reads a CSV with a header row, inferring integers, floats and empty cells.
    ///
    /// # Errors
    /// Returns an error on malformed CSV.
    pub fn read_csv<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::Reader::from_reader(reader);
        let mut table = Self::new(reader.headers()?.iter());
        for record in reader.records() {
            let record = record?;
            table.push_row(record.iter().map(parse_cell).collect())?;
        }
        Ok(table)
    }

    /// # Errors
    /// Returns an error if the file cannot be opened or parsed.
    pub fn read_csv_file(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("Failed to open CSV file: {}", path.display()))?;
        Self::read_csv(file).with_context(|| format!("Failed to parse CSV file: {}", path.display()))
    }
}

fn render_cell(cell: &Cell) -> String {
    match cell {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_cell(raw: &str) -> Cell {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::from(i);
    }
    match trimmed.parse::<f64>() {
        Ok(f) if f.is_finite() => number(f),
        Ok(_) => Value::Null,
        Err(_) => Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        let mut table = Table::new(["Financial Instrument", "Bid", "Position"]);
        table
            .push_row(vec![json!("CL FOP (LO) Feb'19 40 CALL @NYMEX"), number(11.61), json!(2)])
            .unwrap();
        table
            .push_row(vec![json!("CL FOP (LO) Feb'19 40 PUT @NYMEX"), number(f64::NAN), json!(0)])
            .unwrap();
        table
    }

    #[test]
    fn split_json_has_positional_index_and_nulls() {
        let split = sample().to_split_json();
        assert_eq!(split["index"], json!([0, 1]));
        assert_eq!(split["columns"][1], "Bid");
        assert_eq!(split["data"][1][1], Value::Null);
    }

    #[test]
    fn csv_keeps_strings_numbers_and_gaps() {
        let mut buffer = Vec::new();
        sample().write_csv(&mut buffer).unwrap();
        let text = String::from_utf8(buffer.clone()).unwrap();
        assert!(text.starts_with("Financial Instrument,Bid,Position\n"));

        let read = Table::read_csv(buffer.as_slice()).unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read.cell(0, "Bid"), Some(&number(11.61)));
        assert_eq!(read.cell(1, "Bid"), Some(&Value::Null));
        assert_eq!(read.cell(0, "Position"), Some(&json!(2)));
        assert_eq!(
            read.cell(1, "Financial Instrument"),
            Some(&json!("CL FOP (LO) Feb'19 40 PUT @NYMEX"))
        );
    }

    #[test]
    fn width_mismatch_is_rejected() {
        let mut table = Table::new(["a", "b"]);
        assert!(table.push_row(vec![json!(1)]).is_err());
    }
}
