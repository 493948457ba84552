//! Symbol database exchanged with an optimization-modeling tool.
//!
//! Holds sets, scalars, parameters and (solved) variables, keyed by labels.
//! Persisted as JSON next to the model run.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::table::{number, Table};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetSymbol {
    pub description: String,
    pub members: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarSymbol {
    pub description: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRecord {
    pub keys: Vec<String>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSymbol {
    pub description: String,
    pub domains: Vec<String>,
    pub records: Vec<ParameterRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableRecord {
    pub keys: Vec<String>,
    pub level: f64,
    #[serde(default)]
    pub marginal: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSymbol {
    pub description: String,
    pub domains: Vec<String>,
    pub records: Vec<VariableRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDatabase {
    #[serde(default)]
    pub sets: BTreeMap<String, SetSymbol>,
    #[serde(default)]
    pub scalars: BTreeMap<String, ScalarSymbol>,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterSymbol>,
    #[serde(default)]
    pub variables: BTreeMap<String, VariableSymbol>,
}

fn as_f64(cell: &Value) -> Option<f64> {
    match cell {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn label(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl ModelDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// One-dimensional set.
    pub fn add_set<I, S>(&mut self, name: &str, description: &str, members: I)
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        self.sets.insert(
            name.to_string(),
            SetSymbol {
                description: description.to_string(),
                members: members.into_iter().map(|m| m.to_string()).collect(),
            },
        );
    }

    /// Zero-dimensional parameter.
    pub fn add_scalar(&mut self, name: &str, description: &str, value: f64) {
        self.scalars.insert(
            name.to_string(),
            ScalarSymbol {
                description: description.to_string(),
                value,
            },
        );
    }

    /// Two-dimensional parameter from a table: the first column labels the
    /// rows, every other column header labels the second dimension.
    ///
    /// # Errors
    /// Returns an error if a value cell is not numeric.
    pub fn add_parameter_full(
        &mut self,
        name: &str,
        description: &str,
        domains: [&str; 2],
        table: &Table,
    ) -> Result<()> {
        ensure!(table.columns().len() >= 2, "parameter {name} needs a label column and values");
        let mut records = Vec::with_capacity(table.len() * (table.columns().len() - 1));
        for row in table.rows() {
            let row_label = label(&row[0]);
            for (column, cell) in table.columns().iter().zip(row.iter()).skip(1) {
                let Some(value) = as_f64(cell) else {
                    bail!("parameter {name}: {row_label}.{column} is not numeric ({cell})");
                };
                records.push(ParameterRecord {
                    keys: vec![row_label.clone(), column.clone()],
                    value,
                });
            }
        }
        self.parameters.insert(
            name.to_string(),
            ParameterSymbol {
                description: description.to_string(),
                domains: domains.iter().map(|d| d.to_string()).collect(),
                records,
            },
        );
        Ok(())
    }

    /// One-dimensional parameter from parallel label and value lists.
    ///
    /// # Errors
    /// Returns an error if the lists differ in length.
    pub fn add_parameter_sparse(
        &mut self,
        name: &str,
        description: &str,
        domain: &str,
        labels: &[String],
        values: &[f64],
    ) -> Result<()> {
        ensure!(
            labels.len() == values.len(),
            "parameter {name}: {} labels but {} values",
            labels.len(),
            values.len()
        );
        let records = labels
            .iter()
            .zip(values)
            .map(|(l, v)| ParameterRecord {
                keys: vec![l.clone()],
                value: *v,
            })
            .collect();
        self.parameters.insert(
            name.to_string(),
            ParameterSymbol {
                description: description.to_string(),
                domains: vec![domain.to_string()],
                records,
            },
        );
        Ok(())
    }

    pub fn add_variable(&mut self, name: &str, variable: VariableSymbol) {
        self.variables.insert(name.to_string(), variable);
    }

    /// Parameter as a table: one column per domain plus `val` (3 decimals).
    ///
    /// # Errors
    /// Returns an error if the parameter does not exist.
    pub fn parameter_table(&self, name: &str) -> Result<Table> {
        let Some(parameter) = self.parameters.get(name) else {
            bail!("no parameter named {name}");
        };
        let mut table = Table::new(parameter.domains.iter().map(String::as_str).chain(["val"]));
        for record in &parameter.records {
            let mut row: Vec<Value> = record.keys.iter().map(|k| Value::from(k.as_str())).collect();
            row.push(number((record.value * 1000.0).round() / 1000.0));
            table
                .push_row(row)
                .with_context(|| format!("parameter {name} has a record of the wrong arity"))?;
        }
        Ok(table)
    }

    /// Variable levels keyed by their label tuple.
    ///
    /// # Errors
    /// Returns an error if the variable does not exist.
    pub fn variable_levels(&self, name: &str) -> Result<BTreeMap<Vec<String>, f64>> {
        let Some(variable) = self.variables.get(name) else {
            bail!("no variable named {name}");
        };
        Ok(variable
            .records
            .iter()
            .map(|r| (r.keys.clone(), r.level))
            .collect())
    }

    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write model database: {}", path.display()))
    }

    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model database: {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse model database: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn margins() -> Table {
        let mut table = Table::new(["strike", "C", "P"]);
        table.push_row(vec![json!(40), json!(1.23456), json!(0.5)]).unwrap();
        table.push_row(vec![json!(41), json!(0.9), json!("0.75")]).unwrap();
        table
    }

    #[test]
    fn full_parameter_reads_back_as_long_table() {
        let mut db = ModelDatabase::new();
        db.add_parameter_full("price", "option prices", ["k", "s"], &margins()).unwrap();

        let table = db.parameter_table("price").unwrap();
        assert_eq!(table.columns(), ["k", "s", "val"]);
        assert_eq!(table.len(), 4);
        assert_eq!(table.rows()[0], vec![json!("40"), json!("C"), number(1.235)]);
        assert_eq!(table.rows()[3], vec![json!("41"), json!("P"), number(0.75)]);
    }

    #[test]
    fn non_numeric_value_is_rejected() {
        let mut table = Table::new(["strike", "C"]);
        table.push_row(vec![json!(40), json!("n/a")]).unwrap();
        let mut db = ModelDatabase::new();
        assert!(db.add_parameter_full("price", "", ["k", "s"], &table).is_err());
    }

    #[test]
    fn sparse_parameter_and_scalar() {
        let mut db = ModelDatabase::new();
        let labels = vec!["a".to_string(), "b".to_string()];
        db.add_parameter_sparse("w", "weights", "i", &labels, &[1.0, 2.0]).unwrap();
        db.add_scalar("budget", "max spend", 1000.0);
        db.add_set("i", "instruments", &labels);

        assert!(db.add_parameter_sparse("bad", "", "i", &labels, &[1.0]).is_err());
        assert_eq!(db.parameter_table("w").unwrap().len(), 2);
        assert_eq!(db.sets["i"].members, labels);
        assert_eq!(db.scalars["budget"].value, 1000.0);
    }

    #[test]
    fn variables_survive_a_save_load_cycle() {
        let mut db = ModelDatabase::new();
        db.add_variable(
            "x",
            VariableSymbol {
                description: "position".to_string(),
                domains: vec!["k".to_string(), "s".to_string()],
                records: vec![VariableRecord {
                    keys: vec!["40".to_string(), "C".to_string()],
                    level: 3.0,
                    marginal: 0.0,
                }],
            },
        );
        let path = std::env::temp_dir().join(format!("tws-model-{}.json", std::process::id()));
        db.save(&path).unwrap();
        let loaded = ModelDatabase::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let levels = loaded.variable_levels("x").unwrap();
        assert_eq!(levels[&vec!["40".to_string(), "C".to_string()]], 3.0);
        assert!(loaded.variable_levels("y").is_err());
    }
}
