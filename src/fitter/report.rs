use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use super::common::Value;
use super::models::PeakShapeKind;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PeakReport {
    pub index: usize,
    pub kind: PeakShapeKind,
    pub parameters: Vec<(String, Value)>,
    pub area: Value,
}

impl PeakReport {
    pub fn get(&self, name: &str) -> Option<Value> {
        self.parameters
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }
}

/// Summary of a fit: every parameter with its error and each peak's area.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct FitReport {
    pub background: Value,
    pub peaks: Vec<PeakReport>,
    /// Integration window used for the areas.
    pub window: (f64, f64),
    pub r_squared: f64,
    pub ss_res: f64,
    pub success: bool,
}

fn error_cell(value: Value) -> String {
    value
        .uncertainty
        .map(|e| e.to_string())
        .unwrap_or_default()
}

impl FitReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        log::info!("Saved fit report to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Tab-separated table with columns `name value error area area_error`.
    /// The area appears on the first row of each peak; unknown errors are
    /// left blank.
    pub fn to_table(&self) -> String {
        let mut table = String::from("name\tvalue\terror\tarea\tarea_error\n");
        let _ = writeln!(
            table,
            "background\t{}\t{}\t\t",
            self.background.value,
            error_cell(self.background)
        );
        for peak in &self.peaks {
            for (i, (name, value)) in peak.parameters.iter().enumerate() {
                let _ = write!(
                    table,
                    "p{}_{name}\t{}\t{}",
                    peak.index,
                    value.value,
                    error_cell(*value)
                );
                let _ = if i == 0 {
                    writeln!(table, "\t{}\t{}", peak.area.value, error_cell(peak.area))
                } else {
                    writeln!(table, "\t\t")
                };
            }
        }
        table
    }
}
