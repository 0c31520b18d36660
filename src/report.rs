use crate::aggregation::{AggregateTable, ScheduleTable};
use crate::error::{DuodecimoError, Result};
use crate::periods::Granularity;
use crate::utils::{format_brl, round_currency};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::io::Write;

pub const PERIOD_HEADER: &str = "Período";
pub const TOTAL_LABEL: &str = "Total";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChartDataset {
    pub label: String,
    pub data: Vec<f64>,
}

/// Dashboard chart payload: one label per bucket, one dataset per power.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub datasets: Vec<ChartDataset>,
}

impl ChartData {
    pub fn from_table(table: &AggregateTable<String>) -> Self {
        let datasets = table
            .entities
            .iter()
            .enumerate()
            .map(|(column, name)| ChartDataset {
                label: name.clone(),
                data: table
                    .cells
                    .iter()
                    .map(|row| row[column].to_f64().unwrap_or(0.0))
                    .collect(),
            })
            .collect();

        Self {
            labels: table.buckets.iter().map(|b| b.label.clone()).collect(),
            datasets,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellFormat {
    /// `R$ 1.234,56`, for printed reports.
    Currency,
    /// `1234.56`, for spreadsheet exports.
    Plain,
}

impl CellFormat {
    fn render(self, value: Decimal) -> String {
        match self {
            CellFormat::Currency => format_brl(value),
            CellFormat::Plain => format!("{:.2}", round_currency(value)),
        }
    }
}

/// Text grid handed to the PDF/spreadsheet renderers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ReportTable {
    /// One row per bucket plus a closing total row; a total column on the right.
    pub fn from_table(table: &AggregateTable<String>, format: CellFormat) -> Self {
        let mut header = vec![PERIOD_HEADER.to_string()];
        header.extend(table.entities.iter().cloned());
        header.push(TOTAL_LABEL.to_string());

        let mut rows: Vec<Vec<String>> = table
            .buckets
            .iter()
            .zip(&table.cells)
            .zip(&table.row_totals)
            .map(|((bucket, cells), total)| {
                let mut row = vec![bucket.label.clone()];
                row.extend(cells.iter().map(|v| format.render(*v)));
                row.push(format.render(*total));
                row
            })
            .collect();

        let mut totals = vec![TOTAL_LABEL.to_string()];
        totals.extend(table.column_totals.iter().map(|v| format.render(*v)));
        totals.push(format.render(table.grand_total));
        rows.push(totals);

        Self { header, rows }
    }

    pub fn from_schedule(table: &ScheduleTable, format: CellFormat) -> Self {
        let mut header = vec!["UG".to_string(), "Unidade".to_string()];
        header.extend(table.buckets.iter().map(|b| b.label.clone()));
        header.push(TOTAL_LABEL.to_string());

        let mut rows: Vec<Vec<String>> = table
            .rows
            .iter()
            .map(|unit| {
                let mut row = vec![unit.unit_id.to_string(), unit.unit_name.clone()];
                row.extend(unit.values.iter().map(|v| format.render(*v)));
                row.push(format.render(unit.total));
                row
            })
            .collect();

        let mut totals = vec![String::new(), TOTAL_LABEL.to_string()];
        totals.extend(table.bucket_totals.iter().map(|v| format.render(*v)));
        totals.push(format.render(table.grand_total));
        rows.push(totals);

        Self { header, rows }
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(&self.header)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn to_csv_string(&self) -> Result<String> {
        let mut buffer = Vec::new();
        self.write_csv(&mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| DuodecimoError::ValidationError(format!("report is not UTF-8: {}", e)))
    }
}

/// Download name such as `duodecimos_2024_quarterly.pdf`.
pub fn report_filename(
    prefix: &str,
    year: i32,
    granularity: Granularity,
    extension: &str,
) -> String {
    format!("{}_{}_{}.{}", prefix, year, granularity, extension)
}
