use crate::error::{DuodecimoError, Result};
use crate::schema::{
    ExpenseCategory, MonthlyExpense, MonthlyRevenueRecord, PowerEntity, RevenueSource,
    ScheduleEntry,
};
use crate::utils::{
    fold_label, max_amount, parse_decimal, round_currency, within_amount_bounds, MONTH_NAMES,
};
use log::{debug, info, warn};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;

pub const YEAR_COLUMN: &str = "ANO";
pub const SOURCE_CODE_COLUMN: &str = "COD FONTE";
pub const SOURCE_NAME_COLUMN: &str = "FONTE DE RECURSOS";
pub const CATEGORY_CODE_COLUMN: &str = "COD CATEGORIA";
pub const CATEGORY_NAME_COLUMN: &str = "CATEGORIA";
pub const POWER_COLUMN: &str = "PODER";

pub const UNIT_ID_COLUMN: &str = "ug";
pub const UNIT_NAME_COLUMN: &str = "nome unidade";
pub const RESOURCE_SOURCE_COLUMN: &str = "fonte de recurso";
pub const EXPENSE_VALUE_COLUMN: &str = "valor despesa";
pub const TOTAL_COLUMN: &str = "total";

/// Uploaded spreadsheet contents: one header row plus raw text cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self { headers, rows })
    }

    pub fn from_csv_str(text: &str) -> Result<Self> {
        Self::from_csv_reader(text.as_bytes())
    }

    /// Position of a column, compared case- and accent-insensitively.
    pub fn column(&self, name: &str) -> Option<usize> {
        let wanted = fold_label(name);
        self.headers.iter().position(|h| fold_label(h) == wanted)
    }

    fn require_column(&self, name: &str) -> Result<usize> {
        self.column(name).ok_or_else(|| {
            DuodecimoError::ValidationError(format!("missing required column '{}'", name))
        })
    }

    fn month_columns(&self) -> [Option<usize>; 12] {
        let mut columns = [None; 12];
        for (idx, name) in MONTH_NAMES.iter().enumerate() {
            columns[idx] = self.column(name);
        }
        columns
    }

    /// Data rows with their 1-based line number in the file (header is line 1).
    fn data_rows(&self) -> impl Iterator<Item = (usize, &[String])> {
        self.rows
            .iter()
            .enumerate()
            .map(|(idx, row)| (idx + 2, row.as_slice()))
    }
}

fn cell(row: &[String], column: Option<usize>) -> &str {
    column
        .and_then(|c| row.get(c))
        .map(|s| s.trim())
        .unwrap_or("")
}

/// Integers may arrive as `2024` or as a float-formatted `2024.0`.
fn parse_integer(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(value) = text.parse::<i64>() {
        return Some(value);
    }
    let value = parse_decimal(text)?;
    if value.fract().is_zero() {
        value.to_i64()
    } else {
        None
    }
}

fn normalize_code(text: &str) -> String {
    let text = text.trim();
    match text.strip_suffix(".0") {
        Some(digits) if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) => {
            digits.to_string()
        }
        _ => text.to_string(),
    }
}

fn strict_year(row: &[String], column: usize, line: usize) -> Result<i32> {
    let text = cell(row, Some(column));
    parse_integer(text)
        .and_then(|y| i32::try_from(y).ok())
        .ok_or_else(|| {
            DuodecimoError::ValidationError(format!("line {}: invalid year '{}'", line, text))
        })
}

fn strict_amount(text: &str, line: usize, column: &str) -> Result<Decimal> {
    if text.is_empty() {
        return Ok(Decimal::ZERO);
    }
    let value = parse_decimal(text).map(round_currency).ok_or_else(|| {
        DuodecimoError::ValidationError(format!(
            "line {}: invalid numeric value '{}' in column '{}'",
            line, text, column
        ))
    })?;
    if !within_amount_bounds(value) {
        return Err(DuodecimoError::ValidationError(format!(
            "line {}: value '{}' in column '{}' exceeds the limit of {}",
            line,
            text,
            column,
            max_amount()
        )));
    }
    Ok(value)
}

fn strict_months(
    row: &[String],
    columns: &[Option<usize>; 12],
    line: usize,
) -> Result<[Decimal; 12]> {
    let mut values = [Decimal::ZERO; 12];
    for (idx, column) in columns.iter().enumerate() {
        values[idx] = strict_amount(cell(row, *column), line, MONTH_NAMES[idx])?;
    }
    Ok(values)
}

fn required_text(row: &[String], column: usize, line: usize, name: &str) -> Result<String> {
    let text = cell(row, Some(column));
    if text.is_empty() {
        return Err(DuodecimoError::ValidationError(format!(
            "line {}: empty value in column '{}'",
            line, name
        )));
    }
    Ok(text.to_string())
}

/// Canonical output of a revenue upload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RevenueImport {
    pub sources: Vec<RevenueSource>,
    pub records: Vec<MonthlyRevenueRecord>,
}

impl RevenueImport {
    pub fn years(&self) -> BTreeSet<i32> {
        self.records.iter().map(|r| r.year).collect()
    }
}

/// Validates a revenue sheet and turns it into one record per
/// (source, year, month). Any invalid cell rejects the whole sheet.
pub fn normalize_revenue_rows(sheet: &Sheet) -> Result<RevenueImport> {
    let year_column = sheet.require_column(YEAR_COLUMN)?;
    let code_column = sheet.require_column(SOURCE_CODE_COLUMN)?;
    let name_column = sheet.require_column(SOURCE_NAME_COLUMN)?;
    let month_columns = sheet.month_columns();

    let mut sources: BTreeMap<String, RevenueSource> = BTreeMap::new();
    let mut records: BTreeMap<(String, i32, u32), Decimal> = BTreeMap::new();

    for (line, row) in sheet.data_rows() {
        let year = strict_year(row, year_column, line)?;
        let code = normalize_code(&required_text(row, code_column, line, SOURCE_CODE_COLUMN)?);
        let name = cell(row, Some(name_column)).to_string();
        let values = strict_months(row, &month_columns, line)?;

        let source = sources
            .entry(code.clone())
            .or_insert_with(|| RevenueSource {
                code: code.clone(),
                name: name.clone(),
            });
        if source.name != name {
            debug!(
                "Line {}: source {} already named '{}', ignoring '{}'",
                line, code, source.name, name
            );
        }

        for (idx, value) in values.iter().enumerate() {
            records.insert((code.clone(), year, idx as u32 + 1), *value);
        }
    }

    let import = RevenueImport {
        sources: sources.into_values().collect(),
        records: records
            .into_iter()
            .map(|((source_code, year, month), value)| MonthlyRevenueRecord {
                source_code,
                year,
                month,
                value,
            })
            .collect(),
    };

    info!(
        "Normalized revenue sheet: {} source(s), {} monthly record(s)",
        import.sources.len(),
        import.records.len()
    );
    Ok(import)
}

/// Canonical output of an expense upload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpenseImport {
    pub categories: Vec<ExpenseCategory>,
    pub records: Vec<MonthlyExpense>,
}

/// Validates an expense sheet against the configured powers. An unknown
/// power name or an invalid cell rejects the whole sheet.
pub fn normalize_expense_rows(sheet: &Sheet, powers: &[PowerEntity]) -> Result<ExpenseImport> {
    let year_column = sheet.require_column(YEAR_COLUMN)?;
    let code_column = sheet.require_column(CATEGORY_CODE_COLUMN)?;
    let name_column = sheet.require_column(CATEGORY_NAME_COLUMN)?;
    let power_column = sheet.require_column(POWER_COLUMN)?;
    let month_columns = sheet.month_columns();

    let mut categories: BTreeMap<String, ExpenseCategory> = BTreeMap::new();
    let mut records: BTreeMap<(String, String, i32, u32), Decimal> = BTreeMap::new();

    for (line, row) in sheet.data_rows() {
        let year = strict_year(row, year_column, line)?;
        let code = normalize_code(&required_text(row, code_column, line, CATEGORY_CODE_COLUMN)?);
        let name = cell(row, Some(name_column)).to_string();

        let power_name = cell(row, Some(power_column));
        let power = powers
            .iter()
            .find(|p| p.name == power_name)
            .ok_or_else(|| DuodecimoError::EntityNotFound {
                kind: "Power",
                name: power_name.to_string(),
            })?;

        let values = strict_months(row, &month_columns, line)?;

        categories
            .entry(code.clone())
            .or_insert_with(|| ExpenseCategory {
                code: code.clone(),
                name,
            });

        for (idx, value) in values.iter().enumerate() {
            records.insert(
                (code.clone(), power.name.clone(), year, idx as u32 + 1),
                *value,
            );
        }
    }

    let import = ExpenseImport {
        categories: categories.into_values().collect(),
        records: records
            .into_iter()
            .map(|((category_code, power, year, month), value)| MonthlyExpense {
                category_code,
                power,
                year,
                month,
                value,
            })
            .collect(),
    };

    info!(
        "Normalized expense sheet: {} categor(ies), {} monthly record(s)",
        import.categories.len(),
        import.records.len()
    );
    Ok(import)
}

/// A schedule row that was dropped instead of aborting the upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRow {
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleImport {
    pub entries: Vec<ScheduleEntry>,
    pub skipped: Vec<SkippedRow>,
}

fn tolerant_amount(
    row: &[String],
    column: Option<usize>,
    name: &str,
) -> std::result::Result<Decimal, String> {
    let text = cell(row, column);
    if text.is_empty() {
        return Ok(Decimal::ZERO);
    }
    let value = parse_decimal(text)
        .map(round_currency)
        .ok_or_else(|| format!("invalid numeric value '{}' in column '{}'", text, name))?;
    if !within_amount_bounds(value) {
        return Err(format!(
            "value '{}' in column '{}' exceeds the limit of {}",
            text,
            name,
            max_amount()
        ));
    }
    Ok(value)
}

fn schedule_entry_from_row(
    row: &[String],
    columns: &ScheduleColumns,
) -> std::result::Result<ScheduleEntry, String> {
    let unit_text = cell(row, Some(columns.unit_id));
    let unit_id =
        parse_integer(unit_text).ok_or_else(|| format!("invalid UG '{}'", unit_text))?;

    let year_text = cell(row, Some(columns.year));
    let year = parse_integer(year_text)
        .and_then(|y| i32::try_from(y).ok())
        .ok_or_else(|| format!("invalid year '{}'", year_text))?;

    let mut months = [Decimal::ZERO; 12];
    for (idx, column) in columns.months.iter().enumerate() {
        months[idx] = tolerant_amount(row, *column, MONTH_NAMES[idx])?;
    }

    let expense_value = tolerant_amount(row, columns.expense_value, EXPENSE_VALUE_COLUMN)?;
    let total = if cell(row, columns.total).is_empty() {
        months.iter().copied().sum()
    } else {
        tolerant_amount(row, columns.total, TOTAL_COLUMN)?
    };

    Ok(ScheduleEntry {
        unit_id,
        unit_name: cell(row, columns.unit_name).to_string(),
        year,
        resource_source_name: cell(row, columns.resource_source).to_string(),
        expense_value,
        months,
        total,
    })
}

struct ScheduleColumns {
    unit_id: usize,
    year: usize,
    unit_name: Option<usize>,
    resource_source: Option<usize>,
    expense_value: Option<usize>,
    total: Option<usize>,
    months: [Option<usize>; 12],
}

/// Normalizes a disbursement schedule sheet. Unlike revenue and expense
/// sheets, a bad row is skipped and reported while the rest is kept.
pub fn normalize_schedule_rows(sheet: &Sheet) -> Result<ScheduleImport> {
    let columns = ScheduleColumns {
        unit_id: sheet.require_column(UNIT_ID_COLUMN)?,
        year: sheet.require_column(YEAR_COLUMN)?,
        unit_name: sheet.column(UNIT_NAME_COLUMN),
        resource_source: sheet.column(RESOURCE_SOURCE_COLUMN),
        expense_value: sheet.column(EXPENSE_VALUE_COLUMN),
        total: sheet.column(TOTAL_COLUMN),
        months: sheet.month_columns(),
    };

    let mut entries: Vec<ScheduleEntry> = Vec::new();
    let mut positions: BTreeMap<(i64, i32, String), usize> = BTreeMap::new();
    let mut skipped = Vec::new();

    for (line, row) in sheet.data_rows() {
        match schedule_entry_from_row(row, &columns) {
            Ok(entry) => {
                let key = (entry.unit_id, entry.year, entry.resource_source_name.clone());
                if let Some(&position) = positions.get(&key) {
                    warn!(
                        "Line {}: duplicate schedule row for UG {} / {} / '{}', keeping the later one",
                        line, entry.unit_id, entry.year, entry.resource_source_name
                    );
                    entries[position] = entry;
                } else {
                    positions.insert(key, entries.len());
                    entries.push(entry);
                }
            }
            Err(reason) => {
                warn!("Line {}: skipping schedule row: {}", line, reason);
                skipped.push(SkippedRow { line, reason });
            }
        }
    }

    info!(
        "Normalized schedule sheet: {} entr(ies) kept, {} row(s) skipped",
        entries.len(),
        skipped.len()
    );
    Ok(ScheduleImport { entries, skipped })
}
