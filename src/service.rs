use crate::aggregation::{aggregate, aggregate_schedule, AggregateTable, ScheduleTable};
use crate::allocation::AllocationCalculator;
use crate::config::DuodecimoConfig;
use crate::error::Result;
use crate::ingestion::{
    normalize_expense_rows, normalize_revenue_rows, normalize_schedule_rows, Sheet, SkippedRow,
};
use crate::periods::{buckets_for, Granularity};
use crate::schema::MonthlyAllowance;
use crate::store::Store;
use log::{info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    Success,
    Error,
}

/// Status/message pair returned to the upload endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImportOutcome {
    pub status: ImportStatus,
    pub message: String,
    pub records_written: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedRow>,
}

impl ImportOutcome {
    fn success(message: String, records_written: usize) -> Self {
        Self {
            status: ImportStatus::Success,
            message,
            records_written,
            skipped: Vec::new(),
        }
    }

    fn failure(message: String) -> Self {
        Self {
            status: ImportStatus::Error,
            message,
            records_written: 0,
            skipped: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ImportStatus::Success
    }
}

fn outcome(kind: &str, result: Result<ImportOutcome>) -> ImportOutcome {
    result.unwrap_or_else(|e| {
        warn!("{} import failed: {}", kind, e);
        ImportOutcome::failure(format!("Error processing {} file: {}", kind, e))
    })
}

/// Entry point used by the presentation layer: dashboards, reports and uploads.
pub struct DuodecimoService<S: Store> {
    store: S,
    calculator: AllocationCalculator,
}

impl<S: Store> DuodecimoService<S> {
    pub fn new(store: S, config: &DuodecimoConfig) -> Self {
        Self {
            store,
            calculator: AllocationCalculator::from_config(config),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn compute_allowance_table(
        &self,
        year: i32,
        granularity: Granularity,
    ) -> Result<AggregateTable<String>> {
        let powers = self.power_names()?;
        let records = self.store.get_allowances(year)?;
        Ok(aggregate(&records, &powers, &buckets_for(granularity, year)))
    }

    pub fn compute_expense_table(
        &self,
        year: i32,
        granularity: Granularity,
    ) -> Result<AggregateTable<String>> {
        let powers = self.power_names()?;
        let records = self.store.get_expenses(year)?;
        Ok(aggregate(&records, &powers, &buckets_for(granularity, year)))
    }

    pub fn compute_schedule_table(
        &self,
        year: i32,
        granularity: Granularity,
    ) -> Result<ScheduleTable> {
        let entries = self.store.get_schedule(year)?;
        aggregate_schedule(&entries, &buckets_for(granularity, year))
    }

    pub fn recompute_allowances(&mut self, year: i32) -> Result<Vec<MonthlyAllowance>> {
        self.calculator.recompute_for_year(&mut self.store, year)
    }

    pub fn available_years(&self) -> Result<Vec<i32>> {
        self.store.list_distinct_years()
    }

    /// Stores the revenue sheet and recomputes allowances for every year it touches.
    pub fn import_revenue(&mut self, sheet: &Sheet) -> ImportOutcome {
        outcome("revenue", self.try_import_revenue(sheet))
    }

    fn try_import_revenue(&mut self, sheet: &Sheet) -> Result<ImportOutcome> {
        let import = normalize_revenue_rows(sheet)?;
        let years = import.years();
        let calculator = &self.calculator;

        self.store.atomically(|store| {
            for source in &import.sources {
                store.upsert_revenue_source(source)?;
            }
            for record in &import.records {
                store.upsert_revenue(record)?;
            }
            for year in &years {
                calculator.recompute_for_year(store, *year)?;
            }
            Ok(())
        })?;

        let years_text = years
            .iter()
            .map(|y| y.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        info!(
            "Imported {} revenue record(s); allowances recomputed for [{}]",
            import.records.len(),
            years_text
        );

        Ok(ImportOutcome::success(
            format!(
                "Imported {} revenue record(s); allowances recomputed for: {}",
                import.records.len(),
                if years_text.is_empty() {
                    "none"
                } else {
                    years_text.as_str()
                }
            ),
            import.records.len(),
        ))
    }

    pub fn import_expenses(&mut self, sheet: &Sheet) -> ImportOutcome {
        outcome("expense", self.try_import_expenses(sheet))
    }

    fn try_import_expenses(&mut self, sheet: &Sheet) -> Result<ImportOutcome> {
        let powers = self.store.get_powers()?;
        let import = normalize_expense_rows(sheet, &powers)?;

        self.store.atomically(|store| {
            for category in &import.categories {
                store.upsert_expense_category(category)?;
            }
            for record in &import.records {
                store.upsert_expense(record)?;
            }
            Ok(())
        })?;

        info!("Imported {} expense record(s)", import.records.len());
        Ok(ImportOutcome::success(
            format!("Imported {} expense record(s)", import.records.len()),
            import.records.len(),
        ))
    }

    /// Replaces the whole schedule with the sheet's valid rows; bad rows are
    /// skipped and listed in the outcome.
    pub fn import_schedule(&mut self, sheet: &Sheet) -> ImportOutcome {
        outcome("schedule", self.try_import_schedule(sheet))
    }

    fn try_import_schedule(&mut self, sheet: &Sheet) -> Result<ImportOutcome> {
        let import = normalize_schedule_rows(sheet)?;

        self.store
            .atomically(|store| store.replace_all_schedule(None, &import.entries))?;

        let mut message = format!("Imported {} schedule entr(ies)", import.entries.len());
        if !import.skipped.is_empty() {
            let lines = import
                .skipped
                .iter()
                .map(|s| s.line.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            message.push_str(&format!(
                "; skipped {} invalid row(s) at line(s) {}",
                import.skipped.len(),
                lines
            ));
        }
        info!("{}", message);

        let mut result = ImportOutcome::success(message, import.entries.len());
        result.skipped = import.skipped;
        Ok(result)
    }

    fn power_names(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .get_powers()?
            .into_iter()
            .map(|p| p.name)
            .collect())
    }
}
