//! # Duodécimo Engine
//!
//! Allocation and aggregation core for tracking the monthly share of public
//! revenue ("duodécimo") transferred to each constitutional power, the
//! expenses booked against it, and the disbursement schedule (cronograma) of
//! budgetary units.
//!
//! ## Core Concepts
//!
//! - **Eligible revenue**: the sum of the configured revenue sources for a month
//! - **Allowance**: a power's share of eligible revenue, `base × percentage / 100`,
//!   always recomputed for a whole year and never edited by hand
//! - **Bucket**: a contiguous group of months (bimonthly, quarterly, ...) used to
//!   roll monthly figures up consistently across every dataset
//! - **Sheet import**: uploaded spreadsheets are validated once into typed records;
//!   revenue and expense sheets are all-or-nothing, schedule sheets skip bad rows
//!
//! ## Example
//!
//! ```rust,ignore
//! use duodecimo_engine::*;
//! use rust_decimal_macros::dec;
//!
//! let store = MemoryStore::with_powers(vec![
//!     PowerEntity::new("Legislativo", dec!(4.5))?,
//!     PowerEntity::new("Judiciário", dec!(8.0))?,
//! ])?;
//! let mut service = DuodecimoService::new(store, &DuodecimoConfig::default());
//!
//! let sheet = Sheet::from_csv_str(
//!     "ANO,COD FONTE,FONTE DE RECURSOS,JANEIRO\n2024,15000,Recursos Ordinários,1000000\n",
//! )?;
//! let outcome = service.import_revenue(&sheet);
//! assert!(outcome.is_success());
//!
//! let table = service.compute_allowance_table(2024, Granularity::Quarterly)?;
//! let chart = ChartData::from_table(&table);
//! ```

pub mod aggregation;
pub mod allocation;
pub mod config;
pub mod error;
pub mod ingestion;
pub mod periods;
pub mod report;
pub mod schema;
pub mod service;
pub mod store;
pub mod utils;

pub use aggregation::{aggregate, aggregate_schedule, AggregateTable, ScheduleRow, ScheduleTable};
pub use allocation::{recompute_allowances, AllocationCalculator};
pub use config::DuodecimoConfig;
pub use error::{DuodecimoError, Result};
pub use ingestion::{
    normalize_expense_rows, normalize_revenue_rows, normalize_schedule_rows, ExpenseImport,
    RevenueImport, ScheduleImport, Sheet, SkippedRow,
};
pub use periods::{bucket_index, buckets_for, Bucket, Granularity};
pub use report::{report_filename, CellFormat, ChartData, ChartDataset, ReportTable};
pub use schema::*;
pub use service::{DuodecimoService, ImportOutcome, ImportStatus};
pub use store::{MemoryStore, Store};
pub use utils::*;

use log::info;

/// Everything a dashboard or report needs for one dataset, year and granularity.
pub struct DashboardSnapshot {
    pub year: i32,
    pub granularity: Granularity,
    pub table: AggregateTable<String>,
    pub chart: ChartData,
}

/// Allowance dashboard for a year; the tag is parsed leniently so unknown
/// values fall back to a monthly view.
pub fn allowance_dashboard<S: Store>(
    service: &DuodecimoService<S>,
    year: Option<i32>,
    granularity_tag: &str,
) -> Result<DashboardSnapshot> {
    let year = year.unwrap_or_else(current_year);
    let granularity = Granularity::from_tag_lenient(granularity_tag);
    info!("Building allowance dashboard for {} ({})", year, granularity);

    let table = service.compute_allowance_table(year, granularity)?;
    let chart = ChartData::from_table(&table);
    Ok(DashboardSnapshot {
        year,
        granularity,
        table,
        chart,
    })
}

/// Expense dashboard counterpart of [`allowance_dashboard`].
pub fn expense_dashboard<S: Store>(
    service: &DuodecimoService<S>,
    year: Option<i32>,
    granularity_tag: &str,
) -> Result<DashboardSnapshot> {
    let year = year.unwrap_or_else(current_year);
    let granularity = Granularity::from_tag_lenient(granularity_tag);
    info!("Building expense dashboard for {} ({})", year, granularity);

    let table = service.compute_expense_table(year, granularity)?;
    let chart = ChartData::from_table(&table);
    Ok(DashboardSnapshot {
        year,
        granularity,
        table,
        chart,
    })
}
