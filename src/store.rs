//! Storage collaborator interface and an in-memory implementation.
//!
//! The engine never talks to a database directly; everything it reads or
//! writes goes through [`Store`]. Replace operations must be all-or-nothing
//! so readers only ever observe the complete old set or the complete new set.

use crate::error::{DuodecimoError, Result};
use crate::schema::{
    ExpenseCategory, MonthlyAllowance, MonthlyExpense, MonthlyLookup, MonthlyRevenueRecord,
    PowerEntity, RevenueSource, ScheduleEntry,
};
use crate::utils::validate_month;
use log::debug;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet, HashSet};

pub trait Store {
    /// Sum of revenue for the year and month over the given source codes.
    fn get_revenue(&self, year: i32, month: u32, source_codes: &[String]) -> Result<Decimal>;

    /// Creates the source if its code is unknown; an existing code keeps its identity.
    fn upsert_revenue_source(&mut self, source: &RevenueSource) -> Result<()>;

    fn upsert_revenue(&mut self, record: &MonthlyRevenueRecord) -> Result<()>;

    /// Powers in their stable listing order.
    fn get_powers(&self) -> Result<Vec<PowerEntity>>;

    fn upsert_allowance(&mut self, allowance: &MonthlyAllowance) -> Result<()>;

    /// Drops every allowance of `year` and inserts `allowances` in one unit.
    fn replace_allowances(&mut self, year: i32, allowances: &[MonthlyAllowance]) -> Result<()>;

    fn get_allowance_rows(&self, year: i32) -> Result<Vec<MonthlyAllowance>>;

    fn get_allowances(&self, year: i32) -> Result<MonthlyLookup<String>> {
        let rows = self.get_allowance_rows(year)?;
        MonthlyLookup::from_allowances(&rows)
    }

    fn upsert_expense_category(&mut self, category: &ExpenseCategory) -> Result<()>;

    fn upsert_expense(&mut self, record: &MonthlyExpense) -> Result<()>;

    fn get_expense_rows(&self, year: i32) -> Result<Vec<MonthlyExpense>>;

    /// Expenses of `year` per (power, month), summed over categories.
    fn get_expenses(&self, year: i32) -> Result<MonthlyLookup<String>> {
        let rows = self.get_expense_rows(year)?;
        MonthlyLookup::from_expenses(&rows)
    }

    /// Replaces the schedule of `year`, or the whole schedule when `year` is `None`.
    fn replace_all_schedule(&mut self, year: Option<i32>, entries: &[ScheduleEntry]) -> Result<()>;

    fn get_schedule(&self, year: i32) -> Result<Vec<ScheduleEntry>>;

    fn list_distinct_years(&self) -> Result<Vec<i32>>;

    /// Runs `f` as a single unit: if it fails, none of its writes remain visible.
    fn atomically<T, F>(&mut self, f: F) -> Result<T>
    where
        Self: Sized,
        F: FnOnce(&mut Self) -> Result<T>;
}

/// Reference [`Store`] backed by ordered maps. Atomic units are implemented
/// by snapshot and restore.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    revenue_sources: BTreeMap<String, RevenueSource>,
    revenue: BTreeMap<(String, i32, u32), Decimal>,
    powers: Vec<PowerEntity>,
    allowances: BTreeMap<(String, i32, u32), MonthlyAllowance>,
    expense_categories: BTreeMap<String, ExpenseCategory>,
    expenses: BTreeMap<(String, String, i32, u32), MonthlyExpense>,
    schedule: Vec<ScheduleEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_powers(powers: Vec<PowerEntity>) -> Result<Self> {
        let mut store = Self::new();
        for power in powers {
            store.add_power(power)?;
        }
        Ok(store)
    }

    /// Registers a power at the end of the listing order.
    pub fn add_power(&mut self, power: PowerEntity) -> Result<()> {
        power.validate()?;
        if self.powers.iter().any(|p| p.name == power.name) {
            return Err(DuodecimoError::Storage(format!(
                "power '{}' already exists",
                power.name
            )));
        }
        self.powers.push(power);
        Ok(())
    }

    pub fn revenue_sources(&self) -> impl Iterator<Item = &RevenueSource> {
        self.revenue_sources.values()
    }

    pub fn expense_categories(&self) -> impl Iterator<Item = &ExpenseCategory> {
        self.expense_categories.values()
    }

    pub fn revenue_records(&self) -> Vec<MonthlyRevenueRecord> {
        self.revenue
            .iter()
            .map(|((code, year, month), value)| MonthlyRevenueRecord {
                source_code: code.clone(),
                year: *year,
                month: *month,
                value: *value,
            })
            .collect()
    }
}

impl Store for MemoryStore {
    fn get_revenue(&self, year: i32, month: u32, source_codes: &[String]) -> Result<Decimal> {
        validate_month(month)?;
        Ok(source_codes
            .iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter_map(|code| self.revenue.get(&(code.clone(), year, month)))
            .try_fold(Decimal::ZERO, |acc, value| acc.checked_add(*value))
            .ok_or_else(|| {
                DuodecimoError::Storage(format!(
                    "revenue total for {}/{} overflows",
                    month, year
                ))
            })?)
    }

    fn upsert_revenue_source(&mut self, source: &RevenueSource) -> Result<()> {
        self.revenue_sources
            .entry(source.code.clone())
            .or_insert_with(|| source.clone());
        Ok(())
    }

    fn upsert_revenue(&mut self, record: &MonthlyRevenueRecord) -> Result<()> {
        validate_month(record.month)?;
        if !self.revenue_sources.contains_key(&record.source_code) {
            return Err(DuodecimoError::EntityNotFound {
                kind: "Revenue source",
                name: record.source_code.clone(),
            });
        }
        self.revenue.insert(
            (record.source_code.clone(), record.year, record.month),
            record.value,
        );
        Ok(())
    }

    fn get_powers(&self) -> Result<Vec<PowerEntity>> {
        Ok(self.powers.clone())
    }

    fn upsert_allowance(&mut self, allowance: &MonthlyAllowance) -> Result<()> {
        validate_month(allowance.month)?;
        self.allowances.insert(
            (allowance.power.clone(), allowance.year, allowance.month),
            allowance.clone(),
        );
        Ok(())
    }

    fn replace_allowances(&mut self, year: i32, allowances: &[MonthlyAllowance]) -> Result<()> {
        if let Some(stray) = allowances.iter().find(|a| a.year != year) {
            return Err(DuodecimoError::Storage(format!(
                "allowance for {} belongs to year {}, not {}",
                stray.power, stray.year, year
            )));
        }

        self.atomically(|store| {
            store.allowances.retain(|(_, y, _), _| *y != year);
            for allowance in allowances {
                store.upsert_allowance(allowance)?;
            }
            Ok(())
        })
    }

    fn get_allowance_rows(&self, year: i32) -> Result<Vec<MonthlyAllowance>> {
        Ok(self
            .allowances
            .values()
            .filter(|a| a.year == year)
            .cloned()
            .collect())
    }

    fn upsert_expense_category(&mut self, category: &ExpenseCategory) -> Result<()> {
        self.expense_categories
            .entry(category.code.clone())
            .or_insert_with(|| category.clone());
        Ok(())
    }

    fn upsert_expense(&mut self, record: &MonthlyExpense) -> Result<()> {
        validate_month(record.month)?;
        if !self.expense_categories.contains_key(&record.category_code) {
            return Err(DuodecimoError::EntityNotFound {
                kind: "Expense category",
                name: record.category_code.clone(),
            });
        }
        if !self.powers.iter().any(|p| p.name == record.power) {
            return Err(DuodecimoError::EntityNotFound {
                kind: "Power",
                name: record.power.clone(),
            });
        }
        self.expenses.insert(
            (
                record.category_code.clone(),
                record.power.clone(),
                record.year,
                record.month,
            ),
            record.clone(),
        );
        Ok(())
    }

    fn get_expense_rows(&self, year: i32) -> Result<Vec<MonthlyExpense>> {
        Ok(self
            .expenses
            .values()
            .filter(|e| e.year == year)
            .cloned()
            .collect())
    }

    fn replace_all_schedule(&mut self, year: Option<i32>, entries: &[ScheduleEntry]) -> Result<()> {
        let mut seen = HashSet::new();
        for entry in entries {
            if let Some(year) = year {
                if entry.year != year {
                    return Err(DuodecimoError::Storage(format!(
                        "schedule entry for unit {} belongs to year {}, not {}",
                        entry.unit_id, entry.year, year
                    )));
                }
            }
            if !seen.insert(entry.key()) {
                return Err(DuodecimoError::Storage(format!(
                    "duplicate schedule entry for unit {} / {} / {}",
                    entry.unit_id, entry.year, entry.resource_source_name
                )));
            }
        }

        match year {
            Some(year) => self.schedule.retain(|e| e.year != year),
            None => self.schedule.clear(),
        }
        self.schedule.extend_from_slice(entries);
        Ok(())
    }

    fn get_schedule(&self, year: i32) -> Result<Vec<ScheduleEntry>> {
        Ok(self
            .schedule
            .iter()
            .filter(|e| e.year == year)
            .cloned()
            .collect())
    }

    fn list_distinct_years(&self) -> Result<Vec<i32>> {
        let years: BTreeSet<i32> = self
            .revenue
            .keys()
            .map(|(_, y, _)| *y)
            .chain(self.allowances.keys().map(|(_, y, _)| *y))
            .chain(self.expenses.keys().map(|(_, _, y, _)| *y))
            .chain(self.schedule.iter().map(|e| e.year))
            .collect();
        Ok(years.into_iter().collect())
    }

    fn atomically<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let snapshot = self.clone();
        match f(self) {
            Ok(value) => Ok(value),
            Err(e) => {
                debug!("Rolling back in-memory store after failed unit: {}", e);
                *self = snapshot;
                Err(e)
            }
        }
    }
}
