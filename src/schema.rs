use crate::error::{DuodecimoError, Result};
use crate::utils::validate_month;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
pub struct RevenueSource {
    #[schemars(description = "Unique short identifier of the revenue source (e.g. '15000')")]
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct MonthlyRevenueRecord {
    pub source_code: String,
    pub year: i32,
    #[schemars(description = "Calendar month, 1 = January")]
    pub month: u32,
    pub value: Decimal,
}

/// A constitutional power receiving a fixed share of eligible revenue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct PowerEntity {
    pub name: String,
    #[schemars(description = "Share of eligible revenue, between 0 and 100, two decimal places")]
    pub percentage: Decimal,
}

impl PowerEntity {
    pub fn new(name: impl Into<String>, percentage: Decimal) -> Result<Self> {
        let power = Self {
            name: name.into(),
            percentage,
        };
        power.validate()?;
        Ok(power)
    }

    pub fn validate(&self) -> Result<()> {
        if self.percentage < Decimal::ZERO || self.percentage > Decimal::ONE_HUNDRED {
            return Err(DuodecimoError::InvalidPercentage {
                power: self.name.clone(),
                percentage: self.percentage,
            });
        }
        Ok(())
    }
}

/// Derived row: always produced by the allocation calculator, never edited.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct MonthlyAllowance {
    pub power: String,
    pub year: i32,
    pub month: u32,
    #[schemars(description = "Sum of eligible revenue for the month")]
    pub base_value: Decimal,
    #[schemars(description = "base_value x percentage / 100, rounded half-even to cents")]
    pub calculated_value: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
pub struct ExpenseCategory {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct MonthlyExpense {
    pub category_code: String,
    pub power: String,
    pub year: i32,
    pub month: u32,
    pub value: Decimal,
}

/// One line of the disbursement schedule (cronograma) of a budgetary unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ScheduleEntry {
    #[schemars(description = "Budgetary unit code (UG)")]
    pub unit_id: i64,
    pub unit_name: String,
    pub year: i32,
    pub resource_source_name: String,
    pub expense_value: Decimal,
    #[schemars(description = "Planned values for January through December")]
    pub months: [Decimal; 12],
    pub total: Decimal,
}

impl ScheduleEntry {
    pub fn key(&self) -> (i64, i32, &str) {
        (self.unit_id, self.year, self.resource_source_name.as_str())
    }

    pub fn month_value(&self, month: u32) -> Result<Decimal> {
        validate_month(month)?;
        Ok(self.months[month as usize - 1])
    }

    pub fn months_sum(&self) -> Decimal {
        self.months.iter().copied().sum()
    }
}

/// Per-(entity, month) values of one dataset for one year.
///
/// Repeated `add` calls for the same key accumulate, so several expense
/// categories of a power collapse into a single monthly figure.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyLookup<K: Ord> {
    values: BTreeMap<(K, u32), Decimal>,
}

impl<K: Ord> Default for MonthlyLookup<K> {
    fn default() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone> MonthlyLookup<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: K, month: u32, value: Decimal) -> Result<()> {
        validate_month(month)?;
        let slot = self.values.entry((key, month)).or_insert(Decimal::ZERO);
        *slot = slot.checked_add(value).ok_or_else(|| {
            DuodecimoError::ValidationError(format!("monthly total overflows in month {}", month))
        })?;
        Ok(())
    }

    /// Value for the key and month, zero when absent.
    pub fn get(&self, key: &K, month: u32) -> Decimal {
        self.values
            .get(&(key.clone(), month))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, u32, Decimal)> {
        self.values.iter().map(|((k, m), v)| (k, *m, *v))
    }
}

impl MonthlyLookup<String> {
    pub fn from_allowances<'a>(rows: impl IntoIterator<Item = &'a MonthlyAllowance>) -> Result<Self> {
        let mut lookup = Self::new();
        for row in rows {
            lookup.add(row.power.clone(), row.month, row.calculated_value)?;
        }
        Ok(lookup)
    }

    pub fn from_expenses<'a>(rows: impl IntoIterator<Item = &'a MonthlyExpense>) -> Result<Self> {
        let mut lookup = Self::new();
        for row in rows {
            lookup.add(row.power.clone(), row.month, row.value)?;
        }
        Ok(lookup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_power_percentage_bounds() {
        assert!(PowerEntity::new("Executivo", dec!(70.00)).is_ok());
        assert!(PowerEntity::new("Nenhum", dec!(0)).is_ok());
        assert!(PowerEntity::new("Tudo", dec!(100)).is_ok());
        assert!(matches!(
            PowerEntity::new("Excesso", dec!(100.01)),
            Err(DuodecimoError::InvalidPercentage { .. })
        ));
        assert!(PowerEntity::new("Negativo", dec!(-1)).is_err());
    }

    #[test]
    fn test_lookup_accumulates_and_defaults_to_zero() {
        let mut lookup = MonthlyLookup::new();
        lookup.add("Judiciário".to_string(), 2, dec!(10.50)).unwrap();
        lookup.add("Judiciário".to_string(), 2, dec!(4.50)).unwrap();

        assert_eq!(lookup.get(&"Judiciário".to_string(), 2), dec!(15.00));
        assert_eq!(lookup.get(&"Judiciário".to_string(), 3), Decimal::ZERO);
        assert_eq!(lookup.get(&"Legislativo".to_string(), 2), Decimal::ZERO);
        assert_eq!(lookup.len(), 1);
        assert!(lookup.add("Judiciário".to_string(), 13, dec!(1)).is_err());
    }

    #[test]
    fn test_lookup_overflow_is_an_error() {
        let mut lookup = MonthlyLookup::new();
        lookup.add(1i64, 1, Decimal::MAX).unwrap();
        assert!(lookup.add(1i64, 1, Decimal::MAX).is_err());
        assert_eq!(lookup.get(&1, 1), Decimal::MAX);
    }

    #[test]
    fn test_schedule_entry_month_access() {
        let mut months = [Decimal::ZERO; 12];
        months[0] = dec!(100);
        months[11] = dec!(50);
        let entry = ScheduleEntry {
            unit_id: 10101,
            unit_name: "Tribunal".to_string(),
            year: 2024,
            resource_source_name: "Tesouro".to_string(),
            expense_value: dec!(150),
            months,
            total: dec!(150),
        };

        assert_eq!(entry.month_value(1).unwrap(), dec!(100));
        assert_eq!(entry.month_value(12).unwrap(), dec!(50));
        assert!(entry.month_value(0).is_err());
        assert_eq!(entry.months_sum(), dec!(150));
        assert_eq!(entry.key(), (10101, 2024, "Tesouro"));
    }

    #[test]
    fn test_serialization() {
        let allowance = MonthlyAllowance {
            power: "Legislativo".to_string(),
            year: 2024,
            month: 3,
            base_value: dec!(1000.00),
            calculated_value: dec!(300.00),
        };

        let json = serde_json::to_string(&allowance).unwrap();
        assert!(json.contains("Legislativo"));

        let back: MonthlyAllowance = serde_json::from_str(&json).unwrap();
        assert_eq!(back, allowance);
    }
}
