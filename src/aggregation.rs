use crate::error::{DuodecimoError, Result};
use crate::periods::Bucket;
use crate::schema::{MonthlyLookup, ScheduleEntry};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

/// Bucket × entity matrix with its row, column and grand totals.
///
/// Buckets stay in chronological order and entities in the order the caller
/// supplied; neither is ever re-sorted by value.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AggregateTable<K: Ord> {
    pub buckets: Vec<Bucket>,
    pub entities: Vec<K>,
    /// `cells[bucket][entity]`
    pub cells: Vec<Vec<Decimal>>,
    pub row_totals: Vec<Decimal>,
    pub column_totals: Vec<Decimal>,
    pub grand_total: Decimal,
    #[serde(skip)]
    index: BTreeMap<K, usize>,
}

impl<K: Ord + Clone> AggregateTable<K> {
    pub fn entity_position(&self, entity: &K) -> Option<usize> {
        self.index.get(entity).copied()
    }

    pub fn value(&self, bucket: usize, entity: &K) -> Option<Decimal> {
        let column = self.entity_position(entity)?;
        self.cells.get(bucket).map(|row| row[column])
    }

    /// Values of one entity across all buckets.
    pub fn series(&self, entity: &K) -> Option<Vec<Decimal>> {
        let column = self.entity_position(entity)?;
        Some(self.cells.iter().map(|row| row[column]).collect())
    }

    pub fn column_total(&self, entity: &K) -> Option<Decimal> {
        let column = self.entity_position(entity)?;
        Some(self.column_totals[column])
    }

    /// Checks that row totals, column totals and the grand total agree.
    pub fn verify_totals(&self) -> Result<()> {
        let rows_sum: Decimal = self.row_totals.iter().copied().sum();
        let columns_sum: Decimal = self.column_totals.iter().copied().sum();

        if rows_sum != self.grand_total || columns_sum != self.grand_total {
            return Err(DuodecimoError::ValidationError(format!(
                "inconsistent totals: rows {} / columns {} / grand {}",
                rows_sum, columns_sum, self.grand_total
            )));
        }

        for (idx, row) in self.cells.iter().enumerate() {
            let sum: Decimal = row.iter().copied().sum();
            if sum != self.row_totals[idx] {
                return Err(DuodecimoError::ValidationError(format!(
                    "row total of '{}' is {} but its cells sum to {}",
                    self.buckets[idx].label, self.row_totals[idx], sum
                )));
            }
        }

        Ok(())
    }
}

/// Rolls per-(entity, month) records up into `buckets`.
///
/// Missing records count as zero, so this never fails.
pub fn aggregate<K: Ord + Clone>(
    records: &MonthlyLookup<K>,
    entities: &[K],
    buckets: &[Bucket],
) -> AggregateTable<K> {
    let mut index = BTreeMap::new();
    for (position, entity) in entities.iter().enumerate() {
        index.entry(entity.clone()).or_insert(position);
    }

    let mut cells = Vec::with_capacity(buckets.len());
    let mut row_totals = Vec::with_capacity(buckets.len());
    let mut column_totals = vec![Decimal::ZERO; entities.len()];

    for bucket in buckets {
        let row: Vec<Decimal> = entities
            .iter()
            .map(|entity| {
                bucket
                    .months
                    .iter()
                    .map(|&m| records.get(entity, m))
                    .sum::<Decimal>()
            })
            .collect();

        for (column, value) in row.iter().enumerate() {
            column_totals[column] += *value;
        }
        row_totals.push(row.iter().copied().sum());
        cells.push(row);
    }

    let grand_total = column_totals.iter().copied().sum();

    AggregateTable {
        buckets: buckets.to_vec(),
        entities: entities.to_vec(),
        cells,
        row_totals,
        column_totals,
        grand_total,
        index,
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScheduleRow {
    pub unit_id: i64,
    pub unit_name: String,
    /// One value per bucket, summed over the unit's resource sources.
    pub values: Vec<Decimal>,
    /// Always rebuilt from the month values, never read from the sheet.
    pub total: Decimal,
    /// Sum of the uploaded `total` column, kept so mismatches stay visible.
    pub declared_total: Decimal,
    pub expense_value: Decimal,
}

impl ScheduleRow {
    pub fn total_mismatch(&self) -> Option<Decimal> {
        let difference = self.declared_total - self.total;
        (!difference.is_zero()).then_some(difference)
    }
}

/// Disbursement schedule bucketed per budgetary unit.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScheduleTable {
    pub buckets: Vec<Bucket>,
    pub rows: Vec<ScheduleRow>,
    pub bucket_totals: Vec<Decimal>,
    pub grand_total: Decimal,
}

/// Aggregates schedule entries per unit, units ordered by their code.
pub fn aggregate_schedule(entries: &[ScheduleEntry], buckets: &[Bucket]) -> Result<ScheduleTable> {
    let mut lookup = MonthlyLookup::new();
    let mut names: BTreeMap<i64, String> = BTreeMap::new();
    let mut expense_values: BTreeMap<i64, Decimal> = BTreeMap::new();
    let mut declared_totals: BTreeMap<i64, Decimal> = BTreeMap::new();

    for entry in entries {
        names
            .entry(entry.unit_id)
            .or_insert_with(|| entry.unit_name.clone());
        *expense_values.entry(entry.unit_id).or_insert(Decimal::ZERO) += entry.expense_value;
        *declared_totals.entry(entry.unit_id).or_insert(Decimal::ZERO) += entry.total;
        for (idx, value) in entry.months.iter().enumerate() {
            lookup.add(entry.unit_id, idx as u32 + 1, *value)?;
        }
    }

    let units: Vec<i64> = names.keys().copied().collect();
    let table = aggregate(&lookup, &units, buckets);

    let rows = units
        .iter()
        .enumerate()
        .map(|(column, unit_id)| ScheduleRow {
            unit_id: *unit_id,
            unit_name: names[unit_id].clone(),
            values: table.cells.iter().map(|row| row[column]).collect(),
            total: table.column_totals[column],
            declared_total: declared_totals[unit_id],
            expense_value: expense_values[unit_id],
        })
        .collect();

    Ok(ScheduleTable {
        buckets: table.buckets,
        rows,
        bucket_totals: table.row_totals,
        grand_total: table.grand_total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::periods::{buckets_for, Granularity};
    use rust_decimal_macros::dec;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn sample_lookup() -> MonthlyLookup<String> {
        let mut lookup = MonthlyLookup::new();
        for month in 1..=12u32 {
            lookup
                .add("Legislativo".to_string(), month, Decimal::from(month * 100))
                .unwrap();
            lookup
                .add("Judiciário".to_string(), month, dec!(33.33))
                .unwrap();
        }
        lookup
    }

    #[test]
    fn test_quarterly_bucket_sums() {
        let mut lookup = MonthlyLookup::new();
        lookup.add("A".to_string(), 1, dec!(100)).unwrap();
        lookup.add("A".to_string(), 2, dec!(200)).unwrap();
        lookup.add("A".to_string(), 3, dec!(300)).unwrap();

        let table = aggregate(
            &lookup,
            &names(&["A"]),
            &buckets_for(Granularity::Quarterly, 2024),
        );

        assert_eq!(table.buckets[0].label, "Janeiro-Março");
        assert_eq!(table.value(0, &"A".to_string()), Some(dec!(600)));
        assert_eq!(table.value(1, &"A".to_string()), Some(Decimal::ZERO));
        assert_eq!(table.grand_total, dec!(600));
    }

    #[test]
    fn test_totals_agree_for_every_granularity() {
        let lookup = sample_lookup();
        let entities = names(&["Legislativo", "Judiciário", "Sem Dados"]);

        for granularity in Granularity::ALL {
            let table = aggregate(&lookup, &entities, &buckets_for(granularity, 2024));
            table.verify_totals().unwrap();

            let rows: Decimal = table.row_totals.iter().copied().sum();
            let columns: Decimal = table.column_totals.iter().copied().sum();
            assert_eq!(rows, table.grand_total, "{}", granularity);
            assert_eq!(columns, table.grand_total, "{}", granularity);
        }
    }

    #[test]
    fn test_annual_equals_sum_of_monthly() {
        let lookup = sample_lookup();
        let entities = names(&["Legislativo", "Judiciário"]);

        let monthly = aggregate(&lookup, &entities, &buckets_for(Granularity::Monthly, 2024));
        let annual = aggregate(&lookup, &entities, &buckets_for(Granularity::Annual, 2024));

        for entity in &entities {
            let monthly_sum: Decimal = monthly.series(entity).unwrap().into_iter().sum();
            assert_eq!(annual.value(0, entity), Some(monthly_sum));
        }
        assert_eq!(annual.column_total(&"Legislativo".to_string()), Some(dec!(7800)));
        assert_eq!(annual.grand_total, monthly.grand_total);
    }

    #[test]
    fn test_entity_order_follows_caller() {
        let lookup = sample_lookup();
        let entities = names(&["Judiciário", "Legislativo"]);
        let table = aggregate(&lookup, &entities, &buckets_for(Granularity::Semiannual, 2024));

        assert_eq!(table.entities, entities);
        assert_eq!(table.entity_position(&"Judiciário".to_string()), Some(0));
        assert_eq!(table.cells[0][0], dec!(199.98));
        assert_eq!(table.cells[0][1], dec!(2100));
        assert_eq!(table.row_totals[0], dec!(2299.98));
    }

    #[test]
    fn test_unknown_entity_and_empty_inputs() {
        let lookup: MonthlyLookup<String> = MonthlyLookup::new();
        let table = aggregate(&lookup, &[], &buckets_for(Granularity::Monthly, 2024));

        assert_eq!(table.cells.len(), 12);
        assert!(table.row_totals.iter().all(|t| t.is_zero()));
        assert_eq!(table.grand_total, Decimal::ZERO);
        assert_eq!(table.series(&"Nobody".to_string()), None);
        table.verify_totals().unwrap();
    }

    #[test]
    fn test_verify_totals_detects_tampering() {
        let lookup = sample_lookup();
        let mut table = aggregate(
            &lookup,
            &names(&["Legislativo"]),
            &buckets_for(Granularity::Quarterly, 2024),
        );
        table.row_totals[0] += dec!(1);
        assert!(table.verify_totals().is_err());
    }

    fn entry(unit_id: i64, source: &str, monthly: Decimal) -> ScheduleEntry {
        ScheduleEntry {
            unit_id,
            unit_name: format!("Unidade {}", unit_id),
            year: 2024,
            resource_source_name: source.to_string(),
            expense_value: monthly * dec!(12),
            months: [monthly; 12],
            total: monthly * dec!(12),
        }
    }

    #[test]
    fn test_schedule_rows_per_unit() {
        let entries = vec![
            entry(20, "Tesouro", dec!(10)),
            entry(10, "Tesouro", dec!(5)),
            entry(10, "Convênios", dec!(1)),
        ];

        let table =
            aggregate_schedule(&entries, &buckets_for(Granularity::Quarterly, 2024)).unwrap();

        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].unit_id, 10);
        assert_eq!(table.rows[0].values, vec![dec!(18); 4]);
        assert_eq!(table.rows[0].total, dec!(72));
        assert_eq!(table.rows[0].expense_value, dec!(72));
        assert_eq!(table.rows[1].unit_name, "Unidade 20");
        assert_eq!(table.bucket_totals, vec![dec!(48); 4]);
        assert_eq!(table.grand_total, dec!(192));
        assert_eq!(table.rows[0].declared_total, dec!(72));
        assert_eq!(table.rows[0].total_mismatch(), None);
    }

    #[test]
    fn test_schedule_total_is_rebuilt_from_months() {
        let mut stale = entry(30, "Tesouro", dec!(10));
        stale.total = dec!(100);

        let table = aggregate_schedule(&[stale], &buckets_for(Granularity::Annual, 2024)).unwrap();

        assert_eq!(table.rows[0].total, dec!(120));
        assert_eq!(table.rows[0].declared_total, dec!(100));
        assert_eq!(table.rows[0].total_mismatch(), Some(dec!(-20)));
        assert_eq!(table.grand_total, dec!(120));
    }
}
