use crate::config::DuodecimoConfig;
use crate::error::{DuodecimoError, Result};
use crate::schema::{MonthlyAllowance, PowerEntity};
use crate::store::Store;
use crate::utils::round_currency;
use log::{debug, info, warn};
use rust_decimal::Decimal;

/// Turns eligible monthly revenue into each power's monthly allowance.
pub struct AllocationCalculator {
    eligible_source_codes: Vec<String>,
    enforce_percentage_cap: bool,
}

impl AllocationCalculator {
    pub fn new(eligible_source_codes: Vec<String>) -> Self {
        Self {
            eligible_source_codes,
            enforce_percentage_cap: false,
        }
    }

    pub fn from_config(config: &DuodecimoConfig) -> Self {
        Self {
            eligible_source_codes: config.eligible_source_codes.clone(),
            enforce_percentage_cap: config.enforce_percentage_cap,
        }
    }

    pub fn eligible_source_codes(&self) -> &[String] {
        &self.eligible_source_codes
    }

    /// `base × percentage / 100`, rounded half-even to cents.
    pub fn allowance_for(base_value: Decimal, power: &PowerEntity) -> Result<Decimal> {
        base_value
            .checked_mul(power.percentage)
            .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
            .map(round_currency)
            .ok_or_else(|| {
                DuodecimoError::ValidationError(format!(
                    "allowance of '{}' overflows for base value {}",
                    power.name, base_value
                ))
            })
    }

    pub fn check_percentages(&self, powers: &[PowerEntity]) -> Result<()> {
        for power in powers {
            power.validate()?;
        }

        let total: Decimal = powers.iter().map(|p| p.percentage).sum();
        if total > Decimal::ONE_HUNDRED {
            if self.enforce_percentage_cap {
                return Err(DuodecimoError::PercentageOverflow { total });
            }
            warn!(
                "Power percentages sum to {}%; allowances will exceed eligible revenue",
                total
            );
        }
        Ok(())
    }

    /// Computes the twelve months of allowances for `year` without writing them.
    pub fn compute_allowances<S: Store>(
        &self,
        store: &S,
        year: i32,
        powers: &[PowerEntity],
    ) -> Result<Vec<MonthlyAllowance>> {
        self.check_percentages(powers)?;

        let mut rows = Vec::with_capacity(12 * powers.len());
        for month in 1..=12 {
            let base_value = round_currency(store.get_revenue(
                year,
                month,
                &self.eligible_source_codes,
            )?);

            for power in powers {
                rows.push(MonthlyAllowance {
                    power: power.name.clone(),
                    year,
                    month,
                    base_value,
                    calculated_value: Self::allowance_for(base_value, power)?,
                });
            }
        }

        Ok(rows)
    }

    /// Replaces every allowance of `year` with freshly computed rows.
    ///
    /// The replacement is one atomic unit and re-running it with unchanged
    /// inputs yields identical rows.
    pub fn recompute_allowances<S: Store>(
        &self,
        store: &mut S,
        year: i32,
        powers: &[PowerEntity],
    ) -> Result<Vec<MonthlyAllowance>> {
        let rows = self.compute_allowances(store, year, powers)?;
        debug!(
            "Computed {} allowance rows for {} power(s) in {}",
            rows.len(),
            powers.len(),
            year
        );

        store.atomically(|s| s.replace_allowances(year, &rows))?;

        info!("Replaced allowances for {}", year);
        Ok(rows)
    }

    /// Same as [`recompute_allowances`](Self::recompute_allowances) using the store's powers.
    pub fn recompute_for_year<S: Store>(
        &self,
        store: &mut S,
        year: i32,
    ) -> Result<Vec<MonthlyAllowance>> {
        let powers = store.get_powers()?;
        self.recompute_allowances(store, year, &powers)
    }
}

pub fn recompute_allowances<S: Store>(
    store: &mut S,
    year: i32,
    eligible_source_codes: &[String],
    powers: &[PowerEntity],
) -> Result<Vec<MonthlyAllowance>> {
    AllocationCalculator::new(eligible_source_codes.to_vec()).recompute_allowances(
        store,
        year,
        powers,
    )
}
