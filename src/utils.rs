use crate::error::{DuodecimoError, Result};
use chrono::{Datelike, Local};
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Calendar month names as they appear in uploaded sheets and report labels.
pub const MONTH_NAMES: [&str; 12] = [
    "Janeiro",
    "Fevereiro",
    "Março",
    "Abril",
    "Maio",
    "Junho",
    "Julho",
    "Agosto",
    "Setembro",
    "Outubro",
    "Novembro",
    "Dezembro",
];

pub fn validate_month(month: u32) -> Result<()> {
    if !(1..=12).contains(&month) {
        return Err(DuodecimoError::InvalidMonth(month));
    }
    Ok(())
}

pub fn month_name(month: u32) -> Result<&'static str> {
    validate_month(month)?;
    Ok(MONTH_NAMES[month as usize - 1])
}

/// Resolves a month name to its number, ignoring case and accents
/// ("MARÇO", "marco" and "Março" all map to 3).
pub fn month_from_name(name: &str) -> Option<u32> {
    let folded = fold_label(name);
    MONTH_NAMES
        .iter()
        .position(|m| fold_label(m) == folded)
        .map(|idx| idx as u32 + 1)
}

/// Uppercases, strips Portuguese diacritics and collapses whitespace so that
/// sheet headers can be compared regardless of how they were typed.
pub fn fold_label(label: &str) -> String {
    let upper: String = label
        .to_uppercase()
        .chars()
        .map(|c| match c {
            'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
            'É' | 'È' | 'Ê' | 'Ë' => 'E',
            'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
            'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
            'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
            'Ç' => 'C',
            other => other,
        })
        .collect();

    upper.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Largest magnitude a money column holds: 15 digits, two of them decimals.
pub fn max_amount() -> Decimal {
    Decimal::new(999_999_999_999_999, 2)
}

pub fn within_amount_bounds(value: Decimal) -> bool {
    value.abs() <= max_amount()
}

fn split_sign(text: &str) -> (Option<bool>, &str) {
    if let Some(rest) = text.strip_prefix('-') {
        (Some(true), rest.trim_start())
    } else if let Some(rest) = text.strip_prefix('+') {
        (Some(false), rest.trim_start())
    } else {
        (None, text)
    }
}

/// Parses a currency cell. Accepts plain decimals, scientific notation, an
/// optional sign and `R$` prefix in either order, and both `1,234.56` and
/// `1.234,56` grouping styles. A separator that repeats is a grouping mark.
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    let (outer_sign, rest) = split_sign(text.trim());
    let (inner_sign, rest) = split_sign(rest.trim_start_matches("R$").trim_start());
    let negative = match (outer_sign, inner_sign) {
        (Some(_), Some(_)) => return None,
        (sign, None) | (None, sign) => sign.unwrap_or(false),
    };

    let cleaned: String = rest.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return None;
    }

    let commas = cleaned.matches(',').count();
    let dots = cleaned.matches('.').count();
    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => {
            if commas > 1 {
                return None;
            }
            cleaned.replace('.', "").replace(',', ".")
        }
        (Some(_), Some(_)) => {
            if dots > 1 {
                return None;
            }
            cleaned.replace(',', "")
        }
        (Some(_), None) if commas > 1 => cleaned.replace(',', ""),
        (Some(_), None) => cleaned.replace(',', "."),
        (None, Some(_)) if dots > 1 => cleaned.replace('.', ""),
        _ => cleaned,
    };

    let value = Decimal::from_str(&normalized)
        .or_else(|_| Decimal::from_scientific(&normalized))
        .ok()?;
    Some(if negative { -value } else { value })
}

/// Rounds to cents using round-half-even, the rule applied to every stored amount.
pub fn round_currency(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

/// Formats an amount as Brazilian currency, e.g. `R$ 1.234.567,89`.
pub fn format_brl(value: Decimal) -> String {
    let rounded = round_currency(value);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };

    let plain = format!("{:.2}", rounded.abs());
    let (int_part, frac_part) = plain.split_once('.').unwrap_or((plain.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (idx, digit) in int_part.chars().enumerate() {
        if idx > 0 && (int_part.len() - idx) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }

    format!("{}R$ {},{}", sign, grouped, frac_part)
}

pub fn current_year() -> i32 {
    Local::now().year()
}
