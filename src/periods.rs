use crate::error::{DuodecimoError, Result};
use crate::utils::MONTH_NAMES;
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reporting granularity used to group the twelve months of a year.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Monthly,
    Bimonthly,
    Quarterly,
    Semiannual,
    Annual,
}

impl Granularity {
    pub const ALL: [Granularity; 5] = [
        Granularity::Monthly,
        Granularity::Bimonthly,
        Granularity::Quarterly,
        Granularity::Semiannual,
        Granularity::Annual,
    ];

    /// Number of consecutive months in each bucket.
    pub fn span(self) -> u32 {
        match self {
            Granularity::Monthly => 1,
            Granularity::Bimonthly => 2,
            Granularity::Quarterly => 3,
            Granularity::Semiannual => 6,
            Granularity::Annual => 12,
        }
    }

    pub fn as_tag(self) -> &'static str {
        match self {
            Granularity::Monthly => "monthly",
            Granularity::Bimonthly => "bimonthly",
            Granularity::Quarterly => "quarterly",
            Granularity::Semiannual => "semiannual",
            Granularity::Annual => "annual",
        }
    }

    /// Parses a request tag, falling back to `Monthly` for anything unknown.
    pub fn from_tag_lenient(tag: &str) -> Self {
        tag.parse().unwrap_or_else(|_| {
            debug!("Unknown granularity '{}', falling back to monthly", tag);
            Granularity::Monthly
        })
    }
}

impl FromStr for Granularity {
    type Err = DuodecimoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "monthly" => Ok(Granularity::Monthly),
            "bimonthly" => Ok(Granularity::Bimonthly),
            "quarterly" => Ok(Granularity::Quarterly),
            "semiannual" => Ok(Granularity::Semiannual),
            "annual" => Ok(Granularity::Annual),
            _ => Err(DuodecimoError::UnknownGranularity(s.to_string())),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// A contiguous run of months reported as one unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct Bucket {
    pub label: String,
    pub months: Vec<u32>,
}

impl Bucket {
    pub fn contains(&self, month: u32) -> bool {
        self.months.contains(&month)
    }
}

/// Splits the year into chronologically ordered buckets for `granularity`.
///
/// Every month 1..=12 lands in exactly one bucket. `year` only feeds the
/// label of the annual bucket.
pub fn buckets_for(granularity: Granularity, year: i32) -> Vec<Bucket> {
    let span = granularity.span();

    (0..12 / span)
        .map(|idx| {
            let first = idx * span + 1;
            let months: Vec<u32> = (first..first + span).collect();
            let label = match granularity {
                Granularity::Annual => year.to_string(),
                Granularity::Monthly => MONTH_NAMES[first as usize - 1].to_string(),
                _ => format!(
                    "{}-{}",
                    MONTH_NAMES[first as usize - 1],
                    MONTH_NAMES[(first + span - 2) as usize]
                ),
            };
            Bucket { label, months }
        })
        .collect()
}

/// Index of the bucket holding `month`, if the month is valid.
pub fn bucket_index(granularity: Granularity, month: u32) -> Option<usize> {
    if !(1..=12).contains(&month) {
        return None;
    }
    Some(((month - 1) / granularity.span()) as usize)
}
