use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DuodecimoError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("{kind} not found: '{name}'")]
    EntityNotFound { kind: &'static str, name: String },

    #[error("Invalid month {0}: must be between 1 and 12")]
    InvalidMonth(u32),

    #[error("Unknown granularity '{0}': expected monthly, bimonthly, quarterly, semiannual or annual")]
    UnknownGranularity(String),

    #[error("Invalid percentage {percentage} for power '{power}': must be between 0 and 100")]
    InvalidPercentage { power: String, percentage: Decimal },

    #[error("Power percentages sum to {total}%, which exceeds 100%")]
    PercentageOverflow { total: Decimal },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DuodecimoError>;
