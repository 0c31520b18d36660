use crate::error::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_eligible_source_codes() -> Vec<String> {
    vec!["15000".to_string(), "15010".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct DuodecimoConfig {
    #[serde(default = "default_eligible_source_codes")]
    #[schemars(
        description = "Revenue source codes whose monthly values form the base of every power's allowance"
    )]
    pub eligible_source_codes: Vec<String>,

    #[serde(default)]
    #[schemars(
        description = "If true, recomputing allowances fails when the configured power percentages sum to more than 100%. If false, the excess is only logged."
    )]
    pub enforce_percentage_cap: bool,
}

impl Default for DuodecimoConfig {
    fn default() -> Self {
        Self {
            eligible_source_codes: default_eligible_source_codes(),
            enforce_percentage_cap: false,
        }
    }
}

impl DuodecimoConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(DuodecimoConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DuodecimoError;

    #[test]
    fn test_defaults_apply_to_missing_fields() {
        let config = DuodecimoConfig::from_json_str("{}").unwrap();
        assert_eq!(config, DuodecimoConfig::default());
        assert_eq!(config.eligible_source_codes, vec!["15000", "15010"]);
        assert!(!config.enforce_percentage_cap);
    }

    #[test]
    fn test_overrides() {
        let config = DuodecimoConfig::from_json_str(
            r#"{"eligible_source_codes": ["500"], "enforce_percentage_cap": true}"#,
        )
        .unwrap();
        assert_eq!(config.eligible_source_codes, vec!["500"]);
        assert!(config.enforce_percentage_cap);
    }

    #[test]
    fn test_malformed_json_is_a_serialization_error() {
        let result = DuodecimoConfig::from_json_str("{not json");
        assert!(matches!(result, Err(DuodecimoError::SerializationError(_))));
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let result = DuodecimoConfig::from_path("/definitely/not/here/duodecimo.json");
        assert!(matches!(result, Err(DuodecimoError::IoError(_))));
    }

    #[test]
    fn test_schema_generation() {
        let schema_json = DuodecimoConfig::schema_as_json().unwrap();
        assert!(schema_json.contains("eligible_source_codes"));
        assert!(schema_json.contains("enforce_percentage_cap"));
    }
}
