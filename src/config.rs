use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::codes::CodeTable;
use crate::error::ProcessingError;

/// Largest scale a `Decimal` can carry.
pub const MAX_CURRENCY_PRECISION: u32 = 28;

// Engine configuration options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Largest itemized-vs-derived tax difference accepted without a warning.
    pub reconciliation_tolerance: Decimal,
    pub journey_key_delimiter: String,
    /// Decimal places used when an amount has to be split across passengers.
    pub currency_precision: u32,
    pub code_table: CodeTable,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reconciliation_tolerance: Decimal::new(1, 2),
            journey_key_delimiter: "|".to_string(),
            currency_precision: 2,
            code_table: CodeTable::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ProcessingError> {
        let config: EngineConfig =
            serde_json::from_str(json).map_err(|e| ProcessingError::JsonParseError(e.to_string()))?;

        if config.journey_key_delimiter.is_empty() {
            return Err(ProcessingError::InvalidFormat(
                "journey_key_delimiter must not be empty".to_string(),
            ));
        }
        if config.currency_precision > MAX_CURRENCY_PRECISION {
            return Err(ProcessingError::InvalidFormat(format!(
                "currency_precision must be at most {}",
                MAX_CURRENCY_PRECISION
            )));
        }
        if config.reconciliation_tolerance.is_sign_negative() {
            return Err(ProcessingError::InvalidFormat(
                "reconciliation_tolerance must not be negative".to_string(),
            ));
        }
        Ok(config)
    }
}
