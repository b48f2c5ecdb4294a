use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ChargeKind {
    Tax,
    Fee,
}

impl fmt::Display for ChargeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChargeKind::Tax => write!(f, "Tax"),
            ChargeKind::Fee => write!(f, "Fee"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Money {
    pub amount: Decimal,
    pub currency: String,
}

impl Money {
    pub fn new(amount: Decimal, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
        }
    }
}

/// A named tax or fee line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaxFeeItem {
    pub kind: ChargeKind,
    pub code: String,
    pub name: String,
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Offer {
    pub id: String,
    pub owner: String,
    pub total_price: Money,
    pub items: Vec<OfferItem>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// One priced line of an offer. Amounts follow the provider convention of
/// being per passenger of the referenced type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfferItem {
    pub id: String,
    pub passenger_refs: Vec<String>,
    pub base_amount: Option<Decimal>,
    pub tax_amount: Option<Decimal>,
    pub total_amount: Decimal,
    pub currency: String,
    pub fare_basis: Option<String>,
    pub segment_refs: Vec<String>,
    pub charges: Vec<TaxFeeItem>,
    pub service_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub id: String,
    pub origin: String,
    pub destination: String,
    pub carrier: Option<String>,
    pub flight_number: Option<String>,
    pub departure: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderError {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PricingConfidence {
    /// Per-person amounts multiplied by distinct passenger counts.
    Exact,
    /// Amounts were split across passengers because the input carried no
    /// per-type price (mixed-type items, items without passenger references).
    Approximated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GroupingMethod {
    SegmentReferences,
    Positional,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassengerBreakdownRow {
    pub ptc: String,
    pub pax_count: usize,
    pub base_fare: Decimal,
    pub taxes_fees: Decimal,
    pub total: Decimal,
    pub confidence: PricingConfidence,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationWarning {
    pub journey_key: String,
    pub itemized_total: Decimal,
    pub derived_total: Decimal,
    pub difference: Decimal,
    pub breakdown: Vec<TaxFeeItem>,
}

impl fmt::Display for ReconciliationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Itemized taxes/fees {} do not match derived total {} for journey {} (difference {})",
            self.itemized_total, self.derived_total, self.journey_key, self.difference
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlightBreakdown {
    pub journey_key: String,
    pub route: String,
    pub segment_ids: Vec<String>,
    pub published_fare: Decimal,
    pub itemized_fees: Vec<TaxFeeItem>,
    pub fee_total: Decimal,
    pub flight_total: Decimal,
    pub currency: String,
    pub passengers: Vec<PassengerBreakdownRow>,
    pub grouping: GroupingMethod,
    pub confidence: PricingConfidence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconciliation: Option<ReconciliationWarning>,
    /// Why the passenger rows are approximated, if they are.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

/// Outcome of one offer-price parse. `success` means usable priced data was
/// found, not that the provider reported no errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseResult {
    pub success: bool,
    pub offers: Vec<Offer>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ProviderError>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub flights: Vec<FlightBreakdown>,
}

impl ParseResult {
    pub fn to_json(&self) -> Result<String, crate::error::ProcessingError> {
        serde_json::to_string(self)
            .map_err(|e| crate::error::ProcessingError::JsonParseError(e.to_string()))
    }
}
