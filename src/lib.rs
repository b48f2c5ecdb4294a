// Fare reconciliation for airline distribution (NDC) responses.

// Response reading
pub mod document;
pub mod extract;
pub mod offer_parser;

// Pricing model and engine stages
pub mod classifier;
pub mod codes;
pub mod config;
pub mod error;
pub mod journey;
pub mod model;
pub mod passenger;
pub mod processor;
pub mod reconcile;
pub mod shopping;

// Re-export key types for convenience
pub use codes::CodeTable;
pub use config::EngineConfig;
pub use error::ProcessingError;
pub use model::{
    ChargeKind, FlightBreakdown, GroupingMethod, Money, Offer, OfferItem, ParseResult,
    PassengerBreakdownRow, PricingConfidence, ProviderError, ReconciliationWarning, Segment,
    TaxFeeItem,
};
pub use processor::FarePriceProcessor;
pub use shopping::{BundleOption, ShoppingOption, ShoppingResult};
