// Entry point: raw response text in, normalized breakdown out.

use tracing::{debug, info, warn};

use crate::classifier::partition;
use crate::config::EngineConfig;
use crate::document::XmlNode;
use crate::error::ProcessingError;
use crate::journey::{group_journeys, Journey};
use crate::model::{FlightBreakdown, GroupingMethod, Offer, ParseResult, ProviderError, Segment};
use crate::offer_parser::ResponseDocument;
use crate::passenger::{aggregate, charge_multipliers, PassengerTypes};
use crate::reconcile::{aggregate_charges, reconcile};
use crate::shopping::{aggregate_related_offers, ShoppingResult};

pub const SAMPLE_OFFER_PRICE_PATH: &str = "samples/offer_price_response.xml";
pub const SAMPLE_AIR_SHOPPING_PATH: &str = "samples/air_shopping_response.xml";

pub const NO_OFFERS_CODE: &str = "NO_OFFERS";

#[derive(Debug, Clone, Default)]
pub struct FarePriceProcessor {
    config: EngineConfig,
}

impl FarePriceProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Parse an offer-price response. Only malformed documents are errors;
    /// provider-reported failures come back inside the result.
    pub fn process(&self, xml: &str) -> Result<ParseResult, ProcessingError> {
        let root = XmlNode::parse(xml)?;
        Ok(self.process_document(&root))
    }

    pub fn process_document(&self, root: &XmlNode) -> ParseResult {
        let doc = ResponseDocument::from_root(root, &self.config);
        let mut warnings = doc.warnings.clone();

        let flights: Vec<FlightBreakdown> = doc
            .offers
            .iter()
            .flat_map(|offer| self.flight_breakdowns(offer, &doc.segments, &doc.passenger_types))
            .collect();
        warnings.extend(flight_notes(&flights));

        let (success, errors) = outcome(doc.has_priced_data(), doc.errors, &mut warnings);
        info!(
            success,
            offers = doc.offers.len(),
            flights = flights.len(),
            warnings = warnings.len(),
            "Processed offer-price response"
        );

        ParseResult {
            success,
            offers: doc.offers,
            errors,
            warnings,
            flights,
        }
    }

    /// Per-journey breakdown of one offer's fare items.
    pub fn flight_breakdowns(
        &self,
        offer: &Offer,
        segments: &[Segment],
        types: &PassengerTypes,
    ) -> Vec<FlightBreakdown> {
        let (fares, bundles) = partition(&offer.items);
        debug!(
            offer = %offer.id,
            fares = fares.len(),
            bundles = bundles.len(),
            "Classified offer items"
        );

        group_journeys(&fares, segments, types, &self.config.journey_key_delimiter)
            .into_iter()
            .map(|journey| self.flight_breakdown(journey, offer, types))
            .collect()
    }

    fn flight_breakdown(
        &self,
        journey: Journey<'_>,
        offer: &Offer,
        types: &PassengerTypes,
    ) -> FlightBreakdown {
        let passengers = aggregate(&journey.items, types, self.config.currency_precision);
        let multipliers = charge_multipliers(&journey.items, types);
        let itemized_fees = aggregate_charges(&journey.items, &multipliers);
        let fee_total = passengers.taxes_fees();
        let reconciliation = reconcile(
            &journey.key,
            &itemized_fees,
            fee_total,
            self.config.reconciliation_tolerance,
        );

        let currency = journey
            .items
            .iter()
            .map(|item| item.currency.as_str())
            .find(|c| !c.is_empty())
            .unwrap_or(offer.total_price.currency.as_str())
            .to_string();

        FlightBreakdown {
            journey_key: journey.key,
            route: journey.route,
            segment_ids: journey.segment_ids,
            published_fare: passengers.base_fare(),
            itemized_fees,
            fee_total,
            flight_total: passengers.total(),
            currency,
            grouping: journey.grouping,
            confidence: passengers.confidence,
            passengers: passengers.rows,
            reconciliation,
            notes: passengers.notes,
        }
    }

    /// Parse a shopping response into one option per journey, with bundles
    /// offered separately.
    pub fn process_shopping(&self, xml: &str) -> Result<ShoppingResult, ProcessingError> {
        let root = XmlNode::parse(xml)?;
        Ok(self.process_shopping_document(&root))
    }

    pub fn process_shopping_document(&self, root: &XmlNode) -> ShoppingResult {
        let doc = ResponseDocument::from_root(root, &self.config);
        let mut warnings = doc.warnings.clone();

        let (options, bundle_warnings) = aggregate_related_offers(
            &doc.offers,
            &doc.segments,
            &doc.passenger_types,
            &self.config,
        );
        warnings.extend(bundle_warnings);
        warnings.extend(options.iter().flat_map(|o| o.notes.iter().cloned()));

        let (success, errors) = outcome(doc.has_priced_data(), doc.errors, &mut warnings);
        info!(
            success,
            offers = doc.offers.len(),
            options = options.len(),
            "Processed shopping response"
        );

        ShoppingResult {
            success,
            offers: doc.offers,
            options,
            errors,
            warnings,
        }
    }

    pub fn load_sample_offer_price(&self) -> Result<String, ProcessingError> {
        Ok(std::fs::read_to_string(SAMPLE_OFFER_PRICE_PATH)?)
    }

    pub fn load_sample_air_shopping(&self) -> Result<String, ProcessingError> {
        Ok(std::fs::read_to_string(SAMPLE_AIR_SHOPPING_PATH)?)
    }
}

/// Decide success. Provider errors next to usable data become warnings;
/// without data they are the result, or `NO_OFFERS` if the provider sent none.
fn outcome(
    has_data: bool,
    provider_errors: Vec<ProviderError>,
    warnings: &mut Vec<String>,
) -> (bool, Vec<ProviderError>) {
    if has_data {
        for error in provider_errors {
            warn!(
                code = %error.code,
                message = %error.message,
                "Provider error alongside priced data"
            );
            warnings.push(format!("Provider error {}: {}", error.code, error.message));
        }
        return (true, Vec::new());
    }

    if provider_errors.is_empty() {
        warn!("Response carries no priced offers");
        return (
            false,
            vec![ProviderError {
                code: NO_OFFERS_CODE.to_string(),
                message: "Response contains no priced offers".to_string(),
            }],
        );
    }
    (false, provider_errors)
}

fn flight_notes(flights: &[FlightBreakdown]) -> Vec<String> {
    let mut notes = Vec::new();
    if flights.iter().any(|f| f.grouping == GroupingMethod::Positional) {
        notes.push(
            "Fare items carry no segment references; flights were grouped by position"
                .to_string(),
        );
    }
    for flight in flights {
        notes.extend(flight.notes.iter().cloned());
        if let Some(reconciliation) = &flight.reconciliation {
            notes.push(reconciliation.to_string());
        }
    }
    notes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::CodeTable;
    use crate::model::{ChargeKind, PricingConfidence};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn item(
        id: &str,
        pax: &str,
        segment: Option<&str>,
        base: &str,
        tax_lines: &str,
        total: &str,
    ) -> String {
        let segment = segment
            .map(|s| format!("<PaxSegmentRefID>{}</PaxSegmentRefID>", s))
            .unwrap_or_default();
        format!(
            r#"<OfferItem>
                 <OfferItemID>{id}</OfferItemID>
                 <FareDetail>
                   <PaxRefID>{pax}</PaxRefID>
                   <FareComponent><FareBasisCode><Code>YOW</Code></FareBasisCode>{segment}</FareComponent>
                 </FareDetail>
                 <Price>
                   <TotalAmount CurCode="AUD">{total}</TotalAmount>
                   <BaseAmount CurCode="AUD">{base}</BaseAmount>
                   <TaxSummary>{tax_lines}</TaxSummary>
                 </Price>
               </OfferItem>"#
        )
    }

    fn response(segments: &str, items: &[String], extra: &str) -> String {
        format!(
            r#"<IATA_OfferPriceRS><Response>
                 <DataLists><PaxSegmentList>{segments}</PaxSegmentList></DataLists>
                 <PricedOffer><OfferID>OF1</OfferID><OwnerCode>VA</OwnerCode>{items}</PricedOffer>
               </Response>{extra}</IATA_OfferPriceRS>"#,
            items = items.concat()
        )
    }

    fn segment(id: &str, origin: &str, destination: &str) -> String {
        format!(
            "<PaxSegment><PaxSegmentID>{id}</PaxSegmentID><Dep><IATA_LocationCode>{origin}</IATA_LocationCode></Dep><Arrival><IATA_LocationCode>{destination}</IATA_LocationCode></Arrival></PaxSegment>"
        )
    }

    const UO_30: &str = r#"<Tax><TaxCode>UO</TaxCode><Amount CurCode="AUD">30.00</Amount></Tax>"#;

    #[test]
    fn test_single_adult_single_segment() {
        let xml = response(
            &segment("seg1", "SYD", "MEL"),
            &[item("OI1", "ADT0", Some("seg1"), "100.00", UO_30, "130.00")],
            "",
        );
        let result = FarePriceProcessor::new().process(&xml).unwrap();

        assert!(result.success);
        assert_eq!(result.flights.len(), 1);
        let flight = &result.flights[0];
        assert_eq!(flight.route, "SYD → MEL");
        assert_eq!(flight.published_fare, dec!(100.00));
        assert_eq!(flight.fee_total, dec!(30.00));
        assert_eq!(flight.flight_total, dec!(130.00));
        assert_eq!(flight.passengers.len(), 1);
        assert_eq!(flight.passengers[0].ptc, "ADT");
        assert_eq!(flight.passengers[0].pax_count, 1);
        assert_eq!(flight.itemized_fees.len(), 1);
        assert_eq!(flight.itemized_fees[0].kind, ChargeKind::Tax);
        assert!(flight.reconciliation.is_none());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_two_adults_on_one_item() {
        let mut fare = item("OI1", "ADT0", Some("seg1"), "100.00", "", "150.00");
        fare = fare.replace(
            "<PaxRefID>ADT0</PaxRefID>",
            "<PaxRefID>ADT0</PaxRefID><PaxRefID>ADT1</PaxRefID>",
        );
        let xml = response(&segment("seg1", "SYD", "MEL"), &[fare], "");
        let result = FarePriceProcessor::new().process(&xml).unwrap();

        let flight = &result.flights[0];
        assert_eq!(flight.passengers[0].pax_count, 2);
        assert_eq!(flight.flight_total, dec!(300.00));
        assert_eq!(flight.published_fare, dec!(200.00));
    }

    #[test]
    fn test_positional_grouping_without_segment_refs() {
        let xml = response(
            &[segment("s1", "SYD", "MEL"), segment("s2", "MEL", "SYD")].concat(),
            &[
                item("I1", "ADT0", None, "100", "", "130"),
                item("I2", "CHD0", None, "80", "", "100"),
                item("I3", "ADT0", None, "110", "", "140"),
                item("I4", "CHD0", None, "90", "", "110"),
            ],
            "",
        );
        let result = FarePriceProcessor::new().process(&xml).unwrap();

        assert_eq!(result.flights.len(), 2);
        assert_eq!(result.flights[0].route, "SYD → MEL");
        assert_eq!(result.flights[1].route, "MEL → SYD");
        assert_eq!(result.flights[0].flight_total, dec!(230));
        assert_eq!(result.flights[1].flight_total, dec!(250));
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("grouped by position")));
    }

    #[test]
    fn test_reconciliation_mismatch_is_flagged() {
        let taxes = r#"<Tax><TaxCode>UO</TaxCode><Amount CurCode="AUD">10.00</Amount></Tax>"#;
        let xml = response(
            &segment("seg1", "SYD", "MEL"),
            &[item("OI1", "ADT0", Some("seg1"), "100.00", taxes, "110.02")],
            "",
        );
        let result = FarePriceProcessor::new().process(&xml).unwrap();

        let warning = result.flights[0].reconciliation.as_ref().unwrap();
        assert_eq!(warning.difference, dec!(0.02));
        assert!(result.success);
        assert!(result.warnings.iter().any(|w| w.contains("seg1")));
    }

    #[test]
    fn test_passenger_counts_match_distinct_ids() {
        let xml = response(
            &segment("seg1", "SYD", "MEL"),
            &[
                item("I1", "ADT0 ADT1", Some("seg1"), "100", "", "130"),
                item("I2", "CHD0", Some("seg1"), "70", "", "90"),
                item("I3", "ADT1", Some("seg1"), "100", "", "130"),
            ],
            "",
        );
        let result = FarePriceProcessor::new().process(&xml).unwrap();

        let flight = &result.flights[0];
        let counted: usize = flight.passengers.iter().map(|p| p.pax_count).sum();
        assert_eq!(counted, 3);
        assert_eq!(flight.flight_total, dec!(350));
        let rows_total: Decimal = flight.passengers.iter().map(|p| p.total).sum();
        assert_eq!(rows_total, flight.flight_total);
    }

    #[test]
    fn test_processing_is_idempotent() {
        let xml = response(
            &segment("seg1", "SYD", "MEL"),
            &[item("OI1", "ADT0", Some("seg1"), "100.00", UO_30, "130.00")],
            "",
        );
        let processor = FarePriceProcessor::new();
        assert_eq!(processor.process(&xml).unwrap(), processor.process(&xml).unwrap());
    }

    #[test]
    fn test_provider_errors_with_data_become_warnings() {
        let xml = response(
            &segment("seg1", "SYD", "MEL"),
            &[item("OI1", "ADT0", Some("seg1"), "100.00", UO_30, "130.00")],
            r#"<Errors><Error Code="911">Partial availability</Error></Errors>"#,
        );
        let result = FarePriceProcessor::new().process(&xml).unwrap();

        assert!(result.success);
        assert!(result.errors.is_empty());
        assert_eq!(result.warnings, vec!["Provider error 911: Partial availability"]);
    }

    #[test]
    fn test_provider_errors_without_data() {
        let xml = r#"<IATA_OfferPriceRS><Errors><Error Code="911" ShortText="Offer expired"/></Errors></IATA_OfferPriceRS>"#;
        let result = FarePriceProcessor::new().process(xml).unwrap();

        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].message, "Offer expired");
        assert!(result.flights.is_empty());
    }

    #[test]
    fn test_empty_response_reports_no_offers() {
        let result = FarePriceProcessor::new()
            .process("<IATA_OfferPriceRS/>")
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.errors[0].code, NO_OFFERS_CODE);
    }

    #[test]
    fn test_different_per_person_amounts_are_all_priced() {
        let xml = response(
            &segment("seg1", "SYD", "MEL"),
            &[
                item("I1", "ADT0", Some("seg1"), "120.00", "", "150.00"),
                item("I2", "ADT1", Some("seg1"), "130.00", "", "170.00"),
            ],
            "",
        );
        let result = FarePriceProcessor::new().process(&xml).unwrap();

        let flight = &result.flights[0];
        assert_eq!(flight.flight_total, dec!(320.00));
        assert_eq!(flight.flight_total, result.offers[0].total_price.amount);
        assert_eq!(flight.confidence, PricingConfidence::Exact);
    }

    #[test]
    fn test_repriced_passenger_is_reported() {
        let xml = response(
            &segment("seg1", "SYD", "MEL"),
            &[
                item("I1", "ADT0", Some("seg1"), "120.00", "", "150.00"),
                item("I2", "ADT0", Some("seg1"), "130.00", "", "170.00"),
            ],
            "",
        );
        let result = FarePriceProcessor::new().process(&xml).unwrap();

        let flight = &result.flights[0];
        assert_eq!(flight.flight_total, dec!(150.00));
        assert_eq!(flight.confidence, PricingConfidence::Approximated);
        assert_eq!(flight.notes.len(), 1);
        assert!(result.warnings.iter().any(|w| w.contains("reprices passenger ADT0")));
    }

    #[test]
    fn test_out_of_range_amount_does_not_panic() {
        let xml = response(
            &segment("seg1", "SYD", "MEL"),
            &[item(
                "OI1",
                "ADT0 ADT1",
                Some("seg1"),
                "100.00",
                "",
                "79228162514264337593543950335",
            )],
            "",
        );
        let result = FarePriceProcessor::new().process(&xml).unwrap();

        assert!(result.success);
        let flight = &result.flights[0];
        assert_eq!(flight.passengers[0].pax_count, 2);
        assert_eq!(flight.flight_total, Decimal::ZERO);
    }

    #[test]
    fn test_malformed_document_is_an_error() {
        let result = FarePriceProcessor::new().process("<IATA_OfferPriceRS><Response>");
        assert!(matches!(result, Err(ProcessingError::XmlParseError(_))));
    }

    #[test]
    fn test_custom_code_table_names_charges() {
        let config = EngineConfig {
            code_table: CodeTable::with_entries([("UO", "GST")]),
            ..EngineConfig::default()
        };
        let xml = response(
            &segment("seg1", "SYD", "MEL"),
            &[item("OI1", "ADT0", Some("seg1"), "100.00", UO_30, "130.00")],
            "",
        );
        let result = FarePriceProcessor::with_config(config).process(&xml).unwrap();
        assert_eq!(result.flights[0].itemized_fees[0].name, "GST");
    }

    #[test]
    fn test_result_serializes_to_json() {
        let xml = response(
            &segment("seg1", "SYD", "MEL"),
            &[item("OI1", "ADT0", Some("seg1"), "100.00", UO_30, "130.00")],
            "",
        );
        let json = FarePriceProcessor::new().process(&xml).unwrap().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["flights"][0]["route"], "SYD → MEL");
    }

    #[test]
    fn test_load_sample_offer_price() {
        let processor = FarePriceProcessor::new();
        let xml = processor.load_sample_offer_price();
        assert!(xml.is_ok(), "Failed to load sample offer price: {:?}", xml.err());

        let result = processor.process(&xml.unwrap()).unwrap();
        assert!(result.success);
        assert_eq!(result.flights.len(), 2);
        assert_eq!(result.flights[0].route, "SYD → MEL");
        assert_eq!(result.flights[0].flight_total, dec!(365.00));
        assert_eq!(result.flights[1].route, "MEL → SYD");
        assert_eq!(result.flights[1].flight_total, dec!(435.00));
        assert!(result.flights.iter().all(|f| f.reconciliation.is_none()));

        let total: Decimal = result.flights.iter().map(|f| f.flight_total).sum();
        assert_eq!(total, result.offers[0].total_price.amount);
    }

    #[test]
    fn test_load_sample_air_shopping() {
        let processor = FarePriceProcessor::new();
        let xml = processor.load_sample_air_shopping();
        assert!(xml.is_ok(), "Failed to load sample shopping: {:?}", xml.err());

        let result = processor.process_shopping(&xml.unwrap()).unwrap();
        assert!(result.success);
        assert_eq!(result.options.len(), 2);

        let outbound = &result.options[0];
        assert_eq!(outbound.route, "SYD → MEL");
        assert_eq!(outbound.fare_total, dec!(260.00));
        assert_eq!(outbound.bundle_total, dec!(25.00));
        assert_eq!(outbound.total_amount, dec!(285.00));

        let inbound = &result.options[1];
        assert_eq!(inbound.fare_total, dec!(310.00));
        assert_eq!(inbound.bundle_total, dec!(40.00));
        assert_eq!(inbound.total_amount, dec!(350.00));
        assert!(result.warnings.is_empty());
    }
}
