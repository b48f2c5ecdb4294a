// Builds the offer model, segment table, passenger table and provider
// messages from a parsed response document. Works for both offer-price and
// shopping responses; missing pieces come back empty rather than as errors.

use rust_decimal::Decimal;
use tracing::debug;

use crate::config::EngineConfig;
use crate::document::XmlNode;
use crate::extract::{
    first_match, first_match_named, parse_local_datetime, Strategy, BASE_AMOUNT, FARE_BASIS,
    OFFER_EXPIRY, OFFER_ID, OFFER_ITEM_ID, OFFER_TOTAL, OWNER, PASSENGER_REFS, SEGMENT_REFS,
    SERVICE_NAME, TAX_AMOUNT, TOTAL_AMOUNT,
};
use crate::model::{Money, Offer, OfferItem, ProviderError, Segment};
use crate::passenger::PassengerTypes;
use crate::reconcile::collect_item_charges;

const OFFER_ELEMENTS: &[&str] = &["Offer", "PricedOffer", "ALaCarteOffer"];
const ITEM_ELEMENTS: &[&str] = &["OfferItem", "ALaCarteOfferItem"];
const SEGMENT_ELEMENTS: &[&str] = &["PaxSegment", "FlightSegment"];

/// Everything the engine reads from one response.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseDocument {
    pub offers: Vec<Offer>,
    pub segments: Vec<Segment>,
    pub passenger_types: PassengerTypes,
    pub errors: Vec<ProviderError>,
    pub warnings: Vec<String>,
}

impl ResponseDocument {
    pub fn from_root(root: &XmlNode, config: &EngineConfig) -> Self {
        Self {
            offers: parse_offers(root, config),
            segments: parse_segments(root),
            passenger_types: parse_passenger_types(root),
            errors: parse_provider_errors(root),
            warnings: parse_provider_warnings(root),
        }
    }

    /// Usable priced data exists somewhere in the response.
    pub fn has_priced_data(&self) -> bool {
        self.offers
            .iter()
            .any(|o| !o.items.is_empty() || o.total_price.amount > Decimal::ZERO)
    }
}

static SEGMENT_ID: &[Strategy<String>] = &[
    Strategy {
        name: "PaxSegmentID",
        extract: |n| n.value("PaxSegmentID").map(str::to_string),
    },
    Strategy {
        name: "SegmentKey",
        extract: |n| n.value("SegmentKey").map(str::to_string),
    },
    Strategy {
        name: "SegmentID",
        extract: |n| n.value("SegmentID").map(str::to_string),
    },
];

static ORIGIN: &[Strategy<String>] = &[
    Strategy {
        name: "Dep/IATA_LocationCode",
        extract: |n| n.child("Dep").and_then(|d| d.value("IATA_LocationCode")).map(str::to_string),
    },
    Strategy {
        name: "Departure/AirportCode",
        extract: |n| n.child("Departure").and_then(|d| d.value("AirportCode")).map(str::to_string),
    },
    Strategy {
        name: "Departure/IATA_LocationCode",
        extract: |n| {
            n.child("Departure")
                .and_then(|d| d.value("IATA_LocationCode"))
                .map(str::to_string)
        },
    },
];

static DESTINATION: &[Strategy<String>] = &[
    Strategy {
        name: "Arrival/IATA_LocationCode",
        extract: |n| {
            n.child("Arrival")
                .and_then(|a| a.value("IATA_LocationCode"))
                .map(str::to_string)
        },
    },
    Strategy {
        name: "Arrival/AirportCode",
        extract: |n| n.child("Arrival").and_then(|a| a.value("AirportCode")).map(str::to_string),
    },
];

static CARRIER: &[Strategy<String>] = &[
    Strategy {
        name: "MarketingCarrierInfo/CarrierDesigCode",
        extract: |n| {
            n.child("MarketingCarrierInfo")
                .and_then(|c| c.value("CarrierDesigCode"))
                .map(str::to_string)
        },
    },
    Strategy {
        name: "MarketingCarrier/AirlineID",
        extract: |n| {
            n.child("MarketingCarrier")
                .and_then(|c| c.value("AirlineID"))
                .map(str::to_string)
        },
    },
];

static FLIGHT_NUMBER: &[Strategy<String>] = &[
    Strategy {
        name: "MarketingCarrierInfo/MarketingCarrierFlightNumberText",
        extract: |n| {
            n.child("MarketingCarrierInfo")
                .and_then(|c| c.value("MarketingCarrierFlightNumberText"))
                .map(str::to_string)
        },
    },
    Strategy {
        name: "MarketingCarrier/FlightNumber",
        extract: |n| {
            n.child("MarketingCarrier")
                .and_then(|c| c.value("FlightNumber"))
                .map(str::to_string)
        },
    },
];

static DEPARTURE_TIME: &[Strategy<String>] = &[
    Strategy {
        name: "Dep/AircraftScheduledDateTime",
        extract: |n| {
            n.child("Dep")
                .and_then(|d| d.value("AircraftScheduledDateTime"))
                .map(str::to_string)
        },
    },
    Strategy {
        name: "Departure/Date+Time",
        extract: |n| {
            let departure = n.child("Departure")?;
            let date = departure.value("Date")?;
            let time = departure.value("Time").unwrap_or("00:00");
            Some(format!("{}T{}", date, time))
        },
    },
];

/// Segment table used for route labels and positional keys. Segments
/// without an id or endpoints are skipped.
pub fn parse_segments(root: &XmlNode) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();
    for node in root.find_all(|n| SEGMENT_ELEMENTS.contains(&n.name())) {
        let (Some(id), Some(origin), Some(destination)) = (
            first_match(SEGMENT_ID, node),
            first_match(ORIGIN, node),
            first_match(DESTINATION, node),
        ) else {
            debug!(element = node.name(), "Skipping incomplete segment");
            continue;
        };
        if segments.iter().any(|s| s.id == id) {
            continue;
        }
        segments.push(Segment {
            id,
            origin,
            destination,
            carrier: first_match(CARRIER, node),
            flight_number: first_match(FLIGHT_NUMBER, node),
            departure: first_match(DEPARTURE_TIME, node).and_then(|t| parse_local_datetime(&t)),
        });
    }
    segments
}

/// Passenger id to type code from the passenger list, when the response
/// carries one.
pub fn parse_passenger_types(root: &XmlNode) -> PassengerTypes {
    root.find_all(|n| n.name() == "Pax" || n.name() == "Passenger")
        .into_iter()
        .filter_map(|pax| {
            let id = pax.value("PaxID").or_else(|| pax.value("PassengerID"))?;
            let ptc = pax.value("PTC")?;
            Some((id, ptc))
        })
        .collect()
}

fn is_offer(node: &XmlNode) -> bool {
    OFFER_ELEMENTS.contains(&node.name())
        && (ITEM_ELEMENTS.iter().any(|item| node.child(item).is_some())
            || node.child("TotalPrice").is_some())
}

pub fn parse_offers(root: &XmlNode, config: &EngineConfig) -> Vec<Offer> {
    std::iter::once(root)
        .filter(|node| is_offer(node))
        .chain(root.find_all(is_offer))
        .map(|node| parse_offer(node, config))
        .collect()
}

fn parse_offer(node: &XmlNode, config: &EngineConfig) -> Offer {
    let total = first_match(OFFER_TOTAL, node);
    let hinted_currency = total
        .as_ref()
        .and_then(|t| t.currency.clone())
        .unwrap_or_default();

    let items: Vec<OfferItem> = node
        .elements()
        .iter()
        .filter(|child| ITEM_ELEMENTS.contains(&child.name()))
        .map(|child| parse_item(child, &hinted_currency, config))
        .collect();

    let currency = if hinted_currency.is_empty() {
        items
            .iter()
            .map(|i| i.currency.clone())
            .find(|c| !c.is_empty())
            .unwrap_or_default()
    } else {
        hinted_currency
    };

    // Without an offer total, rebuild it from per-person item totals.
    let amount = match total {
        Some(total) => total.value,
        None => items
            .iter()
            .map(|i| i.total_amount * Decimal::from(i.passenger_refs.len().max(1)))
            .sum(),
    };

    let offer = Offer {
        id: first_match(OFFER_ID, node).unwrap_or_default(),
        owner: first_match(OWNER, node).unwrap_or_default(),
        total_price: Money::new(amount, currency),
        items,
        expires_at: first_match(OFFER_EXPIRY, node),
    };
    debug!(
        offer = %offer.id,
        owner = %offer.owner,
        items = offer.items.len(),
        total = %offer.total_price.amount,
        "Parsed offer"
    );
    offer
}

fn parse_item(node: &XmlNode, offer_currency: &str, config: &EngineConfig) -> OfferItem {
    let base = first_match(BASE_AMOUNT, node);
    let tax = first_match(TAX_AMOUNT, node);
    let total = first_match_named(TOTAL_AMOUNT, node);

    let total_amount = match &total {
        Some((_, total)) => total.value,
        None => {
            base.as_ref().map_or(Decimal::ZERO, |b| b.value)
                + tax.as_ref().map_or(Decimal::ZERO, |t| t.value)
        }
    };
    let currency = total
        .as_ref()
        .and_then(|(_, t)| t.currency.clone())
        .or_else(|| base.as_ref().and_then(|b| b.currency.clone()))
        .unwrap_or_else(|| offer_currency.to_string());

    let id = first_match(OFFER_ITEM_ID, node).unwrap_or_default();
    debug!(
        item = %id,
        total_source = total.as_ref().map_or("base + tax", |(name, _)| *name),
        "Parsed offer item"
    );

    OfferItem {
        id,
        passenger_refs: first_match(PASSENGER_REFS, node).unwrap_or_default(),
        base_amount: base.map(|b| b.value),
        tax_amount: tax.map(|t| t.value),
        total_amount,
        charges: collect_item_charges(node, &config.code_table, &currency),
        currency,
        fare_basis: first_match(FARE_BASIS, node),
        segment_refs: first_match(SEGMENT_REFS, node).unwrap_or_default(),
        service_name: first_match(SERVICE_NAME, node),
    }
}

fn message_of(node: &XmlNode) -> String {
    ["DescText", "ShortText", "Message", "Description"]
        .iter()
        .find_map(|name| node.value(name))
        .or_else(|| Some(node.text()).filter(|t| !t.is_empty()))
        .unwrap_or_default()
        .to_string()
}

fn code_of(node: &XmlNode) -> Option<String> {
    ["Code", "ErrorCode", "TypeCode", "Type"]
        .iter()
        .find_map(|name| node.value(name))
        .map(str::to_string)
}

pub fn parse_provider_errors(root: &XmlNode) -> Vec<ProviderError> {
    root.descendants("Error")
        .into_iter()
        .map(|error| ProviderError {
            code: code_of(error).unwrap_or_else(|| "UNKNOWN".to_string()),
            message: message_of(error),
        })
        .collect()
}

pub fn parse_provider_warnings(root: &XmlNode) -> Vec<String> {
    root.descendants("Warning")
        .into_iter()
        .map(|warning| match code_of(warning) {
            Some(code) => format!("Provider warning {}: {}", code, message_of(warning)),
            None => format!("Provider warning: {}", message_of(warning)),
        })
        .collect()
}
