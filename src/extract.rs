//! Field extraction strategies.
//!
//! Provider responses populate the same logical field in different places
//! depending on schema version and call type. Each logical field gets an
//! ordered list of named strategies; the first one that yields a value wins.

use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::document::XmlNode;

/// One way of reading a logical field from a node.
pub struct Strategy<T> {
    pub name: &'static str,
    pub extract: fn(&XmlNode) -> Option<T>,
}

/// Value of the first strategy that produces one.
pub fn first_match<T>(strategies: &[Strategy<T>], node: &XmlNode) -> Option<T> {
    first_match_named(strategies, node).map(|(_, value)| value)
}

/// Like `first_match`, also reporting which strategy produced the value.
pub fn first_match_named<T>(
    strategies: &[Strategy<T>],
    node: &XmlNode,
) -> Option<(&'static str, T)> {
    strategies
        .iter()
        .find_map(|s| (s.extract)(node).map(|value| (s.name, value)))
}

#[derive(Debug, Clone, PartialEq)]
pub struct AmountField {
    pub value: Decimal,
    pub currency: Option<String>,
}

/// Numeric text to a decimal. Malformed text counts as zero.
/// Amounts beyond this many whole units are treated as malformed, which keeps
/// per-passenger multiplication and journey sums inside `Decimal` range.
pub const MAX_AMOUNT_UNITS: i64 = 1_000_000_000_000_000;

pub fn parse_amount(text: &str) -> Decimal {
    let cleaned = text.trim().replace(',', "");
    let Ok(value) = Decimal::from_str(&cleaned).or_else(|_| Decimal::from_scientific(&cleaned))
    else {
        debug!(text, "Non-numeric amount treated as zero");
        return Decimal::ZERO;
    };
    if value.abs() > Decimal::from(MAX_AMOUNT_UNITS) {
        warn!(text, "Out-of-range amount treated as zero");
        return Decimal::ZERO;
    }
    value
}

fn currency_of(node: &XmlNode) -> Option<String> {
    ["CurCode", "Code", "Currency", "currency", "CurrencyCode"]
        .iter()
        .find_map(|name| node.value(name))
        .filter(|code| code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()))
        .map(str::to_string)
}

/// Read an amount element. Handles `<X CurCode="AUD">1.00</X>` as well as
/// wrappers such as `<X><SimpleCurrencyPrice Code="AUD">1.00</...></X>`.
pub fn read_amount(node: &XmlNode) -> Option<AmountField> {
    if !node.text().is_empty() {
        return Some(AmountField {
            value: parse_amount(node.text()),
            currency: currency_of(node),
        });
    }

    ["SimpleCurrencyPrice", "Amount", "Total", "DetailCurrencyPrice"]
        .iter()
        .filter_map(|name| node.child(name))
        .find_map(read_amount)
        .map(|mut amount| {
            if amount.currency.is_none() {
                amount.currency = currency_of(node);
            }
            amount
        })
}

/// Whitespace-separated reference lists from every descendant with the given
/// name, de-duplicated in first-seen order.
pub fn collect_refs(node: &XmlNode, name: &str) -> Option<Vec<String>> {
    let mut refs: Vec<String> = Vec::new();
    for found in node.descendants(name) {
        for id in found.text().split_whitespace() {
            if !refs.iter().any(|r| r == id) {
                refs.push(id.to_string());
            }
        }
    }
    (!refs.is_empty()).then_some(refs)
}

pub fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| parse_local_datetime(text).map(|dt| dt.and_utc()))
}

pub fn parse_local_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
}

fn owned(value: Option<&str>) -> Option<String> {
    value.map(str::to_string)
}

pub static OFFER_ID: &[Strategy<String>] = &[
    Strategy {
        name: "OfferID",
        extract: |n| owned(n.value("OfferID")),
    },
    Strategy {
        name: "id attribute",
        extract: |n| owned(n.attribute("id")),
    },
];

pub static OWNER: &[Strategy<String>] = &[
    Strategy {
        name: "OwnerCode",
        extract: |n| owned(n.value("OwnerCode")),
    },
    Strategy {
        name: "Owner",
        extract: |n| owned(n.value("Owner")),
    },
];

pub static OFFER_ITEM_ID: &[Strategy<String>] = &[
    Strategy {
        name: "OfferItemID",
        extract: |n| owned(n.value("OfferItemID")),
    },
    Strategy {
        name: "ID",
        extract: |n| owned(n.value("ID")),
    },
];

pub static PASSENGER_REFS: &[Strategy<Vec<String>>] = &[
    Strategy {
        name: "PaxRefID elements",
        extract: |n| collect_refs(n, "PaxRefID"),
    },
    Strategy {
        name: "PassengerRefs list",
        extract: |n| collect_refs(n, "PassengerRefs"),
    },
    Strategy {
        name: "PaxRefs list",
        extract: |n| collect_refs(n, "PaxRefs"),
    },
];

pub static SEGMENT_REFS: &[Strategy<Vec<String>>] = &[
    Strategy {
        name: "PaxSegmentRefID elements",
        extract: |n| collect_refs(n, "PaxSegmentRefID"),
    },
    Strategy {
        name: "SegmentRefs list",
        extract: |n| collect_refs(n, "SegmentRefs"),
    },
    Strategy {
        name: "FlightSegmentReference ref",
        extract: |n| {
            let mut refs: Vec<String> = Vec::new();
            for reference in n.descendants("FlightSegmentReference") {
                if let Some(id) = reference.attribute("ref").map(str::trim) {
                    if !id.is_empty() && !refs.iter().any(|r| r == id) {
                        refs.push(id.to_string());
                    }
                }
            }
            (!refs.is_empty()).then_some(refs)
        },
    },
];

pub static FARE_BASIS: &[Strategy<String>] = &[
    Strategy {
        name: "FareBasisCode/Code",
        extract: |n| owned(n.descendant("FareBasisCode").and_then(|f| f.value("Code"))),
    },
    Strategy {
        name: "FareBasisCode text",
        extract: |n| {
            n.descendant("FareBasisCode")
                .map(XmlNode::text)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
        },
    },
    Strategy {
        name: "FareBasis",
        extract: |n| {
            n.descendant("FareBasis")
                .and_then(|f| f.value("Code").or(Some(f.text())))
                .filter(|t| !t.is_empty())
                .map(str::to_string)
        },
    },
];

pub static BASE_AMOUNT: &[Strategy<AmountField>] = &[
    Strategy {
        name: "Price/BaseAmount",
        extract: |n| n.path(&["Price", "BaseAmount"]).and_then(read_amount),
    },
    Strategy {
        name: "FareDetail BaseAmount",
        extract: |n| {
            n.child("FareDetail")
                .and_then(|f| f.descendant("BaseAmount"))
                .and_then(read_amount)
        },
    },
    Strategy {
        name: "BaseAmount anywhere",
        extract: |n| n.descendant("BaseAmount").and_then(read_amount),
    },
];

pub static TOTAL_AMOUNT: &[Strategy<AmountField>] = &[
    Strategy {
        name: "Price/TotalAmount",
        extract: |n| n.path(&["Price", "TotalAmount"]).and_then(read_amount),
    },
    Strategy {
        name: "TotalPriceDetail/TotalAmount",
        extract: |n| n.path(&["TotalPriceDetail", "TotalAmount"]).and_then(read_amount),
    },
    Strategy {
        name: "UnitPriceDetail/TotalAmount",
        extract: |n| n.path(&["UnitPriceDetail", "TotalAmount"]).and_then(read_amount),
    },
    Strategy {
        name: "TotalAmount anywhere",
        extract: |n| n.descendant("TotalAmount").and_then(read_amount),
    },
];

pub static TAX_AMOUNT: &[Strategy<AmountField>] = &[
    Strategy {
        name: "Price/TaxSummary/TotalTaxAmount",
        extract: |n| {
            n.path(&["Price", "TaxSummary", "TotalTaxAmount"])
                .and_then(read_amount)
        },
    },
    Strategy {
        name: "TotalTaxAmount anywhere",
        extract: |n| n.descendant("TotalTaxAmount").and_then(read_amount),
    },
    Strategy {
        name: "Taxes/Total",
        extract: |n| {
            n.descendant("Taxes")
                .and_then(|t| t.child("Total"))
                .and_then(read_amount)
        },
    },
];

pub static OFFER_TOTAL: &[Strategy<AmountField>] = &[
    Strategy {
        name: "TotalPrice/TotalAmount",
        extract: |n| n.path(&["TotalPrice", "TotalAmount"]).and_then(read_amount),
    },
    Strategy {
        name: "TotalPrice/DetailCurrencyPrice/Total",
        extract: |n| {
            n.path(&["TotalPrice", "DetailCurrencyPrice", "Total"])
                .and_then(read_amount)
        },
    },
    Strategy {
        name: "TotalPrice",
        extract: |n| n.child("TotalPrice").and_then(read_amount),
    },
];

pub static OFFER_EXPIRY: &[Strategy<DateTime<Utc>>] = &[
    Strategy {
        name: "OfferExpirationDateTime",
        extract: |n| n.value("OfferExpirationDateTime").and_then(parse_datetime),
    },
    Strategy {
        name: "OfferExpirationTimeLimitDateTime",
        extract: |n| {
            n.value("OfferExpirationTimeLimitDateTime")
                .and_then(parse_datetime)
        },
    },
    Strategy {
        name: "TimeLimits/OfferExpiration",
        extract: |n| {
            n.path(&["TimeLimits", "OfferExpiration"])
                .and_then(|e| e.attribute("DateTime").or(Some(e.text())))
                .and_then(parse_datetime)
        },
    },
];

pub static SERVICE_NAME: &[Strategy<String>] = &[
    Strategy {
        name: "ServiceName",
        extract: |n| {
            owned(
                n.descendant("ServiceName")
                    .map(XmlNode::text)
                    .filter(|t| !t.is_empty()),
            )
        },
    },
    Strategy {
        name: "Service/Name",
        extract: |n| owned(n.descendant("Service").and_then(|s| s.value("Name"))),
    },
    Strategy {
        name: "ServiceBundle/Name",
        extract: |n| owned(n.descendant("ServiceBundle").and_then(|s| s.value("Name"))),
    },
];
