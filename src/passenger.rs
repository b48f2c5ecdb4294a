// Per-passenger aggregation.
//
// Provider convention: amounts on a line item are per passenger of the
// referenced type. Passenger counts come from the set of distinct passenger
// ids seen per type, since the same per-person amount can be repeated on
// several items that reference overlapping passengers.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::{Decimal, RoundingStrategy};
use tracing::warn;

use crate::model::{OfferItem, PassengerBreakdownRow, PricingConfidence};

pub const ADULT: &str = "ADT";

/// Passenger id to passenger type code. Ids missing from the table fall back
/// to the id with trailing digits stripped (`ADT0` -> `ADT`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassengerTypes {
    by_id: BTreeMap<String, String>,
}

impl PassengerTypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, ptc: impl Into<String>) {
        self.by_id.insert(id.into(), ptc.into().to_uppercase());
    }

    pub fn ptc_of(&self, id: &str) -> String {
        self.by_id
            .get(id.trim())
            .cloned()
            .unwrap_or_else(|| strip_trailing_digits(id))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PassengerTypes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut types = PassengerTypes::new();
        for (id, ptc) in iter {
            types.insert(id, ptc);
        }
        types
    }
}

pub fn strip_trailing_digits(id: &str) -> String {
    let id = id.trim();
    let stripped = id.trim_end_matches(|c: char| c.is_ascii_digit());
    if stripped.is_empty() {
        id.to_string()
    } else {
        stripped.to_string()
    }
}

/// Display order: ADT, CHD, INF, then anything else.
pub fn ptc_rank(ptc: &str) -> u8 {
    match ptc {
        "ADT" => 0,
        "CHD" => 1,
        "INF" => 2,
        _ => 3,
    }
}

/// Passengers referenced by one item, each with its resolved type.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemPassengers {
    pub passengers: Vec<(String, String)>,
    /// The item referenced no passengers; one adult was assumed.
    pub assumed: bool,
}

impl ItemPassengers {
    pub fn of(item: &OfferItem, types: &PassengerTypes) -> Self {
        if item.passenger_refs.is_empty() {
            return Self {
                passengers: vec![(format!("{}#pax", item.id), ADULT.to_string())],
                assumed: true,
            };
        }
        Self {
            passengers: item
                .passenger_refs
                .iter()
                .map(|id| (id.clone(), types.ptc_of(id)))
                .collect(),
            assumed: false,
        }
    }

    /// Type of the first referenced passenger.
    pub fn nominal_type(&self) -> &str {
        self.passengers
            .first()
            .map(|(_, ptc)| ptc.as_str())
            .unwrap_or(ADULT)
    }

    pub fn is_mixed(&self) -> bool {
        let nominal = self.nominal_type();
        self.passengers.iter().any(|(_, ptc)| ptc != nominal)
    }
}

/// Number of distinct nominal passenger types across the items.
pub fn distinct_types(items: &[&OfferItem], types: &PassengerTypes) -> usize {
    items
        .iter()
        .map(|item| ItemPassengers::of(item, types).nominal_type().to_string())
        .collect::<BTreeSet<_>>()
        .len()
}

/// Split `amount` into `parts` shares at the given precision. Shares differ
/// by at most one unit and always sum to `amount` exactly.
pub fn split_evenly(amount: Decimal, parts: usize, precision: u32) -> Vec<Decimal> {
    if parts == 0 {
        return Vec::new();
    }
    let count = Decimal::from(parts);
    let unit = Decimal::new(1, precision);
    let share = (amount / count).round_dp_with_strategy(precision, RoundingStrategy::ToZero);

    let mut shares = vec![share; parts];
    let mut remainder = amount - share * count;
    let step = if remainder.is_sign_negative() { -unit } else { unit };
    for s in shares.iter_mut() {
        if remainder.abs() < unit {
            break;
        }
        *s += step;
        remainder -= step;
    }
    shares[0] += remainder;
    shares
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Amounts {
    base: Decimal,
    total: Decimal,
}

impl Amounts {
    fn of(item: &OfferItem) -> Self {
        Self {
            base: item.base_amount.unwrap_or(Decimal::ZERO),
            total: item.total_amount,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct TypeTally {
    /// Each distinct per-person amount with the passengers priced at it.
    priced: Vec<(Amounts, BTreeSet<String>)>,
    allocated: Amounts,
    allocated_ids: BTreeSet<String>,
    approximated: bool,
}

impl TypeTally {
    fn price_of(&self, id: &str) -> Option<Amounts> {
        self.priced
            .iter()
            .find(|(_, ids)| ids.contains(id))
            .map(|(amounts, _)| *amounts)
    }

    fn covers(&self, id: &str) -> bool {
        self.price_of(id).is_some() || self.allocated_ids.contains(id)
    }

    fn price(&mut self, amounts: Amounts, ids: BTreeSet<String>) {
        if ids.is_empty() {
            return;
        }
        match self.priced.iter_mut().find(|(existing, _)| *existing == amounts) {
            Some((_, priced_ids)) => priced_ids.extend(ids),
            None => self.priced.push((amounts, ids)),
        }
    }

    fn into_row(self, ptc: String) -> PassengerBreakdownRow {
        let priced_count: usize = self.priced.iter().map(|(_, ids)| ids.len()).sum();
        let (base_fare, total) = self.priced.iter().fold(
            (self.allocated.base, self.allocated.total),
            |(base, total), (amounts, ids)| {
                let count = Decimal::from(ids.len());
                (base + amounts.base * count, total + amounts.total * count)
            },
        );
        PassengerBreakdownRow {
            ptc,
            pax_count: priced_count + self.allocated_ids.len(),
            base_fare,
            taxes_fees: total - base_fare,
            total,
            confidence: if self.approximated {
                PricingConfidence::Approximated
            } else {
                PricingConfidence::Exact
            },
        }
    }
}

#[derive(Debug, Default)]
struct Tallies {
    by_type: Vec<(String, TypeTally)>,
    notes: Vec<String>,
}

impl Tallies {
    fn tally_for(&mut self, ptc: &str) -> &mut TypeTally {
        let idx = match self.by_type.iter().position(|(code, _)| code == ptc) {
            Some(idx) => idx,
            None => {
                self.by_type.push((ptc.to_string(), TypeTally::default()));
                self.by_type.len() - 1
            }
        };
        &mut self.by_type[idx].1
    }
}

// Passengers new to the type are priced at this item's amount. A passenger
// already priced at a different amount keeps the first one and the row is
// flagged.
fn add_single_type_item(mut tallies: Tallies, item: &OfferItem, pax: &ItemPassengers) -> Tallies {
    let amounts = Amounts::of(item);
    let ptc = pax.nominal_type();
    let tally = tallies.tally_for(ptc);

    let mut fresh = BTreeSet::new();
    let mut repriced: Vec<(&str, Amounts)> = Vec::new();
    for (id, _) in &pax.passengers {
        match tally.price_of(id) {
            None => {
                fresh.insert(id.clone());
            }
            Some(kept) if kept != amounts => repriced.push((id.as_str(), kept)),
            Some(_) => {}
        }
    }
    tally.price(amounts, fresh);
    tally.approximated |= pax.assumed || !repriced.is_empty();

    if pax.assumed {
        tallies.notes.push(format!(
            "Item {} references no passengers and was priced as one adult",
            item.id
        ));
    }
    for (id, kept) in repriced {
        warn!(
            item = %item.id,
            passenger = id,
            ptc,
            kept_total = %kept.total,
            ignored_total = %amounts.total,
            "Passenger priced twice at different per-person amounts"
        );
        tallies.notes.push(format!(
            "Item {} reprices passenger {} at {} (kept {} from an earlier item)",
            item.id, id, amounts.total, kept.total
        ));
    }
    tallies
}

// Mixed-type items carry no per-type price. The item amount is split evenly
// across its passengers and each share is booked to that passenger's type.
fn add_mixed_item(
    mut tallies: Tallies,
    item: &OfferItem,
    pax: &ItemPassengers,
    precision: u32,
) -> Tallies {
    let amounts = Amounts::of(item);
    let parts = pax.passengers.len();
    let base_shares = split_evenly(amounts.base, parts, precision);
    let total_shares = split_evenly(amounts.total, parts, precision);

    warn!(
        item = %item.id,
        passengers = parts,
        "Mixed passenger types on one item, splitting amounts evenly"
    );

    let mut split = false;
    for (idx, (id, ptc)) in pax.passengers.iter().enumerate() {
        let tally = tallies.tally_for(ptc);
        if tally.covers(id) {
            continue;
        }
        tally.allocated.base += base_shares[idx];
        tally.allocated.total += total_shares[idx];
        tally.allocated_ids.insert(id.clone());
        tally.approximated = true;
        split = true;
    }
    if split {
        tallies.notes.push(format!(
            "Item {} mixes passenger types; its amount was split evenly across {} passengers",
            item.id, parts
        ));
    }
    tallies
}

#[derive(Debug, Clone, PartialEq)]
pub struct PassengerAggregate {
    pub rows: Vec<PassengerBreakdownRow>,
    pub confidence: PricingConfidence,
    /// Why rows are approximated, one line per affected item.
    pub notes: Vec<String>,
}

impl PassengerAggregate {
    pub fn total(&self) -> Decimal {
        self.rows.iter().map(|r| r.total).sum()
    }

    pub fn base_fare(&self) -> Decimal {
        self.rows.iter().map(|r| r.base_fare).sum()
    }

    pub fn taxes_fees(&self) -> Decimal {
        self.rows.iter().map(|r| r.taxes_fees).sum()
    }

    pub fn pax_count(&self) -> usize {
        self.rows.iter().map(|r| r.pax_count).sum()
    }
}

/// One row per passenger type for the fare items of a journey. Single-type
/// items are applied first so their exact per-person pricing wins over the
/// even split of mixed items for the same passenger.
pub fn aggregate(
    items: &[&OfferItem],
    types: &PassengerTypes,
    precision: u32,
) -> PassengerAggregate {
    let resolved: Vec<(&OfferItem, ItemPassengers)> = items
        .iter()
        .map(|item| (*item, ItemPassengers::of(item, types)))
        .collect();

    let tallies = resolved
        .iter()
        .filter(|(_, pax)| !pax.is_mixed())
        .fold(Tallies::default(), |tallies, (item, pax)| {
            add_single_type_item(tallies, item, pax)
        });
    let Tallies {
        mut by_type,
        notes,
    } = resolved
        .iter()
        .filter(|(_, pax)| pax.is_mixed())
        .fold(tallies, |tallies, (item, pax)| {
            add_mixed_item(tallies, item, pax, precision)
        });

    by_type.sort_by_key(|(ptc, _)| ptc_rank(ptc));
    let rows: Vec<PassengerBreakdownRow> = by_type
        .into_iter()
        .map(|(ptc, tally)| tally.into_row(ptc))
        .collect();

    let confidence = if rows
        .iter()
        .any(|r| r.confidence == PricingConfidence::Approximated)
    {
        PricingConfidence::Approximated
    } else {
        PricingConfidence::Exact
    };
    PassengerAggregate {
        rows,
        confidence,
        notes,
    }
}

/// How many times each item's itemized charges count towards the journey,
/// following the same passenger accounting as `aggregate`: single-type items
/// count once per passenger not already priced, mixed items (whose amounts
/// already cover all their passengers) count once if they add anyone new.
pub fn charge_multipliers(items: &[&OfferItem], types: &PassengerTypes) -> Vec<Decimal> {
    let resolved: Vec<ItemPassengers> = items
        .iter()
        .map(|item| ItemPassengers::of(item, types))
        .collect();
    let mut multipliers = vec![Decimal::ZERO; items.len()];
    let mut seen: BTreeSet<String> = BTreeSet::new();

    for mixed_pass in [false, true] {
        for (idx, pax) in resolved.iter().enumerate() {
            if pax.is_mixed() != mixed_pass {
                continue;
            }
            let new_ids = pax
                .passengers
                .iter()
                .filter(|(id, _)| seen.insert(id.clone()))
                .count();
            multipliers[idx] = match (mixed_pass, new_ids) {
                (_, 0) => Decimal::ZERO,
                (true, _) => Decimal::ONE,
                (false, n) => Decimal::from(n),
            };
        }
    }
    multipliers
}
