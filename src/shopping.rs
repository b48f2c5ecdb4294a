// Shopping responses: combine the fare offers and the separately priced
// bundle/ancillary offers that belong to the same journey into one option.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

use crate::classifier::partition;
use crate::config::EngineConfig;
use crate::journey::{journey_key, order_segments, route_label};
use crate::model::{
    Money, Offer, OfferItem, PassengerBreakdownRow, PricingConfidence, ProviderError, Segment,
};
use crate::passenger::{aggregate, PassengerTypes};

/// A bundle or ancillary the traveller may add on top of the fare.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BundleOption {
    pub offer_id: String,
    pub item_id: String,
    pub name: String,
    pub price: Money,
    pub segment_ids: Vec<String>,
}

/// One selectable journey. `fare_total` never includes bundles;
/// `total_amount` is fare plus every attached bundle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShoppingOption {
    pub journey_key: String,
    pub route: String,
    pub segment_ids: Vec<String>,
    pub offer_ids: Vec<String>,
    pub currency: String,
    pub base_amount: Decimal,
    pub tax_amount: Decimal,
    pub fare_total: Decimal,
    pub bundle_total: Decimal,
    pub total_amount: Decimal,
    pub bundles: Vec<BundleOption>,
    pub passengers: Vec<PassengerBreakdownRow>,
    pub confidence: PricingConfidence,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShoppingResult {
    pub success: bool,
    pub offers: Vec<Offer>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ShoppingOption>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ProviderError>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ShoppingResult {
    pub fn to_json(&self) -> Result<String, crate::error::ProcessingError> {
        serde_json::to_string(self)
            .map_err(|e| crate::error::ProcessingError::JsonParseError(e.to_string()))
    }
}

struct RelatedOffers<'a> {
    key: String,
    segment_ids: BTreeSet<String>,
    offer_ids: Vec<String>,
    fare_items: Vec<&'a OfferItem>,
    bundles: Vec<(&'a Offer, &'a OfferItem)>,
}

impl<'a> RelatedOffers<'a> {
    fn covers(&self, refs: &[String]) -> bool {
        refs.iter().all(|r| self.segment_ids.contains(r))
    }

    fn add_offer_id(&mut self, id: &str) {
        if !self.offer_ids.iter().any(|o| o == id) {
            self.offer_ids.push(id.to_string());
        }
    }
}

/// Price of a bundle item for everyone it references.
fn bundle_price(item: &OfferItem) -> Decimal {
    let pax: BTreeSet<&str> = item.passenger_refs.iter().map(String::as_str).collect();
    item.total_amount * Decimal::from(pax.len().max(1))
}

/// Group offers by the segment set of their fare items, attach bundle items
/// to the matching group and price each group. Returns the options plus
/// warnings for bundles that could not be attached.
pub fn aggregate_related_offers(
    offers: &[Offer],
    segments: &[Segment],
    types: &PassengerTypes,
    config: &EngineConfig,
) -> (Vec<ShoppingOption>, Vec<String>) {
    let mut groups: Vec<RelatedOffers> = Vec::new();
    let mut loose_bundles: Vec<(&Offer, &OfferItem)> = Vec::new();

    for offer in offers {
        let (fares, bundles) = partition(&offer.items);
        if fares.is_empty() {
            loose_bundles.extend(bundles.into_iter().map(|item| (offer, item)));
            continue;
        }

        let refs: Vec<String> = fares
            .iter()
            .flat_map(|item| item.segment_refs.iter().cloned())
            .collect();
        let key = if refs.is_empty() {
            format!("offer:{}", offer.id)
        } else {
            journey_key(&refs, &config.journey_key_delimiter)
        };

        let idx = match groups.iter().position(|g| g.key == key) {
            Some(idx) => idx,
            None => {
                groups.push(RelatedOffers {
                    key,
                    segment_ids: BTreeSet::new(),
                    offer_ids: Vec::new(),
                    fare_items: Vec::new(),
                    bundles: Vec::new(),
                });
                groups.len() - 1
            }
        };
        let group = &mut groups[idx];
        group.segment_ids.extend(refs);
        group.add_offer_id(&offer.id);
        group.fare_items.extend(fares);
        group.bundles.extend(bundles.into_iter().map(|item| (offer, item)));
    }

    let mut warnings = Vec::new();
    for (offer, item) in loose_bundles {
        let key = journey_key(&item.segment_refs, &config.journey_key_delimiter);
        let target = if item.segment_refs.is_empty() {
            (groups.len() == 1).then_some(0)
        } else {
            groups
                .iter()
                .position(|g| g.key == key)
                .or_else(|| groups.iter().position(|g| g.covers(&item.segment_refs)))
        };
        match target {
            Some(idx) => {
                groups[idx].add_offer_id(&offer.id);
                groups[idx].bundles.push((offer, item));
            }
            None => {
                warn!(offer = %offer.id, item = %item.id, "Bundle matches no fare journey");
                warnings.push(format!(
                    "Bundle {} of offer {} matches no fare journey and was left out",
                    item.id, offer.id
                ));
            }
        }
    }

    let options = groups
        .into_iter()
        .enumerate()
        .map(|(idx, group)| price_group(group, idx + 1, segments, types, config))
        .collect();
    (options, warnings)
}

fn price_group(
    group: RelatedOffers,
    ordinal: usize,
    segments: &[Segment],
    types: &PassengerTypes,
    config: &EngineConfig,
) -> ShoppingOption {
    let ids: Vec<String> = group.segment_ids.into_iter().collect();
    let segment_ids = order_segments(&ids, segments);
    let route = route_label(&segment_ids, segments, ordinal);
    let passengers = aggregate(&group.fare_items, types, config.currency_precision);

    let currency = group
        .fare_items
        .iter()
        .map(|item| item.currency.as_str())
        .find(|c| !c.is_empty())
        .unwrap_or_default()
        .to_string();

    let bundles: Vec<BundleOption> = group
        .bundles
        .iter()
        .map(|(offer, item)| BundleOption {
            offer_id: offer.id.clone(),
            item_id: item.id.clone(),
            name: item.service_name.clone().unwrap_or_else(|| item.id.clone()),
            price: Money::new(
                bundle_price(item),
                if item.currency.is_empty() {
                    currency.clone()
                } else {
                    item.currency.clone()
                },
            ),
            segment_ids: item.segment_refs.clone(),
        })
        .collect();

    let base_amount = passengers.base_fare();
    let tax_amount = passengers.taxes_fees();
    let fare_total = base_amount + tax_amount;
    let bundle_total: Decimal = bundles.iter().map(|b| b.price.amount).sum();

    debug!(
        key = %group.key,
        offers = group.offer_ids.len(),
        fare_total = %fare_total,
        bundle_total = %bundle_total,
        "Priced shopping option"
    );

    ShoppingOption {
        journey_key: group.key,
        route,
        segment_ids,
        offer_ids: group.offer_ids,
        currency,
        base_amount,
        tax_amount,
        fare_total,
        bundle_total,
        total_amount: fare_total + bundle_total,
        bundles,
        confidence: passengers.confidence,
        passengers: passengers.rows,
        notes: passengers.notes,
    }
}
