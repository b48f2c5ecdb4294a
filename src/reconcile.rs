// Tax/fee itemisation and reconciliation.
//
// Itemized charges are gathered per offer item from every place the provider
// may put them, aggregated per journey, then compared against the tax total
// derived from the passenger rows. Disagreement is reported, never corrected:
// the itemized list can be incomplete while the derived total is what gets
// charged.

use rust_decimal::Decimal;
use tracing::warn;

use crate::codes::CodeTable;
use crate::document::XmlNode;
use crate::extract::{first_match, read_amount, AmountField, Strategy};
use crate::model::{ChargeKind, OfferItem, ReconciliationWarning, TaxFeeItem};

/// One place itemized charges can live under an offer item.
pub struct ChargeSource {
    pub name: &'static str,
    pub collect: fn(&XmlNode, &CodeTable) -> Vec<TaxFeeItem>,
}

/// Tried in this order. Entries already reported by an earlier source are
/// not repeated.
pub static CHARGE_SOURCES: &[ChargeSource] = &[
    ChargeSource {
        name: "tax summary",
        collect: tax_summary_entries,
    },
    ChargeSource {
        name: "price block fees",
        collect: price_fee_entries,
    },
    ChargeSource {
        name: "item taxes",
        collect: item_tax_entries,
    },
];

static TAX_CODE: &[Strategy<String>] = &[
    Strategy {
        name: "TaxCode",
        extract: |n| n.value("TaxCode").map(str::to_string),
    },
    Strategy {
        name: "Code",
        extract: |n| n.value("Code").map(str::to_string),
    },
    Strategy {
        name: "Designator",
        extract: |n| n.value("Designator").map(str::to_string),
    },
];

static FEE_CODE: &[Strategy<String>] = &[
    Strategy {
        name: "Designator",
        extract: |n| n.value("Designator").map(str::to_string),
    },
    Strategy {
        name: "FeeCode",
        extract: |n| n.value("FeeCode").map(str::to_string),
    },
    Strategy {
        name: "Code",
        extract: |n| n.value("Code").map(str::to_string),
    },
];

static FEE_NAME: &[Strategy<String>] = &[
    Strategy {
        name: "Desc",
        extract: |n| n.value("Desc").map(str::to_string),
    },
    Strategy {
        name: "DescText",
        extract: |n| n.value("DescText").map(str::to_string),
    },
    Strategy {
        name: "Description",
        extract: |n| n.value("Description").map(str::to_string),
    },
];

fn charge_amount(node: &XmlNode) -> Option<AmountField> {
    let mut amount = node
        .child("Amount")
        .and_then(read_amount)
        .or_else(|| read_amount(node))?;
    if amount.currency.is_none() {
        amount.currency = ["CurCode", "Currency", "CurrencyCode"]
            .iter()
            .find_map(|name| node.value(name))
            .map(str::to_string);
    }
    Some(amount)
}

fn tax_entry(node: &XmlNode, table: &CodeTable) -> Option<TaxFeeItem> {
    let amount = charge_amount(node)?;
    let code = first_match(TAX_CODE, node)
        .unwrap_or_else(|| "TAX".to_string())
        .to_uppercase();
    Some(TaxFeeItem {
        kind: ChargeKind::Tax,
        name: table.describe(ChargeKind::Tax, &code),
        code,
        amount: amount.value,
        currency: amount.currency.unwrap_or_default(),
    })
}

fn fee_entry(node: &XmlNode, table: &CodeTable) -> Option<TaxFeeItem> {
    let amount = charge_amount(node)?;
    let code = first_match(FEE_CODE, node)
        .unwrap_or_else(|| "FEE".to_string())
        .to_uppercase();
    let name =
        first_match(FEE_NAME, node).unwrap_or_else(|| table.describe(ChargeKind::Fee, &code));
    Some(TaxFeeItem {
        kind: ChargeKind::Fee,
        code,
        name,
        amount: amount.value,
        currency: amount.currency.unwrap_or_default(),
    })
}

fn tax_summary_entries(item: &XmlNode, table: &CodeTable) -> Vec<TaxFeeItem> {
    item.descendants("TaxSummary")
        .into_iter()
        .flat_map(|summary| summary.children("Tax"))
        .filter_map(|tax| tax_entry(tax, table))
        .collect()
}

fn price_fee_entries(item: &XmlNode, table: &CodeTable) -> Vec<TaxFeeItem> {
    item.descendants("Fee")
        .into_iter()
        .filter_map(|fee| fee_entry(fee, table))
        .collect()
}

fn item_tax_entries(item: &XmlNode, table: &CodeTable) -> Vec<TaxFeeItem> {
    item.descendants("Taxes")
        .into_iter()
        .flat_map(|taxes| taxes.descendants("Tax"))
        .chain(item.children("Tax"))
        .filter_map(|tax| tax_entry(tax, table))
        .collect()
}

fn same_charge(a: &TaxFeeItem, b: &TaxFeeItem) -> bool {
    a.code == b.code && a.amount == b.amount
}

/// Union of all charge sources for one offer item. An entry matching one
/// already reported by a higher-priority source is consumed as a duplicate;
/// repeats within the same source are kept.
pub fn collect_item_charges(
    item: &XmlNode,
    table: &CodeTable,
    default_currency: &str,
) -> Vec<TaxFeeItem> {
    let mut collected: Vec<TaxFeeItem> = Vec::new();

    for source in CHARGE_SOURCES {
        let mut earlier: Vec<Option<&TaxFeeItem>> = collected.iter().map(Some).collect();
        let mut fresh = Vec::new();
        for entry in (source.collect)(item, table) {
            let duplicate = earlier
                .iter_mut()
                .find(|slot| slot.is_some_and(|seen| same_charge(seen, &entry)));
            match duplicate {
                Some(slot) => *slot = None,
                None => fresh.push(entry),
            }
        }
        collected.extend(fresh);
    }

    for charge in collected.iter_mut() {
        if charge.currency.is_empty() {
            charge.currency = default_currency.to_string();
        }
    }
    collected
}

/// Sum the items' charges by (kind, code) in first-seen order. Each item's
/// charges are scaled by its multiplier (see `passenger::charge_multipliers`).
pub fn aggregate_charges(items: &[&OfferItem], multipliers: &[Decimal]) -> Vec<TaxFeeItem> {
    items
        .iter()
        .zip(multipliers.iter())
        .filter(|(_, multiplier)| !multiplier.is_zero())
        .flat_map(|(item, multiplier)| {
            item.charges
                .iter()
                .map(move |charge| (charge, *multiplier))
        })
        .fold(Vec::<TaxFeeItem>::new(), |mut totals, (charge, multiplier)| {
            let amount = charge.amount * multiplier;
            match totals
                .iter()
                .position(|t| t.kind == charge.kind && t.code == charge.code)
            {
                Some(idx) => totals[idx].amount += amount,
                None => totals.push(TaxFeeItem {
                    amount,
                    ..charge.clone()
                }),
            }
            totals
        })
}

/// Compare the itemized sum against the derived tax/fee total. Returns a
/// warning when they differ by more than the tolerance.
pub fn reconcile(
    journey_key: &str,
    itemized: &[TaxFeeItem],
    derived_total: Decimal,
    tolerance: Decimal,
) -> Option<ReconciliationWarning> {
    let itemized_total: Decimal = itemized.iter().map(|c| c.amount).sum();
    let difference = derived_total - itemized_total;
    if difference.abs() <= tolerance {
        return None;
    }

    warn!(
        journey = journey_key,
        itemized = %itemized_total,
        derived = %derived_total,
        difference = %difference,
        "Itemized taxes/fees disagree with derived total"
    );
    Some(ReconciliationWarning {
        journey_key: journey_key.to_string(),
        itemized_total,
        derived_total,
        difference,
        breakdown: itemized.to_vec(),
    })
}
