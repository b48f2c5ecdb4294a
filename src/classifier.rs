use rust_decimal::Decimal;
use serde::Serialize;

use crate::model::OfferItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LineItemKind {
    Fare,
    Bundle,
}

/// A fare item carries a fare-basis code and a positive base amount; anything
/// else is a bundle or ancillary. Bundle upgrades are sometimes billed at zero
/// while still carrying the fare basis of the flight, so a zero base amount
/// classifies as `Bundle` even with a code present.
pub fn classify(item: &OfferItem) -> LineItemKind {
    let has_fare_basis = item
        .fare_basis
        .as_deref()
        .is_some_and(|code| !code.trim().is_empty());
    let has_base = item.base_amount.is_some_and(|base| base > Decimal::ZERO);

    if has_fare_basis && has_base {
        LineItemKind::Fare
    } else {
        LineItemKind::Bundle
    }
}

/// Split items into (fare, bundle) keeping their original order.
pub fn partition(items: &[OfferItem]) -> (Vec<&OfferItem>, Vec<&OfferItem>) {
    items
        .iter()
        .partition(|item| classify(item) == LineItemKind::Fare)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    fn item(fare_basis: Option<&str>, base: Option<Decimal>) -> OfferItem {
        OfferItem {
            id: "item".to_string(),
            passenger_refs: vec!["ADT0".to_string()],
            base_amount: base,
            tax_amount: None,
            total_amount: dec!(100),
            currency: "AUD".to_string(),
            fare_basis: fare_basis.map(str::to_string),
            segment_refs: vec![],
            charges: vec![],
            service_name: None,
        }
    }

    #[test_case(Some("YOW"), Some(dec!(100)), LineItemKind::Fare; "fare basis and positive base")]
    #[test_case(Some("YOW"), Some(dec!(0)), LineItemKind::Bundle; "zero base with fare basis")]
    #[test_case(None, Some(dec!(100)), LineItemKind::Bundle; "base without fare basis")]
    #[test_case(Some("  "), Some(dec!(100)), LineItemKind::Bundle; "blank fare basis")]
    #[test_case(Some("YOW"), None, LineItemKind::Bundle; "missing base")]
    #[test_case(Some("YOW"), Some(dec!(-5)), LineItemKind::Bundle; "negative base")]
    fn test_classify(fare_basis: Option<&str>, base: Option<Decimal>, expected: LineItemKind) {
        assert_eq!(classify(&item(fare_basis, base)), expected);
    }

    #[test]
    fn test_partition_keeps_order() {
        let mut first = item(Some("YOW"), Some(dec!(100)));
        first.id = "f1".to_string();
        let mut bundle = item(None, None);
        bundle.id = "b1".to_string();
        let mut second = item(Some("YOW"), Some(dec!(50)));
        second.id = "f2".to_string();

        let items = vec![first, bundle, second];
        let (fares, bundles) = partition(&items);
        let fare_ids: Vec<_> = fares.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(fare_ids, vec!["f1", "f2"]);
        assert_eq!(bundles.len(), 1);
        assert_eq!(bundles[0].id, "b1");
    }
}
