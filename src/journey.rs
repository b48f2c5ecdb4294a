// Journey grouping.
//
// Providers do not send journey identifiers on priced items, so fare items
// are grouped by the set of segments they reference. Responses without any
// segment references are chunked positionally instead. Grouping never fails;
// unresolvable input degrades to more conservative groups.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::model::{GroupingMethod, OfferItem, Segment};
use crate::passenger::{distinct_types, PassengerTypes};

pub const UNASSIGNED_KEY: &str = "unassigned";

#[derive(Debug, Clone, PartialEq)]
pub struct Journey<'a> {
    pub key: String,
    /// 1-based, in first-seen order.
    pub ordinal: usize,
    pub segment_ids: Vec<String>,
    pub route: String,
    pub items: Vec<&'a OfferItem>,
    pub grouping: GroupingMethod,
}

/// Sorted, de-duplicated segment ids joined with the delimiter.
pub fn journey_key(segment_refs: &[String], delimiter: &str) -> String {
    segment_refs
        .iter()
        .map(String::as_str)
        .collect::<BTreeSet<&str>>()
        .into_iter()
        .collect::<Vec<_>>()
        .join(delimiter)
}

pub fn group_journeys<'a>(
    fare_items: &[&'a OfferItem],
    segments: &[Segment],
    types: &PassengerTypes,
    delimiter: &str,
) -> Vec<Journey<'a>> {
    if fare_items.is_empty() {
        return Vec::new();
    }

    let groups = if fare_items.iter().any(|item| !item.segment_refs.is_empty()) {
        group_by_segments(fare_items, delimiter)
    } else {
        group_positionally(fare_items, segments, types)
    };

    groups
        .into_iter()
        .enumerate()
        .map(|(idx, group)| {
            let ordinal = idx + 1;
            let segment_ids = order_segments(&group.segment_ids, segments);
            let route = route_label(&segment_ids, segments, ordinal);
            debug!(
                key = %group.key,
                route = %route,
                items = group.items.len(),
                "Grouped journey"
            );
            Journey {
                key: group.key,
                ordinal,
                segment_ids,
                route,
                items: group.items,
                grouping: group.grouping,
            }
        })
        .collect()
}

struct ItemGroup<'a> {
    key: String,
    segment_ids: Vec<String>,
    items: Vec<&'a OfferItem>,
    grouping: GroupingMethod,
}

fn group_by_segments<'a>(fare_items: &[&'a OfferItem], delimiter: &str) -> Vec<ItemGroup<'a>> {
    let mut groups = fare_items
        .iter()
        .fold(Vec::<ItemGroup<'a>>::new(), |mut groups, item| {
            let key = if item.segment_refs.is_empty() {
                UNASSIGNED_KEY.to_string()
            } else {
                journey_key(&item.segment_refs, delimiter)
            };
            match groups.iter().position(|g| g.key == key) {
                Some(idx) => {
                    let group = &mut groups[idx];
                    group.items.push(*item);
                    for id in &item.segment_refs {
                        if !group.segment_ids.contains(id) {
                            group.segment_ids.push(id.clone());
                        }
                    }
                }
                None => groups.push(ItemGroup {
                    key,
                    segment_ids: item.segment_refs.clone(),
                    items: vec![*item],
                    grouping: GroupingMethod::SegmentReferences,
                }),
            }
            groups
        });

    // Items without references go last, as their own journey.
    if let Some(pos) = groups.iter().position(|g| g.key == UNASSIGNED_KEY) {
        let unassigned = groups.remove(pos);
        warn!(
            items = unassigned.items.len(),
            "Fare items without segment references kept as a separate journey"
        );
        groups.push(unassigned);
    }
    groups
}

fn group_positionally<'a>(
    fare_items: &[&'a OfferItem],
    segments: &[Segment],
    types: &PassengerTypes,
) -> Vec<ItemGroup<'a>> {
    let items_per_flight = distinct_types(fare_items, types).max(1);
    let chunks: Vec<&[&'a OfferItem]> = fare_items.chunks(items_per_flight).collect();
    let keyed_by_segment = segments.len() == chunks.len();

    warn!(
        items = fare_items.len(),
        items_per_flight,
        flights = chunks.len(),
        keyed_by_segment,
        "No segment references on fare items, grouping positionally"
    );

    chunks
        .into_iter()
        .enumerate()
        .map(|(idx, chunk)| {
            let (key, segment_ids) = if keyed_by_segment {
                (segments[idx].id.clone(), vec![segments[idx].id.clone()])
            } else {
                (format!("flight-{}", idx + 1), Vec::new())
            };
            ItemGroup {
                key,
                segment_ids,
                items: chunk.to_vec(),
                grouping: GroupingMethod::Positional,
            }
        })
        .collect()
}

/// Order segment ids as they appear in the segment table; ids the table does
/// not know keep their relative order at the end.
pub fn order_segments(ids: &[String], segments: &[Segment]) -> Vec<String> {
    let mut ordered: Vec<String> = ids.to_vec();
    ordered.sort_by_key(|id| {
        segments
            .iter()
            .position(|s| &s.id == id)
            .unwrap_or(usize::MAX)
    });
    ordered
}

/// `ORIGIN → DESTINATION` from the first and last resolvable segments, or
/// `Flight <ordinal>` when none resolve.
pub fn route_label(segment_ids: &[String], segments: &[Segment], ordinal: usize) -> String {
    let resolved: Vec<&Segment> = segment_ids
        .iter()
        .filter_map(|id| segments.iter().find(|s| &s.id == id))
        .collect();

    match (resolved.first(), resolved.last()) {
        (Some(first), Some(last)) => format!("{} → {}", first.origin, last.destination),
        _ => format!("Flight {}", ordinal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fare(id: &str, pax: &str, segments: &[&str]) -> OfferItem {
        OfferItem {
            id: id.to_string(),
            passenger_refs: vec![pax.to_string()],
            base_amount: Some(dec!(100)),
            tax_amount: Some(dec!(30)),
            total_amount: dec!(130),
            currency: "AUD".to_string(),
            fare_basis: Some("YOW".to_string()),
            segment_refs: segments.iter().map(|s| s.to_string()).collect(),
            charges: vec![],
            service_name: None,
        }
    }

    fn segment(id: &str, origin: &str, destination: &str) -> Segment {
        Segment {
            id: id.to_string(),
            origin: origin.to_string(),
            destination: destination.to_string(),
            carrier: None,
            flight_number: None,
            departure: None,
        }
    }

    #[test]
    fn test_journey_key_is_order_independent() {
        let a = journey_key(&["seg2".to_string(), "seg1".to_string()], "|");
        let b = journey_key(&["seg1".to_string(), "seg2".to_string(), "seg1".to_string()], "|");
        assert_eq!(a, "seg1|seg2");
        assert_eq!(a, b);
    }

    #[test]
    fn test_items_sharing_segments_group_together() {
        let a = fare("i1", "ADT0", &["seg1", "seg2"]);
        let b = fare("i2", "ADT1", &["seg2", "seg1"]);
        let c = fare("i3", "ADT0", &["seg3"]);
        let segments = vec![
            segment("seg1", "SYD", "MEL"),
            segment("seg2", "MEL", "PER"),
            segment("seg3", "PER", "SYD"),
        ];

        let journeys = group_journeys(&[&a, &b, &c], &segments, &PassengerTypes::new(), "|");
        assert_eq!(journeys.len(), 2);
        assert_eq!(journeys[0].key, "seg1|seg2");
        assert_eq!(journeys[0].items.len(), 2);
        assert_eq!(journeys[0].route, "SYD → PER");
        assert_eq!(journeys[0].segment_ids, vec!["seg1", "seg2"]);
        assert_eq!(journeys[1].key, "seg3");
        assert_eq!(journeys[1].ordinal, 2);
        assert_eq!(journeys[1].route, "PER → SYD");
        assert!(journeys
            .iter()
            .all(|j| j.grouping == GroupingMethod::SegmentReferences));
    }

    #[test]
    fn test_positional_fallback_chunks_by_passenger_types() {
        let items = [
            fare("i1", "ADT0", &[]),
            fare("i2", "CHD0", &[]),
            fare("i3", "ADT0", &[]),
            fare("i4", "CHD0", &[]),
        ];
        let refs: Vec<&OfferItem> = items.iter().collect();
        let segments = vec![segment("s1", "SYD", "MEL"), segment("s2", "MEL", "SYD")];

        let journeys = group_journeys(&refs, &segments, &PassengerTypes::new(), "|");
        assert_eq!(journeys.len(), 2);
        assert_eq!(journeys[0].items.len(), 2);
        assert_eq!(journeys[1].items.len(), 2);
        assert_eq!(journeys[0].key, "s1");
        assert_eq!(journeys[1].route, "MEL → SYD");
        assert!(journeys.iter().all(|j| j.grouping == GroupingMethod::Positional));
    }

    #[test]
    fn test_positional_fallback_without_matching_segment_list() {
        let items = [fare("i1", "ADT0", &[]), fare("i2", "ADT1", &[])];
        let refs: Vec<&OfferItem> = items.iter().collect();

        let journeys = group_journeys(&refs, &[], &PassengerTypes::new(), "|");
        assert_eq!(journeys.len(), 2);
        assert_eq!(journeys[0].key, "flight-1");
        assert_eq!(journeys[0].route, "Flight 1");
        assert_eq!(journeys[1].route, "Flight 2");
        assert!(journeys[0].segment_ids.is_empty());
    }

    #[test]
    fn test_unreferenced_items_form_trailing_journey() {
        let a = fare("i1", "ADT0", &[]);
        let b = fare("i2", "ADT0", &["seg1"]);
        let journeys = group_journeys(&[&a, &b], &[], &PassengerTypes::new(), "|");
        assert_eq!(journeys.len(), 2);
        assert_eq!(journeys[0].key, "seg1");
        assert_eq!(journeys[0].route, "Flight 1");
        assert_eq!(journeys[1].key, UNASSIGNED_KEY);
    }

    #[test]
    fn test_route_uses_first_and_last_resolvable_segment() {
        let segments = vec![segment("seg2", "MEL", "BNE")];
        let ids = vec!["seg1".to_string(), "seg2".to_string(), "seg3".to_string()];
        assert_eq!(route_label(&ids, &segments, 1), "MEL → BNE");
        assert_eq!(route_label(&ids, &[], 3), "Flight 3");
    }

    #[test]
    fn test_segments_follow_table_order() {
        let segments = vec![segment("b", "SYD", "MEL"), segment("a", "MEL", "PER")];
        let ids = vec!["x".to_string(), "a".to_string(), "b".to_string()];
        assert_eq!(order_segments(&ids, &segments), vec!["b", "a", "x"]);
    }

    #[test]
    fn test_no_fare_items_no_journeys() {
        assert!(group_journeys(&[], &[], &PassengerTypes::new(), "|").is_empty());
    }
}
