//! Courier grouping and quantity ordering of pages
//!
//! Groups are ordered by page count (largest first), ties by first appearance,
//! with unclassified pages always last. Inside a group, pages with a quantity
//! come first in ascending order; ties keep their original order.

use std::collections::HashMap;

use crate::classify::{classify_pages, CourierTag, PageMeta};
use crate::config::ClassifierConfig;
use crate::document::LabelDocument;
use crate::stage::StageOutcome;

struct CourierGroup<'m> {
    tag: &'m CourierTag,
    first: usize,
    members: Vec<&'m PageMeta>,
}

/// Final page order for the given metadata.
pub fn compute_order(meta: &[PageMeta]) -> Vec<usize> {
    let mut groups: Vec<CourierGroup<'_>> = Vec::new();
    let mut by_tag: HashMap<&CourierTag, usize> = HashMap::new();
    for page in meta {
        let slot = *by_tag.entry(&page.courier).or_insert_with(|| {
            groups.push(CourierGroup {
                tag: &page.courier,
                first: page.index,
                members: Vec::new(),
            });
            groups.len() - 1
        });
        let group = &mut groups[slot];
        group.first = group.first.min(page.index);
        group.members.push(page);
    }

    groups.sort_by_key(|g| (g.tag.is_unknown(), std::cmp::Reverse(g.members.len()), g.first));

    groups
        .into_iter()
        .flat_map(|mut group| {
            group
                .members
                .sort_by_key(|p| (p.quantity.is_none(), p.quantity.unwrap_or(0), p.index));
            group.members.into_iter().map(|p| p.index)
        })
        .collect()
}

/// Reorder `doc` by courier and quantity.
///
/// Never fails: if the pages cannot be classified or copied, the input is
/// returned as-is with a `Degraded` outcome.
pub fn reorder_document(doc: LabelDocument, config: &ClassifierConfig) -> (LabelDocument, StageOutcome) {
    match classify_pages(&doc, config) {
        Ok(meta) => apply_order(doc, &meta),
        Err(e) => (doc, StageOutcome::degraded(format!("classification failed: {}", e))),
    }
}

/// Reorder `doc` using metadata classified from a page-aligned document.
///
/// Cropped pages carry no text, so the pipeline classifies the source pages
/// and applies the resulting order to their cropped counterparts.
pub fn apply_order(doc: LabelDocument, meta: &[PageMeta]) -> (LabelDocument, StageOutcome) {
    if meta.len() != doc.page_count() {
        let reason = format!(
            "metadata covers {} pages, document has {}",
            meta.len(),
            doc.page_count()
        );
        return (doc, StageOutcome::degraded(reason));
    }

    let order = compute_order(meta);
    tracing::info!(pages = order.len(), order = ?order, "Reordering pages by courier");

    match doc.select(&order) {
        Ok(sorted) => (sorted, StageOutcome::Applied),
        Err(e) => (doc, StageOutcome::degraded(format!("page copy failed: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::label_pdf;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn meta(index: usize, courier: Option<&str>, quantity: Option<u32>) -> PageMeta {
        PageMeta {
            index,
            courier: courier.map_or(CourierTag::Unknown, |c| CourierTag::Known(c.to_string())),
            quantity,
            snippet: String::new(),
        }
    }

    #[test]
    fn test_quantity_ascending_within_group() {
        let pages = vec![
            meta(0, Some("delhivery"), Some(2)),
            meta(1, Some("shadowfax"), None),
            meta(2, Some("delhivery"), Some(1)),
        ];
        assert_eq!(compute_order(&pages), vec![2, 0, 1]);
    }

    #[test]
    fn test_unknown_group_is_last_even_when_largest() {
        let pages = vec![
            meta(0, None, Some(1)),
            meta(1, None, None),
            meta(2, Some("valmo"), None),
            meta(3, None, Some(1)),
        ];
        assert_eq!(compute_order(&pages), vec![2, 0, 3, 1]);
    }

    #[test]
    fn test_equal_counts_break_ties_by_first_appearance() {
        let pages = vec![
            meta(0, Some("shadowfax"), None),
            meta(1, Some("delhivery"), None),
            meta(2, Some("delhivery"), None),
            meta(3, Some("shadowfax"), None),
            meta(4, Some("bluedart"), None),
        ];
        assert_eq!(compute_order(&pages), vec![0, 3, 1, 2, 4]);
    }

    #[test]
    fn test_empty_metadata_gives_empty_order() {
        assert!(compute_order(&[]).is_empty());
    }

    #[test]
    fn test_reorder_document_copies_in_order() {
        let pdf = label_pdf(&[
            vec!["Delhivery", "Product Details", "Qty 2"],
            vec!["Shadowfax"],
            vec!["Delhivery", "Product Details", "Qty 1"],
        ]);
        let doc = LabelDocument::load(&pdf).unwrap();

        let (sorted, outcome) = reorder_document(doc, &ClassifierConfig::default());

        assert_eq!(outcome, StageOutcome::Applied);
        let last_lines: Vec<String> = (0..3)
            .map(|i| sorted.page_text(i).unwrap().lines().last().unwrap_or("").to_string())
            .collect();
        assert_eq!(last_lines, vec!["Qty 1", "Qty 2", "Shadowfax"]);
    }

    #[test]
    fn test_misaligned_metadata_degrades() {
        let doc = LabelDocument::load(&label_pdf(&[vec!["A"], vec!["B"]])).unwrap();
        let (same, outcome) = apply_order(doc, &[meta(0, None, None)]);
        assert!(!outcome.is_applied());
        assert_eq!(same.page_text(1).unwrap(), "B");
    }

    fn arb_meta() -> impl Strategy<Value = Vec<PageMeta>> {
        let courier = prop_oneof![
            Just(None),
            Just(Some("delhivery")),
            Just(Some("shadowfax")),
            Just(Some("valmo")),
        ];
        prop::collection::vec((courier, prop::option::of(0u32..4)), 0..24).prop_map(|pages| {
            pages
                .into_iter()
                .enumerate()
                .map(|(i, (c, q))| meta(i, c, q))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_order_is_a_permutation(pages in arb_meta()) {
            let mut order = compute_order(&pages);
            order.sort_unstable();
            prop_assert_eq!(order, (0..pages.len()).collect::<Vec<_>>());
        }

        #[test]
        fn prop_equal_keys_keep_original_order(pages in arb_meta()) {
            let order = compute_order(&pages);
            let position: HashMap<usize, usize> =
                order.iter().enumerate().map(|(pos, &idx)| (idx, pos)).collect();
            for a in &pages {
                for b in &pages {
                    if a.index < b.index && a.courier == b.courier && a.quantity == b.quantity {
                        prop_assert!(position[&a.index] < position[&b.index]);
                    }
                }
            }
        }

        #[test]
        fn prop_unknown_pages_come_last(pages in arb_meta()) {
            let order = compute_order(&pages);
            let first_unknown = order.iter().position(|&i| pages[i].courier.is_unknown());
            if let Some(start) = first_unknown {
                prop_assert!(order[start..].iter().all(|&i| pages[i].courier.is_unknown()));
            }
        }
    }
}
