//! Order splitter
//!
//! Pulls the pages mentioning any requested order identifier out of a set of
//! documents. Both sides are pooled across all inputs and keep their original
//! relative order.

use std::collections::BTreeSet;

use crate::document::{DocumentBuilder, LabelDocument};
use crate::error::LabelCropError;

/// Order identifiers requested by the caller, deduplicated, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderSplitRequest {
    ids: Vec<String>,
}

impl OrderSplitRequest {
    /// Parse a comma and/or newline separated list.
    pub fn parse(input: &str) -> Self {
        let mut ids: Vec<String> = Vec::new();
        for part in input.split([',', '\n']) {
            let id = part.trim();
            if !id.is_empty() && !ids.iter().any(|seen| seen == id) {
                ids.push(id.to_string());
            }
        }
        Self { ids }
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }
}

/// A page position across several input documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageRef {
    pub document: usize,
    pub page: usize,
}

#[derive(Debug)]
pub struct SplitResult {
    pub selected: LabelDocument,
    pub cleaned: LabelDocument,
    /// Pages each identifier was found on, in request order
    pub hits: Vec<(String, Vec<PageRef>)>,
}

impl SplitResult {
    pub fn unmatched_ids(&self) -> impl Iterator<Item = &str> {
        self.hits
            .iter()
            .filter(|(_, pages)| pages.is_empty())
            .map(|(id, _)| id.as_str())
    }
}

/// Partition every page of `documents` by whether its text contains a requested id.
///
/// Pages whose text cannot be extracted go to `cleaned`.
pub fn split_documents(
    documents: &[LabelDocument],
    request: &OrderSplitRequest,
) -> Result<SplitResult, LabelCropError> {
    if documents.is_empty() {
        return Err(LabelCropError::NoInput);
    }

    let mut hits: Vec<(String, Vec<PageRef>)> =
        request.ids().iter().map(|id| (id.clone(), Vec::new())).collect();
    let mut selected_pages: BTreeSet<PageRef> = BTreeSet::new();

    for (doc_index, doc) in documents.iter().enumerate() {
        for page in 0..doc.page_count() {
            let text = match doc.page_text(page) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(document = doc_index, page, error = %e, "Cannot read page text");
                    continue;
                }
            };
            let here = PageRef {
                document: doc_index,
                page,
            };
            for (id, pages) in hits.iter_mut() {
                if text.contains(id.as_str()) {
                    pages.push(here);
                    selected_pages.insert(here);
                }
            }
        }
    }

    let mut selected = DocumentBuilder::new();
    let mut cleaned = DocumentBuilder::new();
    for (doc_index, doc) in documents.iter().enumerate() {
        for page in 0..doc.page_count() {
            let here = PageRef {
                document: doc_index,
                page,
            };
            if selected_pages.contains(&here) {
                selected.push_copy(doc, page)?;
            } else {
                cleaned.push_copy(doc, page)?;
            }
        }
    }

    let result = SplitResult {
        selected: selected.finish()?,
        cleaned: cleaned.finish()?,
        hits,
    };

    for (id, pages) in &result.hits {
        if !pages.is_empty() {
            tracing::info!(order_id = %id, pages = ?pages, "Order found");
        }
    }
    for id in result.unmatched_ids() {
        tracing::warn!(order_id = %id, "Order not found in any document");
    }
    tracing::info!(
        selected = result.selected.page_count(),
        cleaned = result.cleaned.page_count(),
        "Split documents"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::label_pdf;
    use pretty_assertions::assert_eq;

    fn texts(doc: &LabelDocument) -> Vec<String> {
        (0..doc.page_count())
            .map(|i| doc.page_text(i).unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_parse_splits_trims_and_dedupes() {
        let request = OrderSplitRequest::parse(" 1001, 1002\n1001 ,,\n\n 1003 ");
        assert_eq!(request.ids(), &["1001", "1002", "1003"]);
    }

    #[test]
    fn test_parse_blank_is_empty() {
        assert!(OrderSplitRequest::parse(" , \n ").is_empty());
        assert!(OrderSplitRequest::parse("").is_empty());
    }

    #[test]
    fn test_split_pools_documents() {
        let first = LabelDocument::load(&label_pdf(&[
            vec!["Order 555"],
            vec!["Order 1001_1"],
            vec!["Order 777"],
        ]))
        .unwrap();
        let second = LabelDocument::load(&label_pdf(&[vec!["Order 1002"], vec!["Order 888"]])).unwrap();

        let request = OrderSplitRequest::parse("1002,1001");
        let result = split_documents(&[first, second], &request).unwrap();

        assert_eq!(texts(&result.selected), vec!["Order 1001_1", "Order 1002"]);
        assert_eq!(texts(&result.cleaned), vec!["Order 555", "Order 777", "Order 888"]);
        assert_eq!(
            result.hits,
            vec![
                ("1002".to_string(), vec![PageRef { document: 1, page: 0 }]),
                ("1001".to_string(), vec![PageRef { document: 0, page: 1 }]),
            ]
        );
    }

    #[test]
    fn test_page_matching_two_ids_is_selected_once() {
        let doc = LabelDocument::load(&label_pdf(&[vec!["1001 and 1002"], vec!["other"]])).unwrap();
        let result = split_documents(&[doc], &OrderSplitRequest::parse("1001\n1002\n9999")).unwrap();
        assert_eq!(result.selected.page_count(), 1);
        assert_eq!(result.cleaned.page_count(), 1);
        assert_eq!(result.unmatched_ids().collect::<Vec<_>>(), vec!["9999"]);
    }

    #[test]
    fn test_split_without_documents_is_no_input() {
        let result = split_documents(&[], &OrderSplitRequest::parse("1"));
        assert!(matches!(result, Err(LabelCropError::NoInput)));
    }
}
