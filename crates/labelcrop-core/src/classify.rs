//! Courier and quantity classification of label text
//!
//! Heuristics tuned to one family of e-commerce shipping labels. The courier
//! is found by whole-word keyword match; the quantity by a fallback chain
//! over the label's product block.

use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::config::ClassifierConfig;
use crate::document::LabelDocument;
use crate::error::LabelCropError;

/// Known courier names, matched whole-word and case-insensitively.
pub const COURIER_KEYWORDS: &[&str] = &[
    "Xpress bees",
    "Delhivery",
    "Shadowfax",
    "valmo/gol",
    "Valmo",
    "bluedart",
];

/// Lines that end a label's product block.
const SECTION_STOPS: &[&str] = &["tax invoice", "sold by", "gstin", "invoice no"];

/// Header cells of a product table, as printed one per line.
const TABLE_HEADER_CELLS: &[&str] = &["sku", "size", "qty", "color", "order no.", "order no"];

lazy_static! {
    /// Keyword regexes, longest keyword first so "valmo/gol" wins over "valmo"
    static ref COURIER_PATTERNS: Vec<(String, Regex)> = {
        let mut keywords: Vec<&str> = COURIER_KEYWORDS.to_vec();
        keywords.sort_by_key(|k| std::cmp::Reverse(k.len()));
        keywords
            .into_iter()
            .filter_map(|keyword| {
                let pattern = format!(r"\b{}\b", regex::escape(&keyword.to_lowercase()));
                RegexBuilder::new(&pattern)
                    .case_insensitive(true)
                    .build()
                    .ok()
                    .map(|rx| (keyword.to_lowercase(), rx))
            })
            .collect()
    };

    static ref QTY_KEYWORD: Regex =
        Regex::new(r"(?i)\bQty\b(?:\s*|\s*[:\-]\s*|\s*\n\s*)([0-9]{1,6})\b").unwrap();

    /// A row whose third column is a number: "SKU-1  M  2  Red"
    static ref QTY_COLUMN: Regex =
        Regex::new(r"(?mi)^.+?\s+.+?\s+([0-9]{1,6})\s+.+?$").unwrap();
}

/// Courier a page was classified under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CourierTag {
    /// Lower-cased courier keyword
    Known(String),
    Unknown,
}

impl CourierTag {
    pub fn is_unknown(&self) -> bool {
        matches!(self, CourierTag::Unknown)
    }

    pub fn as_str(&self) -> &str {
        match self {
            CourierTag::Known(name) => name,
            CourierTag::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for CourierTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-page classification used for reordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageMeta {
    pub index: usize,
    pub courier: CourierTag,
    pub quantity: Option<u32>,
    pub snippet: String,
}

/// First courier keyword present in `text`, longest keyword first.
pub fn detect_courier(text: &str) -> CourierTag {
    COURIER_PATTERNS
        .iter()
        .find(|(_, rx)| rx.is_match(text))
        .map(|(tag, _)| CourierTag::Known(tag.clone()))
        .unwrap_or(CourierTag::Unknown)
}

/// Shipment quantity printed in the product block opened by `marker`.
///
/// Tried in order: a `Qty` keyword followed by a number, the third column of
/// the row under an `SKU Size Qty Color` header (on one line or one cell per
/// line), then any row whose third column is a number.
pub fn extract_quantity(text: &str, marker: &str) -> Option<u32> {
    let block = product_block(text, &marker.trim().to_lowercase());
    if block.is_empty() {
        return None;
    }
    let joined = block.join("\n");

    if let Some(qty) = QTY_KEYWORD.captures(&joined).and_then(|c| c[1].parse().ok()) {
        return Some(qty);
    }
    if let Some(qty) = quantity_under_header(&block).or_else(|| quantity_under_stacked_header(&block)) {
        return Some(qty);
    }
    QTY_COLUMN.captures(&joined).and_then(|c| c[1].parse().ok())
}

/// Lines after the first line containing `marker`, up to an invoice or seller section.
fn product_block<'t>(text: &'t str, marker: &str) -> Vec<&'t str> {
    let mut block = Vec::new();
    let mut capturing = false;
    for line in text.lines() {
        let lower = line.trim().to_lowercase();
        if !marker.is_empty() && lower.contains(marker) {
            capturing = true;
            continue;
        }
        if !capturing {
            continue;
        }
        if SECTION_STOPS.iter().any(|stop| lower.contains(stop)) {
            break;
        }
        block.push(line);
    }
    block
}

fn quantity_under_header(block: &[&str]) -> Option<u32> {
    let header = block.iter().position(|line| {
        let lower = line.to_lowercase();
        ["sku", "size", "qty", "color"].iter().all(|t| lower.contains(t))
    })?;

    // Only the first non-blank row under the header counts
    let row = block[header + 1..].iter().find(|l| !l.trim().is_empty())?;
    let third = row.split_whitespace().nth(2)?;
    if third.bytes().all(|b| b.is_ascii_digit()) {
        third.parse().ok()
    } else {
        None
    }
}

/// Table whose header cells each sit on their own line, followed by the
/// row cells in the same order.
fn quantity_under_stacked_header(block: &[&str]) -> Option<u32> {
    let cells: Vec<String> = block
        .iter()
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty())
        .collect();
    let start = cells
        .windows(4)
        .position(|w| w == ["sku", "size", "qty", "color"])?;
    let width = cells[start..]
        .iter()
        .take_while(|c| TABLE_HEADER_CELLS.contains(&c.as_str()))
        .count();
    let qty = cells.get(start + width + 2)?;
    if qty.bytes().all(|b| b.is_ascii_digit()) {
        qty.parse().ok()
    } else {
        None
    }
}

/// First non-blank line, truncated to `max_chars` characters.
pub fn snippet(text: &str, max_chars: usize) -> String {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(|l| l.chars().take(max_chars).collect())
        .unwrap_or_default()
}

pub fn classify_text(index: usize, text: &str, config: &ClassifierConfig) -> PageMeta {
    PageMeta {
        index,
        courier: detect_courier(text),
        quantity: extract_quantity(text, &config.product_marker),
        snippet: snippet(text, config.snippet_chars),
    }
}

/// Metadata for every page of `doc`, in page order.
pub fn classify_pages(doc: &LabelDocument, config: &ClassifierConfig) -> Result<Vec<PageMeta>, LabelCropError> {
    use rayon::prelude::*;

    (0..doc.page_count())
        .into_par_iter()
        .map(|index| {
            let meta = classify_text(index, doc.page_text(index)?, config);
            tracing::debug!(
                page = meta.index,
                courier = %meta.courier,
                quantity = ?meta.quantity,
                snippet = %meta.snippet,
                "Classified page"
            );
            Ok(meta)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MARKER: &str = "Product Details";

    #[test]
    fn test_detect_courier_is_case_insensitive() {
        assert_eq!(
            detect_courier("Ship via DELHIVERY Surface"),
            CourierTag::Known("delhivery".to_string())
        );
        assert_eq!(
            detect_courier("xpress BEES pickup"),
            CourierTag::Known("xpress bees".to_string())
        );
    }

    #[test]
    fn test_longest_keyword_wins() {
        assert_eq!(
            detect_courier("Valmo/GOL network"),
            CourierTag::Known("valmo/gol".to_string())
        );
        assert_eq!(detect_courier("Valmo"), CourierTag::Known("valmo".to_string()));
    }

    #[test]
    fn test_courier_match_is_whole_word() {
        assert_eq!(detect_courier("Delhiveryman"), CourierTag::Unknown);
        assert_eq!(detect_courier("no carrier here"), CourierTag::Unknown);
    }

    #[test]
    fn test_qty_keyword_in_product_block() {
        let text = "Delhivery\nProduct Details\nSKU-1\nQty: 3\nTax Invoice\nQty 9";
        assert_eq!(extract_quantity(text, MARKER), Some(3));
    }

    #[test]
    fn test_qty_keyword_on_next_line() {
        let text = "Product Details\nQty\n4";
        assert_eq!(extract_quantity(text, MARKER), Some(4));
    }

    #[test]
    fn test_qty_outside_block_is_ignored() {
        assert_eq!(extract_quantity("Qty 7\nDelhivery", MARKER), None);
        assert_eq!(extract_quantity("Product Details\nSold by: Acme\nQty 7", MARKER), None);
    }

    #[test]
    fn test_qty_from_table_row() {
        let text = "Product Details\nSKU Size Qty Color Order\nKURTA-RED XL 2 Red 1234_1";
        // "Qty Color" has no number after Qty, so the header row decides
        assert_eq!(extract_quantity(text, MARKER), Some(2));
    }

    #[test]
    fn test_table_row_with_text_column_falls_through() {
        let text = "Product Details\nSKU Size Qty Color\nKURTA Free Size 5 Blue";
        // Third token is "Size", so the generic row pattern picks up 5
        assert_eq!(extract_quantity(text, MARKER), Some(5));
    }

    #[test]
    fn test_qty_from_one_cell_per_line_table() {
        let text = "Product Details\nSKU\nSize\nQty\nColor\nOrder No.\nKURTA-RED\nXL\n2\nRed\n1234_1";
        assert_eq!(extract_quantity(text, MARKER), Some(2));
    }

    #[test]
    fn test_block_opens_at_the_configured_marker() {
        let text = "Item Summary\nQty 6\nProduct Details\nQty 2";
        assert_eq!(extract_quantity(text, "Item Summary"), Some(6));
        assert_eq!(extract_quantity("Qty 6", "Item Summary"), None);

        let config = ClassifierConfig {
            product_marker: "Item Summary".to_string(),
            ..ClassifierConfig::default()
        };
        assert_eq!(classify_text(0, text, &config).quantity, Some(6));
        assert_eq!(classify_text(0, text, &ClassifierConfig::default()).quantity, Some(2));
    }

    #[test]
    fn test_no_quantity() {
        assert_eq!(extract_quantity("", MARKER), None);
        assert_eq!(extract_quantity("Product Details\nnothing numeric", MARKER), None);
    }

    #[test]
    fn test_snippet_is_first_non_blank_line() {
        assert_eq!(snippet("\n  \n  Delhivery Surface  \nmore", 140), "Delhivery Surface");
        assert_eq!(snippet(&"x".repeat(300), 140).len(), 140);
        assert_eq!(snippet("   ", 140), "");
    }

    proptest! {
        #[test]
        fn prop_unknown_is_stable(text in "[a-z ]{0,40}") {
            prop_assume!(COURIER_KEYWORDS
                .iter()
                .all(|k| !text.contains(&k.to_lowercase())));
            prop_assert_eq!(detect_courier(&text), CourierTag::Unknown);
            prop_assert_eq!(detect_courier(&text), detect_courier(&text));
        }
    }
}
