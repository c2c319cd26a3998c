//! Shipment record extraction
//!
//! Record fields sit at fixed positions in the label's text. That positional
//! layout is the contract of one label family, so it lives behind the
//! [`LabelLayout`] trait and [`FixedOffsetLayout`] is its only implementation.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ClassifierConfig;
use crate::document::LabelDocument;
use crate::error::LabelCropError;

pub const UNKNOWN: &str = "Unknown";
pub const FREE_SIZE: &str = "Free Size";

/// Courier names for record extraction, matched as substrings in this order.
pub const RECORD_COURIERS: &[&str] = &[
    "Delhivery",
    "Shadowfax",
    "Valmo",
    "Xpress Bees",
    "Bluedart",
    "Ecom",
    "DTDC",
    "Ekart",
];

lazy_static! {
    static ref SOLD_BY: Regex = Regex::new(r"(?i)Sold\s+by\s*:\s*(.+)").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShipmentRecord {
    pub sku: String,
    pub size: String,
    pub qty: u32,
    pub color: String,
    pub order_no: String,
    pub courier: String,
    pub seller: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("Product block has {available} lines after the marker, {needed} needed")]
    TruncatedBlock { needed: usize, available: usize },
}

/// What to do when one page's record block is malformed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordFailurePolicy {
    /// Drop that page from the summary and keep going
    #[default]
    SkipPage,
    /// Drop every record of the batch
    AbortBatch,
}

/// A label layout that knows where the record fields are printed.
pub trait LabelLayout: Send + Sync {
    /// `Ok(None)` when the page is not a label of this layout.
    fn extract(&self, text: &str) -> Result<Option<ShipmentRecord>, RecordError>;
}

/// Fields on the 5 non-blank lines starting `offset` lines after the marker line:
/// SKU, Size, Qty, Color, Order No.
#[derive(Debug, Clone)]
pub struct FixedOffsetLayout {
    marker: String,
    offset: usize,
}

impl Default for FixedOffsetLayout {
    fn default() -> Self {
        Self::from_config(&ClassifierConfig::default())
    }
}

impl FixedOffsetLayout {
    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self {
            marker: config.product_marker.to_lowercase(),
            offset: config.record_offset,
        }
    }
}

impl LabelLayout for FixedOffsetLayout {
    fn extract(&self, text: &str) -> Result<Option<ShipmentRecord>, RecordError> {
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        let Some(marker) = lines
            .iter()
            .position(|l| l.trim().to_lowercase() == self.marker)
        else {
            return Ok(None);
        };

        let start = marker + self.offset;
        let fields = lines.get(start..start + 5).ok_or(RecordError::TruncatedBlock {
            needed: self.offset + 5,
            available: lines.len() - marker - 1,
        })?;
        let field = |i: usize, default: &str| {
            let value = fields[i].trim();
            if value.is_empty() {
                default.to_string()
            } else {
                value.to_string()
            }
        };

        Ok(Some(ShipmentRecord {
            sku: field(0, UNKNOWN),
            size: field(1, FREE_SIZE),
            qty: fields[2].trim().parse().unwrap_or(1),
            color: field(3, UNKNOWN),
            order_no: field(4, UNKNOWN),
            courier: record_courier(text).to_string(),
            seller: seller(text),
        }))
    }
}

/// First courier of [`RECORD_COURIERS`] appearing anywhere in `text`.
pub fn record_courier(text: &str) -> &'static str {
    let upper = text.to_uppercase();
    RECORD_COURIERS
        .iter()
        .find(|c| upper.contains(&c.to_uppercase()))
        .copied()
        .unwrap_or(UNKNOWN)
}

pub fn seller(text: &str) -> String {
    SOLD_BY
        .captures(text)
        .map(|c| c[1].trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// Records of every page of `doc` that carries one, in page order.
pub fn extract_records(
    doc: &LabelDocument,
    layout: &dyn LabelLayout,
    policy: RecordFailurePolicy,
) -> Result<Vec<ShipmentRecord>, LabelCropError> {
    let mut records = Vec::new();
    for index in 0..doc.page_count() {
        match layout.extract(doc.page_text(index)?) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => tracing::debug!(page = index, "No shipment record on page"),
            Err(e) => match policy {
                RecordFailurePolicy::SkipPage => {
                    tracing::warn!(page = index, error = %e, "Skipping malformed record");
                }
                RecordFailurePolicy::AbortBatch => {
                    tracing::warn!(page = index, error = %e, "Malformed record, dropping all records");
                    return Ok(Vec::new());
                }
            },
        }
    }
    tracing::info!(records = records.len(), pages = doc.page_count(), "Extracted shipment records");
    Ok(records)
}
