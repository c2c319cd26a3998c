//! Pipeline configuration
//!
//! [`FilterOptions`] is what a caller asks for on a given run.
//! [`PipelineConfig`] holds the tuning constants and is usually fixed per process.

use serde::{Deserialize, Serialize};

use crate::raster::RasterEncoding;
use crate::record::RecordFailurePolicy;

pub const DEFAULT_DPI: f64 = 90.0;
pub const DEFAULT_MARGIN: f64 = 4.0;
pub const DEFAULT_SNIPPET_CHARS: usize = 140;

/// Which transforms a run applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterOptions {
    /// Combine all inputs into one output document
    pub merge_all: bool,
    /// Crop every page to its content
    pub remove_whitespace: bool,
    /// Group pages by courier, then by quantity
    pub sort_by_courier: bool,
    /// Leave pages with a tax invoice section uncropped
    pub keep_invoice_uncropped: bool,
    /// Append the summary report pages
    pub append_summary: bool,
}

/// Whitespace cropper settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropConfig {
    /// Render resolution; the raster scale is `dpi / 72`
    pub dpi: f64,
    /// Points added around the content box before clamping to the page
    pub margin: f64,
    pub encoding: RasterEncoding,
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_DPI,
            margin: DEFAULT_MARGIN,
            encoding: RasterEncoding::default(),
        }
    }
}

impl CropConfig {
    pub fn scale(&self) -> f64 {
        self.dpi / 72.0
    }
}

/// Label classifier settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Line that opens the product block on a label
    pub product_marker: String,
    /// Non-blank lines between the marker and the SKU line
    pub record_offset: usize,
    /// Maximum length of the per-page text snippet kept in metadata
    pub snippet_chars: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            product_marker: "Product Details".to_string(),
            record_offset: 6,
            snippet_chars: DEFAULT_SNIPPET_CHARS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub crop: CropConfig,
    pub classifier: ClassifierConfig,
    pub record_policy: RecordFailurePolicy,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_scale_is_ninety_dpi() {
        assert!((CropConfig::default().scale() - 1.25).abs() < 1e-9);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"crop":{"dpi":144.0},"record_policy":"abort_batch"}"#).unwrap();
        assert_eq!(config.crop.dpi, 144.0);
        assert_eq!(config.crop.margin, DEFAULT_MARGIN);
        assert_eq!(config.record_policy, RecordFailurePolicy::AbortBatch);
        assert_eq!(config.classifier, ClassifierConfig::default());
    }

    #[test]
    fn test_filter_options_default_to_off() {
        let options: FilterOptions = serde_json::from_str(r#"{"sort_by_courier":true}"#).unwrap();
        assert_eq!(
            options,
            FilterOptions {
                sort_by_courier: true,
                ..FilterOptions::default()
            }
        );
    }
}
