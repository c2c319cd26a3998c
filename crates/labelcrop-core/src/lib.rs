//! Shipping-label PDF processing
//!
//! This crate takes batches of courier label PDFs and produces smaller,
//! reordered, optionally split documents with an appended summary report.
//!
//! - [`crop`]: replace each page with a raster of its content region
//! - [`classify`] / [`record`]: read courier, quantity and shipment fields from label text
//! - [`reorder`]: group pages by courier, then order by quantity
//! - [`split`]: pull out pages mentioning requested order ids
//! - [`summary`] / [`report`]: aggregate records and render report pages
//! - [`pipeline`]: run the stages a caller selected over a batch

pub mod classify;
pub mod config;
pub mod crop;
pub mod document;
pub mod error;
pub mod geometry;
pub mod layout;
pub mod pipeline;
pub mod raster;
pub mod record;
pub mod reorder;
pub mod report;
pub mod split;
pub mod stage;
pub mod summary;

mod fonts;
mod pdf_util;

#[cfg(test)]
mod test_support;

pub use classify::{detect_courier, extract_quantity, CourierTag, PageMeta};
pub use config::{ClassifierConfig, CropConfig, FilterOptions, PipelineConfig};
pub use crop::PageCropper;
pub use document::{DocumentBuilder, LabelDocument};
pub use error::LabelCropError;
pub use pipeline::{OutputFile, Pipeline, PipelineInput, PipelineOutput, ProcessedDocument};
pub use raster::{EncodedRaster, PageRasterizer, RasterEncoding, RenderSession};
#[cfg(feature = "pdfium")]
pub use raster::PdfiumRasterizer;
pub use record::{FixedOffsetLayout, LabelLayout, RecordFailurePolicy, ShipmentRecord};
pub use reorder::{compute_order, reorder_document};
pub use split::{split_documents, OrderSplitRequest, SplitResult};
pub use stage::{Stage, StageOutcome, StageReport};
pub use summary::SummaryTables;

/// Parse PDF bytes and return page count
pub fn get_page_count(bytes: &[u8]) -> Result<usize, LabelCropError> {
    LabelDocument::load(bytes).map(|doc| doc.page_count())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_count_of_generated_pdf() {
        let pdf = test_support::label_pdf(&[vec!["one"], vec!["two"], vec!["three"]]);
        assert_eq!(get_page_count(&pdf).unwrap(), 3);
    }

    #[test]
    fn test_page_count_of_garbage_fails() {
        assert!(matches!(get_page_count(b"%PDF-"), Err(LabelCropError::ParseError(_))));
    }
}
