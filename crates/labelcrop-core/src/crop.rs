//! Whitespace cropper
//!
//! Each page is replaced by a raster of its content region: the union of its
//! word boxes (or of its painted blocks when it has no text), grown by a
//! margin and clamped to the page. Pages that cannot be cropped are copied
//! through unchanged.

use image::{imageops, GrayImage};
use rayon::prelude::*;

use crate::config::CropConfig;
use crate::document::{DocumentBuilder, LabelDocument};
use crate::error::LabelCropError;
use crate::geometry::Rect;
use crate::raster::{encode_gray, EncodedRaster, PageRasterizer};
use crate::stage::StageOutcome;

const INVOICE_MARKER: &str = "tax invoice";

/// Region a page is cropped to.
///
/// `content` grown by `margin` and clamped to `page`. Falls back to the whole
/// page when there is no content or the clamped box is empty.
pub fn crop_region(content: Option<Rect>, page: Rect, margin: f64) -> Rect {
    let Some(content) = content else {
        return page;
    };
    let clip = content.expand(margin).intersect(&page);
    if clip.is_empty() {
        page
    } else {
        clip
    }
}

/// Pixel window `(x, y, width, height)` of `clip` in a bitmap of `page`
/// rendered at `scale`, row 0 at the top. Clamped to the bitmap.
pub fn pixel_window(clip: Rect, page: Rect, scale: f64, bitmap: (u32, u32)) -> (u32, u32, u32, u32) {
    let (bw, bh) = bitmap;
    let to_px = |v: f64, limit: u32| (v.max(0.0).round() as u32).min(limit);
    let x = to_px((clip.x0 - page.x0) * scale, bw.saturating_sub(1));
    let y = to_px((page.y1 - clip.y1) * scale, bh.saturating_sub(1));
    let w = to_px(clip.width() * scale, bw - x).max(1);
    let h = to_px(clip.height() * scale, bh - y).max(1);
    (x, y, w, h)
}

/// Where a page's content sits, found before anything is rendered.
#[derive(Debug, Clone, Copy)]
struct Region {
    clip: Rect,
    page: Rect,
}

/// A page after rendering, before encoding.
enum Staged {
    Keep,
    Failed(String),
    Bitmap { clip: Rect, image: GrayImage },
}

enum PagePlan {
    Copy { failure: Option<String> },
    Raster { width: f64, height: f64, image: EncodedRaster },
}

pub struct PageCropper<'a> {
    config: &'a CropConfig,
    rasterizer: Option<&'a dyn PageRasterizer>,
    keep_invoice_uncropped: bool,
}

impl<'a> PageCropper<'a> {
    pub fn new(config: &'a CropConfig, rasterizer: Option<&'a dyn PageRasterizer>) -> Self {
        Self {
            config,
            rasterizer,
            keep_invoice_uncropped: false,
        }
    }

    pub fn keep_invoice_uncropped(mut self, keep: bool) -> Self {
        self.keep_invoice_uncropped = keep;
        self
    }

    /// Crop every page of `doc`, keeping page count and order.
    ///
    /// Content regions are located and rasters encoded on the rayon pool.
    /// The document is opened for rendering once and its pages are drawn in
    /// order on the calling thread.
    pub fn crop(&self, doc: &LabelDocument) -> Result<(LabelDocument, StageOutcome), LabelCropError> {
        let Some(rasterizer) = self.rasterizer else {
            return Ok((copy_all(doc)?, StageOutcome::degraded("no rasterizer available")));
        };

        let source = match doc.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                return Ok((
                    copy_all(doc)?,
                    StageOutcome::degraded(format!("cannot serialize document for rendering: {}", e)),
                ))
            }
        };
        let session = match rasterizer.open(&source) {
            Ok(session) => session,
            Err(e) => {
                return Ok((
                    copy_all(doc)?,
                    StageOutcome::degraded(format!("cannot open document for rendering: {}", e)),
                ))
            }
        };

        tracing::info!(
            pages = doc.page_count(),
            dpi = self.config.dpi,
            rasterizer = rasterizer.name(),
            "Cropping pages"
        );

        let regions: Vec<Result<Option<Region>, LabelCropError>> = (0..doc.page_count())
            .into_par_iter()
            .map(|index| self.locate(doc, index))
            .collect();

        let scale = self.config.scale();
        let staged: Vec<Staged> = regions
            .into_iter()
            .enumerate()
            .map(|(index, region)| match region {
                Ok(None) => Staged::Keep,
                Ok(Some(region)) => match session.render_page(index, scale) {
                    Ok(full) => Staged::Bitmap {
                        clip: region.clip,
                        image: crop_bitmap(&full, region.clip, region.page, scale),
                    },
                    Err(e) => Staged::Failed(e.to_string()),
                },
                Err(e) => Staged::Failed(e.to_string()),
            })
            .collect();
        drop(session);

        let plans: Vec<PagePlan> = staged
            .into_par_iter()
            .enumerate()
            .map(|(index, page)| self.encode(index, page))
            .collect();

        let mut builder = DocumentBuilder::new();
        let mut failed = Vec::new();
        for (index, plan) in plans.into_iter().enumerate() {
            match plan {
                PagePlan::Raster { width, height, image } => builder.push_image_page(width, height, &image),
                PagePlan::Copy { failure } => {
                    if let Some(reason) = failure {
                        tracing::warn!(page = index, %reason, "Page copied uncropped");
                        failed.push(index);
                    }
                    builder.push_copy(doc, index)?;
                }
            }
        }

        let outcome = if failed.is_empty() {
            StageOutcome::Applied
        } else {
            StageOutcome::degraded(format!("pages {:?} could not be cropped", failed))
        };
        Ok((builder.finish()?, outcome))
    }

    /// Crop region of page `index`, or `None` when the page stays as it is.
    fn locate(&self, doc: &LabelDocument, index: usize) -> Result<Option<Region>, LabelCropError> {
        if self.keep_invoice_uncropped && is_invoice_page(doc, index) {
            tracing::debug!(page = index, "Keeping invoice page uncropped");
            return Ok(None);
        }
        let page = doc.page_rect(index)?;
        let content = doc.page_layout(index)?.content_bbox();
        Ok(Some(Region {
            clip: crop_region(content, page, self.config.margin),
            page,
        }))
    }

    fn encode(&self, index: usize, page: Staged) -> PagePlan {
        match page {
            Staged::Keep => PagePlan::Copy { failure: None },
            Staged::Failed(reason) => PagePlan::Copy { failure: Some(reason) },
            Staged::Bitmap { clip, image } => match encode_gray(&image, self.config.encoding) {
                Ok(image) => {
                    tracing::debug!(
                        page = index,
                        width = clip.width(),
                        height = clip.height(),
                        bytes = image.data.len(),
                        "Cropped page"
                    );
                    PagePlan::Raster {
                        width: clip.width(),
                        height: clip.height(),
                        image,
                    }
                }
                Err(e) => PagePlan::Copy {
                    failure: Some(e.to_string()),
                },
            },
        }
    }
}

fn crop_bitmap(full: &GrayImage, clip: Rect, page: Rect, scale: f64) -> GrayImage {
    let (x, y, w, h) = pixel_window(clip, page, scale, full.dimensions());
    imageops::crop_imm(full, x, y, w, h).to_image()
}

fn is_invoice_page(doc: &LabelDocument, index: usize) -> bool {
    doc.page_text(index)
        .map(|text| text.to_lowercase().contains(INVOICE_MARKER))
        .unwrap_or(false)
}

fn copy_all(doc: &LabelDocument) -> Result<LabelDocument, LabelCropError> {
    let indices: Vec<usize> = (0..doc.page_count()).collect();
    doc.select(&indices)
}
