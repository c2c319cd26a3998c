//! Page rasterization and raster encoding
//!
//! Rendering a PDF page to pixels needs a real PDF renderer. That sits behind
//! the [`PageRasterizer`] trait so the cropper can be driven by pdfium in
//! production (cargo feature `pdfium`) and by a synthetic renderer in tests.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::codecs::jpeg::JpegEncoder;
use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::error::LabelCropError;

/// Renders whole pages of a serialized PDF to 8-bit grayscale bitmaps.
pub trait PageRasterizer: Send + Sync {
    /// Backend identifier, for logs
    fn name(&self) -> &'static str;

    /// Parse `pdf` once for rendering any number of its pages.
    fn open<'a>(&'a self, pdf: &'a [u8]) -> Result<Box<dyn RenderSession + 'a>, LabelCropError>;
}

/// One opened document. Pages are rendered from the calling thread only.
pub trait RenderSession {
    /// Render page `index` (zero-based) at `scale` pixels per point.
    ///
    /// The bitmap covers the page's visible box with row 0 at the top edge.
    fn render_page(&self, index: usize, scale: f64) -> Result<GrayImage, LabelCropError>;
}

/// How cropped rasters are stored in the output PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RasterEncoding {
    /// Lossy DCTDecode at the given quality (1-100)
    Jpeg { quality: u8 },
    /// Lossless FlateDecode of the raw gray samples
    Flate,
}

impl Default for RasterEncoding {
    fn default() -> Self {
        RasterEncoding::Jpeg { quality: 60 }
    }
}

/// An encoded grayscale image ready to embed as an image XObject.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedRaster {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    /// PDF filter name matching `data`
    pub filter: &'static str,
}

pub fn encode_gray(image: &GrayImage, encoding: RasterEncoding) -> Result<EncodedRaster, LabelCropError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(LabelCropError::EncodeError(format!(
            "Cannot encode empty raster {}x{}",
            width, height
        )));
    }

    match encoding {
        RasterEncoding::Jpeg { quality } => {
            let mut data = Vec::new();
            let mut encoder = JpegEncoder::new_with_quality(&mut data, quality.clamp(1, 100));
            encoder
                .encode_image(image)
                .map_err(|e| LabelCropError::EncodeError(e.to_string()))?;
            Ok(EncodedRaster {
                width,
                height,
                data,
                filter: "DCTDecode",
            })
        }
        RasterEncoding::Flate => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
            encoder
                .write_all(image.as_raw())
                .map_err(|e| LabelCropError::EncodeError(e.to_string()))?;
            let data = encoder
                .finish()
                .map_err(|e| LabelCropError::EncodeError(e.to_string()))?;
            Ok(EncodedRaster {
                width,
                height,
                data,
                filter: "FlateDecode",
            })
        }
    }
}

#[cfg(feature = "pdfium")]
pub use self::pdfium_backend::PdfiumRasterizer;

#[cfg(feature = "pdfium")]
mod pdfium_backend {
    use image::GrayImage;
    use pdfium_render::prelude::*;

    use super::{PageRasterizer, RenderSession};
    use crate::error::LabelCropError;

    /// Rasterizer backed by a pdfium shared library.
    ///
    /// Needs pdfium-render's `sync` feature so the bindings can be shared
    /// with the pipeline's worker threads.
    pub struct PdfiumRasterizer {
        pdfium: Pdfium,
    }

    impl PdfiumRasterizer {
        /// Bind pdfium from the working directory, then from the system library path.
        pub fn new() -> Result<Self, LabelCropError> {
            let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library())
                .map_err(|e| LabelCropError::RenderError(format!("Failed to bind pdfium library: {}", e)))?;
            Ok(Self {
                pdfium: Pdfium::new(bindings),
            })
        }
    }

    impl PageRasterizer for PdfiumRasterizer {
        fn name(&self) -> &'static str {
            "pdfium"
        }

        fn open<'a>(&'a self, pdf: &'a [u8]) -> Result<Box<dyn RenderSession + 'a>, LabelCropError> {
            let document = self
                .pdfium
                .load_pdf_from_byte_slice(pdf, None)
                .map_err(|e| LabelCropError::RenderError(format!("pdfium could not open document: {}", e)))?;
            Ok(Box::new(PdfiumSession { document }))
        }
    }

    struct PdfiumSession<'a> {
        document: PdfDocument<'a>,
    }

    impl RenderSession for PdfiumSession<'_> {
        fn render_page(&self, index: usize, scale: f64) -> Result<GrayImage, LabelCropError> {
            let page_index = u16::try_from(index).map_err(|_| LabelCropError::PageOutOfRange(index))?;
            let page = self
                .document
                .pages()
                .get(page_index)
                .map_err(|e| LabelCropError::RenderError(format!("pdfium could not load page {}: {}", index, e)))?;

            let pixel_width = (f64::from(page.width().value) * scale).round().max(1.0) as i32;
            let pixel_height = (f64::from(page.height().value) * scale).round().max(1.0) as i32;

            let bitmap = page
                .render_with_config(
                    &PdfRenderConfig::new()
                        .set_target_width(pixel_width)
                        .set_target_height(pixel_height)
                        .render_form_data(true)
                        .render_annotations(true),
                )
                .map_err(|e| LabelCropError::RenderError(format!("Failed to render page {}: {}", index, e)))?;

            Ok(bitmap.as_image().to_luma8())
        }
    }

}
