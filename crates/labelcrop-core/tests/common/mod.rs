//! Shared fixtures for labelcrop-core integration tests

#![allow(dead_code)]

use image::{GrayImage, Luma};
use labelcrop_core::{LabelCropError, LabelDocument, PageRasterizer, RenderSession};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

pub const PAGE_WIDTH: i64 = 400;
pub const PAGE_HEIGHT: i64 = 600;
pub const FONT_SIZE: i64 = 10;

/// Text placed at an explicit position on a page.
#[derive(Debug, Clone)]
pub struct Placed {
    pub x: i64,
    pub y: i64,
    pub text: String,
}

/// Build a PDF from pages of positioned text runs (Helvetica, 10pt).
pub fn positioned_pdf(pages: &[Vec<Placed>]) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids = Vec::new();
    for runs in pages {
        let mut operations = Vec::new();
        for run in runs {
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec!["F1".into(), FONT_SIZE.into()]));
            operations.push(Operation::new("Td", vec![run.x.into(), run.y.into()]));
            operations.push(Operation::new("Tj", vec![Object::string_literal(run.text.as_str())]));
            operations.push(Operation::new("ET", vec![]));
        }
        let content = Content { operations }.encode().unwrap();
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

/// One page per entry, lines stacked from the top-left corner.
pub fn text_pdf(pages: &[Vec<String>]) -> Vec<u8> {
    let placed: Vec<Vec<Placed>> = pages
        .iter()
        .map(|lines| {
            lines
                .iter()
                .enumerate()
                .map(|(row, text)| Placed {
                    x: 20,
                    y: PAGE_HEIGHT - 40 - 14 * row as i64,
                    text: text.clone(),
                })
                .collect()
        })
        .collect();
    positioned_pdf(&placed)
}

/// Fields printed on a shipping label.
#[derive(Debug, Clone)]
pub struct Label<'a> {
    pub courier: &'a str,
    pub sku: &'a str,
    pub size: &'a str,
    pub qty: u32,
    pub color: &'a str,
    pub order_no: &'a str,
    pub seller: &'a str,
}

impl Default for Label<'_> {
    fn default() -> Self {
        Self {
            courier: "Delhivery",
            sku: "KURTA-RED",
            size: "XL",
            qty: 1,
            color: "Red",
            order_no: "100200300_1",
            seller: "Acme Traders",
        }
    }
}

impl Label<'_> {
    /// Text lines in the order the label generator prints them.
    pub fn lines(&self) -> Vec<String> {
        vec![
            "Customer Address".to_string(),
            "Pickup".to_string(),
            self.courier.to_string(),
            "Product Details".to_string(),
            "SKU".to_string(),
            "Size".to_string(),
            "Qty".to_string(),
            "Color".to_string(),
            "Order No.".to_string(),
            self.sku.to_string(),
            self.size.to_string(),
            self.qty.to_string(),
            self.color.to_string(),
            self.order_no.to_string(),
            "TAX INVOICE".to_string(),
            format!("Sold by : {}", self.seller),
        ]
    }
}

pub fn label_pdf(labels: &[Label<'_>]) -> Vec<u8> {
    let pages: Vec<Vec<String>> = labels.iter().map(Label::lines).collect();
    text_pdf(&pages)
}

pub fn page_texts(doc: &LabelDocument) -> Vec<String> {
    (0..doc.page_count())
        .map(|i| doc.page_text(i).unwrap().to_string())
        .collect()
}

/// Renders every page as a white bitmap covering the page box.
pub struct WhiteRasterizer;

pub struct WhiteSession {
    doc: LabelDocument,
}

impl PageRasterizer for WhiteRasterizer {
    fn name(&self) -> &'static str {
        "white"
    }

    fn open<'a>(&'a self, pdf: &'a [u8]) -> Result<Box<dyn RenderSession + 'a>, LabelCropError> {
        Ok(Box::new(WhiteSession {
            doc: LabelDocument::load(pdf)?,
        }))
    }
}

impl RenderSession for WhiteSession {
    fn render_page(&self, index: usize, scale: f64) -> Result<GrayImage, LabelCropError> {
        let rect = self.doc.page_rect(index)?;
        let width = (rect.width() * scale).round().max(1.0) as u32;
        let height = (rect.height() * scale).round().max(1.0) as u32;
        Ok(GrayImage::from_pixel(width, height, Luma([255])))
    }
}
