//! Summary report rendering
//!
//! Draws the three summary tables onto A4 pages with the standard Helvetica
//! fonts. Tables that run past the bottom margin continue on a new page
//! under a repeated header row.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Object, StringFormat};

use crate::document::{DocumentBuilder, LabelDocument};
use crate::error::LabelCropError;
use crate::summary::SummaryTables;

pub const REPORT_TITLE: &str = "Shipping Label Summary Report";

const PAGE_WIDTH: f64 = 595.0;
const PAGE_HEIGHT: f64 = 842.0;
const MARGIN: f64 = 30.0;

const TITLE_SIZE: f64 = 18.0;
const HEADING_SIZE: f64 = 13.0;
const BODY_SIZE: f64 = 10.0;
const ROW_HEIGHT: f64 = 18.0;
/// Average Helvetica advance, in ems, used to center and fit cell text
const AVG_GLYPH_WIDTH: f64 = 0.5;

const ORDER_COLUMNS: [(&str, f64); 5] = [
    ("ORD", 60.0),
    ("QTY", 60.0),
    ("Size", 80.0),
    ("Color", 80.0),
    ("SKU", 200.0),
];
const COURIER_COLUMNS: [(&str, f64); 2] = [("Courier Partner", 300.0), ("Package", 100.0)];
const COMPANY_COLUMNS: [(&str, f64); 2] = [("Sold By", 300.0), ("Package", 100.0)];

const REGULAR: &str = "F1";
const BOLD: &str = "F2";

#[derive(Debug, Clone, Copy, PartialEq)]
enum RowStyle {
    Header,
    Body,
    Total,
}

impl RowStyle {
    /// Fill gray level, `None` for unfilled rows
    fn fill(self) -> Option<f64> {
        match self {
            RowStyle::Header => Some(0.5),
            RowStyle::Body => None,
            RowStyle::Total => Some(0.83),
        }
    }

    fn font(self) -> &'static str {
        match self {
            RowStyle::Body => REGULAR,
            RowStyle::Header | RowStyle::Total => BOLD,
        }
    }

    fn text_gray(self) -> f64 {
        match self {
            RowStyle::Header => 1.0,
            RowStyle::Body | RowStyle::Total => 0.0,
        }
    }
}

fn real(v: f64) -> Object {
    Object::Real(v as _)
}

/// WinAnsi bytes for `text`; characters outside Latin-1 become '?'.
fn latin1(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

fn fit_to_width(text: &str, width: f64, size: f64) -> String {
    let max_chars = ((width - 6.0) / (size * AVG_GLYPH_WIDTH)).floor().max(1.0) as usize;
    text.chars().take(max_chars).collect()
}

struct ReportWriter {
    pages: Vec<Vec<Operation>>,
    ops: Vec<Operation>,
    y: f64,
}

impl ReportWriter {
    fn new() -> Self {
        Self {
            pages: Vec::new(),
            ops: Vec::new(),
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn new_page(&mut self) {
        self.pages.push(std::mem::take(&mut self.ops));
        self.y = PAGE_HEIGHT - MARGIN;
    }

    fn fits(&self, height: f64) -> bool {
        self.y - height >= MARGIN
    }

    fn text(&mut self, font: &str, size: f64, x: f64, y: f64, text: &str) {
        self.ops.push(Operation::new("BT", vec![]));
        self.ops
            .push(Operation::new("Tf", vec![Object::Name(font.as_bytes().to_vec()), real(size)]));
        self.ops.push(Operation::new("Td", vec![real(x), real(y)]));
        self.ops.push(Operation::new(
            "Tj",
            vec![Object::String(latin1(text), StringFormat::Literal)],
        ));
        self.ops.push(Operation::new("ET", vec![]));
    }

    fn rect(&mut self, x: f64, y: f64, w: f64, h: f64, op: &str) {
        self.ops
            .push(Operation::new("re", vec![real(x), real(y), real(w), real(h)]));
        self.ops.push(Operation::new(op, vec![]));
    }

    fn title(&mut self, text: &str) {
        self.y -= TITLE_SIZE;
        self.text(BOLD, TITLE_SIZE, MARGIN, self.y, text);
        self.y -= 21.6;
    }

    /// Section heading, kept on the same page as the first rows of its table.
    fn heading(&mut self, text: &str) {
        if !self.fits(HEADING_SIZE + 14.4 + 2.0 * ROW_HEIGHT) {
            self.new_page();
        }
        self.y -= HEADING_SIZE;
        self.text(BOLD, HEADING_SIZE, MARGIN, self.y, text);
        self.y -= 14.4;
    }

    fn row(&mut self, columns: &[(&str, f64)], cells: &[String], style: RowStyle) {
        let table_width: f64 = columns.iter().map(|(_, w)| w).sum();
        let mut x = MARGIN + (PAGE_WIDTH - 2.0 * MARGIN - table_width) / 2.0;
        let bottom = self.y - ROW_HEIGHT;

        self.ops.push(Operation::new("q", vec![]));
        if let Some(gray) = style.fill() {
            self.ops.push(Operation::new("g", vec![real(gray)]));
            self.rect(x, bottom, table_width, ROW_HEIGHT, "f");
        }
        self.ops.push(Operation::new("G", vec![real(0.0)]));
        self.ops.push(Operation::new("w", vec![real(1.0)]));
        let mut cell_x = x;
        for (_, width) in columns {
            self.rect(cell_x, bottom, *width, ROW_HEIGHT, "S");
            cell_x += width;
        }

        self.ops.push(Operation::new("g", vec![real(style.text_gray())]));
        for ((_, width), cell) in columns.iter().zip(cells) {
            let text = fit_to_width(cell, *width, BODY_SIZE);
            if !text.is_empty() {
                let text_width = text.chars().count() as f64 * BODY_SIZE * AVG_GLYPH_WIDTH;
                let text_x = x + ((width - text_width) / 2.0).max(3.0);
                self.text(style.font(), BODY_SIZE, text_x, bottom + 5.0, &text);
            }
            x += width;
        }
        self.ops.push(Operation::new("Q", vec![]));
        self.y = bottom;
    }

    fn table(&mut self, columns: &[(&str, f64)], rows: &[Vec<String>], total: Option<Vec<String>>) {
        let header: Vec<String> = columns.iter().map(|(name, _)| name.to_string()).collect();
        self.row(columns, &header, RowStyle::Header);

        let body = rows.iter().map(|r| (r, RowStyle::Body));
        let total = total.as_ref().map(|r| (r, RowStyle::Total));
        for (cells, style) in body.chain(total) {
            if !self.fits(ROW_HEIGHT) {
                self.new_page();
                self.row(columns, &header, RowStyle::Header);
            }
            self.row(columns, cells, style);
        }
        self.y -= 36.0;
    }

    fn finish(mut self) -> Vec<Vec<Operation>> {
        if !self.ops.is_empty() {
            self.new_page();
        }
        self.pages
    }
}

/// Render the summary tables as a standalone document of report pages.
pub fn render_report(tables: &SummaryTables) -> Result<LabelDocument, LabelCropError> {
    let mut writer = ReportWriter::new();
    writer.title(REPORT_TITLE);

    writer.heading("1. ORDER SUMMARY TABLE");
    let order_rows: Vec<Vec<String>> = tables
        .orders
        .iter()
        .map(|r| {
            vec![
                r.orders.to_string(),
                r.qty.to_string(),
                r.size.clone(),
                r.color.clone(),
                r.sku.clone(),
            ]
        })
        .collect();
    let total_row = vec![
        format!("TOTAL: {}", tables.total_orders),
        tables.total_qty.to_string(),
        String::new(),
        String::new(),
        String::new(),
    ];
    writer.table(&ORDER_COLUMNS, &order_rows, Some(total_row));

    writer.heading("2. COURIER-WISE TOTAL PACKAGE");
    let courier_rows: Vec<Vec<String>> = tables
        .couriers
        .iter()
        .map(|r| vec![r.name.clone(), r.packages.to_string()])
        .collect();
    writer.table(&COURIER_COLUMNS, &courier_rows, None);

    writer.heading("3. COMPANY-WISE TOTAL PACKAGE");
    let company_rows: Vec<Vec<String>> = tables
        .companies
        .iter()
        .map(|r| vec![r.name.clone(), r.packages.to_string()])
        .collect();
    writer.table(&COMPANY_COLUMNS, &company_rows, None);

    let mut builder = DocumentBuilder::new();
    let regular = builder.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold = builder.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });

    for operations in writer.finish() {
        let content = Content { operations }
            .encode()
            .map_err(|e| LabelCropError::OperationError(format!("Cannot encode report page: {}", e)))?;
        builder.push_page_dict(
            dictionary! {
                "MediaBox" => vec![0.into(), 0.into(), real(PAGE_WIDTH), real(PAGE_HEIGHT)],
                "Resources" => dictionary! {
                    "Font" => dictionary! {
                        REGULAR => regular,
                        BOLD => bold,
                    },
                },
            },
            content,
        );
    }

    let report = builder.finish()?;
    tracing::info!(pages = report.page_count(), "Rendered summary report");
    Ok(report)
}
