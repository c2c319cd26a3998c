//! Page layout extraction
//!
//! Walks a page's content stream with the text and graphics state needed to
//! place glyphs, and produces:
//! - the page's plain text, one line per baseline, in content order
//! - word-level glyph boxes
//! - structural block boxes (painted paths and image XObjects)
//!
//! Form XObjects are followed recursively with their own resources and matrix.

use std::collections::HashMap;

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::error::LabelCropError;
use crate::fonts::FontInfo;
use crate::geometry::{Matrix, Rect};
use crate::pdf_util::{inherited, number, page_content, resolve, stream_bytes};

/// Maximum Form XObject nesting followed while walking
const MAX_FORM_DEPTH: usize = 8;

/// Glyph extent above and below the baseline, as a fraction of the font size
const ASCENT: f64 = 0.8;
const DESCENT: f64 = 0.2;

/// TJ adjustments below this (thousandths of an em) read as a word gap
const TJ_SPACE_THRESHOLD: f64 = -100.0;

/// Horizontal gap, in ems, past which a run on the same baseline is read
/// as the next table column and starts its own line.
const COLUMN_GAP_EMS: f64 = 1.5;

/// A word and its box in page space.
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub text: String,
    pub bbox: Rect,
}

/// Everything derived from a page's content that the pipeline needs.
#[derive(Debug, Clone, Default)]
pub struct PageLayout {
    pub text: String,
    pub words: Vec<Word>,
    pub blocks: Vec<Rect>,
}

impl PageLayout {
    /// Union of word boxes, or of block boxes when the page has no words.
    pub fn content_bbox(&self) -> Option<Rect> {
        let words: Vec<Rect> = self.words.iter().map(|w| w.bbox).collect();
        Rect::union_all(&words).or_else(|| Rect::union_all(&self.blocks))
    }
}

/// Extract the layout of one page.
pub fn extract_page_layout(doc: &Document, page_id: ObjectId) -> Result<PageLayout, LabelCropError> {
    let data = page_content(doc, page_id)?;
    let resources = inherited(doc, page_id, b"Resources")
        .map(|o| resolve(doc, o))
        .and_then(|o| o.as_dict().ok());

    let mut walker = Walker::new(doc);
    walker.walk(&data, resources, Matrix::IDENTITY, 0)?;
    let layout = walker.finish();

    tracing::trace!(
        page = ?page_id,
        words = layout.words.len(),
        blocks = layout.blocks.len(),
        "Extracted page layout"
    );
    Ok(layout)
}

#[derive(Debug, Clone, Copy)]
struct GraphicsState {
    ctm: Matrix,
}

#[derive(Debug, Clone)]
struct TextState {
    tm: Matrix,
    tlm: Matrix,
    font_size: f64,
    char_spacing: f64,
    word_spacing: f64,
    horizontal_scale: f64,
    leading: f64,
    rise: f64,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            tm: Matrix::IDENTITY,
            tlm: Matrix::IDENTITY,
            font_size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

/// A line under construction: baseline and the right edge of its last run.
struct OpenLine {
    baseline: f64,
    end_x: f64,
    size: f64,
}

struct Walker<'a> {
    doc: &'a Document,
    fonts: HashMap<Vec<u8>, FontInfo>,
    gs: GraphicsState,
    gs_stack: Vec<GraphicsState>,
    ts: TextState,
    font: Option<Vec<u8>>,
    path: Option<Rect>,
    lines: Vec<String>,
    open_line: Option<OpenLine>,
    words: Vec<Word>,
    blocks: Vec<Rect>,
}

impl<'a> Walker<'a> {
    fn new(doc: &'a Document) -> Self {
        Self {
            doc,
            fonts: HashMap::new(),
            gs: GraphicsState { ctm: Matrix::IDENTITY },
            gs_stack: Vec::new(),
            ts: TextState::default(),
            font: None,
            path: None,
            lines: Vec::new(),
            open_line: None,
            words: Vec::new(),
            blocks: Vec::new(),
        }
    }

    fn finish(self) -> PageLayout {
        let text = self
            .lines
            .iter()
            .map(|l| l.trim_end())
            .collect::<Vec<_>>()
            .join("\n");
        PageLayout {
            text,
            words: self.words,
            blocks: self.blocks,
        }
    }

    fn walk(
        &mut self,
        data: &[u8],
        resources: Option<&'a Dictionary>,
        base: Matrix,
        depth: usize,
    ) -> Result<(), LabelCropError> {
        let content = Content::decode(data)
            .map_err(|e| LabelCropError::LayoutError(format!("Cannot parse content stream: {}", e)))?;

        // Font caches are keyed by resource name, which is only unique per scope
        let saved_fonts = std::mem::take(&mut self.fonts);
        let saved_gs = self.gs;
        let saved_stack = std::mem::take(&mut self.gs_stack);
        self.gs.ctm = base;

        for op in &content.operations {
            let args = &op.operands;
            match op.operator.as_str() {
                "q" => self.gs_stack.push(self.gs),
                "Q" => {
                    if let Some(gs) = self.gs_stack.pop() {
                        self.gs = gs;
                    }
                }
                "cm" => {
                    if let Some(m) = matrix_arg(args) {
                        self.gs.ctm = m.then(&self.gs.ctm);
                    }
                }
                "BT" => {
                    self.ts.tm = Matrix::IDENTITY;
                    self.ts.tlm = Matrix::IDENTITY;
                }
                "ET" => {}
                "Tf" => {
                    self.font = args.first().and_then(|o| o.as_name().ok()).map(<[u8]>::to_vec);
                    self.ts.font_size = args.get(1).and_then(number).unwrap_or(0.0);
                    if let (Some(name), Some(res)) = (self.font.clone(), resources) {
                        self.load_font(res, &name);
                    }
                }
                "Tc" => self.ts.char_spacing = num_arg(args, 0),
                "Tw" => self.ts.word_spacing = num_arg(args, 0),
                "Tz" => self.ts.horizontal_scale = num_arg(args, 0) / 100.0,
                "TL" => self.ts.leading = num_arg(args, 0),
                "Ts" => self.ts.rise = num_arg(args, 0),
                "Td" => self.next_line(num_arg(args, 0), num_arg(args, 1)),
                "TD" => {
                    self.ts.leading = -num_arg(args, 1);
                    self.next_line(num_arg(args, 0), num_arg(args, 1));
                }
                "Tm" => {
                    if let Some(m) = matrix_arg(args) {
                        self.ts.tm = m;
                        self.ts.tlm = m;
                    }
                }
                "T*" => self.next_line(0.0, -self.ts.leading),
                "Tj" => {
                    if let Some(Object::String(bytes, _)) = args.first() {
                        self.show(&[ShowItem::Text(bytes)]);
                    }
                }
                "'" => {
                    self.next_line(0.0, -self.ts.leading);
                    if let Some(Object::String(bytes, _)) = args.first() {
                        self.show(&[ShowItem::Text(bytes)]);
                    }
                }
                "\"" => {
                    self.ts.word_spacing = num_arg(args, 0);
                    self.ts.char_spacing = num_arg(args, 1);
                    self.next_line(0.0, -self.ts.leading);
                    if let Some(Object::String(bytes, _)) = args.get(2) {
                        self.show(&[ShowItem::Text(bytes)]);
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = args.first() {
                        let parts: Vec<ShowItem<'_>> = items
                            .iter()
                            .filter_map(|o| match o {
                                Object::String(bytes, _) => Some(ShowItem::Text(bytes)),
                                other => number(other).map(ShowItem::Adjust),
                            })
                            .collect();
                        self.show(&parts);
                    }
                }
                "m" | "l" => {
                    if let (Some(x), Some(y)) = (args.first().and_then(number), args.get(1).and_then(number)) {
                        self.extend_path(Rect::new(x, y, x, y));
                    }
                }
                "c" | "v" | "y" => {
                    let coords: Vec<f64> = args.iter().filter_map(number).collect();
                    for pair in coords.chunks(2) {
                        if let [x, y] = pair {
                            self.extend_path(Rect::new(*x, *y, *x, *y));
                        }
                    }
                }
                "re" => {
                    let coords: Vec<f64> = args.iter().filter_map(number).collect();
                    if let &[x, y, w, h] = coords.as_slice() {
                        self.extend_path(Rect::from_corners(x, y, x + w, y + h));
                    }
                }
                "S" | "s" | "f" | "F" | "f*" | "B" | "B*" | "b" | "b*" => {
                    if let Some(path) = self.path.take() {
                        self.blocks.push(path);
                    }
                }
                "n" => self.path = None,
                "Do" => {
                    if let (Some(name), Some(res)) = (args.first().and_then(|o| o.as_name().ok()), resources) {
                        self.draw_xobject(res, name, depth)?;
                    }
                }
                _ => {}
            }
        }

        self.fonts = saved_fonts;
        self.gs = saved_gs;
        self.gs_stack = saved_stack;
        Ok(())
    }

    fn load_font(&mut self, resources: &Dictionary, name: &[u8]) {
        if self.fonts.contains_key(name) {
            return;
        }
        let info = resources
            .get(b"Font")
            .ok()
            .map(|o| resolve(self.doc, o))
            .and_then(|o| o.as_dict().ok())
            .and_then(|fonts| fonts.get(name).ok())
            .map(|o| resolve(self.doc, o))
            .and_then(|o| o.as_dict().ok())
            .map(|font| FontInfo::from_dict(self.doc, font))
            .unwrap_or_else(FontInfo::fallback);
        self.fonts.insert(name.to_vec(), info);
    }

    fn next_line(&mut self, tx: f64, ty: f64) {
        self.ts.tlm = Matrix::translate(tx, ty).then(&self.ts.tlm);
        self.ts.tm = self.ts.tlm;
    }

    fn extend_path(&mut self, local: Rect) {
        let r = self.gs.ctm.transform_rect(&local);
        self.path = Some(match self.path {
            Some(p) => p.union(&r),
            None => r,
        });
    }

    fn draw_xobject(
        &mut self,
        resources: &'a Dictionary,
        name: &[u8],
        depth: usize,
    ) -> Result<(), LabelCropError> {
        let doc = self.doc;
        let Some(stream) = resources
            .get(b"XObject")
            .ok()
            .map(|o| resolve(doc, o))
            .and_then(|o| o.as_dict().ok())
            .and_then(|x| x.get(name).ok())
            .map(|o| resolve(doc, o))
            .and_then(|o| o.as_stream().ok())
        else {
            return Ok(());
        };

        let subtype = stream.dict.get(b"Subtype").ok().and_then(|o| o.as_name().ok());
        match subtype {
            Some(b"Image") => {
                let unit = Rect::new(0.0, 0.0, 1.0, 1.0);
                self.blocks.push(self.gs.ctm.transform_rect(&unit));
            }
            Some(b"Form") if depth < MAX_FORM_DEPTH => {
                let form_matrix = stream
                    .dict
                    .get(b"Matrix")
                    .ok()
                    .map(|o| resolve(doc, o))
                    .and_then(|o| o.as_array().ok())
                    .and_then(|a| matrix_arg(a))
                    .unwrap_or(Matrix::IDENTITY);
                let form_resources = stream
                    .dict
                    .get(b"Resources")
                    .ok()
                    .map(|o| resolve(doc, o))
                    .and_then(|o| o.as_dict().ok())
                    .or(Some(resources));
                let data = stream_bytes(stream)?;
                let saved_ts = self.ts.clone();
                let saved_font = self.font.clone();
                self.walk(&data, form_resources, form_matrix.then(&self.gs.ctm), depth + 1)?;
                self.ts = saved_ts;
                self.font = saved_font;
            }
            _ => {}
        }
        Ok(())
    }

    fn show(&mut self, items: &[ShowItem<'_>]) {
        let fallback = FontInfo::fallback();
        let font = self
            .font
            .as_ref()
            .and_then(|name| self.fonts.get(name))
            .unwrap_or(&fallback);
        let ctm = self.gs.ctm;
        let ts = self.ts.clone();
        let fs = ts.font_size;
        let th = ts.horizontal_scale;

        let mut run = String::new();
        let mut run_start: Option<(f64, f64)> = None;
        let mut words = Vec::new();
        let mut word = String::new();
        let mut word_box: Option<Rect> = None;
        let mut tm = ts.tm;

        for item in items {
            match item {
                ShowItem::Adjust(n) => {
                    if *n < TJ_SPACE_THRESHOLD {
                        run.push(' ');
                        flush_word(&mut words, &mut word, &mut word_box);
                    }
                    let tx = -n / 1000.0 * fs * th;
                    tm = Matrix::translate(tx, 0.0).then(&tm);
                }
                ShowItem::Text(bytes) => {
                    for glyph in font.decode(bytes) {
                        let w0 = glyph.width / 1000.0;
                        let device = tm.then(&ctm);
                        if run_start.is_none() {
                            run_start = Some(device.apply(0.0, ts.rise));
                        }

                        if glyph.text.trim().is_empty() {
                            flush_word(&mut words, &mut word, &mut word_box);
                            if !glyph.text.is_empty() {
                                run.push(' ');
                            }
                        } else {
                            let local = Rect::new(
                                0.0,
                                ts.rise - DESCENT * fs,
                                w0 * fs * th,
                                ts.rise + ASCENT * fs,
                            );
                            let gb = device.transform_rect(&local);
                            word_box = Some(word_box.map_or(gb, |b| b.union(&gb)));
                            word.push_str(&glyph.text);
                            run.push_str(&glyph.text);
                        }

                        let spacing = if glyph.is_space_code { ts.word_spacing } else { 0.0 };
                        let tx = (w0 * fs + ts.char_spacing + spacing) * th;
                        tm = Matrix::translate(tx, 0.0).then(&tm);
                    }
                }
            }
        }
        flush_word(&mut words, &mut word, &mut word_box);

        self.words.extend(words);
        self.ts.tm = tm;

        if let Some((x, y)) = run_start {
            let device = tm.then(&ctm);
            let end_x = device.apply(0.0, ts.rise).0;
            let size = fs * device.vertical_scale();
            self.place_run(run, x, y, end_x, size);
        }
    }

    /// Append a run to the current line, or start a new line when the
    /// baseline moves or the run sits a table column away.
    fn place_run(&mut self, run: String, x: f64, baseline: f64, end_x: f64, size: f64) {
        let tolerance = (size * 0.3).max(1.0);
        let joins = self.open_line.as_ref().is_some_and(|line| {
            (line.baseline - baseline).abs() <= tolerance
                && x - line.end_x <= line.size.max(size) * COLUMN_GAP_EMS
        });

        if joins {
            if let (Some(line), Some(current)) = (self.open_line.as_mut(), self.lines.last_mut()) {
                let gap = x - line.end_x;
                if gap > line.size.max(size) * 0.25 && !current.ends_with(' ') && !run.starts_with(' ') {
                    current.push(' ');
                }
                current.push_str(&run);
                line.end_x = end_x;
                line.size = size;
                return;
            }
        }

        self.lines.push(run);
        self.open_line = Some(OpenLine {
            baseline,
            end_x,
            size,
        });
    }
}

fn flush_word(words: &mut Vec<Word>, word: &mut String, word_box: &mut Option<Rect>) {
    if let Some(bbox) = word_box.take() {
        if !word.is_empty() {
            words.push(Word {
                text: std::mem::take(word),
                bbox,
            });
        }
    }
    word.clear();
}

enum ShowItem<'b> {
    Text(&'b [u8]),
    Adjust(f64),
}

fn num_arg(args: &[Object], i: usize) -> f64 {
    args.get(i).and_then(number).unwrap_or(0.0)
}

fn matrix_arg(args: &[Object]) -> Option<Matrix> {
    if args.len() < 6 {
        return None;
    }
    let mut m = [0.0; 6];
    for (slot, obj) in m.iter_mut().zip(args) {
        *slot = number(obj)?;
    }
    Some(Matrix(m))
}
