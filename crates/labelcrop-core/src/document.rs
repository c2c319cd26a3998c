//! Label document model
//!
//! A [`LabelDocument`] is an ordered sequence of pages backed by a parsed
//! lopdf document. Page text and layout are derived lazily and cached per page.
//!
//! New documents are produced with [`DocumentBuilder`], which copies pages out
//! of any number of source documents:
//! 1. On first use of a source, import all of its objects with remapped IDs
//! 2. Materialise inherited page attributes on each copied page
//! 3. Re-parent copied pages under a fresh page tree
//! 4. Prune everything the new tree does not reach

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

use crate::error::LabelCropError;
use crate::geometry::Rect;
use crate::layout::{extract_page_layout, PageLayout};
use crate::pdf_util::{inherited, page_dict, page_rect, INHERITABLE_KEYS};
use crate::raster::EncodedRaster;

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

pub struct LabelDocument {
    id: u64,
    inner: Document,
    pages: Vec<ObjectId>,
    layouts: Vec<OnceLock<Result<PageLayout, String>>>,
}

impl std::fmt::Debug for LabelDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelDocument")
            .field("id", &self.id)
            .field("pages", &self.pages.len())
            .finish()
    }
}

impl LabelDocument {
    /// Parse PDF bytes.
    pub fn load(bytes: &[u8]) -> Result<Self, LabelCropError> {
        let doc = Document::load_mem(bytes).map_err(|e| LabelCropError::ParseError(e.to_string()))?;
        Ok(Self::from_lopdf(doc))
    }

    pub fn from_lopdf(inner: Document) -> Self {
        let pages: Vec<ObjectId> = inner.get_pages().values().copied().collect();
        let layouts = pages.iter().map(|_| OnceLock::new()).collect();
        Self {
            id: NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed),
            inner,
            pages,
            layouts,
        }
    }

    /// A document with no pages.
    pub fn empty() -> Result<Self, LabelCropError> {
        DocumentBuilder::new().finish()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn inner(&self) -> &Document {
        &self.inner
    }

    fn page_id(&self, index: usize) -> Result<ObjectId, LabelCropError> {
        self.pages
            .get(index)
            .copied()
            .ok_or(LabelCropError::PageOutOfRange(index))
    }

    /// Layout of a page, computed on first access.
    pub fn page_layout(&self, index: usize) -> Result<&PageLayout, LabelCropError> {
        let page_id = self.page_id(index)?;
        self.layouts[index]
            .get_or_init(|| extract_page_layout(&self.inner, page_id).map_err(|e| e.to_string()))
            .as_ref()
            .map_err(|e| LabelCropError::LayoutError(format!("Page {}: {}", index, e)))
    }

    pub fn page_text(&self, index: usize) -> Result<&str, LabelCropError> {
        self.page_layout(index).map(|l| l.text.as_str())
    }

    pub fn page_rect(&self, index: usize) -> Result<Rect, LabelCropError> {
        Ok(page_rect(&self.inner, self.page_id(index)?))
    }

    /// Serialize to PDF bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, LabelCropError> {
        let mut doc = self.inner.clone();
        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)
            .map_err(|e| LabelCropError::SaveError(e.to_string()))?;
        Ok(buffer)
    }

    /// New document holding copies of the given pages, in the given order.
    pub fn select(&self, indices: &[usize]) -> Result<LabelDocument, LabelCropError> {
        let mut builder = DocumentBuilder::new();
        for &index in indices {
            builder.push_copy(self, index)?;
        }
        builder.finish()
    }

    /// Concatenate every page of every document, in order.
    pub fn merge(documents: &[LabelDocument]) -> Result<LabelDocument, LabelCropError> {
        if documents.is_empty() {
            return Err(LabelCropError::NoInput);
        }
        let mut builder = DocumentBuilder::new();
        for doc in documents {
            for index in 0..doc.page_count() {
                builder.push_copy(doc, index)?;
            }
        }
        builder.finish()
    }
}

/// Assembles a new document from copied pages and freshly built raster pages.
pub struct DocumentBuilder {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<ObjectId>,
    offsets: HashMap<u64, u32>,
    placed: HashSet<ObjectId>,
}

impl Default for DocumentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentBuilder {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
            offsets: HashMap::new(),
            placed: HashSet::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    /// Import every object of `source` once, returning the ID offset applied.
    fn import(&mut self, source: &LabelDocument) -> u32 {
        if let Some(offset) = self.offsets.get(&source.id) {
            return *offset;
        }
        let offset = self.doc.max_id;
        for (old_id, object) in source.inner.objects.iter() {
            let new_id = (old_id.0 + offset, old_id.1);
            self.doc
                .objects
                .insert(new_id, remap_object_refs(object.clone(), offset));
        }
        self.doc.max_id = (source.inner.max_id + offset).max(self.doc.max_id);
        self.offsets.insert(source.id, offset);
        offset
    }

    /// Append a content-identical copy of `source` page `index`.
    pub fn push_copy(&mut self, source: &LabelDocument, index: usize) -> Result<(), LabelCropError> {
        let source_page = source.page_id(index)?;
        let offset = self.import(source);

        let mut page = page_dict(&source.inner, source_page)?.clone();
        for key in INHERITABLE_KEYS {
            if !page.has(key) {
                if let Some(value) = inherited(&source.inner, source_page, key) {
                    page.set(key.to_vec(), value.clone());
                }
            }
        }
        for (_, value) in page.iter_mut() {
            *value = remap_object_refs(std::mem::replace(value, Object::Null), offset);
        }
        page.set("Parent", Object::Reference(self.pages_id));

        let imported_id = (source_page.0 + offset, source_page.1);
        let page_id = if self.placed.insert(imported_id) {
            self.doc.objects.insert(imported_id, Object::Dictionary(page));
            imported_id
        } else {
            // Same page pushed twice: the second copy gets its own object
            self.doc.add_object(Object::Dictionary(page))
        };
        self.kids.push(page_id);
        Ok(())
    }

    /// Append a page of `width` x `height` points showing only `image`, stretched to fill it.
    pub fn push_image_page(&mut self, width: f64, height: f64, image: &EncodedRaster) {
        let image_dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => Object::Integer(i64::from(image.width)),
            "Height" => Object::Integer(i64::from(image.height)),
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
            "Filter" => Object::Name(image.filter.as_bytes().to_vec()),
        };
        let image_id = self.doc.add_object(Stream::new(image_dict, image.data.clone()));

        let content = format!("q {:.4} 0 0 {:.4} 0 0 cm /Im0 Do Q", width, height);
        let content_id = self
            .doc
            .add_object(Stream::new(Dictionary::new(), content.into_bytes()));

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![
                0.into(),
                0.into(),
                Object::Real(width as _),
                Object::Real(height as _),
            ],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
        });
        self.kids.push(page_id);
    }

    /// Add a shared object (fonts, images) for pages built by the caller.
    pub fn add_object<T: Into<Object>>(&mut self, object: T) -> ObjectId {
        self.doc.add_object(object)
    }

    /// Append an already-built page dictionary (used by the report renderer).
    pub fn push_page_dict(&mut self, mut page: Dictionary, content: Vec<u8>) {
        let content_id = self
            .doc
            .add_object(Stream::new(Dictionary::new(), content));
        page.set("Type", "Page");
        page.set("Parent", Object::Reference(self.pages_id));
        page.set("Contents", Object::Reference(content_id));
        let page_id = self.doc.add_object(page);
        self.kids.push(page_id);
    }

    pub fn finish(mut self) -> Result<LabelDocument, LabelCropError> {
        let kids: Vec<Object> = self.kids.iter().map(|&id| Object::Reference(id)).collect();
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => Object::Integer(self.kids.len() as i64),
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer = Dictionary::new();
        self.doc.trailer.set("Root", Object::Reference(catalog_id));

        // Drop objects only the source page trees reached
        self.doc.prune_objects();
        self.doc.renumber_objects();

        let doc = LabelDocument::from_lopdf(self.doc);
        if doc.page_count() != self.kids.len() {
            return Err(LabelCropError::OperationError(format!(
                "Assembled {} pages but page tree reports {}",
                self.kids.len(),
                doc.page_count()
            )));
        }
        Ok(doc)
    }
}

/// Recursively remap object references in an object
fn remap_object_refs(obj: Object, offset: u32) -> Object {
    match obj {
        Object::Reference(id) => Object::Reference((id.0 + offset, id.1)),
        Object::Array(arr) => Object::Array(
            arr.into_iter()
                .map(|o| remap_object_refs(o, offset))
                .collect(),
        ),
        Object::Dictionary(mut dict) => {
            for (_, value) in dict.iter_mut() {
                *value = remap_object_refs(std::mem::replace(value, Object::Null), offset);
            }
            Object::Dictionary(dict)
        }
        Object::Stream(mut stream) => {
            for (_, value) in stream.dict.iter_mut() {
                *value = remap_object_refs(std::mem::replace(value, Object::Null), offset);
            }
            Object::Stream(stream)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{label_pdf, nested_tree_pdf};

    #[test]
    fn test_load_invalid_bytes_fails() {
        let result = LabelDocument::load(b"not a pdf");
        assert!(matches!(result, Err(LabelCropError::ParseError(_))));
    }

    #[test]
    fn test_page_text_is_available_per_page() {
        let pdf = label_pdf(&[vec!["First page"], vec!["Second page"]]);
        let doc = LabelDocument::load(&pdf).unwrap();
        assert_eq!(doc.page_count(), 2);
        assert_eq!(doc.page_text(1).unwrap(), "Second page");
        assert!(matches!(doc.page_text(2), Err(LabelCropError::PageOutOfRange(2))));
    }

    #[test]
    fn test_select_reorders_pages() {
        let pdf = label_pdf(&[vec!["A"], vec!["B"], vec!["C"]]);
        let doc = LabelDocument::load(&pdf).unwrap();
        let picked = doc.select(&[2, 0]).unwrap();
        assert_eq!(picked.page_count(), 2);
        assert_eq!(picked.page_text(0).unwrap(), "C");
        assert_eq!(picked.page_text(1).unwrap(), "A");
    }

    #[test]
    fn test_selected_document_round_trips_through_bytes() {
        let pdf = label_pdf(&[vec!["A"], vec!["B"]]);
        let doc = LabelDocument::load(&pdf).unwrap();
        let bytes = doc.select(&[1]).unwrap().to_bytes().unwrap();
        let reloaded = LabelDocument::load(&bytes).unwrap();
        assert_eq!(reloaded.page_count(), 1);
        assert_eq!(reloaded.page_text(0).unwrap(), "B");
    }

    #[test]
    fn test_duplicate_copies_are_distinct_pages() {
        let pdf = label_pdf(&[vec!["Only"]]);
        let doc = LabelDocument::load(&pdf).unwrap();
        let twice = doc.select(&[0, 0]).unwrap();
        assert_eq!(twice.page_count(), 2);
        assert_ne!(twice.pages[0], twice.pages[1]);
        assert_eq!(twice.page_text(1).unwrap(), "Only");
    }

    #[test]
    fn test_merge_concatenates_in_order() {
        let a = LabelDocument::load(&label_pdf(&[vec!["A1"], vec!["A2"]])).unwrap();
        let b = LabelDocument::load(&label_pdf(&[vec!["B1"]])).unwrap();
        let merged = LabelDocument::merge(&[a, b]).unwrap();
        let texts: Vec<&str> = (0..3).map(|i| merged.page_text(i).unwrap()).collect();
        assert_eq!(texts, vec!["A1", "A2", "B1"]);
    }

    #[test]
    fn test_merge_of_nothing_is_no_input() {
        assert!(matches!(LabelDocument::merge(&[]), Err(LabelCropError::NoInput)));
    }

    #[test]
    fn test_copy_materialises_inherited_attributes() {
        let doc = LabelDocument::load(&nested_tree_pdf()).unwrap();
        assert_eq!(doc.page_rect(0).unwrap(), Rect::new(0.0, 0.0, 288.0, 432.0));
        let copy = doc.select(&[0]).unwrap();
        assert_eq!(copy.page_rect(0).unwrap(), Rect::new(0.0, 0.0, 288.0, 432.0));
        assert_eq!(copy.page_text(0).unwrap(), "Inherited");
    }

    #[test]
    fn test_image_page_has_requested_size() {
        let mut builder = DocumentBuilder::new();
        let image = EncodedRaster {
            width: 2,
            height: 1,
            data: vec![0, 255],
            filter: "FlateDecode",
        };
        builder.push_image_page(120.5, 80.0, &image);
        let doc = builder.finish().unwrap();
        let rect = doc.page_rect(0).unwrap();
        assert!((rect.width() - 120.5).abs() < 1e-3);
        assert!((rect.height() - 80.0).abs() < 1e-3);
        assert_eq!(doc.page_layout(0).unwrap().blocks.len(), 1);
    }

    #[test]
    fn test_empty_document_has_no_pages() {
        let doc = LabelDocument::empty().unwrap();
        assert!(doc.is_empty());
        assert!(doc.to_bytes().is_ok());
    }
}
