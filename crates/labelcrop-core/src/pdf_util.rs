//! Small lopdf helpers shared by the layout walker and the document builder

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::error::LabelCropError;
use crate::geometry::Rect;

/// Page attributes that may be inherited from ancestor `Pages` nodes.
pub const INHERITABLE_KEYS: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Default page size (US Letter) when a page carries no MediaBox at all
const DEFAULT_PAGE: Rect = Rect {
    x0: 0.0,
    y0: 0.0,
    x1: 612.0,
    y1: 792.0,
};

/// Follow references until a direct object is reached.
pub fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    let mut current = obj;
    for _ in 0..16 {
        match current {
            Object::Reference(id) => match doc.get_object(*id) {
                Ok(next) => current = next,
                Err(_) => return current,
            },
            _ => return current,
        }
    }
    current
}

/// Numeric value of an Integer or Real object.
pub fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

/// Stream payload with filters removed when the stream declares any.
pub fn stream_bytes(stream: &Stream) -> Result<Vec<u8>, LabelCropError> {
    if stream.dict.has(b"Filter") {
        stream
            .decompressed_content()
            .map_err(|e| LabelCropError::LayoutError(format!("Cannot decode stream: {}", e)))
    } else {
        Ok(stream.content.clone())
    }
}

pub fn page_dict(doc: &Document, page_id: ObjectId) -> Result<&Dictionary, LabelCropError> {
    doc.get_object(page_id)
        .and_then(Object::as_dict)
        .map_err(|e| LabelCropError::OperationError(format!("Invalid page object: {}", e)))
}

/// Look up `key` on the page or the nearest ancestor that defines it.
pub fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut node = doc.get_object(page_id).ok()?.as_dict().ok()?;
    for _ in 0..32 {
        if let Ok(value) = node.get(key) {
            return Some(value);
        }
        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = doc.get_object(parent).ok()?.as_dict().ok()?;
    }
    None
}

fn rect_of(doc: &Document, obj: &Object) -> Option<Rect> {
    let arr = resolve(doc, obj).as_array().ok()?;
    if arr.len() < 4 {
        return None;
    }
    let v: Vec<f64> = arr
        .iter()
        .take(4)
        .map(|o| number(resolve(doc, o)))
        .collect::<Option<Vec<_>>>()?;
    Some(Rect::from_corners(v[0], v[1], v[2], v[3]))
}

/// Visible page rectangle: CropBox clipped to MediaBox, or the MediaBox alone.
pub fn page_rect(doc: &Document, page_id: ObjectId) -> Rect {
    let media = inherited(doc, page_id, b"MediaBox")
        .and_then(|o| rect_of(doc, o))
        .unwrap_or(DEFAULT_PAGE);
    match inherited(doc, page_id, b"CropBox").and_then(|o| rect_of(doc, o)) {
        Some(crop) => {
            let visible = crop.intersect(&media);
            if visible.is_empty() {
                media
            } else {
                visible
            }
        }
        None => media,
    }
}

/// Concatenated, decoded content streams of a page.
pub fn page_content(doc: &Document, page_id: ObjectId) -> Result<Vec<u8>, LabelCropError> {
    let page = page_dict(doc, page_id)?;
    let Ok(contents) = page.get(b"Contents") else {
        return Ok(Vec::new());
    };

    let streams: Vec<&Object> = match resolve(doc, contents) {
        Object::Array(items) => items.iter().map(|o| resolve(doc, o)).collect(),
        other => vec![other],
    };

    let mut out = Vec::new();
    for obj in streams {
        let stream = obj
            .as_stream()
            .map_err(|e| LabelCropError::LayoutError(format!("Invalid content stream: {}", e)))?;
        out.extend(stream_bytes(stream)?);
        out.push(b'\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn doc_with_inherited_box() -> (Document, ObjectId) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "CropBox" => vec![10.into(), 10.into(), 700.into(), 300.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 288.into(), 432.into()],
            }),
        );
        (doc, page_id)
    }

    #[test]
    fn test_media_box_is_inherited() {
        let (doc, page_id) = doc_with_inherited_box();
        assert!(inherited(&doc, page_id, b"MediaBox").is_some());
        assert!(inherited(&doc, page_id, b"Resources").is_none());
    }

    #[test]
    fn test_page_rect_clips_crop_box_to_media_box() {
        let (doc, page_id) = doc_with_inherited_box();
        assert_eq!(page_rect(&doc, page_id), Rect::new(10.0, 10.0, 288.0, 300.0));
    }

    #[test]
    fn test_number_reads_integers_and_reals() {
        assert_eq!(number(&Object::Integer(4)), Some(4.0));
        assert_eq!(number(&Object::Real(1.5)), Some(1.5));
        assert_eq!(number(&Object::Null), None);
    }
}
