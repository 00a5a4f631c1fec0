//! In-process form and annotation flattening using lopdf
//!
//! Burns each visible annotation's normal appearance stream into the page
//! content as a Form XObject invocation, then strips the interactive objects
//! (`/Annots` arrays and the catalog `/AcroForm`). Documents filled by any
//! mainstream viewer carry appearance streams for their widgets, so this
//! covers filled invoice cover sheets without re-rendering anything.

use std::path::Path;

use log::{debug, warn};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::error::{Error, Result};

/// Capability interface for the flattening engine.
///
/// Implementations turn every interactive form field and visible annotation
/// in `doc` into static page content. `source` is the path the document was
/// loaded from, used only for error reporting.
pub trait Flattener {
    fn flatten(&self, doc: &mut Document, source: &Path) -> Result<()>;
}

/// Default engine: appearance-stream burning, no external processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct AppearanceFlattener;

impl Flattener for AppearanceFlattener {
    fn flatten(&self, doc: &mut Document, source: &Path) -> Result<()> {
        let pages: Vec<(u32, ObjectId)> = doc.get_pages().into_iter().collect();

        let mut burned = 0usize;
        for &(page_num, page_id) in &pages {
            burned += flatten_page(doc, page_id, page_num, source)?;
        }

        remove_acroform(doc);

        debug!(
            "flattened {}: {} appearance(s) burned across {} page(s)",
            source.display(),
            burned,
            pages.len()
        );
        Ok(())
    }
}

/// Where an appearance stream lives before it becomes a page XObject.
enum ApSource {
    /// Already an indirect object in the document
    Existing(ObjectId),
    /// Written inline in the annotation dictionary; needs its own object id
    Inline(Stream),
}

/// One annotation appearance resolved from the page, not yet materialized.
struct PendingAppearance {
    source: ApSource,
    /// Annotation `/Rect` on the page
    rect: [f32; 4],
    /// Appearance XObject `/BBox`
    bbox: [f32; 4],
    /// Appearance `/Matrix`, if present
    matrix: Option<[f32; 6]>,
}

/// An appearance with its XObject id assigned, ready to be drawn.
struct Placement {
    xobject: ObjectId,
    rect: [f32; 4],
    bbox: [f32; 4],
    matrix: Option<[f32; 6]>,
}

/// Flatten a single page. Returns the number of appearances burned in.
fn flatten_page(
    doc: &mut Document,
    page_id: ObjectId,
    page_num: u32,
    source: &Path,
) -> Result<usize> {
    let annots = match annotation_dicts(doc, page_id, page_num, source)? {
        Some(annots) => annots,
        None => return Ok(0),
    };

    let mut pending = Vec::new();
    for annot in &annots {
        if is_hidden(annot) {
            continue;
        }
        if let Some(appearance) = resolve_appearance(doc, annot, page_num, source)? {
            pending.push(appearance);
        }
    }

    if pending.is_empty() {
        // Nothing renderable, but the interactive objects still have to go.
        if let Ok(Object::Dictionary(page_dict)) = doc.get_object_mut(page_id) {
            page_dict.remove(b"Annots");
        }
        return Ok(0);
    }

    // Materialize every appearance as a referencable Form XObject.
    let mut placements = Vec::with_capacity(pending.len());
    for appearance in pending {
        let id = match appearance.source {
            ApSource::Existing(id) => id,
            ApSource::Inline(stream) => doc.add_object(Object::Stream(stream)),
        };
        ensure_form_xobject(doc, id);
        placements.push(Placement {
            xobject: id,
            rect: appearance.rect,
            bbox: appearance.bbox,
            matrix: appearance.matrix,
        });
    }

    // Register them under fresh names in a page-local Resources dictionary.
    // The effective resources are cloned inline so shared or inherited
    // dictionaries on other pages are left untouched.
    let mut resources = effective_resources(doc, page_id);
    let mut xobjects = match resources.get(b"XObject") {
        Ok(Object::Dictionary(existing)) => existing.clone(),
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Dictionary(existing)) => existing.clone(),
            _ => Dictionary::new(),
        },
        _ => Dictionary::new(),
    };

    let mut names = Vec::with_capacity(placements.len());
    let mut next = 0usize;
    for placement in &placements {
        let name = loop {
            let candidate = format!("IMFlat{}", next);
            next += 1;
            if !xobjects.has(candidate.as_bytes()) {
                break candidate;
            }
        };
        xobjects.set(name.clone(), Object::Reference(placement.xobject));
        names.push(name);
    }
    resources.set("XObject", Object::Dictionary(xobjects));

    // Wrap the original content in q/Q so a dangling transform in the source
    // stream cannot displace the overlay, then append the overlay stream.
    let original_contents = page_contents(doc, page_id);
    let prefix_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let overlay_id = doc.add_object(Stream::new(
        Dictionary::new(),
        build_overlay(&placements, &names),
    ));

    let mut contents = Vec::with_capacity(original_contents.len() + 2);
    contents.push(Object::Reference(prefix_id));
    contents.extend(original_contents);
    contents.push(Object::Reference(overlay_id));

    let page_obj = doc
        .get_object_mut(page_id)
        .map_err(|e| flatten_failure(source, page_num, format!("page object unavailable: {}", e)))?;
    if let Object::Dictionary(ref mut page_dict) = page_obj {
        page_dict.set("Contents", Object::Array(contents));
        page_dict.set("Resources", Object::Dictionary(resources));
        page_dict.remove(b"Annots");
    }

    Ok(placements.len())
}

/// Resolve the page's `/Annots` array into owned annotation dictionaries.
///
/// Returns `None` when the page has no annotations at all.
fn annotation_dicts(
    doc: &Document,
    page_id: ObjectId,
    page_num: u32,
    source: &Path,
) -> Result<Option<Vec<Dictionary>>> {
    let page_dict = match doc.get_object(page_id) {
        Ok(Object::Dictionary(dict)) => dict,
        _ => return Ok(None),
    };

    let annots_obj = match page_dict.get(b"Annots") {
        Ok(obj) => obj,
        Err(_) => return Ok(None),
    };

    let elements: Vec<Object> = match annots_obj {
        Object::Array(arr) => arr.clone(),
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(Object::Array(arr)) => arr.clone(),
            _ => {
                return Err(flatten_failure(
                    source,
                    page_num,
                    "annotation array reference does not resolve".to_string(),
                ))
            }
        },
        _ => return Ok(None),
    };

    let mut dicts = Vec::with_capacity(elements.len());
    for element in elements {
        match element {
            Object::Dictionary(dict) => dicts.push(dict),
            Object::Reference(id) => match doc.get_object(id) {
                Ok(Object::Dictionary(dict)) => dicts.push(dict.clone()),
                _ => {
                    return Err(flatten_failure(
                        source,
                        page_num,
                        "annotation reference does not resolve".to_string(),
                    ))
                }
            },
            _ => {}
        }
    }

    Ok(Some(dicts))
}

/// Resolve an annotation's normal appearance into a placement.
///
/// Annotations without a usable appearance (no `/AP`, no matching state, no
/// `/Rect`) are skipped: there is nothing to draw. A reference that fails to
/// resolve or a stream that cannot be decoded is a flatten failure.
fn resolve_appearance(
    doc: &Document,
    annot: &Dictionary,
    page_num: u32,
    source: &Path,
) -> Result<Option<PendingAppearance>> {
    let rect = match annot.get(b"Rect").ok().and_then(|obj| numbers::<4>(obj)) {
        Some(rect) => rect,
        None => {
            warn!("page {}: annotation without /Rect, skipping", page_num);
            return Ok(None);
        }
    };

    let ap_dict = match annot.get(b"AP") {
        Ok(Object::Dictionary(dict)) => dict.clone(),
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Dictionary(dict)) => dict.clone(),
            _ => {
                return Err(flatten_failure(
                    source,
                    page_num,
                    "appearance dictionary reference does not resolve".to_string(),
                ))
            }
        },
        _ => return Ok(None),
    };

    let n_obj = match ap_dict.get(b"N") {
        Ok(obj) => obj,
        Err(_) => return Ok(None),
    };

    let ap_source = match resolve_normal_appearance(doc, n_obj, annot, page_num, source)? {
        Some(ap_source) => ap_source,
        None => return Ok(None),
    };

    // Probe the stream: undecodable appearance content means the page cannot
    // be rendered faithfully, which aborts the whole merge.
    let stream = match &ap_source {
        ApSource::Existing(id) => match doc.get_object(*id) {
            Ok(Object::Stream(stream)) => stream,
            _ => {
                return Err(flatten_failure(
                    source,
                    page_num,
                    "appearance stream reference does not resolve".to_string(),
                ))
            }
        },
        ApSource::Inline(stream) => stream,
    };
    if let Err(e) = stream.decompressed_content() {
        return Err(flatten_failure(
            source,
            page_num,
            format!("appearance stream cannot be decoded: {}", e),
        ));
    }

    let bbox = match stream.dict.get(b"BBox").ok().and_then(|obj| numbers::<4>(obj)) {
        Some(bbox) => bbox,
        None => {
            warn!("page {}: appearance without /BBox, skipping", page_num);
            return Ok(None);
        }
    };
    let matrix = stream.dict.get(b"Matrix").ok().and_then(|obj| numbers::<6>(obj));

    Ok(Some(PendingAppearance {
        source: ap_source,
        rect,
        bbox,
        matrix,
    }))
}

/// Resolve `/AP` `/N`, which is either the appearance stream itself or a
/// dictionary of appearance states keyed by the annotation's `/AS` name
/// (checkboxes and radio buttons).
fn resolve_normal_appearance(
    doc: &Document,
    n_obj: &Object,
    annot: &Dictionary,
    page_num: u32,
    source: &Path,
) -> Result<Option<ApSource>> {
    match n_obj {
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(Object::Stream(_)) => Ok(Some(ApSource::Existing(*id))),
            Ok(Object::Dictionary(states)) => select_appearance_state(doc, states, annot),
            _ => Err(flatten_failure(
                source,
                page_num,
                "normal appearance reference does not resolve".to_string(),
            )),
        },
        Object::Dictionary(states) => select_appearance_state(doc, states, annot),
        Object::Stream(stream) => Ok(Some(ApSource::Inline(stream.clone()))),
        _ => Ok(None),
    }
}

/// Pick the entry of an appearance-state dictionary matching `/AS`.
fn select_appearance_state(
    doc: &Document,
    states: &Dictionary,
    annot: &Dictionary,
) -> Result<Option<ApSource>> {
    let state = match annot.get(b"AS") {
        Ok(Object::Name(name)) => name.clone(),
        _ => return Ok(None),
    };

    match states.get(&state) {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Stream(_)) => Ok(Some(ApSource::Existing(*id))),
            _ => Ok(None),
        },
        Ok(Object::Stream(stream)) => Ok(Some(ApSource::Inline(stream.clone()))),
        _ => Ok(None),
    }
}

/// Generate the overlay content stream drawing each appearance at its rect.
///
/// Starts with `Q` to close the wrapping `q` placed before the original page
/// content, so the overlay is drawn in the page's default coordinate space.
fn build_overlay(placements: &[Placement], names: &[String]) -> Vec<u8> {
    let mut content: Vec<u8> = b"Q\n".to_vec();

    for (placement, name) in placements.iter().zip(names.iter()) {
        content.extend_from_slice(b"q\n");

        let [sx, sy, tx, ty] = placement_transform(placement.bbox, placement.rect);
        content.extend_from_slice(
            format!("{:.6} 0 0 {:.6} {:.6} {:.6} cm\n", sx, sy, tx, ty).as_bytes(),
        );

        if let Some(m) = placement.matrix {
            content.extend_from_slice(
                format!(
                    "{:.6} {:.6} {:.6} {:.6} {:.6} {:.6} cm\n",
                    m[0], m[1], m[2], m[3], m[4], m[5]
                )
                .as_bytes(),
            );
        }

        content.extend_from_slice(format!("/{} Do\n", name).as_bytes());
        content.extend_from_slice(b"Q\n");
    }

    content
}

/// Scale/translate mapping the appearance `/BBox` onto the annotation `/Rect`.
fn placement_transform(bbox: [f32; 4], rect: [f32; 4]) -> [f32; 4] {
    let bbox_width = bbox[2] - bbox[0];
    let bbox_height = bbox[3] - bbox[1];
    let rect_width = rect[2] - rect[0];
    let rect_height = rect[3] - rect[1];

    let sx = if bbox_width != 0.0 { rect_width / bbox_width } else { 1.0 };
    let sy = if bbox_height != 0.0 { rect_height / bbox_height } else { 1.0 };
    let tx = rect[0] - bbox[0] * sx;
    let ty = rect[1] - bbox[1] * sy;

    [sx, sy, tx, ty]
}

/// Collect the page's current content stream references, preserving order.
fn page_contents(doc: &Document, page_id: ObjectId) -> Vec<Object> {
    let page_dict = match doc.get_object(page_id) {
        Ok(Object::Dictionary(dict)) => dict,
        _ => return Vec::new(),
    };
    match page_dict.get(b"Contents") {
        Ok(Object::Reference(id)) => vec![Object::Reference(*id)],
        Ok(Object::Array(arr)) => arr.clone(),
        _ => Vec::new(),
    }
}

/// Resolve the resources in effect for a page, walking up the page tree for
/// inherited dictionaries. Returns an owned clone; missing resources yield an
/// empty dictionary.
fn effective_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    let mut current = page_id;
    // Page trees are shallow; the bound only guards against reference cycles.
    for _ in 0..32 {
        let dict = match doc.get_object(current) {
            Ok(Object::Dictionary(dict)) => dict,
            _ => break,
        };
        match dict.get(b"Resources") {
            Ok(Object::Dictionary(resources)) => return resources.clone(),
            Ok(Object::Reference(id)) => {
                if let Ok(Object::Dictionary(resources)) = doc.get_object(*id) {
                    return resources.clone();
                }
                break;
            }
            _ => {}
        }
        match dict.get(b"Parent") {
            Ok(Object::Reference(parent)) => current = *parent,
            _ => break,
        }
    }
    Dictionary::new()
}

/// Tag an appearance stream as a Form XObject if the filler left it untyped.
fn ensure_form_xobject(doc: &mut Document, id: ObjectId) {
    if let Ok(Object::Stream(ref mut stream)) = doc.get_object_mut(id) {
        if !stream.dict.has(b"Subtype") {
            stream.dict.set("Subtype", Object::Name(b"Form".to_vec()));
        }
        if !stream.dict.has(b"Type") {
            stream.dict.set("Type", Object::Name(b"XObject".to_vec()));
        }
    }
}

/// Drop the interactive form dictionary from the document catalog.
fn remove_acroform(doc: &mut Document) {
    let root_id = match doc.trailer.get(b"Root").and_then(|obj| obj.as_reference()) {
        Ok(id) => id,
        Err(_) => return,
    };
    if let Ok(Object::Dictionary(ref mut catalog)) = doc.get_object_mut(root_id) {
        catalog.remove(b"AcroForm");
    }
}

/// Annotation flag bits that suppress rendering (Hidden, NoView).
fn is_hidden(annot: &Dictionary) -> bool {
    const HIDDEN: i64 = 1 << 1;
    const NO_VIEW: i64 = 1 << 5;
    match annot.get(b"F") {
        Ok(Object::Integer(flags)) => flags & (HIDDEN | NO_VIEW) != 0,
        _ => false,
    }
}

/// Extract N numeric entries from a PDF array object.
fn numbers<const N: usize>(obj: &Object) -> Option<[f32; N]> {
    let arr = match obj {
        Object::Array(arr) if arr.len() >= N => arr,
        _ => return None,
    };
    let mut out = [0.0f32; N];
    for (slot, value) in out.iter_mut().zip(arr.iter()) {
        *slot = match value {
            Object::Integer(i) => *i as f32,
            Object::Real(r) => *r as f32,
            _ => return None,
        };
    }
    Some(out)
}

fn flatten_failure(source: &Path, page_num: u32, reason: String) -> Error {
    Error::FlattenFailure {
        path: source.to_path_buf(),
        page: Some(page_num),
        reason,
    }
}
