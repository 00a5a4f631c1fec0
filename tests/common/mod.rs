//! Shared synthetic-PDF fixtures for integration tests
//!
//! Fixtures are built with lopdf instead of checked-in binaries so tests can
//! assert on exact structure (page content markers, widget appearances).

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use lopdf::{Dictionary, Document, Object, Stream, StringFormat};

/// A simple PDF with `num_pages` pages, each carrying identifiable text.
pub fn text_pdf(num_pages: u32, content_prefix: &str) -> Vec<u8> {
    build_text_document(num_pages, content_prefix, None, None)
}

/// Like [`text_pdf`], with an Info dictionary carrying title/author.
pub fn text_pdf_with_info(
    num_pages: u32,
    content_prefix: &str,
    title: &str,
    author: &str,
) -> Vec<u8> {
    build_text_document(num_pages, content_prefix, Some(title), Some(author))
}

fn build_text_document(
    num_pages: u32,
    content_prefix: &str,
    title: Option<&str>,
    author: Option<&str>,
) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut page_ids = Vec::new();
    for page_num in 0..num_pages {
        let content = format!(
            "BT /F1 12 Tf 50 700 Td ({}-Page-{}) Tj ET",
            content_prefix,
            page_num + 1
        );
        let content_id = doc.add_object(Object::Stream(Stream::new(
            Dictionary::new(),
            content.into_bytes(),
        )));

        let mut page_dict = Dictionary::new();
        page_dict.set("Type", Object::Name(b"Page".to_vec()));
        page_dict.set("Parent", Object::Reference(pages_id));
        page_dict.set("Contents", Object::Reference(content_id));
        page_dict.set("MediaBox", letter_media_box());
        page_ids.push(Object::Reference(doc.add_object(Object::Dictionary(page_dict))));
    }

    finish_document(doc, pages_id, page_ids, title, author)
}

/// A one-page PDF with a filled text-field widget whose value is carried by
/// a normal appearance stream, plus the matching catalog AcroForm entry.
pub fn form_pdf(value: &str) -> Vec<u8> {
    // Print flag: the widget is visible
    form_pdf_with_flags(value, 4)
}

/// [`form_pdf`] with explicit annotation flags (2 = Hidden, 32 = NoView).
pub fn form_pdf_with_flags(value: &str, flags: i64) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let content_id = doc.add_object(Object::Stream(Stream::new(
        Dictionary::new(),
        b"BT /F1 12 Tf 50 700 Td (Form-Page-1) Tj ET".to_vec(),
    )));

    // Normal appearance: a Form XObject drawing the field value
    let mut ap_dict = Dictionary::new();
    ap_dict.set("Type", Object::Name(b"XObject".to_vec()));
    ap_dict.set("Subtype", Object::Name(b"Form".to_vec()));
    ap_dict.set(
        "BBox",
        Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(150),
            Object::Integer(20),
        ]),
    );
    let ap_id = doc.add_object(Object::Stream(Stream::new(
        ap_dict,
        format!("BT /Helv 10 Tf 2 5 Td ({}) Tj ET", value).into_bytes(),
    )));

    let mut annot = Dictionary::new();
    annot.set("Type", Object::Name(b"Annot".to_vec()));
    annot.set("Subtype", Object::Name(b"Widget".to_vec()));
    annot.set("FT", Object::Name(b"Tx".to_vec()));
    annot.set("T", Object::String(b"total".to_vec(), StringFormat::Literal));
    annot.set(
        "V",
        Object::String(value.as_bytes().to_vec(), StringFormat::Literal),
    );
    annot.set(
        "Rect",
        Object::Array(vec![
            Object::Integer(100),
            Object::Integer(600),
            Object::Integer(250),
            Object::Integer(620),
        ]),
    );
    annot.set("F", Object::Integer(flags));
    let mut ap = Dictionary::new();
    ap.set("N", Object::Reference(ap_id));
    annot.set("AP", Object::Dictionary(ap));
    let annot_id = doc.add_object(Object::Dictionary(annot));

    let mut page_dict = Dictionary::new();
    page_dict.set("Type", Object::Name(b"Page".to_vec()));
    page_dict.set("Parent", Object::Reference(pages_id));
    page_dict.set("Contents", Object::Reference(content_id));
    page_dict.set("MediaBox", letter_media_box());
    page_dict.set("Annots", Object::Array(vec![Object::Reference(annot_id)]));
    let page_id = doc.add_object(Object::Dictionary(page_dict));

    let mut acroform = Dictionary::new();
    acroform.set("Fields", Object::Array(vec![Object::Reference(annot_id)]));
    let acroform_id = doc.add_object(Object::Dictionary(acroform));

    finish_document_with(
        doc,
        pages_id,
        vec![Object::Reference(page_id)],
        None,
        None,
        Some(acroform_id),
    )
}

/// A structurally valid PDF with zero pages.
pub fn empty_pdf() -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    finish_document(doc, pages_id, Vec::new(), None, None)
}

fn letter_media_box() -> Object {
    Object::Array(vec![
        Object::Integer(0),
        Object::Integer(0),
        Object::Integer(612),
        Object::Integer(792),
    ])
}

fn finish_document(
    doc: Document,
    pages_id: (u32, u16),
    page_ids: Vec<Object>,
    title: Option<&str>,
    author: Option<&str>,
) -> Vec<u8> {
    finish_document_with(doc, pages_id, page_ids, title, author, None)
}

fn finish_document_with(
    mut doc: Document,
    pages_id: (u32, u16),
    page_ids: Vec<Object>,
    title: Option<&str>,
    author: Option<&str>,
    acroform_id: Option<(u32, u16)>,
) -> Vec<u8> {
    let mut pages_dict = Dictionary::new();
    pages_dict.set("Type", Object::Name(b"Pages".to_vec()));
    pages_dict.set("Count", Object::Integer(page_ids.len() as i64));
    pages_dict.set("Kids", Object::Array(page_ids));
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let mut catalog = Dictionary::new();
    catalog.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog.set("Pages", Object::Reference(pages_id));
    if let Some(acroform_id) = acroform_id {
        catalog.set("AcroForm", Object::Reference(acroform_id));
    }
    let catalog_id = doc.add_object(Object::Dictionary(catalog));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    if title.is_some() || author.is_some() {
        let mut info = Dictionary::new();
        if let Some(title) = title {
            info.set(
                "Title",
                Object::String(title.as_bytes().to_vec(), StringFormat::Literal),
            );
        }
        if let Some(author) = author {
            info.set(
                "Author",
                Object::String(author.as_bytes().to_vec(), StringFormat::Literal),
            );
        }
        let info_id = doc.add_object(Object::Dictionary(info));
        doc.trailer.set("Info", Object::Reference(info_id));
    }

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).expect("failed to serialize fixture");
    buffer
}

/// Write fixture bytes into the scratch directory, returning the path.
pub fn write_fixture(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).expect("failed to write fixture");
    path
}
