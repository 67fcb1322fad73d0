//! Fixture PDFs generated in-process. Every page shows a marker string
//! (`A1`, `A2`, ...) so tests can read back the page order.

#![allow(dead_code)]

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream};

/// `num_pages` pages labelled `{label}1..={label}{num_pages}`. Pages inherit
/// MediaBox and Resources from the page tree root; `rotated` pages carry
/// an existing `/Rotate 90`.
pub fn fixture_pdf(label: &str, num_pages: u32, rotated: &[u32]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(b"Times-Roman".to_vec())),
    ]));

    let kids: Vec<Object> = (1..=num_pages)
        .map(|n| {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), 18.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(format!("{}{}", label, n))]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(
                Dictionary::new(),
                content.encode().unwrap(),
            ));

            let mut page = Dictionary::from_iter(vec![
                ("Type", Object::Name(b"Page".to_vec())),
                ("Parent", Object::Reference(pages_id)),
                ("Contents", Object::Reference(content_id)),
            ]);
            if rotated.contains(&n) {
                page.set("Rotate", 90);
            }
            Object::Reference(doc.add_object(page))
        })
        .collect();

    let pages = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Count", Object::Integer(num_pages as i64)),
        ("Kids", Object::Array(kids)),
        (
            "Resources",
            Object::Dictionary(Dictionary::from_iter(vec![(
                "Font",
                Object::Dictionary(Dictionary::from_iter(vec![(
                    "F1",
                    Object::Reference(font_id),
                )])),
            )])),
        ),
        (
            "MediaBox",
            Object::Array(vec![0.into(), 0.into(), 595.into(), 842.into()]),
        ),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

pub fn labelled(label: &str, num_pages: u32) -> Vec<u8> {
    fixture_pdf(label, num_pages, &[])
}

fn shown_strings(doc: &Document, page_id: lopdf::ObjectId) -> Vec<String> {
    let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
    content
        .operations
        .iter()
        .filter(|op| op.operator == "Tj")
        .filter_map(|op| match op.operands.first() {
            Some(Object::String(bytes, _)) => Some(String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        })
        .collect()
}

/// Marker of every page, in page order
pub fn markers(bytes: &[u8]) -> Vec<String> {
    let doc = Document::load_mem(bytes).unwrap();
    doc.get_pages()
        .into_values()
        .map(|id| shown_strings(&doc, id).into_iter().next().unwrap_or_default())
        .collect()
}

/// All strings shown on each page, in page order
pub fn page_texts(bytes: &[u8]) -> Vec<Vec<String>> {
    let doc = Document::load_mem(bytes).unwrap();
    doc.get_pages()
        .into_values()
        .map(|id| shown_strings(&doc, id))
        .collect()
}

/// `/Rotate` of every page, in page order (0 when absent)
pub fn rotations(bytes: &[u8]) -> Vec<i64> {
    let doc = Document::load_mem(bytes).unwrap();
    doc.get_pages()
        .into_values()
        .map(|id| {
            doc.get_dictionary(id)
                .unwrap()
                .get(b"Rotate")
                .and_then(Object::as_i64)
                .unwrap_or(0)
        })
        .collect()
}
