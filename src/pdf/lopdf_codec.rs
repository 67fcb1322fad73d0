//! `lopdf`-backed page codec
//!
//! Every rendered page is a self-contained fragment: the page dictionary with
//! its inherited attributes flattened in, plus deep copies of every object it
//! references. Transforms are applied to the fragment, never to the source,
//! so a page selected twice yields two independent output pages.
//!
//! Copied objects are never modified by a transform; only the page dictionary
//! and objects created for the transform are. That lets the writer emit each
//! source object once, however many output pages reference it.

use crate::assembly::{Rotation, Transform, Watermark};
use crate::error::{Error, Result};
use crate::pdf::codec::PageCodec;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, instrument, warn};

/// Page attributes a page may inherit from its ancestors in the page tree
const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guard against cyclic /Parent chains in malformed files
const MAX_TREE_DEPTH: usize = 64;

/// Watermark baseline origin in default user space
const WATERMARK_ORIGIN: (f32, f32) = (200.0, 500.0);

/// Gray level used to fill watermark text
const WATERMARK_GRAY: f32 = 0.5;

/// Distinguishes loaded documents so the writer can share their objects
static NEXT_SOURCE: AtomicU64 = AtomicU64::new(0);

/// A source document decoded by lopdf
pub struct LoadedPdf {
    source: u64,
    document: Document,
    /// Page object ids, index 0 is page 1
    pages: Vec<ObjectId>,
    page_set: HashSet<ObjectId>,
}

impl LoadedPdf {
    fn page_id(&self, page_number: u32) -> Option<ObjectId> {
        let index = (page_number as usize).checked_sub(1)?;
        self.pages.get(index).copied()
    }
}

/// One transformed page, detached from its source document
#[derive(Debug, Clone)]
pub struct PageFragment {
    source: u64,
    page_id: ObjectId,
    page: Dictionary,
    /// Objects reachable from the page, keyed by their id in the source.
    /// Read-only: other fragments of the same source share them on write.
    objects: BTreeMap<ObjectId, Object>,
    /// Objects created while transforming, owned by this page alone
    created: BTreeMap<ObjectId, Object>,
    /// Next free id for objects created while transforming
    next_id: u32,
}

impl PageFragment {
    fn allocate(&mut self, object: Object) -> ObjectId {
        let id = (self.next_id, 0);
        self.next_id += 1;
        self.created.insert(id, object);
        id
    }

    fn get_object(&self, id: &ObjectId) -> Option<&Object> {
        self.created.get(id).or_else(|| self.objects.get(id))
    }

    /// Follow `value` through at most one indirect reference
    fn resolve<'a>(&'a self, value: &'a Object) -> Option<&'a Object> {
        match value {
            Object::Reference(id) => self.get_object(id),
            direct => Some(direct),
        }
    }

    /// Current `/Rotate` of the page, 0 when missing or not an integer
    pub fn rotation(&self) -> i64 {
        self.page
            .get(b"Rotate")
            .ok()
            .and_then(|r| self.resolve(r))
            .and_then(|r| r.as_i64().ok())
            .unwrap_or(0)
    }

    fn rotate(&mut self, rotation: Rotation) {
        let new_rotation = (self.rotation() + rotation.degrees()).rem_euclid(360);
        self.page.set("Rotate", Object::Integer(new_rotation));
    }

    /// Resolve `value` to a dictionary owned by this fragment
    fn owned_dictionary(&self, value: Option<&Object>) -> Dictionary {
        match value.and_then(|v| self.resolve(v)) {
            Some(Object::Dictionary(dict)) => dict.clone(),
            _ => Dictionary::new(),
        }
    }

    fn overlay(&mut self, watermark: &Watermark) -> Result<()> {
        let mut resources = self.owned_dictionary(self.page.get(b"Resources").ok());

        let mut fonts = self.owned_dictionary(resources.get(b"Font").ok());
        let font_name = unique_name(&fonts, "WmF");
        fonts.set(
            font_name.as_str(),
            Object::Dictionary(Dictionary::from_iter(vec![
                ("Type", Object::Name(b"Font".to_vec())),
                ("Subtype", Object::Name(b"Type1".to_vec())),
                ("BaseFont", Object::Name(b"Helvetica".to_vec())),
                ("Encoding", Object::Name(b"WinAnsiEncoding".to_vec())),
            ])),
        );
        resources.set("Font", Object::Dictionary(fonts));

        let mut states = self.owned_dictionary(resources.get(b"ExtGState").ok());
        let state_name = unique_name(&states, "WmGS");
        let opacity = watermark.opacity() as f32;
        states.set(
            state_name.as_str(),
            Object::Dictionary(Dictionary::from_iter(vec![
                ("Type", Object::Name(b"ExtGState".to_vec())),
                ("ca", Object::Real(opacity)),
                ("CA", Object::Real(opacity)),
            ])),
        );
        resources.set("ExtGState", Object::Dictionary(states));
        self.page.set("Resources", Object::Dictionary(resources));

        // An indirect /Contents may name a single stream or an array of them;
        // arrays are spliced since content arrays cannot nest.
        let mut contents = match self.page.get(b"Contents") {
            Ok(Object::Array(items)) => items.clone(),
            Ok(reference @ Object::Reference(id)) => match self.get_object(id) {
                Some(Object::Array(items)) => items.clone(),
                _ => vec![reference.clone()],
            },
            _ => Vec::new(),
        };

        // Isolate the original content so an unbalanced graphics state cannot
        // move or recolor the overlay.
        let open = self.allocate(Object::Stream(Stream::new(
            Dictionary::new(),
            b"q\n".to_vec(),
        )));
        let overlay = watermark_content(watermark, &font_name, &state_name)?;
        let close = self.allocate(Object::Stream(Stream::new(Dictionary::new(), overlay)));

        contents.insert(0, Object::Reference(open));
        contents.push(Object::Reference(close));
        self.page.set("Contents", Object::Array(contents));
        Ok(())
    }
}

/// Content stream closing the original content and drawing the watermark
fn watermark_content(watermark: &Watermark, font_name: &str, state_name: &str) -> Result<Vec<u8>> {
    let (x, y) = WATERMARK_ORIGIN;
    let content = Content {
        operations: vec![
            Operation::new("Q", vec![]),
            Operation::new("q", vec![]),
            Operation::new("gs", vec![Object::Name(state_name.as_bytes().to_vec())]),
            Operation::new("g", vec![Object::Real(WATERMARK_GRAY)]),
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![
                    Object::Name(font_name.as_bytes().to_vec()),
                    Object::Real(watermark.size() as f32),
                ],
            ),
            Operation::new("Td", vec![Object::Real(x), Object::Real(y)]),
            Operation::new(
                "Tj",
                vec![Object::string_literal(encode_win_ansi(watermark.text()))],
            ),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ],
    };
    content.encode().map_err(|e| Error::Materialization {
        reason: format!("failed to encode watermark content: {}", e),
    })
}

/// Map text onto single-byte WinAnsi codes. Characters outside Latin-1 are
/// replaced with `?` since the built-in Helvetica cannot show them.
fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

/// First resource name `base`, `base1`, `base2`, ... not already used in `dict`
fn unique_name(dict: &Dictionary, base: &str) -> String {
    if !dict.has(base.as_bytes()) {
        return base.to_string();
    }
    (1u32..)
        .map(|n| format!("{}{}", base, n))
        .find(|name| !dict.has(name.as_bytes()))
        .unwrap_or_else(|| base.to_string())
}

/// Push every reference found in `object` onto `stack`, skipping /Parent
/// back-references.
fn push_references(object: &Object, stack: &mut Vec<ObjectId>) {
    match object {
        Object::Reference(id) => stack.push(*id),
        Object::Array(items) => items.iter().for_each(|item| push_references(item, stack)),
        Object::Dictionary(dict) => push_dictionary_references(dict, stack),
        Object::Stream(stream) => push_dictionary_references(&stream.dict, stack),
        _ => {}
    }
}

fn push_dictionary_references(dict: &Dictionary, stack: &mut Vec<ObjectId>) {
    for (key, value) in dict.iter() {
        if key.as_slice() == b"Parent" {
            continue;
        }
        push_references(value, stack);
    }
}

/// Rewrite references through `ids`. References that did not make it into
/// the fragment become null.
fn renumber<F>(object: &mut Object, ids: &F)
where
    F: Fn(&ObjectId) -> Option<ObjectId>,
{
    match object {
        Object::Reference(id) => {
            *object = match ids(id) {
                Some(new_id) => Object::Reference(new_id),
                None => Object::Null,
            };
        }
        Object::Array(items) => items.iter_mut().for_each(|item| renumber(item, ids)),
        Object::Dictionary(dict) => renumber_dictionary(dict, ids),
        Object::Stream(stream) => renumber_dictionary(&mut stream.dict, ids),
        _ => {}
    }
}

fn renumber_dictionary<F>(dict: &mut Dictionary, ids: &F)
where
    F: Fn(&ObjectId) -> Option<ObjectId>,
{
    for (_, value) in dict.iter_mut() {
        renumber(value, ids);
    }
}

/// Look `key` up along the /Parent chain of `page`
fn inherited_attribute(document: &Document, page: &Dictionary, key: &[u8]) -> Option<Object> {
    let mut parent = page.get(b"Parent").ok()?.as_reference().ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        let node = document.get_dictionary(parent).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        parent = node.get(b"Parent").ok()?.as_reference().ok()?;
    }
    None
}

/// Page codec over the pure-Rust `lopdf` crate. Stateless, so a single value
/// can be shared across threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfCodec;

impl LopdfCodec {
    pub fn new() -> Self {
        Self
    }

    fn extract_fragment(&self, source: &LoadedPdf, page_id: ObjectId) -> Result<PageFragment> {
        let document = &source.document;
        let mut page = document
            .get_dictionary(page_id)
            .map_err(|e| Error::Materialization {
                reason: format!("cannot read page object {:?}: {}", page_id, e),
            })?
            .clone();

        for key in INHERITABLE_KEYS {
            if !page.has(key) {
                if let Some(value) = inherited_attribute(document, &page, key) {
                    page.set(key.to_vec(), value);
                }
            }
        }
        page.remove(b"Parent");

        let mut objects = BTreeMap::new();
        let mut stack = Vec::new();
        push_dictionary_references(&page, &mut stack);

        while let Some(id) = stack.pop() {
            if id == page_id || objects.contains_key(&id) {
                continue;
            }
            // Links to other pages are dropped rather than dragging those pages in.
            if source.page_set.contains(&id) {
                continue;
            }
            match document.get_object(id) {
                Ok(object) => {
                    push_references(object, &mut stack);
                    objects.insert(id, object.clone());
                }
                Err(err) => {
                    warn!(?id, %err, "Cannot resolve reference, using Null");
                    objects.insert(id, Object::Null);
                }
            }
        }

        Ok(PageFragment {
            source: source.source,
            page_id,
            page,
            objects,
            created: BTreeMap::new(),
            next_id: document.max_id + 1,
        })
    }
}

impl PageCodec for LopdfCodec {
    type Document = LoadedPdf;
    type Page = PageFragment;

    #[instrument(skip_all, fields(bytes_len = bytes.len()))]
    fn load_document(&self, bytes: &[u8]) -> Result<LoadedPdf> {
        let document = Document::load_mem(bytes).map_err(|e| Error::InvalidPdf {
            reason: format!("failed to load PDF from memory: {}", e),
        })?;

        let pages: Vec<ObjectId> = document.get_pages().into_values().collect();
        let page_set = pages.iter().copied().collect();

        debug!(pages = pages.len(), "PDF loaded");

        Ok(LoadedPdf {
            source: NEXT_SOURCE.fetch_add(1, Ordering::Relaxed),
            document,
            pages,
            page_set,
        })
    }

    fn page_count(&self, document: &LoadedPdf) -> u32 {
        document.pages.len() as u32
    }

    #[instrument(skip(self, document, transform))]
    fn render_page(
        &self,
        document: &LoadedPdf,
        page_number: u32,
        transform: &Transform,
    ) -> Result<PageFragment> {
        let page_id = document
            .page_id(page_number)
            .ok_or_else(|| Error::Materialization {
                reason: format!(
                    "page {} not found (document has {} pages)",
                    page_number,
                    document.pages.len()
                ),
            })?;

        let mut fragment = self.extract_fragment(document, page_id)?;

        match transform {
            Transform::Identity => {}
            Transform::Rotate(rotation) => fragment.rotate(*rotation),
            Transform::Overlay(watermark) => fragment.overlay(watermark)?,
        }

        Ok(fragment)
    }

    #[instrument(skip_all, fields(pages = pages.len()))]
    fn write_document(&self, pages: Vec<PageFragment>) -> Result<Vec<u8>> {
        let mut output = Document::with_version("1.7");
        let pages_id = output.new_object_id();
        let mut kids = Vec::with_capacity(pages.len());

        // Source objects keep one output id per (document, id) across all
        // fragments; pages and created objects always get fresh ids.
        let mut shared: HashMap<(u64, ObjectId), ObjectId> = HashMap::new();

        for fragment in pages {
            let PageFragment {
                source,
                page_id,
                mut page,
                objects,
                created,
                ..
            } = fragment;

            let mut local = HashMap::with_capacity(created.len() + 1);
            let new_page_id = output.new_object_id();
            local.insert(page_id, new_page_id);
            for id in created.keys() {
                local.insert(*id, output.new_object_id());
            }

            let mut fresh = Vec::new();
            for (old_id, object) in objects {
                if !shared.contains_key(&(source, old_id)) {
                    shared.insert((source, old_id), output.new_object_id());
                    fresh.push((old_id, object));
                }
            }

            let ids = |id: &ObjectId| {
                local
                    .get(id)
                    .or_else(|| shared.get(&(source, *id)))
                    .copied()
            };

            for (old_id, mut object) in fresh {
                renumber(&mut object, &ids);
                if let Some(new_id) = shared.get(&(source, old_id)) {
                    output.objects.insert(*new_id, object);
                }
            }
            for (old_id, mut object) in created {
                renumber(&mut object, &ids);
                if let Some(new_id) = local.get(&old_id) {
                    output.objects.insert(*new_id, object);
                }
            }

            renumber_dictionary(&mut page, &ids);
            page.set("Parent", Object::Reference(pages_id));
            output.objects.insert(new_page_id, Object::Dictionary(page));
            kids.push(Object::Reference(new_page_id));
        }

        debug!(shared_objects = shared.len(), "Page objects renumbered");

        let page_count = kids.len() as i64;
        let page_tree = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(page_count)),
            ("Kids", Object::Array(kids)),
        ]);
        output.objects.insert(pages_id, Object::Dictionary(page_tree));

        let catalog = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]);
        let catalog_id = output.add_object(catalog);
        output.trailer.set("Root", Object::Reference(catalog_id));

        let mut buffer = Vec::new();
        output
            .save_to(&mut buffer)
            .map_err(|e| Error::Materialization {
                reason: format!("failed to serialise document: {}", e),
            })?;

        debug!(output_bytes = buffer.len(), "Document written");
        Ok(buffer)
    }
}
