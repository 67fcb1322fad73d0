//! Codec capability boundary
//!
//! The assembly core never looks inside a PDF. Everything it needs from a
//! document engine goes through [`PageCodec`], so the engine can be swapped
//! or mocked without touching range parsing, planning or output ordering.

use crate::assembly::Transform;
use crate::error::Result;

/// Narrow interface to an external document engine.
///
/// Implementations must be re-entrant: one codec value is shared by every
/// concurrent request. An engine that is not thread-safe has to serialize
/// calls internally.
pub trait PageCodec: Send + Sync {
    /// Loaded source document. Dropping it releases every native resource.
    type Document: Send;
    /// A single page, already transformed, ready to be appended to an output
    type Page: Send;

    /// Decode a document from raw bytes
    fn load_document(&self, bytes: &[u8]) -> Result<Self::Document>;

    /// Number of pages in a loaded document
    fn page_count(&self, document: &Self::Document) -> u32;

    /// Produce page `page_number` (1-indexed) of `document` with `transform`
    /// applied. The source document is left untouched, so the same page can be
    /// rendered any number of times with different transforms.
    fn render_page(
        &self,
        document: &Self::Document,
        page_number: u32,
        transform: &Transform,
    ) -> Result<Self::Page>;

    /// Serialize pages, in the given order, into a new document
    fn write_document(&self, pages: Vec<Self::Page>) -> Result<Vec<u8>>;
}
