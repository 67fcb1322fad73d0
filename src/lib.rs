//! PDF Assembler
//!
//! Page-level PDF assembly exposed as MCP tools:
//! - `merge_pdfs`: Concatenate documents, optionally selecting and transforming pages per source
//! - `split_pdf` / `extract_pages`: Build a document from a page range, in range order
//! - `rotate_pdf`: Rotate all or selected pages
//! - `watermark_pdf`: Overlay a text watermark on all or selected pages
//! - `compress_pdf`: Recompress a document with qpdf
//! - `get_page_count`: Count pages of one or more documents
//!
//! The [`assembly`] module holds the codec-independent core; [`pdf`] holds
//! the codecs that materialize its plans.

pub mod assembly;
pub mod config;
pub mod error;
pub mod pdf;
pub mod server;
pub mod source;

pub use assembly::{
    assemble_document, parse_page_range, AssembledDocument, OperationDescriptor, OperationKind,
};
pub use config::ServerConfig;
pub use error::{Error, Result};
pub use pdf::{LopdfCodec, PageCodec};
pub use server::{run_server, run_server_with_config, PdfServer, PdfSource};
