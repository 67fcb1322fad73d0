//! PDF processing layer
//!
//! Codec implementations behind the assembly core: `lopdf` for page-level
//! work and qpdf for whole-document rewrites.

mod codec;
mod lopdf_codec;
mod qpdf;

#[cfg(test)]
pub(crate) mod test_support;

pub use codec::PageCodec;
pub use lopdf_codec::{LoadedPdf, LopdfCodec, PageFragment};
pub use qpdf::QpdfWrapper;
