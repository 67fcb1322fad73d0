//! qpdf FFI wrapper for whole-document operations
//!
//! Page assembly goes through [`crate::pdf::PageCodec`]; qpdf handles the
//! operations that rewrite a document as a whole (stream compression) and
//! acts as an independent reader for counting pages of finished outputs.

use crate::error::{Error, Result};
use qpdf::{ObjectStreamMode, QPdf};

/// Wrapper for qpdf operations via FFI
pub struct QpdfWrapper;

/// Map qpdf crate errors to our error types
fn map_qpdf_error(e: qpdf::QPdfError) -> Error {
    Error::QpdfError {
        reason: e.to_string(),
    }
}

impl QpdfWrapper {
    /// Compress a PDF by optimizing streams and removing redundancy
    ///
    /// # Arguments
    /// * `input_data` - Raw PDF bytes
    /// * `object_streams` - "generate" (default), "preserve" or "disable"
    ///
    /// # Returns
    /// The compressed PDF as bytes
    pub fn compress(input_data: &[u8], object_streams: Option<&str>) -> Result<Vec<u8>> {
        let qpdf = QPdf::read_from_memory(input_data).map_err(map_qpdf_error)?;

        let os_mode = match object_streams.unwrap_or("generate") {
            "preserve" => ObjectStreamMode::Preserve,
            "disable" => ObjectStreamMode::Disable,
            _ => ObjectStreamMode::Generate,
        };

        let mut writer = qpdf.writer();
        writer
            .object_stream_mode(os_mode)
            .compress_streams(true)
            .normalize_content(true)
            .preserve_unreferenced_objects(false);
        writer.write_to_memory().map_err(map_qpdf_error)
    }

    /// Get the page count of a PDF
    pub fn get_page_count(input_data: &[u8]) -> Result<u32> {
        let qpdf = QPdf::read_from_memory(input_data).map_err(map_qpdf_error)?;
        qpdf.get_num_pages().map_err(map_qpdf_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::test_support::create_test_pdf;

    #[test]
    fn test_get_page_count() {
        let pdf = create_test_pdf("A", 3);
        assert_eq!(QpdfWrapper::get_page_count(&pdf).unwrap(), 3);
    }

    #[test]
    fn test_compress_keeps_pages() {
        let pdf = create_test_pdf("A", 4);
        let compressed = QpdfWrapper::compress(&pdf, None).unwrap();
        assert_eq!(QpdfWrapper::get_page_count(&compressed).unwrap(), 4);
    }

    #[test]
    fn test_invalid_input() {
        assert!(matches!(
            QpdfWrapper::get_page_count(b"garbage"),
            Err(Error::QpdfError { .. })
        ));
    }
}
