//! MCP Server implementation using rmcp

use crate::assembly::{
    assemble_document, default_opacity, default_size, OperationDescriptor, SourceSelection,
    TransformSpec,
};
use crate::config::ServerConfig;
use crate::error::Error;
use crate::pdf::{LopdfCodec, PageCodec, QpdfWrapper};
use crate::source::{
    resolve_base64, resolve_cache, resolve_path, resolve_url, CacheManager, ResolvedPdf,
};
use anyhow::Result;
use rmcp::{
    handler::server::tool::ToolRouter, handler::server::wrapper::Parameters, model::*,
    schemars::JsonSchema, tool, tool_handler, tool_router, ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// PDF source specification
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum PdfSource {
    /// File path (absolute or relative)
    Path {
        /// Path to the PDF file
        path: String,
    },
    /// Base64 encoded PDF data
    Base64 {
        /// Base64 encoded PDF content
        base64: String,
    },
    /// URL to download PDF from
    Url {
        /// URL of the PDF file
        url: String,
    },
    /// Reference to a PDF produced by an earlier tool call
    CacheRef {
        /// Cache key from previous operation
        cache_key: String,
    },
}

const SOURCE_KEYS: [&str; 4] = ["path", "base64", "url", "cache_key"];

impl<'de> serde::Deserialize<'de> for PdfSource {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;

        let Some(obj) = value.as_object() else {
            let kind = match &value {
                serde_json::Value::Array(_) => "an array",
                serde_json::Value::String(_) => "a string",
                serde_json::Value::Number(_) => "a number",
                serde_json::Value::Bool(_) => "a boolean",
                serde_json::Value::Null => "null",
                serde_json::Value::Object(_) => "an object",
            };
            return Err(serde::de::Error::custom(format!(
                "Invalid source: expected an object with one of {:?}, but got {}",
                SOURCE_KEYS, kind
            )));
        };

        for key in SOURCE_KEYS {
            let Some(v) = obj.get(key) else {
                continue;
            };
            let Some(s) = v.as_str() else {
                return Err(serde::de::Error::custom(format!(
                    "{:?} must be a string",
                    key
                )));
            };
            let s = s.to_string();
            return Ok(match key {
                "path" => PdfSource::Path { path: s },
                "base64" => PdfSource::Base64 { base64: s },
                "url" => PdfSource::Url { url: s },
                _ => PdfSource::CacheRef { cache_key: s },
            });
        }

        let keys: Vec<&String> = obj.keys().collect();
        Err(serde::de::Error::custom(format!(
            "Invalid source: expected an object with one of {:?}, but got keys: {:?}",
            SOURCE_KEYS, keys
        )))
    }
}

/// PDF Assembler server
#[derive(Clone)]
pub struct PdfServer {
    cache: Arc<RwLock<CacheManager>>,
    tool_router: ToolRouter<Self>,
    config: Arc<ServerConfig>,
}

// ============================================================================
// Request/Response types for merge_pdfs
// ============================================================================

/// Page selection and transform for one merge source
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct MergeSelection {
    /// Pages of this source to include, e.g. "1-3,7" (default: all pages)
    #[serde(default)]
    pub pages: Option<String>,
    /// Transform applied to every included page of this source
    #[serde(default)]
    pub transform: Option<TransformSpec>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct MergePdfsParams {
    /// Source PDFs, concatenated in this order
    pub sources: Vec<PdfSource>,
    /// Optional per-source selections; `selections[i]` applies to `sources[i]`.
    /// Sources without an entry are included in full.
    #[serde(default)]
    pub selections: Vec<MergeSelection>,
    /// Output file path (optional). If provided, saves the merged PDF to this path.
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct MergePdfsResult {
    /// Number of source PDFs merged
    pub source_count: u32,
    /// Cache key for the output PDF (always provided for chaining operations)
    pub output_cache_key: String,
    /// Number of pages in the output PDF
    pub output_page_count: u32,
    /// Output file path (if output_path was specified)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Request/Response types for split_pdf / extract_pages
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SelectPagesParams {
    /// Source PDF
    pub source: PdfSource,
    /// Page range expression, e.g. "1-3,6,8-10" or "3,1"
    pub pages: String,
    /// Output file path (optional). If provided, saves the output PDF to this path.
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct SelectPagesResult {
    /// Source identifier
    pub source: String,
    /// Cache key for the output PDF (always provided for chaining operations)
    pub output_cache_key: String,
    /// Number of pages in the output PDF
    pub output_page_count: u32,
    /// Output file path (if output_path was specified)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Request/Response types for rotate_pdf / watermark_pdf
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RotatePdfParams {
    /// Source PDF
    pub source: PdfSource,
    /// Clockwise rotation in degrees: 0, 90, 180 or 270
    pub angle: i64,
    /// Pages to rotate (default: all). Other pages are kept unchanged.
    #[serde(default)]
    pub pages: Option<String>,
    /// Output file path (optional). If provided, saves the rotated PDF to this path.
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WatermarkPdfParams {
    /// Source PDF
    pub source: PdfSource,
    /// Watermark text
    pub text: String,
    /// Fill opacity between 0 and 1 (default: 0.3)
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    /// Font size in points (default: 40)
    #[serde(default = "default_size")]
    pub size: f64,
    /// Pages to watermark (default: all). Other pages are kept unchanged.
    #[serde(default)]
    pub pages: Option<String>,
    /// Output file path (optional). If provided, saves the watermarked PDF to this path.
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct TransformPdfResult {
    /// Source identifier
    pub source: String,
    /// Cache key for the output PDF (always provided for chaining operations)
    pub output_cache_key: String,
    /// Number of pages in the output PDF
    pub output_page_count: u32,
    /// Number of pages that were rotated or watermarked
    pub transformed_pages: u32,
    /// Output file path (if output_path was specified)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Request/Response types for compress_pdf
// ============================================================================

fn default_object_streams() -> String {
    "generate".to_string()
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CompressPdfParams {
    /// Source PDF to compress
    pub source: PdfSource,
    /// Object streams mode: "generate" (best compression), "preserve", or "disable"
    #[serde(default = "default_object_streams")]
    pub object_streams: String,
    /// Output file path (optional). If provided, saves the compressed PDF to this path.
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct CompressPdfResult {
    /// Source identifier
    pub source: String,
    /// Cache key for the output PDF (always provided for chaining operations)
    pub output_cache_key: String,
    /// Original file size in bytes
    pub original_size: usize,
    /// Compressed file size in bytes
    pub compressed_size: usize,
    /// compressed_size / original_size
    pub compression_ratio: f32,
    /// Bytes saved (negative if the output grew)
    pub bytes_saved: i64,
    /// Number of pages in the output PDF
    pub output_page_count: u32,
    /// Output file path (if output_path was specified)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Request/Response types for get_page_count
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetPageCountParams {
    /// PDF sources to inspect
    pub sources: Vec<PdfSource>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct PageCountResult {
    /// Source identifier
    pub source: String,
    /// Number of pages
    pub page_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What a page-level operation produced
struct AssemblyOutput {
    output_cache_key: String,
    output_page_count: u32,
    transformed_pages: u32,
    output_path: Option<String>,
}

fn to_response<T: Serialize>(results: Vec<T>) -> String {
    let response = serde_json::json!({ "results": results });
    serde_json::to_string_pretty(&response).unwrap_or_default()
}

// ============================================================================
// Tool implementations
// ============================================================================

#[tool_router]
impl PdfServer {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    /// Create a new PdfServer with full configuration
    pub fn with_config(config: ServerConfig) -> Self {
        let cache = CacheManager::new(config.cache_max_entries, config.cache_max_bytes);
        Self {
            cache: Arc::new(RwLock::new(cache)),
            tool_router: Self::tool_router(),
            config: Arc::new(config),
        }
    }

    /// Merge multiple PDFs into one
    #[tool(
        description = "Merge multiple PDF files into a single PDF. Pages are concatenated in the order the sources are given, each source keeping its own page order. The output is always cached (output_cache_key) for chaining with other tools.

Optional selections[i] restricts sources[i] to a page range (\"pages\": \"1-3,7\") and/or applies a transform to its pages ({\"type\": \"rotate\", \"angle\": 90} or {\"type\": \"watermark\", \"text\": \"DRAFT\"}).

Source format: each element must be one of {\"path\": \"/absolute/path.pdf\"}, {\"url\": \"https://...\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn merge_pdfs(&self, Parameters(params): Parameters<MergePdfsParams>) -> String {
        let result = self
            .process_merge_pdfs(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "merge_pdfs failed");
                MergePdfsResult {
                    source_count: params.sources.len() as u32,
                    output_cache_key: String::new(),
                    output_page_count: 0,
                    output_path: None,
                    error: Some(e.client_message()),
                }
            });

        to_response(vec![result])
    }

    /// Split a PDF by page range
    #[tool(
        description = "Create a new PDF from a page range of the source. Same semantics as extract_pages.

Page range syntax: comma separated tokens, each a page number (\"5\") or an ascending inclusive range (\"2-4\"). Token order is output order and repeated pages are kept, e.g. \"3,1\" or \"1,1-2\".

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"url\": \"https://...\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn split_pdf(&self, Parameters(params): Parameters<SelectPagesParams>) -> String {
        let descriptor = OperationDescriptor::split(params.pages.clone());
        to_response(vec![self.select_pages("split_pdf", descriptor, &params).await])
    }

    /// Extract pages in an arbitrary order
    #[tool(
        description = "Extract pages from a PDF into a new PDF, in exactly the order given. Supports reordering and duplicates. The output is always cached (output_cache_key) for chaining with other tools.

Page range syntax: comma separated tokens, each a page number (\"5\") or an ascending inclusive range (\"2-4\"). Examples: \"1-3,6,8-10\", \"3,1\", \"1,1-2\".

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"url\": \"https://...\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn extract_pages(&self, Parameters(params): Parameters<SelectPagesParams>) -> String {
        let descriptor = OperationDescriptor::extract(params.pages.clone());
        to_response(vec![self.select_pages("extract_pages", descriptor, &params).await])
    }

    /// Rotate pages of a PDF
    #[tool(
        description = "Rotate pages of a PDF clockwise by 0, 90, 180 or 270 degrees. The rotation adds to any rotation the page already has. Optional \"pages\" restricts which pages rotate; the others pass through unchanged.

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"url\": \"https://...\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn rotate_pdf(&self, Parameters(params): Parameters<RotatePdfParams>) -> String {
        let descriptor = OperationDescriptor::rotate(params.angle, params.pages.clone());
        let result = self
            .transform_pages(descriptor, &params.source, &params.output_path)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "rotate_pdf failed");
                Self::failed_transform(&params.source, e)
            });

        to_response(vec![result])
    }

    /// Overlay a text watermark
    #[tool(
        description = "Overlay a text watermark on the pages of a PDF. Text is drawn in Helvetica, gray, at the given opacity (0-1, default 0.3) and font size (default 40). Optional \"pages\" restricts which pages get the watermark.

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"url\": \"https://...\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn watermark_pdf(&self, Parameters(params): Parameters<WatermarkPdfParams>) -> String {
        let descriptor = OperationDescriptor::watermark(
            params.text.clone(),
            params.opacity,
            params.size,
            params.pages.clone(),
        );
        let result = self
            .transform_pages(descriptor, &params.source, &params.output_path)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "watermark_pdf failed");
                Self::failed_transform(&params.source, e)
            });

        to_response(vec![result])
    }

    /// Compress a PDF
    #[tool(
        description = "Compress a PDF file to reduce its size using stream compression and object streams.

object_streams: \"generate\" (best compression), \"preserve\", or \"disable\"

The output is always cached (output_cache_key) for chaining with other tools.

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"url\": \"https://...\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn compress_pdf(&self, Parameters(params): Parameters<CompressPdfParams>) -> String {
        let result = self
            .process_compress_pdf(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "compress_pdf failed");
                CompressPdfResult {
                    source: Self::source_name(&params.source),
                    output_cache_key: String::new(),
                    original_size: 0,
                    compressed_size: 0,
                    compression_ratio: 1.0,
                    bytes_saved: 0,
                    output_page_count: 0,
                    output_path: None,
                    error: Some(e.client_message()),
                }
            });

        to_response(vec![result])
    }

    /// Count pages of one or more PDFs
    #[tool(
        description = "Get the page count of one or more PDFs. Useful for composing page range expressions.

Source format: each element must be one of {\"path\": \"/absolute/path.pdf\"}, {\"url\": \"https://...\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn get_page_count(&self, Parameters(params): Parameters<GetPageCountParams>) -> String {
        let mut results = Vec::with_capacity(params.sources.len());
        for source in &params.sources {
            let result = self
                .process_get_page_count(source)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "get_page_count failed");
                    PageCountResult {
                        source: Self::source_name(source),
                        page_count: 0,
                        error: Some(e.client_message()),
                    }
                });
            results.push(result);
        }

        to_response(results)
    }
}

impl PdfServer {
    fn source_name(source: &PdfSource) -> String {
        match source {
            PdfSource::Path { path } => path.clone(),
            PdfSource::Base64 { .. } => "<base64>".to_string(),
            PdfSource::Url { url } => url.clone(),
            PdfSource::CacheRef { cache_key } => format!("<cache:{}>", cache_key),
        }
    }

    async fn resolve_source(&self, source: &PdfSource) -> crate::error::Result<ResolvedPdf> {
        match source {
            PdfSource::Path { path } => {
                let path = self.validate_path_access(path)?;
                resolve_path(path)
            }
            PdfSource::Base64 { base64 } => resolve_base64(base64),
            PdfSource::Url { url } => {
                resolve_url(
                    url,
                    self.config.allow_private_urls,
                    self.config.max_download_bytes,
                )
                .await
            }
            PdfSource::CacheRef { cache_key } => resolve_cache(cache_key, &self.cache).await,
        }
    }

    /// Validate that a path is within allowed resource directories.
    /// If no resource_dirs are configured, all paths are allowed.
    fn validate_path_access(&self, path: &str) -> crate::error::Result<std::path::PathBuf> {
        if self.config.resource_dirs.is_empty() {
            return Ok(std::path::PathBuf::from(path));
        }

        let canonical = std::fs::canonicalize(path).map_err(|_| Error::PathAccessDenied {
            path: path.to_string(),
        })?;

        self.within_resource_dirs(canonical, path)
    }

    /// Validate that an output path is within allowed resource directories.
    /// Canonicalizes the parent directory since the output file may not exist yet.
    fn validate_output_path_access(&self, path: &str) -> crate::error::Result<std::path::PathBuf> {
        if self.config.resource_dirs.is_empty() {
            return Ok(std::path::PathBuf::from(path));
        }

        let path_obj = Path::new(path);
        let parent = match path_obj.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let file_name = path_obj.file_name().ok_or_else(|| Error::PathAccessDenied {
            path: path.to_string(),
        })?;

        let canonical_parent = std::fs::canonicalize(parent).map_err(|_| Error::PathAccessDenied {
            path: path.to_string(),
        })?;

        self.within_resource_dirs(canonical_parent.join(file_name), path)
    }

    fn within_resource_dirs(
        &self,
        canonical: std::path::PathBuf,
        requested: &str,
    ) -> crate::error::Result<std::path::PathBuf> {
        let allowed = self
            .config
            .resource_dirs
            .iter()
            .filter_map(|dir| std::fs::canonicalize(dir).ok())
            .any(|dir| canonical.starts_with(dir));

        if allowed {
            Ok(canonical)
        } else {
            Err(Error::PathAccessDenied {
                path: requested.to_string(),
            })
        }
    }

    /// Write output data to a file path, with sandbox validation.
    fn write_output(
        &self,
        output_path: &Option<String>,
        data: &[u8],
    ) -> crate::error::Result<Option<String>> {
        let Some(path_str) = output_path else {
            return Ok(None);
        };
        let path = self.validate_output_path_access(path_str)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        std::fs::write(&path, data)?;
        Ok(Some(path_str.clone()))
    }

    /// Store an output under a fresh key. Outputs are never shared between
    /// requests, so every call gets its own key.
    async fn cache_output(&self, data: Vec<u8>) -> String {
        let cache_guard = self.cache.write().await;
        let key = cache_guard.generate_unique_key();
        let size = data.len();
        if !cache_guard.put(key.clone(), data) {
            tracing::warn!(size, "Output larger than the cache budget, not cached");
        }
        key
    }

    /// Resolve the sources, run the descriptor through the assembly core on
    /// the blocking pool, then cache and optionally write the output.
    async fn run_assembly(
        &self,
        descriptor: OperationDescriptor,
        sources: &[PdfSource],
        output_path: &Option<String>,
    ) -> crate::error::Result<AssemblyOutput> {
        // Reject bad ranges and transforms before fetching anything.
        descriptor.validate()?;

        let mut inputs: Vec<Vec<u8>> = Vec::with_capacity(sources.len());
        for source in sources {
            inputs.push(self.resolve_source(source).await?.data);
        }

        let assembled = tokio::task::spawn_blocking(move || {
            assemble_document(&LopdfCodec::new(), descriptor, &inputs)
        })
        .await
        .map_err(|e| Error::Materialization {
            reason: format!("Task join error: {}", e),
        })??;

        let output_path = self.write_output(output_path, &assembled.data)?;
        let output_cache_key = self.cache_output(assembled.data).await;

        Ok(AssemblyOutput {
            output_cache_key,
            output_page_count: assembled.page_count,
            transformed_pages: assembled.transformed_pages,
            output_path,
        })
    }

    async fn process_merge_pdfs(
        &self,
        params: &MergePdfsParams,
    ) -> crate::error::Result<MergePdfsResult> {
        if params.sources.len() > self.config.max_sources {
            return Err(Error::InvalidOperation {
                reason: format!(
                    "{} sources exceed the limit of {}",
                    params.sources.len(),
                    self.config.max_sources
                ),
            });
        }
        if params.selections.len() > params.sources.len() {
            return Err(Error::InvalidOperation {
                reason: format!(
                    "{} selections for {} sources",
                    params.selections.len(),
                    params.sources.len()
                ),
            });
        }

        let mut descriptor = OperationDescriptor::merge(params.sources.len());
        for (slot, selection) in descriptor.sources.iter_mut().zip(&params.selections) {
            *slot = SourceSelection {
                range: selection.pages.clone(),
                transform: selection.transform.clone(),
            };
        }

        let output = self
            .run_assembly(descriptor, &params.sources, &params.output_path)
            .await?;

        Ok(MergePdfsResult {
            source_count: params.sources.len() as u32,
            output_cache_key: output.output_cache_key,
            output_page_count: output.output_page_count,
            output_path: output.output_path,
            error: None,
        })
    }

    async fn select_pages(
        &self,
        tool: &str,
        descriptor: OperationDescriptor,
        params: &SelectPagesParams,
    ) -> SelectPagesResult {
        let source = Self::source_name(&params.source);
        match self
            .run_assembly(
                descriptor,
                std::slice::from_ref(&params.source),
                &params.output_path,
            )
            .await
        {
            Ok(output) => SelectPagesResult {
                source,
                output_cache_key: output.output_cache_key,
                output_page_count: output.output_page_count,
                output_path: output.output_path,
                error: None,
            },
            Err(e) => {
                tracing::warn!(error = %e, tool, "page selection failed");
                SelectPagesResult {
                    source,
                    output_cache_key: String::new(),
                    output_page_count: 0,
                    output_path: None,
                    error: Some(e.client_message()),
                }
            }
        }
    }

    async fn transform_pages(
        &self,
        descriptor: OperationDescriptor,
        source: &PdfSource,
        output_path: &Option<String>,
    ) -> crate::error::Result<TransformPdfResult> {
        let output = self
            .run_assembly(descriptor, std::slice::from_ref(source), output_path)
            .await?;

        Ok(TransformPdfResult {
            source: Self::source_name(source),
            output_cache_key: output.output_cache_key,
            output_page_count: output.output_page_count,
            transformed_pages: output.transformed_pages,
            output_path: output.output_path,
            error: None,
        })
    }

    fn failed_transform(source: &PdfSource, e: Error) -> TransformPdfResult {
        TransformPdfResult {
            source: Self::source_name(source),
            output_cache_key: String::new(),
            output_page_count: 0,
            transformed_pages: 0,
            output_path: None,
            error: Some(e.client_message()),
        }
    }

    async fn process_compress_pdf(
        &self,
        params: &CompressPdfParams,
    ) -> crate::error::Result<CompressPdfResult> {
        let resolved = self.resolve_source(&params.source).await?;
        let source_name = resolved.source_name;
        let original_size = resolved.data.len();

        let data = resolved.data;
        let object_streams = params.object_streams.clone();

        let (output_data, output_page_count) = tokio::task::spawn_blocking(move || {
            let output_data = QpdfWrapper::compress(&data, Some(&object_streams))?;
            let output_page_count = QpdfWrapper::get_page_count(&output_data)?;
            Ok::<_, Error>((output_data, output_page_count))
        })
        .await
        .map_err(|e| Error::QpdfError {
            reason: format!("Task join error: {}", e),
        })??;

        let compressed_size = output_data.len();
        let compression_ratio = if original_size > 0 {
            compressed_size as f32 / original_size as f32
        } else {
            1.0
        };
        let bytes_saved = original_size as i64 - compressed_size as i64;

        let output_path = self.write_output(&params.output_path, &output_data)?;
        let output_cache_key = self.cache_output(output_data).await;

        Ok(CompressPdfResult {
            source: source_name,
            output_cache_key,
            original_size,
            compressed_size,
            compression_ratio,
            bytes_saved,
            output_page_count,
            output_path,
            error: None,
        })
    }

    async fn process_get_page_count(
        &self,
        source: &PdfSource,
    ) -> crate::error::Result<PageCountResult> {
        let resolved = self.resolve_source(source).await?;
        let data = resolved.data;

        // Counted by the assembly codec so the count is the bound ranges are
        // checked against.
        let page_count = tokio::task::spawn_blocking(move || {
            let codec = LopdfCodec::new();
            let document = codec.load_document(&data)?;
            Ok::<_, Error>(codec.page_count(&document))
        })
        .await
        .map_err(|e| Error::Materialization {
            reason: format!("Task join error: {}", e),
        })??;

        Ok(PageCountResult {
            source: resolved.source_name,
            page_count,
            error: None,
        })
    }
}

impl Default for PdfServer {
    fn default() -> Self {
        Self::new()
    }
}

#[tool_handler]
impl ServerHandler for PdfServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "PDF Assembler provides tools for merging, splitting, extracting, rotating, \
                 watermarking and compressing PDFs. Every output is cached under \
                 output_cache_key so it can be passed to the next tool as {\"cache_key\": ...}."
                    .into(),
            ),
        }
    }
}

/// Run the MCP server with default configuration
pub async fn run_server() -> Result<()> {
    run_server_with_config(ServerConfig::default()).await
}

/// Run the MCP server with full configuration
pub async fn run_server_with_config(config: ServerConfig) -> Result<()> {
    tracing::info!(
        resource_dirs = ?config.resource_dirs,
        max_sources = config.max_sources,
        "PDF Assembler configured"
    );
    let server = PdfServer::with_config(config);

    tracing::info!("PDF Assembler ready, waiting for connections...");

    let service = server.serve(rmcp::transport::io::stdio()).await?;
    service.waiting().await?;

    Ok(())
}
