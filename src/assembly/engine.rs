//! Assembly engine: operation descriptors in, assembly plans out

use crate::assembly::plan::{AssemblyPlan, DocumentId, PageReference, Transform, TransformSpec};
use crate::assembly::range::RangeExpression;
use crate::error::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Page-level operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Merge,
    Split,
    Extract,
    Rotate,
    Watermark,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Merge => "merge",
            OperationKind::Split => "split",
            OperationKind::Extract => "extract",
            OperationKind::Rotate => "rotate",
            OperationKind::Watermark => "watermark",
        };
        f.write_str(name)
    }
}

/// Per-source part of a request: which pages, and what to do with them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceSelection {
    pub range: Option<String>,
    pub transform: Option<TransformSpec>,
}

impl SourceSelection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_range(range: impl Into<String>) -> Self {
        Self {
            range: Some(range.into()),
            transform: None,
        }
    }

    pub fn transform(mut self, transform: TransformSpec) -> Self {
        self.transform = Some(transform);
        self
    }
}

/// External-facing request shape. `sources[i]` applies to the i-th document
/// supplied with the request.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationDescriptor {
    pub kind: OperationKind,
    pub sources: Vec<SourceSelection>,
}

impl OperationDescriptor {
    /// Concatenate `count` documents in full
    pub fn merge(count: usize) -> Self {
        Self {
            kind: OperationKind::Merge,
            sources: vec![SourceSelection::all(); count],
        }
    }

    pub fn split(range: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Split,
            sources: vec![SourceSelection::with_range(range)],
        }
    }

    pub fn extract(range: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Extract,
            sources: vec![SourceSelection::with_range(range)],
        }
    }

    pub fn rotate(angle: i64, range: Option<String>) -> Self {
        Self {
            kind: OperationKind::Rotate,
            sources: vec![SourceSelection {
                range,
                transform: Some(TransformSpec::Rotate { angle }),
            }],
        }
    }

    pub fn watermark(text: impl Into<String>, opacity: f64, size: f64, range: Option<String>) -> Self {
        Self {
            kind: OperationKind::Watermark,
            sources: vec![SourceSelection {
                range,
                transform: Some(TransformSpec::Watermark {
                    text: text.into(),
                    opacity,
                    size,
                }),
            }],
        }
    }

    /// Check the descriptor's shape, range syntax and transform parameters.
    /// Nothing here depends on the documents themselves.
    pub fn validate(&self) -> Result<ValidatedOperation> {
        let kind = self.kind;
        match kind {
            OperationKind::Merge => {
                if self.sources.is_empty() {
                    return Err(Error::InvalidOperation {
                        reason: "merge requires at least one source".to_string(),
                    });
                }
            }
            _ => {
                if self.sources.len() != 1 {
                    return Err(Error::InvalidOperation {
                        reason: format!(
                            "{} requires exactly one source, got {}",
                            kind,
                            self.sources.len()
                        ),
                    });
                }
            }
        }

        let sources = self
            .sources
            .iter()
            .map(|source| validate_source(kind, source))
            .collect::<Result<Vec<_>>>()?;

        Ok(ValidatedOperation { kind, sources })
    }
}

fn validate_source(kind: OperationKind, source: &SourceSelection) -> Result<ValidatedSource> {
    let range = source
        .range
        .as_deref()
        .map(RangeExpression::parse)
        .transpose()?;

    let transform = source
        .transform
        .as_ref()
        .map(TransformSpec::validate)
        .transpose()?
        .unwrap_or_default();

    match kind {
        OperationKind::Split | OperationKind::Extract if range.is_none() => {
            return Err(Error::InvalidOperation {
                reason: format!("{} requires a page range", kind),
            });
        }
        OperationKind::Rotate if !matches!(transform, Transform::Rotate(_)) => {
            return Err(Error::InvalidOperation {
                reason: "rotate requires a rotation angle".to_string(),
            });
        }
        OperationKind::Watermark if !matches!(transform, Transform::Overlay(_)) => {
            return Err(Error::InvalidOperation {
                reason: "watermark requires watermark parameters".to_string(),
            });
        }
        _ => {}
    }

    Ok(ValidatedSource { range, transform })
}

/// A source whose range syntax and transform have been checked
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSource {
    pub range: Option<RangeExpression>,
    pub transform: Transform,
}

/// Descriptor that passed [`OperationDescriptor::validate`]
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedOperation {
    kind: OperationKind,
    sources: Vec<ValidatedSource>,
}

impl ValidatedOperation {
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn sources(&self) -> &[ValidatedSource] {
        &self.sources
    }
}

/// Request-scoped reference to a loaded source document
pub struct DocumentHandle<D> {
    id: DocumentId,
    page_count: u32,
    document: D,
}

impl<D> DocumentHandle<D> {
    pub fn new(id: DocumentId, page_count: u32, document: D) -> Self {
        Self {
            id,
            page_count,
            document,
        }
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn document(&self) -> &D {
        &self.document
    }
}

impl<D> fmt::Debug for DocumentHandle<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentHandle")
            .field("id", &self.id)
            .field("page_count", &self.page_count)
            .finish_non_exhaustive()
    }
}

/// Builds assembly plans from validated operations and loaded documents
#[derive(Debug, Clone, Copy, Default)]
pub struct AssemblyEngine;

impl AssemblyEngine {
    pub fn new() -> Self {
        Self
    }

    /// Resolve every source against its document and build the output plan.
    ///
    /// Sources are processed in order and the first failure aborts the whole
    /// plan; no partial plan is ever returned.
    pub fn assemble<D>(
        &self,
        operation: &ValidatedOperation,
        documents: &[DocumentHandle<D>],
    ) -> Result<AssemblyPlan> {
        if documents.len() != operation.sources.len() {
            return Err(Error::InvalidOperation {
                reason: format!(
                    "{} source selections for {} documents",
                    operation.sources.len(),
                    documents.len()
                ),
            });
        }

        let mut plan = AssemblyPlan::new();
        for (source, handle) in operation.sources.iter().zip(documents) {
            match operation.kind {
                OperationKind::Merge | OperationKind::Split | OperationKind::Extract => {
                    select_pages(&mut plan, source, handle)?
                }
                OperationKind::Rotate | OperationKind::Watermark => {
                    transform_selected(&mut plan, source, handle)?
                }
            }
        }
        Ok(plan)
    }
}

/// Emit the selected pages, in selection order, each with the source's transform
fn select_pages<D>(
    plan: &mut AssemblyPlan,
    source: &ValidatedSource,
    handle: &DocumentHandle<D>,
) -> Result<()> {
    let pages = resolve_selection(source, handle)?;
    plan.extend(
        pages
            .into_iter()
            .map(|page| PageReference::new(handle.id, page, source.transform.clone())),
    );
    Ok(())
}

/// Emit every page in document order; only selected pages get the transform
fn transform_selected<D>(
    plan: &mut AssemblyPlan,
    source: &ValidatedSource,
    handle: &DocumentHandle<D>,
) -> Result<()> {
    let selected: Option<HashSet<u32>> = match &source.range {
        Some(range) => Some(range.resolve(handle.page_count)?.into_iter().collect()),
        None => None,
    };

    plan.extend((1..=handle.page_count).map(|page| {
        let transform = match &selected {
            Some(pages) if !pages.contains(&page) => Transform::Identity,
            _ => source.transform.clone(),
        };
        PageReference::new(handle.id, page, transform)
    }));
    Ok(())
}

fn resolve_selection<D>(source: &ValidatedSource, handle: &DocumentHandle<D>) -> Result<Vec<u32>> {
    match &source.range {
        Some(range) => range.resolve(handle.page_count),
        None => Ok((1..=handle.page_count).collect()),
    }
}
