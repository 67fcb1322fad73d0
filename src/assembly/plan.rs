//! Page references and assembly plans

use crate::error::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Index of a source document within one request (position in the
/// descriptor's source list).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(pub usize);

/// Quarter-turn page rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rotation {
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Angle in degrees, clockwise
    pub fn degrees(self) -> i64 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }
}

impl TryFrom<i64> for Rotation {
    type Error = Error;

    /// Only the exact angles 0, 90, 180 and 270 are accepted; nothing is
    /// rounded or reduced modulo 360.
    fn try_from(angle: i64) -> Result<Self> {
        match angle {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            other => Err(Error::InvalidTransform {
                reason: format!("rotation angle {} is not one of 0, 90, 180, 270", other),
            }),
        }
    }
}

/// Validated text watermark
#[derive(Debug, Clone, PartialEq)]
pub struct Watermark {
    text: String,
    opacity: f64,
    size: f64,
}

impl Watermark {
    /// Validate watermark parameters: non-empty text, opacity in `[0, 1]`,
    /// size strictly positive. NaN and infinities are rejected.
    pub fn new(text: impl Into<String>, opacity: f64, size: f64) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(Error::InvalidTransform {
                reason: "watermark text must not be empty".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&opacity) {
            return Err(Error::InvalidTransform {
                reason: format!("watermark opacity {} is outside [0, 1]", opacity),
            });
        }
        if !size.is_finite() || size <= 0.0 {
            return Err(Error::InvalidTransform {
                reason: format!("watermark size {} must be greater than 0", size),
            });
        }
        Ok(Self {
            text,
            opacity,
            size,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    pub fn size(&self) -> f64 {
        self.size
    }
}

/// Unvalidated transform parameters as supplied by a caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformSpec {
    /// Rotate pages clockwise by `angle` degrees (0, 90, 180 or 270)
    Rotate { angle: i64 },
    /// Overlay a text watermark
    Watermark {
        /// Watermark text
        text: String,
        /// Fill opacity between 0 and 1 (default: 0.3)
        #[serde(default = "default_opacity")]
        opacity: f64,
        /// Font size in points (default: 40)
        #[serde(default = "default_size")]
        size: f64,
    },
}

pub fn default_opacity() -> f64 {
    0.3
}

pub fn default_size() -> f64 {
    40.0
}

impl TransformSpec {
    /// Validate the parameters into a [`Transform`]
    pub fn validate(&self) -> Result<Transform> {
        match self {
            TransformSpec::Rotate { angle } => Ok(Transform::Rotate(Rotation::try_from(*angle)?)),
            TransformSpec::Watermark {
                text,
                opacity,
                size,
            } => Ok(Transform::Overlay(Arc::new(Watermark::new(
                text.clone(),
                *opacity,
                *size,
            )?))),
        }
    }
}

/// Per-page operation recorded alongside a page reference and applied at
/// materialization time. Source pages are never mutated.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Transform {
    #[default]
    Identity,
    Rotate(Rotation),
    Overlay(Arc<Watermark>),
}

impl Transform {
    pub fn is_identity(&self) -> bool {
        matches!(self, Transform::Identity)
    }
}

/// One page of the output: which source page, and how to transform it
#[derive(Debug, Clone, PartialEq)]
pub struct PageReference {
    pub source: DocumentId,
    /// 1-indexed page number within the source document
    pub page: u32,
    pub transform: Transform,
}

impl PageReference {
    pub fn new(source: DocumentId, page: u32, transform: Transform) -> Self {
        Self {
            source,
            page,
            transform,
        }
    }
}

/// Fully resolved, ordered list of page references. The output document has
/// exactly these pages, in exactly this order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AssemblyPlan {
    pages: Vec<PageReference>,
}

impl AssemblyPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, reference: PageReference) {
        self.pages.push(reference);
    }

    pub fn pages(&self) -> &[PageReference] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// `(source, page)` pairs in output order, without transforms
    pub fn page_order(&self) -> Vec<(DocumentId, u32)> {
        self.pages.iter().map(|r| (r.source, r.page)).collect()
    }

    /// Number of references carrying a non-identity transform
    pub fn transformed_count(&self) -> usize {
        self.pages
            .iter()
            .filter(|r| !r.transform.is_identity())
            .count()
    }
}

impl Extend<PageReference> for AssemblyPlan {
    fn extend<I: IntoIterator<Item = PageReference>>(&mut self, iter: I) {
        self.pages.extend(iter);
    }
}

impl IntoIterator for AssemblyPlan {
    type Item = PageReference;
    type IntoIter = std::vec::IntoIter<PageReference>;

    fn into_iter(self) -> Self::IntoIter {
        self.pages.into_iter()
    }
}
