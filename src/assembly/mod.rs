//! Page selection and document assembly
//!
//! Every page-level operation (merge, split, extract, rotate, watermark)
//! reduces to the same pipeline: parse range expressions, resolve them
//! against the source documents into an [`AssemblyPlan`], then have a codec
//! materialize the plan in order.

mod builder;
mod engine;
mod plan;
mod range;
mod request;

pub use builder::OutputBuilder;
pub use engine::{
    AssemblyEngine, DocumentHandle, OperationDescriptor, OperationKind, SourceSelection,
    ValidatedOperation, ValidatedSource,
};
pub use plan::{
    default_opacity, default_size, AssemblyPlan, DocumentId, PageReference, Rotation, Transform,
    TransformSpec, Watermark,
};
pub use range::{parse_page_range, RangeExpression, RangeToken};
pub use request::{assemble_document, AssembledDocument, AssemblyRequest, RequestState};
