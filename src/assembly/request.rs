//! Per-request lifecycle
//!
//! `Received -> Validating -> Planning -> Materializing -> Complete`, where
//! validating, planning and materializing may instead end in `Failed`.
//! There is no partially complete state.

use crate::assembly::builder::OutputBuilder;
use crate::assembly::engine::{AssemblyEngine, DocumentHandle, OperationDescriptor, OperationKind};
use crate::assembly::plan::DocumentId;
use crate::error::{Error, Result};
use crate::pdf::PageCodec;
use std::fmt;
use tracing::{debug, info, instrument};

/// Lifecycle state of one assembly request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestState {
    Received,
    Validating,
    Planning,
    Materializing,
    Complete,
    Failed(String),
}

impl RequestState {
    fn can_advance_to(&self, next: &RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, next),
            (Received, Validating)
                | (Validating, Planning)
                | (Planning, Materializing)
                | (Materializing, Complete)
                | (Validating | Planning | Materializing, Failed(_))
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Complete | RequestState::Failed(_))
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestState::Received => f.write_str("received"),
            RequestState::Validating => f.write_str("validating"),
            RequestState::Planning => f.write_str("planning"),
            RequestState::Materializing => f.write_str("materializing"),
            RequestState::Complete => f.write_str("complete"),
            RequestState::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// A fully materialized output document
#[derive(Debug, Clone)]
pub struct AssembledDocument {
    pub kind: OperationKind,
    pub data: Vec<u8>,
    pub page_count: u32,
    /// Pages that received a rotation or overlay
    pub transformed_pages: u32,
}

/// Drives one operation through the request lifecycle
pub struct AssemblyRequest<'c, C> {
    codec: &'c C,
    descriptor: OperationDescriptor,
    state: RequestState,
}

impl<'c, C: PageCodec> AssemblyRequest<'c, C> {
    pub fn new(codec: &'c C, descriptor: OperationDescriptor) -> Self {
        Self {
            codec,
            descriptor,
            state: RequestState::Received,
        }
    }

    pub fn state(&self) -> &RequestState {
        &self.state
    }

    fn advance(&mut self, next: RequestState) {
        debug_assert!(
            self.state.can_advance_to(&next),
            "invalid transition {} -> {}",
            self.state,
            next
        );
        debug!(from = %self.state, to = %next, "Request state transition");
        self.state = next;
    }

    /// Run the request to completion. `inputs[i]` is the raw document for
    /// `descriptor.sources[i]`. Loaded documents are dropped on every exit
    /// path. A request runs once; later calls fail with `InvalidOperation`
    /// and leave the state untouched.
    #[instrument(skip_all, fields(kind = %self.descriptor.kind, inputs = inputs.len()))]
    pub fn run<B: AsRef<[u8]>>(&mut self, inputs: &[B]) -> Result<AssembledDocument> {
        if self.state != RequestState::Received {
            return Err(Error::InvalidOperation {
                reason: format!("request already ran (state: {})", self.state),
            });
        }

        let result = self.execute(inputs);
        if let Err(e) = &result {
            self.advance(RequestState::Failed(e.to_string()));
        }
        result
    }

    fn execute<B: AsRef<[u8]>>(&mut self, inputs: &[B]) -> Result<AssembledDocument> {
        self.advance(RequestState::Validating);
        let operation = self.descriptor.validate()?;
        if inputs.len() != operation.sources().len() {
            return Err(Error::InvalidOperation {
                reason: format!(
                    "{} documents supplied for {} source selections",
                    inputs.len(),
                    operation.sources().len()
                ),
            });
        }

        let documents = inputs
            .iter()
            .enumerate()
            .map(|(index, bytes)| {
                let document = self.codec.load_document(bytes.as_ref())?;
                let page_count = self.codec.page_count(&document);
                Ok(DocumentHandle::new(DocumentId(index), page_count, document))
            })
            .collect::<Result<Vec<_>>>()?;

        self.advance(RequestState::Planning);
        let plan = AssemblyEngine::new().assemble(&operation, &documents)?;
        debug!(
            pages = plan.len(),
            transformed = plan.transformed_count(),
            "Plan built"
        );

        self.advance(RequestState::Materializing);
        let data = OutputBuilder::new(self.codec).build(&plan, &documents)?;

        self.advance(RequestState::Complete);
        info!(
            kind = %operation.kind(),
            pages = plan.len(),
            output_bytes = data.len(),
            "Assembly complete"
        );

        Ok(AssembledDocument {
            kind: operation.kind(),
            data,
            page_count: plan.len() as u32,
            transformed_pages: plan.transformed_count() as u32,
        })
    }
}

/// Run `descriptor` over `inputs` with `codec` in one call
pub fn assemble_document<C: PageCodec, B: AsRef<[u8]>>(
    codec: &C,
    descriptor: OperationDescriptor,
    inputs: &[B],
) -> Result<AssembledDocument> {
    AssemblyRequest::new(codec, descriptor).run(inputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::plan::Transform;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Documents are byte strings, one page per byte. Counts renders so
    /// tests can prove validation failures never reach materialization.
    #[derive(Default)]
    struct CountingCodec {
        renders: AtomicUsize,
    }

    impl PageCodec for CountingCodec {
        type Document = Vec<u8>;
        type Page = u8;

        fn load_document(&self, bytes: &[u8]) -> Result<Vec<u8>> {
            if bytes.starts_with(b"!") {
                return Err(Error::InvalidPdf {
                    reason: "bad header".to_string(),
                });
            }
            Ok(bytes.to_vec())
        }

        fn page_count(&self, document: &Vec<u8>) -> u32 {
            document.len() as u32
        }

        fn render_page(&self, document: &Vec<u8>, page: u32, _: &Transform) -> Result<u8> {
            self.renders.fetch_add(1, Ordering::SeqCst);
            Ok(document[(page - 1) as usize])
        }

        fn write_document(&self, pages: Vec<u8>) -> Result<Vec<u8>> {
            Ok(pages)
        }
    }

    #[test]
    fn test_merge_end_to_end() {
        let codec = CountingCodec::default();
        let mut request = AssemblyRequest::new(&codec, OperationDescriptor::merge(2));
        let output = request.run(&[b"abc".as_slice(), b"de".as_slice()]).unwrap();
        assert_eq!(output.data, b"abcde".to_vec());
        assert_eq!(output.page_count, 5);
        assert_eq!(request.state(), &RequestState::Complete);
    }

    #[test]
    fn test_merge_is_associative() {
        let codec = CountingCodec::default();
        let ab = assemble_document(&codec, OperationDescriptor::merge(2), &[b"ab", b"cd"]).unwrap();
        let left =
            assemble_document(&codec, OperationDescriptor::merge(2), &[ab.data, b"ef".to_vec()])
                .unwrap();
        let flat = assemble_document(
            &codec,
            OperationDescriptor::merge(3),
            &[b"ab", b"cd", b"ef"],
        )
        .unwrap();
        assert_eq!(left.data, flat.data);
    }

    #[test]
    fn test_extract_then_extract_all_is_idempotent() {
        let codec = CountingCodec::default();
        let first =
            assemble_document(&codec, OperationDescriptor::extract("4,2-3"), &[b"abcde"]).unwrap();
        let again = assemble_document(
            &codec,
            OperationDescriptor::extract(format!("1-{}", first.page_count)),
            &[first.data.clone()],
        )
        .unwrap();
        assert_eq!(first.data, b"dbc".to_vec());
        assert_eq!(again.data, first.data);
    }

    #[test]
    fn test_bounds_error_never_materializes() {
        let codec = CountingCodec::default();
        let mut request = AssemblyRequest::new(&codec, OperationDescriptor::extract("1,9"));
        let result = request.run(&[b"abc"]);
        assert!(matches!(result, Err(Error::PageOutOfBounds { page: 9, .. })));
        assert_eq!(codec.renders.load(Ordering::SeqCst), 0);
        assert!(matches!(request.state(), RequestState::Failed(_)));
    }

    #[test]
    fn test_load_failure_fails_request() {
        let codec = CountingCodec::default();
        let mut request = AssemblyRequest::new(&codec, OperationDescriptor::merge(2));
        let result = request.run(&[b"abc".as_slice(), b"!x".as_slice()]);
        assert!(matches!(result, Err(Error::InvalidPdf { .. })));
        assert!(request.state().is_terminal());
    }

    #[test]
    fn test_second_run_is_rejected() {
        let codec = CountingCodec::default();
        let mut request = AssemblyRequest::new(&codec, OperationDescriptor::extract("2"));
        request.run(&[b"abc"]).unwrap();

        let again = request.run(&[b"abc"]);
        assert!(matches!(again, Err(Error::InvalidOperation { .. })));
        assert_eq!(request.state(), &RequestState::Complete);
        assert_eq!(codec.renders.load(Ordering::SeqCst), 1);

        let mut failed = AssemblyRequest::new(&codec, OperationDescriptor::extract("9"));
        assert!(failed.run(&[b"abc"]).is_err());
        assert!(matches!(
            failed.run(&[b"abc"]),
            Err(Error::InvalidOperation { .. })
        ));
        assert!(matches!(failed.state(), RequestState::Failed(_)));
    }

    #[test]
    fn test_input_count_mismatch() {
        let codec = CountingCodec::default();
        let result = assemble_document(&codec, OperationDescriptor::merge(2), &[b"abc"]);
        assert!(matches!(result, Err(Error::InvalidOperation { .. })));
    }

    #[test]
    fn test_state_transitions() {
        use RequestState::*;
        assert!(Received.can_advance_to(&Validating));
        assert!(Validating.can_advance_to(&Failed(String::new())));
        assert!(Materializing.can_advance_to(&Failed(String::new())));
        assert!(!Received.can_advance_to(&Complete));
        assert!(!Planning.can_advance_to(&Complete));
        assert!(!Complete.can_advance_to(&Failed(String::new())));
    }
}
