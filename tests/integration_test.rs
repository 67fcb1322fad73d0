//! End-to-end tests for the assembly pipeline over real PDF bytes

mod common;

use common::{fixture_pdf, labelled, markers, page_texts, rotations};
use pdf_assembler::assembly::{
    assemble_document, AssemblyRequest, OperationDescriptor, RequestState, SourceSelection,
    TransformSpec,
};
use pdf_assembler::pdf::{LopdfCodec, QpdfWrapper};
use pdf_assembler::Error;
use pretty_assertions::assert_eq;

fn run(descriptor: OperationDescriptor, inputs: &[Vec<u8>]) -> pdf_assembler::Result<Vec<u8>> {
    assemble_document(&LopdfCodec::new(), descriptor, inputs).map(|output| output.data)
}

#[test]
fn test_merge_three_and_two_pages() {
    let output = run(
        OperationDescriptor::merge(2),
        &[labelled("A", 3), labelled("B", 2)],
    )
    .unwrap();

    assert_eq!(markers(&output), vec!["A1", "A2", "A3", "B1", "B2"]);
    assert_eq!(QpdfWrapper::get_page_count(&output).unwrap(), 5);
}

#[test]
fn test_merge_is_associative() {
    let (a, b, c) = (labelled("A", 2), labelled("B", 1), labelled("C", 3));

    let ab = run(OperationDescriptor::merge(2), &[a.clone(), b.clone()]).unwrap();
    let nested = run(OperationDescriptor::merge(2), &[ab, c.clone()]).unwrap();
    let flat = run(OperationDescriptor::merge(3), &[a, b, c]).unwrap();

    assert_eq!(markers(&nested), markers(&flat));
    assert_eq!(markers(&flat), vec!["A1", "A2", "B1", "C1", "C2", "C3"]);
}

#[test]
fn test_merge_same_document_twice() {
    let a = labelled("A", 2);
    let output = run(OperationDescriptor::merge(2), &[a.clone(), a]).unwrap();
    assert_eq!(markers(&output), vec!["A1", "A2", "A1", "A2"]);
}

#[test]
fn test_merge_with_per_source_selection() {
    let mut descriptor = OperationDescriptor::merge(2);
    descriptor.sources[1] =
        SourceSelection::with_range("2").transform(TransformSpec::Rotate { angle: 90 });

    let output = run(descriptor, &[labelled("A", 2), labelled("B", 3)]).unwrap();
    assert_eq!(markers(&output), vec!["A1", "A2", "B2"]);
    assert_eq!(rotations(&output), vec![0, 0, 90]);
}

#[test]
fn test_extract_reorders() {
    let output = run(OperationDescriptor::extract("3,1"), &[labelled("P", 5)]).unwrap();
    assert_eq!(markers(&output), vec!["P3", "P1"]);
}

#[test]
fn test_extract_ranges_and_duplicates() {
    let source = labelled("P", 10);

    let output = run(OperationDescriptor::extract("1-3,6,8-10"), &[source.clone()]).unwrap();
    assert_eq!(
        markers(&output),
        vec!["P1", "P2", "P3", "P6", "P8", "P9", "P10"]
    );

    let output = run(OperationDescriptor::split("1,1-2"), &[source]).unwrap();
    assert_eq!(markers(&output), vec!["P1", "P1", "P2"]);
}

#[test]
fn test_extract_then_extract_all_is_idempotent() {
    let first = run(OperationDescriptor::extract("5,2-3"), &[labelled("P", 6)]).unwrap();
    let again = run(OperationDescriptor::extract("1-3"), &[first.clone()]).unwrap();
    assert_eq!(markers(&again), markers(&first));
}

#[test]
fn test_rotate_selected_pages_adds_to_existing_rotation() {
    let source = fixture_pdf("P", 4, &[2]);
    let output = run(
        OperationDescriptor::rotate(270, Some("2-3".to_string())),
        &[source],
    )
    .unwrap();

    // 90 + 270 wraps to 0
    assert_eq!(rotations(&output), vec![0, 0, 270, 0]);
    assert_eq!(markers(&output), vec!["P1", "P2", "P3", "P4"]);
}

#[test]
fn test_duplicate_pages_are_transformed_independently() {
    let mut descriptor = OperationDescriptor::merge(2);
    descriptor.sources[0] =
        SourceSelection::with_range("1").transform(TransformSpec::Rotate { angle: 180 });
    descriptor.sources[1] = SourceSelection::with_range("1");

    let a = labelled("A", 1);
    let output = run(descriptor, &[a.clone(), a]).unwrap();
    assert_eq!(markers(&output), vec!["A1", "A1"]);
    assert_eq!(rotations(&output), vec![180, 0]);
}

#[test]
fn test_watermark_selected_pages() {
    let output = run(
        OperationDescriptor::watermark("CONFIDENTIAL", 0.5, 32.0, Some("1,3".to_string())),
        &[labelled("P", 3)],
    )
    .unwrap();

    let texts = page_texts(&output);
    assert_eq!(texts[0], vec!["P1", "CONFIDENTIAL"]);
    assert_eq!(texts[1], vec!["P2"]);
    assert_eq!(texts[2], vec!["P3", "CONFIDENTIAL"]);
}

#[test]
fn test_output_survives_qpdf_compression() {
    let merged = run(
        OperationDescriptor::merge(2),
        &[labelled("A", 2), labelled("B", 2)],
    )
    .unwrap();
    let compressed = QpdfWrapper::compress(&merged, None).unwrap();

    assert_eq!(QpdfWrapper::get_page_count(&compressed).unwrap(), 4);
    assert_eq!(markers(&compressed), vec!["A1", "A2", "B1", "B2"]);
}

#[test]
fn test_validation_errors() {
    let source = labelled("P", 10);
    let attempt = |descriptor| run(descriptor, std::slice::from_ref(&source));

    assert!(matches!(
        attempt(OperationDescriptor::extract("")),
        Err(Error::EmptySelection)
    ));
    assert!(matches!(
        attempt(OperationDescriptor::extract("5-2")),
        Err(Error::RangeOrder { start: 5, end: 2 })
    ));
    assert!(matches!(
        attempt(OperationDescriptor::extract("11")),
        Err(Error::PageOutOfBounds { page: 11, total: 10 })
    ));
    assert!(matches!(
        attempt(OperationDescriptor::extract("1-2-3")),
        Err(Error::RangeSyntax { .. })
    ));
    assert!(matches!(
        attempt(OperationDescriptor::rotate(360, None)),
        Err(Error::InvalidTransform { .. })
    ));
    assert!(matches!(
        attempt(OperationDescriptor::watermark("X", 1.5, 40.0, None)),
        Err(Error::InvalidTransform { .. })
    ));
}

#[test]
fn test_invalid_pdf_fails_request() {
    let codec = LopdfCodec::new();
    let mut request = AssemblyRequest::new(&codec, OperationDescriptor::merge(2));
    let result = request.run(&[labelled("A", 1), b"%PDF-1.7 truncated".to_vec()]);

    assert!(matches!(result, Err(Error::InvalidPdf { .. })));
    assert!(matches!(request.state(), RequestState::Failed(_)));
}

#[test]
fn test_request_reaches_complete() {
    let codec = LopdfCodec::new();
    let mut request = AssemblyRequest::new(&codec, OperationDescriptor::split("2"));
    let output = request.run(&[labelled("P", 2)]).unwrap();

    assert_eq!(request.state(), &RequestState::Complete);
    assert_eq!(output.page_count, 1);
    assert_eq!(output.transformed_pages, 0);
}
