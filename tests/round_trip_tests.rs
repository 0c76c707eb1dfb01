//! Text round trip over the fixture files in `tests/fixtures`.

use std::fs;
use std::path::Path;

use sparse_buffer::asm::{parse_sparse_buffer, try_parse_sparse_buffer, ParseError};
use sparse_buffer::core::TypeError;
use sparse_buffer::types::NdType;

/// Non-empty, non-comment lines of a fixture file with their line numbers.
fn fixture_lines(name: &str) -> Vec<(usize, String)> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name);
    let content = fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read {}: {e}", path.display()));
    content
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim().to_string()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with("//"))
        .collect()
}

#[test]
fn test_canonical_fixtures_round_trip() {
    let _ = env_logger::builder().is_test(true).try_init();

    let lines = fixture_lines("sparse_types.txt");
    assert!(lines.len() >= 10);
    for (line_no, line) in lines {
        let parsed =
            try_parse_sparse_buffer(&line).unwrap_or_else(|e| panic!("line {line_no}: {e}"));
        let printed = parsed.to_string();
        assert_eq!(printed, line, "line {line_no} is not printed canonically");
        assert_eq!(try_parse_sparse_buffer(&printed), Ok(parsed), "line {line_no}");
    }
}

#[test]
fn test_invalid_fixtures_rejected() {
    let _ = env_logger::builder().is_test(true).try_init();

    let lines = fixture_lines("invalid_sparse_types.txt");
    assert!(!lines.is_empty());
    for (line_no, line) in lines {
        assert!(parse_sparse_buffer(&line).is_none(), "line {line_no} was accepted: {line}");
    }
}

#[test]
fn test_whitespace_and_prefix_are_not_significant() {
    let canonical = "!sparse_buffer<data=memref<1x16x8x8xf16, #NHWC, @CMX_NN>, \
                     sparsity_map=memref<1x16x8x8xi1, #NHWC, @CMX_NN>>";
    let loose = "  <data = memref<1x16x8x8xf16,#NHWC,@CMX_NN> ,\
                 sparsity_map= memref<1x16x8x8xi1 , #NHWC , @CMX_NN> >  ";
    assert_eq!(parse_sparse_buffer(loose), parse_sparse_buffer(canonical));
    assert!(parse_sparse_buffer(loose).is_some());
}

#[test]
fn test_errors_carry_position_and_cause() {
    let text = "!sparse_buffer<data=memref<1x16x8x8xf16, #NHWC, @CMX_NN>, \
                storage_element_table=memref<1x3x8x8xi32, #NHWC, @CMX_NN>>";
    match try_parse_sparse_buffer(text) {
        Err(ParseError::Invalid {
            pos,
            source: TypeError::InvalidStorageElementTable { .. },
        }) => assert_eq!(pos, text.len()),
        other => panic!("unexpected result {other:?}"),
    }

    let text = "!sparse_buffer<data=memref<1x16x8x8xf16, #NHWC, @CMX_NN>, bogus>";
    match try_parse_sparse_buffer(text) {
        Err(ParseError::Unexpected { pos, .. }) => assert_eq!(&text[pos..], "bogus>"),
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn test_effective_shape_survives_round_trip() {
    let text = "!sparse_buffer<data=memref<1x16x4x4xf16, #NHWC, @CMX_NN>, \
                #se_upsampling<factors = [1, 1], padding = [1, 1, 1, 1]>>";
    let parsed = try_parse_sparse_buffer(text).unwrap();
    assert_eq!(parsed.shape().raw(), &[1, 16, 9, 9]);
    assert_eq!(parsed.data().shape().raw(), &[1, 16, 4, 4]);
    assert_eq!(try_parse_sparse_buffer(&parsed.to_string()).unwrap(), parsed);
}
