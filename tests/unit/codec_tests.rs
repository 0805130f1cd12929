use bytes::BytesMut;
use tokio_util::codec::Decoder;

use verifier_supervisor::process::codec::{is_recoverable, OutputCodec, MAX_LINE_BYTES};

#[test]
fn splits_lines_without_newline() {
    let mut codec = OutputCodec::new();
    let mut buf = BytesMut::from("{\"type\":\"Start\"}\nplain\n");

    assert_eq!(
        codec.decode(&mut buf).expect("decode"),
        Some("{\"type\":\"Start\"}".to_owned())
    );
    assert_eq!(codec.decode(&mut buf).expect("decode"), Some("plain".to_owned()));
    assert_eq!(codec.decode(&mut buf).expect("decode"), None);
}

#[test]
fn partial_line_waits_for_newline() {
    let mut codec = OutputCodec::new();
    let mut buf = BytesMut::from("\"x@1 -> ");
    assert_eq!(codec.decode(&mut buf).expect("decode"), None);

    buf.extend_from_slice(b"5\"\n");
    assert_eq!(
        codec.decode(&mut buf).expect("decode"),
        Some("\"x@1 -> 5\"".to_owned())
    );
}

#[test]
fn trailing_line_is_flushed_at_eof() {
    let mut codec = OutputCodec::new();
    let mut buf = BytesMut::from("no newline");
    assert_eq!(
        codec.decode_eof(&mut buf).expect("decode"),
        Some("no newline".to_owned())
    );
}

#[test]
fn oversized_line_is_recoverable_error() {
    let mut codec = OutputCodec::new();
    let mut buf = BytesMut::from(vec![b'a'; MAX_LINE_BYTES + 1].as_slice());

    let err = codec.decode(&mut buf).expect_err("line too long");
    assert!(is_recoverable(&err), "unexpected error: {err}");
}
