use bytes::BytesMut;
use catalyst_remote::stream::{StreamCodec, MAX_LINE_BYTES};
use catalyst_remote::AppError;
use tokio_util::codec::Decoder;

#[test]
fn splits_buffer_into_lines() {
    let mut codec = StreamCodec::new();
    let mut buf = BytesMut::from(&b"first\nsecond\n"[..]);

    assert_eq!(codec.decode(&mut buf).expect("decode"), Some("first".into()));
    assert_eq!(
        codec.decode(&mut buf).expect("decode"),
        Some("second".into())
    );
    assert_eq!(codec.decode(&mut buf).expect("decode"), None);
}

#[test]
fn buffers_partial_line_until_newline_arrives() {
    let mut codec = StreamCodec::new();
    let mut buf = BytesMut::from(&b"par"[..]);

    assert_eq!(codec.decode(&mut buf).expect("decode"), None);

    buf.extend_from_slice(b"tial\n");
    assert_eq!(
        codec.decode(&mut buf).expect("decode"),
        Some("partial".into())
    );
}

#[test]
fn decode_eof_yields_unterminated_tail() {
    let mut codec = StreamCodec::new();
    let mut buf = BytesMut::from(&b"tail-without-newline"[..]);

    assert_eq!(codec.decode(&mut buf).expect("decode"), None);
    assert_eq!(
        codec.decode_eof(&mut buf).expect("decode_eof"),
        Some("tail-without-newline".into())
    );
    assert_eq!(codec.decode_eof(&mut buf).expect("decode_eof"), None);
}

#[test]
fn oversized_line_is_a_connection_error() {
    let mut codec = StreamCodec::new();
    let mut buf = BytesMut::from(vec![b'a'; MAX_LINE_BYTES + 1].as_slice());

    let err = codec.decode(&mut buf).expect_err("frame limit enforced");
    assert!(matches!(err, AppError::Connection(_)), "got {err:?}");
    assert!(err.to_string().contains("line too long"));
}
