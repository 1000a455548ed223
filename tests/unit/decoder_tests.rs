use catalyst_remote::models::message::StreamMessage;
use catalyst_remote::stream::{parse_stream_line, LineDecoder, MAX_LINE_BYTES};

fn init_line() -> &'static str {
    r#"{"type":"system","subtype":"init","session_id":"sess-1","model":"claude-3"}"#
}

fn text_line(text: &str) -> String {
    format!(r#"{{"type":"assistant","subtype":"text","text":"{text}"}}"#)
}

fn result_line() -> &'static str {
    concat!(
        r#"{"type":"result","subtype":"success","result":"done","session_id":"sess-1","#,
        r#""cost_usd":0.42,"duration_ms":1200,"turns":3}"#
    )
}

// ── parse_stream_line ────────────────────────────────────────────────────────

#[test]
fn parses_system_init() {
    let msg = parse_stream_line(init_line()).expect("parses");
    assert_eq!(
        msg,
        StreamMessage::SystemInit {
            session_token: "sess-1".into(),
            model: "claude-3".into(),
        }
    );
}

#[test]
fn parses_assistant_text() {
    let msg = parse_stream_line(&text_line("hello")).expect("parses");
    assert_eq!(msg, StreamMessage::AssistantText { text: "hello".into() });
}

#[test]
fn parses_tool_use_with_input_map() {
    let line = r#"{"type":"assistant","subtype":"tool_use","tool_use_id":"t-1","name":"Read","input":{"path":"src/main.rs"}}"#;
    let StreamMessage::ToolUse {
        tool_use_id,
        name,
        input,
    } = parse_stream_line(line).expect("parses")
    else {
        panic!("wrong variant");
    };
    assert_eq!(tool_use_id, "t-1");
    assert_eq!(name, "Read");
    assert_eq!(input["path"], "src/main.rs");
}

#[test]
fn parses_tool_result_regardless_of_subtype() {
    let line = r#"{"type":"tool_result","tool_use_id":"t-1","content":"ok"}"#;
    let msg = parse_stream_line(line).expect("parses");
    assert_eq!(
        msg,
        StreamMessage::ToolResult {
            tool_use_id: "t-1".into(),
            content: "ok".into(),
        }
    );
}

#[test]
fn parses_success_result() {
    let StreamMessage::Result(outcome) = parse_stream_line(result_line()).expect("parses") else {
        panic!("wrong variant");
    };
    assert_eq!(outcome.result.as_deref(), Some("done"));
    assert_eq!(outcome.error, None);
    assert_eq!(outcome.session_token, "sess-1");
    assert!((outcome.cost_usd - 0.42).abs() < f64::EPSILON);
    assert_eq!(outcome.duration_ms, 1200);
    assert_eq!(outcome.turns, 3);
    assert!(outcome.is_success());
}

#[test]
fn parses_error_result() {
    let line = concat!(
        r#"{"type":"result","subtype":"error","error":"budget exceeded","session_id":"sess-1","#,
        r#""cost_usd":0.1,"duration_ms":400,"turns":1}"#
    );
    let StreamMessage::Result(outcome) = parse_stream_line(line).expect("parses") else {
        panic!("wrong variant");
    };
    assert_eq!(outcome.error.as_deref(), Some("budget exceeded"));
    assert!(!outcome.is_success());
}

#[test]
fn skips_unknown_discriminators() {
    assert_eq!(parse_stream_line(r#"{"type":"system","subtype":"ping"}"#), None);
    assert_eq!(parse_stream_line(r#"{"type":"debug","text":"x"}"#), None);
    assert_eq!(
        parse_stream_line(r#"{"type":"result","subtype":"partial"}"#),
        None
    );
}

#[test]
fn skips_non_json_and_blank_lines() {
    assert_eq!(parse_stream_line("Cloning repository..."), None);
    assert_eq!(parse_stream_line(""), None);
    assert_eq!(parse_stream_line("   "), None);
}

#[test]
fn skips_records_with_missing_fields() {
    // system/init without a session id.
    assert_eq!(
        parse_stream_line(r#"{"type":"system","subtype":"init","model":"m"}"#),
        None
    );
}

// ── LineDecoder ──────────────────────────────────────────────────────────────

#[test]
fn reassembles_line_split_across_chunks() {
    let mut decoder = LineDecoder::new();
    let line = text_line("split");
    let (head, tail) = line.split_at(10);

    assert!(decoder.feed(head.as_bytes()).is_empty());

    let mut tail_chunk = tail.as_bytes().to_vec();
    tail_chunk.push(b'\n');
    let messages = decoder.feed(&tail_chunk);
    assert_eq!(
        messages,
        vec![StreamMessage::AssistantText { text: "split".into() }]
    );
}

#[test]
fn tolerates_chunk_split_inside_multibyte_character() {
    let mut decoder = LineDecoder::new();
    let line = format!("{}\n", text_line("caf\u{e9}"));
    let bytes = line.as_bytes();
    // Split inside the two-byte encoding of 'é'.
    let cut = line.find('\u{e9}').expect("char present") + 1;

    assert!(decoder.feed(&bytes[..cut]).is_empty());
    let messages = decoder.feed(&bytes[cut..]);
    assert_eq!(
        messages,
        vec![StreamMessage::AssistantText { text: "caf\u{e9}".into() }]
    );
}

#[test]
fn yields_multiple_messages_from_one_chunk() {
    let mut decoder = LineDecoder::new();
    let chunk = format!("{}\n{}\n", init_line(), text_line("hi"));

    let messages = decoder.feed(chunk.as_bytes());
    assert_eq!(messages.len(), 2);
    assert!(matches!(messages[0], StreamMessage::SystemInit { .. }));
    assert!(matches!(messages[1], StreamMessage::AssistantText { .. }));
}

#[test]
fn garbage_between_records_does_not_abort_decoding() {
    let mut decoder = LineDecoder::new();
    let chunk = format!("{}\nnot json at all\n\n{}\n", init_line(), result_line());

    let messages = decoder.feed(chunk.as_bytes());
    assert_eq!(messages.len(), 2);
    assert!(matches!(messages[1], StreamMessage::Result(_)));
}

#[test]
fn oversized_line_is_dropped_and_decoding_resumes() {
    let mut decoder = LineDecoder::new();

    let mut oversized = vec![b'x'; MAX_LINE_BYTES + 1];
    oversized.push(b'\n');
    assert!(decoder.feed(&oversized).is_empty());

    // The next well-formed record still decodes.
    let follow = format!("{}\n", text_line("after"));
    assert_eq!(
        decoder.feed(follow.as_bytes()),
        vec![StreamMessage::AssistantText { text: "after".into() }]
    );
}

#[test]
fn finish_drains_unterminated_trailing_record() {
    let mut decoder = LineDecoder::new();
    assert!(decoder.feed(result_line().as_bytes()).is_empty());

    let messages = decoder.finish();
    assert_eq!(messages.len(), 1);
    assert!(matches!(messages[0], StreamMessage::Result(_)));
}

#[test]
fn finish_on_empty_buffer_yields_nothing() {
    let mut decoder = LineDecoder::new();
    assert!(decoder.finish().is_empty());
}
