use catalyst_remote::models::message::{CommandOutcome, StreamMessage};
use catalyst_remote::relay::{EventRelay, OutwardEvent};
use serde_json::{json, Map, Value};

fn relay() -> EventRelay {
    EventRelay::new("idea-1")
}

#[test]
fn system_init_maps_to_tagged_camel_case_json() {
    let event = relay().adapt(StreamMessage::SystemInit {
        session_token: "sess-1".into(),
        model: "claude-3".into(),
    });

    let value = serde_json::to_value(&event).expect("serializes");
    assert_eq!(
        value,
        json!({
            "type": "claude:system",
            "ideaId": "idea-1",
            "sessionId": "sess-1",
            "model": "claude-3",
        })
    );
}

#[test]
fn text_carries_the_fragment() {
    let event = relay().adapt(StreamMessage::AssistantText { text: "hi".into() });
    let value = serde_json::to_value(&event).expect("serializes");
    assert_eq!(value["type"], "claude:text");
    assert_eq!(value["ideaId"], "idea-1");
    assert_eq!(value["text"], "hi");
}

#[test]
fn tool_use_keeps_input_verbatim() {
    let mut input = Map::new();
    input.insert("path".into(), Value::String("Cargo.toml".into()));

    let event = relay().adapt(StreamMessage::ToolUse {
        tool_use_id: "t-1".into(),
        name: "Read".into(),
        input,
    });

    let value = serde_json::to_value(&event).expect("serializes");
    assert_eq!(value["type"], "claude:tool_use");
    assert_eq!(value["toolUseId"], "t-1");
    assert_eq!(value["name"], "Read");
    assert_eq!(value["input"]["path"], "Cargo.toml");
}

#[test]
fn tool_result_correlates_by_id() {
    let event = relay().adapt(StreamMessage::ToolResult {
        tool_use_id: "t-1".into(),
        content: "ok".into(),
    });
    let value = serde_json::to_value(&event).expect("serializes");
    assert_eq!(value["type"], "claude:tool_result");
    assert_eq!(value["toolUseId"], "t-1");
    assert_eq!(value["content"], "ok");
}

#[test]
fn result_omits_absent_optional_fields() {
    let event = relay().adapt(StreamMessage::Result(CommandOutcome {
        result: Some("done".into()),
        error: None,
        session_token: "sess-1".into(),
        cost_usd: 0.5,
        duration_ms: 900,
        turns: 2,
    }));

    let value = serde_json::to_value(&event).expect("serializes");
    assert_eq!(value["type"], "claude:result");
    assert_eq!(value["result"], "done");
    assert!(value.get("error").is_none(), "absent error is omitted");
    assert_eq!(value["sessionId"], "sess-1");
    assert_eq!(value["costUsd"], 0.5);
    assert_eq!(value["durationMs"], 900);
    assert_eq!(value["turns"], 2);
}

#[test]
fn error_event_is_job_level() {
    let event = relay().error("transport gone");
    let value = serde_json::to_value(&event).expect("serializes");
    assert_eq!(
        value,
        json!({
            "type": "claude:error",
            "ideaId": "idea-1",
            "error": "transport gone",
        })
    );
}

#[test]
fn only_result_and_error_are_terminal() {
    assert!(relay()
        .adapt(StreamMessage::Result(CommandOutcome {
            result: None,
            error: Some("failed".into()),
            session_token: "s".into(),
            cost_usd: 0.0,
            duration_ms: 1,
            turns: 1,
        }))
        .is_terminal());
    assert!(relay().error("x").is_terminal());

    assert!(!relay()
        .adapt(StreamMessage::AssistantText { text: "x".into() })
        .is_terminal());
    assert!(!relay()
        .adapt(StreamMessage::SystemInit {
            session_token: "s".into(),
            model: "m".into(),
        })
        .is_terminal());
}
