//! Inbound frame classification and outbound message encoding.

use agent_pool::worker::frame::{InboundFrame, OutboundMessage, RESET_COMMAND};

#[test]
fn string_result_is_a_completion() {
    assert_eq!(
        InboundFrame::decode(r#"{"type":"result","subtype":"success","result":"All done"}"#),
        InboundFrame::Result {
            text: "All done".into(),
            is_error: false,
        }
    );
}

#[test]
fn error_flag_is_carried() {
    assert_eq!(
        InboundFrame::decode(r#"{"type":"result","is_error":true,"result":"boom"}"#),
        InboundFrame::Result {
            text: "boom".into(),
            is_error: true,
        }
    );
}

#[test]
fn empty_string_result_still_completes() {
    assert_eq!(
        InboundFrame::decode(r#"{"type":"result","result":""}"#),
        InboundFrame::Result {
            text: String::new(),
            is_error: false,
        }
    );
}

#[test]
fn structured_result_is_rendered_compactly() {
    assert_eq!(
        InboundFrame::decode(r#"{"type":"result","result":[1, 2]}"#),
        InboundFrame::Result {
            text: "[1,2]".into(),
            is_error: false,
        }
    );
}

#[test]
fn result_without_payload_is_progress() {
    for line in [r#"{"type":"result"}"#, r#"{"type":"result","result":null}"#] {
        assert_eq!(
            InboundFrame::decode(line),
            InboundFrame::Progress {
                kind: "result".into()
            }
        );
    }
}

#[test]
fn other_types_are_progress() {
    assert_eq!(
        InboundFrame::decode(r#"{"type":"assistant","message":{"content":[]}}"#),
        InboundFrame::Progress {
            kind: "assistant".into()
        }
    );
}

#[test]
fn noise_is_unknown() {
    for line in [
        "Thinking about it...",
        "",
        "[1,2,3]",
        r#""result""#,
        r#"{"result":"no type"}"#,
        r#"{"type":7,"result":"numeric type"}"#,
        r#"{"type":"result","result":"unterminated"#,
    ] {
        assert_eq!(InboundFrame::decode(line), InboundFrame::Unknown, "{line}");
    }
}

#[test]
fn user_message_has_the_worker_wire_shape() {
    let line = OutboundMessage::user("fix the \"bug\"\nplease").to_line().unwrap();
    assert!(!line.contains('\n'), "must be a single line: {line}");
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&line).unwrap(),
        serde_json::json!({
            "type": "user",
            "message": { "role": "user", "content": "fix the \"bug\"\nplease" }
        })
    );
}

#[test]
fn reset_carries_the_clear_command() {
    let reset = OutboundMessage::reset();
    assert!(reset.is_reset());
    assert_eq!(reset.content(), RESET_COMMAND);
    assert_eq!(RESET_COMMAND, "/clear");
    assert!(!OutboundMessage::user("hello").is_reset());
}
