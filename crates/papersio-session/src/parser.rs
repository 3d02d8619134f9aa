//! Decoding of inbound frames.
//!
//! A frame must be a JSON object whose `type` is one of `status`, `result` or
//! `error`. The discriminant is checked first; the body is then validated
//! against the matching wire struct. Unknown fields are ignored.

use papersio_wire::{
    ErrorFrame, ResultFrame, StatusFrame, WireSource, WireSourceType, FRAME_TYPE_ERROR,
    FRAME_TYPE_RESULT, FRAME_TYPE_STATUS,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ResearchError;
use crate::model::{InboundEvent, Source, SourceKind};

pub fn parse_frame(raw: &str) -> Result<InboundEvent, ResearchError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| ResearchError::protocol(format!("frame is not valid JSON: {e}"), raw))?;

    let Some(object) = value.as_object() else {
        return Err(ResearchError::protocol("frame is not a JSON object", raw));
    };

    let frame_type = match object.get("type") {
        Some(Value::String(t)) => t.as_str(),
        Some(_) => return Err(ResearchError::protocol("frame `type` is not a string", raw)),
        None => return Err(ResearchError::protocol("frame has no `type`", raw)),
    };

    match frame_type {
        FRAME_TYPE_STATUS => {
            let frame: StatusFrame = decode_body(&value, frame_type, raw)?;
            if frame.stage.trim().is_empty() {
                return Err(ResearchError::protocol("status frame has an empty stage", raw));
            }
            Ok(InboundEvent::Status {
                stage: frame.stage,
                details: frame.details.unwrap_or_default(),
            })
        }
        FRAME_TYPE_RESULT => {
            let frame: ResultFrame = decode_body(&value, frame_type, raw)?;
            Ok(InboundEvent::Result {
                answer: frame.answer,
                sources: frame
                    .sources
                    .unwrap_or_default()
                    .into_iter()
                    .map(source_from_wire)
                    .collect(),
            })
        }
        FRAME_TYPE_ERROR => {
            let frame: ErrorFrame = decode_body(&value, frame_type, raw)?;
            Ok(InboundEvent::Error {
                message: frame.content,
            })
        }
        other => Err(ResearchError::protocol(
            format!("unknown frame type `{other}`"),
            raw,
        )),
    }
}

fn decode_body<T: DeserializeOwned>(
    value: &Value,
    frame_type: &str,
    raw: &str,
) -> Result<T, ResearchError> {
    T::deserialize(value)
        .map_err(|e| ResearchError::protocol(format!("invalid {frame_type} frame: {e}"), raw))
}

fn source_from_wire(source: WireSource) -> Source {
    Source {
        title: source.title,
        url: source.url,
        kind: match source.source_type {
            WireSourceType::Arxiv => SourceKind::Academic,
            WireSourceType::Web => SourceKind::Web,
        },
        authors: source.authors.unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn protocol_reason(raw: &str) -> String {
        match parse_frame(raw) {
            Err(ResearchError::Protocol { reason, raw: kept }) => {
                assert_eq!(kept, raw);
                reason
            }
            other => panic!("expected protocol error, got {other:?}"),
        }
    }

    #[test]
    fn status_with_details() {
        let event =
            parse_frame(r#"{"type":"status","stage":"Planning","details":"Creating research plan..."}"#)
                .unwrap();
        assert_eq!(
            event,
            InboundEvent::Status {
                stage: "Planning".to_string(),
                details: "Creating research plan...".to_string(),
            }
        );
    }

    #[test]
    fn status_details_may_be_null_or_absent() {
        for raw in [
            r#"{"type":"status","stage":"Saving","details":null}"#,
            r#"{"type":"status","stage":"Saving"}"#,
        ] {
            match parse_frame(raw).unwrap() {
                InboundEvent::Status { details, .. } => assert_eq!(details, ""),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn status_requires_non_empty_stage() {
        assert!(protocol_reason(r#"{"type":"status","stage":"  "}"#).contains("empty stage"));
        assert!(protocol_reason(r#"{"type":"status"}"#).contains("invalid status frame"));
        assert!(protocol_reason(r#"{"type":"status","stage":7}"#).contains("invalid status frame"));
    }

    #[test]
    fn result_keeps_sources_in_order() {
        let raw = r#"{
            "type": "result",
            "answer": "Transformers scale.",
            "sources": [
                {"title": "A", "url": "http://x", "source_type": "arxiv", "authors": ["Vaswani", "Shazeer"]},
                {"title": "B", "url": "http://y", "source_type": "web"},
                {"title": "A", "url": "http://x", "source_type": "arxiv"}
            ]
        }"#;
        let InboundEvent::Result { answer, sources } = parse_frame(raw).unwrap() else {
            panic!("expected result");
        };
        assert_eq!(answer, "Transformers scale.");
        let titles: Vec<_> = sources.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B", "A"]);
        assert_eq!(sources[0].kind, SourceKind::Academic);
        assert_eq!(sources[0].authors, vec!["Vaswani", "Shazeer"]);
        assert_eq!(sources[1].kind, SourceKind::Web);
        assert!(sources[1].authors.is_empty());
    }

    #[test]
    fn result_sources_default_to_empty() {
        for raw in [
            r#"{"type":"result","answer":"done"}"#,
            r#"{"type":"result","answer":"done","sources":null}"#,
        ] {
            let InboundEvent::Result { sources, .. } = parse_frame(raw).unwrap() else {
                panic!("expected result");
            };
            assert!(sources.is_empty());
        }
    }

    #[test]
    fn result_rejects_bad_sources() {
        assert!(protocol_reason(
            r#"{"type":"result","answer":"a","sources":[{"title":"A","url":"u","source_type":"book"}]}"#
        )
        .contains("invalid result frame"));
        assert!(protocol_reason(
            r#"{"type":"result","answer":"a","sources":[{"title":"A","source_type":"web"}]}"#
        )
        .contains("invalid result frame"));
        assert!(protocol_reason(r#"{"type":"result"}"#).contains("invalid result frame"));
    }

    #[test]
    fn error_frame_content() {
        assert_eq!(
            parse_frame(r#"{"type":"error","content":"Rate limit exceeded"}"#).unwrap(),
            InboundEvent::Error {
                message: "Rate limit exceeded".to_string()
            }
        );
        assert!(protocol_reason(r#"{"type":"error"}"#).contains("invalid error frame"));
    }

    #[test]
    fn unknown_or_missing_discriminant_is_rejected() {
        assert!(protocol_reason(r#"{"type":"bogus"}"#).contains("unknown frame type `bogus`"));
        assert!(protocol_reason(r#"{"stage":"Planning"}"#).contains("no `type`"));
        assert!(protocol_reason(r#"{"type":"STATUS","stage":"Planning"}"#).contains("unknown"));
        assert!(protocol_reason(r#"{"type":null}"#).contains("not a string"));
    }

    #[test]
    fn non_object_frames_are_rejected() {
        assert!(protocol_reason("not json").contains("not valid JSON"));
        assert!(protocol_reason(r#"["status"]"#).contains("not a JSON object"));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let event = parse_frame(
            r#"{"type":"status","stage":"Writing","progress_hint":0.4,"extra":{"a":1}}"#,
        )
        .unwrap();
        assert_eq!(event.kind(), "status");
    }

    #[test]
    fn parse_failures_classify_as_protocol() {
        let err = parse_frame("{}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProtocolError);
    }
}
