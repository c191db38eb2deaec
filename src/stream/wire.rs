use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, ToolFlowError};

/// Splits an SSE byte stream into frames and yields each frame's `data`
/// payload. Frames may arrive split across reads.
#[derive(Debug, Default)]
pub struct SseFrames {
    buffer: Vec<u8>,
}

impl SseFrames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer
            .extend(bytes.iter().copied().filter(|&b| b != b'\r'));

        let mut payloads = Vec::new();
        while let Some(end) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let frame: Vec<u8> = self.buffer.drain(..end + 2).collect();
            let frame = String::from_utf8_lossy(&frame[..end]);
            let data: Vec<&str> = frame
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(|data| data.strip_prefix(' ').unwrap_or(data))
                .collect();
            if !data.is_empty() {
                payloads.push(data.join("\n"));
            }
        }
        payloads
    }

    /// Bytes held back waiting for the end of a frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolPhase {
    Started,
    Completed,
    Failed,
}

/// One event on the response stream. `complete` and `error` are terminal:
/// exactly one of them ends a stream that was not abandoned by its client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Start {
        workflow_id: String,
    },
    ToolProgress {
        tool: String,
        phase: ToolPhase,
    },
    Content {
        text: String,
    },
    Complete {
        text: String,
        confidence: f64,
        tools_used: Vec<String>,
    },
    Error {
        code: String,
        message: String,
    },
}

const KNOWN_TYPES: [&str; 5] = ["start", "tool_progress", "content", "complete", "error"];

impl StreamEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            StreamEvent::Start { .. } => "start",
            StreamEvent::ToolProgress { .. } => "tool_progress",
            StreamEvent::Content { .. } => "content",
            StreamEvent::Complete { .. } => "complete",
            StreamEvent::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Complete { .. } | StreamEvent::Error { .. })
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        StreamEvent::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// `data: {json}\n\n`
pub fn encode_event(event: &StreamEvent) -> Result<String> {
    Ok(format!("data: {}\n\n", serde_json::to_string(event)?))
}

/// What a client sees on the wire. Types it does not know are kept
/// verbatim so newer servers do not break older clients.
#[derive(Clone, Debug, PartialEq)]
pub enum WireEvent {
    Known(StreamEvent),
    Unknown { event_type: String, payload: Value },
}

impl WireEvent {
    pub fn known(&self) -> Option<&StreamEvent> {
        match self {
            WireEvent::Known(event) => Some(event),
            WireEvent::Unknown { .. } => None,
        }
    }
}

/// Client-side decoder for the response stream.
#[derive(Debug, Default)]
pub struct EventDecoder {
    frames: SseFrames,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<WireEvent>> {
        self.frames
            .push(bytes)
            .iter()
            .map(|payload| decode_payload(payload))
            .collect()
    }
}

pub fn decode_payload(payload: &str) -> Result<WireEvent> {
    let value: Value = serde_json::from_str(payload)?;
    let event_type = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ToolFlowError::Serialization(format!("event without type: {payload}")))?
        .to_string();

    if KNOWN_TYPES.contains(&event_type.as_str()) {
        Ok(WireEvent::Known(serde_json::from_value(value)?))
    } else {
        Ok(WireEvent::Unknown {
            event_type,
            payload: value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_survive_split_reads() {
        let mut frames = SseFrames::new();
        assert!(frames.push(b"data: {\"a\"").is_empty());
        assert!(frames.pending() > 0);
        let payloads = frames.push(b":1}\r\n\r\ndata: x\n\n");
        assert_eq!(payloads, vec!["{\"a\":1}", "x"]);
        assert_eq!(frames.pending(), 0);
    }

    #[test]
    fn multi_line_data_is_joined_and_comments_skipped() {
        let mut frames = SseFrames::new();
        let payloads = frames.push(b": keep-alive\n\ndata: one\ndata: two\n\n");
        assert_eq!(payloads, vec!["one\ntwo"]);
    }

    #[test]
    fn events_use_snake_case_type_tags() -> Result<()> {
        let event = StreamEvent::ToolProgress {
            tool: "web_search".into(),
            phase: ToolPhase::Started,
        };
        assert_eq!(
            encode_event(&event)?,
            "data: {\"type\":\"tool_progress\",\"tool\":\"web_search\",\"phase\":\"started\"}\n\n"
        );
        assert!(!event.is_terminal());
        assert!(StreamEvent::error("cancelled", "gone").is_terminal());
        Ok(())
    }

    #[test]
    fn decoder_keeps_unknown_types() -> Result<()> {
        let mut decoder = EventDecoder::new();
        let complete = StreamEvent::Complete {
            text: "Paris".into(),
            confidence: 0.5,
            tools_used: vec!["query_analyzer".into()],
        };
        let mut wire = encode_event(&complete)?;
        wire.push_str("data: {\"type\":\"heartbeat\",\"seq\":3}\n\n");

        let events = decoder.push(wire.as_bytes())?;
        assert_eq!(events[0], WireEvent::Known(complete));
        match &events[1] {
            WireEvent::Unknown { event_type, payload } => {
                assert_eq!(event_type, "heartbeat");
                assert_eq!(payload["seq"], 3);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(events[1].known().is_none());
        Ok(())
    }
}
