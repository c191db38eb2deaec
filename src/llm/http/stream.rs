use serde::Deserialize;

use crate::error::{Result, ToolFlowError};
use crate::llm::types::LlmStreamChunk;
use crate::stream::SseFrames;

const DONE_MARKER: &str = "[DONE]";

/// One streamed frame. Text is read from `choices[0].delta.content`, or
/// from `output.text` for providers using that shape.
#[derive(Debug, Default, Deserialize)]
struct DeltaFrame {
    #[serde(default)]
    choices: Vec<DeltaChoice>,
    #[serde(default)]
    output: Option<OutputText>,
}

#[derive(Debug, Deserialize)]
struct DeltaChoice {
    #[serde(default)]
    delta: Option<Delta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OutputText {
    #[serde(default)]
    text: Option<String>,
}

impl DeltaFrame {
    fn into_text(self) -> Option<String> {
        let from_choice = self
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content);
        from_choice
            .or_else(|| self.output.and_then(|output| output.text))
            .filter(|text| !text.is_empty())
    }
}

/// Turns a streamed completion body into `LlmStreamChunk`s.
///
/// ```text
/// data: {"choices":[{"delta":{"content":"Hello"}}]}
///
/// data: [DONE]
/// ```
#[derive(Default)]
pub struct SseParser {
    frames: SseFrames,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// A read may hold any number of frames; a partial frame waits for the next read.
    pub fn parse_chunk(&mut self, data: &[u8]) -> Result<Vec<LlmStreamChunk>> {
        let mut chunks = Vec::new();
        for payload in self.frames.push(data) {
            if payload.trim() == DONE_MARKER {
                chunks.push(LlmStreamChunk::done());
                continue;
            }
            let frame: DeltaFrame = serde_json::from_str(&payload).map_err(|e| {
                ToolFlowError::Llm(format!("malformed stream frame ({e}): {payload}"))
            })?;
            if frame
                .choices
                .first()
                .is_some_and(|choice| choice.finish_reason.is_some() && choice.delta.is_none())
            {
                continue;
            }
            if let Some(text) = frame.into_text() {
                chunks.push(LlmStreamChunk::delta(text));
            }
        }
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_deltas_in_one_read() -> Result<()> {
        let mut parser = SseParser::new();
        let data = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        );

        let chunks = parser.parse_chunk(data.as_bytes())?;
        assert_eq!(
            chunks,
            vec![
                LlmStreamChunk::delta("Hello"),
                LlmStreamChunk::delta(" world"),
                LlmStreamChunk::done(),
            ]
        );
        Ok(())
    }

    #[test]
    fn output_text_split_across_reads() -> Result<()> {
        let mut parser = SseParser::new();
        assert!(parser.parse_chunk(b"data: {\"output\":{\"te")?.is_empty());
        let chunks = parser.parse_chunk(b"xt\":\"Hello\"}}\n\n")?;
        assert_eq!(chunks, vec![LlmStreamChunk::delta("Hello")]);
        Ok(())
    }

    #[test]
    fn garbage_frame_is_an_llm_error() {
        let mut parser = SseParser::new();
        let err = parser.parse_chunk(b"data: not json\n\n").unwrap_err();
        assert!(matches!(err, ToolFlowError::Llm(_)));
    }
}
