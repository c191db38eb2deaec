//! Streaming responses: the workflow as a sequence of SSE events.
//!
//! ```text
//! start -> tool_progress* -> content* -> complete | error
//! ```

mod batcher;
mod responder;
mod sink;
mod wire;

pub use batcher::ChunkBatcher;
pub use responder::{ResponseStream, StreamingResponder};
pub use wire::{
    decode_payload, encode_event, EventDecoder, SseFrames, StreamEvent, ToolPhase, WireEvent,
};
