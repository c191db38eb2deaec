//! Language model access over an OpenAI-compatible `/chat/completions` API.
//!
//! `GenericHttpClient` handles plain and streamed completions; `SseParser`
//! turns the streamed frames into `LlmStreamChunk`s.

#[cfg(feature = "http-client")]
pub mod generic;
#[cfg(feature = "http-client")]
pub mod stream;

#[cfg(feature = "http-client")]
pub use generic::GenericHttpClient;
#[cfg(feature = "http-client")]
pub use stream::SseParser;
