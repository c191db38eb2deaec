use std::sync::Arc;

use async_trait::async_trait;
use futures::{stream, StreamExt};

use super::types::{segment, LlmRequest, LlmResponse, LlmStreamChunk};
use crate::error::Result;

pub use super::types::LlmStream;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse>;

    /// Default streaming runs `complete` and replays the text word by word,
    /// ending with a `done` chunk. A failed completion yields a single error.
    fn complete_stream(&self, request: LlmRequest) -> LlmStream {
        let client = self.clone_dyn();
        Box::pin(
            stream::once(async move { client.complete(request).await }).flat_map(|outcome| {
                match outcome {
                    Ok(response) => stream::iter(
                        segment(&response.content)
                            .into_iter()
                            .map(|part| Ok(LlmStreamChunk::delta(part)))
                            .chain(std::iter::once(Ok(LlmStreamChunk::done()))),
                    )
                    .boxed(),
                    Err(err) => stream::iter(std::iter::once(Err(err))).boxed(),
                }
            }),
        )
    }

    fn clone_dyn(&self) -> Arc<dyn LlmClient>;
}

pub type DynLlmClient = Arc<dyn LlmClient>;
