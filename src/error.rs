use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ToolFlowError>;

#[derive(Debug, Error)]
pub enum ToolFlowError {
    #[error("tool `{0}` already registered")]
    DuplicateTool(String),
    #[error("cyclic capability dependency: {0}")]
    CyclicDependency(String),
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("tool `{0}` not registered")]
    ToolNotRegistered(String),
    #[error("tool `{tool}` failed fatally: {message}")]
    ToolFatal { tool: String, message: String },
    #[error("generation failed after {attempts} attempt(s): {message}")]
    Generation { attempts: u32, message: String },
    #[error("workflow cancelled")]
    Cancelled,
    #[error("workflow deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
    #[error("llm error: {0}")]
    Llm(String),
    #[error("search error: {0}")]
    Search(String),
    #[error("context error: {0}")]
    Context(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Error taxonomy as seen by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    ToolFailure,
    DependencyUnsatisfied,
    GenerationFailure,
    Configuration,
    Cancellation,
    Internal,
}

impl ToolFlowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ToolFlowError::DuplicateTool(_)
            | ToolFlowError::CyclicDependency(_)
            | ToolFlowError::Configuration(_) => ErrorKind::Configuration,
            ToolFlowError::Generation { .. } | ToolFlowError::Llm(_) => {
                ErrorKind::GenerationFailure
            }
            ToolFlowError::Search(_) => ErrorKind::ToolFailure,
            ToolFlowError::Cancelled | ToolFlowError::DeadlineExceeded(_) => {
                ErrorKind::Cancellation
            }
            ToolFlowError::ToolNotRegistered(_)
            | ToolFlowError::ToolFatal { .. }
            | ToolFlowError::Context(_)
            | ToolFlowError::Serialization(_)
            | ToolFlowError::Other(_) => ErrorKind::Internal,
        }
    }

    /// Value of the `code` field on a wire `error` event.
    pub fn code(&self) -> &'static str {
        match self {
            ToolFlowError::DuplicateTool(_)
            | ToolFlowError::CyclicDependency(_)
            | ToolFlowError::Configuration(_) => "configuration_error",
            ToolFlowError::Generation { .. } | ToolFlowError::Llm(_) => "generation_failure",
            ToolFlowError::Search(_) => "tool_failure",
            ToolFlowError::Cancelled => "cancelled",
            ToolFlowError::DeadlineExceeded(_) => "deadline_exceeded",
            ToolFlowError::ToolFatal { .. } => "tool_fatal",
            ToolFlowError::ToolNotRegistered(_)
            | ToolFlowError::Context(_)
            | ToolFlowError::Serialization(_)
            | ToolFlowError::Other(_) => "internal",
        }
    }

    /// Disconnects and deadline expiry are not reported as user-visible failures.
    pub fn is_cancellation(&self) -> bool {
        self.kind() == ErrorKind::Cancellation
    }
}

impl From<serde_json::Error> for ToolFlowError {
    fn from(err: serde_json::Error) -> Self {
        ToolFlowError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_taxonomy() {
        let err = ToolFlowError::Generation {
            attempts: 3,
            message: "503".into(),
        };
        assert_eq!(err.kind(), ErrorKind::GenerationFailure);
        assert_eq!(err.code(), "generation_failure");

        let err = ToolFlowError::DuplicateTool("web_search".into());
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.to_string(), "tool `web_search` already registered");

        assert!(ToolFlowError::Cancelled.is_cancellation());
        assert!(ToolFlowError::DeadlineExceeded(Duration::from_secs(60)).is_cancellation());
        assert_eq!(
            ToolFlowError::DeadlineExceeded(Duration::from_secs(1)).code(),
            "deadline_exceeded"
        );
    }
}
