use std::sync::Arc;

use tether_model::{ErrorKind, ModelProviderError};

/// The error type of [`ToolRunner`](crate::ToolRunner).
///
/// The error is cheap to clone, so the same failure can be handed to every
/// task waiting on the runner.
#[derive(Clone, Debug, thiserror::Error)]
pub enum RunnerError {
    /// The model provider failed.
    #[error("model error: {0}")]
    Model(Arc<dyn ModelProviderError>),
    /// A model call took longer than the configured timeout.
    #[error("model call timed out")]
    Timeout,
    /// The model call was cancelled through the request signal.
    #[error("model call was cancelled")]
    Cancelled,
    /// A stream ended without producing a final message.
    #[error("stream ended without a final message")]
    Stream,
    /// The loop finished without ever obtaining a response.
    #[error("the loop finished without a model response")]
    NoResponse,
    /// The runner is already running or has completed.
    #[error("the runner is already consumed")]
    AlreadyConsumed,
    /// The runner was dropped before it finished.
    #[error("the runner was dropped before it finished")]
    Abandoned,
}

impl RunnerError {
    /// Returns the provider's error kind for [`RunnerError::Model`].
    #[inline]
    pub fn model_error_kind(&self) -> Option<ErrorKind> {
        match self {
            RunnerError::Model(err) => Some(err.kind()),
            _ => None,
        }
    }
}
