use std::pin::Pin;
use std::task::{self, Poll};

use serde::{Deserialize, Serialize};

use crate::message::{ContentBlock, Role};
use crate::provider::ModelProviderError;

/// A complete response from the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Provider-assigned identifier of this response.
    pub id: String,
    /// The model that produced this response.
    pub model: String,
    /// Always [`Role::Assistant`].
    pub role: Role,
    /// Content blocks in emission order.
    pub content: Vec<ContentBlock>,
    /// Why the model stopped sampling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    /// Token accounting.
    #[serde(default)]
    pub usage: Usage,
}

impl Message {
    /// Creates an assistant message with the given content.
    #[inline]
    pub fn new<S1: Into<String>, S2: Into<String>>(
        id: S1,
        model: S2,
        content: Vec<ContentBlock>,
    ) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            role: Role::Assistant,
            content,
            stop_reason: None,
            usage: Usage::default(),
        }
    }

    /// Sets the stop reason.
    #[inline]
    pub fn with_stop_reason(mut self, stop_reason: StopReason) -> Self {
        self.stop_reason = Some(stop_reason);
        self
    }

    /// Returns `true` if the message requests at least one tool call.
    #[inline]
    pub fn has_tool_use(&self) -> bool {
        self.content
            .iter()
            .any(|block| matches!(block, ContentBlock::ToolUse { .. }))
    }

    /// Returns the concatenated text blocks of the message.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// The reason why a model response has finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model has finished its turn.
    EndTurn,
    /// The model needs to call a tool.
    ToolUse,
    /// The token budget was exhausted.
    MaxTokens,
    /// A stop sequence was hit.
    StopSequence,
    /// Any other reasons.
    #[serde(other)]
    Other,
}

/// Token accounting of one response.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Usage {
    /// Input tokens.
    #[serde(default)]
    pub input_tokens: u64,
    /// Output tokens.
    #[serde(default)]
    pub output_tokens: u64,
}

/// The event from a streaming model response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// The response has started.
    MessageStart {
        /// Identifier of the response.
        id: String,
        /// The model that is responding.
        model: String,
    },
    /// Received a text delta.
    TextDelta {
        /// The new text.
        text: String,
    },
    /// Received a complete content block.
    ContentBlock {
        /// The block.
        block: ContentBlock,
    },
    /// The response has been completed.
    Completed {
        /// Why the model stopped.
        stop_reason: StopReason,
    },
}

/// A streaming response from the model provider.
pub trait ModelStream: Send + 'static {
    /// The error type that may be returned by the provider.
    type Error: ModelProviderError;

    /// Attempts to pull out the next event from the stream.
    ///
    /// # Return value
    ///
    /// There are several possible return values, each indicating a
    /// distinct stream state:
    ///
    /// - `Poll::Pending` means that this stream is still waiting for
    ///   the next event. Implementations will ensure that the current
    ///   task will be notified when the next event may be ready.
    /// - `Poll::Ready(Ok(Some(event)))` means the stream has an event
    ///   to deliver, and may produce further events on subsequent
    ///   `poll_next_event` calls.
    /// - `Poll::Ready(Ok(None))` means the stream has completed.
    /// - `Poll::Ready(Err(error))` means an error occurred while
    ///   processing the stream.
    ///
    /// Calling this method after completion should always return `None`.
    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<StreamEvent>, Self::Error>>;

    /// Returns the aggregated message of this stream.
    ///
    /// You should call this method after polling all events from this
    /// stream, and the implementations should always return the same
    /// message for one stream. Calling it while the stream is still
    /// producing events may return `None` or an incomplete message.
    fn final_message(&self) -> Option<Message>;
}
