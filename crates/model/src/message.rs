use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a message participant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human side of the conversation, including tool results.
    User,
    /// The model.
    Assistant,
}

/// A prompt-caching marker attached to a content block.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheControl {
    /// The cache type, currently always `ephemeral`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Optional time-to-live, e.g. `1h`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
    /// Optional cache scope, e.g. `global`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl CacheControl {
    /// Creates an ephemeral marker without TTL or scope.
    #[inline]
    pub fn ephemeral() -> Self {
        Self {
            kind: "ephemeral".to_owned(),
            ttl: None,
            scope: None,
        }
    }
}

/// One block of message content.
///
/// The serialized form is tagged by `type`, matching the wire format of
/// the messages API.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// The text.
        text: String,
        /// Prompt-caching marker.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    /// A request from the model to invoke a tool.
    ToolUse {
        /// Identifier that correlates the call with its result.
        id: String,
        /// Name of the tool to invoke.
        name: String,
        /// Structured input for the tool.
        input: Value,
        /// Prompt-caching marker.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    /// The outcome of a tool call.
    ToolResult {
        /// Identifier of the originating `tool_use` block.
        tool_use_id: String,
        /// Output of the tool.
        #[serde(default)]
        content: ToolResultContent,
        /// Whether the tool call failed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
        /// Prompt-caching marker.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    /// Extended thinking output.
    Thinking {
        /// The thinking text.
        thinking: String,
        /// Signature issued by the model.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    /// Thinking output that has been redacted by the provider.
    RedactedThinking {
        /// Opaque payload.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<String>,
    },
    /// An image.
    Image {
        /// Image source descriptor.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<Value>,
        /// Prompt-caching marker.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    /// A tool executed on the provider side.
    ServerToolUse {
        /// Identifier of the call.
        id: String,
        /// Name of the server tool.
        name: String,
        /// Structured input.
        input: Value,
    },
}

impl ContentBlock {
    /// Creates a text block.
    #[inline]
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self::Text {
            text: text.into(),
            cache_control: None,
        }
    }

    /// Creates a tool use block.
    #[inline]
    pub fn tool_use<S1: Into<String>, S2: Into<String>>(
        id: S1,
        name: S2,
        input: Value,
    ) -> Self {
        Self::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
            cache_control: None,
        }
    }

    /// Creates a successful tool result block.
    #[inline]
    pub fn tool_result<S: Into<String>, C: Into<ToolResultContent>>(
        tool_use_id: S,
        content: C,
    ) -> Self {
        Self::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error: None,
            cache_control: None,
        }
    }

    /// Creates a tool result block flagged as an error.
    #[inline]
    pub fn tool_error<S1: Into<String>, S2: Into<String>>(
        tool_use_id: S1,
        message: S2,
    ) -> Self {
        Self::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: ToolResultContent::Text(message.into()),
            is_error: Some(true),
            cache_control: None,
        }
    }

    /// Returns the wire name of this block's type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::ToolUse { .. } => "tool_use",
            Self::ToolResult { .. } => "tool_result",
            Self::Thinking { .. } => "thinking",
            Self::RedactedThinking { .. } => "redacted_thinking",
            Self::Image { .. } => "image",
            Self::ServerToolUse { .. } => "server_tool_use",
        }
    }

    /// Returns the id if this is a `tool_use` block.
    #[inline]
    pub fn tool_use_id(&self) -> Option<&str> {
        match self {
            Self::ToolUse { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Returns the correlated id if this is a `tool_result` block.
    #[inline]
    pub fn tool_result_id(&self) -> Option<&str> {
        match self {
            Self::ToolResult { tool_use_id, .. } => Some(tool_use_id),
            _ => None,
        }
    }

    /// Returns `true` if this is a `tool_result` block flagged as an error.
    #[inline]
    pub fn is_error_result(&self) -> bool {
        matches!(
            self,
            Self::ToolResult {
                is_error: Some(true),
                ..
            }
        )
    }

    /// Returns `true` for `thinking` and `redacted_thinking` blocks.
    #[inline]
    pub fn is_thinking(&self) -> bool {
        matches!(self, Self::Thinking { .. } | Self::RedactedThinking { .. })
    }

    /// Attaches a prompt-caching marker.
    ///
    /// Returns `false` if this block type cannot carry one.
    pub fn set_cache_control(&mut self, marker: CacheControl) -> bool {
        match self {
            Self::Text { cache_control, .. }
            | Self::ToolUse { cache_control, .. }
            | Self::ToolResult { cache_control, .. }
            | Self::Image { cache_control, .. } => {
                *cache_control = Some(marker);
                true
            }
            _ => false,
        }
    }
}

/// The content of a `tool_result` block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    /// Plain text output.
    Text(String),
    /// Structured output.
    Blocks(Vec<ContentBlock>),
}

impl ToolResultContent {
    /// Returns the concatenated text of this content.
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text, .. } => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }
}

impl Default for ToolResultContent {
    #[inline]
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl From<String> for ToolResultContent {
    #[inline]
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for ToolResultContent {
    #[inline]
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<Vec<ContentBlock>> for ToolResultContent {
    #[inline]
    fn from(value: Vec<ContentBlock>) -> Self {
        Self::Blocks(value)
    }
}

/// Message content, either a plain string or a sequence of blocks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// A plain string.
    Text(String),
    /// An ordered sequence of blocks.
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    /// Returns the blocks of this content, or an empty slice for a plain
    /// string.
    #[inline]
    pub fn blocks(&self) -> &[ContentBlock] {
        match self {
            Self::Text(_) => &[],
            Self::Blocks(blocks) => blocks,
        }
    }

    /// Returns the first block, if the content is a non-empty block list.
    #[inline]
    pub fn first_block(&self) -> Option<&ContentBlock> {
        self.blocks().first()
    }

    /// Converts the content into blocks, wrapping a plain string into a
    /// single text block.
    #[inline]
    pub fn into_blocks(self) -> Vec<ContentBlock> {
        match self {
            Self::Text(text) => vec![ContentBlock::text(text)],
            Self::Blocks(blocks) => blocks,
        }
    }
}

impl From<String> for MessageContent {
    #[inline]
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for MessageContent {
    #[inline]
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<Vec<ContentBlock>> for MessageContent {
    #[inline]
    fn from(value: Vec<ContentBlock>) -> Self {
        Self::Blocks(value)
    }
}

/// A message in the request history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageParam {
    /// Who sent the message.
    pub role: Role,
    /// What was sent.
    pub content: MessageContent,
}

impl MessageParam {
    /// Creates a user message.
    #[inline]
    pub fn user<C: Into<MessageContent>>(content: C) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates an assistant message.
    #[inline]
    pub fn assistant<C: Into<MessageContent>>(content: C) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Iterates over the `tool_use` blocks of this message.
    pub fn tool_uses(&self) -> impl Iterator<Item = &ContentBlock> {
        self.content
            .blocks()
            .iter()
            .filter(|block| matches!(block, ContentBlock::ToolUse { .. }))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_block_wire_format() {
        let block = ContentBlock::tool_use("tu_1", "echo", json!({"x": 1}));
        assert_eq!(
            serde_json::to_value(&block).unwrap(),
            json!({
                "type": "tool_use",
                "id": "tu_1",
                "name": "echo",
                "input": {"x": 1}
            })
        );

        let block = ContentBlock::tool_error("tu_1", "boom");
        assert_eq!(
            serde_json::to_value(&block).unwrap(),
            json!({
                "type": "tool_result",
                "tool_use_id": "tu_1",
                "content": "boom",
                "is_error": true
            })
        );
    }

    #[test]
    fn test_content_untagged() {
        let content: MessageContent =
            serde_json::from_value(json!("hello")).unwrap();
        assert_eq!(content, MessageContent::Text("hello".to_owned()));
        assert!(content.blocks().is_empty());

        let content: MessageContent = serde_json::from_value(json!([
            {"type": "text", "text": "a"},
            {"type": "redacted_thinking"}
        ]))
        .unwrap();
        assert_eq!(content.blocks().len(), 2);
        assert_eq!(content.first_block().unwrap().kind(), "text");
    }

    #[test]
    fn test_cache_control_targets() {
        let mut text = ContentBlock::text("a");
        assert!(text.set_cache_control(CacheControl::ephemeral()));
        let mut thinking = ContentBlock::Thinking {
            thinking: "hmm".to_owned(),
            signature: None,
        };
        assert!(!thinking.set_cache_control(CacheControl::ephemeral()));
    }
}
