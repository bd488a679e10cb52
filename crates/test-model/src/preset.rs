use serde::{Deserialize, Serialize};
use serde_json::Value;
use tether_model::ContentBlock;

/// The events in a preset response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetEvent {
    /// A chunk of assistant text.
    #[serde(rename = "text_delta")]
    TextDelta(String),
    /// A tool call request.
    #[serde(rename = "tool_use")]
    ToolUse {
        /// Identifier of the call.
        id: String,
        /// Name of the tool.
        name: String,
        /// Input of the tool.
        input: Value,
    },
}

impl PresetEvent {
    /// Creates a text delta event.
    #[inline]
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self::TextDelta(text.into())
    }

    /// Creates a tool call event.
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
        }
    }
}

/// The preset response for one model call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PresetResponse {
    /// Events in this response.
    pub events: Vec<PresetEvent>,
    /// If set, the request will fail in the first `failure` attempts.
    /// `Some(0)` means the request will fail infinitely.
    pub failures: Option<u64>,
}

impl PresetResponse {
    /// Creates a `PresetResponse` with the specified events.
    #[inline]
    pub fn with_events(events: impl Into<Vec<PresetEvent>>) -> Self {
        Self {
            events: events.into(),
            failures: None,
        }
    }

    /// Creates a response consisting of a single text delta.
    #[inline]
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self::with_events([PresetEvent::text(text)])
    }

    /// Sets failure times before a successful response. `0` means the
    /// response will always be a failure.
    #[inline]
    pub fn with_failures(mut self, failures: u64) -> Self {
        self.failures = Some(failures);
        self
    }

    /// Aggregates the events into content blocks, merging adjacent text.
    pub(crate) fn content(&self) -> Vec<ContentBlock> {
        let mut blocks = Vec::new();
        let mut text = String::new();
        for event in &self.events {
            match event {
                PresetEvent::TextDelta(delta) => text.push_str(delta),
                PresetEvent::ToolUse { id, name, input } => {
                    if !text.is_empty() {
                        blocks.push(ContentBlock::text(std::mem::take(
                            &mut text,
                        )));
                    }
                    blocks.push(ContentBlock::tool_use(
                        id.clone(),
                        name.clone(),
                        input.clone(),
                    ));
                }
            }
        }
        if !text.is_empty() {
            blocks.push(ContentBlock::text(text));
        }
        blocks
    }

    pub(crate) fn has_tool_use(&self) -> bool {
        self.events
            .iter()
            .any(|event| matches!(event, PresetEvent::ToolUse { .. }))
    }
}
