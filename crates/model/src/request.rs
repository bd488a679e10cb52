use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::message::MessageParam;

/// A request to be sent to the model provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    /// The model identifier.
    pub model: String,
    /// The system instructions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// The input messages.
    pub messages: Vec<MessageParam>,
    /// Tools that are available to the model.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    /// How the model should pick tools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    /// Upper bound of tokens to sample.
    pub max_tokens: u32,
}

/// Describes a tool that can be used by the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Name of the tool.
    pub name: String,
    /// Description of the tool.
    pub description: String,
    /// Input definition of the tool.
    ///
    /// For most model providers, this should be a
    /// [JSON schema](https://json-schema.org/).
    pub input_schema: Value,
}

/// Controls how the model uses the provided tools.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolChoice {
    /// The model decides.
    Auto,
    /// The model must use some tool.
    Any,
    /// The model must not use tools.
    None,
    /// The model must use the named tool.
    Tool {
        /// Name of the tool.
        name: String,
    },
}

/// Transport-level options for a single model call.
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    /// Deadline for the call.
    pub timeout: Option<Duration>,
    /// Cooperative cancellation signal.
    pub signal: Option<CancellationToken>,
    /// Extra headers to send with the request.
    pub headers: BTreeMap<String, String>,
}

impl RequestOptions {
    /// Creates empty options.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the deadline for each call.
    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the cancellation signal.
    #[inline]
    pub fn with_signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Adds an extra header, replacing any previous value.
    #[inline]
    pub fn with_header<K: Into<String>, V: Into<String>>(
        mut self,
        key: K,
        value: V,
    ) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Returns `true` if the signal has fired.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.signal
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_request_wire_format() {
        let req = ModelRequest {
            model: "m".to_owned(),
            system: None,
            messages: vec![MessageParam::user("hi")],
            tools: vec![],
            tool_choice: Some(ToolChoice::Tool {
                name: "echo".to_owned(),
            }),
            max_tokens: 16,
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({
                "model": "m",
                "messages": [{"role": "user", "content": "hi"}],
                "tool_choice": {"type": "tool", "name": "echo"},
                "max_tokens": 16
            })
        );
    }

    #[test]
    fn test_options_builder() {
        let token = CancellationToken::new();
        let opts = RequestOptions::new()
            .with_timeout(Duration::from_secs(1))
            .with_signal(token.clone())
            .with_header("a", "1")
            .with_header("a", "2");
        assert_eq!(opts.headers.get("a").map(String::as_str), Some("2"));
        assert!(!opts.is_cancelled());
        token.cancel();
        assert!(opts.is_cancelled());
    }
}
