use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tether_model::{ContentBlock, Message, MessageContent, MessageParam, Role};
use uuid::Uuid;

/// Generates a fresh entry identifier.
#[inline]
pub(crate) fn fresh_uuid() -> String {
    Uuid::new_v4().to_string()
}

/// One entry of a session transcript, in arrival order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationEntry {
    /// A message sent by the user, including tool results.
    User(MessageEntry),
    /// A message produced by the model.
    Assistant(MessageEntry),
    /// An out-of-band notification.
    Attachment(AttachmentEntry),
    /// A transient in-flight notification.
    Progress(ProgressEntry),
    /// An informational or error entry.
    System(SystemEntry),
}

/// The payload shared by user and assistant entries.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEntry {
    /// Identity of the entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// When the entry was recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// The message itself.
    pub message: MessageBody,
    /// Request identifier of the model call (assistant only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Structured result of the tool call this entry reports (user only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use_result: Option<Value>,
    /// The tool call that produced this entry (user only).
    #[serde(
        default,
        rename = "sourceToolUseID",
        skip_serializing_if = "Option::is_none"
    )]
    pub source_tool_use_id: Option<String>,
    /// Paste identifiers of the images in this entry (user only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_paste_ids: Option<Vec<String>>,
    /// Whether the entry is hidden from the model-visible conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_meta: Option<bool>,
    /// Whether the entry reports a failed model call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_api_error_message: Option<bool>,
    /// Error details attached to the entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    /// Fields this crate doesn't interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The message carried by a [`MessageEntry`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageBody {
    /// Identifier of the model response this message belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The content.
    pub content: MessageContent,
    /// Context management metadata of the model response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_management: Option<Value>,
    /// Fields this crate doesn't interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for MessageBody {
    fn default() -> Self {
        Self {
            id: None,
            content: MessageContent::Blocks(vec![]),
            context_management: None,
            extra: Map::new(),
        }
    }
}

/// An attachment entry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AttachmentEntry {
    /// Identity of the entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// When the entry was recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// The notification.
    pub attachment: Attachment,
}

/// The notification carried by an [`AttachmentEntry`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    /// The attachment type, see [`HookAttachmentKind`] for the hook subset.
    #[serde(rename = "type")]
    pub kind: String,
    /// The tool call this attachment concerns.
    #[serde(
        default,
        rename = "toolUseID",
        skip_serializing_if = "Option::is_none"
    )]
    pub tool_use_id: Option<String>,
    /// The lifecycle event that fired the hook.
    #[serde(
        default,
        rename = "hookEvent",
        skip_serializing_if = "Option::is_none"
    )]
    pub hook_event: Option<HookEvent>,
    /// Name of the hook that reported.
    #[serde(
        default,
        rename = "hookName",
        skip_serializing_if = "Option::is_none"
    )]
    pub hook_name: Option<String>,
    /// Kind-specific payload.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Attachment {
    /// Returns the hook kind, or `None` if this is not a hook attachment.
    #[inline]
    pub fn hook_kind(&self) -> Option<HookAttachmentKind> {
        HookAttachmentKind::parse(&self.kind)
    }
}

/// The kinds of attachments reported by hooks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum HookAttachmentKind {
    BlockingError,
    Cancelled,
    ErrorDuringExecution,
    NonBlockingError,
    Success,
    SystemMessage,
    AdditionalContext,
    StoppedContinuation,
}

impl HookAttachmentKind {
    /// All hook attachment kinds.
    pub const ALL: [Self; 8] = [
        Self::BlockingError,
        Self::Cancelled,
        Self::ErrorDuringExecution,
        Self::NonBlockingError,
        Self::Success,
        Self::SystemMessage,
        Self::AdditionalContext,
        Self::StoppedContinuation,
    ];

    /// Returns the wire name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BlockingError => "hook_blocking_error",
            Self::Cancelled => "hook_cancelled",
            Self::ErrorDuringExecution => "hook_error_during_execution",
            Self::NonBlockingError => "hook_non_blocking_error",
            Self::Success => "hook_success",
            Self::SystemMessage => "hook_system_message",
            Self::AdditionalContext => "hook_additional_context",
            Self::StoppedContinuation => "hook_stopped_continuation",
        }
    }

    /// Parses a wire name.
    pub fn parse(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == kind)
    }
}

/// The tool lifecycle event a hook is bound to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HookEvent {
    /// Before the tool runs.
    PreToolUse,
    /// After the tool has produced its result.
    PostToolUse,
    /// Any other lifecycle event.
    Other(String),
}

impl HookEvent {
    /// Returns the wire name of this event.
    pub fn as_str(&self) -> &str {
        match self {
            Self::PreToolUse => "PreToolUse",
            Self::PostToolUse => "PostToolUse",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for HookEvent {
    fn from(value: String) -> Self {
        match value.as_str() {
            "PreToolUse" => Self::PreToolUse,
            "PostToolUse" => Self::PostToolUse,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for HookEvent {
    #[inline]
    fn from(value: &str) -> Self {
        Self::from(value.to_owned())
    }
}

impl From<HookEvent> for String {
    fn from(value: HookEvent) -> Self {
        match value {
            HookEvent::Other(name) => name,
            event => event.as_str().to_owned(),
        }
    }
}

impl Display for HookEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A progress entry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressEntry {
    /// Identity of the entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// When the entry was recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// The tool call reporting progress.
    #[serde(
        default,
        rename = "toolUseID",
        skip_serializing_if = "Option::is_none"
    )]
    pub tool_use_id: Option<String>,
    /// The tool call that owns the reporting one.
    #[serde(
        default,
        rename = "parentToolUseID",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_tool_use_id: Option<String>,
    /// The typed payload.
    pub data: ProgressData,
}

/// The payload of a [`ProgressEntry`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressData {
    /// Payload type, e.g. `hook_progress`.
    #[serde(rename = "type")]
    pub kind: String,
    /// The lifecycle event, set for `hook_progress` payloads.
    #[serde(
        default,
        rename = "hookEvent",
        skip_serializing_if = "Option::is_none"
    )]
    pub hook_event: Option<HookEvent>,
    /// Type-specific payload.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProgressData {
    /// Payload type of hook progress.
    pub const HOOK_PROGRESS: &'static str = "hook_progress";
}

/// A system entry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemEntry {
    /// Identity of the entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// When the entry was recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Entry subtype, e.g. `api_error` or `informational`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    /// The tool call an informational entry concerns.
    #[serde(
        default,
        rename = "toolUseID",
        skip_serializing_if = "Option::is_none"
    )]
    pub tool_use_id: Option<String>,
    /// Whether the entry is hidden from the model-visible conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_meta: Option<bool>,
    /// Severity, e.g. `info` or `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// Free-form content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    /// A message to replay to the model, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<SystemMessage>,
    /// Fields this crate doesn't interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SystemEntry {
    /// Subtype of failed model call entries.
    pub const API_ERROR: &'static str = "api_error";
    /// Subtype of informational entries.
    pub const INFORMATIONAL: &'static str = "informational";
}

/// The message optionally carried by a [`SystemEntry`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SystemMessage {
    /// The content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,
}

impl ConversationEntry {
    /// Creates a user entry with a fresh identity.
    pub fn user<C: Into<MessageContent>>(content: C) -> Self {
        Self::User(MessageEntry::new(content.into()))
    }

    /// Creates an assistant entry with a fresh identity.
    pub fn assistant<C: Into<MessageContent>>(content: C) -> Self {
        Self::Assistant(MessageEntry::new(content.into()))
    }

    /// Creates a hook attachment entry with a fresh identity.
    pub fn hook_attachment<S1: Into<String>, S2: Into<String>>(
        kind: HookAttachmentKind,
        tool_use_id: S1,
        event: HookEvent,
        hook_name: S2,
    ) -> Self {
        Self::Attachment(AttachmentEntry {
            uuid: Some(fresh_uuid()),
            timestamp: Some(Utc::now()),
            attachment: Attachment {
                kind: kind.as_str().to_owned(),
                tool_use_id: Some(tool_use_id.into()),
                hook_event: Some(event),
                hook_name: Some(hook_name.into()),
                extra: Map::new(),
            },
        })
    }

    /// Creates a `hook_progress` entry with a fresh identity.
    pub fn hook_progress<S: Into<String>>(
        parent_tool_use_id: S,
        event: HookEvent,
    ) -> Self {
        Self::Progress(ProgressEntry {
            uuid: Some(fresh_uuid()),
            timestamp: Some(Utc::now()),
            tool_use_id: None,
            parent_tool_use_id: Some(parent_tool_use_id.into()),
            data: ProgressData {
                kind: ProgressData::HOOK_PROGRESS.to_owned(),
                hook_event: Some(event),
                extra: Map::new(),
            },
        })
    }

    /// Creates a system entry of the given subtype with a fresh identity.
    pub fn system<S: Into<String>>(subtype: S) -> Self {
        Self::System(SystemEntry {
            uuid: Some(fresh_uuid()),
            timestamp: Some(Utc::now()),
            subtype: Some(subtype.into()),
            ..Default::default()
        })
    }

    /// Wraps a history entry of the tool runner.
    pub fn from_param(param: &MessageParam) -> Self {
        match param.role {
            Role::User => Self::user(param.content.clone()),
            Role::Assistant => Self::assistant(param.content.clone()),
        }
    }

    /// Wraps a model response, carrying its identifier.
    pub fn from_response(message: &Message) -> Self {
        let mut entry = MessageEntry::new(MessageContent::Blocks(
            message.content.clone(),
        ));
        entry.message.id = Some(message.id.clone());
        entry.request_id = Some(message.id.clone());
        Self::Assistant(entry)
    }

    /// Returns the identity of this entry.
    pub fn uuid(&self) -> Option<&str> {
        match self {
            Self::User(entry) | Self::Assistant(entry) => entry.uuid.as_deref(),
            Self::Attachment(entry) => entry.uuid.as_deref(),
            Self::Progress(entry) => entry.uuid.as_deref(),
            Self::System(entry) => entry.uuid.as_deref(),
        }
    }

    /// Returns the role of a message entry.
    #[inline]
    pub fn role(&self) -> Option<Role> {
        match self {
            Self::User(_) => Some(Role::User),
            Self::Assistant(_) => Some(Role::Assistant),
            _ => None,
        }
    }

    /// Returns the payload of a user or assistant entry.
    #[inline]
    pub fn as_message(&self) -> Option<&MessageEntry> {
        match self {
            Self::User(entry) | Self::Assistant(entry) => Some(entry),
            _ => None,
        }
    }

    /// Returns the first content block of a user or assistant entry.
    #[inline]
    pub fn first_block(&self) -> Option<&ContentBlock> {
        self.as_message()
            .and_then(|entry| entry.message.content.first_block())
    }

    /// Returns `true` for a system entry of subtype `api_error`.
    #[inline]
    pub fn is_api_error(&self) -> bool {
        matches!(
            self,
            Self::System(SystemEntry { subtype: Some(subtype), .. })
                if subtype == SystemEntry::API_ERROR
        )
    }
}

impl MessageEntry {
    /// Creates a message entry with a fresh identity and the current time.
    pub fn new(content: MessageContent) -> Self {
        Self {
            uuid: Some(fresh_uuid()),
            timestamp: Some(Utc::now()),
            message: MessageBody {
                content,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_deserialize_entries() {
        let raw = json!([
            {
                "type": "assistant",
                "uuid": "a1",
                "timestamp": "2025-01-01T00:00:00.000Z",
                "requestId": "req_1",
                "message": {
                    "id": "msg_1",
                    "role": "assistant",
                    "content": [
                        {"type": "tool_use", "id": "t1", "name": "Bash", "input": {}}
                    ]
                }
            },
            {
                "type": "attachment",
                "attachment": {
                    "type": "hook_success",
                    "toolUseID": "t1",
                    "hookEvent": "PreToolUse",
                    "hookName": "lint",
                    "stdout": "ok"
                }
            },
            {
                "type": "progress",
                "parentToolUseID": "t1",
                "data": {"type": "hook_progress", "hookEvent": "Stop"}
            },
            {"type": "system", "subtype": "api_error", "retryInMs": 500}
        ]);
        let entries: Vec<ConversationEntry> =
            serde_json::from_value(raw.clone()).unwrap();

        let ConversationEntry::Assistant(assistant) = &entries[0] else {
            panic!("expected an assistant entry");
        };
        assert_eq!(assistant.request_id.as_deref(), Some("req_1"));
        assert_eq!(assistant.message.id.as_deref(), Some("msg_1"));
        assert_eq!(assistant.message.extra["role"], json!("assistant"));
        assert_eq!(entries[0].first_block().unwrap().tool_use_id(), Some("t1"));

        let ConversationEntry::Attachment(attachment) = &entries[1] else {
            panic!("expected an attachment entry");
        };
        assert_eq!(
            attachment.attachment.hook_kind(),
            Some(HookAttachmentKind::Success)
        );
        assert_eq!(
            attachment.attachment.hook_event,
            Some(HookEvent::PreToolUse)
        );
        assert_eq!(attachment.attachment.extra["stdout"], json!("ok"));

        let ConversationEntry::Progress(progress) = &entries[2] else {
            panic!("expected a progress entry");
        };
        assert_eq!(
            progress.data.hook_event,
            Some(HookEvent::Other("Stop".to_owned()))
        );
        assert!(entries[3].is_api_error());

        // Unknown fields survive a round trip.
        let back = serde_json::to_value(&entries).unwrap();
        assert_eq!(back[1]["attachment"]["stdout"], json!("ok"));
        assert_eq!(back[3]["retryInMs"], json!(500));
        assert_eq!(back[0]["type"], json!("assistant"));
    }

    #[test]
    fn test_hook_kind_names() {
        for kind in HookAttachmentKind::ALL {
            assert_eq!(HookAttachmentKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(HookAttachmentKind::parse("file"), None);
    }

    #[test]
    fn test_from_response() {
        let message = Message::new(
            "msg_9",
            "test",
            vec![ContentBlock::text("done")],
        );
        let entry = ConversationEntry::from_response(&message);
        let ConversationEntry::Assistant(inner) = &entry else {
            panic!("expected an assistant entry");
        };
        assert_eq!(inner.message.id.as_deref(), Some("msg_9"));
        assert_eq!(inner.request_id.as_deref(), Some("msg_9"));
        assert!(entry.uuid().is_some());

        let entry =
            ConversationEntry::from_param(&MessageParam::user("hello"));
        assert_eq!(entry.role(), Some(Role::User));
    }
}
