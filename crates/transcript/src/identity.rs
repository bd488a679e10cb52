use tether_model::ContentBlock;

use crate::entry::{ConversationEntry, HookEvent, SystemEntry};

/// Returns `true` if the entry is an attachment of one of the hook kinds.
#[inline]
pub fn is_hook_attachment(entry: &ConversationEntry) -> bool {
    matches!(
        entry,
        ConversationEntry::Attachment(inner)
            if inner.attachment.hook_kind().is_some()
    )
}

/// Returns `true` if the entry is an assistant message with any
/// `tool_use` block.
pub fn is_assistant_tool_use(entry: &ConversationEntry) -> bool {
    match entry {
        ConversationEntry::Assistant(inner) => inner
            .message
            .content
            .blocks()
            .iter()
            .any(|block| matches!(block, ContentBlock::ToolUse { .. })),
        _ => false,
    }
}

/// Returns `true` if the entry is a user message reporting a tool result.
pub fn is_user_tool_result(entry: &ConversationEntry) -> bool {
    match entry {
        ConversationEntry::User(inner) => {
            matches!(
                inner.message.content.first_block(),
                Some(ContentBlock::ToolResult { .. })
            ) || inner.tool_use_result.as_ref().is_some_and(|v| !v.is_null())
        }
        _ => false,
    }
}

/// Returns the id of the `tool_use` block leading an assistant entry.
#[inline]
pub(crate) fn leading_tool_use_id(entry: &ConversationEntry) -> Option<&str> {
    match entry {
        ConversationEntry::Assistant(_) => entry.first_block()?.tool_use_id(),
        _ => None,
    }
}

/// Returns the id of the `tool_result` block leading a user entry.
#[inline]
pub(crate) fn leading_tool_result_id(
    entry: &ConversationEntry,
) -> Option<&str> {
    match entry {
        ConversationEntry::User(_) => entry.first_block()?.tool_result_id(),
        _ => None,
    }
}

/// Returns the tool call id and hook event of a hook attachment.
///
/// Attachments without a `toolUseID` yield `None`.
pub(crate) fn hook_target(
    entry: &ConversationEntry,
) -> Option<(&str, Option<&HookEvent>)> {
    match entry {
        ConversationEntry::Attachment(inner)
            if inner.attachment.hook_kind().is_some() =>
        {
            let id = inner.attachment.tool_use_id.as_deref()?;
            Some((id, inner.attachment.hook_event.as_ref()))
        }
        _ => None,
    }
}

/// Returns the tool call an entry belongs to.
///
/// - hook attachments: their `toolUseID`;
/// - assistant entries: the id of a leading `tool_use` block;
/// - user entries: `sourceToolUseID`, else the id of a leading
///   `tool_result` block;
/// - progress entries: their `toolUseID`;
/// - informational system entries: their `toolUseID`.
pub fn tool_use_id(entry: &ConversationEntry) -> Option<&str> {
    match entry {
        ConversationEntry::Attachment(inner) => {
            if inner.attachment.hook_kind().is_some() {
                inner.attachment.tool_use_id.as_deref()
            } else {
                None
            }
        }
        ConversationEntry::Assistant(_) => leading_tool_use_id(entry),
        ConversationEntry::User(inner) => inner
            .source_tool_use_id
            .as_deref()
            .or_else(|| leading_tool_result_id(entry)),
        ConversationEntry::Progress(inner) => inner.tool_use_id.as_deref(),
        ConversationEntry::System(inner) => {
            if inner.subtype.as_deref() == Some(SystemEntry::INFORMATIONAL) {
                inner.tool_use_id.as_deref()
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tether_model::ContentBlock;

    use super::*;
    use crate::entry::{Attachment, AttachmentEntry, HookAttachmentKind};

    #[test]
    fn test_hook_attachment() {
        let hook = ConversationEntry::hook_attachment(
            HookAttachmentKind::Cancelled,
            "t1",
            HookEvent::PostToolUse,
            "fmt",
        );
        assert!(is_hook_attachment(&hook));
        assert_eq!(tool_use_id(&hook), Some("t1"));

        let plain = ConversationEntry::Attachment(AttachmentEntry {
            attachment: Attachment {
                kind: "file".to_owned(),
                tool_use_id: Some("t1".to_owned()),
                ..Default::default()
            },
            ..Default::default()
        });
        assert!(!is_hook_attachment(&plain));
        assert_eq!(tool_use_id(&plain), None);
    }

    #[test]
    fn test_tool_use_id_per_variant() {
        let assistant = ConversationEntry::assistant(vec![
            ContentBlock::tool_use("t1", "Bash", json!({})),
        ]);
        assert!(is_assistant_tool_use(&assistant));
        assert_eq!(tool_use_id(&assistant), Some("t1"));

        // A tool_use that doesn't lead the message is not the entry's id.
        let trailing = ConversationEntry::assistant(vec![
            ContentBlock::text("let me check"),
            ContentBlock::tool_use("t2", "Bash", json!({})),
        ]);
        assert!(is_assistant_tool_use(&trailing));
        assert_eq!(tool_use_id(&trailing), None);

        let mut result = ConversationEntry::user(vec![
            ContentBlock::tool_result("t1", "ok"),
        ]);
        assert!(is_user_tool_result(&result));
        assert_eq!(tool_use_id(&result), Some("t1"));
        if let ConversationEntry::User(inner) = &mut result {
            inner.source_tool_use_id = Some("t0".to_owned());
        }
        assert_eq!(tool_use_id(&result), Some("t0"));

        let mut info = ConversationEntry::system(SystemEntry::INFORMATIONAL);
        let mut error = ConversationEntry::system(SystemEntry::API_ERROR);
        for entry in [&mut info, &mut error] {
            if let ConversationEntry::System(inner) = entry {
                inner.tool_use_id = Some("t3".to_owned());
            }
        }
        assert_eq!(tool_use_id(&info), Some("t3"));
        assert_eq!(tool_use_id(&error), None);
    }
}
