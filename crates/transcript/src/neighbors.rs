use tether_model::ContentBlock;

use crate::entry::ConversationEntry;

/// Returns `true` for entries attachments can be glued to.
fn is_tool_anchor(entry: &ConversationEntry) -> bool {
    match entry {
        ConversationEntry::Assistant(_) => true,
        ConversationEntry::User(_) => {
            matches!(entry.first_block(), Some(ContentBlock::ToolResult { .. }))
        }
        _ => false,
    }
}

/// Moves every run of attachments right after the nearest earlier tool
/// anchor (an assistant entry, or a user entry led by a `tool_result`).
///
/// Attachments before the first anchor end up at the very front. Relative
/// order among attachments is kept.
pub fn attach_attachments_to_neighbors(
    entries: &[ConversationEntry],
) -> Vec<ConversationEntry> {
    // Built back to front, reversed at the end.
    let mut reversed = Vec::with_capacity(entries.len());
    let mut pending = Vec::new();

    for entry in entries.iter().rev() {
        if matches!(entry, ConversationEntry::Attachment(_)) {
            pending.push(entry);
            continue;
        }
        if is_tool_anchor(entry) {
            reversed.append(&mut pending);
        }
        reversed.push(entry);
    }
    reversed.append(&mut pending);

    reversed.into_iter().rev().cloned().collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::entry::{HookAttachmentKind, HookEvent};

    fn attachment(name: &str) -> ConversationEntry {
        ConversationEntry::hook_attachment(
            HookAttachmentKind::SystemMessage,
            "t1",
            HookEvent::PostToolUse,
            name,
        )
    }

    #[test]
    fn test_glue_to_anchor() {
        let call = ConversationEntry::assistant(vec![ContentBlock::tool_use(
            "t1",
            "Bash",
            json!({}),
        )]);
        let note = ConversationEntry::system("informational");
        let a1 = attachment("a1");
        let a2 = attachment("a2");
        let prompt = ConversationEntry::user("next");
        let entries = vec![
            call.clone(),
            note.clone(),
            a1.clone(),
            a2.clone(),
            prompt.clone(),
        ];

        let output = attach_attachments_to_neighbors(&entries);
        assert_eq!(output, vec![call, a1, a2, note, prompt]);
    }

    #[test]
    fn test_leftovers_go_first() {
        let prompt = ConversationEntry::user("hi");
        let a1 = attachment("a1");
        let result = ConversationEntry::user(vec![ContentBlock::tool_result(
            "t1", "ok",
        )]);
        let a2 = attachment("a2");
        let entries =
            vec![prompt.clone(), a1.clone(), result.clone(), a2.clone()];

        let output = attach_attachments_to_neighbors(&entries);
        assert_eq!(output, vec![a1, prompt, result, a2]);
    }
}
