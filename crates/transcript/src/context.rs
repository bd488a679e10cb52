use std::collections::{HashMap, HashSet};

use tether_model::ContentBlock;

use crate::entry::{ConversationEntry, HookEvent, ProgressData, ProgressEntry};
use crate::identity::{is_hook_attachment, tool_use_id};

type HookKey = (String, HookEvent);

/// Lookup tables over a transcript, built once and queried by renderers.
///
/// The hook tallies answer "is a hook for this call still running?" by
/// comparing how many `hook_progress` entries were seen against how many
/// distinct hooks reported an attachment. Two firings of the same hook are
/// not told apart.
#[derive(Clone, Debug, Default)]
pub struct ToolContext {
    /// tool use id -> key of the assistant message that emitted it
    message_of: HashMap<String, Option<String>>,
    /// message key -> tool use ids in emission order
    tool_uses_by_message: HashMap<Option<String>, Vec<String>>,
    progress_by_parent: HashMap<String, Vec<ProgressEntry>>,
    in_progress_hooks: HashMap<HookKey, usize>,
    resolved_hooks: HashMap<HookKey, usize>,
}

impl ToolContext {
    /// Builds the tables.
    ///
    /// Sibling ids come from `messages`, the authoritative (unsplit)
    /// message list, so blocks are grouped by the model response that
    /// emitted them. Progress and hook tallies come from `entries`.
    pub fn build(
        entries: &[ConversationEntry],
        messages: &[ConversationEntry],
    ) -> Self {
        let mut ctx = Self::default();

        for entry in messages {
            let ConversationEntry::Assistant(inner) = entry else {
                continue;
            };
            let key = inner.message.id.clone();
            let ids = ctx.tool_uses_by_message.entry(key.clone()).or_default();
            for block in inner.message.content.blocks() {
                if let ContentBlock::ToolUse { id, .. } = block {
                    if !ids.contains(id) {
                        ids.push(id.clone());
                    }
                    ctx.message_of.insert(id.clone(), key.clone());
                }
            }
        }

        let mut resolved_names: HashMap<HookKey, HashSet<Option<&str>>> =
            HashMap::new();
        for entry in entries {
            match entry {
                ConversationEntry::Progress(progress) => {
                    let Some(parent) = &progress.parent_tool_use_id else {
                        continue;
                    };
                    ctx.progress_by_parent
                        .entry(parent.clone())
                        .or_default()
                        .push(progress.clone());

                    if progress.data.kind != ProgressData::HOOK_PROGRESS {
                        continue;
                    }
                    if let Some(event) = &progress.data.hook_event {
                        *ctx.in_progress_hooks
                            .entry((parent.clone(), event.clone()))
                            .or_default() += 1;
                    }
                }
                ConversationEntry::Attachment(inner)
                    if is_hook_attachment(entry) =>
                {
                    let attachment = &inner.attachment;
                    let (Some(id), Some(event)) =
                        (&attachment.tool_use_id, &attachment.hook_event)
                    else {
                        continue;
                    };
                    resolved_names
                        .entry((id.clone(), event.clone()))
                        .or_default()
                        .insert(attachment.hook_name.as_deref());
                }
                _ => {}
            }
        }
        ctx.resolved_hooks = resolved_names
            .into_iter()
            .map(|(key, names)| (key, names.len()))
            .collect();

        ctx
    }

    /// Returns every tool use id emitted by the same model response as
    /// the one `entry` belongs to, the entry's own id included.
    pub fn sibling_tool_use_ids(&self, entry: &ConversationEntry) -> &[String] {
        tool_use_id(entry)
            .and_then(|id| self.message_of.get(id))
            .and_then(|key| self.tool_uses_by_message.get(key))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns the progress entries reported under the tool call `entry`
    /// belongs to.
    pub fn progress_for_entry(
        &self,
        entry: &ConversationEntry,
    ) -> &[ProgressEntry] {
        tool_use_id(entry)
            .and_then(|id| self.progress_by_parent.get(id))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns the number of `hook_progress` entries seen for the pair.
    pub fn in_progress_hook_count(
        &self,
        tool_use_id: &str,
        event: &HookEvent,
    ) -> usize {
        self.in_progress_hooks
            .get(&(tool_use_id.to_owned(), event.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Returns the number of distinct hooks that reported for the pair.
    pub fn resolved_hook_count(
        &self,
        tool_use_id: &str,
        event: &HookEvent,
    ) -> usize {
        self.resolved_hooks
            .get(&(tool_use_id.to_owned(), event.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Returns `true` if some hook for the pair has started but not yet
    /// reported.
    #[inline]
    pub fn has_in_progress_hooks(
        &self,
        tool_use_id: &str,
        event: &HookEvent,
    ) -> bool {
        self.in_progress_hook_count(tool_use_id, event)
            > self.resolved_hook_count(tool_use_id, event)
    }
}

/// Counts the `hook_progress` entries reported for a tool call and event.
pub fn count_hook_progress_entries(
    entries: &[ConversationEntry],
    tool_use_id: &str,
    event: &HookEvent,
) -> usize {
    entries
        .iter()
        .filter(|entry| match entry {
            ConversationEntry::Progress(progress) => {
                progress.data.kind == ProgressData::HOOK_PROGRESS
                    && progress.data.hook_event.as_ref() == Some(event)
                    && progress.parent_tool_use_id.as_deref()
                        == Some(tool_use_id)
            }
            _ => false,
        })
        .count()
}

/// Counts the distinct hooks that reported an attachment for a tool call
/// and event.
pub fn count_resolved_hooks(
    entries: &[ConversationEntry],
    tool_use_id: &str,
    event: &HookEvent,
) -> usize {
    entries
        .iter()
        .filter_map(|entry| match entry {
            ConversationEntry::Attachment(inner)
                if is_hook_attachment(entry)
                    && inner.attachment.tool_use_id.as_deref()
                        == Some(tool_use_id)
                    && inner.attachment.hook_event.as_ref() == Some(event) =>
            {
                Some(inner.attachment.hook_name.as_deref())
            }
            _ => None,
        })
        .collect::<HashSet<_>>()
        .len()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::entry::HookAttachmentKind;
    use crate::split::split_message_blocks;

    fn response() -> ConversationEntry {
        let mut entry = ConversationEntry::assistant(vec![
            ContentBlock::tool_use("t1", "Bash", json!({})),
            ContentBlock::tool_use("t2", "Read", json!({})),
        ]);
        if let ConversationEntry::Assistant(inner) = &mut entry {
            inner.message.id = Some("msg_1".to_owned());
        }
        entry
    }

    fn success(name: &str) -> ConversationEntry {
        ConversationEntry::hook_attachment(
            HookAttachmentKind::Success,
            "t1",
            HookEvent::PreToolUse,
            name,
        )
    }

    #[test]
    fn test_siblings() {
        let messages = vec![
            response(),
            ConversationEntry::assistant(vec![ContentBlock::tool_use(
                "t3",
                "Bash",
                json!({}),
            )]),
        ];
        let entries = split_message_blocks(&messages);
        let ctx = ToolContext::build(&entries, &messages);

        assert_eq!(ctx.sibling_tool_use_ids(&entries[0]), ["t1", "t2"]);
        assert_eq!(ctx.sibling_tool_use_ids(&entries[1]), ["t1", "t2"]);
        assert_eq!(ctx.sibling_tool_use_ids(&entries[2]), ["t3"]);

        let prompt = ConversationEntry::user("hi");
        assert!(ctx.sibling_tool_use_ids(&prompt).is_empty());
    }

    #[test]
    fn test_hook_liveness() {
        let pre = HookEvent::PreToolUse;
        let mut entries = vec![
            response(),
            ConversationEntry::hook_progress("t1", pre.clone()),
            ConversationEntry::hook_progress("t1", pre.clone()),
        ];
        let ctx = ToolContext::build(&entries, &[]);
        assert_eq!(ctx.in_progress_hook_count("t1", &pre), 2);
        assert!(ctx.has_in_progress_hooks("t1", &pre));
        assert!(!ctx.has_in_progress_hooks("t1", &HookEvent::PostToolUse));
        assert_eq!(ctx.progress_for_entry(&success("x")).len(), 2);

        entries.push(success("lint"));
        // The same hook reporting twice counts once.
        entries.push(success("lint"));
        let ctx = ToolContext::build(&entries, &[]);
        assert_eq!(ctx.resolved_hook_count("t1", &pre), 1);
        assert!(ctx.has_in_progress_hooks("t1", &pre));

        entries.push(success("fmt"));
        let ctx = ToolContext::build(&entries, &[]);
        assert!(!ctx.has_in_progress_hooks("t1", &pre));

        assert_eq!(count_hook_progress_entries(&entries, "t1", &pre), 2);
        assert_eq!(count_resolved_hooks(&entries, "t1", &pre), 2);
        assert_eq!(count_resolved_hooks(&entries, "t2", &pre), 0);
    }
}
