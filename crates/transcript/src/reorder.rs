use std::collections::{HashMap, HashSet};

use crate::entry::{ConversationEntry, HookEvent};
use crate::identity::{
    hook_target, leading_tool_result_id, leading_tool_use_id,
};

/// Everything that concerns one tool call.
#[derive(Default)]
struct ToolUseGroup<'a> {
    tool_use: Option<&'a ConversationEntry>,
    pre_hooks: Vec<&'a ConversationEntry>,
    tool_result: Option<&'a ConversationEntry>,
    post_hooks: Vec<&'a ConversationEntry>,
}

/// Classifies an entry by the part it plays in a tool call.
enum Shape<'a> {
    ToolUse(&'a str),
    PreHook(&'a str),
    ToolResult(&'a str),
    PostHook(&'a str),
    Other,
}

fn shape_of(entry: &ConversationEntry) -> Shape<'_> {
    if let Some(id) = leading_tool_use_id(entry) {
        return Shape::ToolUse(id);
    }
    if let Some(id) = leading_tool_result_id(entry) {
        return Shape::ToolResult(id);
    }
    match hook_target(entry) {
        Some((id, Some(HookEvent::PreToolUse))) => Shape::PreHook(id),
        Some((id, Some(HookEvent::PostToolUse))) => Shape::PostHook(id),
        _ => Shape::Other,
    }
}

fn group_by_tool_use_id(
    entries: &[ConversationEntry],
) -> HashMap<&str, ToolUseGroup<'_>> {
    let mut groups: HashMap<&str, ToolUseGroup<'_>> = HashMap::new();
    for entry in entries {
        match shape_of(entry) {
            Shape::ToolUse(id) => {
                groups.entry(id).or_default().tool_use = Some(entry);
            }
            Shape::PreHook(id) => {
                groups.entry(id).or_default().pre_hooks.push(entry);
            }
            Shape::ToolResult(id) => {
                groups.entry(id).or_default().tool_result = Some(entry);
            }
            Shape::PostHook(id) => {
                groups.entry(id).or_default().post_hooks.push(entry);
            }
            Shape::Other => {}
        }
    }
    groups
}

/// Re-emits the entries so that every tool call forms one contiguous run:
/// the `tool_use` entry, its `PreToolUse` hooks, its `tool_result` (if the
/// call completed) and its `PostToolUse` hooks.
///
/// The run is emitted where the `tool_use` entry first appears. Results and
/// hooks are never emitted at their original positions, so those whose
/// call has no `tool_use` entry are dropped. Runs of consecutive
/// `api_error` entries collapse to the latest one, `tail` is appended
/// verbatim, and finally every `api_error` entry that doesn't end the
/// output is removed.
///
/// The input is expected to be split with
/// [`split_message_blocks`](crate::split_message_blocks) first.
pub fn reorder_tool_use_and_hook_messages(
    entries: &[ConversationEntry],
    tail: &[ConversationEntry],
) -> Vec<ConversationEntry> {
    let groups = group_by_tool_use_id(entries);

    let mut output: Vec<&ConversationEntry> =
        Vec::with_capacity(entries.len() + tail.len());
    let mut emitted = HashSet::new();
    for entry in entries {
        match shape_of(entry) {
            Shape::ToolUse(id) => {
                if !emitted.insert(id) {
                    continue;
                }
                let Some(group) = groups.get(id) else {
                    continue;
                };
                output.extend(group.tool_use);
                output.extend(&group.pre_hooks);
                output.extend(group.tool_result);
                output.extend(&group.post_hooks);
            }
            Shape::PreHook(id)
            | Shape::PostHook(id)
            | Shape::ToolResult(id) => {
                let grouped = groups.get(id);
                if !grouped.is_some_and(|g| g.tool_use.is_some()) {
                    trace!(tool_use_id = id, "dropping entry without tool use");
                }
            }
            Shape::Other if entry.is_api_error() => {
                match output.last_mut() {
                    Some(last) if last.is_api_error() => *last = entry,
                    _ => output.push(entry),
                }
            }
            Shape::Other => output.push(entry),
        }
    }
    output.extend(tail);

    let last_idx = output.len().saturating_sub(1);
    output
        .into_iter()
        .enumerate()
        .filter(|(idx, entry)| !entry.is_api_error() || *idx == last_idx)
        .map(|(_, entry)| entry.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tether_model::ContentBlock;

    use super::*;
    use crate::entry::HookAttachmentKind;
    use crate::split::split_message_blocks;

    fn tool_use(id: &str) -> ConversationEntry {
        ConversationEntry::assistant(vec![ContentBlock::tool_use(
            id,
            "Bash",
            json!({}),
        )])
    }

    fn tool_result(id: &str) -> ConversationEntry {
        ConversationEntry::user(vec![ContentBlock::tool_result(id, "ok")])
    }

    fn hook(id: &str, event: HookEvent, name: &str) -> ConversationEntry {
        ConversationEntry::hook_attachment(
            HookAttachmentKind::Success,
            id,
            event,
            name,
        )
    }

    fn position(
        output: &[ConversationEntry],
        entry: &ConversationEntry,
    ) -> usize {
        output.iter().position(|e| e == entry).unwrap()
    }

    #[test]
    fn test_group_is_contiguous() {
        let t1 = tool_use("t1");
        let t2 = tool_use("t2");
        let pre1 = hook("t1", HookEvent::PreToolUse, "lint");
        let r2 = tool_result("t2");
        let r1 = tool_result("t1");
        let post1 = hook("t1", HookEvent::PostToolUse, "fmt");
        let text =
            ConversationEntry::assistant(vec![ContentBlock::text("done")]);
        let entries = vec![
            t1.clone(),
            t2.clone(),
            r2.clone(),
            post1.clone(),
            pre1.clone(),
            r1.clone(),
            text.clone(),
        ];

        let output = reorder_tool_use_and_hook_messages(&entries, &[]);
        assert_eq!(output, vec![t1, pre1, r1, post1, t2, r2, text]);
    }

    #[test]
    fn test_duplicates_and_strays() {
        let t1 = tool_use("t1");
        let stray_result = tool_result("nope");
        let stray_hook = hook("nope", HookEvent::PreToolUse, "lint");
        let mut unbound = hook("t1", HookEvent::PreToolUse, "lint");
        if let ConversationEntry::Attachment(inner) = &mut unbound {
            inner.attachment.tool_use_id = None;
        }
        let other_event = hook("t1", HookEvent::from("Notification"), "n");
        let entries = vec![
            t1.clone(),
            stray_result,
            stray_hook,
            t1.clone(),
            unbound.clone(),
            other_event.clone(),
        ];

        let output = reorder_tool_use_and_hook_messages(&entries, &[]);
        assert_eq!(output, vec![t1, unbound, other_event]);
    }

    #[test]
    fn test_incomplete_call_keeps_hooks() {
        let t1 = tool_use("t1");
        let pre = hook("t1", HookEvent::PreToolUse, "lint");
        let entries = [pre.clone(), t1.clone()];
        let output = reorder_tool_use_and_hook_messages(&entries, &[]);
        assert_eq!(output, vec![t1, pre]);
    }

    #[test]
    fn test_api_errors_collapse() {
        let a = ConversationEntry::system("api_error");
        let b = ConversationEntry::system("api_error");
        let other = ConversationEntry::user("next");

        // A later non-error entry hides every error.
        let entries = vec![a.clone(), b.clone(), other.clone()];
        let output = reorder_tool_use_and_hook_messages(&entries, &[]);
        assert_eq!(output, vec![other.clone()]);

        // Trailing consecutive errors collapse to the last one.
        let c = ConversationEntry::system("api_error");
        let entries = vec![a.clone(), other.clone(), b.clone(), c.clone()];
        let output = reorder_tool_use_and_hook_messages(&entries, &[]);
        assert_eq!(output, vec![other.clone(), c.clone()]);

        // The tail counts towards "last".
        let output = reorder_tool_use_and_hook_messages(&[c.clone()], &[a]);
        assert_eq!(output.len(), 1);
        assert_ne!(output[0], c);
    }

    #[test]
    fn test_tail_is_appended() {
        let status = ConversationEntry::system("informational");
        let t1 = tool_use("t1");
        let tail = [status.clone()];
        let output = reorder_tool_use_and_hook_messages(&[t1.clone()], &tail);
        assert_eq!(output, vec![t1, status]);
    }

    #[test]
    fn test_ordering_after_split() {
        let entries = vec![
            ConversationEntry::user("run both"),
            ConversationEntry::assistant(vec![
                ContentBlock::tool_use("t1", "Bash", json!({})),
                ContentBlock::tool_use("t2", "Bash", json!({})),
            ]),
            hook("t2", HookEvent::PreToolUse, "lint"),
            hook("t1", HookEvent::PreToolUse, "lint"),
            ConversationEntry::user(vec![
                ContentBlock::tool_result("t1", "a"),
                ContentBlock::tool_result("t2", "b"),
            ]),
        ];
        let split = split_message_blocks(&entries);
        let output = reorder_tool_use_and_hook_messages(&split, &[]);
        assert_eq!(output.len(), 7);

        for id in ["t1", "t2"] {
            let ids: Vec<_> = output
                .iter()
                .enumerate()
                .filter(|(_, e)| crate::tool_use_id(e) == Some(id))
                .map(|(idx, _)| idx)
                .collect();
            assert_eq!(ids.len(), 3);
            assert!(ids.windows(2).all(|w| w[1] == w[0] + 1));
        }
        assert!(position(&output, &split[1]) < position(&output, &split[2]));
    }
}
