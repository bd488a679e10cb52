use std::collections::{HashMap, HashSet};

use tether_model::ContentBlock;

use crate::entry::ConversationEntry;
use crate::identity::leading_tool_use_id;
use crate::split::split_message_blocks;

/// Returns the ids of all `tool_use` blocks leading an assistant entry.
pub fn tool_use_ids(entries: &[ConversationEntry]) -> HashSet<String> {
    entries
        .iter()
        .filter_map(leading_tool_use_id)
        .map(ToOwned::to_owned)
        .collect()
}

/// Maps the id of every reported tool call to whether it failed.
///
/// Only user entries led by a `tool_result` block count. If a call is
/// reported twice, the later report wins.
pub fn tool_result_error_map(
    entries: &[ConversationEntry],
) -> HashMap<String, bool> {
    entries
        .iter()
        .filter(|entry| matches!(entry, ConversationEntry::User(_)))
        .filter_map(|entry| match entry.first_block()? {
            ContentBlock::ToolResult {
                tool_use_id,
                is_error,
                ..
            } => Some((tool_use_id.clone(), is_error.unwrap_or(false))),
            _ => None,
        })
        .collect()
}

/// Returns the ids of tool calls whose result is flagged as an error.
pub fn error_tool_use_ids(entries: &[ConversationEntry]) -> HashSet<String> {
    let errors = tool_result_error_map(entries);
    tool_use_ids(entries)
        .into_iter()
        .filter(|id| errors.get(id).copied().unwrap_or(false))
        .collect()
}

/// Returns the ids of tool calls that have no result anywhere.
pub fn missing_tool_result_ids(
    entries: &[ConversationEntry],
) -> HashSet<String> {
    let reported = tool_result_error_map(entries);
    tool_use_ids(entries)
        .into_iter()
        .filter(|id| !reported.contains_key(id))
        .collect()
}

/// Drops every tool call that never received a result.
///
/// The entries are split first, so a dropped call only removes its own
/// `tool_use` block, not the rest of the assistant turn. An interrupted
/// call must not be replayed to the model as a dangling request.
pub fn remove_orphan_tool_uses(
    entries: &[ConversationEntry],
) -> Vec<ConversationEntry> {
    let normalized = split_message_blocks(entries);
    let missing = missing_tool_result_ids(&normalized);
    if !missing.is_empty() {
        debug!(count = missing.len(), "removing orphan tool uses");
    }
    normalized
        .into_iter()
        .filter(|entry| {
            leading_tool_use_id(entry).is_none_or(|id| !missing.contains(id))
        })
        .collect()
}
