use tether_model::{CacheControl, ContentBlock, MessageContent, MessageParam};

use crate::entry::ConversationEntry;

/// Number of trailing messages that receive a cache marker.
pub const CACHED_TAIL_LEN: usize = 3;

fn mark_last_block(
    content: &MessageContent,
    marker: &CacheControl,
    skip_thinking: bool,
) -> MessageContent {
    let mut blocks = content.clone().into_blocks();
    if let Some(last) = blocks.last_mut() {
        if !(skip_thinking && last.is_thinking()) {
            last.set_cache_control(marker.clone());
        }
    }
    MessageContent::Blocks(blocks)
}

/// Converts an entry into a message for the model.
///
/// With a `marker`, the last block of user and assistant content gets it;
/// plain strings are wrapped into a text block first, and thinking blocks
/// ending an assistant message are left unmarked. System entries that
/// carry a message become unmarked user messages. Other entries yield
/// `None`.
pub fn to_api_message(
    entry: &ConversationEntry,
    marker: Option<&CacheControl>,
) -> Option<MessageParam> {
    match entry {
        ConversationEntry::User(inner) => {
            let content = &inner.message.content;
            Some(MessageParam::user(match marker {
                Some(marker) => mark_last_block(content, marker, false),
                None => content.clone(),
            }))
        }
        ConversationEntry::Assistant(inner) => {
            let content = &inner.message.content;
            Some(MessageParam::assistant(match marker {
                Some(marker) => mark_last_block(content, marker, true),
                None => content.clone(),
            }))
        }
        ConversationEntry::System(inner) => {
            let content = inner.message.as_ref()?.content.clone()?;
            Some(MessageParam::user(content))
        }
        _ => None,
    }
}

fn has_api_message(entry: &ConversationEntry) -> bool {
    match entry {
        ConversationEntry::User(_) | ConversationEntry::Assistant(_) => true,
        ConversationEntry::System(inner) => inner
            .message
            .as_ref()
            .is_some_and(|message| message.content.is_some()),
        _ => false,
    }
}

/// Converts the message entries into messages for the model.
///
/// Entries without a model-visible message are skipped. With a `marker`,
/// only the last [`CACHED_TAIL_LEN`] messages are marked.
pub fn normalize_messages_for_api(
    entries: &[ConversationEntry],
    marker: Option<&CacheControl>,
) -> Vec<MessageParam> {
    let visible: Vec<_> =
        entries.iter().filter(|entry| has_api_message(entry)).collect();
    let cache_from = visible.len().saturating_sub(CACHED_TAIL_LEN);
    visible
        .into_iter()
        .enumerate()
        .filter_map(|(idx, entry)| {
            to_api_message(entry, marker.filter(|_| idx >= cache_from))
        })
        .collect()
}

/// Returns `true` if any block of the messages carries a cache marker.
pub fn has_cache_marker(messages: &[MessageParam]) -> bool {
    messages.iter().any(|message| {
        message.content.blocks().iter().any(|block| match block {
            ContentBlock::Text { cache_control, .. }
            | ContentBlock::ToolUse { cache_control, .. }
            | ContentBlock::ToolResult { cache_control, .. }
            | ContentBlock::Image { cache_control, .. } => {
                cache_control.is_some()
            }
            _ => false,
        })
    })
}
