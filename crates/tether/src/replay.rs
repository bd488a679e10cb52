//! Loading and summarizing stored transcripts.

use tether_model::{ContentBlock, MessageContent};
use tether_transcript::{
    ConversationEntry, reorder_tool_use_and_hook_messages,
    split_message_blocks,
};

/// Longest text shown for a single entry.
const MAX_TEXT_LEN: usize = 72;

/// An error while loading a transcript.
#[derive(Debug, thiserror::Error)]
#[error("line {line}: {source}")]
pub struct LoadError {
    /// One-based line number.
    pub line: usize,
    /// The parse failure.
    #[source]
    pub source: serde_json::Error,
}

/// Parses a transcript stored as one JSON entry per line.
///
/// Blank lines are skipped.
pub fn parse_jsonl(text: &str) -> Result<Vec<ConversationEntry>, LoadError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|source| LoadError {
                line: idx + 1,
                source,
            })
        })
        .collect()
}

/// Splits and reorders the entries for display.
pub fn canonical(entries: &[ConversationEntry]) -> Vec<ConversationEntry> {
    reorder_tool_use_and_hook_messages(&split_message_blocks(entries), &[])
}

/// What an entry is, for choosing how to display it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LineKind {
    /// Text typed by the user.
    Prompt,
    /// Text or thinking of the assistant.
    Reply,
    /// A tool call.
    ToolUse,
    /// A successful tool result.
    ToolResult,
    /// A failed tool result.
    ToolError,
    /// A hook attachment or progress report.
    Hook,
    /// A failed model call.
    ApiError,
    /// Any other system entry.
    System,
}

/// A one-line rendering of an entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Line {
    /// What the entry is.
    pub kind: LineKind,
    /// Short label, like the tool name.
    pub label: String,
    /// The rest of the line.
    pub detail: String,
}

impl Line {
    fn new<S1: Into<String>, S2: Into<String>>(
        kind: LineKind,
        label: S1,
        detail: S2,
    ) -> Self {
        Self {
            kind,
            label: label.into(),
            detail: detail.into(),
        }
    }
}

fn shorten(text: &str) -> String {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match text.char_indices().nth(MAX_TEXT_LEN) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text,
    }
}

fn text_line(entry: &ConversationEntry, text: &str) -> Line {
    match entry {
        ConversationEntry::User(_) => {
            Line::new(LineKind::Prompt, "user", shorten(text))
        }
        _ => Line::new(LineKind::Reply, "assistant", shorten(text)),
    }
}

fn block_line(entry: &ConversationEntry, block: &ContentBlock) -> Line {
    match block {
        ContentBlock::Text { text, .. } => text_line(entry, text),
        ContentBlock::ToolUse {
            id, name, input, ..
        }
        | ContentBlock::ServerToolUse { id, name, input } => Line::new(
            LineKind::ToolUse,
            name.as_str(),
            format!("{} {id}", shorten(&input.to_string())),
        ),
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
            ..
        } => {
            let kind = if is_error.unwrap_or(false) {
                LineKind::ToolError
            } else {
                LineKind::ToolResult
            };
            Line::new(kind, tool_use_id.as_str(), shorten(&content.to_text()))
        }
        ContentBlock::Thinking { thinking, .. } => {
            Line::new(LineKind::Reply, "thinking", shorten(thinking))
        }
        other => Line::new(LineKind::Reply, other.kind(), ""),
    }
}

/// Summarizes an entry on one line.
pub fn describe(entry: &ConversationEntry) -> Line {
    match entry {
        ConversationEntry::User(inner)
        | ConversationEntry::Assistant(inner) => {
            match &inner.message.content {
                MessageContent::Text(text) => text_line(entry, text),
                MessageContent::Blocks(blocks) => match blocks.first() {
                    Some(block) => block_line(entry, block),
                    None => Line::new(LineKind::Reply, "empty", ""),
                },
            }
        }
        ConversationEntry::Attachment(inner) => {
            let attachment = &inner.attachment;
            Line::new(
                LineKind::Hook,
                attachment.kind.as_str(),
                format!(
                    "{} {} {}",
                    attachment
                        .hook_event
                        .as_ref()
                        .map(|event| event.as_str())
                        .unwrap_or("-"),
                    attachment.hook_name.as_deref().unwrap_or("-"),
                    attachment.tool_use_id.as_deref().unwrap_or("-"),
                ),
            )
        }
        ConversationEntry::Progress(inner) => Line::new(
            LineKind::Hook,
            inner.data.kind.as_str(),
            format!(
                "{} {}",
                inner
                    .data
                    .hook_event
                    .as_ref()
                    .map(|event| event.as_str())
                    .unwrap_or("-"),
                inner.parent_tool_use_id.as_deref().unwrap_or("-"),
            ),
        ),
        ConversationEntry::System(inner) => {
            let kind = if entry.is_api_error() {
                LineKind::ApiError
            } else {
                LineKind::System
            };
            let detail = match &inner.content {
                Some(serde_json::Value::String(text)) => shorten(text),
                Some(value) => shorten(&value.to_string()),
                None => inner.level.clone().unwrap_or_default(),
            };
            Line::new(
                kind,
                inner.subtype.as_deref().unwrap_or("system"),
                detail,
            )
        }
    }
}
