use tether_model::{ContentBlock, MessageContent};

use crate::entry::{ConversationEntry, MessageEntry, fresh_uuid};

/// Explodes every message entry into one entry per content block.
///
/// All fields other than the content are kept. Entries keep their original
/// identity until the first multi-block message is seen; from then on,
/// every block of that message included, each exploded or wrapped entry
/// gets a fresh identity so it stays individually addressable.
///
/// Plain-string user content is wrapped into a single text block, while
/// plain-string assistant content passes through untouched. When a user
/// message with image paste ids is split, each image entry only keeps its
/// own paste id.
///
/// Applying this function to its own output is a no-op.
pub fn split_message_blocks(
    entries: &[ConversationEntry],
) -> Vec<ConversationEntry> {
    let (_, output) = entries.iter().fold(
        (false, Vec::with_capacity(entries.len())),
        |(seen_multi_block, mut output), entry| {
            let seen = split_entry(entry, seen_multi_block, &mut output);
            (seen, output)
        },
    );
    output
}

/// Splits one entry into `output`, returning the updated fold state.
fn split_entry(
    entry: &ConversationEntry,
    seen_multi_block: bool,
    output: &mut Vec<ConversationEntry>,
) -> bool {
    let (inner, is_user) = match entry {
        ConversationEntry::User(inner) => (inner, true),
        ConversationEntry::Assistant(inner) => (inner, false),
        _ => {
            output.push(entry.clone());
            return seen_multi_block;
        }
    };
    let wrap = |inner: MessageEntry| {
        if is_user {
            ConversationEntry::User(inner)
        } else {
            ConversationEntry::Assistant(inner)
        }
    };

    let blocks = match &inner.message.content {
        MessageContent::Text(text) => {
            if !is_user {
                output.push(entry.clone());
                return seen_multi_block;
            }
            let mut wrapped = inner.clone();
            wrapped.message.content =
                MessageContent::Blocks(vec![ContentBlock::text(text.clone())]);
            if seen_multi_block {
                wrapped.uuid = Some(fresh_uuid());
            }
            output.push(wrap(wrapped));
            return seen_multi_block;
        }
        MessageContent::Blocks(blocks) => blocks,
    };

    if blocks.is_empty() {
        output.push(entry.clone());
        return seen_multi_block;
    }

    let seen_multi_block = seen_multi_block || blocks.len() > 1;
    let mut image_idx = 0;
    for block in blocks {
        let mut part = inner.clone();
        part.message.content = MessageContent::Blocks(vec![block.clone()]);
        if seen_multi_block {
            part.uuid = Some(fresh_uuid());
        }
        if let Some(paste_ids) = &inner.image_paste_ids {
            part.image_paste_ids = match block {
                ContentBlock::Image { .. } => {
                    let own = paste_ids.get(image_idx).cloned();
                    image_idx += 1;
                    own.map(|id| vec![id])
                }
                _ => None,
            };
        }
        output.push(wrap(part));
    }
    seen_multi_block
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn uuid_of(entry: &ConversationEntry) -> &str {
        entry.uuid().unwrap()
    }

    #[test]
    fn test_split_identity() {
        let single =
            ConversationEntry::assistant(vec![ContentBlock::text("a")]);
        let multi = ConversationEntry::assistant(vec![
            ContentBlock::text("b"),
            ContentBlock::tool_use("t1", "Bash", json!({})),
        ]);
        let after = ConversationEntry::user(vec![
            ContentBlock::tool_result("t1", "ok"),
        ]);
        let entries = vec![single.clone(), multi.clone(), after.clone()];

        let output = split_message_blocks(&entries);
        assert_eq!(output.len(), 4);
        assert_eq!(uuid_of(&output[0]), uuid_of(&single));
        assert_ne!(uuid_of(&output[1]), uuid_of(&multi));
        assert_ne!(uuid_of(&output[2]), uuid_of(&multi));
        assert_ne!(uuid_of(&output[1]), uuid_of(&output[2]));
        assert_ne!(uuid_of(&output[3]), uuid_of(&after));

        let moved = output[2].first_block().unwrap();
        assert_eq!(moved.tool_use_id(), Some("t1"));
        for entry in &output {
            let content = &entry.as_message().unwrap().message.content;
            assert_eq!(content.blocks().len(), 1);
        }
    }

    #[test]
    fn test_identity_kept_before_multi_block() {
        let prompt = ConversationEntry::user("hi");
        let reply =
            ConversationEntry::assistant(vec![ContentBlock::text("hello")]);
        let multi = ConversationEntry::assistant(vec![
            ContentBlock::text("a"),
            ContentBlock::text("b"),
        ]);
        let later = ConversationEntry::user("bye");
        let entries =
            vec![prompt.clone(), reply.clone(), multi.clone(), later.clone()];

        let output = split_message_blocks(&entries);
        let ids: Vec<_> = output.iter().map(uuid_of).collect();
        assert_eq!(ids[..2], [uuid_of(&prompt), uuid_of(&reply)]);
        assert!(!ids[2..].contains(&uuid_of(&multi)));
        assert_ne!(ids[4], uuid_of(&later));
    }

    #[test]
    fn test_split_is_idempotent() {
        let entries = vec![
            ConversationEntry::user("hello"),
            ConversationEntry::assistant(vec![
                ContentBlock::text("b"),
                ContentBlock::tool_use("t1", "Bash", json!({})),
                ContentBlock::tool_use("t2", "Bash", json!({})),
            ]),
            ConversationEntry::system("informational"),
            ConversationEntry::user("bye"),
            ConversationEntry::assistant("plain"),
        ];
        let once = split_message_blocks(&entries);
        let twice = split_message_blocks(&once);
        assert_eq!(once, twice);
        assert_eq!(once.len(), 7);
    }

    #[test]
    fn test_wrap_user_text() {
        let user = ConversationEntry::user("hello");
        let assistant = ConversationEntry::assistant("plain");
        let output =
            split_message_blocks(&[user.clone(), assistant.clone()]);

        assert_eq!(uuid_of(&output[0]), uuid_of(&user));
        assert_eq!(
            output[0].as_message().unwrap().message.content,
            MessageContent::Blocks(vec![ContentBlock::text("hello")])
        );
        assert_eq!(output[1], assistant);
    }

    #[test]
    fn test_image_paste_ids() {
        let image = || ContentBlock::Image {
            source: None,
            cache_control: None,
        };
        let mut entry = MessageEntry::new(MessageContent::Blocks(vec![
            image(),
            ContentBlock::text("look"),
            image(),
        ]));
        entry.image_paste_ids = Some(vec!["p1".to_owned(), "p2".to_owned()]);

        let output = split_message_blocks(&[ConversationEntry::User(entry)]);
        let paste_ids: Vec<_> = output
            .iter()
            .map(|entry| entry.as_message().unwrap().image_paste_ids.clone())
            .collect();
        assert_eq!(
            paste_ids,
            vec![
                Some(vec!["p1".to_owned()]),
                None,
                Some(vec!["p2".to_owned()]),
            ]
        );
    }

    #[test]
    fn test_input_untouched() {
        let entries = vec![ConversationEntry::assistant(vec![
            ContentBlock::text("a"),
            ContentBlock::text("b"),
        ])];
        let snapshot = entries.clone();
        let _ = split_message_blocks(&entries);
        assert_eq!(entries, snapshot);
    }
}
