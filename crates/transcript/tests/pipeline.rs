use serde_json::json;
use tether_transcript::{
    ConversationEntry, HookEvent, PromptCacheConfig, ToolContext,
    normalize_messages_for_api, remove_orphan_tool_uses,
    reorder_tool_use_and_hook_messages, split_message_blocks, tool_use_id,
};

/// A session that was killed while `t2` was still running.
const INTERRUPTED_SESSION: &str = r#"
{"type":"user","uuid":"u1","message":{"role":"user","content":"list and read"}}
{"type":"assistant","uuid":"a1","requestId":"req_1","message":{"id":"msg_1","role":"assistant","content":[{"type":"text","text":"On it."},{"type":"tool_use","id":"t1","name":"Glob","input":{"pattern":"*"}},{"type":"tool_use","id":"t2","name":"Read","input":{"file_path":"a.txt"}}]}}
{"type":"progress","uuid":"p1","parentToolUseID":"t1","data":{"type":"hook_progress","hookEvent":"PreToolUse"}}
{"type":"attachment","uuid":"h2","attachment":{"type":"hook_success","toolUseID":"t2","hookEvent":"PreToolUse","hookName":"audit"}}
{"type":"attachment","uuid":"h1","attachment":{"type":"hook_success","toolUseID":"t1","hookEvent":"PreToolUse","hookName":"audit"}}
{"type":"user","uuid":"r1","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"t1","content":"a.txt"}]},"toolUseResult":{"files":["a.txt"]}}
{"type":"attachment","uuid":"h3","attachment":{"type":"hook_non_blocking_error","toolUseID":"t1","hookEvent":"PostToolUse","hookName":"fmt"}}
{"type":"system","uuid":"s1","subtype":"api_error","level":"error"}
"#;

fn load(jsonl: &str) -> Vec<ConversationEntry> {
    jsonl
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[test]
fn test_canonical_transcript() {
    let entries = load(INTERRUPTED_SESSION);
    let split = split_message_blocks(&entries);
    let output = reorder_tool_use_and_hook_messages(&split, &[]);

    let labels: Vec<_> = output
        .iter()
        .map(|entry| match entry {
            ConversationEntry::User(_) => {
                format!("user:{}", tool_use_id(entry).unwrap_or("-"))
            }
            ConversationEntry::Assistant(_) => {
                format!("assistant:{}", tool_use_id(entry).unwrap_or("-"))
            }
            ConversationEntry::Attachment(inner) => format!(
                "hook:{}:{}",
                tool_use_id(entry).unwrap_or("-"),
                inner.attachment.hook_event.as_ref().unwrap()
            ),
            ConversationEntry::Progress(_) => "progress".to_owned(),
            ConversationEntry::System(_) => "system".to_owned(),
        })
        .collect();

    assert_eq!(
        labels,
        [
            "user:-",
            "assistant:-",
            "assistant:t1",
            "hook:t1:PreToolUse",
            "user:t1",
            "hook:t1:PostToolUse",
            "assistant:t2",
            "hook:t2:PreToolUse",
            "progress",
            "system",
        ]
    );

    // The standing error is last, so it survives.
    assert!(output.last().unwrap().is_api_error());
}

#[test]
fn test_resume_drops_interrupted_call() {
    let entries = load(INTERRUPTED_SESSION);
    let resumable = remove_orphan_tool_uses(&entries);
    let calls: Vec<_> = resumable
        .iter()
        .filter(|entry| matches!(entry, ConversationEntry::Assistant(_)))
        .filter_map(tool_use_id)
        .collect();
    assert_eq!(calls, ["t1"]);

    let config = PromptCacheConfig::default();
    let marker = config.marker_for("claude-sonnet-4");
    let messages = normalize_messages_for_api(&resumable, marker.as_ref());
    // user, text, t1 call, t1 result
    assert_eq!(messages.len(), 4);
    assert_eq!(
        serde_json::to_value(&messages[2]).unwrap()["content"][0]["id"],
        json!("t1")
    );
}

#[test]
fn test_query_context() {
    let entries = load(INTERRUPTED_SESSION);
    let split = split_message_blocks(&entries);
    let ctx = ToolContext::build(&split, &entries);

    let t1 = split
        .iter()
        .find(|entry| {
            matches!(entry, ConversationEntry::Assistant(_))
                && tool_use_id(entry) == Some("t1")
        })
        .unwrap();
    assert_eq!(ctx.sibling_tool_use_ids(t1), ["t1", "t2"]);
    assert_eq!(ctx.progress_for_entry(t1).len(), 1);
    assert!(!ctx.has_in_progress_hooks("t1", &HookEvent::PreToolUse));
}
