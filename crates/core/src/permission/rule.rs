use std::fmt::{self, Display};

use serde_json::Value;

/// A permission rule naming a tool and, optionally, what it operates on.
///
/// Accepted forms:
///
/// - `Read` matches the tool `Read`.
/// - `mcp__*` matches every tool whose name starts with `mcp__`.
/// - `Edit(src/lib.rs)` matches `Edit` when the target is exactly
///   `src/lib.rs`.
/// - `Bash(git:*)` matches `Bash` when the target starts with `git`.
///
/// The target is the input's `command` field, or its `file_path` field
/// when there is no command.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ToolRule {
    tool_name: String,
    content: Option<String>,
}

impl ToolRule {
    /// Parses a rule. Strings that are not of the `Name(content)` form are
    /// taken as a bare tool name.
    pub fn parse(rule: &str) -> Self {
        let bare = || Self {
            tool_name: rule.to_owned(),
            content: None,
        };
        let Some((tool_name, rest)) = rule.split_once('(') else {
            return bare();
        };
        let Some(content) = rest.strip_suffix(')') else {
            return bare();
        };
        if tool_name.is_empty() || content.is_empty() || content.contains(')')
        {
            return bare();
        }
        Self {
            tool_name: tool_name.to_owned(),
            content: Some(content.to_owned()),
        }
    }

    /// Parses every rule, skipping blank ones.
    pub fn parse_all<S: AsRef<str>>(rules: &[S]) -> Vec<Self> {
        rules
            .iter()
            .map(|rule| Self::parse(rule.as_ref()))
            .filter(|rule| !rule.tool_name.trim().is_empty())
            .collect()
    }

    /// Returns the tool name or name pattern.
    #[inline]
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// Returns the content between the parentheses, if any.
    #[inline]
    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    fn matches_name(&self, tool_name: &str) -> bool {
        if self.tool_name == tool_name {
            return true;
        }
        self.tool_name
            .strip_suffix('*')
            .is_some_and(|prefix| tool_name.starts_with(prefix))
    }

    /// Returns `true` if the rule covers calling `tool_name` with `input`.
    pub fn applies(&self, tool_name: &str, input: &Value) -> bool {
        if !self.matches_name(tool_name) {
            return false;
        }
        let Some(content) = &self.content else {
            return true;
        };

        let target = ["command", "file_path"]
            .into_iter()
            .filter_map(|key| input.get(key))
            .find(|value| match value {
                Value::Null | Value::Bool(false) => false,
                Value::String(s) => !s.is_empty(),
                _ => true,
            });
        let Some(Value::String(target)) = target else {
            return false;
        };

        match content.strip_suffix(":*") {
            Some(prefix) if !prefix.is_empty() => target.starts_with(prefix),
            _ => target == content,
        }
    }
}

impl Display for ToolRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.content {
            Some(content) => write!(f, "{}({content})", self.tool_name),
            None => f.write_str(&self.tool_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse() {
        let rule = ToolRule::parse("Bash(npm run:*)");
        assert_eq!(rule.tool_name(), "Bash");
        assert_eq!(rule.content(), Some("npm run:*"));
        assert_eq!(rule.to_string(), "Bash(npm run:*)");

        for bare in ["Read", "Bash()", "(x)", "Bash(a)b)"] {
            let rule = ToolRule::parse(bare);
            assert_eq!(rule.tool_name(), bare);
            assert_eq!(rule.content(), None);
        }

        let rules = ToolRule::parse_all(&["Read", "", " "]);
        assert_eq!(rules, [ToolRule::parse("Read")]);
    }

    #[test]
    fn test_applies() {
        let rule = ToolRule::parse("mcp__*");
        assert!(rule.applies("mcp__fetch", &json!({})));
        assert!(!rule.applies("Bash", &json!({})));

        let rule = ToolRule::parse("Bash(git:*)");
        assert!(rule.applies("Bash", &json!({"command": "git log"})));
        assert!(!rule.applies("Bash", &json!({"command": "rm -rf /"})));
        assert!(!rule.applies("Bash", &json!({})));

        let rule = ToolRule::parse("Edit(a.txt)");
        assert!(rule.applies("Edit", &json!({"file_path": "a.txt"})));
        let input = json!({"command": "", "file_path": "a.txt"});
        assert!(rule.applies("Edit", &input));
        assert!(!rule.applies("Edit", &json!({"file_path": "b.txt"})));
    }
}
