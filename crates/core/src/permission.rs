//! Permission checks performed before a tool runs.

mod rule;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use rule::ToolRule;

/// What to do with a tool call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionBehavior {
    /// Run the call.
    Allow,
    /// Refuse the call.
    Deny,
    /// Ask the user first.
    Ask,
}

/// The verdict of a [`PermissionEngine`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermissionDecision {
    /// What to do.
    pub behavior: PermissionBehavior,
    /// Human-readable explanation.
    pub reason: Option<String>,
}

impl PermissionDecision {
    #[inline]
    fn new<S: Into<String>>(behavior: PermissionBehavior, reason: S) -> Self {
        Self {
            behavior,
            reason: Some(reason.into()),
        }
    }

    /// Creates an `allow` decision.
    #[inline]
    pub fn allow<S: Into<String>>(reason: S) -> Self {
        Self::new(PermissionBehavior::Allow, reason)
    }

    /// Creates a `deny` decision.
    #[inline]
    pub fn deny<S: Into<String>>(reason: S) -> Self {
        Self::new(PermissionBehavior::Deny, reason)
    }

    /// Creates an `ask` decision.
    #[inline]
    pub fn ask<S: Into<String>>(reason: S) -> Self {
        Self::new(PermissionBehavior::Ask, reason)
    }
}

/// Decides whether a tool call may run.
///
/// Engines are consulted synchronously, right before the call is
/// scheduled, with the raw input sent by the model.
pub trait PermissionEngine: Send + Sync {
    /// Returns the decision for calling `tool_name` with `input`.
    fn decide(&self, tool_name: &str, input: &Value) -> PermissionDecision;
}

impl<F> PermissionEngine for F
where
    F: Fn(&str, &Value) -> PermissionDecision + Send + Sync,
{
    #[inline]
    fn decide(&self, tool_name: &str, input: &Value) -> PermissionDecision {
        self(tool_name, input)
    }
}

/// How permissive the agent is for calls no rule matches.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    /// Ask for every call.
    #[default]
    Default,
    /// Planning only, ask for every call.
    Plan,
    /// Run every call without asking.
    AcceptEdits,
    /// Refuse every call instead of asking.
    DontAsk,
    /// Ask for every call on behalf of another agent.
    Delegate,
    /// Skip all checks, deny rules included.
    BypassPermissions,
}

impl PermissionMode {
    /// Returns the name used in settings files.
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionMode::Default => "default",
            PermissionMode::Plan => "plan",
            PermissionMode::AcceptEdits => "acceptEdits",
            PermissionMode::DontAsk => "dontAsk",
            PermissionMode::Delegate => "delegate",
            PermissionMode::BypassPermissions => "bypassPermissions",
        }
    }
}

/// A rule-based [`PermissionEngine`].
///
/// Checks run in a fixed order and the first one that applies wins:
///
/// 1. `bypassPermissions` mode allows everything.
/// 2. A matching deny rule denies.
/// 3. A matching allow rule allows.
/// 4. `acceptEdits` mode allows.
/// 5. `dontAsk` mode denies.
/// 6. Otherwise the user is asked.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PermissionContext {
    mode: PermissionMode,
    allow: Vec<ToolRule>,
    deny: Vec<ToolRule>,
}

impl PermissionContext {
    /// Creates a context without rules.
    #[inline]
    pub fn new(mode: PermissionMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    /// Adds an allow rule.
    #[inline]
    pub fn with_allow_rule(mut self, rule: ToolRule) -> Self {
        self.allow.push(rule);
        self
    }

    /// Adds a deny rule.
    #[inline]
    pub fn with_deny_rule(mut self, rule: ToolRule) -> Self {
        self.deny.push(rule);
        self
    }

    /// Returns the current mode.
    #[inline]
    pub fn mode(&self) -> PermissionMode {
        self.mode
    }

    /// Switches the mode, keeping the rules.
    #[inline]
    pub fn set_mode(&mut self, mode: PermissionMode) {
        self.mode = mode;
    }

    /// Replaces the rule lists that are given.
    pub fn update_rules(
        &mut self,
        allow: Option<Vec<ToolRule>>,
        deny: Option<Vec<ToolRule>>,
    ) {
        if let Some(allow) = allow {
            self.allow = allow;
        }
        if let Some(deny) = deny {
            self.deny = deny;
        }
    }
}

impl PermissionEngine for PermissionContext {
    fn decide(&self, tool_name: &str, input: &Value) -> PermissionDecision {
        let mode = self.mode.as_str();
        if self.mode == PermissionMode::BypassPermissions {
            return PermissionDecision::allow(format!("{mode} mode"));
        }

        let matching = |rules: &[ToolRule]| {
            rules
                .iter()
                .find(|rule| rule.applies(tool_name, input))
                .cloned()
        };
        if let Some(rule) = matching(&self.deny) {
            return PermissionDecision::deny(format!("denied by rule `{rule}`"));
        }
        if let Some(rule) = matching(&self.allow) {
            return PermissionDecision::allow(format!(
                "allowed by rule `{rule}`"
            ));
        }

        match self.mode {
            PermissionMode::AcceptEdits => {
                PermissionDecision::allow(format!("{mode} mode"))
            }
            PermissionMode::DontAsk => {
                PermissionDecision::deny(format!("{mode} mode"))
            }
            _ => PermissionDecision::ask(format!("{mode} mode")),
        }
    }
}

/// Permission settings as stored in a settings file.
///
/// ```json
/// {"mode": "acceptEdits", "allow": ["Read", "Bash(git:*)"], "deny": ["Web*"]}
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionSettings {
    /// The mode.
    pub mode: PermissionMode,
    /// Allow rules, see [`ToolRule::parse`].
    pub allow: Vec<String>,
    /// Deny rules, see [`ToolRule::parse`].
    pub deny: Vec<String>,
}

impl PermissionSettings {
    /// Builds the engine. Blank rules are ignored.
    pub fn to_context(&self) -> PermissionContext {
        PermissionContext {
            mode: self.mode,
            allow: ToolRule::parse_all(&self.allow),
            deny: ToolRule::parse_all(&self.deny),
        }
    }
}
