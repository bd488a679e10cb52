use std::fmt::{self, Debug, Display};

/// The answer to an [`Approval`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovalResult {
    /// Whether the call may proceed.
    pub approved: bool,
    /// Optional explanation, surfaced to the model on rejection.
    pub why: Option<String>,
}

/// Approval for a tool call request.
///
/// Raised when the permission engine answers "ask". The call waits until
/// one of [`Approval::approve`] or [`Approval::reject`] is called; dropping
/// the approval rejects it.
pub struct Approval {
    tool_name: String,
    what: String,
    justification: String,
    pub(crate) on_result: Option<Box<dyn FnOnce(ApprovalResult) + Send>>,
}

impl Approval {
    /// Creates a new approval.
    #[inline]
    pub fn new<S1: Into<String>, S2: Into<String>>(
        what: S1,
        justification: S2,
    ) -> Self {
        Self {
            tool_name: String::new(),
            what: what.into(),
            justification: justification.into(),
            on_result: None,
        }
    }

    /// Returns the name of the tool asking for approval.
    #[inline]
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// Returns what the approval is for.
    #[inline]
    pub fn what(&self) -> &str {
        &self.what
    }

    /// Returns the justification for the approval.
    #[inline]
    pub fn justification(&self) -> &str {
        &self.justification
    }

    pub(crate) fn set_tool_name(&mut self, tool_name: &str) {
        tool_name.clone_into(&mut self.tool_name);
    }

    pub(crate) fn set_justification_if_empty(&mut self, reason: &str) {
        if self.justification.is_empty() {
            reason.clone_into(&mut self.justification);
        }
    }

    /// Approves the request.
    #[inline]
    pub fn approve(self) {
        self.resolve(true, None);
    }

    /// Rejects the request with an optional reason.
    #[inline]
    pub fn reject(self, reason: Option<String>) {
        self.resolve(false, reason);
    }

    fn resolve(mut self, approved: bool, why: Option<String>) {
        let Some(on_result) = self.on_result.take() else {
            return;
        };
        (on_result)(ApprovalResult { approved, why });
    }
}

impl Debug for Approval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Approval")
            .field("tool_name", &self.tool_name)
            .field("what", &self.what)
            .field("justification", &self.justification)
            .finish_non_exhaustive()
    }
}

impl Display for Approval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{} ({})", self.what, self.justification))
    }
}
