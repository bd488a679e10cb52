//! Tool call supports.

mod approval;
mod error;
mod object;
mod registry;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tether_model::ToolResultContent;
use tokio_util::sync::CancellationToken;

pub use approval::{Approval, ApprovalResult};
pub use error::{Error, ErrorKind};
pub use registry::ToolRegistry;

/// The output of a tool call.
pub type ToolOutput = Result<ToolResultContent, Error>;

/// A tool that can be called by the model.
///
/// Implementations of this trait should be stateless, and may not maintain any
/// internal state.
///
/// The tool can be context-aware, meaning it can access additional information
/// about the current execution context, such as the working directory or the
/// current user. To do this, make the context an immutable state of the tool,
/// which can be set during initialization, and copy it when executing.
pub trait Tool: Send + Sync + 'static {
    /// The type of input that the tool accepts.
    type Input: DeserializeOwned + Send + 'static;

    /// Returns the name of the tool.
    fn name(&self) -> &str;

    /// Returns the description of the tool.
    fn description(&self) -> &str;

    /// Returns the input schema of the tool.
    fn input_schema(&self) -> &Value;

    /// Normalizes the raw input sent by the model.
    ///
    /// The default implementation deserializes it with `serde`.
    fn parse(&self, raw: Value) -> Result<Self::Input, Error> {
        serde_json::from_value(raw)
            .map_err(|err| Error::invalid_input().with_reason(err.to_string()))
    }

    /// Describes the call for a user who is asked to approve it.
    fn make_approval(&self, _input: &Self::Input) -> Approval {
        Approval::new(format!("Use tool `{}`", self.name()), "")
    }

    /// Executes the tool with the given input.
    ///
    /// This method must return a future that is fully independent of `self`,
    /// and the future should be cancellation safe. Long-running tools should
    /// stop early once `cancel` fires.
    fn execute(
        &self,
        input: Self::Input,
        cancel: CancellationToken,
    ) -> impl Future<Output = ToolOutput> + Send + 'static;
}
