//! Core logic of the agent: the tool runner loop, tool execution and
//! permission checks.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod error;
mod model_client;
pub mod permission;
mod runner;
pub mod tool;

pub use error::RunnerError;
pub use model_client::{MessageStream, ModelClient};
pub use runner::{
    Outcome, ParamsHandle, RunnerParams, RunnerParamsBuilder, RunnerState,
    Step, Steps, ToolRunner,
};
pub use tool::{Tool, ToolRegistry};
