//! An out-of-the-box agent session built on the tool runner.
//!
//! The crate drives multi-turn conversations through
//! [`ToolRunner`](tether_core::ToolRunner), records everything that happens
//! as a transcript, and can replay a stored transcript in the terminal with
//! the `tether-replay` binary.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

pub mod replay;
mod session;

pub use session::{Session, SessionBuilder};

/// Re-exports of [`tether_core`] crate.
pub mod core {
    pub use tether_core::*;
}

/// Re-exports of [`tether_transcript`] crate.
pub mod transcript {
    pub use tether_transcript::*;
}
