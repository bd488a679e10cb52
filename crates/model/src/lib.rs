//! An abstraction layer for different LLM endpoints.
//!
//! This crate establishes a unified protocol for the tool runner to talk
//! to a model endpoint: the content blocks exchanged in both directions,
//! the request shape, and the provider contract for one-shot and
//! streaming calls.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to. Transport details
//! (HTTP, authentication, retries) belong to the provider crates.

#![deny(missing_docs)]

mod error;
mod message;
mod provider;
mod request;
mod response;

pub use error::*;
pub use message::*;
pub use provider::*;
pub use request::*;
pub use response::*;
