//! Reconciles the raw event stream of an agent session into a canonical
//! transcript.
//!
//! Everything in this crate is a pure function over a slice of
//! [`ConversationEntry`]: inputs are never mutated, every stage builds a
//! new sequence, and malformed entries are recovered by omission instead
//! of failing. The typical pipeline is:
//!
//! 1. [`split_message_blocks`] so every message carries one block;
//! 2. [`reorder_tool_use_and_hook_messages`] to put each tool call next
//!    to its hooks and result;
//! 3. [`remove_orphan_tool_uses`] and [`normalize_messages_for_api`] when
//!    the history is replayed to the model.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod api;
mod cache;
mod context;
mod entry;
mod identity;
mod neighbors;
mod orphan;
mod reorder;
mod split;

pub use api::*;
pub use cache::*;
pub use context::*;
pub use entry::*;
pub use identity::*;
pub use neighbors::*;
pub use orphan::*;
pub use reorder::*;
pub use split::*;
