//! Dispatch contexts and their metadata.
//!
//! This module provides:
//! - [`Metadata`], a key/value overlay with typed accessors
//! - [`Context`], the explicit per-call context threaded through enqueue
//!   calls and batch handlers

mod dispatch;
pub mod metadata;

pub use dispatch::Context;
pub use metadata::{is_incoming_key, is_outgoing_key, MetaValue, Metadata};
