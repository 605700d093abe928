//! Cooperative cancellation.
//!
//! A [`CancellationToken`] is shared through a [`crate::context::Context`] and
//! observed by blocking enqueue calls and retry loops.

mod token;

pub use token::CancellationToken;
