//! Cooperative cancellation for task runs.
//!
//! One [`CancellationToken`] is shared by every branch of a run. Branches
//! check it before starting and between files or chunks.

mod token;

pub use token::CancellationToken;
