//! Failure policies for the supervisor and poller loops.

mod retry;

pub use retry::{RetryCounter, RetryPolicy};
