//! # Job Events
//!
//! Messages a running job sends to its caller, in generation order.

use super::RunVerdict;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    /// One user facing progress line.
    Progress(String),
    /// Sent exactly once, as the worker's last message.
    Done(RunVerdict),
}
