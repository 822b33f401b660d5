//! Retry eligibility
//!
//! The queue consults a `RetryPolicy` when it claims work. Failures are
//! retried until an item has accumulated `max_retries` failed attempts; after
//! that it stays `Failed` until an operator resets it.

use crate::state::ItemStatus;

/// Default number of failed attempts before an item is given up on
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Outcome of asking whether an item may be claimed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// The item can be claimed right away
    EligibleNow,

    /// The item has failed too many times and will not be claimed again
    EligibleNever,

    /// The item is in a status that is never claimed (in flight or done)
    NotEligible,
}

/// Retry ceiling applied to failed items
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Decides whether an item with this status and retry count is claimable
    pub fn decide(&self, status: ItemStatus, retry_count: u32) -> RetryDecision {
        match status {
            ItemStatus::Pending => RetryDecision::EligibleNow,
            ItemStatus::Failed if retry_count < self.max_retries => RetryDecision::EligibleNow,
            ItemStatus::Failed => RetryDecision::EligibleNever,
            ItemStatus::Processing | ItemStatus::Completed => RetryDecision::NotEligible,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}
