//! State module for tracking crawl progress
//!
//! `ItemStatus` is the four-state machine every work item moves through:
//! pending, processing, completed, failed.

mod item_status;

pub use item_status::ItemStatus;
