//! Key handling
//!
//! Work items are keyed either by an entry URL or by a bare lemma. Both are
//! normalized before they reach the queue.

mod normalize;

pub use normalize::{is_url_key, normalize_key, normalize_url};
