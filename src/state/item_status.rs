/// Work item status definitions for tracking crawl progress
///
/// Every work item is in exactly one of these four states.
use std::fmt;

/// Represents the current state of a work item in the durable queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemStatus {
    /// Discovered and waiting to be claimed
    Pending,

    /// Claimed by exactly one worker
    Processing,

    /// Fetched, parsed, and stored
    Completed,

    /// Last attempt failed; re-claimable while under the retry ceiling
    Failed,
}

impl ItemStatus {
    /// All statuses, in display order
    pub const ALL: [ItemStatus; 4] = [
        Self::Pending,
        Self::Processing,
        Self::Completed,
        Self::Failed,
    ];

    /// Checks whether the state machine allows moving from `self` to `next`
    ///
    /// | From       | To                      | Operation                       |
    /// |------------|-------------------------|---------------------------------|
    /// | Pending    | Processing              | claim                           |
    /// | Failed     | Processing              | claim (under retry ceiling)     |
    /// | Processing | Completed               | report success                  |
    /// | Processing | Failed                  | report failure / stale sweep    |
    /// | Failed     | Pending                 | reset                           |
    pub fn can_transition_to(&self, next: ItemStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Failed, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
                | (Self::Failed, Self::Pending)
        )
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_string_roundtrip() {
        for status in ItemStatus::ALL {
            assert_eq!(
                ItemStatus::from_db_string(status.to_db_string()),
                Some(status)
            );
        }
    }

    #[test]
    fn test_unknown_db_string() {
        assert_eq!(ItemStatus::from_db_string("fetching"), None);
        assert_eq!(ItemStatus::from_db_string(""), None);
    }

    #[test]
    fn test_allowed_transitions() {
        assert!(ItemStatus::Pending.can_transition_to(ItemStatus::Processing));
        assert!(ItemStatus::Failed.can_transition_to(ItemStatus::Processing));
        assert!(ItemStatus::Processing.can_transition_to(ItemStatus::Completed));
        assert!(ItemStatus::Processing.can_transition_to(ItemStatus::Failed));
        assert!(ItemStatus::Failed.can_transition_to(ItemStatus::Pending));
    }

    #[test]
    fn test_forbidden_transitions() {
        assert!(!ItemStatus::Completed.can_transition_to(ItemStatus::Processing));
        assert!(!ItemStatus::Completed.can_transition_to(ItemStatus::Pending));
        assert!(!ItemStatus::Pending.can_transition_to(ItemStatus::Completed));
        assert!(!ItemStatus::Processing.can_transition_to(ItemStatus::Pending));
        assert!(!ItemStatus::Processing.can_transition_to(ItemStatus::Processing));
    }

    #[test]
    fn test_display_matches_db_string() {
        assert_eq!(ItemStatus::Processing.to_string(), "processing");
    }
}
