//! Lifecycle status of an address in the durable store
//!
//! The database strings are read by the results scraper and reporting
//! tools, so they must not change.

use std::fmt;

/// Where an address sits in the `Unprocessed -> InProgress -> {Succeeded, Failed}` lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UrlStatus {
    /// Known, waiting for the scraper
    Unprocessed,

    /// Claimed by the scraper
    InProgress,

    /// Fetched and extracted; never revisited
    Succeeded,

    /// Last attempt failed; may be retried
    Failed,
}

impl UrlStatus {
    /// Position in the lifecycle, used by upsert to refuse regressions
    ///
    /// `Failed` ranks below `Succeeded` so a late success can still land,
    /// and above `InProgress` so a failed claim is not reset by a stale
    /// discovery.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Unprocessed => 0,
            Self::InProgress => 1,
            Self::Failed => 2,
            Self::Succeeded => 3,
        }
    }

    /// Returns true if an explicit status change from `self` to `next` is legal
    ///
    /// Nothing leaves `Succeeded`. `Failed` may go back to `Unprocessed` for a retry.
    pub fn can_transition_to(&self, next: UrlStatus) -> bool {
        use UrlStatus::*;

        if *self == next {
            return true;
        }

        match (self, next) {
            (Succeeded, _) => false,
            (Unprocessed, InProgress | Failed) => true,
            (InProgress, Succeeded | Failed | Unprocessed) => true,
            (Failed, Unprocessed | InProgress) => true,
            _ => false,
        }
    }

    /// Returns true if the address needs no further work
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Unprocessed => "unprocessed",
            Self::InProgress => "in_progress",
            Self::Succeeded => "successful",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "unprocessed" => Some(Self::Unprocessed),
            "in_progress" => Some(Self::InProgress),
            "successful" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn all_statuses() -> [Self; 4] {
        [
            Self::Unprocessed,
            Self::InProgress,
            Self::Succeeded,
            Self::Failed,
        ]
    }
}

impl fmt::Display for UrlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
