/// URL state definitions for tracking frontier progress
///
/// Every URL a crawl knows about moves through these states exactly once, in
/// order. A URL the frontier has never seen is implicitly `Unseen`.
use std::fmt;

/// Represents the current state of a URL inside one crawl's frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrlState {
    /// Never admitted to the frontier
    Unseen,

    /// Admitted and waiting to be polled by a worker
    Queued,

    /// Polled by a worker and not yet acknowledged
    InFlight,

    /// Acknowledged; the URL produced its single result
    Done,
}

impl UrlState {
    /// Returns true while the URL still keeps the frontier alive
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::InFlight)
    }

    /// Returns true for the terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Returns true if `next` is the single legal successor of this state
    pub fn can_transition_to(&self, next: UrlState) -> bool {
        matches!(
            (self, next),
            (Self::Unseen, Self::Queued) | (Self::Queued, Self::InFlight) | (Self::InFlight, Self::Done)
        )
    }

    /// Short lowercase name, used for logging
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unseen => "unseen",
            Self::Queued => "queued",
            Self::InFlight => "in_flight",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for UrlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
