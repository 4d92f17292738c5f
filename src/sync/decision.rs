//! Sync direction decisions.
//!
//! Three-way comparison of each side's current fingerprint against the
//! checkpoint recorded at the end of the last successful sync. Pure, no I/O.

use std::fmt;

use crate::sync::hash::Fingerprint;

/// Direction bytes flow in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Local file overwrites the remote one (forward patch).
    LocalToRemote,
    /// Remote file overwrites the local one (reverse patch).
    RemoteToLocal,
}

impl Direction {
    pub fn name(&self) -> &'static str {
        match self {
            Direction::LocalToRemote => "local -> remote",
            Direction::RemoteToLocal => "remote -> local",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why no direction could be chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    NothingToSync,
    BothChanged,
    PreviousStateMismatch,
}

impl ConflictReason {
    pub fn description(&self) -> &'static str {
        match self {
            Self::NothingToSync => "nothing to sync",
            Self::BothChanged => "both sides changed since last sync",
            Self::PreviousStateMismatch => "previous-state mismatch",
        }
    }
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// What a sync attempt should do. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    NoOp,
    PushLocalToRemote,
    PullRemoteToLocal,
    Conflict(ConflictReason),
}

impl SyncDecision {
    /// The transfer direction, if any.
    pub fn direction(&self) -> Option<Direction> {
        match self {
            Self::PushLocalToRemote => Some(Direction::LocalToRemote),
            Self::PullRemoteToLocal => Some(Direction::RemoteToLocal),
            Self::NoOp | Self::Conflict(_) => None,
        }
    }

    pub fn from_direction(direction: Direction) -> Self {
        match direction {
            Direction::LocalToRemote => Self::PushLocalToRemote,
            Direction::RemoteToLocal => Self::PullRemoteToLocal,
        }
    }
}

impl fmt::Display for SyncDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoOp => f.write_str("up to date"),
            Self::PushLocalToRemote => f.write_str("push local -> remote"),
            Self::PullRemoteToLocal => f.write_str("pull remote -> local"),
            Self::Conflict(reason) => write!(f, "conflict: {}", reason),
        }
    }
}

/// One side of the comparison: its current fingerprint (`None` when the file
/// is absent) and the fingerprint recorded at the last sync.
#[derive(Debug, Clone, Copy)]
pub struct Side<'a> {
    pub current: Option<&'a Fingerprint>,
    pub previous: Option<&'a Fingerprint>,
}

impl<'a> Side<'a> {
    pub fn new(current: Option<&'a Fingerprint>, previous: Option<&'a Fingerprint>) -> Self {
        Self { current, previous }
    }

    fn exists(&self) -> bool {
        self.current.is_some()
    }

    /// A side with no previous fingerprint always counts as changed.
    fn changed(&self) -> bool {
        match (self.current, self.previous) {
            (Some(current), Some(previous)) => current != previous,
            _ => true,
        }
    }
}

/// Decide what to do for one pair. First matching rule wins.
pub fn decide(local: Side<'_>, remote: Side<'_>) -> SyncDecision {
    match (local.exists(), remote.exists()) {
        (false, false) => return SyncDecision::Conflict(ConflictReason::NothingToSync),
        (false, true) => return SyncDecision::PullRemoteToLocal,
        (true, false) => return SyncDecision::PushLocalToRemote,
        (true, true) => {}
    }

    // A record holding only one side can't have come from a completed commit.
    if local.previous.is_some() != remote.previous.is_some() {
        return SyncDecision::Conflict(ConflictReason::PreviousStateMismatch);
    }

    match (local.changed(), remote.changed()) {
        (false, false) => SyncDecision::NoOp,
        (true, false) => SyncDecision::PushLocalToRemote,
        (false, true) => SyncDecision::PullRemoteToLocal,
        (true, true) => SyncDecision::Conflict(ConflictReason::BothChanged),
    }
}
