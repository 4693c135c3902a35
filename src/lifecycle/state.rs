//! Hook ordering state machine.

use crate::errors::{HarnessError, Result};
use std::fmt;

/// Where a group is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No environment has been built for a group yet
    Unbuilt,
    /// Environment built, snapshot not yet captured
    Built,
    /// Snapshot captured; tests may run
    SnapshotReady,
    /// Group finished and its snapshot dropped; the schema may still exist
    Released,
}

/// Lifecycle operations whose validity depends on the current state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    BeforeGroup,
    BeforeEach,
    AfterEach,
    AfterGroup,
    Rebuild,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Unbuilt => write!(f, "unbuilt"),
            LifecycleState::Built => write!(f, "built"),
            LifecycleState::SnapshotReady => write!(f, "snapshot_ready"),
            LifecycleState::Released => write!(f, "released"),
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hook::BeforeGroup => write!(f, "before_group"),
            Hook::BeforeEach => write!(f, "before_each"),
            Hook::AfterEach => write!(f, "after_each"),
            Hook::AfterGroup => write!(f, "after_group"),
            Hook::Rebuild => write!(f, "rebuild"),
        }
    }
}

impl LifecycleState {
    /// Whether `hook` may run in this state
    pub fn permits(self, hook: Hook) -> bool {
        use LifecycleState::*;
        match hook {
            Hook::BeforeGroup => matches!(self, Unbuilt | Released),
            Hook::BeforeEach | Hook::AfterEach | Hook::AfterGroup | Hook::Rebuild => {
                matches!(self, Built | SnapshotReady)
            }
        }
    }

    /// Reject `hook` with a usage error unless this state permits it
    pub fn check(self, hook: Hook) -> Result<()> {
        if self.permits(hook) {
            Ok(())
        } else {
            Err(HarnessError::usage(
                hook.to_string(),
                format!("not allowed while the group is {}", self),
            ))
        }
    }
}
