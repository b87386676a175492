//! Deferred-rebuild flags
//!
//! Each reconfigurable subsystem carries one [`DirtyFlag`]. Setters only
//! ever call [`DirtyFlag::mark_pending`]; the checkpoint routine claims a
//! pending flag, rebuilds, then completes it. A trigger that lands while the
//! flag is claimed re-arms it, so `complete` leaves it pending and the next
//! checkpoint rebuilds exactly once more.

/// Observable state of a flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirtyState {
    /// Nothing to do
    #[default]
    Clean,
    /// Rebuild requested
    Pending,
    /// Rebuild running
    InProgress,
}

/// Tri-state rebuild flag
#[derive(Debug, Clone, Copy, Default)]
pub struct DirtyFlag {
    state: DirtyState,
    rearmed: bool,
}

impl DirtyFlag {
    /// New flag, already pending
    pub fn pending() -> Self {
        Self {
            state: DirtyState::Pending,
            rearmed: false,
        }
    }

    pub fn state(&self) -> DirtyState {
        self.state
    }

    pub fn is_clean(&self) -> bool {
        self.state == DirtyState::Clean
    }

    /// Request a rebuild
    pub fn mark_pending(&mut self) {
        match self.state {
            DirtyState::Clean | DirtyState::Pending => self.state = DirtyState::Pending,
            DirtyState::InProgress => self.rearmed = true,
        }
    }

    /// Take ownership of a pending rebuild. Returns false when there is
    /// nothing to claim (clean, or already claimed elsewhere).
    pub fn claim(&mut self) -> bool {
        if self.state == DirtyState::Pending {
            self.state = DirtyState::InProgress;
            self.rearmed = false;
            true
        } else {
            false
        }
    }

    /// Finish a claimed rebuild
    pub fn complete(&mut self) {
        debug_assert_eq!(self.state, DirtyState::InProgress);
        self.state = if self.rearmed {
            DirtyState::Pending
        } else {
            DirtyState::Clean
        };
        self.rearmed = false;
    }
}

/// Flags for the three reconfigurable subsystems
#[derive(Debug, Clone, Copy, Default)]
pub struct DirtyFlags {
    /// Filterbank channel counts changed
    pub filterbank: DirtyFlag,
    /// Encoding matrices are stale
    pub matrix: DirtyFlag,
    /// Diagnostic curves requested
    pub evaluation: DirtyFlag,
}

impl DirtyFlags {
    /// True when nothing is pending or running
    pub fn all_clean(&self) -> bool {
        self.filterbank.is_clean() && self.matrix.is_clean() && self.evaluation.is_clean()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let mut flag = DirtyFlag::default();
        assert_eq!(flag.state(), DirtyState::Clean);
        assert!(!flag.claim());

        flag.mark_pending();
        assert_eq!(flag.state(), DirtyState::Pending);
        assert!(flag.claim());
        assert_eq!(flag.state(), DirtyState::InProgress);
        assert!(!flag.claim());

        flag.complete();
        assert_eq!(flag.state(), DirtyState::Clean);
    }

    #[test]
    fn test_trigger_during_rebuild_is_not_lost() {
        let mut flag = DirtyFlag::pending();
        let mut rebuilds = 0;

        // First checkpoint: a trigger arrives mid-rebuild
        assert!(flag.claim());
        flag.mark_pending();
        flag.mark_pending();
        rebuilds += 1;
        flag.complete();
        assert_eq!(flag.state(), DirtyState::Pending);

        // Second checkpoint picks it up exactly once
        if flag.claim() {
            rebuilds += 1;
            flag.complete();
        }
        assert_eq!(flag.state(), DirtyState::Clean);

        // Third checkpoint has nothing to do
        assert!(!flag.claim());
        assert_eq!(rebuilds, 2);
    }

    #[test]
    fn test_all_clean() {
        let mut flags = DirtyFlags::default();
        assert!(flags.all_clean());
        flags.evaluation.mark_pending();
        assert!(!flags.all_clean());
    }
}
