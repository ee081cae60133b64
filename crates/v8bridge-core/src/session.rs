//! Bridge session state.

use crate::breakpoint::BreakpointTable;
use crate::error::BridgeError;

/// Lifecycle of a bridge session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Attached to a debuggee; operations are allowed.
    Attached,
    /// Detached; every operation fails.
    Detached,
}

/// One attached debugger connection and the breakpoints set through it.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    breakpoints: BreakpointTable,
}

impl Session {
    /// A freshly attached session with no breakpoints.
    pub fn attach() -> Self {
        Self {
            state: SessionState::Attached,
            breakpoints: BreakpointTable::new(),
        }
    }

    /// Return the current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The session's breakpoints.
    pub fn breakpoints(&self) -> &BreakpointTable {
        &self.breakpoints
    }

    /// Mutable access to the breakpoint table.
    pub fn breakpoints_mut(&mut self) -> &mut BreakpointTable {
        &mut self.breakpoints
    }

    /// Fail with [`BridgeError::Detached`] unless attached.
    pub fn require_attached(&self) -> Result<(), BridgeError> {
        match self.state {
            SessionState::Attached => Ok(()),
            SessionState::Detached => Err(BridgeError::Detached),
        }
    }

    /// Transition: Attached → Detached. Drops every breakpoint record.
    pub fn detach(&mut self) -> Result<(), BridgeError> {
        self.require_attached()?;
        self.breakpoints = BreakpointTable::new();
        self.state = SessionState::Detached;
        Ok(())
    }
}
