//! The transport seam between the bridge and a V8 debuggee.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::broadcast;
use v8bridge_protocol::{
    BacktraceArguments, BacktraceBody, BreakEventBody, ChangeBreakpointArguments,
    ClearBreakpointArguments, ContinueArguments, ListBreakpointsBody, LookupArguments, Mirror,
    ScriptsArguments, SetBreakpointArguments, SetBreakpointBody,
};

use crate::error::BridgeError;
use crate::record::Handle;

/// Notifications pushed by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum DebuggerEvent {
    /// The debuggee started or stopped running.
    ChangeRunning {
        /// New running state.
        running: bool,
    },
    /// Execution paused.
    Break(BreakEventBody),
    /// An exception was thrown.
    Exception(BreakEventBody),
    /// Any other event, passed through untouched.
    Other {
        /// Event name.
        event: String,
        /// Event body.
        body: Option<serde_json::Value>,
    },
    /// The connection to the debuggee is gone. Sent once, last.
    Disconnected,
}

/// A `backtrace` reply: the frames plus the reference table they point into.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Backtrace {
    /// The reply body.
    pub body: BacktraceBody,
    /// Mirrors referenced by handle from the frames.
    pub refs: Vec<Mirror>,
}

/// Asynchronous request/response and push-notification channel to a
/// V8 debuggee.
#[async_trait]
pub trait DebuggerTransport: Send + Sync + 'static {
    /// Cached running flag, updated from replies and events.
    fn is_running(&self) -> bool;

    /// Subscribe to pushed notifications.
    fn subscribe(&self) -> broadcast::Receiver<DebuggerEvent>;

    /// `scripts`.
    async fn scripts(&self, args: ScriptsArguments) -> Result<Vec<Mirror>, BridgeError>;

    /// `backtrace`.
    async fn backtrace(&self, args: BacktraceArguments) -> Result<Backtrace, BridgeError>;

    /// `lookup`: resolved mirrors by handle.
    async fn lookup(&self, args: LookupArguments) -> Result<HashMap<Handle, Mirror>, BridgeError>;

    /// `setbreakpoint`.
    async fn set_breakpoint(
        &self,
        args: SetBreakpointArguments,
    ) -> Result<SetBreakpointBody, BridgeError>;

    /// `changebreakpoint`.
    async fn change_breakpoint(&self, args: ChangeBreakpointArguments) -> Result<(), BridgeError>;

    /// `clearbreakpoint`.
    async fn clear_breakpoint(&self, args: ClearBreakpointArguments) -> Result<(), BridgeError>;

    /// `listbreakpoints`: everything the debuggee holds, whoever set it.
    async fn list_breakpoints(&self) -> Result<ListBreakpointsBody, BridgeError>;

    /// `continue`, optionally stepping.
    async fn continue_script(&self, args: ContinueArguments) -> Result<(), BridgeError>;

    /// `suspend`.
    async fn suspend(&self) -> Result<(), BridgeError>;
}
