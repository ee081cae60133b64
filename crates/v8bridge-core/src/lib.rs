//! v8bridge-core: debugger bridge between a V8 debuggee and a presentation layer.
//!
//! The bridge issues V8 debugger requests through a [`DebuggerTransport`],
//! maps the replies onto plain records (scripts, frames, variables,
//! breakpoints) and keeps the session's breakpoint table in step with the
//! debuggee's acknowledgments. Records are serialized separately, as XML or
//! JSON, by [`render`].

pub mod breakpoint;
pub mod bridge;
pub mod client;
pub mod dispatcher;
pub mod error;
pub mod record;
pub mod render;
pub mod session;
pub mod sink;
pub mod transport;

// Re-export key types for convenience.
pub use breakpoint::{Breakpoint, BreakpointKey, BreakpointLocation, BreakpointTable};
pub use bridge::{BreakpointUpdate, BridgeOptions, DebuggerBridge, Toggle};
pub use client::{ClientOptions, V8Client};
pub use error::BridgeError;
pub use record::{
    BreakpointId, BreakpointRecord, FrameRecord, Handle, ScriptRecord, Value, Variable,
};
pub use render::OutputFormat;
pub use session::{Session, SessionState};
pub use sink::{Document, DocumentModel, PresentationSink};
pub use transport::{Backtrace, DebuggerEvent, DebuggerTransport};
