//! V8 debugger protocol message types.
//!
//! Requests carry a command name and optional arguments; the debuggee
//! answers with a response that echoes `request_seq`, or pushes events
//! such as `break`. Value mirrors in replies are deliberately loose: V8
//! omits fields freely depending on the mirror kind, so nearly every field
//! is optional.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Command names understood by the V8 debugger.
pub mod commands {
    /// Enumerate loaded scripts.
    pub const SCRIPTS: &str = "scripts";
    /// Fetch the call stack.
    pub const BACKTRACE: &str = "backtrace";
    /// Resolve value handles.
    pub const LOOKUP: &str = "lookup";
    /// Set a breakpoint.
    pub const SET_BREAKPOINT: &str = "setbreakpoint";
    /// Change an existing breakpoint.
    pub const CHANGE_BREAKPOINT: &str = "changebreakpoint";
    /// Clear a breakpoint.
    pub const CLEAR_BREAKPOINT: &str = "clearbreakpoint";
    /// Enumerate the breakpoints the debuggee holds.
    pub const LIST_BREAKPOINTS: &str = "listbreakpoints";
    /// Resume or step.
    pub const CONTINUE: &str = "continue";
    /// Pause at the next opportunity.
    pub const SUSPEND: &str = "suspend";
}

/// Event names pushed by the V8 debugger.
pub mod events {
    /// Execution stopped (breakpoint, step or suspend).
    pub const BREAK: &str = "break";
    /// An exception was thrown.
    pub const EXCEPTION: &str = "exception";
}

/// Script type bit for normal (user) scripts.
pub const SCRIPT_TYPE_NORMAL: u32 = 4;

// ---------------------------------------------------------------------------
// Base messages
// ---------------------------------------------------------------------------

/// An outgoing request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Sequence number.
    pub seq: i64,
    /// Always "request".
    #[serde(rename = "type")]
    pub message_type: String,
    /// The command to execute.
    pub command: String,
    /// Command arguments (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
}

impl Request {
    /// Build a request with the given sequence number.
    pub fn new(seq: i64, command: impl Into<String>, arguments: Option<serde_json::Value>) -> Self {
        Self {
            seq,
            message_type: "request".into(),
            command: command.into(),
            arguments,
        }
    }
}

/// A response to a previously sent request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Sequence number of this message.
    #[serde(default)]
    pub seq: i64,
    /// Always "response".
    #[serde(rename = "type")]
    pub message_type: String,
    /// Sequence number of the request being answered.
    pub request_seq: i64,
    /// Echo of the command.
    #[serde(default)]
    pub command: String,
    /// Whether the request succeeded.
    pub success: bool,
    /// Failure reason when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Command-specific payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    /// Mirrors referenced by handle from `body`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refs: Vec<Mirror>,
    /// Whether the debuggee is running after the command.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub running: Option<bool>,
}

/// An event pushed by the debuggee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Sequence number.
    #[serde(default)]
    pub seq: i64,
    /// Always "event".
    #[serde(rename = "type")]
    pub message_type: String,
    /// Event name.
    pub event: String,
    /// Event-specific payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

/// A message arriving from the debuggee.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    /// Reply to one of our requests.
    Response(Response),
    /// Unsolicited notification.
    Event(Event),
}

/// Classify a decoded JSON body as a response or an event.
pub fn parse_incoming(value: serde_json::Value) -> Result<IncomingMessage, ProtocolError> {
    let kind = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| ProtocolError::InvalidMessage("missing message type".into()))?
        .to_string();
    match kind.as_str() {
        "response" => Ok(IncomingMessage::Response(serde_json::from_value(value)?)),
        "event" => Ok(IncomingMessage::Event(serde_json::from_value(value)?)),
        other => Err(ProtocolError::InvalidMessage(format!(
            "unexpected message type '{other}'"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// A script identifier. V8 sends numbers; embedders may send strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScriptId {
    /// Numeric id.
    Number(i64),
    /// Textual id.
    Text(String),
}

impl fmt::Display for ScriptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptId::Number(n) => write!(f, "{n}"),
            ScriptId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ScriptId {
    fn from(n: i64) -> Self {
        ScriptId::Number(n)
    }
}

impl From<&str> for ScriptId {
    fn from(s: &str) -> Self {
        ScriptId::Text(s.to_string())
    }
}

/// Name of an object property: a string key or an array index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyName {
    /// Array index.
    Index(i64),
    /// Named key.
    Text(String),
}

impl fmt::Display for PropertyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyName::Index(i) => write!(f, "{i}"),
            PropertyName::Text(s) => f.write_str(s),
        }
    }
}

// ---------------------------------------------------------------------------
// Request arguments
// ---------------------------------------------------------------------------

/// Arguments for `scripts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptsArguments {
    /// Bitmask of `SCRIPT_TYPE_*` values.
    pub types: u32,
    /// Restrict the reply to these ids.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<ScriptId>>,
    /// Include full source text.
    pub include_source: bool,
}

/// Arguments for `backtrace`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktraceArguments {
    /// First frame to return.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_frame: Option<u32>,
    /// One past the last frame to return.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_frame: Option<u32>,
    /// Count frames from the bottom of the stack.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bottom: Option<bool>,
    /// Inline small value data next to handles.
    pub inline_refs: bool,
}

/// Arguments for `lookup`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupArguments {
    /// Handles to resolve.
    pub handles: Vec<i64>,
    /// Include source for function mirrors.
    pub include_source: bool,
}

/// Arguments for `setbreakpoint`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointArguments {
    /// Target kind, `"scriptId"` for script-relative breakpoints.
    #[serde(rename = "type")]
    pub target_type: String,
    /// The script the breakpoint belongs to.
    pub target: ScriptId,
    /// Absolute line (0-based).
    pub line: i64,
    /// Column (0-based).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<i64>,
    /// Whether the breakpoint is active.
    pub enabled: bool,
    /// Condition expression.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Number of hits to skip.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_count: Option<u32>,
}

impl SetBreakpointArguments {
    /// Breakpoint on `line` of the script identified by `target`.
    pub fn script_id(target: ScriptId, line: i64) -> Self {
        Self {
            target_type: "scriptId".into(),
            target,
            line,
            column: None,
            enabled: true,
            condition: None,
            ignore_count: None,
        }
    }
}

/// Arguments for `changebreakpoint`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeBreakpointArguments {
    /// Debuggee-assigned breakpoint number.
    pub breakpoint: i64,
    /// New enabled state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// New condition; an empty string removes it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// New ignore count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_count: Option<u32>,
}

/// Arguments for `clearbreakpoint`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearBreakpointArguments {
    /// Debuggee-assigned breakpoint number.
    pub breakpoint: i64,
}

/// Step granularity for `continue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepAction {
    /// Step into calls.
    In,
    /// Step over calls.
    Next,
    /// Run to the caller.
    Out,
}

/// Arguments for `continue`. Both fields empty means a plain resume.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContinueArguments {
    /// Step kind.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stepaction: Option<StepAction>,
    /// Number of steps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stepcount: Option<u32>,
}

impl ContinueArguments {
    /// A single step of the given kind.
    pub fn step(action: StepAction) -> Self {
        Self {
            stepaction: Some(action),
            stepcount: Some(1),
        }
    }
}

// ---------------------------------------------------------------------------
// Reply bodies
// ---------------------------------------------------------------------------

/// A mirror of a debuggee value, script or function.
///
/// With inline refs a value appears as `{ref, type, className, value, ...}`;
/// full mirrors in `refs` or `lookup` replies carry `handle` instead.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mirror {
    /// Value kind: `undefined`, `null`, `boolean`, `number`, `string`,
    /// `object`, `function`, `script`, ...
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Handle of a full mirror.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<i64>,
    /// Handle referenced by an inline mirror.
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<i64>,
    /// Constructor name of objects.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    /// Primitive payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// Function or script name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Name V8 inferred for anonymous functions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inferred_name: Option<String>,
    /// Script id (script mirrors only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<ScriptId>,
    /// First line of the script within its resource.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_offset: Option<i64>,
    /// First column of the script within its resource.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_offset: Option<i64>,
    /// Number of lines in the script.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_count: Option<i64>,
    /// Source text, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Short description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Object properties (lookup replies).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<PropertyMirror>,
}

impl Mirror {
    /// The handle identifying this mirror, whether inline or full.
    pub fn handle_or_ref(&self) -> Option<i64> {
        self.reference.or(self.handle)
    }
}

/// One property of an object mirror.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyMirror {
    /// Property key.
    pub name: PropertyName,
    /// Handle of the property value.
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<i64>,
    /// Property attribute bits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<i64>,
    /// Property type code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_type: Option<i64>,
}

/// A named argument or local in a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedValue {
    /// Name; absent for rest/anonymous argument slots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// The value mirror.
    #[serde(default)]
    pub value: Mirror,
}

/// A stack frame in a `backtrace` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameMirror {
    /// Frame index, 0 being the top.
    pub index: i64,
    /// The `this` value.
    #[serde(default)]
    pub receiver: Mirror,
    /// The executing function.
    #[serde(default)]
    pub func: Mirror,
    /// Reference to the owning script.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<Mirror>,
    /// Arguments in declaration order.
    #[serde(default)]
    pub arguments: Vec<NamedValue>,
    /// Locals in declaration order.
    #[serde(default)]
    pub locals: Vec<NamedValue>,
    /// Current line (0-based).
    #[serde(default)]
    pub line: i64,
    /// Current column (0-based).
    #[serde(default)]
    pub column: i64,
    /// V8's own frame description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Body of a `backtrace` reply.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktraceBody {
    /// First frame returned.
    #[serde(default)]
    pub from_frame: i64,
    /// One past the last frame returned.
    #[serde(default)]
    pub to_frame: i64,
    /// Total stack depth.
    #[serde(default)]
    pub total_frames: i64,
    /// Frames, top first.
    #[serde(default)]
    pub frames: Vec<FrameMirror>,
}

/// Body of a `setbreakpoint` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetBreakpointBody {
    /// Target kind echoed back.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub target_type: Option<String>,
    /// Debuggee-assigned breakpoint number.
    pub breakpoint: i64,
    /// Resolved line, if the debuggee moved the breakpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
    /// Resolved column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<i64>,
}

/// One entry of a `listbreakpoints` reply.
///
/// V8 mixes `snake_case` and `camelCase` field names here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptBreakpoint {
    /// Debuggee-assigned breakpoint number.
    pub number: i64,
    /// Target kind: `scriptId`, `scriptName` or `function`.
    #[serde(rename = "type")]
    pub target_type: String,
    /// Script id, for `scriptId` breakpoints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_id: Option<ScriptId>,
    /// Script name, for `scriptName` breakpoints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_name: Option<String>,
    /// Absolute, zero-based line.
    #[serde(default)]
    pub line: i64,
    /// Zero-based column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<i64>,
    /// Condition, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Hits to skip before pausing.
    #[serde(rename = "ignoreCount", default)]
    pub ignore_count: u32,
    /// Whether the breakpoint is enabled.
    #[serde(default = "enabled_by_default")]
    pub active: bool,
}

fn enabled_by_default() -> bool {
    true
}

/// Body of a `listbreakpoints` reply.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListBreakpointsBody {
    /// Breakpoints currently set in the debuggee.
    #[serde(default)]
    pub breakpoints: Vec<ScriptBreakpoint>,
    /// Whether the debuggee pauses on every exception.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub break_on_exceptions: Option<bool>,
    /// Whether the debuggee pauses on uncaught exceptions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub break_on_uncaught_exceptions: Option<bool>,
}

/// Body of a `break` or `exception` event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakEventBody {
    /// Description of the current invocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocation_text: Option<String>,
    /// Line where execution stopped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_line: Option<i64>,
    /// Column where execution stopped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_column: Option<i64>,
    /// Text of the stopped line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_line_text: Option<String>,
    /// Script where execution stopped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<Mirror>,
    /// Breakpoints that were hit.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub breakpoints: Vec<i64>,
}
