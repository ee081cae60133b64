//! The debugger bridge.
//!
//! [`DebuggerBridge`] turns presentation-layer calls into V8 debugger
//! requests and maps the replies onto records. It owns the session's
//! breakpoint table and only changes it after the debuggee acknowledged
//! the corresponding request. Operations that need the breakpoint table
//! take `&mut self`, so two toggles can never interleave on one bridge.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use v8bridge_protocol::{
    BacktraceArguments, ClearBreakpointArguments, ContinueArguments, LookupArguments, Mirror,
    ScriptBreakpoint, ScriptId, ScriptsArguments, StepAction, SCRIPT_TYPE_NORMAL,
};

use crate::breakpoint::{Breakpoint, BreakpointLocation};
use crate::error::BridgeError;
use crate::record::{BreakpointId, BreakpointRecord, FrameRecord, Handle, ScriptRecord, Variable};
use crate::session::Session;
use crate::sink::PresentationSink;
use crate::transport::{DebuggerEvent, DebuggerTransport};

/// Scripts loaded by browser extensions.
pub const EXTENSION_SCHEME: &str = "chrome-extension://";

const EVENT_CAPACITY: usize = 64;

/// Settings supplied by the hosting application.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeOptions {
    /// Scripts whose name starts with any of these are hidden.
    pub excluded_prefixes: Vec<String>,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            excluded_prefixes: vec![EXTENSION_SCHEME.to_string()],
        }
    }
}

/// Outcome of [`DebuggerBridge::toggle_breakpoint`].
#[derive(Debug, Clone, PartialEq)]
pub enum Toggle {
    /// A breakpoint was set and appended to the sink.
    Set(BreakpointRecord),
    /// The breakpoint with this id was cleared and retracted from the sink.
    Cleared(BreakpointId),
}

/// Changes applied by [`DebuggerBridge::update_breakpoint`]. `None` keeps
/// the current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BreakpointUpdate {
    /// New condition; an empty string removes it.
    pub condition: Option<String>,
    /// New ignore count.
    pub ignore_count: Option<u32>,
    /// New enabled state.
    pub enabled: Option<bool>,
}

/// Mediates between a presentation layer and a V8 debuggee.
pub struct DebuggerBridge<T: DebuggerTransport> {
    transport: Arc<T>,
    options: BridgeOptions,
    session: Session,
    events: broadcast::Sender<DebuggerEvent>,
    forwarder: Option<JoinHandle<()>>,
}

impl<T: DebuggerTransport> DebuggerBridge<T> {
    /// Attach to a connected transport.
    ///
    /// Starts forwarding the transport's `changeRunning` and `break`
    /// notifications to [`subscribe`](Self::subscribe) receivers. Must be
    /// called from within a tokio runtime.
    pub fn new(transport: Arc<T>, options: BridgeOptions) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let forwarder = tokio::spawn(forward_events(transport.subscribe(), events.clone()));
        info!("debugger bridge attached");
        Self {
            transport,
            options,
            session: Session::attach(),
            events,
            forwarder: Some(forwarder),
        }
    }

    /// Listen for re-emitted `changeRunning` and `break` notifications.
    /// The last one received is [`DebuggerEvent::Disconnected`] once the
    /// debuggee goes away.
    pub fn subscribe(&self) -> broadcast::Receiver<DebuggerEvent> {
        self.events.subscribe()
    }

    /// The underlying transport.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// The bridge's session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The transport's cached running flag.
    pub fn is_running(&self) -> bool {
        self.transport.is_running()
    }

    /// Breakpoints set through this bridge, ordered by id.
    pub fn breakpoints(&self) -> Vec<BreakpointRecord> {
        self.session
            .breakpoints()
            .all()
            .into_iter()
            .map(Breakpoint::to_record)
            .collect()
    }

    /// All normal scripts, minus those with an excluded name prefix.
    pub async fn list_scripts(&self) -> Result<Vec<ScriptRecord>, BridgeError> {
        self.session.require_attached()?;
        let mirrors = self
            .transport
            .scripts(ScriptsArguments {
                types: SCRIPT_TYPE_NORMAL,
                ids: None,
                include_source: false,
            })
            .await?;

        let scripts: Vec<ScriptRecord> = mirrors
            .iter()
            .filter(|m| !self.is_excluded(m))
            .filter_map(|m| {
                let record = ScriptRecord::from_mirror(m);
                if record.is_none() {
                    warn!(name = ?m.name, "script without id skipped");
                }
                record
            })
            .collect();
        debug!(total = mirrors.len(), shown = scripts.len(), "listed scripts");
        Ok(scripts)
    }

    fn is_excluded(&self, script: &Mirror) -> bool {
        script.name.as_deref().is_some_and(|name| {
            self.options
                .excluded_prefixes
                .iter()
                .any(|prefix| name.starts_with(prefix.as_str()))
        })
    }

    /// The full call stack with each frame's variables.
    pub async fn get_backtrace(&self) -> Result<Vec<FrameRecord>, BridgeError> {
        self.session.require_attached()?;
        let backtrace = self
            .transport
            .backtrace(BacktraceArguments {
                inline_refs: true,
                ..Default::default()
            })
            .await?;
        Ok(backtrace
            .body
            .frames
            .iter()
            .map(|frame| FrameRecord::from_mirror(frame, &backtrace.refs))
            .collect())
    }

    /// Full source text of one script.
    pub async fn load_script_source(&self, script_id: &ScriptId) -> Result<String, BridgeError> {
        self.session.require_attached()?;
        let mirrors = self
            .transport
            .scripts(ScriptsArguments {
                types: SCRIPT_TYPE_NORMAL,
                ids: Some(vec![script_id.clone()]),
                include_source: true,
            })
            .await?;
        let script = mirrors
            .into_iter()
            .next()
            .ok_or_else(|| BridgeError::ScriptNotFound(script_id.clone()))?;
        Ok(script.source.unwrap_or_default())
    }

    /// Properties of the object behind `handle`.
    ///
    /// Resolves the object, then resolves all property values in one
    /// batched lookup. Returns one variable per property.
    pub async fn expand_object(&self, handle: Handle) -> Result<Vec<Variable>, BridgeError> {
        self.session.require_attached()?;
        let mut objects = self
            .transport
            .lookup(LookupArguments {
                handles: vec![handle],
                include_source: false,
            })
            .await?;
        let object = objects
            .remove(&handle)
            .ok_or(BridgeError::UnknownHandle(handle))?;

        let handles: Vec<Handle> = object.properties.iter().filter_map(|p| p.reference).collect();
        let values = if handles.is_empty() {
            HashMap::new()
        } else {
            self.transport
                .lookup(LookupArguments {
                    handles,
                    include_source: false,
                })
                .await?
        };

        Ok(object
            .properties
            .iter()
            .map(|prop| {
                let value = prop
                    .reference
                    .and_then(|r| values.get(&r))
                    .cloned()
                    .unwrap_or_default();
                let mut var = Variable::from_mirror(prop.name.to_string(), &value);
                if var.reference.is_none() {
                    var.reference = prop.reference;
                }
                var
            })
            .collect())
    }

    /// Take over the breakpoints the debuggee already holds in `scripts`.
    ///
    /// A new bridge starts with an empty table, so a breakpoint left by an
    /// earlier session would otherwise be set a second time by
    /// [`toggle_breakpoint`](Self::toggle_breakpoint) instead of cleared.
    /// Adopted breakpoints are appended to the sink. Entries outside
    /// `scripts`, and locations already in the table, are skipped. Returns
    /// the number adopted.
    pub async fn load_breakpoints<S>(
        &mut self,
        scripts: &[ScriptRecord],
        sink: &mut S,
    ) -> Result<usize, BridgeError>
    where
        S: PresentationSink + ?Sized,
    {
        self.session.require_attached()?;
        let listed = self.transport.list_breakpoints().await?;

        let mut adopted = 0;
        for entry in &listed.breakpoints {
            let Some(script) = scripts.iter().find(|s| placed_in(entry, s)) else {
                debug!(id = entry.number, kind = %entry.target_type, "breakpoint outside scripts");
                continue;
            };
            let breakpoint = Breakpoint::adopted(entry, script);
            if self.session.breakpoints().contains(&breakpoint.key()) {
                continue;
            }
            let record = breakpoint.to_record();
            self.session.breakpoints_mut().insert(breakpoint);
            sink.append_breakpoint(record);
            adopted += 1;
        }
        debug!(listed = listed.breakpoints.len(), adopted, "loaded debuggee breakpoints");
        Ok(adopted)
    }

    /// Set a breakpoint at `relative_row` of `script`, or clear the one
    /// already there.
    ///
    /// The sink is told to append or retract the display record once the
    /// debuggee has acknowledged the change.
    pub async fn toggle_breakpoint<S>(
        &mut self,
        script: &ScriptRecord,
        relative_row: i64,
        sink: &mut S,
    ) -> Result<Toggle, BridgeError>
    where
        S: PresentationSink + ?Sized,
    {
        self.session.require_attached()?;
        let location = BreakpointLocation::in_script(script, relative_row);
        let key = location.key();

        if let Some(existing) = self.session.breakpoints().get(&key) {
            let id = existing.id;
            self.transport
                .clear_breakpoint(ClearBreakpointArguments { breakpoint: id })
                .await?;
            self.session.breakpoints_mut().remove(&key);
            sink.remove_breakpoint(id);
            debug!(%key, id, "breakpoint cleared");
            return Ok(Toggle::Cleared(id));
        }

        let reply = self.transport.set_breakpoint(location.set_arguments()).await?;
        let breakpoint = Breakpoint::new(reply.breakpoint, location);
        let record = breakpoint.to_record();
        self.session.breakpoints_mut().insert(breakpoint);
        sink.append_breakpoint(record.clone());
        debug!(%key, id = record.id, "breakpoint set");
        Ok(Toggle::Set(record))
    }

    /// Change the condition, ignore count or enabled state of a breakpoint.
    ///
    /// The sink's display record is replaced after acknowledgment.
    pub async fn update_breakpoint<S>(
        &mut self,
        id: BreakpointId,
        update: BreakpointUpdate,
        sink: &mut S,
    ) -> Result<BreakpointRecord, BridgeError>
    where
        S: PresentationSink + ?Sized,
    {
        self.session.require_attached()?;
        let mut changed = self
            .session
            .breakpoints()
            .get_by_id(id)
            .cloned()
            .ok_or(BridgeError::UnknownBreakpoint(id))?;

        if let Some(condition) = update.condition {
            changed.condition = (!condition.is_empty()).then_some(condition);
        }
        if let Some(ignore_count) = update.ignore_count {
            changed.ignore_count = (ignore_count > 0).then_some(ignore_count);
        }
        if let Some(enabled) = update.enabled {
            changed.enabled = enabled;
        }

        self.transport
            .change_breakpoint(changed.change_arguments())
            .await?;

        let record = changed.to_record();
        self.session.breakpoints_mut().insert(changed);
        sink.remove_breakpoint(id);
        sink.append_breakpoint(record.clone());
        Ok(record)
    }

    /// Resume execution.
    pub async fn resume(&self) -> Result<(), BridgeError> {
        self.session.require_attached()?;
        self.transport
            .continue_script(ContinueArguments::default())
            .await
    }

    /// Step into the next call.
    pub async fn step_into(&self) -> Result<(), BridgeError> {
        self.step(StepAction::In).await
    }

    /// Step over the next call.
    pub async fn step_over(&self) -> Result<(), BridgeError> {
        self.step(StepAction::Next).await
    }

    /// Run until the current function returns.
    pub async fn step_out(&self) -> Result<(), BridgeError> {
        self.step(StepAction::Out).await
    }

    async fn step(&self, action: StepAction) -> Result<(), BridgeError> {
        self.session.require_attached()?;
        self.transport
            .continue_script(ContinueArguments::step(action))
            .await
    }

    /// Pause execution at the next opportunity.
    pub async fn suspend(&self) -> Result<(), BridgeError> {
        self.session.require_attached()?;
        self.transport.suspend().await
    }

    /// Clear every breakpoint this session set, stop forwarding
    /// notifications and end the session.
    ///
    /// Clearing is best effort; breakpoints the debuggee refuses to clear
    /// are still retracted from the sink.
    pub async fn detach<S>(&mut self, sink: &mut S) -> Result<(), BridgeError>
    where
        S: PresentationSink + ?Sized,
    {
        self.session.require_attached()?;
        let ids: Vec<BreakpointId> = self
            .session
            .breakpoints()
            .all()
            .iter()
            .map(|bp| bp.id)
            .collect();
        for id in ids {
            if let Err(e) = self
                .transport
                .clear_breakpoint(ClearBreakpointArguments { breakpoint: id })
                .await
            {
                warn!(id, error = %e, "failed to clear breakpoint on detach");
            }
            sink.remove_breakpoint(id);
        }
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
        self.session.detach()?;
        info!("debugger bridge detached");
        Ok(())
    }
}

impl<T: DebuggerTransport> Drop for DebuggerBridge<T> {
    fn drop(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}

/// Whether a listed breakpoint belongs to `script`.
fn placed_in(entry: &ScriptBreakpoint, script: &ScriptRecord) -> bool {
    match (&entry.script_id, &entry.script_name) {
        (Some(id), _) => id.to_string() == script.id.to_string(),
        (None, Some(name)) => *name == script.name,
        (None, None) => false,
    }
}

/// Re-emit running-state and pause notifications unchanged, then the
/// disconnect that ends the stream.
async fn forward_events(
    mut from: broadcast::Receiver<DebuggerEvent>,
    to: broadcast::Sender<DebuggerEvent>,
) {
    loop {
        match from.recv().await {
            Ok(event @ (DebuggerEvent::ChangeRunning { .. } | DebuggerEvent::Break(_))) => {
                let _ = to.send(event);
            }
            Ok(DebuggerEvent::Disconnected) => {
                info!("debuggee disconnected");
                let _ = to.send(DebuggerEvent::Disconnected);
                break;
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "bridge fell behind transport notifications");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
