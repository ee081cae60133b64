//! The presentation side of the bridge.

use serde::Serialize;

use crate::error::BridgeError;
use crate::record::{BreakpointId, BreakpointRecord, FrameRecord, ScriptRecord, Variable};
use crate::render::{render_breakpoint, render_document, OutputFormat};

/// A bulk-loaded document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Document {
    /// Loaded scripts.
    Sources(Vec<ScriptRecord>),
    /// Call stack at a pause.
    Frames(Vec<FrameRecord>),
    /// Children of an expanded object.
    Items(Vec<Variable>),
}

/// Consumer of bridge output.
pub trait PresentationSink {
    /// Replace the current document of this kind.
    fn load(&mut self, document: Document);

    /// Show a newly acknowledged breakpoint.
    fn append_breakpoint(&mut self, record: BreakpointRecord);

    /// Retract a breakpoint previously appended.
    fn remove_breakpoint(&mut self, id: BreakpointId);
}

/// In-memory sink that keeps the latest document of each kind and the
/// breakpoint list in append order.
#[derive(Debug, Clone, Default)]
pub struct DocumentModel {
    sources: Option<Document>,
    frames: Option<Document>,
    items: Option<Document>,
    breakpoints: Vec<BreakpointRecord>,
}

impl DocumentModel {
    /// Create an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// The last loaded script list.
    pub fn sources(&self) -> &[ScriptRecord] {
        match &self.sources {
            Some(Document::Sources(s)) => s,
            _ => &[],
        }
    }

    /// The last loaded call stack.
    pub fn frames(&self) -> &[FrameRecord] {
        match &self.frames {
            Some(Document::Frames(f)) => f,
            _ => &[],
        }
    }

    /// The last expanded object's items.
    pub fn items(&self) -> &[Variable] {
        match &self.items {
            Some(Document::Items(i)) => i,
            _ => &[],
        }
    }

    /// Displayed breakpoints.
    pub fn breakpoints(&self) -> &[BreakpointRecord] {
        &self.breakpoints
    }

    /// Render every loaded document followed by the breakpoints, one per line.
    pub fn render(&self, format: OutputFormat) -> Result<String, BridgeError> {
        let mut lines = Vec::new();
        for doc in [&self.sources, &self.frames, &self.items].into_iter().flatten() {
            lines.push(render_document(doc, format)?);
        }
        for bp in &self.breakpoints {
            lines.push(render_breakpoint(bp, format)?);
        }
        Ok(lines.join("\n"))
    }
}

impl PresentationSink for DocumentModel {
    fn load(&mut self, document: Document) {
        let slot = match document {
            Document::Sources(_) => &mut self.sources,
            Document::Frames(_) => &mut self.frames,
            Document::Items(_) => &mut self.items,
        };
        *slot = Some(document);
    }

    fn append_breakpoint(&mut self, record: BreakpointRecord) {
        self.breakpoints.push(record);
    }

    fn remove_breakpoint(&mut self, id: BreakpointId) {
        self.breakpoints.retain(|bp| bp.id != id);
    }
}
