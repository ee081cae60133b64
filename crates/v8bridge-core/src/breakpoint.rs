//! Breakpoint bookkeeping for a bridge session.
//!
//! Breakpoints are keyed by `scriptId|absoluteLine`, so a location holds at
//! most one breakpoint. Entries are only inserted once the debuggee has
//! acknowledged them and carry the debuggee-assigned id.

use std::collections::HashMap;
use std::fmt;

use v8bridge_protocol::{
    ChangeBreakpointArguments, ScriptBreakpoint, ScriptId, SetBreakpointArguments,
};

use crate::record::{BreakpointId, BreakpointRecord, ScriptRecord};

/// Location key: `scriptId|absoluteLine`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BreakpointKey(String);

impl BreakpointKey {
    /// Key for `line` (absolute) in `script_id`.
    pub fn new(script_id: &ScriptId, line: i64) -> Self {
        Self(format!("{script_id}|{line}"))
    }

    /// The key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BreakpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a breakpoint goes, before the debuggee has assigned it an id.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakpointLocation {
    /// Script id.
    pub script_id: ScriptId,
    /// Script name, for display.
    pub script_name: String,
    /// Script line offset.
    pub line_offset: i64,
    /// Absolute line.
    pub line: i64,
}

impl BreakpointLocation {
    /// Location of `relative_row` within `script`.
    pub fn in_script(script: &ScriptRecord, relative_row: i64) -> Self {
        Self {
            script_id: script.id.clone(),
            script_name: script.name.clone(),
            line_offset: script.line_offset,
            line: script.absolute_line(relative_row),
        }
    }

    /// The table key for this location.
    pub fn key(&self) -> BreakpointKey {
        BreakpointKey::new(&self.script_id, self.line)
    }

    /// `setbreakpoint` arguments for an enabled, unconditional breakpoint.
    pub fn set_arguments(&self) -> SetBreakpointArguments {
        SetBreakpointArguments::script_id(self.script_id.clone(), self.line)
    }
}

/// An acknowledged breakpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Breakpoint {
    /// Debuggee-assigned id.
    pub id: BreakpointId,
    /// Where it is.
    pub location: BreakpointLocation,
    /// Condition expression.
    pub condition: Option<String>,
    /// Hits to skip.
    pub ignore_count: Option<u32>,
    /// Whether it is active.
    pub enabled: bool,
}

impl Breakpoint {
    /// An enabled, unconditional breakpoint.
    pub fn new(id: BreakpointId, location: BreakpointLocation) -> Self {
        Self {
            id,
            location,
            condition: None,
            ignore_count: None,
            enabled: true,
        }
    }

    /// A breakpoint the debuggee already held, as reported by
    /// `listbreakpoints`, placed in `script`.
    pub fn adopted(listed: &ScriptBreakpoint, script: &ScriptRecord) -> Self {
        Self {
            id: listed.number,
            location: BreakpointLocation {
                script_id: script.id.clone(),
                script_name: script.name.clone(),
                line_offset: script.line_offset,
                line: listed.line,
            },
            condition: listed.condition.clone().filter(|c| !c.is_empty()),
            ignore_count: (listed.ignore_count > 0).then_some(listed.ignore_count),
            enabled: listed.active,
        }
    }

    /// The table key.
    pub fn key(&self) -> BreakpointKey {
        self.location.key()
    }

    /// Display record for the presentation layer.
    pub fn to_record(&self) -> BreakpointRecord {
        BreakpointRecord {
            id: self.id,
            text: format!("{}:{}", self.location.script_name, self.location.line),
            script: self.location.script_name.clone(),
            script_id: self.location.script_id.clone(),
            line_offset: self.location.line_offset,
            line: self.location.line,
            condition: self.condition.clone().unwrap_or_default(),
            ignore_count: self.ignore_count.unwrap_or(0),
            enabled: self.enabled,
        }
    }

    /// `changebreakpoint` arguments reflecting this breakpoint's settings.
    pub fn change_arguments(&self) -> ChangeBreakpointArguments {
        ChangeBreakpointArguments {
            breakpoint: self.id,
            enabled: Some(self.enabled),
            condition: Some(self.condition.clone().unwrap_or_default()),
            ignore_count: Some(self.ignore_count.unwrap_or(0)),
        }
    }
}

/// The session's breakpoints by location.
#[derive(Debug, Clone, Default)]
pub struct BreakpointTable {
    breakpoints: HashMap<BreakpointKey, Breakpoint>,
}

impl BreakpointTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a breakpoint, returning any previous one at the same location.
    pub fn insert(&mut self, bp: Breakpoint) -> Option<Breakpoint> {
        self.breakpoints.insert(bp.key(), bp)
    }

    /// Breakpoint at a location.
    pub fn get(&self, key: &BreakpointKey) -> Option<&Breakpoint> {
        self.breakpoints.get(key)
    }

    /// Breakpoint with a debuggee id.
    pub fn get_by_id(&self, id: BreakpointId) -> Option<&Breakpoint> {
        self.breakpoints.values().find(|bp| bp.id == id)
    }

    /// Whether a location has a breakpoint.
    pub fn contains(&self, key: &BreakpointKey) -> bool {
        self.breakpoints.contains_key(key)
    }

    /// Remove the breakpoint at a location.
    pub fn remove(&mut self, key: &BreakpointKey) -> Option<Breakpoint> {
        self.breakpoints.remove(key)
    }

    /// Number of breakpoints.
    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }

    /// All breakpoints ordered by id.
    pub fn all(&self) -> Vec<&Breakpoint> {
        let mut all: Vec<&Breakpoint> = self.breakpoints.values().collect();
        all.sort_by_key(|bp| bp.id);
        all
    }
}
