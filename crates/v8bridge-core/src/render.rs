//! Serialization of records into XML or JSON documents.
//!
//! XML uses the element vocabulary presentation layers already bind to:
//! `sources`/`file`, `frames`/`frame`/`vars`/`item`, `item` for expanded
//! objects, and `breakpoint`. Attribute values are always escaped.

use std::borrow::Cow;
use std::fmt::Write as _;
use std::str::FromStr;

use crate::error::BridgeError;
use crate::record::{BreakpointRecord, FrameRecord, ScriptRecord, Variable};
use crate::sink::Document;

/// Target serialization format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Escaped XML fragments.
    #[default]
    Xml,
    /// JSON documents.
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xml" => Ok(OutputFormat::Xml),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format '{other}'")),
        }
    }
}

/// Escape text for use inside an XML attribute or element.
pub fn escape_xml(text: &str) -> Cow<'_, str> {
    if !text.contains(&['&', '<', '>', '"', '\''][..]) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Render a whole document.
pub fn render_document(document: &Document, format: OutputFormat) -> Result<String, BridgeError> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string(document)?),
        OutputFormat::Xml => Ok(match document {
            Document::Sources(scripts) => xml_sources(scripts),
            Document::Frames(frames) => xml_frames(frames),
            Document::Items(items) => xml_items(items),
        }),
    }
}

/// Render one breakpoint record.
pub fn render_breakpoint(
    record: &BreakpointRecord,
    format: OutputFormat,
) -> Result<String, BridgeError> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string(record)?),
        OutputFormat::Xml => Ok(xml_breakpoint(record)),
    }
}

fn xml_sources(scripts: &[ScriptRecord]) -> String {
    let mut out = String::from("<sources>");
    for script in scripts {
        let _ = write!(
            out,
            "<file id='{}' name='{}' text='{}' lineoffset='{}' debug='true' />",
            escape_xml(&script.id.to_string()),
            escape_xml(&script.name),
            escape_xml(&script.text),
            script.line_offset,
        );
    }
    out.push_str("</sources>");
    out
}

fn xml_frames(frames: &[FrameRecord]) -> String {
    let mut out = String::from("<frames>");
    for frame in frames {
        let script_id = frame
            .script_id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_default();
        let _ = write!(
            out,
            "<frame index='{}' name='{}' column='{}' line='{}' script='{}' script_id='{}'>",
            frame.index,
            escape_xml(&frame.name),
            frame.column,
            frame.line,
            escape_xml(&frame.script),
            escape_xml(&script_id),
        );
        out.push_str("<vars>");
        for var in &frame.vars {
            out.push_str(&xml_variable(var));
        }
        out.push_str("</vars></frame>");
    }
    out.push_str("</frames>");
    out
}

fn xml_items(items: &[Variable]) -> String {
    let mut out = String::from("<item>");
    for item in items {
        out.push_str(&xml_variable(item));
    }
    out.push_str("</item>");
    out
}

/// `<item name= value= type= ref= [children='true'] />`.
pub fn xml_variable(var: &Variable) -> String {
    let mut out = format!(
        "<item name='{}' value='{}' type='{}'",
        escape_xml(&var.name),
        escape_xml(&var.value.display()),
        escape_xml(var.value.type_name()),
    );
    if let Some(handle) = var.reference {
        let _ = write!(out, " ref='{handle}'");
    }
    if var.has_children() {
        out.push_str(" children='true'");
    }
    out.push_str(" />");
    out
}

fn xml_breakpoint(bp: &BreakpointRecord) -> String {
    format!(
        "<breakpoint id='{}' text='{}' script='{}' scriptid='{}' lineoffset='{}' line='{}' \
condition='{}' ignorecount='{}' enabled='{}' />",
        bp.id,
        escape_xml(&bp.text),
        escape_xml(&bp.script),
        escape_xml(&bp.script_id.to_string()),
        bp.line_offset,
        bp.line,
        escape_xml(&bp.condition),
        bp.ignore_count,
        bp.enabled,
    )
}
