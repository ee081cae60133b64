//! Presentation records built from V8 mirrors.
//!
//! Every record is plain data. Formatting into XML or JSON happens in
//! [`crate::render`], never here.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use v8bridge_protocol::{FrameMirror, Mirror, ScriptId};

/// Handle of a debuggee value.
pub type Handle = i64;

/// Debuggee-assigned breakpoint number.
pub type BreakpointId = i64;

/// Name shown for scripts without a name or description.
pub const ANONYMOUS: &str = "anonymous";

/// Stands in for a missing payload field, as JavaScript string
/// concatenation would print it.
const UNDEFINED: &str = "undefined";

/// Synthetic local V8 adds to every frame; never shown.
pub const ARGUMENTS_PSEUDO_LOCAL: &str = ".arguments";

/// A debuggee value, tagged by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `undefined`.
    Undefined,
    /// `null`.
    Null,
    /// A boolean primitive. `None` when the mirror carried no value.
    Boolean(Option<bool>),
    /// A number, kept as the debuggee rendered it.
    Number(String),
    /// A string primitive.
    String(String),
    /// An object of the given class.
    Object {
        /// Constructor name.
        class_name: String,
    },
    /// A function.
    Function {
        /// Name V8 inferred for it.
        inferred_name: String,
    },
    /// Any other kind, carrying the raw type tag.
    Other(String),
}

impl Value {
    /// Interpret a mirror's type tag and payload.
    pub fn from_mirror(mirror: &Mirror) -> Self {
        match mirror.kind.as_str() {
            "undefined" => Value::Undefined,
            "null" => Value::Null,
            "boolean" => Value::Boolean(mirror.value.as_ref().and_then(|v| v.as_bool())),
            "number" => Value::Number(literal(mirror.value.as_ref())),
            "string" => Value::String(literal(mirror.value.as_ref())),
            "object" => Value::Object {
                class_name: mirror
                    .class_name
                    .clone()
                    .unwrap_or_else(|| UNDEFINED.to_string()),
            },
            "function" => Value::Function {
                inferred_name: mirror
                    .inferred_name
                    .clone()
                    .unwrap_or_else(|| UNDEFINED.to_string()),
            },
            other => Value::Other(other.to_string()),
        }
    }

    /// The protocol type tag.
    pub fn type_name(&self) -> &str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object { .. } => "object",
            Value::Function { .. } => "function",
            Value::Other(tag) => tag,
        }
    }

    /// Display text: literals verbatim, `[Class]` for objects,
    /// `function name()` for functions, the type tag otherwise. A missing
    /// literal, class or name reads `undefined`.
    pub fn display(&self) -> String {
        match self {
            Value::Boolean(Some(b)) => b.to_string(),
            Value::Boolean(None) => UNDEFINED.to_string(),
            Value::Number(text) | Value::String(text) => text.clone(),
            Value::Object { class_name } => format!("[{class_name}]"),
            Value::Function { inferred_name } => format!("function {inferred_name}()"),
            Value::Undefined | Value::Null | Value::Other(_) => self.type_name().to_string(),
        }
    }

    /// Objects and functions can be expanded into their properties.
    pub fn has_children(&self) -> bool {
        matches!(self, Value::Object { .. } | Value::Function { .. })
    }
}

fn literal(value: Option<&serde_json::Value>) -> String {
    match value {
        None => UNDEFINED.to_string(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// A named value in a frame or an expanded object.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Variable or property name.
    pub name: String,
    /// The value.
    pub value: Value,
    /// Handle for lazy expansion.
    pub reference: Option<Handle>,
}

impl Variable {
    /// Build a variable from a value mirror.
    pub fn from_mirror(name: impl Into<String>, mirror: &Mirror) -> Self {
        Self {
            name: name.into(),
            value: Value::from_mirror(mirror),
            reference: mirror.handle_or_ref(),
        }
    }

    /// Whether the presentation layer may expand this variable.
    pub fn has_children(&self) -> bool {
        self.value.has_children()
    }
}

impl Serialize for Variable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Variable", 5)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("value", &self.value.display())?;
        state.serialize_field("type", self.value.type_name())?;
        state.serialize_field("ref", &self.reference)?;
        state.serialize_field("children", &self.has_children())?;
        state.end()
    }
}

/// A loaded script.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptRecord {
    /// Script id.
    pub id: ScriptId,
    /// Script name, `"anonymous"` when absent.
    pub name: String,
    /// Short description, `"anonymous"` when absent.
    pub text: String,
    /// Line offset within the containing resource.
    pub line_offset: i64,
}

impl ScriptRecord {
    /// Build a record from a script mirror. Mirrors without an id are
    /// not addressable and yield `None`.
    pub fn from_mirror(mirror: &Mirror) -> Option<Self> {
        Some(Self {
            id: mirror.id.clone()?,
            name: mirror.name.clone().unwrap_or_else(|| ANONYMOUS.to_string()),
            text: mirror.text.clone().unwrap_or_else(|| ANONYMOUS.to_string()),
            line_offset: mirror.line_offset.unwrap_or(0),
        })
    }

    /// Absolute line for a row relative to this script's offset.
    pub fn absolute_line(&self, relative_row: i64) -> i64 {
        self.line_offset + relative_row
    }
}

/// A stack frame snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameRecord {
    /// Frame index, 0 being the top.
    pub index: i64,
    /// `function(arg, ...)` display name.
    pub name: String,
    /// Current column.
    pub column: i64,
    /// Current line.
    pub line: i64,
    /// Owning script name, empty when unresolved.
    pub script: String,
    /// Owning script id, if resolved.
    pub script_id: Option<ScriptId>,
    /// `this`, then named arguments, then locals.
    pub vars: Vec<Variable>,
}

impl FrameRecord {
    /// Build a frame record, resolving its script through `refs`.
    pub fn from_mirror(frame: &FrameMirror, refs: &[Mirror]) -> Self {
        let script = frame
            .script
            .as_ref()
            .and_then(|s| s.handle_or_ref())
            .and_then(|handle| find_ref(refs, handle))
            .cloned()
            .unwrap_or_else(|| {
                tracing::debug!(frame = frame.index, "frame script not in refs");
                Mirror::default()
            });

        let mut vars = Vec::with_capacity(1 + frame.arguments.len() + frame.locals.len());
        vars.push(Variable::from_mirror("this", &frame.receiver));
        vars.extend(frame.arguments.iter().filter_map(|arg| {
            arg.name
                .as_deref()
                .filter(|n| !n.is_empty())
                .map(|n| Variable::from_mirror(n, &arg.value))
        }));
        vars.extend(frame.locals.iter().filter_map(|local| {
            let name = local.name.as_deref().unwrap_or_default();
            (name != ARGUMENTS_PSEUDO_LOCAL).then(|| Variable::from_mirror(name, &local.value))
        }));

        Self {
            index: frame.index,
            name: frame_display_name(frame),
            column: frame.column,
            line: frame.line,
            script: script.name.unwrap_or_default(),
            script_id: script.id,
            vars,
        }
    }
}

/// Find a mirror in a reply's reference table by handle.
pub fn find_ref(refs: &[Mirror], handle: Handle) -> Option<&Mirror> {
    refs.iter().find(|m| m.handle == Some(handle))
}

/// `name(a, b)` using the explicit function name, falling back to the
/// inferred one. Unnamed argument slots are skipped.
pub fn frame_display_name(frame: &FrameMirror) -> String {
    let func = frame
        .func
        .name
        .as_deref()
        .filter(|n| !n.is_empty())
        .or(frame.func.inferred_name.as_deref())
        .unwrap_or_default();
    let args: Vec<&str> = frame
        .arguments
        .iter()
        .filter_map(|a| a.name.as_deref().filter(|n| !n.is_empty()))
        .collect();
    format!("{func}({})", args.join(", "))
}

/// A breakpoint as shown to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointRecord {
    /// Debuggee-assigned id.
    pub id: BreakpointId,
    /// `script:line` label.
    pub text: String,
    /// Script name.
    pub script: String,
    /// Script id.
    pub script_id: ScriptId,
    /// Script line offset.
    pub line_offset: i64,
    /// Absolute line.
    pub line: i64,
    /// Condition, empty when unconditional.
    pub condition: String,
    /// Hits to skip.
    pub ignore_count: u32,
    /// Whether the breakpoint is active.
    pub enabled: bool,
}
