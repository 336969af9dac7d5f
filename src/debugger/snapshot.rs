use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pseudo file name used when rendering frame descriptors.
pub const SCRIPT_SOURCE: &str = "<script>";

/// Name of the outermost frame, the script body itself.
pub const MODULE_FRAME: &str = "<module>";

/// How a bound variable is displayed: its type tag and its printed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableView {
    pub type_tag: String,
    pub value: String,
}

impl VariableView {
    pub fn new(type_tag: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            type_tag: type_tag.into(),
            value: value.into(),
        }
    }
}

/// One entry of a captured call stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDescriptor {
    pub function: String,
    /// 0-based index of the line the frame is executing.
    pub line: usize,
}

impl FrameDescriptor {
    pub fn new(function: impl Into<String>, line: usize) -> Self {
        Self {
            function: function.into(),
            line,
        }
    }

    pub fn module(line: usize) -> Self {
        Self::new(MODULE_FRAME, line)
    }
}

impl fmt::Display for FrameDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCRIPT_SOURCE}:{}:{}", self.function, self.line + 1)
    }
}

/// State captured at a step boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub line_index: usize,
    /// Text of the line at `line_index`; empty once the script has run off
    /// its end.
    #[serde(rename = "source")]
    pub source_line: String,
    pub variables: BTreeMap<String, VariableView>,
    /// Outermost frame first.
    pub call_stack: Vec<FrameDescriptor>,
    pub timestamp: DateTime<Utc>,
}
