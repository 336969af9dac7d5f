use std::collections::{BTreeMap, HashMap};

use super::value::Value;
use crate::debugger::FrameDescriptor;

/// An active user function call.
#[derive(Debug)]
pub struct Frame {
    pub function: String,
    pub line: usize,
    locals: HashMap<String, Value>,
}

impl Frame {
    pub fn new(function: impl Into<String>, line: usize, locals: HashMap<String, Value>) -> Self {
        Self {
            function: function.into(),
            line,
            locals,
        }
    }
}

/// The evaluation environment shared by every line of a session.
///
/// Module level bindings persist across steps; each function call gets its
/// own frame of locals that is discarded when the call returns.
#[derive(Debug, Default)]
pub struct Environment {
    globals: BTreeMap<String, Value>,
    frames: Vec<Frame>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a name: innermost frame first, then module bindings.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.frames
            .last()
            .and_then(|frame| frame.locals.get(name))
            .or_else(|| self.globals.get(name))
            .cloned()
    }

    /// Bind in the innermost scope.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        match self.frames.last_mut() {
            Some(frame) => frame.locals.insert(name.into(), value),
            None => self.globals.insert(name.into(), value),
        };
    }

    pub fn unbind(&mut self, name: &str) -> Option<Value> {
        match self.frames.last_mut() {
            Some(frame) => frame.locals.remove(name),
            None => self.globals.remove(name),
        }
    }

    pub fn globals(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.globals.iter()
    }

    /// Number of active function calls.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn push_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub(crate) fn pop_frame(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    /// The call stack, outermost first, with the module frame at
    /// `module_line`.
    pub fn call_stack(&self, module_line: usize) -> Vec<FrameDescriptor> {
        std::iter::once(FrameDescriptor::module(module_line))
            .chain(
                self.frames
                    .iter()
                    .map(|frame| FrameDescriptor::new(frame.function.clone(), frame.line)),
            )
            .collect()
    }
}
