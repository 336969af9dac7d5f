use std::fmt;

use serde::{Deserialize, Serialize};

use crate::debugger::FrameDescriptor;

/// Category of a fault raised by an evaluated line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaultKind {
    SyntaxError,
    IndentationError,
    NameError,
    TypeError,
    ValueError,
    IndexError,
    ZeroDivisionError,
    OverflowError,
    AssertionError,
    RecursionError,
}

impl FaultKind {
    pub fn name(self) -> &'static str {
        match self {
            FaultKind::SyntaxError => "SyntaxError",
            FaultKind::IndentationError => "IndentationError",
            FaultKind::NameError => "NameError",
            FaultKind::TypeError => "TypeError",
            FaultKind::ValueError => "ValueError",
            FaultKind::IndexError => "IndexError",
            FaultKind::ZeroDivisionError => "ZeroDivisionError",
            FaultKind::OverflowError => "OverflowError",
            FaultKind::AssertionError => "AssertionError",
            FaultKind::RecursionError => "RecursionError",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A runtime fault raised by the script itself.
///
/// `frames` holds the call stack at the point the fault was raised, outermost
/// first. It is filled in by the evaluator as the fault unwinds, so a fault
/// constructed with [`ExecutionFault::new`] starts out with no frames.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ExecutionFault {
    pub kind: FaultKind,
    pub message: String,
    pub frames: Vec<FrameDescriptor>,
}

impl ExecutionFault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            frames: Vec::new(),
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(FaultKind::SyntaxError, message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(FaultKind::TypeError, message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new(FaultKind::ValueError, message)
    }

    pub fn zero_division(message: impl Into<String>) -> Self {
        Self::new(FaultKind::ZeroDivisionError, message)
    }

    pub fn overflow() -> Self {
        Self::new(FaultKind::OverflowError, "integer overflow")
    }

    /// Record the stack the fault was raised in, unless an inner frame
    /// already did.
    pub fn with_frames(mut self, frames: impl FnOnce() -> Vec<FrameDescriptor>) -> Self {
        if self.frames.is_empty() {
            self.frames = frames();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_kind_and_message() {
        let fault = ExecutionFault::zero_division("division by zero");
        assert_eq!(fault.to_string(), "ZeroDivisionError: division by zero");
    }

    #[test]
    fn innermost_frames_win() {
        let inner = vec![FrameDescriptor::new("f", 3)];
        let fault = ExecutionFault::type_error("bad")
            .with_frames(|| inner.clone())
            .with_frames(|| vec![FrameDescriptor::module(7)]);
        assert_eq!(fault.frames, inner);
    }
}
