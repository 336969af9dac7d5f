//! A stepping execution engine for line-oriented scripts.
//!
//! A script is split into lines, each line is evaluated against a single
//! shared environment, and every step (executed line, breakpoint pause,
//! fault or completion) is recorded in an append-only history together with
//! a snapshot of the visible variables and call stack.

pub mod config;
pub mod debugger;
pub mod error;
pub mod executor;
pub mod fault;
pub mod parser;

pub use config::DriverConfig;
pub use debugger::{
    BreakpointSet, ConsoleObserver, DebugContext, EngineState, ExecutionCursor, FrameDescriptor,
    HistoryEntry, HistoryLog, SessionDriver, SessionEnd, SessionPoll, Snapshot, StepEngine,
    StepObserver, StepOutcome, StepStatus, VariableView,
};
pub use error::{Error, Result};
pub use executor::{LineEvaluator, ScriptEvaluator};
pub use fault::{ExecutionFault, FaultKind};
pub use parser::{lines_of, LineStore};
