mod breakpoints;
mod context;
mod history;
mod session;
mod snapshot;
mod stepping;

pub use breakpoints::BreakpointSet;
pub use context::{notify, ConsoleObserver, DebugContext, StepObserver};
pub use history::{HistoryEntry, HistoryLog, StepStatus};
pub use session::{
    Clock, EventQueue, ManualClock, SessionDriver, SessionEnd, SessionPoll, SystemClock,
};
pub use snapshot::{FrameDescriptor, Snapshot, VariableView, MODULE_FRAME, SCRIPT_SOURCE};
pub use stepping::{EngineState, ExecutionCursor, StepEngine, StepOutcome};
