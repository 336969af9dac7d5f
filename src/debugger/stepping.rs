use std::fmt;

use chrono::Utc;

use super::breakpoints::BreakpointSet;
use super::history::{HistoryEntry, HistoryLog, StepStatus};
use super::snapshot::{FrameDescriptor, Snapshot};
use crate::executor::{LineEvaluator, ScriptEvaluator};
use crate::parser::LineStore;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
    /// Stopped before the cursor line because it carries a breakpoint. The
    /// next step checks the breakpoint again.
    Paused,
    Done,
    Errored,
}

impl EngineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, EngineState::Done | EngineState::Errored)
    }
}

/// Position of the next line to execute.
///
/// While active the line only moves forward, one line at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionCursor {
    line: usize,
    active: bool,
    last_error: Option<String>,
}

impl ExecutionCursor {
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn activate(&mut self) {
        *self = Self {
            line: 0,
            active: true,
            last_error: None,
        };
    }

    fn advance(&mut self) {
        debug_assert!(self.active, "advancing an inactive cursor");
        self.line += 1;
    }

    fn finish(&mut self) {
        self.active = false;
    }

    fn fail(&mut self, message: String) {
        self.active = false;
        self.last_error = Some(message);
    }
}

/// Result of asking the engine for a step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// A step was taken; the entry is also in the history.
    Stepped(HistoryEntry),
    /// No session is active: the engine is idle or already terminated.
    Inactive,
}

impl StepOutcome {
    pub fn entry(&self) -> Option<&HistoryEntry> {
        match self {
            StepOutcome::Stepped(entry) => Some(entry),
            StepOutcome::Inactive => None,
        }
    }

    pub fn status(&self) -> Option<StepStatus> {
        self.entry().map(|entry| entry.status)
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Stepped(entry) => {
                write!(f, "{} at line {}", entry.status, entry.line_index() + 1)
            }
            StepOutcome::Inactive => f.write_str("no session active"),
        }
    }
}

/// Executes a script one line per step against a single environment.
pub struct StepEngine<E: LineEvaluator = ScriptEvaluator> {
    lines: LineStore,
    evaluator: E,
    env: E::Env,
    cursor: ExecutionCursor,
    state: EngineState,
    history: HistoryLog,
}

impl<E: LineEvaluator> StepEngine<E> {
    pub fn new(script: &str, evaluator: E) -> Self {
        Self {
            lines: LineStore::new(script),
            evaluator,
            env: E::Env::default(),
            cursor: ExecutionCursor::default(),
            state: EngineState::Idle,
            history: HistoryLog::new(),
        }
    }

    /// Begin a session at line 0. Any previous environment, history and
    /// error are discarded.
    pub fn start(&mut self) {
        self.env = E::Env::default();
        self.history = HistoryLog::new();
        self.cursor.activate();
        self.state = EngineState::Running;
        tracing::info!(lines = self.lines.len(), "session started");
    }

    /// Abandon the session. History is kept for inspection; further steps
    /// report [`StepOutcome::Inactive`] until the next [`StepEngine::start`].
    pub fn tear_down(&mut self) {
        if self.cursor.is_active() {
            tracing::info!(line = self.cursor.line(), "session torn down");
        }
        self.cursor.finish();
        self.state = EngineState::Idle;
    }

    /// Take one step.
    ///
    /// Breakpoints are read once, before the cursor line runs: a breakpoint
    /// on the cursor line pauses without advancing, so the same line is the
    /// candidate again on the next call.
    pub fn step(&mut self, breakpoints: &BreakpointSet) -> StepOutcome {
        if !matches!(self.state, EngineState::Running | EngineState::Paused) {
            tracing::debug!(state = ?self.state, "step requested with no session active");
            return StepOutcome::Inactive;
        }

        let line = self.cursor.line();
        let Some(source) = self.lines.get(line).map(str::to_owned) else {
            self.state = EngineState::Done;
            self.cursor.finish();
            tracing::info!(steps = self.history.len() + 1, "session done");
            let call_stack = self.evaluator.call_stack(&self.env, line);
            return self.record(line, String::new(), call_stack, StepStatus::Done, None, None);
        };

        if breakpoints.contains(line) {
            self.state = EngineState::Paused;
            tracing::debug!(line, "breakpoint hit");
            let call_stack = self.evaluator.call_stack(&self.env, line);
            return self.record(line, source, call_stack, StepStatus::BreakpointHit, None, None);
        }

        let mut output = String::new();
        let result = self
            .evaluator
            .execute(&source, line, &mut self.env, &mut output);
        let output = (!output.is_empty()).then_some(output);

        match result {
            Ok(()) => {
                self.state = EngineState::Running;
                self.cursor.advance();
                tracing::debug!(line, source = %source, "executed line");
                let call_stack = self.evaluator.call_stack(&self.env, line);
                self.record(line, source, call_stack, StepStatus::Executed, output, None)
            }
            Err(fault) => {
                let message = fault.to_string();
                tracing::warn!(line, %message, "line raised a fault");
                self.state = EngineState::Errored;
                self.cursor.fail(message.clone());
                let call_stack = if fault.frames.is_empty() {
                    self.evaluator.call_stack(&self.env, line)
                } else {
                    fault.frames
                };
                self.record(
                    line,
                    source,
                    call_stack,
                    StepStatus::Errored,
                    output,
                    Some(message),
                )
            }
        }
    }

    fn record(
        &mut self,
        line: usize,
        source_line: String,
        call_stack: Vec<FrameDescriptor>,
        status: StepStatus,
        output: Option<String>,
        message: Option<String>,
    ) -> StepOutcome {
        let entry = HistoryEntry {
            snapshot: Snapshot {
                line_index: line,
                source_line,
                variables: self.evaluator.variables(&self.env),
                call_stack,
                timestamp: Utc::now(),
            },
            status,
            output,
            message,
        };
        StepOutcome::Stepped(self.history.append(entry).clone())
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn cursor(&self) -> &ExecutionCursor {
        &self.cursor
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn lines(&self) -> &LineStore {
        &self.lines
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    pub fn environment(&self) -> &E::Env {
        &self.env
    }
}
