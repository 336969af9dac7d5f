use super::breakpoints::BreakpointSet;
use super::history::{HistoryEntry, HistoryLog, StepStatus};
use super::session::run_to_completion;
use super::snapshot::Snapshot;
use super::stepping::{StepEngine, StepOutcome};
use crate::executor::{LineEvaluator, ScriptEvaluator};

/// Receives the outcome of every step.
pub trait StepObserver {
    fn on_snapshot(&mut self, _snapshot: &Snapshot) {}

    fn on_status(&mut self, _status: StepStatus, _message: Option<&str>) {}

    /// Text printed by the line, delivered before its status.
    fn on_output(&mut self, _text: &str) {}
}

impl StepObserver for () {}

/// Forward one history entry to `observer`.
pub fn notify<O: StepObserver + ?Sized>(observer: &mut O, entry: &HistoryEntry) {
    observer.on_snapshot(&entry.snapshot);
    if let Some(output) = &entry.output {
        observer.on_output(output);
    }
    observer.on_status(entry.status, entry.message.as_deref());
}

/// Prints steps to stderr and script output to stdout.
#[derive(Debug, Clone, Default)]
pub struct ConsoleObserver {
    show_variables: bool,
    line: usize,
    source: String,
}

impl ConsoleObserver {
    pub fn new(show_variables: bool) -> Self {
        Self {
            show_variables,
            ..Self::default()
        }
    }
}

impl StepObserver for ConsoleObserver {
    fn on_snapshot(&mut self, snapshot: &Snapshot) {
        self.line = snapshot.line_index;
        self.source.clone_from(&snapshot.source_line);
        if !self.show_variables || snapshot.variables.is_empty() {
            return;
        }
        eprintln!("\n=== Variables ===");
        for (name, view) in &snapshot.variables {
            eprintln!("  {} ({}) = {}", name, view.type_tag, view.value);
        }
        if snapshot.call_stack.len() > 1 {
            eprintln!("=== Call Stack ({} frames) ===", snapshot.call_stack.len());
            for frame in snapshot.call_stack.iter().rev() {
                eprintln!("  {frame}");
            }
        }
        eprintln!();
    }

    fn on_status(&mut self, status: StepStatus, message: Option<&str>) {
        let line = self.line + 1;
        match status {
            StepStatus::Executed => eprintln!("⏭️  [{line}] {}", self.source),
            StepStatus::BreakpointHit => eprintln!("🔴 Breakpoint at line {line}: {}", self.source),
            StepStatus::Errored => {
                eprintln!("❌ Line {line}: {}", message.unwrap_or("execution failed"))
            }
            StepStatus::Done => eprintln!("✅ Script finished"),
        }
    }

    fn on_output(&mut self, text: &str) {
        print!("{text}");
    }
}

/// The inbound interface of the engine: a submitted script, its breakpoints
/// and the current session.
pub struct DebugContext<E: LineEvaluator + Clone = ScriptEvaluator> {
    evaluator: E,
    script: String,
    breakpoints: BreakpointSet,
    engine: Option<StepEngine<E>>,
}

impl Default for DebugContext<ScriptEvaluator> {
    fn default() -> Self {
        Self::new(ScriptEvaluator::default())
    }
}

impl<E: LineEvaluator + Clone> DebugContext<E> {
    pub fn new(evaluator: E) -> Self {
        Self {
            evaluator,
            script: String::new(),
            breakpoints: BreakpointSet::new(),
            engine: None,
        }
    }

    /// Replace the script. Any session on the previous script is dropped;
    /// breakpoints are kept.
    pub fn submit_script(&mut self, text: impl Into<String>) {
        self.script = text.into();
        self.engine = None;
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    pub fn toggle_breakpoint(&mut self, line_index: usize) -> bool {
        self.breakpoints.toggle(line_index)
    }

    pub fn breakpoints(&self) -> &BreakpointSet {
        &self.breakpoints
    }

    pub fn breakpoints_mut(&mut self) -> &mut BreakpointSet {
        &mut self.breakpoints
    }

    /// Begin a new session on the submitted script.
    pub fn start_session(&mut self) {
        let mut engine = StepEngine::new(&self.script, self.evaluator.clone());
        engine.start();
        self.engine = Some(engine);
    }

    pub fn request_step<O: StepObserver + ?Sized>(&mut self, observer: &mut O) -> StepOutcome {
        let Some(engine) = self.engine.as_mut() else {
            tracing::debug!("step requested before any session");
            return StepOutcome::Inactive;
        };
        let outcome = engine.step(&self.breakpoints);
        if let StepOutcome::Stepped(entry) = &outcome {
            notify(observer, entry);
        }
        outcome
    }

    /// Start a new session and run it to the end, ignoring breakpoints.
    pub fn request_run_to_completion<O: StepObserver + ?Sized>(
        &mut self,
        observer: &mut O,
    ) -> Option<HistoryEntry> {
        self.start_session();
        let engine = self.engine.as_mut()?;
        run_to_completion(engine, |entry| notify(&mut *observer, entry))
    }

    /// History of the current or most recent session.
    pub fn history(&self) -> Option<&HistoryLog> {
        self.engine.as_ref().map(StepEngine::history)
    }

    pub fn engine(&self) -> Option<&StepEngine<E>> {
        self.engine.as_ref()
    }

    /// The engine and breakpoints together, for handing to a
    /// [`SessionDriver`](super::SessionDriver).
    pub fn session_parts(&mut self) -> Option<(&mut StepEngine<E>, &mut BreakpointSet)> {
        let engine = self.engine.as_mut()?;
        Some((engine, &mut self.breakpoints))
    }
}
