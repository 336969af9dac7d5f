use std::ops::ControlFlow;
use std::time::{Duration, Instant};

use super::breakpoints::BreakpointSet;
use super::history::{HistoryEntry, StepStatus};
use super::stepping::{EngineState, StepEngine, StepOutcome};
use crate::config::DriverConfig;
use crate::executor::LineEvaluator;

/// Time source for the driver loop.
pub trait Clock {
    fn now(&self) -> Instant;

    /// Return no earlier than `due`.
    fn idle_until(&mut self, due: Instant);
}

/// Wall clock. Idling blocks the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn idle_until(&mut self, due: Instant) {
        let wait = due.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
    }
}

/// A clock that jumps straight to the due instant and remembers every wait.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Instant,
    idled: Vec<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Instant::now(),
            idled: Vec::new(),
        }
    }

    /// Every non-zero wait, in order.
    pub fn idled(&self) -> &[Duration] {
        &self.idled
    }

    pub fn elapsed(&self) -> Duration {
        self.idled.iter().sum()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now
    }

    fn idle_until(&mut self, due: Instant) {
        if due > self.now {
            self.idled.push(due - self.now);
            self.now = due;
        }
    }
}

/// Single-threaded queue holding at most one deferred task.
#[derive(Debug)]
pub struct EventQueue<T> {
    pending: Option<(Instant, T)>,
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        Self { pending: None }
    }
}

impl<T> EventQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `task` for `due`, replacing anything already pending.
    pub fn schedule(&mut self, due: Instant, task: T) {
        if self.pending.is_some() {
            tracing::warn!("replacing a pending task");
        }
        self.pending = Some((due, task));
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(due, _)| *due)
    }

    /// Take the pending task if it is due at `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<T> {
        match self.pending.take() {
            Some((due, task)) if due <= now => Some(task),
            other => {
                self.pending = other;
                None
            }
        }
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NextStep;

/// How a stepwise session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The engine reached `done` or `errored`.
    Finished(StepStatus),
    /// The observer broke out of the loop; the session was torn down.
    TornDown { at_line: usize },
    /// The engine had already terminated, nothing was stepped.
    Inactive,
}

/// What a single [`SessionDriver::poll`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionPoll {
    /// Nothing ran; the next step is due at this instant.
    Pending(Instant),
    /// One step ran. The next one is already scheduled unless the entry is
    /// terminal.
    Stepped(HistoryEntry),
    /// Nothing is scheduled, or the engine had no session to step.
    Inactive,
}

/// Drives a [`StepEngine`] to a terminal state.
pub struct SessionDriver<C: Clock = SystemClock> {
    config: DriverConfig,
    clock: C,
    queue: EventQueue<NextStep>,
}

impl SessionDriver<SystemClock> {
    pub fn new(config: DriverConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> SessionDriver<C> {
    pub fn with_clock(config: DriverConfig, clock: C) -> Self {
        Self {
            config,
            clock,
            queue: EventQueue::new(),
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Start a fresh session and execute every line without pausing.
    ///
    /// Breakpoints are ignored. Returns the terminal entry.
    pub fn run<E: LineEvaluator>(&self, engine: &mut StepEngine<E>) -> Option<HistoryEntry> {
        engine.start();
        run_to_completion(engine, |_| {})
    }

    /// Start driving `engine`, starting it first if it is idle. The first
    /// step is due immediately.
    pub fn begin<E: LineEvaluator>(&mut self, engine: &mut StepEngine<E>) {
        if engine.state() == EngineState::Idle {
            engine.start();
        }
        self.queue.clear();
        self.queue.schedule(self.clock.now(), NextStep);
    }

    /// When the next step is due, if one is scheduled.
    pub fn next_due(&self) -> Option<Instant> {
        self.queue.next_due()
    }

    /// Run the pending step if it is due at `now`, and never wait.
    ///
    /// After a step the following one is scheduled `delay_after(status)`
    /// past `now`. A caller that polls late gets one step, not a backlog.
    pub fn poll<E: LineEvaluator>(
        &mut self,
        engine: &mut StepEngine<E>,
        breakpoints: &BreakpointSet,
        now: Instant,
    ) -> SessionPoll {
        let Some(NextStep) = self.queue.pop_due(now) else {
            return match self.queue.next_due() {
                Some(due) => SessionPoll::Pending(due),
                None => SessionPoll::Inactive,
            };
        };

        let entry = match engine.step(breakpoints) {
            StepOutcome::Stepped(entry) => entry,
            StepOutcome::Inactive => return SessionPoll::Inactive,
        };
        if let Some(delay) = self.config.delay_after(entry.status) {
            tracing::trace!(?delay, status = %entry.status, "next step scheduled");
            self.queue.schedule(now + delay, NextStep);
        }
        SessionPoll::Stepped(entry)
    }

    /// Drop whatever is scheduled and end the engine's session.
    pub fn tear_down<E: LineEvaluator>(&mut self, engine: &mut StepEngine<E>) {
        self.queue.clear();
        engine.tear_down();
    }

    /// Step the engine one line at a time, calling `on_step` after each
    /// step and idling on the clock until the next one is due.
    ///
    /// An idle engine is started first. `on_step` may toggle breakpoints; the
    /// change is seen by the next step. Returning [`ControlFlow::Break`] tears
    /// the session down, which is the only way out of a pause on a line that
    /// keeps its breakpoint.
    pub fn run_stepwise<E, F>(
        &mut self,
        engine: &mut StepEngine<E>,
        breakpoints: &mut BreakpointSet,
        mut on_step: F,
    ) -> SessionEnd
    where
        E: LineEvaluator,
        F: FnMut(&HistoryEntry, &mut BreakpointSet) -> ControlFlow<()>,
    {
        self.begin(engine);
        loop {
            let now = self.clock.now();
            let entry = match self.poll(engine, breakpoints, now) {
                SessionPoll::Pending(due) => {
                    self.clock.idle_until(due);
                    continue;
                }
                SessionPoll::Stepped(entry) => entry,
                SessionPoll::Inactive => return SessionEnd::Inactive,
            };

            if on_step(&entry, breakpoints).is_break() {
                let at_line = entry.line_index();
                self.tear_down(engine);
                return SessionEnd::TornDown { at_line };
            }
            if entry.status.is_terminal() {
                return SessionEnd::Finished(entry.status);
            }
        }
    }
}

/// Step an already started engine with no breakpoints until it terminates,
/// passing every entry to `on_step`.
pub(crate) fn run_to_completion<E: LineEvaluator>(
    engine: &mut StepEngine<E>,
    mut on_step: impl FnMut(&HistoryEntry),
) -> Option<HistoryEntry> {
    let no_breakpoints = BreakpointSet::new();
    loop {
        match engine.step(&no_breakpoints) {
            StepOutcome::Stepped(entry) => {
                on_step(&entry);
                if entry.status.is_terminal() {
                    return Some(entry);
                }
            }
            StepOutcome::Inactive => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ScriptEvaluator;

    fn driver() -> SessionDriver<ManualClock> {
        SessionDriver::with_clock(DriverConfig::default(), ManualClock::new())
    }

    #[test]
    fn queue_holds_one_task_until_due() {
        let start = Instant::now();
        let mut queue = EventQueue::new();
        queue.schedule(start + Duration::from_millis(5), "a");
        assert_eq!(queue.pop_due(start), None);
        assert!(!queue.is_empty());
        assert_eq!(queue.pop_due(start + Duration::from_millis(5)), Some("a"));
        assert!(queue.is_empty());
    }

    #[test]
    fn run_ignores_breakpoints() {
        let mut engine = StepEngine::new("x = 1\nx = 2", ScriptEvaluator::default());
        let last = driver().run(&mut engine).unwrap();
        assert_eq!(last.status, StepStatus::Done);
        assert_eq!(engine.history().len(), 3);
    }

    #[test]
    fn cadence_follows_the_last_status() {
        let mut engine = StepEngine::new("x = 1\nx = 2\nx = 3", ScriptEvaluator::default());
        let mut breakpoints: BreakpointSet = [1].into_iter().collect();
        let mut driver = driver();

        let mut statuses = Vec::new();
        let end = driver.run_stepwise(&mut engine, &mut breakpoints, |entry, bps| {
            statuses.push(entry.status);
            if entry.status == StepStatus::BreakpointHit {
                bps.toggle(entry.line_index());
            }
            ControlFlow::Continue(())
        });

        assert_eq!(end, SessionEnd::Finished(StepStatus::Done));
        assert_eq!(
            statuses,
            vec![
                StepStatus::Executed,
                StepStatus::BreakpointHit,
                StepStatus::Executed,
                StepStatus::Executed,
                StepStatus::Done,
            ]
        );
        let step = Duration::from_millis(100);
        let pause = Duration::from_millis(1000);
        assert_eq!(driver.clock().idled(), &[step, pause, step, step]);
    }

    #[test]
    fn poll_only_runs_a_step_once_it_is_due() {
        let mut engine = StepEngine::new("x = 1\nx = 2", ScriptEvaluator::default());
        let breakpoints = BreakpointSet::new();
        let mut driver = driver();
        let start = driver.clock().now();
        let ms = Duration::from_millis;

        driver.begin(&mut engine);
        assert_eq!(driver.next_due(), Some(start));
        let SessionPoll::Stepped(first) = driver.poll(&mut engine, &breakpoints, start) else {
            panic!("first step should be due at once");
        };
        assert_eq!(first.line_index(), 0);
        assert_eq!(driver.next_due(), Some(start + ms(100)));

        assert_eq!(
            driver.poll(&mut engine, &breakpoints, start + ms(50)),
            SessionPoll::Pending(start + ms(100))
        );
        assert_eq!(engine.history().len(), 1);

        // a late poll runs one step and schedules from when it ran
        let late = start + ms(10_000);
        let SessionPoll::Stepped(second) = driver.poll(&mut engine, &breakpoints, late) else {
            panic!("second step should be overdue");
        };
        assert_eq!(second.line_index(), 1);
        assert_eq!(driver.next_due(), Some(late + ms(100)));

        let SessionPoll::Stepped(done) = driver.poll(&mut engine, &breakpoints, late + ms(100))
        else {
            panic!("done step should be due");
        };
        assert_eq!(done.status, StepStatus::Done);
        assert_eq!(driver.next_due(), None);
        assert_eq!(
            driver.poll(&mut engine, &breakpoints, late + ms(500)),
            SessionPoll::Inactive
        );
        assert!(driver.clock().idled().is_empty());
    }

    #[test]
    fn tear_down_clears_the_pending_step() {
        let mut engine = StepEngine::new("x = 1\nx = 2", ScriptEvaluator::default());
        let breakpoints: BreakpointSet = [1].into_iter().collect();
        let mut driver = driver();
        let start = driver.clock().now();

        driver.begin(&mut engine);
        driver.poll(&mut engine, &breakpoints, start);
        assert!(driver.next_due().is_some());

        driver.tear_down(&mut engine);
        assert_eq!(driver.next_due(), None);
        assert_eq!(engine.state(), EngineState::Idle);
        assert_eq!(
            driver.poll(&mut engine, &breakpoints, start + Duration::from_secs(5)),
            SessionPoll::Inactive
        );
    }

    #[test]
    fn error_stops_scheduling() {
        let mut engine = StepEngine::new("1/0\nx = 1", ScriptEvaluator::default());
        let mut driver = driver();
        let end = driver.run_stepwise(&mut engine, &mut BreakpointSet::new(), |_, _| {
            ControlFlow::Continue(())
        });
        assert_eq!(end, SessionEnd::Finished(StepStatus::Errored));
        assert!(driver.clock().idled().is_empty());
    }

    #[test]
    fn terminated_engine_is_inactive() {
        let mut engine = StepEngine::new("x = 1", ScriptEvaluator::default());
        let mut driver = driver();
        driver.run(&mut engine);
        let end = driver.run_stepwise(&mut engine, &mut BreakpointSet::new(), |_, _| {
            ControlFlow::Continue(())
        });
        assert_eq!(end, SessionEnd::Inactive);
    }
}
