//! Simulated observer sessions driven through the stepwise session driver.

use std::fs::File;
use std::io::{BufReader, BufWriter, IsTerminal};
use std::ops::ControlFlow;
use std::time::Duration;

use line_stepper::debugger::ManualClock;
use line_stepper::{
    BreakpointSet, DebugContext, DriverConfig, EngineState, HistoryLog, ScriptEvaluator,
    SessionDriver, SessionEnd, StepEngine, StepStatus,
};
use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init() {
    if std::io::stderr().is_terminal() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .json()
            .try_init();
    }
}

fn driver(step_ms: u64, pause_ms: u64) -> SessionDriver<ManualClock> {
    let config = DriverConfig {
        step_delay_ms: step_ms,
        breakpoint_delay_ms: pause_ms,
        ..DriverConfig::default()
    };
    SessionDriver::with_clock(config, ManualClock::new())
}

#[test]
fn observer_clears_a_breakpoint_after_inspecting_it() {
    let mut engine = StepEngine::new(
        "count = 0\ncount += 1\ncount += 1\nprint(count)",
        ScriptEvaluator::default(),
    );
    let mut breakpoints: BreakpointSet = [2].into_iter().collect();
    let mut driver = driver(10, 500);

    let mut seen = Vec::new();
    let mut pauses = 0;
    let end = driver.run_stepwise(&mut engine, &mut breakpoints, |entry, bps| {
        seen.push((entry.line_index(), entry.status));
        if entry.status == StepStatus::BreakpointHit {
            pauses += 1;
            assert_eq!(entry.snapshot.variables["count"].value, "1");
            // stay paused for one extra round before letting it run
            if pauses == 2 {
                bps.toggle(entry.line_index());
            }
        }
        ControlFlow::Continue(())
    });

    assert_eq!(end, SessionEnd::Finished(StepStatus::Done));
    assert_eq!(
        seen,
        vec![
            (0, StepStatus::Executed),
            (1, StepStatus::Executed),
            (2, StepStatus::BreakpointHit),
            (2, StepStatus::BreakpointHit),
            (2, StepStatus::Executed),
            (3, StepStatus::Executed),
            (4, StepStatus::Done),
        ]
    );
    assert!(breakpoints.is_empty());

    let fast = Duration::from_millis(10);
    let slow = Duration::from_millis(500);
    assert_eq!(driver.clock().idled(), &[fast, fast, slow, slow, fast, fast]);
    assert_eq!(driver.clock().elapsed(), Duration::from_millis(1040));
}

#[test]
fn breakpoint_added_mid_session_applies_to_the_next_step() {
    let mut engine = StepEngine::new("a = 1\nb = 2\nc = 3", ScriptEvaluator::default());
    let mut breakpoints = BreakpointSet::new();
    let mut driver = driver(0, 0);

    let end = driver.run_stepwise(&mut engine, &mut breakpoints, |entry, bps| {
        match (entry.line_index(), entry.status) {
            (0, StepStatus::Executed) => {
                bps.toggle(1);
            }
            (1, StepStatus::BreakpointHit) => return ControlFlow::Break(()),
            _ => {}
        }
        ControlFlow::Continue(())
    });

    assert_eq!(end, SessionEnd::TornDown { at_line: 1 });
    assert_eq!(engine.history().len(), 2);
    assert!(!engine.environment().globals().any(|(name, _)| name == "b"));
}

#[test]
fn teardown_ends_a_pause_on_the_last_line() {
    let mut engine = StepEngine::new("x = 1\nx = 2", ScriptEvaluator::default());
    let mut breakpoints: BreakpointSet = [1].into_iter().collect();
    let mut driver = driver(100, 1000);

    let mut hits = 0;
    let end = driver.run_stepwise(&mut engine, &mut breakpoints, |entry, _| {
        if entry.status == StepStatus::BreakpointHit {
            hits += 1;
            if hits == 5 {
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    });

    assert_eq!(end, SessionEnd::TornDown { at_line: 1 });
    assert_eq!(engine.state(), EngineState::Idle);
    assert!(!engine.cursor().is_active());
    assert!(engine
        .history()
        .entries()
        .all(|e| e.status != StepStatus::Done));
    assert_eq!(driver.clock().elapsed(), Duration::from_millis(100 + 4 * 1000));

    // a torn down engine can be driven again from a fresh session
    breakpoints.clear();
    let end = driver.run_stepwise(&mut engine, &mut breakpoints, |_, _| ControlFlow::Continue(()));
    assert_eq!(end, SessionEnd::Finished(StepStatus::Done));
    assert_eq!(engine.history().len(), 3);
}

#[test]
fn session_history_persists_as_json_lines() {
    let mut ctx = DebugContext::default();
    ctx.submit_script("name = 'ada'\ngreeting = 'hi ' + name\nprint(greeting)\nboom = 1 / 0");
    ctx.toggle_breakpoint(1);
    ctx.start_session();

    let mut driver = driver(0, 0);
    let (engine, breakpoints) = ctx.session_parts().unwrap();
    let end = driver.run_stepwise(engine, breakpoints, |entry, bps| {
        if entry.status == StepStatus::BreakpointHit {
            bps.toggle(entry.line_index());
        }
        ControlFlow::Continue(())
    });
    assert_eq!(end, SessionEnd::Finished(StepStatus::Errored));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.jsonl");
    let history = ctx.history().unwrap();
    history
        .write_jsonl(BufWriter::new(File::create(&path).unwrap()))
        .unwrap();

    let restored = HistoryLog::read_jsonl(BufReader::new(File::open(&path).unwrap())).unwrap();
    assert_eq!(&restored, history);

    let statuses: Vec<_> = restored.entries().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![
            StepStatus::Executed,
            StepStatus::BreakpointHit,
            StepStatus::Executed,
            StepStatus::Executed,
            StepStatus::Errored,
        ]
    );
    let printed = restored.get(3).unwrap();
    assert_eq!(printed.output.as_deref(), Some("hi ada\n"));
    let last = restored.last().unwrap();
    assert_eq!(
        last.message.as_deref(),
        Some("ZeroDivisionError: division by zero")
    );
    assert_eq!(last.snapshot.source_line, "boom = 1 / 0");
}
