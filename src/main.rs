use std::fs;
use std::io::{self, BufWriter, IsTerminal, Write};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use eyre::{bail, WrapErr};
use line_stepper::debugger::notify;
use line_stepper::{
    BreakpointSet, ConsoleObserver, DebugContext, DriverConfig, HistoryEntry, ScriptEvaluator,
    SessionDriver, SessionEnd, StepObserver, StepStatus,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(version, about = "Step through line-oriented scripts")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a script to completion, printing its output.
    Run {
        script: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Step through a script one line at a time.
    Debug(DebugArgs),
}

#[derive(Debug, clap::Args)]
struct DebugArgs {
    script: PathBuf,

    /// 1-based line to pause before. May be repeated.
    #[arg(short = 'b', long = "breakpoint", value_parser = clap::value_parser!(u64).range(1..))]
    breakpoints: Vec<u64>,

    #[arg(long)]
    config: Option<PathBuf>,

    /// Write every step to this file as JSON lines.
    #[arg(long)]
    history: Option<PathBuf>,

    /// Prompt for commands at each breakpoint.
    #[arg(short, long)]
    interactive: bool,

    #[arg(long)]
    step_delay_ms: Option<u64>,

    #[arg(long)]
    breakpoint_delay_ms: Option<u64>,
}

/// Passes script output through and reports faults.
struct OutputOnly;

impl StepObserver for OutputOnly {
    fn on_status(&mut self, status: StepStatus, message: Option<&str>) {
        if status == StepStatus::Errored {
            eprintln!("❌ {}", message.unwrap_or("execution failed"));
        }
    }

    fn on_output(&mut self, text: &str) {
        print!("{text}");
    }
}

fn main() -> eyre::Result<()> {
    color_eyre::install().wrap_err("installing color_eyre")?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr);
    if io::stderr().is_terminal() {
        builder.init();
    } else {
        builder.json().init();
    }

    let cli = Cli::parse();
    tracing::debug!(?cli, "parsed arguments");
    match cli.command {
        Command::Run { script, config } => run(&script, config.as_deref()),
        Command::Debug(args) => debug(args),
    }
}

fn load_config(path: Option<&Path>) -> eyre::Result<DriverConfig> {
    match path {
        Some(path) => DriverConfig::load(path)
            .wrap_err_with(|| format!("loading config {}", path.display())),
        None => Ok(DriverConfig::default()),
    }
}

fn read_script(path: &Path) -> eyre::Result<String> {
    fs::read_to_string(path).wrap_err_with(|| format!("reading script {}", path.display()))
}

fn run(script: &Path, config: Option<&Path>) -> eyre::Result<()> {
    let config = load_config(config)?;
    let mut ctx = DebugContext::new(ScriptEvaluator::from_config(&config));
    ctx.submit_script(read_script(script)?);

    let last = ctx.request_run_to_completion(&mut OutputOnly);
    io::stdout().flush()?;
    match last {
        Some(entry) if entry.status == StepStatus::Errored => bail!(
            "{} failed at line {}",
            script.display(),
            entry.line_index() + 1
        ),
        _ => Ok(()),
    }
}

fn debug(args: DebugArgs) -> eyre::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(ms) = args.step_delay_ms {
        config.step_delay_ms = ms;
    }
    if let Some(ms) = args.breakpoint_delay_ms {
        config.breakpoint_delay_ms = ms;
    }

    let mut ctx = DebugContext::new(ScriptEvaluator::from_config(&config));
    ctx.submit_script(read_script(&args.script)?);
    for line in &args.breakpoints {
        let index = usize::try_from(line - 1).wrap_err("breakpoint line out of range")?;
        ctx.toggle_breakpoint(index);
    }
    ctx.start_session();

    let mut driver = SessionDriver::new(config);
    let mut observer = ConsoleObserver::new(true);
    let Some((engine, breakpoints)) = ctx.session_parts() else {
        bail!("no session to drive");
    };
    let end = driver.run_stepwise(engine, breakpoints, |entry, breakpoints| {
        notify(&mut observer, entry);
        if entry.status != StepStatus::BreakpointHit {
            return ControlFlow::Continue(());
        }
        if args.interactive {
            prompt(entry, breakpoints)
        } else {
            resume(entry, breakpoints);
            ControlFlow::Continue(())
        }
    });
    io::stdout().flush()?;
    tracing::info!(?end, "session ended");

    if let (Some(path), Some(history)) = (&args.history, ctx.history()) {
        let file = fs::File::create(path)
            .wrap_err_with(|| format!("creating history file {}", path.display()))?;
        history.write_jsonl(BufWriter::new(file))?;
        eprintln!("📝 Wrote {} steps to {}", history.len(), path.display());
    }

    match end {
        SessionEnd::Finished(StepStatus::Errored) => bail!("{} failed", args.script.display()),
        SessionEnd::TornDown { at_line } => {
            eprintln!("⏹️  Stopped at line {}", at_line + 1);
            Ok(())
        }
        _ => Ok(()),
    }
}

/// A paused line only runs once its breakpoint is gone, so resuming clears it.
fn resume(entry: &HistoryEntry, breakpoints: &mut BreakpointSet) {
    let line = entry.line_index();
    if breakpoints.contains(line) {
        breakpoints.toggle(line);
        eprintln!("▶️  Continuing, breakpoint on line {} cleared", line + 1);
    }
}

/// Returns whether the prompt reached the terminal. A failed flush is logged,
/// the command is still read.
fn flush_prompt(out: &mut impl Write) -> bool {
    match out.flush() {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "flushing prompt");
            false
        }
    }
}

fn prompt(entry: &HistoryEntry, breakpoints: &mut BreakpointSet) -> ControlFlow<()> {
    let stdin = io::stdin();
    loop {
        eprint!("(line {}) > ", entry.line_index() + 1);
        flush_prompt(&mut io::stderr());

        let mut input = String::new();
        match stdin.read_line(&mut input) {
            Ok(0) => return ControlFlow::Break(()),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "reading command");
                return ControlFlow::Break(());
            }
        }

        let Some(words) = shlex::split(input.trim()) else {
            eprintln!("❓ Unbalanced quotes: {}", input.trim());
            continue;
        };
        let words: Vec<&str> = words.iter().map(String::as_str).collect();
        match words.as_slice() {
            [] | ["c"] | ["continue"] => {
                resume(entry, breakpoints);
                return ControlFlow::Continue(());
            }
            ["b", line] | ["break", line] => match line.parse::<usize>() {
                Ok(line) if line > 0 => {
                    let set = breakpoints.toggle(line - 1);
                    eprintln!(
                        "{} breakpoint on line {line}",
                        if set { "🔴 Set" } else { "⚪ Cleared" }
                    );
                }
                _ => eprintln!("❓ Expected a line number, got {line}"),
            },
            ["l"] | ["list"] => {
                let lines = breakpoints.lines();
                if lines.is_empty() {
                    eprintln!("No breakpoints");
                }
                for line in lines {
                    eprintln!("  line {}", line + 1);
                }
            }
            ["v"] | ["vars"] => {
                for (name, view) in &entry.snapshot.variables {
                    eprintln!("  {} ({}) = {}", name, view.type_tag, view.value);
                }
            }
            ["s"] | ["stack"] => {
                for frame in entry.snapshot.call_stack.iter().rev() {
                    eprintln!("  {frame}");
                }
            }
            ["q"] | ["quit"] => return ControlFlow::Break(()),
            _ => eprintln!("❓ Unknown command: {}", input.trim()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    #[test]
    fn failed_prompt_flush_is_reported() {
        assert!(!flush_prompt(&mut BrokenPipe));
        assert!(flush_prompt(&mut Vec::<u8>::new()));
    }

    #[test]
    fn resume_clears_only_the_paused_line() {
        let mut ctx = DebugContext::default();
        ctx.submit_script("a = 1\nb = 2");
        ctx.toggle_breakpoint(0);
        ctx.toggle_breakpoint(1);
        ctx.start_session();
        let entry = ctx.request_step(&mut ()).entry().cloned().unwrap();
        assert_eq!(entry.status, StepStatus::BreakpointHit);

        let mut breakpoints: BreakpointSet = [0, 1].into_iter().collect();
        resume(&entry, &mut breakpoints);
        assert_eq!(breakpoints.lines(), vec![1]);
    }
}
