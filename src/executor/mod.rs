mod builtins;
mod environment;
mod runner;
mod value;

use std::collections::BTreeMap;

pub use builtins::Builtin;
pub use environment::{Environment, Frame};
pub use runner::ScriptEvaluator;
pub use value::{Function, Value};

use crate::debugger::{FrameDescriptor, VariableView};
use crate::fault::ExecutionFault;

/// Evaluates single source lines against an environment owned by the
/// caller.
///
/// The step engine owns one `Env` per session and threads it through every
/// call, so bindings made by earlier lines are visible to later ones.
pub trait LineEvaluator {
    type Env: Default;

    /// Execute one line. Text printed by the line is appended to `output`.
    fn execute(
        &self,
        source: &str,
        line_index: usize,
        env: &mut Self::Env,
        output: &mut String,
    ) -> Result<(), ExecutionFault>;

    /// Display view of every module level binding.
    fn variables(&self, env: &Self::Env) -> BTreeMap<String, VariableView>;

    /// Current call stack, outermost first.
    fn call_stack(&self, env: &Self::Env, line_index: usize) -> Vec<FrameDescriptor>;
}
