use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use super::builtins::Builtin;
use super::environment::{Environment, Frame};
use super::value::{binary_op, compare, index_value, set_index, unary_op, Function, Value};
use super::LineEvaluator;
use crate::config::DriverConfig;
use crate::debugger::{FrameDescriptor, VariableView};
use crate::fault::{ExecutionFault, FaultKind};
use crate::parser::{parse_line, BinOp, Expr, Stmt, Target};

/// The evaluator for the built-in line-oriented script language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptEvaluator {
    max_call_depth: usize,
}

impl Default for ScriptEvaluator {
    fn default() -> Self {
        Self::from_config(&DriverConfig::default())
    }
}

impl ScriptEvaluator {
    pub fn new(max_call_depth: usize) -> Self {
        Self { max_call_depth }
    }

    pub fn from_config(config: &DriverConfig) -> Self {
        Self::new(config.max_call_depth)
    }

    pub fn max_call_depth(&self) -> usize {
        self.max_call_depth
    }
}

impl LineEvaluator for ScriptEvaluator {
    type Env = Environment;

    fn execute(
        &self,
        source: &str,
        line_index: usize,
        env: &mut Environment,
        output: &mut String,
    ) -> Result<(), ExecutionFault> {
        let stmt =
            parse_line(source).map_err(|fault| fault.with_frames(|| env.call_stack(line_index)))?;

        let mut interp = Interpreter {
            env,
            output,
            line: line_index,
            max_call_depth: self.max_call_depth,
        };
        match interp.exec(&stmt) {
            Ok(_) => Ok(()),
            Err(fault) => Err(fault.with_frames(|| interp.env.call_stack(line_index))),
        }
    }

    fn variables(&self, env: &Environment) -> BTreeMap<String, VariableView> {
        env.globals()
            .map(|(name, value)| {
                (
                    name.clone(),
                    VariableView::new(value.type_tag(), value.to_string()),
                )
            })
            .collect()
    }

    fn call_stack(&self, env: &Environment, line_index: usize) -> Vec<FrameDescriptor> {
        env.call_stack(line_index)
    }
}

enum Flow {
    Normal,
    Return(Value),
}

struct Interpreter<'a> {
    env: &'a mut Environment,
    output: &'a mut String,
    line: usize,
    max_call_depth: usize,
}

impl Interpreter<'_> {
    fn exec(&mut self, stmt: &Stmt) -> Result<Flow, ExecutionFault> {
        match stmt {
            Stmt::Pass => {}
            Stmt::Assign { target, value } => {
                let value = self.eval(value)?;
                self.assign(target, value)?;
            }
            Stmt::AugAssign { target, op, value } => self.aug_assign(target, *op, value)?,
            Stmt::Delete(name) => {
                if self.env.unbind(name).is_none() {
                    return Err(name_error(name));
                }
            }
            Stmt::Assert { test, message } => {
                if !self.eval(test)?.is_truthy() {
                    let message = match message {
                        Some(expr) => self.eval(expr)?.to_string(),
                        None => "assertion failed".to_string(),
                    };
                    return Err(ExecutionFault::new(FaultKind::AssertionError, message));
                }
            }
            Stmt::FunctionDef(def) => {
                let function = Function {
                    def: def.clone(),
                    line: self.line,
                };
                self.env
                    .bind(def.name.clone(), Value::Function(Rc::new(function)));
            }
            Stmt::Return(expr) => return Ok(Flow::Return(self.eval(expr)?)),
            Stmt::Expr(expr) => {
                self.eval(expr)?;
            }
        }
        Ok(Flow::Normal)
    }

    fn assign(&mut self, target: &Target, value: Value) -> Result<(), ExecutionFault> {
        match target {
            Target::Name(name) => {
                self.env.bind(name.clone(), value);
                Ok(())
            }
            Target::Index { target, index } => {
                let container = self.eval(target)?;
                let index = self.eval(index)?;
                set_index(&container, &index, value)
            }
        }
    }

    fn aug_assign(&mut self, target: &Target, op: BinOp, value: &Expr) -> Result<(), ExecutionFault> {
        match target {
            Target::Name(name) => {
                let current = self.env.lookup(name).ok_or_else(|| name_error(name))?;
                let rhs = self.eval(value)?;
                let updated = in_place(op, &current, &rhs).map_or_else(|| binary_op(op, &current, &rhs), Ok)?;
                self.env.bind(name.clone(), updated);
                Ok(())
            }
            Target::Index { target, index } => {
                let container = self.eval(target)?;
                let index = self.eval(index)?;
                let current = index_value(&container, &index)?;
                let rhs = self.eval(value)?;
                let updated = in_place(op, &current, &rhs).map_or_else(|| binary_op(op, &current, &rhs), Ok)?;
                set_index(&container, &index, updated)
            }
        }
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, ExecutionFault> {
        match expr {
            Expr::Int(v) => Ok(Value::Int(*v)),
            Expr::Float(v) => Ok(Value::Float(*v)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::None => Ok(Value::None),
            Expr::Name(name) => self
                .env
                .lookup(name)
                .or_else(|| Builtin::lookup(name).map(Value::Builtin))
                .ok_or_else(|| name_error(name)),
            Expr::List(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::list(values))
            }
            Expr::Index { target, index } => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                index_value(&target, &index)
            }
            Expr::Call { callee, args } => {
                let callee = self.eval(callee)?;
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(callee, args)
            }
            Expr::Unary { op, operand } => {
                let operand = self.eval(operand)?;
                unary_op(*op, &operand)
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                binary_op(*op, &lhs, &rhs)
            }
            Expr::Compare { first, rest } => {
                let mut left = self.eval(first)?;
                for (op, expr) in rest {
                    let right = self.eval(expr)?;
                    if !compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::And(lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                if !lhs.is_truthy() {
                    return Ok(lhs);
                }
                self.eval(rhs)
            }
            Expr::Or(lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                if lhs.is_truthy() {
                    return Ok(lhs);
                }
                self.eval(rhs)
            }
            Expr::Conditional {
                then,
                cond,
                otherwise,
            } => {
                if self.eval(cond)?.is_truthy() {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
        }
    }

    fn call(&mut self, callee: Value, args: Vec<Value>) -> Result<Value, ExecutionFault> {
        let function = match callee {
            Value::Builtin(builtin) => return builtin.call(args, self.output),
            Value::Function(function) => function,
            other => {
                return Err(ExecutionFault::type_error(format!(
                    "'{}' object is not callable",
                    other.type_tag()
                )))
            }
        };

        let def = &function.def;
        if args.len() != def.params.len() {
            return Err(ExecutionFault::type_error(format!(
                "{}() takes {} positional argument{} but {} {} given",
                def.name,
                def.params.len(),
                if def.params.len() == 1 { "" } else { "s" },
                args.len(),
                if args.len() == 1 { "was" } else { "were" },
            )));
        }
        // the module frame counts towards the limit
        if self.env.depth() + 1 >= self.max_call_depth {
            return Err(ExecutionFault::new(
                FaultKind::RecursionError,
                "maximum recursion depth exceeded",
            ));
        }

        let locals: HashMap<String, Value> = def.params.iter().cloned().zip(args).collect();
        self.env
            .push_frame(Frame::new(def.name.clone(), function.line, locals));
        tracing::trace!(function = %def.name, depth = self.env.depth(), "call");

        let result = self.exec(&def.body);
        let result = result.map_err(|fault| fault.with_frames(|| self.env.call_stack(self.line)));
        self.env.pop_frame();

        match result? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(Value::None),
        }
    }
}

/// `list += list` extends the existing list so aliases see the change.
fn in_place(op: BinOp, current: &Value, rhs: &Value) -> Option<Value> {
    match (op, current, rhs) {
        (BinOp::Add, Value::List(items), Value::List(extra)) => {
            let extra = extra.borrow().clone();
            items.borrow_mut().extend(extra);
            Some(current.clone())
        }
        _ => None,
    }
}

fn name_error(name: &str) -> ExecutionFault {
    ExecutionFault::new(FaultKind::NameError, format!("name '{name}' is not defined"))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Harness {
        evaluator: ScriptEvaluator,
        env: Environment,
        output: String,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                evaluator: ScriptEvaluator::default(),
                env: Environment::new(),
                output: String::new(),
            }
        }

        fn run(&mut self, lines: &[&str]) -> Result<(), ExecutionFault> {
            for (i, line) in lines.iter().enumerate() {
                self.evaluator
                    .execute(line, i, &mut self.env, &mut self.output)?;
            }
            Ok(())
        }

        fn var(&self, name: &str) -> VariableView {
            self.evaluator
                .variables(&self.env)
                .remove(name)
                .unwrap_or_else(|| panic!("{name} is not bound"))
        }
    }

    #[test]
    fn bindings_accumulate_across_lines() {
        let mut h = Harness::new();
        h.run(&["x = 1", "x = x + 1", "print(x)"]).unwrap();
        assert_eq!(h.var("x"), VariableView::new("int", "2"));
        assert_eq!(h.output, "2\n");
    }

    #[test]
    fn one_line_functions_and_recursion() {
        let mut h = Harness::new();
        h.run(&[
            "def fact(n): return 1 if n <= 1 else n * fact(n - 1)",
            "result = fact(10)",
        ])
        .unwrap();
        assert_eq!(h.var("result"), VariableView::new("int", "3628800"));
        assert_eq!(h.var("fact"), VariableView::new("function", "<function fact>"));
    }

    #[test]
    fn function_locals_do_not_leak() {
        let mut h = Harness::new();
        h.run(&["def set_local(v): tmp = v", "set_local(5)"]).unwrap();
        assert!(!h.evaluator.variables(&h.env).contains_key("tmp"));
        assert_eq!(h.env.depth(), 0);
    }

    #[test]
    fn fault_inside_function_reports_the_inner_stack() {
        let mut h = Harness::new();
        let fault = h
            .run(&["def inv(x): return 1 / x", "", "y = inv(0)"])
            .unwrap_err();
        assert_eq!(fault.kind, FaultKind::ZeroDivisionError);
        assert_eq!(
            fault.frames,
            vec![FrameDescriptor::module(2), FrameDescriptor::new("inv", 0)]
        );
        assert_eq!(h.env.depth(), 0);
    }

    #[test]
    fn runaway_recursion_is_a_fault_not_a_crash() {
        let mut h = Harness {
            evaluator: ScriptEvaluator::new(16),
            ..Harness::new()
        };
        let fault = h.run(&["def down(n): return down(n + 1)", "down(0)"]).unwrap_err();
        assert_eq!(fault.kind, FaultKind::RecursionError);
        assert_eq!(fault.frames.len(), 16);
        assert_eq!(h.env.depth(), 0);
    }

    #[test]
    fn undefined_name_and_deletion() {
        let mut h = Harness::new();
        h.run(&["a = 1", "del a"]).unwrap();
        let fault = h.run(&["print(a)"]).unwrap_err();
        assert_eq!(fault.to_string(), "NameError: name 'a' is not defined");
        assert_eq!(fault.frames, vec![FrameDescriptor::module(0)]);
    }

    #[test]
    fn list_aliases_share_mutation() {
        let mut h = Harness::new();
        h.run(&["a = [1, 2]", "b = a", "b[0] = 9", "a += [3]"]).unwrap();
        assert_eq!(h.var("a").value, "[9, 2, 3]");
        assert_eq!(h.var("b").value, "[9, 2, 3]");
    }

    #[test]
    fn assertions() {
        let mut h = Harness::new();
        h.run(&["assert 1 < 2"]).unwrap();
        let fault = h.run(&["assert 1 > 2, 'math is broken'"]).unwrap_err();
        assert_eq!(fault.to_string(), "AssertionError: math is broken");
    }

    #[test]
    fn short_circuit_skips_the_right_operand() {
        let mut h = Harness::new();
        h.run(&["ok = False and undefined_name", "other = 0 or 'fallback'"])
            .unwrap();
        assert_eq!(h.var("ok"), VariableView::new("bool", "False"));
        assert_eq!(h.var("other"), VariableView::new("str", "fallback"));
    }

    #[test]
    fn wrong_arity_and_non_callables() {
        let mut h = Harness::new();
        h.run(&["def add(a, b): return a + b"]).unwrap();
        let fault = h.run(&["add(1)"]).unwrap_err();
        assert_eq!(
            fault.message,
            "add() takes 2 positional arguments but 1 was given"
        );
        let fault = h.run(&["x = 3", "x()"]).unwrap_err();
        assert_eq!(fault.message, "'int' object is not callable");
    }

    #[test]
    fn builtins_are_not_variables_but_can_be_shadowed() {
        let mut h = Harness::new();
        h.run(&["n = len([1, 2, 3])"]).unwrap();
        assert_eq!(h.evaluator.variables(&h.env).len(), 1);
        h.run(&["def len(x): return 0", "m = len('abc')"]).unwrap();
        assert_eq!(h.var("m").value, "0");
    }
}
