use super::value::{compare_values, Value};
use crate::fault::{ExecutionFault, FaultKind};

/// Functions available to every script without being bound in the
/// environment. User bindings shadow them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Print,
    Len,
    Str,
    Int,
    Float,
    Bool,
    Abs,
    Min,
    Max,
    Round,
    Type,
    Range,
}

impl Builtin {
    pub fn lookup(name: &str) -> Option<Self> {
        let builtin = match name {
            "print" => Builtin::Print,
            "len" => Builtin::Len,
            "str" => Builtin::Str,
            "int" => Builtin::Int,
            "float" => Builtin::Float,
            "bool" => Builtin::Bool,
            "abs" => Builtin::Abs,
            "min" => Builtin::Min,
            "max" => Builtin::Max,
            "round" => Builtin::Round,
            "type" => Builtin::Type,
            "range" => Builtin::Range,
            _ => return None,
        };
        Some(builtin)
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Print => "print",
            Builtin::Len => "len",
            Builtin::Str => "str",
            Builtin::Int => "int",
            Builtin::Float => "float",
            Builtin::Bool => "bool",
            Builtin::Abs => "abs",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Round => "round",
            Builtin::Type => "type",
            Builtin::Range => "range",
        }
    }

    /// Call the builtin. Anything printed is appended to `output`.
    pub fn call(self, args: Vec<Value>, output: &mut String) -> Result<Value, ExecutionFault> {
        match self {
            Builtin::Print => {
                let line = args
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" ");
                output.push_str(&line);
                output.push('\n');
                Ok(Value::None)
            }
            Builtin::Len => {
                let [arg] = self.exact::<1>(args)?;
                let len = match &arg {
                    Value::Str(s) => s.chars().count(),
                    Value::List(items) => items.borrow().len(),
                    other => {
                        return Err(ExecutionFault::type_error(format!(
                            "object of type '{}' has no len()",
                            other.type_tag()
                        )))
                    }
                };
                i64::try_from(len)
                    .map(Value::Int)
                    .map_err(|_| ExecutionFault::overflow())
            }
            Builtin::Str => match self.at_most::<1>(args)? {
                None => Ok(Value::Str(String::new())),
                Some(v) => Ok(Value::Str(v.to_string())),
            },
            Builtin::Int => match self.at_most::<1>(args)? {
                None => Ok(Value::Int(0)),
                Some(v) => to_int(&v),
            },
            Builtin::Float => match self.at_most::<1>(args)? {
                None => Ok(Value::Float(0.0)),
                Some(v) => to_float(&v),
            },
            Builtin::Bool => match self.at_most::<1>(args)? {
                None => Ok(Value::Bool(false)),
                Some(v) => Ok(Value::Bool(v.is_truthy())),
            },
            Builtin::Abs => {
                let [arg] = self.exact::<1>(args)?;
                match arg {
                    Value::Bool(b) => Ok(Value::Int(i64::from(b))),
                    Value::Int(v) => v
                        .checked_abs()
                        .map(Value::Int)
                        .ok_or_else(ExecutionFault::overflow),
                    Value::Float(v) => Ok(Value::Float(v.abs())),
                    other => Err(ExecutionFault::type_error(format!(
                        "bad operand type for abs(): '{}'",
                        other.type_tag()
                    ))),
                }
            }
            Builtin::Min => self.extreme(args, std::cmp::Ordering::Less),
            Builtin::Max => self.extreme(args, std::cmp::Ordering::Greater),
            Builtin::Round => round(args),
            Builtin::Type => {
                let [arg] = self.exact::<1>(args)?;
                Ok(Value::Str(arg.type_tag().to_string()))
            }
            Builtin::Range => range(args),
        }
    }

    fn exact<const N: usize>(self, args: Vec<Value>) -> Result<[Value; N], ExecutionFault> {
        let given = args.len();
        args.try_into().map_err(|_| {
            ExecutionFault::type_error(format!(
                "{}() takes exactly {N} argument{} ({given} given)",
                self.name(),
                if N == 1 { "" } else { "s" }
            ))
        })
    }

    fn at_most<const N: usize>(self, mut args: Vec<Value>) -> Result<Option<Value>, ExecutionFault> {
        if args.len() > N {
            return Err(ExecutionFault::type_error(format!(
                "{}() takes at most {N} argument ({} given)",
                self.name(),
                args.len()
            )));
        }
        Ok(args.pop())
    }

    fn extreme(
        self,
        args: Vec<Value>,
        keep: std::cmp::Ordering,
    ) -> Result<Value, ExecutionFault> {
        let candidates = if args.len() == 1 {
            match &args[0] {
                Value::List(items) => items.borrow().clone(),
                other => {
                    return Err(ExecutionFault::type_error(format!(
                        "'{}' object is not iterable",
                        other.type_tag()
                    )))
                }
            }
        } else {
            args
        };

        let mut iter = candidates.into_iter();
        let mut best = iter.next().ok_or_else(|| {
            ExecutionFault::value_error(format!("{}() arg is an empty sequence", self.name()))
        })?;
        for candidate in iter {
            let symbol = if keep == std::cmp::Ordering::Less { "<" } else { ">" };
            if compare_values(symbol, &candidate, &best)? == Some(keep) {
                best = candidate;
            }
        }
        Ok(best)
    }
}

fn to_int(value: &Value) -> Result<Value, ExecutionFault> {
    match value {
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Int(v) => Ok(Value::Int(*v)),
        Value::Float(v) => {
            if v.is_nan() {
                return Err(ExecutionFault::value_error(
                    "cannot convert float NaN to integer",
                ));
            }
            if v.is_infinite() {
                return Err(ExecutionFault::new(
                    FaultKind::OverflowError,
                    "cannot convert float infinity to integer",
                ));
            }
            let truncated = v.trunc();
            if truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
                return Err(ExecutionFault::overflow());
            }
            Ok(Value::Int(truncated as i64))
        }
        Value::Str(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
            ExecutionFault::value_error(format!(
                "invalid literal for int() with base 10: {}",
                value.repr()
            ))
        }),
        other => Err(ExecutionFault::type_error(format!(
            "int() argument must be a string or a number, not '{}'",
            other.type_tag()
        ))),
    }
}

fn to_float(value: &Value) -> Result<Value, ExecutionFault> {
    match value {
        Value::Bool(b) => Ok(Value::Float(f64::from(u8::from(*b)))),
        Value::Int(v) => Ok(Value::Float(*v as f64)),
        Value::Float(v) => Ok(Value::Float(*v)),
        Value::Str(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
            ExecutionFault::value_error(format!(
                "could not convert string to float: {}",
                value.repr()
            ))
        }),
        other => Err(ExecutionFault::type_error(format!(
            "float() argument must be a string or a number, not '{}'",
            other.type_tag()
        ))),
    }
}

fn round(args: Vec<Value>) -> Result<Value, ExecutionFault> {
    let (number, digits) = match args.as_slice() {
        [n] => (n.clone(), None),
        [n, Value::None] => (n.clone(), None),
        [n, Value::Int(d)] => (n.clone(), Some(*d)),
        [_, other] => {
            return Err(ExecutionFault::type_error(format!(
                "'{}' object cannot be interpreted as an integer",
                other.type_tag()
            )))
        }
        _ => {
            return Err(ExecutionFault::type_error(format!(
                "round() takes at most 2 arguments ({} given)",
                args.len()
            )))
        }
    };

    match (number, digits) {
        (Value::Int(v), _) => Ok(Value::Int(v)),
        (Value::Bool(b), _) => Ok(Value::Int(i64::from(b))),
        (Value::Float(v), None) => to_int(&Value::Float(v.round_ties_even())),
        (Value::Float(v), Some(d)) => {
            let scale = 10f64.powi(i32::try_from(d).unwrap_or(if d < 0 { i32::MIN } else { i32::MAX }));
            if !scale.is_finite() || scale == 0.0 {
                return Ok(Value::Float(v));
            }
            Ok(Value::Float((v * scale).round_ties_even() / scale))
        }
        (other, _) => Err(ExecutionFault::type_error(format!(
            "type {} doesn't define __round__ method",
            other.type_tag()
        ))),
    }
}

fn range(args: Vec<Value>) -> Result<Value, ExecutionFault> {
    let mut bounds = Vec::with_capacity(args.len());
    for arg in &args {
        match arg {
            Value::Int(v) => bounds.push(*v),
            Value::Bool(b) => bounds.push(i64::from(*b)),
            other => {
                return Err(ExecutionFault::type_error(format!(
                    "'{}' object cannot be interpreted as an integer",
                    other.type_tag()
                )))
            }
        }
    }

    let (start, stop, step) = match bounds.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => {
            return Err(ExecutionFault::type_error(format!(
                "range expected at most 3 arguments, got {}",
                bounds.len()
            )))
        }
    };
    if step == 0 {
        return Err(ExecutionFault::value_error("range() arg 3 must not be zero"));
    }

    let mut items = Vec::new();
    let mut current = start;
    while (step > 0 && current < stop) || (step < 0 && current > stop) {
        items.push(Value::Int(current));
        current = match current.checked_add(step) {
            Some(next) => next,
            None => break,
        };
    }
    Ok(Value::list(items))
}
