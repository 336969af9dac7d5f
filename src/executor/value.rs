use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::mem::size_of;
use std::rc::Rc;

use super::builtins::Builtin;
use crate::fault::{ExecutionFault, FaultKind};
use crate::parser::{BinOp, CmpOp, FunctionDef, UnaryOp};

/// A user function together with the line it was defined on.
#[derive(Debug, Clone)]
pub struct Function {
    pub def: FunctionDef,
    pub line: usize,
}

/// A runtime value. Lists are shared and mutable, so aliases observe
/// element assignment.
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Rc<RefCell<Vec<Value>>>),
    Function(Rc<Function>),
    Builtin(Builtin),
}

impl Value {
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn type_tag(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Function(_) => "function",
            Value::Builtin(_) => "builtin_function_or_method",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(v) => *v != 0,
            Value::Float(v) => *v != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Function(_) | Value::Builtin(_) => true,
        }
    }

    /// The quoted form used inside containers.
    pub fn repr(&self) -> String {
        let mut out = String::new();
        write_value(&mut out, self, true, &mut Vec::new());
        out
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        write_value(&mut out, self, false, &mut Vec::new());
        f.write_str(&out)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        values_equal(self, other)
    }
}

fn write_value(out: &mut String, value: &Value, repr: bool, seen: &mut Vec<*const ()>) {
    match value {
        Value::None => out.push_str("None"),
        Value::Bool(true) => out.push_str("True"),
        Value::Bool(false) => out.push_str("False"),
        Value::Int(v) => out.push_str(&v.to_string()),
        Value::Float(v) => out.push_str(&format_float(*v)),
        Value::Str(s) if repr => out.push_str(&quote(s)),
        Value::Str(s) => out.push_str(s),
        Value::List(items) => {
            let ptr = Rc::as_ptr(items) as *const ();
            if seen.contains(&ptr) {
                out.push_str("[...]");
                return;
            }
            seen.push(ptr);
            out.push('[');
            for (i, item) in items.borrow().iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(out, item, true, seen);
            }
            out.push(']');
            seen.pop();
        }
        Value::Function(func) => {
            out.push_str("<function ");
            out.push_str(&func.def.name);
            out.push('>');
        }
        Value::Builtin(b) => {
            out.push_str("<built-in function ");
            out.push_str(b.name());
            out.push('>');
        }
    }
}

fn quote(s: &str) -> String {
    let delim = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(delim);
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == delim => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(delim);
    out
}

/// Format a float the way Python's `str()` does for the common cases:
/// integral values keep a `.0`, very large or small magnitudes switch to
/// exponent notation with a signed, two digit exponent.
pub fn format_float(v: f64) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let magnitude = v.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let formatted = format!("{v:e}");
        if let Some((mantissa, exponent)) = formatted.split_once('e') {
            let exponent: i32 = exponent.parse().unwrap_or(0);
            let sign = if exponent < 0 { '-' } else { '+' };
            return format!("{mantissa}e{sign}{:02}", exponent.abs());
        }
        return formatted;
    }

    if v.fract() == 0.0 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn to_f64(self) -> f64 {
        match self {
            Num::Int(v) => v as f64,
            Num::Float(v) => v,
        }
    }
}

fn as_num(value: &Value) -> Option<Num> {
    match value {
        Value::Bool(b) => Some(Num::Int(i64::from(*b))),
        Value::Int(v) => Some(Num::Int(*v)),
        Value::Float(v) => Some(Num::Float(*v)),
        _ => None,
    }
}

/// Integer index for subscripting; bools count as 0 and 1.
pub fn as_index(value: &Value) -> Option<i64> {
    match value {
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Int(v) => Some(*v),
        _ => None,
    }
}

fn unsupported(op: BinOp, lhs: &Value, rhs: &Value) -> ExecutionFault {
    ExecutionFault::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.symbol(),
        lhs.type_tag(),
        rhs.type_tag()
    ))
}

/// Longest sequence a repetition may build.
pub const MAX_REPEAT_LEN: usize = 1 << 28;

/// Length of `unit` repeated `times` times, checked before anything is allocated.
/// Negative counts repeat zero times.
fn repeat_len(
    unit: usize,
    times: i64,
    elem_size: usize,
    what: &str,
) -> Result<usize, ExecutionFault> {
    let times = usize::try_from(times).unwrap_or(0);
    let limit = (isize::MAX as usize / elem_size.max(1)).min(MAX_REPEAT_LEN);
    match unit.checked_mul(times) {
        Some(len) if len <= limit => Ok(len),
        _ => Err(ExecutionFault::new(
            FaultKind::OverflowError,
            format!("repeated {what} is too long"),
        )),
    }
}

pub fn binary_op(op: BinOp, lhs: &Value, rhs: &Value) -> Result<Value, ExecutionFault> {
    if let (Some(a), Some(b)) = (as_num(lhs), as_num(rhs)) {
        return match (a, b) {
            (Num::Int(x), Num::Int(y)) => int_op(op, x, y),
            _ => float_op(op, a.to_f64(), b.to_f64()),
        };
    }

    match (op, lhs, rhs) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
        (BinOp::Add, Value::List(a), Value::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            Ok(Value::list(items))
        }
        (BinOp::Mul, Value::Str(s), count) | (BinOp::Mul, count, Value::Str(s)) => {
            let Some(times) = as_index(count) else {
                return Err(unsupported(op, lhs, rhs));
            };
            let len = repeat_len(s.len(), times, size_of::<u8>(), "string")?;
            if len == 0 {
                return Ok(Value::Str(String::new()));
            }
            Ok(Value::Str(s.repeat(len / s.len())))
        }
        (BinOp::Mul, Value::List(items), count) | (BinOp::Mul, count, Value::List(items)) => {
            let Some(times) = as_index(count) else {
                return Err(unsupported(op, lhs, rhs));
            };
            let items = items.borrow();
            let len = repeat_len(items.len(), times, size_of::<Value>(), "list")?;
            let mut out = Vec::with_capacity(len);
            while out.len() < len {
                out.extend(items.iter().cloned());
            }
            Ok(Value::list(out))
        }
        _ => Err(unsupported(op, lhs, rhs)),
    }
}

fn int_op(op: BinOp, x: i64, y: i64) -> Result<Value, ExecutionFault> {
    let checked = |v: Option<i64>| v.map(Value::Int).ok_or_else(ExecutionFault::overflow);
    match op {
        BinOp::Add => checked(x.checked_add(y)),
        BinOp::Sub => checked(x.checked_sub(y)),
        BinOp::Mul => checked(x.checked_mul(y)),
        BinOp::Div => {
            if y == 0 {
                return Err(ExecutionFault::zero_division("division by zero"));
            }
            Ok(Value::Float(x as f64 / y as f64))
        }
        BinOp::FloorDiv => {
            if y == 0 {
                return Err(ExecutionFault::zero_division(
                    "integer division or modulo by zero",
                ));
            }
            checked(floor_div(x, y))
        }
        BinOp::Mod => {
            if y == 0 {
                return Err(ExecutionFault::zero_division("integer modulo by zero"));
            }
            Ok(Value::Int(floor_mod(x, y)))
        }
        BinOp::Pow => {
            if y >= 0 {
                let exp = u32::try_from(y).map_err(|_| ExecutionFault::overflow())?;
                checked(x.checked_pow(exp))
            } else if x == 0 {
                Err(ExecutionFault::zero_division(
                    "0.0 cannot be raised to a negative power",
                ))
            } else {
                Ok(Value::Float((x as f64).powf(y as f64)))
            }
        }
    }
}

fn float_op(op: BinOp, x: f64, y: f64) -> Result<Value, ExecutionFault> {
    let value = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => {
            if y == 0.0 {
                return Err(ExecutionFault::zero_division("float division by zero"));
            }
            x / y
        }
        BinOp::FloorDiv => {
            if y == 0.0 {
                return Err(ExecutionFault::zero_division("float floor division by zero"));
            }
            (x / y).floor()
        }
        BinOp::Mod => {
            if y == 0.0 {
                return Err(ExecutionFault::zero_division("float modulo"));
            }
            let r = x % y;
            if r != 0.0 && ((r < 0.0) != (y < 0.0)) {
                r + y
            } else {
                r
            }
        }
        BinOp::Pow => {
            if x == 0.0 && y < 0.0 {
                return Err(ExecutionFault::zero_division(
                    "0.0 cannot be raised to a negative power",
                ));
            }
            if x < 0.0 && y.fract() != 0.0 {
                return Err(ExecutionFault::value_error(
                    "negative number cannot be raised to a fractional power",
                ));
            }
            x.powf(y)
        }
    };
    Ok(Value::Float(value))
}

fn floor_div(x: i64, y: i64) -> Option<i64> {
    let q = x.checked_div(y)?;
    if x % y != 0 && ((x < 0) != (y < 0)) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

fn floor_mod(x: i64, y: i64) -> i64 {
    let r = x.wrapping_rem(y);
    if r != 0 && ((r < 0) != (y < 0)) {
        r + y
    } else {
        r
    }
}

pub fn unary_op(op: UnaryOp, operand: &Value) -> Result<Value, ExecutionFault> {
    match (op, as_num(operand)) {
        (UnaryOp::Not, _) => Ok(Value::Bool(!operand.is_truthy())),
        (UnaryOp::Neg, Some(Num::Int(v))) => {
            v.checked_neg().map(Value::Int).ok_or_else(ExecutionFault::overflow)
        }
        (UnaryOp::Neg, Some(Num::Float(v))) => Ok(Value::Float(-v)),
        (UnaryOp::Pos, Some(Num::Int(v))) => Ok(Value::Int(v)),
        (UnaryOp::Pos, Some(Num::Float(v))) => Ok(Value::Float(v)),
        (UnaryOp::Neg | UnaryOp::Pos, None) => Err(ExecutionFault::type_error(format!(
            "bad operand type for unary {}: '{}'",
            if op == UnaryOp::Neg { "-" } else { "+" },
            operand.type_tag()
        ))),
    }
}

pub fn values_equal(a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (as_num(a), as_num(b)) {
        return match (x, y) {
            (Num::Int(x), Num::Int(y)) => x == y,
            _ => x.to_f64() == y.to_f64(),
        };
    }
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::List(x), Value::List(y)) => {
            Rc::ptr_eq(x, y) || {
                let (x, y) = (x.borrow(), y.borrow());
                x.len() == y.len() && x.iter().zip(y.iter()).all(|(p, q)| values_equal(p, q))
            }
        }
        (Value::Function(x), Value::Function(y)) => Rc::ptr_eq(x, y),
        (Value::Builtin(x), Value::Builtin(y)) => x == y,
        _ => false,
    }
}

/// Ordering between two values; `Ok(None)` when unordered (NaN).
pub fn compare_values(
    symbol: &str,
    a: &Value,
    b: &Value,
) -> Result<Option<Ordering>, ExecutionFault> {
    if let (Some(x), Some(y)) = (as_num(a), as_num(b)) {
        return Ok(match (x, y) {
            (Num::Int(x), Num::Int(y)) => Some(x.cmp(&y)),
            _ => x.to_f64().partial_cmp(&y.to_f64()),
        });
    }
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(Some(x.cmp(y))),
        (Value::List(x), Value::List(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            for (p, q) in x.iter().zip(y.iter()) {
                if !values_equal(p, q) {
                    return compare_values(symbol, p, q);
                }
            }
            Ok(Some(x.len().cmp(&y.len())))
        }
        _ => Err(ExecutionFault::type_error(format!(
            "'{symbol}' not supported between instances of '{}' and '{}'",
            a.type_tag(),
            b.type_tag()
        ))),
    }
}

fn contains(container: &Value, item: &Value) -> Result<bool, ExecutionFault> {
    match (container, item) {
        (Value::List(items), _) => Ok(items.borrow().iter().any(|v| values_equal(v, item))),
        (Value::Str(haystack), Value::Str(needle)) => Ok(haystack.contains(needle.as_str())),
        (Value::Str(_), other) => Err(ExecutionFault::type_error(format!(
            "'in <string>' requires string as left operand, not {}",
            other.type_tag()
        ))),
        (other, _) => Err(ExecutionFault::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_tag()
        ))),
    }
}

pub fn compare(op: CmpOp, lhs: &Value, rhs: &Value) -> Result<bool, ExecutionFault> {
    let ordering = |lhs: &Value, rhs: &Value| compare_values(op.symbol(), lhs, rhs);
    Ok(match op {
        CmpOp::Eq => values_equal(lhs, rhs),
        CmpOp::NotEq => !values_equal(lhs, rhs),
        CmpOp::In => contains(rhs, lhs)?,
        CmpOp::NotIn => !contains(rhs, lhs)?,
        CmpOp::Lt => ordering(lhs, rhs)? == Some(Ordering::Less),
        CmpOp::LtE => matches!(
            ordering(lhs, rhs)?,
            Some(Ordering::Less | Ordering::Equal)
        ),
        CmpOp::Gt => ordering(lhs, rhs)? == Some(Ordering::Greater),
        CmpOp::GtE => matches!(
            ordering(lhs, rhs)?,
            Some(Ordering::Greater | Ordering::Equal)
        ),
    })
}

fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let index = if index < 0 { index + len } else { index };
    if (0..len).contains(&index) {
        usize::try_from(index).ok()
    } else {
        None
    }
}

pub fn index_value(target: &Value, index: &Value) -> Result<Value, ExecutionFault> {
    match target {
        Value::List(items) => {
            let i = as_index(index).ok_or_else(|| {
                ExecutionFault::type_error(format!(
                    "list indices must be integers, not {}",
                    index.type_tag()
                ))
            })?;
            let items = items.borrow();
            normalize_index(i, items.len())
                .map(|i| items[i].clone())
                .ok_or_else(|| ExecutionFault::new(FaultKind::IndexError, "list index out of range"))
        }
        Value::Str(s) => {
            let i = as_index(index).ok_or_else(|| {
                ExecutionFault::type_error(format!(
                    "string indices must be integers, not '{}'",
                    index.type_tag()
                ))
            })?;
            let chars: Vec<char> = s.chars().collect();
            normalize_index(i, chars.len())
                .map(|i| Value::Str(chars[i].to_string()))
                .ok_or_else(|| {
                    ExecutionFault::new(FaultKind::IndexError, "string index out of range")
                })
        }
        other => Err(ExecutionFault::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_tag()
        ))),
    }
}

pub fn set_index(target: &Value, index: &Value, value: Value) -> Result<(), ExecutionFault> {
    match target {
        Value::List(items) => {
            let i = as_index(index).ok_or_else(|| {
                ExecutionFault::type_error(format!(
                    "list indices must be integers, not {}",
                    index.type_tag()
                ))
            })?;
            let mut items = items.borrow_mut();
            let len = items.len();
            let slot = normalize_index(i, len).ok_or_else(|| {
                ExecutionFault::new(FaultKind::IndexError, "list assignment index out of range")
            })?;
            items[slot] = value;
            Ok(())
        }
        other => Err(ExecutionFault::type_error(format!(
            "'{}' object does not support item assignment",
            other.type_tag()
        ))),
    }
}
