use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::{Error, ErrorKind};
use crate::value::{Value, ValueRepr};

#[derive(Copy, Clone)]
enum Num {
    Int(i64),
    Float(f64),
}

fn as_num(value: &Value) -> Option<Num> {
    match value.0 {
        ValueRepr::Int(val) => Some(Num::Int(val)),
        ValueRepr::Bool(val) => Some(Num::Int(val as i64)),
        ValueRepr::Float(val) => Some(Num::Float(val)),
        _ => None,
    }
}

enum CoerceResult {
    I64(i64, i64),
    F64(f64, f64),
}

fn coerce(lhs: &Value, rhs: &Value) -> Option<CoerceResult> {
    match (as_num(lhs)?, as_num(rhs)?) {
        (Num::Int(a), Num::Int(b)) => Some(CoerceResult::I64(a, b)),
        (Num::Float(a), Num::Float(b)) => Some(CoerceResult::F64(a, b)),
        (Num::Int(a), Num::Float(b)) => Some(CoerceResult::F64(a as f64, b)),
        (Num::Float(a), Num::Int(b)) => Some(CoerceResult::F64(a, b as f64)),
    }
}

fn unsupported(op: &str, lhs: &Value, rhs: &Value) -> Error {
    Error::new(
        ErrorKind::InvalidOperation,
        format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op,
            lhs.kind(),
            rhs.kind()
        ),
    )
}

fn overflow() -> Error {
    Error::new(ErrorKind::InvalidOperation, "integer overflow")
}

fn division_by_zero() -> Error {
    Error::new(ErrorKind::InvalidOperation, "division by zero")
}

fn zero_to_negative_power() -> Error {
    Error::new(
        ErrorKind::InvalidOperation,
        "0.0 cannot be raised to a negative power",
    )
}

/// Upper bound for the number of items (or string bytes) `*` may produce.
const MAX_REPEAT_SIZE: usize = 100_000_000;

fn repeat_count(len: usize, count: i64) -> Result<usize, Error> {
    let count = ok!(usize::try_from(count.max(0)).map_err(|_| overflow()));
    match len.checked_mul(count) {
        Some(size) if size <= MAX_REPEAT_SIZE => Ok(count),
        _ => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("repeated sequence is too large (exceeds {MAX_REPEAT_SIZE})"),
        )),
    }
}

fn repeat<T: Clone>(items: &[T], count: i64) -> Result<Vec<T>, Error> {
    let count = ok!(repeat_count(items.len(), count));
    let mut rv = Vec::with_capacity(items.len() * count);
    for _ in 0..count {
        rv.extend_from_slice(items);
    }
    Ok(rv)
}

macro_rules! math_binop {
    ($name:ident, $int:ident, $float:tt) => {
        fn $name(lhs: &Value, rhs: &Value) -> Option<Result<Value, Error>> {
            Some(match coerce(lhs, rhs)? {
                CoerceResult::I64(a, b) => a.$int(b).map(Value::from).ok_or_else(overflow),
                CoerceResult::F64(a, b) => Ok(Value::from(a $float b)),
            })
        }
    };
}

math_binop!(num_add, checked_add, +);
math_binop!(num_sub, checked_sub, -);
math_binop!(num_mul, checked_mul, *);

/// Implements the `+` operator.
pub fn add(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    if let Some(rv) = num_add(lhs, rhs) {
        return rv;
    }
    match (&lhs.0, &rhs.0) {
        (ValueRepr::String(a), ValueRepr::String(b)) => {
            let mut rv = String::with_capacity(a.len() + b.len());
            rv.push_str(a);
            rv.push_str(b);
            Ok(Value::from(rv))
        }
        (ValueRepr::List(a), ValueRepr::List(b)) => {
            Ok(Value::from(a.iter().chain(b.iter()).cloned().collect::<Vec<_>>()))
        }
        _ => Err(unsupported("+", lhs, rhs)),
    }
}

/// Implements the `-` operator.
pub fn sub(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    num_sub(lhs, rhs).unwrap_or_else(|| Err(unsupported("-", lhs, rhs)))
}

/// Implements the `*` operator.
pub fn mul(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    if let Some(rv) = num_mul(lhs, rhs) {
        return rv;
    }
    match (&lhs.0, &rhs.0) {
        (ValueRepr::String(s), _) | (_, ValueRepr::String(s)) => {
            let count = match (as_num(lhs), as_num(rhs)) {
                (Some(Num::Int(count)), _) | (_, Some(Num::Int(count))) => count,
                _ => return Err(unsupported("*", lhs, rhs)),
            };
            let count = ok!(repeat_count(s.len(), count));
            Ok(Value::from(s.repeat(count)))
        }
        (ValueRepr::List(items), _) | (_, ValueRepr::List(items)) => {
            let count = match (as_num(lhs), as_num(rhs)) {
                (Some(Num::Int(count)), _) | (_, Some(Num::Int(count))) => count,
                _ => return Err(unsupported("*", lhs, rhs)),
            };
            Ok(Value::from(ok!(repeat(&items[..], count))))
        }
        _ => Err(unsupported("*", lhs, rhs)),
    }
}

/// Implements the `/` operator (true division).
pub fn div(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    let (a, b) = match coerce(lhs, rhs) {
        Some(CoerceResult::I64(a, b)) => (a as f64, b as f64),
        Some(CoerceResult::F64(a, b)) => (a, b),
        None => return Err(unsupported("/", lhs, rhs)),
    };
    if b == 0.0 {
        Err(division_by_zero())
    } else {
        Ok(Value::from(a / b))
    }
}

/// Implements the `//` operator.
pub fn int_div(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    match coerce(lhs, rhs) {
        Some(CoerceResult::I64(_, 0)) => Err(division_by_zero()),
        Some(CoerceResult::I64(a, b)) => {
            let q = ok!(a.checked_div(b).ok_or_else(overflow));
            // python rounds towards negative infinity
            if (a % b != 0) && ((a < 0) != (b < 0)) {
                Ok(Value::from(q - 1))
            } else {
                Ok(Value::from(q))
            }
        }
        Some(CoerceResult::F64(_, b)) if b == 0.0 => Err(division_by_zero()),
        Some(CoerceResult::F64(a, b)) => Ok(Value::from((a / b).floor())),
        None => Err(unsupported("//", lhs, rhs)),
    }
}

/// Implements the `%` operator.
///
/// The result has the sign of the divisor.
pub fn rem(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    match coerce(lhs, rhs) {
        Some(CoerceResult::I64(_, 0)) => Err(division_by_zero()),
        Some(CoerceResult::I64(a, b)) => {
            let r = ok!(a.checked_rem(b).ok_or_else(overflow));
            if r != 0 && ((r < 0) != (b < 0)) {
                Ok(Value::from(r + b))
            } else {
                Ok(Value::from(r))
            }
        }
        Some(CoerceResult::F64(_, b)) if b == 0.0 => Err(division_by_zero()),
        Some(CoerceResult::F64(a, b)) => Ok(Value::from(a - b * (a / b).floor())),
        None => Err(unsupported("%", lhs, rhs)),
    }
}

/// Implements the `**` operator.
pub fn pow(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    match coerce(lhs, rhs) {
        Some(CoerceResult::I64(a, b)) if b >= 0 => {
            let exp = ok!(u32::try_from(b).map_err(|_| overflow()));
            a.checked_pow(exp).map(Value::from).ok_or_else(overflow)
        }
        Some(CoerceResult::I64(0, _)) => Err(zero_to_negative_power()),
        Some(CoerceResult::I64(a, b)) => Ok(Value::from((a as f64).powf(b as f64))),
        Some(CoerceResult::F64(a, b)) if a == 0.0 && b < 0.0 => Err(zero_to_negative_power()),
        Some(CoerceResult::F64(a, b)) => Ok(Value::from(a.powf(b))),
        None => Err(unsupported("**", lhs, rhs)),
    }
}

/// Implements the unary `-` operator.
pub fn neg(value: &Value) -> Result<Value, Error> {
    match as_num(value) {
        Some(Num::Int(val)) => val.checked_neg().map(Value::from).ok_or_else(overflow),
        Some(Num::Float(val)) => Ok(Value::from(-val)),
        None => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("bad operand type for unary -: '{}'", value.kind()),
        )),
    }
}

/// Implements the unary `+` operator.
pub fn pos(value: &Value) -> Result<Value, Error> {
    match as_num(value) {
        Some(Num::Int(val)) => Ok(Value::from(val)),
        Some(Num::Float(val)) => Ok(Value::from(val)),
        None => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("bad operand type for unary +: '{}'", value.kind()),
        )),
    }
}

/// Python equality.
pub fn eq(lhs: &Value, rhs: &Value) -> bool {
    if let Some(coerced) = coerce(lhs, rhs) {
        return match coerced {
            CoerceResult::I64(a, b) => a == b,
            CoerceResult::F64(a, b) => a == b,
        };
    }
    match (&lhs.0, &rhs.0) {
        (ValueRepr::None, ValueRepr::None) => true,
        (ValueRepr::String(a), ValueRepr::String(b)) => a == b,
        (ValueRepr::List(a), ValueRepr::List(b)) => {
            Arc::ptr_eq(a, b) || (a.len() == b.len() && a.iter().zip(b.iter()).all(|(a, b)| eq(a, b)))
        }
        (ValueRepr::Map(a), ValueRepr::Map(b)) => {
            Arc::ptr_eq(a, b)
                || (a.len() == b.len()
                    && a.iter().all(|(k, v)| b.get(k.as_str()).map_or(false, |o| eq(v, o))))
        }
        _ => false,
    }
}

/// Python ordering for `<`, `<=`, `>` and `>=`.
///
/// `op` is only used for the error message.
pub fn cmp(lhs: &Value, rhs: &Value, op: &str) -> Result<Ordering, Error> {
    let rv = match coerce(lhs, rhs) {
        Some(CoerceResult::I64(a, b)) => Some(a.cmp(&b)),
        Some(CoerceResult::F64(a, b)) => a.partial_cmp(&b),
        None => match (&lhs.0, &rhs.0) {
            (ValueRepr::String(a), ValueRepr::String(b)) => Some(a.cmp(b)),
            (ValueRepr::List(a), ValueRepr::List(b)) => {
                for (a, b) in a.iter().zip(b.iter()) {
                    if !eq(a, b) {
                        return cmp(a, b, op);
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => None,
        },
    };
    rv.ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!(
                "'{}' not supported between instances of '{}' and '{}'",
                op,
                lhs.kind(),
                rhs.kind()
            ),
        )
    })
}

/// Implements the `in` operator.
pub fn contains(container: &Value, item: &Value) -> Result<bool, Error> {
    match container.0 {
        ValueRepr::String(ref s) => match item.as_str() {
            Some(needle) => Ok(s.contains(needle)),
            None => Err(Error::new(
                ErrorKind::InvalidOperation,
                format!(
                    "'in <string>' requires string as left operand, not {}",
                    item.kind()
                ),
            )),
        },
        ValueRepr::List(ref items) => Ok(items.iter().any(|x| eq(x, item))),
        ValueRepr::Map(ref map) => Ok(item.as_str().map_or(false, |key| map.contains_key(key))),
        _ => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("argument of type '{}' is not iterable", container.kind()),
        )),
    }
}
