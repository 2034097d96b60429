//! Builtin functions.
//!
//! Templates can call a fixed set of global functions modelled after their
//! Python counterparts:
//!
//! ```text
//! {% for idx, item in enumerate(items, 1) %}{{ idx }}: {{ item }}{% endfor %}
//! {{ len(users) }} users, {{ sum([1, 2, 3]) }}, {{ sorted(names, reverse=True) }}
//! ```
//!
//! The available functions are `len`, `range`, `str`, `int`, `float`,
//! `bool`, `abs`, `min`, `max`, `sum`, `sorted`, `reversed`, `enumerate`,
//! `zip`, `list`, `dict`, `round` and `safe_html`.
use std::cmp::Ordering;

use crate::error::{Error, ErrorKind};
use crate::utils::safe_html;
use crate::value::{ops, Value, ValueKind, ValueMap, ValueRepr};

/// The largest sequence `range` will produce.
const MAX_RANGE: usize = 100_000;

/// Evaluated arguments of a function or method call.
pub(crate) struct Args<'a> {
    name: &'a str,
    pos: Vec<Value>,
    kwargs: Vec<(String, Value)>,
}

impl<'a> Args<'a> {
    pub fn new(name: &'a str, pos: Vec<Value>, kwargs: Vec<(String, Value)>) -> Args<'a> {
        Args { name, pos, kwargs }
    }

    fn error(&self, msg: impl std::fmt::Display) -> Error {
        Error::new(ErrorKind::InvalidArguments, format!("{}() {}", self.name, msg))
    }

    /// Rejects surplus positional arguments and unknown keyword arguments.
    ///
    /// `names` lists the parameters in positional order.
    pub fn check(&self, min: usize, names: &[&str]) -> Result<(), Error> {
        if self.pos.len() > names.len() {
            return Err(self.error(format_args!(
                "takes at most {} argument{} ({} given)",
                names.len(),
                if names.len() == 1 { "" } else { "s" },
                self.pos.len()
            )));
        }
        for (key, _) in &self.kwargs {
            match names.iter().position(|x| *x == key.as_str()) {
                None => {
                    return Err(self.error(format_args!(
                        "got an unexpected keyword argument '{key}'"
                    )))
                }
                Some(idx) if idx < self.pos.len() => {
                    return Err(self.error(format_args!("got multiple values for argument '{key}'")))
                }
                Some(_) => {}
            }
        }
        if let Some(missing) = names.iter().take(min).enumerate().find_map(|(idx, name)| {
            self.get(idx, name).is_none().then_some(name)
        }) {
            return Err(self.error(format_args!("missing required argument '{missing}'")));
        }
        Ok(())
    }

    /// Returns the argument at position `idx` or the keyword argument `name`.
    pub fn get(&self, idx: usize, name: &str) -> Option<&Value> {
        self.pos.get(idx).or_else(|| {
            self.kwargs
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value)
        })
    }

    /// Like [`get`](Self::get) but treats `None` as missing.
    pub fn get_opt(&self, idx: usize, name: &str) -> Option<&Value> {
        self.get(idx, name).filter(|x| !x.is_none())
    }

    pub fn required(&self, idx: usize, name: &str) -> Result<&Value, Error> {
        self.get(idx, name)
            .ok_or_else(|| self.error(format_args!("missing required argument '{name}'")))
    }

    pub fn required_str(&self, idx: usize, name: &str) -> Result<&str, Error> {
        let value = ok!(self.required(idx, name));
        value.as_str().ok_or_else(|| {
            self.error(format_args!(
                "argument '{}' must be str, not {}",
                name,
                value.kind()
            ))
        })
    }

    pub fn opt_int(&self, idx: usize, name: &str) -> Result<Option<i64>, Error> {
        match self.get_opt(idx, name) {
            None => Ok(None),
            Some(value) => match value.0 {
                ValueRepr::Int(val) => Ok(Some(val)),
                ValueRepr::Bool(val) => Ok(Some(val as i64)),
                _ => Err(self.error(format_args!(
                    "argument '{}' must be int, not {}",
                    name,
                    value.kind()
                ))),
            },
        }
    }

    pub fn positional(&self) -> &[Value] {
        &self.pos
    }

    pub fn kwargs(&self) -> &[(String, Value)] {
        &self.kwargs
    }
}

/// Calls a builtin function by name.
pub(crate) fn call_function(name: &str, args: Args<'_>) -> Result<Value, Error> {
    match name {
        "len" => len(args),
        "range" => range(args),
        "str" => {
            ok!(args.check(0, &["object"]));
            let rv = args.get(0, "object").map(|x| x.to_string());
            Ok(Value::from(rv.unwrap_or_default()))
        }
        "int" => int(args),
        "float" => float(args),
        "bool" => {
            ok!(args.check(0, &["x"]));
            Ok(Value::from(args.get(0, "x").map_or(false, |x| x.is_true())))
        }
        "abs" => abs(args),
        "min" => min_max(args, Ordering::Less),
        "max" => min_max(args, Ordering::Greater),
        "sum" => sum(args),
        "sorted" => sorted(args),
        "reversed" => {
            ok!(args.check(1, &["sequence"]));
            let mut items = ok!(iterate(ok!(args.required(0, "sequence"))));
            items.reverse();
            Ok(Value::from(items))
        }
        "enumerate" => enumerate(args),
        "zip" => zip(args),
        "list" => {
            ok!(args.check(0, &["iterable"]));
            match args.get(0, "iterable") {
                Some(iterable) => iterate(iterable).map(Value::from),
                None => Ok(Value::from(Vec::<Value>::new())),
            }
        }
        "dict" => dict(args),
        "round" => round(args),
        "safe_html" => {
            ok!(args.check(1, &["value"]));
            Ok(Value::from(safe_html(ok!(args.required(0, "value")))))
        }
        _ => Err(Error::new(
            ErrorKind::UnknownFunction,
            format!("name '{name}' is not defined"),
        )),
    }
}

/// Is there a builtin function with that name?
pub(crate) fn is_builtin(name: &str) -> bool {
    matches!(
        name,
        "len"
            | "range"
            | "str"
            | "int"
            | "float"
            | "bool"
            | "abs"
            | "min"
            | "max"
            | "sum"
            | "sorted"
            | "reversed"
            | "enumerate"
            | "zip"
            | "list"
            | "dict"
            | "round"
            | "safe_html"
    )
}

/// Collects the items of an iterable value.
pub(crate) fn iterate(value: &Value) -> Result<Vec<Value>, Error> {
    value.try_iter().map(Iterator::collect)
}

fn len(args: Args<'_>) -> Result<Value, Error> {
    ok!(args.check(1, &["obj"]));
    let value = ok!(args.required(0, "obj"));
    match value.len() {
        Some(len) => Ok(Value::from(len)),
        None => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("object of type '{}' has no len()", value.kind()),
        )),
    }
}

fn range(args: Args<'_>) -> Result<Value, Error> {
    ok!(args.check(1, &["start", "stop", "step"]));
    let first = ok!(args.opt_int(0, "start")).unwrap_or(0);
    let (start, stop) = match ok!(args.opt_int(1, "stop")) {
        Some(stop) => (first, stop),
        None => (0, first),
    };
    let step = ok!(args.opt_int(2, "step")).unwrap_or(1);
    if step == 0 {
        return Err(Error::new(
            ErrorKind::InvalidArguments,
            "range() arg 3 must not be zero",
        ));
    }
    let count = if step > 0 && stop > start {
        (stop as i128 - start as i128 + step as i128 - 1) / step as i128
    } else if step < 0 && stop < start {
        (start as i128 - stop as i128 - step as i128 - 1) / -(step as i128)
    } else {
        0
    };
    if count > MAX_RANGE as i128 {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("range has too many elements (exceeds {MAX_RANGE})"),
        ));
    }
    Ok((0..count as i64)
        .map(|idx| Value::from(start + idx * step))
        .collect())
}

fn int(args: Args<'_>) -> Result<Value, Error> {
    ok!(args.check(0, &["x"]));
    let value = match args.get(0, "x") {
        Some(value) => value,
        None => return Ok(Value::from(0)),
    };
    match value.0 {
        ValueRepr::Int(val) => Ok(Value::from(val)),
        ValueRepr::Bool(val) => Ok(Value::from(val as i64)),
        ValueRepr::Float(val) => {
            if val.is_finite() && val.trunc().abs() < i64::MAX as f64 {
                Ok(Value::from(val.trunc() as i64))
            } else {
                Err(Error::new(
                    ErrorKind::InvalidOperation,
                    format!("cannot convert float {} to integer", value.repr()),
                ))
            }
        }
        ValueRepr::String(ref s) => s
            .trim()
            .replace('_', "")
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| {
                Error::new(
                    ErrorKind::InvalidOperation,
                    format!("invalid literal for int() with base 10: {}", value.repr()),
                )
            }),
        _ => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!(
                "int() argument must be a string or a number, not '{}'",
                value.kind()
            ),
        )),
    }
}

fn float(args: Args<'_>) -> Result<Value, Error> {
    ok!(args.check(0, &["x"]));
    let value = match args.get(0, "x") {
        Some(value) => value,
        None => return Ok(Value::from(0.0)),
    };
    if let Some(val) = value.as_f64() {
        return Ok(Value::from(val));
    }
    match value.as_str() {
        Some(s) => s.trim().parse::<f64>().map(Value::from).map_err(|_| {
            Error::new(
                ErrorKind::InvalidOperation,
                format!("could not convert string to float: {}", value.repr()),
            )
        }),
        None => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!(
                "float() argument must be a string or a number, not '{}'",
                value.kind()
            ),
        )),
    }
}

fn abs(args: Args<'_>) -> Result<Value, Error> {
    ok!(args.check(1, &["x"]));
    let value = ok!(args.required(0, "x"));
    match value.0 {
        ValueRepr::Int(val) => val
            .checked_abs()
            .map(Value::from)
            .ok_or_else(|| Error::new(ErrorKind::InvalidOperation, "integer overflow")),
        ValueRepr::Bool(val) => Ok(Value::from(val as i64)),
        ValueRepr::Float(val) => Ok(Value::from(val.abs())),
        _ => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("bad operand type for abs(): '{}'", value.kind()),
        )),
    }
}

fn min_max(args: Args<'_>, wanted: Ordering) -> Result<Value, Error> {
    let name = if wanted == Ordering::Less { "min" } else { "max" };
    if !args.kwargs().is_empty() {
        ok!(args.check(0, &["iterable", "default"]));
    }
    let items = match args.positional() {
        [] => {
            return Err(Error::new(
                ErrorKind::InvalidArguments,
                format!("{name} expected at least 1 argument, got 0"),
            ))
        }
        [iterable] => ok!(iterate(iterable)),
        many => many.to_vec(),
    };
    let mut iter = items.into_iter();
    let mut rv = match iter.next() {
        Some(first) => first,
        None => {
            return match args.get(1, "default") {
                Some(default) => Ok(default.clone()),
                None => Err(Error::new(
                    ErrorKind::InvalidOperation,
                    format!("{name}() arg is an empty sequence"),
                )),
            }
        }
    };
    for item in iter {
        if ok!(ops::cmp(&item, &rv, if wanted == Ordering::Less { "<" } else { ">" })) == wanted {
            rv = item;
        }
    }
    Ok(rv)
}

fn sum(args: Args<'_>) -> Result<Value, Error> {
    ok!(args.check(1, &["iterable", "start"]));
    let mut rv = args.get(1, "start").cloned().unwrap_or(Value::from(0));
    if rv.kind() == ValueKind::String {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            "sum() can't sum strings [use ''.join(seq) instead]",
        ));
    }
    for item in ok!(iterate(ok!(args.required(0, "iterable")))) {
        rv = ok!(ops::add(&rv, &item));
    }
    Ok(rv)
}

/// Sorts values, reporting the first comparison error.
pub(crate) fn sort_values(items: &mut [Value]) -> Result<(), Error> {
    let mut err = None;
    items.sort_by(|a, b| match ops::cmp(a, b, "<") {
        Ok(ordering) => ordering,
        Err(e) => {
            err.get_or_insert(e);
            Ordering::Equal
        }
    });
    match err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn sorted(args: Args<'_>) -> Result<Value, Error> {
    ok!(args.check(1, &["iterable", "reverse"]));
    let mut items = ok!(iterate(ok!(args.required(0, "iterable"))));
    ok!(sort_values(&mut items));
    if args.get(1, "reverse").map_or(false, |x| x.is_true()) {
        items.reverse();
    }
    Ok(Value::from(items))
}

fn enumerate(args: Args<'_>) -> Result<Value, Error> {
    ok!(args.check(1, &["iterable", "start"]));
    let start = ok!(args.opt_int(1, "start")).unwrap_or(0);
    let items = ok!(iterate(ok!(args.required(0, "iterable"))));
    Ok(items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| Value::from(vec![Value::from(start + idx as i64), item]))
        .collect())
}

fn zip(args: Args<'_>) -> Result<Value, Error> {
    if let Some((key, _)) = args.kwargs().first() {
        return Err(args.error(format_args!("got an unexpected keyword argument '{key}'")));
    }
    let columns = ok!(args
        .positional()
        .iter()
        .map(iterate)
        .collect::<Result<Vec<_>, _>>());
    let len = columns.iter().map(Vec::len).min().unwrap_or(0);
    Ok((0..len)
        .map(|idx| Value::from(columns.iter().map(|col| col[idx].clone()).collect::<Vec<_>>()))
        .collect())
}

fn dict(args: Args<'_>) -> Result<Value, Error> {
    if args.positional().len() > 1 {
        return Err(args.error(format_args!(
            "expected at most 1 argument, got {}",
            args.positional().len()
        )));
    }
    let mut rv = Value::from(ValueMap::new());
    if let Some(value) = args.positional().first() {
        if let Some(map) = value.as_map() {
            rv = Value::from(map.clone());
        } else {
            for (idx, pair) in ok!(iterate(value)).into_iter().enumerate() {
                match pair.as_slice() {
                    Some([key, value]) => ok!(rv.set_item(key, value.clone())),
                    _ => {
                        return Err(Error::new(
                            ErrorKind::InvalidOperation,
                            format!(
                                "dictionary update sequence element #{idx} has the wrong shape"
                            ),
                        ))
                    }
                }
            }
        }
    }
    for (key, value) in args.kwargs() {
        ok!(rv.set_item(&Value::from(key.as_str()), value.clone()));
    }
    Ok(rv)
}

/// Rounds half to even like Python does.
fn round_half_even(val: f64) -> f64 {
    let rounded = val.round();
    if (val - val.trunc()).abs() == 0.5 {
        2.0 * (val / 2.0).round()
    } else {
        rounded
    }
}

/// With more digits than this every finite float is returned unchanged.
const ROUND_DIGITS_MAX: i64 = 323;
/// With fewer digits than this every finite float rounds to zero.
const ROUND_DIGITS_MIN: i64 = -308;

fn round_to_digits(val: f64, digits: i64) -> f64 {
    if !val.is_finite() || digits > ROUND_DIGITS_MAX {
        val
    } else if digits < ROUND_DIGITS_MIN {
        0.0 * val
    } else if digits == 0 {
        round_half_even(val)
    } else if digits > 0 {
        // formatting works on the exact binary value, so 2.675 (stored as
        // 2.67499...) rounds down
        format!("{:.*}", digits as usize, val).parse().unwrap_or(val)
    } else {
        let factor = 10f64.powi(-digits as i32);
        round_half_even(val / factor) * factor
    }
}

fn round(args: Args<'_>) -> Result<Value, Error> {
    ok!(args.check(1, &["number", "ndigits"]));
    let value = ok!(args.required(0, "number"));
    let ndigits = ok!(args.opt_int(1, "ndigits"));
    match (&value.0, ndigits) {
        (ValueRepr::Int(_) | ValueRepr::Bool(_), _) => Ok(Value::from(value.as_i64())),
        (ValueRepr::Float(val), None) => {
            let rounded = round_half_even(*val);
            if rounded.is_finite() && rounded.abs() < i64::MAX as f64 {
                Ok(Value::from(rounded as i64))
            } else {
                Err(Error::new(
                    ErrorKind::InvalidOperation,
                    format!("cannot convert float {} to integer", value.repr()),
                ))
            }
        }
        (ValueRepr::Float(val), Some(digits)) => Ok(Value::from(round_to_digits(*val, digits))),
        _ => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("type {} doesn't define __round__ method", value.kind()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    fn call(name: &str, pos: Vec<Value>) -> Result<Value, Error> {
        call_function(name, Args::new(name, pos, Vec::new()))
    }

    #[test]
    fn test_range() {
        assert_eq!(call("range", vec![Value::from(3)]).unwrap().to_string(), "[0, 1, 2]");
        assert_eq!(
            call("range", vec![Value::from(5), Value::from(0), Value::from(-2)])
                .unwrap()
                .to_string(),
            "[5, 3, 1]"
        );
        assert_eq!(
            call("range", vec![Value::from(1), Value::from(1)]).unwrap().to_string(),
            "[]"
        );
        let err = call("range", vec![Value::from(1_000_000)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        let err = call("range", vec![Value::from(1), Value::from(2), Value::from(0)]).unwrap_err();
        assert_eq!(err.detail(), Some("range() arg 3 must not be zero"));
    }

    #[test]
    fn test_conversions() {
        assert_eq!(call("int", vec![Value::from(" 42 ")]).unwrap(), Value::from(42));
        assert_eq!(call("int", vec![Value::from(-2.7)]).unwrap(), Value::from(-2));
        assert_eq!(
            call("int", vec![Value::from("x")]).unwrap_err().detail(),
            Some("invalid literal for int() with base 10: 'x'")
        );
        assert_eq!(call("float", vec![Value::from("1.5")]).unwrap(), Value::from(1.5));
        assert_eq!(call("str", vec![Value::from(1.0)]).unwrap(), Value::from("1.0"));
        assert_eq!(call("bool", vec![Value::from("")]).unwrap(), Value::from(false));
        assert_eq!(call("round", vec![Value::from(2.5)]).unwrap(), Value::from(2));
        assert_eq!(call("round", vec![Value::from(3.5)]).unwrap(), Value::from(4));
        assert_eq!(
            call("round", vec![Value::from(1.2345), Value::from(2)]).unwrap(),
            Value::from(1.23)
        );
    }

    #[test]
    fn test_round_digits() {
        let round = |val: f64, digits: i64| {
            call("round", vec![Value::from(val), Value::from(digits)]).unwrap()
        };
        assert_eq!(round(2.675, 2), Value::from(2.67));
        assert_eq!(round(2.5, 0), Value::from(2.0));
        assert_eq!(round(-0.125, 1), Value::from(-0.1));
        assert_eq!(round(1234.5, -2), Value::from(1200.0));
        assert_eq!(round(1e300, 400), Value::from(1e300));
        assert_eq!(round(1e300, 300), Value::from(1e300));
        assert_eq!(round(1e300, -400), Value::from(0.0));
        assert_eq!(round(f64::INFINITY, 2), Value::from(f64::INFINITY));
    }

    #[test]
    fn test_aggregates() {
        let items = Value::from(vec![3, 1, 2]);
        assert_eq!(call("min", vec![items.clone()]).unwrap(), Value::from(1));
        assert_eq!(call("max", vec![Value::from(1), Value::from(5)]).unwrap(), Value::from(5));
        assert_eq!(call("sum", vec![items.clone()]).unwrap(), Value::from(6));
        assert_eq!(call("sorted", vec![items.clone()]).unwrap().to_string(), "[1, 2, 3]");
        assert_eq!(
            call_function(
                "sorted",
                Args::new("sorted", vec![items.clone()], vec![("reverse".into(), Value::from(true))])
            )
            .unwrap()
            .to_string(),
            "[3, 2, 1]"
        );
        assert_eq!(call("reversed", vec![items]).unwrap().to_string(), "[2, 1, 3]");
        assert_eq!(
            call("min", vec![Value::from(Vec::<i32>::new())]).unwrap_err().detail(),
            Some("min() arg is an empty sequence")
        );
        assert!(call("sorted", vec![Value::from(vec![Value::from(1), Value::from("a")])]).is_err());
    }

    #[test]
    fn test_sequences() {
        assert_eq!(
            call("enumerate", vec![Value::from("ab")]).unwrap().to_string(),
            "[[0, 'a'], [1, 'b']]"
        );
        assert_eq!(
            call("zip", vec![Value::from(vec![1, 2, 3]), Value::from("ab")])
                .unwrap()
                .to_string(),
            "[[1, 'a'], [2, 'b']]"
        );
        assert_eq!(
            call("dict", vec![Value::from(vec![Value::from(vec!["a", "b"])])])
                .unwrap()
                .to_string(),
            "{'a': 'b'}"
        );
        assert_eq!(call("len", vec![Value::from("häh")]).unwrap(), Value::from(3));
        assert_eq!(
            call("len", vec![Value::from(1)]).unwrap_err().detail(),
            Some("object of type 'int' has no len()")
        );
    }

    #[test]
    fn test_bad_arguments() {
        let err = call("len", vec![]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArguments);
        assert_eq!(err.detail(), Some("len() missing required argument 'obj'"));
        let err = call("len", vec![Value::from(1), Value::from(2)]).unwrap_err();
        assert_eq!(err.detail(), Some("len() takes at most 1 argument (2 given)"));
        let err = call_function(
            "sorted",
            Args::new("sorted", vec![Value::from("a")], vec![("key".into(), Value::NONE)]),
        )
        .unwrap_err();
        assert_eq!(err.detail(), Some("sorted() got an unexpected keyword argument 'key'"));
        let err = call("nope", vec![]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownFunction);
    }
}
