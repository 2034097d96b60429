//! Provides a dynamic value type abstraction.
//!
//! This module gives access to a dynamically typed value which is used by
//! the template engine during execution.  Values follow the semantics of
//! their Python counterparts: `None`, booleans, integers, floats, strings,
//! lists and dicts with string keys.
//!
//! # Converting Values
//!
//! Values are typically created via the [`From`] trait:
//!
//! ```
//! # use templateengine::value::Value;
//! let int_value = Value::from(42);
//! let none_value = Value::from(());
//! let list_value = Value::from(vec![1, 2, 3]);
//! ```
//!
//! Any type implementing [`Serialize`](serde::Serialize) can be converted
//! with [`Value::from_serialize`], which is also what the render functions
//! do with the context passed to them.
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, ErrorKind};

pub(crate) mod ops;
mod serialize;

pub use self::serialize::ValueSerializer;

/// The map type used by values.
///
/// With the `preserve_order` feature this is an insertion ordered
/// `IndexMap`, otherwise a `BTreeMap` sorted by key.
#[cfg(feature = "preserve_order")]
pub type ValueMap = indexmap::IndexMap<String, Value>;

/// The map type used by values.
///
/// With the `preserve_order` feature this is an insertion ordered
/// `IndexMap`, otherwise a `BTreeMap` sorted by key.
#[cfg(not(feature = "preserve_order"))]
pub type ValueMap = BTreeMap<String, Value>;

#[inline(always)]
pub(crate) fn value_map_with_capacity(capacity: usize) -> ValueMap {
    #[cfg(not(feature = "preserve_order"))]
    {
        let _ = capacity;
        ValueMap::new()
    }
    #[cfg(feature = "preserve_order")]
    {
        ValueMap::with_capacity(capacity)
    }
}

#[inline(always)]
pub(crate) fn value_map_remove(map: &mut ValueMap, key: &str) -> Option<Value> {
    #[cfg(not(feature = "preserve_order"))]
    {
        map.remove(key)
    }
    #[cfg(feature = "preserve_order")]
    {
        map.shift_remove(key)
    }
}

/// Describes the kind of value.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValueKind {
    /// The value is `None`.
    None,
    /// The value is a bool
    Bool,
    /// The value is an integer.
    Int,
    /// The value is a float.
    Float,
    /// The value is a string.
    String,
    /// The value is a list of values.
    List,
    /// The value is a key/value mapping.
    Map,
}

impl ValueKind {
    /// Returns the Python type name for this kind.
    pub fn type_name(self) -> &'static str {
        match self {
            ValueKind::None => "NoneType",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::String => "str",
            ValueKind::List => "list",
            ValueKind::Map => "dict",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

#[derive(Clone)]
pub(crate) enum ValueRepr {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Arc<str>),
    List(Arc<Vec<Value>>),
    Map(Arc<ValueMap>),
}

/// Represents a dynamically typed value in the template engine.
#[derive(Clone)]
pub struct Value(pub(crate) ValueRepr);

impl Default for Value {
    fn default() -> Value {
        Value::NONE
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.repr(), f)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        ops::eq(self, other)
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        ops::cmp(self, other, "<").ok()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            ValueRepr::String(ref s) => f.write_str(s),
            _ => fmt::Display::fmt(&self.repr(), f),
        }
    }
}

/// Formats a float the way Python's `repr` does.
fn fmt_float(f: &mut fmt::Formatter<'_>, val: f64) -> fmt::Result {
    if val.is_nan() {
        return f.write_str("nan");
    } else if val.is_infinite() {
        return f.write_str(if val > 0.0 { "inf" } else { "-inf" });
    }
    let sci = format!("{val:e}");
    let (mantissa, exp) = match sci.split_once('e') {
        Some((mantissa, exp)) => (mantissa, exp.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };
    if (-4..16).contains(&exp) {
        if val.fract() == 0.0 {
            write!(f, "{val:.1}")
        } else {
            write!(f, "{val}")
        }
    } else {
        let sign = if exp < 0 { '-' } else { '+' };
        write!(f, "{}e{}{:02}", mantissa, sign, exp.unsigned_abs())
    }
}

fn fmt_str_repr(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    ok!(write!(f, "{quote}"));
    for c in s.chars() {
        match c {
            '\\' => ok!(f.write_str("\\\\")),
            '\n' => ok!(f.write_str("\\n")),
            '\r' => ok!(f.write_str("\\r")),
            '\t' => ok!(f.write_str("\\t")),
            c if c == quote => ok!(write!(f, "\\{c}")),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => ok!(write!(f, "\\x{:02x}", c as u32)),
            c => ok!(write!(f, "{c}")),
        }
    }
    write!(f, "{quote}")
}

/// Displays a value the way Python's `repr` does.
pub struct ReprDisplay<'a>(&'a Value);

impl<'a> fmt::Display for ReprDisplay<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 .0 {
            ValueRepr::None => f.write_str("None"),
            ValueRepr::Bool(true) => f.write_str("True"),
            ValueRepr::Bool(false) => f.write_str("False"),
            ValueRepr::Int(val) => write!(f, "{val}"),
            ValueRepr::Float(val) => fmt_float(f, val),
            ValueRepr::String(ref s) => fmt_str_repr(f, s),
            ValueRepr::List(ref items) => {
                ok!(f.write_str("["));
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        ok!(f.write_str(", "));
                    }
                    ok!(write!(f, "{}", item.repr()));
                }
                f.write_str("]")
            }
            ValueRepr::Map(ref map) => {
                ok!(f.write_str("{"));
                for (idx, (key, value)) in map.iter().enumerate() {
                    if idx > 0 {
                        ok!(f.write_str(", "));
                    }
                    ok!(fmt_str_repr(f, key));
                    ok!(write!(f, ": {}", value.repr()));
                }
                f.write_str("}")
            }
        }
    }
}

impl Value {
    /// The `None` value.
    pub const NONE: Value = Value(ValueRepr::None);

    /// Creates a value from something that can be serialized.
    ///
    /// Values that fail to serialize become `None`.  Use
    /// [`try_from_serialize`](Self::try_from_serialize) to observe the error.
    pub fn from_serialize<T: serde::Serialize + ?Sized>(value: &T) -> Value {
        Value::try_from_serialize(value).unwrap_or_default()
    }

    /// Creates a value from something that can be serialized.
    pub fn try_from_serialize<T: serde::Serialize + ?Sized>(value: &T) -> Result<Value, Error> {
        value.serialize(ValueSerializer::new())
    }

    /// Returns the kind of the value.
    pub fn kind(&self) -> ValueKind {
        match self.0 {
            ValueRepr::None => ValueKind::None,
            ValueRepr::Bool(_) => ValueKind::Bool,
            ValueRepr::Int(_) => ValueKind::Int,
            ValueRepr::Float(_) => ValueKind::Float,
            ValueRepr::String(_) => ValueKind::String,
            ValueRepr::List(_) => ValueKind::List,
            ValueRepr::Map(_) => ValueKind::Map,
        }
    }

    /// Returns an object that displays the value like Python's `repr`.
    pub fn repr(&self) -> ReprDisplay<'_> {
        ReprDisplay(self)
    }

    /// Is this value considered true?
    pub fn is_true(&self) -> bool {
        match self.0 {
            ValueRepr::None => false,
            ValueRepr::Bool(val) => val,
            ValueRepr::Int(val) => val != 0,
            ValueRepr::Float(val) => val != 0.0,
            ValueRepr::String(ref s) => !s.is_empty(),
            ValueRepr::List(ref items) => !items.is_empty(),
            ValueRepr::Map(ref map) => !map.is_empty(),
        }
    }

    /// Is this value `None`?
    pub fn is_none(&self) -> bool {
        matches!(self.0, ValueRepr::None)
    }

    /// If the value is a string, return it.
    pub fn as_str(&self) -> Option<&str> {
        match self.0 {
            ValueRepr::String(ref s) => Some(s),
            _ => None,
        }
    }

    /// If the value is an integer (or bool), return it.
    pub fn as_i64(&self) -> Option<i64> {
        match self.0 {
            ValueRepr::Int(val) => Some(val),
            ValueRepr::Bool(val) => Some(val as i64),
            _ => None,
        }
    }

    /// If the value is numeric, return it as float.
    pub fn as_f64(&self) -> Option<f64> {
        match self.0 {
            ValueRepr::Int(val) => Some(val as f64),
            ValueRepr::Bool(val) => Some(val as i64 as f64),
            ValueRepr::Float(val) => Some(val),
            _ => None,
        }
    }

    /// If the value is a list, return it as slice.
    pub fn as_slice(&self) -> Option<&[Value]> {
        match self.0 {
            ValueRepr::List(ref items) => Some(&items[..]),
            _ => None,
        }
    }

    /// If the value is a map, return it.
    pub fn as_map(&self) -> Option<&ValueMap> {
        match self.0 {
            ValueRepr::Map(ref map) => Some(map),
            _ => None,
        }
    }

    /// If the value is a list, return it mutably.
    ///
    /// Shared lists are copied before they are handed out.
    pub(crate) fn as_list_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self.0 {
            ValueRepr::List(ref mut items) => Some(Arc::make_mut(items)),
            _ => None,
        }
    }

    /// If the value is a map, return it mutably.
    pub(crate) fn as_map_mut(&mut self) -> Option<&mut ValueMap> {
        match self.0 {
            ValueRepr::Map(ref mut map) => Some(Arc::make_mut(map)),
            _ => None,
        }
    }

    /// Returns the length of strings, lists and maps.
    pub fn len(&self) -> Option<usize> {
        match self.0 {
            ValueRepr::String(ref s) => Some(s.chars().count()),
            ValueRepr::List(ref items) => Some(items.len()),
            ValueRepr::Map(ref map) => Some(map.len()),
            _ => None,
        }
    }

    /// Looks up a key in a map value.
    pub fn get_attr(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Looks up an index or key, following Python's subscript rules.
    pub fn get_item(&self, key: &Value) -> Result<Value, Error> {
        match self.0 {
            ValueRepr::List(ref items) => {
                let idx = ok!(sequence_index(key, items.len(), "list"));
                Ok(items[idx].clone())
            }
            ValueRepr::String(ref s) => {
                let len = s.chars().count();
                let idx = ok!(sequence_index(key, len, "string"));
                Ok(s.chars().nth(idx).map(Value::from).unwrap_or_default())
            }
            ValueRepr::Map(ref map) => {
                let name = ok!(map_key(key));
                match map.get(name.as_str()) {
                    Some(value) => Ok(value.clone()),
                    None => Err(Error::new(
                        ErrorKind::UndefinedError,
                        format!("key {} does not exist", key.repr()),
                    )),
                }
            }
            _ => Err(Error::new(
                ErrorKind::InvalidOperation,
                format!("'{}' object is not subscriptable", self.kind()),
            )),
        }
    }

    /// Returns a mutable reference to an existing item.
    pub(crate) fn get_item_mut(&mut self, key: &Value) -> Result<&mut Value, Error> {
        let kind = self.kind();
        match self.0 {
            ValueRepr::List(ref mut items) => {
                let idx = ok!(sequence_index(key, items.len(), "list"));
                Ok(&mut Arc::make_mut(items)[idx])
            }
            ValueRepr::Map(ref mut map) => {
                let name = ok!(map_key(key));
                Arc::make_mut(map).get_mut(name.as_str()).ok_or_else(|| {
                    Error::new(
                        ErrorKind::UndefinedError,
                        format!("key {} does not exist", key.repr()),
                    )
                })
            }
            _ => Err(Error::new(
                ErrorKind::InvalidOperation,
                format!("'{kind}' object does not support item assignment"),
            )),
        }
    }

    /// Assigns an item: replaces a list element or inserts into a map.
    pub(crate) fn set_item(&mut self, key: &Value, value: Value) -> Result<(), Error> {
        if let ValueRepr::Map(ref mut map) = self.0 {
            let name = ok!(map_key(key));
            Arc::make_mut(map).insert(name, value);
            Ok(())
        } else {
            *ok!(self.get_item_mut(key)) = value;
            Ok(())
        }
    }

    /// Slices strings and lists like Python's `value[start:stop:step]`.
    pub fn slice(
        &self,
        start: Option<i64>,
        stop: Option<i64>,
        step: Option<i64>,
    ) -> Result<Value, Error> {
        let step = step.unwrap_or(1);
        if step == 0 {
            return Err(Error::new(
                ErrorKind::InvalidOperation,
                "slice step cannot be zero",
            ));
        }
        match self.0 {
            ValueRepr::List(ref items) => Ok(Value::from(
                slice_indices(items.len(), start, stop, step)
                    .map(|idx| items[idx].clone())
                    .collect::<Vec<_>>(),
            )),
            ValueRepr::String(ref s) => {
                let chars = s.chars().collect::<Vec<_>>();
                Ok(Value::from(
                    slice_indices(chars.len(), start, stop, step)
                        .map(|idx| chars[idx])
                        .collect::<String>(),
                ))
            }
            _ => Err(Error::new(
                ErrorKind::InvalidOperation,
                format!("'{}' object is not subscriptable", self.kind()),
            )),
        }
    }

    /// Iterates over the value.
    ///
    /// Lists yield their items, strings their characters and maps their keys.
    pub fn try_iter(&self) -> Result<ValueIter, Error> {
        let items = match self.0 {
            ValueRepr::List(ref items) => items.iter().cloned().collect::<Vec<_>>(),
            ValueRepr::String(ref s) => s.chars().map(Value::from).collect(),
            ValueRepr::Map(ref map) => map.keys().map(|k| Value::from(k.as_str())).collect(),
            _ => {
                return Err(Error::new(
                    ErrorKind::InvalidOperation,
                    format!("'{}' object is not iterable", self.kind()),
                ))
            }
        };
        Ok(ValueIter {
            inner: items.into_iter(),
        })
    }
}

/// Resolves a (possibly negative) index into a sequence.
fn sequence_index(key: &Value, len: usize, type_name: &str) -> Result<usize, Error> {
    let idx = match key.0 {
        ValueRepr::Int(idx) => idx,
        ValueRepr::Bool(val) => val as i64,
        _ => {
            return Err(Error::new(
                ErrorKind::InvalidOperation,
                format!("{} indices must be integers, not {}", type_name, key.kind()),
            ))
        }
    };
    let resolved = if idx < 0 { idx + len as i64 } else { idx };
    if resolved < 0 || resolved >= len as i64 {
        Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("{type_name} index out of range"),
        ))
    } else {
        Ok(resolved as usize)
    }
}

fn map_key(key: &Value) -> Result<String, Error> {
    match key.0 {
        ValueRepr::String(ref s) => Ok(s.to_string()),
        ValueRepr::Int(_) | ValueRepr::Bool(_) => Ok(key.to_string()),
        _ => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("unhashable type: '{}'", key.kind()),
        )),
    }
}

/// Computes the indices selected by a Python slice.
fn slice_indices(
    len: usize,
    start: Option<i64>,
    stop: Option<i64>,
    step: i64,
) -> impl Iterator<Item = usize> {
    let len = len as i64;
    let clamp = |idx: i64, lower: i64, upper: i64| {
        let idx = if idx < 0 { idx + len } else { idx };
        idx.clamp(lower, upper)
    };
    let (start, stop) = if step > 0 {
        (
            start.map_or(0, |x| clamp(x, 0, len)),
            stop.map_or(len, |x| clamp(x, 0, len)),
        )
    } else {
        (
            start.map_or(len - 1, |x| clamp(x, -1, len - 1)),
            stop.map_or(-1, |x| clamp(x, -1, len - 1)),
        )
    };
    let mut idx = start;
    std::iter::from_fn(move || {
        if (step > 0 && idx < stop) || (step < 0 && idx > stop) {
            let rv = idx as usize;
            idx += step;
            Some(rv)
        } else {
            None
        }
    })
}

/// Iterates over a value.
pub struct ValueIter {
    inner: std::vec::IntoIter<Value>,
}

impl Iterator for ValueIter {
    type Item = Value;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for ValueIter {}

impl fmt::Debug for ValueIter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueIter").finish()
    }
}

/// Merges multiple map values into one.
///
/// Keys of earlier maps win over keys of later maps.  Values which are not
/// maps are ignored.
pub fn merge_maps<I>(iter: I) -> Value
where
    I: IntoIterator<Item = Value>,
{
    let mut rv = ValueMap::default();
    for value in iter {
        if let Some(map) = value.as_map() {
            for (key, value) in map.iter() {
                if !rv.contains_key(key.as_str()) {
                    rv.insert(key.clone(), value.clone());
                }
            }
        }
    }
    Value::from(rv)
}

macro_rules! value_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                #[inline(always)]
                fn from(val: $ty) -> Self {
                    ValueRepr::Int(val as i64).into()
                }
            }
        )*
    };
}

value_from_int!(i8, i16, i32, i64, u8, u16, u32);

macro_rules! value_from_wide_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(val: $ty) -> Self {
                    match i64::try_from(val) {
                        Ok(val) => ValueRepr::Int(val).into(),
                        Err(_) => ValueRepr::Float(val as f64).into(),
                    }
                }
            }
        )*
    };
}

value_from_wide_int!(u64, usize, i128, u128);

impl From<ValueRepr> for Value {
    #[inline(always)]
    fn from(val: ValueRepr) -> Value {
        Value(val)
    }
}

impl From<bool> for Value {
    fn from(val: bool) -> Self {
        ValueRepr::Bool(val).into()
    }
}

impl From<f64> for Value {
    fn from(val: f64) -> Self {
        ValueRepr::Float(val).into()
    }
}

impl From<f32> for Value {
    fn from(val: f32) -> Self {
        ValueRepr::Float(val as f64).into()
    }
}

impl From<char> for Value {
    fn from(val: char) -> Self {
        let mut buf = [0u8; 4];
        Value::from(&*val.encode_utf8(&mut buf))
    }
}

impl<'a> From<&'a str> for Value {
    fn from(val: &'a str) -> Self {
        ValueRepr::String(Arc::from(val)).into()
    }
}

impl From<String> for Value {
    fn from(val: String) -> Self {
        ValueRepr::String(Arc::from(val)).into()
    }
}

impl From<Arc<str>> for Value {
    fn from(val: Arc<str>) -> Self {
        ValueRepr::String(val).into()
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::NONE
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(val: Option<T>) -> Self {
        val.map_or(Value::NONE, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(val: Vec<T>) -> Self {
        ValueRepr::List(Arc::new(val.into_iter().map(Into::into).collect())).into()
    }
}

impl From<ValueMap> for Value {
    fn from(val: ValueMap) -> Self {
        ValueRepr::Map(Arc::new(val)).into()
    }
}

#[cfg(feature = "preserve_order")]
impl<V: Into<Value>> From<BTreeMap<String, V>> for Value {
    fn from(val: BTreeMap<String, V>) -> Self {
        Value::from(
            val.into_iter()
                .map(|(k, v)| (k, v.into()))
                .collect::<ValueMap>(),
        )
    }
}

impl<V: Into<Value>> FromIterator<V> for Value {
    fn from_iter<T: IntoIterator<Item = V>>(iter: T) -> Self {
        Value::from(iter.into_iter().map(Into::into).collect::<Vec<Value>>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_display() {
        assert_eq!(Value::from(true).to_string(), "True");
        assert_eq!(Value::from(()).to_string(), "None");
        assert_eq!(Value::from(1.0).to_string(), "1.0");
        assert_eq!(Value::from(0.5).to_string(), "0.5");
        assert_eq!(Value::from(1e-10).to_string(), "1e-10");
        assert_eq!(Value::from(1.5e-7).to_string(), "1.5e-07");
        assert_eq!(Value::from(1e16).to_string(), "1e+16");
        assert_eq!(Value::from(123456.789).to_string(), "123456.789");
        assert_eq!(Value::from("it's").to_string(), "it's");
        assert_eq!(
            Value::from(vec![Value::from("a"), Value::from(1), Value::from(())]).to_string(),
            "['a', 1, None]"
        );
        assert_eq!(Value::from("it's").repr().to_string(), "\"it's\"");
        assert_eq!(Value::from("a\nb").repr().to_string(), "'a\\nb'");
    }

    #[test]
    fn test_map_display() {
        let mut map = ValueMap::new();
        map.insert("a".into(), Value::from(1));
        map.insert("b".into(), Value::from("x"));
        assert_eq!(Value::from(map).to_string(), "{'a': 1, 'b': 'x'}");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::from(0).is_true());
        assert!(!Value::from(0.0).is_true());
        assert!(!Value::from("").is_true());
        assert!(!Value::from(Vec::<i32>::new()).is_true());
        assert!(!Value::from(ValueMap::new()).is_true());
        assert!(!Value::NONE.is_true());
        assert!(Value::from(" ").is_true());
        assert!(Value::from(vec![0]).is_true());
    }

    #[test]
    fn test_get_item() {
        let list = Value::from(vec![1, 2, 3]);
        assert_eq!(list.get_item(&Value::from(0)).unwrap(), Value::from(1));
        assert_eq!(list.get_item(&Value::from(-1)).unwrap(), Value::from(3));
        let err = list.get_item(&Value::from(3)).unwrap_err();
        assert_eq!(err.detail(), Some("list index out of range"));
        let s = Value::from("häll");
        assert_eq!(s.get_item(&Value::from(1)).unwrap(), Value::from("ä"));
    }

    #[test]
    fn test_slice() {
        let list = Value::from(vec![0, 1, 2, 3, 4]);
        assert_eq!(
            list.slice(Some(1), Some(3), None).unwrap(),
            Value::from(vec![1, 2])
        );
        assert_eq!(
            list.slice(None, None, Some(-1)).unwrap(),
            Value::from(vec![4, 3, 2, 1, 0])
        );
        assert_eq!(
            list.slice(Some(-2), None, None).unwrap(),
            Value::from(vec![3, 4])
        );
        assert_eq!(
            Value::from("hello").slice(None, None, Some(2)).unwrap(),
            Value::from("hlo")
        );
    }

    #[test]
    fn test_merge_maps() {
        let a = Value::from_serialize(&BTreeMap::from([("x", 1), ("y", 2)]));
        let b = Value::from_serialize(&BTreeMap::from([("x", 10), ("z", 3)]));
        let merged = merge_maps([a, b]);
        assert_eq!(merged.to_string(), "{'x': 1, 'y': 2, 'z': 3}");
    }
}
