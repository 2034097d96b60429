//! Methods callable on string, list and map values.
//!
//! Mutating methods such as `append` operate on the receiver in place.  The
//! VM hands out the value stored under the receiver's place so the change is
//! visible to later lookups.
use crate::error::{Error, ErrorKind};
use crate::functions::{iterate, Args};
use crate::value::{ops, value_map_remove, Value, ValueKind};

fn unknown_method(value: &Value, name: &str) -> Error {
    Error::new(
        ErrorKind::UnknownMethod,
        format!("'{}' object has no method '{}'", value.kind(), name),
    )
}

/// Calls a method on a value.
pub(crate) fn call_method(value: &mut Value, name: &str, args: Args<'_>) -> Result<Value, Error> {
    match value.kind() {
        ValueKind::String => string_method(value, name, args),
        ValueKind::List => list_method(value, name, args),
        ValueKind::Map => map_method(value, name, args),
        _ => Err(unknown_method(value, name)),
    }
}

fn char_index(s: &str, byte_idx: usize) -> usize {
    s[..byte_idx].chars().count()
}

fn strip_chars<'a>(s: &'a str, chars: Option<&str>, left: bool, right: bool) -> &'a str {
    let matches = |c: char| match chars {
        Some(chars) => chars.contains(c),
        None => c.is_whitespace(),
    };
    let s = if left { s.trim_start_matches(matches) } else { s };
    if right {
        s.trim_end_matches(matches)
    } else {
        s
    }
}

fn title(s: &str) -> String {
    let mut rv = String::with_capacity(s.len());
    let mut prev_cased = false;
    for c in s.chars() {
        if prev_cased {
            rv.extend(c.to_lowercase());
        } else {
            rv.extend(c.to_uppercase());
        }
        prev_cased = c.is_alphabetic();
    }
    rv
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Splits on runs of whitespace, at most `maxsplit` times.
fn split_whitespace(s: &str, maxsplit: Option<usize>) -> Vec<Value> {
    let mut rv = Vec::new();
    let mut rest = s.trim_start();
    while !rest.is_empty() {
        if maxsplit.map_or(false, |max| rv.len() >= max) {
            rv.push(Value::from(rest));
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(idx) => {
                rv.push(Value::from(&rest[..idx]));
                rest = rest[idx..].trim_start();
            }
            None => {
                rv.push(Value::from(rest));
                break;
            }
        }
    }
    rv
}

fn prefixes(value: &Value, name: &str) -> Result<Vec<String>, Error> {
    if let Some(s) = value.as_str() {
        return Ok(vec![s.to_string()]);
    }
    let mut rv = Vec::new();
    if value.kind() == ValueKind::List {
        for item in ok!(iterate(value)) {
            match item.as_str() {
                Some(s) => rv.push(s.to_string()),
                None => break,
            }
        }
        if rv.len() == value.len().unwrap_or(0) {
            return Ok(rv);
        }
    }
    Err(Error::new(
        ErrorKind::InvalidArguments,
        format!(
            "{name} first arg must be str or a list of str, not {}",
            value.kind()
        ),
    ))
}

fn string_method(value: &Value, name: &str, args: Args<'_>) -> Result<Value, Error> {
    let s = match value.as_str() {
        Some(s) => s,
        None => return Err(unknown_method(value, name)),
    };
    match name {
        "upper" => {
            ok!(args.check(0, &[]));
            Ok(Value::from(s.to_uppercase()))
        }
        "lower" => {
            ok!(args.check(0, &[]));
            Ok(Value::from(s.to_lowercase()))
        }
        "strip" | "lstrip" | "rstrip" => {
            ok!(args.check(0, &["chars"]));
            let chars = match args.get_opt(0, "chars") {
                Some(_) => Some(ok!(args.required_str(0, "chars"))),
                None => None,
            };
            Ok(Value::from(strip_chars(
                s,
                chars,
                name != "rstrip",
                name != "lstrip",
            )))
        }
        "title" => {
            ok!(args.check(0, &[]));
            Ok(Value::from(title(s)))
        }
        "capitalize" => {
            ok!(args.check(0, &[]));
            Ok(Value::from(capitalize(s)))
        }
        "replace" => {
            ok!(args.check(2, &["old", "new", "count"]));
            let old = ok!(args.required_str(0, "old"));
            let new = ok!(args.required_str(1, "new"));
            Ok(Value::from(match ok!(args.opt_int(2, "count")) {
                Some(count) if count >= 0 => s.replacen(old, new, count as usize),
                _ => s.replace(old, new),
            }))
        }
        "startswith" | "endswith" => {
            ok!(args.check(1, &["prefix"]));
            let candidates = ok!(prefixes(ok!(args.required(0, "prefix")), name));
            Ok(Value::from(candidates.iter().any(|x| {
                if name == "startswith" {
                    s.starts_with(x.as_str())
                } else {
                    s.ends_with(x.as_str())
                }
            })))
        }
        "split" => {
            ok!(args.check(0, &["sep", "maxsplit"]));
            let maxsplit = ok!(args.opt_int(1, "maxsplit"))
                .filter(|x| *x >= 0)
                .map(|x| x as usize);
            if args.get_opt(0, "sep").is_none() {
                return Ok(Value::from(split_whitespace(s, maxsplit)));
            }
            let sep = ok!(args.required_str(0, "sep"));
            if sep.is_empty() {
                return Err(Error::new(ErrorKind::InvalidArguments, "empty separator"));
            }
            Ok(match maxsplit {
                Some(max) => s.splitn(max + 1, sep).map(Value::from).collect(),
                None => s.split(sep).map(Value::from).collect(),
            })
        }
        "join" => {
            ok!(args.check(1, &["iterable"]));
            let mut rv = String::new();
            for (idx, item) in ok!(iterate(ok!(args.required(0, "iterable"))))
                .into_iter()
                .enumerate()
            {
                match item.as_str() {
                    Some(part) => {
                        if idx > 0 {
                            rv.push_str(s);
                        }
                        rv.push_str(part);
                    }
                    None => {
                        return Err(Error::new(
                            ErrorKind::InvalidOperation,
                            format!(
                                "sequence item {idx}: expected str instance, {} found",
                                item.kind()
                            ),
                        ))
                    }
                }
            }
            Ok(Value::from(rv))
        }
        "count" => {
            ok!(args.check(1, &["sub"]));
            let sub = ok!(args.required_str(0, "sub"));
            Ok(Value::from(if sub.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(sub).count()
            }))
        }
        "find" => {
            ok!(args.check(1, &["sub"]));
            let sub = ok!(args.required_str(0, "sub"));
            Ok(Value::from(
                s.find(sub).map_or(-1, |idx| char_index(s, idx) as i64),
            ))
        }
        _ => Err(unknown_method(value, name)),
    }
}

fn list_method(value: &mut Value, name: &str, args: Args<'_>) -> Result<Value, Error> {
    if !matches!(
        name,
        "append" | "extend" | "insert" | "pop" | "remove" | "clear" | "index" | "count"
    ) {
        return Err(unknown_method(value, name));
    }
    let items = match value.as_list_mut() {
        Some(items) => items,
        None => return Err(unknown_method(value, name)),
    };
    match name {
        "append" => {
            ok!(args.check(1, &["object"]));
            items.push(ok!(args.required(0, "object")).clone());
            Ok(Value::NONE)
        }
        "extend" => {
            ok!(args.check(1, &["iterable"]));
            items.extend(ok!(iterate(ok!(args.required(0, "iterable")))));
            Ok(Value::NONE)
        }
        "insert" => {
            ok!(args.check(2, &["index", "object"]));
            let len = items.len() as i64;
            let idx = ok!(args.opt_int(0, "index")).unwrap_or(0);
            let idx = if idx < 0 { (idx + len).max(0) } else { idx.min(len) };
            items.insert(idx as usize, ok!(args.required(1, "object")).clone());
            Ok(Value::NONE)
        }
        "pop" => {
            ok!(args.check(0, &["index"]));
            if items.is_empty() {
                return Err(Error::new(ErrorKind::InvalidOperation, "pop from empty list"));
            }
            let len = items.len() as i64;
            let idx = ok!(args.opt_int(0, "index")).unwrap_or(-1);
            let resolved = if idx < 0 { idx + len } else { idx };
            if resolved < 0 || resolved >= len {
                return Err(Error::new(
                    ErrorKind::InvalidOperation,
                    "pop index out of range",
                ));
            }
            Ok(items.remove(resolved as usize))
        }
        "remove" => {
            ok!(args.check(1, &["value"]));
            let needle = ok!(args.required(0, "value"));
            match items.iter().position(|x| ops::eq(x, needle)) {
                Some(idx) => {
                    items.remove(idx);
                    Ok(Value::NONE)
                }
                None => Err(Error::new(
                    ErrorKind::InvalidOperation,
                    "list.remove(x): x not in list",
                )),
            }
        }
        "clear" => {
            ok!(args.check(0, &[]));
            items.clear();
            Ok(Value::NONE)
        }
        "index" => {
            ok!(args.check(1, &["value"]));
            let needle = ok!(args.required(0, "value"));
            match items.iter().position(|x| ops::eq(x, needle)) {
                Some(idx) => Ok(Value::from(idx)),
                None => Err(Error::new(
                    ErrorKind::InvalidOperation,
                    format!("{} is not in list", needle.repr()),
                )),
            }
        }
        _ => {
            ok!(args.check(1, &["value"]));
            let needle = ok!(args.required(0, "value"));
            Ok(Value::from(items.iter().filter(|x| ops::eq(x, needle)).count()))
        }
    }
}

fn map_key<'v>(value: &'v Value, method: &str) -> Result<&'v str, Error> {
    value.as_str().ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidArguments,
            format!("dict.{method}() keys must be str, not {}", value.kind()),
        )
    })
}

fn map_method(value: &mut Value, name: &str, args: Args<'_>) -> Result<Value, Error> {
    if !matches!(
        name,
        "items" | "keys" | "values" | "get" | "update" | "pop" | "clear"
    ) {
        return Err(unknown_method(value, name));
    }
    let map = match value.as_map_mut() {
        Some(map) => map,
        None => return Err(unknown_method(value, name)),
    };
    match name {
        "items" => {
            ok!(args.check(0, &[]));
            Ok(map
                .iter()
                .map(|(k, v)| Value::from(vec![Value::from(k.as_str()), v.clone()]))
                .collect())
        }
        "keys" => {
            ok!(args.check(0, &[]));
            Ok(map.keys().map(|k| Value::from(k.as_str())).collect())
        }
        "values" => {
            ok!(args.check(0, &[]));
            Ok(map.values().cloned().collect())
        }
        "get" => {
            ok!(args.check(1, &["key", "default"]));
            let key = ok!(map_key(ok!(args.required(0, "key")), name));
            Ok(map
                .get(key)
                .or_else(|| args.get(1, "default"))
                .cloned()
                .unwrap_or_default())
        }
        "update" => {
            if args.positional().len() > 1 {
                ok!(args.check(0, &["other"]));
            }
            if let Some(other) = args.positional().first() {
                match other.as_map() {
                    Some(other) => {
                        for (k, v) in other.iter() {
                            map.insert(k.clone(), v.clone());
                        }
                    }
                    None => {
                        for pair in ok!(iterate(other)) {
                            match pair.as_slice() {
                                Some([k, v]) => {
                                    map.insert(ok!(map_key(k, name)).to_string(), v.clone());
                                }
                                _ => {
                                    return Err(Error::new(
                                        ErrorKind::InvalidOperation,
                                        "dictionary update sequence element has the wrong shape",
                                    ))
                                }
                            }
                        }
                    }
                }
            }
            for (k, v) in args.kwargs() {
                map.insert(k.clone(), v.clone());
            }
            Ok(Value::NONE)
        }
        "pop" => {
            ok!(args.check(1, &["key", "default"]));
            let key = ok!(args.required(0, "key"));
            let name_key = ok!(map_key(key, name));
            match value_map_remove(map, name_key) {
                Some(rv) => Ok(rv),
                None => match args.get(1, "default") {
                    Some(default) => Ok(default.clone()),
                    None => Err(Error::new(
                        ErrorKind::UndefinedError,
                        format!("key {} does not exist", key.repr()),
                    )),
                },
            }
        }
        _ => {
            ok!(args.check(0, &[]));
            map.clear();
            Ok(Value::NONE)
        }
    }
}
