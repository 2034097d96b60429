use std::sync::Arc;

use serde::ser::{self, Serialize, Serializer};

use crate::error::{Error, ErrorKind};
use crate::value::{value_map_with_capacity, Value, ValueMap, ValueRepr};

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self.0 {
            ValueRepr::None => serializer.serialize_unit(),
            ValueRepr::Bool(b) => serializer.serialize_bool(b),
            ValueRepr::Int(i) => serializer.serialize_i64(i),
            ValueRepr::Float(f) => serializer.serialize_f64(f),
            ValueRepr::String(ref s) => serializer.serialize_str(s),
            ValueRepr::List(ref items) => items[..].serialize(serializer),
            ValueRepr::Map(ref map) => {
                use serde::ser::SerializeMap;
                let mut s = ok!(serializer.serialize_map(Some(map.len())));
                for (k, v) in map.iter() {
                    ok!(s.serialize_entry(k, v));
                }
                s.end()
            }
        }
    }
}

/// Transforms a serializable value into a [`Value`].
///
/// This is what [`Value::from_serialize`] uses internally.
#[derive(Default)]
pub struct ValueSerializer {
    _private: (),
}

impl ValueSerializer {
    /// Creates a new serializer.
    pub fn new() -> ValueSerializer {
        ValueSerializer::default()
    }
}

fn single_entry_map(key: &str, value: Value) -> Value {
    let mut map = value_map_with_capacity(1);
    map.insert(key.to_string(), value);
    Value::from(map)
}

impl Serializer for ValueSerializer {
    type Ok = Value;
    type Error = Error;

    type SerializeSeq = SerializeSeq;
    type SerializeTuple = SerializeSeq;
    type SerializeTupleStruct = SerializeSeq;
    type SerializeTupleVariant = SerializeTupleVariant;
    type SerializeMap = SerializeMap;
    type SerializeStruct = SerializeMap;
    type SerializeStructVariant = SerializeStructVariant;

    fn serialize_bool(self, v: bool) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_i16(self, v: i16) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_i32(self, v: i32) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_i64(self, v: i64) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_i128(self, v: i128) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_u8(self, v: u8) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_u16(self, v: u16) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_u32(self, v: u32) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_u64(self, v: u64) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_u128(self, v: u128) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_f32(self, v: f32) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_char(self, v: char) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_str(self, value: &str) -> Result<Value, Error> {
        Ok(Value::from(value))
    }

    fn serialize_bytes(self, value: &[u8]) -> Result<Value, Error> {
        Ok(Value::from(String::from_utf8_lossy(value).into_owned()))
    }

    fn serialize_none(self) -> Result<Value, Error> {
        Ok(Value::NONE)
    }

    fn serialize_some<T>(self, value: &T) -> Result<Value, Error>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value, Error> {
        Ok(Value::NONE)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value, Error> {
        Ok(Value::NONE)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Value, Error> {
        Ok(Value::from(variant))
    }

    fn serialize_newtype_struct<T>(self, _name: &'static str, value: &T) -> Result<Value, Error>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value, Error>
    where
        T: Serialize + ?Sized,
    {
        Ok(single_entry_map(variant, ok!(value.serialize(self))))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<Self::SerializeSeq, Error> {
        Ok(SerializeSeq {
            elements: Vec::with_capacity(len.unwrap_or(0).min(1024)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<Self::SerializeTuple, Error> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleStruct, Error> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleVariant, Error> {
        Ok(SerializeTupleVariant {
            name: variant,
            fields: Vec::with_capacity(len.min(1024)),
        })
    }

    fn serialize_map(self, len: Option<usize>) -> Result<Self::SerializeMap, Error> {
        Ok(SerializeMap {
            entries: value_map_with_capacity(len.unwrap_or(0).min(1024)),
            key: None,
        })
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<Self::SerializeStruct, Error> {
        self.serialize_map(Some(len))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeStructVariant, Error> {
        Ok(SerializeStructVariant {
            variant,
            map: value_map_with_capacity(len.min(1024)),
        })
    }
}

pub struct SerializeSeq {
    elements: Vec<Value>,
}

impl ser::SerializeSeq for SerializeSeq {
    type Ok = Value;
    type Error = Error;

    fn serialize_element<T>(&mut self, value: &T) -> Result<(), Error>
    where
        T: Serialize + ?Sized,
    {
        self.elements.push(ok!(value.serialize(ValueSerializer::new())));
        Ok(())
    }

    fn end(self) -> Result<Value, Error> {
        Ok(ValueRepr::List(Arc::new(self.elements)).into())
    }
}

impl ser::SerializeTuple for SerializeSeq {
    type Ok = Value;
    type Error = Error;

    fn serialize_element<T>(&mut self, value: &T) -> Result<(), Error>
    where
        T: Serialize + ?Sized,
    {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value, Error> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SerializeSeq {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T>(&mut self, value: &T) -> Result<(), Error>
    where
        T: Serialize + ?Sized,
    {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value, Error> {
        ser::SerializeSeq::end(self)
    }
}

pub struct SerializeTupleVariant {
    name: &'static str,
    fields: Vec<Value>,
}

impl ser::SerializeTupleVariant for SerializeTupleVariant {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T>(&mut self, value: &T) -> Result<(), Error>
    where
        T: Serialize + ?Sized,
    {
        self.fields.push(ok!(value.serialize(ValueSerializer::new())));
        Ok(())
    }

    fn end(self) -> Result<Value, Error> {
        Ok(single_entry_map(self.name, Value::from(self.fields)))
    }
}

pub struct SerializeMap {
    entries: ValueMap,
    key: Option<String>,
}

impl ser::SerializeMap for SerializeMap {
    type Ok = Value;
    type Error = Error;

    fn serialize_key<T>(&mut self, key: &T) -> Result<(), Error>
    where
        T: Serialize + ?Sized,
    {
        self.key = Some(ok!(map_key(ok!(key.serialize(ValueSerializer::new())))));
        Ok(())
    }

    fn serialize_value<T>(&mut self, value: &T) -> Result<(), Error>
    where
        T: Serialize + ?Sized,
    {
        let key = ok!(self.key.take().ok_or_else(|| Error::new(
            ErrorKind::BadSerialization,
            "serialize_value called before serialize_key"
        )));
        let value = ok!(value.serialize(ValueSerializer::new()));
        self.entries.insert(key, value);
        Ok(())
    }

    fn end(self) -> Result<Value, Error> {
        Ok(Value::from(self.entries))
    }
}

impl ser::SerializeStruct for SerializeMap {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<(), Error>
    where
        T: Serialize + ?Sized,
    {
        let value = ok!(value.serialize(ValueSerializer::new()));
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn end(self) -> Result<Value, Error> {
        Ok(Value::from(self.entries))
    }
}

pub struct SerializeStructVariant {
    variant: &'static str,
    map: ValueMap,
}

impl ser::SerializeStructVariant for SerializeStructVariant {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<(), Error>
    where
        T: Serialize + ?Sized,
    {
        let value = ok!(value.serialize(ValueSerializer::new()));
        self.map.insert(key.to_string(), value);
        Ok(())
    }

    fn end(self) -> Result<Value, Error> {
        Ok(single_entry_map(self.variant, Value::from(self.map)))
    }
}

/// Map keys are strings, primitive keys are stringified.
fn map_key(key: Value) -> Result<String, Error> {
    match key.0 {
        ValueRepr::String(ref s) => Ok(s.to_string()),
        ValueRepr::Int(_) | ValueRepr::Bool(_) | ValueRepr::Float(_) | ValueRepr::None => {
            Ok(key.to_string())
        }
        _ => Err(Error::new(
            ErrorKind::BadSerialization,
            format!("cannot use {} as map key", key.kind()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde::Serialize;
    use similar_asserts::assert_eq;

    #[derive(Serialize)]
    struct Item {
        name: &'static str,
        price: f64,
        tags: Vec<&'static str>,
    }

    #[derive(Serialize)]
    enum Shape {
        Circle { radius: i32 },
        Point,
    }

    #[test]
    fn test_value_serialization() {
        let value = Value::from_serialize(&Item {
            name: "apple",
            price: 1.5,
            tags: vec!["fruit"],
        });
        assert_eq!(
            value.to_string(),
            "{'name': 'apple', 'price': 1.5, 'tags': ['fruit']}"
        );
        assert_eq!(
            Value::from_serialize(&Shape::Circle { radius: 2 }).to_string(),
            "{'Circle': {'radius': 2}}"
        );
        assert_eq!(Value::from_serialize(&Shape::Point).to_string(), "Point");
        assert_eq!(Value::from_serialize(&Some(1u64)), Value::from(1));
    }

    #[test]
    fn test_roundtrip_through_json() {
        let value = Value::from_serialize(&serde_json::json!({
            "a": [1, 2.5, null, true],
            "b": {"c": "d"}
        }));
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"a":[1,2.5,null,true],"b":{"c":"d"}}"#);
    }

    #[test]
    fn test_non_string_keys() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(1, "one");
        assert_eq!(Value::from_serialize(&map).to_string(), "{'1': 'one'}");
        let mut bad = std::collections::BTreeMap::new();
        bad.insert(vec![1], "x");
        assert_eq!(
            Value::try_from_serialize(&bad).unwrap_err().kind(),
            ErrorKind::BadSerialization
        );
    }
}
