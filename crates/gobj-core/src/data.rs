//! Attribute data model
//!
//! Each class declares an ordered schema of [`AttrDesc`] entries. Values are
//! carried as [`AttrValue`], a closed set of shapes matching [`DataType`].
//! Pointers hold instance ids, never owning references.

use std::fmt;

use serde_json::{Map, Value};

use crate::{AttrFlags, GObjId};

/// Attribute type tag
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    String,
    Integer,
    Real,
    Boolean,
    /// Any JSON value
    Json,
    List,
    Dict,
    /// Reference to another instance (by id)
    Pointer,
}

impl DataType {
    /// Value used when the schema gives no default
    pub fn zero(self) -> AttrValue {
        match self {
            DataType::String => AttrValue::String(String::new()),
            DataType::Integer => AttrValue::Integer(0),
            DataType::Real => AttrValue::Real(0.0),
            DataType::Boolean => AttrValue::Boolean(false),
            DataType::Json => AttrValue::Json(Value::Null),
            DataType::List => AttrValue::List(Vec::new()),
            DataType::Dict => AttrValue::Dict(Map::new()),
            DataType::Pointer => AttrValue::Pointer(None),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Integer => "integer",
            DataType::Real => "real",
            DataType::Boolean => "boolean",
            DataType::Json => "json",
            DataType::List => "list",
            DataType::Dict => "dict",
            DataType::Pointer => "pointer",
        }
    }

    /// Can values of this type be saved to an external store?
    pub fn is_serializable(self) -> bool {
        !matches!(self, DataType::Pointer)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Attribute value
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    String(String),
    Integer(i64),
    Real(f64),
    Boolean(bool),
    Json(Value),
    List(Vec<Value>),
    Dict(Map<String, Value>),
    Pointer(Option<GObjId>),
}

impl AttrValue {
    pub fn data_type(&self) -> DataType {
        match self {
            AttrValue::String(_) => DataType::String,
            AttrValue::Integer(_) => DataType::Integer,
            AttrValue::Real(_) => DataType::Real,
            AttrValue::Boolean(_) => DataType::Boolean,
            AttrValue::Json(_) => DataType::Json,
            AttrValue::List(_) => DataType::List,
            AttrValue::Dict(_) => DataType::Dict,
            AttrValue::Pointer(_) => DataType::Pointer,
        }
    }

    /// Strict shape check: the variant must be the declared type
    #[inline]
    pub fn matches(&self, dtype: DataType) -> bool {
        self.data_type() == dtype
    }

    /// Convert a JSON config value into `dtype`.
    ///
    /// Lenient like a config loader: booleans accept "true"/"false" and
    /// numeric strings, reals accept integers, lists and dicts accept their
    /// JSON text. Pointers only accept `null`.
    pub fn from_json(dtype: DataType, value: &Value) -> Option<AttrValue> {
        match dtype {
            DataType::String => match value {
                Value::String(s) => Some(AttrValue::String(s.clone())),
                Value::Null => None,
                other => Some(AttrValue::String(other.to_string())),
            },
            DataType::Integer => match value {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().and_then(integral))
                    .map(AttrValue::Integer),
                Value::Bool(b) => Some(AttrValue::Integer(*b as i64)),
                Value::String(s) => s.trim().parse::<i64>().ok().map(AttrValue::Integer),
                _ => None,
            },
            DataType::Real => match value {
                Value::Number(n) => n.as_f64().map(AttrValue::Real),
                Value::String(s) => s.trim().parse::<f64>().ok().map(AttrValue::Real),
                _ => None,
            },
            DataType::Boolean => match value {
                Value::Bool(b) => Some(AttrValue::Boolean(*b)),
                Value::Number(n) => n.as_i64().map(|i| AttrValue::Boolean(i != 0)),
                Value::String(s) => {
                    let s = s.trim().to_ascii_lowercase();
                    match s.as_str() {
                        "true" => Some(AttrValue::Boolean(true)),
                        "false" => Some(AttrValue::Boolean(false)),
                        other => other.parse::<i64>().ok().map(|i| AttrValue::Boolean(i != 0)),
                    }
                }
                _ => None,
            },
            DataType::Json => Some(AttrValue::Json(value.clone())),
            DataType::List => match value {
                Value::Array(items) => Some(AttrValue::List(items.clone())),
                Value::String(s) => match serde_json::from_str::<Value>(s) {
                    Ok(Value::Array(items)) => Some(AttrValue::List(items)),
                    _ => None,
                },
                _ => None,
            },
            DataType::Dict => match value {
                Value::Object(map) => Some(AttrValue::Dict(map.clone())),
                Value::String(s) => match serde_json::from_str::<Value>(s) {
                    Ok(Value::Object(map)) => Some(AttrValue::Dict(map)),
                    _ => None,
                },
                _ => None,
            },
            DataType::Pointer => match value {
                Value::Null => Some(AttrValue::Pointer(None)),
                _ => None,
            },
        }
    }

    /// JSON view of the value. Pointers render as their packed id.
    pub fn to_json(&self) -> Value {
        match self {
            AttrValue::String(s) => Value::String(s.clone()),
            AttrValue::Integer(i) => Value::from(*i),
            AttrValue::Real(r) => Value::from(*r),
            AttrValue::Boolean(b) => Value::Bool(*b),
            AttrValue::Json(v) => v.clone(),
            AttrValue::List(items) => Value::Array(items.clone()),
            AttrValue::Dict(map) => Value::Object(map.clone()),
            AttrValue::Pointer(Some(id)) => Value::from(id.to_u64()),
            AttrValue::Pointer(None) => Value::Null,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Real(r) => Some(*r),
            AttrValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<GObjId> {
        match self {
            AttrValue::Pointer(p) => *p,
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            AttrValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Map<String, Value>> {
        match self {
            AttrValue::Dict(map) => Some(map),
            _ => None,
        }
    }

    /// Short description of the shape, for error messages
    pub fn shape(&self) -> String {
        self.data_type().name().to_string()
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::String(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::String(s)
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        AttrValue::Integer(i)
    }
}

impl From<i32> for AttrValue {
    fn from(i: i32) -> Self {
        AttrValue::Integer(i as i64)
    }
}

impl From<f64> for AttrValue {
    fn from(r: f64) -> Self {
        AttrValue::Real(r)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Boolean(b)
    }
}

impl From<GObjId> for AttrValue {
    fn from(id: GObjId) -> Self {
        AttrValue::Pointer(Some(id))
    }
}

impl From<Option<GObjId>> for AttrValue {
    fn from(id: Option<GObjId>) -> Self {
        AttrValue::Pointer(id)
    }
}

impl From<Vec<Value>> for AttrValue {
    fn from(items: Vec<Value>) -> Self {
        AttrValue::List(items)
    }
}

impl From<Map<String, Value>> for AttrValue {
    fn from(map: Map<String, Value>) -> Self {
        AttrValue::Dict(map)
    }
}

impl From<Value> for AttrValue {
    fn from(v: Value) -> Self {
        AttrValue::Json(v)
    }
}

/// Whole floats within the `i64` range
fn integral(f: f64) -> Option<i64> {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// Attribute schema entry
#[derive(Clone, Debug, PartialEq)]
pub struct AttrDesc {
    pub name: &'static str,
    pub dtype: DataType,
    pub flags: AttrFlags,
    /// Explicit default. Without one, optional attributes start at the
    /// type's zero value and required ones start unset.
    pub default: Option<AttrValue>,
    pub description: &'static str,
}

impl AttrDesc {
    pub fn new(dtype: DataType, name: &'static str, flags: AttrFlags, description: &'static str) -> Self {
        AttrDesc {
            name,
            dtype,
            flags,
            default: None,
            description,
        }
    }

    /// Set the default value
    pub fn with_default(mut self, value: impl Into<AttrValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Value the attribute holds right after schema resolution
    pub fn initial_value(&self) -> Option<AttrValue> {
        match &self.default {
            Some(v) => Some(v.clone()),
            None if self.flags.is_required() => None,
            None => Some(self.dtype.zero()),
        }
    }
}
