use alloc::borrow::Cow;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use core::fmt;

use chrono::{DateTime, Utc};

use serde::{Serialize, de::DeserializeOwned};

use crate::timed::Timestamp;

/// Declared type of a resource or of an action parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Any value, no conversion is applied.
    #[default]
    Any,
    /// Boolean.
    Bool,
    /// Signed integer.
    Int,
    /// Floating point number.
    Float,
    /// Text.
    String,
    /// Instant on the UTC time-line.
    Timestamp,
    /// List of values.
    List,
    /// Structured `JSON` data.
    Json,
}

impl DataType {
    /// Returns the name of a [`DataType`].
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::Timestamp => "timestamp",
            Self::List => "list",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.name().fmt(f)
    }
}

/// An error raised when a [`Value`] cannot be read or converted as the
/// requested type.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueError {
    /// Requested type.
    pub expected: Cow<'static, str>,
    /// Type of the value found.
    pub found: DataType,
    /// Additional information about the failure.
    pub info: Option<String>,
}

impl ValueError {
    /// Creates a [`ValueError`].
    #[must_use]
    #[inline]
    pub fn new(expected: impl Into<Cow<'static, str>>, found: DataType) -> Self {
        Self {
            expected: expected.into(),
            found,
            info: None,
        }
    }

    /// Adds information about the failure.
    #[must_use]
    #[inline]
    pub fn info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Expected a value of type `{}`, found `{}`",
            self.expected, self.found
        )?;
        if let Some(info) = &self.info {
            write!(f, ": {info}")?;
        }
        Ok(())
    }
}

impl core::error::Error for ValueError {}

/// A dynamic resource value.
///
/// The absence of a value is never represented by a variant, it is expressed
/// as an [`Option::None`] by whoever holds the value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Text.
    String(String),
    /// Instant on the UTC time-line.
    Timestamp(Timestamp),
    /// List of values.
    List(Vec<Value>),
    /// Structured `JSON` data.
    Json(serde_json::Value),
}

impl Value {
    /// Returns the [`DataType`] of a [`Value`].
    #[must_use]
    pub const fn data_type(&self) -> DataType {
        match self {
            Self::Bool(_) => DataType::Bool,
            Self::Int(_) => DataType::Int,
            Self::Float(_) => DataType::Float,
            Self::String(_) => DataType::String,
            Self::Timestamp(_) => DataType::Timestamp,
            Self::List(_) => DataType::List,
            Self::Json(_) => DataType::Json,
        }
    }

    /// Serializes any data into a [`Value::Json`].
    ///
    /// # Errors
    ///
    /// An error is returned when the data cannot be represented as `JSON`.
    pub fn from_serialize<T: Serialize>(data: &T) -> Result<Self, ValueError> {
        serde_json::to_value(data)
            .map(Self::Json)
            .map_err(|e| ValueError::new("json", DataType::Any).info(e.to_string()))
    }

    /// Deserializes a [`Value`] into any data.
    ///
    /// # Errors
    ///
    /// An error is returned when the value does not describe the
    /// requested data.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, ValueError> {
        serde_json::from_value(self.to_json()).map_err(|e| {
            ValueError::new(core::any::type_name::<T>(), self.data_type()).info(e.to_string())
        })
    }

    /// Converts a [`Value`] into its `JSON` representation.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Timestamp(t) => serde_json::Value::String(t.to_rfc3339()),
            Self::List(values) => {
                serde_json::Value::Array(values.iter().map(Self::to_json).collect())
            }
            Self::Json(json) => json.clone(),
        }
    }

    /// Converts a [`Value`] to the given [`DataType`].
    ///
    /// The conversion is lenient: textual values are parsed, numbers are
    /// rendered as text, integral floats become integers and integers are
    /// interpreted as milliseconds since the epoch when a timestamp
    /// is requested.
    ///
    /// # Errors
    ///
    /// An error is returned when no conversion exists between the value
    /// and the given type.
    pub fn convert(self, target: DataType) -> Result<Self, ValueError> {
        let found = self.data_type();
        if target == DataType::Any || target == found {
            return Ok(self);
        }

        let mismatch = || ValueError::new(target.name(), found);

        match (target, self) {
            (DataType::Bool, Self::String(s)) => match s.trim() {
                t if t.eq_ignore_ascii_case("true") => Ok(Self::Bool(true)),
                t if t.eq_ignore_ascii_case("false") => Ok(Self::Bool(false)),
                _ => Err(mismatch().info(s.clone())),
            },
            (DataType::Bool, Self::Json(serde_json::Value::Bool(b))) => Ok(Self::Bool(b)),
            (DataType::Int, Self::Float(f)) => integral(f).map(Self::Int).ok_or_else(mismatch),
            (DataType::Int, Self::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Self::Int)
                .map_err(|e| mismatch().info(e.to_string())),
            (DataType::Int, Self::Json(serde_json::Value::Number(n))) => n
                .as_i64()
                .or_else(|| n.as_f64().and_then(integral))
                .map(Self::Int)
                .ok_or_else(mismatch),
            #[allow(clippy::cast_precision_loss)]
            (DataType::Float, Self::Int(i)) => Ok(Self::Float(i as f64)),
            (DataType::Float, Self::String(s)) => s
                .trim()
                .parse::<f64>()
                .map(Self::Float)
                .map_err(|e| mismatch().info(e.to_string())),
            (DataType::Float, Self::Json(serde_json::Value::Number(n))) => {
                n.as_f64().map(Self::Float).ok_or_else(mismatch)
            }
            (DataType::String, Self::Bool(b)) => Ok(Self::String(b.to_string())),
            (DataType::String, Self::Int(i)) => Ok(Self::String(i.to_string())),
            (DataType::String, Self::Float(f)) => Ok(Self::String(f.to_string())),
            (DataType::String, Self::Timestamp(t)) => Ok(Self::String(t.to_rfc3339())),
            (DataType::String, Self::Json(serde_json::Value::String(s))) => Ok(Self::String(s)),
            (DataType::String, Self::Json(json)) => Ok(Self::String(json.to_string())),
            (DataType::Timestamp, Self::String(s)) => DateTime::parse_from_rfc3339(s.trim())
                .map(|t| Self::Timestamp(t.with_timezone(&Utc)))
                .map_err(|e| mismatch().info(e.to_string())),
            (DataType::Timestamp, Self::Int(millis)) => DateTime::from_timestamp_millis(millis)
                .map(Self::Timestamp)
                .ok_or_else(mismatch),
            (DataType::List, Self::Json(serde_json::Value::Array(values))) => {
                Ok(Self::List(values.into_iter().map(Self::Json).collect()))
            }
            (DataType::Json, value) => Ok(Self::Json(value.to_json())),
            _ => Err(mismatch()),
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn integral(f: f64) -> Option<i64> {
    if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 && (f as i64) as f64 == f {
        Some(f as i64)
    } else {
        None
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => b.fmt(f),
            Self::Int(i) => i.fmt(f),
            Self::Float(v) => v.fmt(f),
            Self::String(s) => s.fmt(f),
            Self::Timestamp(t) => f.write_str(&t.to_rfc3339()),
            Self::List(_) | Self::Json(_) => self.to_json().fmt(f),
        }
    }
}

/// Reads typed data out of a [`Value`].
///
/// Reads are strict: a value is only read as a type that describes it.
/// Integer reads succeed when the stored integer fits the requested width.
pub trait FromValue: Sized {
    /// Reads the data out of a [`Value`].
    ///
    /// # Errors
    ///
    /// An error is returned when the value does not describe the requested
    /// type.
    fn from_value(value: &Value) -> Result<Self, ValueError>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        Ok(value.clone())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::Bool(b) => Ok(*b),
            other => Err(ValueError::new("bool", other.data_type())),
        }
    }
}

macro_rules! integer_from_value {
    ($($ty:ty),+) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value) -> Result<Self, ValueError> {
                    match value {
                        Value::Int(i) => <$ty>::try_from(*i).map_err(|_| {
                            ValueError::new(stringify!($ty), DataType::Int)
                                .info(alloc::format!("{i} is out of range"))
                        }),
                        other => Err(ValueError::new(stringify!($ty), other.data_type())),
                    }
                }
            }

            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Self::Int(i64::from(value))
                }
            }
        )+
    };
}

integer_from_value!(i8, i16, i32, i64, u8, u16, u32);

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::Float(f) => Ok(*f),
            other => Err(ValueError::new("f64", other.data_type())),
        }
    }
}

impl FromValue for f32 {
    #[allow(clippy::cast_possible_truncation)]
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::Float(f) => Ok(*f as f32),
            other => Err(ValueError::new("f32", other.data_type())),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::String(s) => Ok(s.clone()),
            other => Err(ValueError::new("string", other.data_type())),
        }
    }
}

impl FromValue for Timestamp {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::Timestamp(t) => Ok(*t),
            other => Err(ValueError::new("timestamp", other.data_type())),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        Ok(value.to_json())
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::List(values) => values.iter().map(T::from_value).collect(),
            other => Err(ValueError::new("list", other.data_type())),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Self::Float(f64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Timestamp> for Value {
    fn from(value: Timestamp) -> Self {
        Self::Timestamp(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}
