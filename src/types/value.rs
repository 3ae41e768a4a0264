//! Runtime values decoded from channel frames.

use serde::{Deserialize, Serialize};

use super::{ChannelType, Timestamp};
use crate::{BsreadError, Result};

/// Runtime value that can hold any channel payload.
///
/// A closed set of tagged variants, one per wire [`ChannelType`], plus
/// `Array` for shaped channels. Unsigned kinds keep their native width;
/// the widening conversions live in [`Value::as_i64`] and [`Value::as_f64`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    String(String),
    Array(Vec<Value>),
}

impl Value {
    /// The wire type this value decodes from, or `None` for arrays (the
    /// element type lives in the channel config).
    pub fn channel_type(&self) -> Option<ChannelType> {
        match self {
            Value::Bool(_) => Some(ChannelType::Bool),
            Value::Int8(_) => Some(ChannelType::Int8),
            Value::UInt8(_) => Some(ChannelType::UInt8),
            Value::Int16(_) => Some(ChannelType::Int16),
            Value::UInt16(_) => Some(ChannelType::UInt16),
            Value::Int32(_) => Some(ChannelType::Int32),
            Value::UInt32(_) => Some(ChannelType::UInt32),
            Value::Int64(_) => Some(ChannelType::Int64),
            Value::UInt64(_) => Some(ChannelType::UInt64),
            Value::Float32(_) => Some(ChannelType::Float32),
            Value::Float64(_) => Some(ChannelType::Float64),
            Value::String(_) => Some(ChannelType::String),
            Value::Array(_) => None,
        }
    }

    /// Widen any integer value to `i64`.
    ///
    /// Unsigned kinds widen losslessly except `UInt64`, which only converts
    /// while it fits.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(*b as i64),
            Value::Int8(v) => Some(*v as i64),
            Value::UInt8(v) => Some(*v as i64),
            Value::Int16(v) => Some(*v as i64),
            Value::UInt16(v) => Some(*v as i64),
            Value::Int32(v) => Some(*v as i64),
            Value::UInt32(v) => Some(*v as i64),
            Value::Int64(v) => Some(*v),
            Value::UInt64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Widen any numeric value to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float32(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            Value::UInt64(v) => Some(*v as f64),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    /// Borrow the string payload.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Borrow the array elements.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Typed extraction through [`FromValue`].
    ///
    /// ```
    /// use bsread::Value;
    ///
    /// let v = Value::Float64(3.5);
    /// assert_eq!(v.extract::<f64>().unwrap(), 3.5);
    /// assert!(v.extract::<i32>().is_err());
    /// ```
    pub fn extract<T: FromValue>(&self) -> Result<T> {
        T::from_value(self)
    }
}

/// Conversion from a tagged [`Value`] into a concrete Rust type.
///
/// Exact-variant matching: no silent numeric coercion. Use
/// [`Value::as_i64`]/[`Value::as_f64`] when widening is wanted.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self>;
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl FromValue for $ty {
            fn from_value(value: &Value) -> Result<Self> {
                match value {
                    Value::$variant(v) => Ok(v.clone()),
                    other => Err(BsreadError::TypeConversion {
                        details: format!(
                            "expected {}, got {:?}",
                            stringify!($variant),
                            other.channel_type()
                        ),
                    }),
                }
            }
        })*
    };
}

impl_from_value! {
    bool => Bool,
    i8 => Int8,
    u8 => UInt8,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
    String => String,
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Array(items) => items.iter().map(T::from_value).collect(),
            other => Err(BsreadError::TypeConversion {
                details: format!("expected Array, got {:?}", other.channel_type()),
            }),
        }
    }
}

/// A decoded channel payload with its device-local timestamp.
///
/// The device timestamp is independent of the main header's
/// `global_timestamp`; it records when the device sampled the value.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelValue {
    pub value: Value,
    pub timestamp: Timestamp,
}

impl ChannelValue {
    pub fn new(value: Value, timestamp: Timestamp) -> Self {
        Self { value, timestamp }
    }
}
