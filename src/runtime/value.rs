//! Runtime value representation.

use crate::parser::module::ValueType;
use fhex::ToHex;
use std::fmt;

/// A tagged runtime value. The dispatcher relies on variant checks for trap
/// detection, so the tag is never erased.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Value {
    /// The static type of this value.
    pub fn typ(&self) -> ValueType {
        match self {
            Value::I32(_) => ValueType::I32,
            Value::I64(_) => ValueType::I64,
            Value::F32(_) => ValueType::F32,
            Value::F64(_) => ValueType::F64,
        }
    }

    /// The zero value of a type, used for pure-local initialisation.
    pub fn zero(ty: ValueType) -> Value {
        match ty {
            ValueType::I32 => Value::I32(0),
            ValueType::I64 => Value::I64(0),
            ValueType::F32 => Value::F32(0.0),
            ValueType::F64 => Value::F64(0.0),
        }
    }

    /// Parse a command-line argument into a value of the given type.
    ///
    /// Integers are parsed as signed decimal, floats as decimal notation.
    pub fn parse_arg(ty: ValueType, arg: &str) -> Option<Value> {
        match ty {
            ValueType::I32 => arg.parse::<i32>().ok().map(Value::I32),
            ValueType::I64 => arg.parse::<i64>().ok().map(Value::I64),
            ValueType::F32 => arg.parse::<f32>().ok().map(Value::F32),
            ValueType::F64 => arg.parse::<f64>().ok().map(Value::F64),
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::F32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::I32(v) => write!(f, "i32:{v}"),
            Value::I64(v) => write!(f, "i64:{v}"),
            Value::F32(v) => write!(f, "f32:{}", v.to_hex()),
            Value::F64(v) => write!(f, "f64:{}", v.to_hex()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typ_matches_variant() {
        assert_eq!(Value::I32(1).typ(), ValueType::I32);
        assert_eq!(Value::I64(1).typ(), ValueType::I64);
        assert_eq!(Value::F32(1.0).typ(), ValueType::F32);
        assert_eq!(Value::F64(1.0).typ(), ValueType::F64);
    }

    #[test]
    fn zero_values() {
        assert_eq!(Value::zero(ValueType::I32), Value::I32(0));
        assert_eq!(Value::zero(ValueType::I64), Value::I64(0));
        assert_eq!(Value::zero(ValueType::F32), Value::F32(0.0));
        assert_eq!(Value::zero(ValueType::F64), Value::F64(0.0));
    }

    #[test]
    fn parse_arg_by_type() {
        assert_eq!(Value::parse_arg(ValueType::I32, "-42"), Some(Value::I32(-42)));
        assert_eq!(
            Value::parse_arg(ValueType::I64, "9000000000"),
            Some(Value::I64(9_000_000_000))
        );
        assert_eq!(Value::parse_arg(ValueType::F32, "1.5"), Some(Value::F32(1.5)));
        assert_eq!(Value::parse_arg(ValueType::F64, "2.25"), Some(Value::F64(2.25)));
    }

    #[test]
    fn parse_arg_rejects_garbage() {
        assert_eq!(Value::parse_arg(ValueType::I32, "forty"), None);
        assert_eq!(Value::parse_arg(ValueType::I32, "1.5"), None);
        assert_eq!(Value::parse_arg(ValueType::F64, ""), None);
    }

    #[test]
    fn conversions_check_the_tag() {
        assert_eq!(Value::I32(7).as_i32(), Some(7));
        assert_eq!(Value::I32(7).as_i64(), None);
        assert_eq!(Value::F64(0.5).as_f64(), Some(0.5));
        assert_eq!(Value::F64(0.5).as_f32(), None);
    }
}
