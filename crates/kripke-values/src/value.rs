//! Scalar value and type representation.

use crate::error::TypeError;
use std::fmt;

/// Type of a scalar attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Bool,
    Int,
    Real,
}

impl Type {
    /// Whether a value of type `other` can be stored into a slot of this
    /// type: identity, plus Int → Real widening.
    #[inline]
    pub fn can_import(self, other: Type) -> bool {
        self == other || (self == Type::Real && other == Type::Int)
    }

    /// Convert `value` into this type, widening Int to Real where allowed.
    pub fn import(self, value: Value) -> Result<Value, TypeError> {
        match (self, value) {
            (Type::Real, Value::Int(n)) => Ok(Value::Real(n as f64)),
            _ if value.ty() == self => Ok(value),
            _ => Err(TypeError::Mismatch {
                expected: self,
                found: value.ty(),
            }),
        }
    }

    /// The zero-like default of this type.
    pub fn default_value(self) -> Value {
        match self {
            Type::Bool => Value::Bool(false),
            Type::Int => Value::Int(0),
            Type::Real => Value::Real(0.0),
        }
    }

    /// The multiplicative unit of this type (`true` for Bool).
    pub fn one(self) -> Value {
        match self {
            Type::Bool => Value::Bool(true),
            Type::Int => Value::Int(1),
            Type::Real => Value::Real(1.0),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::Real => write!(f, "real"),
        }
    }
}

/// A typed scalar value.
///
/// `Copy`, so reads hand out snapshots; a stored value never aliases the
/// slot it was read from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Real(f64),
}

impl Value {
    #[inline]
    pub fn ty(self) -> Type {
        match self {
            Value::Bool(_) => Type::Bool,
            Value::Int(_) => Type::Int,
            Value::Real(_) => Type::Real,
        }
    }

    #[inline]
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }

    #[inline]
    pub fn as_int(self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(n),
            _ => None,
        }
    }

    /// Numeric view: Int widens to Real, Bool is not numeric.
    #[inline]
    pub fn as_real(self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(n as f64),
            Value::Real(r) => Some(r),
            Value::Bool(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Real(r) => write!(f, "{}", r),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_widens_int() {
        assert_eq!(Type::Real.import(Value::Int(3)), Ok(Value::Real(3.0)));
        assert_eq!(Type::Int.import(Value::Int(3)), Ok(Value::Int(3)));
        assert!(Type::Int.import(Value::Real(3.0)).is_err());
        assert!(Type::Bool.import(Value::Int(1)).is_err());
    }

    #[test]
    fn test_can_import() {
        assert!(Type::Real.can_import(Type::Int));
        assert!(!Type::Int.can_import(Type::Real));
        assert!(Type::Bool.can_import(Type::Bool));
    }

    #[test]
    fn test_defaults() {
        assert_eq!(Type::Int.default_value(), Value::Int(0));
        assert_eq!(Type::Real.one(), Value::Real(1.0));
        assert_eq!(Type::Bool.default_value(), Value::Bool(false));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Real(0.5).to_string(), "0.5");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Type::Real.to_string(), "real");
    }
}
