//! Value-level error types.

use crate::op::Operator;
use crate::value::Type;
use thiserror::Error;

/// A type-level contract violation on a value operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TypeError {
    #[error("type mismatch: expected {expected}, found {found}")]
    Mismatch { expected: Type, found: Type },

    #[error("operator {operator} expects {expected} operands, found {found}")]
    Arity {
        operator: Operator,
        expected: usize,
        found: usize,
    },

    #[error("operator {operator} not defined for {found}")]
    Undefined { operator: Operator, found: Type },

    #[error("division by zero")]
    DivisionByZero,
}
