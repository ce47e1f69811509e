//! FormulaXP - Embeddable expression evaluator
//!
//! This crate compiles short textual expressions (arithmetic, strings,
//! logic, container access, function calls) into a postfix token queue and
//! evaluates that queue against a caller-supplied variable scope. It is
//! meant for host programs that need to run user-authored formulas without
//! embedding a full scripting runtime.
//!
//! ```
//! use formulaxp::{Map, Value, calculate};
//!
//! let scope = Map::new();
//! scope.insert("price", Value::Real(9.5));
//! scope.insert("quantity", Value::Int(3));
//!
//! let total = calculate("price * quantity", &scope).unwrap();
//! assert_eq!(total, Value::Real(28.5));
//! ```
//!
//! ## Compilation and evaluation are separate steps
//!
//! [`compile`] turns text into an [`Expression`] (a postfix queue); the
//! expression can then be evaluated any number of times, against different
//! scopes:
//!
//! ```
//! use formulaxp::{Map, Value, compile, evaluate};
//!
//! let scope = Map::new();
//! scope.insert("x", Value::Int(10));
//! let expr = compile("x * x", &scope).unwrap();
//!
//! assert_eq!(evaluate(&expr, &scope).unwrap(), Value::Int(100));
//! scope.insert("x", Value::Int(12));
//! assert_eq!(evaluate(&expr, &scope).unwrap(), Value::Int(144));
//! ```
//!
//! ## Configurable syntax
//!
//! Operator precedence, associativity, unary operators, the overload table
//! (keyed by operator string and operand kind pair) and the reserved
//! word/character parser hooks all live in a [`Config`] value. Hosts clone
//! the default configuration and extend it to define their own operators.
//!
//! ## Modules
//!
//! - `value`: the polymorphic [`Value`] model and [`Kind`] tags
//! - `containers`: shared [`List`] and [`Map`] values, scope chains
//! - `functions`: callable values and typed host-function registration
//! - `config`: precedence, overload and parser-hook tables
//! - `compiler`: the shunting-yard compiler producing postfix queues
//! - `evaluator`: the postfix evaluator and operator dispatch
//! - `builtinops`: the seeded default operator surface and global functions
//! - `calculator`: the public compile/evaluate/calculate entry points

use std::fmt;


/// Error type for compilation and evaluation failures.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Malformed expression text (unclosed string/bracket/comment, stray
    /// operator, empty expression, unknown character).
    Syntax(String),
    /// Invalid byte sequence in an identifier position.
    MalformedUtf8(String),
    /// A name that is bound nowhere in the scope chain was used as a value.
    UnknownVariable(String),
    /// A coercion or operation was applied to a value of the wrong kind.
    Type(String),
    /// No overload accepted the operand kind pair for this operator.
    MissingOperator { op: String, left: Kind, right: Kind },
    /// Sequence index outside `[-len, len)`.
    IndexOutOfRange { index: i64, len: usize },
    /// `%` formatting with mismatched argument count or kind.
    Format(String),
    /// Raised by an overload to pass dispatch on to the next matching
    /// overload. Consumed by the dispatcher; never surfaces to callers.
    Reject,
}

impl Error {
    /// Create a syntax error from any message type
    pub fn syntax(message: impl Into<String>) -> Self {
        Error::Syntax(message.into())
    }

    /// Create a type error from any message type
    pub fn type_error(message: impl Into<String>) -> Self {
        Error::Type(message.into())
    }

    /// Create a missing-operator error for an operand kind pair
    pub fn missing_operator(op: impl Into<String>, left: Kind, right: Kind) -> Self {
        Error::MissingOperator {
            op: op.into(),
            left,
            right,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Syntax(msg) => write!(f, "Syntax error: {msg}"),
            Error::MalformedUtf8(msg) => write!(f, "Malformed UTF-8: {msg}"),
            Error::UnknownVariable(name) => write!(f, "Unknown variable: {name}"),
            Error::Type(msg) => write!(f, "Type error: {msg}"),
            Error::MissingOperator { op, left, right } => {
                write!(f, "No operator '{op}' defined for ({left}, {right})")
            }
            Error::IndexOutOfRange { index, len } => {
                write!(f, "Index {index} out of range for length {len}")
            }
            Error::Format(msg) => write!(f, "Format error: {msg}"),
            Error::Reject => write!(f, "Operation rejected"),
        }
    }
}

impl std::error::Error for Error {}

pub mod builtinops;
pub mod calculator;
pub mod compiler;
pub mod config;
pub mod containers;
pub mod evaluator;
pub mod functions;
pub mod value;

pub use builtinops::{default_config, default_global};
pub use calculator::{
    Expression, calculate, calculate_partial, calculate_with_config, compile, compile_partial,
    compile_partial_with_config, compile_with_config, evaluate, evaluate_with,
};
pub use compiler::{RpnBuilder, Token};
pub use config::{ANY_OP, Config, HookFn, OpFn, OperationMap, PrecedenceMap, RefSide};
pub use containers::{List, Map, ValueIterator};
pub use evaluator::EvalContext;
pub use functions::{FromScope, Function, IntoFunction, IntoResult, IntoValue, NativeBody};
pub use value::{Kind, RefData, Value};
