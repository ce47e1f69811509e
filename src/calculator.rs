//! Public entry points: compile, evaluate, calculate.
//!
//! A compiled [`Expression`] is an immutable postfix queue; it can be
//! evaluated repeatedly, against different scopes. The `_partial` variants
//! stop at caller-supplied delimiter bytes and report the stopping offset,
//! so the compiler can be embedded as a sub-parser inside a larger
//! grammar.

use std::fmt;

use crate::Error;
use crate::builtinops::default_config;
use crate::compiler::{Token, to_rpn};
use crate::config::Config;
use crate::containers::Map;
use crate::evaluator::evaluate_tokens;
use crate::value::Value;

/// A compiled expression: the postfix token queue plus nothing else. The
/// configuration is supplied again at evaluation time and must match the
/// one used to compile.
#[derive(Debug, Clone)]
pub struct Expression {
    pub(crate) tokens: Vec<Token>,
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, token) in self.tokens.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{token}")?;
        }
        Ok(())
    }
}

/// Compile `text` against `scope` with the default configuration.
pub fn compile(text: &str, scope: &Map) -> Result<Expression, Error> {
    compile_with_config(text, scope, default_config())
}

/// Compile `text` against `scope`. The whole input must be consumed; use
/// [`compile_partial_with_config`] for delimiter-terminated parses.
pub fn compile_with_config(
    text: &str,
    scope: &Map,
    config: &Config,
) -> Result<Expression, Error> {
    let (tokens, consumed) = to_rpn(text.as_bytes(), scope, None, config)?;
    if consumed < text.len() {
        return Err(Error::Syntax(format!(
            "unexpected trailing input at offset {consumed}"
        )));
    }
    Ok(Expression { tokens })
}

/// Compile until end of input or a byte from `delimiters` at bracket level
/// zero. Returns the expression and the offset of the stopping byte
/// (`text.len()` when everything was consumed).
pub fn compile_partial(
    text: &str,
    scope: &Map,
    delimiters: &str,
) -> Result<(Expression, usize), Error> {
    compile_partial_with_config(text, scope, delimiters, default_config())
}

pub fn compile_partial_with_config(
    text: &str,
    scope: &Map,
    delimiters: &str,
    config: &Config,
) -> Result<(Expression, usize), Error> {
    let (tokens, consumed) = to_rpn(
        text.as_bytes(),
        scope,
        Some(delimiters.as_bytes()),
        config,
    )?;
    Ok((Expression { tokens }, consumed))
}

/// Evaluate a compiled expression against `scope`.
pub fn evaluate(expr: &Expression, scope: &Map) -> Result<Value, Error> {
    evaluate_with(expr, scope, false, default_config())
}

/// Evaluate with an explicit configuration. With `keep_refs` the final
/// reference (if any) is returned unresolved.
pub fn evaluate_with(
    expr: &Expression,
    scope: &Map,
    keep_refs: bool,
    config: &Config,
) -> Result<Value, Error> {
    evaluate_tokens(expr, scope, keep_refs, config)
}

/// Compile and evaluate in one step.
pub fn calculate(text: &str, scope: &Map) -> Result<Value, Error> {
    let expr = compile(text, scope)?;
    evaluate(&expr, scope)
}

pub fn calculate_with_config(text: &str, scope: &Map, config: &Config) -> Result<Value, Error> {
    let expr = compile_with_config(text, scope, config)?;
    evaluate_with(&expr, scope, false, config)
}

/// Compile-and-evaluate stopping at a delimiter; returns the value and
/// the stopping offset.
pub fn calculate_partial(
    text: &str,
    scope: &Map,
    delimiters: &str,
) -> Result<(Value, usize), Error> {
    let (expr, consumed) = compile_partial(text, scope, delimiters)?;
    Ok((evaluate(&expr, scope)?, consumed))
}
