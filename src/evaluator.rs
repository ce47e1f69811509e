//! The postfix evaluator.
//!
//! Consumes a compiled token queue in order, maintaining a value stack.
//! Variable tokens become references (current scope binding first, then
//! the compile-time snapshot); operators dispatch through the overload
//! table after resolving their operands. A reference-consuming operator
//! skips strict resolution only on its declared operand side (`=` binds
//! through its left target; its right-hand side resolves first, and
//! strictly). The synthetic `"()"` operator executes calls,
//! and `"[]"` / `"."` results are wrapped back into references so that
//! indexed and member assignment, and method receiver binding, work.

use crate::Error;
use crate::calculator::Expression;
use crate::compiler::Token;
use crate::config::{ANY_OP, Config, RefSide, op_id};
use crate::containers::Map;
use crate::functions::call_function;
use crate::value::{RefData, Value};

/// Evaluation context handed to operator overloads alongside the resolved
/// operands: the scope and the original (possibly unresolved reference)
/// operand values.
pub struct EvalContext {
    /// The evaluation scope.
    pub scope: Map,
    /// The operator being dispatched, without any unary prefix.
    pub op: String,
    /// The left operand as it sat on the stack, references preserved.
    pub left: Value,
    /// The right operand as it sat on the stack, references preserved.
    pub right: Value,
}

fn pop(stack: &mut Vec<Value>) -> Result<Value, Error> {
    stack
        .pop()
        .ok_or_else(|| Error::syntax("malformed expression"))
}

/// Resolve an operand before dispatch. On the declared reference side of
/// a reference-consuming operator an unbound reference resolves leniently
/// to `None` (the overload inspects the reference itself); everywhere
/// else an unbound name is an error.
fn resolve_operand(operand: &Value, lenient: bool) -> Result<Value, Error> {
    match operand {
        Value::Ref(r) if !r.defined && lenient => Ok(Value::None),
        other => other.resolved(),
    }
}

/// Find and execute the first accepting overload for `op` on the resolved
/// operand pair. Overloads are tried in registration order among those
/// whose masks match; a `Reject` moves on to the next match.
pub(crate) fn dispatch(
    config: &Config,
    op: &str,
    left: &Value,
    right: &Value,
    context: &mut EvalContext,
) -> Result<Value, Error> {
    let actual = op_id(left.kind(), right.kind());
    let entries = config
        .ops
        .entries(op)
        .or_else(|| config.ops.entries(ANY_OP));
    if let Some(entries) = entries {
        for operation in entries {
            if operation.matches(actual) {
                match operation.exec(left, right, context) {
                    Err(Error::Reject) => continue,
                    other => return other,
                }
            }
        }
    }
    Err(Error::missing_operator(op, left.kind(), right.kind()))
}

/// Execute the call operator: pops the argument value and the callable,
/// binds arguments (splitting stuples into keyword arguments), and runs
/// the function in a child of the current scope. A callable reached
/// through member access gets its receiver bound as `this`.
fn exec_call(stack: &mut Vec<Value>, scope: &Map, config: &Config) -> Result<Value, Error> {
    let args_value = pop(stack)?.resolved()?;
    let callable_operand = pop(stack)?;

    let (callable, this) = match &callable_operand {
        Value::Ref(r) => {
            if !r.defined {
                return Err(Error::UnknownVariable(r.key.to_raw_string()));
            }
            let this = match &r.origin {
                Value::None => None,
                origin => Some(origin.clone()),
            };
            (r.value.clone(), this)
        }
        other => (other.clone(), None),
    };
    let Value::Function(func) = callable else {
        return Err(Error::Type(format!("{} is not callable", callable.kind())));
    };

    let items = match args_value {
        Value::Tuple(items) => items,
        other => vec![other],
    };
    let mut positional = Vec::new();
    let mut kwargs = Vec::new();
    for item in items {
        match item {
            Value::STuple(pair) => {
                let mut parts = pair.into_iter();
                let key = parts.next().unwrap_or(Value::None);
                let value = parts.next().unwrap_or(Value::None);
                kwargs.push((key.to_raw_string(), value));
            }
            other => positional.push(other),
        }
    }

    call_function(&func, positional, kwargs, this, scope, config)
}

fn exec_operator(
    op: &str,
    stack: &mut Vec<Value>,
    scope: &Map,
    config: &Config,
) -> Result<(), Error> {
    if op == "()" {
        let result = exec_call(stack, scope, config)?;
        stack.push(result);
        return Ok(());
    }

    let (real_op, left_operand, right_operand) = if let Some(base) = op.strip_prefix('L') {
        let operand = pop(stack)?;
        (base, Value::Unary, operand)
    } else if let Some(base) = op.strip_prefix('R') {
        let operand = pop(stack)?;
        (base, operand, Value::Unary)
    } else {
        let right = pop(stack)?;
        let left = pop(stack)?;
        (op, left, right)
    };

    // The right-hand side resolves first, and only the operator's
    // declared reference side is exempt from strict resolution.
    let side = config.reference_side(real_op);
    let right = resolve_operand(&right_operand, side.is_some_and(RefSide::covers_right))?;
    let left = resolve_operand(&left_operand, side.is_some_and(RefSide::covers_left))?;

    let mut context = EvalContext {
        scope: scope.clone(),
        op: real_op.to_owned(),
        left: left_operand,
        right: right_operand,
    };
    let result = dispatch(config, real_op, &left, &right, &mut context)?;

    // Index and member access yield references to the receiver so that
    // assignment lands in it and calls bind it as `this`.
    if (real_op == "[]" || real_op == ".")
        && matches!(left, Value::Map(_) | Value::List(_) | Value::Str(_))
    {
        stack.push(Value::Ref(Box::new(RefData {
            key: right,
            origin: left,
            value: result,
            defined: true,
        })));
    } else {
        stack.push(result);
    }
    Ok(())
}

/// Evaluate a compiled queue against `scope`. With `keep_refs` the final
/// reference (if any) is returned unresolved, so callers can inspect its
/// key and origin.
pub(crate) fn evaluate_tokens(
    expr: &Expression,
    scope: &Map,
    keep_refs: bool,
    config: &Config,
) -> Result<Value, Error> {
    let mut stack: Vec<Value> = Vec::new();
    for token in &expr.tokens {
        match token {
            Token::Literal(value) => stack.push(value.clone()),
            Token::Var { name, snapshot } => {
                let (value, defined) = match scope.find(name) {
                    Some(v) => (v, true),
                    None => match snapshot {
                        Some(v) => (v.clone(), true),
                        None => (Value::None, false),
                    },
                };
                stack.push(Value::Ref(Box::new(RefData {
                    key: Value::Str(name.clone()),
                    origin: Value::None,
                    value,
                    defined,
                })));
            }
            Token::Op(op) => exec_operator(op, &mut stack, scope, config)?,
        }
    }
    if stack.len() != 1 {
        return Err(Error::syntax("malformed expression"));
    }
    let result = pop(&mut stack)?;
    if keep_refs { Ok(result) } else { result.resolved() }
}
