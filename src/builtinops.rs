//! The seeded default surface: operator precedences and overloads,
//! reserved words, the comment hook, per-kind attribute methods, and the
//! default global function library.
//!
//! ## Operators
//!
//! Arithmetic preserves integers when both sides are integral (division
//! always produces a real); comparisons return booleans; `&&`/`||`
//! evaluate both sides eagerly and coerce with boolean truth; `+`
//! concatenates strings (coercing the other side) and lists; `%` formats
//! strings printf-style with `%s` directives; `[]`/`.` index strings,
//! lists and maps; `=` assigns through references; `,`/`:` build tuples
//! and stuples.
//!
//! ## Default global
//!
//! Host functions live in a per-thread *default global* map that roots
//! every scope chain: `sqrt`, `sin`, `cos`, `tan`, `abs`, `pow`, `float`,
//! `int`, `str`, `type`, `print`, `sum`, `eval`, `extend`, plus the `map`
//! and `list` constructors the `{...}` / `[...]` literals lower to.
//! Scopes may shadow these names but never overwrite the global itself.

use std::cmp::Ordering;
use std::sync::LazyLock;

use crate::Error;
use crate::compiler::RpnBuilder;
use crate::config::Config;
use crate::containers::{List, Map, wrap_index};
use crate::evaluator::EvalContext;
use crate::functions::Function;
use crate::value::{Kind, Value};

fn int_like(value: &Value) -> Option<i64> {
    match value {
        Value::Int(n) => Some(*n),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

// Integer arithmetic wraps; mixed operands promote to real.
macro_rules! integer_preserving {
    ($name:ident, $int_method:ident, $real_op:tt) => {
        fn $name(left: &Value, right: &Value, _context: &mut EvalContext) -> Result<Value, Error> {
            if let (Some(a), Some(b)) = (int_like(left), int_like(right)) {
                Ok(Value::Int(a.$int_method(b)))
            } else {
                Ok(Value::Real(left.as_real()? $real_op right.as_real()?))
            }
        }
    };
}

integer_preserving!(op_add, wrapping_add, +);
integer_preserving!(op_sub, wrapping_sub, -);
integer_preserving!(op_mul, wrapping_mul, *);

fn op_div(left: &Value, right: &Value, _context: &mut EvalContext) -> Result<Value, Error> {
    Ok(Value::Real(left.as_real()? / right.as_real()?))
}

fn op_mod(left: &Value, right: &Value, _context: &mut EvalContext) -> Result<Value, Error> {
    if let (Some(a), Some(b)) = (int_like(left), int_like(right)) {
        if b == 0 {
            return Err(Error::type_error("modulo by zero"));
        }
        Ok(Value::Int(a.wrapping_rem(b)))
    } else {
        Ok(Value::Real(left.as_real()? % right.as_real()?))
    }
}

fn op_pow(left: &Value, right: &Value, _context: &mut EvalContext) -> Result<Value, Error> {
    Ok(Value::Real(left.as_real()?.powf(right.as_real()?)))
}

macro_rules! shift_op {
    ($name:ident, $method:ident) => {
        fn $name(left: &Value, right: &Value, _context: &mut EvalContext) -> Result<Value, Error> {
            let amount = right.as_int()?;
            if amount < 0 {
                return Err(Error::type_error("negative shift amount"));
            }
            Ok(Value::Int(left.as_int()?.$method(amount as u32)))
        }
    };
}

shift_op!(op_shift_left, wrapping_shl);
shift_op!(op_shift_right, wrapping_shr);

fn op_equal(left: &Value, right: &Value, _context: &mut EvalContext) -> Result<Value, Error> {
    Ok(Value::Bool(left == right))
}

fn op_not_equal(left: &Value, right: &Value, _context: &mut EvalContext) -> Result<Value, Error> {
    Ok(Value::Bool(left != right))
}

// Ordered comparisons share the numeric/string ordering; unordered kind
// pairs reject so dispatch can fall through to host overloads.
macro_rules! ordered_comparison {
    ($name:ident, $($ord:pat_param)|+) => {
        fn $name(left: &Value, right: &Value, _context: &mut EvalContext) -> Result<Value, Error> {
            match left.compare(right) {
                Some(ordering) => Ok(Value::Bool(matches!(ordering, $($ord)|+))),
                None => Err(Error::Reject),
            }
        }
    };
}

ordered_comparison!(op_less, Ordering::Less);
ordered_comparison!(op_less_equal, Ordering::Less | Ordering::Equal);
ordered_comparison!(op_greater, Ordering::Greater);
ordered_comparison!(op_greater_equal, Ordering::Greater | Ordering::Equal);

// The language has no real short-circuit: both sides are already
// evaluated by the time the operator dispatches.
fn op_and(left: &Value, right: &Value, _context: &mut EvalContext) -> Result<Value, Error> {
    Ok(Value::Bool(left.as_bool() && right.as_bool()))
}

fn op_or(left: &Value, right: &Value, _context: &mut EvalContext) -> Result<Value, Error> {
    Ok(Value::Bool(left.as_bool() || right.as_bool()))
}

fn op_concat(left: &Value, right: &Value, _context: &mut EvalContext) -> Result<Value, Error> {
    // The low mask bits alias across kind families, so confirm a string
    // really is involved before concatenating.
    if !matches!(left, Value::Str(_)) && !matches!(right, Value::Str(_)) {
        return Err(Error::Reject);
    }
    Ok(Value::Str(left.to_raw_string() + &right.to_raw_string()))
}

fn op_list_concat(left: &Value, right: &Value, _context: &mut EvalContext) -> Result<Value, Error> {
    if let (Value::List(a), Value::List(b)) = (left, right) {
        let mut items = a.values();
        items.extend(b.values());
        Ok(Value::List(List::from_vec(items)))
    } else {
        Err(Error::Reject)
    }
}

/// Printf-style formatting: `%s` consumes the next argument, `\%` escapes
/// a directive, any other `%` is literal. Arity mismatch fails.
fn op_format(left: &Value, right: &Value, _context: &mut EvalContext) -> Result<Value, Error> {
    let Value::Str(template) = left else {
        return Err(Error::Reject);
    };
    let arguments = match right {
        Value::Tuple(items) => items.clone(),
        other => vec![other.clone()],
    };
    let mut supplied = arguments.into_iter();
    let chars: Vec<char> = template.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' if chars.get(i + 1) == Some(&'%') => {
                out.push('%');
                i += 2;
            }
            '%' if chars.get(i + 1) == Some(&'s') => {
                match supplied.next() {
                    Some(value) => out.push_str(&value.to_raw_string()),
                    None => {
                        return Err(Error::Format(
                            "not enough arguments for format string".into(),
                        ));
                    }
                }
                i += 2;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    if supplied.next().is_some() {
        return Err(Error::Format("too many arguments for format string".into()));
    }
    Ok(Value::Str(out))
}

/// Member and index lookup on maps: the map's own chain first, then the
/// map attribute methods. A missing key resolves to `None` (still
/// assignable through the reference the evaluator wraps around it).
fn op_map_index(left: &Value, right: &Value, _context: &mut EvalContext) -> Result<Value, Error> {
    let Value::Map(map) = left else {
        return Err(Error::Reject);
    };
    let key = right.to_raw_string();
    match map.find(&key) {
        Some(value) => Ok(value),
        None => Ok(type_attribute(Kind::MAP, &key).unwrap_or(Value::None)),
    }
}

fn op_list_index(left: &Value, right: &Value, _context: &mut EvalContext) -> Result<Value, Error> {
    let Value::List(list) = left else {
        return Err(Error::Reject);
    };
    list.at(right.as_int()?)
}

fn op_str_index(left: &Value, right: &Value, _context: &mut EvalContext) -> Result<Value, Error> {
    let Value::Str(s) = left else {
        return Err(Error::Reject);
    };
    let chars: Vec<char> = s.chars().collect();
    let index = wrap_index(right.as_int()?, chars.len())?;
    Ok(Value::Str(chars[index].to_string()))
}

/// Member access on non-map kinds: the per-kind attribute methods.
fn op_type_attr(left: &Value, right: &Value, _context: &mut EvalContext) -> Result<Value, Error> {
    Ok(type_attribute(left.kind().base(), &right.to_raw_string()).unwrap_or(Value::None))
}

/// Assignment binds through the left reference: into the origin container
/// for member/index targets, through the scope chain for bare names.
fn op_assign(_left: &Value, right: &Value, context: &mut EvalContext) -> Result<Value, Error> {
    let Value::Ref(target) = &context.left else {
        return Err(Error::type_error("assignment target is not a reference"));
    };
    match &target.origin {
        Value::Map(map) => map.insert(target.key.to_raw_string(), right.clone()),
        Value::List(list) => list.set(target.key.as_int()?, right.clone())?,
        Value::None => match &target.key {
            Value::Str(name) => context.scope.set(name, right.clone()),
            other => {
                return Err(Error::Type(format!(
                    "invalid assignment target '{other}'"
                )));
            }
        },
        other => {
            return Err(Error::Type(format!("cannot assign into {}", other.kind())));
        }
    }
    Ok(right.clone())
}

/// The comma operator accumulates into a tuple.
fn op_comma(left: &Value, right: &Value, _context: &mut EvalContext) -> Result<Value, Error> {
    match left {
        Value::Tuple(items) => {
            let mut items = items.clone();
            items.push(right.clone());
            Ok(Value::Tuple(items))
        }
        other => Ok(Value::Tuple(vec![other.clone(), right.clone()])),
    }
}

/// The `:` operator builds a key-value stuple. An unbound bare name on
/// the left contributes its own name as the key, so `{a: 1}` works
/// without quoting.
fn op_stuple(left: &Value, right: &Value, context: &mut EvalContext) -> Result<Value, Error> {
    let key = match &context.left {
        Value::Ref(r) if !r.defined => r.key.clone(),
        _ => left.clone(),
    };
    Ok(Value::STuple(vec![key, right.clone()]))
}

fn op_negate(_left: &Value, right: &Value, _context: &mut EvalContext) -> Result<Value, Error> {
    match right {
        Value::Int(n) => Ok(Value::Int(n.wrapping_neg())),
        Value::Bool(b) => Ok(Value::Int(-i64::from(*b))),
        Value::Real(r) => Ok(Value::Real(-r)),
        _ => Err(Error::Reject),
    }
}

fn op_identity(_left: &Value, right: &Value, _context: &mut EvalContext) -> Result<Value, Error> {
    Ok(right.clone())
}

fn op_not(_left: &Value, right: &Value, _context: &mut EvalContext) -> Result<Value, Error> {
    Ok(Value::Bool(!right.as_bool()))
}

fn rword_true(builder: &mut RpnBuilder, _input: &[u8], pos: usize) -> Result<usize, Error> {
    builder.handle_token(Value::Bool(true))?;
    Ok(pos)
}

fn rword_false(builder: &mut RpnBuilder, _input: &[u8], pos: usize) -> Result<usize, Error> {
    builder.handle_token(Value::Bool(false))?;
    Ok(pos)
}

fn rword_none(builder: &mut RpnBuilder, _input: &[u8], pos: usize) -> Result<usize, Error> {
    builder.handle_token(Value::None)?;
    Ok(pos)
}

/// `#` comments run to the end of the line without consuming the newline,
/// so a newline in the caller's delimiter set still terminates the parse.
fn hook_line_comment(
    _builder: &mut RpnBuilder,
    input: &[u8],
    mut pos: usize,
) -> Result<usize, Error> {
    while pos < input.len() && input[pos] != b'\n' && input[pos] != 0 {
        pos += 1;
    }
    Ok(pos)
}

//
// Attribute methods, reachable through member access on receivers.
//

fn this_list(scope: &Map) -> Result<List, Error> {
    match scope.get("this") {
        Some(Value::List(list)) => Ok(list),
        _ => Err(Error::type_error("list method called without a list receiver")),
    }
}

fn this_map(scope: &Map) -> Result<Map, Error> {
    match scope.get("this") {
        Some(Value::Map(map)) => Ok(map),
        _ => Err(Error::type_error("map method called without a map receiver")),
    }
}

fn this_str(scope: &Map) -> Result<String, Error> {
    match scope.get("this") {
        Some(Value::Str(s)) => Ok(s),
        _ => Err(Error::type_error("string method called without a string receiver")),
    }
}

fn extra_arg(scope: &Map, index: i64) -> Option<Value> {
    match scope.get("args") {
        Some(Value::List(args)) => args.at(index).ok(),
        _ => None,
    }
}

fn list_len(scope: &Map) -> Result<Value, Error> {
    Ok(Value::Int(this_list(scope)?.len() as i64))
}

// push returns the receiver so pushes chain.
fn list_push(scope: &Map) -> Result<Value, Error> {
    let list = this_list(scope)?;
    list.push(scope.get("item").unwrap_or(Value::None));
    Ok(Value::List(list))
}

fn list_pop(scope: &Map) -> Result<Value, Error> {
    let list = this_list(scope)?;
    match scope.get("index") {
        Some(Value::None) | None => list
            .pop()
            .ok_or_else(|| Error::type_error("pop from an empty list")),
        Some(index) => list.pop_at(index.as_int()?),
    }
}

fn map_len(scope: &Map) -> Result<Value, Error> {
    Ok(Value::Int(this_map(scope)?.len() as i64))
}

fn map_pop(scope: &Map) -> Result<Value, Error> {
    let map = this_map(scope)?;
    let key = match scope.get("key") {
        Some(Value::None) | None => return Err(Error::type_error("pop requires a key")),
        Some(key) => key.to_raw_string(),
    };
    match map.remove(&key) {
        Some(value) => Ok(value),
        None => Ok(extra_arg(scope, 0).unwrap_or(Value::None)),
    }
}

fn map_instanceof(scope: &Map) -> Result<Value, Error> {
    let map = this_map(scope)?;
    match scope.get("other") {
        Some(Value::Map(other)) => Ok(Value::Bool(map.instanceof(&other))),
        _ => Err(Error::type_error("instanceof requires a map argument")),
    }
}

fn str_len(scope: &Map) -> Result<Value, Error> {
    Ok(Value::Int(this_str(scope)?.chars().count() as i64))
}

fn str_lower(scope: &Map) -> Result<Value, Error> {
    Ok(Value::Str(this_str(scope)?.to_lowercase()))
}

fn str_upper(scope: &Map) -> Result<Value, Error> {
    Ok(Value::Str(this_str(scope)?.to_uppercase()))
}

fn str_strip(scope: &Map) -> Result<Value, Error> {
    Ok(Value::Str(this_str(scope)?.trim().to_owned()))
}

fn str_split(scope: &Map) -> Result<Value, Error> {
    let s = this_str(scope)?;
    let sep = match scope.get("sep") {
        Some(Value::Str(sep)) if !sep.is_empty() => sep,
        _ => return Err(Error::type_error("split requires a non-empty separator")),
    };
    let parts = s
        .split(&sep)
        .map(|part| Value::Str(part.to_owned()))
        .collect();
    Ok(Value::List(List::from_vec(parts)))
}

fn str_join(scope: &Map) -> Result<Value, Error> {
    let sep = this_str(scope)?;
    match scope.get("list") {
        Some(Value::List(list)) => {
            let joined = list
                .values()
                .iter()
                .map(Value::to_raw_string)
                .collect::<Vec<_>>()
                .join(&sep);
            Ok(Value::Str(joined))
        }
        _ => Err(Error::type_error("join requires a list argument")),
    }
}

/// Look up an attribute method for a base kind. Methods are materialized
/// as fresh function values on each access.
fn type_attribute(kind: Kind, name: &str) -> Option<Value> {
    let (arg_names, body): (&[&str], fn(&Map) -> Result<Value, Error>) = match (kind, name) {
        (Kind::LIST, "len") => (&[], list_len),
        (Kind::LIST, "push") => (&["item"], list_push),
        (Kind::LIST, "pop") => (&["index"], list_pop),
        (Kind::MAP, "len") => (&[], map_len),
        (Kind::MAP, "pop") => (&["key"], map_pop),
        (Kind::MAP, "instanceof") => (&["other"], map_instanceof),
        (Kind::STR, "len") => (&[], str_len),
        (Kind::STR, "lower") => (&[], str_lower),
        (Kind::STR, "upper") => (&[], str_upper),
        (Kind::STR, "strip") => (&[], str_strip),
        (Kind::STR, "split") => (&["sep"], str_split),
        (Kind::STR, "join") => (&["list"], str_join),
        _ => return None,
    };
    Some(Value::function(Function::native(name, arg_names, body)))
}

//
// Default global functions.
//

fn arg(scope: &Map, name: &str) -> Result<Value, Error> {
    match scope.get(name) {
        Some(Value::None) | None => Err(Error::Type(format!("missing argument '{name}'"))),
        Some(value) => Ok(value),
    }
}

fn builtin_abs(scope: &Map) -> Result<Value, Error> {
    match arg(scope, "number")? {
        Value::Int(n) => Ok(Value::Int(n.wrapping_abs())),
        other => Ok(Value::Real(other.as_real()?.abs())),
    }
}

fn builtin_str(scope: &Map) -> Result<Value, Error> {
    let value = scope.get("value").unwrap_or(Value::None);
    if let Value::Map(map) = &value
        && let Some(Value::Function(hook)) = map.find("__str__")
    {
        return Ok(Value::Str(crate::functions::invoke_str_hook(&hook, map)?));
    }
    Ok(Value::Str(value.to_raw_string()))
}

fn builtin_type(scope: &Map) -> Result<Value, Error> {
    let value = scope.get("value").unwrap_or(Value::None);
    if let Value::Map(map) = &value
        && let Some(tag) = map.find("__type__")
    {
        return Ok(Value::Str(tag.to_raw_string()));
    }
    Ok(Value::Str(value.kind().type_name().to_owned()))
}

fn builtin_print(scope: &Map) -> Result<Value, Error> {
    let line = match scope.get("args") {
        Some(Value::List(args)) => args
            .values()
            .iter()
            .map(Value::to_raw_string)
            .collect::<Vec<_>>()
            .join(" "),
        _ => String::new(),
    };
    println!("{line}");
    Ok(Value::None)
}

fn builtin_sum(scope: &Map) -> Result<Value, Error> {
    let mut total = 0.0;
    if let Some(Value::List(args)) = scope.get("args") {
        for value in args.values() {
            total += value.as_real()?;
        }
    }
    Ok(Value::Real(total))
}

/// Compile and evaluate a sub-expression against the calling scope, so
/// assignments made inside it are visible to the caller.
fn builtin_eval(scope: &Map) -> Result<Value, Error> {
    let text = arg(scope, "expression")?.as_string()?;
    crate::calculator::calculate(&text, scope)
}

fn builtin_extend(scope: &Map) -> Result<Value, Error> {
    match arg(scope, "map")? {
        Value::Map(map) => Ok(Value::Map(map.child())),
        other => Err(Error::Type(format!("cannot extend {}", other.kind()))),
    }
}

/// The `map` constructor behind `{...}` literals: keyword arguments
/// become entries, in order.
fn builtin_map_constructor(scope: &Map) -> Result<Value, Error> {
    if let Some(Value::List(args)) = scope.get("args")
        && !args.is_empty()
    {
        return Err(Error::type_error(
            "map constructor takes only key: value arguments",
        ));
    }
    let map = Map::new();
    if let Some(Value::Map(kwargs)) = scope.get("kwargs") {
        for key in kwargs.keys() {
            map.insert(key.clone(), kwargs.get(&key).unwrap_or(Value::None));
        }
    }
    Ok(Value::Map(map))
}

/// The `list` constructor behind `[...]` literals. A single iterable
/// argument initializes from its iteration order (map keys for maps);
/// anything else collects the arguments as elements.
fn builtin_list_constructor(scope: &Map) -> Result<Value, Error> {
    let values = match scope.get("args") {
        Some(Value::List(args)) => args.values(),
        _ => Vec::new(),
    };
    let items = if values.len() == 1 {
        match &values[0] {
            Value::Map(map) => map.keys().into_iter().map(Value::Str).collect(),
            Value::List(list) => list.values(),
            Value::Iterator(it) => {
                let mut items = Vec::new();
                while let Some(value) = it.advance() {
                    items.push(value);
                }
                items
            }
            single => vec![single.clone()],
        }
    } else {
        values
    };
    Ok(Value::List(List::from_vec(items)))
}

fn build_default_global() -> Map {
    let global = Map::orphan();

    global.register_function("sqrt", &["number"], |n: f64| n.sqrt());
    global.register_function("sin", &["number"], |n: f64| n.sin());
    global.register_function("cos", &["number"], |n: f64| n.cos());
    global.register_function("tan", &["number"], |n: f64| n.tan());
    global.register_function("pow", &["number", "exp"], |n: f64, e: f64| n.powf(e));
    global.register_function("float", &["value"], |v: f64| v);
    global.register_function("int", &["value"], |v: i64| v);

    global.register_native("abs", &["number"], builtin_abs);
    global.register_native("str", &["value"], builtin_str);
    global.register_native("type", &["value"], builtin_type);
    global.register_native("print", &[], builtin_print);
    global.register_native("sum", &[], builtin_sum);
    global.register_native("eval", &["expression"], builtin_eval);
    global.register_native("extend", &["map"], builtin_extend);
    global.register_native("map", &[], builtin_map_constructor);
    global.register_native("list", &[], builtin_list_constructor);

    global
}

thread_local! {
    static DEFAULT_GLOBAL: Map = build_default_global();
}

/// The default global map for this thread: the implicit root parent of
/// every scope chain.
pub fn default_global() -> Map {
    DEFAULT_GLOBAL.with(Map::clone)
}

fn build_default_config() -> Config {
    let mut config = Config::empty();

    let precedence = &mut config.precedence;
    precedence.add("[]", 2);
    precedence.add("()", 2);
    precedence.add(".", 2);
    precedence.add("**", 3);
    precedence.add("*", 5);
    precedence.add("/", 5);
    precedence.add("%", 5);
    precedence.add("+", 6);
    precedence.add("-", 6);
    precedence.add("<<", 7);
    precedence.add(">>", 7);
    precedence.add("<", 8);
    precedence.add("<=", 8);
    precedence.add(">", 8);
    precedence.add(">=", 8);
    precedence.add("==", 9);
    precedence.add("!=", 9);
    precedence.add("&&", 13);
    precedence.add("||", 14);
    precedence.add(":", 15);
    precedence.add(",", 16);
    precedence.add("=", -16);
    precedence.add_unary("+", 3);
    precedence.add_unary("-", 3);
    precedence.add_unary("!", 3);

    let ops = &mut config.ops;
    ops.add((Kind::NUM, "+", Kind::NUM), op_add);
    ops.add((Kind::STR, "+", Kind::ANY), op_concat);
    ops.add((Kind::ANY, "+", Kind::STR), op_concat);
    ops.add((Kind::LIST, "+", Kind::LIST), op_list_concat);
    ops.add((Kind::NUM, "-", Kind::NUM), op_sub);
    ops.add((Kind::NUM, "*", Kind::NUM), op_mul);
    ops.add((Kind::NUM, "/", Kind::NUM), op_div);
    ops.add((Kind::NUM, "%", Kind::NUM), op_mod);
    ops.add((Kind::STR, "%", Kind::ANY), op_format);
    ops.add((Kind::NUM, "**", Kind::NUM), op_pow);
    ops.add((Kind::NUM, "<<", Kind::NUM), op_shift_left);
    ops.add((Kind::NUM, ">>", Kind::NUM), op_shift_right);
    ops.add((Kind::ANY, "==", Kind::ANY), op_equal);
    ops.add((Kind::ANY, "!=", Kind::ANY), op_not_equal);
    ops.add((Kind::NUM, "<", Kind::NUM), op_less);
    ops.add((Kind::STR, "<", Kind::STR), op_less);
    ops.add((Kind::NUM, "<=", Kind::NUM), op_less_equal);
    ops.add((Kind::STR, "<=", Kind::STR), op_less_equal);
    ops.add((Kind::NUM, ">", Kind::NUM), op_greater);
    ops.add((Kind::STR, ">", Kind::STR), op_greater);
    ops.add((Kind::NUM, ">=", Kind::NUM), op_greater_equal);
    ops.add((Kind::STR, ">=", Kind::STR), op_greater_equal);
    ops.add((Kind::ANY, "&&", Kind::ANY), op_and);
    ops.add((Kind::ANY, "||", Kind::ANY), op_or);
    ops.add((Kind::MAP, "[]", Kind::STR), op_map_index);
    ops.add((Kind::LIST, "[]", Kind::NUM), op_list_index);
    ops.add((Kind::STR, "[]", Kind::NUM), op_str_index);
    ops.add((Kind::MAP, ".", Kind::STR), op_map_index);
    ops.add((Kind::ANY, ".", Kind::STR), op_type_attr);
    ops.add((Kind::ANY, "=", Kind::ANY), op_assign);
    ops.add((Kind::ANY, ",", Kind::ANY), op_comma);
    ops.add((Kind::ANY, ":", Kind::ANY), op_stuple);
    ops.add((Kind::UNARY, "-", Kind::NUM), op_negate);
    ops.add((Kind::UNARY, "+", Kind::NUM), op_identity);
    ops.add((Kind::UNARY, "!", Kind::ANY), op_not);

    config.register_reserved_word("True", rword_true);
    config.register_reserved_word("False", rword_false);
    config.register_reserved_word("None", rword_none);
    config.register_reserved_char(b'#', hook_line_comment);

    config
}

static DEFAULT_CONFIG: LazyLock<Config> = LazyLock::new(build_default_config);

/// The process-wide default configuration.
pub fn default_config() -> &'static Config {
    &DEFAULT_CONFIG
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::calculator::calculate;
    use crate::value::val;

    /// Expected outcome of a calculate test case.
    enum Expected {
        Val(Value),
        Approx(f64),
        Error,
    }
    use Expected::*;

    fn run_cases(scope: &Map, cases: Vec<(&str, Expected)>) {
        for (i, (input, expected)) in cases.iter().enumerate() {
            let test_id = format!("case #{} {input:?}", i + 1);
            let result = calculate(input, scope);
            match (result, expected) {
                (Ok(actual), Val(value)) => {
                    assert_eq!(&actual, value, "{test_id}: value mismatch");
                }
                (Ok(actual), Approx(value)) => {
                    let got = actual.as_real().unwrap_or(f64::NAN);
                    assert!(
                        (got - value).abs() < 1e-9,
                        "{test_id}: expected ~{value}, got {got}"
                    );
                }
                (Err(_), Error) => {}
                (Ok(actual), Error) => panic!("{test_id}: expected error, got {actual:?}"),
                (Err(err), _) => panic!("{test_id}: unexpected error {err}"),
            }
        }
    }

    /// The environment the end-to-end cases run against.
    fn seeded_scope() -> Map {
        let scope = Map::new();
        scope.insert("pi", 3.14);
        scope.insert("b1", 0.0);
        scope.insert("b2", 0.86);
        scope.insert("_b", 0);
        scope.insert("str1", "foo");
        scope.insert("str2", "bar");
        scope.insert("str3", "foobar");
        scope.insert("str4", "foo10");
        scope.insert("str5", "10bar");

        let key3 = Map::new();
        key3.insert("map1", "inception1");
        key3.insert("map2", "inception2");
        let tmap = Map::new();
        tmap.insert("key", "mapped value");
        tmap.insert("key1", "second mapped value");
        tmap.insert("key2", 10);
        tmap.insert("key3", key3);
        scope.insert("map", tmap);
        scope
    }

    #[test]
    fn test_arithmetic() {
        let scope = seeded_scope();
        run_cases(
            &scope,
            vec![
                ("-pi + 1", Approx(-2.14)),
                ("-pi + 1 * b1", Approx(-3.14)),
                ("(20+10)*3/2-3", Approx(42.0)),
                ("1 << 4", Val(val(16))),
                ("16 >> 2", Val(val(4))),
                ("1+(-2*3)", Approx(-5.0)),
                ("1+_b+(-2*3)", Approx(-5.0)),
                ("4 * -3", Val(val(-12))),
                ("2 ** 3", Approx(8.0)),
                ("7 % 3", Val(val(1))),
                ("7.5 % 2", Approx(1.5)),
                ("7 % 0", Error),
                // Integer arithmetic stays integral, division never does.
                ("2 + 3", Val(val(5))),
                ("6 / 3", Val(Value::Real(2.0))),
            ],
        );
        assert_eq!(calculate("2 + 3", &scope).unwrap().kind(), Kind::INT);
        assert_eq!(calculate("6 / 3", &scope).unwrap().kind(), Kind::REAL);
    }

    #[test]
    fn test_boolean_expressions() {
        let scope = Map::new();
        run_cases(
            &scope,
            vec![
                ("3 < 3", Val(val(false))),
                ("3 <= 3", Val(val(true))),
                ("3 > 3", Val(val(false))),
                ("3 >= 3", Val(val(true))),
                ("3 == 3", Val(val(true))),
                ("3 != 3", Val(val(false))),
                ("(3 && True) == True", Val(val(true))),
                ("(3 && 0) == True", Val(val(false))),
                ("(3 || 0) == True", Val(val(true))),
                ("(False || 0) == True", Val(val(false))),
                ("10 == None", Val(val(false))),
                ("10 != None", Val(val(true))),
                ("10 == 'str'", Val(val(false))),
                ("10 != 'str'", Val(val(true))),
                ("'abc' < 'abd'", Val(val(true))),
                ("!False", Val(val(true))),
                ("!3", Val(val(false))),
            ],
        );
        assert_eq!(calculate("True", &scope).unwrap().kind(), Kind::BOOL);
        assert_eq!(calculate("10 == 'str'", &scope).unwrap().kind(), Kind::BOOL);
    }

    #[test]
    fn test_string_expressions() {
        let scope = seeded_scope();
        run_cases(
            &scope,
            vec![
                ("str1 + str2 == str3", Val(val(true))),
                ("str1 + str2 != str3", Val(val(false))),
                ("str1 + 10 == str4", Val(val(true))),
                ("10 + str2 == str5", Val(val(true))),
                ("'foo' + \"bar\" == str3", Val(val(true))),
                ("'foo' + \"bar\" != 'foobar\"'", Val(val(true))),
                // Formatting.
                ("'the test %s working' % 'is'", Val(val("the test is working"))),
                (
                    "'the tests %s %s' % ('are', 'working')",
                    Val(val("the tests are working")),
                ),
                ("'works %s% %s' % (100, 'now')", Val(val("works 100% now"))),
                (
                    "'escape \\%s works %s' % ('now')",
                    Val(val("escape %s works now")),
                ),
                ("'the tests %s' % ('are', 'working')", Error),
                ("'the tests %s %s' % ('are')", Error),
                // Indexing.
                ("'foobar'[0]", Val(val("f"))),
                ("'foobar'[3]", Val(val("b"))),
                ("'foobar'[-1]", Val(val("r"))),
                ("'foobar'[-3]", Val(val("b"))),
                ("'foobar'[10]", Error),
            ],
        );
    }

    #[test]
    fn test_string_methods() {
        let scope = Map::new();
        scope.insert("s1", "String");
        scope.insert("s2", " a b ");
        run_cases(
            &scope,
            vec![
                ("s1.len()", Val(val(6))),
                ("s1.lower()", Val(val("string"))),
                ("s1.upper()", Val(val("STRING"))),
                ("s2.strip()", Val(val("a b"))),
                ("'a, b'.split(', ').len()", Val(val(2))),
            ],
        );
        let split = calculate("L = 'a, b'.split(', ')", &scope).unwrap();
        assert_eq!(split.to_string(), "[ \"a\", \"b\" ]");
        assert_eq!(calculate("L.join(', ')", &scope).unwrap(), val("a, b"));
    }

    #[test]
    fn test_map_access() {
        let scope = seeded_scope();
        run_cases(
            &scope,
            vec![
                ("map[\"key\"]", Val(val("mapped value"))),
                ("map[\"key\"+1]", Val(val("second mapped value"))),
                ("map[\"key\"+2] + 3 == 13", Val(val(true))),
                ("map.key1", Val(val("second mapped value"))),
                ("map.key3.map1", Val(val("inception1"))),
                ("map.key3['map2']", Val(val("inception2"))),
                ("map[\"no_key\"]", Val(Value::None)),
            ],
        );
    }

    #[test]
    fn test_map_usage() {
        let scope = Map::new();
        scope.insert("my_map", Map::new());
        for text in ["my_map['a'] = 1", "my_map['b'] = 2", "my_map['c'] = 3"] {
            calculate(text, &scope).unwrap();
        }
        assert_eq!(
            scope.get("my_map").unwrap().to_string(),
            "{ \"a\": 1, \"b\": 2, \"c\": 3 }"
        );
        assert_eq!(calculate("my_map.len()", &scope).unwrap(), val(3));

        calculate("my_map.pop('b')", &scope).unwrap();
        assert_eq!(
            scope.get("my_map").unwrap().to_string(),
            "{ \"a\": 1, \"c\": 3 }"
        );
        assert_eq!(calculate("my_map.len()", &scope).unwrap(), val(2));

        calculate("default = my_map.pop('b', 3)", &scope).unwrap();
        assert_eq!(scope.get("default").unwrap(), val(3));
    }

    #[test]
    fn test_list_usage() {
        let scope = Map::new();
        scope.insert("my_list", List::new());

        for text in ["my_list.push(1)", "my_list.push(2)", "my_list.push(3)"] {
            calculate(text, &scope).unwrap();
        }
        assert_eq!(scope.get("my_list").unwrap().to_string(), "[ 1, 2, 3 ]");
        assert_eq!(calculate("my_list.len()", &scope).unwrap(), val(3));

        calculate("my_list.pop(1)", &scope).unwrap();
        assert_eq!(scope.get("my_list").unwrap().to_string(), "[ 1, 3 ]");

        calculate("my_list.pop()", &scope).unwrap();
        assert_eq!(scope.get("my_list").unwrap().to_string(), "[ 1 ]");

        // Pushes chain because push returns the receiver.
        scope.insert("list", List::new());
        calculate("list.push(4).push(5).push(6)", &scope).unwrap();
        calculate("my_list.push(2).push(3)", &scope).unwrap();
        assert_eq!(scope.get("my_list").unwrap().to_string(), "[ 1, 2, 3 ]");
        assert_eq!(scope.get("list").unwrap().to_string(), "[ 4, 5, 6 ]");

        // Concatenation builds a fresh list.
        calculate("concat = my_list + list", &scope).unwrap();
        assert_eq!(
            scope.get("concat").unwrap().to_string(),
            "[ 1, 2, 3, 4, 5, 6 ]"
        );
        assert_eq!(calculate("concat.len()", &scope).unwrap(), val(6));

        // Negative-wrap indexing, reads and writes.
        calculate("concat[-2] = 10", &scope).unwrap();
        calculate("concat[2] = '3'", &scope).unwrap();
        calculate("concat[3] = None", &scope).unwrap();
        assert_eq!(
            scope.get("concat").unwrap().to_string(),
            "[ 1, 2, \"3\", None, 10, 6 ]"
        );
        assert!(calculate("concat[10]", &scope).is_err());
        assert!(calculate("concat[-10]", &scope).is_err());
    }

    #[test]
    fn test_constructors() {
        let scope = Map::new();
        calculate("my_map = map()", &scope).unwrap();
        calculate("my_list = list()", &scope).unwrap();
        assert_eq!(scope.get("my_map").unwrap().kind(), Kind::MAP);
        assert_eq!(scope.get("my_list").unwrap().kind(), Kind::LIST);
        assert_eq!(calculate("my_list.len()", &scope).unwrap(), val(0));

        calculate(
            "my_list = list(1,'2',None,map(),list('sub_list'))",
            &scope,
        )
        .unwrap();
        assert_eq!(
            scope.get("my_list").unwrap().to_string(),
            "[ 1, \"2\", None, {}, [ \"sub_list\" ] ]"
        );

        // Initialization from a map iterates its keys.
        calculate("my_map = map()", &scope).unwrap();
        calculate("my_map.a = 1", &scope).unwrap();
        calculate("my_map.b = 2", &scope).unwrap();
        calculate("my_list = list(my_map)", &scope).unwrap();
        assert_eq!(scope.get("my_list").unwrap().to_string(), "[ \"a\", \"b\" ]");
    }

    #[test]
    fn test_literal_constructors() {
        let scope = Map::new();
        run_cases(
            &scope,
            vec![
                ("{ 'a': 1 }.a", Val(val(1))),
                ("[ 1, 2 ].len()", Val(val(2))),
                ("{ 'a': 'list' } == { 'a': 'list' }", Val(val(true))),
                ("['list'] == ['list']", Val(val(true))),
                ("['list']==['list']", Val(val(true))),
                ("{a:'list'} == {a:'list'}", Val(val(true))),
                ("{a:'list'}=={a:'list'}", Val(val(true))),
            ],
        );
        assert_eq!(
            calculate("M = {'a': 1}", &scope).unwrap().to_string(),
            "{ \"a\": 1 }"
        );
        assert_eq!(
            calculate("L = [1,2]", &scope).unwrap().to_string(),
            "[ 1, 2 ]"
        );
    }

    #[test]
    fn test_tuples() {
        let scope = Map::new();
        let stuple = calculate("'key':'value'", &scope).unwrap();
        assert_eq!(stuple.kind(), Kind::STUPLE);
        match &stuple {
            Value::STuple(items) => assert_eq!(items.len(), 2),
            other => panic!("expected stuple, got {other:?}"),
        }

        let tuple = calculate("1, 'key':'value', 3", &scope).unwrap();
        assert_eq!(tuple.kind(), Kind::TUPLE);
        match &tuple {
            Value::Tuple(items) => {
                assert_eq!(items.len(), 3);
                assert_eq!(items[1].kind(), Kind::STUPLE);
            }
            other => panic!("expected tuple, got {other:?}"),
        }

        assert_eq!(
            calculate("1,2,3,4,5", &scope).unwrap().to_string(),
            "(1, 2, 3, 4, 5)"
        );
        assert_eq!(
            calculate("pow, None", &scope).unwrap().to_string(),
            "([Function: pow], None)"
        );
    }

    #[test]
    fn test_default_functions() {
        let scope = Map::new();
        scope.insert("pi", std::f64::consts::PI);
        scope.insert("a", -4);
        run_cases(
            &scope,
            vec![
                ("sqrt(4)", Approx(2.0)),
                ("sin(pi)", Approx(0.0)),
                ("cos(pi/2)", Approx(0.0)),
                ("tan(pi)", Approx(0.0)),
                ("a + sqrt(4) * 2", Approx(0.0)),
                ("sqrt(4-a*3) * 2", Approx(8.0)),
                ("abs(42)", Val(val(42))),
                ("abs(-42)", Val(val(42))),
                ("abs(-4.2)", Approx(4.2)),
                ("pow(2,2)", Approx(4.0)),
                ("pow(2,3)", Approx(8.0)),
                ("pow(2,a)", Approx(1.0 / 16.0)),
                ("pow(2,a+4)", Approx(1.0)),
                ("pow(1,-10)", Approx(1.0)),
                ("pow(1,+10)", Approx(1.0)),
                (" float('0.1') ", Approx(0.1)),
                ("float(10)", Approx(10.0)),
                ("float('not a number')", Error),
                ("foo(10)", Error),
                // str() of the core kinds.
                (" str(None) ", Val(val("None"))),
                (" str(10) ", Val(val("10"))),
                (" str(10.1) ", Val(val("10.1"))),
                (" str('texto') ", Val(val("texto"))),
                (" str(list(1,2,3)) ", Val(val("[ 1, 2, 3 ]"))),
                (" str(map()) ", Val(val("{}"))),
                (" str(map) ", Val(val("[Function: map]"))),
                // type() of the core kinds.
                ("type(None)", Val(val("none"))),
                ("type(10.0)", Val(val("real"))),
                ("type(10)", Val(val("integer"))),
                ("type(True)", Val(val("boolean"))),
                ("type('str')", Val(val("string"))),
                ("type(str)", Val(val("function"))),
                ("type(list())", Val(val("list"))),
                ("type(map())", Val(val("map"))),
            ],
        );

        // Variadic sum through the implicit args list.
        calculate("total = sum(1,2,3,4)", &scope).unwrap();
        assert_eq!(scope.get("total").unwrap(), val(10.0));

        // A map's __type__ entry overrides the kind name.
        let tagged = Map::new();
        tagged.insert("__type__", "my_type");
        scope.insert("mymap", tagged);
        assert_eq!(calculate("type(mymap)", &scope).unwrap(), val("my_type"));
    }

    #[test]
    fn test_str_hook() {
        let scope = Map::new();
        let my_map = Map::new();
        my_map.insert(
            "__str__",
            Value::function(Function::native("map_str", &[], |_scope| {
                Ok(Value::Str("custom map str".into()))
            })),
        );
        scope.insert("my_map", my_map);
        assert_eq!(
            calculate(" str(my_map) ", &scope).unwrap(),
            val("custom map str")
        );
        // Without the hook, plain string coercion of a map fails.
        assert!(calculate("1 + float(map()) * 3", &scope).is_err());
    }

    #[test]
    fn test_extend_and_instanceof() {
        let scope = Map::new();
        calculate("a = map()", &scope).unwrap();
        calculate("b = extend(a)", &scope).unwrap();
        calculate("a.a = 10", &scope).unwrap();
        assert_eq!(calculate("b.a", &scope).unwrap(), val(10));
        calculate("b.a = 20", &scope).unwrap();
        assert_eq!(calculate("a.a", &scope).unwrap(), val(10));
        assert_eq!(calculate("b.a", &scope).unwrap(), val(20));

        calculate("c = extend(b)", &scope).unwrap();
        run_cases(
            &scope,
            vec![
                ("a.instanceof(b)", Val(val(false))),
                ("a.instanceof(c)", Val(val(false))),
                ("b.instanceof(a)", Val(val(true))),
                ("c.instanceof(a)", Val(val(true))),
                ("c.instanceof(b)", Val(val(true))),
            ],
        );
    }

    #[test]
    fn test_kwargs() {
        let scope = Map::new();
        calculate("my_map = map('a':1,'b':2)", &scope).unwrap();
        let Some(Value::Map(map)) = scope.get("my_map") else {
            panic!("expected map");
        };
        assert_eq!(map.get("a").unwrap(), val(1));
        assert_eq!(map.get("b").unwrap(), val(2));

        calculate("result = pow(2, 'exp': 3)", &scope).unwrap();
        assert_eq!(scope.get("result").unwrap(), val(8.0));
        calculate("result = pow('exp': 3, 'number': 2)", &scope).unwrap();
        assert_eq!(scope.get("result").unwrap(), val(8.0));

        // Bare-word keys inside constructor calls.
        calculate("m = map(a : 1, b:2, c: \"c\")", &scope).unwrap();
        let Some(Value::Map(m)) = scope.get("m") else {
            panic!("expected map");
        };
        assert_eq!(m.get("a").unwrap(), val(1));
        assert_eq!(m.get("b").unwrap(), val(2));
        assert_eq!(m.get("c").unwrap(), val("c"));
    }

    #[test]
    fn test_eval_builtin() {
        let scope = Map::new();
        scope.insert("a", 0);
        assert_eq!(calculate(" eval('a = 3') ", &scope).unwrap(), val(3));
        assert_eq!(scope.get("a").unwrap(), val(3));
    }

    #[test]
    fn test_missing_operator() {
        let scope = Map::new();
        scope.insert("map_value", Map::new());
        match calculate("map_value * 0", &scope) {
            Err(crate::Error::MissingOperator { op, left, right }) => {
                assert_eq!(op, "*");
                assert_eq!(left, Kind::MAP);
                assert_eq!(right, Kind::INT);
            }
            other => panic!("expected MissingOperator, got {other:?}"),
        }
    }
}
