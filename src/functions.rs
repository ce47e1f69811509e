//! Callable values and host-function registration.
//!
//! A [`Function`] pairs a declared argument-name list with a body: either a
//! native Rust closure receiving the bound call scope, or a compiled
//! postfix expression. Call binding is uniform for both: positional
//! arguments bind to declared names in order, stuple arguments bind by
//! name, extra positionals collect into an `args` list and extra keyword
//! arguments into a `kwargs` map, and method calls bind `this` to the
//! receiver. The callee runs in a fresh child of the caller's scope.
//!
//! The [`IntoFunction`] adapter turns plain typed Rust functions
//! (`fn(f64) -> f64`, `fn(i64, i64) -> Result<i64, Error>`, ...) into
//! `Function` values with automatic argument extraction by declared name
//! and result conversion.

use std::fmt;
use std::rc::Rc;

use crate::Error;
use crate::calculator::Expression;
use crate::config::Config;
use crate::containers::{List, Map};
use crate::value::Value;

/// Native function bodies receive the bound call scope: declared arguments
/// by name, extras under `args` and `kwargs`, the receiver under `this`.
pub type NativeBody = Rc<dyn Fn(&Map) -> Result<Value, Error>>;

enum FunctionBody {
    Native(NativeBody),
    Compiled(Expression),
}

/// An opaque callable value.
pub struct Function {
    name: String,
    arg_names: Vec<String>,
    body: FunctionBody,
}

impl Function {
    /// A function backed by a native Rust closure.
    pub fn native(
        name: impl Into<String>,
        arg_names: &[&str],
        body: impl Fn(&Map) -> Result<Value, Error> + 'static,
    ) -> Function {
        Function {
            name: name.into(),
            arg_names: arg_names.iter().map(|s| (*s).to_owned()).collect(),
            body: FunctionBody::Native(Rc::new(body)),
        }
    }

    /// A function whose body is a compiled expression, evaluated in the
    /// bound call scope.
    pub fn from_expression(
        name: impl Into<String>,
        arg_names: &[&str],
        body: Expression,
    ) -> Function {
        Function {
            name: name.into(),
            arg_names: arg_names.iter().map(|s| (*s).to_owned()).collect(),
            body: FunctionBody::Compiled(body),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arg_names(&self) -> &[String] {
        &self.arg_names
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[Function: {}]", self.name)
    }
}

/// Bind arguments and execute a callable.
///
/// `positional` and `kwargs` come from the call site's argument tuple,
/// `this` from the receiver when the callable was reached through member
/// access. The callee sees a fresh child of `caller_scope`.
pub(crate) fn call_function(
    func: &Rc<Function>,
    positional: Vec<Value>,
    kwargs: Vec<(String, Value)>,
    this: Option<Value>,
    caller_scope: &Map,
    config: &Config,
) -> Result<Value, Error> {
    let scope = caller_scope.child();

    let mut bound: Vec<Option<Value>> = vec![None; func.arg_names.len()];
    let extra_kwargs = Map::new();
    for (key, value) in kwargs {
        match func.arg_names.iter().position(|n| *n == key) {
            Some(i) => bound[i] = Some(value),
            None => extra_kwargs.insert(key, value),
        }
    }

    let mut extra_positional = Vec::new();
    let mut slots = bound.iter_mut().filter(|slot| slot.is_none());
    for value in positional {
        match slots.next() {
            Some(slot) => *slot = Some(value),
            None => extra_positional.push(value),
        }
    }

    for (name, slot) in func.arg_names.iter().zip(bound) {
        scope.insert(name.clone(), slot.unwrap_or(Value::None));
    }
    scope.insert("args", List::from_vec(extra_positional));
    scope.insert("kwargs", extra_kwargs);
    if let Some(receiver) = this {
        scope.insert("this", receiver);
    }

    match &func.body {
        FunctionBody::Native(body) => body(&scope),
        FunctionBody::Compiled(expr) => crate::evaluator::evaluate_tokens(expr, &scope, false, config),
    }
}

/// Invoke a map's `__str__` callable for string coercion: no arguments,
/// the map itself as both enclosing scope and `this`.
pub(crate) fn invoke_str_hook(func: &Rc<Function>, map: &Map) -> Result<String, Error> {
    let result = call_function(
        func,
        Vec::new(),
        Vec::new(),
        Some(Value::Map(map.clone())),
        map,
        crate::builtinops::default_config(),
    )?;
    Ok(result.to_raw_string())
}

/// Convert strongly-typed Rust results into values.
///
/// A deliberately closed set of implementations: keeping this trait local
/// (instead of reusing `Into<Value>`) is what lets [`IntoResult`] accept
/// both plain and `Result`-returning functions without overlap.
pub trait IntoValue {
    fn into_value(self) -> Value;
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl IntoValue for i64 {
    fn into_value(self) -> Value {
        Value::Int(self)
    }
}

impl IntoValue for f64 {
    fn into_value(self) -> Value {
        Value::Real(self)
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl IntoValue for String {
    fn into_value(self) -> Value {
        Value::Str(self)
    }
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::Str(self.to_owned())
    }
}

impl IntoValue for () {
    fn into_value(self) -> Value {
        Value::None
    }
}

/// Normalize both plain values and `Result`-returning functions into
/// `Result<T, Error>`.
pub trait IntoResult<T> {
    fn into_result(self) -> Result<T, Error>;
}

impl<T> IntoResult<T> for T
where
    T: IntoValue,
{
    fn into_result(self) -> Result<T, Error> {
        Ok(self)
    }
}

impl<T, E> IntoResult<T> for Result<T, E>
where
    E: fmt::Display,
{
    fn into_result(self) -> Result<T, Error> {
        self.map_err(|e| Error::Type(e.to_string()))
    }
}

/// Parameter types that can be extracted from a bound call scope by
/// declared argument name.
pub trait FromScope: Sized {
    fn from_scope(scope: &Map, name: &str) -> Result<Self, Error>;
}

fn required(scope: &Map, name: &str) -> Result<Value, Error> {
    scope
        .get(name)
        .filter(|v| !matches!(v, Value::None))
        .ok_or_else(|| Error::Type(format!("missing argument '{name}'")))
}

impl FromScope for Value {
    fn from_scope(scope: &Map, name: &str) -> Result<Self, Error> {
        Ok(scope.get(name).unwrap_or(Value::None))
    }
}

impl FromScope for f64 {
    fn from_scope(scope: &Map, name: &str) -> Result<Self, Error> {
        required(scope, name)?.as_real()
    }
}

impl FromScope for i64 {
    fn from_scope(scope: &Map, name: &str) -> Result<Self, Error> {
        required(scope, name)?.as_int()
    }
}

impl FromScope for bool {
    fn from_scope(scope: &Map, name: &str) -> Result<Self, Error> {
        Ok(required(scope, name)?.as_bool())
    }
}

impl FromScope for String {
    fn from_scope(scope: &Map, name: &str) -> Result<Self, Error> {
        required(scope, name)?.as_string()
    }
}

/// Adapter turning typed Rust functions into [`Function`] values.
///
/// The `Args` and `R` parameters disambiguate between overlapping callable
/// shapes; call sites usually let inference pick them:
///
/// ```
/// use formulaxp::{Map, Value, calculate};
///
/// fn hypot(a: f64, b: f64) -> f64 {
///     (a * a + b * b).sqrt()
/// }
///
/// let scope = Map::new();
/// scope.register_function("hypot", &["a", "b"], hypot);
/// assert_eq!(calculate("hypot(3, 4)", &scope).unwrap(), Value::Real(5.0));
/// ```
pub trait IntoFunction<Args, R> {
    fn into_function(self, name: &str, arg_names: &[&str]) -> Function;
}

impl<F, FR, R> IntoFunction<(), R> for F
where
    F: Fn() -> FR + 'static,
    FR: IntoResult<R> + 'static,
    R: IntoValue + 'static,
{
    fn into_function(self, name: &str, arg_names: &[&str]) -> Function {
        Function::native(name, arg_names, move |_scope| {
            let value: R = (self)().into_result()?;
            Ok(value.into_value())
        })
    }
}

macro_rules! impl_into_function_for_arity {
    ( $( $p:ident : $A:ident => $idx:expr ),+ ) => {
        impl<F, FR, R, $( $A ),+> IntoFunction<($( $A, )+), R> for F
        where
            F: Fn( $( $A ),+ ) -> FR + 'static,
            FR: IntoResult<R> + 'static,
            R: IntoValue + 'static,
            $( $A: FromScope, )+
        {
            fn into_function(self, name: &str, arg_names: &[&str]) -> Function {
                let names: Vec<String> =
                    arg_names.iter().map(|s| (*s).to_owned()).collect();
                Function::native(name, arg_names, move |scope| {
                    $(
                        let $p: $A = match names.get($idx) {
                            Some(n) => <$A as FromScope>::from_scope(scope, n)?,
                            None => {
                                return Err(Error::Type(format!(
                                    "function declares fewer than {} arguments",
                                    $idx + 1usize
                                )));
                            }
                        };
                    )+
                    let value: R = (self)( $( $p ),+ ).into_result()?;
                    Ok(value.into_value())
                })
            }
        }
    };
}

impl_into_function_for_arity!(p0: A1 => 0);
impl_into_function_for_arity!(p0: A1 => 0, p1: A2 => 1);
impl_into_function_for_arity!(p0: A1 => 0, p1: A2 => 1, p2: A3 => 2);
impl_into_function_for_arity!(p0: A1 => 0, p1: A2 => 1, p2: A3 => 2, p3: A4 => 3);

impl Map {
    /// Register a typed Rust function under `name`, with `arg_names` as
    /// the declared parameter names for call binding.
    pub fn register_function<F, Args, R>(&self, name: &str, arg_names: &[&str], func: F)
    where
        F: IntoFunction<Args, R>,
    {
        self.insert(name, Value::function(func.into_function(name, arg_names)));
    }

    /// Register a raw native function that works on the bound call scope
    /// directly. Lower-level than [`Map::register_function`]; useful for
    /// variadic functions reading `args`/`kwargs`.
    pub fn register_native(
        &self,
        name: &str,
        arg_names: &[&str],
        func: impl Fn(&Map) -> Result<Value, Error> + 'static,
    ) {
        self.insert(name, Value::function(Function::native(name, arg_names, func)));
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::builtinops::default_config;
    use crate::value::val;

    fn call(
        func: &Value,
        positional: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, Error> {
        let Value::Function(f) = func else {
            panic!("not a function: {func:?}");
        };
        call_function(f, positional, kwargs, None, &Map::new(), default_config())
    }

    #[test]
    fn test_typed_registration_fixed_arity() {
        fn add(a: i64, b: i64) -> i64 {
            a + b
        }
        let scope = Map::new();
        scope.register_function("add", &["a", "b"], add);
        let f = scope.get("add").unwrap();
        assert_eq!(call(&f, vec![val(7), val(5)], vec![]).unwrap(), val(12));
    }

    #[test]
    fn test_typed_registration_zero_arg() {
        let scope = Map::new();
        scope.register_function("forty_two", &[], || 42i64);
        let f = scope.get("forty_two").unwrap();
        assert_eq!(call(&f, vec![], vec![]).unwrap(), val(42));
    }

    #[test]
    fn test_typed_registration_result_returning() {
        fn safe_div(a: f64, b: f64) -> Result<f64, &'static str> {
            if b == 0.0 { Err("division by zero") } else { Ok(a / b) }
        }
        let scope = Map::new();
        scope.register_function("safe_div", &["a", "b"], safe_div);
        let f = scope.get("safe_div").unwrap();
        assert_eq!(call(&f, vec![val(9), val(2)], vec![]).unwrap(), val(4.5));
        let err = call(&f, vec![val(9), val(0)], vec![]).unwrap_err();
        assert_eq!(err, Error::Type("division by zero".into()));
    }

    #[test]
    fn test_kwargs_bind_by_name() {
        fn power(number: f64, exp: f64) -> f64 {
            number.powf(exp)
        }
        let scope = Map::new();
        scope.register_function("power", &["number", "exp"], power);
        let f = scope.get("power").unwrap();

        // Positional, mixed, and all-keyword forms agree.
        assert_eq!(call(&f, vec![val(2), val(3)], vec![]).unwrap(), val(8.0));
        assert_eq!(
            call(&f, vec![val(2)], vec![("exp".into(), val(3))]).unwrap(),
            val(8.0)
        );
        assert_eq!(
            call(
                &f,
                vec![],
                vec![("exp".into(), val(3)), ("number".into(), val(2))]
            )
            .unwrap(),
            val(8.0)
        );
    }

    #[test]
    fn test_extra_arguments_collect() {
        let scope = Map::new();
        scope.register_native("collect", &["first"], |scope| {
            let first = scope.get("first").unwrap_or(Value::None);
            let extras = match scope.get("args") {
                Some(Value::List(l)) => l.len() as i64,
                _ => 0,
            };
            let kwargs = match scope.get("kwargs") {
                Some(Value::Map(m)) => m.len() as i64,
                _ => 0,
            };
            Ok(Value::Tuple(vec![first, Value::Int(extras), Value::Int(kwargs)]))
        });
        let f = scope.get("collect").unwrap();
        let result = call(
            &f,
            vec![val(1), val(2), val(3)],
            vec![("stray".into(), val(4))],
        )
        .unwrap();
        assert_eq!(result, Value::Tuple(vec![val(1), val(2), val(1)]));
    }

    #[test]
    fn test_compiled_body_function() {
        let scope = Map::new();
        let body = crate::calculator::compile("a + b", &scope).unwrap();
        scope.insert(
            "add",
            Value::function(Function::from_expression("add", &["a", "b"], body)),
        );
        assert_eq!(
            crate::calculator::calculate("add(2, 3)", &scope).unwrap(),
            val(5)
        );
    }

    #[test]
    fn test_missing_argument_errors() {
        fn double(x: f64) -> f64 {
            2.0 * x
        }
        let scope = Map::new();
        scope.register_function("double", &["x"], double);
        let f = scope.get("double").unwrap();
        assert!(call(&f, vec![], vec![]).is_err());
    }
}
