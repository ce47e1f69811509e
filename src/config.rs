//! Compiler and evaluator configuration: operator precedence, the
//! type-pair-keyed overload table, and the parser hook tables.
//!
//! A [`Config`] is captured by value when an expression is compiled and
//! consulted again at evaluation; both tables are immutable once a config
//! is in use. Hosts typically clone the default configuration from
//! [`crate::builtinops::default_config`] and extend it.

use std::collections::{HashMap, HashSet};

use crate::Error;
use crate::compiler::RpnBuilder;
use crate::evaluator::EvalContext;
use crate::value::{Kind, Value};

/// Catch-all operator key: overloads registered under the empty string are
/// consulted when no entry exists for the literal operator.
pub const ANY_OP: &str = "";

/// An operator overload body. Receives the resolved left and right
/// operands and the evaluation context (scope plus the original, possibly
/// unresolved, reference operands). Returning [`Error::Reject`] passes
/// dispatch on to the next matching overload.
pub type OpFn = fn(&Value, &Value, &mut EvalContext) -> Result<Value, Error>;

/// A reserved word or reserved character parser hook. Invoked with the
/// builder, the full input, and the position just past the matched word or
/// character; returns the position parsing should resume from.
pub type HookFn =
    for<'a, 'c, 'i> fn(&'a mut RpnBuilder<'c>, &'i [u8], usize) -> Result<usize, Error>;

/// Operator precedence and associativity table.
///
/// Smaller numbers bind tighter. Registering with a negative precedence
/// stores the absolute value and marks the operator right-to-left
/// associative. Unary registration prefixes the operator with `L` (prefix)
/// or `R` (postfix) and also registers a binary entry at the same
/// precedence when none exists, so operator existence is a single lookup.
#[derive(Clone)]
pub struct PrecedenceMap {
    precedence: HashMap<String, i32>,
    right_to_left: HashSet<String>,
}

impl PrecedenceMap {
    pub fn new() -> PrecedenceMap {
        let mut map = PrecedenceMap {
            precedence: HashMap::new(),
            right_to_left: HashSet::new(),
        };
        // The calculator hard-codes these, so they must always resolve:
        // the lowered call/index forms and the bracket markers that sit on
        // the operator stack while their group is open.
        map.precedence.insert("[]".into(), -1);
        map.precedence.insert("()".into(), -1);
        map.precedence.insert("[".into(), i32::MAX);
        map.precedence.insert("(".into(), i32::MAX);
        map.precedence.insert("{".into(), i32::MAX);
        map.right_to_left.insert("=".into());
        map
    }

    pub fn add(&mut self, op: &str, precedence: i32) {
        let stored = if precedence < 0 {
            self.right_to_left.insert(op.to_owned());
            -precedence
        } else {
            precedence
        };
        self.precedence.insert(op.to_owned(), stored);
    }

    /// Register `op` as a left (prefix) unary operator.
    pub fn add_unary(&mut self, op: &str, precedence: i32) {
        self.add(&format!("L{op}"), precedence);
        if !self.exists(op) {
            self.add(op, precedence);
        }
    }

    /// Register `op` as a right (postfix) unary operator.
    ///
    /// A binary operator and a right unary operator with the same token
    /// are ambiguous on the same left operand kind; the unary reading
    /// wins, so only combine them when the operand kinds are distinct.
    pub fn add_right_unary(&mut self, op: &str, precedence: i32) {
        self.add(&format!("R{op}"), precedence);
        if !self.exists(op) {
            self.add(op, precedence);
        }
    }

    pub fn prec(&self, op: &str) -> Option<i32> {
        self.precedence.get(op).copied()
    }

    pub fn right_to_left(&self, op: &str) -> bool {
        self.right_to_left.contains(op)
    }

    pub fn exists(&self, op: &str) -> bool {
        self.precedence.contains_key(op)
    }
}

impl Default for PrecedenceMap {
    fn default() -> Self {
        PrecedenceMap::new()
    }
}

/// The 64-bit dispatch key for an operand kind pair: the left kind's mask
/// in the high half, the right kind's in the low half.
pub fn op_id(left: Kind, right: Kind) -> u64 {
    (u64::from(left.mask()) << 32) | u64::from(right.mask())
}

/// A single registered overload: a kind-pair mask plus the body.
#[derive(Clone, Copy)]
pub struct Operation {
    mask: u64,
    func: OpFn,
}

impl Operation {
    pub fn new(left: Kind, right: Kind, func: OpFn) -> Operation {
        Operation {
            mask: op_id(left, right),
            func,
        }
    }

    /// Whether this overload's masks intersect the actual kind pair on
    /// both sides independently.
    pub fn matches(&self, actual: u64) -> bool {
        (self.mask >> 32) & (actual >> 32) != 0 && (self.mask & 0xFFFF_FFFF) & (actual & 0xFFFF_FFFF) != 0
    }

    pub fn exec(
        &self,
        left: &Value,
        right: &Value,
        context: &mut EvalContext,
    ) -> Result<Value, Error> {
        (self.func)(left, right, context)
    }
}

/// Overload table keyed by operator string. Entries are kept in
/// registration order; dispatch tries matching entries in that order and
/// moves past any that reject.
#[derive(Clone, Default)]
pub struct OperationMap {
    operations: HashMap<String, Vec<Operation>>,
}

impl OperationMap {
    /// Register an overload for the `(left, op, right)` signature.
    pub fn add(&mut self, signature: (Kind, &str, Kind), func: OpFn) {
        let (left, op, right) = signature;
        self.operations
            .entry(op.to_owned())
            .or_default()
            .push(Operation::new(left, right, func));
    }

    pub fn entries(&self, op: &str) -> Option<&[Operation]> {
        self.operations.get(op).map(Vec::as_slice)
    }
}

/// Which operand a reference-consuming operator binds through. The other
/// side resolves strictly, so an unbound name there still fails with
/// `UnknownVariable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefSide {
    Left,
    Right,
    Both,
}

impl RefSide {
    pub fn covers_left(self) -> bool {
        matches!(self, RefSide::Left | RefSide::Both)
    }

    pub fn covers_right(self) -> bool {
        matches!(self, RefSide::Right | RefSide::Both)
    }
}

/// Reserved word and reserved character hook tables, consulted during
/// tokenization before default handling.
#[derive(Clone, Default)]
pub struct HookMap {
    words: HashMap<String, HookFn>,
    chars: HashMap<u8, HookFn>,
}

impl HookMap {
    pub fn add_word(&mut self, word: &str, hook: HookFn) {
        self.words.insert(word.to_owned(), hook);
    }

    pub fn add_char(&mut self, c: u8, hook: HookFn) {
        self.chars.insert(c, hook);
    }

    pub fn word(&self, word: &str) -> Option<HookFn> {
        self.words.get(word).copied()
    }

    pub fn char_hook(&self, c: u8) -> Option<HookFn> {
        self.chars.get(&c).copied()
    }
}

/// A complete compiler/evaluator configuration.
#[derive(Clone)]
pub struct Config {
    /// Reserved word and character hooks.
    pub parser: HookMap,
    /// Operator precedence and associativity.
    pub precedence: PrecedenceMap,
    /// Operator overloads.
    pub ops: OperationMap,
    reference_ops: HashMap<String, RefSide>,
}

impl Config {
    /// An empty configuration: only the hard-wired bracket entries, the
    /// right-associative `=`, and the standard reference-consuming
    /// operators are present. Both `=` and `:` bind through their left
    /// operand.
    pub fn empty() -> Config {
        let mut reference_ops = HashMap::new();
        reference_ops.insert("=".to_owned(), RefSide::Left);
        reference_ops.insert(":".to_owned(), RefSide::Left);
        Config {
            parser: HookMap::default(),
            precedence: PrecedenceMap::new(),
            ops: OperationMap::default(),
            reference_ops,
        }
    }

    /// Register a binary operator; negative precedence marks it
    /// right-to-left associative.
    pub fn register_operator(&mut self, op: &str, precedence: i32) {
        self.precedence.add(op, precedence);
    }

    pub fn register_unary(&mut self, op: &str, precedence: i32) {
        self.precedence.add_unary(op, precedence);
    }

    pub fn register_right_unary(&mut self, op: &str, precedence: i32) {
        self.precedence.add_right_unary(op, precedence);
    }

    /// Register an overload for the `(left, op, right)` signature. Later
    /// registrations for the same signature are tried after earlier ones.
    pub fn register_overload(&mut self, signature: (Kind, &str, Kind), func: OpFn) {
        self.ops.add(signature, func);
    }

    pub fn register_reserved_word(&mut self, word: &str, hook: HookFn) {
        self.parser.add_word(word, hook);
    }

    pub fn register_reserved_char(&mut self, c: u8, hook: HookFn) {
        self.parser.add_char(c, hook);
    }

    /// Declare `op` reference-consuming on the given operand side: that
    /// operand is passed through to the overload unresolved, so the
    /// overload can inspect the reference's key and origin (the way `=`
    /// binds its target through the left operand). The opposite side
    /// still resolves strictly.
    pub fn add_reference_op(&mut self, op: &str, side: RefSide) {
        self.reference_ops.insert(op.to_owned(), side);
    }

    /// The declared reference side of `op`, if it is reference-consuming.
    pub fn reference_side(&self, op: &str) -> Option<RefSide> {
        self.reference_ops.get(op).copied()
    }
}

impl Default for Config {
    fn default() -> Self {
        crate::builtinops::default_config().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_id_layout() {
        assert_eq!(op_id(Kind::NONE, Kind::NONE), 0x0000_0001_0000_0001);
        assert_eq!(op_id(Kind::FUNC, Kind::FUNC), 0x0000_0020_0000_0020);
        assert_eq!(op_id(Kind::FUNC, Kind::ANY), 0x0000_0020_0000_FFFF);
    }

    #[test]
    fn test_operation_matching() {
        fn noop(_: &Value, _: &Value, _: &mut EvalContext) -> Result<Value, Error> {
            Ok(Value::None)
        }

        let numeric = Operation::new(Kind::NUM, Kind::NUM, noop);
        assert!(numeric.matches(op_id(Kind::INT, Kind::REAL)));
        assert!(numeric.matches(op_id(Kind::BOOL, Kind::INT)));
        assert!(!numeric.matches(op_id(Kind::STR, Kind::INT)));

        // Left and right sides match independently.
        let asymmetric = Operation::new(Kind::STR, Kind::NUM, noop);
        assert!(asymmetric.matches(op_id(Kind::STR, Kind::INT)));
        assert!(!asymmetric.matches(op_id(Kind::INT, Kind::STR)));

        // A reference-marked kind matches both the base-specific mask and
        // the wildcard.
        let wild = Operation::new(Kind::ANY, Kind::ANY, noop);
        assert!(wild.matches(op_id(Kind::INT | Kind::REF, Kind::LIST)));
        let int_specific = Operation::new(Kind::INT, Kind::INT, noop);
        assert!(int_specific.matches(op_id(Kind::INT | Kind::REF, Kind::INT)));
    }

    #[test]
    fn test_precedence_registration() {
        let mut map = PrecedenceMap::new();
        // Hard-wired entries are present from the start.
        assert!(map.exists("("));
        assert!(map.exists("[]"));
        assert!(map.right_to_left("="));

        map.add("+", 6);
        map.add("=", -16);
        assert_eq!(map.prec("+"), Some(6));
        assert_eq!(map.prec("="), Some(16));
        assert!(map.right_to_left("="));
        assert!(!map.right_to_left("+"));

        // Unary registration creates the prefixed entry plus a binary
        // entry when none exists, so existence is a single lookup.
        map.add_unary("~", 4);
        assert!(map.exists("L~"));
        assert!(map.exists("~"));
        assert_eq!(map.prec("L~"), Some(4));

        // An existing binary entry is not clobbered.
        map.add_unary("+", 3);
        assert_eq!(map.prec("L+"), Some(3));
        assert_eq!(map.prec("+"), Some(6));
    }
}
